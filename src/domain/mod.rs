pub mod error;
pub mod model;
pub mod state;

pub use error::{Error, Stage};
