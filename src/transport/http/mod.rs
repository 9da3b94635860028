pub mod router;
pub mod types;
pub mod handlers {
    pub mod common;
    pub mod feed;
    pub mod health;
    pub mod images;
}

pub use router::{create_router, ApiDoc};
pub use types::AppState;
