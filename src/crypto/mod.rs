pub mod eth;
pub mod hashing;
