pub mod config;
pub mod evm;
pub mod graphql;
pub mod identity;
pub mod indexer;
