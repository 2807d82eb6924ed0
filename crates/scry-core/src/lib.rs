pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod types;
