pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod knowledge;
pub mod rag;
pub mod scrape;
pub mod server;
pub mod store;
