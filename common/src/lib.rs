pub mod config;
pub mod endpoint;
pub mod network;
pub mod store;
