pub mod gateway;
pub mod interface;
pub mod subnet;
