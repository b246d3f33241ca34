pub mod config;
pub mod error;
pub mod models;
pub mod mqtt;
pub mod processor;
pub mod relay;
pub mod service;

pub use error::RelayError;
pub use relay::RelayHandler;
