mod config;
mod gateway;

pub use config::{DEFAULT_API_BASE, StripeConfig};
pub use gateway::StripeGateway;
