// Discord adapter: REST actions and the gateway event stream.

pub mod client;
pub mod gateway;
pub mod models;
