pub mod chain;
pub mod client_error;
pub mod config;
pub mod models;
pub mod service;
pub mod telemetry;

#[cfg(test)]
mod test_support;
