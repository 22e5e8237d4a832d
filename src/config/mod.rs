/// Database configuration and connection management
pub mod database;

/// Principal the binary signs in as, from environment variables
pub mod principal;

/// Starter goal configuration from config.toml
pub mod seed;
