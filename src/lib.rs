// Bearer identity extraction
pub mod auth;

// TOML configuration
pub mod config;

// Encrypted settings and usage storage
pub mod credentials;
