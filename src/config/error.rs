//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid socket address: {0}")]
    InvalidSocketAddr(String),

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Pool needs max_connections > 0 and min_connections <= max_connections")]
    InvalidPoolSize,

    #[error("Pool size exceeds maximum allowed (100)")]
    PoolSizeTooLarge,

    #[error("JWT secret must be at least 32 bytes")]
    JwtSecretTooShort,

    #[error("Invalid Khalti base URL")]
    InvalidGatewayUrl,

    #[error("Payment URLs must use HTTPS in production")]
    PaymentUrlMustBeHttps,

    #[error("Invalid gateway timeout")]
    InvalidGatewayTimeout,

    #[error("Plan prices must be positive and Vantage must cost more than Pro")]
    InvalidPlanPrice,

    #[error("Upgrade TTL must be between 1 and 1440 minutes")]
    InvalidUpgradeTtl,

    #[error("Sweep interval must be at least 5 seconds")]
    InvalidSweepInterval,
}
