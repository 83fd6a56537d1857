//! Payment configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use super::server::Environment;
use crate::domain::upgrade::PlanPriceTable;

/// Payment configuration (Khalti ePayment)
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Khalti API base, e.g. `https://khalti.com/api/v2`
    #[serde(default = "default_khalti_base_url")]
    pub khalti_base_url: String,

    /// Khalti live or test secret key
    pub khalti_secret_key: String,

    /// Where Khalti redirects the user after payment
    pub return_url: String,

    /// Merchant website shown on the Khalti checkout page
    pub website_url: String,

    /// Per-request gateway timeout in seconds
    #[serde(default = "default_gateway_timeout")]
    pub gateway_timeout_secs: u64,

    /// Payment window for a new upgrade in minutes
    #[serde(default = "default_upgrade_ttl")]
    pub upgrade_ttl_minutes: i64,

    /// Pro price in paisa
    #[serde(default = "default_pro_price")]
    pub pro_price_paisa: i64,

    /// Vantage price in paisa
    #[serde(default = "default_vantage_price")]
    pub vantage_price_paisa: i64,

    /// How often stale upgrades are swept, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl PaymentConfig {
    /// Get gateway timeout as Duration
    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
    }

    /// Get sweep interval as Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Plan prices as a domain table
    pub fn price_table(&self) -> Result<PlanPriceTable, ValidationError> {
        PlanPriceTable::new(self.pro_price_paisa, self.vantage_price_paisa)
            .map_err(|_| ValidationError::InvalidPlanPrice)
    }

    /// Check if pointed at the Khalti sandbox
    pub fn is_sandbox(&self) -> bool {
        self.khalti_base_url.contains("dev.khalti.com")
    }

    /// Validate payment configuration
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        if self.khalti_secret_key.trim().is_empty() {
            return Err(ValidationError::MissingRequired("KHALTI_SECRET_KEY"));
        }
        if self.return_url.is_empty() {
            return Err(ValidationError::MissingRequired("RETURN_URL"));
        }
        if self.website_url.is_empty() {
            return Err(ValidationError::MissingRequired("WEBSITE_URL"));
        }
        if !self.khalti_base_url.starts_with("https://")
            && !self.khalti_base_url.starts_with("http://")
        {
            return Err(ValidationError::InvalidGatewayUrl);
        }

        // In production, every payment URL must be HTTPS
        if *environment == Environment::Production
            && [&self.khalti_base_url, &self.return_url, &self.website_url]
                .iter()
                .any(|url| !url.starts_with("https://"))
        {
            return Err(ValidationError::PaymentUrlMustBeHttps);
        }

        if self.gateway_timeout_secs == 0 || self.gateway_timeout_secs > 60 {
            return Err(ValidationError::InvalidGatewayTimeout);
        }
        if !(1..=1440).contains(&self.upgrade_ttl_minutes) {
            return Err(ValidationError::InvalidUpgradeTtl);
        }
        if self.sweep_interval_secs < 5 {
            return Err(ValidationError::InvalidSweepInterval);
        }

        self.price_table()?;
        if self.vantage_price_paisa <= self.pro_price_paisa {
            return Err(ValidationError::InvalidPlanPrice);
        }

        Ok(())
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            khalti_base_url: default_khalti_base_url(),
            khalti_secret_key: String::new(),
            return_url: String::new(),
            website_url: String::new(),
            gateway_timeout_secs: default_gateway_timeout(),
            upgrade_ttl_minutes: default_upgrade_ttl(),
            pro_price_paisa: default_pro_price(),
            vantage_price_paisa: default_vantage_price(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_khalti_base_url() -> String {
    "https://dev.khalti.com/api/v2".to_string()
}

fn default_gateway_timeout() -> u64 {
    10
}

fn default_upgrade_ttl() -> i64 {
    30
}

fn default_pro_price() -> i64 {
    300_000
}

fn default_vantage_price() -> i64 {
    500_000
}

fn default_sweep_interval() -> u64 {
    60
}
