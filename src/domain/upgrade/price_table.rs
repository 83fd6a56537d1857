//! Plan prices in paisa.

use super::Plan;
use crate::domain::foundation::ValidationError;

/// Price of each paid plan, in the smallest currency unit (paisa).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanPriceTable {
    pro: i64,
    vantage: i64,
}

impl PlanPriceTable {
    /// Builds a price table, rejecting non-positive amounts.
    pub fn new(pro: i64, vantage: i64) -> Result<Self, ValidationError> {
        if pro <= 0 {
            return Err(ValidationError::out_of_range("pro_price_paisa", 1, i64::MAX, pro));
        }
        if vantage <= 0 {
            return Err(ValidationError::out_of_range(
                "vantage_price_paisa",
                1,
                i64::MAX,
                vantage,
            ));
        }
        Ok(Self { pro, vantage })
    }

    /// Amount to charge for `plan`, or `None` for the free plan.
    pub fn price_of(&self, plan: Plan) -> Option<i64> {
        match plan {
            Plan::Free => None,
            Plan::Pro => Some(self.pro),
            Plan::Vantage => Some(self.vantage),
        }
    }
}

impl Default for PlanPriceTable {
    fn default() -> Self {
        Self {
            pro: 300_000,
            vantage: 500_000,
        }
    }
}
