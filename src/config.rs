//! Checkout configuration.
//!
//! Every pricing constant is policy, not code: shipping thresholds, tax
//! rate, loyalty caps and the earn divisor are read from the environment
//! with storefront defaults, so an operator can retune them without a
//! rebuild.

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::domain::value_objects::Money;

/// Pricing and loyalty policy applied to every quote.
#[derive(Clone, Debug)]
pub struct PricingPolicy {
    /// Orders at or above this subtotal ship free.
    pub free_shipping_threshold: Money,
    /// Flat shipping charge below the threshold.
    pub flat_shipping_cost: Money,
    /// Flat tax rate, in percent of subtotal.
    pub tax_rate_percent: Decimal,
    /// Redemption is capped at this percent of subtotal.
    pub redemption_cap_percent: Decimal,
    /// One point earned per this many currency units of final total.
    pub loyalty_earn_divisor: Decimal,
    /// Whether cancelling an order claws back its loyalty effects.
    pub reverse_loyalty_on_cancel: bool,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            free_shipping_threshold: Money::from_units(500),
            flat_shipping_cost: Money::from_units(50),
            tax_rate_percent: Decimal::from(5),
            redemption_cap_percent: Decimal::from(10),
            loyalty_earn_divisor: Decimal::ONE_HUNDRED,
            reverse_loyalty_on_cancel: false,
        }
    }
}

impl PricingPolicy {
    /// Load policy from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            free_shipping_threshold: env_or("FREE_SHIPPING_THRESHOLD", defaults.free_shipping_threshold.amount()).into(),
            flat_shipping_cost: env_or("FLAT_SHIPPING_COST", defaults.flat_shipping_cost.amount()).into(),
            tax_rate_percent: env_or("TAX_RATE_PERCENT", defaults.tax_rate_percent),
            redemption_cap_percent: env_or("LOYALTY_REDEMPTION_CAP_PERCENT", defaults.redemption_cap_percent),
            loyalty_earn_divisor: env_or("LOYALTY_EARN_DIVISOR", defaults.loyalty_earn_divisor),
            reverse_loyalty_on_cancel: env_or("REVERSE_LOYALTY_ON_CANCEL", defaults.reverse_loyalty_on_cancel),
        }
    }
}

/// Top-level checkout configuration.
#[derive(Clone, Debug)]
pub struct CheckoutConfig {
    /// ISO currency code stamped onto persisted orders.
    pub currency: String,
    pub policy: PricingPolicy,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self { currency: "INR".to_string(), policy: PricingPolicy::default() }
    }
}

impl CheckoutConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self {
            currency: std::env::var("STORE_CURRENCY").unwrap_or_else(|_| "INR".to_string()),
            policy: PricingPolicy::from_env(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_matches_storefront_rules() {
        let policy = PricingPolicy::default();
        assert_eq!(policy.free_shipping_threshold, Money::from_units(500));
        assert_eq!(policy.flat_shipping_cost, Money::from_units(50));
        assert_eq!(policy.tax_rate_percent, Decimal::from(5));
        assert_eq!(policy.redemption_cap_percent, Decimal::from(10));
        assert!(!policy.reverse_loyalty_on_cancel);
    }
}
