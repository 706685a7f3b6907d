//! Tiered presale pricing
//!
//! USD amounts are exact decimals. Quotes are advisory: the presale contract
//! prices the purchase itself, so native-asset quotes carry an upward buffer.

use crate::config::chains::ChainDescriptor;
use crate::config::PricingSettings;
use crate::error::Error;
use crate::evm::types::utils::decimal_to_units;
use crate::evm::types::PaymentToken;
use alloy_primitives::U256;
use bigdecimal::BigDecimal;
use serde::Serialize;

const BPS_DENOMINATOR: u32 = 10_000;

/// One price band over the cumulative-sold position (whole tokens, end exclusive)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricingTier {
    pub range_start: u128,
    pub range_end: u128,
    pub usd_price_per_token: BigDecimal,
    pub label: String,
}

impl PricingTier {
    pub fn new(range_start: u128, range_end: u128, usd_price_per_token: BigDecimal, label: &str) -> Self {
        Self {
            range_start,
            range_end,
            usd_price_per_token,
            label: label.to_string(),
        }
    }

    pub fn contains(&self, position: u128) -> bool {
        self.range_start <= position && position < self.range_end
    }
}

/// Tiers partitioning `[0, total_supply_for_sale)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingSchedule {
    tiers: Vec<PricingTier>,
    total_supply_for_sale: u128,
}

impl PricingSchedule {
    /// Validate contiguity, coverage and non-decreasing prices
    pub fn new(tiers: Vec<PricingTier>, total_supply_for_sale: u128) -> Result<Self, Error> {
        if tiers.is_empty() {
            return Err(Error::Pricing("Pricing schedule has no tiers".to_string()));
        }

        let mut expected_start = 0u128;
        let mut previous_price: Option<&BigDecimal> = None;
        for tier in &tiers {
            if tier.range_start != expected_start {
                return Err(Error::Pricing(format!(
                    "Tier {} starts at {}, expected {}",
                    tier.label, tier.range_start, expected_start
                )));
            }
            if tier.range_end <= tier.range_start {
                return Err(Error::Pricing(format!("Tier {} has an empty range", tier.label)));
            }
            if tier.usd_price_per_token <= BigDecimal::from(0) {
                return Err(Error::Pricing(format!("Tier {} has a non-positive price", tier.label)));
            }
            if previous_price.is_some_and(|p| &tier.usd_price_per_token < p) {
                return Err(Error::Pricing(format!(
                    "Tier {} is cheaper than the tier before it",
                    tier.label
                )));
            }
            previous_price = Some(&tier.usd_price_per_token);
            expected_start = tier.range_end;
        }

        if expected_start != total_supply_for_sale {
            return Err(Error::Pricing(format!(
                "Tiers cover [0, {}) but the sale size is {}",
                expected_start, total_supply_for_sale
            )));
        }

        Ok(Self {
            tiers,
            total_supply_for_sale,
        })
    }

    pub fn tiers(&self) -> &[PricingTier] {
        &self.tiers
    }

    pub fn total_supply_for_sale(&self) -> u128 {
        self.total_supply_for_sale
    }

    /// Tier containing `position`
    pub fn tier_at(&self, position: u128) -> Result<&PricingTier, Error> {
        self.tiers
            .iter()
            .find(|t| t.contains(position))
            .ok_or_else(|| {
                Error::Pricing(format!(
                    "No active tier at position {}; sale size is {}",
                    position, self.total_supply_for_sale
                ))
            })
    }
}

/// Advisory cost of a purchase
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub token_amount: u128,
    pub usd_cost: BigDecimal,
    /// Amount in the payment token's smallest unit
    pub payment_amount: U256,
    pub payment_symbol: String,
    pub tier_label: String,
    pub discounted: bool,
}

#[derive(Debug, Clone)]
pub struct PricingEngine {
    schedule: PricingSchedule,
    holder_discount_bps: u32,
    native_safety_multiplier: BigDecimal,
    sold_position: u128,
}

impl PricingEngine {
    pub fn new(
        schedule: PricingSchedule,
        holder_discount_bps: u32,
        native_safety_multiplier: BigDecimal,
    ) -> Self {
        Self {
            schedule,
            holder_discount_bps: holder_discount_bps.min(BPS_DENOMINATOR),
            native_safety_multiplier,
            sold_position: 0,
        }
    }

    pub fn from_settings(settings: &PricingSettings) -> Result<Self, Error> {
        Ok(Self::new(
            settings.schedule()?,
            settings.holder_discount_bps,
            settings.safety_multiplier()?,
        ))
    }

    pub fn schedule(&self) -> &PricingSchedule {
        &self.schedule
    }

    pub fn sold_position(&self) -> u128 {
        self.sold_position
    }

    /// Update the cumulative-sold position used for tier lookup
    pub fn set_sold_position(&mut self, position: u128) {
        self.sold_position = position;
    }

    pub fn with_sold_position(mut self, position: u128) -> Self {
        self.sold_position = position;
        self
    }

    pub fn active_tier(&self) -> Result<&PricingTier, Error> {
        self.schedule.tier_at(self.sold_position)
    }

    /// Multiplier applied to the undiscounted USD cost
    pub fn discount_factor(&self, holder_discount_eligible: bool) -> BigDecimal {
        if holder_discount_eligible {
            BigDecimal::from(BPS_DENOMINATOR - self.holder_discount_bps)
                / BigDecimal::from(BPS_DENOMINATOR)
        } else {
            BigDecimal::from(1)
        }
    }

    /// USD cost of `token_amount` whole tokens at the active tier
    pub fn usd_cost(&self, token_amount: u128, holder_discount_eligible: bool) -> Result<BigDecimal, Error> {
        let tier = self.active_tier()?;
        Ok(BigDecimal::from(token_amount)
            * &tier.usd_price_per_token
            * self.discount_factor(holder_discount_eligible))
    }

    /// Quote a purchase paid in `payment_token` on `chain`
    pub fn quote(
        &self,
        token_amount: u128,
        holder_discount_eligible: bool,
        payment_token: &PaymentToken,
        chain: &ChainDescriptor,
    ) -> Result<Quote, Error> {
        if token_amount == 0 {
            return Err(Error::Pricing("Token amount must be positive".to_string()));
        }
        let tier = self.active_tier()?;
        let usd_cost = self.usd_cost(token_amount, holder_discount_eligible)?;

        let payment_value = if payment_token.usd_pegged {
            usd_cost.clone()
        } else {
            if chain.native_usd_estimate <= BigDecimal::from(0) {
                return Err(Error::Pricing(format!(
                    "No USD price estimate for {} on {}",
                    payment_token.symbol, chain.display_name
                )));
            }
            &usd_cost * &self.native_safety_multiplier / &chain.native_usd_estimate
        };

        Ok(Quote {
            token_amount,
            payment_amount: decimal_to_units(&payment_value, payment_token.decimals)?,
            usd_cost,
            payment_symbol: payment_token.symbol.clone(),
            tier_label: tier.label.clone(),
            discounted: holder_discount_eligible,
        })
    }
}
