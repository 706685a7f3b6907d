//! Aggregate sale progress from the canonical chain
//!
//! Sales on every chain funnel into one `totalTokensSold` counter. The figure
//! shown never drops below the configured marketing floor; the raw on-chain
//! value is reported alongside it.

use crate::config::chains::ChainRegistry;
use crate::config::ProgressSettings;
use crate::error::Error;
use crate::evm::client::ChainReader;
use crate::evm::codec;
use crate::evm::types::utils::units_to_decimal;
use crate::evm::types::SALE_TOKEN_DECIMALS;
use alloy_primitives::U256;
use bigdecimal::BigDecimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaleProgress {
    /// Displayed sold amount: `max(actual_sold, floor)`, whole tokens
    pub sold: BigDecimal,
    /// On-chain counter, whole tokens
    pub actual_sold: BigDecimal,
    pub target: BigDecimal,
    /// Percentage of target, capped at 100, two decimal places
    pub percent_of_target: BigDecimal,
}

impl SaleProgress {
    pub fn from_counts(actual_sold: BigDecimal, floor: BigDecimal, target: BigDecimal) -> Self {
        let sold = if actual_sold > floor {
            actual_sold.clone()
        } else {
            floor
        };
        let hundred = BigDecimal::from(100);
        let percent = if target > BigDecimal::from(0) {
            (&sold * &hundred / &target).min(hundred).with_scale(2)
        } else {
            BigDecimal::from(0).with_scale(2)
        };
        Self {
            sold,
            actual_sold,
            target,
            percent_of_target: percent,
        }
    }

    pub fn floor_applied(&self) -> bool {
        self.sold > self.actual_sold
    }
}

pub struct SaleProgressMonitor {
    reader: Arc<dyn ChainReader>,
    registry: Arc<ChainRegistry>,
    settings: ProgressSettings,
}

impl SaleProgressMonitor {
    /// `reader` must point at the canonical chain
    pub fn new(reader: Arc<dyn ChainReader>, registry: Arc<ChainRegistry>, settings: ProgressSettings) -> Self {
        Self {
            reader,
            registry,
            settings,
        }
    }

    /// Raw `totalTokensSold` counter in sale-token base units
    pub async fn fetch_actual_sold(&self) -> Result<U256, Error> {
        let chain_id = self.reader.chain_id();
        let presale = self.registry.get(chain_id)?.presale_contract_address;
        let raw = self
            .reader
            .call(presale, codec::encode_total_tokens_sold())
            .await?;
        codec::decode_uint256(&raw)
    }

    /// Whole tokens sold so far, the position tier lookup runs against
    pub async fn fetch_sold_position(&self) -> Result<u128, Error> {
        let raw = self.fetch_actual_sold().await?;
        let whole = raw / U256::from(10u64).pow(U256::from(SALE_TOKEN_DECIMALS));
        u128::try_from(whole)
            .map_err(|_| Error::Pricing(format!("Sold counter out of range: {}", whole)))
    }

    pub async fn fetch_progress(&self) -> Result<SaleProgress, Error> {
        let actual = units_to_decimal(self.fetch_actual_sold().await?, SALE_TOKEN_DECIMALS);
        let progress = SaleProgress::from_counts(
            actual,
            BigDecimal::from(self.settings.marketing_floor_tokens),
            BigDecimal::from(self.settings.target_tokens),
        );
        debug!(
            chain_id = self.reader.chain_id(),
            sold = %progress.sold,
            actual = %progress.actual_sold,
            percent = %progress.percent_of_target,
            "Sale progress"
        );
        Ok(progress)
    }
}
