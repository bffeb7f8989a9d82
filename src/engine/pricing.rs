//! Pricing - Fixed-rate output estimate and slippage floor check
//!
//! Stands in for real routing: output is the input minus a flat rate.

use rust_decimal::Decimal;

use crate::core::{Amount, Error, Result};

/// Flat-rate pricer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedRatePricer {
    slippage_rate: Decimal,
}

impl Default for FixedRatePricer {
    fn default() -> Self {
        Self {
            slippage_rate: Decimal::new(2, 2),
        }
    }
}

impl FixedRatePricer {
    /// `slippage_rate` must lie in [0, 1)
    pub fn new(slippage_rate: Decimal) -> Result<Self> {
        if slippage_rate < Decimal::ZERO || slippage_rate >= Decimal::ONE {
            return Err(Error::Config(format!("slippage rate must be in [0, 1), got {}", slippage_rate)));
        }
        Ok(Self { slippage_rate })
    }

    pub fn slippage_rate(&self) -> Decimal {
        self.slippage_rate
    }

    /// Output credited for `amount_in`
    pub fn quote(&self, amount_in: Amount) -> Amount {
        Amount::new(amount_in.as_decimal() * (Decimal::ONE - self.slippage_rate))
    }

    /// Quote and enforce the caller's floor
    pub fn check(&self, amount_in: Amount, min_amount_out: Amount) -> Result<Amount> {
        let amount_out = self.quote(amount_in);
        if amount_out < min_amount_out {
            return Err(Error::Slippage {
                amount_out,
                min_amount_out,
            });
        }
        Ok(amount_out)
    }
}
