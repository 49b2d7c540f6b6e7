use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Instrument metadata: tick size, contract multiplier, quantity bounds, margin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instrument {
    pub asset: String,
    #[serde(default = "default_tick_size")]
    pub tick_size: f64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default)]
    pub min_quantity: f64,
    #[serde(default)]
    pub max_quantity: Option<f64>,
    /// Quantities must be whole multiples of this step, when set.
    #[serde(default)]
    pub quantity_step: Option<f64>,
    /// Fraction of short notional that must be available as margin.
    #[serde(default = "default_short_margin_rate")]
    pub short_margin_rate: f64,
}

fn default_tick_size() -> f64 {
    0.01
}

fn default_multiplier() -> f64 {
    1.0
}

fn default_short_margin_rate() -> f64 {
    1.0
}

/// Tolerance for step alignment checks on floating-point quantities.
const STEP_TOLERANCE: f64 = 1e-9;

impl Instrument {
    /// Defaults used for assets without configured metadata.
    pub fn with_defaults(asset: impl Into<String>) -> Self {
        Self {
            asset: asset.into(),
            tick_size: default_tick_size(),
            multiplier: default_multiplier(),
            min_quantity: 0.0,
            max_quantity: None,
            quantity_step: None,
            short_margin_rate: default_short_margin_rate(),
        }
    }

    /// Validate an order quantity against the instrument's bounds and step.
    pub fn validate_quantity(&self, quantity: f64) -> Result<(), InstrumentError> {
        if !quantity.is_finite() || quantity <= 0.0 || quantity < self.min_quantity {
            return Err(InstrumentError::BelowMinimum {
                quantity,
                minimum: self.min_quantity,
            });
        }
        if let Some(max) = self.max_quantity {
            if quantity > max {
                return Err(InstrumentError::AboveMaximum {
                    quantity,
                    maximum: max,
                });
            }
        }
        if let Some(step) = self.quantity_step.filter(|s| *s > 0.0) {
            let steps = quantity / step;
            if (steps - steps.round()).abs() > STEP_TOLERANCE {
                return Err(InstrumentError::StepMisaligned { quantity, step });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum InstrumentError {
    #[error("Quantity below minimum: {quantity} < {minimum}")]
    BelowMinimum { quantity: f64, minimum: f64 },

    #[error("Quantity above maximum: {quantity} > {maximum}")]
    AboveMaximum { quantity: f64, maximum: f64 },

    #[error("Quantity not aligned to step: {quantity} is not a multiple of {step}")]
    StepMisaligned { quantity: f64, step: f64 },
}

impl InstrumentError {
    /// Short rejection reason carried on the order and in `ord.reject` events.
    pub fn reason(&self) -> &'static str {
        match self {
            InstrumentError::BelowMinimum { .. } => "Quantity below minimum",
            InstrumentError::AboveMaximum { .. } => "Quantity above maximum",
            InstrumentError::StepMisaligned { .. } => "Quantity not aligned to step",
        }
    }
}
