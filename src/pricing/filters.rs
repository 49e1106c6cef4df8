//! Venue lot-size filters and order quantity quantization.
//!
//! Every exchange constrains order sizes to a quantization grid
//! (`step_size`) between a minimum and maximum quantity. Quantities are
//! always rounded DOWN to the grid; an order that cannot be expressed on
//! the grid inside the bounds is rejected before it reaches the venue.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpotterError};

/// Tolerance for the exact-multiple check after rounding.
pub const STEP_EPSILON: f64 = 1e-5;

/// Per-pair legal order-size bounds, fetched from the venue's listing
/// endpoint and cached as an immutable snapshot per exchange.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LotSizeFilter {
    pub min_qty: f64,
    pub max_qty: f64,
    pub step_size: f64,
}

impl LotSizeFilter {
    pub fn new(min_qty: f64, max_qty: f64, step_size: f64) -> Self {
        Self {
            min_qty,
            max_qty,
            step_size,
        }
    }

    /// Number of decimal places implied by the step size (0.001 -> 3).
    fn decimals(&self) -> Option<i32> {
        if !(self.step_size > 0.0) {
            return None;
        }
        let mut step = self.step_size;
        let mut decimals = 0;
        // 0.999.. guard absorbs representation drift for steps like 0.001
        while step < 0.999_999 {
            step *= 10.0;
            decimals += 1;
        }
        Some(decimals)
    }
}

/// Centered remainder of `x` against `step`: zero (within float noise) iff
/// `x` sits on the quantization grid.
fn step_remainder(x: f64, step: f64) -> f64 {
    let n = (x / step).round();
    x - n * step
}

/// Round `qty` down to the venue's quantization grid and validate it
/// against the filter bounds.
///
/// Returns the rounded quantity, or `QuantityRejected` carrying both the
/// requested and the rounded value when the result falls outside
/// `[min_qty, max_qty]` or off the grid. Callers must not submit an order
/// from a rejected quantity.
pub fn round_to_step(qty: f64, filter: &LotSizeFilter) -> Result<f64> {
    let decimals = filter.decimals().ok_or_else(|| {
        SpotterError::Internal(format!("invalid step size {}", filter.step_size))
    })?;

    let factor = 10f64.powi(decimals);
    let rounded = (qty * factor).floor() / factor;

    if rounded < filter.min_qty || rounded > filter.max_qty {
        return Err(SpotterError::QuantityRejected {
            requested: qty,
            rounded,
        });
    }
    if step_remainder(rounded, filter.step_size).abs() > STEP_EPSILON {
        return Err(SpotterError::QuantityRejected {
            requested: qty,
            rounded,
        });
    }

    Ok(rounded)
}
