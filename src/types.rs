//! Core types and numeric policy

use chrono::{DateTime, Utc};

/// Timestamp type used throughout the library
pub type Timestamp = DateTime<Utc>;

/// Price type (using f64; NaN marks a missing price)
pub type Price = f64;

/// Quantity/volume type
pub type Quantity = f64;

/// Index of an asset in the account arena and the balance index
pub type AssetSlot = usize;

/// Tolerance used for every zero-comparison on balances.
///
/// Repeated incremental updates drift, so exact equality is never used.
pub const EPSILON: f64 = 1e-9;

/// True when `value` is zero within [`EPSILON`]. NaN is never zero.
#[inline]
pub fn is_zero(value: f64) -> bool {
    value.abs() <= EPSILON
}

/// True when `value` should be reported: beyond tolerance, or NaN.
///
/// NaN must stay visible to callers, so it counts as material.
#[inline]
pub fn is_material(value: f64) -> bool {
    !is_zero(value)
}

/// Rounds `value` to the nearest integer when it is within tolerance of one.
pub fn snap_to_integer(value: f64) -> f64 {
    let rounded = value.round();
    if (value - rounded).abs() <= EPSILON * value.abs().max(1.0) {
        rounded
    } else {
        value
    }
}
