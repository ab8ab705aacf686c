//! Process-global animation-speed factor.
//!
//! An externally controlled scalar that divides the nominal per-tick phase
//! increment, used for slow-motion and accessibility settings. The effect
//! core only ever reads the current value once per tick; hosts own writes.

use std::sync::atomic::{AtomicU32, Ordering};

// Bit pattern of 1.0f32, the default factor.
const DEFAULT_BITS: u32 = 0x3f80_0000;

static FACTOR_BITS: AtomicU32 = AtomicU32::new(DEFAULT_BITS);

/// The current animation-speed factor. Defaults to 1.0.
#[must_use]
pub fn animation_speed_factor() -> f32 {
    f32::from_bits(FACTOR_BITS.load(Ordering::Relaxed))
}

/// Set the animation-speed factor. Values above 1.0 slow animations down.
///
/// Non-finite or non-positive values are rejected and leave the factor
/// unchanged.
pub fn set_animation_speed_factor(factor: f32) {
    if factor.is_finite() && factor > 0.0 {
        FACTOR_BITS.store(factor.to_bits(), Ordering::Relaxed);
    } else {
        log::warn!("ignoring invalid animation speed factor {factor}");
    }
}
