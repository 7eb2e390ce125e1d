//! Numeric helpers shared by the control algorithms.
//!
//! Rounding follows round-half-to-even so that values recorded by the
//! controller and values computed here agree on ties.

/// Round `value` to `digits` decimal places, ties to even.
#[must_use]
pub fn round_to(value: f64, digits: u32) -> f64 {
    if digits == 0 {
        return value.round_ties_even();
    }
    let scale = 10f64.powi(digits as i32);
    (value * scale).round_ties_even() / scale
}

/// Round to the nearest integer (ties to even) and truncate to `i64`.
#[must_use]
pub fn round_int(value: f64) -> i64 {
    value.round_ties_even() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_to_uses_bankers_rounding_on_integers() {
        assert_eq!(round_to(2.5, 0), 2.0);
        assert_eq!(round_to(3.5, 0), 4.0);
        assert_eq!(round_to(-0.5, 0), 0.0);
    }

    #[test]
    fn round_to_keeps_requested_digits() {
        assert_eq!(round_to(0.181_818, 3), 0.182);
        assert_eq!(round_to(12.345_67, 2), 12.35);
        assert_eq!(round_to(7.0, 1), 7.0);
    }

    #[test]
    fn round_int_truncates_after_rounding() {
        assert_eq!(round_int(49.6), 50);
        assert_eq!(round_int(0.5), 0);
        assert_eq!(round_int(1.5), 2);
    }
}
