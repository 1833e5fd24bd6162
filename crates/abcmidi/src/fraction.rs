//! Rational durations and timestamps.
//!
//! All musical time in this crate is measured in fractions of a whole note.
//! Keeping it rational means voices that advance by thirds, dotted values or
//! odd unit lengths never drift apart through float rounding.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul};

use serde::{Deserialize, Serialize};

/// A rational number `num / denom` with `denom != 0`.
///
/// Values produced by the arithmetic operators are always reduced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Fraction {
    pub num: i64,
    pub denom: i64,
}

impl Fraction {
    pub const ZERO: Fraction = Fraction { num: 0, denom: 1 };
    pub const WHOLE: Fraction = Fraction { num: 1, denom: 1 };

    /// Create a reduced fraction.
    ///
    /// # Panics
    ///
    /// Panics if `denom` is zero. Use [`Fraction::try_new`] for untrusted input.
    pub fn new(num: i64, denom: i64) -> Self {
        assert!(denom != 0, "fraction denominator must be non-zero");
        Fraction { num, denom }.reduce()
    }

    /// Create a reduced fraction, or `None` when `denom` is zero.
    pub fn try_new(num: i64, denom: i64) -> Option<Self> {
        (denom != 0).then(|| Fraction { num, denom }.reduce())
    }

    pub fn from_int(n: i64) -> Self {
        Fraction { num: n, denom: 1 }
    }

    /// Normalise so that `gcd(num, denom) == 1` and `denom > 0`.
    pub fn reduce(self) -> Self {
        let (num, denom) = self.wide();
        narrow(num, denom).unwrap_or_else(|| approximate(self.to_f64()))
    }

    pub fn to_f64(&self) -> f64 {
        self.num as f64 / self.denom as f64
    }

    pub fn is_positive(&self) -> bool {
        (self.num > 0) == (self.denom > 0) && self.num != 0
    }

    /// Exact sum, or `None` when it does not fit in `i64` terms.
    pub fn checked_add(self, rhs: Fraction) -> Option<Fraction> {
        let (a, b) = self.wide();
        let (c, d) = rhs.wide();
        let num = a.checked_mul(d)?.checked_add(c.checked_mul(b)?)?;
        narrow(num, b.checked_mul(d)?)
    }

    /// Exact product, or `None` when it does not fit in `i64` terms.
    pub fn checked_mul(self, rhs: Fraction) -> Option<Fraction> {
        let (a, b) = self.wide();
        let (c, d) = rhs.wide();
        narrow(a.checked_mul(c)?, b.checked_mul(d)?)
    }

    /// Exact quotient, or `None` on overflow or division by zero.
    pub fn checked_div_int(self, rhs: i64) -> Option<Fraction> {
        self.checked_mul(Fraction::try_new(1, rhs)?)
    }

    /// Convert a whole-note position into MIDI ticks.
    ///
    /// The factor of 4 turns whole notes into quarter notes, which is what
    /// `ticks_per_quarter` is expressed in. Rounds to the nearest tick.
    pub fn to_ticks(&self, ticks_per_quarter: u16) -> u64 {
        let (num, denom) = self.wide();
        if num <= 0 {
            return 0;
        }
        let scaled = num * 4 * ticks_per_quarter as i128;
        let ticks = (2 * scaled + denom) / (2 * denom);
        u64::try_from(ticks).unwrap_or(u64::MAX)
    }

    /// Numerator and denominator widened, with the sign carried by the numerator
    fn wide(self) -> (i128, i128) {
        let (num, denom) = (self.num as i128, self.denom as i128);
        if denom < 0 {
            (-num, -denom)
        } else {
            (num, denom)
        }
    }
}

impl Default for Fraction {
    fn default() -> Self {
        Fraction::ZERO
    }
}

fn gcd(a: i128, b: i128) -> i128 {
    let (mut a, mut b) = (a.unsigned_abs(), b.unsigned_abs());
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    i128::try_from(a).unwrap_or(1)
}

/// Reduce a wide fraction with `denom > 0` back to `i64` terms, if it fits.
fn narrow(num: i128, denom: i128) -> Option<Fraction> {
    let g = gcd(num, denom).max(1);
    Some(Fraction {
        num: i64::try_from(num / g).ok()?,
        denom: i64::try_from(denom / g).ok()?,
    })
}

/// Closest fraction with a power-of-two denominator. Values beyond `i64`
/// saturate.
fn approximate(value: f64) -> Fraction {
    const LIMIT: f64 = i64::MAX as f64;
    if !value.is_finite() || value.abs() >= LIMIT {
        let num = if value < 0.0 { -i64::MAX } else { i64::MAX };
        return Fraction { num, denom: 1 };
    }
    let mut denom: i64 = 1;
    while denom < (1 << 62) && (value * (denom as f64) * 2.0).abs() < LIMIT / 2.0 {
        denom *= 2;
    }
    let num = (value * denom as f64).round() as i64;
    narrow(num as i128, denom as i128).unwrap_or(Fraction { num, denom })
}

// The operators never panic on overflow. Results that do not fit are
// approximated; callers that need to know use the `checked_*` methods.

impl Add for Fraction {
    type Output = Fraction;

    fn add(self, rhs: Fraction) -> Fraction {
        self.checked_add(rhs)
            .unwrap_or_else(|| approximate(self.to_f64() + rhs.to_f64()))
    }
}

impl AddAssign for Fraction {
    fn add_assign(&mut self, rhs: Fraction) {
        *self = *self + rhs;
    }
}

impl Mul for Fraction {
    type Output = Fraction;

    fn mul(self, rhs: Fraction) -> Fraction {
        self.checked_mul(rhs)
            .unwrap_or_else(|| approximate(self.to_f64() * rhs.to_f64()))
    }
}

impl Mul<i64> for Fraction {
    type Output = Fraction;

    fn mul(self, rhs: i64) -> Fraction {
        self * Fraction::from_int(rhs)
    }
}

impl Div<i64> for Fraction {
    type Output = Fraction;

    /// # Panics
    ///
    /// Panics when dividing by zero.
    fn div(self, rhs: i64) -> Fraction {
        assert!(rhs != 0, "fraction division by zero");
        self.checked_div_int(rhs)
            .unwrap_or_else(|| approximate(self.to_f64() / rhs as f64))
    }
}

impl PartialEq for Fraction {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Fraction {}

impl PartialOrd for Fraction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Fraction {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a, b) = self.wide();
        let (c, d) = other.wide();
        (a * d).cmp(&(c * b))
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.denom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduce_normalises_sign_and_gcd() {
        let f = Fraction { num: 6, denom: -8 }.reduce();
        assert_eq!((f.num, f.denom), (-3, 4));

        let z = Fraction { num: 0, denom: -5 }.reduce();
        assert_eq!((z.num, z.denom), (0, 1));
    }

    #[test]
    fn test_try_new_rejects_zero_denominator() {
        assert!(Fraction::try_new(1, 0).is_none());
        assert_eq!(Fraction::try_new(2, 4), Some(Fraction::new(1, 2)));
    }

    #[test]
    fn test_arithmetic() {
        let eighth = Fraction::new(1, 8);
        assert_eq!(eighth + eighth, Fraction::new(1, 4));
        assert_eq!(eighth * 2, Fraction::new(1, 4));
        assert_eq!(eighth * Fraction::new(3, 2), Fraction::new(3, 16));
        assert_eq!(Fraction::new(1, 4) / 2, Fraction::new(1, 8));
    }

    #[test]
    fn test_product_matches_float_product() {
        let samples = [(1, 8), (3, 2), (-5, 7), (7, 12), (1, 1), (0, 3), (9, -4)];
        for &(an, ad) in &samples {
            for &(bn, bd) in &samples {
                let a = Fraction::new(an, ad);
                let b = Fraction::new(bn, bd);
                let product = (a * b).to_f64();
                assert!((product - a.to_f64() * b.to_f64()).abs() < 1e-12);

                let r = (a * b).reduce();
                assert!(r.denom > 0);
                assert_eq!(gcd(r.num as i128, r.denom as i128), 1);
            }
        }
    }

    #[test]
    fn test_ordering_across_denominators() {
        assert!(Fraction::new(1, 3) > Fraction::new(1, 4));
        assert!(Fraction::new(-1, 2) < Fraction::ZERO);
        assert_eq!(Fraction::new(2, 6), Fraction::new(1, 3));
        assert!(Fraction::new(i64::MAX, 1) > Fraction::new(i64::MAX - 1, 1));
        assert!(Fraction::new(1, i64::MAX) < Fraction::new(1, i64::MAX - 1));
    }

    #[test]
    fn test_checked_arithmetic_detects_overflow() {
        let a = Fraction::new(1, 1_000_000_007);
        let b = Fraction::new(1, 1_000_000_009);
        let c = Fraction::new(1, 998_244_353);
        let ab = a.checked_add(b).unwrap();
        assert_eq!(ab, Fraction::new(2_000_000_016, 1_000_000_016_000_000_063));
        assert!(ab.checked_add(c).is_none());

        // Common factors cancel before the result is narrowed
        let big = Fraction::new(1, 3 * (1 << 61));
        assert_eq!(big.checked_mul(Fraction::from_int(3)), Some(Fraction::new(1, 1 << 61)));

        let three_halves = Fraction::new(3, 2);
        let mut length = Fraction::WHOLE;
        let mut applied = 0;
        while let Some(next) = length.checked_mul(three_halves) {
            length = next;
            applied += 1;
        }
        assert_eq!(applied, 39);

        assert!(Fraction::new(1, i64::MAX).checked_div_int(2).is_none());
        assert!(Fraction::WHOLE.checked_div_int(0).is_none());
    }

    #[test]
    fn test_operators_approximate_instead_of_overflowing() {
        let a = Fraction::new(1, 1_000_000_007);
        let b = Fraction::new(1, 1_000_000_009);
        let c = Fraction::new(1, 998_244_353);
        let sum = a + b + c;
        let expected = a.to_f64() + b.to_f64() + c.to_f64();
        assert!(((sum.to_f64() - expected) / expected).abs() < 1e-9);
        assert!(sum.denom > 0);

        let huge = Fraction::from_int(i64::MAX) * 4;
        assert_eq!(huge, Fraction::from_int(i64::MAX));
        assert_eq!(Fraction::from_int(i64::MIN) * 2, Fraction::from_int(-i64::MAX));
    }

    #[test]
    fn test_to_ticks() {
        // A quarter note is exactly one quarter's worth of ticks
        assert_eq!(Fraction::new(1, 4).to_ticks(480), 480);
        assert_eq!(Fraction::new(1, 8).to_ticks(480), 240);
        assert_eq!(Fraction::new(3, 16).to_ticks(480), 360);
        assert_eq!(Fraction::WHOLE.to_ticks(96), 384);
        // Triplet eighth rounds to the nearest tick
        assert_eq!(Fraction::new(1, 12).to_ticks(100), 33);
    }
}
