//! Exact rational arithmetic for the predicate fallback paths.
//!
//! The floating-point predicates carry explicit error envelopes; whenever a
//! query lands inside an envelope the kernel re-evaluates the predicate here,
//! over true rationals. [`ExactScalar`] wraps a big-integer rational
//! (numerator/denominator with gcd cancellation), so every finite `f64`
//! converts without loss and all sign decisions are exact and deterministic
//! across runs.
//!
//! Only predicates use these types; nothing here is performance critical.

use std::cmp::Ordering;
use std::ops::{Add, Div, Mul, Neg, Sub};

use nalgebra::Vector3;
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{Signed, ToPrimitive, Zero};

/// An exact scalar: a rational number with arbitrary-precision numerator and
/// denominator.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ExactScalar(BigRational);

impl ExactScalar {
    /// The additive identity.
    #[must_use]
    pub fn zero() -> Self {
        Self(BigRational::zero())
    }

    /// Builds the rational `numerator / denominator`.
    ///
    /// # Panics
    ///
    /// Panics if `denominator` is zero.
    #[must_use]
    pub fn ratio(numerator: i64, denominator: i64) -> Self {
        Self(BigRational::new(
            BigInt::from(numerator),
            BigInt::from(denominator),
        ))
    }

    /// Converts a finite `f64` into its exact rational value.
    ///
    /// Every finite double is a dyadic rational, so the conversion is
    /// lossless. Non-finite inputs map to zero; the kernel never feeds them
    /// in (positions are validated on entry).
    #[must_use]
    pub fn from_f64(value: f64) -> Self {
        debug_assert!(value.is_finite(), "exact arithmetic needs finite input");
        BigRational::from_float(value).map_or_else(Self::zero, Self)
    }

    /// Whether this scalar is exactly zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// The sign of this scalar: −1, 0, or +1.
    #[must_use]
    pub fn signum(&self) -> i32 {
        if self.0.is_zero() {
            0
        } else if self.0.is_positive() {
            1
        } else {
            -1
        }
    }

    /// Three-way comparison against `other`, collapsed to −1/0/+1.
    #[must_use]
    pub fn compare(&self, other: &Self) -> i32 {
        match self.0.cmp(&other.0) {
            Ordering::Less => -1,
            Ordering::Equal => 0,
            Ordering::Greater => 1,
        }
    }

    /// Nearest `f64` approximation, for diagnostics and for feeding an exact
    /// intermediate back into a float computation.
    #[must_use]
    pub fn to_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or(f64::MAX)
    }
}

impl Add for &ExactScalar {
    type Output = ExactScalar;
    fn add(self, rhs: &ExactScalar) -> ExactScalar {
        ExactScalar(&self.0 + &rhs.0)
    }
}

impl Sub for &ExactScalar {
    type Output = ExactScalar;
    fn sub(self, rhs: &ExactScalar) -> ExactScalar {
        ExactScalar(&self.0 - &rhs.0)
    }
}

impl Mul for &ExactScalar {
    type Output = ExactScalar;
    fn mul(self, rhs: &ExactScalar) -> ExactScalar {
        ExactScalar(&self.0 * &rhs.0)
    }
}

impl Div for &ExactScalar {
    type Output = ExactScalar;
    fn div(self, rhs: &ExactScalar) -> ExactScalar {
        ExactScalar(&self.0 / &rhs.0)
    }
}

impl Neg for &ExactScalar {
    type Output = ExactScalar;
    fn neg(self) -> ExactScalar {
        ExactScalar(-&self.0)
    }
}

/// A 3-vector of [`ExactScalar`]s.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExactVector(pub [ExactScalar; 3]);

impl ExactVector {
    /// Converts a floating-point position losslessly.
    #[must_use]
    pub fn from_f64(v: Vector3<f64>) -> Self {
        Self([
            ExactScalar::from_f64(v.x),
            ExactScalar::from_f64(v.y),
            ExactScalar::from_f64(v.z),
        ])
    }

    /// Component-wise sum.
    #[must_use]
    pub fn add(&self, other: &Self) -> Self {
        Self([
            &self.0[0] + &other.0[0],
            &self.0[1] + &other.0[1],
            &self.0[2] + &other.0[2],
        ])
    }

    /// Component-wise difference.
    #[must_use]
    pub fn sub(&self, other: &Self) -> Self {
        Self([
            &self.0[0] - &other.0[0],
            &self.0[1] - &other.0[1],
            &self.0[2] - &other.0[2],
        ])
    }

    /// Scales every component by `factor`.
    #[must_use]
    pub fn scale(&self, factor: &ExactScalar) -> Self {
        Self([
            &self.0[0] * factor,
            &self.0[1] * factor,
            &self.0[2] * factor,
        ])
    }

    /// Divides every component by `divisor`.
    #[must_use]
    pub fn scale_div(&self, divisor: &ExactScalar) -> Self {
        Self([
            &self.0[0] / divisor,
            &self.0[1] / divisor,
            &self.0[2] / divisor,
        ])
    }

    /// Component-wise negation.
    #[must_use]
    pub fn negate(&self) -> Self {
        Self([-&self.0[0], -&self.0[1], -&self.0[2]])
    }

    /// Exact dot product.
    #[must_use]
    pub fn dot(&self, other: &Self) -> ExactScalar {
        let mut sum = &self.0[0] * &other.0[0];
        sum = &sum + &(&self.0[1] * &other.0[1]);
        &sum + &(&self.0[2] * &other.0[2])
    }

    /// Exact cross product.
    #[must_use]
    pub fn cross(&self, other: &Self) -> Self {
        let mut out = [ExactScalar::zero(), ExactScalar::zero(), ExactScalar::zero()];
        for i in 0..3 {
            let j = (i + 1) % 3;
            let k = (i + 2) % 3;
            out[i] = &(&self.0[j] * &other.0[k]) - &(&self.0[k] * &other.0[j]);
        }
        Self(out)
    }

    /// Exact squared Euclidean length.
    #[must_use]
    pub fn squared_length(&self) -> ExactScalar {
        self.dot(self)
    }

    /// Exact determinant of the 3×3 matrix whose rows are `rows`.
    #[must_use]
    pub fn det(rows: &[Self; 3]) -> ExactScalar {
        let [a, b, c] = rows;
        let mut result = &(&a.0[0] * &b.0[1]) * &c.0[2];
        result = &result + &(&(&a.0[1] * &b.0[2]) * &c.0[0]);
        result = &result + &(&(&a.0[2] * &b.0[0]) * &c.0[1]);
        result = &result - &(&(&a.0[0] * &b.0[2]) * &c.0[1]);
        result = &result - &(&(&a.0[1] * &b.0[0]) * &c.0[2]);
        &result - &(&(&a.0[2] * &b.0[1]) * &c.0[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f64_roundtrip_is_lossless() {
        for v in [0.0, 1.0, -2.5, 0.1, 1e-30, 1234.5678, f64::MIN_POSITIVE] {
            assert_eq!(ExactScalar::from_f64(v).to_f64(), v);
        }
    }

    #[test]
    fn sums_that_cancel_in_floats_stay_exact() {
        // 0.1 + 0.2 - 0.3 != 0.0 in f64, but each addend converts exactly,
        // so the rational result is the exact dyadic value, reproducibly.
        let a = ExactScalar::from_f64(0.1);
        let b = ExactScalar::from_f64(0.2);
        let c = ExactScalar::from_f64(0.3);
        let r = &(&a + &b) - &c;
        assert!(!r.is_zero());
        assert_eq!(r.signum(), ((0.1f64 + 0.2) - 0.3).signum() as i32);

        // Whereas a genuinely zero expression is exactly zero: 0.1 and 0.2
        // happen to share the same 53-bit significand, so 2·(0.1f64)
        // equals 0.2f64 exactly.
        let z = &(&a + &a) - &b;
        assert!(z.is_zero());
    }

    #[test]
    fn ratio_arithmetic() {
        let half = ExactScalar::ratio(1, 2);
        let third = ExactScalar::ratio(1, 3);
        let sum = &half + &third;
        assert_eq!(sum.compare(&ExactScalar::ratio(5, 6)), 0);
        assert_eq!((&half - &half).signum(), 0);
        assert_eq!((&half / &third).compare(&ExactScalar::ratio(3, 2)), 0);
        assert_eq!((-&half).signum(), -1);
    }

    #[test]
    fn vector_det_and_cross() {
        let x = ExactVector::from_f64(Vector3::new(1.0, 0.0, 0.0));
        let y = ExactVector::from_f64(Vector3::new(0.0, 1.0, 0.0));
        let z = ExactVector::from_f64(Vector3::new(0.0, 0.0, 1.0));
        assert_eq!(
            ExactVector::det(&[x.clone(), y.clone(), z.clone()]).compare(&ExactScalar::ratio(1, 1)),
            0
        );
        assert_eq!(x.cross(&y), z);
        assert_eq!(x.dot(&y).signum(), 0);
        assert_eq!(
            x.add(&y).squared_length().compare(&ExactScalar::ratio(2, 1)),
            0
        );
    }

    #[test]
    fn coplanar_rows_have_zero_det() {
        let a = ExactVector::from_f64(Vector3::new(1.0, 2.0, 3.0));
        let b = ExactVector::from_f64(Vector3::new(2.0, 4.0, 6.0));
        let c = ExactVector::from_f64(Vector3::new(-1.0, 0.5, 7.25));
        assert!(ExactVector::det(&[a, b, c]).is_zero());
    }
}
