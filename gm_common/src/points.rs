use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

//--------------------------------------      Points       -----------------------------------------------------------
/// A loyalty-point amount. Fractional points are allowed; the accrual service hands them out that way.
#[derive(Debug, Clone, Copy, Default, PartialOrd, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct Points(f64);

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as a point amount: {0}")]
pub struct PointsConversionError(String);

impl From<f64> for Points {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl FromStr for Points {
    type Err = PointsConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<f64>().map(Self).map_err(|e| PointsConversionError(format!("{s}: {e}")))
    }
}

impl PartialEq for Points {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Add for Points {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Points {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for Points {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Points {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Neg for Points {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl Sum for Points {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl Display for Points {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2} pts", self.0)
    }
}

impl Points {
    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0.0
    }

    /// Equality up to a fixed tolerance. Point amounts survive a float round-trip through the
    /// database and the wire, so exact comparison is only safe against zero.
    pub fn approx_eq(&self, other: Points) -> bool {
        (self.0 - other.0).abs() < 1e-4
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arithmetic() {
        let a = Points::from(150.5);
        let b = Points::from(200.7);
        assert!((a + b).approx_eq(Points::from(351.2)));
        assert!((b - a).approx_eq(Points::from(50.2)));
        let mut c = Points::from(100.5);
        c -= Points::from(50.2);
        assert!(c.approx_eq(Points::from(50.3)));
        assert!(!c.is_negative());
        assert!((-c).is_negative());
    }

    #[test]
    fn sums() {
        let total: Points = [10.0, 10.0, 10.0].into_iter().map(Points::from).sum();
        assert!(total.approx_eq(Points::from(30.0)));
    }

    #[test]
    fn parses() {
        let p = "12.5".parse::<Points>().unwrap();
        assert_eq!(p, Points::from(12.5));
        assert!("one hundred".parse::<Points>().is_err());
    }
}
