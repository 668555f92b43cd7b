//! Two-denomination balances with arbitrary precision arithmetic

use num::{BigInt, Signed, Zero};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// A pair of independently tracked amounts: the stake-eligible principal and the
/// secondary denomination that pays fees.
///
/// Arithmetic is component-wise and never clamps; a debit that would overdraw a
/// balance shows up as a negative component, which [`Coins::is_valid`] rejects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Coins {
    pub principal: BigInt,
    pub secondary: BigInt,
}

impl Coins {
    pub fn new(principal: impl Into<BigInt>, secondary: impl Into<BigInt>) -> Self {
        Coins {
            principal: principal.into(),
            secondary: secondary.into(),
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn principal_only(amount: impl Into<BigInt>) -> Self {
        Coins::new(amount, 0)
    }

    pub fn secondary_only(amount: impl Into<BigInt>) -> Self {
        Coins::new(0, amount)
    }

    pub fn plus(&self, other: &Coins) -> Coins {
        Coins {
            principal: &self.principal + &other.principal,
            secondary: &self.secondary + &other.secondary,
        }
    }

    pub fn minus(&self, other: &Coins) -> Coins {
        Coins {
            principal: &self.principal - &other.principal,
            secondary: &self.secondary - &other.secondary,
        }
    }

    /// Both components are non-negative.
    pub fn is_valid(&self) -> bool {
        !self.principal.is_negative() && !self.secondary.is_negative()
    }

    pub fn is_zero(&self) -> bool {
        self.principal.is_zero() && self.secondary.is_zero()
    }

    /// Component-wise `self >= other`.
    pub fn is_gte(&self, other: &Coins) -> bool {
        self.principal >= other.principal && self.secondary >= other.secondary
    }

    pub fn sum<'a>(coins: impl IntoIterator<Item = &'a Coins>) -> Coins {
        coins.into_iter().fold(Coins::zero(), |acc, c| acc.plus(c))
    }
}

impl<'a> Add<&'a Coins> for &'a Coins {
    type Output = Coins;

    fn add(self, rhs: &'a Coins) -> Coins {
        self.plus(rhs)
    }
}

impl<'a> Sub<&'a Coins> for &'a Coins {
    type Output = Coins;

    fn sub(self, rhs: &'a Coins) -> Coins {
        self.minus(rhs)
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{principal: {}, secondary: {}}}", self.principal, self.secondary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_wise_arithmetic() {
        let a = Coins::new(10, 3);
        let b = Coins::new(4, 5);
        assert_eq!(&a + &b, Coins::new(14, 8));
        assert_eq!(&a - &b, Coins::new(6, -2));
    }

    #[test]
    fn test_overdraw_invalidates() {
        let balance = Coins::new(10, 3);
        assert!(balance.minus(&Coins::new(10, 3)).is_valid());
        assert!(!balance.minus(&Coins::new(0, 4)).is_valid());
        assert!(!balance.minus(&Coins::new(11, 0)).is_valid());
    }

    #[test]
    fn test_is_gte_requires_both_components() {
        let balance = Coins::new(10, 3);
        assert!(balance.is_gte(&Coins::new(10, 3)));
        assert!(!balance.is_gte(&Coins::new(1, 4)));
    }

    #[test]
    fn test_sum_beyond_u64() {
        let big = Coins::principal_only(u64::MAX);
        let total = Coins::sum([&big, &big]);
        assert_eq!(total.principal, BigInt::from(u64::MAX) * 2);
        assert!(total.secondary.is_zero());
    }
}
