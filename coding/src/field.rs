//! Arithmetic over the Goldilocks prime field.
//!
//! Elements are kept reduced in a `u64`. Products are reduced with the identities
//! 2^64 = 2^32 - 1 and 2^96 = -1 (mod P), which avoid any division. Inverses come from
//! Fermat's little theorem. This is the textbook construction used by Plonky2 and other
//! Goldilocks implementations; only the operations the coder needs are provided.

use std::ops::{Add, Mul, Sub};

/// The modulus P := 2^64 - 2^32 + 1.
///
/// This is a prime number, and we use it to form a field of this order.
pub const P: u64 = u64::wrapping_neg(1 << 32) + 1;

/// An element of the [Goldilocks field](https://xn--2-umb.com/22/goldilocks/).
///
/// Coefficients and symbols of coded fragments are elements of this field.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct F(u64);

impl std::fmt::Debug for F {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

impl F {
    /// The zero element of the field.
    ///
    /// This is the identity for addition.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// The one element of the field.
    ///
    /// This is the identity for multiplication.
    pub const fn one() -> Self {
        Self(1)
    }

    /// Interpret a `u64` as a field element, if it is already reduced.
    ///
    /// Values read off the wire must go through this, so that two encodings
    /// never map to the same element.
    pub const fn canonical(value: u64) -> Option<Self> {
        if value < P {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Return the reduced representative of this element.
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns true if this is the additive identity.
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    const fn add_inner(self, b: Self) -> Self {
        // self + b <= 2P - 2, so subtracting P at most once is enough.
        let (addition, overflow) = self.0.overflowing_add(b.0);
        let (subtraction, underflow) = addition.overflowing_sub(P);
        if overflow || !underflow {
            Self(subtraction)
        } else {
            Self(addition)
        }
    }

    const fn sub_inner(self, b: Self) -> Self {
        let (subtraction, underflow) = self.0.overflowing_sub(b.0);
        if underflow {
            Self(subtraction.wrapping_add(P))
        } else {
            Self(subtraction)
        }
    }

    const fn reduce_64(x: u64) -> Self {
        let (subtraction, underflow) = x.overflowing_sub(P);
        if underflow {
            Self(x)
        } else {
            Self(subtraction)
        }
    }

    /// Reduce a 128 bit integer into a field element.
    const fn reduce_128(x: u128) -> Self {
        // Writing x = c 2^96 + b 2^64 + a, and using 2^64 = 2^32 - 1 and
        // 2^96 = -1 (mod P), we get x = b (2^32 - 1) + (a - c) mod P.
        let a = x as u64;
        let b = ((x >> 64) & 0xFF_FF_FF_FF) as u64;
        let c = (x >> 96) as u64;
        Self(a).sub_inner(Self(c)).add_inner(Self((b << 32) - b))
    }

    const fn mul_inner(self, b: Self) -> Self {
        Self::reduce_128((self.0 as u128) * (b.0 as u128))
    }

    /// Calculate self ^ k.
    pub const fn exp(self, mut k: u64) -> Self {
        let mut acc = Self::one();
        let mut w = self;
        while k > 0 {
            if k & 1 != 0 {
                acc = acc.mul_inner(w);
            }
            w = w.mul_inner(w);
            k >>= 1;
        }
        acc
    }

    /// Calculate the multiplicative inverse of self.
    ///
    /// Returns `None` for zero.
    pub const fn inv(self) -> Option<Self> {
        if self.is_zero() {
            return None;
        }
        // Fermat: x^(P - 1) = 1, so x^(P - 2) = x^-1.
        Some(self.exp(P - 2))
    }
}

impl Add for F {
    type Output = Self;

    fn add(self, b: Self) -> Self::Output {
        self.add_inner(b)
    }
}

impl Sub for F {
    type Output = Self;

    fn sub(self, b: Self) -> Self::Output {
        self.sub_inner(b)
    }
}

impl Mul for F {
    type Output = Self;

    fn mul(self, b: Self) -> Self::Output {
        Self::mul_inner(self, b)
    }
}

impl From<u64> for F {
    fn from(value: u64) -> Self {
        Self::reduce_64(value)
    }
}
