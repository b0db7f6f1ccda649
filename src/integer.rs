use std::cmp;
use std::cmp::Ordering;
use std::fmt::{self, Debug, Display};

use num_traits::NumCast;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum IntPriv {
    /// Always non-less than zero.
    PosInt(u64),
    /// Always less than zero.
    NegInt(i64),
}

/// An integer as it appears on the wire: signed or unsigned, at its natural
/// width. Narrowing to a declared field width happens through [`Integer::to`].
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Integer {
    n: IntPriv,
}

impl Integer {
    /// Returns the integer represented as `i64` if possible, or else `None`.
    #[inline]
    pub fn as_i64(&self) -> Option<i64> {
        match self.n {
            IntPriv::PosInt(n) => NumCast::from(n),
            IntPriv::NegInt(n) => Some(n),
        }
    }

    /// Returns the integer represented as `u64` if possible, or else `None`.
    #[inline]
    pub fn as_u64(&self) -> Option<u64> {
        match self.n {
            IntPriv::PosInt(n) => Some(n),
            IntPriv::NegInt(n) => NumCast::from(n),
        }
    }

    /// Narrow to any primitive integer width, or `None` if the value does not
    /// fit.
    #[inline]
    pub fn to<T: NumCast>(&self) -> Option<T> {
        match self.n {
            IntPriv::PosInt(n) => NumCast::from(n),
            IntPriv::NegInt(n) => NumCast::from(n),
        }
    }
}

impl Default for Integer {
    fn default() -> Self {
        Self {
            n: IntPriv::PosInt(0),
        }
    }
}

impl cmp::Ord for Integer {
    fn cmp(&self, other: &Integer) -> Ordering {
        match (self.n, other.n) {
            (IntPriv::NegInt(lhs), IntPriv::NegInt(ref rhs)) => lhs.cmp(rhs),
            (IntPriv::NegInt(_), IntPriv::PosInt(_)) => Ordering::Less,
            (IntPriv::PosInt(_), IntPriv::NegInt(_)) => Ordering::Greater,
            (IntPriv::PosInt(lhs), IntPriv::PosInt(ref rhs)) => lhs.cmp(rhs),
        }
    }
}

impl cmp::PartialOrd for Integer {
    fn partial_cmp(&self, other: &Integer) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Debug for Integer {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        Debug::fmt(&self.n, fmt)
    }
}

impl Display for Integer {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match self.n {
            IntPriv::PosInt(v) => Display::fmt(&v, fmt),
            IntPriv::NegInt(v) => Display::fmt(&v, fmt),
        }
    }
}

macro_rules! impl_from_unsigned {
    ($t: ty) => {
        impl From<$t> for Integer {
            fn from(n: $t) -> Self {
                Integer {
                    n: IntPriv::PosInt(n as u64),
                }
            }
        }
    };
}

macro_rules! impl_from_signed {
    ($t: ty) => {
        impl From<$t> for Integer {
            fn from(n: $t) -> Self {
                if n < 0 {
                    Integer {
                        n: IntPriv::NegInt(n as i64),
                    }
                } else {
                    Integer {
                        n: IntPriv::PosInt(n as u64),
                    }
                }
            }
        }
    };
}

impl_from_unsigned!(u8);
impl_from_unsigned!(u16);
impl_from_unsigned!(u32);
impl_from_unsigned!(u64);
impl_from_unsigned!(usize);
impl_from_signed!(i8);
impl_from_signed!(i16);
impl_from_signed!(i32);
impl_from_signed!(i64);
impl_from_signed!(isize);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn widths() {
        assert_eq!(Integer::from(200u64).to::<u8>(), Some(200));
        assert_eq!(Integer::from(300u64).to::<u8>(), None);
        assert_eq!(Integer::from(-1i64).to::<i8>(), Some(-1));
        assert_eq!(Integer::from(-129i64).to::<i8>(), None);
        assert_eq!(Integer::from(-1i64).to::<u64>(), None);
        assert_eq!(Integer::from(u64::MAX).to::<i64>(), None);
    }

    #[test]
    fn natural_accessors() {
        assert_eq!(Integer::from(5u8).as_u64(), Some(5));
        assert_eq!(Integer::from(-5i32).as_u64(), None);
        assert_eq!(Integer::from(-5i32).as_i64(), Some(-5));
        assert_eq!(Integer::from(u64::MAX).as_i64(), None);
    }

    #[test]
    fn ordering_spans_sign() {
        assert!(Integer::from(-1i64) < Integer::from(0u64));
        assert!(Integer::from(u64::MAX) > Integer::from(i64::MAX));
    }
}
