//! Operators and the capability tags used to match them to kernels.
//!
//! An operator is a zero-sized marker type. Its behavior on a single element is given by one
//! of the `*Op` traits below, and its semantic category is given by the [`Capabilities`] it
//! declares. Backends never match on concrete operator types, only on capabilities, so a
//! user-defined operator which declares [`Capability::Add`] is dispatched to the same bulk
//! kernel as the built-in [`Add`].

use std::fmt;

use crate::CType;

pub use elementwise::*;

mod elementwise;

/// A semantic category of operator
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Capability {
    /// A pure function of its scalar arguments, safe to apply element by element
    Scalar,
    /// Any arithmetic operator
    Math,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Max,
    Min,
    Abs,
    Floor,
    Ceil,
    Round,
    Sqrt,
    Neg,
    Copy,
    Compare,
    Convert,
    Random,
}

impl Capability {
    const ALL: [Capability; 19] = [
        Self::Scalar,
        Self::Math,
        Self::Add,
        Self::Sub,
        Self::Mul,
        Self::Div,
        Self::Mod,
        Self::Max,
        Self::Min,
        Self::Abs,
        Self::Floor,
        Self::Ceil,
        Self::Round,
        Self::Sqrt,
        Self::Neg,
        Self::Copy,
        Self::Compare,
        Self::Convert,
        Self::Random,
    ];

    #[inline]
    const fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

/// The set of [`Capability`] tags an operator satisfies
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct Capabilities {
    bits: u32,
}

impl Capabilities {
    pub const NONE: Self = Self { bits: 0 };

    /// Construct a capability set from a list of tags.
    pub const fn of(tags: &[Capability]) -> Self {
        let mut bits = 0;
        let mut i = 0;

        while i < tags.len() {
            bits |= tags[i].bit();
            i += 1;
        }

        Self { bits }
    }

    /// Return a copy of this set which also contains the given `tag`.
    pub const fn with(self, tag: Capability) -> Self {
        Self {
            bits: self.bits | tag.bit(),
        }
    }

    /// Return `true` if this set satisfies the given `tag`.
    pub const fn contains(self, tag: Capability) -> bool {
        self.bits & tag.bit() != 0
    }

    pub const fn is_empty(self) -> bool {
        self.bits == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Capability> {
        Capability::ALL
            .into_iter()
            .filter(move |tag| self.contains(*tag))
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// A stateless operator, identified for dispatch by its type alone
pub trait Operator: Copy + Default + Send + Sync + 'static {
    /// The name of this operator, used in log messages and errors
    const NAME: &'static str;

    /// The capability tags this operator satisfies
    const CAPABILITIES: Capabilities;
}

/// An operator which produces one element from nothing
pub trait NullaryOp<T: CType>: Operator {
    fn call(&self) -> T;
}

/// An operator which maps one element to another of the same type
pub trait UnaryOp<T: CType>: Operator {
    fn call(&self, value: T) -> T;
}

/// An operator which combines two elements of the same type
pub trait BinaryOp<T: CType>: Operator {
    fn call(&self, left: T, right: T) -> T;
}

/// An operator which maps one element to an element of another type
pub trait UnaryConvOp<IT: CType, OT: CType>: Operator {
    fn call(&self, value: IT) -> OT;
}

/// An operator which combines two elements into an element of another type
pub trait BinaryConvOp<IT: CType, OT: CType>: Operator {
    fn call(&self, left: IT, right: IT) -> OT;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities() {
        let caps = Capabilities::of(&[Capability::Scalar, Capability::Add]);
        assert!(caps.contains(Capability::Add));
        assert!(caps.contains(Capability::Scalar));
        assert!(!caps.contains(Capability::Math));
        assert!(caps.with(Capability::Math).contains(Capability::Math));
        assert!(Capabilities::NONE.is_empty());

        let tags = caps.iter().collect::<Vec<_>>();
        assert_eq!(tags, [Capability::Scalar, Capability::Add]);
    }

    #[test]
    fn test_builtin_capabilities() {
        assert!(Add::CAPABILITIES.contains(Capability::Add));
        assert!(Add::CAPABILITIES.contains(Capability::Math));
        assert!(!Add::CAPABILITIES.contains(Capability::Copy));
        assert!(Assign::CAPABILITIES.contains(Capability::Copy));
        assert!(!RandomUniform::CAPABILITIES.contains(Capability::Scalar));
    }
}
