use crate::CType;

use super::{
    BinaryConvOp, BinaryOp, Capabilities, Capability, NullaryOp, Operator, UnaryConvOp, UnaryOp,
};

macro_rules! operator {
    ($name:ident, $label:expr, [$($cap:ident),*]) => {
        #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
        pub struct $name;

        impl Operator for $name {
            const NAME: &'static str = $label;
            const CAPABILITIES: Capabilities = Capabilities::of(&[$(Capability::$cap),*]);
        }
    };
}

macro_rules! binary {
    ($name:ident, $label:expr, $cap:ident, $call:expr) => {
        operator!($name, $label, [Scalar, Math, $cap]);

        impl<T: CType> BinaryOp<T> for $name {
            #[inline]
            fn call(&self, left: T, right: T) -> T {
                ($call)(left, right)
            }
        }
    };
}

macro_rules! unary {
    ($name:ident, $label:expr, $cap:ident, $call:expr) => {
        operator!($name, $label, [Scalar, Math, $cap]);

        impl<T: CType> UnaryOp<T> for $name {
            #[inline]
            fn call(&self, value: T) -> T {
                ($call)(value)
            }
        }
    };
}

binary!(Add, "add", Add, T::add);
binary!(Sub, "sub", Sub, T::sub);
binary!(Mul, "mul", Mul, T::mul);
binary!(Div, "div", Div, T::div);
binary!(Mod, "mod", Mod, T::rem);
binary!(Max, "max", Max, T::max);
binary!(Min, "min", Min, T::min);

unary!(Abs, "abs", Abs, T::abs);
unary!(Floor, "floor", Floor, T::floor);
unary!(Ceil, "ceil", Ceil, T::ceil);
unary!(Round, "round", Round, T::round);
unary!(Sqrt, "sqrt", Sqrt, T::sqrt);
unary!(Neg, "neg", Neg, T::neg);

operator!(Assign, "assign", [Scalar, Copy]);

impl<T: CType> UnaryOp<T> for Assign {
    #[inline]
    fn call(&self, value: T) -> T {
        value
    }
}

operator!(Equal, "eq", [Scalar, Compare]);
operator!(Less, "lt", [Scalar, Compare]);
operator!(Greater, "gt", [Scalar, Compare]);

impl<T: CType> BinaryConvOp<T, u8> for Equal {
    #[inline]
    fn call(&self, left: T, right: T) -> u8 {
        (left == right) as u8
    }
}

impl<T: CType> BinaryConvOp<T, u8> for Less {
    #[inline]
    fn call(&self, left: T, right: T) -> u8 {
        (left < right) as u8
    }
}

impl<T: CType> BinaryConvOp<T, u8> for Greater {
    #[inline]
    fn call(&self, left: T, right: T) -> u8 {
        (left > right) as u8
    }
}

operator!(Cast, "cast", [Scalar, Convert]);

impl<IT: CType, OT: CType> UnaryConvOp<IT, OT> for Cast {
    #[inline]
    fn call(&self, value: IT) -> OT {
        OT::from_f64(value.to_f64())
    }
}

operator!(Zero, "zero", [Scalar]);
operator!(One, "one", [Scalar]);

impl<T: CType> NullaryOp<T> for Zero {
    #[inline]
    fn call(&self) -> T {
        T::ZERO
    }
}

impl<T: CType> NullaryOp<T> for One {
    #[inline]
    fn call(&self) -> T {
        T::ONE
    }
}

// not a pure function of its (empty) arguments, so never a candidate for a scalar loop
operator!(RandomUniform, "random_uniform", [Random]);

/// Samples each element with [`CType::random`]
impl<T: CType> NullaryOp<T> for RandomUniform {
    fn call(&self) -> T {
        T::random()
    }
}
