//! A pluggable execution engine for n-dimensional array operators.
//!
//! Every array operation is offered to an ordered chain of backends. Each backend either
//! performs the operation with one of its registered kernels or declines it, in which case
//! the next backend is tried. The chain always ends with the [`host`] engine, which never
//! declines.

use std::fmt;

use smallvec::SmallVec;

pub use access::{Accessor, HostAccessor, Representation};
pub use array::{Array, Engine, NDArray};
pub use bulk::{Bulk, BulkDevice, BulkFactory, DeviceAccessor, DeviceArray, DeviceStats};
pub use config::{Config, ENV_BACKENDS};
pub use factory::AccessorFactory;
pub use host::Host;
pub use ops::*;
pub use platform::{BackendId, Chain, ChainBuilder, Platform};
pub use probe::Support;
pub use raw::Raw;
pub use registry::{CallShape, KernelBinding, KernelTable, Registry};

mod access;
mod array;
pub mod bulk;
mod config;
mod factory;
pub mod host;
mod ops;
mod platform;
pub mod probe;
pub mod raw;
mod registry;

/// The shape of an n-dimensional array
pub type Shape = SmallVec<[usize; 8]>;

/// Construct a [`Shape`] from a list of dimensions.
#[macro_export]
macro_rules! shape {
    ($($dim:expr),* $(,)?) => {
        $crate::Shape::from_slice(&[$($dim),*])
    };
}

/// An element type tag
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl DType {
    /// Every element type this crate supports.
    pub const ALL: [DType; 10] = [
        Self::U8,
        Self::U16,
        Self::U32,
        Self::U64,
        Self::I8,
        Self::I16,
        Self::I32,
        Self::I64,
        Self::F32,
        Self::F64,
    ];

    pub fn is_float(&self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        })
    }
}

/// A primitive element type which can be stored in an [`Array`].
///
/// Integer arithmetic wraps on overflow, and integer division or remainder by zero is zero,
/// so that every scalar operator is total.
pub trait CType:
    Copy + Default + PartialEq + PartialOrd + Send + Sync + fmt::Debug + fmt::Display + 'static
{
    const TYPE: DType;

    const ZERO: Self;

    const ONE: Self;

    const MIN: Self;

    const MAX: Self;

    fn add(self, other: Self) -> Self;

    fn sub(self, other: Self) -> Self;

    fn mul(self, other: Self) -> Self;

    fn div(self, other: Self) -> Self;

    fn rem(self, other: Self) -> Self;

    fn max(self, other: Self) -> Self;

    fn min(self, other: Self) -> Self;

    fn abs(self) -> Self;

    fn neg(self) -> Self;

    fn floor(self) -> Self;

    fn ceil(self) -> Self;

    /// Round to the nearest integer, with ties rounding to even.
    fn round(self) -> Self;

    fn sqrt(self) -> Self;

    /// Sample a uniformly distributed value: in `[0, 1)` for floats, and over the whole range
    /// of the type for integers.
    fn random() -> Self;

    fn from_f64(value: f64) -> Self;

    fn to_f64(self) -> f64;
}

macro_rules! c_type_int {
    ($t:ty, $dtype:expr, $abs:expr) => {
        impl CType for $t {
            const TYPE: DType = $dtype;
            const ZERO: Self = 0;
            const ONE: Self = 1;
            const MIN: Self = <$t>::MIN;
            const MAX: Self = <$t>::MAX;

            fn add(self, other: Self) -> Self {
                self.wrapping_add(other)
            }

            fn sub(self, other: Self) -> Self {
                self.wrapping_sub(other)
            }

            fn mul(self, other: Self) -> Self {
                self.wrapping_mul(other)
            }

            fn div(self, other: Self) -> Self {
                self.checked_div(other).unwrap_or(0)
            }

            fn rem(self, other: Self) -> Self {
                self.checked_rem(other).unwrap_or(0)
            }

            fn max(self, other: Self) -> Self {
                Ord::max(self, other)
            }

            fn min(self, other: Self) -> Self {
                Ord::min(self, other)
            }

            fn abs(self) -> Self {
                ($abs)(self)
            }

            fn neg(self) -> Self {
                self.wrapping_neg()
            }

            fn floor(self) -> Self {
                self
            }

            fn ceil(self) -> Self {
                self
            }

            fn round(self) -> Self {
                self
            }

            fn sqrt(self) -> Self {
                Self::from_f64(self.to_f64().sqrt())
            }

            fn random() -> Self {
                rand::random()
            }

            fn from_f64(value: f64) -> Self {
                value as $t
            }

            fn to_f64(self) -> f64 {
                self as f64
            }
        }
    };
}

c_type_int!(u8, DType::U8, |n| n);
c_type_int!(u16, DType::U16, |n| n);
c_type_int!(u32, DType::U32, |n| n);
c_type_int!(u64, DType::U64, |n| n);
c_type_int!(i8, DType::I8, i8::wrapping_abs);
c_type_int!(i16, DType::I16, i16::wrapping_abs);
c_type_int!(i32, DType::I32, i32::wrapping_abs);
c_type_int!(i64, DType::I64, i64::wrapping_abs);

macro_rules! c_type_float {
    ($t:ty, $dtype:expr) => {
        impl CType for $t {
            const TYPE: DType = $dtype;
            const ZERO: Self = 0.;
            const ONE: Self = 1.;
            const MIN: Self = <$t>::MIN;
            const MAX: Self = <$t>::MAX;

            fn add(self, other: Self) -> Self {
                self + other
            }

            fn sub(self, other: Self) -> Self {
                self - other
            }

            fn mul(self, other: Self) -> Self {
                self * other
            }

            fn div(self, other: Self) -> Self {
                self / other
            }

            fn rem(self, other: Self) -> Self {
                self % other
            }

            fn max(self, other: Self) -> Self {
                <$t>::max(self, other)
            }

            fn min(self, other: Self) -> Self {
                <$t>::min(self, other)
            }

            fn abs(self) -> Self {
                <$t>::abs(self)
            }

            fn neg(self) -> Self {
                -self
            }

            fn floor(self) -> Self {
                <$t>::floor(self)
            }

            fn ceil(self) -> Self {
                <$t>::ceil(self)
            }

            fn round(self) -> Self {
                <$t>::round_ties_even(self)
            }

            fn sqrt(self) -> Self {
                <$t>::sqrt(self)
            }

            fn random() -> Self {
                rand::random()
            }

            fn from_f64(value: f64) -> Self {
                value as $t
            }

            fn to_f64(self) -> f64 {
                self as f64
            }
        }
    };
}

c_type_float!(f32, DType::F32);
c_type_float!(f64, DType::F64);

/// An array math error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Bounds(String),
    #[error("{0}")]
    Interface(String),
    #[error("{backend} kernel for {op} failed: {cause}")]
    Kernel {
        backend: BackendId,
        op: &'static str,
        cause: Box<Error>,
    },
    #[error("{0}")]
    Unsupported(String),
}

impl Error {
    pub(crate) fn kernel(backend: BackendId, op: &'static str, cause: Error) -> Self {
        Self::Kernel {
            backend,
            op,
            cause: Box::new(cause),
        }
    }
}

/// Compute the row-major strides of the given `shape`.
pub fn strides_for(shape: &[usize]) -> SmallVec<[usize; 8]> {
    let mut strides = SmallVec::with_capacity(shape.len());
    let mut stride = 1;

    for dim in shape.iter().rev() {
        strides.push(stride);
        stride *= dim;
    }

    strides.reverse();
    strides
}

/// Split `shape` around `axis` into `[outer, axis_len, inner]` element counts.
pub fn reduce_dims(shape: &[usize], axis: usize) -> Result<[usize; 3], Error> {
    if axis < shape.len() {
        let outer = shape[..axis].iter().product();
        let inner = shape[(axis + 1)..].iter().product();
        Ok([outer, shape[axis], inner])
    } else {
        Err(Error::Bounds(format!(
            "invalid axis {axis} for an array with shape {shape:?}"
        )))
    }
}

/// Return the matrix dimensions `[m, k, n]` of `left` (m x k) times `right` (k x n).
pub fn matmul_dims(left: &[usize], right: &[usize]) -> Result<[usize; 3], Error> {
    match (left, right) {
        ([m, k], [k2, n]) if k == k2 => Ok([*m, *k, *n]),
        _ => Err(Error::Bounds(format!(
            "cannot multiply a matrix with shape {left:?} by one with shape {right:?}"
        ))),
    }
}

#[inline]
pub(crate) fn same_shape(
    op_name: &'static str,
    left: &[usize],
    right: &[usize],
) -> Result<(), Error> {
    if left == right {
        Ok(())
    } else {
        Err(Error::Bounds(format!(
            "cannot {op_name} arrays with different shapes {left:?} and {right:?}"
        )))
    }
}
