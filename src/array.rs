use std::fmt;
use std::sync::Arc;

use get_size::GetSize;

use crate::access::{Accessor, Representation};
use crate::bulk::{Bulk, BulkDevice, BulkFactory};
use crate::factory::AccessorFactory;
use crate::ops::{
    Add, Assign, BinaryConvOp, BinaryOp, Cast, Equal, Greater, Less, Max, Min, Mul, NullaryOp, Sub,
    UnaryConvOp, UnaryOp,
};
use crate::platform::{BackendId, Chain};
use crate::raw::Raw;
use crate::registry::Registry;
use crate::{matmul_dims, probe, reduce_dims, same_shape, strides_for, CType, Config, Error, Shape};

/// An n-dimensional array
pub trait NDArray: Send + Sync {
    /// The data type of the elements in this array
    type DType: CType;

    /// Return the number of dimensions in this array.
    fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Return the number of elements in this array.
    fn size(&self) -> usize {
        self.shape().iter().product()
    }

    /// Borrow the shape of this array.
    fn shape(&self) -> &[usize];
}

/// An n-dimensional array backed by one [`Accessor`]
pub struct Array<T> {
    shape: Shape,
    accessor: Accessor<T>,
}

impl<T: CType> Array<T> {
    /// Construct a new array with the given `shape` from an `accessor` of the same size.
    pub fn new(accessor: Accessor<T>, shape: Shape) -> Result<Self, Error> {
        if !shape.is_empty() && shape.iter().product::<usize>() == accessor.size() {
            Ok(Self { shape, accessor })
        } else {
            Err(Error::Bounds(format!(
                "cannot construct an array with shape {shape:?} from a buffer of size {}",
                accessor.size()
            )))
        }
    }

    /// Borrow the storage of this array.
    pub fn accessor(&self) -> &Accessor<T> {
        &self.accessor
    }

    pub fn into_accessor(self) -> Accessor<T> {
        self.accessor
    }

    pub fn representation(&self) -> Representation {
        self.accessor.representation()
    }

    /// Return `true` if the device copy of this array is newer than its host copy.
    pub fn is_dirty(&self) -> bool {
        self.accessor.is_dirty()
    }

    /// Construct a new array which shares this array's buffer.
    pub fn share(&self) -> Self {
        Self {
            shape: self.shape.clone(),
            accessor: self.accessor.share(),
        }
    }

    /// Read the contents of this array in row-major order.
    pub fn read(&self) -> Result<Vec<T>, Error> {
        self.accessor.to_vec()
    }

    /// Read the value at one `coord` in this array.
    pub fn read_value(&self, coord: &[usize]) -> Result<T, Error> {
        let offset = self.offset_of(coord)?;
        self.accessor.read_value(offset)
    }

    /// Write the given `value` at one `coord` in this array.
    pub fn write_value_at(&self, coord: &[usize], value: T) -> Result<(), Error> {
        let offset = self.offset_of(coord)?;
        self.accessor.write_value_at(offset, value)
    }

    fn offset_of(&self, coord: &[usize]) -> Result<usize, Error> {
        if coord.len() == self.ndim() && coord.iter().zip(&self.shape).all(|(i, dim)| i < dim) {
            let strides = strides_for(&self.shape);
            Ok(coord.iter().zip(strides).map(|(i, stride)| i * stride).sum())
        } else {
            Err(Error::Bounds(format!(
                "invalid coordinate {coord:?} for an array with shape {:?}",
                self.shape
            )))
        }
    }
}

impl<T: CType> NDArray for Array<T> {
    type DType = T;

    fn shape(&self) -> &[usize] {
        &self.shape
    }
}

impl<T: CType> GetSize for Array<T> {
    fn get_heap_size(&self) -> usize {
        self.accessor.get_heap_size()
    }
}

impl<T: CType> fmt::Debug for Array<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "array of shape {:?} in a {:?}", self.shape, self.accessor)
    }
}

/// Constructs arrays and dispatches every operation on them to a [`Chain`] of backends
pub struct Engine {
    chain: Chain,
    factory: AccessorFactory,
    registry: Arc<Registry>,
}

impl Engine {
    /// Construct a new engine with the built-in kernels and the backends listed in `config`,
    /// leaving out any backend whose probe fails.
    pub fn new(config: &Config) -> Self {
        Self::with_registry(config, Arc::new(Registry::standard()), BulkDevice::new())
    }

    /// Construct a new engine configured by the `HA_BRIDGE_BACKENDS` environment variable.
    pub fn from_env() -> Result<Self, Error> {
        Config::from_env().map(|config| Self::new(&config))
    }

    /// Construct a new engine with the given kernel `registry` and bulk `device`.
    pub fn with_registry(config: &Config, registry: Arc<Registry>, device: BulkDevice) -> Self {
        let builder = config
            .backends()
            .iter()
            .fold(Chain::builder(), |builder, backend| match backend {
                BackendId::Bulk => {
                    builder.push(Bulk::new(device.clone(), registry.clone()), probe::bulk())
                }
                BackendId::Raw => builder.push(Raw::new(registry.clone()), probe::raw()),
                BackendId::Host => builder,
            });

        let chain = builder.build();

        let factory = if chain.backends().contains(&BackendId::Bulk) {
            AccessorFactory::Bulk(BulkFactory::new(device))
        } else {
            AccessorFactory::Plain
        };

        Self::with_chain(chain, factory, registry)
    }

    /// Construct a new engine from its parts.
    pub fn with_chain(chain: Chain, factory: AccessorFactory, registry: Arc<Registry>) -> Self {
        Self {
            chain,
            factory,
            registry,
        }
    }

    /// The backends this engine tries, in order.
    pub fn backends(&self) -> Vec<BackendId> {
        self.chain.backends()
    }

    pub fn factory(&self) -> &AccessorFactory {
        &self.factory
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Construct a new array with the given `shape` from a `data` buffer of the same size.
    pub fn array<T: CType>(&self, data: Vec<T>, shape: Shape) -> Result<Array<T>, Error> {
        Array::new(self.factory.wrap(data), shape)
    }

    /// Construct a new zero-filled array, allocated on first access.
    pub fn zeros<T: CType>(&self, shape: Shape) -> Result<Array<T>, Error> {
        self.alloc(shape)
    }

    /// Construct a new array filled with the given `value`.
    pub fn constant<T: CType>(&self, value: T, shape: Shape) -> Result<Array<T>, Error> {
        let size = shape.iter().product();
        self.array(vec![value; size], shape)
    }

    pub fn binary<O, T>(&self, op: O, left: &Array<T>, right: &Array<T>) -> Result<Array<T>, Error>
    where
        O: BinaryOp<T>,
        T: CType,
    {
        same_shape(O::NAME, left.shape(), right.shape())?;

        let output = self.alloc(left.shape.clone())?;
        self.chain.binary(op, &left.accessor, &right.accessor, &output.accessor)?;
        Ok(output)
    }

    /// Write the result of a binary operation to `output`, and return the backend which
    /// performed it.
    pub fn binary_into<O, T>(
        &self,
        op: O,
        left: &Array<T>,
        right: &Array<T>,
        output: &Array<T>,
    ) -> Result<BackendId, Error>
    where
        O: BinaryOp<T>,
        T: CType,
    {
        same_shape(O::NAME, left.shape(), right.shape())?;
        same_shape(O::NAME, left.shape(), output.shape())?;

        self.chain.binary(op, &left.accessor, &right.accessor, &output.accessor)
    }

    pub fn unary<O, T>(&self, op: O, input: &Array<T>) -> Result<Array<T>, Error>
    where
        O: UnaryOp<T>,
        T: CType,
    {
        let output = self.alloc(input.shape.clone())?;
        self.chain.unary(op, &input.accessor, &output.accessor)?;
        Ok(output)
    }

    pub fn unary_into<O, T>(
        &self,
        op: O,
        input: &Array<T>,
        output: &Array<T>,
    ) -> Result<BackendId, Error>
    where
        O: UnaryOp<T>,
        T: CType,
    {
        same_shape(O::NAME, input.shape(), output.shape())?;
        self.chain.unary(op, &input.accessor, &output.accessor)
    }

    /// Copy `input` into a new array which does not share its buffer.
    pub fn copy<T: CType>(&self, input: &Array<T>) -> Result<Array<T>, Error> {
        self.unary(Assign, input)
    }

    pub fn copy_into<T: CType>(
        &self,
        input: &Array<T>,
        output: &Array<T>,
    ) -> Result<BackendId, Error> {
        self.unary_into(Assign, input, output)
    }

    pub fn binary_conv<O, IT, OT>(
        &self,
        op: O,
        left: &Array<IT>,
        right: &Array<IT>,
    ) -> Result<Array<OT>, Error>
    where
        O: BinaryConvOp<IT, OT>,
        IT: CType,
        OT: CType,
    {
        same_shape(O::NAME, left.shape(), right.shape())?;

        let output = self.alloc(left.shape.clone())?;
        self.chain.binary_conv(op, &left.accessor, &right.accessor, &output.accessor)?;
        Ok(output)
    }

    pub fn binary_conv_into<O, IT, OT>(
        &self,
        op: O,
        left: &Array<IT>,
        right: &Array<IT>,
        output: &Array<OT>,
    ) -> Result<BackendId, Error>
    where
        O: BinaryConvOp<IT, OT>,
        IT: CType,
        OT: CType,
    {
        same_shape(O::NAME, left.shape(), right.shape())?;
        same_shape(O::NAME, left.shape(), output.shape())?;

        self.chain.binary_conv(op, &left.accessor, &right.accessor, &output.accessor)
    }

    pub fn unary_conv<O, IT, OT>(&self, op: O, input: &Array<IT>) -> Result<Array<OT>, Error>
    where
        O: UnaryConvOp<IT, OT>,
        IT: CType,
        OT: CType,
    {
        let output = self.alloc(input.shape.clone())?;
        self.chain.unary_conv(op, &input.accessor, &output.accessor)?;
        Ok(output)
    }

    pub fn unary_conv_into<O, IT, OT>(
        &self,
        op: O,
        input: &Array<IT>,
        output: &Array<OT>,
    ) -> Result<BackendId, Error>
    where
        O: UnaryConvOp<IT, OT>,
        IT: CType,
        OT: CType,
    {
        same_shape(O::NAME, input.shape(), output.shape())?;
        self.chain.unary_conv(op, &input.accessor, &output.accessor)
    }

    /// Cast the elements of `input` to type `OT`.
    pub fn cast<IT: CType, OT: CType>(&self, input: &Array<IT>) -> Result<Array<OT>, Error> {
        self.unary_conv(Cast, input)
    }

    /// Construct a new array by calling a nullary operator once per element.
    pub fn nullary<O, T>(&self, op: O, shape: Shape) -> Result<Array<T>, Error>
    where
        O: NullaryOp<T>,
        T: CType,
    {
        let output = self.alloc(shape)?;
        self.chain.nullary(op, &output.accessor)?;
        Ok(output)
    }

    pub fn nullary_into<O, T>(&self, op: O, output: &Array<T>) -> Result<BackendId, Error>
    where
        O: NullaryOp<T>,
        T: CType,
    {
        self.chain.nullary(op, &output.accessor)
    }

    /// Reduce the given `axis` of `input`, which is removed from the shape of the result.
    pub fn reduce<O, T>(&self, op: O, input: &Array<T>, axis: usize) -> Result<Array<T>, Error>
    where
        O: BinaryOp<T>,
        T: CType,
    {
        let dims = reduce_axis_dims(O::NAME, input.shape(), axis)?;

        let mut shape = input.shape.clone();
        shape.remove(axis);

        if shape.is_empty() {
            shape.push(1);
        }

        let output = self.alloc(shape)?;
        self.chain.reduce(op, &input.accessor, dims, &output.accessor)?;
        Ok(output)
    }

    pub fn reduce_into<O, T>(
        &self,
        op: O,
        input: &Array<T>,
        axis: usize,
        output: &Array<T>,
    ) -> Result<BackendId, Error>
    where
        O: BinaryOp<T>,
        T: CType,
    {
        let [outer, len, inner] = reduce_axis_dims(O::NAME, input.shape(), axis)?;

        if output.size() != outer * inner {
            return Err(Error::Bounds(format!(
                "cannot write the {} of axis {axis} of shape {:?} to an array with shape {:?}",
                O::NAME,
                input.shape(),
                output.shape()
            )));
        }

        self.chain.reduce(op, &input.accessor, [outer, len, inner], &output.accessor)
    }

    /// Reduce every element of `input` to a single value.
    pub fn aggregate<O, T>(&self, op: O, input: &Array<T>) -> Result<T, Error>
    where
        O: BinaryOp<T>,
        T: CType,
    {
        self.aggregate_with_backend(op, input).map(|(_, result)| result)
    }

    /// Reduce every element of `input` to a single value, and return the backend which did it.
    pub fn aggregate_with_backend<O, T>(
        &self,
        op: O,
        input: &Array<T>,
    ) -> Result<(BackendId, T), Error>
    where
        O: BinaryOp<T>,
        T: CType,
    {
        if input.size() == 0 {
            return Err(Error::Bounds(format!("cannot {} an empty array", O::NAME)));
        }

        self.chain.aggregate(op, &input.accessor)
    }

    /// Multiply the matrices `left` and `right`.
    pub fn matmul<T: CType>(&self, left: &Array<T>, right: &Array<T>) -> Result<Array<T>, Error> {
        self.matmul_with(Add, Mul, left, right)
    }

    /// Multiply the matrices `left` and `right`, combining elements with `mul`
    /// and summing with `add`.
    pub fn matmul_with<A, M, T>(
        &self,
        add: A,
        mul: M,
        left: &Array<T>,
        right: &Array<T>,
    ) -> Result<Array<T>, Error>
    where
        A: BinaryOp<T>,
        M: BinaryOp<T>,
        T: CType,
    {
        let [m, k, n] = matmul_dims(left.shape(), right.shape())?;

        let output = self.alloc(Shape::from_slice(&[m, n]))?;
        self.chain.matmul(add, mul, &left.accessor, &right.accessor, [m, k, n], &output.accessor)?;
        Ok(output)
    }

    pub fn matmul_into<T: CType>(
        &self,
        left: &Array<T>,
        right: &Array<T>,
        output: &Array<T>,
    ) -> Result<BackendId, Error> {
        self.matmul_with_into(Add, Mul, left, right, output)
    }

    /// Write the product of `left` and `right` under the given `add` and `mul` to `output`,
    /// and return the backend which performed it.
    pub fn matmul_with_into<A, M, T>(
        &self,
        add: A,
        mul: M,
        left: &Array<T>,
        right: &Array<T>,
        output: &Array<T>,
    ) -> Result<BackendId, Error>
    where
        A: BinaryOp<T>,
        M: BinaryOp<T>,
        T: CType,
    {
        let [m, k, n] = matmul_dims(left.shape(), right.shape())?;
        same_shape("matmul", &[m, n], output.shape())?;

        let dims = [m, k, n];
        self.chain
            .matmul(add, mul, &left.accessor, &right.accessor, dims, &output.accessor)
    }

    pub fn add<T: CType>(&self, left: &Array<T>, right: &Array<T>) -> Result<Array<T>, Error> {
        self.binary(Add, left, right)
    }

    pub fn sub<T: CType>(&self, left: &Array<T>, right: &Array<T>) -> Result<Array<T>, Error> {
        self.binary(Sub, left, right)
    }

    pub fn mul<T: CType>(&self, left: &Array<T>, right: &Array<T>) -> Result<Array<T>, Error> {
        self.binary(Mul, left, right)
    }

    pub fn eq<T: CType>(&self, left: &Array<T>, right: &Array<T>) -> Result<Array<u8>, Error> {
        self.binary_conv(Equal, left, right)
    }

    pub fn lt<T: CType>(&self, left: &Array<T>, right: &Array<T>) -> Result<Array<u8>, Error> {
        self.binary_conv(Less, left, right)
    }

    pub fn gt<T: CType>(&self, left: &Array<T>, right: &Array<T>) -> Result<Array<u8>, Error> {
        self.binary_conv(Greater, left, right)
    }

    pub fn sum<T: CType>(&self, input: &Array<T>) -> Result<T, Error> {
        self.aggregate(Add, input)
    }

    pub fn max<T: CType>(&self, input: &Array<T>) -> Result<T, Error> {
        self.aggregate(Max, input)
    }

    pub fn min<T: CType>(&self, input: &Array<T>) -> Result<T, Error> {
        self.aggregate(Min, input)
    }

    fn alloc<T: CType>(&self, shape: Shape) -> Result<Array<T>, Error> {
        let size = shape.iter().product();
        Array::new(self.factory.create(size), shape)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "engine with backends {:?}", self.chain)
    }
}

#[inline]
fn reduce_axis_dims(
    op_name: &'static str,
    shape: &[usize],
    axis: usize,
) -> Result<[usize; 3], Error> {
    let dims = reduce_dims(shape, axis)?;

    if dims[1] == 0 {
        Err(Error::Bounds(format!(
            "cannot {op_name} an axis of length zero"
        )))
    } else {
        Ok(dims)
    }
}
