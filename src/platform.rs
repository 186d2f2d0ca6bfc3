//! Backend identity and the ordered handler chain.

use std::fmt;
use std::str::FromStr;

use log::{debug, info};

use crate::access::Accessor;
use crate::bulk::Bulk;
use crate::host::Host;
use crate::ops::{BinaryConvOp, BinaryOp, NullaryOp, Operator, UnaryConvOp, UnaryOp};
use crate::probe::Support;
use crate::raw::Raw;
use crate::{CType, Error};

/// Identifies an execution backend
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum BackendId {
    Host,
    Raw,
    Bulk,
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Host => "host",
            Self::Raw => "raw",
            Self::Bulk => "bulk",
        })
    }
}

impl FromStr for BackendId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "host" => Ok(Self::Host),
            "raw" => Ok(Self::Raw),
            "bulk" => Ok(Self::Bulk),
            other => Err(Error::Interface(format!("unknown backend: {other}"))),
        }
    }
}

/// An optional backend, which may decline any operation
#[derive(Clone)]
pub enum Platform {
    Raw(Raw),
    Bulk(Bulk),
}

impl Platform {
    pub fn id(&self) -> BackendId {
        match self {
            Self::Raw(_) => BackendId::Raw,
            Self::Bulk(_) => BackendId::Bulk,
        }
    }

    pub fn binary<O, T>(
        &self,
        op: O,
        left: &Accessor<T>,
        right: &Accessor<T>,
        output: &Accessor<T>,
    ) -> Result<bool, Error>
    where
        O: BinaryOp<T>,
        T: CType,
    {
        match self {
            Self::Raw(raw) => raw.binary(op, left, right, output),
            Self::Bulk(bulk) => bulk.binary(op, left, right, output),
        }
    }

    pub fn unary<O, T>(
        &self,
        op: O,
        input: &Accessor<T>,
        output: &Accessor<T>,
    ) -> Result<bool, Error>
    where
        O: UnaryOp<T>,
        T: CType,
    {
        match self {
            Self::Raw(raw) => raw.unary(op, input, output),
            Self::Bulk(bulk) => bulk.unary(op, input, output),
        }
    }

    pub fn binary_conv<O, IT, OT>(
        &self,
        op: O,
        left: &Accessor<IT>,
        right: &Accessor<IT>,
        output: &Accessor<OT>,
    ) -> Result<bool, Error>
    where
        O: BinaryConvOp<IT, OT>,
        IT: CType,
        OT: CType,
    {
        match self {
            Self::Raw(raw) => raw.binary_conv(op, left, right, output),
            Self::Bulk(bulk) => bulk.binary_conv(op, left, right, output),
        }
    }

    pub fn unary_conv<O, IT, OT>(
        &self,
        op: O,
        input: &Accessor<IT>,
        output: &Accessor<OT>,
    ) -> Result<bool, Error>
    where
        O: UnaryConvOp<IT, OT>,
        IT: CType,
        OT: CType,
    {
        match self {
            Self::Raw(raw) => raw.unary_conv(op, input, output),
            Self::Bulk(bulk) => bulk.unary_conv(op, input, output),
        }
    }

    pub fn nullary<O, T>(&self, op: O, output: &Accessor<T>) -> Result<bool, Error>
    where
        O: NullaryOp<T>,
        T: CType,
    {
        match self {
            Self::Raw(raw) => raw.nullary(op, output),
            Self::Bulk(bulk) => bulk.nullary(op, output),
        }
    }

    pub fn reduce<O, T>(
        &self,
        op: O,
        input: &Accessor<T>,
        dims: [usize; 3],
        output: &Accessor<T>,
    ) -> Result<bool, Error>
    where
        O: BinaryOp<T>,
        T: CType,
    {
        match self {
            Self::Raw(raw) => raw.reduce(op, input, dims, output),
            Self::Bulk(bulk) => bulk.reduce(op, input, dims, output),
        }
    }

    pub fn aggregate<O, T>(&self, op: O, input: &Accessor<T>) -> Result<Option<T>, Error>
    where
        O: BinaryOp<T>,
        T: CType,
    {
        match self {
            Self::Raw(raw) => raw.aggregate(op, input),
            Self::Bulk(bulk) => bulk.aggregate(op, input),
        }
    }

    pub fn matmul<A, M, T>(
        &self,
        add: A,
        mul: M,
        left: &Accessor<T>,
        right: &Accessor<T>,
        dims: [usize; 3],
        output: &Accessor<T>,
    ) -> Result<bool, Error>
    where
        A: BinaryOp<T>,
        M: BinaryOp<T>,
        T: CType,
    {
        match self {
            Self::Raw(raw) => raw.matmul(add, mul, left, right, dims, output),
            Self::Bulk(bulk) => bulk.matmul(add, mul, left, right, dims, output),
        }
    }
}

impl From<Raw> for Platform {
    fn from(raw: Raw) -> Self {
        Self::Raw(raw)
    }
}

impl From<Bulk> for Platform {
    fn from(bulk: Bulk) -> Self {
        Self::Bulk(bulk)
    }
}

/// Builds a [`Chain`], leaving out any backend which is not supported
#[derive(Default)]
pub struct ChainBuilder {
    platforms: Vec<Platform>,
}

impl ChainBuilder {
    /// Append a backend to the chain if `support` says it can be used.
    pub fn push<P: Into<Platform>>(mut self, platform: P, support: Support) -> Self {
        let platform = platform.into();

        if support.is_supported() {
            self.platforms.push(platform);
        } else {
            info!("skip the {} backend, which is not supported", platform.id());
        }

        self
    }

    pub fn build(self) -> Chain {
        let chain = Chain {
            platforms: self.platforms,
        };

        info!("built a backend chain: {:?}", chain.backends());
        chain
    }
}

/// An ordered list of backends, each of which may handle or decline an operation,
/// terminated by the [`Host`] engine, which never declines.
///
/// Each operation returns the [`BackendId`] of the backend which performed it.
#[derive(Clone, Default)]
pub struct Chain {
    platforms: Vec<Platform>,
}

impl Chain {
    pub fn builder() -> ChainBuilder {
        ChainBuilder::default()
    }

    /// The backends in this chain, in order, ending with [`BackendId::Host`].
    pub fn backends(&self) -> Vec<BackendId> {
        self.platforms
            .iter()
            .map(Platform::id)
            .chain(Some(BackendId::Host))
            .collect()
    }

    pub fn binary<O, T>(
        &self,
        op: O,
        left: &Accessor<T>,
        right: &Accessor<T>,
        output: &Accessor<T>,
    ) -> Result<BackendId, Error>
    where
        O: BinaryOp<T>,
        T: CType,
    {
        for platform in &self.platforms {
            if platform.binary(op, left, right, output)? {
                return Ok(handled::<O>(platform));
            }
        }

        Host::binary(op, left, right, output).map(|()| BackendId::Host)
    }

    pub fn unary<O, T>(
        &self,
        op: O,
        input: &Accessor<T>,
        output: &Accessor<T>,
    ) -> Result<BackendId, Error>
    where
        O: UnaryOp<T>,
        T: CType,
    {
        for platform in &self.platforms {
            if platform.unary(op, input, output)? {
                return Ok(handled::<O>(platform));
            }
        }

        Host::unary(op, input, output).map(|()| BackendId::Host)
    }

    pub fn binary_conv<O, IT, OT>(
        &self,
        op: O,
        left: &Accessor<IT>,
        right: &Accessor<IT>,
        output: &Accessor<OT>,
    ) -> Result<BackendId, Error>
    where
        O: BinaryConvOp<IT, OT>,
        IT: CType,
        OT: CType,
    {
        for platform in &self.platforms {
            if platform.binary_conv(op, left, right, output)? {
                return Ok(handled::<O>(platform));
            }
        }

        Host::binary_conv(op, left, right, output).map(|()| BackendId::Host)
    }

    pub fn unary_conv<O, IT, OT>(
        &self,
        op: O,
        input: &Accessor<IT>,
        output: &Accessor<OT>,
    ) -> Result<BackendId, Error>
    where
        O: UnaryConvOp<IT, OT>,
        IT: CType,
        OT: CType,
    {
        for platform in &self.platforms {
            if platform.unary_conv(op, input, output)? {
                return Ok(handled::<O>(platform));
            }
        }

        Host::unary_conv(op, input, output).map(|()| BackendId::Host)
    }

    pub fn nullary<O, T>(&self, op: O, output: &Accessor<T>) -> Result<BackendId, Error>
    where
        O: NullaryOp<T>,
        T: CType,
    {
        for platform in &self.platforms {
            if platform.nullary(op, output)? {
                return Ok(handled::<O>(platform));
            }
        }

        Host::nullary(op, output).map(|()| BackendId::Host)
    }

    pub fn reduce<O, T>(
        &self,
        op: O,
        input: &Accessor<T>,
        dims: [usize; 3],
        output: &Accessor<T>,
    ) -> Result<BackendId, Error>
    where
        O: BinaryOp<T>,
        T: CType,
    {
        for platform in &self.platforms {
            if platform.reduce(op, input, dims, output)? {
                return Ok(handled::<O>(platform));
            }
        }

        Host::reduce(op, input, dims, output).map(|()| BackendId::Host)
    }

    pub fn aggregate<O, T>(&self, op: O, input: &Accessor<T>) -> Result<(BackendId, T), Error>
    where
        O: BinaryOp<T>,
        T: CType,
    {
        for platform in &self.platforms {
            if let Some(result) = platform.aggregate(op, input)? {
                return Ok((handled::<O>(platform), result));
            }
        }

        Host::aggregate(op, input).map(|result| (BackendId::Host, result))
    }

    pub fn matmul<A, M, T>(
        &self,
        add: A,
        mul: M,
        left: &Accessor<T>,
        right: &Accessor<T>,
        dims: [usize; 3],
        output: &Accessor<T>,
    ) -> Result<BackendId, Error>
    where
        A: BinaryOp<T>,
        M: BinaryOp<T>,
        T: CType,
    {
        for platform in &self.platforms {
            if platform.matmul(add, mul, left, right, dims, output)? {
                return Ok(handled::<A>(platform));
            }
        }

        Host::matmul(add, mul, left, right, dims, output).map(|()| BackendId::Host)
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.backends()).finish()
    }
}

#[inline]
fn handled<O: Operator>(platform: &Platform) -> BackendId {
    let id = platform.id();
    debug!("{id} backend handled {}", O::NAME);
    id
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::registry::Registry;

    #[test]
    fn test_backend_id() -> Result<(), Error> {
        for id in [BackendId::Host, BackendId::Raw, BackendId::Bulk] {
            assert_eq!(id.to_string().parse::<BackendId>()?, id);
        }

        assert_eq!(" Bulk ".parse::<BackendId>()?, BackendId::Bulk);
        assert!("gpu".parse::<BackendId>().is_err());
        Ok(())
    }

    #[test]
    fn test_unsupported_backend_is_skipped() {
        let registry = Arc::new(Registry::standard());

        let chain = Chain::builder()
            .push(Raw::new(registry.clone()), Support::Unsupported)
            .push(Raw::new(registry), Support::Supported)
            .build();

        assert_eq!(chain.backends(), [BackendId::Raw, BackendId::Host]);
        assert_eq!(Chain::default().backends(), [BackendId::Host]);
    }
}
