//! Capability probes, which decide once per process whether a backend can be used at all.

use std::panic::{catch_unwind, AssertUnwindSafe};

use lazy_static::lazy_static;
use log::{debug, warn};

use crate::Error;

/// Whether a backend is usable in the current process
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Support {
    Supported,
    Unsupported,
}

impl Support {
    /// Run the given `test`. Any error, panic, or `false` result means [`Support::Unsupported`].
    pub fn probe<F>(name: &'static str, test: F) -> Self
    where
        F: FnOnce() -> Result<bool, Error>,
    {
        match catch_unwind(AssertUnwindSafe(test)) {
            Ok(Ok(true)) => Self::Supported,
            Ok(Ok(false)) => {
                debug!("{name} probe returned an unexpected result");
                Self::Unsupported
            }
            Ok(Err(cause)) => {
                debug!("{name} probe failed: {cause}");
                Self::Unsupported
            }
            Err(_) => {
                warn!("{name} probe panicked");
                Self::Unsupported
            }
        }
    }

    pub fn is_supported(&self) -> bool {
        *self == Self::Supported
    }
}

lazy_static! {
    static ref RAW_SUPPORT: Support = Support::probe("raw memory", raw_access);
    static ref BULK_SUPPORT: Support = Support::probe("bulk device", crate::bulk::self_test);
}

/// Return whether raw pointer access to host memory is permitted.
pub fn raw() -> Support {
    *RAW_SUPPORT
}

/// Return whether the bulk device is usable.
pub fn bulk() -> Support {
    *BULK_SUPPORT
}

fn raw_access() -> Result<bool, Error> {
    let mut data = [0i64; 1];
    let ptr = data.as_mut_ptr();

    // SAFETY: `ptr` points to the single element of `data`, which outlives this block
    unsafe {
        ptr.write_volatile(1);
    }

    Ok(data[0] == 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_result_is_memoized() {
        assert_eq!(raw(), raw());
        assert!(raw().is_supported());
        assert!(bulk().is_supported());
    }

    #[test]
    fn test_probe_failures() {
        assert_eq!(Support::probe("false", || Ok(false)), Support::Unsupported);

        let error = || Err(Error::Unsupported("no device".to_string()));
        assert_eq!(Support::probe("error", error), Support::Unsupported);

        let panic = || -> Result<bool, Error> { panic!("trap") };
        assert_eq!(Support::probe("panic", panic), Support::Unsupported);
    }
}
