use std::fmt;
use std::str::FromStr;

use crate::{BackendId, Error};

/// The environment variable read by [`Config::from_env`]
pub const ENV_BACKENDS: &str = "HA_BRIDGE_BACKENDS";

/// The optional backends an [`crate::Engine`] should try, in order.
///
/// The host engine is not listed here: it always ends the chain.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    backends: Vec<BackendId>,
}

impl Config {
    /// Construct a new configuration from an ordered list of optional backends.
    pub fn new(backends: Vec<BackendId>) -> Result<Self, Error> {
        for (i, backend) in backends.iter().enumerate() {
            if *backend == BackendId::Host {
                return Err(Error::Interface(
                    "the host backend always ends the chain and cannot be configured".to_string(),
                ));
            }

            if backends[..i].contains(backend) {
                return Err(Error::Interface(format!("duplicate backend: {backend}")));
            }
        }

        Ok(Self { backends })
    }

    /// A configuration with no optional backends.
    pub fn host_only() -> Self {
        Self { backends: vec![] }
    }

    /// Read the configuration from the `HA_BRIDGE_BACKENDS` environment variable,
    /// falling back to the default configuration if it is not set.
    pub fn from_env() -> Result<Self, Error> {
        match std::env::var(ENV_BACKENDS) {
            Ok(value) => value.parse(),
            Err(std::env::VarError::NotPresent) => Ok(Self::default()),
            Err(cause) => Err(Error::Interface(format!("invalid {ENV_BACKENDS}: {cause}"))),
        }
    }

    pub fn backends(&self) -> &[BackendId] {
        &self.backends
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backends: vec![BackendId::Bulk, BackendId::Raw],
        }
    }
}

impl FromStr for Config {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if s.is_empty() || s.eq_ignore_ascii_case("none") {
            return Ok(Self::host_only());
        }

        let backends = s
            .split(',')
            .map(BackendId::from_str)
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(backends)
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.backends.is_empty() {
            return f.write_str("none");
        }

        for (i, backend) in self.backends.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }

            fmt::Display::fmt(backend, f)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() -> Result<(), Error> {
        assert_eq!("bulk, raw".parse::<Config>()?, Config::default());
        assert_eq!("raw".parse::<Config>()?.backends(), [BackendId::Raw]);
        assert_eq!("none".parse::<Config>()?, Config::host_only());
        assert_eq!("".parse::<Config>()?, Config::host_only());

        assert!("host".parse::<Config>().is_err());
        assert!("raw,raw".parse::<Config>().is_err());
        assert!("gpu".parse::<Config>().is_err());

        Ok(())
    }

    #[test]
    fn test_display() -> Result<(), Error> {
        let config = Config::default();
        assert_eq!(config.to_string(), "bulk,raw");
        assert_eq!(config.to_string().parse::<Config>()?, config);
        assert_eq!(Config::host_only().to_string(), "none");
        Ok(())
    }
}
