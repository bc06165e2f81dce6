//! Deployment channels
//!
//! A channel is a stage of deployment, ordered least to most stable.
//! Defaults providers and override files supply one configuration
//! fragment per channel; exactly one channel is active per process,
//! selected by `CONFSTACK_CHANNEL` (default `dev`).

use crate::error::ConfigError;
use std::fmt;

/// Environment variable selecting the active channel.
pub const CHANNEL_ENV: &str = "CONFSTACK_CHANNEL";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Channel {
    #[default]
    Dev,
    Alpha,
    Beta,
    Prod,
}

impl Channel {
    /// All channels, least to most stable.
    pub const ALL: [Channel; 4] = [Channel::Dev, Channel::Alpha, Channel::Beta, Channel::Prod];

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Dev => "dev",
            Channel::Alpha => "alpha",
            Channel::Beta => "beta",
            Channel::Prod => "prod",
        }
    }

    pub fn from_name(name: &str) -> Result<Channel, ConfigError> {
        match name {
            "dev" => Ok(Channel::Dev),
            "alpha" => Ok(Channel::Alpha),
            "beta" => Ok(Channel::Beta),
            "prod" => Ok(Channel::Prod),
            other => Err(ConfigError::InvalidChannel(other.to_string())),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
