//! Protocol identity - the stable address assigned after authentication
//!
//! Format: `user[:device]@server`, e.g. `15551234567:3@s.whatsapp.net`.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Stable protocol-level address of an authenticated session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Parse an identity string
    pub fn parse(raw: impl Into<String>) -> Result<Self, IdentityParseError> {
        let raw = raw.into();
        let (user, server) = raw
            .split_once('@')
            .ok_or(IdentityParseError::MissingServer)?;

        if user.is_empty() || user.starts_with(':') {
            return Err(IdentityParseError::MissingUser);
        }
        if server.is_empty() || server.contains('@') {
            return Err(IdentityParseError::MissingServer);
        }

        Ok(Self(raw))
    }

    /// The user part without the device suffix
    pub fn user(&self) -> &str {
        let local = self.local_part();
        local.split_once(':').map_or(local, |(user, _)| user)
    }

    /// The device number, if the identity is device-qualified
    pub fn device(&self) -> Option<u16> {
        self.local_part()
            .split_once(':')
            .and_then(|(_, device)| device.parse().ok())
    }

    /// The server part
    pub fn server(&self) -> &str {
        self.0.split_once('@').map_or("", |(_, server)| server)
    }

    /// Borrow as string slice
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn local_part(&self) -> &str {
        self.0.split_once('@').map_or(self.0.as_str(), |(local, _)| local)
    }
}

/// Error when parsing an identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum IdentityParseError {
    #[error("identity is missing the user part")]
    MissingUser,

    #[error("identity is missing the server part")]
    MissingServer,
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Identity {
    type Err = IdentityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Identity::parse(s)
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Identity::parse(raw).map_err(serde::de::Error::custom)
    }
}
