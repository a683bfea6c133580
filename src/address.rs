//! Compound address parsing.
//!
//! Item addresses look like `tenant:channel:id`; channel addresses look like
//! `tenant:channel`. Missing parts fall back to [`DEFAULT_TENANT`] and
//! [`DEFAULT_CHANNEL`].

use crate::error::{Error, Result};
use crate::model::{DEFAULT_CHANNEL, DEFAULT_TENANT};

/// A fully resolved item address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub tenant: String,
    pub channel: String,
    pub id: String,
}

impl Address {
    /// Resolve an item address.
    ///
    /// | segments | tenant   | channel   | id                  |
    /// |----------|----------|-----------|---------------------|
    /// | 1        | `core`   | `default` | seg 0               |
    /// | 2        | `core`   | seg 0     | seg 1               |
    /// | 3        | seg 0    | seg 1     | seg 2               |
    /// | 4+       | `core`   | `default` | whole input string  |
    pub fn parse(address: &str) -> Self {
        let parts: Vec<&str> = address.split(':').collect();
        match parts.as_slice() {
            [id] => Self::new(DEFAULT_TENANT, DEFAULT_CHANNEL, *id),
            [channel, id] => Self::new(DEFAULT_TENANT, *channel, *id),
            [tenant, channel, id] => Self::new(*tenant, *channel, *id),
            _ => Self::new(DEFAULT_TENANT, DEFAULT_CHANNEL, address),
        }
    }

    pub fn new(
        tenant: impl Into<String>,
        channel: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            channel: channel.into(),
            id: id.into(),
        }
    }

    /// Wire form that [`Address::parse`] resolves back to `self`.
    ///
    /// Fails when a part contains `:`, since the joined string would parse
    /// to a different tenant, channel or id.
    pub fn encode(&self) -> Result<String> {
        let wire = self.to_string();
        if Self::parse(&wire) != *self {
            return Err(Error::Validation(format!(
                "address {wire:?} does not resolve back to tenant {:?}, channel {:?}, id {:?}",
                self.tenant, self.channel, self.id
            )));
        }
        Ok(wire)
    }

    /// The channel part of this address.
    pub fn channel_address(&self) -> ChannelAddress {
        ChannelAddress::new(&self.tenant, &self.channel)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.tenant, self.channel, self.id)
    }
}

/// A channel address, used by count/reset/pop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelAddress {
    pub tenant: String,
    pub channel: String,
}

impl ChannelAddress {
    /// Split `tenant:channel`. Anything other than exactly two segments is
    /// taken whole as a channel of the default tenant.
    pub fn parse(address: &str) -> Self {
        match address.split(':').collect::<Vec<_>>().as_slice() {
            [tenant, channel] => Self::new(*tenant, *channel),
            _ => Self::new(DEFAULT_TENANT, address),
        }
    }

    pub fn new(tenant: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            channel: channel.into(),
        }
    }
}

impl std::fmt::Display for ChannelAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.tenant, self.channel)
    }
}
