use std::{fmt, str::FromStr};

use alloy::{
    primitives::{Address, Bytes},
    sol_types::SolValue,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// ABI type a configuration value is encoded as on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Uint16,
    Address,
}

impl ValueType {
    /// Decodes raw `getConfig` bytes into the canonical string form used for
    /// comparison: decimal for integers, EIP-55 checksum for addresses.
    pub fn decode(self, raw: &[u8]) -> std::result::Result<String, alloy::sol_types::Error> {
        Ok(match self {
            Self::Uint16 => u16::abi_decode(raw, true)?.to_string(),
            Self::Address => Address::abi_decode(raw, true)?.to_checksum(None),
        })
    }

    pub fn encode(self, value: &str) -> Result<Bytes> {
        let encoded = match self {
            Self::Uint16 => parse_u16(value)?.abi_encode(),
            Self::Address => parse_address(value)?.abi_encode(),
        };
        Ok(encoded.into())
    }

    /// Checks that a literal desired value is encodable as this type.
    pub fn validate(self, value: &str) -> Result<()> {
        match self {
            Self::Uint16 => parse_u16(value).map(drop),
            Self::Address => parse_address(value).map(drop),
        }
    }
}

fn parse_u16(value: &str) -> Result<u16> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("{value:?} is not a uint16")))
}

fn parse_address(value: &str) -> Result<Address> {
    Address::from_str(value).map_err(|_| Error::Config(format!("{value:?} is not an address")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConfigParameter {
    InboundProofLibraryVersion,
    InboundBlockConfirmations,
    Relayer,
    OutboundProofType,
    OutboundBlockConfirmations,
    Oracle,
    SendVersion,
    ReceiveVersion,
}

impl ConfigParameter {
    /// Per-pair parameters in evaluation order.
    pub const PER_PAIR: [ConfigParameter; 6] = [
        Self::InboundProofLibraryVersion,
        Self::InboundBlockConfirmations,
        Self::Relayer,
        Self::OutboundProofType,
        Self::OutboundBlockConfirmations,
        Self::Oracle,
    ];

    /// Config type id understood by the messaging library. Versions are set
    /// through dedicated methods and have none.
    pub fn type_id(self) -> Option<u16> {
        match self {
            Self::InboundProofLibraryVersion => Some(1),
            Self::InboundBlockConfirmations => Some(2),
            Self::Relayer => Some(3),
            Self::OutboundProofType => Some(4),
            Self::OutboundBlockConfirmations => Some(5),
            Self::Oracle => Some(6),
            Self::SendVersion | Self::ReceiveVersion => None,
        }
    }

    pub fn value_type(self) -> ValueType {
        match self {
            Self::Relayer | Self::Oracle => ValueType::Address,
            _ => ValueType::Uint16,
        }
    }

    pub fn is_per_pair(self) -> bool {
        self.type_id().is_some()
    }
}

impl fmt::Display for ConfigParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InboundProofLibraryVersion => "inboundProofLibraryVersion",
            Self::InboundBlockConfirmations => "inboundBlockConfirmations",
            Self::Relayer => "relayer",
            Self::OutboundProofType => "outboundProofType",
            Self::OutboundBlockConfirmations => "outboundBlockConfirmations",
            Self::Oracle => "oracle",
            Self::SendVersion => "sendVersion",
            Self::ReceiveVersion => "receiveVersion",
        };
        f.write_str(name)
    }
}

/// A desired value kept in the literal form it was declared with.
///
/// Integers declared as TOML/JSON numbers become their decimal string.
/// Comparison against on-chain state is by this literal string, so addresses
/// must be declared in checksum casing to compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DesiredValue(String);

impl DesiredValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DesiredValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for DesiredValue {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Literal {
            Int(u64),
            Str(String),
        }

        Ok(match Literal::deserialize(deserializer)? {
            Literal::Int(n) => Self(n.to_string()),
            Literal::Str(s) => Self(s),
        })
    }
}
