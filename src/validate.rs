//! Address, public key and network validation.
//!
//! Two network lookups live here on purpose and must stay distinct:
//! [`normalize_network`] is strict and fails on anything the registry does
//! not know, while [`describe_network`] is lenient and wraps unknown values in
//! an unsupported descriptor.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

static ADDRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[0-9a-f]{1,64}$").expect("address regex must compile"));

static PUBLIC_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(0x)?[0-9a-fA-F]{64}$").expect("public key regex must compile")
});

/// Chain id reported for networks outside the registry.
pub const UNKNOWN_CHAIN_ID: &str = "unknown";

/// A statically known network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkEntry {
    pub key: &'static str,
    pub name: &'static str,
    pub chain_id: &'static str,
}

/// Recognized networks, in display order.
pub const NETWORK_REGISTRY: [NetworkEntry; 3] = [
    NetworkEntry {
        key: "mainnet",
        name: "Aptos Mainnet",
        chain_id: "1",
    },
    NetworkEntry {
        key: "testnet",
        name: "Aptos Testnet",
        chain_id: "2",
    },
    NetworkEntry {
        key: "devnet",
        name: "Aptos Devnet",
        chain_id: "3",
    },
];

/// Network identity attached to a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDescriptor {
    pub name: String,
    pub chain_id: String,
    pub supported: bool,
}

impl From<&NetworkEntry> for NetworkDescriptor {
    fn from(entry: &NetworkEntry) -> Self {
        Self {
            name: entry.name.to_string(),
            chain_id: entry.chain_id.to_string(),
            supported: true,
        }
    }
}

/// Input accepted by [`normalize_network`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkInput<'a> {
    Raw(&'a str),
    Parts {
        name: Option<&'a str>,
        chain_id: Option<&'a str>,
    },
}

impl<'a> From<&'a str> for NetworkInput<'a> {
    fn from(raw: &'a str) -> Self {
        Self::Raw(raw)
    }
}

/// A sanitized, validated account address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Sanitize `raw` and accept it only if it matches the address pattern.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        if raw.trim().is_empty() {
            return Err(ValidationError::MissingAddress);
        }
        let sanitized = sanitize_address(raw);
        if ADDRESS_RE.is_match(&sanitized) {
            Ok(Self(sanitized))
        } else {
            Err(ValidationError::InvalidAddress)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short display form, see [`format_address`].
    pub fn formatted(&self, prefix_len: usize, suffix_len: usize) -> String {
        format_address(&self.0, prefix_len, suffix_len)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Output of a successful [`validate_connection_payload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedPayload {
    pub address: Address,
    pub public_key: String,
    pub network: Option<NetworkDescriptor>,
}

/// Lower-case and `0x`-prefix an address. Total and idempotent.
pub fn sanitize_address(raw: &str) -> String {
    let lowered = raw.trim().to_ascii_lowercase();
    if lowered.starts_with("0x") {
        lowered
    } else {
        format!("0x{lowered}")
    }
}

pub fn is_valid_address(raw: &str) -> bool {
    Address::parse(raw).is_ok()
}

pub fn is_valid_public_key(raw: &str) -> bool {
    PUBLIC_KEY_RE.is_match(raw.trim())
}

/// Validate what the agent returned for a connection.
///
/// Checks run in a fixed order and the first failure wins: address presence,
/// address format, public key presence, public key format, then the network
/// (only when one is supplied).
pub fn validate_connection_payload(
    address: Option<&str>,
    public_key: Option<&str>,
    network: Option<&str>,
) -> Result<ValidatedPayload, ValidationError> {
    let address = match address {
        Some(raw) if !raw.trim().is_empty() => Address::parse(raw)?,
        _ => return Err(ValidationError::MissingAddress),
    };

    let public_key = match public_key {
        Some(raw) if !raw.trim().is_empty() => raw.trim(),
        _ => return Err(ValidationError::MissingPublicKey),
    };
    if !is_valid_public_key(public_key) {
        return Err(ValidationError::InvalidPublicKey);
    }

    let network = network
        .map(|raw| normalize_network(NetworkInput::Raw(raw)))
        .transpose()?;

    Ok(ValidatedPayload {
        address,
        public_key: normalize_public_key(public_key),
        network,
    })
}

fn normalize_public_key(raw: &str) -> String {
    let lowered = raw.to_ascii_lowercase();
    if lowered.starts_with("0x") {
        lowered
    } else {
        format!("0x{lowered}")
    }
}

fn find_by_chain_id(chain_id: &str) -> Option<&'static NetworkEntry> {
    let chain_id = chain_id.trim();
    NETWORK_REGISTRY
        .iter()
        .find(|entry| entry.chain_id == chain_id)
}

fn find_by_name(name: &str) -> Option<&'static NetworkEntry> {
    let name = name.trim();
    NETWORK_REGISTRY.iter().find(|entry| {
        entry.key.eq_ignore_ascii_case(name) || entry.name.eq_ignore_ascii_case(name)
    })
}

/// Strictly resolve a network against the registry, chain id first.
pub fn normalize_network(input: NetworkInput<'_>) -> Result<NetworkDescriptor, ValidationError> {
    let (name, chain_id, shown) = match input {
        NetworkInput::Raw(raw) => (Some(raw), Some(raw), raw.to_string()),
        NetworkInput::Parts { name, chain_id } => {
            let shown = name.or(chain_id).unwrap_or_default().to_string();
            (name, chain_id, shown)
        }
    };

    chain_id
        .and_then(find_by_chain_id)
        .or_else(|| name.and_then(find_by_name))
        .map(NetworkDescriptor::from)
        .ok_or(ValidationError::UnsupportedNetwork(shown))
}

/// Leniently describe a network. Unknown values keep their raw name and are
/// marked unsupported.
pub fn describe_network(raw: &str) -> NetworkDescriptor {
    find_by_chain_id(raw)
        .or_else(|| find_by_name(raw))
        .map(NetworkDescriptor::from)
        .unwrap_or_else(|| NetworkDescriptor {
            name: raw.to_string(),
            chain_id: UNKNOWN_CHAIN_ID.to_string(),
            supported: false,
        })
}

/// Truncate to `prefix...suffix`. Input no longer than `prefix + suffix`
/// characters is returned unchanged.
pub fn format_address(address: &str, prefix_len: usize, suffix_len: usize) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= prefix_len + suffix_len {
        return address.to_string();
    }
    let prefix: String = chars[..prefix_len].iter().collect();
    let suffix: String = chars[chars.len() - suffix_len..].iter().collect();
    format!("{prefix}...{suffix}")
}
