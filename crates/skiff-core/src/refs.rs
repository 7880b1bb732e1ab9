//! Canonical feed and message identities
//!
//! A [`FeedRef`] names an append-only signed feed by its public key plus a
//! format tag. Refs have three stable encodings:
//!
//! - the canonical string form (`@<base64 key>.<suffix>`) used on the wire
//!   and as frontier map keys,
//! - the TFK byte form (type byte, format byte, raw key) whose hex encoding
//!   names per-peer state files on disk,
//! - a shortened sigil for log lines.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Length of the raw public key (and message hash) in bytes.
pub const KEY_LEN: usize = 32;

/// TFK type tag for feed references.
const TFK_TYPE_FEED: u8 = 0x00;

/// Errors from parsing or encoding references.
#[derive(Debug, thiserror::Error)]
pub enum RefError {
    /// The string did not start with the expected sigil (`@` or `%`).
    #[error("ref is missing its sigil prefix: {0:?}")]
    MissingSigil(String),

    /// The suffix after the final dot is not a known format.
    #[error("unknown ref suffix: {0:?}")]
    UnknownSuffix(String),

    /// The decoded key had the wrong length.
    #[error("bad key length: got {0} bytes, want {KEY_LEN}")]
    BadKeyLength(usize),

    /// The key portion was not valid base64.
    #[error("invalid base64 in ref")]
    Base64(#[from] base64::DecodeError),
}

/// Signature algorithm and envelope format of a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedFormat {
    /// The legacy ed25519 feed format.
    Classic,
    /// The newer length-prefixed binary feed format.
    Gabby,
}

impl FeedFormat {
    /// Canonical string suffix for this format.
    pub fn suffix(&self) -> &'static str {
        match self {
            FeedFormat::Classic => "ed25519",
            FeedFormat::Gabby => "ggfeed-v1",
        }
    }

    /// TFK format byte for this format.
    pub fn tfk_byte(&self) -> u8 {
        match self {
            FeedFormat::Classic => 0x00,
            FeedFormat::Gabby => 0x01,
        }
    }

    fn from_suffix(s: &str) -> Result<Self, RefError> {
        match s {
            "ed25519" => Ok(FeedFormat::Classic),
            "ggfeed-v1" => Ok(FeedFormat::Gabby),
            other => Err(RefError::UnknownSuffix(other.to_string())),
        }
    }
}

/// Identity of a feed: a public key and its format.
///
/// Bytewise comparable, hashable, and cheap to copy. The `Display` form is
/// the canonical string used as frontier keys and in log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeedRef {
    key: [u8; KEY_LEN],
    format: FeedFormat,
}

impl FeedRef {
    /// Create a ref from a raw public key and format.
    pub fn new(key: [u8; KEY_LEN], format: FeedFormat) -> Self {
        Self { key, format }
    }

    /// Create a classic-format ref from raw key bytes.
    pub fn from_bytes(key: [u8; KEY_LEN]) -> Self {
        Self::new(key, FeedFormat::Classic)
    }

    /// The raw public key.
    pub fn key(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    /// The feed format tag.
    pub fn format(&self) -> FeedFormat {
        self.format
    }

    /// Typed-field-key byte encoding: type byte, format byte, raw key.
    ///
    /// The hex of this encoding is stable across runs and filesystem-safe,
    /// which is why it names per-peer state files.
    pub fn tfk(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + KEY_LEN);
        out.push(TFK_TYPE_FEED);
        out.push(self.format.tfk_byte());
        out.extend_from_slice(&self.key);
        out
    }

    /// Shortened sigil for log lines, e.g. `<@Fn2Rh…>`.
    pub fn short(&self) -> String {
        let b64 = BASE64.encode(self.key);
        format!("<@{}…>", &b64[..5])
    }
}

impl fmt::Display for FeedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}.{}", BASE64.encode(self.key), self.format.suffix())
    }
}

impl FromStr for FeedRef {
    type Err = RefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix('@')
            .ok_or_else(|| RefError::MissingSigil(s.to_string()))?;
        let (b64, suffix) = rest
            .rsplit_once('.')
            .ok_or_else(|| RefError::UnknownSuffix(rest.to_string()))?;
        let format = FeedFormat::from_suffix(suffix)?;
        let raw = BASE64.decode(b64)?;
        let key: [u8; KEY_LEN] = raw
            .as_slice()
            .try_into()
            .map_err(|_| RefError::BadKeyLength(raw.len()))?;
        Ok(Self::new(key, format))
    }
}

impl Serialize for FeedRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FeedRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Hash-addressed reference to a single message on some feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageRef {
    hash: [u8; KEY_LEN],
}

impl MessageRef {
    /// Create a message ref from its hash.
    pub fn from_bytes(hash: [u8; KEY_LEN]) -> Self {
        Self { hash }
    }

    /// The raw hash.
    pub fn hash(&self) -> &[u8; KEY_LEN] {
        &self.hash
    }
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}.sha256", BASE64.encode(self.hash))
    }
}

impl FromStr for MessageRef {
    type Err = RefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix('%')
            .ok_or_else(|| RefError::MissingSigil(s.to_string()))?;
        let (b64, suffix) = rest
            .rsplit_once('.')
            .ok_or_else(|| RefError::UnknownSuffix(rest.to_string()))?;
        if suffix != "sha256" {
            return Err(RefError::UnknownSuffix(suffix.to_string()));
        }
        let raw = BASE64.decode(b64)?;
        let hash: [u8; KEY_LEN] = raw
            .as_slice()
            .try_into()
            .map_err(|_| RefError::BadKeyLength(raw.len()))?;
        Ok(Self { hash })
    }
}

impl Serialize for MessageRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MessageRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
