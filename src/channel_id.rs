//! Channel ID: `<platform>/<native_id>` (spec.md Glossary).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Irc,
    Telegram,
    Discord,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Irc => "irc",
            Platform::Telegram => "telegram",
            Platform::Discord => "discord",
        }
    }
}

impl FromStr for Platform {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "irc" => Ok(Platform::Irc),
            "telegram" => Ok(Platform::Telegram),
            "discord" => Ok(Platform::Discord),
            other => Err(BridgeError::UnknownPlatform(other.to_string())),
        }
    }
}

/// `<platform>/<native_id>`. Native IDs are opaque strings at this layer;
/// Telegram/Discord integer parsing happens only at the client boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelId {
    raw: String,
    platform_len: usize,
}

impl ChannelId {
    pub fn new(platform: Platform, native_id: impl AsRef<str>) -> Self {
        let raw = format!("{}/{}", platform.as_str(), native_id.as_ref());
        let platform_len = platform.as_str().len();
        Self { raw, platform_len }
    }

    pub fn parse(raw: &str) -> Result<Self, BridgeError> {
        let (prefix, native_id) = raw
            .split_once('/')
            .ok_or_else(|| BridgeError::UnknownPlatform(raw.to_string()))?;
        // Validate the prefix is known; the native id stays opaque.
        let platform = prefix.parse::<Platform>()?;
        Ok(Self::new(platform, native_id))
    }

    pub fn platform(&self) -> Platform {
        // Safe: constructed only via `new`/`parse`, both of which validate it.
        self.raw[..self.platform_len].parse().expect("validated platform prefix")
    }

    pub fn native_id(&self) -> &str {
        &self.raw[self.platform_len + 1..]
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl TryFrom<String> for ChannelId {
    type Error = BridgeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ChannelId> for String {
    fn from(value: ChannelId) -> Self {
        value.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_platforms() {
        let id = ChannelId::parse("irc/#general").unwrap();
        assert_eq!(id.platform(), Platform::Irc);
        assert_eq!(id.native_id(), "#general");
        assert_eq!(id.as_str(), "irc/#general");
    }

    #[test]
    fn rejects_unknown_platform() {
        assert!(ChannelId::parse("slack/general").is_err());
    }

    #[test]
    fn rejects_missing_separator() {
        assert!(ChannelId::parse("irc-general").is_err());
    }

    #[test]
    fn native_id_may_contain_slashes() {
        let id = ChannelId::new(Platform::Telegram, "100/extra");
        assert_eq!(id.native_id(), "100/extra");
    }
}
