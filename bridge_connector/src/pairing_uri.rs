//! Handshake URI codec.
//!
//! Format: `wc:<handshakeTopic>@<version>?bridge=<url-encoded>&key=<hex>`.
//! Emission URL-encodes `bridge`; parsing URL-decodes it and validates that
//! `protocol == "wc"` and all three query fields are non-empty. Only
//! version `1` is currently recognised.

use {
    once_cell::sync::Lazy,
    regex::Regex,
    std::{fmt::Debug, str::FromStr},
    url::Url,
};

static TOPIC_AND_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<topic>[^@]+)@(?P<version>\d+)$").expect("invalid regex"));

pub const SUPPORTED_VERSION: u32 = 1;

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ParseError {
    #[error("expecting protocol \"wc\" but \"{0}\" was found")]
    UnexpectedProtocol(String),
    #[error(transparent)]
    Url(#[from] url::ParseError),
    #[error("failed to parse topic and version from \"{0}\"")]
    InvalidTopicAndVersion(String),
    #[error("handshake topic must not be empty")]
    EmptyTopic,
    #[error("unsupported handshake uri version: {0} (expected {SUPPORTED_VERSION})")]
    UnsupportedVersion(String),
    #[error("bridge query parameter not found")]
    BridgeNotFound,
    #[error("bridge query parameter must not be empty")]
    EmptyBridge,
    #[error("key query parameter not found")]
    KeyNotFound,
    #[error("key query parameter must not be empty")]
    EmptyKey,
    #[error("failed to parse key as hex: {0}")]
    InvalidKey(#[from] hex::FromHexError),
    #[error("unexpected query parameter: {0}={1}")]
    UnexpectedParameter(String, String),
}

/// A parsed handshake URI: the rendezvous topic, the relay bridge and the
/// shared symmetric key.
#[derive(Clone, Eq, PartialEq)]
pub struct HandshakeUri {
    pub handshake_topic: String,
    pub version: String,
    pub bridge: String,
    pub key: Vec<u8>,
}

impl HandshakeUri {
    pub fn new(handshake_topic: impl Into<String>, bridge: impl Into<String>, key: Vec<u8>) -> Self {
        Self {
            handshake_topic: handshake_topic.into(),
            version: SUPPORTED_VERSION.to_string(),
            bridge: bridge.into(),
            key,
        }
    }

    fn parse_topic_and_version(path: &str) -> Result<(String, String), ParseError> {
        let caps = TOPIC_AND_VERSION
            .captures(path)
            .ok_or_else(|| ParseError::InvalidTopicAndVersion(path.to_owned()))?;
        let topic = caps.name("topic").expect("regex has a topic group").as_str().to_owned();
        let version = caps.name("version").expect("regex has a version group").as_str().to_owned();
        Ok((topic, version))
    }

    fn parse_params(url: &Url) -> Result<(String, Vec<u8>), ParseError> {
        let mut bridge: Option<String> = None;
        let mut key: Option<String> = None;

        for (k, v) in url.query_pairs() {
            match k.as_ref() {
                "bridge" => bridge = Some(v.into_owned()),
                "key" => key = Some(v.into_owned()),
                _ => return Err(ParseError::UnexpectedParameter(k.into_owned(), v.into_owned())),
            }
        }

        let bridge = bridge.ok_or(ParseError::BridgeNotFound)?;
        if bridge.is_empty() {
            return Err(ParseError::EmptyBridge);
        }

        let key = key.ok_or(ParseError::KeyNotFound)?;
        if key.is_empty() {
            return Err(ParseError::EmptyKey);
        }
        let key = hex::decode(key)?;

        Ok((bridge, key))
    }
}

impl Debug for HandshakeUri {
    /// Debug with the key masked.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeUri")
            .field("handshake_topic", &self.handshake_topic)
            .field("version", &self.version)
            .field("bridge", &self.bridge)
            .field("key", &"***")
            .finish()
    }
}

impl FromStr for HandshakeUri {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = Url::from_str(s)?;

        if url.scheme() != "wc" {
            return Err(ParseError::UnexpectedProtocol(url.scheme().to_owned()));
        }

        let (handshake_topic, version) = Self::parse_topic_and_version(url.path())?;
        if handshake_topic.is_empty() {
            return Err(ParseError::EmptyTopic);
        }
        if version != SUPPORTED_VERSION.to_string() {
            return Err(ParseError::UnsupportedVersion(version.clone()));
        }

        let (bridge, key) = Self::parse_params(&url)?;

        Ok(Self {
            handshake_topic,
            version,
            bridge,
            key,
        })
    }
}

impl std::fmt::Display for HandshakeUri {
    /// Emits `wc:<topic>@<version>?bridge=<url-encoded>&key=<hex>`.
    ///
    /// The query string is built with `form_urlencoded`, the same codec
    /// `Url::query_pairs` uses to decode it on the parse side, so
    /// `parse(format(uri)) == uri` exactly rather than merely "equivalent".
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let query: String = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("bridge", &self.bridge)
            .append_pair("key", &hex::encode(&self.key))
            .finish();

        write!(f, "wc:{}@{}?{}", self.handshake_topic, self.version, query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_uri() {
        let uri = "wc:abc123@1?bridge=https%3A%2F%2Fb.example&key=deadbeef";
        let parsed = HandshakeUri::from_str(uri).unwrap();

        assert_eq!(parsed.handshake_topic, "abc123");
        assert_eq!(parsed.version, "1");
        assert_eq!(parsed.bridge, "https://b.example");
        assert_eq!(parsed.key, hex::decode("deadbeef").unwrap());
    }

    #[test]
    fn format_round_trips_through_parse() {
        let original = HandshakeUri::new("abc123", "https://b.example", hex::decode("deadbeef").unwrap());
        let formatted = original.to_string();
        let reparsed = HandshakeUri::from_str(&formatted).unwrap();

        assert_eq!(reparsed.handshake_topic, original.handshake_topic);
        assert_eq!(reparsed.bridge, original.bridge);
        assert_eq!(reparsed.key, original.key);
    }

    #[test]
    fn bridge_with_reserved_characters_round_trips_byte_for_byte() {
        let bridge = "https://b.example/path?x=1&y=2 three=four";
        let original = HandshakeUri::new("abc123", bridge, hex::decode("11223344").unwrap());
        let formatted = original.to_string();
        let reparsed = HandshakeUri::from_str(&formatted).unwrap();

        assert_eq!(reparsed.bridge, bridge);
    }

    #[test]
    fn rejects_wrong_protocol() {
        let err = HandshakeUri::from_str("http:abc123@1?bridge=https://b.example&key=deadbeef");
        assert!(matches!(err, Err(ParseError::UnexpectedProtocol(_))));
    }

    #[test]
    fn rejects_missing_bridge() {
        let err = HandshakeUri::from_str("wc:abc123@1?key=deadbeef");
        assert!(matches!(err, Err(ParseError::BridgeNotFound)));
    }

    #[test]
    fn rejects_missing_key() {
        let err = HandshakeUri::from_str("wc:abc123@1?bridge=https://b.example");
        assert!(matches!(err, Err(ParseError::KeyNotFound)));
    }

    #[test]
    fn rejects_empty_key() {
        let err = HandshakeUri::from_str("wc:abc123@1?bridge=https://b.example&key=");
        assert!(matches!(err, Err(ParseError::EmptyKey)));
    }

    #[test]
    fn rejects_unsupported_version() {
        let err = HandshakeUri::from_str("wc:abc123@2?bridge=https://b.example&key=deadbeef");
        assert!(matches!(err, Err(ParseError::UnsupportedVersion(_))));
    }

    #[test]
    fn rejects_empty_topic() {
        let err = HandshakeUri::from_str("wc:@1?bridge=https://b.example&key=deadbeef");
        assert!(err.is_err());
    }
}
