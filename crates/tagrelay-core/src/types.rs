use crate::{
    Result,
    constants::{MAX_CARD_NUMBER_LENGTH, MAX_PORT, MIN_CARD_NUMBER_LENGTH},
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

/// Availability of the card reader hardware.
///
/// Transitions are driven only by hardware broadcasts. The natural order is
/// `Unavailable → TurningOn → Available → TurningOff → Unavailable`, but
/// consumers must tolerate events that skip a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReaderState {
    Unavailable,
    TurningOff,
    Available,
    TurningOn,
}

impl ReaderState {
    /// Returns `true` if tags can be scanned in this state.
    #[inline]
    #[must_use]
    pub fn is_available(self) -> bool {
        matches!(self, ReaderState::Available)
    }

    /// Returns `true` while the hardware is switching on or off.
    #[inline]
    #[must_use]
    pub fn is_transitional(self) -> bool {
        matches!(self, ReaderState::TurningOn | ReaderState::TurningOff)
    }

    /// Check whether `target` follows this state in the hardware's own ordering.
    ///
    /// A `false` result does not make the transition illegal; it only marks
    /// an event that arrived out of order.
    ///
    /// # Examples
    ///
    /// ```
    /// use tagrelay_core::ReaderState;
    ///
    /// assert!(ReaderState::Unavailable.is_natural_successor(ReaderState::TurningOn));
    /// assert!(!ReaderState::Unavailable.is_natural_successor(ReaderState::Available));
    /// ```
    #[must_use]
    pub fn is_natural_successor(self, target: ReaderState) -> bool {
        matches!(
            (self, target),
            (ReaderState::Unavailable, ReaderState::TurningOn)
                | (ReaderState::TurningOn, ReaderState::Available | ReaderState::Unavailable)
                | (ReaderState::Available, ReaderState::TurningOff)
                | (ReaderState::TurningOff, ReaderState::Unavailable | ReaderState::Available)
        )
    }
}

impl fmt::Display for ReaderState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReaderState::Unavailable => write!(f, "Unavailable"),
            ReaderState::TurningOff => write!(f, "TurningOff"),
            ReaderState::Available => write!(f, "Available"),
            ReaderState::TurningOn => write!(f, "TurningOn"),
        }
    }
}

/// State of the transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    /// Returns `true` if payloads may be sent.
    #[inline]
    #[must_use]
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
        }
    }
}

/// Canonical card identifier (8-20 ASCII alphanumeric characters).
///
/// # Security
/// This type implements constant-time comparison to prevent timing attacks
/// when card numbers are compared by downstream consumers.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CardNumber(String);

impl CardNumber {
    /// Create a new card number with validation.
    ///
    /// The card number is normalized (trimmed and converted to uppercase) before validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidCardFormat` if:
    /// - The card number length is not between 8-20 characters
    /// - The card number contains anything but ASCII letters and digits
    pub fn new(number: &str) -> Result<Self> {
        let number = number.trim().to_ascii_uppercase();

        let len = number.len();
        if !(MIN_CARD_NUMBER_LENGTH..=MAX_CARD_NUMBER_LENGTH).contains(&len) {
            return Err(Error::InvalidCardFormat(format!(
                "Card number must be {MIN_CARD_NUMBER_LENGTH}-{MAX_CARD_NUMBER_LENGTH} chars, got {len}"
            )));
        }

        if !number.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(Error::InvalidCardFormat(
                "Card number must be ASCII alphanumeric".to_string(),
            ));
        }

        Ok(CardNumber(number))
    }

    /// Get the card number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CardNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for CardNumber {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        CardNumber::new(s)
    }
}

impl TryFrom<String> for CardNumber {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        CardNumber::new(&value)
    }
}

impl From<CardNumber> for String {
    fn from(value: CardNumber) -> Self {
        value.0
    }
}

/// Constant-time comparison implementation for CardNumber
impl PartialEq for CardNumber {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl std::hash::Hash for CardNumber {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

/// A decoded card: technology label plus canonical identifier.
///
/// Immutable once constructed. Two reads of the same physical tag produce
/// equal records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CardRecord {
    card_type: String,
    card_number: CardNumber,
}

impl CardRecord {
    pub fn new(card_type: impl Into<String>, card_number: CardNumber) -> Self {
        Self {
            card_type: card_type.into(),
            card_number,
        }
    }

    #[must_use]
    pub fn card_type(&self) -> &str {
        &self.card_type
    }

    #[must_use]
    pub fn card_number(&self) -> &CardNumber {
        &self.card_number
    }
}

impl fmt::Display for CardRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.card_type, self.card_number)
    }
}

/// Remote server address: non-empty host name plus TCP port.
///
/// Deserialization goes through [`Endpoint::new`], so a decoded endpoint is
/// always valid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "EndpointFields")]
pub struct Endpoint {
    host: String,
    port: u16,
}

/// Unchecked serialized form of an [`Endpoint`].
#[derive(Deserialize)]
struct EndpointFields {
    host: String,
    port: u32,
}

impl TryFrom<EndpointFields> for Endpoint {
    type Error = Error;

    fn try_from(fields: EndpointFields) -> Result<Self> {
        Endpoint::new(fields.host, fields.port)
    }
}

impl Endpoint {
    /// Create a validated endpoint.
    ///
    /// The port is taken as `u32` so that out-of-range values coming from
    /// configuration are rejected here rather than silently truncated.
    ///
    /// # Errors
    /// Returns `Error::InvalidEndpoint` if the host is empty or blank, or the
    /// port is above 65535.
    ///
    /// # Examples
    ///
    /// ```
    /// use tagrelay_core::Endpoint;
    ///
    /// let endpoint = Endpoint::new("192.168.1.20", 8080).unwrap();
    /// assert_eq!(endpoint.to_string(), "192.168.1.20:8080");
    ///
    /// assert!(Endpoint::new("", 8080).is_err());
    /// assert!(Endpoint::new("host", 70000).is_err());
    /// ```
    pub fn new(host: impl Into<String>, port: u32) -> Result<Self> {
        let host = host.into().trim().to_string();
        if host.is_empty() {
            return Err(Error::invalid_endpoint("host name must not be empty"));
        }

        if port > MAX_PORT {
            return Err(Error::invalid_endpoint(format!(
                "port must be 0-{MAX_PORT}, got {port}"
            )));
        }

        Ok(Self {
            host,
            port: port as u16,
        })
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl std::str::FromStr for Endpoint {
    type Err = Error;

    /// Parse `host:port`, accepting bracketed IPv6 literals (`[::1]:8080`).
    fn from_str(s: &str) -> Result<Self> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::invalid_endpoint(format!("expected host:port, got {s:?}")))?;

        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        let port: u32 = port
            .parse()
            .map_err(|_| Error::invalid_endpoint(format!("invalid port {port:?}")))?;

        Endpoint::new(host, port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_reader_state_natural_order() {
        assert!(ReaderState::Unavailable.is_natural_successor(ReaderState::TurningOn));
        assert!(ReaderState::TurningOn.is_natural_successor(ReaderState::Available));
        assert!(ReaderState::Available.is_natural_successor(ReaderState::TurningOff));
        assert!(ReaderState::TurningOff.is_natural_successor(ReaderState::Unavailable));
    }

    #[test]
    fn test_reader_state_skipped_steps() {
        assert!(!ReaderState::Unavailable.is_natural_successor(ReaderState::Available));
        assert!(!ReaderState::Available.is_natural_successor(ReaderState::Unavailable));
        assert!(!ReaderState::Available.is_natural_successor(ReaderState::Available));
    }

    #[test]
    fn test_reader_state_predicates() {
        assert!(ReaderState::Available.is_available());
        assert!(!ReaderState::TurningOn.is_available());
        assert!(ReaderState::TurningOn.is_transitional());
        assert!(ReaderState::TurningOff.is_transitional());
        assert!(!ReaderState::Unavailable.is_transitional());
    }

    #[test]
    fn test_reader_state_serialization() {
        let json = serde_json::to_string(&ReaderState::TurningOn).unwrap();
        assert_eq!(json, "\"turning_on\"");
    }

    #[test]
    fn test_connection_state_default() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert!(!ConnectionState::Connecting.is_connected());
        assert!(ConnectionState::Connected.is_connected());
    }

    #[rstest]
    #[case("04ABCDEF", "04ABCDEF")]
    #[case("04abcdef", "04ABCDEF")]
    #[case("  00000000001234567890 ", "00000000001234567890")]
    fn test_card_number_normalization(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(CardNumber::new(input).unwrap().as_str(), expected);
    }

    #[rstest]
    #[case("04ABCD")]
    #[case("000000000012345678901")]
    #[case("04AB-DEF")]
    #[case("04ABCDÉF")]
    fn test_card_number_rejected(#[case] input: &str) {
        assert!(matches!(
            CardNumber::new(input),
            Err(Error::InvalidCardFormat(_))
        ));
    }

    #[test]
    fn test_card_number_serde_validates() {
        let parsed: std::result::Result<CardNumber, _> = serde_json::from_str("\"12\"");
        assert!(parsed.is_err());

        let parsed: CardNumber = serde_json::from_str("\"04abcdef\"").unwrap();
        assert_eq!(parsed.as_str(), "04ABCDEF");
    }

    #[test]
    fn test_card_record_equality() {
        let a = CardRecord::new("TypeA", CardNumber::new("04ABCDEF").unwrap());
        let b = CardRecord::new("TypeA", CardNumber::new("04abcdef").unwrap());
        let c = CardRecord::new("FeliCa", CardNumber::new("04ABCDEF").unwrap());
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_string(), "TypeA 04ABCDEF");
    }

    #[rstest]
    #[case("localhost", 0)]
    #[case("localhost", 8080)]
    #[case("10.0.0.1", 65535)]
    fn test_endpoint_valid(#[case] host: &str, #[case] port: u32) {
        let endpoint = Endpoint::new(host, port).unwrap();
        assert_eq!(endpoint.host(), host);
        assert_eq!(u32::from(endpoint.port()), port);
    }

    #[rstest]
    #[case("", 8080)]
    #[case("   ", 8080)]
    #[case("localhost", 65536)]
    fn test_endpoint_invalid(#[case] host: &str, #[case] port: u32) {
        assert!(matches!(
            Endpoint::new(host, port),
            Err(Error::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn test_endpoint_parse() {
        let endpoint: Endpoint = "example.org:9000".parse().unwrap();
        assert_eq!(endpoint.host(), "example.org");
        assert_eq!(endpoint.port(), 9000);

        let endpoint: Endpoint = "[::1]:8080".parse().unwrap();
        assert_eq!(endpoint.host(), "::1");
        assert_eq!(endpoint.to_string(), "[::1]:8080");

        assert!("no-port".parse::<Endpoint>().is_err());
        assert!(":8080".parse::<Endpoint>().is_err());
        assert!("host:http".parse::<Endpoint>().is_err());
    }

    #[rstest]
    #[case(r#"{"host":"","port":3000}"#)]
    #[case(r#"{"host":"  ","port":3000}"#)]
    #[case(r#"{"host":"localhost","port":70000}"#)]
    fn test_endpoint_serde_rejects_invalid(#[case] json: &str) {
        assert!(serde_json::from_str::<Endpoint>(json).is_err());
    }

    #[test]
    fn test_endpoint_serde_validates() {
        let endpoint: Endpoint =
            serde_json::from_str(r#"{"host":" relay.local ","port":3000}"#).unwrap();
        assert_eq!(endpoint, Endpoint::new("relay.local", 3000).unwrap());
        assert_eq!(
            serde_json::to_string(&endpoint).unwrap(),
            r#"{"host":"relay.local","port":3000}"#
        );
    }
}
