//! Outbound encoding of decoded cards.
//!
//! A card is sent to the server as one JSON object per frame:
//!
//! ```text
//! {"cardType":"TypeA","cardNumber":"04ABCDEF"}
//! ```

use serde::{Deserialize, Serialize};
use tagrelay_core::{CardNumber, CardRecord};

use crate::Result;

/// Wire representation of a [`CardRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardPayload {
    pub card_type: String,
    pub card_number: CardNumber,
}

impl CardPayload {
    /// Serialize to the JSON text carried in a frame.
    ///
    /// ```
    /// use tagrelay_core::{CardNumber, CardRecord};
    /// use tagrelay_protocol::CardPayload;
    ///
    /// let record = CardRecord::new("TypeA", CardNumber::new("04ABCDEF").unwrap());
    /// let json = CardPayload::from(&record).to_json().unwrap();
    /// assert_eq!(json, r#"{"cardType":"TypeA","cardNumber":"04ABCDEF"}"#);
    /// ```
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a payload, validating the card number.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

impl From<&CardRecord> for CardPayload {
    fn from(record: &CardRecord) -> Self {
        Self {
            card_type: record.card_type().to_string(),
            card_number: record.card_number().clone(),
        }
    }
}

impl From<CardPayload> for CardRecord {
    fn from(payload: CardPayload) -> Self {
        CardRecord::new(payload.card_type, payload.card_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProtocolError;

    #[test]
    fn test_payload_field_names() {
        let record = CardRecord::new("FeliCa", CardNumber::new("00000001311768467463").unwrap());
        let json = CardPayload::from(&record).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["cardType"], "FeliCa");
        assert_eq!(value["cardNumber"], "00000001311768467463");
    }

    #[test]
    fn test_payload_parse_into_record() {
        let payload =
            CardPayload::from_json(r#"{"cardType":"TypeA","cardNumber":"04abcdef"}"#).unwrap();
        let record = CardRecord::from(payload);
        assert_eq!(record.card_type(), "TypeA");
        assert_eq!(record.card_number().as_str(), "04ABCDEF");
    }

    #[test]
    fn test_payload_rejects_invalid_card_number() {
        let result = CardPayload::from_json(r#"{"cardType":"TypeA","cardNumber":"x"}"#);
        assert!(matches!(result, Err(ProtocolError::Payload(_))));
    }
}
