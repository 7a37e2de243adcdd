//! Protocol codec: command encoding, frame parsing, routing-key extraction
//!
//! Pure and stateless. Malformed frames fail the enclosing receive-loop
//! iteration; nothing here retries.

use polygon_types::{PolygonError, SubscriptionKey};
use serde::Serialize;
use serde_json::Value;

/// An outbound control command
///
/// Serializes to the provider's `{"action":…,"params":…}` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "params", rename_all = "lowercase")]
pub enum Command {
    /// Authenticate with an API key
    Auth(String),
    /// Subscribe to a stream key
    Subscribe(String),
    /// Unsubscribe from a stream key
    Unsubscribe(String),
}

impl Command {
    /// Encode as a text frame
    pub fn to_frame(&self) -> Result<String, PolygonError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Parse one frame into its message batch
///
/// Every inbound frame is a JSON array of message objects.
pub fn parse_frame(text: &str) -> Result<Vec<Value>, PolygonError> {
    match serde_json::from_str::<Value>(text)? {
        Value::Array(messages) => Ok(messages),
        _ => Err(PolygonError::protocol("frame is not a message array")),
    }
}

/// Extract the routing key for one message
///
/// `status` events are routed to the internal `status.<key>` queue named
/// by their ack text; data events combine the `ev` and `sym` fields.
pub fn routing_key(message: &Value) -> Result<SubscriptionKey, PolygonError> {
    let ev = message
        .get("ev")
        .and_then(Value::as_str)
        .ok_or_else(|| PolygonError::protocol("message missing ev field"))?;

    match ev {
        "status" => {
            let text = message
                .get("message")
                .and_then(Value::as_str)
                .ok_or_else(|| PolygonError::protocol("status message missing text"))?;
            let key = ack_subject(text).ok_or_else(|| {
                PolygonError::protocol(format!("unrecognized status text: {text}"))
            })?;
            Ok(SubscriptionKey::status(key))
        }
        "A" | "AM" | "T" => {
            let sym = message
                .get("sym")
                .and_then(Value::as_str)
                .ok_or_else(|| PolygonError::protocol("data message missing sym field"))?;
            Ok(SubscriptionKey::from_raw(format!("{ev}.{sym}")))
        }
        other => Err(PolygonError::UnknownEventType {
            ev: other.to_string(),
        }),
    }
}

/// Recover the stream key from `"(un)subscribed to: <key>"` ack text
fn ack_subject(text: &str) -> Option<&str> {
    let subject = text
        .strip_prefix("subscribed to: ")
        .or_else(|| text.strip_prefix("unsubscribed to: "))?;
    let valid = !subject.is_empty()
        && subject
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_');
    valid.then_some(subject)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn commands_encode_to_wire_shape() {
        assert_eq!(
            Command::Auth("secret".into()).to_frame().unwrap(),
            r#"{"action":"auth","params":"secret"}"#
        );
        assert_eq!(
            Command::Subscribe("AM.SPY".into()).to_frame().unwrap(),
            r#"{"action":"subscribe","params":"AM.SPY"}"#
        );
        assert_eq!(
            Command::Unsubscribe("T.MSFT".into()).to_frame().unwrap(),
            r#"{"action":"unsubscribe","params":"T.MSFT"}"#
        );
    }

    #[test]
    fn frame_must_be_an_array() {
        assert!(parse_frame(r#"[{"ev":"T"},{"ev":"A"}]"#).unwrap().len() == 2);
        assert!(matches!(
            parse_frame(r#"{"ev":"T"}"#),
            Err(PolygonError::Protocol(_))
        ));
        assert!(matches!(
            parse_frame("not json"),
            Err(PolygonError::InvalidJson(_))
        ));
    }

    #[test]
    fn routes_data_events_by_ev_and_symbol() {
        let key = routing_key(&json!({"ev": "A", "sym": "SPY"})).unwrap();
        assert_eq!(key.as_str(), "A.SPY");

        let key = routing_key(&json!({"ev": "AM", "sym": "SPY"})).unwrap();
        assert_eq!(key.as_str(), "AM.SPY");

        let key = routing_key(&json!({"ev": "T", "sym": "MSFT"})).unwrap();
        assert_eq!(key.as_str(), "T.MSFT");
    }

    #[test]
    fn routes_acks_to_status_queues() {
        let message = json!({
            "ev": "status",
            "status": "success",
            "message": "subscribed to: AM.SPY"
        });
        assert_eq!(routing_key(&message).unwrap().as_str(), "status.AM.SPY");

        let message = json!({
            "ev": "status",
            "status": "success",
            "message": "unsubscribed to: T.MSFT"
        });
        assert_eq!(routing_key(&message).unwrap().as_str(), "status.T.MSFT");
    }

    #[test]
    fn rejects_unknown_event_types() {
        let err = routing_key(&json!({"ev": "Q", "sym": "SPY"})).unwrap_err();
        assert!(matches!(err, PolygonError::UnknownEventType { ev } if ev == "Q"));
    }

    #[test]
    fn rejects_unparseable_status_text() {
        let message = json!({
            "ev": "status",
            "status": "connected",
            "message": "Connected Successfully"
        });
        assert!(matches!(
            routing_key(&message),
            Err(PolygonError::Protocol(_))
        ));
    }
}
