//! # Command payloads.
//!
//! Accepted shapes on `<ns>/<id>/cmd`:
//!
//! | Payload | Action | Argument |
//! |---|---|---|
//! | `ping` | `ping` | none |
//! | `say hello there` | `say` | `"hello there"` |
//! | `{"action":"set_mode","args":"armed"}` | `set_mode` | `"armed"` |
//! | `{"action":"x","args":{...},"correlationId":7}` | `x` | the object (correlation id kept) |
//! | `"ping"` (JSON string) | treated as text | |
//!
//! An empty payload, or a JSON object without a non-empty string `action`,
//! is rejected.

use serde_json::{Map, Value};

use crate::error::DispatchError;
use crate::transport::{Message, QoS};

/// A command addressed to one worker.
#[derive(Clone, Debug, PartialEq)]
pub struct Command {
    pub target: String,
    pub action: String,
    pub args: Option<Value>,
    /// Opaque value passed through to the handler untouched.
    pub correlation_id: Option<Value>,
    pub qos: QoS,
}

impl Command {
    pub fn new(target: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            action: action.into(),
            args: None,
            correlation_id: None,
            qos: QoS::AtLeastOnce,
        }
    }

    #[must_use]
    pub fn with_args(mut self, args: Option<Value>) -> Self {
        self.args = args;
        self
    }

    #[must_use]
    pub fn with_correlation_id(mut self, id: impl Into<Value>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Parses a message received on `target`'s command topic.
    pub fn parse(target: &str, msg: &Message) -> Result<Self, DispatchError> {
        let text = msg.payload_str();
        let text = text.trim();
        if text.is_empty() {
            return Err(DispatchError::EmptyPayload);
        }

        let mut cmd = match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(obj)) => from_object(target, obj)?,
            Ok(Value::String(s)) => from_text(target, s.trim())?,
            _ => from_text(target, text)?,
        };
        cmd.qos = msg.qos;
        Ok(cmd)
    }

    /// JSON wire form: `{"action", "args"?, "correlationId"?}`.
    pub fn to_payload(&self) -> Vec<u8> {
        let mut obj = Map::new();
        obj.insert("action".into(), Value::String(self.action.clone()));
        if let Some(args) = &self.args {
            obj.insert("args".into(), args.clone());
        }
        if let Some(id) = &self.correlation_id {
            obj.insert("correlationId".into(), id.clone());
        }
        Value::Object(obj).to_string().into_bytes()
    }
}

fn from_object(target: &str, mut obj: Map<String, Value>) -> Result<Command, DispatchError> {
    let action = match obj.remove("action") {
        Some(Value::String(a)) if !a.trim().is_empty() => a.trim().to_owned(),
        Some(_) => {
            return Err(DispatchError::InvalidPayload {
                reason: "'action' must be a non-empty string".into(),
            });
        }
        None => {
            return Err(DispatchError::InvalidPayload {
                reason: "missing 'action'".into(),
            });
        }
    };
    let args = obj.remove("args").filter(|v| !v.is_null());
    let correlation_id = obj.remove("correlationId");

    Ok(Command {
        target: target.to_owned(),
        action,
        args,
        correlation_id,
        qos: QoS::AtLeastOnce,
    })
}

fn from_text(target: &str, text: &str) -> Result<Command, DispatchError> {
    if text.is_empty() {
        return Err(DispatchError::EmptyPayload);
    }
    let (action, args) = match text.split_once(char::is_whitespace) {
        Some((action, rest)) if !rest.trim().is_empty() => {
            (action, Some(Value::String(rest.trim().to_owned())))
        }
        Some((action, _)) => (action, None),
        None => (text, None),
    };
    Ok(Command::new(target, action).with_args(args))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn parse(payload: &str) -> Result<Command, DispatchError> {
        Command::parse("coffin", &Message::new("ns/coffin/cmd", payload))
    }

    #[test]
    fn bare_token_has_no_argument() {
        let cmd = parse("ping").unwrap();
        assert_eq!(cmd.action, "ping");
        assert_eq!(cmd.args, None);
        assert_eq!(cmd.target, "coffin");
    }

    #[test]
    fn text_with_rest_becomes_string_argument() {
        let cmd = parse("  say  hello there ").unwrap();
        assert_eq!(cmd.action, "say");
        assert_eq!(cmd.args, Some(json!("hello there")));
    }

    #[test]
    fn json_object_with_structured_args() {
        let cmd = parse(r#"{"action":"chromecast","args":{"volume":0.5}}"#).unwrap();
        assert_eq!(cmd.action, "chromecast");
        assert_eq!(cmd.args, Some(json!({"volume": 0.5})));
        assert_eq!(cmd.correlation_id, None);
    }

    #[test]
    fn correlation_id_passes_through() {
        let cmd = parse(r#"{"action":"fire","correlationId":"abc-1"}"#).unwrap();
        assert_eq!(cmd.correlation_id, Some(json!("abc-1")));
    }

    #[test]
    fn json_string_is_text() {
        assert_eq!(parse(r#""ping""#).unwrap().action, "ping");
    }

    #[test]
    fn rejects_empty_and_actionless_payloads() {
        assert_eq!(parse("   "), Err(DispatchError::EmptyPayload));
        assert!(matches!(
            parse(r#"{"args": 1}"#),
            Err(DispatchError::InvalidPayload { .. })
        ));
        assert!(matches!(
            parse(r#"{"action": ""}"#),
            Err(DispatchError::InvalidPayload { .. })
        ));
        assert!(matches!(
            parse(r#"{"action": 5}"#),
            Err(DispatchError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn payload_omits_absent_fields() {
        let cmd = Command::new("b", "start");
        assert_eq!(cmd.to_payload(), br#"{"action":"start"}"#.to_vec());
        let cmd = Command::new("b", "volume").with_args(Some(json!(3)));
        let back: Value = serde_json::from_slice(&cmd.to_payload()).unwrap();
        assert_eq!(back, json!({"action": "volume", "args": 3}));
    }
}
