//! Provider webhook handshake and callback decoding.
//!
//! Callbacks arrive as `{ "entry": [{ "changes": [{ "value": { ... } }] }] }`.
//! Every `value.messages[]` and `value.statuses[]` item is flattened into one
//! list each, in traversal order. Downstream status reconstruction relies on
//! that order ("sent" before "delivered" for the same message).

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge: Option<String>,
}

/// Subscription handshake: `hub.mode` must be `subscribe` and the token must
/// match exactly. The challenge is echoed back untouched.
pub fn verify_subscription(
    mode: &str,
    token: &str,
    challenge: &str,
    expected_token: &str,
) -> VerificationResult {
    if mode == "subscribe" && token == expected_token {
        VerificationResult {
            success: true,
            challenge: Some(challenge.to_string()),
        }
    } else {
        VerificationResult {
            success: false,
            challenge: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sent" => Some(Self::Sent),
            "delivered" => Some(Self::Delivered),
            "read" => Some(Self::Read),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub from: String,
    pub provider_message_id: String,
    pub text: String,
    /// Epoch milliseconds.
    pub received_at: i64,
    pub message_type: String,
    pub contact_name: Option<String>,
    /// Business phone number the message was sent to.
    pub phone_number_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub provider_message_id: String,
    pub status: MessageStatus,
    /// Epoch milliseconds.
    pub occurred_at: i64,
    pub recipient: String,
    pub error: Option<String>,
    pub phone_number_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackEvents {
    pub messages: Vec<MessageEvent>,
    pub statuses: Vec<StatusEvent>,
}

impl CallbackEvents {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.statuses.is_empty()
    }
}

#[derive(Deserialize)]
struct RawMessage {
    from: String,
    id: String,
    #[serde(default)]
    timestamp: Option<Value>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    text: Option<RawText>,
    #[serde(default)]
    button: Option<RawButton>,
    #[serde(default)]
    interactive: Option<RawInteractive>,
    #[serde(default)]
    image: Option<RawMedia>,
    #[serde(default)]
    video: Option<RawMedia>,
    #[serde(default)]
    document: Option<RawMedia>,
}

#[derive(Deserialize)]
struct RawText {
    #[serde(default)]
    body: String,
}

#[derive(Deserialize)]
struct RawButton {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct RawInteractive {
    #[serde(default)]
    button_reply: Option<RawReply>,
    #[serde(default)]
    list_reply: Option<RawReply>,
}

#[derive(Deserialize)]
struct RawReply {
    #[serde(default)]
    title: String,
}

#[derive(Deserialize)]
struct RawMedia {
    #[serde(default)]
    caption: Option<String>,
}

#[derive(Deserialize)]
struct RawStatus {
    id: String,
    status: String,
    #[serde(default)]
    timestamp: Option<Value>,
    #[serde(default)]
    recipient_id: String,
    #[serde(default)]
    errors: Vec<RawError>,
}

#[derive(Deserialize)]
struct RawError {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct RawContact {
    #[serde(default)]
    wa_id: String,
    #[serde(default)]
    profile: Option<RawProfile>,
}

#[derive(Deserialize)]
struct RawProfile {
    #[serde(default)]
    name: Option<String>,
}

impl RawMessage {
    /// Best human-readable text for any message type.
    fn display_text(&self) -> String {
        if let Some(text) = &self.text {
            return text.body.clone();
        }
        if let Some(button) = &self.button {
            return button.text.clone();
        }
        if let Some(interactive) = &self.interactive {
            if let Some(reply) = interactive
                .button_reply
                .as_ref()
                .or(interactive.list_reply.as_ref())
            {
                return reply.title.clone();
            }
        }
        [&self.image, &self.video, &self.document]
            .into_iter()
            .flatten()
            .find_map(|media| media.caption.clone())
            .unwrap_or_default()
    }
}

/// Decode a provider callback. Never fails: missing or malformed sections
/// contribute no events, and an invalid item is skipped without affecting the rest.
pub fn parse_callback(payload: &Value) -> CallbackEvents {
    let mut events = CallbackEvents::default();

    for entry in array_at(payload, "entry") {
        for change in array_at(entry, "changes") {
            let Some(value) = change.get("value") else {
                continue;
            };

            let phone_number_id = value
                .pointer("/metadata/phone_number_id")
                .and_then(Value::as_str)
                .map(String::from);

            let contacts: Vec<RawContact> = array_at(value, "contacts")
                .iter()
                .filter_map(|c| RawContact::deserialize(c).ok())
                .collect();

            for item in array_at(value, "messages") {
                match RawMessage::deserialize(item) {
                    Ok(raw) => {
                        let contact_name = contacts
                            .iter()
                            .find(|c| c.wa_id == raw.from)
                            .and_then(|c| c.profile.as_ref())
                            .and_then(|p| p.name.clone());
                        events.messages.push(MessageEvent {
                            text: raw.display_text(),
                            received_at: timestamp_millis(raw.timestamp.as_ref()),
                            message_type: raw.kind.unwrap_or_else(|| "unknown".to_string()),
                            from: raw.from,
                            provider_message_id: raw.id,
                            contact_name,
                            phone_number_id: phone_number_id.clone(),
                        });
                    }
                    Err(e) => warn!("whatsapp: skipping malformed message item: {e}"),
                }
            }

            for item in array_at(value, "statuses") {
                let raw = match RawStatus::deserialize(item) {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!("whatsapp: skipping malformed status item: {e}");
                        continue;
                    }
                };
                let Some(status) = MessageStatus::parse(&raw.status) else {
                    debug!("whatsapp: ignoring status {:?} for {}", raw.status, raw.id);
                    continue;
                };
                let error = raw
                    .errors
                    .into_iter()
                    .next()
                    .and_then(|e| e.message.or(e.title));
                events.statuses.push(StatusEvent {
                    provider_message_id: raw.id,
                    status,
                    occurred_at: timestamp_millis(raw.timestamp.as_ref()),
                    recipient: raw.recipient_id,
                    error,
                    phone_number_id: phone_number_id.clone(),
                });
            }
        }
    }

    events
}

fn array_at<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Provider timestamps are Unix seconds, sent as a string or a number.
fn timestamp_millis(value: Option<&Value>) -> i64 {
    let seconds = match value {
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(Value::Number(n)) => n.as_i64(),
        _ => None,
    };
    match seconds {
        Some(s) => s.saturating_mul(1000),
        None => {
            debug!("whatsapp: missing or unparseable timestamp, using receipt time");
            Utc::now().timestamp_millis()
        }
    }
}
