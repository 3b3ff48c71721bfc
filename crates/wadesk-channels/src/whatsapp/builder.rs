//! Construction of outbound WhatsApp messages and their Graph API wire form.
//!
//! Building is pure: nothing here touches the network. Invalid input is a
//! caller bug and is returned as a [`BuildError`].

use serde::Serialize;
use thiserror::Error;

/// Minimum number of digits in a routable recipient address.
const MIN_PHONE_DIGITS: usize = 8;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("invalid recipient address: {0:?}")]
    InvalidAddress(String),

    #[error("message body is empty")]
    EmptyContent,

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    Text {
        to: String,
        body: String,
    },
    Template {
        to: String,
        template_name: String,
        language_code: String,
        /// Positional body variables, `{{1}}` first.
        body_parameters: Vec<String>,
        cta_url: Option<String>,
    },
}

impl OutboundMessage {
    pub fn to(&self) -> &str {
        match self {
            Self::Text { to, .. } | Self::Template { to, .. } => to,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Template { .. } => "template",
        }
    }

    /// Graph API request body for `POST /{phone_number_id}/messages`.
    pub fn to_payload(&self) -> MessagePayload<'_> {
        let body = match self {
            Self::Text { body, .. } => PayloadBody::Text {
                text: TextBody {
                    preview_url: false,
                    body,
                },
            },
            Self::Template {
                template_name,
                language_code,
                body_parameters,
                cta_url,
                ..
            } => {
                let mut components = Vec::new();
                // An empty parameters array is not the same as no body component.
                if !body_parameters.is_empty() {
                    components.push(Component::Body {
                        parameters: body_parameters.iter().map(|p| TextParameter::new(p)).collect(),
                    });
                }
                if let Some(url) = cta_url {
                    components.push(Component::Button {
                        sub_type: "url",
                        index: "0",
                        parameters: vec![TextParameter::new(url)],
                    });
                }
                PayloadBody::Template {
                    template: TemplateBody {
                        name: template_name,
                        language: Language {
                            code: language_code,
                        },
                        components,
                    },
                }
            }
        };

        MessagePayload {
            messaging_product: "whatsapp",
            recipient_type: "individual",
            to: self.to(),
            body,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessagePayload<'a> {
    messaging_product: &'static str,
    recipient_type: &'static str,
    to: &'a str,
    #[serde(flatten)]
    body: PayloadBody<'a>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum PayloadBody<'a> {
    Text { text: TextBody<'a> },
    Template { template: TemplateBody<'a> },
}

#[derive(Debug, Serialize)]
struct TextBody<'a> {
    preview_url: bool,
    body: &'a str,
}

#[derive(Debug, Serialize)]
struct TemplateBody<'a> {
    name: &'a str,
    language: Language<'a>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    components: Vec<Component<'a>>,
}

#[derive(Debug, Serialize)]
struct Language<'a> {
    code: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Component<'a> {
    Body {
        parameters: Vec<TextParameter<'a>>,
    },
    Button {
        sub_type: &'static str,
        index: &'static str,
        parameters: Vec<TextParameter<'a>>,
    },
}

#[derive(Debug, Serialize)]
struct TextParameter<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

impl<'a> TextParameter<'a> {
    fn new(text: &'a str) -> Self {
        Self { kind: "text", text }
    }
}

/// Keep digits and a leading `+`; everything else is dropped.
pub fn normalize_phone(raw: &str) -> Result<String, BuildError> {
    let trimmed = raw.trim();
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();

    if digits.len() < MIN_PHONE_DIGITS {
        return Err(BuildError::InvalidAddress(raw.to_string()));
    }

    if trimmed.starts_with('+') {
        Ok(format!("+{digits}"))
    } else {
        Ok(digits)
    }
}

/// Provider naming convention: lower-case, `[a-z0-9_]` only. Idempotent.
pub fn normalize_template_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

pub fn build_text_message(to: &str, body: &str) -> Result<OutboundMessage, BuildError> {
    let to = normalize_phone(to)?;
    if body.trim().is_empty() {
        return Err(BuildError::EmptyContent);
    }
    Ok(OutboundMessage::Text {
        to,
        body: body.to_string(),
    })
}

pub fn build_template_message(
    to: &str,
    template_name: &str,
    language_code: &str,
    variables: &[String],
    cta_url: Option<&str>,
) -> Result<OutboundMessage, BuildError> {
    let to = normalize_phone(to)?;

    if template_name.trim().is_empty() {
        return Err(BuildError::MissingField("template_name"));
    }
    let template_name = normalize_template_name(template_name);

    let language_code = language_code.trim();
    if language_code.is_empty() {
        return Err(BuildError::MissingField("language_code"));
    }

    let cta_url = cta_url
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(String::from);

    Ok(OutboundMessage::Template {
        to,
        template_name,
        language_code: language_code.to_string(),
        body_parameters: variables.to_vec(),
        cta_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn payload_json(message: &OutboundMessage) -> Value {
        serde_json::to_value(message.to_payload()).unwrap()
    }

    #[test]
    fn phone_keeps_leading_plus_and_digits() {
        assert_eq!(normalize_phone("+1 (234) 567-8900").unwrap(), "+12345678900");
        assert_eq!(normalize_phone("44 7700 900123").unwrap(), "447700900123");
    }

    #[test]
    fn phone_with_too_few_digits_is_rejected() {
        assert_eq!(
            normalize_phone("+1 234-567"),
            Err(BuildError::InvalidAddress("+1 234-567".into()))
        );
        assert!(normalize_phone("call me").is_err());
    }

    #[test]
    fn plus_only_counts_when_leading() {
        assert_eq!(normalize_phone("1234+5678901").unwrap(), "12345678901");
    }

    #[test]
    fn template_name_normalization_is_idempotent() {
        for raw in [
            "Order Shipped!",
            "promo-2024 Spring",
            "already_ok_123",
            "Ünïcödé name",
            "",
            "UPPER__case",
        ] {
            let once = normalize_template_name(raw);
            assert_eq!(normalize_template_name(&once), once, "input {raw:?}");
            assert!(
                once.chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'),
                "output {once:?}"
            );
        }
        assert_eq!(normalize_template_name("Order Shipped!"), "order_shipped_");
    }

    #[test]
    fn text_message_requires_body() {
        assert_eq!(
            build_text_message("+12345678900", "   \n"),
            Err(BuildError::EmptyContent)
        );
    }

    #[test]
    fn text_message_wire_format() {
        let msg = build_text_message("+1 234 567 8900", "hello").unwrap();
        assert_eq!(
            payload_json(&msg),
            json!({
                "messaging_product": "whatsapp",
                "recipient_type": "individual",
                "to": "+12345678900",
                "type": "text",
                "text": { "preview_url": false, "body": "hello" }
            })
        );
    }

    #[test]
    fn template_without_variables_has_no_body_component() {
        let msg = build_template_message("+12345678900", "welcome", "en_US", &[], None).unwrap();
        let json = payload_json(&msg);
        assert_eq!(json["type"], "template");
        assert_eq!(json["template"]["name"], "welcome");
        assert_eq!(json["template"]["language"]["code"], "en_US");
        assert!(json["template"].get("components").is_none());
    }

    #[test]
    fn template_with_one_variable_has_one_text_parameter() {
        let msg = build_template_message(
            "+12345678900",
            "welcome",
            "en_US",
            &["Alice".to_string()],
            None,
        )
        .unwrap();
        let json = payload_json(&msg);
        let components = json["template"]["components"].as_array().unwrap();
        assert_eq!(components.len(), 1);
        assert_eq!(components[0]["type"], "body");
        assert_eq!(
            components[0]["parameters"],
            json!([{ "type": "text", "text": "Alice" }])
        );
    }

    #[test]
    fn template_parameters_keep_input_order() {
        let vars = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let msg = build_template_message("+12345678900", "x", "en", &vars, None).unwrap();
        let json = payload_json(&msg);
        let texts: Vec<&str> = json["template"]["components"][0]["parameters"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["text"].as_str().unwrap())
            .collect();
        assert_eq!(texts, ["a", "b", "c"]);
    }

    #[test]
    fn cta_url_button_added_without_body_parameters() {
        let msg = build_template_message(
            "+12345678900",
            "Track Order",
            "en",
            &[],
            Some("orders/123"),
        )
        .unwrap();
        let json = payload_json(&msg);
        assert_eq!(json["template"]["name"], "track_order");
        assert_eq!(
            json["template"]["components"],
            json!([{
                "type": "button",
                "sub_type": "url",
                "index": "0",
                "parameters": [{ "type": "text", "text": "orders/123" }]
            }])
        );
    }

    #[test]
    fn cta_url_button_follows_body_component() {
        let msg = build_template_message(
            "+12345678900",
            "track",
            "en",
            &["Bob".to_string()],
            Some("https://example.com/t/1"),
        )
        .unwrap();
        let json = payload_json(&msg);
        let components = json["template"]["components"].as_array().unwrap();
        assert_eq!(components.len(), 2);
        assert_eq!(components[0]["type"], "body");
        assert_eq!(components[1]["type"], "button");
        assert_eq!(components[1]["index"], "0");
    }

    #[test]
    fn template_requires_name_and_language() {
        assert_eq!(
            build_template_message("+12345678900", "  ", "en", &[], None),
            Err(BuildError::MissingField("template_name"))
        );
        assert_eq!(
            build_template_message("+12345678900", "hi", "", &[], None),
            Err(BuildError::MissingField("language_code"))
        );
    }

    #[test]
    fn template_name_whitespace_is_normalized_not_trimmed() {
        let msg = build_template_message("+12345678900", "  Welcome ", "en", &[], None).unwrap();
        match msg {
            OutboundMessage::Template { template_name, .. } => {
                assert_eq!(template_name, "__welcome_");
                assert_eq!(template_name, normalize_template_name("  Welcome "));
            }
            other => panic!("unexpected message {other:?}"),
        }
    }
}
