use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use super::SendError;
use super::builder::OutboundMessage;
use super::templates::ProviderTemplate;

pub const GRAPH_API_BASE: &str = "https://graph.facebook.com/v21.0";

/// Page size requested from the template listing endpoint.
const TEMPLATE_PAGE_LIMIT: u32 = 100;

#[derive(Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<SentMessage>,
}

#[derive(Deserialize)]
struct SentMessage {
    id: String,
}

/// Subset of the phone-number node used for connection tests and WABA lookup.
#[derive(Debug, Default, Deserialize)]
pub struct PhoneNumberInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub display_phone_number: Option<String>,
    #[serde(default)]
    pub verified_name: Option<String>,
    #[serde(default)]
    pub whatsapp_business_account: Option<NodeRef>,
}

#[derive(Debug, Deserialize)]
pub struct NodeRef {
    pub id: String,
}

#[derive(Deserialize)]
struct TemplateList {
    #[serde(default)]
    data: Vec<ProviderTemplate>,
}

/// Send one message. Returns the provider message id (`wamid...`).
pub async fn send_message(
    client: &Client,
    base_url: &str,
    token: &str,
    phone_number_id: &str,
    message: &OutboundMessage,
) -> Result<String, SendError> {
    let request = client
        .post(format!("{base_url}/{phone_number_id}/messages"))
        .bearer_auth(token)
        .json(&message.to_payload());

    let (status, body) = execute(request).await?;

    let message_id = body
        .as_ref()
        .filter(|_| status.is_success())
        .and_then(|b| SendResponse::deserialize(b).ok())
        .and_then(|r| r.messages.into_iter().next())
        .map(|m| m.id)
        .filter(|id| !id.is_empty());

    match message_id {
        Some(id) => Ok(id),
        None => {
            let err = provider_error(status, body.as_ref());
            warn!("whatsapp send_message rejected ({status}): {err}");
            Err(err)
        }
    }
}

/// `GET /{phone_number_id}`; plain lookup used to validate the token/id pair.
pub async fn fetch_phone_number(
    client: &Client,
    base_url: &str,
    token: &str,
    phone_number_id: &str,
) -> Result<PhoneNumberInfo, SendError> {
    let request = client
        .get(format!("{base_url}/{phone_number_id}"))
        .bearer_auth(token);
    get_json(request).await
}

/// Resolve the WhatsApp Business Account that owns `phone_number_id`.
/// `Ok(None)` when the provider answers but does not expose the account.
pub async fn fetch_business_account_id(
    client: &Client,
    base_url: &str,
    token: &str,
    phone_number_id: &str,
) -> Result<Option<String>, SendError> {
    let request = client
        .get(format!("{base_url}/{phone_number_id}"))
        .query(&[("fields", "id,whatsapp_business_account")])
        .bearer_auth(token);
    let info: PhoneNumberInfo = get_json(request).await?;
    Ok(info
        .whatsapp_business_account
        .map(|account| account.id)
        .filter(|id| !id.is_empty()))
}

pub async fn list_message_templates(
    client: &Client,
    base_url: &str,
    token: &str,
    business_account_id: &str,
) -> Result<Vec<ProviderTemplate>, SendError> {
    let request = client
        .get(format!("{base_url}/{business_account_id}/message_templates"))
        .query(&[("limit", TEMPLATE_PAGE_LIMIT)])
        .bearer_auth(token);
    let list: TemplateList = get_json(request).await?;
    Ok(list.data)
}

async fn get_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, SendError> {
    let (status, body) = execute(request).await?;
    if !status.is_success() {
        return Err(provider_error(status, body.as_ref()));
    }
    body.and_then(|b| serde_json::from_value(b).ok())
        .ok_or_else(|| provider_error(status, None))
}

/// Perform the request and read the body. The body is `None` when it is not JSON.
async fn execute(request: RequestBuilder) -> Result<(StatusCode, Option<Value>), SendError> {
    let resp = request
        .send()
        .await
        .map_err(|e| SendError::NetworkFailure(e.to_string()))?;

    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|e| SendError::NetworkFailure(e.to_string()))?;

    Ok((status, serde_json::from_str(&text).ok()))
}

/// Provider `error.message` when present, else `HTTP {status}: {reason}`.
fn provider_error(status: StatusCode, body: Option<&Value>) -> SendError {
    let message = body
        .and_then(|b| b.pointer("/error/message"))
        .and_then(Value::as_str)
        .filter(|m| !m.trim().is_empty())
        .map(String::from)
        .unwrap_or_else(|| {
            format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown Status")
            )
        });
    SendError::ProviderRejected(message)
}
