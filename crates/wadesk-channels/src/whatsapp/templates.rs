use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// `{{1}}`, `{{2}}`, ... ASCII digits only.
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([0-9]+)\}\}").expect("placeholder pattern is valid"));

const APPROVED: &str = "APPROVED";

/// An approved template as pulled from the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncedTemplate {
    pub name: String,
    pub category: String,
    pub language: String,
    pub body_text: String,
    /// Positional indices in order of appearance; repeats are kept.
    pub variable_placeholders: Vec<String>,
    pub provider_template_id: String,
    pub is_approved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TemplateSyncResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates: Option<Vec<SyncedTemplate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TemplateSyncResult {
    pub fn synced(templates: Vec<SyncedTemplate>) -> Self {
        Self {
            success: true,
            templates: Some(templates),
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            templates: None,
            error: Some(error.to_string()),
        }
    }
}

/// Template node from `GET /{waba_id}/message_templates`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub components: Vec<ProviderComponent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderComponent {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl ProviderTemplate {
    fn body_text(&self) -> String {
        self.components
            .iter()
            .find(|c| c.kind.eq_ignore_ascii_case("BODY"))
            .and_then(|c| c.text.clone())
            .unwrap_or_default()
    }
}

/// Positional placeholders in order of appearance, duplicates preserved.
pub fn extract_placeholders(body: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(body)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Keep only provider-approved templates and convert them for storage.
pub fn approved_templates(templates: Vec<ProviderTemplate>) -> Vec<SyncedTemplate> {
    templates
        .into_iter()
        .filter(|t| {
            let approved = t.status == APPROVED;
            if !approved {
                debug!("skipping template {} with status {}", t.name, t.status);
            }
            approved
        })
        .map(|t| {
            let body_text = t.body_text();
            SyncedTemplate {
                variable_placeholders: extract_placeholders(&body_text),
                body_text,
                name: t.name,
                category: t.category,
                language: t.language,
                provider_template_id: t.id,
                is_approved: true,
            }
        })
        .collect()
}
