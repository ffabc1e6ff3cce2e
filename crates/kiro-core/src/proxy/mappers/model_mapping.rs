//! Public model id -> upstream model id.

use serde::Serialize;

use kiro_types::error::TranslationError;

/// Placeholder creation timestamp reported by `/v1/models`.
const MODEL_CREATED: i64 = 1_234_567_890;
const MODEL_MAX_TOKENS: u32 = 200_000;

/// Supported public models, in listing order.
const MODEL_MAP: &[(&str, &str)] = &[
    ("claude-sonnet-4-5-20250929", "CLAUDE_SONNET_4_5_20250929_V1_0"),
    ("claude-sonnet-4-20250514", "CLAUDE_SONNET_4_20250514_V1_0"),
    ("claude-3-7-sonnet-20250219", "CLAUDE_3_7_SONNET_20250219_V1_0"),
    // Haiku has no pinned upstream id; the upstream picks a small model.
    ("claude-haiku-4-5-20251001", "auto"),
    ("claude-3-5-haiku-20241022", "auto"),
];

/// One entry of the `/v1/models` listing.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ModelEntry {
    pub id: &'static str,
    pub object: &'static str,
    pub created: i64,
    pub owned_by: &'static str,
    pub display_name: &'static str,
    #[serde(rename = "type")]
    pub model_type: &'static str,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ModelList {
    pub object: &'static str,
    pub data: Vec<ModelEntry>,
}

/// Resolve the upstream model id for a public model id.
pub fn resolve_upstream_model(model: &str) -> Result<&'static str, TranslationError> {
    MODEL_MAP
        .iter()
        .find(|(public, _)| *public == model)
        .map(|(_, upstream)| *upstream)
        .ok_or_else(|| {
            TranslationError::unsupported("model", format!("model '{}' is not supported", model))
        })
}

pub fn supported_models() -> impl Iterator<Item = &'static str> {
    MODEL_MAP.iter().map(|(public, _)| *public)
}

pub fn list_models() -> ModelList {
    ModelList {
        object: "list",
        data: supported_models()
            .map(|id| ModelEntry {
                id,
                object: "model",
                created: MODEL_CREATED,
                owned_by: "anthropic",
                display_name: id,
                model_type: "text",
                max_tokens: MODEL_MAX_TOKENS,
            })
            .collect(),
    }
}
