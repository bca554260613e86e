//! Per-event payload records accumulated in the batch store.
//!
//! Payloads are opaque to the store and the engine; the decider
//! encodes them as JSON and the renderer decodes them back.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use docpost_core::{DocpostError, UserId};

/// One qualifying edit bundle, as seen by one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocChangePayload {
    pub author: UserId,
    pub table_names: Vec<String>,
    pub categories: Vec<String>,
}

/// One comment visible to one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentPayload {
    pub author: UserId,
    pub has_mention: bool,
    pub text: String,
    pub anchor: String,
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, DocpostError> {
    serde_json::to_vec(value).map_err(|e| DocpostError::Render(e.to_string()))
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DocpostError> {
    serde_json::from_slice(bytes).map_err(|e| DocpostError::Render(e.to_string()))
}
