use std::fmt;

use serde::{Deserialize, Serialize};

/// Document identifier (opaque string, assigned by the hosting platform).
pub type DocId = String;

/// Numeric user identifier.
pub type UserId = i64;

/// Stable external user reference, used in comment audiences and
/// unsubscribe tokens. Unlike [`UserId`], refs survive re-imports.
pub type UserRef = String;

/// Notification stream with its own delivery schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    DocChange,
    Comment,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::DocChange => "doc-change",
            Category::Comment => "comment",
        }
    }

    /// Parse a category from its wire form. Returns `None` for unknown
    /// categories so callers can log-and-discard rather than fail hard.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "doc-change" => Some(Category::DocChange),
            "comment" => Some(Category::Comment),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the batch key under which payloads and the marker coalesce.
///
/// Keys are case-sensitive and opaque to the stores; only the renderer
/// parses them back apart.
pub fn batch_key(doc_id: &str, user_id: UserId) -> String {
    format!("{doc_id}:{user_id}")
}

/// Split a batch key back into `(doc_id, user_id)`.
///
/// Splits on the last `:` so doc ids containing colons round-trip.
pub fn parse_batch_key(key: &str) -> Option<(DocId, UserId)> {
    let (doc_id, user_id) = key.rsplit_once(':')?;
    if doc_id.is_empty() {
        return None;
    }
    Some((doc_id.to_string(), user_id.parse().ok()?))
}
