//! Notification preference model.
//!
//! Per document there are two bundles: `doc_defaults`, set by a
//! document owner, and per-user `current_user` overrides. Each field
//! merges override-if-present, otherwise inherit, otherwise the
//! fallback `{doc_changes: false, comments: relevant}`. Writes that
//! name unknown fields or invalid enum values are rejected at
//! deserialization.

use serde::{Deserialize, Serialize};

/// Which comment threads a user wants to hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentsPref {
    /// Every comment the user is allowed to see.
    All,
    /// Only threads the user participated in or was mentioned by.
    Relevant,
    /// No comment notifications at all.
    None,
}

/// One preference bundle. Absent fields inherit from the next layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DocPrefs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_changes: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<CommentsPref>,
}

/// Fully merged preferences for one (document, user) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectivePrefs {
    pub doc_changes: bool,
    pub comments: CommentsPref,
}

impl Default for EffectivePrefs {
    fn default() -> Self {
        Self {
            doc_changes: false,
            comments: CommentsPref::Relevant,
        }
    }
}

impl EffectivePrefs {
    /// Merge per-field: user override wins, then document default,
    /// then the built-in fallback.
    pub fn merge(doc_defaults: &DocPrefs, current_user: &DocPrefs) -> Self {
        Self {
            doc_changes: current_user
                .doc_changes
                .or(doc_defaults.doc_changes)
                .unwrap_or(false),
            comments: current_user
                .comments
                .or(doc_defaults.comments)
                .unwrap_or(CommentsPref::Relevant),
        }
    }
}

/// Overlay `patch` onto `base`, field by field. Used when an
/// unsubscribe link flips a single field of the current-user bundle.
pub fn overlay(base: &DocPrefs, patch: &DocPrefs) -> DocPrefs {
    DocPrefs {
        doc_changes: patch.doc_changes.or(base.doc_changes),
        comments: patch.comments.or(base.comments),
    }
}

/// What the config endpoint reads: both bundles for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PrefsBundle {
    #[serde(default)]
    pub doc_defaults: DocPrefs,
    #[serde(default)]
    pub current_user: DocPrefs,
}

/// What the config endpoint writes: either bundle, replaced wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PrefsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_defaults: Option<DocPrefs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_user: Option<DocPrefs>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_falls_back_to_defaults() {
        let merged = EffectivePrefs::merge(&DocPrefs::default(), &DocPrefs::default());
        assert_eq!(merged.doc_changes, false);
        assert_eq!(merged.comments, CommentsPref::Relevant);
    }

    #[test]
    fn merge_doc_defaults_inherited() {
        let defaults = DocPrefs {
            doc_changes: Some(true),
            comments: Some(CommentsPref::All),
        };
        let merged = EffectivePrefs::merge(&defaults, &DocPrefs::default());
        assert!(merged.doc_changes);
        assert_eq!(merged.comments, CommentsPref::All);
    }

    #[test]
    fn merge_user_override_wins_per_field() {
        let defaults = DocPrefs {
            doc_changes: Some(true),
            comments: Some(CommentsPref::All),
        };
        let user = DocPrefs {
            doc_changes: None,
            comments: Some(CommentsPref::None),
        };
        let merged = EffectivePrefs::merge(&defaults, &user);
        // doc_changes inherited, comments overridden.
        assert!(merged.doc_changes);
        assert_eq!(merged.comments, CommentsPref::None);
    }

    #[test]
    fn overlay_keeps_untouched_fields() {
        let base = DocPrefs {
            doc_changes: Some(true),
            comments: Some(CommentsPref::All),
        };
        let patch = DocPrefs {
            doc_changes: None,
            comments: Some(CommentsPref::None),
        };
        let out = overlay(&base, &patch);
        assert_eq!(out.doc_changes, Some(true));
        assert_eq!(out.comments, Some(CommentsPref::None));
    }

    #[test]
    fn unknown_fields_rejected() {
        let err = serde_json::from_str::<DocPrefs>(r#"{"docChanges": true, "push": true}"#);
        assert!(err.is_err());

        let err = serde_json::from_str::<PrefsPatch>(r#"{"currentUser": {"sms": false}}"#);
        assert!(err.is_err());
    }

    #[test]
    fn invalid_enum_value_rejected() {
        let err = serde_json::from_str::<DocPrefs>(r#"{"comments": "sometimes"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn wire_casing_is_camel() {
        let prefs: DocPrefs =
            serde_json::from_str(r#"{"docChanges": false, "comments": "relevant"}"#).unwrap();
        assert_eq!(prefs.doc_changes, Some(false));
        assert_eq!(prefs.comments, Some(CommentsPref::Relevant));

        let out = serde_json::to_string(&prefs).unwrap();
        assert!(out.contains("docChanges"));
    }
}
