//! Collaborator capabilities the pipeline depends on.
//!
//! The directory owns user/document records and stored preferences;
//! the access view answers per-bundle visibility questions. Both are
//! provided by the hosting platform. This crate only contracts their
//! shapes and ships in-memory implementations for tests and the dev
//! server (see [`crate::memory`]).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use docpost_core::{DocId, DocpostError, UserId, UserRef};

use crate::prefs::{EffectivePrefs, PrefsBundle, PrefsPatch};

/// Distinguishes real accounts from the synthetic directory entries
/// that represent share semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserKind {
    Regular,
    /// The anonymous placeholder user.
    Anonymous,
    /// The everyone-with-the-link placeholder user.
    Everyone,
    /// The support account. Support may legitimately author changes,
    /// so it is NOT filtered the way the other synthetic users are.
    Support,
}

impl UserKind {
    /// Synthetic entries never receive notifications.
    pub fn is_synthetic(&self) -> bool {
        matches!(self, UserKind::Anonymous | UserKind::Everyone)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    /// Stable external reference; appears in comment audiences and
    /// unsubscribe tokens.
    pub user_ref: UserRef,
    pub name: String,
    pub email: String,
    pub kind: UserKind,
    /// Per-user secret for signing unsubscribe links; minted lazily.
    pub unsubscribe_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocInfo {
    pub id: DocId,
    pub name: String,
    /// Pretty URL fragment; falls back to the doc id when absent.
    pub url_id: Option<String>,
}

/// One user with access to a document, carrying their merged prefs.
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub user: UserProfile,
    pub prefs: EffectivePrefs,
}

/// Directory capability: users, documents, stored preferences.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Users with non-public-link access to `doc_id`, each with merged
    /// preferences. Users reachable only through an anonymous share
    /// link are not listed.
    async fn access(&self, doc_id: &str) -> Result<Vec<Subscriber>, DocpostError>;

    async fn doc_info(&self, doc_id: &str) -> Result<DocInfo, DocpostError>;

    async fn user(&self, user_id: UserId) -> Result<UserProfile, DocpostError>;

    /// Lookup by external ref; `None` when no such user exists (the
    /// unsubscribe endpoint must not leak which refs are real).
    async fn user_by_ref(&self, user_ref: &str) -> Result<Option<UserProfile>, DocpostError>;

    /// Return the user's unsubscribe key, minting one with a
    /// write-if-absent on first use.
    async fn ensure_unsubscribe_key(&self, user_id: UserId) -> Result<String, DocpostError>;

    /// Stored (unmerged) preference bundles for one (doc, user) pair.
    async fn prefs(&self, doc_id: &str, user_id: UserId) -> Result<PrefsBundle, DocpostError>;

    /// Replace the bundles named in `patch`; bundles not named are
    /// left untouched.
    async fn set_prefs(
        &self,
        doc_id: &str,
        user_id: UserId,
        patch: &PrefsPatch,
    ) -> Result<(), DocpostError>;
}

/// What one recipient may see of a bundle's direct table changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectTables {
    pub author: UserId,
    /// User-facing names of changed tables visible to this recipient.
    pub table_names: Vec<String>,
    /// Kinds of change in the bundle (e.g. "add-record", "update-record").
    pub categories: Vec<String>,
}

/// One comment thread entry within a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleComment {
    pub author: UserId,
    pub text: String,
    /// Link target inside the document (row/section anchor).
    pub anchor: String,
    /// Users explicitly called out by the comment.
    pub mentions: Vec<UserRef>,
    /// Everyone who participated in the thread, mentions included.
    pub audience: Vec<UserRef>,
}

/// Per-bundle access control view.
#[async_trait]
pub trait AccessView: Send + Sync {
    /// Describe the bundle's direct table changes as visible to
    /// `user`, or `None` when nothing is visible to them.
    async fn direct_tables(
        &self,
        user: &UserProfile,
    ) -> Result<Option<DirectTables>, DocpostError>;

    /// Comments in the bundle. With a user, the list is ACL-filtered
    /// to what that user may read; with `None` it is the full set
    /// (used to compute thread participants).
    async fn comments_in_bundle(
        &self,
        user: Option<&UserProfile>,
    ) -> Result<Vec<BundleComment>, DocpostError>;
}
