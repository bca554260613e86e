//! In-memory collaborator implementations.
//!
//! Back the dev server and every pipeline test. `MemoryAccessView`
//! additionally counts ACL calls so tests can assert the decider's
//! quiet-case short-circuit really skipped them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use docpost_core::{DocId, DocpostError, UserId};

use crate::directory::{
    AccessView, BundleComment, DirectTables, Directory, DocInfo, Subscriber, UserKind, UserProfile,
};
use crate::prefs::{DocPrefs, EffectivePrefs, PrefsBundle, PrefsPatch};

struct DocRecord {
    info: DocInfo,
    doc_defaults: DocPrefs,
    user_prefs: HashMap<UserId, DocPrefs>,
    access: Vec<UserId>,
}

#[derive(Default)]
struct Inner {
    users: HashMap<UserId, UserProfile>,
    docs: HashMap<DocId, DocRecord>,
}

/// Mutex-guarded directory for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryDirectory {
    inner: Mutex<Inner>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, user: UserProfile) {
        self.inner.lock().await.users.insert(user.id, user);
    }

    /// Convenience for the common case of a regular user.
    pub async fn add_regular_user(&self, id: UserId, name: &str, email: &str) {
        self.add_user(UserProfile {
            id,
            user_ref: format!("u-{id}"),
            name: name.to_string(),
            email: email.to_string(),
            kind: UserKind::Regular,
            unsubscribe_key: None,
        })
        .await;
    }

    pub async fn add_doc(&self, info: DocInfo) {
        self.inner.lock().await.docs.insert(
            info.id.clone(),
            DocRecord {
                info,
                doc_defaults: DocPrefs::default(),
                user_prefs: HashMap::new(),
                access: Vec::new(),
            },
        );
    }

    /// Give `user_id` (non-public-link) access to `doc_id`.
    pub async fn grant(&self, doc_id: &str, user_id: UserId) {
        if let Some(doc) = self.inner.lock().await.docs.get_mut(doc_id) {
            if !doc.access.contains(&user_id) {
                doc.access.push(user_id);
            }
        }
    }

    pub async fn set_doc_defaults(&self, doc_id: &str, prefs: DocPrefs) {
        if let Some(doc) = self.inner.lock().await.docs.get_mut(doc_id) {
            doc.doc_defaults = prefs;
        }
    }

    pub async fn set_user_prefs(&self, doc_id: &str, user_id: UserId, prefs: DocPrefs) {
        if let Some(doc) = self.inner.lock().await.docs.get_mut(doc_id) {
            doc.user_prefs.insert(user_id, prefs);
        }
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn access(&self, doc_id: &str) -> Result<Vec<Subscriber>, DocpostError> {
        let inner = self.inner.lock().await;
        let doc = inner
            .docs
            .get(doc_id)
            .ok_or_else(|| DocpostError::NotFound(format!("document '{doc_id}'")))?;
        let mut subscribers = Vec::new();
        for user_id in &doc.access {
            let Some(user) = inner.users.get(user_id) else {
                continue;
            };
            if user.kind.is_synthetic() {
                continue;
            }
            let overrides = doc.user_prefs.get(user_id).copied().unwrap_or_default();
            subscribers.push(Subscriber {
                user: user.clone(),
                prefs: EffectivePrefs::merge(&doc.doc_defaults, &overrides),
            });
        }
        Ok(subscribers)
    }

    async fn doc_info(&self, doc_id: &str) -> Result<DocInfo, DocpostError> {
        self.inner
            .lock()
            .await
            .docs
            .get(doc_id)
            .map(|d| d.info.clone())
            .ok_or_else(|| DocpostError::NotFound(format!("document '{doc_id}'")))
    }

    async fn user(&self, user_id: UserId) -> Result<UserProfile, DocpostError> {
        self.inner
            .lock()
            .await
            .users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| DocpostError::NotFound(format!("user {user_id}")))
    }

    async fn user_by_ref(&self, user_ref: &str) -> Result<Option<UserProfile>, DocpostError> {
        Ok(self
            .inner
            .lock()
            .await
            .users
            .values()
            .find(|u| u.user_ref == user_ref)
            .cloned())
    }

    async fn ensure_unsubscribe_key(&self, user_id: UserId) -> Result<String, DocpostError> {
        let mut inner = self.inner.lock().await;
        let user = inner
            .users
            .get_mut(&user_id)
            .ok_or_else(|| DocpostError::NotFound(format!("user {user_id}")))?;
        if let Some(key) = &user.unsubscribe_key {
            return Ok(key.clone());
        }
        let key = hex::encode(rand::random::<[u8; 32]>());
        user.unsubscribe_key = Some(key.clone());
        Ok(key)
    }

    async fn prefs(&self, doc_id: &str, user_id: UserId) -> Result<PrefsBundle, DocpostError> {
        let inner = self.inner.lock().await;
        let doc = inner
            .docs
            .get(doc_id)
            .ok_or_else(|| DocpostError::NotFound(format!("document '{doc_id}'")))?;
        Ok(PrefsBundle {
            doc_defaults: doc.doc_defaults,
            current_user: doc.user_prefs.get(&user_id).copied().unwrap_or_default(),
        })
    }

    async fn set_prefs(
        &self,
        doc_id: &str,
        user_id: UserId,
        patch: &PrefsPatch,
    ) -> Result<(), DocpostError> {
        let mut inner = self.inner.lock().await;
        let doc = inner
            .docs
            .get_mut(doc_id)
            .ok_or_else(|| DocpostError::NotFound(format!("document '{doc_id}'")))?;
        if let Some(defaults) = patch.doc_defaults {
            doc.doc_defaults = defaults;
        }
        if let Some(current) = patch.current_user {
            doc.user_prefs.insert(user_id, current);
        }
        Ok(())
    }
}

/// Scripted access view for one bundle, with call counters.
#[derive(Default)]
pub struct MemoryAccessView {
    tables: HashMap<UserId, DirectTables>,
    /// Comments with an optional allow-list; `None` means visible to
    /// every user.
    comments: Vec<(BundleComment, Option<Vec<UserId>>)>,
    direct_tables_calls: AtomicUsize,
    comments_calls: AtomicUsize,
}

impl MemoryAccessView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script what `user_id` sees of the bundle's table changes.
    pub fn with_tables(mut self, user_id: UserId, tables: DirectTables) -> Self {
        self.tables.insert(user_id, tables);
        self
    }

    /// Script a comment; restrict visibility with an allow-list.
    pub fn with_comment(mut self, comment: BundleComment, visible_to: Option<Vec<UserId>>) -> Self {
        self.comments.push((comment, visible_to));
        self
    }

    /// Total ACL round-trips made against this view.
    pub fn acl_calls(&self) -> usize {
        self.direct_tables_calls.load(Ordering::SeqCst)
            + self.comments_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccessView for MemoryAccessView {
    async fn direct_tables(
        &self,
        user: &UserProfile,
    ) -> Result<Option<DirectTables>, DocpostError> {
        self.direct_tables_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.tables.get(&user.id).cloned())
    }

    async fn comments_in_bundle(
        &self,
        user: Option<&UserProfile>,
    ) -> Result<Vec<BundleComment>, DocpostError> {
        self.comments_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .comments
            .iter()
            .filter(|(_, visible_to)| match (user, visible_to) {
                (None, _) | (_, None) => true,
                (Some(u), Some(allowed)) => allowed.contains(&u.id),
            })
            .map(|(c, _)| c.clone())
            .collect())
    }
}
