//! Reference-counted tag lifecycle.
//!
//! A tag exists only while at least one attachment references it. Detach and
//! the follow-up existence check run under the directory's write lock as one
//! unit, so a concurrent attach cannot resurrect a tag that is about to be
//! deleted and two concurrent detaches cannot both observe "still
//! referenced".

use uuid::Uuid;

use super::{Directory, DirectoryInner};
use crate::errors::{DomainError, DomainResult};
use crate::models::tag::{Tag, TagSubject};

impl Directory {
    /// Attaches the tag with this value to the subject, creating the tag if
    /// no entity currently carries it. Values are shared globally: two
    /// subjects tagged `"production"` reference the same tag row. Attaching
    /// an already-attached tag is a no-op.
    pub async fn attach_tag(&self, subject: TagSubject, value: &str) -> DomainResult<Tag> {
        let value = value.trim();
        if value.is_empty() {
            return Err(DomainError::bad_request("tag value must not be empty"));
        }
        let mut inner = self.inner.write().await;
        inner.ensure_subject_exists(&subject)?;
        let tag_id = match inner.tag_ids_by_value.get(value).copied() {
            Some(id) => id,
            None => {
                let tag = Tag {
                    id: Uuid::new_v4(),
                    value: value.to_string(),
                    created_at: chrono::Utc::now(),
                };
                let id = tag.id;
                inner.tag_ids_by_value.insert(tag.value.clone(), id);
                inner.tags.insert(id, tag);
                id
            }
        };
        inner.tag_refs.entry(tag_id).or_default().insert(subject);
        inner
            .tags
            .get(&tag_id)
            .cloned()
            .ok_or_else(|| DomainError::internal("tag index out of sync"))
    }

    /// Detaches the tag from the subject and deletes the tag record when that
    /// was its last reference. Returns whether the tag was deleted.
    pub async fn detach_tag(&self, subject: TagSubject, tag_id: Uuid) -> DomainResult<bool> {
        let mut inner = self.inner.write().await;
        if !inner.tags.contains_key(&tag_id) {
            return Err(DomainError::not_found("Tag not found"));
        }
        let removed = inner
            .tag_refs
            .get_mut(&tag_id)
            .map(|refs| refs.remove(&subject))
            .unwrap_or(false);
        if !removed {
            return Err(DomainError::not_found("Tag is not attached to that subject"));
        }
        Ok(inner.collect_tag_if_orphaned(tag_id))
    }

    /// True while at least one attachment (of any of the five subject kinds)
    /// references the tag.
    pub async fn is_tag_referenced(&self, tag_id: Uuid) -> bool {
        self.inner
            .read()
            .await
            .tag_refs
            .get(&tag_id)
            .map(|refs| !refs.is_empty())
            .unwrap_or(false)
    }

    pub async fn find_tag(&self, value: &str) -> Option<Tag> {
        let inner = self.inner.read().await;
        inner
            .tag_ids_by_value
            .get(value.trim())
            .and_then(|id| inner.tags.get(id))
            .cloned()
    }

    pub async fn tags_for(&self, subject: TagSubject) -> Vec<Tag> {
        let inner = self.inner.read().await;
        let mut tags: Vec<Tag> = inner
            .tag_refs
            .iter()
            .filter(|(_, refs)| refs.contains(&subject))
            .filter_map(|(tag_id, _)| inner.tags.get(tag_id))
            .cloned()
            .collect();
        tags.sort_by(|a, b| a.value.cmp(&b.value));
        tags
    }
}

impl DirectoryInner {
    pub(super) fn ensure_subject_exists(&self, subject: &TagSubject) -> DomainResult<()> {
        let exists = match subject {
            TagSubject::User(id) => self.users.contains_key(id),
            TagSubject::Group(id) => self.groups.contains_key(id),
            TagSubject::Policy(id) => self.policies.contains_key(id),
            TagSubject::Element(id) => self.elements.contains_key(id),
            TagSubject::Environment(id) => self.environments.contains_key(id),
        };
        if exists {
            Ok(())
        } else {
            Err(DomainError::not_found(format!(
                "{} not found",
                subject.kind()
            )))
        }
    }

    /// Deletes the tag record when no references remain. Returns whether the
    /// tag was deleted.
    pub(super) fn collect_tag_if_orphaned(&mut self, tag_id: Uuid) -> bool {
        let orphaned = self
            .tag_refs
            .get(&tag_id)
            .map(|refs| refs.is_empty())
            .unwrap_or(true);
        if orphaned {
            self.tag_refs.remove(&tag_id);
            if let Some(tag) = self.tags.remove(&tag_id) {
                self.tag_ids_by_value.remove(&tag.value);
                tracing::debug!(tag_id = %tag_id, value = %tag.value, "unreferenced tag removed");
            }
        }
        orphaned
    }

    /// Removes every tag attachment of the subject, garbage-collecting tags
    /// left without references. Used by cascade deletes.
    pub(super) fn purge_subject_tags(&mut self, subject: &TagSubject) {
        let tag_ids: Vec<Uuid> = self
            .tag_refs
            .iter()
            .filter(|(_, refs)| refs.contains(subject))
            .map(|(tag_id, _)| *tag_id)
            .collect();
        for tag_id in tag_ids {
            if let Some(refs) = self.tag_refs.get_mut(&tag_id) {
                refs.remove(subject);
            }
            self.collect_tag_if_orphaned(tag_id);
        }
    }
}
