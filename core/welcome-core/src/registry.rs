//! The registry of persisted sensor entries.
//!
//! The registry is the host's persistence: it outlives the process, and on
//! restart the engine rebuilds its handlers from what the registry holds.
//! Each entry therefore carries the context it was created from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Result, WelcomeError};
use crate::identity::EntryKey;
use crate::types::{RoomScope, SubjectKind};

/// Inputs an entry was derived from.
///
/// `subject_kind` is stored as the raw tag so that entries written by another
/// version (or corrupted on disk) still load and can be retired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryContext {
    pub subject_kind: String,
    pub subject_id: String,
    pub room_id: Option<String>,
}

impl EntryContext {
    pub fn new(kind: SubjectKind, subject_id: &str, scope: &RoomScope) -> Self {
        Self {
            subject_kind: kind.tag().to_string(),
            subject_id: subject_id.to_string(),
            room_id: scope.room_id().map(str::to_string),
        }
    }

    pub fn kind(&self) -> Option<SubjectKind> {
        SubjectKind::from_tag(&self.subject_kind)
    }

    pub fn scope(&self) -> RoomScope {
        RoomScope::from_room_id(self.room_id.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub key: EntryKey,
    pub label: String,
    /// Last activation written to the entry.
    pub active: bool,
    pub context: EntryContext,
}

/// Host registry: a keyed store of entries plus an activation sink.
///
/// The engine only writes activation when it changes; implementations do not
/// need to suppress redundant writes themselves.
pub trait Registry {
    fn entries(&self) -> Result<Vec<RegistryEntry>>;
    fn get(&self, key: &EntryKey) -> Result<Option<RegistryEntry>>;
    fn create(&mut self, key: &EntryKey, label: &str, context: EntryContext)
        -> Result<RegistryEntry>;
    fn remove(&mut self, key: &EntryKey) -> Result<()>;
    fn set_label(&mut self, key: &EntryKey, label: &str) -> Result<()>;
    fn set_activation(&mut self, key: &EntryKey, active: bool) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// In-memory registry
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationNotice {
    pub key: EntryKey,
    pub active: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Registry held in memory, with a log of every activation notification.
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    entries: BTreeMap<EntryKey, RegistryEntry>,
    notifications: Vec<ActivationNotice>,
    creates: usize,
    removals: usize,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the registry with entries, e.g. a copy of a persisted registry.
    /// Does not count as creates.
    pub fn with_entries(entries: impl IntoIterator<Item = RegistryEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|entry| (entry.key.clone(), entry))
                .collect(),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn notifications(&self) -> &[ActivationNotice] {
        &self.notifications
    }

    pub fn creates(&self) -> usize {
        self.creates
    }

    pub fn removals(&self) -> usize {
        self.removals
    }

    fn entry_mut(&mut self, key: &EntryKey, operation: &str) -> Result<&mut RegistryEntry> {
        self.entries
            .get_mut(key)
            .ok_or_else(|| WelcomeError::registry(operation, format!("no entry {}", key)))
    }
}

impl Registry for MemoryRegistry {
    fn entries(&self) -> Result<Vec<RegistryEntry>> {
        Ok(self.entries.values().cloned().collect())
    }

    fn get(&self, key: &EntryKey) -> Result<Option<RegistryEntry>> {
        Ok(self.entries.get(key).cloned())
    }

    fn create(
        &mut self,
        key: &EntryKey,
        label: &str,
        context: EntryContext,
    ) -> Result<RegistryEntry> {
        if self.entries.contains_key(key) {
            return Err(WelcomeError::registry(
                "create",
                format!("entry {} already exists", key),
            ));
        }

        let entry = RegistryEntry {
            key: key.clone(),
            label: label.to_string(),
            active: false,
            context,
        };
        self.entries.insert(key.clone(), entry.clone());
        self.creates += 1;
        Ok(entry)
    }

    fn remove(&mut self, key: &EntryKey) -> Result<()> {
        if self.entries.remove(key).is_some() {
            self.removals += 1;
        }
        Ok(())
    }

    fn set_label(&mut self, key: &EntryKey, label: &str) -> Result<()> {
        let entry = self.entry_mut(key, "set_label")?;
        if entry.label != label {
            entry.label = label.to_string();
        }
        Ok(())
    }

    fn set_activation(&mut self, key: &EntryKey, active: bool) -> Result<()> {
        self.entry_mut(key, "set_activation")?.active = active;
        self.notifications.push(ActivationNotice {
            key: key.clone(),
            active,
            recorded_at: Utc::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::derive_entry_key;

    fn context() -> EntryContext {
        EntryContext::new(SubjectKind::Anyone, "anyone", &RoomScope::Home)
    }

    #[test]
    fn create_rejects_duplicate_keys() {
        let mut registry = MemoryRegistry::new();
        let key = derive_entry_key(SubjectKind::Anyone, "anyone", &RoomScope::Home);

        registry.create(&key, "Anywhere Anyone", context()).unwrap();
        assert!(registry.create(&key, "Anywhere Anyone", context()).is_err());
        assert_eq!(registry.creates(), 1);
    }

    #[test]
    fn activation_writes_are_logged() {
        let mut registry = MemoryRegistry::new();
        let key = derive_entry_key(SubjectKind::Anyone, "anyone", &RoomScope::Home);
        registry.create(&key, "Anywhere Anyone", context()).unwrap();

        registry.set_activation(&key, true).unwrap();
        registry.set_activation(&key, false).unwrap();

        let notices: Vec<bool> = registry.notifications().iter().map(|n| n.active).collect();
        assert_eq!(notices, vec![true, false]);
        assert!(!registry.get(&key).unwrap().unwrap().active);
    }

    #[test]
    fn writes_to_missing_entries_fail() {
        let mut registry = MemoryRegistry::new();
        let key = EntryKey::from_stored("missing");
        assert!(registry.set_label(&key, "x").is_err());
        assert!(registry.set_activation(&key, true).is_err());
        assert!(registry.remove(&key).is_ok());
        assert_eq!(registry.removals(), 0);
    }

    #[test]
    fn context_round_trips_scope() {
        let ctx = EntryContext::new(
            SubjectKind::Role,
            "guest",
            &RoomScope::Room("hall".to_string()),
        );
        assert_eq!(ctx.kind(), Some(SubjectKind::Role));
        assert_eq!(ctx.scope(), RoomScope::Room("hall".to_string()));
    }
}
