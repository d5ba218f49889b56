//! ReconciliationEngine - mirrors the presence snapshot onto the registry.
//!
//! One cycle runs three passes in a fixed order:
//!
//! 1. **Revalidate**: every registry entry gets a handler (cached or rebuilt
//!    from its stored context); entries that are no longer valid are removed.
//!    This runs first so a stale binding never blocks a corrected one.
//! 2. **Ensure**: for every subject seen in presence, plus Anyone, ensure the
//!    home-wide entry and one entry per known room, creating those that policy
//!    permits and that are not bound yet.
//! 3. **Update**: every bound entry refreshes its label and activation.
//!
//! Running a cycle twice on unchanged data creates nothing, removes nothing
//! and reports no activation changes the second time.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use welcome_core::{LoadOptions, MemoryRegistry, ReconciliationEngine};
//!
//! let mut engine = ReconciliationEngine::new(MemoryRegistry::new());
//! let report = engine.refresh(&directory, &LoadOptions::new("home-1"))?;
//! ```

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::directory::{DirectorySnapshot, DirectorySource, LoadOptions};
use crate::error::{Result, WelcomeError};
use crate::handler::{EntryHandler, EntryState, RetireReason};
use crate::identity::{derive_entry_key, EntryKey};
use crate::registry::{Registry, RegistryEntry};
use crate::types::{RoomScope, Subject, SubjectKind};

/// Handlers keyed by the registry key they are bound to.
pub type HandlerCache = HashMap<EntryKey, EntryHandler>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedEntry {
    pub key: EntryKey,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovedEntry {
    pub key: EntryKey,
    pub label: String,
    pub reason: RetireReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryUpdate {
    pub key: EntryKey,
    pub label: String,
    pub active: bool,
    pub changed: bool,
}

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub created: Vec<CreatedEntry>,
    pub removed: Vec<RemovedEntry>,
    pub updates: Vec<EntryUpdate>,
}

impl CycleReport {
    pub fn changed_count(&self) -> usize {
        self.updates.iter().filter(|update| update.changed).count()
    }

    pub fn is_quiet(&self) -> bool {
        self.created.is_empty() && self.removed.is_empty() && self.changed_count() == 0
    }
}

/// Runs one reconciliation cycle against an explicit registry and handler
/// cache.
pub fn reconcile<R: Registry + ?Sized>(
    registry: &mut R,
    handlers: &mut HandlerCache,
    snapshot: &DirectorySnapshot,
) -> Result<CycleReport> {
    let mut report = CycleReport::default();
    remove_invalid_entries(registry, handlers, snapshot, &mut report)?;
    ensure_desired_entries(registry, handlers, snapshot, &mut report)?;
    update_entries(registry, handlers, snapshot, &mut report)?;
    Ok(report)
}

fn remove_invalid_entries<R: Registry + ?Sized>(
    registry: &mut R,
    handlers: &mut HandlerCache,
    snapshot: &DirectorySnapshot,
    report: &mut CycleReport,
) -> Result<()> {
    let entries = registry.entries()?;
    let live_keys: HashSet<&EntryKey> = entries.iter().map(|entry| &entry.key).collect();
    handlers.retain(|key, _| live_keys.contains(key));

    let mut invalid: Vec<(&RegistryEntry, RetireReason)> = Vec::new();
    for entry in &entries {
        if !handlers.contains_key(&entry.key) {
            if let Some(handler) = EntryHandler::from_entry(entry) {
                handlers.insert(entry.key.clone(), handler);
            }
        }

        let reason = match handlers.get(&entry.key) {
            None => Some(RetireReason::UnknownKind),
            Some(handler) => match handler.state(snapshot) {
                EntryState::BoundValid => None,
                EntryState::BoundInvalid(reason) => Some(reason),
                // The cache only ever holds bound handlers.
                EntryState::Unbound => Some(RetireReason::KeyMismatch),
            },
        };
        if let Some(reason) = reason {
            invalid.push((entry, reason));
        }
    }

    for (entry, reason) in invalid {
        retire(registry, handlers, entry, reason, report)?;
    }
    Ok(())
}

fn retire<R: Registry + ?Sized>(
    registry: &mut R,
    handlers: &mut HandlerCache,
    entry: &RegistryEntry,
    reason: RetireReason,
    report: &mut CycleReport,
) -> Result<()> {
    if reason.is_invariant_violation() {
        let violation = WelcomeError::InvariantViolation(format!(
            "entry {} ({}/{}) is inconsistent: {}",
            entry.key,
            entry.context.subject_kind,
            entry.context.subject_id,
            reason.as_str()
        ));
        tracing::warn!(error = %violation, label = %entry.label, "Retiring corrupt entry");
    }

    registry.remove(&entry.key)?;
    handlers.remove(&entry.key);
    tracing::debug!(
        label = %entry.label,
        key = %entry.key,
        reason = reason.as_str(),
        "Removed entry"
    );
    report.removed.push(RemovedEntry {
        key: entry.key.clone(),
        label: entry.label.clone(),
        reason,
    });
    Ok(())
}

fn ensure_desired_entries<R: Registry + ?Sized>(
    registry: &mut R,
    handlers: &mut HandlerCache,
    snapshot: &DirectorySnapshot,
    report: &mut CycleReport,
) -> Result<()> {
    for subject in desired_subjects(snapshot) {
        ensure_entry(registry, handlers, snapshot, &subject, RoomScope::Home, report)?;
        for room in snapshot.rooms() {
            let scope = RoomScope::Room(room.id.clone());
            ensure_entry(registry, handlers, snapshot, &subject, scope, report)?;
        }
    }
    Ok(())
}

/// Presence subjects resolved against the directory, in first-seen order,
/// followed by Anyone.
fn desired_subjects(snapshot: &DirectorySnapshot) -> Vec<Subject> {
    let mut seen: HashSet<(SubjectKind, &str)> = HashSet::new();
    let mut subjects = Vec::new();

    for record in snapshot.presence() {
        let kind = record.subject_kind();
        let id = record.subject_id();
        if !seen.insert((kind, id)) {
            continue;
        }

        let subject = match kind {
            SubjectKind::Person => snapshot.person(id).cloned().map(Subject::Person),
            SubjectKind::Role => snapshot.role(id).cloned().map(Subject::Role),
            SubjectKind::Anyone => Some(Subject::Anyone),
        };
        match subject {
            Some(subject) => subjects.push(subject),
            None => tracing::warn!(
                kind = %kind,
                id,
                subject = %record.describe(),
                "Presence subject not found in directory"
            ),
        }
    }

    subjects.push(Subject::Anyone);
    subjects
}

fn ensure_entry<R: Registry + ?Sized>(
    registry: &mut R,
    handlers: &mut HandlerCache,
    snapshot: &DirectorySnapshot,
    subject: &Subject,
    scope: RoomScope,
    report: &mut CycleReport,
) -> Result<()> {
    let key = derive_entry_key(subject.kind(), subject.id(), &scope);
    if handlers.contains_key(&key) {
        return Ok(());
    }

    let mut handler = EntryHandler::for_subject(subject, scope);
    if let Some(entry) = handler.bind(registry, snapshot)? {
        tracing::debug!(label = %entry.label, key = %entry.key, "Registered new entry");
        report.created.push(CreatedEntry {
            key: entry.key,
            label: entry.label,
        });
        handlers.insert(key, handler);
    }
    Ok(())
}

fn update_entries<R: Registry + ?Sized>(
    registry: &mut R,
    handlers: &mut HandlerCache,
    snapshot: &DirectorySnapshot,
    report: &mut CycleReport,
) -> Result<()> {
    for entry in registry.entries()? {
        let Some(handler) = handlers.get_mut(&entry.key) else {
            tracing::warn!(key = %entry.key, label = %entry.label, "Entry has no handler");
            continue;
        };

        let changed = handler.refresh(registry, snapshot)?;
        let active = handler.last_active();
        let label = handler.display_label(snapshot).unwrap_or(entry.label);
        let status = if active { "active" } else { "inactive" };
        if changed {
            tracing::info!(label = %label, status, "Updated entry status");
        } else {
            tracing::debug!(label = %label, status, "Entry status unchanged");
        }

        report.updates.push(EntryUpdate {
            key: entry.key,
            label,
            active,
            changed,
        });
    }
    Ok(())
}

/// Owns the registry and the handler cache across cycles.
pub struct ReconciliationEngine<R: Registry> {
    registry: R,
    handlers: HandlerCache,
}

impl<R: Registry> ReconciliationEngine<R> {
    pub fn new(registry: R) -> Self {
        Self {
            registry,
            handlers: HandlerCache::new(),
        }
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut R {
        &mut self.registry
    }

    pub fn into_registry(self) -> R {
        self.registry
    }

    pub fn handlers(&self) -> &HandlerCache {
        &self.handlers
    }

    /// Reconciles against an already loaded snapshot.
    pub fn run_cycle(&mut self, snapshot: &DirectorySnapshot) -> Result<CycleReport> {
        reconcile(&mut self.registry, &mut self.handlers, snapshot)
    }

    /// Loads a fresh snapshot and reconciles against it. A failed load leaves
    /// the registry and handlers untouched.
    pub fn refresh(
        &mut self,
        source: &dyn DirectorySource,
        options: &LoadOptions,
    ) -> Result<CycleReport> {
        let snapshot = DirectorySnapshot::load(source, options)?;
        let report = self.run_cycle(&snapshot)?;
        tracing::info!(
            created = report.created.len(),
            removed = report.removed.len(),
            changed = report.changed_count(),
            entries = report.updates.len(),
            "Refresh cycle complete"
        );
        Ok(report)
    }
}
