//! Entry handlers: one per (subject, scope) pair.
//!
//! A handler remembers only identifiers. Everything else (subject record,
//! room record, label, activation) is resolved against the current directory
//! snapshot on demand, so a handler kept across cycles never serves stale
//! names or flags.
//!
//! Lifecycle:
//!
//! ```text
//! Unbound ──bind (policy allows)──▶ BoundValid ──revalidate──▶ BoundInvalid ──▶ retired
//!                                       ▲            │
//!                                       └── valid ───┘
//! ```

use serde::Serialize;

use crate::activation;
use crate::directory::DirectorySnapshot;
use crate::error::{Result, WelcomeError};
use crate::identity::{derive_entry_key, EntryKey};
use crate::policy::{creation_decision, CreationDecision};
use crate::registry::{EntryContext, Registry, RegistryEntry};
use crate::types::{Room, RoomScope, Subject, SubjectKind};

pub const ANYWHERE_LABEL: &str = "Anywhere";

/// Why a bound entry no longer deserves to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetireReason {
    UnknownKind,
    SubjectMissing,
    RoomMissing,
    KeyMismatch,
    Policy,
}

impl RetireReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnknownKind => "unknown_kind",
            Self::SubjectMissing => "subject_missing",
            Self::RoomMissing => "room_missing",
            Self::KeyMismatch => "key_mismatch",
            Self::Policy => "policy",
        }
    }

    /// Reasons that mean the stored data itself is inconsistent, as opposed
    /// to the directory or policy having moved on.
    pub fn is_invariant_violation(self) -> bool {
        matches!(self, Self::UnknownKind | Self::KeyMismatch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryState {
    Unbound,
    BoundValid,
    BoundInvalid(RetireReason),
}

#[derive(Debug, Clone)]
pub struct EntryHandler {
    kind: SubjectKind,
    subject_id: String,
    scope: RoomScope,
    binding: Option<EntryKey>,
    last_active: bool,
}

impl EntryHandler {
    /// An unbound handler for a desired (subject, scope) pair.
    pub fn for_subject(subject: &Subject, scope: RoomScope) -> Self {
        Self {
            kind: subject.kind(),
            subject_id: subject.id().to_string(),
            scope,
            binding: None,
            last_active: false,
        }
    }

    /// Rebuilds a handler from a persisted entry. Returns `None` when the
    /// stored kind tag is not one we know.
    pub fn from_entry(entry: &RegistryEntry) -> Option<Self> {
        let kind = entry.context.kind()?;
        Some(Self {
            kind,
            subject_id: entry.context.subject_id.clone(),
            scope: entry.context.scope(),
            binding: Some(entry.key.clone()),
            last_active: entry.active,
        })
    }

    pub fn kind(&self) -> SubjectKind {
        self.kind
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn scope(&self) -> &RoomScope {
        &self.scope
    }

    /// Activation as of the last refresh.
    pub fn last_active(&self) -> bool {
        self.last_active
    }

    pub fn key(&self) -> EntryKey {
        derive_entry_key(self.kind, &self.subject_id, &self.scope)
    }

    pub fn context(&self) -> EntryContext {
        EntryContext::new(self.kind, &self.subject_id, &self.scope)
    }

    /// Resolves the subject by kind. Anyone always resolves.
    pub fn subject(&self, snapshot: &DirectorySnapshot) -> Option<Subject> {
        match self.kind {
            SubjectKind::Person => snapshot
                .person(&self.subject_id)
                .cloned()
                .map(Subject::Person),
            SubjectKind::Role => snapshot.role(&self.subject_id).cloned().map(Subject::Role),
            SubjectKind::Anyone => Some(Subject::Anyone),
        }
    }

    pub fn room<'a>(&self, snapshot: &'a DirectorySnapshot) -> Option<&'a Room> {
        self.scope.room_id().and_then(|id| snapshot.room(id))
    }

    pub fn display_label(&self, snapshot: &DirectorySnapshot) -> Option<String> {
        let subject = self.subject(snapshot)?;
        Some(entry_label(subject.display_name(), self.room(snapshot)))
    }

    pub fn is_active(&self, snapshot: &DirectorySnapshot) -> bool {
        match self.subject(snapshot) {
            Some(subject) => activation::is_active(&subject, &self.scope, snapshot.presence()),
            None => false,
        }
    }

    /// Policy decision for this handler given whether it is already bound.
    pub fn creation_decision(
        &self,
        snapshot: &DirectorySnapshot,
        subject: &Subject,
    ) -> CreationDecision {
        let active = activation::is_active(subject, &self.scope, snapshot.presence());
        creation_decision(
            subject.policy(),
            self.room(snapshot),
            active,
            self.binding.is_some(),
        )
    }

    pub fn state(&self, snapshot: &DirectorySnapshot) -> EntryState {
        let Some(bound_key) = self.binding.as_ref() else {
            return EntryState::Unbound;
        };
        let Some(subject) = self.subject(snapshot) else {
            return EntryState::BoundInvalid(RetireReason::SubjectMissing);
        };
        if self.scope.room_id().is_some() && self.room(snapshot).is_none() {
            return EntryState::BoundInvalid(RetireReason::RoomMissing);
        }
        // Compare against the resolved subject; Anyone resolves whatever id
        // was stored.
        if &derive_entry_key(subject.kind(), subject.id(), &self.scope) != bound_key {
            return EntryState::BoundInvalid(RetireReason::KeyMismatch);
        }
        if !self.creation_decision(snapshot, &subject).allows() {
            return EntryState::BoundInvalid(RetireReason::Policy);
        }
        EntryState::BoundValid
    }

    pub fn is_valid(&self, snapshot: &DirectorySnapshot) -> bool {
        self.state(snapshot) == EntryState::BoundValid
    }

    /// Creates the registry entry if policy allows it now. Returns the new
    /// entry, or `None` when creation is not (yet) permitted.
    pub fn bind<R: Registry + ?Sized>(
        &mut self,
        registry: &mut R,
        snapshot: &DirectorySnapshot,
    ) -> Result<Option<RegistryEntry>> {
        if self.binding.is_some() {
            return Ok(None);
        }
        let Some(subject) = self.subject(snapshot) else {
            return Ok(None);
        };
        let decision = self.creation_decision(snapshot, &subject);
        if !decision.allows() {
            tracing::trace!(
                subject = %subject.display_name(),
                scope = ?self.scope,
                reason = decision.label(),
                "Entry not created"
            );
            return Ok(None);
        }

        let key = self.key();
        let label = entry_label(subject.display_name(), self.room(snapshot));
        let entry = registry.create(&key, &label, self.context())?;
        self.binding = Some(key);
        self.last_active = entry.active;
        Ok(Some(entry))
    }

    /// Writes the label, and the activation when it changed. Returns whether
    /// the activation changed.
    pub fn refresh<R: Registry + ?Sized>(
        &mut self,
        registry: &mut R,
        snapshot: &DirectorySnapshot,
    ) -> Result<bool> {
        let key = self.binding.clone().ok_or_else(|| {
            WelcomeError::InvariantViolation(format!(
                "refresh of unbound {} entry {}",
                self.kind, self.subject_id
            ))
        })?;
        let label = self.display_label(snapshot).ok_or_else(|| {
            WelcomeError::InvariantViolation(format!(
                "{} {} is not in the directory",
                self.kind, self.subject_id
            ))
        })?;
        registry.set_label(&key, &label)?;

        let active = self.is_active(snapshot);
        let changed = active != self.last_active;
        if changed {
            registry.set_activation(&key, active)?;
        }
        self.last_active = active;
        Ok(changed)
    }
}

/// Room-qualified label. A subject already named after the room ("Kitchen
/// Staff" in Kitchen) keeps its own name.
pub fn entry_label(subject_name: &str, room: Option<&Room>) -> String {
    match room {
        Some(room) if subject_name.starts_with(&room.display_name) => subject_name.to_string(),
        Some(room) => format!("{} {}", room.display_name, subject_name),
        None => format!("{} {}", ANYWHERE_LABEL, subject_name),
    }
}
