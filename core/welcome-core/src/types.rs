//! Domain records for the presence directory.
//!
//! Records are built once per refresh cycle from the wire types in
//! `welcome-protocol` and are immutable afterwards. Integration overrides
//! (display name, entry policy, room flags) are resolved here so the rest of
//! the core never looks at raw attribute maps.

use serde::{Deserialize, Serialize};
use welcome_protocol::{Attrs, ConnectedPersonRaw, HomeRaw, PersonRaw, RoleRaw, RoomRaw};

pub const ANYONE_ID: &str = "anyone";
pub const ANYONE_DISPLAY_NAME: &str = "Anyone";

// ═══════════════════════════════════════════════════════════════════════════════
// Subject Kinds
// ═══════════════════════════════════════════════════════════════════════════════

/// The three kinds of thing whose presence is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SubjectKind {
    Person,
    Role,
    Anyone,
}

impl SubjectKind {
    /// Tag persisted in registry contexts and mixed into entry keys.
    /// Changing these strings orphans every stored entry.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Person => "Person",
            Self::Role => "Role",
            Self::Anyone => "Anyone",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "Person" => Some(Self::Person),
            "Role" => Some(Self::Role),
            "Anyone" => Some(Self::Anyone),
            _ => None,
        }
    }
}

impl std::fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Entry Policy
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-subject creation policy.
///
/// - `anywhere`: may the subject have a home-wide entry?
/// - `room`: may the subject have room-scoped entries?
/// - `lazy`: defer creating room-scoped entries until first activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPolicy {
    pub anywhere: bool,
    pub room: bool,
    pub lazy: bool,
}

impl Default for EntryPolicy {
    fn default() -> Self {
        Self {
            anywhere: false,
            room: true,
            lazy: false,
        }
    }
}

impl EntryPolicy {
    pub fn from_attrs(attrs: &Attrs, namespace: &str) -> Self {
        let defaults = Self::default();
        Self {
            anywhere: attrs
                .flag(namespace, "anywhere")
                .unwrap_or(defaults.anywhere),
            room: attrs.flag(namespace, "room").unwrap_or(defaults.room),
            lazy: attrs.flag(namespace, "lazy").unwrap_or(defaults.lazy),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Directory Records
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Person {
    pub id: String,
    pub display_name: String,
    pub policy: EntryPolicy,
}

impl Person {
    pub fn from_raw(raw: &PersonRaw, namespace: &str) -> Self {
        Self {
            id: raw.id.clone(),
            display_name: display_name(&raw.attrs, namespace, &raw.display_name),
            policy: EntryPolicy::from_attrs(&raw.attrs, namespace),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Role {
    pub id: String,
    pub display_name: String,
    pub policy: EntryPolicy,
}

impl Role {
    pub fn from_raw(raw: &RoleRaw, namespace: &str) -> Self {
        Self {
            id: raw.id.clone(),
            display_name: display_name(&raw.attrs, namespace, &raw.display_name),
            policy: EntryPolicy::from_attrs(&raw.attrs, namespace),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Room {
    pub id: String,
    pub display_name: String,
    /// Suppresses every room-scoped entry in this room.
    pub disabled: bool,
    /// Forces lazy creation for every subject in this room.
    pub lazy: bool,
}

impl Room {
    pub fn from_raw(raw: &RoomRaw, namespace: &str) -> Self {
        Self {
            id: raw.id.clone(),
            display_name: display_name(&raw.attrs, namespace, &raw.display_name),
            disabled: raw.attrs.flag(namespace, "disabled").unwrap_or(false),
            lazy: raw.attrs.flag(namespace, "lazy").unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Home {
    pub id: String,
    pub display_name: String,
    pub rooms: Vec<Room>,
}

impl Home {
    pub fn from_raw(raw: &HomeRaw, namespace: &str) -> Self {
        Self {
            id: raw.id.clone(),
            display_name: display_name(&raw.attrs, namespace, &raw.display_name),
            rooms: raw
                .rooms
                .iter()
                .map(|room| Room::from_raw(room, namespace))
                .collect(),
        }
    }
}

fn display_name(attrs: &Attrs, namespace: &str, fallback: &str) -> String {
    attrs.name(namespace).unwrap_or(fallback).to_string()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Subjects
// ═══════════════════════════════════════════════════════════════════════════════

/// The synthetic catch-all subject.
#[derive(Debug, PartialEq, Eq)]
pub struct Anyone {
    pub display_name: &'static str,
    pub policy: EntryPolicy,
}

pub static ANYONE: Anyone = Anyone {
    display_name: ANYONE_DISPLAY_NAME,
    policy: EntryPolicy {
        anywhere: true,
        room: true,
        lazy: false,
    },
};

/// Something whose presence is tracked.
///
/// Equality is identity equality: same kind and same id. Display names and
/// policies are snapshots and do not participate.
#[derive(Debug, Clone, Serialize)]
pub enum Subject {
    Person(Person),
    Role(Role),
    Anyone,
}

impl Subject {
    pub fn kind(&self) -> SubjectKind {
        match self {
            Subject::Person(_) => SubjectKind::Person,
            Subject::Role(_) => SubjectKind::Role,
            Subject::Anyone => SubjectKind::Anyone,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Subject::Person(person) => &person.id,
            Subject::Role(role) => &role.id,
            Subject::Anyone => ANYONE_ID,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Subject::Person(person) => &person.display_name,
            Subject::Role(role) => &role.display_name,
            Subject::Anyone => ANYONE.display_name,
        }
    }

    pub fn policy(&self) -> EntryPolicy {
        match self {
            Subject::Person(person) => person.policy,
            Subject::Role(role) => role.policy,
            Subject::Anyone => ANYONE.policy,
        }
    }

    pub fn is(&self, kind: SubjectKind, id: &str) -> bool {
        self.kind() == kind && self.id() == id
    }
}

impl PartialEq for Subject {
    fn eq(&self, other: &Self) -> bool {
        self.is(other.kind(), other.id())
    }
}

impl Eq for Subject {}

// ═══════════════════════════════════════════════════════════════════════════════
// Room Scope
// ═══════════════════════════════════════════════════════════════════════════════

/// Where an entry applies: the whole home ("anywhere") or a single room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RoomScope {
    Home,
    Room(String),
}

impl RoomScope {
    pub fn from_room_id(room_id: Option<&str>) -> Self {
        match room_id {
            Some(id) => RoomScope::Room(id.to_string()),
            None => RoomScope::Home,
        }
    }

    pub fn room_id(&self) -> Option<&str> {
        match self {
            RoomScope::Home => None,
            RoomScope::Room(id) => Some(id),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Presence
// ═══════════════════════════════════════════════════════════════════════════════

/// One detected presence event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectedPerson {
    /// Whether the detected individual could be resolved to a specific person.
    pub known: bool,
    pub person: Person,
    pub role: Role,
    pub home_id: Option<String>,
    pub room: Room,
}

impl ConnectedPerson {
    pub fn from_raw(raw: &ConnectedPersonRaw, namespace: &str) -> Self {
        Self {
            known: raw.known,
            person: Person::from_raw(&raw.person, namespace),
            role: Role::from_raw(&raw.role, namespace),
            home_id: raw.home.as_ref().map(|home| home.id.clone()),
            room: Room::from_raw(&raw.room, namespace),
        }
    }

    pub fn subject_kind(&self) -> SubjectKind {
        if self.known {
            SubjectKind::Person
        } else {
            SubjectKind::Role
        }
    }

    pub fn subject_id(&self) -> &str {
        if self.known {
            &self.person.id
        } else {
            &self.role.id
        }
    }

    /// The presence subject: the person when known, else their role.
    pub fn subject(&self) -> Subject {
        if self.known {
            Subject::Person(self.person.clone())
        } else {
            Subject::Role(self.role.clone())
        }
    }

    pub fn is_subject(&self, subject: &Subject) -> bool {
        subject.is(self.subject_kind(), self.subject_id())
    }

    /// Rows that do not name a home belong to the one that was queried.
    pub fn is_in_home(&self, home_id: &str) -> bool {
        self.home_id.as_deref().map_or(true, |id| id == home_id)
    }

    /// Home scope always matches; a room scope matches only its own room.
    pub fn is_in(&self, scope: &RoomScope) -> bool {
        match scope {
            RoomScope::Home => true,
            RoomScope::Room(room_id) => &self.room.id == room_id,
        }
    }

    /// Log label: the subject name, plus the raw person name for unknowns.
    pub fn describe(&self) -> String {
        if self.known {
            self.person.display_name.clone()
        } else {
            format!(
                "{} (\"{}\")",
                self.role.display_name, self.person.display_name
            )
        }
    }
}
