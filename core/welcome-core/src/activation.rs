//! Activation: is a subject present in a scope right now?
//!
//! Recomputed from the full presence snapshot every cycle. A household has
//! tens of subjects and rooms, so the linear scan is fine.

use crate::types::{ConnectedPerson, RoomScope, Subject};

/// Returns true when some presence record places `subject` inside `scope`.
///
/// `Anyone` matches every record. Duplicate records are harmless: this is an
/// existence check.
pub fn is_active(subject: &Subject, scope: &RoomScope, presence: &[ConnectedPerson]) -> bool {
    match subject {
        Subject::Anyone => presence.iter().any(|record| record.is_in(scope)),
        Subject::Person(_) | Subject::Role(_) => presence
            .iter()
            .any(|record| record.is_subject(subject) && record.is_in(scope)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntryPolicy, Person, Role, Room};

    fn person(id: &str) -> Person {
        Person {
            id: id.to_string(),
            display_name: id.to_uppercase(),
            policy: EntryPolicy::default(),
        }
    }

    fn role(id: &str) -> Role {
        Role {
            id: id.to_string(),
            display_name: id.to_uppercase(),
            policy: EntryPolicy::default(),
        }
    }

    fn room(id: &str) -> Room {
        Room {
            id: id.to_string(),
            display_name: id.to_uppercase(),
            disabled: false,
            lazy: false,
        }
    }

    fn seen(known: bool, person_id: &str, role_id: &str, room_id: &str) -> ConnectedPerson {
        ConnectedPerson {
            known,
            person: person(person_id),
            role: role(role_id),
            home_id: None,
            room: room(room_id),
        }
    }

    fn in_room(id: &str) -> RoomScope {
        RoomScope::Room(id.to_string())
    }

    #[test]
    fn anyone_tracks_any_presence() {
        let presence = vec![seen(true, "alice", "adult", "kitchen")];
        assert!(is_active(&Subject::Anyone, &RoomScope::Home, &presence));
        assert!(is_active(&Subject::Anyone, &in_room("kitchen"), &presence));
        assert!(!is_active(&Subject::Anyone, &in_room("office"), &presence));
        assert!(!is_active(&Subject::Anyone, &RoomScope::Home, &[]));
    }

    #[test]
    fn known_presence_activates_person_not_role() {
        let presence = vec![seen(true, "alice", "adult", "kitchen")];
        let alice = Subject::Person(person("alice"));
        let adult = Subject::Role(role("adult"));

        assert!(is_active(&alice, &RoomScope::Home, &presence));
        assert!(is_active(&alice, &in_room("kitchen"), &presence));
        assert!(!is_active(&alice, &in_room("office"), &presence));
        assert!(!is_active(&adult, &RoomScope::Home, &presence));
    }

    #[test]
    fn unknown_presence_activates_role_not_person() {
        let presence = vec![seen(false, "visitor", "guest", "hall")];
        assert!(is_active(&Subject::Role(role("guest")), &in_room("hall"), &presence));
        assert!(!is_active(&Subject::Person(person("visitor")), &RoomScope::Home, &presence));
    }

    #[test]
    fn person_and_role_with_same_id_are_distinct() {
        let presence = vec![seen(false, "x", "shared", "hall")];
        assert!(!is_active(&Subject::Person(person("shared")), &RoomScope::Home, &presence));
    }

    #[test]
    fn duplicate_records_are_tolerated() {
        let presence = vec![
            seen(true, "alice", "adult", "kitchen"),
            seen(true, "alice", "adult", "kitchen"),
        ];
        assert!(is_active(&Subject::Person(person("alice")), &in_room("kitchen"), &presence));
    }
}
