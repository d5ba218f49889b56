//! Stable entry keys.
//!
//! An entry key is a name-based UUID of `"<Kind>/<subject id>[/<room id>]"`.
//! Keys are persisted in the registry, so both the source layout and the
//! namespace are frozen: changing either orphans every stored entry.
//!
//! Ids containing the `/` separator can collide (`"a/b"` at home vs `"a"` in
//! room `"b"`). Directory ids are opaque database ids in practice.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{RoomScope, SubjectKind};

const KEY_SEPARATOR: &str = "/";

/// Namespace for entry key UUIDs.
const ENTRY_KEY_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2d0e_8a4b_5c3f_9e71_04d2_b8a6_1f35);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryKey(String);

impl EntryKey {
    /// Wraps an identifier read back from the registry. No validation: a
    /// corrupt stored key simply fails the key comparison on revalidation.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn identity_source(kind: SubjectKind, subject_id: &str, scope: &RoomScope) -> String {
    let mut parts = vec![kind.tag(), subject_id];
    if let Some(room_id) = scope.room_id() {
        parts.push(room_id);
    }
    parts.join(KEY_SEPARATOR)
}

pub fn derive_entry_key(kind: SubjectKind, subject_id: &str, scope: &RoomScope) -> EntryKey {
    let source = identity_source(kind, subject_id, scope);
    EntryKey(
        Uuid::new_v5(&ENTRY_KEY_NAMESPACE, source.as_bytes())
            .hyphenated()
            .to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn room(id: &str) -> RoomScope {
        RoomScope::Room(id.to_string())
    }

    #[test]
    fn source_joins_kind_subject_and_room() {
        assert_eq!(
            identity_source(SubjectKind::Person, "p1", &RoomScope::Home),
            "Person/p1"
        );
        assert_eq!(
            identity_source(SubjectKind::Anyone, "anyone", &room("kitchen")),
            "Anyone/anyone/kitchen"
        );
    }

    #[test]
    fn keys_are_deterministic() {
        let first = derive_entry_key(SubjectKind::Role, "guest", &room("hall"));
        let second = derive_entry_key(SubjectKind::Role, "guest", &room("hall"));
        assert_eq!(first, second);
        assert_eq!(first.as_str().len(), 36);
    }

    #[test]
    fn keys_differ_across_inputs() {
        let kinds = [SubjectKind::Person, SubjectKind::Role, SubjectKind::Anyone];
        let ids = ["p1", "p2"];
        let scopes = [RoomScope::Home, room("kitchen"), room("office")];

        let mut seen = HashSet::new();
        for kind in kinds {
            for id in ids {
                for scope in &scopes {
                    assert!(seen.insert(derive_entry_key(kind, id, scope)));
                }
            }
        }
        assert_eq!(seen.len(), kinds.len() * ids.len() * scopes.len());
    }
}
