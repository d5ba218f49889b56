use serde::Serialize;

use crate::types::{EntryPolicy, Room};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CreationDecision {
    Allowed,
    /// Subject policy forbids a home-wide entry.
    HomeScopeForbidden,
    /// Subject policy forbids room-scoped entries.
    RoomScopeForbidden,
    RoomDisabled,
    /// Lazy entry without a binding whose activation is still false.
    AwaitingActivation,
}

impl CreationDecision {
    pub fn allows(self) -> bool {
        self == CreationDecision::Allowed
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::HomeScopeForbidden => "home scope forbidden",
            Self::RoomScopeForbidden => "room scope forbidden",
            Self::RoomDisabled => "room disabled",
            Self::AwaitingActivation => "awaiting activation",
        }
    }
}

/// Decides whether an entry should exist for a subject policy and scope.
///
/// `room` is `None` for the home-wide entry. Laziness (subject or room) only
/// gates the first binding: once `has_binding` is true an inactive lazy entry
/// is kept.
pub fn creation_decision(
    policy: EntryPolicy,
    room: Option<&Room>,
    active: bool,
    has_binding: bool,
) -> CreationDecision {
    let Some(room) = room else {
        return if policy.anywhere {
            CreationDecision::Allowed
        } else {
            CreationDecision::HomeScopeForbidden
        };
    };

    if !policy.room {
        return CreationDecision::RoomScopeForbidden;
    }
    if room.disabled {
        return CreationDecision::RoomDisabled;
    }
    if !has_binding && (policy.lazy || room.lazy) && !active {
        return CreationDecision::AwaitingActivation;
    }

    CreationDecision::Allowed
}
