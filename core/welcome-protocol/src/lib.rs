//! Wire records for the Welcome directory service.
//!
//! This crate is shared by the reconciliation core and the daemon's HTTP
//! client so the JSON shape of people, roles, homes and presence rows lives in
//! one place. The directory service remains the authority on the schema; these
//! types accept unknown fields so that additive server changes do not break
//! the daemon.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_ATTRS_NAMESPACE: &str = "homebridge";

/// Free-form attribute bag attached to every directory record.
///
/// Integration overrides live under a namespaced key, e.g.
/// `{"homebridge": {"name": "Kid", "lazy": true}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attrs(pub Map<String, Value>);

impl Attrs {
    pub fn namespace(&self, namespace: &str) -> Option<&Map<String, Value>> {
        self.0.get(namespace).and_then(Value::as_object)
    }

    /// Returns the namespaced value for `key`, treating JSON `null` as absent.
    pub fn get(&self, namespace: &str, key: &str) -> Option<&Value> {
        self.namespace(namespace)
            .and_then(|attrs| attrs.get(key))
            .filter(|value| !value.is_null())
    }

    pub fn flag(&self, namespace: &str, key: &str) -> Option<bool> {
        self.get(namespace, key).map(truthy)
    }

    pub fn name(&self, namespace: &str) -> Option<&str> {
        self.get(namespace, "name").and_then(Value::as_str)
    }
}

/// Loose truthiness for attribute flags: operators write `1`, `"yes"` or
/// `true` interchangeably in the directory's admin UI.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRaw {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub attrs: Attrs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleRaw {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub attrs: Attrs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomRaw {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub attrs: Attrs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomeRaw {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub rooms: Vec<RoomRaw>,
    #[serde(default)]
    pub attrs: Attrs,
}

/// A reference to a home inside a presence row; the server omits `rooms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomeRef {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
}

/// One detected presence: who (person and/or role) is in which room.
///
/// `role` is what the presence resolves to when `known` is false, i.e. when
/// the detector saw someone but could not tell which person it was.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedPersonRaw {
    pub known: bool,
    pub person: PersonRaw,
    pub role: RoleRaw,
    #[serde(default)]
    pub home: Option<HomeRef>,
    pub room: RoomRaw,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct RecordError {
    pub code: String,
    pub message: String,
}

impl RecordError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

pub fn parse_people(body: &[u8]) -> Result<Vec<PersonRaw>, RecordError> {
    let people: Vec<PersonRaw> = decode(body, "people")?;
    for person in &people {
        require_id(&person.id, "person")?;
    }
    Ok(people)
}

pub fn parse_roles(body: &[u8]) -> Result<Vec<RoleRaw>, RecordError> {
    let roles: Vec<RoleRaw> = decode(body, "roles")?;
    for role in &roles {
        require_id(&role.id, "role")?;
    }
    Ok(roles)
}

pub fn parse_home(body: &[u8]) -> Result<HomeRaw, RecordError> {
    let home: HomeRaw = decode(body, "home")?;
    require_id(&home.id, "home")?;
    for room in &home.rooms {
        require_id(&room.id, "room")?;
    }
    Ok(home)
}

pub fn parse_presence(body: &[u8]) -> Result<Vec<ConnectedPersonRaw>, RecordError> {
    let rows: Vec<ConnectedPersonRaw> = decode(body, "presence")?;
    for row in &rows {
        require_id(&row.person.id, "presence person")?;
        require_id(&row.role.id, "presence role")?;
        require_id(&row.room.id, "presence room")?;
    }
    Ok(rows)
}

fn decode<T: serde::de::DeserializeOwned>(body: &[u8], what: &str) -> Result<T, RecordError> {
    serde_json::from_slice(body).map_err(|err| {
        RecordError::new(
            "invalid_payload",
            format!("{} payload is invalid JSON: {}", what, err),
        )
    })
}

fn require_id(id: &str, what: &str) -> Result<(), RecordError> {
    if id.trim().is_empty() {
        return Err(RecordError::new(
            "missing_field",
            format!("{} id is required", what),
        ));
    }
    Ok(())
}
