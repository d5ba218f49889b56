//! Directory snapshot: people, roles, rooms and current presence.
//!
//! A snapshot is loaded wholesale at the start of each cycle. Either all four
//! sources load or the cycle is abandoned; nothing is merged into the previous
//! snapshot.

use std::collections::HashMap;
use std::thread;

use welcome_protocol::{ConnectedPersonRaw, HomeRaw, PersonRaw, RoleRaw};

use crate::error::{Result, WelcomeError};
use crate::types::{ConnectedPerson, Home, Person, Role, Room};

/// The external directory service.
///
/// Implementations are called from scoped loader threads, hence `Sync`.
pub trait DirectorySource: Send + Sync {
    fn fetch_people(&self) -> Result<Vec<PersonRaw>>;
    fn fetch_roles(&self) -> Result<Vec<RoleRaw>>;
    fn fetch_home(&self, home_id: &str) -> Result<HomeRaw>;
    fn fetch_presence(&self, home_id: &str) -> Result<Vec<ConnectedPersonRaw>>;
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub home_id: String,
    pub attrs_namespace: String,
}

impl LoadOptions {
    pub fn new(home_id: impl Into<String>) -> Self {
        Self {
            home_id: home_id.into(),
            attrs_namespace: welcome_protocol::DEFAULT_ATTRS_NAMESPACE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DirectorySnapshot {
    people: HashMap<String, Person>,
    roles: HashMap<String, Role>,
    /// Directory order; entries are ensured room by room in this order.
    rooms: Vec<Room>,
    presence: Vec<ConnectedPerson>,
}

impl DirectorySnapshot {
    pub fn new(
        people: Vec<Person>,
        roles: Vec<Role>,
        rooms: Vec<Room>,
        presence: Vec<ConnectedPerson>,
    ) -> Self {
        Self {
            people: people
                .into_iter()
                .map(|person| (person.id.clone(), person))
                .collect(),
            roles: roles.into_iter().map(|role| (role.id.clone(), role)).collect(),
            rooms,
            presence,
        }
    }

    /// Loads people, roles and rooms concurrently, then presence.
    pub fn load(source: &dyn DirectorySource, options: &LoadOptions) -> Result<Self> {
        let namespace = options.attrs_namespace.as_str();

        let (people, roles, home) = thread::scope(|scope| {
            let people = scope.spawn(|| source.fetch_people());
            let roles = scope.spawn(|| source.fetch_roles());
            let home = scope.spawn(|| source.fetch_home(&options.home_id));
            (
                join_loader(people, "people"),
                join_loader(roles, "roles"),
                join_loader(home, "rooms"),
            )
        });
        let people = log_failure(people, "people")?;
        let roles = log_failure(roles, "roles")?;
        let home = log_failure(home, "rooms")?;

        let people: Vec<Person> = people
            .iter()
            .map(|raw| Person::from_raw(raw, namespace))
            .collect();
        tracing::debug!(count = people.len(), "Loaded people");
        let roles: Vec<Role> = roles
            .iter()
            .map(|raw| Role::from_raw(raw, namespace))
            .collect();
        tracing::debug!(count = roles.len(), "Loaded roles");
        let home = Home::from_raw(&home, namespace);
        tracing::debug!(count = home.rooms.len(), home = %home.display_name, "Loaded rooms");

        let presence = log_failure(source.fetch_presence(&options.home_id), "presence")?;
        let presence: Vec<ConnectedPerson> = presence
            .iter()
            .map(|raw| ConnectedPerson::from_raw(raw, namespace))
            .filter(|record| {
                let in_home = record.is_in_home(&options.home_id);
                if !in_home {
                    tracing::warn!(
                        subject = %record.describe(),
                        home_id = record.home_id.as_deref().unwrap_or_default(),
                        expected = %options.home_id,
                        "Ignoring presence from another home"
                    );
                }
                in_home
            })
            .collect();
        for record in &presence {
            tracing::debug!(
                subject = %record.describe(),
                room = %record.room.display_name,
                "Connected person"
            );
        }

        let snapshot = Self::new(people, roles, home.rooms, presence);
        for record in snapshot.presence_in_unknown_rooms() {
            let violation = WelcomeError::InvariantViolation(format!(
                "presence for {} references unknown room {}",
                record.describe(),
                record.room.id
            ));
            tracing::warn!(error = %violation, "Presence record outside the directory");
        }
        Ok(snapshot)
    }

    pub fn person(&self, id: &str) -> Option<&Person> {
        self.people.get(id)
    }

    pub fn role(&self, id: &str) -> Option<&Role> {
        self.roles.get(id)
    }

    pub fn room(&self, id: &str) -> Option<&Room> {
        self.rooms.iter().find(|room| room.id == id)
    }

    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    pub fn presence(&self) -> &[ConnectedPerson] {
        &self.presence
    }

    /// Presence rows whose room is not part of the configured home. They still
    /// count toward home-wide activation.
    pub fn presence_in_unknown_rooms(&self) -> Vec<&ConnectedPerson> {
        self.presence
            .iter()
            .filter(|record| self.room(&record.room.id).is_none())
            .collect()
    }
}

fn join_loader<T>(
    handle: thread::ScopedJoinHandle<'_, Result<T>>,
    source_name: &str,
) -> Result<T> {
    handle
        .join()
        .unwrap_or_else(|_| Err(WelcomeError::directory(source_name, "loader thread panicked")))
}

fn log_failure<T>(result: Result<T>, source_name: &str) -> Result<T> {
    if let Err(err) = &result {
        tracing::error!(source = source_name, error = %err, "Failed to load directory source");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixtureDirectory {
        fail: Option<&'static str>,
        presence_calls: AtomicUsize,
    }

    impl FixtureDirectory {
        fn new(fail: Option<&'static str>) -> Self {
            Self {
                fail,
                presence_calls: AtomicUsize::new(0),
            }
        }

        fn check(&self, source_name: &str) -> Result<()> {
            if self.fail == Some(source_name) {
                return Err(WelcomeError::directory(source_name, "connection refused"));
            }
            Ok(())
        }
    }

    impl DirectorySource for FixtureDirectory {
        fn fetch_people(&self) -> Result<Vec<PersonRaw>> {
            self.check("people")?;
            Ok(serde_json::from_value(json!([
                {"id": "alice", "display_name": "Alice"}
            ]))
            .unwrap())
        }

        fn fetch_roles(&self) -> Result<Vec<RoleRaw>> {
            self.check("roles")?;
            Ok(serde_json::from_value(json!([
                {"id": "guest", "display_name": "Guest"}
            ]))
            .unwrap())
        }

        fn fetch_home(&self, home_id: &str) -> Result<HomeRaw> {
            self.check("rooms")?;
            Ok(serde_json::from_value(json!({
                "id": home_id,
                "display_name": "Home",
                "rooms": [
                    {"id": "kitchen", "display_name": "Kitchen"},
                    {"id": "office", "display_name": "Office", "attrs": {"homebridge": {"disabled": true}}}
                ]
            }))
            .unwrap())
        }

        fn fetch_presence(&self, _home_id: &str) -> Result<Vec<ConnectedPersonRaw>> {
            self.presence_calls.fetch_add(1, Ordering::SeqCst);
            self.check("presence")?;
            Ok(serde_json::from_value(json!([
                {
                    "known": true,
                    "person": {"id": "alice", "display_name": "Alice"},
                    "role": {"id": "adult", "display_name": "Adult"},
                    "room": {"id": "garage", "display_name": "Garage"}
                },
                {
                    "known": false,
                    "person": {"id": "p7", "display_name": "Visitor"},
                    "role": {"id": "guest", "display_name": "Guest"},
                    "home": {"id": "home-2"},
                    "room": {"id": "kitchen", "display_name": "Kitchen"}
                }
            ]))
            .unwrap())
        }
    }

    #[test]
    fn loads_all_sources() {
        let source = FixtureDirectory::new(None);
        let snapshot = DirectorySnapshot::load(&source, &LoadOptions::new("home-1")).unwrap();

        assert!(snapshot.person("alice").is_some());
        assert!(snapshot.role("guest").is_some());
        assert_eq!(snapshot.rooms().len(), 2);
        assert!(snapshot.room("office").unwrap().disabled);
        assert_eq!(snapshot.presence().len(), 1);
    }

    #[test]
    fn drops_presence_from_other_homes() {
        let source = FixtureDirectory::new(None);
        let snapshot = DirectorySnapshot::load(&source, &LoadOptions::new("home-1")).unwrap();
        assert!(snapshot
            .presence()
            .iter()
            .all(|record| record.person.id == "alice"));

        let snapshot = DirectorySnapshot::load(&source, &LoadOptions::new("home-2")).unwrap();
        assert_eq!(snapshot.presence().len(), 2);
    }

    #[test]
    fn flags_presence_in_unknown_rooms() {
        let source = FixtureDirectory::new(None);
        let snapshot = DirectorySnapshot::load(&source, &LoadOptions::new("home-1")).unwrap();
        let unknown = snapshot.presence_in_unknown_rooms();
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].room.id, "garage");
    }

    #[test]
    fn failed_directory_load_skips_presence() {
        let source = FixtureDirectory::new(Some("roles"));
        let err = DirectorySnapshot::load(&source, &LoadOptions::new("home-1")).unwrap_err();

        match err {
            WelcomeError::DirectoryFetch { source_name, .. } => assert_eq!(source_name, "roles"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(source.presence_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failed_presence_load_aborts() {
        let source = FixtureDirectory::new(Some("presence"));
        let err = DirectorySnapshot::load(&source, &LoadOptions::new("home-1")).unwrap_err();
        assert!(err.is_transient());
    }
}
