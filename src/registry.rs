//! Collaborator interfaces: who the users are, and which cities exist.
//!
//! Registration and identity verification happen outside the engine; the core only
//! asks [`UserDirectory`] about a user and [`CityRegistry`] about a city name. The
//! in-memory implementations back the binary and the tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};

use crate::error::EngineError;
use crate::types::UserId;

/// Role used for the reviewer-authorization check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Reviewer,
}

impl Role {
    pub fn from_str(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("user") {
            Some(Role::User)
        } else if s.eq_ignore_ascii_case("reviewer") || s.eq_ignore_ascii_case("moderator") {
            Some(Role::Reviewer)
        } else {
            None
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub role: Role,
    pub verified: bool,
}

/// Identity collaborator.
pub trait UserDirectory: Send + Sync {
    fn lookup(&self, id: UserId) -> Option<UserProfile>;

    fn is_reviewer(&self, id: UserId) -> bool {
        self.lookup(id).map(|p| p.role == Role::Reviewer).unwrap_or(false)
    }
}

/// City collaborator.
pub trait CityRegistry: Send + Sync {
    fn contains(&self, city: &str) -> bool;
    /// All cities, sorted.
    fn cities(&self) -> Vec<String>;
}

/// Thread-safe in-memory directory. Ids are assigned sequentially from 1.
#[derive(Default)]
pub struct InMemoryDirectory {
    users: RwLock<HashMap<UserId, UserProfile>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a verified user. Usernames are unique, compared case-insensitively.
    pub fn register(&self, username: &str, role: Role) -> Result<UserId, EngineError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(EngineError::Validation("username must not be empty".into()));
        }
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        if users.values().any(|u| u.username.eq_ignore_ascii_case(username)) {
            return Err(EngineError::Validation(format!("username {} already exists", username)));
        }
        let id = UserId(users.len() as u64 + 1);
        users.insert(
            id,
            UserProfile {
                id,
                username: username.to_string(),
                role,
                verified: true,
            },
        );
        Ok(id)
    }

    /// Builds a directory from `username:role,...`. Entries that fail to parse are skipped.
    pub fn from_list(list: &str) -> Self {
        let dir = Self::new();
        for part in list.split(',') {
            let mut split = part.trim().splitn(2, ':');
            let Some(name) = split.next().map(str::trim).filter(|n| !n.is_empty()) else {
                continue;
            };
            let role = split.next().and_then(|r| Role::from_str(r.trim())).unwrap_or(Role::User);
            if let Err(e) = dir.register(name, role) {
                log::warn!("skipping user entry {}: {}", name, e);
            }
        }
        dir
    }

    pub fn len(&self) -> usize {
        self.users.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl UserDirectory for InMemoryDirectory {
    fn lookup(&self, id: UserId) -> Option<UserProfile> {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }
}

/// Major world cities served by default.
pub const MAJOR_CITIES: &[&str] = &[
    "New York", "London", "Tokyo", "Paris", "Berlin", "Moscow", "Beijing",
    "Shanghai", "Mumbai", "Delhi", "Bangkok", "Singapore", "Hong Kong",
    "Dubai", "Istanbul", "Cairo", "Lagos", "Johannesburg", "São Paulo",
    "Rio de Janeiro", "Buenos Aires", "Mexico City", "Toronto", "Sydney",
    "Melbourne", "Seoul", "Osaka", "Kuala Lumpur", "Jakarta", "Manila",
    "Ho Chi Minh City", "Hanoi", "Dhaka", "Karachi", "Tehran", "Baghdad",
    "Riyadh", "Tel Aviv", "Athens", "Rome", "Madrid", "Barcelona",
    "Amsterdam", "Brussels", "Vienna", "Prague", "Warsaw", "Stockholm",
    "Copenhagen", "Helsinki", "Oslo", "Zurich", "Geneva", "Milan",
    "Naples", "Lisbon", "Dublin", "Edinburgh", "Manchester", "Liverpool",
    "Birmingham", "Glasgow", "Cardiff", "Montreal", "Vancouver", "Calgary",
    "Chicago", "Los Angeles", "San Francisco", "Miami", "Boston",
    "Washington D.C.", "Atlanta", "Dallas", "Houston", "Phoenix",
    "Philadelphia", "San Diego", "Seattle", "Las Vegas", "Detroit",
];

/// Fixed set of city names; exact, case-sensitive membership.
#[derive(Clone, Debug)]
pub struct StaticCities {
    cities: BTreeSet<String>,
}

impl StaticCities {
    pub fn new<I, S>(cities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cities: cities.into_iter().map(Into::into).collect(),
        }
    }

    pub fn major_cities() -> Self {
        Self::new(MAJOR_CITIES.iter().copied())
    }
}

impl CityRegistry for StaticCities {
    fn contains(&self, city: &str) -> bool {
        self.cities.contains(city)
    }

    fn cities(&self) -> Vec<String> {
        self.cities.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_assigns_sequential_ids_and_rejects_duplicates() {
        let dir = InMemoryDirectory::new();
        assert_eq!(dir.register("alice", Role::User).unwrap(), UserId(1));
        assert_eq!(dir.register("bob", Role::Reviewer).unwrap(), UserId(2));
        let err = dir.register("ALICE", Role::User).unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(dir.is_reviewer(UserId(2)));
        assert!(!dir.is_reviewer(UserId(1)));
        assert!(!dir.is_reviewer(UserId(99)));
    }

    #[test]
    fn from_spec_parses_roles() {
        let dir = InMemoryDirectory::from_list("alice:user, bob , carol:moderator,:user");
        assert_eq!(dir.len(), 3);
        assert_eq!(dir.lookup(UserId(2)).unwrap().role, Role::User);
        assert!(dir.is_reviewer(UserId(3)));
    }

    #[test]
    fn major_cities_are_sorted_and_exact() {
        let cities = StaticCities::major_cities();
        let list = cities.cities();
        assert!(list.len() >= 50);
        assert!(list.windows(2).all(|w| w[0] <= w[1]));
        assert!(cities.contains("Paris"));
        assert!(!cities.contains("paris"));
        assert!(!cities.contains("Atlantis"));
    }
}
