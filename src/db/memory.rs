//! In-process stores. They keep the same contracts as the Postgres and Redis
//! backends and are what the test suite runs against.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

use super::{KeyValueStore, StoreError, StoreResult, UserStore};
use crate::models::user::{NewUser, Role, User, UserChanges, UserFilter};

#[derive(Debug, Clone)]
struct StoredUser {
    id: i64,
    name: String,
    email: String,
    password_hash: String,
    phone: Option<String>,
    role_id: i64,
    active: bool,
    avatar: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, StoredUser>,
    roles: BTreeMap<i64, Role>,
    next_user_id: i64,
    next_role_id: i64,
}

impl Tables {
    fn materialize(&self, u: &StoredUser) -> User {
        let role = self.roles.get(&u.role_id).cloned().unwrap_or(Role {
            id: u.role_id,
            name: String::new(),
        });
        User {
            id: u.id,
            name: u.name.clone(),
            email: u.email.clone(),
            password_hash: u.password_hash.clone(),
            phone: u.phone.clone(),
            role,
            active: u.active,
            avatar: u.avatar.clone(),
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }

    fn insert_role(&mut self, name: &str) -> StoreResult<Role> {
        if self.roles.values().any(|r| r.name == name) {
            return Err(StoreError::Conflict("Role already exists".into()));
        }
        self.next_role_id += 1;
        let role = Role {
            id: self.next_role_id,
            name: name.to_string(),
        };
        self.roles.insert(role.id, role.clone());
        Ok(role)
    }
}

/// User/role tables held in memory, seeded with the `admin` and `user` roles.
pub struct MemoryUserStore {
    tables: Mutex<Tables>,
}

impl Default for MemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryUserStore {
    pub fn new() -> Self {
        let mut tables = Tables::default();
        for name in ["admin", "user"] {
            // Fresh table: names are unique.
            let _ = tables.insert_role(name);
        }
        Self {
            tables: Mutex::new(tables),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let t = self.lock();
        Ok(t.users.values().find(|u| u.email == email).map(|u| t.materialize(u)))
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        let t = self.lock();
        Ok(t.users.get(&id).map(|u| t.materialize(u)))
    }

    async fn update_password(&self, id: i64, password_hash: &str) -> StoreResult<()> {
        let mut t = self.lock();
        if let Some(u) = t.users.get_mut(&id) {
            u.password_hash = password_hash.to_string();
            u.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn list_users(&self, filter: &UserFilter) -> StoreResult<Vec<User>> {
        let t = self.lock();
        let needle = filter.search_term().map(str::to_lowercase);
        let users = t
            .users
            .values()
            .map(|u| t.materialize(u))
            .filter(|u| filter.role_name().map_or(true, |r| u.role.name == r))
            .filter(|u| filter.active().map_or(true, |a| u.active == a))
            .filter(|u| {
                needle.as_deref().map_or(true, |n| {
                    u.name.to_lowercase().contains(n) || u.email.to_lowercase().contains(n)
                })
            })
            .collect();
        Ok(users)
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut t = self.lock();
        if t.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict("Email already in use".into()));
        }
        if !t.roles.contains_key(&user.role_id) {
            return Err(StoreError::Conflict("Role not found".into()));
        }
        t.next_user_id += 1;
        let now = Utc::now();
        let stored = StoredUser {
            id: t.next_user_id,
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            phone: user.phone,
            role_id: user.role_id,
            active: true,
            avatar: user.avatar,
            created_at: now,
            updated_at: now,
        };
        let created = t.materialize(&stored);
        t.users.insert(stored.id, stored);
        Ok(created)
    }

    async fn update_user(&self, id: i64, changes: UserChanges) -> StoreResult<Option<User>> {
        let mut t = self.lock();
        if let Some(role_id) = changes.role_id {
            if !t.roles.contains_key(&role_id) {
                return Err(StoreError::Conflict("Role not found".into()));
            }
        }
        let Some(u) = t.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = changes.name {
            u.name = name;
        }
        if let Some(hash) = changes.password_hash {
            u.password_hash = hash;
        }
        if let Some(phone) = changes.phone {
            u.phone = Some(phone);
        }
        if let Some(role_id) = changes.role_id {
            u.role_id = role_id;
        }
        if let Some(avatar) = changes.avatar {
            u.avatar = Some(avatar);
        }
        if let Some(active) = changes.active {
            u.active = active;
        }
        u.updated_at = Utc::now();
        let updated = u.clone();
        Ok(Some(t.materialize(&updated)))
    }

    async fn delete_user(&self, id: i64) -> StoreResult<bool> {
        Ok(self.lock().users.remove(&id).is_some())
    }

    async fn list_roles(&self) -> StoreResult<Vec<Role>> {
        Ok(self.lock().roles.values().cloned().collect())
    }

    async fn find_role(&self, id: i64) -> StoreResult<Option<Role>> {
        Ok(self.lock().roles.get(&id).cloned())
    }

    async fn create_role(&self, name: &str) -> StoreResult<Role> {
        self.lock().insert_role(name)
    }

    async fn update_role(&self, id: i64, name: &str) -> StoreResult<Option<Role>> {
        let mut t = self.lock();
        if t.roles.values().any(|r| r.name == name && r.id != id) {
            return Err(StoreError::Conflict("Role already exists".into()));
        }
        Ok(t.roles.get_mut(&id).map(|r| {
            r.name = name.to_string();
            r.clone()
        }))
    }

    async fn delete_role(&self, id: i64) -> StoreResult<bool> {
        let mut t = self.lock();
        if t.users.values().any(|u| u.role_id == id) {
            return Err(StoreError::Conflict("Role is assigned to users".into()));
        }
        Ok(t.roles.remove(&id).is_some())
    }
}

/// Expiring key-value map. Expiry is checked on read against `tokio` time, so
/// tests can drive it with a paused clock.
#[derive(Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    fn live_entries(&self) -> MutexGuard<'_, HashMap<String, (String, Instant)>> {
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Instant::now();
        entries.retain(|_, (_, deadline)| *deadline > now);
        entries
    }
}

#[async_trait]
impl KeyValueStore for MemoryKv {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.live_entries().get(key).map(|(v, _)| v.clone()))
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let mut entries = self.live_entries();
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(true)
    }

    async fn del(&self, key: &str) -> StoreResult<bool> {
        Ok(self.live_entries().remove(key).is_some())
    }
}
