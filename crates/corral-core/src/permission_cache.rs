//! Permission resolution cache.
//!
//! An explicit cache component keyed by (user, organization) with a bounded
//! TTL, an injected clock, and explicit invalidation hooks. The cache is an
//! optimization only - it never changes the authorization contract - and it
//! must be invalidated on every role or membership mutation so stale grants
//! cannot outlive a demotion.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::authority::Capabilities;
use crate::models::MembershipRole;

/// Time source, injectable for tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock implementation used in production wiring.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Resolved permission state for one principal in one organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedPermissions {
    pub membership_id: Uuid,
    pub role: MembershipRole,
    pub is_creator: bool,
    pub capabilities: Capabilities,
}

struct CacheEntry {
    permissions: CachedPermissions,
    cached_at: DateTime<Utc>,
}

/// TTL cache over resolved permissions.
pub struct PermissionCache<C: Clock = SystemClock> {
    entries: Mutex<HashMap<(Uuid, Uuid), CacheEntry>>,
    ttl: Duration,
    clock: C,
}

impl PermissionCache<SystemClock> {
    pub fn new(ttl_seconds: i64) -> Self {
        Self::with_clock(ttl_seconds, SystemClock)
    }
}

impl<C: Clock> PermissionCache<C> {
    pub fn with_clock(ttl_seconds: i64, clock: C) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: Duration::seconds(ttl_seconds),
            clock,
        }
    }

    /// Look up a live entry; expired entries are evicted on the way out.
    pub fn get(&self, user_id: Uuid, organization_id: Uuid) -> Option<CachedPermissions> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().expect("permission cache lock poisoned");

        match entries.get(&(user_id, organization_id)) {
            Some(entry) if now - entry.cached_at < self.ttl => Some(entry.permissions),
            Some(_) => {
                entries.remove(&(user_id, organization_id));
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, user_id: Uuid, organization_id: Uuid, permissions: CachedPermissions) {
        let mut entries = self.entries.lock().expect("permission cache lock poisoned");
        entries.insert(
            (user_id, organization_id),
            CacheEntry {
                permissions,
                cached_at: self.clock.now(),
            },
        );
    }

    /// Drop the entry for one principal in one organization. Called after
    /// role changes, removals, and invite claims affecting that principal.
    pub fn invalidate(&self, user_id: Uuid, organization_id: Uuid) {
        let mut entries = self.entries.lock().expect("permission cache lock poisoned");
        entries.remove(&(user_id, organization_id));
    }

    /// Drop every entry for an organization.
    pub fn invalidate_organization(&self, organization_id: Uuid) {
        let mut entries = self.entries.lock().expect("permission cache lock poisoned");
        entries.retain(|(_, org), _| *org != organization_id);
    }
}
