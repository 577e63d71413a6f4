//! Wallet Snapshot Cache
//!
//! Read-through TTL cache for wallet views. Snapshots are explicitly
//! point-in-time; the engine invalidates a user's snapshot right after a
//! settlement commits, so staleness is bounded by the TTL only for
//! balance changes made by other instances.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

use crate::ledger::models::WalletSnapshot;

/// Default snapshot TTL
pub const SNAPSHOT_TTL_SECONDS: u64 = 30;

pub struct WalletCache {
    ttl: Duration,
    snapshots: DashMap<Uuid, (Instant, WalletSnapshot)>,
}

impl WalletCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            snapshots: DashMap::new(),
        }
    }

    /// Fresh snapshot for the user, if one is cached
    pub fn get(&self, user_id: Uuid) -> Option<WalletSnapshot> {
        let hit = self.snapshots.get(&user_id)?;
        let (stored_at, snapshot) = hit.value();
        if stored_at.elapsed() > self.ttl {
            drop(hit);
            self.snapshots.remove(&user_id);
            return None;
        }
        Some(snapshot.clone())
    }

    pub fn put(&self, snapshot: WalletSnapshot) {
        self.snapshots
            .insert(snapshot.user_id, (Instant::now(), snapshot));
    }

    /// Drop the user's snapshot. Called after every committed settlement.
    pub fn invalidate(&self, user_id: Uuid) {
        self.snapshots.remove(&user_id);
    }
}

impl Default for WalletCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(SNAPSHOT_TTL_SECONDS))
    }
}
