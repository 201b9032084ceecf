// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Short-lived profile cache.
//!
//! Entries expire after the configured TTL and are dropped on read. Anything
//! that changes a user's plan must call [`ProfileCache::invalidate`].

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tally_core::{UserId, UserProfile};

#[derive(Debug, Clone)]
struct Entry {
    profile: UserProfile,
    stored_at: Instant,
}

#[derive(Debug)]
pub struct ProfileCache {
    entries: DashMap<UserId, Entry>,
    ttl: Duration,
}

impl ProfileCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, user_id: UserId) -> Option<UserProfile> {
        let expired = {
            let entry = self.entries.get(&user_id)?;
            if entry.stored_at.elapsed() < self.ttl {
                return Some(entry.profile.clone());
            }
            true
        };
        if expired {
            self.entries.remove(&user_id);
        }
        None
    }

    pub fn put(&self, profile: UserProfile) {
        self.entries.insert(
            profile.id,
            Entry {
                profile,
                stored_at: Instant::now(),
            },
        );
    }

    /// Apply `f` to a cached profile, if present. Does not refresh the TTL.
    pub fn modify(&self, user_id: UserId, f: impl FnOnce(&mut UserProfile)) {
        if let Some(mut entry) = self.entries.get_mut(&user_id) {
            f(&mut entry.profile);
        }
    }

    /// Keep the cached token counter in step with the store.
    pub fn update_tokens_used(&self, user_id: UserId, used: i64) {
        self.modify(user_id, |p| p.monthly_ai_tokens_used = used);
    }

    pub fn invalidate(&self, user_id: UserId) {
        self.entries.remove(&user_id);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
