//! Session registry: canonical flow keys mapped to stable opaque IDs.
//!
//! Both directions of a bidirectional flow canonicalize to the same key, so
//! request and response packets share a session. The registry is striped
//! over mutexed shards; readers dominate and inserts are bounded by the
//! eviction policy.

use std::collections::HashMap;
use std::hash::{BuildHasher, Hasher, RandomState};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

const SHARD_COUNT: usize = 16;

/// Bounding policy for the registry. Exactly one is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// LRU bound on the number of live mappings.
    MaxSessions(usize),
    /// Drop mappings idle longer than this.
    Ttl(Duration),
}

struct Entry {
    id: String,
    last_seen: Instant,
}

#[derive(Default)]
struct Shard {
    map: HashMap<String, Entry>,
}

/// Concurrent flow-key → session-ID map.
pub struct SessionRegistry {
    shards: Vec<Mutex<Shard>>,
    policy: EvictionPolicy,
    hasher: RandomState,
}

impl SessionRegistry {
    pub fn new(policy: EvictionPolicy) -> SessionRegistry {
        SessionRegistry {
            shards: (0..SHARD_COUNT).map(|_| Mutex::new(Shard::default())).collect(),
            policy,
            hasher: RandomState::new(),
        }
    }

    /// Canonical key of a 4-tuple: the lexicographically smaller endpoint
    /// comes first, so `A→B` and `B→A` collide.
    pub fn flow_key(a_ip: &str, a_port: u16, b_ip: &str, b_port: u16) -> String {
        if (a_ip, a_port) <= (b_ip, b_port) {
            format!("{a_ip}:{a_port}-{b_ip}:{b_port}")
        } else {
            format!("{b_ip}:{b_port}-{a_ip}:{a_port}")
        }
    }

    /// The session ID for a flow key: the existing mapping if one is live,
    /// otherwise a freshly allocated ID.
    pub fn get_uid(&self, key: &str) -> String {
        let now = Instant::now();
        let mut shard = self.shards[self.shard_index(key)].lock();

        if let Some(entry) = shard.map.get_mut(key) {
            let expired = matches!(self.policy, EvictionPolicy::Ttl(ttl)
                if now.duration_since(entry.last_seen) > ttl);
            if !expired {
                entry.last_seen = now;
                return entry.id.clone();
            }
            shard.map.remove(key);
        }

        self.evict(&mut shard, now);
        let id = new_session_id();
        shard.map.insert(
            key.to_string(),
            Entry {
                id: id.clone(),
                last_seen: now,
            },
        );
        id
    }

    /// A fresh unique ID for events with no transport tuple (decoy server).
    pub fn allocate(&self) -> String {
        new_session_id()
    }

    /// Number of live mappings.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().map.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn shard_index(&self, key: &str) -> usize {
        let mut h = self.hasher.build_hasher();
        h.write(key.as_bytes());
        (h.finish() as usize) % SHARD_COUNT
    }

    /// Make room in a shard before inserting. Eviction removes only the
    /// mapping; events already tagged keep their IDs.
    fn evict(&self, shard: &mut Shard, now: Instant) {
        match self.policy {
            EvictionPolicy::Ttl(ttl) => {
                shard.map.retain(|_, e| now.duration_since(e.last_seen) <= ttl);
            }
            EvictionPolicy::MaxSessions(max) => {
                let per_shard = (max / SHARD_COUNT).max(1);
                while shard.map.len() >= per_shard {
                    let Some(oldest) = shard
                        .map
                        .iter()
                        .min_by_key(|(_, e)| e.last_seen)
                        .map(|(k, _)| k.clone())
                    else {
                        break;
                    };
                    debug!(flow = %oldest, "evicting least-recently-seen session");
                    shard.map.remove(&oldest);
                }
            }
        }
    }
}

fn new_session_id() -> String {
    Uuid::new_v4().simple().to_string()
}
