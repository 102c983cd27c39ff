//! Tenant cache sitting in front of the directory.
//!
//! Caches both positive matches and confirmed "no such tenant" results
//! under namespaced keys per lookup kind. A read distinguishes three
//! outcomes: a positive hit, a negative hit, and a miss - a cached
//! negative is not the same thing as "not yet looked up".

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bazaar_core::tenant::Tenant;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq)]
pub enum CacheOutcome {
    /// A tenant record (possibly inactive) is cached for this key.
    Hit(Tenant),
    /// Lookup previously ran and confirmed there is no match.
    HitNegative,
    /// Never looked up, or the entry expired: ask the directory.
    Miss,
}

#[derive(Debug, Clone)]
struct Entry {
    tenant: Option<Tenant>,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct TenantCache {
    entries: RwLock<HashMap<String, Entry>>,
    positive_ttl: Duration,
    negative_ttl: Duration,
}

impl TenantCache {
    pub fn new(positive_ttl: Duration, negative_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            positive_ttl,
            negative_ttl,
        }
    }

    fn full_key(namespace: &str, key: &str) -> String {
        format!("{namespace}:{key}")
    }

    pub async fn get(&self, namespace: &str, key: &str) -> CacheOutcome {
        let full = Self::full_key(namespace, key);
        let expired = {
            let entries = self.entries.read().await;
            match entries.get(&full) {
                None => return CacheOutcome::Miss,
                Some(entry) if entry.expires_at > Instant::now() => {
                    return match &entry.tenant {
                        Some(tenant) => CacheOutcome::Hit(tenant.clone()),
                        None => CacheOutcome::HitNegative,
                    };
                }
                Some(_) => true,
            }
        };
        if expired {
            self.entries.write().await.remove(&full);
        }
        CacheOutcome::Miss
    }

    pub async fn put(&self, namespace: &str, key: &str, tenant: Tenant) {
        let entry = Entry {
            tenant: Some(tenant),
            expires_at: Instant::now() + self.positive_ttl,
        };
        self.entries
            .write()
            .await
            .insert(Self::full_key(namespace, key), entry);
    }

    /// Record a confirmed not-found, short-lived so invalid identifiers
    /// cannot hammer the directory.
    pub async fn put_negative(&self, namespace: &str, key: &str) {
        let entry = Entry {
            tenant: None,
            expires_at: Instant::now() + self.negative_ttl,
        };
        self.entries
            .write()
            .await
            .insert(Self::full_key(namespace, key), entry);
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
