//! Scope-keyed TTL caches and the per-scope refresh mutex.
//!
//! Catalog listings are cached for 30 minutes and the full image listing for
//! 6 minutes, both keyed by (account, region). The refresh mutexes live in
//! their own effectively-permanent cache; `get_with` makes creation a single
//! atomic get-or-create, so two concurrent creators always observe the same
//! mutex and no separate creation lock is needed.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use moka::sync::Cache;

use crate::model::{CacheScope, Catalog, MachineImage};

const CATALOG_TTL: Duration = Duration::from_secs(30 * 60);
const IMAGE_LIST_TTL: Duration = Duration::from_secs(6 * 60);
// Lock entries must outlive any realistic process; 500 weeks, as good as forever.
const REFRESH_LOCK_TTL: Duration = Duration::from_secs(500 * 7 * 24 * 60 * 60);

const MAX_SCOPES: u64 = 10_000;

#[derive(Clone)]
pub(crate) struct ScopedCaches {
    pub(crate) public_catalogs: Cache<CacheScope, Arc<Vec<Catalog>>>,
    pub(crate) private_catalogs: Cache<CacheScope, Arc<Vec<Catalog>>>,
    pub(crate) images: Cache<CacheScope, Arc<Vec<MachineImage>>>,
    refresh_locks: Cache<CacheScope, Arc<Mutex<()>>>,
}

impl ScopedCaches {
    pub(crate) fn new() -> Self {
        ScopedCaches {
            public_catalogs: Cache::builder()
                .max_capacity(MAX_SCOPES)
                .time_to_live(CATALOG_TTL)
                .build(),
            private_catalogs: Cache::builder()
                .max_capacity(MAX_SCOPES)
                .time_to_live(CATALOG_TTL)
                .build(),
            images: Cache::builder()
                .max_capacity(MAX_SCOPES)
                .time_to_live(IMAGE_LIST_TTL)
                .build(),
            refresh_locks: Cache::builder()
                .max_capacity(MAX_SCOPES)
                .time_to_live(REFRESH_LOCK_TTL)
                .build(),
        }
    }

    /// The refresh mutex for a scope, created at most once per scope.
    pub(crate) fn refresh_lock(&self, scope: &CacheScope) -> Arc<Mutex<()>> {
        self.refresh_locks
            .get_with(scope.clone(), || Arc::new(Mutex::new(())))
    }
}
