//! Stream registry - process-wide stream name/id interning and router lookup
//!
//! The registry has a two-phase lifecycle: mutable while plugins are being
//! configured, effectively frozen once the pipeline runs. Reads vastly
//! outnumber writes, so the whole table lives in an immutable snapshot
//! behind an `ArcSwap`; the rare late registration clones the snapshot,
//! mutates the clone and swaps it in.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;

use crate::error::RegistryError;
use crate::router::{Router, Subscription};
use crate::stream::StreamId;

#[derive(Clone, Default)]
struct Snapshot {
    routers: HashMap<StreamId, Arc<Router>>,
    names: HashMap<StreamId, Arc<str>>,
}

/// Process-wide stream id interning and router lookup
///
/// Invariant: for every stream id carried by any message, `get_router`
/// yields a router - lazily creating a default dropping router when no
/// plugin registered one.
pub struct StreamRegistry {
    snapshot: ArcSwap<Snapshot>,
    // Serializes copy-on-write updates; lookups never take it.
    write_lock: Mutex<()>,
    // Producers subscribed to the wildcard stream join every router,
    // including ones created after them.
    wildcard: Mutex<Vec<Subscription>>,
}

impl StreamRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot::default()),
            write_lock: Mutex::new(()),
            wildcard: Mutex::new(Vec::new()),
        }
    }

    /// Intern a stream name, returning its id
    ///
    /// The same name always yields the same id.
    ///
    /// # Panics
    ///
    /// Panics if a second distinct name hashes to an already-interned id.
    /// A 64-bit collision is considered corruption, not a recoverable
    /// condition.
    pub fn stream_id(&self, name: &str) -> StreamId {
        let id = StreamId::from_name(name);

        let snap = self.snapshot.load();
        if let Some(known) = snap.names.get(&id) {
            assert!(
                known.as_ref() == name,
                "stream id collision: '{name}' and '{known}' both hash to {id}"
            );
            return id;
        }
        drop(snap);

        let _guard = self.write_lock.lock().unwrap();
        let mut next = (**self.snapshot.load()).clone();
        match next.names.get(&id) {
            Some(known) => {
                assert!(
                    known.as_ref() == name,
                    "stream id collision: '{name}' and '{known}' both hash to {id}"
                );
            }
            None => {
                next.names.insert(id, Arc::from(name));
                self.snapshot.store(Arc::new(next));
            }
        }
        id
    }

    /// Register a router for its stream
    ///
    /// Fails if a non-default router is already registered for the same
    /// stream; replacing a lazily-created default router is allowed.
    pub fn register(&self, router: Arc<Router>) -> Result<(), RegistryError> {
        let id = router.stream_id();
        let _guard = self.write_lock.lock().unwrap();

        let current = self.snapshot.load();
        if let Some(existing) = current.routers.get(&id) {
            if !existing.is_default() {
                return Err(RegistryError::AlreadyRegistered {
                    stream: router.name().to_string(),
                });
            }
        }
        drop(current);

        for sub in self.wildcard.lock().unwrap().iter() {
            router.subscribe(sub.clone());
        }

        let mut next = (**self.snapshot.load()).clone();
        next.names.insert(id, Arc::from(router.name()));
        next.routers.insert(id, router);
        self.snapshot.store(Arc::new(next));
        Ok(())
    }

    /// Look up the router for a stream, lazily creating a dropping
    /// default router if none was registered
    pub fn get_router(&self, id: StreamId) -> Arc<Router> {
        if let Some(router) = self.snapshot.load().routers.get(&id) {
            return Arc::clone(router);
        }

        let _guard = self.write_lock.lock().unwrap();
        // Raced registration may have filled it in meanwhile.
        if let Some(router) = self.snapshot.load().routers.get(&id) {
            return Arc::clone(router);
        }

        let name: Arc<str> = self
            .snapshot
            .load()
            .names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| Arc::from(format!("{id}")));
        tracing::debug!(stream = %name, "no router registered, creating default drop router");

        let router = Arc::new(Router::default_for(name));
        for sub in self.wildcard.lock().unwrap().iter() {
            router.subscribe(sub.clone());
        }

        let mut next = (**self.snapshot.load()).clone();
        next.routers.insert(id, Arc::clone(&router));
        self.snapshot.store(Arc::new(next));
        router
    }

    /// Subscribe a producer to a set of streams
    ///
    /// A wildcard entry subscribes the producer to every router, present
    /// and future. Non-wildcard entries attach to the stream's router,
    /// creating a default one if needed.
    pub fn subscribe(&self, streams: &[StreamId], subscription: Subscription) {
        if streams.iter().any(|id| id.is_wildcard()) {
            let routers: Vec<Arc<Router>> = {
                let snap = self.snapshot.load();
                snap.routers.values().map(Arc::clone).collect()
            };
            for router in routers {
                router.subscribe(subscription.clone());
            }
            self.wildcard.lock().unwrap().push(subscription);
            return;
        }

        for &id in streams {
            self.get_router(id).subscribe(subscription.clone());
        }
    }

    /// Number of registered routers (defaults included)
    #[must_use]
    pub fn router_count(&self) -> usize {
        self.snapshot.load().routers.len()
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StreamRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRegistry")
            .field("routers", &self.router_count())
            .finish()
    }
}
