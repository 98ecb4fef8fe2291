//! Per-owner contexts
//!
//! Each owner gets an independent [`SessionStore`] and [`ResponseCache`].
//! The registry is an explicit object owned by the caller: a context is
//! created on the first request for an owner and torn down on shutdown.

use crate::cache::ResponseCache;
use crate::config::Config;
use crate::error::Result;
use crate::store::SessionStore;
use std::collections::HashMap;

/// Everything one owner needs to hold a conversation
#[derive(Debug)]
pub struct OwnerContext {
    pub store: SessionStore,
    pub cache: ResponseCache,
}

impl OwnerContext {
    /// Opens a store bound to `owner` and an empty cache
    pub fn open(config: &Config, owner: &str) -> Result<Self> {
        Ok(Self {
            store: SessionStore::open(config, Some(owner))?,
            cache: ResponseCache::new(config.cache.capacity),
        })
    }
}

/// Lookup table from owner identity to its context
#[derive(Debug)]
pub struct StoreRegistry {
    config: Config,
    contexts: HashMap<String, OwnerContext>,
}

impl StoreRegistry {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            contexts: HashMap::new(),
        }
    }

    /// The context for `owner`, opening it on first use
    ///
    /// # Errors
    ///
    /// Returns an error if neither storage backend can be opened. Nothing is
    /// registered in that case.
    pub fn context(&mut self, owner: &str) -> Result<&mut OwnerContext> {
        use std::collections::hash_map::Entry;

        match self.contexts.entry(owner.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let context = OwnerContext::open(&self.config, owner)?;
                tracing::info!(
                    "Opened context for {} on {} backend",
                    owner,
                    context.store.backend_kind()
                );
                Ok(entry.insert(context))
            }
        }
    }

    /// The context for `owner` if it is already open
    pub fn get(&self, owner: &str) -> Option<&OwnerContext> {
        self.contexts.get(owner)
    }

    pub fn contains(&self, owner: &str) -> bool {
        self.contexts.contains_key(owner)
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Owners with an open context, sorted
    pub fn owners(&self) -> Vec<&str> {
        let mut owners: Vec<&str> = self.contexts.keys().map(String::as_str).collect();
        owners.sort_unstable();
        owners
    }

    /// Tears down one owner's context
    ///
    /// Durable state is already persisted; only memory is released.
    pub fn shutdown(&mut self, owner: &str) -> bool {
        let removed = self.contexts.remove(owner).is_some();
        if removed {
            tracing::info!("Closed context for {}", owner);
        }
        removed
    }

    /// Tears down every context, returning how many were open
    pub fn shutdown_all(&mut self) -> usize {
        let count = self.contexts.len();
        self.contexts.clear();
        tracing::info!("Closed {} owner contexts", count);
        count
    }
}
