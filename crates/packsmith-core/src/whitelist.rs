use std::collections::BTreeSet;

use parking_lot::RwLock;

/// The consuming app's own record of which packs it has already accepted.
pub trait WhitelistRegistry: Send + Sync {
    fn is_whitelisted(&self, identifier: &str) -> bool;
}

/// Registry for hosts without a consuming app installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWhitelist;

impl WhitelistRegistry for NoWhitelist {
    fn is_whitelisted(&self, _identifier: &str) -> bool {
        false
    }
}

#[derive(Debug, Default)]
pub struct MemoryWhitelist {
    identifiers: RwLock<BTreeSet<String>>,
}

impl MemoryWhitelist {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, identifier: impl Into<String>) {
        self.identifiers.write().insert(identifier.into());
    }

    pub fn remove(&self, identifier: &str) -> bool {
        self.identifiers.write().remove(identifier)
    }
}

impl WhitelistRegistry for MemoryWhitelist {
    fn is_whitelisted(&self, identifier: &str) -> bool {
        self.identifiers.read().contains(identifier)
    }
}
