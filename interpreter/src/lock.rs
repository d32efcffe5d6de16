use dashmap::DashSet;

/// Per-destination render locks. A destination being rendered into cannot
/// start a second render until the first guard drops.
#[derive(Debug, Default)]
pub struct RenderLocks {
    held: DashSet<String>,
}

impl RenderLocks {
    pub fn new() -> Self {
        RenderLocks::default()
    }

    /// Take the lock for `key`, or `None` when it is already held.
    pub fn acquire(&self, key: &str) -> Option<RenderGuard<'_>> {
        if self.held.insert(key.to_string()) {
            Some(RenderGuard {
                locks: self,
                key: key.to_string(),
            })
        } else {
            None
        }
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.held.contains(key)
    }
}

/// Releases its destination on drop.
#[derive(Debug)]
pub struct RenderGuard<'a> {
    locks: &'a RenderLocks,
    key: String,
}

impl RenderGuard<'_> {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for RenderGuard<'_> {
    fn drop(&mut self) {
        self.locks.held.remove(&self.key);
    }
}
