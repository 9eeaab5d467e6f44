//! Ephemeral resource handles
//!
//! A [`ResourceHandle`] is an opaque `blob:` URL standing for the bytes of one
//! upload. Handles stay resolvable until released; releasing twice is a no-op.

use crate::source::SourceFile;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Opaque reference to the byte stream of an upload
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceHandle(String);

impl ResourceHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Issues, resolves and releases resource handles for one session
#[derive(Default)]
pub struct ResourceRegistry {
    live: Mutex<HashMap<String, Arc<[u8]>>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh handle for the bytes of `file`
    pub fn create(&self, file: &SourceFile) -> ResourceHandle {
        let mut live = self.live.lock();
        loop {
            let url = format!("blob:{}", uuid::Uuid::new_v4());
            if !live.contains_key(&url) {
                live.insert(url.clone(), file.shared_bytes());
                return ResourceHandle(url);
            }
        }
    }

    /// Bytes behind a live handle; `None` once released
    pub fn resolve(&self, handle: &ResourceHandle) -> Option<Arc<[u8]>> {
        self.live.lock().get(&handle.0).cloned()
    }

    /// Release a handle. Returns `false` if it was already released.
    pub fn release(&self, handle: &ResourceHandle) -> bool {
        let released = self.live.lock().remove(&handle.0).is_some();
        if released {
            tracing::debug!(handle = %handle, "released resource handle");
        }
        released
    }

    pub fn is_live(&self, handle: &ResourceHandle) -> bool {
        self.live.lock().contains_key(&handle.0)
    }

    /// Number of handles created and not yet released
    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }
}
