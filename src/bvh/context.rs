use crate::error::{BvhError, Result};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Host hooks consulted whenever a hierarchy grows one of its buffers.
/// Implementors carry their own state, so no separate user-data pointer is needed.
pub trait MemoryHooks: Send + Sync {
    /// Return false to refuse the allocation.
    fn on_alloc(&self, bytes: usize) -> bool;
    fn on_free(&self, bytes: usize);
}

/// Allocation policy for one hierarchy. Without hooks every request is granted.
#[derive(Default)]
pub struct BuildContext {
    hooks: Option<Arc<dyn MemoryHooks>>,
    charged: usize,
}

impl BuildContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hooks(hooks: Arc<dyn MemoryHooks>) -> Self {
        Self {
            hooks: Some(hooks),
            charged: 0,
        }
    }

    /// Bytes currently charged against the hooks by this context.
    pub fn charged(&self) -> usize {
        self.charged
    }

    /// Resizes `buf` to exactly `len` elements of `fill`, reusing the existing
    /// allocation when it is large enough.
    pub(crate) fn ensure<T: Clone>(&mut self, buf: &mut Vec<T>, len: usize, fill: T) -> Result<()> {
        if buf.capacity() < len {
            let bytes = (len - buf.capacity()) * std::mem::size_of::<T>();
            if let Some(hooks) = &self.hooks {
                if !hooks.on_alloc(bytes) {
                    return Err(BvhError::AllocationFailed { bytes });
                }
            }
            buf.clear();
            if buf.try_reserve_exact(len).is_err() {
                if let Some(hooks) = &self.hooks {
                    hooks.on_free(bytes);
                }
                return Err(BvhError::AllocationFailed { bytes });
            }
            self.charged += bytes;
        }
        buf.clear();
        buf.resize(len, fill);
        Ok(())
    }

    /// Frees a scratch buffer obtained through `ensure` and returns its bytes.
    pub(crate) fn release<T>(&mut self, buf: Vec<T>) {
        let bytes = (buf.capacity() * std::mem::size_of::<T>()).min(self.charged);
        drop(buf);
        if let Some(hooks) = &self.hooks {
            if bytes > 0 {
                hooks.on_free(bytes);
            }
        }
        self.charged -= bytes;
    }
}

impl Clone for BuildContext {
    // A clone shares the hooks but owns no charges yet.
    fn clone(&self) -> Self {
        Self {
            hooks: self.hooks.clone(),
            charged: 0,
        }
    }
}

impl fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildContext")
            .field("hooked", &self.hooks.is_some())
            .field("charged", &self.charged)
            .finish()
    }
}

impl Drop for BuildContext {
    fn drop(&mut self) {
        if let Some(hooks) = &self.hooks {
            if self.charged > 0 {
                hooks.on_free(self.charged);
            }
        }
    }
}

/// Hooks that enforce a fixed byte budget shared by every hierarchy using them.
#[derive(Debug)]
pub struct ByteBudget {
    limit: usize,
    used: AtomicUsize,
}

impl ByteBudget {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            used: AtomicUsize::new(0),
        }
    }

    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl MemoryHooks for ByteBudget {
    fn on_alloc(&self, bytes: usize) -> bool {
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(bytes).filter(|&total| total <= self.limit)
            })
            .is_ok()
    }

    fn on_free(&self, bytes: usize) {
        let _ = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                Some(used.saturating_sub(bytes))
            });
    }
}
