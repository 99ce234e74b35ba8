/*!
 * Attachment Keys
 *
 * Per-thread value slots addressed by a key, with a destructor run at thread
 * exit. A thread-local registry holds one entry per live key; dropping the
 * registry at thread exit runs each live key's destructor exactly once.
 * Deleting a key makes its entries inert: no further reads, writes, or
 * destructor calls.
 */

use super::vm::EnvHandle;
use crate::core::errors::AttachError;
use crate::core::fatal::abort_process;
use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Key ids are never reused within a process
static NEXT_KEY_ID: AtomicU64 = AtomicU64::new(1);

type Destructor = Box<dyn Fn(EnvHandle) + Send + Sync>;

struct KeyState {
    id: u64,
    deleted: AtomicBool,
    destructor: Destructor,
}

struct Entry {
    key: Weak<KeyState>,
    key_id: u64,
    env: EnvHandle,
}

impl Entry {
    fn is_stale(&self) -> bool {
        match self.key.upgrade() {
            Some(key) => key.deleted.load(Ordering::Acquire),
            None => true,
        }
    }
}

#[derive(Default)]
struct ThreadRegistry {
    entries: Vec<Entry>,
}

impl Drop for ThreadRegistry {
    fn drop(&mut self) {
        for entry in self.entries.drain(..) {
            let Some(key) = entry.key.upgrade() else {
                continue;
            };
            if !key.deleted.load(Ordering::Acquire) {
                (key.destructor)(entry.env);
            }
        }
    }
}

thread_local! {
    static REGISTRY: RefCell<ThreadRegistry> = RefCell::new(ThreadRegistry::default());
}

/// Handle to a per-thread slot with a thread-exit destructor
#[derive(Clone)]
pub struct AttachmentKey {
    state: Arc<KeyState>,
}

impl AttachmentKey {
    /// Create a key whose destructor runs at exit of every thread holding a value
    pub fn create<F>(destructor: F) -> Self
    where
        F: Fn(EnvHandle) + Send + Sync + 'static,
    {
        let id = match NEXT_KEY_ID.fetch_update(Ordering::AcqRel, Ordering::Acquire, |id| {
            id.checked_add(1)
        }) {
            Ok(id) => id,
            Err(_) => abort_process("attachment key space exhausted"),
        };

        debug!(key = id, "attachment key created");
        Self {
            state: Arc::new(KeyState {
                id,
                deleted: AtomicBool::new(false),
                destructor: Box::new(destructor),
            }),
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.state.id
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.state.deleted.load(Ordering::Acquire)
    }

    /// Delete the key; true on the first call only
    pub fn delete(&self) -> bool {
        let first = !self.state.deleted.swap(true, Ordering::AcqRel);
        if first {
            debug!(key = self.state.id, "attachment key deleted");
        }
        first
    }

    /// Value stored by the calling thread
    pub fn get(&self) -> Result<Option<EnvHandle>, AttachError> {
        if self.is_deleted() {
            return Err(AttachError::KeyDeleted);
        }
        let id = self.state.id;
        REGISTRY
            .try_with(|registry| -> Result<Option<EnvHandle>, AttachError> {
                let registry = registry.try_borrow().map_err(|_| AttachError::KeyStore)?;
                Ok(registry
                    .entries
                    .iter()
                    .find(|entry| entry.key_id == id)
                    .map(|entry| entry.env))
            })
            .map_err(|_| AttachError::KeyStore)?
    }

    /// Store a value for the calling thread, replacing any previous one
    pub fn set(&self, env: EnvHandle) -> Result<(), AttachError> {
        if self.is_deleted() {
            return Err(AttachError::KeyDeleted);
        }
        let id = self.state.id;
        let weak = Arc::downgrade(&self.state);
        REGISTRY
            .try_with(|registry| -> Result<(), AttachError> {
                let mut registry = registry.try_borrow_mut().map_err(|_| AttachError::KeyStore)?;
                registry.entries.retain(|entry| !entry.is_stale());

                match registry.entries.iter_mut().find(|entry| entry.key_id == id) {
                    Some(entry) => entry.env = env,
                    None => registry.entries.push(Entry {
                        key: weak,
                        key_id: id,
                        env,
                    }),
                }
                Ok(())
            })
            .map_err(|_| AttachError::KeyStore)?
    }
}

impl fmt::Debug for AttachmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttachmentKey")
            .field("id", &self.state.id)
            .field("deleted", &self.is_deleted())
            .finish()
    }
}
