/*!
 * Runtime Attachment Cache
 *
 * Per-thread cached environment handle for calling back into the host VM.
 * A thread is attached the first time it asks for an environment while a VM is
 * registered, and detached automatically when it exits.
 */

use super::key::AttachmentKey;
use super::vm::{EnvHandle, HostVm};
use crate::core::errors::AttachError;
use crate::core::fatal::abort_process;
use arc_swap::ArcSwapOption;
use std::fmt;
use std::sync::{Arc, Once, OnceLock, Weak};
use tracing::{debug, warn};

struct VmSlot(Arc<dyn HostVm>);

type VmCell = ArcSwapOption<VmSlot>;

/// Detach hook registered with the attachment key
///
/// Uses whatever VM is registered when the thread exits; none means no detach.
fn detach_thread(vm: &Weak<VmCell>, env: EnvHandle) {
    let Some(cell) = vm.upgrade() else {
        return;
    };
    if let Some(slot) = cell.load_full() {
        debug!(%env, "detaching exiting thread from host VM");
        slot.0.detach_current_thread();
    }
}

/// Attachment cache owned by the runtime context
pub struct AttachmentCache {
    vm: Arc<VmCell>,
    key: OnceLock<AttachmentKey>,
    delete_once: Once,
}

impl AttachmentCache {
    pub fn new() -> Self {
        Self {
            vm: Arc::new(ArcSwapOption::empty()),
            key: OnceLock::new(),
            delete_once: Once::new(),
        }
    }

    /// Create the attachment key; later calls return the same key
    pub fn create_key(&self) -> &AttachmentKey {
        self.key.get_or_init(|| {
            let vm = Arc::downgrade(&self.vm);
            AttachmentKey::create(move |env| detach_thread(&vm, env))
        })
    }

    /// Delete the attachment key, once
    ///
    /// Threads still holding an environment are not detached afterwards, and no
    /// further attachment is possible through this cache.
    pub fn delete_key(&self) {
        self.delete_once.call_once(|| {
            self.create_key().delete();
        });
    }

    #[inline]
    pub fn is_key_deleted(&self) -> bool {
        self.key.get().is_some_and(AttachmentKey::is_deleted)
    }

    /// Registered VM, if any
    pub fn vm(&self) -> Option<Arc<dyn HostVm>> {
        self.vm.load_full().map(|slot| Arc::clone(&slot.0))
    }

    pub fn set_vm(&self, vm: Arc<dyn HostVm>) {
        self.vm.store(Some(Arc::new(VmSlot(vm))));
        debug!("host VM registered");
    }

    pub fn clear_vm(&self) {
        self.vm.store(None);
        debug!("host VM cleared");
    }

    /// Whether the calling thread has a cached environment
    pub fn is_attached(&self) -> bool {
        let key = self.create_key();
        matches!(key.get(), Ok(Some(_)))
    }

    /// Environment for the calling thread, attaching it if needed
    ///
    /// `None` when no VM is registered, the VM refuses the attach, or the key
    /// was deleted. Aborts the process if a fresh attachment cannot be cached.
    pub fn env_for_current_thread(&self) -> Option<EnvHandle> {
        match self.try_env_for_current_thread() {
            Ok(env) => Some(env),
            Err(AttachError::Rejected(reason)) => {
                warn!(%reason, "host VM refused to attach thread");
                None
            }
            Err(e) => {
                debug!(error = %e, "no env for this thread");
                None
            }
        }
    }

    /// Same as [`env_for_current_thread`](Self::env_for_current_thread),
    /// reporting why no environment is available
    pub fn try_env_for_current_thread(&self) -> Result<EnvHandle, AttachError> {
        let key = self.create_key();
        if key.is_deleted() {
            return Err(AttachError::KeyDeleted);
        }

        match key.get() {
            Ok(Some(env)) => return Ok(env),
            Ok(None) => {}
            Err(e) => debug!(error = %e, "attachment store unreadable"),
        }

        let vm = self.vm.load_full().ok_or(AttachError::NoVm)?;

        debug!("env was not yet set for this thread, attaching");
        let env = vm.0.attach_current_thread()?;

        if let Err(e) = key.set(env) {
            abort_process(&format!("can't cache env for attached thread: {}", e));
        }
        Ok(env)
    }

    /// Cache an already obtained environment for the calling thread
    ///
    /// Keeps the existing handle if one is cached.
    pub fn save_env(&self, env: EnvHandle) -> Result<(), AttachError> {
        let key = self.create_key();
        if key.get()?.is_some() {
            return Ok(());
        }
        key.set(env)
    }

    /// Register the host VM and the calling thread's environment in one step
    pub fn register_vm_and_env(&self, vm: Arc<dyn HostVm>, env: EnvHandle) -> Result<(), AttachError> {
        self.set_vm(vm);
        self.save_env(env)
    }
}

impl Default for AttachmentCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AttachmentCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttachmentCache")
            .field("key", &self.key.get())
            .field("vm_registered", &self.vm.load().is_some())
            .finish()
    }
}
