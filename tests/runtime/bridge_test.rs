/*!
 * Host Bridge Tests
 * Load and unload entry points against a scripted VM
 */

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use vfd_runtime::core::limits::LOAD_FAILED_SENTINEL;
use vfd_runtime::{
    AttachError, BridgeError, EnvHandle, HostBridge, HostVm, InterfaceVersion, RuntimeContext,
};

struct ScriptedVm {
    env: Option<EnvHandle>,
    attaches: AtomicUsize,
    detaches: AtomicUsize,
}

impl ScriptedVm {
    fn with_env(addr: usize) -> Self {
        Self {
            env: NonZeroUsize::new(addr).map(EnvHandle::from_addr),
            attaches: AtomicUsize::new(0),
            detaches: AtomicUsize::new(0),
        }
    }

    fn without_env() -> Self {
        Self::with_env(0)
    }
}

impl HostVm for ScriptedVm {
    fn get_env(&self, version: InterfaceVersion) -> Result<EnvHandle, AttachError> {
        if version != InterfaceVersion::V1_4 {
            return Err(AttachError::Rejected(format!("unsupported version {:#x}", version.raw())));
        }
        self.env
            .ok_or_else(|| AttachError::Rejected("thread not attached".to_string()))
    }

    fn attach_current_thread(&self) -> Result<EnvHandle, AttachError> {
        self.attaches.fetch_add(1, Ordering::SeqCst);
        Ok(EnvHandle::from_addr(NonZeroUsize::new(0xbeef).unwrap()))
    }

    fn detach_current_thread(&self) {
        self.detaches.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_load_returns_interface_version() {
    let ctx = Arc::new(RuntimeContext::default());
    ctx.on_load().unwrap();
    let bridge = HostBridge::new(Arc::clone(&ctx));

    let vm = Arc::new(ScriptedVm::with_env(0xcafe));
    let version = thread::spawn(move || bridge.on_host_load_raw(vm))
        .join()
        .unwrap();
    assert_eq!(version, 0x0001_0004);
    assert!(ctx.attachments().vm().is_some());
}

#[test]
fn test_load_without_env_returns_sentinel() {
    let ctx = Arc::new(RuntimeContext::default());
    let bridge = HostBridge::new(Arc::clone(&ctx));

    assert_eq!(bridge.on_host_load_raw(Arc::new(ScriptedVm::without_env())), LOAD_FAILED_SENTINEL);
    assert!(ctx.attachments().vm().is_none());

    match bridge.on_host_load(Arc::new(ScriptedVm::without_env())) {
        Err(BridgeError::EnvUnavailable(AttachError::Rejected(_))) => {}
        other => panic!("unexpected load result: {:?}", other),
    }
}

#[test]
fn test_worker_threads_attach_lazily_after_load() {
    let ctx = Arc::new(RuntimeContext::default());
    ctx.on_load().unwrap();
    let bridge = HostBridge::new(Arc::clone(&ctx));

    let vm = Arc::new(ScriptedVm::with_env(0xcafe));
    let loader = bridge.clone();
    let host_vm = Arc::clone(&vm);
    thread::spawn(move || {
        loader.on_host_load(host_vm).unwrap();
        // The loading thread already has its env
        assert_eq!(
            loader.context().attachments().env_for_current_thread(),
            EnvHandle::from_raw(0xcafe as *mut _)
        );
    })
    .join()
    .unwrap();
    assert_eq!(vm.attaches.load(Ordering::SeqCst), 0);

    let worker = Arc::clone(&ctx);
    thread::spawn(move || {
        assert!(worker.attachments().env_for_current_thread().is_some());
    })
    .join()
    .unwrap();

    assert_eq!(vm.attaches.load(Ordering::SeqCst), 1);
    // Loading thread and worker thread both detached at exit
    assert_eq!(vm.detaches.load(Ordering::SeqCst), 2);
}

#[test]
fn test_unload_stops_new_attachments() {
    let ctx = Arc::new(RuntimeContext::default());
    let bridge = HostBridge::new(Arc::clone(&ctx));
    let vm = Arc::new(ScriptedVm::with_env(0xcafe));

    let loader = bridge.clone();
    let host_vm: Arc<dyn HostVm> = vm.clone();
    thread::spawn(move || loader.on_host_load(host_vm).unwrap())
        .join()
        .unwrap();
    bridge.on_host_unload();

    let worker = Arc::clone(&ctx);
    let env = thread::spawn(move || worker.attachments().env_for_current_thread())
        .join()
        .unwrap();
    assert_eq!(env, None);
    assert_eq!(vm.attaches.load(Ordering::SeqCst), 0);
}
