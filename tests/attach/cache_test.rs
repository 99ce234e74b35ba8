/*!
 * Attachment Cache Tests
 * Lazy attach and thread-exit detach against a counting VM
 */

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use vfd_runtime::{AttachError, AttachmentCache, EnvHandle, HostVm, InterfaceVersion};

/// Hands each attaching thread a fresh handle and counts attach/detach
#[derive(Default)]
struct CountingVm {
    attaches: AtomicUsize,
    detaches: AtomicUsize,
}

impl CountingVm {
    fn attaches(&self) -> usize {
        self.attaches.load(Ordering::SeqCst)
    }

    fn detaches(&self) -> usize {
        self.detaches.load(Ordering::SeqCst)
    }
}

impl HostVm for CountingVm {
    fn get_env(&self, _version: InterfaceVersion) -> Result<EnvHandle, AttachError> {
        Err(AttachError::Rejected("not attached".to_string()))
    }

    fn attach_current_thread(&self) -> Result<EnvHandle, AttachError> {
        let n = self.attaches.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(EnvHandle::from_addr(NonZeroUsize::new(0x1000 * n).unwrap()))
    }

    fn detach_current_thread(&self) {
        self.detaches.fetch_add(1, Ordering::SeqCst);
    }
}

fn env(addr: usize) -> EnvHandle {
    EnvHandle::from_addr(NonZeroUsize::new(addr).unwrap())
}

#[test]
fn test_same_handle_on_repeat_calls() {
    let vm = Arc::new(CountingVm::default());
    let cache = Arc::new(AttachmentCache::new());
    cache.set_vm(vm.clone());

    let worker = Arc::clone(&cache);
    let (first, second) = thread::spawn(move || {
        (worker.env_for_current_thread(), worker.env_for_current_thread())
    })
    .join()
    .unwrap();

    assert!(first.is_some());
    assert_eq!(first, second);
    assert_eq!(vm.attaches(), 1);
    assert_eq!(vm.detaches(), 1);
}

#[test]
fn test_each_thread_attaches_and_detaches_once() {
    const THREADS: usize = 6;

    let vm = Arc::new(CountingVm::default());
    let cache = Arc::new(AttachmentCache::new());
    cache.set_vm(vm.clone());
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..10 {
                    cache.env_for_current_thread().unwrap();
                }
                cache.env_for_current_thread().unwrap()
            })
        })
        .collect();

    let mut envs: Vec<EnvHandle> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    envs.sort_by_key(EnvHandle::addr);
    envs.dedup();

    assert_eq!(envs.len(), THREADS);
    assert_eq!(vm.attaches(), THREADS);
    assert_eq!(vm.detaches(), THREADS);
}

#[test]
fn test_thread_without_env_not_detached() {
    let vm = Arc::new(CountingVm::default());
    let cache = Arc::new(AttachmentCache::new());
    cache.set_vm(vm.clone());

    let worker = Arc::clone(&cache);
    thread::spawn(move || {
        worker.create_key();
    })
    .join()
    .unwrap();

    assert_eq!(vm.attaches(), 0);
    assert_eq!(vm.detaches(), 0);
}

#[test]
fn test_registered_env_needs_no_attach() {
    let vm = Arc::new(CountingVm::default());
    let cache = Arc::new(AttachmentCache::new());

    let worker = Arc::clone(&cache);
    let registered = vm.clone();
    let seen = thread::spawn(move || {
        worker.register_vm_and_env(registered, env(0x42)).unwrap();
        worker.env_for_current_thread()
    })
    .join()
    .unwrap();

    assert_eq!(seen, Some(env(0x42)));
    assert_eq!(vm.attaches(), 0);
    // A registered handle is still detached at thread exit
    assert_eq!(vm.detaches(), 1);
}

#[test]
fn test_no_detach_after_vm_cleared() {
    let vm = Arc::new(CountingVm::default());
    let cache = Arc::new(AttachmentCache::new());
    cache.set_vm(vm.clone());

    let worker = Arc::clone(&cache);
    thread::spawn(move || {
        worker.env_for_current_thread().unwrap();
        worker.clear_vm();
    })
    .join()
    .unwrap();

    assert_eq!(vm.attaches(), 1);
    assert_eq!(vm.detaches(), 0);
}

#[test]
fn test_deleted_key_skips_detach() {
    let vm = Arc::new(CountingVm::default());
    let cache = Arc::new(AttachmentCache::new());
    cache.set_vm(vm.clone());

    let worker = Arc::clone(&cache);
    thread::spawn(move || {
        worker.env_for_current_thread().unwrap();
        worker.delete_key();
        assert_eq!(worker.env_for_current_thread(), None);
    })
    .join()
    .unwrap();

    assert_eq!(vm.attaches(), 1);
    assert_eq!(vm.detaches(), 0);
}

#[test]
fn test_independent_caches_have_fresh_keys() {
    let first = AttachmentCache::new();
    let first_id = first.create_key().id();
    first.delete_key();

    let second = AttachmentCache::new();
    let second_id = second.create_key().id();
    assert_ne!(first_id, second_id);
    assert!(first.is_key_deleted());
    assert!(!second.is_key_deleted());
}

#[test]
fn test_reason_for_missing_env() {
    let cache = Arc::new(AttachmentCache::new());
    let worker = Arc::clone(&cache);
    let before_vm = thread::spawn(move || worker.try_env_for_current_thread())
        .join()
        .unwrap();
    assert_eq!(before_vm, Err(AttachError::NoVm));

    let vm = Arc::new(CountingVm::default());
    cache.set_vm(vm.clone());
    let worker = Arc::clone(&cache);
    let attached = thread::spawn(move || worker.try_env_for_current_thread())
        .join()
        .unwrap();
    assert_eq!(attached, Ok(env(0x1000)));
    assert_eq!(vm.detaches(), 1);
}
