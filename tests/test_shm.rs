// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Shared memory segment tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use msgqx::{ShmHandle, ShmOpenMode, DEFAULT_PERMISSIONS};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn unique_name(prefix: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("/msgqx_t_{prefix}_{}_{n}", std::process::id())
}

fn create_mode(size: usize) -> ShmOpenMode {
    ShmOpenMode::Create {
        size,
        permissions: DEFAULT_PERMISSIONS,
    }
}

#[test]
fn acquire_create() {
    let name = unique_name("create");
    ShmHandle::clear_storage(&name);

    let shm = ShmHandle::acquire(&name, create_mode(1024)).expect("acquire create");
    assert_eq!(shm.mapped_size(), 1024);
    assert_ne!(shm.as_ptr() as usize, 0);
    assert_eq!(shm.name(), name);
    ShmHandle::clear_storage(&name);
}

#[test]
fn acquire_create_is_exclusive() {
    let name = unique_name("excl");
    ShmHandle::clear_storage(&name);

    let _shm = ShmHandle::acquire(&name, create_mode(64)).expect("first create");
    let err = ShmHandle::acquire(&name, create_mode(64))
        .err()
        .expect("second create must fail");
    assert_eq!(err.raw_os_error(), Some(libc::EEXIST));
    ShmHandle::clear_storage(&name);
}

#[test]
fn acquire_create_zero_size() {
    let name = unique_name("zero");
    let err = ShmHandle::acquire(&name, create_mode(0)).err().expect("zero size must fail");
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
}

#[test]
fn acquire_open_nonexistent() {
    let name = unique_name("missing");
    ShmHandle::clear_storage(&name);

    let err = ShmHandle::acquire(&name, ShmOpenMode::Open).err().expect("open must fail");
    assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
}

#[test]
fn open_maps_the_whole_segment() {
    let name = unique_name("open_size");
    ShmHandle::clear_storage(&name);

    let creator = ShmHandle::acquire(&name, create_mode(4096 + 16)).expect("create");
    let opener = ShmHandle::acquire(&name, ShmOpenMode::Open).expect("open");
    assert_eq!(opener.mapped_size(), creator.mapped_size());
    ShmHandle::clear_storage(&name);
}

#[test]
fn write_visible_through_second_mapping() {
    let name = unique_name("rw");
    ShmHandle::clear_storage(&name);

    let a = ShmHandle::acquire(&name, create_mode(512)).expect("create");
    let b = ShmHandle::acquire(&name, ShmOpenMode::Open).expect("open");

    let data = b"shared memory test data";
    unsafe {
        std::ptr::copy_nonoverlapping(data.as_ptr(), a.as_mut_ptr(), data.len());
    }
    let read_back = unsafe { std::slice::from_raw_parts(b.as_ptr(), data.len()) };
    assert_eq!(read_back, data);
    ShmHandle::clear_storage(&name);
}

#[test]
fn unlink_outlives_mapping() {
    let name = unique_name("unlink");
    ShmHandle::clear_storage(&name);

    let shm = ShmHandle::acquire(&name, create_mode(128)).expect("create");
    unsafe { *shm.as_mut_ptr() = 0x5a };
    ShmHandle::unlink(&name).expect("unlink");

    assert!(ShmHandle::acquire(&name, ShmOpenMode::Open).is_err());
    assert_eq!(unsafe { *shm.as_ptr() }, 0x5a);
    shm.close().expect("close");

    let err = ShmHandle::unlink(&name).err().expect("second unlink must fail");
    assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
}

#[test]
fn name_survives_close() {
    let name = unique_name("persist");
    ShmHandle::clear_storage(&name);

    let shm = ShmHandle::acquire(&name, create_mode(64)).expect("create");
    shm.close().expect("close");

    let again = ShmHandle::acquire(&name, ShmOpenMode::Open).expect("reopen after close");
    assert_eq!(again.mapped_size(), 64);
    ShmHandle::clear_storage(&name);
}
