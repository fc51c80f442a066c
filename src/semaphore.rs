// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Named inter-process counting semaphore.
// Delegates to platform::PlatformSemaphore.

use std::io;

use crate::platform::{NamedMode, PlatformSemaphore};
use crate::wait::{Deadline, Wait, WaitMode};

/// A named, inter-process counting semaphore (`sem_open`).
///
/// Any process that knows the name can open it. Dropping or closing the
/// handle releases this process's reference only; the name stays in the
/// namespace until [`IpcSemaphore::unlink`].
pub struct IpcSemaphore {
    inner: PlatformSemaphore,
}

impl IpcSemaphore {
    /// Create a new semaphore with value `initial`. Fails with
    /// `AlreadyExists` if the name is taken.
    pub fn create(name: &str, initial: u32, permissions: u32) -> io::Result<Self> {
        let inner = PlatformSemaphore::acquire(name, NamedMode::Create, initial, permissions)?;
        Ok(Self { inner })
    }

    /// Open an existing semaphore. Fails with `NotFound` if it does not exist.
    pub fn open(name: &str) -> io::Result<Self> {
        let inner = PlatformSemaphore::acquire(name, NamedMode::Open, 0, 0)?;
        Ok(Self { inner })
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Decrement, blocking while the value is zero.
    pub fn wait(&self) -> io::Result<()> {
        self.inner.wait()
    }

    /// Decrement without blocking. `Ok(false)` if the value was zero.
    pub fn try_wait(&self) -> io::Result<bool> {
        self.inner.try_wait()
    }

    /// Decrement before `deadline`. `Ok(false)` on expiry.
    pub fn wait_until(&self, deadline: &Deadline) -> io::Result<bool> {
        self.inner.wait_until(deadline)
    }

    /// Decrement according to `mode`. `Ok(false)` if the token could not be
    /// taken (try found zero, or the timeout expired).
    pub fn wait_with(&self, mode: WaitMode) -> io::Result<bool> {
        match mode.start() {
            Wait::Block => self.wait().map(|()| true),
            Wait::Try => self.try_wait(),
            Wait::Until(deadline) => self.wait_until(&deadline),
        }
    }

    /// Increment by one.
    pub fn post(&self) -> io::Result<()> {
        self.inner.post()
    }

    /// Close this handle, reporting failure instead of swallowing it.
    pub fn close(self) -> io::Result<()> {
        self.inner.close()
    }

    /// Remove the name from the namespace. Open handles stay usable.
    pub fn unlink(name: &str) -> io::Result<()> {
        PlatformSemaphore::unlink_by_name(name)
    }

    /// Remove the name, ignoring a missing one. Used to clear leftovers.
    pub fn clear_storage(name: &str) {
        let _ = PlatformSemaphore::unlink_by_name(name);
    }
}
