// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// RAII guard over the queue mutex semaphore, giving access to the shared
// ring for the lifetime of the critical section.

use tracing::warn;

use crate::error::{Error, Result};
use crate::layout::SharedRing;
use crate::queue_name::ObjectKind;
use crate::semaphore::IpcSemaphore;
use crate::wait::{self, Wait};

/// Holds the mutex semaphore. Posts it back on [`CriticalSection::release`]
/// or, failing that, on drop.
pub(crate) struct CriticalSection<'a> {
    ring: SharedRing<'a>,
    mutex: &'a IpcSemaphore,
    held: bool,
}

impl<'a> CriticalSection<'a> {
    /// Take the mutex according to `wait`.
    pub(crate) fn enter(ring: SharedRing<'a>, mutex: &'a IpcSemaphore, wait: &Wait) -> Result<Self> {
        wait::acquire(mutex, ObjectKind::MutexSemaphore, wait)?;
        Ok(Self {
            ring,
            mutex,
            held: true,
        })
    }

    pub(crate) fn ring(&self) -> &SharedRing<'a> {
        &self.ring
    }

    /// Leave the critical section, reporting a failed post.
    pub(crate) fn release(mut self) -> Result<()> {
        self.held = false;
        self.mutex.post().map_err(|source| Error::Os {
            op: "sem_post",
            kind: Some(ObjectKind::MutexSemaphore),
            source,
        })
    }
}

impl Drop for CriticalSection<'_> {
    fn drop(&mut self) {
        if self.held {
            if let Err(e) = self.mutex.post() {
                warn!(mutex = self.mutex.name(), error = %e, "failed to release queue mutex");
            }
        }
    }
}
