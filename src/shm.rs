// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Named shared memory segment handle.
// Delegates to platform::PlatformShm.

use std::io;

use crate::platform::{NamedMode, PlatformShm};

/// Open mode for shared memory segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmOpenMode {
    /// Create exclusively, sized to `size` bytes; fail if it already exists.
    Create { size: usize, permissions: u32 },
    /// Open existing; fail if it does not exist. The whole segment is mapped.
    Open,
}

/// A named, inter-process shared memory region, mapped read/write.
///
/// Unlike a reference-counted segment, the name outlives every handle:
/// only [`ShmHandle::unlink`] removes it.
pub struct ShmHandle {
    inner: PlatformShm,
}

impl ShmHandle {
    /// Acquire a named shared memory region.
    pub fn acquire(name: &str, mode: ShmOpenMode) -> io::Result<Self> {
        let inner = match mode {
            ShmOpenMode::Create { size, permissions } => {
                PlatformShm::acquire(name, NamedMode::Create, size, permissions)?
            }
            ShmOpenMode::Open => PlatformShm::acquire(name, NamedMode::Open, 0, 0)?,
        };
        Ok(Self { inner })
    }

    /// Pointer to the start of the shared memory region.
    pub fn as_ptr(&self) -> *const u8 {
        self.inner.as_ptr()
    }

    /// Mutable pointer to the start of the shared memory region.
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.inner.as_mut_ptr()
    }

    /// Mapped size in bytes.
    pub fn mapped_size(&self) -> usize {
        self.inner.mapped_size()
    }

    /// The platform name used to open the segment.
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Unmap and close the descriptor in this process only.
    pub fn close(self) -> io::Result<()> {
        self.inner.close()
    }

    /// Remove a named segment without needing an open handle.
    pub fn unlink(name: &str) -> io::Result<()> {
        PlatformShm::unlink_by_name(name)
    }

    /// Remove a named segment, ignoring a missing one.
    pub fn clear_storage(name: &str) {
        let _ = PlatformShm::unlink_by_name(name);
    }
}
