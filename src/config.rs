// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Creation parameters of a queue.

use crate::error::{Error, Result};
use crate::layout::region_size;
use crate::platform::SEM_VALUE_MAX;

/// Owner read/write, the mode every queue object is created with by default.
pub const DEFAULT_PERMISSIONS: u32 = 0o600;

/// Fixed parameters of a queue, chosen once by its creator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// Size in bytes of every message.
    pub message_size: usize,
    /// Maximum number of queued messages.
    pub capacity: usize,
    /// Permission bits for the semaphores and the segment.
    pub permissions: u32,
}

impl QueueConfig {
    pub fn new(message_size: usize, capacity: usize) -> Self {
        Self {
            message_size,
            capacity,
            permissions: DEFAULT_PERMISSIONS,
        }
    }

    pub fn with_permissions(mut self, permissions: u32) -> Self {
        self.permissions = permissions;
        self
    }

    /// Check the parameters fit the header, the semaphores and the address
    /// space.
    pub fn validate(&self) -> Result<()> {
        if self.message_size == 0 {
            return Err(Error::InvalidArgument("message size must be positive".into()));
        }
        if self.capacity == 0 {
            return Err(Error::InvalidArgument("capacity must be positive".into()));
        }
        if self.message_size > i32::MAX as usize {
            return Err(Error::InvalidArgument(format!(
                "message size {} does not fit the queue header",
                self.message_size
            )));
        }
        if self.capacity > SEM_VALUE_MAX as usize {
            return Err(Error::InvalidArgument(format!(
                "capacity {} exceeds the semaphore limit {SEM_VALUE_MAX}",
                self.capacity
            )));
        }
        if self.permissions & !0o777 != 0 {
            return Err(Error::InvalidArgument(format!(
                "permissions {:o} are not plain rwx bits",
                self.permissions
            )));
        }
        if region_size(self.message_size, self.capacity).is_none() {
            return Err(Error::InvalidArgument(format!(
                "{} messages of {} bytes overflow the address space",
                self.capacity, self.message_size
            )));
        }
        Ok(())
    }

    /// Bytes of shared memory the queue occupies.
    pub fn region_size(&self) -> usize {
        region_size(self.message_size, self.capacity).unwrap_or(usize::MAX)
    }
}
