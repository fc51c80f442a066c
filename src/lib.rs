// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Bounded, named, cross-process message queue.
// Fixed-size messages in a ring buffer in POSIX shared memory, synchronized
// by three named semaphores. Unrelated processes attach by agreeing on a
// queue name; nothing else is shared.

#[cfg(not(unix))]
compile_error!("msgqx requires POSIX shared memory and named semaphores");

pub mod queue_name;

mod platform;

mod error;
pub use error::{Error, Result};

mod config;
pub use config::{QueueConfig, DEFAULT_PERMISSIONS};

mod semaphore;
pub use semaphore::IpcSemaphore;

mod shm;
pub use shm::{ShmHandle, ShmOpenMode};

mod wait;
pub use wait::{Deadline, WaitMode};

pub mod layout;

mod scoped_access;

mod queue;
pub use queue::{MessageQueue, OPEN_TIMEOUT};

mod transfer;

pub use platform::SEM_VALUE_MAX;
