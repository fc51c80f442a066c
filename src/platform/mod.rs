// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors

#[cfg(unix)]
pub mod posix;

// Re-export the platform-specific implementations under a uniform name.

#[cfg(unix)]
pub use posix::{NamedMode, PlatformSemaphore, PlatformShm, SEM_VALUE_MAX};
