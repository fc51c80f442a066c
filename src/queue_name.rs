// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Deterministic OS object names for a queue.
// Every participant derives the same four names from the queue name, which is
// the only thing unrelated processes need to agree on.

use std::fmt;

use crate::error::{Error, Result};

/// Fixed marker shared by every object belonging to a message queue.
pub const NAME_PREFIX: &str = "MSGQXPPRE";

/// Size of the name buffer the naming scheme is defined against,
/// including the trailing NUL.
pub const NAME_BUFFER_SIZE: usize = 64;

/// Length of the fixed part in front of the kind character: `/MSGQXPPRE_`.
pub const FIXED_PREFIX_LEN: usize = 1 + NAME_PREFIX.len() + 1;

/// Longest queue name accepted by `create` / `open`.
///
/// The remaining three bytes hold the kind character, its separator and the
/// terminator.
pub const MAX_QUEUE_NAME_LEN: usize = NAME_BUFFER_SIZE - FIXED_PREFIX_LEN - 3;

/// The four named kernel objects backing one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// Counts queued messages (`has-msg`); receivers wait on it.
    ReceiveSemaphore,
    /// Counts free slots (`has-slot`); senders wait on it.
    SendSemaphore,
    /// Binary semaphore guarding the header and ring.
    MutexSemaphore,
    /// The header + ring segment.
    SharedMemory,
}

impl ObjectKind {
    /// All kinds, in the order `create` acquires them.
    pub const ALL: [ObjectKind; 4] = [
        ObjectKind::ReceiveSemaphore,
        ObjectKind::SendSemaphore,
        ObjectKind::MutexSemaphore,
        ObjectKind::SharedMemory,
    ];

    fn postfix(self) -> char {
        match self {
            ObjectKind::ReceiveSemaphore => 'r',
            ObjectKind::SendSemaphore => 's',
            ObjectKind::MutexSemaphore => 'm',
            ObjectKind::SharedMemory => 'q',
        }
    }

    /// Shared memory names live under the namespace root, semaphores do not.
    fn rooted(self) -> bool {
        matches!(self, ObjectKind::SharedMemory)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ObjectKind::ReceiveSemaphore => "receive semaphore",
            ObjectKind::SendSemaphore => "send semaphore",
            ObjectKind::MutexSemaphore => "mutex semaphore",
            ObjectKind::SharedMemory => "shared memory",
        };
        f.write_str(s)
    }
}

/// FNV-1a 64-bit hash.
pub fn fnv1a_64(data: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in data {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Convert a 64-bit value to a fixed-width 16-char lowercase hex string.
fn to_hex(val: u64) -> [u8; 16] {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let mut buf = [0u8; 16];
    let mut v = val;
    for i in (0..16).rev() {
        buf[i] = DIGITS[(v & 0xf) as usize];
        v >>= 4;
    }
    buf
}

/// Longest object name the OS accepts, or 0 when no shortening is needed.
///
/// macOS caps both `PSEMNAMLEN` and `PSHMNAMLEN` at 31. On Linux the limit is
/// well above `NAME_BUFFER_SIZE`.
#[cfg(target_os = "macos")]
pub const OS_NAME_MAX: usize = 31;

#[cfg(not(target_os = "macos"))]
pub const OS_NAME_MAX: usize = 0;

/// Check that `name` can be used as a queue name.
pub fn validate_queue_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidArgument("queue name is empty".into()));
    }
    if name.len() > MAX_QUEUE_NAME_LEN {
        return Err(Error::InvalidArgument(format!(
            "queue name is {} bytes, the limit is {MAX_QUEUE_NAME_LEN}",
            name.len()
        )));
    }
    if name.bytes().any(|b| b == b'/' || b == 0) {
        return Err(Error::InvalidArgument(format!(
            "queue name {name:?} contains '/' or NUL"
        )));
    }
    Ok(())
}

/// Physical OS name of one object of queue `queue`.
///
/// Pure function of its inputs: `<root>MSGQXPPRE_<k>_<queue>` where `<root>`
/// is `/` for the shared memory segment only and `<k>` is one of `r s m q`.
/// Callers are expected to have run [`validate_queue_name`].
pub fn object_name(queue: &str, kind: ObjectKind) -> String {
    let root = if kind.rooted() { "/" } else { "" };
    let full = format!("{root}{NAME_PREFIX}_{}_{queue}", kind.postfix());
    shorten(full, root.len())
}

/// Shorten `name` to `OS_NAME_MAX` as `<root><prefix>_<16-hex-FNV-1a>` when it
/// is too long for the OS, keeping the result deterministic.
fn shorten(name: String, root_len: usize) -> String {
    if OS_NAME_MAX == 0 || name.len() <= OS_NAME_MAX {
        return name;
    }

    // 1 (underscore) + 16 (hex hash)
    const HASH_SUFFIX_LEN: usize = 1 + 16;
    let prefix_len = OS_NAME_MAX.saturating_sub(HASH_SUFFIX_LEN + root_len);

    let hex = to_hex(fnv1a_64(name.as_bytes()));

    let mut shortened = String::with_capacity(OS_NAME_MAX);
    shortened.push_str(&name[..root_len]);
    let body = &name[root_len..];
    let mut take = prefix_len.min(body.len());
    while !body.is_char_boundary(take) {
        take -= 1;
    }
    shortened.push_str(&body[..take]);
    shortened.push('_');
    shortened.extend(hex.iter().map(|&b| b as char));
    shortened
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_known_value() {
        assert_eq!(fnv1a_64(b""), 0xcbf29ce484222325);
    }

    #[test]
    fn to_hex_roundtrip() {
        let hex = to_hex(0x0123456789abcdef);
        assert_eq!(&hex, b"0123456789abcdef");
    }

    #[test]
    #[cfg(not(target_os = "macos"))]
    fn names_per_kind() {
        assert_eq!(object_name("jobs", ObjectKind::ReceiveSemaphore), "MSGQXPPRE_r_jobs");
        assert_eq!(object_name("jobs", ObjectKind::SendSemaphore), "MSGQXPPRE_s_jobs");
        assert_eq!(object_name("jobs", ObjectKind::MutexSemaphore), "MSGQXPPRE_m_jobs");
        assert_eq!(object_name("jobs", ObjectKind::SharedMemory), "/MSGQXPPRE_q_jobs");
    }

    #[test]
    fn names_are_deterministic_and_distinct() {
        let names: Vec<String> = ObjectKind::ALL
            .iter()
            .map(|&k| object_name("orders", k))
            .collect();
        for (i, &k) in ObjectKind::ALL.iter().enumerate() {
            assert_eq!(object_name("orders", k), names[i]);
            for j in (i + 1)..names.len() {
                assert_ne!(names[i], names[j]);
            }
        }
        assert!(names[3].starts_with('/'));
        assert!(names[..3].iter().all(|n| !n.starts_with('/')));
    }

    #[test]
    fn longest_name_fits_the_buffer() {
        let name = "x".repeat(MAX_QUEUE_NAME_LEN);
        validate_queue_name(&name).unwrap();
        let shm = object_name(&name, ObjectKind::SharedMemory);
        assert!(shm.len() < NAME_BUFFER_SIZE);
        if OS_NAME_MAX > 0 {
            assert!(shm.len() <= OS_NAME_MAX);
        }
    }

    #[test]
    fn rejects_bad_names() {
        assert!(validate_queue_name("").is_err());
        assert!(validate_queue_name("a/b").is_err());
        assert!(validate_queue_name("a\0b").is_err());
        assert!(validate_queue_name(&"y".repeat(MAX_QUEUE_NAME_LEN + 1)).is_err());
        assert_eq!(MAX_QUEUE_NAME_LEN, 50);
    }
}
