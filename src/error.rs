// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Error taxonomy for queue operations.

use std::io;

use thiserror::Error;

use crate::queue_name::ObjectKind;

/// Result alias used throughout the queue API.
pub type Result<T> = std::result::Result<T, Error>;

/// Classified outcome of a failed queue operation.
#[derive(Error, Debug)]
pub enum Error {
    /// Bad name, size, buffer length, or a handle that was already closed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Exclusive create hit an object that already exists.
    #[error("{kind} {name:?} already exists")]
    AlreadyExists { kind: ObjectKind, name: String },

    /// Open or destroy of an object that does not exist.
    #[error("{kind} {name:?} not found")]
    NotFound { kind: ObjectKind, name: String },

    /// The OS ran out of memory, descriptors or space for the object.
    #[error("out of resources for {kind}: {source}")]
    ResourceExhausted {
        kind: ObjectKind,
        #[source]
        source: io::Error,
    },

    /// A try-variant could not complete without suspending.
    #[error("operation would block")]
    WouldBlock,

    /// A timed variant ran out of its budget.
    #[error("operation timed out")]
    TimedOut,

    /// A queue invariant was found broken.
    #[error("internal fault: {0}")]
    Internal(&'static str),

    /// Any other OS failure.
    #[error("{op} failed{}: {source}", on_kind(.kind))]
    Os {
        op: &'static str,
        kind: Option<ObjectKind>,
        #[source]
        source: io::Error,
    },

    /// Several sub-steps of close/destroy failed.
    #[error("{} sub-operations failed: {}", .0.len(), join(.0))]
    Multiple(Vec<Error>),
}

fn on_kind(kind: &Option<ObjectKind>) -> String {
    kind.map(|k| format!(" on {k}")).unwrap_or_default()
}

fn join(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// `true` for the outcomes a client should simply retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::WouldBlock | Error::TimedOut)
    }

    /// `true` if this error (or every error it aggregates) is `NotFound`.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Multiple(all) => !all.is_empty() && all.iter().all(Error::is_not_found),
            _ => false,
        }
    }

    /// Classify an OS error raised while creating/opening/unlinking `kind`.
    pub(crate) fn classify(op: &'static str, kind: ObjectKind, name: &str, source: io::Error) -> Self {
        match source.raw_os_error() {
            Some(libc::EEXIST) => Error::AlreadyExists {
                kind,
                name: name.to_string(),
            },
            Some(libc::ENOENT) => Error::NotFound {
                kind,
                name: name.to_string(),
            },
            Some(libc::ENOMEM | libc::ENOSPC | libc::EMFILE | libc::ENFILE) => {
                Error::ResourceExhausted { kind, source }
            }
            _ => Error::Os {
                op,
                kind: Some(kind),
                source,
            },
        }
    }

    /// Fold the failures of a multi-step teardown into one outcome.
    pub(crate) fn aggregate(mut errors: Vec<Error>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Error::Multiple(errors)),
        }
    }
}
