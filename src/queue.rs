// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Queue handle and lifecycle: create, open, close, destroy.
//
// A queue is four named kernel objects derived from its name:
//   has-msg   counting semaphore, initially 0         (receivers wait)
//   has-slot  counting semaphore, initially capacity  (senders wait)
//   mutex     binary semaphore, 0 until the header is initialized, then 1
//   segment   header + ring, see `layout`
// A handle is this process's set of references to them.

use std::time::Duration;

use tracing::{debug, warn};

use crate::config::QueueConfig;
use crate::error::{Error, Result};
use crate::layout::{Geometry, QueueHeader, SharedRing, HEADER_SIZE};
use crate::queue_name::{object_name, validate_queue_name, ObjectKind};
use crate::scoped_access::CriticalSection;
use crate::semaphore::IpcSemaphore;
use crate::shm::{ShmHandle, ShmOpenMode};
use crate::wait::{self, Wait, WaitMode};

/// How long [`MessageQueue::open`] waits for the creator to release the
/// queue mutex before giving up with `TimedOut`.
pub const OPEN_TIMEOUT: Duration = Duration::from_secs(2);

/// This process's references to the objects of one queue.
pub(crate) struct Endpoint {
    pub(crate) has_msg: IpcSemaphore,
    pub(crate) has_slot: IpcSemaphore,
    pub(crate) mutex: IpcSemaphore,
    pub(crate) shm: ShmHandle,
}

/// A handle to a named cross-process message queue.
///
/// Obtained from [`MessageQueue::create`] or [`MessageQueue::open`]. The
/// handle can be shared between threads (`&self` send/receive); each thread
/// supplies its own message buffer. Closing is explicit via
/// [`MessageQueue::close`] or implicit on drop; either way only this
/// process's references are released.
pub struct MessageQueue {
    name: String,
    geometry: Geometry,
    endpoint: Option<Endpoint>,
}

/// Unlinks, in reverse order, the objects a failed `create` already made.
struct Rollback<'a> {
    queue: &'a str,
    created: Vec<ObjectKind>,
    armed: bool,
}

impl<'a> Rollback<'a> {
    fn new(queue: &'a str) -> Self {
        Self {
            queue,
            created: Vec::with_capacity(ObjectKind::ALL.len()),
            armed: true,
        }
    }

    fn created(&mut self, kind: ObjectKind) {
        self.created.push(kind);
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for Rollback<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        for &kind in self.created.iter().rev() {
            if kind == ObjectKind::MutexSemaphore {
                release_waiters(self.queue);
            }
            if let Err(e) = unlink_object(self.queue, kind) {
                warn!(queue = self.queue, %kind, error = %e, "failed to unlink while unwinding create");
            }
        }
    }
}

/// Raise the still-held initialization mutex of a queue being unwound.
///
/// An `open` parked on it wakes up and fails on the missing segment instead
/// of sleeping on an unlinked semaphore until its timeout.
fn release_waiters(queue: &str) {
    let name = object_name(queue, ObjectKind::MutexSemaphore);
    match IpcSemaphore::open(&name).and_then(|mutex| mutex.post()) {
        Ok(()) => {}
        Err(e) => warn!(queue, error = %e, "failed to release openers while unwinding create"),
    }
}

fn unlink_object(queue: &str, kind: ObjectKind) -> Result<()> {
    let name = object_name(queue, kind);
    let unlinked = match kind {
        ObjectKind::SharedMemory => ShmHandle::unlink(&name),
        _ => IpcSemaphore::unlink(&name),
    };
    unlinked.map_err(|e| Error::classify("unlink", kind, &name, e))
}

fn create_semaphore(queue: &str, kind: ObjectKind, initial: u32, permissions: u32) -> Result<IpcSemaphore> {
    let name = object_name(queue, kind);
    IpcSemaphore::create(&name, initial, permissions).map_err(|e| {
        warn!(queue, %kind, error = %e, "cannot create semaphore");
        Error::classify("sem_open", kind, &name, e)
    })
}

fn open_semaphore(queue: &str, kind: ObjectKind) -> Result<IpcSemaphore> {
    let name = object_name(queue, kind);
    IpcSemaphore::open(&name).map_err(|e| {
        debug!(queue, %kind, error = %e, "cannot open semaphore");
        Error::classify("sem_open", kind, &name, e)
    })
}

/// Read the header of a freshly mapped segment.
fn read_header(shm: &ShmHandle) -> Result<QueueHeader> {
    if shm.mapped_size() < HEADER_SIZE {
        return Err(Error::Internal("queue segment is smaller than its header"));
    }
    // Safety: the mapping holds at least HEADER_SIZE bytes and is page-aligned.
    Ok(unsafe { std::ptr::read_volatile(shm.as_ptr() as *const QueueHeader) })
}

fn attach_segment(queue: &str) -> Result<(ShmHandle, Geometry)> {
    let kind = ObjectKind::SharedMemory;
    let name = object_name(queue, kind);
    let shm = ShmHandle::acquire(&name, ShmOpenMode::Open).map_err(|e| {
        debug!(queue, error = %e, "cannot open shared memory");
        Error::classify("shm_open", kind, &name, e)
    })?;
    let geometry = Geometry::from_header(&read_header(&shm)?, shm.mapped_size())?;
    Ok((shm, geometry))
}

impl MessageQueue {
    /// Create queue `name` holding up to `capacity` messages of
    /// `message_size` bytes, with owner-only permissions.
    ///
    /// See [`MessageQueue::create_with`].
    pub fn create(name: &str, message_size: usize, capacity: usize) -> Result<Self> {
        Self::create_with(name, &QueueConfig::new(message_size, capacity))
    }

    /// Create a new queue.
    ///
    /// Every object is created exclusively, so at most one process succeeds
    /// for a given name; the others get `AlreadyExists` and the existing
    /// queue is left untouched. On any failure the objects created so far
    /// are closed and unlinked in reverse order before the error, which
    /// names the failing object, is returned.
    pub fn create_with(name: &str, config: &QueueConfig) -> Result<Self> {
        validate_queue_name(name)?;
        config.validate()?;
        let perms = config.permissions;

        let mut rollback = Rollback::new(name);

        let has_msg = create_semaphore(name, ObjectKind::ReceiveSemaphore, 0, perms)?;
        rollback.created(ObjectKind::ReceiveSemaphore);

        let has_slot = create_semaphore(name, ObjectKind::SendSemaphore, config.capacity as u32, perms)?;
        rollback.created(ObjectKind::SendSemaphore);

        // Held at 0 so nobody touches the segment before the header exists.
        let mutex = create_semaphore(name, ObjectKind::MutexSemaphore, 0, perms)?;
        rollback.created(ObjectKind::MutexSemaphore);

        let shm_name = object_name(name, ObjectKind::SharedMemory);
        let shm = ShmHandle::acquire(
            &shm_name,
            ShmOpenMode::Create {
                size: config.region_size(),
                permissions: perms,
            },
        )
        .map_err(|e| {
            warn!(queue = name, error = %e, "cannot create shared memory");
            Error::classify("shm_open", ObjectKind::SharedMemory, &shm_name, e)
        })?;
        rollback.created(ObjectKind::SharedMemory);

        let geometry = Geometry {
            message_size: config.message_size,
            capacity: config.capacity,
        };
        SharedRing::new(&shm, geometry)?.init_header();

        mutex.post().map_err(|source| Error::Os {
            op: "sem_post",
            kind: Some(ObjectKind::MutexSemaphore),
            source,
        })?;

        rollback.disarm();
        debug!(
            queue = name,
            message_size = config.message_size,
            capacity = config.capacity,
            "created message queue"
        );

        Ok(Self {
            name: name.to_string(),
            geometry,
            endpoint: Some(Endpoint {
                has_msg,
                has_slot,
                mutex,
                shm,
            }),
        })
    }

    /// Attach to an existing queue.
    ///
    /// Fails with `NotFound` if any of its objects is missing. Waits up to
    /// [`OPEN_TIMEOUT`] for the creator to finish initializing the header,
    /// then reads the geometry from it; check [`MessageQueue::message_size`]
    /// against what you expect, or use [`MessageQueue::open_expecting`].
    pub fn open(name: &str) -> Result<Self> {
        Self::open_timeout(name, OPEN_TIMEOUT)
    }

    /// [`MessageQueue::open`] with an explicit bound on the wait for the
    /// queue mutex.
    ///
    /// Fails with `TimedOut` when the mutex stays taken for longer than
    /// `timeout`: the creator is still initializing, or died before it
    /// finished, in which case only [`MessageQueue::destroy`] clears the name.
    /// A zero `timeout` does not wait and fails with `WouldBlock` instead.
    pub fn open_timeout(name: &str, timeout: Duration) -> Result<Self> {
        validate_queue_name(name)?;

        let has_msg = open_semaphore(name, ObjectKind::ReceiveSemaphore)?;
        let has_slot = open_semaphore(name, ObjectKind::SendSemaphore)?;
        let mutex = open_semaphore(name, ObjectKind::MutexSemaphore)?;

        // The creator releases the mutex only once the segment is sized and
        // its header written.
        let wait = WaitMode::Timeout(timeout).start();
        if let Err(e) = wait::acquire(&mutex, ObjectKind::MutexSemaphore, &wait) {
            warn!(queue = name, ?timeout, error = %e, "queue mutex not released, creator may have died");
            return Err(e);
        }
        let attached = attach_segment(name);
        let released = mutex.post().map_err(|source| Error::Os {
            op: "sem_post",
            kind: Some(ObjectKind::MutexSemaphore),
            source,
        });
        let (shm, geometry) = attached?;
        released?;

        debug!(
            queue = name,
            message_size = geometry.message_size,
            capacity = geometry.capacity,
            "opened message queue"
        );

        Ok(Self {
            name: name.to_string(),
            geometry,
            endpoint: Some(Endpoint {
                has_msg,
                has_slot,
                mutex,
                shm,
            }),
        })
    }

    /// [`MessageQueue::open`], rejecting a queue whose message size is not
    /// `message_size` with `InvalidArgument`.
    pub fn open_expecting(name: &str, message_size: usize) -> Result<Self> {
        let mut queue = Self::open(name)?;
        if queue.message_size() != message_size {
            let found = queue.message_size();
            queue.close()?;
            return Err(Error::InvalidArgument(format!(
                "queue {name:?} holds {found}-byte messages, expected {message_size}"
            )));
        }
        Ok(queue)
    }

    /// Release this handle's references and unmap the segment.
    ///
    /// The named objects stay in place for every other handle. Every release
    /// is attempted even if an earlier one fails; failures are aggregated.
    /// Closing a handle twice reports `InvalidArgument`.
    pub fn close(&mut self) -> Result<()> {
        let endpoint = self
            .endpoint
            .take()
            .ok_or_else(|| Error::InvalidArgument(format!("queue {:?} is already closed", self.name)))?;

        let mut errors = Vec::new();
        let semaphores = [
            (ObjectKind::ReceiveSemaphore, endpoint.has_msg),
            (ObjectKind::SendSemaphore, endpoint.has_slot),
            (ObjectKind::MutexSemaphore, endpoint.mutex),
        ];
        for (kind, sem) in semaphores {
            if let Err(source) = sem.close() {
                errors.push(Error::Os {
                    op: "sem_close",
                    kind: Some(kind),
                    source,
                });
            }
        }
        if let Err(source) = endpoint.shm.close() {
            errors.push(Error::Os {
                op: "munmap",
                kind: Some(ObjectKind::SharedMemory),
                source,
            });
        }

        debug!(queue = %self.name, failures = errors.len(), "closed message queue");
        Error::aggregate(errors)
    }

    /// Remove queue `name` from the OS namespace.
    ///
    /// Takes effect immediately: later `create`/`open` calls no longer see
    /// the old queue, and a new queue may be created under the same name.
    /// Handles that are already open keep working on the old objects until
    /// they are closed; the kernel frees them after the last close.
    ///
    /// All four unlinks are attempted. Missing objects are not an error as
    /// long as at least one object was removed, so a queue left half-built
    /// by a crashed creator can be cleared. If nothing was there at all the
    /// result is `NotFound`; any other failures are aggregated.
    pub fn destroy(name: &str) -> Result<()> {
        validate_queue_name(name)?;

        let mut removed = 0usize;
        let mut errors = Vec::new();
        for &kind in ObjectKind::ALL.iter() {
            match unlink_object(name, kind) {
                Ok(()) => removed += 1,
                Err(e) => errors.push(e),
            }
        }

        if errors.iter().all(Error::is_not_found) {
            if removed > 0 {
                errors.clear();
            } else {
                errors.truncate(1);
            }
        }
        debug!(queue = name, removed, failures = errors.len(), "destroyed message queue");
        Error::aggregate(errors)
    }

    /// Queue name this handle was created or opened with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size in bytes of every message.
    pub fn message_size(&self) -> usize {
        self.geometry.message_size
    }

    /// Maximum number of queued messages.
    pub fn capacity(&self) -> usize {
        self.geometry.capacity
    }

    /// `false` once [`MessageQueue::close`] has been called.
    pub fn is_open(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Number of messages currently queued, read under the queue mutex.
    pub fn len(&self) -> Result<usize> {
        let endpoint = self.endpoint()?;
        let ring = SharedRing::new(&endpoint.shm, self.geometry)?;
        let section = CriticalSection::enter(ring, &endpoint.mutex, &Wait::Block)?;
        let len = section.ring().len();
        section.release()?;
        len
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.len().map(|n| n == 0)
    }

    pub(crate) fn endpoint(&self) -> Result<&Endpoint> {
        self.endpoint
            .as_ref()
            .ok_or_else(|| Error::InvalidArgument(format!("queue {:?} is closed", self.name)))
    }

    pub(crate) fn geometry(&self) -> Geometry {
        self.geometry
    }
}

impl Drop for MessageQueue {
    fn drop(&mut self) {
        if self.endpoint.is_some() {
            if let Err(e) = self.close() {
                warn!(queue = %self.name, error = %e, "failed to close message queue on drop");
            }
        }
    }
}

impl std::fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageQueue")
            .field("name", &self.name)
            .field("message_size", &self.geometry.message_size)
            .field("capacity", &self.geometry.capacity)
            .field("open", &self.is_open())
            .finish()
    }
}
