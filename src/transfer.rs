// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Send / receive protocol.
//
//   send:    take has-slot -> take mutex -> push -> release mutex -> post has-msg
//   receive: take has-msg  -> take mutex -> pop  -> release mutex -> post has-slot
//
// Both waits of one operation share the same `Wait`, so a timed operation's
// duration bounds the two waits together. Outside any critical section
// has-slot + has-msg == capacity and has-msg == header.count.

use std::time::Duration;

use tracing::{error, warn};

use crate::error::{Error, Result};
use crate::layout::SharedRing;
use crate::queue::MessageQueue;
use crate::queue_name::ObjectKind;
use crate::scoped_access::CriticalSection;
use crate::semaphore::IpcSemaphore;
use crate::wait::{self, WaitMode};

/// Which direction of the protocol is running.
#[derive(Clone, Copy)]
enum Direction {
    Send,
    Receive,
}

impl Direction {
    /// Semaphore taken first, and the one posted at the end.
    fn kinds(self) -> (ObjectKind, ObjectKind) {
        match self {
            Direction::Send => (ObjectKind::SendSemaphore, ObjectKind::ReceiveSemaphore),
            Direction::Receive => (ObjectKind::ReceiveSemaphore, ObjectKind::SendSemaphore),
        }
    }
}

fn post(sem: &IpcSemaphore, kind: ObjectKind) -> Result<()> {
    sem.post().map_err(|source| Error::Os {
        op: "sem_post",
        kind: Some(kind),
        source,
    })
}

impl MessageQueue {
    /// Send `msg`, blocking while the queue is full.
    ///
    /// `msg` must be exactly [`MessageQueue::message_size`] bytes.
    pub fn send(&self, msg: &[u8]) -> Result<()> {
        self.send_with(msg, WaitMode::Block)
    }

    /// Send `msg` or fail with `WouldBlock` without sleeping.
    pub fn try_send(&self, msg: &[u8]) -> Result<()> {
        self.send_with(msg, WaitMode::Try)
    }

    /// Send `msg`, waiting at most `timeout` in total before `TimedOut`.
    pub fn timed_send(&self, msg: &[u8], timeout: Duration) -> Result<()> {
        self.send_with(msg, WaitMode::Timeout(timeout))
    }

    /// Send `msg` with an explicit wait mode.
    pub fn send_with(&self, msg: &[u8], mode: WaitMode) -> Result<()> {
        let size = self.message_size();
        if msg.len() != size {
            return Err(Error::InvalidArgument(format!(
                "message is {} bytes, queue {:?} holds {size}-byte messages",
                msg.len(),
                self.name()
            )));
        }
        self.transfer(Direction::Send, mode, |ring| ring.push(msg))
    }

    /// Receive the oldest message into `buf`, blocking while the queue is
    /// empty.
    ///
    /// `buf` must hold at least [`MessageQueue::message_size`] bytes; the
    /// message is written to its front.
    pub fn receive(&self, buf: &mut [u8]) -> Result<()> {
        self.receive_with(buf, WaitMode::Block)
    }

    /// Receive or fail with `WouldBlock` without sleeping.
    pub fn try_receive(&self, buf: &mut [u8]) -> Result<()> {
        self.receive_with(buf, WaitMode::Try)
    }

    /// Receive, waiting at most `timeout` in total before `TimedOut`.
    pub fn timed_receive(&self, buf: &mut [u8], timeout: Duration) -> Result<()> {
        self.receive_with(buf, WaitMode::Timeout(timeout))
    }

    /// Receive with an explicit wait mode.
    pub fn receive_with(&self, buf: &mut [u8], mode: WaitMode) -> Result<()> {
        let size = self.message_size();
        if buf.len() < size {
            return Err(Error::InvalidArgument(format!(
                "buffer is {} bytes, queue {:?} holds {size}-byte messages",
                buf.len(),
                self.name()
            )));
        }
        self.transfer(Direction::Receive, mode, |ring| ring.pop(buf))
    }

    /// Receive into a freshly allocated buffer of `message_size` bytes.
    pub fn receive_vec(&self, mode: WaitMode) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.message_size()];
        self.receive_with(&mut buf, mode)?;
        Ok(buf)
    }

    fn transfer<F>(&self, direction: Direction, mode: WaitMode, commit: F) -> Result<()>
    where
        F: FnOnce(&SharedRing<'_>) -> Result<()>,
    {
        let endpoint = self.endpoint()?;
        let (take, give) = match direction {
            Direction::Send => (&endpoint.has_slot, &endpoint.has_msg),
            Direction::Receive => (&endpoint.has_msg, &endpoint.has_slot),
        };
        let (take_kind, give_kind) = direction.kinds();
        let ring = SharedRing::new(&endpoint.shm, self.geometry())?;

        let wait = mode.start();
        wait::acquire(take, take_kind, &wait)?;

        let section = match CriticalSection::enter(ring, &endpoint.mutex, &wait) {
            Ok(section) => section,
            Err(e) => {
                // Hand the token back so the counts stay balanced.
                if let Err(post_err) = take.post() {
                    warn!(queue = self.name(), kind = %take_kind, error = %post_err, "failed to return token");
                }
                return Err(e);
            }
        };

        if let Err(e) = commit(section.ring()) {
            error!(queue = self.name(), error = %e, "queue state is inconsistent");
            return Err(e);
        }

        // The message is committed; report release failures but still wake
        // the other side.
        let released = section.release();
        let signalled = post(give, give_kind);
        Error::aggregate(released.err().into_iter().chain(signalled.err()).collect())
    }
}
