// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Shared memory layout of a queue: a fixed 16-byte header followed by
// `capacity` slots of `message_size` bytes each.
//
//   offset 0   message_size: i32
//   offset 4   capacity:     i32
//   offset 8   first:        i32   index of the oldest message
//   offset 12  count:        i32   messages currently queued
//   offset 16  slot 0, slot 1, ... slot capacity-1
//
// There is no version field; every participant must agree on this layout
// bit for bit. The ring is only ever touched through `SharedRing`, whose
// accessors check every offset against the geometry this process computed
// itself rather than trusting the values found in shared memory.

use std::ptr;

use crate::error::{Error, Result};
use crate::shm::ShmHandle;

/// Header at the start of every queue segment.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueHeader {
    pub message_size: i32,
    pub capacity: i32,
    pub first: i32,
    pub count: i32,
}

/// Size of [`QueueHeader`] in bytes.
pub const HEADER_SIZE: usize = std::mem::size_of::<QueueHeader>();

const _: () = assert!(HEADER_SIZE == 16);

/// Bytes needed for a queue of `capacity` messages of `message_size` bytes,
/// or `None` on overflow.
pub fn region_size(message_size: usize, capacity: usize) -> Option<usize> {
    message_size.checked_mul(capacity)?.checked_add(HEADER_SIZE)
}

/// Message size and capacity of a mapped queue, as validated by this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub message_size: usize,
    pub capacity: usize,
}

impl Geometry {
    /// Validate a header read from a segment of `mapped` bytes.
    pub fn from_header(header: &QueueHeader, mapped: usize) -> Result<Self> {
        if header.message_size <= 0 || header.capacity <= 0 {
            return Err(Error::Internal("queue header holds a non-positive size"));
        }
        let geometry = Geometry {
            message_size: header.message_size as usize,
            capacity: header.capacity as usize,
        };
        match region_size(geometry.message_size, geometry.capacity) {
            Some(needed) if needed <= mapped => Ok(geometry),
            _ => Err(Error::Internal("queue segment is smaller than its header claims")),
        }
    }
}

/// Bounds-checked view of the header and ring inside a mapped segment.
///
/// Only the protocol code holding the queue mutex may build one and call the
/// mutating methods.
pub(crate) struct SharedRing<'a> {
    shm: &'a ShmHandle,
    geometry: Geometry,
}

impl<'a> SharedRing<'a> {
    /// # Errors
    /// `Internal` if the mapping cannot hold `geometry`.
    pub(crate) fn new(shm: &'a ShmHandle, geometry: Geometry) -> Result<Self> {
        match region_size(geometry.message_size, geometry.capacity) {
            Some(needed) if needed <= shm.mapped_size() => Ok(Self { shm, geometry }),
            _ => Err(Error::Internal("mapping is smaller than the queue geometry")),
        }
    }

    fn header_ptr(&self) -> *mut QueueHeader {
        self.shm.as_mut_ptr() as *mut QueueHeader
    }

    pub(crate) fn header(&self) -> QueueHeader {
        // Safety: `new` checked the mapping holds at least HEADER_SIZE bytes,
        // and mmap returns page-aligned memory.
        unsafe { ptr::read_volatile(self.header_ptr()) }
    }

    /// Write a fresh header: the geometry plus an empty ring.
    pub(crate) fn init_header(&self) {
        let header = QueueHeader {
            message_size: self.geometry.message_size as i32,
            capacity: self.geometry.capacity as i32,
            first: 0,
            count: 0,
        };
        unsafe { ptr::write_volatile(self.header_ptr(), header) };
    }

    /// `(first, count)`, rejected if outside the ring.
    fn cursor(&self) -> Result<(usize, usize)> {
        let h = self.header();
        if h.first < 0 || h.count < 0 {
            return Err(Error::Internal("queue cursor is negative"));
        }
        let (first, count) = (h.first as usize, h.count as usize);
        if first >= self.geometry.capacity || count > self.geometry.capacity {
            return Err(Error::Internal("queue cursor is outside the ring"));
        }
        Ok((first, count))
    }

    fn set_cursor(&self, first: usize, count: usize) {
        let h = self.header_ptr();
        unsafe {
            ptr::write_volatile(ptr::addr_of_mut!((*h).first), first as i32);
            ptr::write_volatile(ptr::addr_of_mut!((*h).count), count as i32);
        }
    }

    /// Byte offset of slot `index` from the start of the segment.
    fn slot_offset(&self, index: usize) -> Result<usize> {
        if index >= self.geometry.capacity {
            return Err(Error::Internal("slot index out of range"));
        }
        Ok(HEADER_SIZE + index * self.geometry.message_size)
    }

    /// Number of messages currently queued.
    pub(crate) fn len(&self) -> Result<usize> {
        self.cursor().map(|(_, count)| count)
    }

    /// Append `data` at `(first + count) % capacity`.
    ///
    /// # Errors
    /// `Internal` if the ring is already full: the caller holds a slot token,
    /// so this means the semaphores and the header disagree.
    pub(crate) fn push(&self, data: &[u8]) -> Result<()> {
        let (first, count) = self.cursor()?;
        if count >= self.geometry.capacity {
            return Err(Error::Internal("queue is full although a slot was acquired"));
        }
        let size = self.geometry.message_size;
        if data.len() != size {
            return Err(Error::InvalidArgument(format!(
                "message is {} bytes, the queue holds {size}-byte messages",
                data.len()
            )));
        }
        let offset = self.slot_offset((first + count) % self.geometry.capacity)?;
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), self.shm.as_mut_ptr().add(offset), size);
        }
        self.set_cursor(first, count + 1);
        Ok(())
    }

    /// Remove the message at `first` into the front of `buf`.
    ///
    /// # Errors
    /// `Internal` if the ring is empty although a message token was acquired.
    pub(crate) fn pop(&self, buf: &mut [u8]) -> Result<()> {
        let (first, count) = self.cursor()?;
        if count == 0 {
            return Err(Error::Internal("queue is empty although a message was acquired"));
        }
        let size = self.geometry.message_size;
        if buf.len() < size {
            return Err(Error::InvalidArgument(format!(
                "buffer is {} bytes, the queue holds {size}-byte messages",
                buf.len()
            )));
        }
        let offset = self.slot_offset(first)?;
        unsafe {
            ptr::copy_nonoverlapping(self.shm.as_ptr().add(offset), buf.as_mut_ptr(), size);
        }
        self.set_cursor((first + 1) % self.geometry.capacity, count - 1);
        Ok(())
    }
}
