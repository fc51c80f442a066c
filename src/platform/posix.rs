// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// POSIX implementation of named semaphores and shared memory segments.
// Thin, unsafe-contained wrappers over sem_open(3) and shm_open(3); callers
// above this module never see a raw pointer to a semaphore or a descriptor.

use std::ffi::CString;
use std::io;
use std::ptr;

use crate::wait::Deadline;

/// Largest initial value `sem_open` accepts.
#[cfg(target_os = "macos")]
pub const SEM_VALUE_MAX: u32 = 32767;

#[cfg(not(target_os = "macos"))]
pub const SEM_VALUE_MAX: u32 = i32::MAX as u32;

fn c_name(name: &str) -> io::Result<CString> {
    CString::new(name.as_bytes()).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

// ---------------------------------------------------------------------------
// PlatformSemaphore: named counting semaphore (sem_open)
// ---------------------------------------------------------------------------

/// Open mode flags for named objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedMode {
    /// `O_CREAT | O_EXCL`: fail with `EEXIST` if the name is taken.
    Create,
    /// Must already exist: fail with `ENOENT` otherwise.
    Open,
}

pub struct PlatformSemaphore {
    sem: *mut libc::sem_t,
    name: String,
}

// Safety: a named semaphore is designed for concurrent use from any thread
// or process; sem_wait/sem_post are thread-safe.
unsafe impl Send for PlatformSemaphore {}
unsafe impl Sync for PlatformSemaphore {}

impl PlatformSemaphore {
    /// Create (exclusively) or open a named semaphore.
    ///
    /// `initial` and `perms` are only used by [`NamedMode::Create`].
    pub fn acquire(name: &str, mode: NamedMode, initial: u32, perms: u32) -> io::Result<Self> {
        if name.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "name is empty"));
        }
        if initial > SEM_VALUE_MAX {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("initial value {initial} exceeds SEM_VALUE_MAX"),
            ));
        }
        let c_name = c_name(name)?;

        let sem = match mode {
            NamedMode::Create => unsafe {
                // mode_t and the value are promoted to unsigned int through
                // the variadic call.
                libc::sem_open(
                    c_name.as_ptr(),
                    libc::O_CREAT | libc::O_EXCL,
                    perms as libc::c_uint,
                    initial as libc::c_uint,
                )
            },
            NamedMode::Open => unsafe { libc::sem_open(c_name.as_ptr(), 0) },
        };
        if sem == libc::SEM_FAILED {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            sem,
            name: name.to_string(),
        })
    }

    /// OS name used to open the semaphore.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decrement, suspending the calling thread while the value is zero.
    pub fn wait(&self) -> io::Result<()> {
        loop {
            if unsafe { libc::sem_wait(self.sem) } == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::EINTR) {
                return Err(err);
            }
        }
    }

    /// Decrement if the value is positive. Returns `Ok(false)` instead of
    /// suspending when it is zero.
    pub fn try_wait(&self) -> io::Result<bool> {
        loop {
            if unsafe { libc::sem_trywait(self.sem) } == 0 {
                return Ok(true);
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EAGAIN) => return Ok(false),
                Some(libc::EINTR) => continue,
                _ => return Err(err),
            }
        }
    }

    /// Decrement before `deadline`. Returns `Ok(false)` once it has passed.
    ///
    /// Interrupted waits are resumed against the same absolute deadline.
    pub fn wait_until(&self, deadline: &Deadline) -> io::Result<bool> {
        #[cfg(target_os = "macos")]
        {
            // macOS has no sem_timedwait; poll with adaptive backoff.
            let mut k = 0u32;
            loop {
                if self.try_wait()? {
                    return Ok(true);
                }
                if deadline.expired() {
                    return Ok(false);
                }
                crate::wait::adaptive_yield(&mut k);
            }
        }
        #[cfg(not(target_os = "macos"))]
        {
            let ts = deadline.realtime();
            loop {
                if unsafe { libc::sem_timedwait(self.sem, &ts) } == 0 {
                    return Ok(true);
                }
                let err = io::Error::last_os_error();
                match err.raw_os_error() {
                    Some(libc::ETIMEDOUT) => return Ok(false),
                    Some(libc::EINTR) => continue,
                    _ => return Err(err),
                }
            }
        }
    }

    /// Increment, waking one waiter if any.
    pub fn post(&self) -> io::Result<()> {
        if unsafe { libc::sem_post(self.sem) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Release this process's reference (`sem_close`). The name is untouched.
    pub fn close(mut self) -> io::Result<()> {
        let sem = std::mem::replace(&mut self.sem, libc::SEM_FAILED);
        if unsafe { libc::sem_close(sem) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Remove a semaphore name from the namespace (`sem_unlink`).
    pub fn unlink_by_name(name: &str) -> io::Result<()> {
        let c_name = c_name(name)?;
        if unsafe { libc::sem_unlink(c_name.as_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Drop for PlatformSemaphore {
    fn drop(&mut self) {
        if self.sem != libc::SEM_FAILED {
            unsafe { libc::sem_close(self.sem) };
        }
    }
}

// ---------------------------------------------------------------------------
// PlatformShm: POSIX shared memory (shm_open + mmap)
// ---------------------------------------------------------------------------

pub struct PlatformShm {
    mem: *mut u8,
    size: usize,
    fd: libc::c_int,
    name: String,
}

// Safety: the shared memory region is process-shared by design; access to
// its contents is serialized by the caller.
unsafe impl Send for PlatformShm {}
unsafe impl Sync for PlatformShm {}

impl PlatformShm {
    /// Create (exclusively) a segment of `size` bytes, or open an existing
    /// one and map its full current size.
    ///
    /// A segment created here is unlinked again if setting its permissions,
    /// sizing or mapping fails, so a failed create never leaves the name
    /// behind.
    pub fn acquire(name: &str, mode: NamedMode, size: usize, perms: u32) -> io::Result<Self> {
        if name.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "name is empty"));
        }
        if mode == NamedMode::Create && size == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "size is 0"));
        }
        let c_name = c_name(name)?;
        let perms = perms as libc::mode_t;

        match mode {
            NamedMode::Create => {
                let fd = unsafe {
                    libc::shm_open(
                        c_name.as_ptr(),
                        libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
                        perms as libc::c_uint,
                    )
                };
                if fd == -1 {
                    return Err(io::Error::last_os_error());
                }

                // Ensure permissions regardless of the process umask.
                let sized = if unsafe { libc::fchmod(fd, perms) } != 0 {
                    Err(io::Error::last_os_error())
                } else if unsafe { libc::ftruncate(fd, size as libc::off_t) } != 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Self::map(fd, size, name)
                };
                if sized.is_err() {
                    unsafe {
                        libc::close(fd);
                        libc::shm_unlink(c_name.as_ptr());
                    }
                }
                sized
            }
            NamedMode::Open => {
                let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0) };
                if fd == -1 {
                    return Err(io::Error::last_os_error());
                }

                let mut st: libc::stat = unsafe { std::mem::zeroed() };
                let opened = if unsafe { libc::fstat(fd, &mut st) } != 0 {
                    Err(io::Error::last_os_error())
                } else if st.st_size <= 0 {
                    Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "shared memory segment has not been sized",
                    ))
                } else {
                    Self::map(fd, st.st_size as usize, name)
                };
                if opened.is_err() {
                    unsafe { libc::close(fd) };
                }
                opened
            }
        }
    }

    fn map(fd: libc::c_int, size: usize, name: &str) -> io::Result<Self> {
        let mem = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if mem == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            mem: mem as *mut u8,
            size,
            fd,
            name: name.to_string(),
        })
    }

    /// Start of the mapped region.
    pub fn as_ptr(&self) -> *const u8 {
        self.mem
    }

    /// Mutable pointer to the start of the mapped region.
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.mem
    }

    /// Mapped size in bytes.
    pub fn mapped_size(&self) -> usize {
        self.size
    }

    /// POSIX name (with leading '/').
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unmap the region and close the descriptor. Both steps are attempted;
    /// the first failure is returned.
    pub fn close(mut self) -> io::Result<()> {
        let (unmapped, closed) = self.release();
        unmapped.and(closed)
    }

    fn release(&mut self) -> (io::Result<()>, io::Result<()>) {
        let mut unmapped = Ok(());
        let mut closed = Ok(());
        if !self.mem.is_null() {
            if unsafe { libc::munmap(self.mem as *mut libc::c_void, self.size) } != 0 {
                unmapped = Err(io::Error::last_os_error());
            }
            self.mem = ptr::null_mut();
        }
        if self.fd != -1 {
            if unsafe { libc::close(self.fd) } != 0 {
                closed = Err(io::Error::last_os_error());
            }
            self.fd = -1;
        }
        (unmapped, closed)
    }

    /// Remove a segment name from the namespace (`shm_unlink`).
    pub fn unlink_by_name(name: &str) -> io::Result<()> {
        let c_name = c_name(name)?;
        if unsafe { libc::shm_unlink(c_name.as_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Drop for PlatformShm {
    fn drop(&mut self) {
        let _ = self.release();
    }
}
