//! Memory protection for PINs, passphrases and payloads
//!
//! Two hardening measures keep credentials off the disk:
//!
//! 1. **Core dump prevention**: `setrlimit(RLIMIT_CORE, 0)` so that a crash
//!    while a PIN is in memory never produces a core file.
//!
//! 2. **Memory locking**: [`SecretBuffer`] pins its allocation with `mlock()`
//!    so the OS cannot swap a prompt answer out.
//!
//! Both are best-effort. Containers and unprivileged users frequently lack
//! `RLIMIT_MEMLOCK` headroom, so failures are logged at `warn` and the run
//! carries on.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use zeroize::Zeroize;

static CORE_DUMPS_DISABLED: AtomicBool = AtomicBool::new(false);

/// Disable core dumps for the current process.
///
/// Call once, early in `main`. Returns `true` if core dumps are off
/// (including when a previous call already turned them off).
pub fn disable_core_dumps() -> bool {
    if CORE_DUMPS_DISABLED.swap(true, Ordering::SeqCst) {
        return true;
    }

    #[cfg(unix)]
    {
        unix::disable_core_dumps_impl()
    }

    #[cfg(not(unix))]
    {
        log::warn!("core dump prevention is not supported on this platform");
        false
    }
}

/// Owned secret bytes (a PIN or passphrase answer).
///
/// The heap allocation is locked in memory on creation, zeroized and
/// unlocked on drop. The length is fixed after construction so the locked
/// region never moves.
pub struct SecretBuffer {
    data: Box<[u8]>,
    locked: bool,
}

impl SecretBuffer {
    /// Take ownership of `data` and lock it.
    pub fn new(data: Vec<u8>) -> Self {
        let data = data.into_boxed_slice();
        let locked = if data.is_empty() {
            true
        } else {
            // SAFETY: `data` is a live allocation of exactly `data.len()` bytes
            // and is unlocked in `Drop` before it is freed.
            unsafe { mlock(data.as_ptr(), data.len()) }
        };

        if !locked {
            log::warn!(
                "failed to mlock {} bytes of secret material; it may be swapped out",
                data.len()
            );
        }

        Self { data, locked }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether the memory is actually locked.
    pub fn is_locked(&self) -> bool {
        self.locked
    }
}

impl From<&[u8]> for SecretBuffer {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes.to_vec())
    }
}

impl fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretBuffer")
            .field("len", &self.data.len())
            .field("locked", &self.locked)
            .finish_non_exhaustive()
    }
}

impl Drop for SecretBuffer {
    fn drop(&mut self) {
        self.data.zeroize();

        if self.locked && !self.data.is_empty() {
            // SAFETY: same pointer and length that were passed to `mlock`.
            unsafe {
                munlock(self.data.as_ptr(), self.data.len());
            }
        }
    }
}

/// Lock a memory region so it cannot be swapped to disk.
///
/// # Safety
///
/// `ptr` must point to a valid allocation of at least `len` bytes that stays
/// alive until [`munlock`] is called or the process exits.
unsafe fn mlock(ptr: *const u8, len: usize) -> bool {
    #[cfg(unix)]
    {
        unix::mlock_impl(ptr, len)
    }

    #[cfg(not(unix))]
    {
        let _ = (ptr, len);
        false
    }
}

/// # Safety
///
/// `ptr` and `len` must match a previous successful [`mlock`].
unsafe fn munlock(ptr: *const u8, len: usize) -> bool {
    #[cfg(unix)]
    {
        unix::munlock_impl(ptr, len)
    }

    #[cfg(not(unix))]
    {
        let _ = (ptr, len);
        true
    }
}

#[cfg(unix)]
mod unix {
    pub fn disable_core_dumps_impl() -> bool {
        let rlim = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        // SAFETY: setrlimit only reads the struct we pass in.
        let result = unsafe { libc::setrlimit(libc::RLIMIT_CORE, &rlim) };
        if result != 0 {
            log::warn!(
                "failed to disable core dumps: {}",
                std::io::Error::last_os_error()
            );
            return false;
        }
        true
    }

    pub unsafe fn mlock_impl(ptr: *const u8, len: usize) -> bool {
        libc::mlock(ptr as *const libc::c_void, len) == 0
    }

    pub unsafe fn munlock_impl(ptr: *const u8, len: usize) -> bool {
        libc::munlock(ptr as *const libc::c_void, len) == 0
    }
}
