//! Per-slot exclusive lock.
//!
//! A [`SleepLock`] blocks the calling thread until the lock is free and
//! remembers which thread holds it, so ownership can be asserted later by
//! [`holding`](SleepLock::holding). Unlike a guard-based mutex the lock is
//! acquired and released explicitly; the buffer cache ties both ends to the
//! lifetime of a [`Buf`](crate::Buf).
//!
//! The lock is not reentrant. A thread that tries to acquire a lock it
//! already holds would wait forever, so that case panics instead.

use parking_lot::{Condvar, Mutex};
use std::cell::UnsafeCell;
use std::thread::{self, ThreadId};

/// Blocking, owner-tracking lock protecting a value of type `T`.
pub struct SleepLock<T: ?Sized> {
    owner: Mutex<Option<ThreadId>>,
    cond: Condvar,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is only handed out to the thread recorded in
// `owner`, so sharing the lock is sound whenever the value may be sent.
unsafe impl<T: ?Sized + Send> Send for SleepLock<T> {}
unsafe impl<T: ?Sized + Send> Sync for SleepLock<T> {}

impl<T> SleepLock<T> {
    /// Create an unlocked lock around `data`.
    pub fn new(data: T) -> Self {
        Self {
            owner: Mutex::new(None),
            cond: Condvar::new(),
            data: UnsafeCell::new(data),
        }
    }
}

impl<T: ?Sized> SleepLock<T> {
    /// Block until the lock is free, then take it for the current thread.
    ///
    /// # Panics
    ///
    /// Panics if the current thread already holds the lock.
    pub fn acquire(&self) {
        let me = thread::current().id();
        let mut owner = self.owner.lock();
        if *owner == Some(me) {
            log::error!("acquiresleep: lock already held by {:?}", me);
            panic!("acquiresleep: already held");
        }
        while owner.is_some() {
            self.cond.wait(&mut owner);
        }
        *owner = Some(me);
    }

    /// Take the lock if it is free. Returns whether it was taken.
    pub fn try_acquire(&self) -> bool {
        let mut owner = self.owner.lock();
        if owner.is_some() {
            return false;
        }
        *owner = Some(thread::current().id());
        true
    }

    /// Release the lock and wake one waiter.
    ///
    /// # Panics
    ///
    /// Panics if the current thread does not hold the lock.
    pub fn release(&self) {
        let mut owner = self.owner.lock();
        if *owner != Some(thread::current().id()) {
            log::error!("releasesleep: lock held by {:?}, not the caller", *owner);
            panic!("releasesleep: not held");
        }
        *owner = None;
        drop(owner);
        self.cond.notify_one();
    }

    /// Whether the current thread holds the lock.
    pub fn holding(&self) -> bool {
        *self.owner.lock() == Some(thread::current().id())
    }

    /// Whether any thread holds the lock.
    pub fn is_locked(&self) -> bool {
        self.owner.lock().is_some()
    }

    /// Shared access to the protected value.
    ///
    /// # Safety
    ///
    /// The current thread must hold the lock, and no `&mut T` obtained from
    /// [`get_mut`](Self::get_mut) may be live.
    pub unsafe fn get(&self) -> &T {
        // SAFETY: the caller is the recorded owner, so no other thread
        // touches the value until it releases.
        unsafe { &*self.data.get() }
    }

    /// Exclusive access to the protected value.
    ///
    /// # Safety
    ///
    /// The current thread must hold the lock, and no other reference
    /// obtained from this lock may be live.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut(&self) -> &mut T {
        // SAFETY: the caller is the recorded owner and holds no other
        // reference into the value.
        unsafe { &mut *self.data.get() }
    }
}

impl<T: ?Sized> std::fmt::Debug for SleepLock<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SleepLock")
            .field("owner", &*self.owner.lock())
            .finish_non_exhaustive()
    }
}
