//! `AdaptiveSpinMutex` (§5): bridges lock-free shared-memory ring access to
//! the kernel without paying a syscall on the uncontended fast path. Spins
//! with a CPU-pause hint for a bounded number of attempts, then parks on an
//! OS mutex.

use std::cell::UnsafeCell;
use std::hint;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

const MAX_SPINS: u32 = 40;

pub struct AdaptiveSpinMutex<T> {
    locked: AtomicBool,
    fallback: Mutex<()>,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for AdaptiveSpinMutex<T> {}
unsafe impl<T: Send> Sync for AdaptiveSpinMutex<T> {}

impl<T> AdaptiveSpinMutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            fallback: Mutex::new(()),
            data: UnsafeCell::new(value),
        }
    }

    pub fn lock(&self) -> AdaptiveSpinGuard<'_, T> {
        for _ in 0..MAX_SPINS {
            if self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return AdaptiveSpinGuard {
                    mutex: self,
                    fallback_guard: None,
                };
            }
            hint::spin_loop();
        }

        let fallback_guard = self.fallback.lock();
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            hint::spin_loop();
        }

        AdaptiveSpinGuard {
            mutex: self,
            fallback_guard: Some(fallback_guard),
        }
    }
}

pub struct AdaptiveSpinGuard<'a, T> {
    mutex: &'a AdaptiveSpinMutex<T>,
    fallback_guard: Option<parking_lot::MutexGuard<'a, ()>>,
}

impl<'a, T> Deref for AdaptiveSpinGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<'a, T> DerefMut for AdaptiveSpinGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<'a, T> Drop for AdaptiveSpinGuard<'a, T> {
    fn drop(&mut self) {
        self.mutex.locked.store(false, Ordering::Release);
        drop(self.fallback_guard.take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_not_lost() {
        let mutex = Arc::new(AdaptiveSpinMutex::new(0u64));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let mutex = mutex.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..1000 {
                    *mutex.lock() += 1;
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*mutex.lock(), 8000);
    }
}
