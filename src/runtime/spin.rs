//! Busy-wait primitives. Workers waiting on siblings spin instead of
//! parking, and give up only when interrupted.

use std::hint::spin_loop;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use super::{HarnessError, InfraControl};

const UNLOCKED: i32 = 0;
const LOCKED: i32 = 1;

/// Compare-exchange lock guarding one-time helper calls on shared fixtures.
#[derive(Debug, Default)]
pub struct SpinMutex {
    state: AtomicI32,
}

impl SpinMutex {
    pub const fn new() -> Self {
        Self {
            state: AtomicI32::new(UNLOCKED),
        }
    }

    /// Spin until the lock is taken, checking for interruption between
    /// attempts.
    pub fn lock(&self, control: &InfraControl) -> Result<SpinGuard<'_>, HarnessError> {
        loop {
            if let Some(guard) = self.try_lock() {
                return Ok(guard);
            }
            if control.is_interrupted() {
                return Err(HarnessError::Interrupted);
            }
            spin_loop();
        }
    }

    pub fn try_lock(&self) -> Option<SpinGuard<'_>> {
        self.state
            .compare_exchange_weak(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| SpinGuard { mutex: self })
    }

    pub fn is_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) == LOCKED
    }
}

/// Releases its [`SpinMutex`] on drop.
#[derive(Debug)]
pub struct SpinGuard<'a> {
    mutex: &'a SpinMutex,
}

impl Drop for SpinGuard<'_> {
    fn drop(&mut self) {
        self.mutex.state.store(UNLOCKED, Ordering::Release);
    }
}

/// Spin while `flag` is set. Fails when the worker is interrupted first.
pub fn spin_while(flag: &AtomicBool, control: &InfraControl) -> Result<(), HarnessError> {
    while flag.load(Ordering::Acquire) {
        if control.is_interrupted() {
            return Err(HarnessError::Interrupted);
        }
        spin_loop();
    }
    Ok(())
}

/// Spin at a barrier until the last worker clears `should_wait`. Fails
/// when the worker is interrupted or a sibling failed first.
pub fn await_barrier(should_wait: &AtomicBool, control: &InfraControl) -> Result<(), HarnessError> {
    while should_wait.load(Ordering::Acquire) {
        control.check_runnable()?;
        spin_loop();
    }
    Ok(())
}
