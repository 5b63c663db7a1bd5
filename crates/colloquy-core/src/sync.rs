use std::sync::{Mutex, MutexGuard};

/// Extension trait for `Mutex` that ignores lock poisoning.
///
/// A poisoned lock means another thread panicked while holding the guard;
/// the panic itself is the error that matters, not the poison flag. Every
/// lock in the engine goes through this trait so a panicked sink or test
/// thread cannot wedge the conversation state.
pub trait IgnoreLock<T> {
    /// Lock the mutex, clearing any poison error.
    fn lock_ignore_poison(&self) -> MutexGuard<'_, T>;
}

impl<T> IgnoreLock<T> for Mutex<T> {
    fn lock_ignore_poison(&self) -> MutexGuard<'_, T> {
        match self.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
