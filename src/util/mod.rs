//! Small shared utilities.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Process-global animation-speed factor.
pub mod speed;

/// Locks a mutex, recovering the guard from a poisoned lock.
///
/// Effect bookkeeping must stay consistent even if a host callback panicked
/// on another thread; every lock site in the crate goes through here.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
