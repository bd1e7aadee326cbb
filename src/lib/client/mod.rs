pub mod binding;
pub mod client;
pub mod commands;
pub mod config;
pub mod registry;
pub mod router;
pub mod subscriptions;

pub use binding::*;
pub use client::*;
pub use config::*;
pub use router::Router;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Mutex, MutexGuard};

// Consumer callbacks never run under these locks, so a poisoned lock still holds
// consistent data.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Runs a consumer callback, turning a panic into its message.
pub(crate) fn guarded(f: impl FnOnce()) -> Result<(), String> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|panic| {
        panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string())
    })
}
