//! Lockstep Animation
//!
//! One frame loop, many callbacks, one completion coefficient.
//!
//! # Features
//!
//! - **Lockstep dispatch**: every registered callback sees the same `0.0..=1.0`
//!   coefficient on the same frame, in registration order
//! - **Pluggable hosts**: frames come from any [`FrameScheduler`]; a headless
//!   [`FrameQueue`] and a background [`FrameThread`] are included
//! - **Pluggable time**: [`SystemClock`] for real hosts, [`ManualClock`] for
//!   deterministic ones
//! - **Restartable**: starting mid-run cancels the pending frame and restarts
//!   progress from zero

pub mod animator;
pub mod clock;
pub mod config;
pub mod error;
pub mod frame;
pub mod frame_thread;

pub use animator::{completion_coefficient, AnimationCallback, AnimatorState, FrameAnimator};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AnimatorConfig, CallbackPolicy, DEFAULT_DURATION_MS, DEFAULT_TARGET_FPS};
pub use error::{AnimatorError, Result};
pub use frame::{FrameCallback, FrameHandle, FrameQueue, FrameScheduler};
pub use frame_thread::FrameThread;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a panicking callback poisoned it
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
