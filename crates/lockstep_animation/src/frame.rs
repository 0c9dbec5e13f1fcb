//! Frame scheduling
//!
//! A [`FrameScheduler`] is the host's "call me back on the next frame"
//! primitive. Each request runs exactly once, later, and is identified by
//! a [`FrameHandle`] that can be used to cancel it before it fires.
//!
//! [`FrameQueue`] is the headless implementation: frames pile up until the
//! host pumps the queue with [`FrameQueue::run_frame`], either by hand or
//! from a [`FrameThread`](crate::FrameThread).

use crate::lock_unpoisoned;
use slotmap::{new_key_type, SlotMap};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

new_key_type! {
    /// Handle to a pending frame request
    pub struct FrameHandle;
}

/// Work to run on the next frame
pub type FrameCallback = Box<dyn FnOnce() + Send>;

/// A host-provided frame-scheduling primitive
pub trait FrameScheduler: Send + Sync {
    /// Run `frame` once, on the next frame tick
    fn request_frame(&self, frame: FrameCallback) -> FrameHandle;

    /// Drop a pending request
    ///
    /// Returns false if the frame already ran or was already cancelled.
    fn cancel_frame(&self, handle: FrameHandle) -> bool;
}

struct QueueInner {
    frames: SlotMap<FrameHandle, FrameCallback>,
    /// Request order. May hold handles of cancelled frames, which are skipped.
    order: VecDeque<FrameHandle>,
}

/// FIFO frame queue pumped explicitly by its host
pub struct FrameQueue {
    inner: Mutex<QueueInner>,
    dispatched: AtomicU64,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                frames: SlotMap::with_key(),
                order: VecDeque::new(),
            }),
            dispatched: AtomicU64::new(0),
        }
    }

    /// Run one frame tick
    ///
    /// Only frames that were pending when the tick began are run; frames
    /// requested while it runs wait for the next tick. Returns the number
    /// of frame callbacks executed.
    ///
    /// No lock is held while a frame callback runs. If one panics, the
    /// frames after it in this tick stay queued for the next tick.
    pub fn run_frame(&self) -> usize {
        let batch = std::mem::take(&mut lock_unpoisoned(&self.inner).order);
        let mut remaining = Requeue {
            queue: self,
            handles: batch,
        };

        let mut ran = 0;
        while let Some(handle) = remaining.handles.pop_front() {
            let frame = lock_unpoisoned(&self.inner).frames.remove(handle);
            if let Some(frame) = frame {
                self.dispatched.fetch_add(1, Ordering::Relaxed);
                frame();
                ran += 1;
            }
        }
        ran
    }

    /// Number of frames waiting for the next tick
    pub fn pending_count(&self) -> usize {
        lock_unpoisoned(&self.inner).frames.len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending_count() == 0
    }

    /// Total frame callbacks executed over the queue's lifetime
    pub fn frames_dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameScheduler for FrameQueue {
    fn request_frame(&self, frame: FrameCallback) -> FrameHandle {
        let mut inner = lock_unpoisoned(&self.inner);
        let handle = inner.frames.insert(frame);
        inner.order.push_back(handle);
        handle
    }

    fn cancel_frame(&self, handle: FrameHandle) -> bool {
        lock_unpoisoned(&self.inner).frames.remove(handle).is_some()
    }
}

/// Puts the unfinished part of a tick back at the front of the queue
struct Requeue<'a> {
    queue: &'a FrameQueue,
    handles: VecDeque<FrameHandle>,
}

impl Drop for Requeue<'_> {
    fn drop(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        let mut inner = lock_unpoisoned(&self.queue.inner);
        while let Some(handle) = self.handles.pop_back() {
            inner.order.push_front(handle);
        }
    }
}
