//! Background frame loop
//!
//! Pumps a [`FrameQueue`] from its own thread at a fixed rate, standing in
//! for a display-refresh callback in hosts that don't have one.
//!
//! ```ignore
//! let frames = FrameThread::spawn(60)?;
//! let animator = FrameAnimator::new(frames.scheduler());
//! animator.register_callback(|t| println!("{t:.2}"));
//! animator.start_animation();
//! ```

use crate::error::{AnimatorError, Result};
use crate::frame::FrameQueue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// A thread that ticks a [`FrameQueue`] at a target frame rate
pub struct FrameThread {
    queue: Arc<FrameQueue>,
    stop_flag: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    target_fps: u32,
}

impl FrameThread {
    /// Start ticking a fresh queue at `fps` frames per second
    pub fn spawn(fps: u32) -> Result<Self> {
        Self::spawn_with_queue(Arc::new(FrameQueue::new()), fps)
    }

    /// Start ticking an existing queue
    pub fn spawn_with_queue(queue: Arc<FrameQueue>, fps: u32) -> Result<Self> {
        if fps == 0 {
            return Err(AnimatorError::InvalidFrameRate(
                "target fps must be at least 1".to_string(),
            ));
        }

        let stop_flag = Arc::new(AtomicBool::new(false));
        let frame_duration = Duration::from_micros(1_000_000 / u64::from(fps));

        let thread_queue = Arc::clone(&queue);
        let thread_stop = Arc::clone(&stop_flag);
        let thread_handle = thread::Builder::new()
            .name("lockstep-frames".to_string())
            .spawn(move || {
                tracing::debug!("Frame thread started at {} fps", fps);
                let mut overruns: u64 = 0;

                while !thread_stop.load(Ordering::Relaxed) {
                    let start = Instant::now();
                    thread_queue.run_frame();

                    // Sleep for remaining frame time
                    let elapsed = start.elapsed();
                    if elapsed < frame_duration {
                        thread::sleep(frame_duration - elapsed);
                    } else {
                        // Only log occasionally to avoid spam
                        if overruns % u64::from(fps) == 0 {
                            tracing::warn!(
                                "Frame took {:?}, over the {:?} budget ({} overruns so far)",
                                elapsed,
                                frame_duration,
                                overruns + 1
                            );
                        }
                        overruns += 1;
                    }
                }

                tracing::debug!("Frame thread stopped");
            })
            .map_err(|e| AnimatorError::FrameThread(e.to_string()))?;

        Ok(Self {
            queue,
            stop_flag,
            thread_handle: Some(thread_handle),
            target_fps: fps,
        })
    }

    /// The queue this thread pumps, for handing to animators
    pub fn scheduler(&self) -> Arc<FrameQueue> {
        Arc::clone(&self.queue)
    }

    pub fn target_fps(&self) -> u32 {
        self.target_fps
    }

    /// Total frame callbacks executed by this thread's queue
    pub fn frames_dispatched(&self) -> u64 {
        self.queue.frames_dispatched()
    }

    /// Check if the thread is still ticking
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop ticking and join the thread
    ///
    /// Frames still queued stay in the queue and can be pumped by hand.
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                tracing::error!("Frame thread panicked");
            }
        }
    }
}

impl Drop for FrameThread {
    fn drop(&mut self) {
        self.stop();
    }
}
