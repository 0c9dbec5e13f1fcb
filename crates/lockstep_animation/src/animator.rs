//! Lockstep frame animator
//!
//! A [`FrameAnimator`] drives any number of callbacks from one frame chain.
//! Every frame it computes a single completion coefficient from elapsed
//! time and duration and hands that same value to each callback, in
//! registration order, until the coefficient reaches exactly `1.0`.
//!
//! ```ignore
//! let queue = Arc::new(FrameQueue::new());
//! let animator = FrameAnimator::new(queue.clone());
//!
//! animator.register_callback(|t| fade.set_opacity(t));
//! animator.register_callback(|t| panel.set_offset(100.0 * (1.0 - t)));
//! animator.start_animation();
//!
//! // host loop
//! while !queue.is_idle() {
//!     queue.run_frame();
//! }
//! ```
//!
//! # Restarts
//!
//! Calling [`FrameAnimator::start_animation`] while a run is in flight
//! cancels the pending frame and begins a new run from coefficient zero.
//! Each run carries a generation number, so a frame from the old run that
//! was already being dispatched is ignored. There is never more than one
//! live frame chain per animator.

use crate::clock::{Clock, SystemClock};
use crate::config::{AnimatorConfig, CallbackPolicy, DEFAULT_DURATION_MS};
use crate::error::{AnimatorError, Result};
use crate::frame::{FrameHandle, FrameScheduler};
use crate::lock_unpoisoned;
use smallvec::SmallVec;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A callback receiving the completion coefficient for the current frame
pub type AnimationCallback = Box<dyn FnMut(f32) + Send>;

/// Idle/Running state of an animator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnimatorState {
    /// No run in progress
    Idle,
    /// Frames are being dispatched
    Running,
}

/// Progress of `elapsed` through `duration`, clamped to at most `1.0`
///
/// A zero duration is complete immediately.
pub fn completion_coefficient(elapsed: Duration, duration: Duration) -> f32 {
    if duration.is_zero() {
        return 1.0;
    }
    (elapsed.as_secs_f64() / duration.as_secs_f64()).min(1.0) as f32
}

/// Run-scoped state
struct RunState {
    duration: Duration,
    /// Set iff a run is in progress
    start_time: Option<Duration>,
    pending_frame: Option<FrameHandle>,
    generation: u64,
    runs_started: u64,
}

struct Shared {
    run: Mutex<RunState>,
    callbacks: Mutex<SmallVec<[AnimationCallback; 4]>>,
    /// Registrations not yet seen by a frame
    incoming: Mutex<Vec<AnimationCallback>>,
    registered: AtomicUsize,
    scheduler: Arc<dyn FrameScheduler>,
    clock: Arc<dyn Clock>,
    policy: CallbackPolicy,
}

/// Drives registered callbacks in lockstep with one shared frame chain
pub struct FrameAnimator {
    shared: Arc<Shared>,
}

impl FrameAnimator {
    /// Create an animator on the system clock with the default duration
    pub fn new(scheduler: Arc<dyn FrameScheduler>) -> Self {
        Self::with_clock(scheduler, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(scheduler: Arc<dyn FrameScheduler>, clock: Arc<dyn Clock>) -> Self {
        Self::build(
            scheduler,
            clock,
            Duration::from_millis(DEFAULT_DURATION_MS),
            CallbackPolicy::default(),
        )
    }

    /// Create an animator from validated settings
    pub fn from_config(
        config: &AnimatorConfig,
        scheduler: Arc<dyn FrameScheduler>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(
            scheduler,
            clock,
            config.duration(),
            config.callback_policy,
        ))
    }

    fn build(
        scheduler: Arc<dyn FrameScheduler>,
        clock: Arc<dyn Clock>,
        duration: Duration,
        policy: CallbackPolicy,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                run: Mutex::new(RunState {
                    duration,
                    start_time: None,
                    pending_frame: None,
                    generation: 0,
                    runs_started: 0,
                }),
                callbacks: Mutex::new(SmallVec::new()),
                incoming: Mutex::new(Vec::new()),
                registered: AtomicUsize::new(0),
                scheduler,
                clock,
                policy,
            }),
        }
    }

    /// Add a callback to the end of the dispatch order
    ///
    /// Safe to call from inside a callback. The new callback first runs on
    /// the frame after the one currently being dispatched.
    pub fn register_callback<F>(&self, callback: F)
    where
        F: FnMut(f32) + Send + 'static,
    {
        lock_unpoisoned(&self.shared.incoming).push(Box::new(callback));
        self.shared.registered.fetch_add(1, Ordering::Relaxed);
    }

    /// Replace the run duration
    ///
    /// The duration is read on every frame, so a run in progress picks up
    /// the new value on its next frame.
    pub fn set_duration(&self, duration: Duration) -> Result<()> {
        if duration.is_zero() {
            return Err(AnimatorError::InvalidDuration(
                "duration must be greater than zero".to_string(),
            ));
        }
        lock_unpoisoned(&self.shared.run).duration = duration;
        Ok(())
    }

    pub fn set_duration_ms(&self, duration_ms: u64) -> Result<()> {
        self.set_duration(Duration::from_millis(duration_ms))
    }

    pub fn duration(&self) -> Duration {
        lock_unpoisoned(&self.shared.run).duration
    }

    /// Begin a run, restarting any run already in progress
    pub fn start_animation(&self) {
        let shared = &self.shared;
        let mut run = lock_unpoisoned(&shared.run);

        if let Some(previous) = run.pending_frame.take() {
            let cancelled = shared.scheduler.cancel_frame(previous);
            tracing::debug!(
                "FrameAnimator: restarting run {} (pending frame cancelled={})",
                run.generation,
                cancelled
            );
        }

        run.generation = run.generation.wrapping_add(1);
        run.runs_started += 1;
        run.start_time = Some(shared.clock.now());
        let generation = run.generation;
        run.pending_frame = Some(shared.schedule_frame(generation));

        tracing::debug!(
            "FrameAnimator: run {} started ({:?}, {} callbacks)",
            generation,
            run.duration,
            shared.registered.load(Ordering::Relaxed)
        );
    }

    pub fn state(&self) -> AnimatorState {
        if lock_unpoisoned(&self.shared.run).start_time.is_some() {
            AnimatorState::Running
        } else {
            AnimatorState::Idle
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == AnimatorState::Running
    }

    /// Number of registered callbacks, including ones no frame has seen yet
    pub fn callback_count(&self) -> usize {
        self.shared.registered.load(Ordering::Relaxed)
    }

    /// Number of times `start_animation` has been called
    pub fn run_count(&self) -> u64 {
        lock_unpoisoned(&self.shared.run).runs_started
    }

    pub fn callback_policy(&self) -> CallbackPolicy {
        self.shared.policy
    }
}

impl Drop for FrameAnimator {
    fn drop(&mut self) {
        let mut run = lock_unpoisoned(&self.shared.run);
        if let Some(handle) = run.pending_frame.take() {
            self.shared.scheduler.cancel_frame(handle);
        }
        run.start_time = None;
    }
}

impl Shared {
    fn schedule_frame(self: &Arc<Self>, generation: u64) -> FrameHandle {
        let weak = Arc::downgrade(self);
        self.scheduler.request_frame(Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.on_frame(generation);
            }
        }))
    }

    fn on_frame(self: &Arc<Self>, generation: u64) {
        let coefficient = {
            let run = lock_unpoisoned(&self.run);
            if run.generation != generation {
                tracing::trace!("FrameAnimator: dropping stale frame from run {}", generation);
                return;
            }
            let Some(start) = run.start_time else {
                return;
            };
            let elapsed = self.clock.now().saturating_sub(start);
            completion_coefficient(elapsed, run.duration)
        };

        let abort = AbortRunOnPanic {
            shared: self,
            generation,
        };
        let dispatched = self.dispatch(coefficient);
        drop(abort);

        tracing::trace!(
            "FrameAnimator: run {} frame at {:.4} ({} callbacks)",
            generation,
            coefficient,
            dispatched
        );

        let mut run = lock_unpoisoned(&self.run);
        if run.generation != generation {
            // A callback restarted the animation; the new run owns the chain
            return;
        }

        if coefficient >= 1.0 {
            run.start_time = None;
            run.pending_frame = None;
            tracing::debug!("FrameAnimator: run {} complete", generation);
        } else {
            run.pending_frame = Some(self.schedule_frame(generation));
        }
    }

    /// Hand `coefficient` to every callback, returning how many ran
    fn dispatch(&self, coefficient: f32) -> usize {
        let mut callbacks = lock_unpoisoned(&self.callbacks);
        let incoming = std::mem::take(&mut *lock_unpoisoned(&self.incoming));
        callbacks.extend(incoming);

        for (index, callback) in callbacks.iter_mut().enumerate() {
            match self.policy {
                CallbackPolicy::Propagate => callback(coefficient),
                CallbackPolicy::Isolate => {
                    let result = panic::catch_unwind(AssertUnwindSafe(|| callback(coefficient)));
                    if let Err(payload) = result {
                        tracing::error!(
                            "FrameAnimator: callback {} panicked at {:.4}: {}",
                            index,
                            coefficient,
                            panic_message(&*payload)
                        );
                    }
                }
            }
        }
        callbacks.len()
    }
}

/// Ends the run if a propagated callback panic unwinds through a frame
struct AbortRunOnPanic<'a> {
    shared: &'a Arc<Shared>,
    generation: u64,
}

impl Drop for AbortRunOnPanic<'_> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            return;
        }
        let mut run = lock_unpoisoned(&self.shared.run);
        if run.generation == self.generation {
            run.start_time = None;
            run.pending_frame = None;
            tracing::error!(
                "FrameAnimator: run {} aborted by a panicking callback",
                self.generation
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::frame::FrameQueue;

    const FRAME: Duration = Duration::from_millis(16);

    fn setup(duration_ms: u64) -> (Arc<FrameQueue>, Arc<ManualClock>, FrameAnimator) {
        let queue = Arc::new(FrameQueue::new());
        let clock = Arc::new(ManualClock::new());
        let animator = FrameAnimator::with_clock(queue.clone(), clock.clone());
        animator.set_duration_ms(duration_ms).unwrap();
        (queue, clock, animator)
    }

    fn recording(animator: &FrameAnimator) -> Arc<Mutex<Vec<f32>>> {
        let values = Arc::new(Mutex::new(Vec::new()));
        let values_clone = values.clone();
        animator.register_callback(move |t| values_clone.lock().unwrap().push(t));
        values
    }

    fn step(queue: &FrameQueue, clock: &ManualClock, delta: Duration) -> usize {
        clock.advance(delta);
        queue.run_frame()
    }

    #[test]
    fn test_coefficient_clamps_to_one() {
        let d = Duration::from_millis(100);
        assert_eq!(completion_coefficient(Duration::ZERO, d), 0.0);
        assert_eq!(completion_coefficient(Duration::from_millis(50), d), 0.5);
        assert_eq!(completion_coefficient(Duration::from_millis(100), d), 1.0);
        assert_eq!(completion_coefficient(Duration::from_secs(60), d), 1.0);
    }

    #[test]
    fn test_coefficient_is_monotonic() {
        let d = Duration::from_millis(237);
        let mut previous = 0.0;
        for ms in 0..500 {
            let c = completion_coefficient(Duration::from_millis(ms), d);
            assert!(c >= previous, "coefficient decreased at {}ms", ms);
            assert!((0.0..=1.0).contains(&c));
            previous = c;
        }
    }

    #[test]
    fn test_zero_duration_coefficient_is_complete() {
        assert_eq!(completion_coefficient(Duration::ZERO, Duration::ZERO), 1.0);
    }

    #[test]
    fn test_default_duration() {
        let animator = FrameAnimator::new(Arc::new(FrameQueue::new()));
        assert_eq!(animator.duration(), Duration::from_millis(200));
        assert_eq!(animator.state(), AnimatorState::Idle);
        assert_eq!(animator.callback_policy(), CallbackPolicy::Isolate);
    }

    #[test]
    fn test_zero_duration_is_rejected() {
        let (_queue, _clock, animator) = setup(100);
        assert!(matches!(
            animator.set_duration(Duration::ZERO),
            Err(AnimatorError::InvalidDuration(_))
        ));
        assert_eq!(animator.duration(), Duration::from_millis(100));
    }

    #[test]
    fn test_start_schedules_first_frame() {
        let (queue, _clock, animator) = setup(100);
        assert!(queue.is_idle());

        animator.start_animation();
        assert!(animator.is_running());
        assert_eq!(queue.pending_count(), 1);
        assert_eq!(animator.run_count(), 1);
    }

    #[test]
    fn test_run_completes_exactly_at_one() {
        let (queue, clock, animator) = setup(100);
        let values = recording(&animator);

        animator.start_animation();
        while !queue.is_idle() {
            step(&queue, &clock, FRAME);
        }

        let values = values.lock().unwrap();
        assert_eq!(values.last(), Some(&1.0));
        assert_eq!(values.iter().filter(|&&t| t == 1.0).count(), 1);
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert!(!animator.is_running());
    }

    #[test]
    fn test_no_frames_after_completion() {
        let (queue, clock, animator) = setup(50);
        let values = recording(&animator);

        animator.start_animation();
        assert_eq!(step(&queue, &clock, Duration::from_millis(60)), 1);
        assert!(queue.is_idle());

        assert_eq!(step(&queue, &clock, FRAME), 0);
        assert_eq!(*values.lock().unwrap(), vec![1.0]);
    }

    #[test]
    fn test_callbacks_share_coefficient_in_registration_order() {
        let (queue, clock, animator) = setup(100);
        let log: Arc<Mutex<Vec<(&'static str, f32)>>> = Arc::new(Mutex::new(Vec::new()));

        for name in ["a", "b", "c"] {
            let log = log.clone();
            animator.register_callback(move |t| log.lock().unwrap().push((name, t)));
        }

        animator.start_animation();
        step(&queue, &clock, Duration::from_millis(25));
        step(&queue, &clock, Duration::from_millis(25));

        let log = log.lock().unwrap();
        let names: Vec<_> = log.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["a", "b", "c", "a", "b", "c"]);
        assert!(log[..3].iter().all(|(_, t)| *t == 0.25));
        assert!(log[3..].iter().all(|(_, t)| *t == 0.5));
    }

    #[test]
    fn test_duplicate_callbacks_are_kept() {
        let (queue, clock, animator) = setup(10);
        let calls = Arc::new(AtomicUsize::new(0));

        let callback = {
            let calls = calls.clone();
            move |_t: f32| {
                calls.fetch_add(1, Ordering::Relaxed);
            }
        };
        animator.register_callback(callback.clone());
        animator.register_callback(callback);
        assert_eq!(animator.callback_count(), 2);

        animator.start_animation();
        step(&queue, &clock, Duration::from_millis(10));
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_late_registration_starts_next_frame() {
        let (queue, clock, animator) = setup(100);
        let early = recording(&animator);

        animator.start_animation();
        step(&queue, &clock, Duration::from_millis(20));

        let late = recording(&animator);
        step(&queue, &clock, Duration::from_millis(20));

        assert_eq!(*early.lock().unwrap(), vec![0.2, 0.4]);
        assert_eq!(*late.lock().unwrap(), vec![0.4]);
    }

    #[test]
    fn test_registration_from_inside_callback_waits_a_frame() {
        let queue = Arc::new(FrameQueue::new());
        let clock = Arc::new(ManualClock::new());
        let animator = Arc::new(FrameAnimator::with_clock(queue.clone(), clock.clone()));
        animator.set_duration_ms(100).unwrap();

        let inner_values = Arc::new(Mutex::new(Vec::new()));
        let registered = Arc::new(AtomicUsize::new(0));
        {
            let weak = Arc::downgrade(&animator);
            let inner_values = inner_values.clone();
            let registered = registered.clone();
            animator.register_callback(move |_t| {
                if registered.fetch_add(1, Ordering::Relaxed) == 0 {
                    if let Some(animator) = weak.upgrade() {
                        let inner_values = inner_values.clone();
                        animator.register_callback(move |t| inner_values.lock().unwrap().push(t));
                    }
                }
            });
        }

        animator.start_animation();
        step(&queue, &clock, Duration::from_millis(10));
        assert!(inner_values.lock().unwrap().is_empty());

        step(&queue, &clock, Duration::from_millis(10));
        assert_eq!(*inner_values.lock().unwrap(), vec![0.2]);
    }

    #[test]
    fn test_duration_change_applies_mid_run() {
        let (queue, clock, animator) = setup(100);
        let values = recording(&animator);

        animator.start_animation();
        step(&queue, &clock, Duration::from_millis(40));
        animator.set_duration_ms(50).unwrap();
        step(&queue, &clock, Duration::from_millis(10));

        assert_eq!(*values.lock().unwrap(), vec![0.4, 1.0]);
        assert!(queue.is_idle());
    }

    #[test]
    fn test_restart_cancels_pending_frame_and_resets_progress() {
        let (queue, clock, animator) = setup(100);
        let values = recording(&animator);

        animator.start_animation();
        step(&queue, &clock, Duration::from_millis(60));

        animator.start_animation();
        assert_eq!(queue.pending_count(), 1);
        assert_eq!(animator.run_count(), 2);

        step(&queue, &clock, Duration::from_millis(30));
        assert_eq!(*values.lock().unwrap(), vec![0.6, 0.3]);
    }

    #[test]
    fn test_restart_before_first_frame_keeps_single_chain() {
        let (queue, clock, animator) = setup(100);
        let values = recording(&animator);

        animator.start_animation();
        animator.start_animation();
        animator.start_animation();
        assert_eq!(queue.pending_count(), 1);

        assert_eq!(step(&queue, &clock, Duration::from_millis(50)), 1);
        assert_eq!(*values.lock().unwrap(), vec![0.5]);
    }

    #[test]
    fn test_fresh_run_after_completion() {
        let (queue, clock, animator) = setup(100);
        let values = recording(&animator);

        animator.start_animation();
        step(&queue, &clock, Duration::from_millis(150));
        assert!(!animator.is_running());

        clock.advance(Duration::from_secs(5));
        animator.start_animation();
        step(&queue, &clock, Duration::from_millis(25));

        assert_eq!(*values.lock().unwrap(), vec![1.0, 0.25]);
    }

    #[test]
    fn test_clock_going_backwards_saturates_to_zero() {
        let (queue, clock, animator) = setup(100);
        clock.set(Duration::from_secs(1));
        let values = recording(&animator);

        animator.start_animation();
        clock.set(Duration::from_millis(500));
        queue.run_frame();

        assert_eq!(*values.lock().unwrap(), vec![0.0]);
        assert!(animator.is_running());
    }

    #[test]
    fn test_isolated_panic_does_not_stop_frame() {
        let (queue, clock, animator) = setup(100);
        animator.register_callback(|_t| panic!("broken component"));
        let values = recording(&animator);

        animator.start_animation();
        step(&queue, &clock, Duration::from_millis(50));
        step(&queue, &clock, Duration::from_millis(50));

        assert_eq!(*values.lock().unwrap(), vec![0.5, 1.0]);
        assert!(!animator.is_running());
    }

    #[test]
    fn test_propagated_panic_ends_frame_and_run() {
        let queue = Arc::new(FrameQueue::new());
        let clock = Arc::new(ManualClock::new());
        let config = AnimatorConfig {
            duration_ms: 100,
            callback_policy: CallbackPolicy::Propagate,
            ..Default::default()
        };
        let animator = FrameAnimator::from_config(&config, queue.clone(), clock.clone()).unwrap();

        animator.register_callback(|_t| panic!("broken component"));
        let values = recording(&animator);

        animator.start_animation();
        clock.advance(Duration::from_millis(20));
        let result = panic::catch_unwind(AssertUnwindSafe(|| queue.run_frame()));

        assert!(result.is_err());
        assert!(values.lock().unwrap().is_empty());
        assert!(!animator.is_running());
        assert!(queue.is_idle());

        // The animator is still usable after the failure
        animator.start_animation();
        assert!(animator.is_running());
    }

    #[test]
    fn test_from_config_rejects_invalid_settings() {
        let config = AnimatorConfig {
            duration_ms: 0,
            ..Default::default()
        };
        let result = FrameAnimator::from_config(
            &config,
            Arc::new(FrameQueue::new()),
            Arc::new(ManualClock::new()),
        );
        assert!(matches!(result, Err(AnimatorError::InvalidDuration(_))));
    }

    #[test]
    fn test_drop_cancels_pending_frame() {
        let (queue, _clock, animator) = setup(100);
        animator.start_animation();
        assert_eq!(queue.pending_count(), 1);

        drop(animator);
        assert!(queue.is_idle());
        assert_eq!(queue.run_frame(), 0);
    }
}
