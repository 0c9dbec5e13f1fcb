//! Terminal progress bar demo
//!
//! Each bar is an independent component with its own callback. A presenter
//! callback, registered last, prints the whole row once per frame. Because
//! callbacks run in registration order, the presenter always sees every bar
//! updated for the current frame.

use anyhow::Result;
use lockstep_animation::{FrameAnimator, FrameThread, SystemClock};
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

use crate::config::LockstepConfig;

/// Render one bar at `coefficient` of `width` cells
pub fn render_bar(coefficient: f32, width: usize) -> String {
    let filled = ((coefficient.clamp(0.0, 1.0) * width as f32).round() as usize).min(width);
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}

/// Per-run statistics
#[derive(Debug)]
pub struct RunSummary {
    pub run: u32,
    pub frames: u64,
    pub elapsed: Duration,
}

/// Animate `config.demo.bars` bars together, `config.demo.repeat` times
pub fn run(config: &LockstepConfig) -> Result<Vec<RunSummary>> {
    let frames = FrameThread::spawn(config.animator.target_fps)?;
    let animator = FrameAnimator::from_config(
        &config.animator,
        frames.scheduler(),
        Arc::new(SystemClock::new()),
    )?;

    let width = config.demo.width;
    let row = Arc::new(Mutex::new(vec![String::new(); config.demo.bars]));

    for index in 0..config.demo.bars {
        let row = Arc::clone(&row);
        animator.register_callback(move |t| {
            if let Ok(mut row) = row.lock() {
                row[index] = render_bar(t, width);
            }
        });
    }

    let frame_count = Arc::new(AtomicU64::new(0));
    {
        let row = Arc::clone(&row);
        let frame_count = Arc::clone(&frame_count);
        animator.register_callback(move |t| {
            frame_count.fetch_add(1, Ordering::Relaxed);
            if let Ok(row) = row.lock() {
                let mut stdout = io::stdout().lock();
                let _ = write!(stdout, "\r{} {:>5.1}%", row.join(" "), t * 100.0);
                let _ = stdout.flush();
            }
        });
    }

    info!(
        "Animating {} bars over {:?} at {} fps",
        config.demo.bars,
        animator.duration(),
        frames.target_fps()
    );

    let poll = Duration::from_micros(1_000_000 / u64::from(frames.target_fps()));
    let mut summaries = Vec::with_capacity(config.demo.repeat as usize);

    for run in 1..=config.demo.repeat {
        frame_count.store(0, Ordering::Relaxed);
        let started = Instant::now();

        animator.start_animation();
        while animator.is_running() {
            if !frames.is_running() {
                anyhow::bail!("Frame thread stopped during run {}", run);
            }
            thread::sleep(poll);
        }
        println!();

        let summary = RunSummary {
            run,
            frames: frame_count.load(Ordering::Relaxed),
            elapsed: started.elapsed(),
        };
        info!(
            "Run {} finished: {} frames in {:?}",
            summary.run, summary.frames, summary.elapsed
        );
        summaries.push(summary);
    }

    Ok(summaries)
}
