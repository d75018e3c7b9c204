//! Periodic invocation of the pipeline engine
//!
//! Cycles run back to back on a tokio interval; a slow cycle delays the next
//! tick instead of overlapping it.

use super::engine::PipelineEngine;
use crate::error::Result;
use std::future::Future;
use std::sync::Arc;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};

/// Why the scheduler stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The observation window elapsed
    WindowElapsed,
    /// Ctrl+C
    Interrupted,
}

/// Run cycles every `poll_interval` until the window elapses or Ctrl+C.
///
/// `window` of `None` runs until interrupted. A fatal cycle error stops the
/// scheduler and is returned.
pub async fn run_scheduler(
    engine: Arc<PipelineEngine>,
    poll_interval: Duration,
    window: Option<Duration>,
) -> Result<StopReason> {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("⚠️  Ctrl+C handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };
    run_scheduler_until(engine, poll_interval, window, ctrl_c).await
}

/// Same as [`run_scheduler`], stopping when `shutdown` resolves.
///
/// The shutdown future is polled for the whole run, including while a cycle
/// is in flight; an interrupted cycle is dropped at its current await point.
pub async fn run_scheduler_until(
    engine: Arc<PipelineEngine>,
    poll_interval: Duration,
    window: Option<Duration>,
    shutdown: impl Future<Output = ()>,
) -> Result<StopReason> {
    match window {
        Some(w) => log::info!(
            "⏰ Starting scheduler (interval: {}s, window: {} min)",
            poll_interval.as_secs(),
            w.as_secs() / 60
        ),
        None => log::info!(
            "⏰ Starting scheduler (interval: {}s, until Ctrl+C)",
            poll_interval.as_secs()
        ),
    }

    let deadline = window.map(|w| Instant::now() + w);
    let mut timer = interval(poll_interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut cycles = 0u64;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = timer.tick() => {}
            _ = &mut shutdown => {
                log::info!("🛑 Shutdown requested after {} cycles", cycles);
                return Ok(StopReason::Interrupted);
            }
        }

        if deadline.is_some_and(|d| Instant::now() >= d) {
            log::info!("🏁 Observation window elapsed after {} cycles", cycles);
            return Ok(StopReason::WindowElapsed);
        }

        cycles += 1;
        log::debug!("🔄 Cycle {}", cycles);
        tokio::select! {
            result = engine.run_cycle() => {
                result?;
            }
            _ = &mut shutdown => {
                log::info!("🛑 Shutdown requested during cycle {}", cycles);
                return Ok(StopReason::Interrupted);
            }
        }
    }
}
