//! Periodic detection.
//!
//! The scheduler waits on a [`Ticker`] and runs one cycle per tick, inline,
//! so a slow cycle delays the next tick instead of overlapping it.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::monitor::Monitor;

/// Source of scheduling ticks.
#[async_trait]
pub trait Ticker: Send {
    /// Wait for the next tick. Returns `false` when no more ticks will come.
    async fn tick(&mut self) -> bool;
}

/// Ticks on a fixed period. The first tick fires immediately.
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}

/// Ticks whenever a message arrives; ends when every sender is dropped.
pub struct ChannelTicker {
    rx: mpsc::Receiver<()>,
}

#[async_trait]
impl Ticker for ChannelTicker {
    async fn tick(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }
}

/// A ticker driven by hand, plus the sender that drives it.
pub fn channel_ticker(buffer: usize) -> (mpsc::Sender<()>, ChannelTicker) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    (tx, ChannelTicker { rx })
}

/// Runs detection cycles on every tick until cancelled.
pub struct Scheduler<T: Ticker> {
    monitor: Monitor,
    ticker: T,
    cancel: CancellationToken,
}

impl<T: Ticker + 'static> Scheduler<T> {
    pub fn new(monitor: Monitor, ticker: T, cancel: CancellationToken) -> Self {
        Self {
            monitor,
            ticker,
            cancel,
        }
    }

    /// Loop until cancelled or the ticker ends. Returns the number of cycles run.
    pub async fn run(mut self) -> usize {
        let mut cycles = 0;

        loop {
            let ticked = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => false,
                ticked = self.ticker.tick() => ticked,
            };

            if !ticked {
                break;
            }

            let report = self.monitor.run_cycle(&self.cancel).await;
            cycles += 1;
            debug!(cycle_id = %report.cycle_id, cycles, "Scheduled cycle complete");

            if report.cancelled {
                break;
            }
        }

        info!(cycles, "Scheduler stopped");
        cycles
    }

    /// Run on a background task.
    pub fn spawn(self) -> SchedulerHandle {
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(self.run());
        SchedulerHandle { cancel, handle }
    }
}

/// Handle to a spawned scheduler.
pub struct SchedulerHandle {
    cancel: CancellationToken,
    handle: JoinHandle<usize>,
}

impl SchedulerHandle {
    /// Cancel the scheduler and wait for the current cycle to wind down.
    /// Returns the number of cycles that ran.
    pub async fn shutdown(self) -> usize {
        self.cancel.cancel();
        self.handle.await.unwrap_or_default()
    }
}
