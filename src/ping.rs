//! Keepalive pings and PONG correlation.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};

/// Identifies one PING awaiting its PONG.
pub(crate) type PingId = u64;

#[derive(Debug)]
struct Pending {
    id: PingId,
    sent_at: Instant,
}

/// Background ticker. Dropping it cancels the task.
#[derive(Debug)]
struct Ticker {
    interval: Duration,
    ticks: mpsc::UnboundedReceiver<()>,
    _guard: DropGuard,
}

/// Periodic PING schedule plus the queue of PINGs that have not been answered yet.
///
/// PONGs carry no correlation data of their own, so each one resolves the oldest outstanding
/// PING. A peer may answer several PINGs with a single PONG, so for the pong timeout any PONG
/// counts for every PING sent before it.
#[derive(Debug, Default)]
pub(crate) struct PingScheduler {
    ticker: Option<Ticker>,
    outstanding: VecDeque<Pending>,
    next_id: PingId,
    pong_timeout: Option<Duration>,
    last_pong: Option<Instant>,
}

impl PingScheduler {
    pub(crate) fn new(pong_timeout: Option<Duration>) -> Self {
        Self {
            pong_timeout,
            ..Self::default()
        }
    }

    /// Tick every `interval`, starting one interval from now. Replaces any running ticker.
    pub(crate) fn start(&mut self, runtime: &Handle, interval: Duration) {
        self.stop();

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let (tx, ticks) = mpsc::unbounded_channel();

        runtime.spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    () = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        if tx.send(()).is_err() {
                            break;
                        }
                    }
                }
            }

            #[cfg(feature = "tracing")]
            tracing::trace!(?interval, "Ping ticker stopped");
        });

        self.ticker = Some(Ticker {
            interval,
            ticks,
            _guard: token.drop_guard(),
        });
    }

    pub(crate) fn stop(&mut self) {
        self.ticker = None;
    }

    #[cfg(test)]
    pub(crate) fn interval(&self) -> Option<Duration> {
        self.ticker.as_ref().map(|t| t.interval)
    }

    /// Resolves on the next tick; never resolves while disarmed.
    pub(crate) async fn tick(&mut self) {
        match self.ticker.as_mut() {
            Some(ticker) => {
                if ticker.ticks.recv().await.is_none() {
                    std::future::pending::<()>().await;
                }
            }
            None => std::future::pending().await,
        }
    }

    /// Record a PING that is about to be sent.
    pub(crate) fn register(&mut self) -> PingId {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.outstanding.push_back(Pending {
            id,
            sent_at: Instant::now(),
        });
        id
    }

    /// Match a PONG against the oldest outstanding PING.
    pub(crate) fn resolve(&mut self) -> Option<PingId> {
        self.last_pong = Some(Instant::now());
        self.outstanding.pop_front().map(|p| p.id)
    }

    #[cfg(test)]
    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    /// When the oldest PING sent after the last PONG times out, if a pong timeout is configured.
    pub(crate) fn pong_deadline(&self) -> Option<Instant> {
        let timeout = self.pong_timeout?;
        self.outstanding
            .iter()
            .find(|p| self.last_pong.is_none_or(|at| p.sent_at > at))
            .map(|p| p.sent_at + timeout)
    }

    pub(crate) fn pong_timeout(&self) -> Option<Duration> {
        self.pong_timeout
    }

    /// Stop ticking and forget every outstanding PING.
    pub(crate) fn clear(&mut self) {
        self.stop();
        self.outstanding.clear();
        self.last_pong = None;
    }
}
