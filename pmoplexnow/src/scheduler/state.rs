//! State owned by the poll worker.

use crate::error::Result;
use crate::filter::FilterConfig;
use crate::model::SessionUpdate;
use crate::transport::TransportResponse;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, Interval, Sleep};

/// Lifecycle of the poller as seen from outside
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// Spawned, first tick not reached yet
    #[default]
    Idle,
    /// A request is in flight
    Polling,
    /// The last attempt failed, the next one is pending
    WaitingRetry,
    /// Between two scheduled ticks
    WaitingInterval,
    Suspended,
    Stopped,
}

/// Snapshot published on the status channel after every worker event
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PollerStatus {
    pub state: SchedulerState,
    /// Attempt of the running cycle, 0 when no cycle runs
    pub attempt: u32,
    pub generation: u64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_publication: Option<SessionUpdate>,
}

/// One attempt sequence, from the tick that opened it to its publication
#[derive(Debug, Clone)]
pub(crate) struct PollCycle {
    pub generation: u64,
    pub attempt: u32,
    /// Filter snapshot taken when the cycle opened
    pub filter: Arc<FilterConfig>,
}

pub(crate) type PendingResponse = BoxFuture<'static, Result<TransportResponse>>;

/// Timers, in-flight request and last data of one running poller.
///
/// Only the worker task touches this. Dropping `in_flight` cancels the
/// request; dropping `retry` or `ticker` cancels the timer.
#[derive(Default)]
pub(crate) struct PollState {
    pub ticker: Option<Interval>,
    pub retry: Option<Pin<Box<Sleep>>>,
    pub in_flight: Option<PendingResponse>,
    pub cycle: Option<PollCycle>,
    /// Bumped on every suspension; publications from older generations are
    /// dropped
    pub generation: u64,
    pub suspended: bool,
    pub stopped: bool,
    pub last_success: Option<Instant>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_published: Option<SessionUpdate>,
}

impl PollState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SchedulerState {
        if self.stopped {
            SchedulerState::Stopped
        } else if self.suspended {
            SchedulerState::Suspended
        } else if self.in_flight.is_some() {
            SchedulerState::Polling
        } else if self.retry.is_some() {
            SchedulerState::WaitingRetry
        } else if self.ticker.is_some() && self.last_published.is_some() {
            SchedulerState::WaitingInterval
        } else {
            SchedulerState::Idle
        }
    }

    pub fn status(&self) -> PollerStatus {
        PollerStatus {
            state: self.state(),
            attempt: self.cycle.as_ref().map_or(0, |cycle| cycle.attempt),
            generation: self.generation,
            last_success_at: self.last_success_at,
            last_publication: self.last_published.clone(),
        }
    }

    pub fn cycle_in_progress(&self) -> bool {
        self.cycle.is_some()
    }

    /// Open a cycle at attempt 1 for the current generation
    pub fn open_cycle(&mut self, filter: Arc<FilterConfig>) -> &PollCycle {
        self.cycle.insert(PollCycle {
            generation: self.generation,
            attempt: 1,
            filter,
        })
    }

    /// Drop the in-flight request, the pending retry and the cycle itself
    pub fn abort_cycle(&mut self) {
        self.in_flight = None;
        self.retry = None;
        self.cycle = None;
    }

    /// Cancel everything pending and start a new generation
    pub fn suspend(&mut self) {
        self.ticker = None;
        self.abort_cycle();
        self.generation += 1;
        self.suspended = true;
    }

    /// Whether `cycle` still belongs to the running generation
    pub fn is_current(&self, cycle: &PollCycle) -> bool {
        !self.suspended && !self.stopped && cycle.generation == self.generation
    }

    /// Whether a resume must poll at once rather than wait for the next tick
    pub fn needs_catch_up(&self, now: Instant, interval: Duration) -> bool {
        match self.last_success {
            None => true,
            Some(at) => now.saturating_duration_since(at) >= interval,
        }
    }

    pub fn record_success(&mut self, now: Instant) {
        self.last_success = Some(now);
        self.last_success_at = Some(Utc::now());
    }
}
