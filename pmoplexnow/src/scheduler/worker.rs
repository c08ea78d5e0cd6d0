//! Background worker driving the poll cycles.
//!
//! A single task owns the [`PollState`]. It waits on the command channel, the
//! periodic ticker, the retry timer and the in-flight request at once, and
//! handles whichever fires first. Parsing, filtering and publishing happen
//! synchronously inside the task, so a cycle can never be observed half done.

use super::state::{PendingResponse, PollCycle, PollState, PollerStatus};
use super::PublishCallback;
use crate::config::PollerSettings;
use crate::constants::{MAX_DATA_ATTEMPTS, MAX_TIMER_DURATION, MIN_UPDATE_INTERVAL};
use crate::error::{Error, Result};
use crate::filter::FilterConfig;
use crate::model::{PollOutcome, Session, SessionUpdate};
use crate::parser::SessionParser;
use crate::transport::{Transport, TransportResponse};
use chrono::Utc;
use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, Interval, MissedTickBehavior, Sleep};
use tracing::{debug, error, info, warn};

/// Commands sent to the background worker.
#[derive(Debug)]
pub enum WorkerCommand {
    Suspend,
    Resume,
    Refresh,
    SetFilter(FilterConfig),
    Shutdown,
}

/// Handle to the spawned worker task.
pub(crate) struct PollWorker {
    server: String,
    join_handle: JoinHandle<()>,
}

impl PollWorker {
    pub fn spawn(
        settings: PollerSettings,
        transport: Arc<dyn Transport>,
        publish: PublishCallback,
    ) -> (
        Self,
        mpsc::Sender<WorkerCommand>,
        watch::Receiver<PollerStatus>,
    ) {
        let (tx, mut rx) = mpsc::channel(32);
        let (status_tx, status_rx) = watch::channel(PollerStatus::default());
        let server = settings.address.display_root();

        let join_handle = tokio::spawn(async move {
            let mut worker = WorkerState::new(settings, transport, publish);
            info!(
                server = %worker.server,
                interval = ?worker.settings.interval,
                initial_delay = ?worker.settings.initial_delay,
                "Starting now-playing poller"
            );
            worker.poll.ticker = Some(ticker(
                Instant::now(),
                worker.settings.initial_delay,
                worker.settings.interval,
            ));

            loop {
                let event = tokio::select! {
                    biased;

                    cmd = rx.recv() => match cmd {
                        Some(cmd) => Event::Command(cmd),
                        // Every handle is gone
                        None => break,
                    },
                    result = next_response(&mut worker.poll.in_flight) => Event::Response(result),
                    _ = retry_due(&mut worker.poll.retry) => Event::RetryDue,
                    _ = next_tick(&mut worker.poll.ticker) => Event::Tick,
                };

                worker.handle_event(event);
                status_tx.send_replace(worker.poll.status());

                if worker.poll.stopped {
                    break;
                }
            }

            if !worker.poll.stopped {
                worker.poll.suspend();
                worker.poll.stopped = true;
                status_tx.send_replace(worker.poll.status());
            }
            info!(server = %worker.server, "Now-playing poller stopped");
        });

        (
            Self {
                server,
                join_handle,
            },
            tx,
            status_rx,
        )
    }

    pub async fn wait(self) -> Result<()> {
        if let Err(err) = self.join_handle.await {
            if err.is_cancelled() {
                warn!(server = %self.server, "Poller task cancelled: {err}");
                return Ok(());
            }
            return Err(Error::Join(err));
        }
        Ok(())
    }
}

enum Event {
    Command(WorkerCommand),
    Tick,
    RetryDue,
    Response(Result<TransportResponse>),
}

struct WorkerState {
    settings: PollerSettings,
    server: String,
    url: String,
    transport: Arc<dyn Transport>,
    publish: PublishCallback,
    filter: Arc<FilterConfig>,
    poll: PollState,
}

impl WorkerState {
    fn new(
        mut settings: PollerSettings,
        transport: Arc<dyn Transport>,
        publish: PublishCallback,
    ) -> Self {
        if settings.interval < MIN_UPDATE_INTERVAL {
            warn!(
                interval = ?settings.interval,
                minimum = ?MIN_UPDATE_INTERVAL,
                "Update interval raised to minimum"
            );
            settings.interval = MIN_UPDATE_INTERVAL;
        }
        settings.interval = timer_duration("interval", settings.interval);
        settings.initial_delay = timer_duration("initial_delay", settings.initial_delay);
        settings.retry_delay = timer_duration("retry_delay", settings.retry_delay);

        let filter = Arc::new(settings.filter.clone());
        Self {
            server: settings.address.display_root(),
            url: settings.sessions_url(),
            settings,
            transport,
            publish,
            filter,
            poll: PollState::new(),
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Command(cmd) => self.handle_command(cmd),
            Event::Tick => self.on_tick(),
            Event::RetryDue => self.on_retry_due(),
            Event::Response(result) => self.on_response(result),
        }
    }

    fn handle_command(&mut self, cmd: WorkerCommand) {
        match cmd {
            WorkerCommand::Suspend => {
                if self.poll.suspended {
                    return;
                }
                self.poll.suspend();
                info!(
                    server = %self.server,
                    generation = self.poll.generation,
                    "Poller suspended"
                );
            }
            WorkerCommand::Resume => {
                if !self.poll.suspended {
                    debug!(server = %self.server, "Resume ignored, poller is running");
                    return;
                }
                self.poll.suspended = false;
                let now = Instant::now();
                self.poll.ticker = Some(ticker(now, self.settings.interval, self.settings.interval));

                let catch_up = self.poll.needs_catch_up(now, self.settings.interval);
                info!(server = %self.server, catch_up, "Poller resumed");
                if catch_up {
                    self.start_cycle();
                }
            }
            WorkerCommand::Refresh => {
                if self.poll.suspended {
                    debug!(server = %self.server, "Refresh ignored while suspended");
                } else if self.poll.cycle_in_progress() {
                    debug!(server = %self.server, "Refresh ignored, a poll is in flight");
                } else {
                    self.start_cycle();
                }
            }
            WorkerCommand::SetFilter(filter) => {
                debug!(server = %self.server, "Filter replaced");
                self.filter = Arc::new(filter);
            }
            WorkerCommand::Shutdown => {
                self.poll.suspend();
                self.poll.stopped = true;
            }
        }
    }

    fn on_tick(&mut self) {
        if self.poll.cycle_in_progress() {
            debug!(server = %self.server, "Previous poll still running, skipping tick");
            return;
        }
        self.start_cycle();
    }

    fn on_retry_due(&mut self) {
        self.poll.retry = None;
        let Some(cycle) = self.poll.cycle.as_mut() else {
            return;
        };
        cycle.attempt += 1;
        self.send_request();
    }

    fn on_response(&mut self, result: Result<TransportResponse>) {
        self.poll.in_flight = None;
        let Some(cycle) = self.poll.cycle.clone() else {
            debug!(server = %self.server, "Dropping response without a running cycle");
            return;
        };

        match result.and_then(TransportResponse::error_for_status) {
            Ok(response) => {
                let parser = SessionParser::with_user_aliases(cycle.filter.user_aliases.clone());
                match parser.try_parse(&response.body) {
                    Ok(sessions) => {
                        let sessions = cycle.filter.apply(&sessions);
                        self.poll.record_success(Instant::now());
                        self.finish_cycle(&cycle, sessions, PollOutcome::Updated);
                    }
                    Err(err) => {
                        warn!(server = %self.server, "Unparsable sessions payload: {}", err);
                        self.finish_cycle(&cycle, Vec::new(), PollOutcome::Unparsable);
                    }
                }
            }
            Err(err) => {
                warn!(
                    server = %self.server,
                    attempt = cycle.attempt,
                    "Sessions request failed: {}",
                    err
                );
                self.on_failure(&cycle);
            }
        }
    }

    fn on_failure(&mut self, cycle: &PollCycle) {
        if cycle.attempt < MAX_DATA_ATTEMPTS {
            debug!(
                server = %self.server,
                attempt = cycle.attempt,
                delay = ?self.settings.retry_delay,
                "Scheduling retry"
            );
            self.poll.retry = Some(Box::pin(sleep(self.settings.retry_delay)));
        } else {
            error!(
                server = %self.server,
                attempts = cycle.attempt,
                "Giving up on this poll, publishing an empty list"
            );
            self.finish_cycle(cycle, Vec::new(), PollOutcome::RetriesExhausted);
        }
    }

    fn start_cycle(&mut self) {
        self.poll.open_cycle(Arc::clone(&self.filter));
        self.send_request();
    }

    fn send_request(&mut self) {
        let Some(cycle) = self.poll.cycle.as_ref() else {
            return;
        };
        debug!(
            server = %self.server,
            attempt = cycle.attempt,
            generation = cycle.generation,
            "Polling sessions"
        );

        let transport = Arc::clone(&self.transport);
        let url = self.url.clone();
        self.poll.in_flight = Some(Box::pin(async move { transport.fetch(&url).await }));
    }

    fn finish_cycle(&mut self, cycle: &PollCycle, sessions: Vec<Session>, outcome: PollOutcome) {
        self.poll.cycle = None;

        if !self.poll.is_current(cycle) {
            debug!(
                server = %self.server,
                generation = cycle.generation,
                current = self.poll.generation,
                "Dropping stale publication"
            );
            return;
        }

        let update = SessionUpdate {
            sessions,
            outcome,
            attempts: cycle.attempt,
            published_at: Utc::now(),
        };
        info!(
            server = %self.server,
            sessions = update.len(),
            outcome = ?update.outcome,
            "Publishing sessions"
        );
        self.poll.last_published = Some(update.clone());
        (self.publish)(update);
    }
}

/// Periodic ticker whose first tick fires `delay` after `now`
fn ticker(now: Instant, delay: Duration, period: Duration) -> Interval {
    let start = now
        .checked_add(delay)
        .unwrap_or_else(|| now + MAX_TIMER_DURATION);
    let mut ticker = interval_at(start, period.clamp(MIN_UPDATE_INTERVAL, MAX_TIMER_DURATION));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

fn timer_duration(name: &'static str, duration: Duration) -> Duration {
    if duration > MAX_TIMER_DURATION {
        warn!(name, ?duration, max = ?MAX_TIMER_DURATION, "Timer duration clamped");
        MAX_TIMER_DURATION
    } else {
        duration
    }
}

async fn next_tick(slot: &mut Option<Interval>) {
    match slot {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending().await,
    }
}

async fn retry_due(slot: &mut Option<Pin<Box<Sleep>>>) {
    match slot {
        Some(timer) => timer.as_mut().await,
        None => pending().await,
    }
}

async fn next_response(slot: &mut Option<PendingResponse>) -> Result<TransportResponse> {
    match slot {
        Some(response) => response.await,
        None => pending().await,
    }
}
