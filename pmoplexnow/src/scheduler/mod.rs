//! Poll scheduler
//!
//! [`NowPlayingPoller`] owns a background task that polls the sessions
//! endpoint on a fixed period. A failed attempt is retried after the retry
//! delay, up to [`MAX_DATA_ATTEMPTS`](crate::constants::MAX_DATA_ATTEMPTS)
//! attempts per cycle; every cycle ends in exactly one publication to the
//! consumer callback.
//!
//! ```text
//! Idle ─tick─▶ Polling ─200─▶ WaitingInterval ─tick─▶ Polling ...
//!                 │  ▲
//!         failure │  │ retry delay
//!                 ▼  │
//!             WaitingRetry ──3rd failure──▶ empty publication
//! ```
//!
//! `suspend()` cancels the ticker, the pending retry and the in-flight request.
//! `resume()` re-arms the ticker and polls at once when the last successful
//! update is at least one interval old.

mod state;
mod worker;

pub use state::{PollerStatus, SchedulerState};
pub use worker::WorkerCommand;

use crate::config::{NowPlayingConfig, PollerSettings};
use crate::error::{Error, Result};
use crate::filter::FilterConfig;
use crate::model::SessionUpdate;
use crate::transport::{HttpTransport, Transport};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::error;
use worker::PollWorker;

/// Consumer of the filtered session lists
pub type PublishCallback = Arc<dyn Fn(SessionUpdate) + Send + Sync>;

/// Handle on a running now-playing poller.
///
/// Dropping the handle stops the worker; [`NowPlayingPoller::stop`] does the
/// same and waits for it.
pub struct NowPlayingPoller {
    commands: mpsc::Sender<WorkerCommand>,
    status: watch::Receiver<PollerStatus>,
    worker: PollWorker,
}

impl NowPlayingPoller {
    /// Validate `config` and start polling over HTTP.
    ///
    /// Configuration errors are logged once and returned; no worker is
    /// spawned in that case. Must be called from within a tokio runtime.
    pub fn start(config: &NowPlayingConfig, publish: PublishCallback) -> Result<Self> {
        let settings = config.validate().map_err(|err| {
            error!("Now-playing poller not started: {}", err);
            err
        })?;
        let transport = HttpTransport::builder()
            .timeout(settings.request_timeout)
            .build()?;

        Ok(Self::spawn(settings, Arc::new(transport), publish))
    }

    /// Start polling with already validated settings and any transport
    pub fn spawn(
        settings: PollerSettings,
        transport: Arc<dyn Transport>,
        publish: PublishCallback,
    ) -> Self {
        let (worker, commands, status) = PollWorker::spawn(settings, transport, publish);
        Self {
            commands,
            status,
            worker,
        }
    }

    /// Stop the periodic timer and cancel any pending attempt
    pub async fn suspend(&self) -> Result<()> {
        self.send(WorkerCommand::Suspend).await
    }

    /// Re-arm the periodic timer, polling at once if the data is stale
    pub async fn resume(&self) -> Result<()> {
        self.send(WorkerCommand::Resume).await
    }

    /// Poll now unless a poll is already running or the poller is suspended
    pub async fn refresh(&self) -> Result<()> {
        self.send(WorkerCommand::Refresh).await
    }

    /// Replace the filter; the running cycle keeps the one it started with
    pub async fn set_filter(&self, filter: FilterConfig) -> Result<()> {
        self.send(WorkerCommand::SetFilter(filter)).await
    }

    pub fn status(&self) -> PollerStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<PollerStatus> {
        self.status.clone()
    }

    /// Shut the worker down and wait for it to finish
    pub async fn stop(self) -> Result<()> {
        // A closed channel means the worker already exited
        let _ = self.commands.send(WorkerCommand::Shutdown).await;
        self.worker.wait().await
    }

    async fn send(&self, cmd: WorkerCommand) -> Result<()> {
        self.commands
            .send(cmd)
            .await
            .map_err(|_| Error::PollerStopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::ServerAddress;
    use crate::filter::AllowDeny;
    use crate::model::{PollOutcome, SessionKind};
    use crate::transport::TransportResponse;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::{timeout, Instant};

    const EMPTY: &str = r#"<MediaContainer size="0"></MediaContainer>"#;
    const INCEPTION: &str = r#"<MediaContainer size="1">
  <Video type="movie" title="Inception" year="2010" librarySectionTitle="Movies">
    <User id="1" title="alice"/>
    <Player state="playing" local="1"/>
  </Video>
</MediaContainer>"#;
    const MOVIE_AND_TRACK: &str = r#"<MediaContainer size="2">
  <Video type="movie" title="Heat" librarySectionTitle="Movies"/>
  <Track type="track" title="So What" librarySectionTitle="Music"/>
</MediaContainer>"#;

    /// Replays scripted answers, then answers 200 with an empty container
    #[derive(Default)]
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<TransportResponse>>>,
        calls: AtomicUsize,
        latency: Option<Duration>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<TransportResponse>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                ..Default::default()
            })
        }

        fn slow(latency: Duration) -> Arc<Self> {
            Arc::new(Self {
                latency: Some(latency),
                ..Default::default()
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn fetch(&self, _url: &str) -> Result<TransportResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            next.unwrap_or_else(|| Ok(TransportResponse::new(200, EMPTY)))
        }
    }

    fn ok(body: &str) -> Result<TransportResponse> {
        Ok(TransportResponse::new(200, body))
    }

    fn status(code: u16) -> Result<TransportResponse> {
        Ok(TransportResponse::new(code, "error"))
    }

    fn settings() -> PollerSettings {
        PollerSettings {
            interval: Duration::from_secs(30),
            retry_delay: Duration::from_secs(5),
            initial_delay: Duration::ZERO,
            ..PollerSettings::new(ServerAddress::new("plex.test", "http", Some(32400), "tok"))
        }
    }

    fn collector() -> (PublishCallback, UnboundedReceiver<SessionUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let publish: PublishCallback = Arc::new(move |update| {
            let _ = tx.send(update);
        });
        (publish, rx)
    }

    async fn wait_for_state(poller: &NowPlayingPoller, state: SchedulerState) {
        let mut rx = poller.subscribe_status();
        rx.wait_for(|status| status.state == state).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success_then_publishes_once() {
        let transport = ScriptedTransport::new(vec![status(500), status(503), ok(INCEPTION)]);
        let (publish, mut updates) = collector();
        let start = Instant::now();
        let poller = NowPlayingPoller::spawn(settings(), transport.clone(), publish);

        let update = updates.recv().await.unwrap();
        assert_eq!(update.outcome, PollOutcome::Updated);
        assert_eq!(update.attempts, 3);
        assert_eq!(update.len(), 1);
        assert_eq!(update.sessions[0].title, "Inception");
        assert_eq!(update.sessions[0].year, Some(2010));
        assert_eq!(start.elapsed(), Duration::from_secs(10));

        // Nothing else before the next periodic tick
        assert!(timeout(Duration::from_secs(15), updates.recv()).await.is_err());
        assert_eq!(transport.calls(), 3);

        let status = poller.status();
        assert!(status.last_success_at.is_some());
        assert_eq!(status.last_publication, Some(update));

        poller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_publish_empty_and_keep_ticking() {
        let transport = ScriptedTransport::new(vec![
            Err(Error::transport("connection refused")),
            status(500),
            status(502),
        ]);
        let (publish, mut updates) = collector();
        let start = Instant::now();
        let poller = NowPlayingPoller::spawn(settings(), transport.clone(), publish);

        let update = updates.recv().await.unwrap();
        assert_eq!(update.outcome, PollOutcome::RetriesExhausted);
        assert!(update.is_empty());
        assert_eq!(update.attempts, 3);
        assert_eq!(transport.calls(), 3);
        assert!(poller.status().last_success_at.is_none());

        let update = updates.recv().await.unwrap();
        assert_eq!(update.outcome, PollOutcome::Updated);
        assert_eq!(update.attempts, 1);
        assert!(start.elapsed() >= Duration::from_secs(30));
        assert_eq!(transport.calls(), 4);

        poller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_suspend_during_retry_publishes_nothing_until_resume() {
        let transport = ScriptedTransport::new(vec![status(500), ok(INCEPTION)]);
        let (publish, mut updates) = collector();
        let poller = NowPlayingPoller::spawn(settings(), transport.clone(), publish);

        wait_for_state(&poller, SchedulerState::WaitingRetry).await;
        poller.suspend().await.unwrap();
        wait_for_state(&poller, SchedulerState::Suspended).await;

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(updates.try_recv().is_err());
        assert_eq!(transport.calls(), 1);
        assert_eq!(poller.status().generation, 1);

        poller.resume().await.unwrap();
        let update = updates.recv().await.unwrap();
        assert_eq!(update.attempts, 1);
        assert_eq!(update.sessions[0].title, "Inception");
        assert_eq!(transport.calls(), 2);

        poller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_with_fresh_data_waits_for_next_tick() {
        let transport = ScriptedTransport::new(vec![]);
        let (publish, mut updates) = collector();
        let poller = NowPlayingPoller::spawn(settings(), transport.clone(), publish);

        updates.recv().await.unwrap();
        poller.suspend().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        let resumed_at = Instant::now();
        poller.resume().await.unwrap();
        wait_for_state(&poller, SchedulerState::WaitingInterval).await;
        assert!(timeout(Duration::from_secs(25), updates.recv()).await.is_err());

        updates.recv().await.unwrap();
        assert!(resumed_at.elapsed() >= Duration::from_secs(30));
        assert_eq!(transport.calls(), 2);

        poller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_with_stale_data_polls_at_once() {
        let transport = ScriptedTransport::new(vec![ok(EMPTY), ok(INCEPTION)]);
        let (publish, mut updates) = collector();
        let poller = NowPlayingPoller::spawn(settings(), transport.clone(), publish);

        assert!(updates.recv().await.unwrap().is_empty());
        poller.suspend().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;

        let resumed_at = Instant::now();
        poller.resume().await.unwrap();
        let update = updates.recv().await.unwrap();
        assert_eq!(resumed_at.elapsed(), Duration::ZERO);
        assert_eq!(update.attempts, 1);
        assert_eq!(update.sessions[0].title, "Inception");
        assert_eq!(transport.calls(), 2);

        poller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_interval_survives_suspend_and_resume() {
        let config = NowPlayingConfig {
            update_interval_secs: 1e19,
            ..NowPlayingConfig::new("plex.test", "tok")
        };
        let transport = ScriptedTransport::new(vec![]);
        let (publish, mut updates) = collector();
        let poller = NowPlayingPoller::spawn(config.validate().unwrap(), transport.clone(), publish);

        updates.recv().await.unwrap();
        poller.suspend().await.unwrap();
        poller.resume().await.unwrap();
        wait_for_state(&poller, SchedulerState::WaitingInterval).await;

        poller.refresh().await.unwrap();
        updates.recv().await.unwrap();
        assert_eq!(transport.calls(), 2);
        poller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_raw_settings_do_not_kill_worker() {
        let transport = ScriptedTransport::new(vec![]);
        let (publish, mut updates) = collector();
        let start = Instant::now();
        let poller = NowPlayingPoller::spawn(
            PollerSettings {
                interval: Duration::ZERO,
                initial_delay: Duration::MAX,
                retry_delay: Duration::MAX,
                ..settings()
            },
            transport.clone(),
            publish,
        );

        // First tick is a year away; refresh still works
        poller.refresh().await.unwrap();
        updates.recv().await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));

        poller.suspend().await.unwrap();
        poller.resume().await.unwrap();
        let update = updates.recv().await.unwrap();
        assert_eq!(update.attempts, 1);

        // A zero interval runs at the minimum period
        updates.recv().await.unwrap();
        assert!(transport.calls() >= 3);
        poller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_during_slow_request_is_skipped() {
        let transport = ScriptedTransport::slow(Duration::from_secs(45));
        let (publish, mut updates) = collector();
        let start = Instant::now();
        let poller = NowPlayingPoller::spawn(settings(), transport.clone(), publish);

        updates.recv().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(45));

        // The tick at 30s was dropped, the next cycle opens at 60s
        updates.recv().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(105));
        assert_eq!(transport.calls(), 2);

        poller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_delay_postpones_first_poll() {
        let transport = ScriptedTransport::new(vec![]);
        let (publish, mut updates) = collector();
        let start = Instant::now();
        let poller = NowPlayingPoller::spawn(
            PollerSettings {
                initial_delay: Duration::from_secs(12),
                ..settings()
            },
            transport.clone(),
            publish,
        );

        assert_eq!(poller.status().state, SchedulerState::Idle);
        updates.recv().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(12));

        updates.recv().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(42));

        poller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_polls_now_unless_suspended() {
        let transport = ScriptedTransport::new(vec![]);
        let (publish, mut updates) = collector();
        let start = Instant::now();
        let poller = NowPlayingPoller::spawn(settings(), transport.clone(), publish);

        updates.recv().await.unwrap();
        poller.refresh().await.unwrap();
        updates.recv().await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(transport.calls(), 2);

        poller.suspend().await.unwrap();
        poller.refresh().await.unwrap();
        wait_for_state(&poller, SchedulerState::Suspended).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(updates.try_recv().is_err());
        assert_eq!(transport.calls(), 2);

        poller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_filter_applies_to_next_cycle() {
        let transport = ScriptedTransport::new(vec![ok(MOVIE_AND_TRACK), ok(MOVIE_AND_TRACK)]);
        let (publish, mut updates) = collector();
        let poller = NowPlayingPoller::spawn(settings(), transport.clone(), publish);

        assert_eq!(updates.recv().await.unwrap().len(), 2);

        poller
            .set_filter(FilterConfig {
                kinds: AllowDeny::deny([SessionKind::Track]),
                ..Default::default()
            })
            .await
            .unwrap();
        poller.refresh().await.unwrap();

        let update = updates.recv().await.unwrap();
        assert_eq!(update.len(), 1);
        assert_eq!(update.sessions[0].title, "Heat");

        poller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unparsable_body_is_published_without_retry() {
        let transport = ScriptedTransport::new(vec![ok("<html>maintenance</html>")]);
        let (publish, mut updates) = collector();
        let poller = NowPlayingPoller::spawn(settings(), transport.clone(), publish);

        let update = updates.recv().await.unwrap();
        assert_eq!(update.outcome, PollOutcome::Unparsable);
        assert!(update.is_empty());
        assert_eq!(update.attempts, 1);
        assert_eq!(transport.calls(), 1);

        poller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_reports_stopped_and_rejects_commands() {
        let transport = ScriptedTransport::new(vec![]);
        let (publish, mut updates) = collector();
        let poller = NowPlayingPoller::spawn(settings(), transport, publish);
        let status = poller.subscribe_status();

        updates.recv().await.unwrap();
        let commands = poller.commands.clone();
        poller.stop().await.unwrap();

        assert_eq!(status.borrow().state, SchedulerState::Stopped);
        assert!(commands.send(WorkerCommand::Refresh).await.is_err());
    }

    #[tokio::test]
    async fn test_start_rejects_missing_token() {
        let (publish, _updates) = collector();
        let config = NowPlayingConfig {
            server_url: Some("plex.lan".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            NowPlayingPoller::start(&config, publish),
            Err(Error::Config(_))
        ));
    }
}
