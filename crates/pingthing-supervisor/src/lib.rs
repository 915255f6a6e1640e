//! Probe supervisor owning the lifecycle of the active probing session.
//!
//! All state lives on one actor task. Handles, prober callbacks, network
//! events and retry timers only ever send commands to it, so session state
//! and the response history are never mutated concurrently.

use pingthing_display::DisplaySink;
use pingthing_history::ResponseHistory;
use pingthing_monitor::NetworkMonitor;
use pingthing_ops::Logger;
use pingthing_prober::{ProbeSink, Prober, ProberFactory};
use pingthing_types::{
    config::{SessionConfig, SupervisorConfig, DEFAULT_HISTORY_SIZE},
    events::{AvailabilityChanged, DisplayUpdate},
    probe::{Destination, ProbeFailure, ProbeOutcome},
    sample::Sample,
    state::SupervisorState,
    PingError, Result,
};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::sleep,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

enum Command {
    Configure(SessionConfig),
    Availability(AvailabilityChanged),
    Probe { session: Uuid, outcome: ProbeOutcome },
    RetryFired { generation: u64 },
    Stop,
    Snapshot(oneshot::Sender<SupervisorSnapshot>),
}

/// Point-in-time view of the supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorSnapshot {
    pub state: SupervisorState,
    pub config: Option<SessionConfig>,
    pub destination: Option<Destination>,
    pub samples: Vec<Sample>,
    pub average_ms: Option<f64>,
    pub prober_live: bool,
    pub retry_pending: bool,
}

/// Clonable front end of the supervisor task. The task exits, tearing down
/// its prober, once every handle is dropped.
#[derive(Clone)]
pub struct SupervisorHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl SupervisorHandle {
    /// Replaces the running session, if any, and starts one for `config`.
    pub fn configure(&self, config: SessionConfig) -> Result<()> {
        self.send(Command::Configure(config))
    }

    pub fn stop(&self) -> Result<()> {
        self.send(Command::Stop)
    }

    pub async fn snapshot(&self) -> Result<SupervisorSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot(reply))?;
        rx.await
            .map_err(|_| supervisor_error("supervisor dropped snapshot request"))
    }

    fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| supervisor_error("supervisor task has exited"))
    }
}

struct Session {
    id: Uuid,
    prober: Box<dyn Prober>,
}

struct PendingRetry {
    generation: u64,
    timer: JoinHandle<()>,
}

pub struct ProbeSupervisor<F, D>
where
    F: ProberFactory,
    D: DisplaySink,
{
    policy: SupervisorConfig,
    factory: F,
    display: D,
    monitor: NetworkMonitor,
    logger: Logger,
    commands: mpsc::WeakUnboundedSender<Command>,
    state: SupervisorState,
    config: Option<SessionConfig>,
    history: ResponseHistory,
    session: Option<Session>,
    retry: Option<PendingRetry>,
    generation: u64,
}

impl<F, D> ProbeSupervisor<F, D>
where
    F: ProberFactory,
    D: DisplaySink,
{
    /// Starts the supervisor task in `Idle`. Network events from `monitor`
    /// are forwarded to it for as long as it runs.
    pub fn spawn(
        policy: SupervisorConfig,
        factory: F,
        display: D,
        monitor: NetworkMonitor,
        logger: Logger,
    ) -> (SupervisorHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let weak = tx.downgrade();

        let listener = weak.clone();
        monitor.on_availability_changed(move |event| {
            if let Some(tx) = listener.upgrade() {
                let _ = tx.send(Command::Availability(event));
            }
        });

        let supervisor = Self {
            policy,
            factory,
            display,
            monitor,
            logger,
            commands: weak,
            state: SupervisorState::Idle,
            config: None,
            history: ResponseHistory::new(DEFAULT_HISTORY_SIZE),
            session: None,
            retry: None,
            generation: 0,
        };
        let task = tokio::spawn(supervisor.run(rx));
        (SupervisorHandle { tx }, task)
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Configure(config) => self.configure(config).await,
                Command::Availability(event) => self.on_availability(event).await,
                Command::Probe { session, outcome } => self.on_probe(session, outcome).await,
                Command::RetryFired { generation } => self.on_retry(generation).await,
                Command::Stop => self.stop().await,
                Command::Snapshot(reply) => {
                    let _ = reply.send(self.snapshot());
                }
            }
        }
        self.cancel_retry();
        self.teardown().await;
        info!("Supervisor shut down");
    }

    async fn configure(&mut self, config: SessionConfig) {
        self.cancel_retry();
        self.teardown().await;
        self.note(format!(
            "Ping configuration - target: {}, interval: {}, timeout: {}",
            config.target, config.interval_secs, config.timeout_secs
        ));
        if self.history.capacity() != config.history_size {
            self.history.set_capacity(config.history_size);
        }
        self.config = Some(config);
        self.startup().await;
    }

    /// Re-runs configure with the current session config.
    async fn restart(&mut self) {
        if let Some(config) = self.config.clone() {
            self.configure(config).await;
        }
    }

    async fn startup(&mut self) {
        let Some(config) = self.config.clone() else {
            return;
        };

        if !self.monitor.currently_active() {
            self.warn_note(format!(
                "Network not active, retrying in {:?}",
                self.policy.retry_delay()
            ));
            self.transition(SupervisorState::WaitingForNetwork);
            self.schedule_retry();
            self.display
                .publish(DisplayUpdate::waiting(&config.target, "waiting for network"));
            return;
        }

        let mut prober = match self
            .factory
            .create(&config.target, config.interval(), config.timeout())
            .await
        {
            Ok(prober) => prober,
            Err(err) => {
                let cause = if err.is_config_error() {
                    format!("Cannot use target {}: {err}", config.target)
                } else {
                    format!("Failed to create prober for {}: {err}", config.target)
                };
                self.fault(
                    cause,
                    DisplayUpdate::error(&config.target, None, format!("Error: {err}")),
                    true,
                );
                return;
            }
        };

        let id = Uuid::new_v4();
        let destination = prober.destination().clone();
        if let Err(err) = prober.start(self.sink_for(id)).await {
            prober.stop().await;
            let retry = self.policy.retry_on_start_failure;
            self.fault(
                format!("Failed to start pinging {}: {err}", destination.host),
                DisplayUpdate::error(
                    &destination.host,
                    Some(destination.ip),
                    format!("{} ({err})", destination.host),
                ),
                retry,
            );
            return;
        }

        self.session = Some(Session { id, prober });
        self.transition(SupervisorState::Active);
        self.note(format!("Pinging {} ({})", destination.host, destination.ip));
        self.display.publish(DisplayUpdate::pinging(&destination));
    }

    async fn on_probe(&mut self, session: Uuid, outcome: ProbeOutcome) {
        let destination = match &self.session {
            Some(current) if current.id == session && self.state == SupervisorState::Active => {
                current.prober.destination().clone()
            }
            _ => {
                debug!("Ignoring result from stale session {session}");
                return;
            }
        };

        match outcome {
            ProbeOutcome::Reply { round_trip_secs } => {
                self.history.record(Sample::reply(round_trip_secs));
                let update = DisplayUpdate::success(
                    &destination,
                    round_trip_secs * 1000.0,
                    self.history.average_ms(),
                );
                self.display.publish(update);
            }
            ProbeOutcome::Failure(ProbeFailure::Timeout) => {
                self.note(format!("Ping timeout for {}", destination.host));
                self.history.record(Sample::timeout());
                self.display.publish(DisplayUpdate::timeout(
                    &destination,
                    self.history.average_ms(),
                ));
            }
            ProbeOutcome::Failure(ProbeFailure::Dns(detail)) => {
                self.teardown().await;
                self.fault(
                    format!("Host not found, or DNS lookup failure: {detail}"),
                    DisplayUpdate::error(
                        &destination.host,
                        Some(destination.ip),
                        format!("DNS error ({detail})"),
                    ),
                    true,
                );
            }
            ProbeOutcome::Failure(ProbeFailure::Other(detail)) => {
                self.teardown().await;
                let err = PingError::Probe(detail);
                self.fault(
                    format!("Probe failed for {}: {err}", destination.host),
                    DisplayUpdate::error(
                        &destination.host,
                        Some(destination.ip),
                        format!("Error: {err}"),
                    ),
                    true,
                );
            }
        }
    }

    async fn on_availability(&mut self, event: AvailabilityChanged) {
        self.note(format!(
            "Network status changed: active = {} ({:?})",
            event.is_active, event.availability.interface_kind
        ));
        match (event.is_active, self.state) {
            (false, SupervisorState::Active | SupervisorState::Faulted) => {
                self.cancel_retry();
                self.teardown().await;
                self.transition(SupervisorState::WaitingForNetwork);
                let target = self.target();
                self.display
                    .publish(DisplayUpdate::waiting(target, "waiting for network"));
            }
            (true, SupervisorState::WaitingForNetwork | SupervisorState::Faulted) => {
                self.restart().await;
            }
            _ => {}
        }
    }

    async fn on_retry(&mut self, generation: u64) {
        match &self.retry {
            Some(pending) if pending.generation == generation => {
                self.retry = None;
                debug!("Retry {generation} fired");
                self.restart().await;
            }
            _ => debug!("Ignoring cancelled retry {generation}"),
        }
    }

    async fn stop(&mut self) {
        self.cancel_retry();
        self.teardown().await;
        self.transition(SupervisorState::Idle);
        let target = self.target();
        self.config = None;
        self.note("Supervisor stopped");
        self.display.publish(DisplayUpdate::waiting(target, "stopped"));
    }

    fn snapshot(&self) -> SupervisorSnapshot {
        SupervisorSnapshot {
            state: self.state,
            config: self.config.clone(),
            destination: self
                .session
                .as_ref()
                .map(|session| session.prober.destination().clone()),
            samples: self.history.to_vec(),
            average_ms: self.history.average_ms(),
            prober_live: self.session.is_some(),
            retry_pending: self.retry.is_some(),
        }
    }

    fn sink_for(&self, session: Uuid) -> ProbeSink {
        let commands = self.commands.clone();
        ProbeSink::new(move |outcome| {
            if let Some(tx) = commands.upgrade() {
                let _ = tx.send(Command::Probe { session, outcome });
            }
        })
    }

    /// Replaces any pending retry; at most one is ever in flight.
    fn schedule_retry(&mut self) {
        self.cancel_retry();
        self.generation += 1;
        let generation = self.generation;
        let delay = self.policy.retry_delay();
        let commands = self.commands.clone();
        let timer = tokio::spawn(async move {
            sleep(delay).await;
            if let Some(tx) = commands.upgrade() {
                let _ = tx.send(Command::RetryFired { generation });
            }
        });
        self.retry = Some(PendingRetry { generation, timer });
    }

    fn cancel_retry(&mut self) {
        if let Some(pending) = self.retry.take() {
            pending.timer.abort();
        }
    }

    async fn teardown(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.prober.stop().await;
            debug!("Stopped prober for {}", session.prober.destination().host);
        }
    }

    fn fault(&mut self, cause: String, update: DisplayUpdate, retry: bool) {
        self.warn_note(cause);
        self.transition(SupervisorState::Faulted);
        if retry {
            self.schedule_retry();
        }
        self.display.publish(update);
    }

    fn transition(&mut self, next: SupervisorState) {
        if self.state != next {
            debug!("Supervisor {} -> {}", self.state.label(), next.label());
            self.state = next;
        }
    }

    fn target(&self) -> String {
        self.config
            .as_ref()
            .map(|config| config.target.clone())
            .unwrap_or_default()
    }

    fn note(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{message}");
        self.logger.append(message);
    }

    fn warn_note(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        self.logger.append(format!("WARNING: {message}"));
    }
}

pub fn supervisor_error(message: impl Into<String>) -> PingError {
    PingError::Supervisor(message.into())
}
