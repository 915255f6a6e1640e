use std::{
    net::IpAddr,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use async_trait::async_trait;
use pingthing_types::{
    probe::{Destination, ProbeFailure, ProbeOutcome},
    PingError, Result,
};
use tokio::{
    process::Command,
    task::{JoinHandle, JoinSet},
    time::{interval, timeout, MissedTickBehavior},
};
use tracing::{debug, info};

use crate::{ensure_valid_periods, resolve_host, ProbeSink, Prober, ProberFactory};

const DEFAULT_PING: &str = "ping";
/// Extra time granted to the child process beyond its own reply timeout.
const PROCESS_GRACE: Duration = Duration::from_secs(1);

/// Builds probers that run the platform `ping` binary once per interval.
#[derive(Debug, Clone)]
pub struct SystemPing {
    binary: PathBuf,
}

impl Default for SystemPing {
    fn default() -> Self {
        Self::new(DEFAULT_PING)
    }
}

impl SystemPing {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl ProberFactory for SystemPing {
    async fn create(
        &self,
        target: &str,
        interval: Duration,
        timeout: Duration,
    ) -> Result<Box<dyn Prober>> {
        ensure_valid_periods(interval, timeout)?;
        let destination = resolve_host(target, timeout).await?;
        info!(
            "Resolved {} to {}, interval {:?}, timeout {:?}",
            destination.host, destination.ip, interval, timeout
        );
        Ok(Box::new(SystemPinger {
            destination,
            interval,
            timeout,
            binary: self.binary.clone(),
            task: None,
        }))
    }
}

pub struct SystemPinger {
    destination: Destination,
    interval: Duration,
    timeout: Duration,
    binary: PathBuf,
    task: Option<JoinHandle<()>>,
}

#[async_trait]
impl Prober for SystemPinger {
    fn destination(&self) -> &Destination {
        &self.destination
    }

    async fn start(&mut self, sink: ProbeSink) -> Result<()> {
        if self.task.is_some() {
            return Err(PingError::Start("prober already started".into()));
        }
        let binary = locate_binary(&self.binary).ok_or_else(|| {
            PingError::Start(format!("{} not found on PATH", self.binary.display()))
        })?;

        let ip = self.destination.ip;
        let period = self.interval;
        let reply_timeout = self.timeout;
        self.task = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // probes overlap when the timeout exceeds the interval; dropping
            // the set aborts whatever is still in flight
            let mut in_flight = JoinSet::new();
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let binary = binary.clone();
                        in_flight.spawn(async move { ping_once(&binary, ip, reply_timeout).await });
                    }
                    Some(done) = in_flight.join_next() => {
                        if let Ok(outcome) = done {
                            sink.deliver(outcome);
                        }
                    }
                }
            }
        }));
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            // wait for the abort so no outcome is delivered after stop returns
            let _ = task.await;
            debug!("Stopped pinging {}", self.destination.ip);
        }
    }
}

impl Drop for SystemPinger {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn ping_once(binary: &Path, ip: IpAddr, reply_timeout: Duration) -> ProbeOutcome {
    let mut command = Command::new(binary);
    command
        .args(ping_args(ip, reply_timeout))
        .stdin(Stdio::null())
        .kill_on_drop(true);

    let output = match timeout(reply_timeout + PROCESS_GRACE, command.output()).await {
        Err(_) => return ProbeOutcome::Failure(ProbeFailure::Timeout),
        Ok(Err(err)) => {
            return ProbeOutcome::Failure(ProbeFailure::Other(format!(
                "failed to run {}: {err}",
                binary.display()
            )))
        }
        Ok(Ok(output)) => output,
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    if output.status.success() {
        if let Some(ms) = parse_round_trip_ms(&stdout) {
            return reply_within(ms, reply_timeout);
        }
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let text = format!("{stdout}\n{stderr}");
    ProbeOutcome::Failure(classify_failure(output.status.code(), &text))
}

/// Late replies count as timeouts; `ping` itself only honours whole seconds
/// on some platforms.
fn reply_within(ms: f64, reply_timeout: Duration) -> ProbeOutcome {
    if ms > reply_timeout.as_secs_f64() * 1000.0 {
        ProbeOutcome::Failure(ProbeFailure::Timeout)
    } else {
        ProbeOutcome::Reply {
            round_trip_secs: ms / 1000.0,
        }
    }
}

#[cfg(target_os = "windows")]
fn ping_args(ip: IpAddr, reply_timeout: Duration) -> Vec<String> {
    vec![
        "-n".into(),
        "1".into(),
        "-w".into(),
        reply_timeout.as_millis().max(1).to_string(),
        ip.to_string(),
    ]
}

#[cfg(target_os = "macos")]
fn ping_args(ip: IpAddr, reply_timeout: Duration) -> Vec<String> {
    vec![
        "-n".into(),
        "-c".into(),
        "1".into(),
        "-W".into(),
        reply_timeout.as_millis().max(1).to_string(),
        ip.to_string(),
    ]
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn ping_args(ip: IpAddr, reply_timeout: Duration) -> Vec<String> {
    let secs = reply_timeout.as_secs_f64().ceil().max(1.0) as u64;
    vec![
        "-n".into(),
        "-c".into(),
        "1".into(),
        "-W".into(),
        secs.to_string(),
        ip.to_string(),
    ]
}

/// Extracts the reply time from `time=12.3 ms`, `time=12ms` or `time<1ms`.
pub(crate) fn parse_round_trip_ms(output: &str) -> Option<f64> {
    let start = output
        .find("time=")
        .or_else(|| output.find("time<"))?
        + "time=".len();
    let digits: String = output[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    digits.parse().ok()
}

pub(crate) fn classify_failure(code: Option<i32>, output: &str) -> ProbeFailure {
    let lower = output.to_ascii_lowercase();
    const RESOLVER_MARKERS: [&str; 5] = [
        "unknown host",
        "name or service not known",
        "cannot resolve",
        "could not find host",
        "temporary failure in name resolution",
    ];
    if RESOLVER_MARKERS.iter().any(|marker| lower.contains(marker)) {
        return ProbeFailure::Dns(output.trim().to_string());
    }
    let lost = lower.contains("100% packet loss")
        || lower.contains("100.0% packet loss")
        || lower.contains("request timed out");
    if lost || code == Some(1) {
        return ProbeFailure::Timeout;
    }
    let detail = output.trim();
    if detail.is_empty() {
        ProbeFailure::Other(format!("ping exited with status {code:?}"))
    } else {
        ProbeFailure::Other(detail.to_string())
    }
}

fn locate_binary(binary: &Path) -> Option<PathBuf> {
    if binary.components().count() > 1 {
        return binary.is_file().then(|| binary.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}
