//! Probe transport abstraction layer.

mod system;

use std::{net::IpAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use pingthing_types::{
    probe::{Destination, ProbeOutcome},
    PingError, Result,
};
use tokio::net::lookup_host;

pub use system::{SystemPing, SystemPinger};

/// Creates probers bound to one resolved destination.
#[async_trait]
pub trait ProberFactory: Send + Sync + 'static {
    /// Fails with `UnresolvedHost` or `InvalidConfig`.
    async fn create(
        &self,
        target: &str,
        interval: Duration,
        timeout: Duration,
    ) -> Result<Box<dyn Prober>>;
}

/// A probing session. Results arrive on the sink from a background context.
#[async_trait]
pub trait Prober: Send {
    fn destination(&self) -> &Destination;
    async fn start(&mut self, sink: ProbeSink) -> Result<()>;
    /// Idempotent; no result is delivered once it returns.
    async fn stop(&mut self);
}

/// Callback through which a running prober reports each probe.
#[derive(Clone)]
pub struct ProbeSink {
    deliver: Arc<dyn Fn(ProbeOutcome) + Send + Sync>,
}

impl ProbeSink {
    pub fn new<F>(deliver: F) -> Self
    where
        F: Fn(ProbeOutcome) + Send + Sync + 'static,
    {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    pub fn deliver(&self, outcome: ProbeOutcome) {
        (self.deliver)(outcome)
    }
}

/// Rejects zero or non-finite periods before a prober is built.
pub fn ensure_valid_periods(interval: Duration, timeout: Duration) -> Result<()> {
    if interval.is_zero() {
        return Err(PingError::InvalidConfig("interval must be positive".into()));
    }
    if timeout.is_zero() {
        return Err(PingError::InvalidConfig("timeout must be positive".into()));
    }
    Ok(())
}

/// Resolves `target` to one address, preferring IPv4. Literal addresses skip the lookup.
pub async fn resolve_host(target: &str, timeout: Duration) -> Result<Destination> {
    let unresolved = |reason: String| PingError::UnresolvedHost {
        host: target.to_string(),
        reason,
    };
    if target.is_empty() {
        return Err(unresolved("empty target".into()));
    }
    if let Ok(ip) = target.parse::<IpAddr>() {
        return Ok(Destination {
            host: target.to_string(),
            ip,
        });
    }

    let addrs: Vec<IpAddr> = tokio::time::timeout(timeout, lookup_host((target, 0)))
        .await
        .map_err(|_| unresolved("lookup timed out".into()))?
        .map_err(|err| unresolved(err.to_string()))?
        .map(|addr| addr.ip())
        .collect();

    let ip = addrs
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| unresolved("no addresses returned".into()))?;
    Ok(Destination {
        host: target.to_string(),
        ip,
    })
}
