//! Operational helpers: tracing setup and the shared debug log.

use std::{
    collections::VecDeque,
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::{DateTime, Local};
use pingthing_types::{config::OpsConfig, PingError, Result};
use tokio::sync::broadcast;
use tracing::debug;
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter};

const FANOUT_CAPACITY: usize = 256;

pub fn init_tracing(config: &OpsConfig) -> Result<()> {
    let filter = EnvFilter::try_new(config.log_level.clone())
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| PingError::Ops(format!("failed to create log filter: {err}")))?;

    tracing_fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| PingError::Ops(format!("tracing init error: {err}")))?;
    Ok(())
}

/// One timestamped line of the debug log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.message
        )
    }
}

struct LogState {
    entries: VecDeque<LogEntry>,
    max_entries: usize,
}

/// Append-only log shared by every component.
///
/// Appends, snapshots and the live fan-out all go through one lock, so
/// readers and subscribers observe entries in append order.
#[derive(Clone)]
pub struct Logger {
    state: Arc<Mutex<LogState>>,
    live: broadcast::Sender<LogEntry>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    pub fn new() -> Self {
        Self::with_limit(0)
    }

    /// Keeps at most `max_entries` lines; zero means unbounded.
    pub fn with_limit(max_entries: usize) -> Self {
        let (live, _) = broadcast::channel(FANOUT_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(LogState {
                entries: VecDeque::new(),
                max_entries,
            })),
            live,
        }
    }

    pub fn from_config(config: &OpsConfig) -> Self {
        Self::with_limit(config.max_log_entries)
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        // A panicking writer cannot leave the deque half-updated.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn append(&self, message: impl Into<String>) {
        let message = message.into();
        debug!(target: "pingthing::log", "{}", message);

        let mut state = self.lock();
        let entry = LogEntry {
            timestamp: Local::now(),
            message,
        };
        if state.max_entries > 0 && state.entries.len() == state.max_entries {
            state.entries.pop_front();
        }
        state.entries.push_back(entry.clone());
        let _ = self.live.send(entry);
    }

    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.lock().entries.iter().cloned().collect()
    }

    pub fn full_log(&self) -> String {
        self.lock()
            .entries
            .iter()
            .map(|entry| entry.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live feed of entries appended after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.live.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Barrier, thread};

    #[test]
    fn concurrent_appends_are_all_kept() {
        let logger = Logger::new();
        let threads = 8;
        let per_thread = 250;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let logger = logger.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    for n in 0..per_thread {
                        logger.append(format!("{t}:{n}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("join writer");
        }

        let entries = logger.snapshot();
        assert_eq!(entries.len(), threads * per_thread);

        // Per-writer call order survives interleaving.
        for t in 0..threads {
            let prefix = format!("{t}:");
            let seen: Vec<usize> = entries
                .iter()
                .filter_map(|e| e.message.strip_prefix(&prefix))
                .map(|n| n.parse().expect("index"))
                .collect();
            assert_eq!(seen, (0..per_thread).collect::<Vec<_>>());
        }
    }

    #[test]
    fn subscribers_see_entries_in_append_order() {
        let logger = Logger::new();
        logger.append("before");
        let mut live = logger.subscribe();
        logger.append("first");
        logger.append("second");

        assert_eq!(live.try_recv().expect("first").message, "first");
        assert_eq!(live.try_recv().expect("second").message, "second");
        assert!(live.try_recv().is_err());
        assert_eq!(logger.len(), 3);
    }

    #[test]
    fn limit_drops_oldest_entries() {
        let logger = Logger::with_limit(2);
        logger.append("a");
        logger.append("b");
        logger.append("c");
        let messages: Vec<String> = logger.snapshot().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["b", "c"]);
    }

    #[test]
    fn full_log_joins_timestamped_lines() {
        let logger = Logger::new();
        logger.append("Network is active");
        logger.append("Shutting down");
        let text = logger.full_log();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(": Network is active"));
        // yyyy-mm-dd hh:mm:ss.mmm
        assert_eq!(lines[1].find(": Shutting down"), Some(23));
    }
}
