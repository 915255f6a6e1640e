use std::{
    path::Path,
    time::{Duration, SystemTime},
};

use pingthing_ops::Logger;
use pingthing_supervisor::SupervisorHandle;
use pingthing_types::config::{PreferenceStore, Preferences, TomlPreferenceStore};
use tokio::{sync::watch, time::interval};
use tracing::{info, warn};

/// Applies the `--target` override on top of stored preferences.
pub fn effective(mut prefs: Preferences, target_override: Option<&str>) -> Preferences {
    if let Some(target) = target_override {
        prefs.target = target.to_string();
    }
    prefs
}

async fn modified(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}

/// Re-reads the settings file whenever it is saved and restarts the
/// supervisor when the session settings changed.
pub async fn watch_preferences(
    store: TomlPreferenceStore,
    target_override: Option<String>,
    supervisor: SupervisorHandle,
    logger: Logger,
    published: watch::Sender<Preferences>,
    period: Duration,
) {
    let mut last_modified = modified(store.path()).await;
    let mut ticker = interval(period);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let current = modified(store.path()).await;
        if current == last_modified {
            continue;
        }
        last_modified = current;

        let prefs = match store.load() {
            Ok(prefs) => effective(prefs, target_override.as_deref()),
            Err(err) => {
                warn!("Keeping previous preferences: {err}");
                logger.append(format!("WARNING: keeping previous preferences: {err}"));
                continue;
            }
        };
        let session = prefs.session_config();
        if published.borrow().session_config() != session {
            info!("Preferences changed, reconfiguring for {}", session.target);
            logger.append(format!("Preferences changed, target: {}", session.target));
            if supervisor.configure(session).is_err() {
                break;
            }
        }
        published.send_replace(prefs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pingthing_display::LocalDisplay;
    use pingthing_monitor::{NetworkMonitor, RouteProbeSource};
    use pingthing_prober::SystemPing;
    use pingthing_supervisor::ProbeSupervisor;
    use pingthing_types::config::SupervisorConfig;

    /// Rewrites the settings file and stamps a distinct mtime so every edit
    /// is seen regardless of filesystem timestamp granularity.
    fn write_settings(path: &Path, body: &str, stamp: u64) {
        std::fs::write(path, body).expect("write settings");
        let file = std::fs::OpenOptions::new()
            .write(true)
            .open(path)
            .expect("open settings");
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + stamp))
            .expect("set mtime");
    }

    fn settings(target: &str, history_size: usize, bar_width: u16) -> String {
        format!(
            "[preferences]\ntarget = \"{target}\"\nhistory_size = {history_size}\nbar_width = {bar_width}\n"
        )
    }

    fn configure_count(logger: &Logger) -> usize {
        logger
            .snapshot()
            .iter()
            .filter(|entry| entry.message.starts_with("Ping configuration"))
            .count()
    }

    #[tokio::test]
    async fn saved_settings_reconfigure_only_on_session_changes() {
        let path = std::env::temp_dir().join(format!(
            "pingthing-prefs-watch-{}.toml",
            std::process::id()
        ));
        write_settings(&path, &settings("8.8.8.8", 24, 2), 1);

        let store = TomlPreferenceStore::new(&path);
        let initial = store.load().expect("initial settings");
        let logger = Logger::new();
        // never started, so the network reads as down and no prober is built
        let monitor = NetworkMonitor::new(RouteProbeSource::from_config(&[]), Duration::from_secs(60));
        let (supervisor, _task) = ProbeSupervisor::spawn(
            SupervisorConfig {
                retry_delay_secs: 600.0,
                ..SupervisorConfig::default()
            },
            SystemPing::default(),
            LocalDisplay::new(16),
            monitor,
            logger.clone(),
        );
        let (published, mut prefs_rx) = watch::channel(initial);
        let watcher = tokio::spawn(watch_preferences(
            store,
            None,
            supervisor.clone(),
            logger.clone(),
            published,
            Duration::from_millis(20),
        ));
        let wait = Duration::from_secs(5);
        // let the watcher take its first mtime reading
        tokio::time::sleep(Duration::from_millis(100)).await;

        write_settings(&path, &settings("1.1.1.1", 24, 2), 2);
        tokio::time::timeout(wait, prefs_rx.changed())
            .await
            .expect("target edit published")
            .expect("watcher alive");
        let snap = supervisor.snapshot().await.expect("snapshot");
        assert_eq!(snap.config.expect("configured").target, "1.1.1.1");
        assert_eq!(configure_count(&logger), 1);

        write_settings(&path, &settings("1.1.1.1", 32, 2), 3);
        tokio::time::timeout(wait, prefs_rx.changed())
            .await
            .expect("history edit published")
            .expect("watcher alive");
        let snap = supervisor.snapshot().await.expect("snapshot");
        assert_eq!(snap.config.expect("configured").history_size, 32);
        assert_eq!(configure_count(&logger), 2);

        write_settings(&path, &settings("1.1.1.1", 32, 4), 4);
        tokio::time::timeout(wait, prefs_rx.changed())
            .await
            .expect("bar width edit published")
            .expect("watcher alive");
        assert_eq!(prefs_rx.borrow_and_update().bar_width, 4);
        supervisor.snapshot().await.expect("snapshot");
        assert_eq!(configure_count(&logger), 2);

        write_settings(&path, "[preferences\ntarget = ", 5);
        let warned = tokio::time::timeout(wait, async {
            loop {
                let warned = logger
                    .snapshot()
                    .iter()
                    .any(|entry| entry.message.starts_with("WARNING: keeping previous preferences"));
                if warned {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        assert!(warned.is_ok(), "no warning logged for a broken settings file");
        assert!(!prefs_rx.has_changed().expect("watcher alive"));
        assert_eq!(prefs_rx.borrow().target, "1.1.1.1");
        assert_eq!(configure_count(&logger), 2);

        watcher.abort();
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn target_override_wins() {
        let prefs = Preferences::default();
        assert_eq!(effective(prefs.clone(), Some("example.com")).target, "example.com");
        assert_eq!(effective(prefs, None).target, "8.8.8.8");
    }
}
