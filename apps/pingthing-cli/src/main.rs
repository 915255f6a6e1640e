mod prefs;
mod ui;

use std::{
    future::Future,
    path::{Path, PathBuf},
    sync::mpsc as std_mpsc,
    time::Duration,
};

use anyhow::Result;
use clap::Parser;
use futures::{stream::BoxStream, StreamExt};
use pingthing_display::LocalDisplay;
use pingthing_monitor::{NetworkMonitor, RouteProbeSource};
use pingthing_ops::{init_tracing, Logger};
use pingthing_prober::SystemPing;
use pingthing_supervisor::ProbeSupervisor;
use pingthing_types::{
    config::{PingThingConfig, Preferences, TomlPreferenceStore},
    events::DisplayUpdate,
};
use tokio::sync::{broadcast::error::RecvError, watch};
use tracing::{info, warn};

use crate::ui::UiMessage;

const PREFERENCES_POLL: Duration = Duration::from_secs(2);

#[derive(Debug, Parser)]
#[command(name = "pingthing", about = "Live latency graph for one network target")]
struct Args {
    /// Settings file; missing or invalid files fall back to defaults.
    #[arg(short, long, env = "PINGTHING_CONFIG", default_value = "configs/pingthing.toml")]
    config: PathBuf,
    /// Overrides the target from the settings file.
    #[arg(short, long)]
    target: Option<String>,
    /// Log status lines instead of drawing the terminal graph.
    #[arg(long)]
    headless: bool,
    /// With `--headless`, print each status update as a JSON line on stdout.
    #[arg(long, requires = "headless")]
    json: bool,
    #[arg(long, default_value = "ping")]
    ping_binary: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args.config);
    if args.headless {
        init_tracing(&config.ops)?;
    }

    let logger = Logger::from_config(&config.ops);
    let monitor = NetworkMonitor::new(
        RouteProbeSource::from_config(&config.monitor.probe_addrs),
        config.monitor.poll_interval(),
    );
    monitor.start().await;

    let display = LocalDisplay::new(64);
    let updates = display.subscribe();
    let (supervisor, supervisor_task) = ProbeSupervisor::spawn(
        config.supervisor.clone(),
        SystemPing::new(args.ping_binary.clone()),
        display,
        monitor.clone(),
        logger.clone(),
    );

    let preferences = prefs::effective(config.preferences.clone(), args.target.as_deref());
    supervisor.configure(preferences.session_config())?;

    let (prefs_tx, prefs_rx) = watch::channel(preferences.clone());
    let watcher = tokio::spawn(prefs::watch_preferences(
        TomlPreferenceStore::new(&args.config),
        args.target.clone(),
        supervisor.clone(),
        logger.clone(),
        prefs_tx,
        PREFERENCES_POLL,
    ));

    if args.headless {
        let ctrl_c = async {
            let _ = tokio::signal::ctrl_c().await;
        };
        run_headless(updates, args.json, ctrl_c).await;
    } else {
        run_terminal(updates, prefs_rx, &logger).await?;
    }

    watcher.abort();
    monitor.stop();
    supervisor.stop()?;
    logger.append("Shutting down");
    drop(supervisor);
    supervisor_task.await?;
    Ok(())
}

/// Prints updates until the stream ends or `shutdown` completes.
async fn run_headless<S>(mut updates: BoxStream<'static, DisplayUpdate>, json: bool, shutdown: S)
where
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            update = updates.next() => match update {
                Some(update) if json => match serde_json::to_string(&update) {
                    Ok(line) => println!("{line}"),
                    Err(err) => warn!("Failed to encode update: {err}"),
                },
                Some(update) => info!("{} | {}", update.title(), update.tooltip),
                None => break,
            },
            _ = &mut shutdown => break,
        }
    }
}

async fn run_terminal(
    mut updates: BoxStream<'static, DisplayUpdate>,
    mut prefs_rx: watch::Receiver<Preferences>,
    logger: &Logger,
) -> Result<()> {
    let (ui_tx, ui_rx) = std_mpsc::channel();
    let initial = prefs_rx.borrow().clone();
    let backlog = logger.snapshot();
    let mut log_rx = logger.subscribe();

    let forwarder = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                update = updates.next() => match update {
                    Some(update) => UiMessage::Display(update),
                    None => break,
                },
                entry = log_rx.recv() => match entry {
                    Ok(entry) => UiMessage::Log(entry),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(_) => break,
                },
                changed = prefs_rx.changed() => match changed {
                    Ok(()) => UiMessage::Preferences(prefs_rx.borrow().clone()),
                    Err(_) => break,
                },
            };
            if ui_tx.send(message).is_err() {
                break;
            }
        }
    });

    let ui = tokio::task::spawn_blocking(move || ui::run(ui_rx, initial, backlog));
    let result = ui.await?;
    forwarder.abort();
    result
}

fn load_config(path: &Path) -> PingThingConfig {
    match PingThingConfig::from_file(path) {
        Ok(cfg) => {
            if let Err(err) = cfg.validate() {
                eprintln!(
                    "Invalid config in '{}': {err}. Falling back to internal defaults.",
                    path.display()
                );
                PingThingConfig::default()
            } else {
                cfg
            }
        }
        Err(err) => {
            eprintln!(
                "Failed to load config from '{}': {err}. Falling back to internal defaults.",
                path.display()
            );
            PingThingConfig::default()
        }
    }
}
