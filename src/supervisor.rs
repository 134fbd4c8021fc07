//! Component lifecycle: listeners, uplink, samplers, history recording and
//! config hot-reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::dup_cache::epoch_secs;
use crate::history::HistoryStore;
use crate::listener::Listener;
use crate::stats::Stats;
use crate::status::ServerStatus;
use crate::stream::DataStream;
use crate::uplink::Uplink;
use crate::{CODENAME, PRODUCT_NAME, VERSION};

const HISTORY_RECORD_INTERVAL: Duration = Duration::from_secs(60);
/// Rate history retention: 30 days.
const HISTORY_TTL_SECS: f64 = 30.0 * 24.0 * 60.0 * 60.0;

const UPLINK_RX_SPEED_KEY: &str = "uplink.packet.rx.speed";
const UPLINK_TX_SPEED_KEY: &str = "uplink.packet.tx.speed";

/// Quiet window a config-file event burst must hold before a reload.
const CONFIG_SETTLE_WINDOW: Duration = Duration::from_millis(400);

struct UplinkHandle {
    uplink: Arc<Uplink>,
    task: JoinHandle<()>,
}

struct State {
    config: Config,
    listeners: Vec<Arc<Listener>>,
    uplink: Option<UplinkHandle>,
}

pub struct Supervisor {
    config_path: PathBuf,
    started_at: DateTime<Utc>,
    stream: Arc<DataStream>,
    global_stats: Arc<Stats>,
    history: Arc<dyn HistoryStore>,
    state: tokio::sync::Mutex<State>,
    cancel: CancellationToken,
}

impl Supervisor {
    pub fn new(config: Config, config_path: PathBuf, history: Arc<dyn HistoryStore>) -> Arc<Self> {
        let stream = DataStream::new(config.server.stream_capacity);
        Arc::new(Self {
            config_path,
            started_at: Utc::now(),
            stream,
            global_stats: Arc::new(Stats::new()),
            history,
            state: tokio::sync::Mutex::new(State {
                config,
                listeners: Vec::new(),
                uplink: None,
            }),
            cancel: CancellationToken::new(),
        })
    }

    /// The fan-out hub; exposed so embedders (and tests) can tap the feed.
    pub fn stream(&self) -> Arc<DataStream> {
        self.stream.clone()
    }

    pub async fn start(self: Arc<Self>) -> Result<()> {
        info!("{} {}/{} starting", PRODUCT_NAME, VERSION, CODENAME);

        {
            let mut state = self.state.lock().await;
            let config = state.config.clone();
            start_listeners(&self, &mut state, &config).await?;
            start_uplink(&self, &mut state, &config);
        }

        tokio::spawn(self.clone().sampler_loop());
        tokio::spawn(self.clone().history_loop());
        Ok(())
    }

    /// Re-read the config file and restart the traffic components with it.
    /// A config that fails to load keeps the previous one running.
    pub async fn reload(&self) {
        let new_config = match Config::load(&self.config_path) {
            Ok(config) => config,
            Err(e) => {
                error!(error = %e, "Config reload failed, keeping previous configuration");
                return;
            }
        };

        info!("Configuration changed, reloading");
        let mut state = self.state.lock().await;

        // Drain old components first. The uplink task is awaited so a
        // stopped loop can never race into a fresh connect.
        for listener in state.listeners.drain(..) {
            listener.stop().await;
        }
        if let Some(handle) = state.uplink.take() {
            handle.uplink.stop();
            let _ = handle.task.await;
        }

        state.config = new_config.clone();
        if let Err(e) = start_listeners(self, &mut state, &new_config).await {
            error!(error = %e, "Reload could not start any listener");
        }
        start_uplink(self, &mut state, &new_config);
        info!(listeners = state.listeners.len(), "Reload complete");
    }

    pub async fn shutdown(&self) {
        info!("Shutting down");
        self.cancel.cancel();

        let mut state = self.state.lock().await;
        for listener in state.listeners.drain(..) {
            listener.stop().await;
        }
        if let Some(handle) = state.uplink.take() {
            handle.uplink.stop();
            let _ = handle.task.await;
        }
        info!("Shutdown complete");
    }

    /// Read-only view for the HTTP status collaborator. Hidden listeners
    /// are omitted.
    pub async fn status(&self) -> ServerStatus {
        let state = self.state.lock().await;
        ServerStatus {
            id: state.config.server.id.clone(),
            product: PRODUCT_NAME.to_string(),
            version: VERSION.to_string(),
            codename: CODENAME.to_string(),
            started_at: self.started_at,
            stats: self.global_stats.snapshot(),
            listeners: state
                .listeners
                .iter()
                .filter(|l| l.is_visible())
                .map(|l| l.snapshot())
                .collect(),
            uplink: state.uplink.as_ref().map(|h| h.uplink.snapshot()),
        }
    }

    /// 1 Hz rate sampling for the global and uplink scopes. Listeners run
    /// their own samplers.
    async fn sampler_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            self.global_stats.sample();
            let state = self.state.lock().await;
            if let Some(handle) = &state.uplink {
                handle.uplink.stats().sample();
            }
        }
    }

    /// Record the uplink packet rates once a minute and expire old points.
    async fn history_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(HISTORY_RECORD_INTERVAL);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let (rx_rate, tx_rate) = {
                let state = self.state.lock().await;
                match &state.uplink {
                    Some(handle) => (
                        handle.uplink.stats().recv_packet_rate(),
                        handle.uplink.stats().send_packet_rate(),
                    ),
                    None => continue,
                }
            };

            let now = epoch_secs() as f64;
            self.history
                .record_data_point(UPLINK_RX_SPEED_KEY, now, rx_rate as f64);
            self.history
                .record_data_point(UPLINK_TX_SPEED_KEY, now, tx_rate as f64);
            self.history.clear_data_slice(UPLINK_RX_SPEED_KEY, HISTORY_TTL_SECS);
            self.history.clear_data_slice(UPLINK_TX_SPEED_KEY, HISTORY_TTL_SECS);
        }
    }

    /// Reload whenever the config file changes on disk. Runs until
    /// shutdown cancels it.
    ///
    /// The watch is on the parent directory, not the file: `Config::save`
    /// and most editors replace the inode, which would silently detach a
    /// file-level watch.
    pub fn watch_config(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            use notify::{RecursiveMode, Watcher};

            let changed = Arc::new(tokio::sync::Notify::new());
            let wake = changed.clone();
            let file_name = self
                .config_path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_default();

            let callback = move |outcome: notify::Result<notify::Event>| {
                let Ok(event) = outcome else { return };
                if !event.kind.is_create() && !event.kind.is_modify() {
                    return;
                }
                if event
                    .paths
                    .iter()
                    .any(|p| p.file_name() == Some(file_name.as_os_str()))
                {
                    wake.notify_one();
                }
            };
            let mut watcher = match notify::recommended_watcher(callback) {
                Ok(w) => w,
                Err(e) => {
                    error!(error = %e, "Config watching unavailable, reload on restart only");
                    return;
                }
            };

            let dir = self
                .config_path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            if let Err(e) = watcher.watch(dir, RecursiveMode::NonRecursive) {
                error!(error = %e, dir = ?dir, "Cannot watch config directory");
                return;
            }
            debug!(path = ?self.config_path, "Watching config for changes");

            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = changed.notified() => {}
                }

                // A save is usually a burst of events; wait for a quiet
                // window so the file is read once, fully written
                while tokio::time::timeout(CONFIG_SETTLE_WINDOW, changed.notified())
                    .await
                    .is_ok()
                {}

                self.reload().await;
            }
        })
    }
}

async fn start_listeners(
    supervisor: &Supervisor,
    state: &mut State,
    config: &Config,
) -> Result<()> {
    let mut started = Vec::new();
    for listener_config in &config.server.listeners {
        let listener = Listener::new(
            listener_config.clone(),
            config.server.id.clone(),
            config.max_line_len(),
            supervisor.stream.clone(),
            supervisor.global_stats.clone(),
        );
        match listener.clone().start().await {
            Ok(()) => started.push(listener),
            Err(e) => {
                // One bad endpoint must not take the others down
                error!(listener = %listener_config.name, error = %e, "Failed to start listener");
            }
        }
    }

    if started.is_empty() && !config.server.listeners.is_empty() {
        bail!("no configured listener could bind");
    }
    state.listeners = started;
    Ok(())
}

fn start_uplink(supervisor: &Supervisor, state: &mut State, config: &Config) {
    if config.server.uplinks.is_empty() {
        state.uplink = None;
        return;
    }

    let uplink = Uplink::new(
        config.server.uplinks.clone(),
        config.server.id.clone(),
        config.server.passcode,
        supervisor.stream.clone(),
        supervisor.global_stats.clone(),
    );
    let task = tokio::spawn(uplink.clone().run());
    state.uplink = Some(UplinkHandle { uplink, task });
    debug!("Uplink started");
}

