//! Session - owns the transport, the command façade and both state managers
//!
//! Everything the binary and the REPL do goes through here. Teardown order is
//! fixed: loopers, then clips, then the transport.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::discovery::{
    fallback_track_name, LooperDiscovery, ParameterMapper, TrackListProvider,
};
use crate::error::LiveResult;
use crate::live::LiveCommands;
use crate::model::{ClipInfo, LooperInfo, MonitoredItem, TrackInfo};
use crate::osc::{ConnectionStatus, Transport};
use crate::state::{ClipStateManager, LooperStateManager, StateManager};
use crate::visual::{VisualConsumer, VisualRegistry};

/// Builds the indicator for a newly monitored item
pub type ConsumerFactory<'a> = &'a dyn Fn(&MonitoredItem) -> Arc<dyn VisualConsumer>;

pub struct Session {
    config: AppConfig,
    transport: Arc<dyn Transport>,
    commands: Arc<LiveCommands>,
    visuals: Arc<VisualRegistry>,
    mapper: Arc<ParameterMapper>,
    discovery: LooperDiscovery,
    tracks: TrackListProvider,
    loopers: LooperStateManager,
    clips: ClipStateManager,
    /// Items currently monitored, by id
    items: Mutex<HashMap<String, MonitoredItem>>,
}

impl Session {
    pub fn new(transport: Arc<dyn Transport>, config: AppConfig) -> Self {
        transport.subscribe_status(Arc::new(|status: ConnectionStatus| match status {
            ConnectionStatus::Connected => info!("🔌 Connected to Live"),
            ConnectionStatus::Disconnected => warn!("🔌 Disconnected from Live"),
            ConnectionStatus::Error(e) => error!("❌ Transport error: {}", e),
        }));

        let commands = Arc::new(LiveCommands::new(Arc::clone(&transport), &config.timing));
        let visuals = Arc::new(VisualRegistry::new());
        let mapper = Arc::new(ParameterMapper::new(Arc::clone(&commands)));

        Self {
            discovery: LooperDiscovery::new(Arc::clone(&commands)),
            tracks: TrackListProvider::new(Arc::clone(&commands)),
            loopers: LooperStateManager::new(
                Arc::clone(&commands),
                Arc::clone(&mapper),
                Arc::clone(&visuals),
                config.timing.broadcast_interval(),
            ),
            clips: ClipStateManager::new(Arc::clone(&commands), Arc::clone(&visuals), &config.timing),
            items: Mutex::new(HashMap::new()),
            config,
            transport,
            commands,
            visuals,
            mapper,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn commands(&self) -> &Arc<LiveCommands> {
        &self.commands
    }

    pub fn visuals(&self) -> &Arc<VisualRegistry> {
        &self.visuals
    }

    /// Open the socket and ping Live
    ///
    /// A failed ping is only reported: the remote script may come up later.
    pub async fn connect(&self) -> LiveResult<bool> {
        info!(
            "Connecting to {}:{} (listening on {})",
            self.config.osc.host, self.config.osc.send_port, self.config.osc.receive_port
        );
        self.transport.connect(&self.config.osc).await?;

        let reachable = self.commands.test_connection().await;
        if reachable {
            info!("✅ Live responded to connection test");
        } else {
            warn!("⚠️ Live did not answer the connection test. Is AbletonOSC loaded?");
        }
        Ok(reachable)
    }

    pub async fn test_connection(&self) -> bool {
        self.commands.test_connection().await
    }

    pub async fn find_loopers(&self) -> LiveResult<Vec<LooperInfo>> {
        self.discovery.find_loopers().await
    }

    pub async fn track_list(&self) -> LiveResult<Vec<TrackInfo>> {
        self.tracks.get_track_list().await
    }

    pub async fn num_scenes(&self) -> i32 {
        self.tracks.get_num_scenes().await
    }

    /// Describe a looper picked by id, without scanning the whole set
    pub async fn looper_info(&self, track: i32, device: i32) -> LooperInfo {
        let (name, color) = self.track_identity(track).await;
        LooperInfo::new(track, device, name, color)
    }

    pub async fn clip_info(&self, track: i32, scene: i32) -> ClipInfo {
        let (name, color) = self.track_identity(track).await;
        ClipInfo::new(track, scene, name, color)
    }

    async fn track_identity(&self, track: i32) -> (String, i32) {
        let name = self
            .commands
            .get_track_name(track)
            .await
            .unwrap_or_else(|_| fallback_track_name(track));
        let color = self.commands.get_track_color(track).await.unwrap_or(0);
        (name, color)
    }

    /// Research every looper, then start monitoring each; returns how many started
    pub async fn monitor_loopers(&self, loopers: &[LooperInfo], factory: ConsumerFactory<'_>) -> usize {
        let failed = self.mapper.map_all(loopers).await;
        if !failed.is_empty() {
            warn!("Skipping loopers without parameter mappings: {}", failed.join(", "));
        }

        let mut started = 0;
        for looper in loopers.iter().filter(|l| !failed.contains(&l.id)) {
            let item = MonitoredItem::Looper(looper.clone());
            if self.begin(&item, factory, self.loopers.start_monitoring(looper)).await {
                started += 1;
            }
        }
        started
    }

    pub async fn monitor_clips(&self, clips: &[ClipInfo], factory: ConsumerFactory<'_>) -> usize {
        let mut started = 0;
        for clip in clips {
            let item = MonitoredItem::Clip(clip.clone());
            if self.begin(&item, factory, self.clips.start_monitoring(clip)).await {
                started += 1;
            }
        }
        started
    }

    /// Register the consumer first so the first broadcast tick finds it
    async fn begin<F>(&self, item: &MonitoredItem, factory: ConsumerFactory<'_>, start: F) -> bool
    where
        F: std::future::Future<Output = LiveResult<bool>>,
    {
        let id = item.id().to_string();
        if self.items.lock().contains_key(&id) {
            warn!("⚠️ {} is already monitored", item.display_name());
            return false;
        }

        self.visuals.register(&id, factory(item));
        match start.await {
            Ok(true) => {
                self.items.lock().insert(id, item.clone());
                true
            }
            Ok(false) => {
                self.visuals.unregister(&id);
                false
            }
            Err(e) => {
                error!("❌ Could not monitor {}: {}", item.display_name(), e);
                self.visuals.unregister(&id);
                false
            }
        }
    }

    /// Stop one item, whichever manager owns it
    pub fn stop(&self, id: &str) -> bool {
        let stopped = self.loopers.stop_monitoring(id) || self.clips.stop_monitoring(id);
        if stopped {
            self.mapper.forget(id);
            self.visuals.unregister(id);
            self.items.lock().remove(id);
        }
        stopped
    }

    /// Time since the item's state last changed
    pub fn since_last_update(&self, id: &str) -> Option<Duration> {
        self.loopers
            .since_last_update(id)
            .or_else(|| self.clips.since_last_update(id))
    }

    /// Monitored items sorted by id
    pub fn monitored(&self) -> Vec<MonitoredItem> {
        let mut items: Vec<MonitoredItem> = self.items.lock().values().cloned().collect();
        items.sort_by(|a, b| a.id().cmp(b.id()));
        items
    }

    pub async fn shutdown(&self) {
        info!("Shutting down session...");
        self.loopers.stop_all_monitoring();
        self.clips.stop_all_monitoring();

        let ids: Vec<String> = self.items.lock().drain().map(|(id, _)| id).collect();
        for id in ids {
            self.visuals.unregister(&id);
        }

        self.transport.disconnect().await;
        info!("Session closed");
    }
}
