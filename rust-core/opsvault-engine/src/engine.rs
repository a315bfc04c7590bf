// SPDX-License-Identifier: PMPL-1.0-or-later
//
// OpsVault Engine - Wiring and lifetime
//
// One explicitly constructed engine instance owns the store, the wiper,
// the lifecycle manager, the disk monitor, and (when a signing secret is
// configured) the video streamer, plus both background loops. Lifetime is
// tied to `start`/`shutdown`, not module import; there is no process-wide
// singleton. Shutdown stops the sweep first (it mutates state), then the
// monitor, each within a bounded join timeout.

use std::sync::Arc;

use tracing::{info, warn};

use opsvault_lifecycle::{LifecycleManager, SweepHandle};
use opsvault_monitor::{
    check_index_health, disk_status_of, storage_breakdown, AlertTracker, DiskAlert, DiskStatus,
    MonitorHandle, MonitorResult, OrphanedLog, TypeBreakdown, DEFAULT_ALERT_CAPACITY,
};
use opsvault_store::{EntityStore, EntityType};
use opsvault_stream::VideoStreamer;
use opsvault_wiper::SecureWiper;

use crate::config::EngineConfig;
use crate::error::EngineResult;

/// The assembled storage engine.
#[derive(Debug)]
pub struct Engine {
    store: Arc<EntityStore>,
    wiper: Arc<SecureWiper>,
    lifecycle: Arc<LifecycleManager>,
    streamer: Option<Arc<VideoStreamer>>,
    alerts: Arc<AlertTracker>,
    sweep: Option<SweepHandle>,
    monitor: Option<MonitorHandle>,
}

impl Engine {
    /// Construct every component and spawn the background loops.
    pub fn start(config: EngineConfig) -> EngineResult<Self> {
        let store = Arc::new(EntityStore::open(&config.root)?);
        let wiper = Arc::new(SecureWiper::new(
            store.root().join("audit").join("wipe_log.log"),
        ));
        let lifecycle = Arc::new(LifecycleManager::new(
            Arc::clone(&store),
            Arc::clone(&wiper),
        ));

        let streamer = match &config.stream_secret {
            Some(secret) => Some(Arc::new(VideoStreamer::new(
                store.type_dir(EntityType::Videos),
                secret,
            )?)),
            None => {
                warn!("no stream secret configured, video subsystem disabled");
                None
            }
        };

        let alerts = Arc::new(AlertTracker::new(DEFAULT_ALERT_CAPACITY));
        let sweep = SweepHandle::spawn(Arc::clone(&lifecycle), config.sweep.clone());
        let monitor = MonitorHandle::spawn(
            store.root().to_path_buf(),
            Arc::clone(&alerts),
            config.monitor.clone(),
        );

        info!(root = %store.root().display(), "engine started");
        Ok(Self {
            store,
            wiper,
            lifecycle,
            streamer,
            alerts,
            sweep: Some(sweep),
            monitor: Some(monitor),
        })
    }

    /// The entity store.
    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    /// The secure wiper.
    pub fn wiper(&self) -> &Arc<SecureWiper> {
        &self.wiper
    }

    /// The lifecycle manager.
    pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
        &self.lifecycle
    }

    /// The video streamer, when a signing secret was configured.
    pub fn streamer(&self) -> Option<&Arc<VideoStreamer>> {
        self.streamer.as_ref()
    }

    /// Disk alerts recorded so far.
    pub fn recent_alerts(&self) -> Vec<DiskAlert> {
        self.alerts.recent_alerts()
    }

    /// Current free-space status of the storage volume.
    pub fn disk_status(&self) -> MonitorResult<DiskStatus> {
        disk_status_of(self.store.root())
    }

    /// Per-type storage accounting.
    pub fn storage_breakdown(&self) -> MonitorResult<Vec<TypeBreakdown>> {
        storage_breakdown(&self.store)
    }

    /// Orphaned-log detection across all entity types.
    pub fn check_index_health(&self) -> MonitorResult<Vec<OrphanedLog>> {
        check_index_health(&self.store)
    }

    /// Stop both background loops in order: sweep first, then monitor.
    /// Returns true when both joined within their timeouts.
    pub fn shutdown(mut self) -> bool {
        let mut clean = true;
        if let Some(sweep) = self.sweep.take() {
            clean &= sweep.shutdown();
        }
        if let Some(monitor) = self.monitor.take() {
            clean &= monitor.shutdown();
        }
        info!(clean, "engine shut down");
        clean
    }
}

/// Install the process-wide tracing subscriber, honoring `RUST_LOG`.
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
