/// Periodic removal of stale and dead nodes
///
/// Stale nodes have nothing registered anymore; dead nodes no longer answer
/// the liveness probe. Either way the record and all its rendezvous proxies
/// are dropped.

use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::node::NodeId;
use crate::probe::LivenessProbe;
use crate::registry::{NodeEntry, NodeRegistry};

/// Outcome of checking one node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeHealth {
    Alive,
    /// No subscriptions, publications or services left
    Stale,
    /// Failed the liveness probe
    Dead,
}

/// Result of one housekeeping pass
#[derive(Debug, Clone, Default)]
pub struct HousekeepingReport {
    pub checked: usize,
    pub stale: Vec<NodeId>,
    pub dead: Vec<NodeId>,
}

impl HousekeepingReport {
    pub fn dropped(&self) -> usize {
        self.stale.len() + self.dead.len()
    }
}

struct Ticker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Drives housekeeping passes over a registry
pub struct Housekeeper {
    registry: Arc<NodeRegistry>,
    probe: Arc<dyn LivenessProbe>,
    ticker: Mutex<Option<Ticker>>,
    pass_running: Arc<AtomicBool>,
}

impl Housekeeper {
    pub fn new(registry: Arc<NodeRegistry>, probe: Arc<dyn LivenessProbe>) -> Self {
        Self {
            registry,
            probe,
            ticker: Mutex::new(None),
            pass_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Check every node once
    ///
    /// Nodes are checked concurrently; one slow probe does not hold up the
    /// others.
    pub async fn run_pass(&self) -> HousekeepingReport {
        run_pass(&self.registry, self.probe.as_ref()).await
    }

    /// Start periodic passes; a running ticker is replaced
    pub fn start(&self, period: Duration) {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let registry = self.registry.clone();
        let probe = self.probe.clone();
        let pass_running = self.pass_running.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            interval.tick().await;
            let mut pass: Option<JoinHandle<()>> = None;

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = interval.tick() => {
                        if pass_running.swap(true, Ordering::AcqRel) {
                            debug!("Previous housekeeping pass still running, skipping tick");
                            continue;
                        }
                        let registry = registry.clone();
                        let probe = probe.clone();
                        let pass_running = pass_running.clone();
                        pass = Some(tokio::spawn(async move {
                            let report = run_pass(&registry, probe.as_ref()).await;
                            if report.dropped() > 0 {
                                info!(
                                    "Housekeeping dropped {} of {} nodes ({} stale, {} dead)",
                                    report.dropped(),
                                    report.checked,
                                    report.stale.len(),
                                    report.dead.len()
                                );
                            }
                            pass_running.store(false, Ordering::Release);
                        }));
                    }
                }
            }

            // Let an in-flight pass finish its evictions before reporting stopped
            if let Some(pass) = pass {
                if let Err(e) = pass.await {
                    warn!("Housekeeping pass ended abnormally: {}", e);
                }
            }
            debug!("Housekeeping stopped");
        });

        info!("Housekeeping every {:?}", period);
        if let Some(previous) = self.replace_ticker(Some(Ticker { shutdown, handle })) {
            warn!("Housekeeping restarted");
            previous.shutdown.send_replace(true);
        }
    }

    /// Stop periodic passes and wait for the ticker and any running pass to exit
    pub async fn stop(&self) {
        let Some(ticker) = self.replace_ticker(None) else {
            return;
        };
        ticker.shutdown.send_replace(true);
        if let Err(e) = ticker.handle.await {
            warn!("Housekeeping task ended abnormally: {}", e);
        }
    }

    pub fn is_running(&self) -> bool {
        match self.ticker.lock() {
            Ok(ticker) => ticker.is_some(),
            Err(poisoned) => poisoned.into_inner().is_some(),
        }
    }

    fn replace_ticker(&self, ticker: Option<Ticker>) -> Option<Ticker> {
        match self.ticker.lock() {
            Ok(mut current) => std::mem::replace(&mut *current, ticker),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), ticker),
        }
    }
}

async fn run_pass(registry: &NodeRegistry, probe: &dyn LivenessProbe) -> HousekeepingReport {
    let entries = registry.entries().await;
    let checks = entries
        .into_iter()
        .map(|(id, entry)| async move { (id.clone(), check_node(registry, probe, &id, &entry).await) });

    let mut report = HousekeepingReport::default();
    for (id, health) in join_all(checks).await {
        let Some(health) = health else {
            continue;
        };
        report.checked += 1;
        match health {
            NodeHealth::Alive => {}
            NodeHealth::Stale => report.stale.push(id),
            NodeHealth::Dead => report.dead.push(id),
        }
    }
    report
}

/// Check one node and drop it unless alive; `None` if it was already gone
async fn check_node(
    registry: &NodeRegistry,
    probe: &dyn LivenessProbe,
    id: &NodeId,
    entry: &NodeEntry,
) -> Option<NodeHealth> {
    let address = {
        let mut record = entry.lock().await;
        if record.is_dropped() {
            return None;
        }
        if record.is_stale() {
            let closed = registry.evict(entry, &mut record).await;
            info!("Dropping stale node {} ({} proxies closed)", id, closed);
            return Some(NodeHealth::Stale);
        }
        record.real_address().to_string()
    };

    // Probe without holding the record so requests for it keep flowing
    if probe.probe(&address).await {
        return Some(NodeHealth::Alive);
    }

    let mut record = entry.lock().await;
    if record.is_dropped() {
        return None;
    }
    let closed = registry.evict(entry, &mut record).await;
    info!("Dropping dead node {} at {} ({} proxies closed)", id, address, closed);
    Some(NodeHealth::Dead)
}
