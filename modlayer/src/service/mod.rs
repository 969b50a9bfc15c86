//! The deployment service: one background worker, one mutation path.
//!
//! All filesystem-heavy work (copies, overlay reconciles, mode transitions,
//! integrity scans) runs on a dedicated blocking worker so the interactive
//! caller never blocks on disk I/O. The worker owns the persisted stores
//! outright — every read-modify-write of the ownership stacks and priority
//! records flows through its request queue, so concurrent callers can never
//! lose updates.
//!
//! # Architecture
//!
//! ```text
//! DeployService (handle) ──mpsc──► ServiceWorker (blocking task)
//!        │                               │
//!        │  oneshot replies              │ owns: settings, ownership,
//!        ◄───────────────────────────────┤       priorities, package store
//!                                        ▼
//!                                  strategy_for(mode) → filesystem
//! ```
//!
//! Requests are processed strictly one at a time; nothing is cancellable
//! mid-flight. Overlay refreshes are additionally coalesced: refresh
//! requests queued behind a running one are folded into a single reconcile
//! and every waiter receives that run's report.

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::deploy::{
    check_integrity, find_conflicts, opponents_of, setup_overlay_mode, strategy_for,
    teardown_overlay_mode, Conflict, DeployContext, DeployError, DeployResult, DisableReport,
    EnableReport, IntegrityReport, IntegrityResolution, RefreshReport, TeardownReport,
};
use crate::package::{
    content_paths, hidden_alias_name, LocalPackageStore, Package, PackageId, PackageManifest,
};
use crate::store::{
    DeploymentMode, DeploymentSettings, OwnershipStacks, PriorityRecords, ResolvedOrder, StateDir,
};

/// Default capacity of the request channel.
pub const DEFAULT_REQUEST_CHANNEL_CAPACITY: usize = 64;

/// Service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// State directory holding settings, records and the package store.
    pub state_dir: StateDir,

    /// Request channel capacity.
    pub channel_capacity: usize,
}

impl ServiceConfig {
    /// Configuration over the given state directory.
    pub fn new(state_dir: StateDir) -> Self {
        Self {
            state_dir,
            channel_capacity: DEFAULT_REQUEST_CHANNEL_CAPACITY,
        }
    }
}

/// What `enable` did, given the integrity gate.
#[derive(Debug)]
pub enum EnableOutcome {
    /// The package was deployed.
    Enabled(EnableReport),

    /// Content drift was detected and the caller's resolution was to
    /// cancel; nothing was changed.
    Cancelled(IntegrityReport),

    /// Content drift was detected and the caller's resolution was to
    /// uninstall; the package is gone.
    Uninstalled(IntegrityReport),
}

/// Read-only preview of an enable: what the caller should confirm before
/// committing (integrity drift, conflicts, proposed priority order).
#[derive(Debug)]
pub struct EnablePlan {
    /// Integrity comparison of the package against its manifest.
    pub integrity: IntegrityReport,

    /// Collisions with currently-enabled packages.
    pub conflicts: Vec<Conflict>,

    /// Resolver-proposed order, present when there are conflicts. The
    /// caller may override it when enabling.
    pub proposed: Option<ResolvedOrder>,
}

/// Per-package status row.
#[derive(Debug, Clone)]
pub struct PackageStatus {
    pub id: PackageId,
    pub name: String,
    pub enabled: bool,
}

/// Snapshot of the engine's current state.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub settings: DeploymentSettings,
    pub packages: Vec<PackageStatus>,
    pub tracked_paths: usize,
}

enum ServiceRequest {
    Enable {
        id: PackageId,
        order_override: Option<Vec<PackageId>>,
        on_modified: IntegrityResolution,
        reply: oneshot::Sender<DeployResult<EnableOutcome>>,
    },
    PlanEnable {
        id: PackageId,
        reply: oneshot::Sender<DeployResult<EnablePlan>>,
    },
    Disable {
        id: PackageId,
        reply: oneshot::Sender<DeployResult<DisableReport>>,
    },
    Refresh {
        reply: oneshot::Sender<DeployResult<RefreshReport>>,
    },
    SetPriority {
        order: Vec<PackageId>,
        reply: oneshot::Sender<DeployResult<RefreshReport>>,
    },
    Setup {
        reply: oneshot::Sender<DeployResult<()>>,
    },
    Teardown {
        reply: oneshot::Sender<DeployResult<TeardownReport>>,
    },
    Check {
        id: PackageId,
        reply: oneshot::Sender<DeployResult<IntegrityReport>>,
    },
    Import {
        source: PathBuf,
        name: String,
        reply: oneshot::Sender<DeployResult<Package>>,
    },
    Uninstall {
        id: PackageId,
        reply: oneshot::Sender<DeployResult<()>>,
    },
    Status {
        reply: oneshot::Sender<DeployResult<StatusSnapshot>>,
    },
}

/// Handle to the deployment service.
///
/// Cheap to use from the interactive thread: every method sends one request
/// and awaits the worker's reply.
pub struct DeployService {
    request_tx: mpsc::Sender<ServiceRequest>,
    shutdown: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl DeployService {
    /// Load persisted state and start the background worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: ServiceConfig) -> DeployResult<Self> {
        let state = config.state_dir;
        state
            .ensure()
            .map_err(|e| DeployError::create_dir(state.root(), e))?;

        let settings = DeploymentSettings::load(&state.config_file())?;
        let ownership = OwnershipStacks::load(&state.ownership_file())?;
        let priorities = PriorityRecords::load(&state.priority_file())?;
        let packages = LocalPackageStore::new(state.packages_dir());

        let (request_tx, request_rx) = mpsc::channel(config.channel_capacity);
        let shutdown = CancellationToken::new();

        let worker = ServiceWorker {
            state,
            settings,
            ownership,
            priorities,
            packages,
            shutdown: shutdown.clone(),
        };
        let handle = tokio::task::spawn_blocking(move || worker.run(request_rx));

        tracing::info!("Deployment service started");
        Ok(Self {
            request_tx,
            shutdown,
            worker: Some(handle),
        })
    }

    /// Enable a package: integrity gate, conflict detection, priority
    /// resolution, then strategy dispatch.
    pub async fn enable(
        &self,
        id: PackageId,
        order_override: Option<Vec<PackageId>>,
        on_modified: IntegrityResolution,
    ) -> DeployResult<EnableOutcome> {
        self.call(|reply| ServiceRequest::Enable {
            id,
            order_override,
            on_modified,
            reply,
        })
        .await
    }

    /// Preview an enable without mutating anything.
    pub async fn plan_enable(&self, id: PackageId) -> DeployResult<EnablePlan> {
        self.call(|reply| ServiceRequest::PlanEnable { id, reply }).await
    }

    /// Disable a package using its recorded ownership.
    pub async fn disable(&self, id: PackageId) -> DeployResult<DisableReport> {
        self.call(|reply| ServiceRequest::Disable { id, reply }).await
    }

    /// Run (or coalesce into) an overlay refresh.
    pub async fn refresh(&self) -> DeployResult<RefreshReport> {
        self.call(|reply| ServiceRequest::Refresh { reply }).await
    }

    /// Persist a caller-confirmed priority order and reconcile.
    pub async fn set_priority(&self, order: Vec<PackageId>) -> DeployResult<RefreshReport> {
        self.call(|reply| ServiceRequest::SetPriority { order, reply })
            .await
    }

    /// Switch the target into overlay mode.
    pub async fn setup_overlay(&self) -> DeployResult<()> {
        self.call(|reply| ServiceRequest::Setup { reply }).await
    }

    /// Switch the target back to a plain tree.
    pub async fn teardown_overlay(&self) -> DeployResult<TeardownReport> {
        self.call(|reply| ServiceRequest::Teardown { reply }).await
    }

    /// Integrity-check a package.
    pub async fn check(&self, id: PackageId) -> DeployResult<IntegrityReport> {
        self.call(|reply| ServiceRequest::Check { id, reply }).await
    }

    /// Import a content tree as a new package.
    pub async fn import(&self, source: PathBuf, name: String) -> DeployResult<Package> {
        self.call(|reply| ServiceRequest::Import {
            source,
            name,
            reply,
        })
        .await
    }

    /// Uninstall a package; refused while it is still deployed.
    pub async fn uninstall(&self, id: PackageId) -> DeployResult<()> {
        self.call(|reply| ServiceRequest::Uninstall { id, reply }).await
    }

    /// Current settings, package list and deployment statistics.
    pub async fn status(&self) -> DeployResult<StatusSnapshot> {
        self.call(|reply| ServiceRequest::Status { reply }).await
    }

    /// Stop the worker after the in-flight request completes.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        let worker = self.worker.take();
        // Dropping the handle closes the request channel, which wakes the
        // worker's blocking receive.
        drop(self);
        if let Some(handle) = worker {
            let _ = handle.await;
        }
        tracing::info!("Deployment service stopped");
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<DeployResult<T>>) -> ServiceRequest,
    ) -> DeployResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request_tx
            .send(build(reply_tx))
            .await
            .map_err(|_| DeployError::ServiceUnavailable)?;
        reply_rx.await.map_err(|_| DeployError::ServiceUnavailable)?
    }
}

struct ServiceWorker {
    state: StateDir,
    settings: DeploymentSettings,
    ownership: OwnershipStacks,
    priorities: PriorityRecords,
    packages: LocalPackageStore,
    shutdown: CancellationToken,
}

impl ServiceWorker {
    fn run(mut self, mut rx: mpsc::Receiver<ServiceRequest>) {
        let mut pending: VecDeque<ServiceRequest> = VecDeque::new();
        loop {
            let request = match pending.pop_front() {
                Some(request) => request,
                None => match rx.blocking_recv() {
                    Some(request) => request,
                    None => break,
                },
            };
            if self.shutdown.is_cancelled() {
                break;
            }

            match request {
                ServiceRequest::Enable {
                    id,
                    order_override,
                    on_modified,
                    reply,
                } => {
                    let _ = reply.send(self.enable(&id, order_override, on_modified));
                }
                ServiceRequest::PlanEnable { id, reply } => {
                    let _ = reply.send(self.plan_enable(&id));
                }
                ServiceRequest::Disable { id, reply } => {
                    let _ = reply.send(self.disable(&id));
                }
                ServiceRequest::Refresh { reply } => {
                    // Coalesce adjacent refresh requests into one run.
                    let mut waiters = vec![reply];
                    while let Ok(next) = rx.try_recv() {
                        match next {
                            ServiceRequest::Refresh { reply } => waiters.push(reply),
                            other => {
                                pending.push_back(other);
                                break;
                            }
                        }
                    }
                    if waiters.len() > 1 {
                        tracing::debug!(
                            coalesced = waiters.len(),
                            "Coalescing queued refresh requests"
                        );
                    }
                    match self.refresh() {
                        Ok(report) => {
                            for waiter in waiters {
                                let _ = waiter.send(Ok(report.clone()));
                            }
                        }
                        Err(e) => {
                            // The failed run answers its first requester;
                            // the rest re-queue for their own attempt.
                            let mut waiters = waiters.into_iter();
                            if let Some(first) = waiters.next() {
                                let _ = first.send(Err(e));
                            }
                            for waiter in waiters {
                                pending.push_back(ServiceRequest::Refresh { reply: waiter });
                            }
                        }
                    }
                }
                ServiceRequest::SetPriority { order, reply } => {
                    let _ = reply.send(self.set_priority(order));
                }
                ServiceRequest::Setup { reply } => {
                    let _ = reply.send(self.setup());
                }
                ServiceRequest::Teardown { reply } => {
                    let _ = reply.send(self.teardown());
                }
                ServiceRequest::Check { id, reply } => {
                    let _ = reply.send(self.check(&id));
                }
                ServiceRequest::Import {
                    source,
                    name,
                    reply,
                } => {
                    let _ = reply.send(
                        self.packages
                            .import(&source, &name)
                            .map_err(DeployError::from),
                    );
                }
                ServiceRequest::Uninstall { id, reply } => {
                    let _ = reply.send(self.uninstall(&id));
                }
                ServiceRequest::Status { reply } => {
                    let _ = reply.send(self.status());
                }
            }
        }
        tracing::debug!("Service worker loop exited");
    }

    /// Filesystem locations for the current settings.
    fn locations(&self) -> DeployResult<(PathBuf, PathBuf, PathBuf, PathBuf)> {
        let target = self
            .settings
            .effective_target(&self.state)
            .ok_or(DeployError::TargetUnconfigured)?;
        let alias_name = target
            .file_name()
            .and_then(|n| n.to_str())
            .map(hidden_alias_name)
            .unwrap_or_else(|| hidden_alias_name("target"));
        let hidden = target
            .parent()
            .map(|p| p.join(&alias_name))
            .unwrap_or_else(|| PathBuf::from(alias_name));
        Ok((
            target,
            self.state.overlay_dir(),
            hidden,
            self.state.originals_dir(),
        ))
    }

    fn package_roots(&self) -> DeployResult<BTreeMap<PackageId, PathBuf>> {
        Ok(self
            .packages
            .list()?
            .into_iter()
            .map(|p| (p.id, p.root))
            .collect())
    }

    /// Installed packages that currently appear in any ownership stack.
    fn enabled_packages(&self) -> DeployResult<Vec<Package>> {
        let enabled_ids = self.ownership.package_ids();
        Ok(self
            .packages
            .list()?
            .into_iter()
            .filter(|p| enabled_ids.contains(&p.id))
            .collect())
    }

    fn save_ownership(&self) -> DeployResult<()> {
        self.ownership
            .save(&self.state.ownership_file())
            .map_err(DeployError::from)
    }

    fn plan_enable(&mut self, id: &PackageId) -> DeployResult<EnablePlan> {
        let package = self.packages.get(id)?;
        self.gc_stacks();

        let manifest = PackageManifest::load(package.root()).map_err(|e| {
            DeployError::PackageStore(crate::package::PackageStoreError::Manifest(e))
        })?;
        let integrity = check_integrity(&manifest, package.root())?;

        let mut considered = vec![package.clone()];
        considered.extend(self.enabled_packages()?);
        let conflicts = find_conflicts(&considered)?;
        let opponents = opponents_of(&conflicts, id);
        let proposed = if opponents.is_empty() {
            None
        } else {
            Some(self.priorities.resolve_order(id, &opponents))
        };

        Ok(EnablePlan {
            integrity,
            conflicts,
            proposed,
        })
    }

    fn enable(
        &mut self,
        id: &PackageId,
        order_override: Option<Vec<PackageId>>,
        on_modified: IntegrityResolution,
    ) -> DeployResult<EnableOutcome> {
        let package = self.packages.get(id)?;
        self.gc_stacks();

        // Integrity gate.
        let mut manifest = PackageManifest::load(package.root()).map_err(|e| {
            DeployError::PackageStore(crate::package::PackageStoreError::Manifest(e))
        })?;
        let integrity = check_integrity(&manifest, package.root())?;
        if integrity.is_modified() {
            match on_modified {
                IntegrityResolution::Cancel => {
                    return Ok(EnableOutcome::Cancelled(integrity));
                }
                IntegrityResolution::Uninstall => {
                    self.packages.uninstall(id)?;
                    return Ok(EnableOutcome::Uninstalled(integrity));
                }
                IntegrityResolution::RefreshManifest => {
                    let live = content_paths(package.root())
                        .map_err(|e| DeployError::read(package.root(), e))?;
                    manifest.refresh_contents(&live);
                    manifest.save(package.root()).map_err(|e| {
                        DeployError::PackageStore(crate::package::PackageStoreError::Manifest(e))
                    })?;
                }
            }
        }

        // Conflict detection and priority resolution.
        let mut considered = vec![package.clone()];
        considered.extend(self.enabled_packages()?);
        let conflicts = find_conflicts(&considered)?;
        let opponents = opponents_of(&conflicts, id);
        if !opponents.is_empty() {
            let order = match order_override {
                Some(order) => order,
                None => self.priorities.resolve_order(id, &opponents).order,
            };
            self.priorities.record(order);
            self.priorities.save(&self.state.priority_file())?;
        }

        // Strategy dispatch.
        let entries =
            content_paths(package.root()).map_err(|e| DeployError::read(package.root(), e))?;
        let (target, overlay, hidden, originals) = self.locations()?;
        let package_roots = self.package_roots()?;
        let mut ctx = DeployContext {
            target: &target,
            overlay_dir: &overlay,
            hidden_dir: &hidden,
            originals_dir: &originals,
            ownership: &mut self.ownership,
            priorities: &self.priorities,
            package_roots: &package_roots,
        };
        let report = strategy_for(self.settings.mode).enable(&mut ctx, &package, &entries)?;

        self.save_ownership()?;
        Ok(EnableOutcome::Enabled(report))
    }

    fn disable(&mut self, id: &PackageId) -> DeployResult<DisableReport> {
        // No GC here: the package being disabled may be exactly the one
        // whose directory is gone, and its recorded claims are the only
        // way to clean the target.
        let (target, overlay, hidden, originals) = self.locations()?;
        let package_roots = self.package_roots()?;
        let mut ctx = DeployContext {
            target: &target,
            overlay_dir: &overlay,
            hidden_dir: &hidden,
            originals_dir: &originals,
            ownership: &mut self.ownership,
            priorities: &self.priorities,
            package_roots: &package_roots,
        };
        let report = strategy_for(self.settings.mode).disable(&mut ctx, id)?;

        self.save_ownership()?;
        Ok(report)
    }

    fn refresh(&mut self) -> DeployResult<RefreshReport> {
        self.gc_stacks();
        let (target, overlay, hidden, originals) = self.locations()?;
        let package_roots = self.package_roots()?;
        let mut ctx = DeployContext {
            target: &target,
            overlay_dir: &overlay,
            hidden_dir: &hidden,
            originals_dir: &originals,
            ownership: &mut self.ownership,
            priorities: &self.priorities,
            package_roots: &package_roots,
        };
        let report = strategy_for(self.settings.mode).refresh(&mut ctx)?;

        self.save_ownership()?;
        Ok(report)
    }

    fn set_priority(&mut self, order: Vec<PackageId>) -> DeployResult<RefreshReport> {
        self.priorities.record(order);
        self.priorities.save(&self.state.priority_file())?;
        self.refresh()
    }

    fn setup(&mut self) -> DeployResult<()> {
        if self.settings.mode != DeploymentMode::DirectCopy {
            return Err(DeployError::WrongMode {
                expected: DeploymentMode::DirectCopy,
                actual: self.settings.mode,
            });
        }
        self.gc_stacks();
        if !self.ownership.is_empty() {
            return Err(DeployError::PackagesStillEnabled {
                count: self.ownership.package_ids().len(),
            });
        }

        let (target, overlay, hidden, _) = self.locations()?;
        setup_overlay_mode(&target, &overlay, &hidden)?;

        self.settings.mode = DeploymentMode::SymlinkOverlay;
        self.settings.save(&self.state.config_file())?;
        self.save_ownership()?;
        Ok(())
    }

    fn teardown(&mut self) -> DeployResult<TeardownReport> {
        if self.settings.mode != DeploymentMode::SymlinkOverlay {
            return Err(DeployError::WrongMode {
                expected: DeploymentMode::SymlinkOverlay,
                actual: self.settings.mode,
            });
        }

        let (target, overlay, hidden, _) = self.locations()?;
        let report = teardown_overlay_mode(&target, &overlay, &hidden)?;

        self.settings.mode = DeploymentMode::DirectCopy;
        self.settings.save(&self.state.config_file())?;
        Ok(report)
    }

    fn check(&self, id: &PackageId) -> DeployResult<IntegrityReport> {
        let package = self.packages.get(id)?;
        let manifest = PackageManifest::load(package.root()).map_err(|e| {
            DeployError::PackageStore(crate::package::PackageStoreError::Manifest(e))
        })?;
        check_integrity(&manifest, package.root())
    }

    fn uninstall(&mut self, id: &PackageId) -> DeployResult<()> {
        if self.ownership.contains_package(id) {
            return Err(DeployError::StillDeployed { id: id.clone() });
        }
        self.packages.uninstall(id)?;
        Ok(())
    }

    fn status(&self) -> DeployResult<StatusSnapshot> {
        let enabled_ids = self.ownership.package_ids();
        let packages = self
            .packages
            .list()?
            .into_iter()
            .map(|p| PackageStatus {
                enabled: enabled_ids.contains(&p.id),
                id: p.id,
                name: p.name,
            })
            .collect();
        Ok(StatusSnapshot {
            settings: self.settings.clone(),
            packages,
            tracked_paths: self.ownership.len(),
        })
    }

    /// Prune stack entries whose package directory is gone.
    fn gc_stacks(&mut self) {
        let packages = &self.packages;
        self.ownership.gc(|id| packages.is_installed(id));
    }
}
