//! Per-unit orchestration
//!
//! A [`Pipeline`] owns every collaborator and the processed-state store. One
//! call to [`Pipeline::run_pass`] discovers the current units and drains them
//! one at a time, in discovery order. Stage failures stay local to their unit:
//! they are logged with the unit and stage, published as
//! [`Event::UnitFailed`], and the pass moves on.
//!
//! Per unit: identify the primary installer, extract every pending installer
//! into a fresh scratch workspace, resolve metadata (falling back on
//! failure), derive the name, build the archive, drop the workspace, relocate
//! the originals and record the relocated installers.

use crate::archive::{ArchiveBuilder, BuildOutcome, sweep_partial_archives};
use crate::config::{Config, RelocationAction};
use crate::discovery::UnitDiscovery;
use crate::error::{Result, StageError};
use crate::extraction::{
    InnoextractCli, InstallerExtractor, ScratchWorkspace, sweep_stale_workspaces,
};
use crate::metadata::{CatalogClient, MetadataResolver};
use crate::naming::NameNormalizer;
use crate::relocation::RelocationManager;
use crate::state::ProcessedStateStore;
use crate::types::{Event, PassSummary, ProcessingUnit, UnitOutcome};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Capacity of the event channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// The repack pipeline and everything it needs
pub struct Pipeline {
    config: Arc<Config>,
    state: ProcessedStateStore,
    discovery: UnitDiscovery,
    extractor: Arc<dyn InstallerExtractor>,
    resolver: Arc<dyn MetadataResolver>,
    archiver: ArchiveBuilder,
    relocator: RelocationManager,
    normalizer: NameNormalizer,
    event_tx: broadcast::Sender<Event>,
}

impl Pipeline {
    /// Assemble a pipeline from explicit collaborators
    ///
    /// Validates the configuration, loads the state file, removes stale
    /// scratch workspaces and partial archives, and creates the destination
    /// and processed-items folders.
    pub fn new(
        config: Config,
        extractor: Arc<dyn InstallerExtractor>,
        resolver: Arc<dyn MetadataResolver>,
        archiver: ArchiveBuilder,
    ) -> Result<Self> {
        config.validate()?;

        let state = ProcessedStateStore::load(config.state_file_path())?;
        info!(
            path = ?state.path(),
            entries = state.len(),
            "loaded processed state"
        );

        let stale = sweep_stale_workspaces(&config.scratch_root())?;
        if stale > 0 {
            info!(removed = stale, "cleaned up scratch workspaces from an earlier run");
        }

        std::fs::create_dir_all(config.dest_dir())?;
        let partials = sweep_partial_archives(config.dest_dir())?;
        if partials > 0 {
            info!(removed = partials, "cleaned up partial archives from an earlier run");
        }
        if config.relocation.action == RelocationAction::MoveToProcessed {
            std::fs::create_dir_all(config.processed_dir())?;
        }

        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            discovery: UnitDiscovery::from_config(&config),
            relocator: RelocationManager::from_config(&config),
            normalizer: NameNormalizer::new(config.naming.tag.clone()),
            config: Arc::new(config),
            state,
            extractor,
            resolver,
            archiver,
            event_tx,
        })
    }

    /// Pipeline backed by `innoextract`, the HTTP catalog and the configured
    /// archive format
    pub fn from_config(config: Config) -> Result<Self> {
        let extractor = InnoextractCli::from_config(&config.tools)?;
        let resolver = CatalogClient::new(&config.metadata)?;
        let archiver = ArchiveBuilder::from_config(&config)?;
        info!(
            extractor = ?extractor.binary_path(),
            format = ?archiver.format(),
            "pipeline tools resolved"
        );
        Self::new(config, Arc::new(extractor), Arc::new(resolver), archiver)
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Processed-state store
    pub fn state(&self) -> &ProcessedStateStore {
        &self.state
    }

    /// Subscribe to pipeline events
    ///
    /// Events sent while nobody is subscribed are dropped.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Discover and process every pending unit
    pub async fn run_pass(&mut self) -> Result<PassSummary> {
        self.run_pass_until(&CancellationToken::new()).await
    }

    /// Like [`Pipeline::run_pass`], stopping at the next unit boundary once
    /// `cancel` fires
    ///
    /// Only discovery errors are returned; unit failures are counted in the
    /// summary.
    pub async fn run_pass_until(&mut self, cancel: &CancellationToken) -> Result<PassSummary> {
        self.emit(Event::PassStarted {
            at: chrono::Utc::now(),
        });

        let units = self.discovery.discover(&self.state)?;
        let mut summary = PassSummary {
            discovered: units.len(),
            ..Default::default()
        };

        for unit in units {
            if cancel.is_cancelled() {
                info!("cancellation requested, stopping at unit boundary");
                break;
            }

            self.emit(Event::UnitDiscovered {
                source: unit.source.clone(),
                kind: unit.kind,
                installers: unit.installers.len(),
            });

            match self.process_unit(&unit).await {
                Ok(UnitOutcome::Archived { name, .. }) => {
                    summary.archived += 1;
                    self.emit(Event::UnitCompleted {
                        source: unit.source.clone(),
                        name,
                    });
                }
                Ok(UnitOutcome::Empty { .. }) => {
                    summary.skipped += 1;
                    warn!(unit = %unit.label(), "extraction produced no files, nothing archived");
                    self.emit(Event::UnitSkipped {
                        source: unit.source.clone(),
                        reason: "extraction produced no files".to_string(),
                    });
                }
                Ok(UnitOutcome::CollisionSkipped { archive }) => {
                    summary.skipped += 1;
                    warn!(unit = %unit.label(), ?archive, "archive exists, unit left in place");
                    self.emit(Event::UnitSkipped {
                        source: unit.source.clone(),
                        reason: format!("archive {} already exists", archive.display()),
                    });
                }
                Err(e) => {
                    summary.failed += 1;
                    error!(
                        unit = %unit.label(),
                        source = ?unit.source,
                        stage = %e.stage(),
                        originals_untouched = e.originals_untouched(),
                        error = %e,
                        "unit failed"
                    );
                    self.emit(Event::UnitFailed {
                        source: unit.source.clone(),
                        stage: e.stage(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            discovered = summary.discovered,
            archived = summary.archived,
            skipped = summary.skipped,
            failed = summary.failed,
            "pass finished"
        );
        self.emit(Event::PassFinished {
            summary: summary.clone(),
        });
        Ok(summary)
    }

    /// Run one unit through every stage
    pub async fn process_unit(
        &mut self,
        unit: &ProcessingUnit,
    ) -> std::result::Result<UnitOutcome, StageError> {
        info!(unit = %unit.label(), kind = ?unit.kind, installers = unit.installers.len(), "processing unit");

        let product_id = self
            .extractor
            .identify(&unit.primary)
            .await
            .map_err(|e| StageError::Identification {
                installer: unit.primary.clone(),
                reason: e.to_string(),
            })?;
        info!(installer = ?unit.primary, %product_id, "identified");
        self.emit(Event::Identified {
            installer: unit.primary.clone(),
            product_id: product_id.clone(),
        });

        let scratch = ScratchWorkspace::create(&self.config.scratch_root()).map_err(|e| {
            StageError::Extraction {
                installer: unit.primary.clone(),
                reason: format!("cannot create scratch workspace: {}", e),
            }
        })?;

        for installer in &unit.installers {
            self.emit(Event::Extracting {
                installer: installer.clone(),
            });
            info!(?installer, extractor = self.extractor.name(), "extracting");
            self.extractor
                .extract(installer, scratch.path())
                .await
                .map_err(|e| StageError::Extraction {
                    installer: installer.clone(),
                    reason: e.to_string(),
                })?;
        }

        let resolution = self.resolver.resolve(&product_id).await;
        self.emit(Event::MetadataResolved {
            product_id: product_id.clone(),
            title: resolution.metadata.title.clone(),
            year: resolution.metadata.year.clone(),
            fallback: resolution.fallback,
        });

        let name = self
            .normalizer
            .normalize(&resolution.metadata.title, &resolution.metadata.year);
        debug!(%name, "derived archive name");

        // a group whose primary was archived in an earlier pass adds to that archive
        let continuation = self.state.contains(&ProcessingUnit::key_for(&unit.primary));
        let dest = self.config.dest_dir();
        let built = if continuation {
            self.archiver.extend(scratch.path(), &name, dest).await
        } else {
            self.archiver.build(scratch.path(), &name, dest).await
        };
        let built = built.map_err(|e| StageError::Archive {
            archive: self.archiver.target_path(&name, dest),
            reason: e.to_string(),
        });

        if let Err(e) = scratch.close() {
            warn!(error = %e, "scratch workspace cleanup failed");
        }

        let archive = match built? {
            BuildOutcome::Written(path) => path,
            BuildOutcome::Empty => return Ok(UnitOutcome::Empty { name }),
            BuildOutcome::Skipped(archive) => return Ok(UnitOutcome::CollisionSkipped { archive }),
        };
        self.emit(Event::Archived {
            path: archive.clone(),
        });

        let relocation = self.relocator.finalize(unit, &name).await;
        self.emit(Event::Relocated {
            files: relocation.files,
            destination: relocation.destination.clone(),
        });

        let recorded: Vec<String> = relocation
            .installers
            .iter()
            .map(|installer| ProcessingUnit::key_for(installer))
            .collect();

        if let Err(e) = self.state.record_all(recorded.iter().cloned()) {
            if let Some(relocation_error) = &relocation.error {
                error!(error = %relocation_error, "relocation also failed");
            }
            return Err(StageError::StateStore {
                path: self.state.path().to_path_buf(),
                reason: e.to_string(),
            });
        }

        if let Some(e) = relocation.error {
            return Err(e);
        }

        info!(unit = %unit.label(), ?archive, "unit complete");
        Ok(UnitOutcome::Archived {
            archive,
            name,
            recorded,
        })
    }

    /// Paths of installers recorded as processed
    pub fn processed(&self) -> Vec<PathBuf> {
        self.state.keys().map(PathBuf::from).collect()
    }
}
