use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::config::Settings;
use crate::crs::{self, Crs};
use crate::domain::{DatasetDescriptor, DatasetKind, RegionCode, RegionSelector};
use crate::error::PrepError;
use crate::fetch::{FetchOutcome, Fetcher, fetch_if_absent};
use crate::fs_util::extract_zip;
use crate::outlet;
use crate::store::{Manifest, OrganizeReport, Store};

#[derive(Debug, Clone, Copy, Default)]
pub struct AcquireOptions {
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    /// Already on disk, nothing fetched.
    Present,
    Downloaded,
    /// Dry run: would be downloaded.
    Planned,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub kind: DatasetKind,
    pub action: StepAction,
    pub url: String,
    pub path: String,
    /// Archive members no manifest rule claimed; left in staging and dropped.
    pub unmatched: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegionResult {
    pub code: RegionCode,
    pub steps: Vec<StepResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcquireResult {
    pub base_path: String,
    pub acquired_at: String,
    pub downloads: usize,
    pub regions: Vec<RegionResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NormalizeResult {
    pub input: String,
    pub output: String,
    pub outlets: usize,
    pub source_crs: Option<String>,
    pub columns: Vec<String>,
    pub duplicate_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink: Sync {
    fn event(&self, event: ProgressEvent);
}

fn emit(sink: &dyn ProgressSink, message: String, elapsed: Option<Duration>) {
    sink.event(ProgressEvent { message, elapsed });
}

/// Dataset acquisition for one data root.
pub struct App<F: Fetcher> {
    settings: Settings,
    store: Store,
    fetcher: F,
    /// Whether the shared simplified archive was fetched during this run.
    /// Held across the presence check and the download.
    simplified: Mutex<bool>,
}

impl<F: Fetcher> App<F> {
    pub fn new(settings: Settings, fetcher: F) -> Self {
        let store = Store::new(settings.base_path.clone());
        Self {
            settings,
            store,
            fetcher,
            simplified: Mutex::new(false),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Resolves the selector and acquires every dataset for each code.
    ///
    /// Validation of the whole selection happens before anything touches
    /// the filesystem.
    pub fn acquire(
        &self,
        selector: &RegionSelector,
        options: AcquireOptions,
        sink: &dyn ProgressSink,
    ) -> Result<AcquireResult, PrepError> {
        let codes = selector.resolve()?;
        emit(
            sink,
            format!("phase=Resolve; {} region code(s)", codes.len()),
            None,
        );

        let jobs = self.settings.jobs.max(1).min(codes.len().max(1));
        let regions = if jobs <= 1 {
            codes
                .iter()
                .map(|code| self.acquire_region(*code, options, sink))
                .collect::<Result<Vec<_>, PrepError>>()?
        } else {
            self.acquire_parallel(&codes, jobs, options, sink)?
        };

        // catchments and rivers share one archive url
        let downloads = regions
            .iter()
            .flat_map(|region| &region.steps)
            .filter(|step| step.action == StepAction::Downloaded)
            .map(|step| step.url.as_str())
            .collect::<BTreeSet<_>>()
            .len();

        Ok(AcquireResult {
            base_path: self.store.root().to_string(),
            acquired_at: chrono::Utc::now().to_rfc3339(),
            downloads,
            regions,
        })
    }

    fn acquire_parallel(
        &self,
        codes: &[RegionCode],
        jobs: usize,
        options: AcquireOptions,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<RegionResult>, PrepError> {
        let next = AtomicUsize::new(0);
        let slots: Vec<Mutex<Option<Result<RegionResult, PrepError>>>> =
            codes.iter().map(|_| Mutex::new(None)).collect();

        thread::scope(|scope| {
            for _ in 0..jobs {
                scope.spawn(|| {
                    loop {
                        let index = next.fetch_add(1, Ordering::SeqCst);
                        let Some(code) = codes.get(index) else {
                            break;
                        };
                        let result = self.acquire_region(*code, options, sink);
                        *slots[index].lock().unwrap_or_else(PoisonError::into_inner) =
                            Some(result);
                    }
                });
            }
        });

        slots
            .into_iter()
            .map(|slot| {
                slot.into_inner()
                    .unwrap_or_else(PoisonError::into_inner)
                    .unwrap_or_else(|| {
                        Err(PrepError::Filesystem("region worker did not finish".to_string()))
                    })
            })
            .collect()
    }

    /// Basin rasters, then the catchment/river archive, then the simplified
    /// catchment guard.
    pub fn acquire_region(
        &self,
        code: RegionCode,
        options: AcquireOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RegionResult, PrepError> {
        info!(%code, "acquiring region");
        let start = Instant::now();

        let mut steps = vec![
            self.fetch_raster(DatasetKind::FlowAccumulationRaster, code, options, sink)?,
            self.fetch_raster(DatasetKind::FlowDirectionRaster, code, options, sink)?,
        ];
        steps.extend(self.fetch_basins(code, options, sink)?);
        steps.push(self.fetch_simplified(code, options, sink)?);

        emit(
            sink,
            format!("phase=Done; region {code}"),
            Some(start.elapsed()),
        );
        Ok(RegionResult { code, steps })
    }

    pub fn fetch_raster(
        &self,
        kind: DatasetKind,
        code: RegionCode,
        options: AcquireOptions,
        sink: &dyn ProgressSink,
    ) -> Result<StepResult, PrepError> {
        let descriptor = DatasetDescriptor::resolve(kind, code, &self.settings);
        let path = self.store.raster_path(&descriptor);

        let action = if options.dry_run {
            if path.as_std_path().exists() {
                StepAction::Present
            } else {
                StepAction::Planned
            }
        } else {
            self.store.ensure_dir(kind)?;
            emit(sink, format!("phase=Fetch; {kind} {code}"), None);
            match fetch_if_absent(&self.fetcher, &descriptor.remote_url, path.as_std_path())? {
                FetchOutcome::AlreadyPresent => StepAction::Present,
                FetchOutcome::Downloaded => StepAction::Downloaded,
            }
        };

        Ok(StepResult {
            kind,
            action,
            url: descriptor.remote_url,
            path: path.to_string(),
            unmatched: Vec::new(),
        })
    }

    /// Catchments and rivers come from one archive per region. The archive
    /// is only fetched when either set is missing.
    pub fn fetch_basins(
        &self,
        code: RegionCode,
        options: AcquireOptions,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<StepResult>, PrepError> {
        let catchments =
            DatasetDescriptor::resolve(DatasetKind::CatchmentVectorArchive, code, &self.settings);
        let rivers =
            DatasetDescriptor::resolve(DatasetKind::RiverVectorArchive, code, &self.settings);

        let complete = self.store.is_present(&catchments)? && self.store.is_present(&rivers)?;
        let (action, unmatched) = if complete {
            (StepAction::Present, Vec::new())
        } else if options.dry_run {
            (StepAction::Planned, Vec::new())
        } else {
            emit(sink, format!("phase=Fetch; basins archive {code}"), None);
            let report = self.fetch_and_organize(
                &catchments,
                &format!("basins-{code}"),
                &Manifest::basins(code)?,
            )?;
            for descriptor in [&catchments, &rivers] {
                if !self.store.is_present(descriptor)? {
                    return Err(PrepError::Archive {
                        path: descriptor.local_staging_name.clone().into(),
                        message: format!(
                            "archive holds no {}",
                            descriptor.filename_glob_for_presence_check
                        ),
                    });
                }
            }
            (StepAction::Downloaded, report.unmatched)
        };

        Ok(vec![
            StepResult {
                kind: catchments.kind,
                action,
                url: catchments.remote_url.clone(),
                path: self.store.descriptor_dir(&catchments).to_string(),
                unmatched,
            },
            StepResult {
                kind: rivers.kind,
                action,
                url: rivers.remote_url.clone(),
                path: self.store.descriptor_dir(&rivers).to_string(),
                unmatched: Vec::new(),
            },
        ])
    }

    /// Presence guard for the shared simplified-catchment archive.
    ///
    /// The check runs per code, but the download is global: the first code
    /// that finds its files missing fetches the archive once, and every
    /// later code in the run is served by that copy.
    pub fn fetch_simplified(
        &self,
        code: RegionCode,
        options: AcquireOptions,
        sink: &dyn ProgressSink,
    ) -> Result<StepResult, PrepError> {
        let descriptor = DatasetDescriptor::resolve(
            DatasetKind::SimplifiedCatchmentArchive,
            code,
            &self.settings,
        );
        let step = |action, unmatched| StepResult {
            kind: descriptor.kind,
            action,
            url: descriptor.remote_url.clone(),
            path: self.store.descriptor_dir(&descriptor).to_string(),
            unmatched,
        };

        if self.store.is_present(&descriptor)? {
            return Ok(step(StepAction::Present, Vec::new()));
        }
        if options.dry_run {
            return Ok(step(StepAction::Planned, Vec::new()));
        }

        let mut fetched = self
            .simplified
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.store.is_present(&descriptor)? {
            return Ok(step(StepAction::Present, Vec::new()));
        }
        let not_covered = || PrepError::Archive {
            path: descriptor.local_staging_name.clone().into(),
            message: format!(
                "simplified catchments hold no {}",
                descriptor.filename_glob_for_presence_check
            ),
        };
        if *fetched {
            return Err(not_covered());
        }

        emit(sink, "phase=Fetch; simplified catchments".to_string(), None);
        let report =
            self.fetch_and_organize(&descriptor, "simplified", &Manifest::simplified()?)?;
        *fetched = true;

        if !self.store.is_present(&descriptor)? {
            warn!(%code, "simplified archive does not cover region");
            return Err(not_covered());
        }
        Ok(step(StepAction::Downloaded, report.unmatched))
    }

    /// Downloads an archive into a scoped staging directory, unpacks it
    /// there and files the members into the canonical tree. The staging
    /// directory, archive included, is removed on every exit path.
    fn fetch_and_organize(
        &self,
        descriptor: &DatasetDescriptor,
        label: &str,
        manifest: &Manifest,
    ) -> Result<OrganizeReport, PrepError> {
        let staging = self.store.staging_dir(label)?;
        let archive = staging.path().join(&descriptor.local_staging_name);
        let extracted = staging.path().join("extracted");

        let start = Instant::now();
        fetch_if_absent(&self.fetcher, &descriptor.remote_url, &archive)?;
        info!(
            url = %descriptor.remote_url,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "archive downloaded"
        );

        let files = extract_zip(&archive, &extracted)?;
        let report = self.store.organize(&extracted, manifest)?;
        info!(
            archive = %descriptor.local_staging_name,
            files,
            moved = report.moved.len(),
            "archive organized"
        );
        if !report.unmatched.is_empty() {
            warn!(
                archive = %descriptor.local_staging_name,
                unmatched = report.unmatched.len(),
                "archive members matched no pattern and were discarded"
            );
        }
        Ok(report)
    }
}

/// Reads an outlet file, reprojects it to EPSG:4326 and writes the
/// canonical outlet table to `output`.
pub fn normalize_outlets(
    input: &Path,
    output: &Path,
    crs_override: Option<Crs>,
    sink: &dyn ProgressSink,
) -> Result<NormalizeResult, PrepError> {
    emit(sink, format!("phase=Read; {}", input.display()), None);
    let mut collection = outlet::read_outlets(input, crs_override)?;
    let source_crs = collection.crs.map(|crs| crs.to_string());

    emit(sink, "phase=Reproject; EPSG:4326".to_string(), None);
    crs::normalize(&mut collection)?;

    let duplicate_ids = outlet::duplicate_ids(&collection);
    if !duplicate_ids.is_empty() {
        warn!(count = duplicate_ids.len(), "outlet ids are not unique");
    }

    emit(sink, format!("phase=Write; {}", output.display()), None);
    outlet::write_canonical_file(output, &collection)?;

    let mut columns = vec!["id".to_string(), "lng".to_string(), "lat".to_string()];
    if collection.has_name {
        columns.push("name".to_string());
    }
    if collection.has_area {
        columns.push("area".to_string());
    }

    Ok(NormalizeResult {
        input: input.display().to_string(),
        output: output.display().to_string(),
        outlets: collection.outlets.len(),
        source_crs,
        columns,
        duplicate_ids,
    })
}
