use std::fs;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use globset::{GlobBuilder, GlobMatcher};
use tempfile::{Builder, TempDir};

use crate::domain::{DatasetDescriptor, DatasetKind, RegionCode};
use crate::error::PrepError;
use crate::fs_util::move_file;

/// Shell-style pattern matched against a bare file name.
#[derive(Debug, Clone)]
pub struct FilePattern {
    source: String,
    matcher: GlobMatcher,
}

impl FilePattern {
    pub fn new(pattern: &str) -> Result<Self, PrepError> {
        let matcher = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|err| PrepError::Filesystem(format!("bad pattern {pattern}: {err}")))?
            .compile_matcher();
        Ok(Self {
            source: pattern.to_string(),
            matcher,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, file_name: &str) -> bool {
        self.matcher.is_match(file_name)
    }
}

/// Which staged files go where when an archive is organized.
#[derive(Debug, Clone)]
pub struct ManifestRule {
    pub pattern: FilePattern,
    pub kind: DatasetKind,
}

#[derive(Debug, Clone)]
pub struct Manifest {
    pub rules: Vec<ManifestRule>,
    /// Files matching this pattern are moved after all others, so a
    /// partially organized region never looks complete to the presence check.
    pub marker: FilePattern,
}

impl Manifest {
    /// `cat_*` and `riv_*` from a MERIT-Basins archive.
    pub fn basins(code: RegionCode) -> Result<Self, PrepError> {
        Ok(Self {
            rules: vec![
                ManifestRule {
                    pattern: FilePattern::new("cat_*")?,
                    kind: DatasetKind::CatchmentVectorArchive,
                },
                ManifestRule {
                    pattern: FilePattern::new("riv_*")?,
                    kind: DatasetKind::RiverVectorArchive,
                },
            ],
            marker: FilePattern::new(&format!("*pfaf_{code}_*.shp"))?,
        })
    }

    /// The simplified archive is moved wholesale.
    pub fn simplified() -> Result<Self, PrepError> {
        Ok(Self {
            rules: vec![ManifestRule {
                pattern: FilePattern::new("*")?,
                kind: DatasetKind::SimplifiedCatchmentArchive,
            }],
            marker: FilePattern::new("*.shp")?,
        })
    }

    fn route(&self, file_name: &str) -> Option<DatasetKind> {
        self.rules
            .iter()
            .find(|rule| rule.pattern.matches(file_name))
            .map(|rule| rule.kind)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrganizeReport {
    pub moved: Vec<Utf8PathBuf>,
    pub unmatched: Vec<String>,
}

/// Canonical on-disk layout below the data root.
#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

impl Store {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn kind_dir(&self, kind: DatasetKind) -> Utf8PathBuf {
        self.root.join(kind.canonical_directory())
    }

    pub fn descriptor_dir(&self, descriptor: &DatasetDescriptor) -> Utf8PathBuf {
        self.root.join(&descriptor.canonical_directory)
    }

    /// Final location of a raster. Archives have no single target file.
    pub fn raster_path(&self, descriptor: &DatasetDescriptor) -> Utf8PathBuf {
        self.descriptor_dir(descriptor)
            .join(&descriptor.local_staging_name)
    }

    pub fn ensure_dir(&self, kind: DatasetKind) -> Result<Utf8PathBuf, PrepError> {
        let dir = self.kind_dir(kind);
        fs::create_dir_all(dir.as_std_path())
            .map_err(|err| PrepError::Filesystem(format!("create {dir}: {err}")))?;
        Ok(dir)
    }

    pub fn ensure_root(&self) -> Result<(), PrepError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| PrepError::Filesystem(format!("create {}: {err}", self.root)))
    }

    /// True when the canonical directory holds a file matching the
    /// descriptor's presence glob.
    pub fn is_present(&self, descriptor: &DatasetDescriptor) -> Result<bool, PrepError> {
        let pattern = FilePattern::new(&descriptor.filename_glob_for_presence_check)?;
        Ok(!list_matching(self.descriptor_dir(descriptor).as_std_path(), &pattern)?.is_empty())
    }

    /// Scoped staging directory under the data root. Dropping the handle
    /// deletes it along with any archive or extracted files it holds.
    pub fn staging_dir(&self, label: &str) -> Result<TempDir, PrepError> {
        self.ensure_root()?;
        Builder::new()
            .prefix(&format!(".wsprep-{label}-"))
            .tempdir_in(self.root.as_std_path())
            .map_err(|err| PrepError::Filesystem(format!("create staging dir: {err}")))
    }

    /// Moves staged files into canonical directories according to the
    /// manifest. Files no rule claims stay behind and are reported.
    pub fn organize(&self, staging: &Path, manifest: &Manifest) -> Result<OrganizeReport, PrepError> {
        let mut planned = Vec::new();
        let mut report = OrganizeReport::default();

        for path in walk_files(staging)? {
            let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
                report.unmatched.push(path.display().to_string());
                continue;
            };
            match manifest.route(file_name) {
                Some(kind) => planned.push((manifest.marker.matches(file_name), kind, path.clone())),
                None => report.unmatched.push(file_name.to_string()),
            }
        }

        // markers last
        planned.sort_by_key(|(is_marker, _, _)| *is_marker);

        for (_, kind, source) in planned {
            let dir = self.ensure_dir(kind)?;
            let file_name = source
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| PrepError::Filesystem("non-utf8 file name in archive".to_string()))?;
            let target = dir.join(file_name);
            move_file(&source, target.as_std_path())?;
            report.moved.push(target);
        }

        report.unmatched.sort();
        Ok(report)
    }
}

/// Files directly inside `dir` whose name matches `pattern`. A missing
/// directory has no matches.
pub fn list_matching(dir: &Path, pattern: &FilePattern) -> Result<Vec<PathBuf>, PrepError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(dir)
        .map_err(|err| PrepError::Filesystem(format!("read {}: {err}", dir.display())))?;
    let mut matches = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| PrepError::Filesystem(err.to_string()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
            if pattern.matches(name) {
                matches.push(path);
            }
        }
    }
    matches.sort();
    Ok(matches)
}

fn walk_files(root: &Path) -> Result<Vec<PathBuf>, PrepError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries =
            fs::read_dir(&path).map_err(|err| PrepError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| PrepError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                items.push(path);
            }
        }
    }
    items.sort();
    Ok(items)
}
