//! On-disk experiment store
//!
//! Layout is `<root>/<kind>/<kind>-<name>.yaml`; the file stem equals the
//! resource name the manifest creates.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{StoreError, StoreResult};
use crate::experiment::FaultKind;
use crate::generate::FaultCollection;

const MANIFEST_EXTENSION: &str = "yaml";

/// A persisted experiment read back from disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedExperiment {
    pub kind: FaultKind,
    /// Target name, also the value of the manifest's `waitLabel`
    pub name: String,
    pub path: PathBuf,
    /// `metadata.namespace` of the manifest, when present
    pub namespace: Option<String>,
    pub manifest: String,
}

impl NamedExperiment {
    pub fn new(kind: FaultKind, name: impl Into<String>, path: PathBuf, manifest: String) -> Self {
        let namespace = manifest_namespace(&manifest);
        Self { kind, name: name.into(), path, namespace, manifest }
    }

    pub fn resource_name(&self) -> String {
        format!("{}-{}", self.kind, self.name)
    }
}

fn manifest_namespace(manifest: &str) -> Option<String> {
    let doc: serde_yaml::Value = serde_yaml::from_str(manifest).ok()?;
    doc.get("metadata")?
        .get("namespace")?
        .as_str()
        .map(str::to_string)
}

/// Directory holding generated experiments
#[derive(Debug, Clone)]
pub struct SpecStore {
    root: PathBuf,
}

impl SpecStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn kind_dir(&self, kind: FaultKind) -> PathBuf {
        self.root.join(kind.as_str())
    }

    pub fn experiment_path(&self, kind: FaultKind, name: &str) -> PathBuf {
        self.kind_dir(kind)
            .join(format!("{}-{}.{}", kind, name, MANIFEST_EXTENSION))
    }

    /// Replace the store contents with `collection`
    pub fn dump(&self, collection: &FaultCollection) -> StoreResult<()> {
        let reset_err = |source| StoreError::Reset { path: self.root.display().to_string(), source };

        if self.root.exists() {
            fs::remove_dir_all(&self.root).map_err(reset_err)?;
        }
        fs::create_dir_all(&self.root).map_err(reset_err)?;
        info!(dir = %self.root.display(), count = collection.len(), "Writing experiments to a dir");

        for kind in collection.kinds() {
            let dir = self.kind_dir(kind);
            fs::create_dir(&dir).map_err(|source| StoreError::Write { path: dir.display().to_string(), source })?;
        }
        for (kind, name, text) in collection.iter() {
            let path = self.experiment_path(kind, name);
            fs::write(&path, text).map_err(|source| StoreError::Write { path: path.display().to_string(), source })?;
        }
        Ok(())
    }

    /// Read experiments of the given kinds, kinds in the given order and files in name order
    pub fn read_experiments(&self, kinds: &[FaultKind]) -> StoreResult<Vec<NamedExperiment>> {
        let mut experiments = Vec::new();
        for kind in kinds {
            let dir = self.kind_dir(*kind);
            if !dir.is_dir() {
                warn!(dir = %dir.display(), "Experiments dir not found, skipping");
                continue;
            }
            for entry in WalkDir::new(&dir).min_depth(1).max_depth(1).sort_by_file_name() {
                let entry = entry?;
                let path = entry.path();
                if !entry.file_type().is_file()
                    || path.extension().and_then(|e| e.to_str()) != Some(MANIFEST_EXTENSION)
                {
                    continue;
                }
                experiments.push(self.load(*kind, path)?);
            }
        }
        debug!(count = experiments.len(), "Experiments read from dir");
        Ok(experiments)
    }

    /// Read one experiment by target name, resource name or file name
    pub fn read(&self, kind: FaultKind, name: &str) -> StoreResult<NamedExperiment> {
        let stem = name.strip_suffix(".yaml").unwrap_or(name);
        let path = self.experiment_path(kind, stem);
        if path.is_file() {
            return self.load(kind, &path);
        }

        let prefix = format!("{}-", kind);
        let stripped = stem.strip_prefix(&prefix).map(|target| self.experiment_path(kind, target));
        match stripped {
            Some(path) if path.is_file() => self.load(kind, &path),
            _ => Err(StoreError::NotFound { path: path.display().to_string() }),
        }
    }

    /// Target names stored for `kind`
    pub fn list_names(&self, kind: FaultKind) -> StoreResult<Vec<String>> {
        Ok(self
            .read_experiments(&[kind])?
            .into_iter()
            .map(|e| e.name)
            .collect())
    }

    fn load(&self, kind: FaultKind, path: &Path) -> StoreResult<NamedExperiment> {
        let manifest = fs::read_to_string(path)
            .map_err(|source| StoreError::Read { path: path.display().to_string(), source })?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let prefix = format!("{}-", kind);
        let name = stem.strip_prefix(&prefix).unwrap_or(stem);
        Ok(NamedExperiment::new(kind, name, path.to_path_buf(), manifest))
    }
}
