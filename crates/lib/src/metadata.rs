//! Package metadata sidecars.
//!
//! Every compiled package writes a small JSON file next to its export data
//! describing its direct imports and its transitive dependency closure.
//! Downstream invocations only ever see their direct inputs; the sidecars
//! are how they reconstruct the full dependency set the linker needs.
//!
//! # Sidecar layout
//!
//! ```text
//! <storePath>/
//! ├── fmt.x      # export data, input to downstream compiles
//! └── fmt.json   # {"Imports": [...], "Deps": [...]}
//! ```
//!
//! Meta packages (aggregate names such as `std`) use the same filename
//! rule with a different body: a list of sub-package bindings plus an
//! optional import-rewrite map.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Special import paths which represent a commonly used set of packages.
pub const META_PACKAGES: &[&str] = &["std"];

/// A resolved import: a package name bound to the store path holding its
/// outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Import {
  pub store_path: PathBuf,
  pub import_path: String,
}

/// Metadata for one compiled package.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Package {
  /// Implicit in the sidecar's filename; never serialized.
  #[serde(skip)]
  pub import_path: String,

  /// Direct imports, strictly ascending.
  #[serde(default)]
  pub imports: Vec<String>,

  /// Transitive dependency closure, strictly ascending. This is the
  /// linker's input list for any downstream binary.
  #[serde(default)]
  pub deps: Vec<String>,
}

/// Metadata for an aggregate package name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetaPackage {
  #[serde(skip)]
  pub import_path: String,

  /// The concrete packages backing the aggregate.
  #[serde(default)]
  pub sub_packages: Vec<Import>,

  /// Mapping from logically-named import paths to the canonical paths
  /// their archives live under.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub import_map: BTreeMap<String, String>,
}

/// The final path element of an import path.
pub fn base_name(import_path: &str) -> &str {
  import_path.rsplit('/').next().unwrap_or(import_path)
}

/// Where the sidecar for `import_path` lives inside `dir`.
pub fn sidecar_path(dir: &Path, import_path: &str) -> PathBuf {
  dir.join(format!("{}.json", base_name(import_path)))
}

fn save_json<T: Serialize>(dir: &Path, import_path: &str, data: &T) -> Result<()> {
  let path = sidecar_path(dir, import_path);
  let body = serde_json::to_string_pretty(data).map_err(|err| Error::Metadata {
    path: path.clone(),
    reason: err.to_string(),
  })?;
  fs::write(&path, body)?;
  Ok(())
}

fn load_json<T: serde::de::DeserializeOwned>(dir: &Path, import_path: &str) -> Result<T> {
  let path = sidecar_path(dir, import_path);
  let body = fs::read_to_string(&path).map_err(|err| Error::Metadata {
    path: path.clone(),
    reason: err.to_string(),
  })?;
  serde_json::from_str(&body).map_err(|err| Error::Metadata {
    path,
    reason: err.to_string(),
  })
}

/// Write a package sidecar into a store directory.
pub fn save_package(dir: &Path, pkg: &Package) -> Result<()> {
  save_json(dir, &pkg.import_path, pkg)
}

/// Load a package sidecar from a store directory.
pub fn load_package(dir: &Path, import_path: &str) -> Result<Package> {
  let mut pkg: Package = load_json(dir, import_path)?;
  pkg.import_path = import_path.to_string();
  Ok(pkg)
}

/// Write a meta-package sidecar into a store directory.
pub fn save_meta_package(dir: &Path, meta: &MetaPackage) -> Result<()> {
  save_json(dir, &meta.import_path, meta)
}

/// Load a meta-package sidecar from a store directory.
pub fn load_meta_package(dir: &Path, import_path: &str) -> Result<MetaPackage> {
  let mut meta: MetaPackage = load_json(dir, import_path)?;
  meta.import_path = import_path.to_string();
  Ok(meta)
}

/// Replace known meta packages in an imports table with their sub-packages.
///
/// Pure transformation: the inputs are never mutated. Bindings already in
/// the caller's table win over the meta package's entry with the same key,
/// and likewise for the import map.
pub fn resolve_meta_packages(
  imports: &BTreeMap<String, PathBuf>,
  import_map: &BTreeMap<String, String>,
) -> Result<(BTreeMap<String, PathBuf>, BTreeMap<String, String>)> {
  let mut imports = imports.clone();
  let mut import_map = import_map.clone();

  for &meta_name in META_PACKAGES {
    let Some(store_path) = imports.remove(meta_name) else {
      continue;
    };

    let meta = load_meta_package(&store_path, meta_name)?;
    for sub in meta.sub_packages {
      imports.entry(sub.import_path).or_insert(sub.store_path);
    }
    for (alias, canonical) in meta.import_map {
      import_map.entry(alias).or_insert(canonical);
    }
  }

  Ok((imports, import_map))
}

/// Resolve the direct import list and the transitive dependency closure of
/// a package, given its resolved imports. Each direct import's own closure
/// is loaded from the store path it was resolved to.
///
/// `resolved` must already be sorted by import path; both returned lists
/// are strictly ascending.
pub fn collect_deps(resolved: &[Import]) -> Result<(Vec<String>, Vec<String>)> {
  let mut imports = Vec::with_capacity(resolved.len());
  let mut deps = BTreeSet::new();

  for dep in resolved {
    imports.push(dep.import_path.clone());
    deps.insert(dep.import_path.clone());

    let pkg = load_package(&dep.store_path, &dep.import_path)?;
    deps.extend(pkg.deps);
  }

  Ok((imports, deps.into_iter().collect()))
}
