//! Standard-library aggregation.
//!
//! Two sub-commands. `stdlib list` asks the toolchain for the dependency
//! graph of every standard package and writes it to `spec.json`, which the
//! declarative layer consumes at graph-evaluation time to enumerate
//! per-package source lists and direct imports. `stdlib package` runs after
//! every standard package has been compiled and stitches them into a single
//! meta-package store path that downstream imports tables can name as
//! `std`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use gobuild_derivation::Derivation;

use crate::context::BuildContext;
use crate::error::{Error, Result};
use crate::imports::FILTERED_IMPORTS;
use crate::metadata::{self, base_name, Import, MetaPackage};
use crate::sdk::{self, Sdk};

/// The aggregate import path the meta package is published under.
pub const STDLIB_META: &str = "std";

/// Outputs of one already-compiled standard package.
#[derive(Debug, Clone, Deserialize)]
pub struct SubPackagePaths {
  pub lib: PathBuf,
  pub export: PathBuf,
}

/// Attributes for the `stdlib package` sub-command.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StdlibPackageAttrs {
  #[serde(default)]
  pub packages: BTreeMap<String, SubPackagePaths>,

  #[serde(default)]
  pub import_map: BTreeMap<String, String>,
}

/// Whether a listed package is internal to the toolchain and excluded from
/// the published listing.
fn filtered_from_listing(import_path: &str) -> bool {
  FILTERED_IMPORTS.contains(&import_path) || import_path.starts_with("cmd/")
}

/// The `stdlib list` sub-command: write the toolchain's own dependency
/// listing of the standard library to `<out>/spec.json`.
pub fn list(derivation: &Derivation, ctx: &BuildContext, sdk: &Sdk) -> Result<()> {
  let out_dir = derivation.output_dir("out")?;

  let mut cmd = sdk.go_cmd();
  cmd.args(["list", "-deps", "-json", STDLIB_META]);
  cmd.env("CGO_ENABLED", "0");
  // The sandbox has no writable home; the listing still needs a build
  // cache directory to exist.
  cmd.env("GOCACHE", ctx.build_dir()?.join("gocache"));
  let path = derivation.path();
  if !path.is_empty() {
    cmd.env("PATH", path);
  }

  let listing = sdk::run_capture(cmd, "go list")?;

  // `go list -json` emits a stream of concatenated objects; re-frame the
  // survivors as a single JSON array the evaluator can decode.
  let mut records = Vec::new();
  for record in serde_json::Deserializer::from_str(&listing).into_iter::<serde_json::Value>() {
    let record = record.map_err(|err| Error::Toolchain {
      path: sdk.path.clone(),
      reason: format!("unexpected go list output: {err}"),
    })?;

    let import_path = record.get("ImportPath").and_then(|v| v.as_str()).unwrap_or_default();
    if filtered_from_listing(import_path) {
      continue;
    }
    records.push(record);
  }

  let spec_path = out_dir.join("spec.json");
  let body = serde_json::to_string_pretty(&records).map_err(|err| Error::Metadata {
    path: spec_path.clone(),
    reason: err.to_string(),
  })?;
  fs::write(&spec_path, body)?;

  info!(packages = records.len(), path = %spec_path.display(), "wrote stdlib listing");
  Ok(())
}

/// The `stdlib package` sub-command: aggregate compiled standard packages
/// into one meta-package store path.
pub fn package(derivation: &Derivation) -> Result<()> {
  let attrs: StdlibPackageAttrs = derivation.attrs().map_err(Error::Attrs)?;

  let lib_dir = derivation.output_dir("lib")?;
  let export_dir = derivation.output_dir("export")?;

  aggregate(&attrs.packages, &attrs.import_map, &lib_dir, &export_dir)
}

/// Build the symlink farm and both sidecars.
///
/// Sub-package files keep their import path's directory structure, so
/// `crypto/rand` and `math/rand` coexist. Each output carries its own
/// `std.json` whose sub-package store paths point into that output: the
/// export copy serves downstream compiles (`.x` + `.json`), the lib copy
/// serves downstream links (`.a`).
fn aggregate(
  packages: &BTreeMap<String, SubPackagePaths>,
  import_map: &BTreeMap<String, String>,
  lib_dir: &Path,
  export_dir: &Path,
) -> Result<()> {
  let mut lib_subs = Vec::with_capacity(packages.len());
  let mut export_subs = Vec::with_capacity(packages.len());

  for (import_path, paths) in packages {
    let base = base_name(import_path);
    let (lib_sub, export_sub) = match import_path.rsplit_once('/') {
      Some((dir, _)) => (lib_dir.join(dir), export_dir.join(dir)),
      None => (lib_dir.to_path_buf(), export_dir.to_path_buf()),
    };
    fs::create_dir_all(&lib_sub)?;
    fs::create_dir_all(&export_sub)?;

    symlink(&paths.lib.join(format!("{base}.a")), &lib_sub.join(format!("{base}.a")))?;
    symlink(&paths.export.join(format!("{base}.x")), &export_sub.join(format!("{base}.x")))?;
    symlink(
      &paths.export.join(format!("{base}.json")),
      &export_sub.join(format!("{base}.json")),
    )?;

    lib_subs.push(Import {
      import_path: import_path.clone(),
      store_path: lib_sub,
    });
    export_subs.push(Import {
      import_path: import_path.clone(),
      store_path: export_sub,
    });
  }

  metadata::save_meta_package(
    export_dir,
    &MetaPackage {
      import_path: STDLIB_META.to_string(),
      sub_packages: export_subs,
      import_map: import_map.clone(),
    },
  )?;
  metadata::save_meta_package(
    lib_dir,
    &MetaPackage {
      import_path: STDLIB_META.to_string(),
      sub_packages: lib_subs,
      import_map: import_map.clone(),
    },
  )?;

  info!(packages = packages.len(), "aggregated standard library");
  Ok(())
}

#[cfg(unix)]
fn symlink(original: &Path, link: &Path) -> std::io::Result<()> {
  std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
fn symlink(original: &Path, link: &Path) -> std::io::Result<()> {
  std::os::windows::fs::symlink_file(original, link)
}
