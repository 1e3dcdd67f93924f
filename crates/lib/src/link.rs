//! The link driver.
//!
//! Linking reads the main package's metadata sidecar instead of re-scanning
//! sources: the sidecar's transitive closure, resolved against the
//! caller-supplied archive table, is exactly the package list the linker
//! needs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use tracing::info;

use gobuild_derivation::Derivation;

use crate::context::BuildContext;
use crate::error::{Error, Result};
use crate::importcfg::{self, MAIN_SENTINEL};
use crate::metadata::{self, base_name, Import, Package};
use crate::sdk::{self, Sdk};

/// Attributes for the `link` sub-command.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkAttrs {
  pub package_path: String,

  /// Store path of the pre-compiled main package.
  pub main: PathBuf,

  /// Output binary filename.
  pub name: String,

  /// Archive table covering the transitive closure of main's imports.
  #[serde(default)]
  pub deps: BTreeMap<String, PathBuf>,

  #[serde(default)]
  pub link_flags: Vec<String>,
}

/// The link importcfg entries: every package in main's closure resolved to
/// its archive, plus the sentinel binding for the main archive itself.
/// Sorted by import path; the sentinel sorts under its literal name.
fn link_entries(
  main: &Package,
  main_archive: &Path,
  deps: &BTreeMap<String, PathBuf>,
) -> Result<Vec<(String, PathBuf)>> {
  let mut entries = Vec::with_capacity(main.deps.len() + 1);

  for import_path in &main.deps {
    match deps.get(import_path) {
      Some(store_path) => {
        let import = Import {
          import_path: import_path.clone(),
          store_path: store_path.clone(),
        };
        entries.push((import_path.clone(), importcfg::archive_path(&import)));
      }
      None => {
        return Err(Error::Import {
          missing: import_path.clone(),
          needed_by: main.import_path.clone(),
        })
      }
    }
  }

  entries.push((MAIN_SENTINEL.to_string(), main_archive.to_path_buf()));
  entries.sort();

  Ok(entries)
}

/// A call to the linker for one binary.
pub struct Linkage<'a> {
  pub ctx: &'a BuildContext,
  pub sdk: &'a Sdk,
  pub main: &'a Package,
  pub main_store: &'a Path,
  pub deps: &'a BTreeMap<String, PathBuf>,
}

impl Linkage<'_> {
  /// Invoke the linker, producing the executable at `out`.
  pub fn link_package(&self, out: &Path, extra_args: &[String]) -> Result<()> {
    let main_archive = self
      .main_store
      .join(format!("{}.a", base_name(&self.main.import_path)));

    let (deps, _) = metadata::resolve_meta_packages(self.deps, &BTreeMap::new())?;
    let entries = link_entries(self.main, &main_archive, &deps)?;

    let cfg_path = self.ctx.build_dir()?.join("importcfg.link");
    importcfg::write_link_cfg(&cfg_path, &entries)?;

    let cmd = self.link_cmd(out, &cfg_path, &main_archive, extra_args);
    sdk::run(cmd, "link")?;

    info!(binary = %out.display(), "linked binary");
    Ok(())
  }

  fn link_cmd(&self, out: &Path, importcfg: &Path, main_archive: &Path, extra_args: &[String]) -> Command {
    let mut cmd = self.sdk.tool_cmd("link");
    cmd.env("CGO_ENABLED", "0");
    // The linker probes the ambient toolchain through GOROOT; the sandbox's
    // SDK must be the only one in play.
    cmd.env("GOROOT", "");

    cmd.args(extra_args);
    cmd.arg("-o").arg(out);
    cmd.arg("-importcfg").arg(importcfg);
    cmd.arg("-buildmode").arg("exe");
    cmd.arg(main_archive);

    cmd
  }
}

/// The `link` sub-command: produce `<out>/bin/<name>` from a pre-compiled
/// main package and its dependency closure.
pub fn run(derivation: &Derivation, ctx: &BuildContext, sdk: &Sdk) -> Result<()> {
  let attrs: LinkAttrs = derivation.attrs().map_err(Error::Attrs)?;

  let out_dir = derivation.output_dir("out")?;
  let bin_dir = out_dir.join("bin");
  std::fs::create_dir(&bin_dir)?;

  let main = metadata::load_package(&attrs.main, &attrs.package_path)?;

  let linkage = Linkage {
    ctx,
    sdk,
    main: &main,
    main_store: &attrs.main,
    deps: &attrs.deps,
  };
  linkage.link_package(&bin_dir.join(&attrs.name), &attrs.link_flags)
}
