//! Per-invocation build workspace.
//!
//! Each driver invocation owns one scratch directory for generated files
//! (importcfg, embedcfg, assembled objects, header aliases). The directory
//! is created on first use and lives until the process exits; the sandbox
//! discards it along with everything else.

use std::cell::OnceCell;
use std::path::Path;

use tempfile::TempDir;
use tracing::debug;

use crate::error::Result;

/// Holds the lazily-created scratch directory for one invocation.
///
/// Threaded through the call graph rather than held as process state; the
/// driver is single-threaded, so interior mutability via [`OnceCell`] is
/// enough.
#[derive(Default)]
pub struct BuildContext {
  scratch: OnceCell<TempDir>,
}

impl BuildContext {
  pub fn new() -> Self {
    Self::default()
  }

  /// The shared scratch directory, creating it on first call. Subsequent
  /// calls return the same path.
  pub fn build_dir(&self) -> Result<&Path> {
    match self.scratch.get() {
      Some(dir) => Ok(dir.path()),
      None => {
        let dir = tempfile::Builder::new().prefix("gobuild").tempdir()?;
        debug!(path = %dir.path().display(), "created build directory");
        Ok(self.scratch.get_or_init(|| dir).path())
      }
    }
  }

  /// The parallelism the sandbox requested via `$NIX_BUILD_CORES`.
  pub fn parallelism(&self) -> Result<usize> {
    Ok(gobuild_derivation::build_cores()?)
  }
}
