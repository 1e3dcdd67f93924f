//! Importcfg emission.
//!
//! The compiler and linker both consume a line-oriented file mapping import
//! paths to on-disk files. The compiler reads export descriptors (`.x`);
//! the linker reads full archives (`.a`). Rewrites appear as `importmap`
//! lines in the compile variant only.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::imports::Rewrite;
use crate::metadata::{base_name, Import};

/// The well-known name the toolchain gives a main package built from an
/// explicit file list. The link importcfg binds it to the main archive.
pub const MAIN_SENTINEL: &str = "command-line-arguments";

/// Write the importcfg consumed by the compiler: one `importmap` line per
/// rewrite, one `packagefile` line per resolved import pointing at its
/// export descriptor.
pub fn write_compile_cfg(path: &Path, rewrites: &[Rewrite], imports: &[Import]) -> Result<()> {
  let mut cfg = String::new();
  for rewrite in rewrites {
    let _ = writeln!(cfg, "importmap {}={}", rewrite.alias, rewrite.canonical);
  }
  for import in imports {
    let _ = writeln!(
      cfg,
      "packagefile {}={}/{}.x",
      import.import_path,
      import.store_path.display(),
      base_name(&import.import_path),
    );
  }

  fs::write(path, cfg)?;
  Ok(())
}

/// Write the importcfg consumed by the linker: one `packagefile` line per
/// entry pointing at an archive. Entries are `(importPath, archive)` pairs
/// because the [`MAIN_SENTINEL`] binds to the main package's archive, whose
/// filename comes from the package path rather than the sentinel name.
pub fn write_link_cfg(path: &Path, entries: &[(String, std::path::PathBuf)]) -> Result<()> {
  let mut cfg = String::new();
  for (import_path, archive) in entries {
    let _ = writeln!(cfg, "packagefile {}={}", import_path, archive.display());
  }

  fs::write(path, cfg)?;
  Ok(())
}

/// The archive file for an import binding: `<storePath>/<basename>.a`.
pub fn archive_path(import: &Import) -> std::path::PathBuf {
  import
    .store_path
    .join(format!("{}.a", base_name(&import.import_path)))
}
