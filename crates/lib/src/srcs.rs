//! Source classification.
//!
//! Splits an input file list into Go, header, and assembly sources, after
//! dropping files the build-constraint oracle disables for the target.

use std::path::PathBuf;

use crate::constraint::{self, Target};
use crate::error::{Error, Result};

/// The enabled sources of a package, partitioned by kind. Each list is
/// lexicographically sorted.
#[derive(Debug, Default, PartialEq)]
pub struct Sources {
  pub go: Vec<PathBuf>,
  pub headers: Vec<PathBuf>,
  pub asm: Vec<PathBuf>,
}

impl Sources {
  pub fn has_asm(&self) -> bool {
    !self.asm.is_empty()
  }
}

/// Partition `srcs` into Go files, header files, and assembly files.
///
/// Files disabled for the target are dropped silently. An enabled file
/// with any other extension is fatal: it would need a compiler this driver
/// does not drive.
pub fn classify(target: &Target, srcs: &[PathBuf]) -> Result<Sources> {
  let mut sources = Sources::default();

  for src in srcs {
    if !constraint::match_file(target, src)? {
      continue;
    }

    match src.extension().and_then(|e| e.to_str()) {
      Some("go") => sources.go.push(src.clone()),
      Some("h") => sources.headers.push(src.clone()),
      Some("s") => sources.asm.push(src.clone()),
      _ => {
        return Err(Error::Source {
          path: src.clone(),
          reason: "was neither a .go, .h, or .s file".to_string(),
        })
      }
    }
  }

  sources.go.sort();
  sources.headers.sort();
  sources.asm.sort();

  Ok(sources)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use tempfile::TempDir;

  fn target() -> Target {
    Target::new("linux", "amd64", "1.23.5")
  }

  fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
  }

  #[test]
  fn partitions_and_sorts_by_kind() {
    let dir = TempDir::new().unwrap();
    let b = write(&dir, "b.go", "package p\n");
    let a = write(&dir, "a.go", "package p\n");
    let h = write(&dir, "impl.h", "#define X 1\n");
    let s = write(&dir, "impl.s", "TEXT ·x(SB), $0\n");

    let sources = classify(&target(), &[b.clone(), s.clone(), h.clone(), a.clone()]).unwrap();
    assert_eq!(sources.go, vec![a, b]);
    assert_eq!(sources.headers, vec![h]);
    assert_eq!(sources.asm, vec![s]);
    assert!(sources.has_asm());
  }

  #[test]
  fn drops_disabled_files_silently() {
    let dir = TempDir::new().unwrap();
    let keep = write(&dir, "a.go", "package p\n");
    let skip = write(&dir, "a_windows.go", "package p\n");
    let tagged = write(&dir, "b.go", "//go:build darwin\npackage p\n");

    let sources = classify(&target(), &[keep.clone(), skip, tagged]).unwrap();
    assert_eq!(sources.go, vec![keep]);
  }

  #[test]
  fn enabled_foreign_source_is_fatal() {
    let dir = TempDir::new().unwrap();
    let c = write(&dir, "impl.c", "int x;\n");

    let err = classify(&target(), &[c]).unwrap_err();
    assert!(matches!(err, Error::Source { .. }));
  }

  #[test]
  fn unknown_extension_is_dropped_not_fatal() {
    let dir = TempDir::new().unwrap();
    let txt = write(&dir, "README.txt", "hi\n");

    let sources = classify(&target(), &[txt]).unwrap();
    assert_eq!(sources, Sources::default());
  }
}
