//! Assembly integration.
//!
//! Mixing assembly into a package needs some ceremony around the compiler:
//! an (initially empty) `go_asm.h` the compiler writes and the assembler
//! includes, platform-suffixed headers aliased to their generic names, a
//! symbol-table pre-pass (`symabis`) handed to the compiler, and a final
//! archive append of the assembled objects.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::constraint::Target;
use crate::error::Result;
use crate::sdk::{self, Sdk};

/// Create the empty `go_asm.h` the compiler fills in via `-asmhdr`.
pub fn touch_asm_header(build_dir: &Path) -> Result<PathBuf> {
  let path = build_dir.join("go_asm.h");
  fs::write(&path, "")?;
  Ok(path)
}

/// Alias platform-suffixed headers to their generic names.
///
/// Cross-platform assembly includes headers by parameterized name, e.g.
/// `impl_GOOS_GOARCH.h`; the matching concrete header (`impl_linux_amd64.h`)
/// is symlinked into the build directory under the generic name. Longest
/// suffix first, so a name ending in `_<os>_<arch>` is never misread as
/// ending in `_<arch>`.
pub fn alias_platform_headers(build_dir: &Path, target: &Target, headers: &[PathBuf]) -> Result<()> {
  let platform_suffix = format!("_{}_{}.h", target.goos, target.goarch);
  let goos_suffix = format!("_{}.h", target.goos);
  let goarch_suffix = format!("_{}.h", target.goarch);

  for path in headers {
    let base = match path.file_name().and_then(|n| n.to_str()) {
      Some(base) => base,
      None => continue,
    };

    let aliased = if let Some(stem) = base.strip_suffix(&platform_suffix) {
      Some(format!("{stem}_GOOS_GOARCH.h"))
    } else if let Some(stem) = base.strip_suffix(&goos_suffix) {
      Some(format!("{stem}_GOOS.h"))
    } else if let Some(stem) = base.strip_suffix(&goarch_suffix) {
      Some(format!("{stem}_GOARCH.h"))
    } else {
      None
    };

    if let Some(aliased) = aliased {
      symlink(path, &build_dir.join(aliased))?;
    }
  }

  Ok(())
}

/// The include path list for the assembler: the build directory, the SDK's
/// include directory, and each distinct directory of caller-supplied
/// headers that is not inside the SDK's. Sorted for reproducible argv.
pub fn include_dirs(build_dir: &Path, sdk_include: &Path, headers: &[PathBuf]) -> Vec<PathBuf> {
  let mut dirs = BTreeSet::from([build_dir.to_path_buf(), sdk_include.to_path_buf()]);

  for header in headers {
    if let Some(dir) = header.parent() {
      // Assembly headers in the SDK are common enough to special-case.
      if dir.starts_with(sdk_include) {
        continue;
      }
      dirs.insert(dir.to_path_buf());
    }
  }

  dirs.into_iter().collect()
}

/// A configured assembler for one package.
pub struct Assembler<'a> {
  pub sdk: &'a Sdk,
  pub target: &'a Target,
  pub import_path: &'a str,
  pub trim_path: &'a str,
  pub includes: &'a [PathBuf],
}

impl Assembler<'_> {
  /// Assemble `srcs` into `out`. With `gen_symabis`, the output is the
  /// symbol-table summary the compiler needs instead of an object file.
  pub fn assemble(&self, srcs: &[PathBuf], out: &Path, gen_symabis: bool) -> Result<PathBuf> {
    let mut cmd = self.sdk.tool_cmd("asm");
    cmd.env("CGO_ENABLED", "0");

    if gen_symabis {
      cmd.arg("-gensymabis");
    }
    cmd.arg("-p").arg(self.import_path);
    cmd.arg("-trimpath").arg(self.trim_path);
    for dir in self.includes {
      cmd.arg("-I").arg(dir);
    }
    cmd.arg("-D").arg(format!("GOOS_{}", self.target.goos));
    cmd.arg("-D").arg(format!("GOARCH_{}", self.target.goarch));
    cmd.arg("-o").arg(out);
    cmd.args(srcs);

    sdk::run(cmd, "asm")?;
    Ok(out.to_path_buf())
  }
}

/// Append object files to an existing archive.
pub fn append_archive(sdk: &Sdk, archive: &Path, objs: &[PathBuf]) -> Result<()> {
  let mut cmd = sdk.tool_cmd("pack");
  cmd.arg("r").arg(archive).args(objs);
  sdk::run(cmd, "pack")
}

#[cfg(unix)]
fn symlink(original: &Path, link: &Path) -> std::io::Result<()> {
  std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
fn symlink(original: &Path, link: &Path) -> std::io::Result<()> {
  std::os::windows::fs::symlink_file(original, link)
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn target() -> Target {
    Target::new("linux", "amd64", "1.23.5")
  }

  #[test]
  fn aliases_platform_suffixed_headers() {
    let build = TempDir::new().unwrap();
    let srcs = TempDir::new().unwrap();

    let full = srcs.path().join("impl_linux_amd64.h");
    let os_only = srcs.path().join("defs_linux.h");
    let arch_only = srcs.path().join("regs_amd64.h");
    let plain = srcs.path().join("common.h");
    for p in [&full, &os_only, &arch_only, &plain] {
      fs::write(p, "").unwrap();
    }

    alias_platform_headers(
      build.path(),
      &target(),
      &[full.clone(), os_only, arch_only, plain],
    )
    .unwrap();

    assert_eq!(
      fs::read_link(build.path().join("impl_GOOS_GOARCH.h")).unwrap(),
      full
    );
    assert!(build.path().join("defs_GOOS.h").symlink_metadata().is_ok());
    assert!(build.path().join("regs_GOARCH.h").symlink_metadata().is_ok());
    assert!(build.path().join("common.h").symlink_metadata().is_err());
  }

  #[test]
  fn full_platform_suffix_wins_over_arch_suffix() {
    let build = TempDir::new().unwrap();
    let srcs = TempDir::new().unwrap();

    // Ends in both "_linux_amd64.h" and "_amd64.h"; only the longer rule
    // may fire.
    let header = srcs.path().join("impl_linux_amd64.h");
    fs::write(&header, "").unwrap();

    alias_platform_headers(build.path(), &target(), &[header]).unwrap();

    assert!(build.path().join("impl_GOOS_GOARCH.h").symlink_metadata().is_ok());
    assert!(build.path().join("impl_linux_GOARCH.h").symlink_metadata().is_err());
  }

  #[test]
  fn include_dirs_dedupe_and_skip_sdk_headers() {
    let build = PathBuf::from("/build");
    let sdk_include = PathBuf::from("/sdk/pkg/include");

    let headers = vec![
      PathBuf::from("/src/pkg/a.h"),
      PathBuf::from("/src/pkg/b.h"),
      PathBuf::from("/sdk/pkg/include/textflag.h"),
      PathBuf::from("/other/c.h"),
    ];

    let dirs = include_dirs(&build, &sdk_include, &headers);
    assert_eq!(
      dirs,
      vec![
        PathBuf::from("/build"),
        PathBuf::from("/other"),
        PathBuf::from("/sdk/pkg/include"),
        PathBuf::from("/src/pkg"),
      ]
    );
  }

  #[test]
  fn touch_asm_header_creates_empty_file() {
    let build = TempDir::new().unwrap();
    let path = touch_asm_header(build.path()).unwrap();
    assert_eq!(path, build.path().join("go_asm.h"));
    assert_eq!(fs::read(&path).unwrap(), b"");
  }
}
