//! Handle to an installed Go SDK.
//!
//! The SDK root comes from the derivation's `sdk` attribute. Loading the
//! handle probes the toolchain's self-reported version once; everything
//! else is derived paths (`pkg/tool/<os>_<arch>`, `pkg/include`) and
//! process specs for the individual tools.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::error::{Error, Result};

/// The GOOS value for the running host.
pub fn host_goos() -> &'static str {
  match std::env::consts::OS {
    "macos" => "darwin",
    other => other,
  }
}

/// The GOARCH value for the running host.
pub fn host_goarch() -> &'static str {
  match std::env::consts::ARCH {
    "x86_64" => "amd64",
    "x86" => "386",
    "aarch64" => "arm64",
    "powerpc64" => "ppc64",
    "loongarch64" => "loong64",
    other => other,
  }
}

/// The current host platform, as `<GOOS>_<GOARCH>`.
pub fn host_platform() -> String {
  format!("{}_{}", host_goos(), host_goarch())
}

/// Holds information about a specific instance of the Go SDK.
#[derive(Debug, Clone)]
pub struct Sdk {
  /// Path to the SDK root. This is usually `$GOROOT`.
  pub path: PathBuf,

  /// Version of the SDK, without the `go` prefix (e.g. `1.23.5`).
  pub version: String,

  /// User-requested language version to maintain compatibility with.
  pub compat_version: String,
}

impl Sdk {
  /// Load information about a copy of the Go SDK and create a handle for
  /// using it.
  ///
  /// If `compat` is empty, the compatibility version defaults to the
  /// `major.minor` slice of the detected version.
  pub fn load(path: &Path, compat: &str) -> Result<Self> {
    let tool_dir = path.join("pkg").join("tool").join(host_platform());
    if !tool_dir.is_dir() {
      return Err(Error::Toolchain {
        path: path.to_path_buf(),
        reason: format!("missing tool directory {}", tool_dir.display()),
      });
    }
    if !path.join("pkg").join("include").is_dir() {
      return Err(Error::Toolchain {
        path: path.to_path_buf(),
        reason: "missing pkg/include directory".to_string(),
      });
    }

    let mut sdk = Sdk {
      path: path.to_path_buf(),
      version: String::new(),
      compat_version: compat.to_string(),
    };
    sdk.version = sdk.compiler_version()?;
    if sdk.compat_version.is_empty() {
      sdk.compat_version = format!("go{}", sdk.short_version());
    }

    debug!(version = %sdk.version, compat = %sdk.compat_version, "loaded sdk");
    Ok(sdk)
  }

  /// The `major.minor` of the SDK, without the patch number.
  pub fn short_version(&self) -> &str {
    match self.version.rfind('.') {
      Some(dot) => &self.version[..dot],
      None => &self.version,
    }
  }

  /// The `pkg/include` directory of the SDK.
  pub fn include_dir(&self) -> PathBuf {
    self.path.join("pkg").join("include")
  }

  /// A process spec for calling a given tool in the SDK.
  pub fn tool_cmd(&self, tool: &str) -> Command {
    let bin = self.path.join("pkg").join("tool").join(host_platform()).join(tool);
    Command::new(bin)
  }

  /// A process spec for calling the main `go` binary.
  pub fn go_cmd(&self) -> Command {
    Command::new(self.path.join("bin").join("go"))
  }

  /// Parse the compiler version from the output of `go version`.
  fn compiler_version(&self) -> Result<String> {
    let mut cmd = self.go_cmd();
    cmd.arg("version");
    let info = run_capture(cmd, "go version")?;

    // Something like "go version go1.23.5 linux/amd64".
    let line = info.lines().next().unwrap_or_default();
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 3 {
      return Err(Error::Toolchain {
        path: self.path.clone(),
        reason: format!("malformed version output {info:?}"),
      });
    }
    let version = fields[2].strip_prefix("go").unwrap_or(fields[2]);
    Ok(version.to_string())
  }
}

/// Render a command line for echoing and for error reporting.
pub fn render_cmdline(cmd: &Command) -> String {
  let mut line = cmd.get_program().to_string_lossy().into_owned();
  for arg in cmd.get_args() {
    line.push(' ');
    line.push_str(&arg.to_string_lossy());
  }
  line
}

/// Run a toolchain process to completion, forwarding its stdout and stderr
/// to our stderr. The command line is echoed first so the sandbox log shows
/// exactly what ran.
pub fn run(mut cmd: Command, tool: &str) -> Result<()> {
  let cmdline = render_cmdline(&cmd);
  eprintln!("{cmdline}");

  let output = cmd.output().map_err(|err| spawn_error(&cmd, tool, err))?;
  let mut stderr = std::io::stderr();
  let _ = stderr.write_all(&output.stdout);
  let _ = stderr.write_all(&output.stderr);

  if !output.status.success() {
    return Err(Error::ToolExec {
      tool: tool.to_string(),
      cmdline,
      status: output.status.code(),
    });
  }

  Ok(())
}

/// Run a toolchain process and capture its stdout. Stderr is forwarded.
pub fn run_capture(mut cmd: Command, tool: &str) -> Result<String> {
  let cmdline = render_cmdline(&cmd);

  let output = cmd.output().map_err(|err| spawn_error(&cmd, tool, err))?;
  let _ = std::io::stderr().write_all(&output.stderr);

  if !output.status.success() {
    return Err(Error::ToolExec {
      tool: tool.to_string(),
      cmdline,
      status: output.status.code(),
    });
  }

  Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn spawn_error(cmd: &Command, tool: &str, err: std::io::Error) -> Error {
  if err.kind() == std::io::ErrorKind::NotFound {
    Error::Toolchain {
      path: PathBuf::from(cmd.get_program()),
      reason: format!("missing tool binary for {tool}"),
    }
  } else {
    Error::Io(err)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn fake_sdk(version_line: &str) -> tempfile::TempDir {
    let root = tempfile::TempDir::new().unwrap();
    std::fs::create_dir_all(root.path().join("pkg").join("tool").join(host_platform())).unwrap();
    std::fs::create_dir_all(root.path().join("pkg").join("include")).unwrap();
    let bin = root.path().join("bin");
    std::fs::create_dir_all(&bin).unwrap();

    let go = bin.join("go");
    std::fs::write(&go, format!("#!/bin/sh\necho \"{version_line}\"\n")).unwrap();
    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      std::fs::set_permissions(&go, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    root
  }

  #[test]
  fn load_parses_version_and_defaults_compat() {
    let root = fake_sdk("go version go1.23.5 linux/amd64");
    let sdk = Sdk::load(root.path(), "").unwrap();
    assert_eq!(sdk.version, "1.23.5");
    assert_eq!(sdk.short_version(), "1.23");
    assert_eq!(sdk.compat_version, "go1.23");
  }

  #[test]
  fn load_keeps_explicit_compat_version() {
    let root = fake_sdk("go version go1.23.5 linux/amd64");
    let sdk = Sdk::load(root.path(), "go1.21").unwrap();
    assert_eq!(sdk.compat_version, "go1.21");
  }

  #[test]
  fn load_rejects_malformed_version() {
    let root = fake_sdk("nonsense");
    let err = Sdk::load(root.path(), "").unwrap_err();
    assert!(matches!(err, Error::Toolchain { .. }));
  }

  #[test]
  fn load_rejects_missing_tool_dir() {
    let root = tempfile::TempDir::new().unwrap();
    let err = Sdk::load(root.path(), "").unwrap_err();
    assert!(matches!(err, Error::Toolchain { .. }));
  }

  #[test]
  fn short_version_without_dot_is_identity() {
    let sdk = Sdk {
      path: PathBuf::new(),
      version: "devel".to_string(),
      compat_version: "go1.23".to_string(),
    };
    assert_eq!(sdk.short_version(), "devel");
  }

  #[test]
  fn include_dir_is_under_pkg() {
    let sdk = Sdk {
      path: PathBuf::from("/sdk"),
      version: "1.23.5".to_string(),
      compat_version: "go1.23".to_string(),
    };
    assert_eq!(sdk.include_dir(), PathBuf::from("/sdk/pkg/include"));
  }
}
