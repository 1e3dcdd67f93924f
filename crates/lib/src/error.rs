//! Error types for the build driver.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for build-driver operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving the toolchain.
///
/// Every variant carries the path or name that triggered it; the CLI layer
/// prints exactly one line per failure and exits non-zero.
#[derive(Debug, Error)]
pub enum Error {
  /// The derivation's structured attributes are missing or malformed.
  #[error(transparent)]
  Attrs(#[from] gobuild_derivation::AttrsError),

  /// The toolchain at the configured root is unusable.
  #[error("toolchain at {path}: {reason}")]
  Toolchain { path: PathBuf, reason: String },

  /// A source file could not be read, or has an extension the driver does
  /// not understand.
  #[error("source {path}: {reason}")]
  Source { path: PathBuf, reason: String },

  /// A source file failed to parse.
  #[error("parse input at {path}:{line}:{col}: {reason}")]
  Parse {
    path: PathBuf,
    line: u32,
    col: u32,
    reason: String,
  },

  /// An import could not be resolved against the provided imports table.
  #[error("package {missing} not found in the provided imports, needed by {needed_by}")]
  Import { missing: String, needed_by: String },

  /// A metadata sidecar could not be read or decoded.
  #[error("failed to read package metadata at {path}: {reason}")]
  Metadata { path: PathBuf, reason: String },

  /// A toolchain process exited non-zero.
  #[error("{tool} failed{}: {cmdline}", exit_suffix(.status))]
  ToolExec {
    tool: String,
    cmdline: String,
    status: Option<i32>,
  },

  /// Any other filesystem failure.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

fn exit_suffix(status: &Option<i32>) -> String {
  match status {
    Some(code) => format!(" with exit code {code}"),
    None => String::new(),
  }
}
