//! Structured-attrs intake for Nix derivation builders.
//!
//! A derivation built with `__structuredAttrs = true` passes its attributes
//! to the builder as a JSON file whose path is in `$NIX_ATTRS_JSON_FILE`.
//! This crate loads that file once, exposes the well-known attributes every
//! builder needs (`outputs`, `nativeBuildInputs`), and lets each sub-command
//! decode the rest into its own typed struct.
//!
//! Programs should only depend on this crate if they are intended to run as
//! a derivation builder.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Environment variable holding the path to the structured-attrs file.
pub const ATTRS_FILE_VAR: &str = "NIX_ATTRS_JSON_FILE";

/// Environment variable holding the sandbox's parallelism hint.
pub const BUILD_CORES_VAR: &str = "NIX_BUILD_CORES";

/// Errors raised while reading the derivation's inputs.
#[derive(Debug, Error)]
pub enum AttrsError {
  /// `$NIX_ATTRS_JSON_FILE` is not set. The process is probably not running
  /// as a derivation builder.
  #[error("failed to locate ${ATTRS_FILE_VAR}: is this process running as a derivation builder?")]
  MissingAttrsFile,

  /// The attrs file could not be read.
  #[error("failed to read ${ATTRS_FILE_VAR} at {path}: {source}")]
  ReadAttrsFile {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The attrs file is not valid JSON, or a required field is missing or of
  /// the wrong shape.
  #[error("failed to parse derivation attributes: {0}")]
  Parse(#[from] serde_json::Error),

  /// The derivation does not declare the requested output.
  #[error("derivation was expected to produce an output \"{0}\"")]
  MissingOutput(String),

  /// An output directory could not be created.
  #[error("failed to create output directory {path}: {source}")]
  CreateOutput {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// `$NIX_BUILD_CORES` is set to something that is not a number.
  #[error("failed to parse ${BUILD_CORES_VAR}: {0:?}")]
  BuildCores(String),
}

/// The attributes every structured-attrs derivation carries, parsed up
/// front so sub-commands do not have to re-declare them.
#[derive(Debug, Deserialize)]
struct WellKnownAttrs {
  #[serde(default)]
  outputs: BTreeMap<String, PathBuf>,

  #[serde(default, rename = "nativeBuildInputs")]
  native_build_inputs: Vec<PathBuf>,
}

/// A loaded view of the derivation's structured attributes.
#[derive(Debug)]
pub struct Derivation {
  raw: String,

  /// The expected outputs of the derivation and their store paths.
  pub outputs: BTreeMap<String, PathBuf>,

  /// The host-specific input packages.
  pub native_build_inputs: Vec<PathBuf>,
}

impl Derivation {
  /// Load the attrs file named by `$NIX_ATTRS_JSON_FILE`.
  pub fn from_env() -> Result<Self, AttrsError> {
    let file = std::env::var_os(ATTRS_FILE_VAR).ok_or(AttrsError::MissingAttrsFile)?;
    if file.is_empty() {
      return Err(AttrsError::MissingAttrsFile);
    }
    Self::from_file(Path::new(&file))
  }

  /// Load structured attributes from an explicit file path.
  pub fn from_file(path: &Path) -> Result<Self, AttrsError> {
    let raw = fs::read_to_string(path).map_err(|source| AttrsError::ReadAttrsFile {
      path: path.to_path_buf(),
      source,
    })?;

    let well_known: WellKnownAttrs = serde_json::from_str(&raw)?;
    Ok(Self {
      raw,
      outputs: well_known.outputs,
      native_build_inputs: well_known.native_build_inputs,
    })
  }

  /// Decode the attributes into a sub-command specific struct.
  pub fn attrs<T: DeserializeOwned>(&self) -> Result<T, AttrsError> {
    Ok(serde_json::from_str(&self.raw)?)
  }

  /// Look up a derivation output and create an empty directory there.
  pub fn output_dir(&self, output: &str) -> Result<PathBuf, AttrsError> {
    let dir = self
      .outputs
      .get(output)
      .ok_or_else(|| AttrsError::MissingOutput(output.to_string()))?;

    fs::create_dir(dir).map_err(|source| AttrsError::CreateOutput {
      path: dir.clone(),
      source,
    })?;

    Ok(dir.clone())
  }

  /// A colon-separated list of the inputs' `bin` directories, suitable for
  /// setting as `$PATH`.
  pub fn path(&self) -> String {
    let bins: Vec<String> = self
      .native_build_inputs
      .iter()
      .map(|dep| dep.join("bin").to_string_lossy().into_owned())
      .collect();

    bins.join(":")
  }
}

/// The number of CPU cores the sandbox has asked us to use.
///
/// `$NIX_BUILD_CORES` unset or empty means 1: an isolated sandbox that did
/// not bother setting it should not fan out. `"0"` means the detected CPU
/// count. Anything else must parse as a positive integer.
pub fn build_cores() -> Result<usize, AttrsError> {
  let cores = std::env::var(BUILD_CORES_VAR).unwrap_or_default();
  match cores.as_str() {
    "" => Ok(1),
    "0" => Ok(detected_cpus()),
    other => other
      .parse::<usize>()
      .ok()
      .filter(|n| *n > 0)
      .ok_or_else(|| AttrsError::BuildCores(other.to_string())),
  }
}

fn detected_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(1)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;
  use temp_env::with_var;
  use tempfile::TempDir;

  fn write_attrs(dir: &TempDir, json: &str) -> PathBuf {
    let path = dir.path().join(".attrs.json");
    fs::write(&path, json).unwrap();
    path
  }

  #[test]
  fn from_file_parses_well_known_attrs() {
    let temp = TempDir::new().unwrap();
    let path = write_attrs(
      &temp,
      r#"{
        "outputs": {"out": "/nix/store/xxx-out"},
        "nativeBuildInputs": ["/nix/store/yyy-go"]
      }"#,
    );

    let drv = Derivation::from_file(&path).unwrap();
    assert_eq!(drv.outputs["out"], PathBuf::from("/nix/store/xxx-out"));
    assert_eq!(drv.native_build_inputs, vec![PathBuf::from("/nix/store/yyy-go")]);
  }

  #[test]
  fn attrs_decodes_command_specific_struct() {
    #[derive(Deserialize)]
    struct Extra {
      name: String,
    }

    let temp = TempDir::new().unwrap();
    let path = write_attrs(&temp, r#"{"outputs": {}, "name": "hello"}"#);

    let drv = Derivation::from_file(&path).unwrap();
    let extra: Extra = drv.attrs().unwrap();
    assert_eq!(extra.name, "hello");
  }

  #[test]
  fn output_dir_creates_directory() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("out");
    let json = format!(r#"{{"outputs": {{"out": "{}"}}}}"#, out.display());
    let path = write_attrs(&temp, &json);

    let drv = Derivation::from_file(&path).unwrap();
    let dir = drv.output_dir("out").unwrap();
    assert_eq!(dir, out);
    assert!(out.is_dir());
  }

  #[test]
  fn output_dir_missing_output_fails() {
    let temp = TempDir::new().unwrap();
    let path = write_attrs(&temp, r#"{"outputs": {}}"#);

    let drv = Derivation::from_file(&path).unwrap();
    let err = drv.output_dir("lib").unwrap_err();
    assert!(matches!(err, AttrsError::MissingOutput(name) if name == "lib"));
  }

  #[test]
  fn path_joins_bin_directories() {
    let temp = TempDir::new().unwrap();
    let path = write_attrs(
      &temp,
      r#"{"outputs": {}, "nativeBuildInputs": ["/nix/store/aaa", "/nix/store/bbb"]}"#,
    );

    let drv = Derivation::from_file(&path).unwrap();
    assert_eq!(drv.path(), "/nix/store/aaa/bin:/nix/store/bbb/bin");
  }

  #[test]
  #[serial]
  fn from_env_fails_without_attrs_file() {
    with_var(ATTRS_FILE_VAR, None::<&str>, || {
      let err = Derivation::from_env().unwrap_err();
      assert!(matches!(err, AttrsError::MissingAttrsFile));
    });
  }

  #[test]
  #[serial]
  fn build_cores_unset_is_one() {
    with_var(BUILD_CORES_VAR, None::<&str>, || {
      assert_eq!(build_cores().unwrap(), 1);
    });
  }

  #[test]
  #[serial]
  fn build_cores_zero_detects_cpus() {
    with_var(BUILD_CORES_VAR, Some("0"), || {
      assert!(build_cores().unwrap() >= 1);
    });
  }

  #[test]
  #[serial]
  fn build_cores_explicit_value() {
    with_var(BUILD_CORES_VAR, Some("4"), || {
      assert_eq!(build_cores().unwrap(), 4);
    });
  }

  #[test]
  #[serial]
  fn build_cores_non_numeric_fails() {
    with_var(BUILD_CORES_VAR, Some("x"), || {
      let err = build_cores().unwrap_err();
      assert!(matches!(err, AttrsError::BuildCores(value) if value == "x"));
    });
  }
}
