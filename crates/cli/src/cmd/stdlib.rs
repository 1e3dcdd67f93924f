//! Implementation of the `builder stdlib` commands.

use anyhow::{Context, Result};

use gobuild_derivation::Derivation;
use gobuild_lib::context::BuildContext;
use gobuild_lib::sdk::Sdk;
use gobuild_lib::stdlib;

/// Write the toolchain's standard-package listing to `<out>/spec.json`.
pub fn cmd_stdlib_list(derivation: &Derivation, ctx: &BuildContext, sdk: &Sdk) -> Result<()> {
  stdlib::list(derivation, ctx, sdk).context("failed to list standard library")?;
  Ok(())
}

/// Aggregate compiled standard packages into one meta-package store path.
pub fn cmd_stdlib_package(derivation: &Derivation) -> Result<()> {
  stdlib::package(derivation).context("failed to aggregate standard library")?;
  Ok(())
}
