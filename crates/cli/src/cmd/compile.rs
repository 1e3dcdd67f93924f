//! Implementation of the `builder compile` command.

use anyhow::{Context, Result};

use gobuild_derivation::Derivation;
use gobuild_lib::compile;
use gobuild_lib::context::BuildContext;
use gobuild_lib::sdk::Sdk;

/// Compile one package into the derivation's `lib` and `export` outputs
/// and write its metadata sidecar.
pub fn cmd_compile(derivation: &Derivation, ctx: &BuildContext, sdk: &Sdk) -> Result<()> {
  compile::run(derivation, ctx, sdk).context("failed to compile package")?;
  Ok(())
}
