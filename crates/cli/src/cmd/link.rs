//! Implementation of the `builder link` command.

use anyhow::{Context, Result};

use gobuild_derivation::Derivation;
use gobuild_lib::context::BuildContext;
use gobuild_lib::link;
use gobuild_lib::sdk::Sdk;

/// Link a pre-compiled main package into `<out>/bin/<name>`.
pub fn cmd_link(derivation: &Derivation, ctx: &BuildContext, sdk: &Sdk) -> Result<()> {
  link::run(derivation, ctx, sdk).context("failed to link binary")?;
  Ok(())
}
