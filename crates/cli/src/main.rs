//! builder: a wrapper around the Go compiler and linker for being called as
//! a derivation builder within Nix.
//!
//! The sandbox passes everything through structured attributes
//! (`$NIX_ATTRS_JSON_FILE`); the command line only selects the sub-command:
//! - `builder compile` - compile one package
//! - `builder link` - link a pre-compiled main package
//! - `builder stdlib list` / `builder stdlib package` - standard-library
//!   helpers

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use gobuild_derivation::Derivation;
use gobuild_lib::context::BuildContext;
use gobuild_lib::sdk::Sdk;

mod cmd;
mod output;

#[derive(Parser)]
#[command(name = "builder")]
#[command(version, about = "Derivation builder wrapping the Go compiler and linker")]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Name the driver identifies itself as in diagnostics
  #[arg(long, global = true, default_value = "builder")]
  program_name: String,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Compile one package into an archive and export data
  Compile,

  /// Link a pre-compiled main package into an executable
  Link,

  /// Standard-library helpers
  #[command(subcommand)]
  Stdlib(StdlibCommands),
}

#[derive(Subcommand)]
enum StdlibCommands {
  /// Write the toolchain's standard-package listing to the output
  List,

  /// Aggregate compiled standard packages into one meta package
  Package,
}

/// Attributes every sub-command needs.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommonAttrs {
  sdk: PathBuf,

  #[serde(default)]
  go_compat_version: Option<String>,
}

fn main() {
  let cli = Cli::parse();

  let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
  FmtSubscriber::builder()
    .with_max_level(level)
    .with_target(false)
    .without_time()
    .with_writer(std::io::stderr)
    .init();

  if let Err(err) = run(&cli) {
    output::print_fatal(&cli.program_name, &err);
    std::process::exit(1);
  }
}

fn run(cli: &Cli) -> Result<()> {
  let derivation = Derivation::from_env()?;
  let common: CommonAttrs = derivation.attrs()?;

  let sdk = Sdk::load(&common.sdk, common.go_compat_version.as_deref().unwrap_or(""))
    .context("failed to load sdk: was \"sdk\" set in your derivation attributes?")?;
  let ctx = BuildContext::new();

  match &cli.command {
    Commands::Compile => cmd::cmd_compile(&derivation, &ctx, &sdk),
    Commands::Link => cmd::cmd_link(&derivation, &ctx, &sdk),
    Commands::Stdlib(StdlibCommands::List) => cmd::cmd_stdlib_list(&derivation, &ctx, &sdk),
    Commands::Stdlib(StdlibCommands::Package) => cmd::cmd_stdlib_package(&derivation),
  }
}
