//! gobuild-lib: the per-package build driver for the Go toolchain.
//!
//! Invoked once per derivation by the Nix sandbox, the driver translates a
//! declarative description of one package (sources, direct imports, rewrite
//! map) into the exact toolchain calls that produce a linkable archive, an
//! export descriptor, and the metadata sidecar downstream invocations use
//! to reconstruct the transitive dependency set.
//!
//! The crate is organized leaves-first:
//! - `sdk`: toolchain discovery and tool process specs
//! - `context`: the per-invocation scratch directory and parallelism
//! - `constraint` / `srcs`: which sources are enabled, and of what kind
//! - `imports` / `metadata` / `importcfg`: the import pipeline
//! - `asm`: the assembly pre- and post-passes
//! - `compile` / `link` / `stdlib`: the sub-commands

pub mod asm;
pub mod compile;
pub mod constraint;
pub mod context;
pub mod error;
pub mod importcfg;
pub mod imports;
pub mod link;
pub mod metadata;
pub mod sdk;
pub mod srcs;
pub mod stdlib;
