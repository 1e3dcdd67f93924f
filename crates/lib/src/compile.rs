//! The compile driver.
//!
//! One invocation compiles exactly one package from scratch: classify the
//! sources, resolve and scan imports, write the importcfg, invoke the
//! compiler (with the assembly pre-pass when needed), pack the archive,
//! and save the metadata sidecar downstream invocations consume.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::info;

use gobuild_derivation::Derivation;

use crate::asm::{self, Assembler};
use crate::constraint::Target;
use crate::context::BuildContext;
use crate::error::{Error, Result};
use crate::importcfg;
use crate::imports::scan_imports;
use crate::metadata::{self, base_name, Import, Package};
use crate::sdk::{self, Sdk};
use crate::srcs;

/// Standard packages that declare symbols realized in assembly or by the
/// runtime elsewhere in the package. These cannot assert `-complete`.
///
/// List taken from the toolchain's own build logic; it is tied to the
/// toolchain version and must be refreshed per release.
const FORWARD_DECL_PACKAGES: &[&str] = &[
  "bytes",
  "internal/poll",
  "net",
  "os",
  "runtime/metrics",
  "runtime/pprof",
  "runtime/trace",
  "sync",
  "syscall",
  "time",
];

/// Embedded-file configuration, passed through to the compiler as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EmbedCfg {
  #[serde(default)]
  pub patterns: BTreeMap<String, Vec<String>>,

  #[serde(default)]
  pub files: BTreeMap<String, String>,
}

/// Attributes for the `compile` sub-command.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileAttrs {
  pub package_path: String,

  #[serde(default)]
  pub srcs: Vec<PathBuf>,

  #[serde(default)]
  pub imports: BTreeMap<String, PathBuf>,

  #[serde(default)]
  pub import_map: BTreeMap<String, String>,

  #[serde(default)]
  pub embed_cfg: Option<EmbedCfg>,

  #[serde(default)]
  pub compile_flags: Vec<String>,
}

/// Whether a package may assert "no externally-implemented symbols".
fn can_assert_complete(import_path: &str, has_asm: bool) -> bool {
  !has_asm && !FORWARD_DECL_PACKAGES.contains(&import_path)
}

/// The `-trimpath` argument: each distinct source directory rewrites to the
/// canonical import path, the build directory (when assembly is present)
/// and the output directory rewrite to nothing. Without this, store paths
/// leak into the archive and break reproducibility.
fn package_trim_path(
  srcs: &[PathBuf],
  import_path: &str,
  build_dir: Option<&Path>,
  out_dir: &Path,
) -> String {
  let mut segments = Vec::new();
  let mut seen = std::collections::BTreeSet::new();

  for src in srcs {
    let dir = src.parent().unwrap_or(Path::new(""));
    if seen.insert(dir.to_path_buf()) {
      segments.push(format!("{}=>{}", dir.display(), import_path));
    }
  }

  if let Some(build_dir) = build_dir {
    segments.push(format!("{}=>", build_dir.display()));
  }
  segments.push(format!("{}=>", out_dir.display()));

  segments.join(";")
}

/// Artifacts of the pre-compile assembly pass, fed to the compiler.
struct AsmPrep {
  symabis: PathBuf,
  asm_header: PathBuf,
}

/// A call to the compiler for one package.
pub struct Compilation<'a> {
  pub ctx: &'a BuildContext,
  pub sdk: &'a Sdk,
  pub target: &'a Target,
  pub import_path: &'a str,
  pub srcs: &'a [PathBuf],
  pub imports: &'a BTreeMap<String, PathBuf>,
  pub import_map: &'a BTreeMap<String, String>,
  pub embed_cfg: Option<&'a EmbedCfg>,
}

impl Compilation<'_> {
  /// Invoke the compiler, producing `archive` and `export`. Returns the
  /// resolved direct imports for the metadata sidecar.
  pub fn compile_package(
    &self,
    archive: &Path,
    export: &Path,
    extra_args: &[String],
  ) -> Result<Vec<Import>> {
    let sources = srcs::classify(self.target, self.srcs)?;

    let (imports, import_map) = metadata::resolve_meta_packages(self.imports, self.import_map)?;
    let (resolved, rewrites) = scan_imports(&sources.go, &imports, &import_map)?;

    let build_dir = self.ctx.build_dir()?;
    let cfg_path = build_dir.join("importcfg");
    importcfg::write_compile_cfg(&cfg_path, &rewrites, &resolved)?;

    let out_dir = archive.parent().unwrap_or(Path::new(""));
    let trim_path = package_trim_path(
      self.srcs,
      self.import_path,
      sources.has_asm().then_some(build_dir),
      out_dir,
    );

    let mut includes = Vec::new();
    let mut asm_prep = None;
    if sources.has_asm() {
      let asm_header = asm::touch_asm_header(build_dir)?;
      asm::alias_platform_headers(build_dir, self.target, &sources.headers)?;
      includes = asm::include_dirs(build_dir, &self.sdk.include_dir(), &sources.headers);

      let assembler = self.assembler(&trim_path, &includes);
      let symabis = assembler.assemble(&sources.asm, &build_dir.join("symabis"), true)?;
      asm_prep = Some(AsmPrep { symabis, asm_header });
    }

    let embed_cfg = match self.embed_cfg {
      Some(cfg) => Some(self.write_embed_cfg(cfg, build_dir)?),
      None => None,
    };

    let cmd = self.compile_cmd(
      archive,
      export,
      &trim_path,
      &cfg_path,
      asm_prep.as_ref(),
      embed_cfg.as_deref(),
      &sources.go,
      extra_args,
    )?;
    sdk::run(cmd, "compile")?;

    if sources.has_asm() {
      let assembler = self.assembler(&trim_path, &includes);
      let mut objs = Vec::with_capacity(sources.asm.len());
      for src in &sources.asm {
        let stem = src
          .file_stem()
          .map(|s| s.to_string_lossy().into_owned())
          .unwrap_or_default();
        let obj = assembler.assemble(
          std::slice::from_ref(src),
          &build_dir.join(format!("{stem}.o")),
          false,
        )?;
        objs.push(obj);
      }
      asm::append_archive(self.sdk, archive, &objs)?;
    }

    info!(package = %self.import_path, archive = %archive.display(), "compiled package");
    Ok(resolved)
  }

  fn assembler<'b>(&'b self, trim_path: &'b str, includes: &'b [PathBuf]) -> Assembler<'b> {
    Assembler {
      sdk: self.sdk,
      target: self.target,
      import_path: self.import_path,
      trim_path,
      includes,
    }
  }

  fn write_embed_cfg(&self, cfg: &EmbedCfg, build_dir: &Path) -> Result<PathBuf> {
    let path = build_dir.join("embedcfg");
    let body = serde_json::to_string(cfg).map_err(|err| Error::Source {
      path: path.clone(),
      reason: format!("failed to encode embedcfg: {err}"),
    })?;
    std::fs::write(&path, body)?;
    Ok(path)
  }

  #[allow(clippy::too_many_arguments)]
  fn compile_cmd(
    &self,
    archive: &Path,
    export: &Path,
    trim_path: &str,
    importcfg: &Path,
    asm_prep: Option<&AsmPrep>,
    embed_cfg: Option<&Path>,
    go_srcs: &[PathBuf],
    extra_args: &[String],
  ) -> Result<Command> {
    let mut cmd = self.sdk.tool_cmd("compile");
    cmd.env("CGO_ENABLED", "0");

    cmd.args(extra_args);
    cmd.arg("-o").arg(export);
    cmd.arg("-linkobj").arg(archive);
    cmd.arg("-trimpath").arg(trim_path);
    cmd.arg("-p").arg(self.import_path);
    cmd.arg("-lang").arg(&self.sdk.compat_version);

    match asm_prep {
      Some(prep) => {
        cmd.arg("-symabis").arg(&prep.symabis);
        cmd.arg("-asmhdr").arg(&prep.asm_header);
      }
      None => {
        if can_assert_complete(self.import_path, false) {
          cmd.arg("-complete");
        }
      }
    }

    if let Some(embed_cfg) = embed_cfg {
      cmd.arg("-embedcfg").arg(embed_cfg);
    }

    cmd.arg("-c").arg(self.ctx.parallelism()?.to_string());
    cmd.arg("-nolocalimports");
    cmd.arg("-importcfg").arg(importcfg);
    cmd.arg("-pack");
    cmd.arg("--");
    cmd.args(go_srcs);

    Ok(cmd)
  }
}

/// The `compile` sub-command: build one package into the derivation's
/// `lib` and `export` outputs.
pub fn run(derivation: &Derivation, ctx: &BuildContext, sdk: &Sdk) -> Result<()> {
  let attrs: CompileAttrs = derivation.attrs().map_err(Error::Attrs)?;

  let lib_dir = derivation.output_dir("lib")?;
  let export_dir = derivation.output_dir("export")?;

  let name = base_name(&attrs.package_path);
  let target = Target::host(sdk);

  let compilation = Compilation {
    ctx,
    sdk,
    target: &target,
    import_path: &attrs.package_path,
    srcs: &attrs.srcs,
    imports: &attrs.imports,
    import_map: &attrs.import_map,
    embed_cfg: attrs.embed_cfg.as_ref(),
  };
  let resolved = compilation.compile_package(
    &lib_dir.join(format!("{name}.a")),
    &export_dir.join(format!("{name}.x")),
    &attrs.compile_flags,
  )?;

  let (imports, deps) = metadata::collect_deps(&resolved)?;
  metadata::save_package(
    &export_dir,
    &Package {
      import_path: attrs.package_path,
      imports,
      deps,
    },
  )?;

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;
  use temp_env::with_var;

  #[test]
  fn complete_flag_gating() {
    // Assembly always disables the assertion.
    assert!(!can_assert_complete("acme/foo", true));
    // Forward-declaration packages never assert it.
    assert!(!can_assert_complete("sync", false));
    assert!(!can_assert_complete("runtime/pprof", false));
    // Everything else does.
    assert!(can_assert_complete("acme/foo", false));
    assert!(can_assert_complete("fmt", false));
  }

  #[test]
  fn trim_path_covers_source_dirs_once() {
    let srcs = vec![
      PathBuf::from("/store/src/a.go"),
      PathBuf::from("/store/src/b.go"),
      PathBuf::from("/store/other/c.go"),
    ];

    let trim = package_trim_path(&srcs, "acme/foo", None, Path::new("/out/lib"));
    assert_eq!(trim, "/store/src=>acme/foo;/store/other=>acme/foo;/out/lib=>");
  }

  #[test]
  fn trim_path_includes_build_dir_with_assembly() {
    let srcs = vec![PathBuf::from("/store/src/a.go")];
    let trim = package_trim_path(
      &srcs,
      "acme/foo",
      Some(Path::new("/tmp/build")),
      Path::new("/out/lib"),
    );
    assert_eq!(trim, "/store/src=>acme/foo;/tmp/build=>;/out/lib=>");
  }

  // Two builds of the same sources from different roots must differ only
  // in the trim map itself, which erases exactly that difference.
  #[test]
  fn trim_path_erases_source_root() {
    let a = package_trim_path(
      &[PathBuf::from("/nix/store/AAA/a.go")],
      "acme/foo",
      None,
      Path::new("/out"),
    );
    let b = package_trim_path(
      &[PathBuf::from("/nix/store/BBB/a.go")],
      "acme/foo",
      None,
      Path::new("/out"),
    );
    assert_eq!(a.replace("/nix/store/AAA", ""), b.replace("/nix/store/BBB", ""));
  }

  fn fake_sdk() -> Sdk {
    Sdk {
      path: PathBuf::from("/sdk"),
      version: "1.23.5".to_string(),
      compat_version: "go1.23".to_string(),
    }
  }

  fn argv(cmd: &Command) -> Vec<String> {
    cmd
      .get_args()
      .map(|a| a.to_string_lossy().into_owned())
      .collect()
  }

  #[test]
  #[serial]
  fn compile_cmd_argv_shape() {
    with_var(gobuild_derivation::BUILD_CORES_VAR, Some("2"), || {
      let ctx = BuildContext::new();
      let sdk = fake_sdk();
      let target = Target::new("linux", "amd64", "1.23.5");
      let imports = BTreeMap::new();
      let import_map = BTreeMap::new();

      let compilation = Compilation {
        ctx: &ctx,
        sdk: &sdk,
        target: &target,
        import_path: "acme/foo",
        srcs: &[],
        imports: &imports,
        import_map: &import_map,
        embed_cfg: None,
      };

      let cmd = compilation
        .compile_cmd(
          Path::new("/out/lib/foo.a"),
          Path::new("/out/export/foo.x"),
          "/src=>acme/foo;/out/lib=>",
          Path::new("/build/importcfg"),
          None,
          None,
          &[PathBuf::from("/src/a.go")],
          &["-shared".to_string()],
        )
        .unwrap();

      let args = argv(&cmd);
      // Passthrough flags come first.
      assert_eq!(args[0], "-shared");
      assert!(args.contains(&"-complete".to_string()));
      assert!(args.windows(2).any(|w| w == ["-lang", "go1.23"]));
      assert!(args.windows(2).any(|w| w == ["-c", "2"]));
      assert!(args.windows(2).any(|w| w == ["-p", "acme/foo"]));
      // Sources follow the terminator.
      let dashdash = args.iter().position(|a| a == "--").unwrap();
      assert_eq!(args[dashdash + 1], "/src/a.go");
      assert_eq!(
        cmd.get_envs().find(|(k, _)| *k == "CGO_ENABLED").map(|(_, v)| v),
        Some(Some(std::ffi::OsStr::new("0")))
      );
    });
  }

  #[test]
  #[serial]
  fn compile_cmd_forward_decl_package_is_not_complete() {
    with_var(gobuild_derivation::BUILD_CORES_VAR, Some("1"), || {
      let ctx = BuildContext::new();
      let sdk = fake_sdk();
      let target = Target::new("linux", "amd64", "1.23.5");
      let imports = BTreeMap::new();
      let import_map = BTreeMap::new();

      let compilation = Compilation {
        ctx: &ctx,
        sdk: &sdk,
        target: &target,
        import_path: "sync",
        srcs: &[],
        imports: &imports,
        import_map: &import_map,
        embed_cfg: None,
      };

      let cmd = compilation
        .compile_cmd(
          Path::new("/out/lib/sync.a"),
          Path::new("/out/export/sync.x"),
          "",
          Path::new("/build/importcfg"),
          None,
          None,
          &[],
          &[],
        )
        .unwrap();

      assert!(!argv(&cmd).contains(&"-complete".to_string()));
    });
  }

  #[test]
  fn embed_cfg_uses_go_field_names() {
    let cfg = EmbedCfg {
      patterns: BTreeMap::from([("*.txt".to_string(), vec!["data.txt".to_string()])]),
      files: BTreeMap::from([("data.txt".to_string(), "/store/data.txt".to_string())]),
    };
    let body = serde_json::to_string(&cfg).unwrap();
    assert!(body.contains("\"Patterns\""));
    assert!(body.contains("\"Files\""));
  }
}
