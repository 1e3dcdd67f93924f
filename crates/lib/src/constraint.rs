//! Build-constraint oracle.
//!
//! Decides whether a source file is enabled for the target platform, the
//! same way the toolchain's own build context does: filename suffix rules
//! (`_<GOOS>`, `_<GOARCH>`, `_<GOOS>_<GOARCH>` against the known OS and
//! architecture sets) plus the build-tag comments in the file header
//! (`//go:build` expressions, falling back to legacy `// +build` lines).
//!
//! Foreign-function interop is unsupported, so the `cgo` tag is always
//! false; this keeps non-cgo fallback files enabled.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::sdk::{host_goarch, host_goos, Sdk};

/// Operating systems the toolchain knows about. A filename suffix only
/// constrains a file if it names one of these.
const KNOWN_OS: &[&str] = &[
  "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "js", "linux",
  "nacl", "netbsd", "openbsd", "plan9", "solaris", "wasip1", "windows", "zos",
];

/// Architectures the toolchain knows about.
const KNOWN_ARCH: &[&str] = &[
  "386", "amd64", "amd64p32", "arm", "armbe", "arm64", "arm64be", "loong64", "mips", "mipsle",
  "mips64", "mips64le", "mips64p32", "mips64p32le", "ppc", "ppc64", "ppc64le", "riscv", "riscv64",
  "s390", "s390x", "sparc", "sparc64", "wasm",
];

/// Operating systems that satisfy the `unix` build tag.
const UNIX_OS: &[&str] = &[
  "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "linux", "netbsd",
  "openbsd", "solaris",
];

/// Extensions the toolchain recognizes as source files. Anything else never
/// matches, and is dropped silently by the classifier.
const KNOWN_EXT: &[&str] = &[
  "go", "h", "s", "c", "cc", "cxx", "cpp", "m", "S", "sx", "f", "F", "f90", "syso",
];

/// The platform identity a build targets, plus the language release the
/// toolchain implements (for `go1.N` tags).
#[derive(Debug, Clone)]
pub struct Target {
  pub goos: String,
  pub goarch: String,
  release_minor: u32,
}

impl Target {
  pub fn new(goos: &str, goarch: &str, sdk_version: &str) -> Self {
    Self {
      goos: goos.to_string(),
      goarch: goarch.to_string(),
      release_minor: parse_minor(sdk_version),
    }
  }

  /// The target for the running host, using the SDK's detected version for
  /// release tags.
  pub fn host(sdk: &Sdk) -> Self {
    Self::new(host_goos(), host_goarch(), &sdk.version)
  }

  /// The target platform as `<GOOS>_<GOARCH>`.
  pub fn platform(&self) -> String {
    format!("{}_{}", self.goos, self.goarch)
  }

  /// Whether a single build tag holds for this target.
  fn matches_tag(&self, tag: &str) -> bool {
    if tag == self.goos || tag == self.goarch {
      return true;
    }
    match tag {
      "unix" => UNIX_OS.contains(&self.goos.as_str()),
      "gc" => true,
      "cgo" => false,
      "go1" => true,
      _ => match tag.strip_prefix("go1.") {
        Some(minor) => minor.parse::<u32>().is_ok_and(|n| n <= self.release_minor),
        None => false,
      },
    }
  }
}

fn parse_minor(version: &str) -> u32 {
  version
    .split('.')
    .nth(1)
    .and_then(|minor| minor.parse().ok())
    .unwrap_or(0)
}

/// Report whether a source file is enabled for the target.
///
/// Files whose names begin with `_` or `.`, whose extensions the toolchain
/// does not recognize, or whose suffix or header constraints exclude the
/// target are disabled.
pub fn match_file(target: &Target, path: &Path) -> Result<bool> {
  let name = match path.file_name().and_then(|n| n.to_str()) {
    Some(name) => name,
    None => return Ok(false),
  };

  if name.starts_with('_') || name.starts_with('.') {
    return Ok(false);
  }

  let ext = match name.rsplit_once('.') {
    Some((_, ext)) => ext,
    None => return Ok(false),
  };
  if !KNOWN_EXT.contains(&ext) {
    return Ok(false);
  }

  if !good_os_arch_file(target, name) {
    return Ok(false);
  }

  // Object files carry no header to scan.
  if ext == "syso" {
    return Ok(true);
  }

  let content = fs::read_to_string(path).map_err(|err| Error::Source {
    path: path.to_path_buf(),
    reason: err.to_string(),
  })?;

  should_build(target, path, &content)
}

/// The filename suffix rule. Only the part after the first underscore is
/// considered, so a file named `linux.go` carries no constraint.
fn good_os_arch_file(target: &Target, name: &str) -> bool {
  let stem = match name.split_once('.') {
    Some((stem, _)) => stem,
    None => name,
  };
  let tail = match stem.find('_') {
    Some(i) => &stem[i..],
    None => return true,
  };

  let mut parts: Vec<&str> = tail.split('_').collect();
  if parts.last() == Some(&"test") {
    parts.pop();
  }

  let n = parts.len();
  if n >= 2 && KNOWN_OS.contains(&parts[n - 2]) && KNOWN_ARCH.contains(&parts[n - 1]) {
    return parts[n - 2] == target.goos && parts[n - 1] == target.goarch;
  }
  if n >= 1 && KNOWN_OS.contains(&parts[n - 1]) {
    return parts[n - 1] == target.goos;
  }
  if n >= 1 && KNOWN_ARCH.contains(&parts[n - 1]) {
    return parts[n - 1] == target.goarch;
  }

  true
}

/// Evaluate the build-tag comments in a file header. A `//go:build` line
/// wins; otherwise every legacy `// +build` line must hold.
fn should_build(target: &Target, path: &Path, content: &str) -> Result<bool> {
  let mut plus_build = Vec::new();
  let mut in_block_comment = false;

  for (idx, raw) in content.lines().enumerate() {
    let mut line = raw.trim().to_string();

    if in_block_comment {
      match line.find("*/") {
        Some(end) => {
          line.replace_range(..end + 2, "");
          in_block_comment = false;
        }
        None => continue,
      }
    }
    while let Some(start) = line.find("/*") {
      match line[start..].find("*/") {
        Some(end) => line.replace_range(start..start + end + 2, ""),
        None => {
          in_block_comment = true;
          line.truncate(start);
          break;
        }
      }
    }

    let line = line.trim();
    if line.is_empty() {
      continue;
    }

    if let Some(expr) = line.strip_prefix("//go:build") {
      if expr.starts_with(' ') || expr.starts_with('\t') || expr.is_empty() {
        return eval_build_expr(expr.trim(), target).map_err(|reason| Error::Parse {
          path: path.to_path_buf(),
          line: idx as u32 + 1,
          col: 1,
          reason,
        });
      }
    }

    if let Some(rest) = line.strip_prefix("//") {
      let rest = rest.trim_start();
      if let Some(clauses) = rest.strip_prefix("+build") {
        if clauses.is_empty() || clauses.starts_with(' ') {
          plus_build.push(clauses.trim().to_string());
        }
      }
      continue;
    }

    // First non-comment line; the header is over.
    break;
  }

  Ok(plus_build.iter().all(|line| eval_plus_build_line(line, target)))
}

/// A `// +build` line: space-separated options are ORed, comma-separated
/// terms within an option are ANDed, `!` negates.
fn eval_plus_build_line(line: &str, target: &Target) -> bool {
  line.split_whitespace().any(|option| {
    option.split(',').all(|term| match term.strip_prefix('!') {
      Some(tag) => !target.matches_tag(tag),
      None => target.matches_tag(term),
    })
  })
}

/// Evaluate a `//go:build` expression: `||`, `&&`, `!`, parentheses, tags.
fn eval_build_expr(expr: &str, target: &Target) -> std::result::Result<bool, String> {
  let mut parser = ExprParser {
    src: expr.as_bytes(),
    pos: 0,
  };
  let value = parser.or_expr(target)?;
  parser.skip_spaces();
  if parser.pos != parser.src.len() {
    return Err(format!("unexpected token in build constraint {expr:?}"));
  }
  Ok(value)
}

struct ExprParser<'a> {
  src: &'a [u8],
  pos: usize,
}

impl ExprParser<'_> {
  fn skip_spaces(&mut self) {
    while self.pos < self.src.len() && (self.src[self.pos] as char).is_ascii_whitespace() {
      self.pos += 1;
    }
  }

  fn eat(&mut self, token: &str) -> bool {
    self.skip_spaces();
    if self.src[self.pos..].starts_with(token.as_bytes()) {
      self.pos += token.len();
      true
    } else {
      false
    }
  }

  fn or_expr(&mut self, target: &Target) -> std::result::Result<bool, String> {
    let mut value = self.and_expr(target)?;
    while self.eat("||") {
      value |= self.and_expr(target)?;
    }
    Ok(value)
  }

  fn and_expr(&mut self, target: &Target) -> std::result::Result<bool, String> {
    let mut value = self.unary_expr(target)?;
    while self.eat("&&") {
      value &= self.unary_expr(target)?;
    }
    Ok(value)
  }

  fn unary_expr(&mut self, target: &Target) -> std::result::Result<bool, String> {
    self.skip_spaces();
    if self.eat("!") {
      return Ok(!self.unary_expr(target)?);
    }
    if self.eat("(") {
      let value = self.or_expr(target)?;
      if !self.eat(")") {
        return Err("missing closing parenthesis in build constraint".to_string());
      }
      return Ok(value);
    }

    let start = self.pos;
    while self.pos < self.src.len() {
      let c = self.src[self.pos] as char;
      if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
        self.pos += 1;
      } else {
        break;
      }
    }
    if self.pos == start {
      return Err("expected build tag".to_string());
    }
    let tag = std::str::from_utf8(&self.src[start..self.pos]).map_err(|e| e.to_string())?;
    Ok(target.matches_tag(tag))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::path::PathBuf;

  fn linux_amd64() -> Target {
    Target::new("linux", "amd64", "1.23.5")
  }

  fn check(target: &Target, content: &str) -> bool {
    should_build(target, &PathBuf::from("x.go"), content).unwrap()
  }

  #[test]
  fn suffix_rules() {
    let t = linux_amd64();
    assert!(good_os_arch_file(&t, "impl_linux_amd64.s"));
    assert!(good_os_arch_file(&t, "impl_linux.go"));
    assert!(good_os_arch_file(&t, "impl_amd64.go"));
    assert!(!good_os_arch_file(&t, "impl_darwin.go"));
    assert!(!good_os_arch_file(&t, "impl_arm64.go"));
    assert!(!good_os_arch_file(&t, "impl_darwin_amd64.go"));
    assert!(!good_os_arch_file(&t, "impl_linux_arm64.go"));
    // No underscore means no constraint, even for a known OS name.
    assert!(good_os_arch_file(&t, "linux.go"));
    // Unknown words are not constraints.
    assert!(good_os_arch_file(&t, "impl_fast.go"));
    // A _test suffix is stripped before matching.
    assert!(!good_os_arch_file(&t, "impl_darwin_test.go"));
  }

  #[test]
  fn go_build_expressions() {
    let t = linux_amd64();
    assert!(check(&t, "//go:build linux\npackage p\n"));
    assert!(!check(&t, "//go:build darwin\npackage p\n"));
    assert!(check(&t, "//go:build linux && amd64\npackage p\n"));
    assert!(check(&t, "//go:build darwin || linux\npackage p\n"));
    assert!(!check(&t, "//go:build !linux\npackage p\n"));
    assert!(check(&t, "//go:build (darwin || linux) && !cgo\npackage p\n"));
    assert!(check(&t, "//go:build unix\npackage p\n"));
    assert!(check(&t, "//go:build go1.20\npackage p\n"));
    assert!(!check(&t, "//go:build go1.99\npackage p\n"));
  }

  #[test]
  fn plus_build_lines() {
    let t = linux_amd64();
    assert!(check(&t, "// +build linux darwin\n\npackage p\n"));
    assert!(!check(&t, "// +build darwin\n\npackage p\n"));
    assert!(check(&t, "// +build linux,amd64\n\npackage p\n"));
    assert!(!check(&t, "// +build linux,!amd64\n\npackage p\n"));
    // Multiple lines AND together.
    assert!(!check(&t, "// +build linux\n// +build arm64\n\npackage p\n"));
  }

  #[test]
  fn go_build_wins_over_plus_build() {
    let t = linux_amd64();
    let content = "//go:build linux\n// +build darwin\npackage p\n";
    assert!(check(&t, content));
  }

  #[test]
  fn constraints_after_package_clause_are_ignored() {
    let t = linux_amd64();
    let content = "package p\n\n// +build darwin\n";
    assert!(check(&t, content));
  }

  #[test]
  fn block_comments_are_skipped() {
    let t = linux_amd64();
    let content = "/*\ncopyright\n*/\n//go:build darwin\npackage p\n";
    assert!(!check(&t, content));
  }

  #[test]
  fn malformed_expression_is_a_parse_error() {
    let t = linux_amd64();
    let err = should_build(&t, &PathBuf::from("bad.go"), "//go:build &&\npackage p\n").unwrap_err();
    assert!(matches!(err, Error::Parse { line: 1, .. }));
  }

  #[test]
  fn cgo_tag_is_always_false() {
    let t = linux_amd64();
    assert!(!check(&t, "//go:build cgo\npackage p\n"));
    assert!(check(&t, "//go:build !cgo\npackage p\n"));
  }

  #[test]
  fn match_file_ignores_unknown_extension_and_hidden_files() {
    let t = linux_amd64();
    let dir = tempfile::TempDir::new().unwrap();

    let txt = dir.path().join("notes.txt");
    std::fs::write(&txt, "whatever").unwrap();
    assert!(!match_file(&t, &txt).unwrap());

    let hidden = dir.path().join("_skip.go");
    std::fs::write(&hidden, "package p\n").unwrap();
    assert!(!match_file(&t, &hidden).unwrap());
  }

  #[test]
  fn match_file_reads_constraints() {
    let t = linux_amd64();
    let dir = tempfile::TempDir::new().unwrap();

    let enabled = dir.path().join("a.go");
    std::fs::write(&enabled, "//go:build linux\npackage p\n").unwrap();
    assert!(match_file(&t, &enabled).unwrap());

    let disabled = dir.path().join("b.go");
    std::fs::write(&disabled, "//go:build windows\npackage p\n").unwrap();
    assert!(!match_file(&t, &disabled).unwrap());
  }
}
