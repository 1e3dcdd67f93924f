//! Import discovery from Go sources.
//!
//! Each source file is lexed only as far as its import block: the package
//! clause, then every `import` declaration. Import paths are quoted string
//! literals (interpreted or raw) and are decoded before use. Parse errors
//! carry the source position.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::metadata::Import;

/// Compiler-intrinsic pseudo-imports that never resolve to a store path and
/// are filtered from all output.
pub const FILTERED_IMPORTS: &[&str] = &["runtime/cgo", "unsafe"];

/// An import-path rewrite applied during scanning: source files said
/// `alias`, the archive lives under `canonical`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
  pub alias: String,
  pub canonical: String,
}

/// Search through a list of sources and resolve each import to its store
/// path.
///
/// Imports are deduplicated across files, the intrinsic pseudo-imports are
/// dropped, and the rewrite map is applied before resolution; every rewrite
/// that fired is reported so the importcfg can repeat it. An import that
/// resolves to nothing is an [`Error::Import`] naming the file that needed
/// it. Both returned lists are sorted.
pub fn scan_imports(
  srcs: &[PathBuf],
  imports: &BTreeMap<String, PathBuf>,
  import_map: &BTreeMap<String, String>,
) -> Result<(Vec<Import>, Vec<Rewrite>)> {
  let mut resolved = Vec::new();
  let mut rewrites = Vec::new();
  let mut seen = BTreeSet::new();
  let mut emitted = BTreeSet::new();

  for path in srcs {
    for import_path in list_file_imports(path)? {
      if !seen.insert(import_path.clone()) {
        continue;
      }
      if FILTERED_IMPORTS.contains(&import_path.as_str()) {
        continue;
      }

      let import_path = match import_map.get(&import_path) {
        Some(canonical) => {
          rewrites.push(Rewrite {
            alias: import_path,
            canonical: canonical.clone(),
          });
          canonical.clone()
        }
        None => import_path,
      };

      if !emitted.insert(import_path.clone()) {
        continue;
      }
      match imports.get(&import_path) {
        Some(store_path) => resolved.push(Import {
          import_path,
          store_path: store_path.clone(),
        }),
        None => {
          return Err(Error::Import {
            missing: import_path,
            needed_by: path.display().to_string(),
          })
        }
      }
    }
  }

  resolved.sort_by(|a, b| a.import_path.cmp(&b.import_path));
  rewrites.sort_by(|a, b| a.alias.cmp(&b.alias));

  debug!(count = resolved.len(), rewrites = rewrites.len(), "scanned imports");
  Ok((resolved, rewrites))
}

/// Parse one source file and return every package path it imports, in
/// declaration order.
pub fn list_file_imports(path: &Path) -> Result<Vec<String>> {
  let content = fs::read_to_string(path).map_err(|err| Error::Source {
    path: path.to_path_buf(),
    reason: err.to_string(),
  })?;

  let mut scanner = Scanner::new(path, &content);
  scanner.imports()
}

/// A tokenizer that understands just enough Go to get through the import
/// block: comments, identifiers, string literals, and the punctuation
/// around `import ( ... )` groups.
struct Scanner<'a> {
  path: &'a Path,
  chars: Vec<char>,
  pos: usize,
  line: u32,
  col: u32,
}

impl<'a> Scanner<'a> {
  fn new(path: &'a Path, content: &str) -> Self {
    Self {
      path,
      chars: content.chars().collect(),
      pos: 0,
      line: 1,
      col: 1,
    }
  }

  fn error(&self, reason: impl Into<String>) -> Error {
    Error::Parse {
      path: self.path.to_path_buf(),
      line: self.line,
      col: self.col,
      reason: reason.into(),
    }
  }

  fn peek(&self) -> Option<char> {
    self.chars.get(self.pos).copied()
  }

  fn bump(&mut self) -> Option<char> {
    let c = self.peek()?;
    self.pos += 1;
    if c == '\n' {
      self.line += 1;
      self.col = 1;
    } else {
      self.col += 1;
    }
    Some(c)
  }

  /// Skip whitespace, semicolons, and comments.
  fn skip_trivia(&mut self) -> Result<()> {
    loop {
      match self.peek() {
        Some(c) if c.is_whitespace() || c == ';' => {
          self.bump();
        }
        Some('/') if self.chars.get(self.pos + 1) == Some(&'/') => {
          while let Some(c) = self.peek() {
            if c == '\n' {
              break;
            }
            self.bump();
          }
        }
        Some('/') if self.chars.get(self.pos + 1) == Some(&'*') => {
          self.bump();
          self.bump();
          loop {
            match self.bump() {
              Some('*') if self.peek() == Some('/') => {
                self.bump();
                break;
              }
              Some(_) => continue,
              None => return Err(self.error("unterminated block comment")),
            }
          }
        }
        _ => return Ok(()),
      }
    }
  }

  fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
  }

  fn ident(&mut self) -> String {
    let mut name = String::new();
    while let Some(c) = self.peek() {
      if c.is_alphanumeric() || c == '_' {
        name.push(c);
        self.bump();
      } else {
        break;
      }
    }
    name
  }

  /// Decode a string literal at the cursor: interpreted (`"..."`, with
  /// escape sequences) or raw (backquoted, with carriage returns dropped).
  fn string_lit(&mut self) -> Result<String> {
    match self.peek() {
      Some('"') => {
        self.bump();
        let mut value = String::new();
        loop {
          match self.bump() {
            None | Some('\n') => return Err(self.error("unterminated string literal")),
            Some('"') => return Ok(value),
            Some('\\') => value.push(self.escape()?),
            Some(c) => value.push(c),
          }
        }
      }
      Some('`') => {
        self.bump();
        let mut value = String::new();
        loop {
          match self.bump() {
            None => return Err(self.error("unterminated raw string literal")),
            Some('`') => return Ok(value),
            Some('\r') => continue,
            Some(c) => value.push(c),
          }
        }
      }
      _ => Err(self.error("expected import path string")),
    }
  }

  fn escape(&mut self) -> Result<char> {
    let c = self.bump().ok_or_else(|| self.error("unterminated escape sequence"))?;
    match c {
      'a' => Ok('\u{07}'),
      'b' => Ok('\u{08}'),
      'f' => Ok('\u{0c}'),
      'n' => Ok('\n'),
      'r' => Ok('\r'),
      't' => Ok('\t'),
      'v' => Ok('\u{0b}'),
      '\\' => Ok('\\'),
      '\'' => Ok('\''),
      '"' => Ok('"'),
      'x' => self.hex_escape(2),
      'u' => self.hex_escape(4),
      'U' => self.hex_escape(8),
      '0'..='7' => {
        let mut value = c.to_digit(8).unwrap_or(0);
        for _ in 0..2 {
          let d = self.bump().and_then(|c| c.to_digit(8));
          match d {
            Some(d) => value = value * 8 + d,
            None => return Err(self.error("invalid octal escape")),
          }
        }
        char::from_u32(value).ok_or_else(|| self.error("invalid octal escape"))
      }
      other => Err(self.error(format!("unknown escape sequence \\{other}"))),
    }
  }

  fn hex_escape(&mut self, digits: u32) -> Result<char> {
    let mut value = 0u32;
    for _ in 0..digits {
      let d = self.bump().and_then(|c| c.to_digit(16));
      match d {
        Some(d) => value = value * 16 + d,
        None => return Err(self.error("invalid hex escape")),
      }
    }
    char::from_u32(value).ok_or_else(|| self.error("escape is not a valid code point"))
  }

  /// Parse the package clause and every import declaration that follows.
  fn imports(&mut self) -> Result<Vec<String>> {
    self.skip_trivia()?;
    if self.ident() != "package" {
      return Err(self.error("expected package clause"));
    }
    self.skip_trivia()?;
    if self.ident().is_empty() {
      return Err(self.error("expected package name"));
    }

    let mut imports = Vec::new();
    loop {
      self.skip_trivia()?;
      match self.peek() {
        Some(c) if Self::is_ident_start(c) => {}
        _ => break,
      }

      let before = (self.pos, self.line, self.col);
      if self.ident() != "import" {
        // Anything after the import block is none of our business.
        (self.pos, self.line, self.col) = before;
        break;
      }

      self.skip_trivia()?;
      if self.peek() == Some('(') {
        self.bump();
        loop {
          self.skip_trivia()?;
          match self.peek() {
            Some(')') => {
              self.bump();
              break;
            }
            None => return Err(self.error("unterminated import group")),
            _ => imports.push(self.import_spec()?),
          }
        }
      } else {
        imports.push(self.import_spec()?);
      }
    }

    Ok(imports)
  }

  /// One import spec: an optional alias (`name`, `.`, or `_`) followed by
  /// the import path string.
  fn import_spec(&mut self) -> Result<String> {
    match self.peek() {
      Some('.') => {
        self.bump();
        self.skip_trivia()?;
      }
      Some(c) if Self::is_ident_start(c) => {
        self.ident();
        self.skip_trivia()?;
      }
      _ => {}
    }
    self.string_lit()
  }
}
