//! CLI diagnostics.
//!
//! All of the driver's own output goes to stderr, where the sandbox
//! captures it alongside the forwarded toolchain output.

use owo_colors::{OwoColorize, Stream};

/// Print the one-line fatal error the sandbox log shows when a build
/// fails, prefixed with the configured program name.
pub fn print_fatal(program: &str, err: &anyhow::Error) {
  let reason = format!("{err:#}");
  eprintln!(
    "{}: {}",
    program,
    reason.if_supports_color(Stream::Stderr, |s| s.red())
  );
}
