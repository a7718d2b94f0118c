//! Minimal terminal styling.
//!
//! Unlike a richly interactive CLI, gistore's output is almost entirely
//! scriptable log lines and the occasional error, so this module is limited
//! to the `anstyle` composition primitive the rest of the ecosystem uses,
//! without pulling in a terminal-rendering stack.

use anstyle::{AnsiColor, Color, Style};

/// Error style (red) — use as `{ERROR}text{ERROR:#}`.
pub const ERROR: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Red)));

/// Bold variant of [`ERROR`] for emphasized spans inside an error message.
pub const ERROR_BOLD: Style = Style::new()
    .fg_color(Some(Color::Ansi(AnsiColor::Red)))
    .bold();

/// Hint style (dimmed) — use as `{HINT}text{HINT:#}`.
pub const HINT: Style = Style::new().dimmed();

/// Warning style (yellow).
pub const WARNING: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Yellow)));

/// Indent a block of text with a left gutter, matching the "quoted command
/// output" look used when surfacing captured child-process output.
pub fn format_with_gutter(text: &str, prefix: &str) -> String {
    text.lines()
        .map(|line| format!("{prefix}  | {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}
