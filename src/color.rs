//! ANSI escape sequences for terminal diagnostics.

pub const RED: &str = "\x1b[31m";
pub const BOLD: &str = "\x1b[1m";
pub const END: &str = "\x1b[0m";
