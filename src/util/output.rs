use std::io::{self, Write};

use console::style;

pub fn info(message: &str) {
    let _ = writeln!(io::stderr(), "{}", message);
}

pub fn success(message: &str) {
    let _ = writeln!(io::stderr(), "{}", style(message).green());
}

pub fn warn(message: &str) {
    let _ = writeln!(io::stderr(), "{}", style(message).yellow());
}

pub fn error(message: &str) {
    let _ = writeln!(io::stderr(), "{}", style(message).red());
}

/// Section heading for multi-part reports.
pub fn heading(message: &str) {
    let _ = writeln!(io::stderr(), "{}", style(message).bold());
}

pub fn set_colors(enabled: bool) {
    console::set_colors_enabled(enabled);
    console::set_colors_enabled_stderr(enabled);
}
