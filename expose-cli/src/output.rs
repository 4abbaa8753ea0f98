//! Terminal markers shared by every verb.
//!
//! A verb announces what it is about to do on a pending line, then closes it
//! with `✓` on stdout or `✗` on stderr once the controller returns.

use dialoguer::console::style;
use std::io::{self, Write};

/// Announce the operation on stdout and leave the line open for its outcome.
pub fn print_step(message: &str) {
    let _ = print_step_to(&mut io::stdout(), message);
}

pub fn print_step_to<W: Write>(w: &mut W, message: &str) -> io::Result<()> {
    write!(w, "{message} ")?;
    w.flush()
}

/// Report a completed operation, e.g. the public URL of a started port.
pub fn print_success(message: &str) {
    let _ = print_success_to(&mut io::stdout(), message);
}

/// Outcome lines start on a fresh line below the pending step.
pub fn print_success_to<W: Write>(w: &mut W, message: &str) -> io::Result<()> {
    writeln!(
        w,
        "\n{} {}",
        style("✓").green().bold(),
        style(message).green()
    )
}

/// Report a failed verb on stderr; `main` exits with code 1 afterwards.
pub fn print_error(message: &str) {
    // Terminate a pending step line on stdout first
    println!();
    let _ = print_error_to(&mut io::stderr(), message);
}

pub fn print_error_to<W: Write>(w: &mut W, message: &str) -> io::Result<()> {
    writeln!(w, "{} {}", style("✗").red().bold(), style(message).red())
}
