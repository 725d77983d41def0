//! Terminal and color detection.

use std::io::IsTerminal;

/// Output stream a decision is made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    #[must_use]
    pub fn is_tty(self) -> bool {
        match self {
            Self::Stdout => std::io::stdout().is_terminal(),
            Self::Stderr => std::io::stderr().is_terminal(),
        }
    }
}

#[must_use]
pub fn stdout_is_tty() -> bool {
    Stream::Stdout.is_tty()
}

#[must_use]
pub fn stderr_is_tty() -> bool {
    Stream::Stderr.is_tty()
}

/// Whether styled output should go to stdout.
///
/// `--no-color`, `NO_COLOR` and `TERM=dumb` always win. `CLICOLOR_FORCE`
/// enables color on a pipe.
#[must_use]
pub fn should_use_color(no_color_flag: bool) -> bool {
    color_enabled(no_color_flag, |key| std::env::var(key).ok(), stdout_is_tty())
}

fn color_enabled(no_color_flag: bool, var: impl Fn(&str) -> Option<String>, tty: bool) -> bool {
    if no_color_flag || var("NO_COLOR").is_some() {
        return false;
    }
    if var("TERM").is_some_and(|t| t == "dumb") {
        return false;
    }
    if var("CLICOLOR_FORCE").is_some_and(|v| v != "0") {
        return true;
    }
    tty
}
