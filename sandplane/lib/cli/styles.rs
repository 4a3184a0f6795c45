use std::{fmt::Write, io::IsTerminal, sync::LazyLock};

use clap::builder::styling::{AnsiColor, Effects, Style, Styles};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Whether stdout is an interactive terminal that understands ANSI escapes.
static IS_ANSI_TERMINAL: LazyLock<bool> = LazyLock::new(|| {
    std::io::stdout().is_terminal() && std::env::var("TERM").map_or(true, |term| term != "dumb")
});

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns a `Styles` object with the default styles for the CLI.
pub fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default())
        .error(AnsiColor::Red.on_default() | Effects::BOLD)
        .valid(AnsiColor::Green.on_default() | Effects::BOLD)
        .invalid(AnsiColor::Red.on_default() | Effects::BOLD)
}

fn paint(text: &str, style: &Style, enabled: bool) -> String {
    if !enabled {
        return text.to_string();
    }

    let mut styled = String::with_capacity(text.len() + 20);
    let _ = write!(styled, "{style}");
    styled.push_str(text);
    let _ = write!(styled, "{}", style.render_reset());
    styled
}

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Applies the [`styles`] palette to text printed by the binary.
pub trait AnsiStyles {
    /// Apply header style to text
    fn header(&self) -> String;

    /// Apply literal style to text
    fn literal(&self) -> String;

    /// Apply error style to text
    fn error(&self) -> String;

    /// Apply valid style to text
    fn valid(&self) -> String;
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl<T: AsRef<str> + ?Sized> AnsiStyles for T {
    fn header(&self) -> String {
        paint(self.as_ref(), styles().get_header(), *IS_ANSI_TERMINAL)
    }

    fn literal(&self) -> String {
        paint(self.as_ref(), styles().get_literal(), *IS_ANSI_TERMINAL)
    }

    fn error(&self) -> String {
        paint(self.as_ref(), styles().get_error(), *IS_ANSI_TERMINAL)
    }

    fn valid(&self) -> String {
        paint(self.as_ref(), styles().get_valid(), *IS_ANSI_TERMINAL)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
