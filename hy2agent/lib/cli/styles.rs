use std::{fmt::Write, io::IsTerminal};

use clap::builder::styling::{AnsiColor, Effects, Style, Styles};

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

/// Returns true if stdout is an interactive terminal that renders ANSI escapes.
pub fn is_ansi_terminal() -> bool {
    std::io::stdout().is_terminal() && std::env::var("TERM").map_or(true, |term| term != "dumb")
}

fn apply_style(text: &str, style: &Style, ansi: bool) -> String {
    if !ansi {
        return text.to_string();
    }

    let mut styled = String::with_capacity(text.len() + 20);
    let _ = write!(styled, "{}", style);
    styled.push_str(text);
    let _ = write!(styled, "{}", style.render_reset());
    styled
}

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Applies the CLI [`styles`] to text printed outside of clap.
pub trait AnsiStyles {
    /// Apply literal style to text
    fn literal(&self) -> String;
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl AnsiStyles for str {
    fn literal(&self) -> String {
        apply_style(self, styles().get_literal(), is_ansi_terminal())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_style_plain() {
        let style = styles();
        assert_eq!(apply_style("key", style.get_literal(), false), "key");
    }

    #[test]
    fn test_apply_style_ansi() {
        let style = styles();
        let styled = apply_style("key", style.get_literal(), true);

        assert!(styled.contains("\x1b[1m"));
        assert!(styled.contains("\x1b[34m"));
        assert!(styled.contains("key"));
        assert!(styled.ends_with("\x1b[0m"));
    }
}
