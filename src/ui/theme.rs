//! Semantic colors and the two palettes behind them
//!
//! The dashboard never picks a concrete color. It asks a [`Styler`] for a
//! [`ThemeColor`], and the active [`Theme`] decides what that means on screen.

use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Span;
use ratatui::widgets::BorderType;
use std::sync::{PoisonError, RwLock};

use crate::core::Theme as Variant;
use crate::process::format::{StatusMark, Tone};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeColor {
    Accent,
    Text,
    Muted,
    Dim,
    Border,
    Success,
    Warning,
    Error,
}

impl From<Tone> for ThemeColor {
    fn from(tone: Tone) -> Self {
        match tone {
            Tone::Success => ThemeColor::Success,
            Tone::Warning => ThemeColor::Warning,
            Tone::Error => ThemeColor::Error,
        }
    }
}

/// Rendering collaborator handed to the dashboard
pub trait Styler {
    /// `text` in the given semantic color
    fn fg(&self, color: ThemeColor, text: &str) -> Span<'static>;

    /// `text` emphasized
    fn bold(&self, text: &str) -> Span<'static>;

    fn mark(&self, mark: StatusMark) -> &'static str;

    /// Marker in front of the selected row, two columns wide
    fn pointer(&self) -> &'static str {
        "> "
    }

    /// One column of a horizontal separator
    fn rule(&self) -> &'static str {
        "─"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    pub variant: Variant,
    pub border_type: BorderType,
}

impl Theme {
    pub const DARK: Theme = Theme {
        variant: Variant::Dark,
        border_type: BorderType::Rounded,
    };

    pub const LIGHT: Theme = Theme {
        variant: Variant::Light,
        border_type: BorderType::Rounded,
    };

    pub fn color(&self, color: ThemeColor) -> Color {
        match self.variant {
            Variant::Dark => dark(color),
            Variant::Light => light(color),
        }
    }

    pub fn style(&self, color: ThemeColor) -> Style {
        Style::default().fg(self.color(color))
    }

    /// Outer frame
    pub fn frame(&self) -> Style {
        self.style(ThemeColor::Accent)
    }

    pub fn title(&self) -> Style {
        self.frame().add_modifier(Modifier::BOLD)
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::DARK
    }
}

impl From<&Variant> for Theme {
    fn from(variant: &Variant) -> Self {
        match variant {
            Variant::Dark => Self::DARK,
            Variant::Light => Self::LIGHT,
        }
    }
}

fn dark(color: ThemeColor) -> Color {
    match color {
        ThemeColor::Accent => Color::Cyan,
        ThemeColor::Text => Color::White,
        ThemeColor::Muted => Color::Gray,
        ThemeColor::Dim | ThemeColor::Border => Color::DarkGray,
        ThemeColor::Success => Color::Green,
        ThemeColor::Warning => Color::Yellow,
        ThemeColor::Error => Color::Red,
    }
}

// Pure yellow and green wash out on white backgrounds
fn light(color: ThemeColor) -> Color {
    match color {
        ThemeColor::Accent => Color::Blue,
        ThemeColor::Text => Color::Black,
        ThemeColor::Muted => Color::DarkGray,
        ThemeColor::Dim | ThemeColor::Border => Color::Gray,
        ThemeColor::Success => Color::Rgb(0, 140, 0),
        ThemeColor::Warning => Color::Rgb(190, 140, 0),
        ThemeColor::Error => Color::Rgb(200, 0, 0),
    }
}

static ACTIVE: RwLock<Theme> = RwLock::new(Theme::DARK);

/// The theme installed by [`set_theme`], dark until then
pub fn current() -> Theme {
    *ACTIVE.read().unwrap_or_else(PoisonError::into_inner)
}

pub fn set_theme(theme: Theme) {
    *ACTIVE.write().unwrap_or_else(PoisonError::into_inner) = theme;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tones_use_status_colors() {
        let theme = Theme::DARK;
        assert_eq!(theme.color(Tone::Success.into()), Color::Green);
        assert_eq!(theme.color(Tone::Warning.into()), Color::Yellow);
        assert_eq!(theme.color(Tone::Error.into()), Color::Red);
    }

    #[test]
    fn test_config_variant_selects_palette() {
        assert_eq!(Theme::from(&Variant::Light).color(ThemeColor::Text), Color::Black);
        assert_eq!(Theme::from(&Variant::Dark).color(ThemeColor::Text), Color::White);
        assert_eq!(Theme::LIGHT.title().fg, Some(Color::Blue));
    }
}
