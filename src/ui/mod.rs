//! Terminal UI module
//!
//! This module provides all UI rendering functionality including:
//! - Theme system with semantic colors
//! - Icon set with Unicode and ASCII support
//! - The process dashboard and the frame it is drawn in

pub mod dashboard;
pub mod icons;
pub mod theme;
mod render;

use ratatui::style::Modifier;
use ratatui::text::Span;

use crate::process::format::StatusMark;

pub use dashboard::{Dashboard, KeyOutcome};
pub use icons::Icons;
pub use render::draw;
pub use theme::{Styler, Theme, ThemeColor};

/// Initialize the UI system with config settings
pub fn init(config: &crate::core::Config) {
    theme::set_theme(Theme::from(&config.ui.theme));
    icons::set_icons(if config.ui.ascii_icons {
        Icons::ASCII
    } else {
        Icons::UNICODE
    });
}

/// Theme plus icon set, as the dashboard sees them
#[derive(Debug, Clone, Copy, Default)]
pub struct Appearance {
    pub theme: Theme,
    pub icons: Icons,
}

impl Appearance {
    /// Whatever [`init`] installed
    pub fn current() -> Self {
        Self {
            theme: theme::current(),
            icons: icons::current(),
        }
    }
}

impl Styler for Appearance {
    fn fg(&self, color: ThemeColor, text: &str) -> Span<'static> {
        Span::styled(text.to_string(), self.theme.style(color))
    }

    fn bold(&self, text: &str) -> Span<'static> {
        Span::styled(
            text.to_string(),
            self.theme.style(ThemeColor::Text).add_modifier(Modifier::BOLD),
        )
    }

    fn mark(&self, mark: StatusMark) -> &'static str {
        self.icons.mark(mark)
    }

    fn pointer(&self) -> &'static str {
        self.icons.pointer
    }

    fn rule(&self) -> &'static str {
        self.icons.rule
    }
}
