//! Glyphs for status marks and row decoration, with an ASCII fallback

use std::sync::{PoisonError, RwLock};

use crate::process::format::StatusMark;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Icons {
    pub active: &'static str,
    pub succeeded: &'static str,
    pub failed: &'static str,
    /// In front of the selected row; always two columns
    pub pointer: &'static str,
    pub rule: &'static str,
}

impl Icons {
    pub const UNICODE: Icons = Icons {
        active: "●",
        succeeded: "✓",
        failed: "✗",
        pointer: "❯ ",
        rule: "─",
    };

    /// For terminals without the box-drawing and symbol glyphs
    pub const ASCII: Icons = Icons {
        active: "*",
        succeeded: "+",
        failed: "x",
        pointer: "> ",
        rule: "-",
    };

    pub fn mark(&self, mark: StatusMark) -> &'static str {
        match mark {
            StatusMark::Active => self.active,
            StatusMark::Succeeded => self.succeeded,
            StatusMark::Failed => self.failed,
        }
    }
}

impl Default for Icons {
    fn default() -> Self {
        Self::UNICODE
    }
}

static ACTIVE: RwLock<Icons> = RwLock::new(Icons::UNICODE);

pub fn current() -> Icons {
    *ACTIVE.read().unwrap_or_else(PoisonError::into_inner)
}

pub fn set_icons(icons: Icons) {
    *ACTIVE.write().unwrap_or_else(PoisonError::into_inner) = icons;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marks_resolve_per_set() {
        assert_eq!(Icons::UNICODE.mark(StatusMark::Active), "●");
        assert_eq!(Icons::UNICODE.mark(StatusMark::Failed), "✗");
        assert_eq!(Icons::UNICODE.mark(StatusMark::Succeeded), "✓");

        for mark in [StatusMark::Active, StatusMark::Failed, StatusMark::Succeeded] {
            assert!(Icons::ASCII.mark(mark).is_ascii());
        }
        assert_eq!(Icons::ASCII.pointer.len(), 2);
    }
}
