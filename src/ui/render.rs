//! Frame rendering

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph},
};

use super::{theme, Appearance, ThemeColor};
use crate::app::App;

/// Draw the whole screen
pub fn draw(f: &mut Frame, app: &mut App) {
    let t = theme::current();
    let area = f.area();

    let block = Block::default()
        .title(Line::from(vec![
            Span::styled(" bgproc ", t.title()),
            Span::styled(
                format!("{} ", app.manager.log_dir().display()),
                t.style(ThemeColor::Dim),
            ),
        ]))
        .borders(Borders::ALL)
        .border_type(t.border_type)
        .border_style(t.frame());
    let inner = block.inner(area);
    f.render_widget(block, area);

    let appearance = Appearance::current();
    let lines = app.dashboard.render_lines(inner.width, &appearance).to_vec();
    f.render_widget(Paragraph::new(lines), inner);
}
