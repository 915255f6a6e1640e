use std::{
    collections::VecDeque,
    sync::mpsc::{Receiver, TryRecvError},
    time::Duration,
};

use anyhow::Result;
use crossterm::{
    event::{self, Event as CEvent, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use pingthing_history::ResponseHistory;
use pingthing_ops::LogEntry;
use pingthing_types::{
    config::Preferences,
    events::{DisplayKind, DisplayUpdate, APP_NAME},
    sample::Sample,
};
use ratatui::{
    backend::CrosstermBackend,
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Widget},
    Terminal,
};

const MAX_LOG_ENTRIES: usize = 200;
const GRAPH_ROWS: u16 = 6;

pub enum UiMessage {
    Display(DisplayUpdate),
    Log(LogEntry),
    Preferences(Preferences),
}

struct UiState {
    history: ResponseHistory,
    bar_width: u16,
    live: bool,
    title: String,
    tooltip: String,
    logs: VecDeque<String>,
}

impl UiState {
    fn new(preferences: &Preferences, backlog: Vec<LogEntry>) -> Self {
        let mut logs = VecDeque::with_capacity(MAX_LOG_ENTRIES);
        for entry in backlog {
            push_bounded(&mut logs, entry.to_string());
        }
        Self {
            history: ResponseHistory::new(preferences.session_config().history_size),
            bar_width: preferences.bar_width(),
            live: false,
            title: "Initializing…".into(),
            tooltip: APP_NAME.into(),
            logs,
        }
    }

    fn apply(&mut self, message: UiMessage) {
        match message {
            UiMessage::Display(update) => {
                match update.kind {
                    DisplayKind::Success => {
                        if let Some(ms) = update.ms {
                            self.history.record(Sample::reply(ms / 1000.0));
                        }
                    }
                    DisplayKind::Timeout => self.history.record(Sample::timeout()),
                    _ => {}
                }
                self.live = update.is_live();
                self.title = update.title();
                self.tooltip = update.tooltip;
            }
            UiMessage::Log(entry) => push_bounded(&mut self.logs, entry.to_string()),
            UiMessage::Preferences(preferences) => {
                self.history
                    .set_capacity(preferences.session_config().history_size);
                self.bar_width = preferences.bar_width();
            }
        }
    }
}

fn push_bounded(logs: &mut VecDeque<String>, line: String) {
    if logs.len() == MAX_LOG_ENTRIES {
        logs.pop_front();
    }
    logs.push_back(line);
}

pub fn run(receiver: Receiver<UiMessage>, preferences: Preferences, backlog: Vec<LogEntry>) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.hide_cursor()?;

    let mut state = UiState::new(&preferences, backlog);
    let res = run_loop(&mut terminal, receiver, &mut state);

    terminal.show_cursor()?;
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    res
}

fn run_loop<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    receiver: Receiver<UiMessage>,
    state: &mut UiState,
) -> Result<()> {
    loop {
        loop {
            match receiver.try_recv() {
                Ok(message) => state.apply(message),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return Ok(()),
            }
        }

        terminal.draw(|f| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints(
                    [
                        Constraint::Length(3),
                        Constraint::Length(GRAPH_ROWS + 2),
                        Constraint::Min(0),
                    ]
                    .as_ref(),
                )
                .split(f.size());

            let header = Paragraph::new(Line::from(vec![
                Span::styled(
                    APP_NAME,
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::raw("  "),
                Span::raw(state.title.clone()),
                Span::raw("  "),
                Span::styled(state.tooltip.clone(), Style::default().fg(Color::Magenta)),
                Span::raw("  "),
                Span::styled("q", Style::default().fg(Color::Yellow)),
                Span::raw(" to quit"),
            ]))
            .block(Block::default().borders(Borders::ALL).title("Status"));
            f.render_widget(header, chunks[0]);

            let graph = LatencyGraph {
                history: &state.history,
                bar_width: state.bar_width,
                live: state.live,
            };
            let graph_block = Block::default().borders(Borders::ALL).title("Latency");
            let graph_area = graph_block.inner(chunks[1]);
            f.render_widget(graph_block, chunks[1]);
            f.render_widget(graph, graph_area);

            let items: Vec<ListItem> = state
                .logs
                .iter()
                .rev()
                .map(|entry| ListItem::new(entry.clone()))
                .collect();
            let list = List::new(items).block(Block::default().borders(Borders::ALL).title("Log"));
            f.render_widget(list, chunks[2]);
        })?;

        if event::poll(Duration::from_millis(100))? {
            if let CEvent::Key(key) = event::read()? {
                let interrupt = key.code == KeyCode::Char('c')
                    && key.modifiers.contains(KeyModifiers::CONTROL);
                if interrupt || matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Right-aligned bars, one per sample, with the fast, medium and slow
/// portions stacked from the bottom.
struct LatencyGraph<'a> {
    history: &'a ResponseHistory,
    bar_width: u16,
    live: bool,
}

impl LatencyGraph<'_> {
    fn paint(&self, buf: &mut Buffer, area: Rect, x: u16, rows: u16, color: Color) {
        let rows = rows.min(area.height);
        for dx in 0..self.bar_width {
            let col = x.saturating_add(dx);
            if col >= area.right() {
                break;
            }
            for dy in 0..rows {
                let y = area.bottom() - 1 - dy;
                buf.get_mut(col, y).set_symbol("█").set_fg(color);
            }
        }
    }

    fn color(&self, color: Color) -> Color {
        if self.live {
            color
        } else {
            Color::DarkGray
        }
    }
}

fn rows_for(fraction: f64, height: u16) -> u16 {
    (fraction.clamp(0.0, 1.0) * f64::from(height)).round() as u16
}

impl Widget for LatencyGraph<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.width == 0 || area.height == 0 {
            return;
        }
        let slots = self.history.capacity() as u16;
        let offset = slots.saturating_sub(self.history.len() as u16);
        for (index, sample) in self.history.samples().enumerate() {
            let slot = u32::from(offset) + index as u32;
            let x = u32::from(area.x) + slot * u32::from(self.bar_width);
            if x >= u32::from(area.right()) {
                break;
            }
            let x = x as u16;
            match self.history.fill(sample) {
                None => self.paint(buf, area, x, area.height, self.color(Color::Red)),
                Some(fill) => {
                    self.paint(buf, area, x, rows_for(fill.fast, area.height), self.color(Color::Green));
                    self.paint(buf, area, x, rows_for(fill.medium, area.height), self.color(Color::Yellow));
                    self.paint(buf, area, x, rows_for(fill.slow, area.height), self.color(Color::Red));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_updates_feed_the_graph_history() {
        let mut state = UiState::new(&Preferences::default(), Vec::new());
        let destination = pingthing_types::probe::Destination {
            host: "8.8.8.8".into(),
            ip: "8.8.8.8".parse().unwrap(),
        };
        state.apply(UiMessage::Display(DisplayUpdate::success(&destination, 12.0, Some(12.0))));
        state.apply(UiMessage::Display(DisplayUpdate::timeout(&destination, Some(12.0))));
        state.apply(UiMessage::Display(DisplayUpdate::waiting("8.8.8.8", "waiting for network")));

        assert_eq!(state.history.len(), 2);
        assert_eq!(state.history.timeout_count(), 1);
        assert!(!state.live);
        assert_eq!(state.title, "🔴 8.8.8.8 (waiting for network)");
    }

    #[test]
    fn timeouts_fill_the_whole_column() {
        let mut history = ResponseHistory::new(16);
        history.record(Sample::reply(0.070));
        history.record(Sample::timeout());
        let area = Rect::new(0, 0, 32, 4);
        let mut buf = Buffer::empty(area);
        LatencyGraph {
            history: &history,
            bar_width: 2,
            live: true,
        }
        .render(area, &mut buf);

        // last slot holds the timeout, drawn full height in red
        for y in 0..4 {
            assert_eq!(buf.get(30, y).fg, Color::Red);
        }
        // the 70ms reply: fast fills all rows, medium overlays the bottom one
        assert_eq!(buf.get(28, 3).fg, Color::Yellow);
        assert_eq!(buf.get(28, 0).fg, Color::Green);
    }

    #[test]
    fn oversized_bars_are_cut_at_the_edge() {
        let mut history = ResponseHistory::new(64);
        history.record(Sample::reply(0.020));
        let area = Rect::new(0, 0, 80, 4);
        let mut buf = Buffer::empty(area);
        LatencyGraph {
            history: &history,
            bar_width: 1_100,
            live: true,
        }
        .render(area, &mut buf);

        // the only sample sits in the last slot, far beyond the right edge
        for x in 0..80 {
            assert_eq!(buf.get(x, 3).symbol(), " ");
        }
    }
}
