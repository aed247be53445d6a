use std::{
    io::{self, Stdout},
    sync::mpsc::Receiver,
    time::Duration,
};
use chrono::{DateTime, Local};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{Axis, Block, BorderType, Borders, Chart, Dataset, GraphType, Paragraph},
    Frame, Terminal,
};
use tracing::error;

use crate::app::{App, InputMode, Outcome, Update, ZoomField};
use crate::constants::UI_POLL_MS;
use crate::render::{Interval, TickPolicy, YRange};
use crate::util::{auto_bounds, format_latency};

const INTERVAL_KEYS: [(Interval, char, &str); 5] = [
    (Interval::OneMin, '1', "1 min"),
    (Interval::FiveMin, '5', "5 min"),
    (Interval::TenMin, '0', "10 min"),
    (Interval::ThirtyMin, '3', "30 min"),
    (Interval::Full, 'f', "Full"),
];

pub fn run(app: App, updates: Receiver<Update>) -> io::Result<()> {
    // Initialize terminal
    enable_raw_mode()?;
    let mut terminal = undo_on_err(enter_alternate_screen(), disable_raw_mode)?;

    let res = run_app_loop(&mut terminal, app, updates);

    // Cleanup
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = &res {
        error!(error = %err, "ui loop failed");
    }
    res
}

fn enter_alternate_screen() -> io::Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

/// Runs `undo` when `res` failed, keeping the original error.
fn undo_on_err<T>(res: io::Result<T>, undo: impl FnOnce() -> io::Result<()>) -> io::Result<T> {
    if res.is_err() {
        if let Err(err) = undo() {
            error!(error = %err, "terminal restore failed");
        }
    }
    res
}

fn run_app_loop<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    mut app: App,
    updates: Receiver<Update>,
) -> io::Result<()> {
    let poll_rate = Duration::from_millis(UI_POLL_MS);

    loop {
        terminal.draw(|f| draw(f, &app))?;

        for update in updates.try_iter() {
            app.apply(update);
        }

        // Handle input
        if event::poll(poll_rate)? {
            if let Event::Key(key) = event::read()? {
                if handle_key(&mut app, key) {
                    return Ok(());
                }
            }
        }
    }
}

/// Applies one key press. Returns true when the user asked to quit.
pub fn handle_key(app: &mut App, key: KeyEvent) -> bool {
    if key.kind != KeyEventKind::Press {
        return false;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return true;
    }

    match app.input_mode {
        InputMode::Normal => match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Char('z') => {
                app.zoom_form.focus = ZoomField::Upper;
                app.input_mode = InputMode::EditingZoom;
            }
            KeyCode::Char('r') => app.apply(Update::SetZoom { upper: 0.0, lower: 0.0 }),
            KeyCode::Char(c) => {
                if let Some((interval, _, _)) = INTERVAL_KEYS.iter().find(|(_, k, _)| *k == c) {
                    app.apply(Update::SetInterval(*interval));
                }
            }
            _ => {}
        },
        InputMode::EditingZoom => match key.code {
            KeyCode::Enter => {
                let (upper, lower) = app.zoom_form.submit();
                app.apply(Update::SetZoom { upper, lower });
                app.input_mode = InputMode::Normal;
            }
            KeyCode::Esc => app.input_mode = InputMode::Normal,
            KeyCode::Tab | KeyCode::BackTab => app.zoom_form.toggle_focus(),
            KeyCode::Backspace => {
                app.zoom_form.focused_mut().pop();
            }
            KeyCode::Char(c) => app.zoom_form.focused_mut().push(c),
            _ => {}
        },
    }
    false
}

pub fn draw(f: &mut Frame, app: &App) {
    // ============= whole screen layout ============
    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(10),   // Chart + controls
            Constraint::Length(1), // Bottom Status Bar
        ].as_ref())
        .split(f.size());

    let top_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(70), Constraint::Percentage(30)].as_ref())
        .split(main_chunks[0]);

    draw_chart(f, top_chunks[0], app);
    draw_controls(f, top_chunks[1], app);
    draw_status_bar(f, main_chunks[1], app);
}

fn describe_ticks(policy: &TickPolicy) -> String {
    match policy {
        TickPolicy::AnchorAtOrigin => "start only".to_string(),
        TickPolicy::Every(step) if step.num_seconds() < 60 => format!("every {}s", step.num_seconds()),
        TickPolicy::Every(step) => format!("every {}m", step.num_minutes()),
    }
}

fn draw_chart(f: &mut Frame, area: Rect, app: &App) {
    let spec = &app.chart;
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" Latency [{}] ", app.target))
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::Cyan));

    let Some(origin) = spec.x.first().copied() else {
        let waiting = Paragraph::new("Waiting for the first sample...")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        f.render_widget(waiting, area);
        return;
    };

    // x is seconds since the oldest sample on screen
    let offset = |t: &DateTime<Local>| (*t - origin).num_milliseconds() as f64 / 1000.0;
    let points: Vec<(f64, f64)> = spec.x.iter().zip(&spec.y).map(|(t, y)| (offset(t), *y)).collect();
    let failures: Vec<(f64, f64)> = points
        .iter()
        .zip(&spec.failed)
        .filter(|(_, failed)| **failed)
        .map(|(p, _)| *p)
        .collect();

    let x_max = points.last().map(|p| p.0).unwrap_or(0.0).max(1.0);
    let y_bounds = match spec.y_range {
        YRange::Auto => auto_bounds(&spec.y),
        YRange::Fixed { lower, upper } => [lower, upper],
    };

    let grid: Vec<[(f64, f64); 2]> = spec
        .ticks
        .iter()
        .map(|t| {
            let x = offset(t);
            [(x, y_bounds[0]), (x, y_bounds[1])]
        })
        .collect();

    let mut datasets: Vec<Dataset> = grid
        .iter()
        .map(|line| {
            Dataset::default()
                .marker(Marker::Dot)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(Color::DarkGray))
                .data(line)
        })
        .collect();
    datasets.push(
        Dataset::default()
            .name("latency (ms)")
            .marker(Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Cyan))
            .data(&points),
    );
    if !failures.is_empty() {
        datasets.push(
            Dataset::default()
                .name("timeout")
                .marker(Marker::Dot)
                .graph_type(GraphType::Scatter)
                .style(Style::default().fg(Color::Red))
                .data(&failures),
        );
    }

    let label_format = spec.tick_policy.label_format();
    let last = spec.x.last().copied().unwrap_or(origin);
    let x_labels = vec![
        Span::raw(origin.format(label_format).to_string()),
        Span::raw(last.format(label_format).to_string()),
    ];
    let y_labels = vec![
        Span::raw(format!("{:.1}", y_bounds[0])),
        Span::raw(format!("{:.1}", (y_bounds[0] + y_bounds[1]) / 2.0)),
        Span::raw(format!("{:.1}", y_bounds[1])),
    ];

    let chart = Chart::new(datasets)
        .block(block)
        .x_axis(
            Axis::default()
                .title(format!("time, ticks {}", describe_ticks(&spec.tick_policy)))
                .style(Style::default().fg(Color::Gray))
                .bounds([0.0, x_max])
                .labels(x_labels),
        )
        .y_axis(
            Axis::default()
                .title("ms")
                .style(Style::default().fg(Color::Gray))
                .bounds(y_bounds)
                .labels(y_labels),
        );
    f.render_widget(chart, area);
}

fn draw_controls(f: &mut Frame, area: Rect, app: &App) {
    let header = Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD);
    let dim = Style::default().fg(Color::DarkGray);

    let mut lines = vec![Line::from(Span::styled("Interval", header))];
    for (interval, key, label) in INTERVAL_KEYS {
        let style = if interval == app.params.interval {
            Style::default().fg(Color::Black).bg(Color::Cyan).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        lines.push(Line::from(vec![
            Span::styled(format!(" [{}] ", key), dim),
            Span::styled(format!(" {} ", label), style),
        ]));
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled("Zoom", header)));
    let editing = app.input_mode == InputMode::EditingZoom;
    for (field, name, text) in [
        (ZoomField::Upper, "Upper", &app.zoom_form.upper),
        (ZoomField::Lower, "Lower", &app.zoom_form.lower),
    ] {
        let focused = editing && app.zoom_form.focus == field;
        let value_style = if focused {
            Style::default().fg(Color::White).bg(Color::Rgb(50, 50, 50))
        } else {
            Style::default()
        };
        let cursor = if focused { "_" } else { "" };
        lines.push(Line::from(vec![
            Span::styled(format!(" {}: ", name), dim),
            Span::styled(format!("{}{}", text, cursor), value_style),
        ]));
    }
    let range = match app.chart.y_range {
        YRange::Auto => "auto".to_string(),
        YRange::Fixed { lower, upper } if lower > upper => format!("[{}, {}] inverted", lower, upper),
        YRange::Fixed { lower, upper } => format!("[{}, {}]", lower, upper),
    };
    lines.push(Line::from(vec![Span::styled(" Range: ", dim), Span::raw(range)]));

    lines.push(Line::from(""));
    let help = if editing {
        " Tab switch  Enter apply  Esc cancel"
    } else {
        " z edit  r reset  q quit"
    };
    lines.push(Line::from(Span::styled(help, dim)));

    let panel = Paragraph::new(lines).block(
        Block::default()
            .title(" Controls ")
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded),
    );
    f.render_widget(panel, area);
}

fn draw_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let status = app.history.status();
    let (last, last_color) = match status.latest.map(|s| s.outcome) {
        None => ("-".to_string(), Color::DarkGray),
        Some(outcome @ Outcome::Failed) => (format_latency(outcome), Color::Red),
        Some(outcome @ Outcome::Latency(ms)) => {
            let color = if ms < 50.0 { Color::Green } else if ms < 150.0 { Color::LightYellow } else { Color::Red };
            (format_latency(outcome), color)
        }
    };

    let status_content = Line::from(vec![
        Span::styled(" PING ", Style::default().bg(Color::White).fg(Color::Black).add_modifier(Modifier::BOLD)),
        Span::raw(format!(" {} via {}", app.target, app.probe_kind)),
        Span::raw(" | "),
        Span::styled("LAST: ", Style::default().add_modifier(Modifier::BOLD)),
        Span::styled(last, Style::default().fg(last_color)),
        Span::raw(" | "),
        Span::raw(format!("{}/{} samples", status.len, status.capacity)),
        Span::raw(" | Press 'q' to quit"),
    ]);

    let status_bar = Paragraph::new(status_content)
        .style(Style::default().bg(Color::Rgb(20, 20, 20)));
    f.render_widget(status_bar, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{Sample, SharedHistory};
    use crate::network::ProbeKind;
    use crate::render::DisplayParams;
    use chrono::TimeZone;
    use ratatui::backend::TestBackend;

    fn app_with(samples: &[(i64, Outcome)]) -> App {
        let history = SharedHistory::new(100);
        for (secs, outcome) in samples {
            history.push(Sample {
                timestamp: Local.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
                outcome: *outcome,
            });
        }
        App::new("192.0.2.7", ProbeKind::Tcp, history, DisplayParams::default())
    }

    fn press(app: &mut App, code: KeyCode) -> bool {
        handle_key(app, KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    fn screen(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|f| draw(f, app)).unwrap();
        terminal.backend().buffer().content.iter().map(|c| c.symbol()).collect()
    }

    #[test]
    fn failed_setup_restores_terminal() {
        let mut restored = false;
        let res: io::Result<()> = undo_on_err(Err(io::Error::new(io::ErrorKind::Other, "no tty")), || {
            restored = true;
            Ok(())
        });
        assert!(restored);
        assert_eq!(res.unwrap_err().to_string(), "no tty");

        let mut restored = false;
        let res = undo_on_err(Ok(7), || {
            restored = true;
            Ok(())
        });
        assert!(!restored);
        assert_eq!(res.unwrap(), 7);

        // a failing restore does not replace the setup error
        let res: io::Result<()> = undo_on_err(Err(io::Error::new(io::ErrorKind::Other, "no tty")), || {
            Err(io::Error::new(io::ErrorKind::Other, "still raw"))
        });
        assert_eq!(res.unwrap_err().to_string(), "no tty");
    }

    #[test]
    fn draws_empty_history() {
        let text = screen(&app_with(&[]));
        assert!(text.contains("Waiting for the first sample"));
        assert!(text.contains("0/100 samples"));
    }

    #[test]
    fn draws_samples_and_failures() {
        let mut app = app_with(&[(0, Outcome::Latency(20.0)), (1, Outcome::Latency(35.0)), (2, Outcome::Failed)]);
        app.set_interval(Interval::OneMin);
        let text = screen(&app);
        assert!(text.contains("192.0.2.7 via tcp"));
        assert!(text.contains("3/100 samples"));
        assert!(text.contains("timeout"));
    }

    #[test]
    fn draws_inverted_zoom_without_panicking() {
        let mut app = app_with(&[(0, Outcome::Latency(20.0)), (1, Outcome::Latency(25.0))]);
        app.set_zoom_range(10.0, 50.0);
        let text = screen(&app);
        assert!(text.contains("inverted"));
    }

    #[test]
    fn interval_keys_switch_interval() {
        let mut app = app_with(&[]);
        for (interval, key, _) in INTERVAL_KEYS {
            assert!(!press(&mut app, KeyCode::Char(key)));
            assert_eq!(app.params.interval, interval);
        }
        press(&mut app, KeyCode::Char('x'));
        assert_eq!(app.params.interval, Interval::Full);
    }

    #[test]
    fn zoom_form_applies_and_resets() {
        let mut app = app_with(&[(0, Outcome::Latency(20.0))]);
        press(&mut app, KeyCode::Char('z'));
        assert_eq!(app.input_mode, InputMode::EditingZoom);
        type_text(&mut app, "1000");
        press(&mut app, KeyCode::Backspace);
        press(&mut app, KeyCode::Tab);
        type_text(&mut app, "0");
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.input_mode, InputMode::Normal);
        assert_eq!(app.chart.y_range, YRange::Fixed { lower: 0.0, upper: 100.0 });

        press(&mut app, KeyCode::Char('r'));
        assert_eq!(app.chart.y_range, YRange::Auto);
    }

    #[test]
    fn garbage_zoom_falls_back_to_auto() {
        let mut app = app_with(&[]);
        app.set_zoom_range(80.0, 10.0);
        press(&mut app, KeyCode::Char('z'));
        type_text(&mut app, "fast");
        press(&mut app, KeyCode::Tab);
        type_text(&mut app, "1");
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.chart.y_range, YRange::Auto);
    }

    #[test]
    fn quit_keys() {
        let mut app = app_with(&[]);
        assert!(press(&mut app, KeyCode::Char('q')));
        assert!(press(&mut app, KeyCode::Esc));
        assert!(handle_key(&mut app, KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)));

        // Esc only leaves the zoom form
        press(&mut app, KeyCode::Char('z'));
        assert!(!press(&mut app, KeyCode::Esc));
        assert_eq!(app.input_mode, InputMode::Normal);
    }
}
