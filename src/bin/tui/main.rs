mod app;

use std::io;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use app::{format_age, format_edge, format_line, format_ms, format_price, truncate, AppState, ConnectionStatus};

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    let base_url = std::env::var("API_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(io::Error::other)?;

    let mut app = AppState::new(base_url);

    // Initial fetch before rendering
    app.refresh(&client).await;

    // Terminal setup
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_loop(&mut terminal, &mut app, &client).await;

    // Restore terminal regardless of result
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut AppState,
    client: &reqwest::Client,
) -> io::Result<()> {
    let refresh_interval = Duration::from_secs(2);
    let mut last_tick = std::time::Instant::now();
    let mut group_state = TableState::default();

    loop {
        group_state.select(app.selected);
        terminal.draw(|f| render(f, app, &mut group_state))?;

        let timeout = refresh_interval
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);

        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Char('Q') => return Ok(()),
                        KeyCode::Char('r') | KeyCode::Char('R') => {
                            app.refresh(client).await;
                            last_tick = std::time::Instant::now();
                        }
                        KeyCode::Down | KeyCode::Char('j') => {
                            app.select_next();
                            app.refresh_results(client).await;
                        }
                        KeyCode::Up | KeyCode::Char('k') => {
                            app.select_prev();
                            app.refresh_results(client).await;
                        }
                        _ => {}
                    }
                }
            }
        }

        if last_tick.elapsed() >= refresh_interval {
            app.refresh(client).await;
            last_tick = std::time::Instant::now();
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render(f: &mut Frame, app: &AppState, group_state: &mut TableState) {
    let area = f.area();

    // Outer vertical split: header | body | footer
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Min(0),    // body
            Constraint::Length(1), // footer
        ])
        .split(area);

    render_header(f, app, chunks[0]);
    render_body(f, app, group_state, chunks[1]);
    render_footer(f, chunks[2]);
}

fn render_header(f: &mut Frame, app: &AppState, area: Rect) {
    let (status_text, status_color) = match &app.status {
        ConnectionStatus::Connected => ("● connected".to_string(), Color::Green),
        ConnectionStatus::Connecting => ("◌ connecting".to_string(), Color::Yellow),
        ConnectionStatus::Error(e) => (format!("✗ {}", truncate(e, 40)), Color::Red),
    };

    let health = &app.health;
    let cycle_text = if health.cycle_running {
        "cycle running".to_string()
    } else {
        format!("last cycle {}", format_age(health.last_cycle_at_ns, now_ns()))
    };
    let failed_color = if health.last_cycle_failed_groups > 0 {
        Color::Red
    } else {
        Color::White
    };

    let title_spans = vec![
        Span::styled(
            " Prop Scanner  ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(status_text, Style::default().fg(status_color)),
        Span::raw("  │  "),
        Span::styled(
            format!("{} cycles", health.cycles_completed),
            Style::default().fg(Color::White),
        ),
        Span::raw("  │  "),
        Span::styled(cycle_text, Style::default().fg(Color::White)),
        Span::raw("  │  "),
        Span::styled(
            format!("p50 {}", format_ms(health.cycle_p50_ms)),
            Style::default().fg(Color::White),
        ),
        Span::raw("  │  "),
        Span::styled(
            format!("{} failed groups", health.last_cycle_failed_groups),
            Style::default().fg(failed_color),
        ),
    ];

    let header_line = Line::from(title_spans);
    let paragraph = Paragraph::new(header_line)
        .block(Block::default().borders(Borders::ALL).border_style(
            Style::default().fg(Color::DarkGray),
        ));

    f.render_widget(paragraph, area);
}

fn render_body(f: &mut Frame, app: &AppState, group_state: &mut TableState, area: Rect) {
    // Horizontal split: groups (30%) | results (70%)
    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
        .split(area);

    render_groups_table(f, app, group_state, halves[0]);
    render_results_table(f, app, halves[1]);
}

fn render_groups_table(f: &mut Frame, app: &AppState, state: &mut TableState, area: Rect) {
    let header_cells = ["Group", "Rows", "+New", "-Gone"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells).height(1);

    let rows: Vec<Row> = app
        .groups
        .iter()
        .map(|g| {
            let name_color = if g.error.is_some() { Color::Red } else { Color::White };
            let new_color = if g.inserted > 0 { Color::Green } else { Color::DarkGray };

            Row::new(vec![
                Cell::from(truncate(&g.source, 14)).style(Style::default().fg(name_color)),
                Cell::from(g.actionable.to_string()).style(Style::default().fg(Color::Cyan)),
                Cell::from(g.inserted.to_string()).style(Style::default().fg(new_color)),
                Cell::from(g.removed.to_string()).style(Style::default().fg(Color::DarkGray)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Min(8),
            Constraint::Length(5),
            Constraint::Length(5),
            Constraint::Length(5),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(Span::styled(
                " GROUPS ",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )),
    )
    .row_highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    );

    f.render_stateful_widget(table, area, state);
}

fn render_results_table(f: &mut Frame, app: &AppState, area: Rect) {
    let header_cells = ["Player", "Line", "Best", "Worst", "Avg", "Edge"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells).height(1);

    let rows: Vec<Row> = app
        .results
        .iter()
        .map(|r| {
            let worst = format!("{} {}", format_price(r.worst_price), truncate(&r.worst_source, 10));
            let edge = r.best_price - r.trimmed_mean;
            let edge_color = if edge >= 0.10 {
                Color::Green
            } else {
                Color::Yellow
            };

            Row::new(vec![
                Cell::from(truncate(&r.player, 22)),
                Cell::from(truncate(&format_line(&r.side, r.stat_value, &r.prop), 26)),
                Cell::from(format_price(r.best_price)).style(Style::default().fg(Color::Green)),
                Cell::from(worst).style(Style::default().fg(Color::DarkGray)),
                Cell::from(format_price(r.trimmed_mean)),
                Cell::from(format_edge(r.best_price, r.trimmed_mean)).style(Style::default().fg(edge_color)),
            ])
        })
        .collect();

    let title = app
        .selected_group()
        .map_or(" RESULTS ".to_string(), |g| format!(" {} RESULTS ", g.source.to_uppercase()));

    let table = Table::new(
        rows,
        [
            Constraint::Min(12),
            Constraint::Min(12),
            Constraint::Length(5),
            Constraint::Length(16),
            Constraint::Length(5),
            Constraint::Length(6),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(Span::styled(
                title,
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )),
    );

    f.render_widget(table, area);
}

fn render_footer(f: &mut Frame, area: Rect) {
    let line = Line::from(vec![
        Span::styled(" [q] ", Style::default().fg(Color::Yellow)),
        Span::raw("quit  "),
        Span::styled("[r] ", Style::default().fg(Color::Yellow)),
        Span::raw("refresh  "),
        Span::styled("[↑↓ / j k] ", Style::default().fg(Color::Yellow)),
        Span::raw("select group  "),
        Span::styled("auto-refresh: 2s", Style::default().fg(Color::DarkGray)),
    ]);
    let paragraph = Paragraph::new(line).style(Style::default().fg(Color::White));
    f.render_widget(paragraph, area);
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}
