//! Station TUI - operator panel for a scanning station
//!
//! Shows:
//! - Big state panel (waiting / success / error / ticket complete / ...)
//! - Customer card and garments for the current ticket
//! - Last scan, next slot, items processed and conveyor capacity
//!
//! Keys: type or scan a code then Enter, F2 keypad, F3 clear conveyor,
//! Esc closes an overlay, F10 or Ctrl-C quits. With `--sim`, F5 toggles the
//! conveyor link and F6 the hanger sensor.

use anyhow::Context;
use clap::Parser;
use conveyor_station::domain::{ScanSession, ScanState};
use conveyor_station::infra::{Config, Metrics};
use conveyor_station::io::SimBackend;
use conveyor_station::services::manual_entry::KeypadKey;
use conveyor_station::services::{Focus, InputRouter, ScanCommand, ScanHandle, SubmitError};
use conveyor_station::station::{spawn_station, BackendMode};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Gauge, List, ListItem, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Station TUI - operator panel for the conveyor station
#[derive(Parser, Debug)]
#[command(name = "station-tui", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/station.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Run against the in-process simulator instead of the remote backend
    #[arg(long)]
    sim: bool,

    /// Slot count for the simulator
    #[arg(long, default_value = "20")]
    sim_slots: u32,

    /// Log file (the terminal is owned by the panel)
    #[arg(long, default_value = "station-tui.log")]
    log_file: String,
}

/// Panel-local state that is not part of the scan session
struct PanelState {
    router: InputRouter,
    session: ScanSession,
    /// Last submit rejection or sim toggle, shown in the footer
    notice: Option<String>,
    sim: Option<Arc<SimBackend>>,
    link_forced_down: bool,
    hanger_present: bool,
}

enum KeyAction {
    None,
    Quit,
    Submit(ScanCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&args.log_file)
        .with_context(|| format!("Failed to open log file {}", args.log_file))?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(log_file))
        .init();

    let config_path = args.config.clone().unwrap_or_else(|| Config::resolve_config_path(&[]));
    let config = Config::load_from_path(&config_path);
    info!(
        config_file = %config.config_file(),
        station_id = %config.station_id(),
        sim = %args.sim,
        git_hash = %env!("GIT_HASH"),
        "station_tui_starting"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mode = if args.sim { BackendMode::Sim { slots: args.sim_slots } } else { BackendMode::Remote };
    let station = spawn_station(&config, mode, shutdown_rx).context("Failed to start station")?;

    let mut panel = PanelState {
        router: InputRouter::new(&config),
        session: station.handle.snapshot(),
        notice: None,
        sim: station.sim.clone(),
        link_forced_down: false,
        hanger_present: false,
    };

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_ui(&mut terminal, &mut panel, &station.handle, &station.metrics, &config).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    let _ = shutdown_tx.send(true);
    station.join().await;
    info!("station_tui_stopped");

    result
}

async fn run_ui(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    panel: &mut PanelState,
    handle: &ScanHandle,
    metrics: &Metrics,
    config: &Config,
) -> anyhow::Result<()> {
    let tick_rate = Duration::from_millis(100);
    let mut state_rx = handle.subscribe();

    loop {
        if state_rx.has_changed().unwrap_or(false) {
            panel.session = state_rx.borrow_and_update().clone();
        }

        terminal.draw(|f| draw_ui(f, panel, metrics, config))?;

        if event::poll(tick_rate)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match handle_key(panel, key) {
                    KeyAction::Quit => return Ok(()),
                    KeyAction::Submit(command) => submit(panel, handle, command),
                    KeyAction::None => {}
                }
            }
        }

        // Yield so the controller tasks progress between frames
        tokio::task::yield_now().await;
    }
}

fn submit(panel: &mut PanelState, handle: &ScanHandle, command: ScanCommand) {
    match handle.submit(command) {
        Ok(()) => panel.notice = None,
        Err(SubmitError::Busy) => {
            warn!("panel_submit_busy");
            panel.notice = Some("Station busy - scan again".to_string());
        }
        Err(SubmitError::Closed) => {
            panel.notice = Some("Station stopped".to_string());
        }
    }
}

fn handle_key(panel: &mut PanelState, key: KeyEvent) -> KeyAction {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    if key.code == KeyCode::F(10) || (ctrl && key.code == KeyCode::Char('c')) {
        return KeyAction::Quit;
    }

    let router = &mut panel.router;
    match router.focus() {
        Focus::Scanner => match key.code {
            KeyCode::Enter => {
                if let Some(command) = router.scanner_enter() {
                    return KeyAction::Submit(command);
                }
            }
            KeyCode::Backspace => router.scanner_backspace(),
            KeyCode::Char(c) => router.scanner_char(c),
            KeyCode::F(2) => router.open_keypad(),
            KeyCode::F(3) => router.open_clear_guard(),
            KeyCode::F(5) => toggle_link(panel),
            KeyCode::F(6) => toggle_hanger(panel),
            _ => {}
        },
        Focus::Keypad => match key.code {
            KeyCode::Enter => {
                if let Some(command) = router.keypad_submit() {
                    return KeyAction::Submit(command);
                }
            }
            KeyCode::Esc => router.keypad_cancel(),
            KeyCode::Backspace => router.keypad_press(KeypadKey::Backspace),
            KeyCode::Delete => router.keypad_press(KeypadKey::Clear),
            KeyCode::Char(c) => {
                if let Some(key) = KeypadKey::from_char(c) {
                    router.keypad_press(key);
                }
            }
            _ => {}
        },
        Focus::ClearGuard => match key.code {
            KeyCode::Esc => router.close_clear_guard(),
            KeyCode::Char(c) => {
                if let Some(digit) = c.to_digit(10) {
                    if let Some(command) = router.guard_press(digit as u8) {
                        return KeyAction::Submit(command);
                    }
                }
            }
            _ => {}
        },
    }
    KeyAction::None
}

fn toggle_link(panel: &mut PanelState) {
    if let Some(sim) = &panel.sim {
        panel.link_forced_down = !panel.link_forced_down;
        sim.set_link_up(!panel.link_forced_down);
        panel.notice = Some(format!(
            "sim: conveyor link {}",
            if panel.link_forced_down { "down" } else { "up" }
        ));
    }
}

fn toggle_hanger(panel: &mut PanelState) {
    if let Some(sim) = &panel.sim {
        panel.hanger_present = !panel.hanger_present;
        sim.set_hanger_present(panel.hanger_present);
        panel.notice = Some(format!(
            "sim: hanger sensor {}",
            if panel.hanger_present { "occupied" } else { "clear" }
        ));
    }
}

fn state_color(state: &ScanState) -> Color {
    match state {
        ScanState::Waiting | ScanState::Validating { .. } => Color::Yellow,
        ScanState::Success { .. } | ScanState::TicketComplete { .. } => Color::Green,
        ScanState::Error { .. } | ScanState::ConveyorDisconnected => Color::Red,
        ScanState::GarmentOnConveyor { .. } => Color::Blue,
    }
}

fn draw_ui(f: &mut Frame, panel: &PanelState, metrics: &Metrics, config: &Config) {
    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(9),    // State panel
            Constraint::Length(9), // Details
            Constraint::Length(3), // Footer
        ])
        .split(f.area());

    draw_header(f, main_chunks[0], panel, config);
    draw_state_panel(f, main_chunks[1], &panel.session);

    let detail_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(35), // Customer
            Constraint::Percentage(35), // Garments
            Constraint::Percentage(30), // Conveyor
        ])
        .split(main_chunks[2]);

    draw_customer_panel(f, detail_chunks[0], &panel.session);
    draw_garments_panel(f, detail_chunks[1], &panel.session);
    draw_conveyor_panel(f, detail_chunks[2], &panel.session, metrics);
    draw_footer(f, main_chunks[3], panel);

    match panel.router.focus() {
        Focus::Keypad => draw_keypad_overlay(f, panel, config),
        Focus::ClearGuard => draw_guard_overlay(f, panel),
        Focus::Scanner => {}
    }
}

fn draw_header(f: &mut Frame, area: Rect, panel: &PanelState, config: &Config) {
    let session = &panel.session;
    let (link_text, link_color) =
        if session.link_connected() { ("CONVEYOR OK", Color::Green) } else { ("CONVEYOR DOWN", Color::Red) };
    let busy = if session.busy() { " | BUSY" } else { "" };

    let header = Paragraph::new(Line::from(vec![
        Span::styled("Station ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::styled(config.station_id().to_string(), Style::default().fg(Color::Cyan)),
        Span::raw(" | "),
        Span::styled(link_text, Style::default().fg(link_color)),
        Span::raw(busy),
        Span::raw(if panel.sim.is_some() { " | SIM" } else { "" }),
        Span::raw(" | F2 keypad  F3 clear conveyor  F10 quit"),
    ]))
    .block(Block::default().borders(Borders::ALL));

    f.render_widget(header, area);
}

fn draw_state_panel(f: &mut Frame, area: Rect, session: &ScanSession) {
    let state = session.state();
    let color = state_color(state);
    let big = Style::default().fg(Color::Black).bg(color).add_modifier(Modifier::BOLD);

    let mut lines = vec![
        Line::from(""),
        Line::from(Span::styled(format!("  {}  ", state.title()), big)),
        Line::from(""),
        Line::from(Span::styled(state.subtitle(), Style::default().fg(color))),
    ];

    match state {
        ScanState::Error { error } => {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(error.to_string(), Style::default().fg(Color::Red))));
        }
        ScanState::Validating { code } => {
            lines.push(Line::from(""));
            lines.push(Line::from(format!("Barcode {}", code)));
        }
        _ => {}
    }

    if let Some(slot) = state.slot() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("SLOT {}", slot),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        )));
    }

    let border_style = if state.is_fault() {
        Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(color)
    };

    let widget = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).border_style(border_style));

    f.render_widget(widget, area);
}

fn draw_customer_panel(f: &mut Frame, area: Rect, session: &ScanSession) {
    let context = session.context();
    let mut lines = Vec::new();

    match &context.customer {
        Some(customer) => {
            lines.push(Line::from(Span::styled(
                customer.display_name(),
                Style::default().add_modifier(Modifier::BOLD),
            )));
            lines.push(Line::from(format!("Phone:   {}", customer.phone_number)));
        }
        None => lines.push(Line::from(Span::styled("-", Style::default().fg(Color::DarkGray)))),
    }

    if let Some(ticket) = &context.ticket {
        lines.push(Line::from(format!("Ticket:  {}", ticket.display_invoice_number)));
        lines.push(Line::from(format!(
            "Items:   {}/{}",
            ticket.garments_processed, ticket.number_of_items
        )));
        lines.push(Line::from(format!(
            "Pickup:  {}",
            ticket.invoice_pickup_date.format("%a %d %b %H:%M")
        )));
    }

    let widget = Paragraph::new(lines).block(
        Block::default()
            .title(" Customer ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(widget, area);
}

fn draw_garments_panel(f: &mut Frame, area: Rect, session: &ScanSession) {
    let last = session.last_scan().map(|c| c.as_str());
    let items: Vec<ListItem> = session
        .context()
        .garments
        .iter()
        .map(|g| {
            let marker = if Some(g.item_id.as_str()) == last { "▶" } else { " " };
            let slot = g.slot_number.map(|s| format!(" [{}]", s)).unwrap_or_default();
            ListItem::new(Line::from(vec![
                Span::styled(marker, Style::default().fg(Color::Green)),
                Span::raw(format!(" {:<10} ", g.item_id)),
                Span::raw(g.item_description.clone()),
                Span::styled(slot, Style::default().fg(Color::DarkGray)),
            ]))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(" Garments ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(list, area);
}

fn draw_conveyor_panel(f: &mut Frame, area: Rect, session: &ScanSession, metrics: &Metrics) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Capacity
            Constraint::Min(0),    // Counters
        ])
        .split(area);

    let (ratio, label) = match session.stats() {
        Some(stats) => (
            (stats.capacity_percentage / 100.0).clamp(0.0, 1.0),
            format!("{}/{} ({:.0}%)", stats.slots_used, stats.total_slots, stats.capacity_percentage),
        ),
        None => (0.0, "-".to_string()),
    };
    let capacity_color = if ratio < 0.75 {
        Color::Green
    } else if ratio < 0.9 {
        Color::Yellow
    } else {
        Color::Red
    };
    let gauge = Gauge::default()
        .block(Block::default().title(" Capacity ").borders(Borders::ALL))
        .gauge_style(Style::default().fg(capacity_color))
        .ratio(ratio)
        .label(label);
    f.render_widget(gauge, chunks[0]);

    let last_scan = session.last_scan().map(|c| c.to_string()).unwrap_or_else(|| "-".to_string());
    let next_slot = session.next_slot().map(|s| s.to_string()).unwrap_or_else(|| "-".to_string());
    let stats = Paragraph::new(vec![
        Line::from(format!("Last scan:  {}", last_scan)),
        Line::from(format!("Next slot:  {}", next_slot)),
        Line::from(format!("Processed:  {}", session.scan_count())),
        Line::from(format!("Tickets:    {}", metrics.tickets_completed_total())),
    ])
    .block(
        Block::default()
            .title(" Conveyor ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green)),
    );
    f.render_widget(stats, chunks[1]);
}

fn draw_footer(f: &mut Frame, area: Rect, panel: &PanelState) {
    let line = match &panel.notice {
        Some(notice) => Line::from(Span::styled(notice.clone(), Style::default().fg(Color::Yellow))),
        None => Line::from(vec![
            Span::styled("Scanner: ", Style::default().fg(Color::DarkGray)),
            Span::raw(panel.router.scanner_buffer().to_string()),
            Span::styled("▏", Style::default().fg(Color::DarkGray)),
        ]),
    };
    let footer = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
    f.render_widget(footer, area);
}

/// Centered rectangle of fixed size, clipped to `area`
fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn draw_keypad_overlay(f: &mut Frame, panel: &PanelState, config: &Config) {
    let area = centered(f.area(), 40, 9);
    let keypad = panel.router.keypad();
    let submit_style = if keypad.can_submit() {
        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::DarkGray)
    };

    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            format!("{:^24}", keypad.buffer()),
            Style::default().fg(Color::White).bg(Color::DarkGray),
        )),
        Line::from(""),
        Line::from(format!("min {} digits", config.min_code_len())),
        Line::from(vec![
            Span::styled("Enter submit", submit_style),
            Span::raw("  Del clear  Esc cancel"),
        ]),
    ];

    let widget = Paragraph::new(lines).alignment(Alignment::Center).block(
        Block::default()
            .title(" Manual Entry ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(Clear, area);
    f.render_widget(widget, area);
}

fn draw_guard_overlay(f: &mut Frame, panel: &PanelState) {
    let area = centered(f.area(), 44, 8);
    let window: String = panel.router.guard().window().iter().map(|d| format!("{} ", d)).collect();

    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            "Empty every conveyor slot?",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )),
        Line::from("Press 1 2 3 to confirm"),
        Line::from(Span::styled(window, Style::default().fg(Color::Yellow))),
        Line::from(Span::styled("Esc cancel", Style::default().fg(Color::DarkGray))),
    ];

    let widget = Paragraph::new(lines).alignment(Alignment::Center).block(
        Block::default()
            .title(" Clear Conveyor ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Red)),
    );
    f.render_widget(Clear, area);
    f.render_widget(widget, area);
}
