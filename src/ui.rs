use crate::{
    client::AppSnapshot,
    contract::{
        GameId,
        Side,
        short_address,
    },
    sync::Phase,
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use crossterm::{
    event::{
        Event,
        EventStream,
        KeyCode,
        KeyEventKind,
        KeyModifiers,
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use futures::StreamExt;
use itertools::Itertools;
use ratatui::{
    prelude::*,
    widgets::*,
};
use std::io::stdout;

pub const TAGLINE: &str = "Choose your Monad. Will light or shadow guide your fate?";
const RESULT_FLAVOR: &str = "Today, fate favored this Monad.";
const VISIBLE_ERRORS: usize = 3;

pub type InputEventReceiver = EventStream;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UserEvent {
    Quit,
    CreateGame,
    JoinGame(GameId),
    Choose(Side),
    PlayAgain,
    RefreshOpenGames,
    ToggleWallet,
    Redraw,
}

#[derive(Default)]
pub struct UiState {
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
    selected: usize,
}

impl UiState {
    pub fn selected(&self) -> usize {
        self.selected
    }
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    Ok(())
}

pub fn input_event_stream() -> InputEventReceiver {
    EventStream::new()
}

pub async fn next_raw_event(events: &mut InputEventReceiver) -> Result<Event> {
    match events.next().await {
        Some(event) => Ok(event?),
        None => Err(eyre!("terminal event stream closed")),
    }
}

pub fn draw(state: &mut UiState, snap: &AppSnapshot) -> Result<()> {
    state.selected = clamp_selection(state.selected, snap.open_games.len());
    let selected = state.selected;
    if let Some(term) = state.terminal.as_mut() {
        term.draw(|f| render(f, selected, snap))?;
    }
    Ok(())
}

fn clamp_selection(selected: usize, len: usize) -> usize {
    selected.min(len.saturating_sub(1))
}

/// Maps a key press to an intent. Keys outside their phase are swallowed.
pub fn interpret_event(
    state: &mut UiState,
    snap: &AppSnapshot,
    event: Event,
) -> Option<UserEvent> {
    let key = match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => key,
        Event::Resize(..) => return Some(UserEvent::Redraw),
        _ => return None,
    };
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Some(UserEvent::Quit);
    }
    match (key.code, snap.phase) {
        (KeyCode::Char('q') | KeyCode::Esc, _) => Some(UserEvent::Quit),
        (KeyCode::Char('r'), _) => Some(UserEvent::RefreshOpenGames),
        (KeyCode::Char('x'), _) => Some(UserEvent::ToggleWallet),
        (KeyCode::Char('c'), Phase::Lobby) => Some(UserEvent::CreateGame),
        (KeyCode::Up, Phase::Lobby) => {
            state.selected = state.selected.saturating_sub(1);
            Some(UserEvent::Redraw)
        }
        (KeyCode::Down, Phase::Lobby) => {
            state.selected = clamp_selection(state.selected + 1, snap.open_games.len());
            Some(UserEvent::Redraw)
        }
        (KeyCode::Enter, Phase::Lobby) => snap
            .open_games
            .get(state.selected)
            .copied()
            .map(UserEvent::JoinGame),
        (KeyCode::Char('w'), Phase::Choose) => Some(UserEvent::Choose(Side::White)),
        (KeyCode::Char('b'), Phase::Choose) => Some(UserEvent::Choose(Side::Black)),
        (KeyCode::Char('p'), Phase::Result) => Some(UserEvent::PlayAgain),
        _ => None,
    }
}

fn render(f: &mut Frame, selected: usize, snap: &AppSnapshot) {
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // header
            Constraint::Length(1), // tagline
            Constraint::Min(8),    // phase
            Constraint::Length(6), // status + errors
            Constraint::Length(3), // help
        ])
        .split(f.area());

    draw_header(f, chunks[0], snap);
    f.render_widget(
        Paragraph::new(TAGLINE)
            .alignment(Alignment::Center)
            .style(Style::default().add_modifier(Modifier::ITALIC)),
        chunks[1],
    );
    draw_phase(f, chunks[2], selected, snap);
    draw_status(f, chunks[3], snap);
    draw_help(f, chunks[4], snap);
}

fn draw_header(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let wallet = snap
        .account
        .map(|account| short_address(&account))
        .unwrap_or_else(|| String::from("not connected"));
    let lines = vec![
        Line::from(format!(
            "Network: {} ({}) | Contract: {}",
            snap.network,
            snap.chain_id,
            short_address(&snap.contract)
        )),
        Line::from(format!("Wallet: {wallet} | Stake: {}", snap.stake)),
    ];
    let header = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Monad Coinflip"),
    );
    f.render_widget(header, area);
}

fn phase_lines(selected: usize, snap: &AppSnapshot) -> Vec<Line<'static>> {
    let id = snap
        .game_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| String::from("?"));
    match snap.phase {
        Phase::Lobby => {
            let mut lines = vec![
                Line::from("[c] Create a new game"),
                Line::from(""),
                Line::from("Open games:"),
            ];
            if snap.open_games.is_empty() {
                lines.push(Line::styled(
                    "  No open games",
                    Style::default().fg(Color::DarkGray),
                ));
            }
            for (i, game_id) in snap.open_games.iter().enumerate() {
                if i == selected {
                    lines.push(Line::styled(
                        format!("> Game #{game_id}"),
                        Style::default()
                            .fg(Color::Yellow)
                            .add_modifier(Modifier::BOLD),
                    ));
                } else {
                    lines.push(Line::from(format!("  Game #{game_id}")));
                }
            }
            lines
        }
        Phase::Waiting => vec![Line::from(format!(
            "Waiting for opponent to join... Share game ID: {id}"
        ))],
        Phase::Joined => vec![Line::from(format!(
            "Game #{id} joined. Waiting for confirmation..."
        ))],
        Phase::Choose => vec![
            Line::from(format!("Game #{id}: both players are in. Pick a side.")),
            Line::from(""),
            Line::styled("[w] White", Style::default().fg(Color::White)),
            Line::styled("[b] Black", Style::default().fg(Color::DarkGray)),
        ],
        Phase::WaitingChoice => vec![Line::from("Waiting for other player's choice...")],
        Phase::Result => vec![
            Line::styled(
                snap.winner_info
                    .clone()
                    .unwrap_or_else(|| format!("Game #{id} resolved.")),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Line::from(RESULT_FLAVOR),
            Line::from(""),
            Line::from("[p] Play Again"),
        ],
    }
}

fn draw_phase(f: &mut Frame, area: Rect, selected: usize, snap: &AppSnapshot) {
    let mut lines = phase_lines(selected, snap);
    if let Some(tx_hash) = snap.pending_tx {
        let link = match &snap.explorer_url {
            Some(explorer) => format!("{}/tx/{tx_hash}", explorer.trim_end_matches('/')),
            None => tx_hash.to_string(),
        };
        lines.push(Line::from(""));
        lines.push(Line::styled(
            format!("Pending tx: {link}"),
            Style::default().fg(Color::DarkGray),
        ));
    }
    let title = match snap.game_id {
        Some(id) => format!("{} | Game #{id}", snap.phase),
        None => snap.phase.to_string(),
    };
    let panel = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(panel, area);
}

fn draw_status(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let mut lines = vec![Line::from(snap.status.clone())];
    if let Some(at) = snap.last_poll_at {
        lines.push(Line::styled(
            format!("Last checked {}", at.format("%H:%M:%S")),
            Style::default().fg(Color::DarkGray),
        ));
    }
    if !snap.errors.is_empty() {
        let recent = snap.errors.iter().rev().take(VISIBLE_ERRORS).join(" | ");
        lines.push(Line::styled(recent, Style::default().fg(Color::Red)));
    }
    let status = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(status, area);
}

fn draw_help(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let phase_keys = match snap.phase {
        Phase::Lobby => "c create | ↑/↓ select | Enter join | ",
        Phase::Choose => "w White | b Black | ",
        Phase::Result => "p play again | ",
        _ => "",
    };
    let help = Paragraph::new(format!(
        "{phase_keys}r refresh | x wallet | q/Esc quit"
    ))
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, area);
}
