use crate::api::ChatClient;
use crate::config::{Config, NO_LANGUAGE};
use crate::state::blocks::{parse_placeholder, BlockId, CodeBlock};
use crate::state::transcript::Role;
use crate::state::{ChatSession, SessionUpdate};
use crate::terminal::{self, Tui};
use crate::ui::layout::split_panes;
use crate::ui::render::{render_chat, render_input, render_panel, render_status_line};
use crate::ui::text::{clamp_boundary_left, next_boundary, prev_boundary, visual_rows};
use anyhow::{bail, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::io::{self, IsTerminal};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task;
use tokio_util::sync::CancellationToken;

const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(16);
const DOUBLE_INTERRUPT_EXIT_WINDOW: Duration = Duration::from_millis(900);
const SCROLL_PAGE_LINES: usize = 10;
const MAX_INPUT_ROWS: usize = 6;

/// The language choices offered by the selector; `/lang` with no argument
/// cycles through them, `/lang <name>` accepts any tag.
const LANGUAGES: [&str; 7] = [
    NO_LANGUAGE,
    "python",
    "javascript",
    "html",
    "css",
    "react",
    "rust",
];

enum SessionCommand {
    Submit {
        input: String,
        language: String,
        cancel: CancellationToken,
    },
    NewChat,
}

#[derive(Debug, PartialEq, Eq)]
enum SlashCommand {
    Quit,
    NewChat,
    Language(Option<String>),
}

/// Render-side mirror of one transcript turn, fed exclusively by session
/// snapshots. Indices line up with the session transcript.
struct TurnView {
    role: Role,
    text: String,
    blocks: Vec<CodeBlock>,
}

pub struct App {
    command_tx: mpsc::UnboundedSender<SessionCommand>,
    update_rx: mpsc::UnboundedReceiver<SessionUpdate>,
    terminal: Option<Tui>,
    model: String,
    language: String,
    turn_views: Vec<TurnView>,
    streaming_turn: Option<usize>,
    cancel: Option<CancellationToken>,
    selected_block: Option<BlockId>,
    input: String,
    cursor: usize,
    scroll: usize,
    last_max_scroll: usize,
    follow: bool,
    status_note: Option<String>,
    last_interrupt_at: Option<Instant>,
    should_quit: bool,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        let client = ChatClient::new(&config);
        task::spawn(run_session_worker(client, command_rx, update_tx));

        let terminal = if io::stdin().is_terminal() && io::stdout().is_terminal() {
            Some(terminal::setup()?)
        } else {
            None
        };

        Ok(Self {
            command_tx,
            update_rx,
            terminal,
            model: config.model,
            language: config.language,
            turn_views: Vec::new(),
            streaming_turn: None,
            cancel: None,
            selected_block: None,
            input: String::new(),
            cursor: 0,
            scroll: 0,
            last_max_scroll: 0,
            follow: true,
            status_note: None,
            last_interrupt_at: None,
            should_quit: false,
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        if self.terminal.is_none() {
            bail!("chatpane needs an interactive terminal");
        }

        while !self.should_quit {
            while let Ok(update) = self.update_rx.try_recv() {
                self.apply_update(update);
            }

            self.draw()?;

            if event::poll(EVENT_POLL_INTERVAL)? {
                match event::read()? {
                    Event::Key(key) if key.kind != KeyEventKind::Release => self.handle_key(key),
                    Event::Paste(text) => self.insert_str(&text),
                    _ => {}
                }
            }
            task::yield_now().await;
        }

        Ok(())
    }

    fn apply_update(&mut self, update: SessionUpdate) {
        match update {
            SessionUpdate::Assistant {
                turn,
                display_text,
                blocks,
            } => {
                if self.streaming_turn != Some(turn) {
                    return;
                }
                if let Some(view) = self.turn_views.get_mut(turn) {
                    if view.role == Role::Assistant {
                        view.text = display_text;
                        view.blocks = blocks;
                    }
                }
            }
            SessionUpdate::Error(message) => {
                self.status_note = Some(message);
            }
            SessionUpdate::TurnComplete { turn } => {
                if self.streaming_turn == Some(turn) {
                    self.streaming_turn = None;
                    self.cancel = None;
                }
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.handle_interrupt();
            }
            KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                if self.input.is_empty() {
                    self.should_quit = true;
                }
            }
            KeyCode::Char('j') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.insert_str("\n");
            }
            KeyCode::Esc => {
                if self.streaming_turn.is_some() {
                    self.cancel_turn();
                } else {
                    self.selected_block = None;
                }
            }
            KeyCode::Tab => self.cycle_block_selection(true),
            KeyCode::BackTab => self.cycle_block_selection(false),
            KeyCode::Up => self.scroll_up(1),
            KeyCode::Down => self.scroll_down(1),
            KeyCode::PageUp => self.scroll_up(SCROLL_PAGE_LINES),
            KeyCode::PageDown => self.scroll_down(SCROLL_PAGE_LINES),
            KeyCode::Home => {
                self.cursor = 0;
            }
            KeyCode::End => {
                self.cursor = self.input.len();
            }
            KeyCode::Left => {
                self.cursor = prev_boundary(&self.input, self.cursor);
            }
            KeyCode::Right => {
                self.cursor = next_boundary(&self.input, self.cursor);
            }
            KeyCode::Backspace => self.backspace(),
            KeyCode::Delete => self.delete_forward(),
            KeyCode::Enter => self.submit_input(),
            KeyCode::Char(ch)
                if !key.modifiers.contains(KeyModifiers::CONTROL)
                    && !key.modifiers.contains(KeyModifiers::ALT) =>
            {
                self.insert_str(&ch.to_string());
            }
            _ => {}
        }
    }

    fn submit_input(&mut self) {
        let content = self.input.trim().to_string();
        if content.is_empty() {
            return;
        }
        self.input.clear();
        self.cursor = 0;

        if matches!(content.as_str(), "q" | "quit" | "exit") {
            self.should_quit = true;
            return;
        }
        if content.starts_with('/') {
            match parse_slash_command(&content) {
                Some(command) => self.apply_slash_command(command),
                None => {
                    self.status_note = Some(format!("unknown command: {content}"));
                }
            }
            return;
        }

        self.submit_message(content);
    }

    fn apply_slash_command(&mut self, command: SlashCommand) {
        match command {
            SlashCommand::Quit => {
                self.should_quit = true;
            }
            SlashCommand::NewChat => self.new_chat(),
            SlashCommand::Language(choice) => {
                self.language = match choice {
                    Some(language) => language,
                    None => next_language(&self.language).to_string(),
                };
                self.status_note = Some(format!("language: {}", self.language));
            }
        }
    }

    /// Dispatch one user turn. Submissions are refused while a turn is in
    /// flight; the session has the same guard on its side.
    fn submit_message(&mut self, content: String) {
        if self.streaming_turn.is_some() {
            self.status_note = Some("a response is still streaming".to_string());
            return;
        }
        self.status_note = None;

        self.turn_views.push(TurnView {
            role: Role::User,
            text: content.clone(),
            blocks: Vec::new(),
        });
        let turn = self.turn_views.len();
        self.turn_views.push(TurnView {
            role: Role::Assistant,
            text: String::new(),
            blocks: Vec::new(),
        });

        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());
        self.streaming_turn = Some(turn);
        self.follow = true;

        let _ = self.command_tx.send(SessionCommand::Submit {
            input: content,
            language: self.language.clone(),
            cancel,
        });
    }

    fn cancel_turn(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if self.streaming_turn.take().is_some() {
            if matches!(self.turn_views.last(), Some(view) if view.role == Role::Assistant) {
                self.turn_views.pop();
            }
            self.status_note = Some("response cancelled".to_string());
        }
    }

    fn new_chat(&mut self) {
        if self.streaming_turn.is_some() {
            self.status_note = Some("cancel the streaming response first".to_string());
            return;
        }
        self.turn_views.clear();
        self.selected_block = None;
        self.scroll = 0;
        self.follow = true;
        self.status_note = None;
        let _ = self.command_tx.send(SessionCommand::NewChat);
    }

    fn handle_interrupt(&mut self) {
        let now = Instant::now();
        if let Some(last) = self.last_interrupt_at {
            if now.duration_since(last) <= DOUBLE_INTERRUPT_EXIT_WINDOW {
                self.should_quit = true;
                return;
            }
        }
        self.last_interrupt_at = Some(now);

        if self.streaming_turn.is_some() {
            self.cancel_turn();
        } else {
            self.status_note = Some("press ctrl+c again to quit".to_string());
        }
    }

    fn cycle_block_selection(&mut self, forward: bool) {
        let ids: Vec<BlockId> = self
            .turn_views
            .iter()
            .flat_map(|view| view.blocks.iter().map(|block| block.id))
            .collect();
        self.selected_block = next_block_selection(&ids, self.selected_block, forward);
    }

    fn scroll_up(&mut self, lines: usize) {
        let base = if self.follow {
            self.last_max_scroll
        } else {
            self.scroll
        };
        self.follow = false;
        self.scroll = base.saturating_sub(lines);
    }

    fn scroll_down(&mut self, lines: usize) {
        if self.follow {
            return;
        }
        self.scroll = self.scroll.saturating_add(lines);
        if self.scroll >= self.last_max_scroll {
            self.scroll = self.last_max_scroll;
            self.follow = true;
        }
    }

    fn insert_str(&mut self, value: &str) {
        let cursor = clamp_boundary_left(&self.input, self.cursor);
        self.input.insert_str(cursor, value);
        self.cursor = cursor + value.len();
    }

    fn backspace(&mut self) {
        let end = clamp_boundary_left(&self.input, self.cursor);
        if end == 0 {
            return;
        }
        let start = prev_boundary(&self.input, end);
        self.input.replace_range(start..end, "");
        self.cursor = start;
    }

    fn delete_forward(&mut self) {
        let start = clamp_boundary_left(&self.input, self.cursor);
        if start >= self.input.len() {
            return;
        }
        let end = next_boundary(&self.input, start);
        self.input.replace_range(start..end, "");
        self.cursor = start;
    }

    fn status_line(&self) -> String {
        let state = if self.streaming_turn.is_some() {
            "streaming"
        } else {
            "ready"
        };
        let mut status = format!("chatpane · {} · lang:{} · {state}", self.model, self.language);
        if let Some(note) = &self.status_note {
            status.push_str(" · ");
            status.push_str(note);
        }
        status
    }

    fn draw(&mut self) -> Result<()> {
        let status = self.status_line();
        let lines = chat_lines(&self.turn_views);
        let blocks: Vec<CodeBlock> = self
            .turn_views
            .iter()
            .flat_map(|view| view.blocks.iter().cloned())
            .collect();
        let focused = self
            .selected_block
            .filter(|id| blocks.iter().any(|block| block.id == *id));
        let input = self.input.clone();
        let cursor = self.cursor;
        let follow = self.follow;
        let scroll = self.scroll;
        let mut max_scroll = 0usize;

        let Some(terminal) = self.terminal.as_mut() else {
            return Ok(());
        };
        terminal.draw(|frame| {
            let area = frame.area();
            let input_width = area.width.saturating_sub(2).max(1) as usize;
            let input_rows = visual_rows(&input, input_width).min(MAX_INPUT_ROWS) as u16;
            let panes = split_panes(area, input_rows, !blocks.is_empty());

            max_scroll = lines.len().saturating_sub(panes.chat.height as usize);
            let effective_scroll = if follow { max_scroll } else { scroll.min(max_scroll) };

            render_status_line(frame, panes.header, &status);
            render_chat(frame, panes.chat, &lines, effective_scroll);
            if let Some(panel) = panes.panel {
                render_panel(frame, panel, &blocks, focused);
            }
            render_input(frame, panes.input, &input, cursor);
        })?;
        self.last_max_scroll = max_scroll;
        Ok(())
    }
}

impl Drop for App {
    fn drop(&mut self) {
        if self.terminal.is_some() {
            let _ = terminal::restore();
        }
    }
}

async fn run_session_worker(
    client: ChatClient,
    mut command_rx: mpsc::UnboundedReceiver<SessionCommand>,
    update_tx: mpsc::UnboundedSender<SessionUpdate>,
) {
    let mut session = ChatSession::new(client);
    while let Some(command) = command_rx.recv().await {
        match command {
            SessionCommand::Submit {
                input,
                language,
                cancel,
            } => {
                if let Err(error) = session.run_turn(input, &language, &update_tx, cancel).await {
                    let _ = update_tx.send(SessionUpdate::Error(error.to_string()));
                }
            }
            SessionCommand::NewChat => {
                if let Err(error) = session.clear() {
                    let _ = update_tx.send(SessionUpdate::Error(error.to_string()));
                }
            }
        }
    }
}

/// Flatten turns into transcript lines: user lines prefixed, assistant
/// placeholder lines swapped for readable block markers.
fn chat_lines(views: &[TurnView]) -> Vec<String> {
    let mut lines = Vec::new();
    for view in views {
        match view.role {
            Role::User => {
                for line in view.text.split('\n') {
                    lines.push(format!("> {line}"));
                }
            }
            Role::Assistant => {
                if view.text.is_empty() {
                    lines.push("…".to_string());
                } else {
                    for line in view.text.split('\n') {
                        let marker = parse_placeholder(line)
                            .and_then(|id| view.blocks.iter().find(|block| block.id == id));
                        match marker {
                            Some(block) => lines.push(format!("[{}]", block.title)),
                            None => lines.push(line.to_string()),
                        }
                    }
                }
            }
        }
        lines.push(String::new());
    }
    lines
}

fn parse_slash_command(input: &str) -> Option<SlashCommand> {
    let mut parts = input.splitn(2, char::is_whitespace);
    match parts.next()? {
        "/quit" | "/q" | "/exit" => Some(SlashCommand::Quit),
        "/new" => Some(SlashCommand::NewChat),
        "/lang" => {
            let choice = parts
                .next()
                .map(|rest| rest.trim().to_lowercase())
                .filter(|rest| !rest.is_empty());
            Some(SlashCommand::Language(choice))
        }
        _ => None,
    }
}

fn next_language(current: &str) -> &'static str {
    match LANGUAGES
        .iter()
        .position(|language| language.eq_ignore_ascii_case(current))
    {
        Some(position) => LANGUAGES[(position + 1) % LANGUAGES.len()],
        None => LANGUAGES[0],
    }
}

fn next_block_selection(
    ids: &[BlockId],
    current: Option<BlockId>,
    forward: bool,
) -> Option<BlockId> {
    if ids.is_empty() {
        return None;
    }
    let position = current.and_then(|id| ids.iter().position(|&candidate| candidate == id));
    let next = match (position, forward) {
        (Some(p), true) => (p + 1) % ids.len(),
        (Some(p), false) => (p + ids.len() - 1) % ids.len(),
        (None, true) => 0,
        (None, false) => ids.len() - 1,
    };
    Some(ids[next])
}
