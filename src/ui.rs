use std::collections::HashMap;
use std::io::{self, Stdout};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use textwrap::wrap;
use tracing::{info, warn};

use crate::api::{Comment, ImageAttachment, Post, PostDraft};
use crate::data::{CommentService, FeedService, SubmitService};
use crate::feed::{FeedState, Filter, ViewPost};
use crate::tags::{self, TrendingTag};
use crate::timeago;
use crate::votes::{Direction as VoteDirection, VoteOverlay};

const COLOR_BG: Color = Color::Rgb(30, 30, 46);
const COLOR_PANEL_BG: Color = Color::Rgb(24, 24, 36);
const COLOR_BORDER_IDLE: Color = Color::Rgb(49, 50, 68);
const COLOR_BORDER_FOCUSED: Color = Color::Rgb(137, 180, 250);
const COLOR_TEXT_PRIMARY: Color = Color::Rgb(205, 214, 244);
const COLOR_TEXT_SECONDARY: Color = Color::Rgb(166, 173, 200);
const COLOR_ACCENT: Color = Color::Rgb(137, 180, 250);
const COLOR_SUCCESS: Color = Color::Rgb(166, 227, 161);
const COLOR_ERROR: Color = Color::Rgb(243, 139, 168);

/// How long a transient status stays on screen before reverting to idle.
const STATUS_REVERT_AFTER: Duration = Duration::from_secs(2);
/// Re-render cadence for relative ages; no refetch involved.
const AGE_TICK: Duration = Duration::from_secs(60);

const SIDEBAR_FILTERS: [&str; 5] = ["All", "Rants", "Confessions", "Events", "Question"];

const IDLE_STATUS: &str =
    "j/k move · h/l panes · u/d vote · Enter comments · c compose · s sort · r refresh · q quit";

pub struct Options {
    pub feed_service: Arc<dyn FeedService>,
    pub comment_service: Arc<dyn CommentService>,
    pub submit_service: Arc<dyn SubmitService>,
    pub votes: VoteOverlay,
    pub refresh_interval: Duration,
    pub config_path: String,
}

enum AsyncResponse {
    Posts {
        result: Result<Vec<Post>>,
    },
    Comments {
        post_id: String,
        result: Result<Vec<Comment>>,
    },
    PostSubmitted {
        result: Result<()>,
    },
    CommentSubmitted {
        post_id: String,
        result: Result<()>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pane {
    Sidebar,
    Feed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ComposeField {
    Title,
    Content,
    Images,
}

#[derive(Debug, Default)]
struct ComposeForm {
    title: String,
    content: String,
    images: String,
    field: Option<ComposeField>,
}

impl ComposeForm {
    fn new() -> Self {
        Self {
            field: Some(ComposeField::Content),
            ..Self::default()
        }
    }

    fn active(&mut self) -> &mut String {
        match self.field.unwrap_or(ComposeField::Content) {
            ComposeField::Title => &mut self.title,
            ComposeField::Content => &mut self.content,
            ComposeField::Images => &mut self.images,
        }
    }

    fn next_field(&mut self) {
        self.field = Some(match self.field.unwrap_or(ComposeField::Content) {
            ComposeField::Title => ComposeField::Content,
            ComposeField::Content => ComposeField::Images,
            ComposeField::Images => ComposeField::Title,
        });
    }

    fn image_paths(&self) -> Vec<PathBuf> {
        self.images
            .split_whitespace()
            .map(PathBuf::from)
            .collect()
    }
}

struct CommentPane {
    post_id: String,
    comments: Option<Vec<Comment>>,
    input: String,
    submitting: bool,
}

pub struct Model {
    feed_service: Arc<dyn FeedService>,
    comment_service: Arc<dyn CommentService>,
    submit_service: Arc<dyn SubmitService>,
    votes: VoteOverlay,
    overlay_cache: HashMap<String, i8>,

    feed: FeedState,
    trending: Vec<TrendingTag>,
    focused_pane: Pane,
    sidebar_index: usize,
    feed_index: usize,
    comment_pane: Option<CommentPane>,
    compose: Option<ComposeForm>,

    status_message: String,
    status_expires: Option<Instant>,
    submit_in_progress: bool,
    refresh_interval: Duration,
    last_refresh: Instant,
    last_age_render: Instant,
    needs_redraw: bool,
    should_quit: bool,
    config_path: String,

    response_tx: Sender<AsyncResponse>,
    response_rx: Receiver<AsyncResponse>,
}

impl Model {
    pub fn new(options: Options) -> Self {
        let (response_tx, response_rx) = unbounded();
        let overlay_cache = options.votes.snapshot().unwrap_or_else(|err| {
            warn!("vote overlay unavailable: {err:#}");
            HashMap::new()
        });
        Self {
            feed_service: options.feed_service,
            comment_service: options.comment_service,
            submit_service: options.submit_service,
            votes: options.votes,
            overlay_cache,
            feed: FeedState::new(),
            trending: Vec::new(),
            focused_pane: Pane::Feed,
            sidebar_index: 0,
            feed_index: 0,
            comment_pane: None,
            compose: None,
            status_message: IDLE_STATUS.to_string(),
            status_expires: None,
            submit_in_progress: false,
            refresh_interval: options.refresh_interval,
            last_refresh: Instant::now(),
            last_age_render: Instant::now(),
            needs_redraw: true,
            should_quit: false,
            config_path: options.config_path,
            response_tx,
            response_rx,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        enable_raw_mode().context("enable raw mode")?;
        let mut stdout = io::stdout();
        stdout
            .execute(EnterAlternateScreen)
            .context("enter alternate screen")?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).context("create terminal")?;

        let result = self.event_loop(&mut terminal);

        disable_raw_mode().ok();
        let _ = io::stdout().execute(LeaveAlternateScreen);
        let _ = terminal.show_cursor();
        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        self.queue_refresh();
        loop {
            self.drain_responses();
            self.tick();
            if self.needs_redraw {
                terminal.draw(|frame| self.render(frame))?;
                self.needs_redraw = false;
            }
            if event::poll(Duration::from_millis(250)).context("poll terminal events")? {
                match event::read().context("read terminal event")? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => self.handle_key(key),
                    Event::Resize(_, _) => self.mark_dirty(),
                    _ => {}
                }
            }
            if self.should_quit {
                return Ok(());
            }
        }
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        self.status_expires = Some(Instant::now() + STATUS_REVERT_AFTER);
        self.mark_dirty();
    }

    fn tick(&mut self) {
        if self.last_refresh.elapsed() >= self.refresh_interval {
            self.queue_refresh();
        }
        if self.last_age_render.elapsed() >= AGE_TICK {
            self.last_age_render = Instant::now();
            self.mark_dirty();
        }
        if let Some(expires) = self.status_expires {
            if Instant::now() >= expires {
                self.status_expires = None;
                self.status_message = IDLE_STATUS.to_string();
                self.mark_dirty();
            }
        }
    }

    // Network actions run on spawned threads and answer through the
    // response channel; the loop stays responsive throughout.

    fn queue_refresh(&mut self) {
        self.last_refresh = Instant::now();
        let service = self.feed_service.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = service.fetch_posts();
            let _ = tx.send(AsyncResponse::Posts { result });
        });
    }

    fn queue_comments(&mut self, post_id: String) {
        let service = self.comment_service.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = service.load_comments(&post_id);
            let _ = tx.send(AsyncResponse::Comments { post_id, result });
        });
    }

    fn drain_responses(&mut self) {
        while let Ok(response) = self.response_rx.try_recv() {
            self.apply_response(response);
        }
    }

    fn apply_response(&mut self, response: AsyncResponse) {
        match response {
            AsyncResponse::Posts { result } => match result {
                Ok(posts) => {
                    self.trending =
                        tags::trending(posts.iter().map(|post| post.content.as_str()));
                    self.feed.replace_posts(posts);
                    self.clamp_selection();
                    self.mark_dirty();
                }
                Err(err) => {
                    // Previous collection stays; the periodic tick retries.
                    warn!("feed refresh failed: {err:#}");
                    self.set_status("⚠ feed refresh failed");
                }
            },
            AsyncResponse::Comments { post_id, result } => match result {
                Ok(comments) => {
                    self.feed
                        .set_comment_count(&post_id, comments.len() as i64);
                    if let Some(pane) = self.comment_pane.as_mut() {
                        if pane.post_id == post_id {
                            pane.comments = Some(comments);
                        }
                    }
                    self.mark_dirty();
                }
                Err(err) => {
                    warn!("comment load failed for {post_id}: {err:#}");
                    self.set_status("⚠ could not load comments");
                }
            },
            AsyncResponse::PostSubmitted { result } => {
                self.submit_in_progress = false;
                match result {
                    Ok(()) => {
                        info!("post submitted");
                        self.compose = None;
                        self.set_status("✓ posted");
                        // The authoritative list always comes from the backend.
                        self.queue_refresh();
                    }
                    Err(err) => {
                        warn!("post submission failed: {err:#}");
                        self.set_status(format!("⚠ {err}"));
                    }
                }
            }
            AsyncResponse::CommentSubmitted { post_id, result } => {
                if let Some(pane) = self.comment_pane.as_mut() {
                    if pane.post_id == post_id {
                        pane.submitting = false;
                    }
                }
                match result {
                    Ok(()) => {
                        if let Some(pane) = self.comment_pane.as_mut() {
                            if pane.post_id == post_id {
                                pane.input.clear();
                            }
                        }
                        // Reload the authoritative thread; the counter is
                        // re-derived from what comes back.
                        self.queue_comments(post_id);
                        self.set_status("✓ comment posted");
                    }
                    Err(err) => {
                        warn!("comment submission failed for {post_id}: {err:#}");
                        self.set_status("⚠ comment not posted");
                    }
                }
            }
        }
    }

    fn current_view(&self) -> Option<Vec<ViewPost>> {
        self.feed.view(&self.overlay_cache)
    }

    fn clamp_selection(&mut self) {
        let len = self.current_view().map(|view| view.len()).unwrap_or(0);
        if len == 0 {
            self.feed_index = 0;
        } else if self.feed_index >= len {
            self.feed_index = len - 1;
        }
    }

    fn selected_post(&self) -> Option<ViewPost> {
        self.current_view()?.into_iter().nth(self.feed_index)
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if self.compose.is_some() {
            self.handle_compose_key(key);
            return;
        }
        if self.comment_pane.is_some() {
            self.handle_comment_key(key);
            return;
        }
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('j') | KeyCode::Down => self.move_selection(1),
            KeyCode::Char('k') | KeyCode::Up => self.move_selection(-1),
            KeyCode::Char('h') | KeyCode::Left => {
                self.focused_pane = Pane::Sidebar;
                self.mark_dirty();
            }
            KeyCode::Char('l') | KeyCode::Right => {
                self.focused_pane = Pane::Feed;
                self.mark_dirty();
            }
            KeyCode::Char('u') => self.vote_selected(VoteDirection::Up),
            KeyCode::Char('d') => self.vote_selected(VoteDirection::Down),
            KeyCode::Char('s') => {
                self.feed.set_sort(self.feed.sort().toggled());
                self.clamp_selection();
                self.mark_dirty();
            }
            KeyCode::Char('r') => {
                self.set_status("refreshing…");
                self.queue_refresh();
            }
            KeyCode::Char('c') => {
                self.compose = Some(ComposeForm::new());
                self.mark_dirty();
            }
            KeyCode::Char('o') => self.open_selected_image(),
            KeyCode::Enter => match self.focused_pane {
                Pane::Sidebar => self.apply_sidebar_selection(),
                Pane::Feed => self.open_comments(),
            },
            _ => {}
        }
    }

    fn move_selection(&mut self, delta: i64) {
        match self.focused_pane {
            Pane::Sidebar => {
                let len = (SIDEBAR_FILTERS.len() + self.trending.len()) as i64;
                if len == 0 {
                    return;
                }
                let next = (self.sidebar_index as i64 + delta).clamp(0, len - 1);
                self.sidebar_index = next as usize;
            }
            Pane::Feed => {
                let len = self.current_view().map(|view| view.len()).unwrap_or(0) as i64;
                if len == 0 {
                    return;
                }
                let next = (self.feed_index as i64 + delta).clamp(0, len - 1);
                self.feed_index = next as usize;
            }
        }
        self.mark_dirty();
    }

    fn apply_sidebar_selection(&mut self) {
        let label = if self.sidebar_index < SIDEBAR_FILTERS.len() {
            SIDEBAR_FILTERS[self.sidebar_index].to_string()
        } else {
            match self.trending.get(self.sidebar_index - SIDEBAR_FILTERS.len()) {
                Some(tag) => tag.tag.clone(),
                None => return,
            }
        };
        self.feed.set_filter(Filter::parse(&label));
        self.feed_index = 0;
        self.focused_pane = Pane::Feed;
        self.mark_dirty();
    }

    fn vote_selected(&mut self, direction: VoteDirection) {
        let Some(row) = self.selected_post() else {
            return;
        };
        match self.votes.apply(&row.post.id, direction) {
            Ok(state) => {
                match state {
                    Some(dir) => {
                        self.overlay_cache.insert(row.post.id.clone(), dir);
                    }
                    None => {
                        self.overlay_cache.remove(&row.post.id);
                    }
                }
                self.mark_dirty();
            }
            Err(err) => {
                warn!("vote not recorded for {}: {err:#}", row.post.id);
                self.set_status("⚠ vote not recorded");
            }
        }
    }

    fn open_comments(&mut self) {
        let Some(row) = self.selected_post() else {
            return;
        };
        let post_id = row.post.id;
        self.comment_pane = Some(CommentPane {
            post_id: post_id.clone(),
            comments: None,
            input: String::new(),
            submitting: false,
        });
        // Always refetched, never served from a cache.
        self.queue_comments(post_id);
        self.mark_dirty();
    }

    fn open_selected_image(&mut self) {
        let Some(row) = self.selected_post() else {
            return;
        };
        let Some(url) = row.post.images.first() else {
            self.set_status("no images on this post");
            return;
        };
        if webbrowser::open(url).is_err() {
            self.set_status("⚠ could not open image");
        }
    }

    fn handle_comment_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.comment_pane = None;
                self.mark_dirty();
            }
            KeyCode::Enter => self.submit_comment(),
            KeyCode::Backspace => {
                if let Some(pane) = self.comment_pane.as_mut() {
                    pane.input.pop();
                    self.mark_dirty();
                }
            }
            KeyCode::Char(ch) => {
                if let Some(pane) = self.comment_pane.as_mut() {
                    pane.input.push(ch);
                    self.mark_dirty();
                }
            }
            _ => {}
        }
    }

    fn submit_comment(&mut self) {
        let Some(pane) = self.comment_pane.as_mut() else {
            return;
        };
        if pane.submitting {
            return;
        }
        let content = pane.input.trim().to_string();
        if content.is_empty() {
            self.set_status("⚠ comment text is required");
            return;
        }
        pane.submitting = true;
        let post_id = pane.post_id.clone();
        let service = self.comment_service.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = service.submit_comment(&post_id, &content);
            let _ = tx.send(AsyncResponse::CommentSubmitted { post_id, result });
        });
        self.mark_dirty();
    }

    fn handle_compose_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.compose = None;
                self.mark_dirty();
            }
            KeyCode::Tab => {
                if let Some(form) = self.compose.as_mut() {
                    form.next_field();
                    self.mark_dirty();
                }
            }
            KeyCode::Enter if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.submit_compose();
            }
            KeyCode::Enter => {
                if let Some(form) = self.compose.as_mut() {
                    if form.field == Some(ComposeField::Content) {
                        form.content.push('\n');
                        self.mark_dirty();
                    }
                }
            }
            KeyCode::Backspace => {
                if let Some(form) = self.compose.as_mut() {
                    form.active().pop();
                    self.mark_dirty();
                }
            }
            KeyCode::Char(ch) => {
                if let Some(form) = self.compose.as_mut() {
                    form.active().push(ch);
                    self.mark_dirty();
                }
            }
            _ => {}
        }
    }

    fn submit_compose(&mut self) {
        // The affordance is disabled while a submission is in flight; a
        // second Ctrl+Enter is a no-op, not a second post.
        if self.submit_in_progress {
            return;
        }
        let (title, content, paths) = match self.compose.as_ref() {
            Some(form) => (
                form.title.trim().to_string(),
                form.content.clone(),
                form.image_paths(),
            ),
            None => return,
        };

        let mut images = Vec::new();
        for path in paths {
            match ImageAttachment::from_path(&path) {
                Ok(attachment) => images.push(attachment),
                Err(err) => {
                    warn!("attachment rejected: {err:#}");
                    self.set_status(format!("⚠ cannot read {}", path.display()));
                    return;
                }
            }
        }

        let draft = PostDraft {
            title: (!title.is_empty()).then_some(title),
            content,
            images,
        };
        if draft.content.trim().is_empty() && draft.images.is_empty() {
            self.set_status("⚠ a post needs text or an image");
            return;
        }

        self.submit_in_progress = true;
        self.set_status("posting…");
        let service = self.submit_service.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = service.submit_post(draft);
            let _ = tx.send(AsyncResponse::PostSubmitted { result });
        });
    }

    // Rendering: a pure projection of the model; helpers below are plain
    // string builders so they test without a terminal.

    fn render(&mut self, frame: &mut Frame) {
        let area = frame.size();
        frame.render_widget(
            Block::default().style(Style::default().bg(COLOR_BG)),
            area,
        );

        let vertical = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(1)])
            .split(area);
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(26), Constraint::Min(1)])
            .split(vertical[0]);

        self.render_sidebar(frame, columns[0]);
        if self.comment_pane.is_some() {
            self.render_comments(frame, columns[1]);
        } else {
            self.render_feed(frame, columns[1]);
        }
        self.render_status(frame, vertical[1]);
        if self.compose.is_some() {
            self.render_compose(frame, area);
        }
    }

    fn render_sidebar(&self, frame: &mut Frame, area: Rect) {
        let focused = self.focused_pane == Pane::Sidebar && self.comment_pane.is_none();
        let mut items: Vec<ListItem> = SIDEBAR_FILTERS
            .iter()
            .map(|label| ListItem::new(Line::from(*label)))
            .collect();
        for tag in &self.trending {
            items.push(ListItem::new(Line::from(vec![
                Span::styled(tag.tag.clone(), Style::default().fg(COLOR_ACCENT)),
                Span::styled(
                    format!(" {}", trending_count_label(tag.count)),
                    Style::default().fg(COLOR_TEXT_SECONDARY),
                ),
            ])));
        }

        let mut state = ListState::default();
        state.select(Some(self.sidebar_index));
        let list = List::new(items)
            .block(pane_block("Campus Echo", focused))
            .style(Style::default().fg(COLOR_TEXT_PRIMARY).bg(COLOR_PANEL_BG))
            .highlight_style(
                Style::default()
                    .fg(COLOR_ACCENT)
                    .add_modifier(Modifier::BOLD),
            );
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn render_feed(&self, frame: &mut Frame, area: Rect) {
        let focused = self.focused_pane == Pane::Feed;
        let title = format!(
            "{} · {}",
            self.feed.filter().label(),
            self.feed.sort().display_name()
        );
        let now = Utc::now();

        match self.current_view() {
            None => {
                let body = Paragraph::new("Loading feed…")
                    .style(Style::default().fg(COLOR_TEXT_SECONDARY).bg(COLOR_PANEL_BG))
                    .alignment(Alignment::Center)
                    .block(pane_block(&title, focused));
                frame.render_widget(body, area);
            }
            Some(view) if view.is_empty() => {
                let body = Paragraph::new(empty_feed_message(self.feed.filter()))
                    .style(Style::default().fg(COLOR_TEXT_SECONDARY).bg(COLOR_PANEL_BG))
                    .alignment(Alignment::Center)
                    .wrap(Wrap { trim: true })
                    .block(pane_block(&title, focused));
                frame.render_widget(body, area);
            }
            Some(view) => {
                let width = area.width.saturating_sub(4) as usize;
                let items: Vec<ListItem> = view
                    .iter()
                    .map(|row| feed_item(row, now, width))
                    .collect();
                let mut state = ListState::default();
                state.select(Some(self.feed_index.min(view.len() - 1)));
                let list = List::new(items)
                    .block(pane_block(&title, focused))
                    .style(Style::default().fg(COLOR_TEXT_PRIMARY).bg(COLOR_PANEL_BG))
                    .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
                frame.render_stateful_widget(list, area, &mut state);
            }
        }
    }

    fn render_comments(&self, frame: &mut Frame, area: Rect) {
        let Some(pane) = self.comment_pane.as_ref() else {
            return;
        };
        let now = Utc::now();
        let mut lines: Vec<Line> = Vec::new();
        match pane.comments.as_ref() {
            None => lines.push(Line::from(Span::styled(
                "Loading comments…",
                Style::default().fg(COLOR_TEXT_SECONDARY),
            ))),
            Some(comments) if comments.is_empty() => lines.push(Line::from(Span::styled(
                "No comments yet. Say something nice.",
                Style::default().fg(COLOR_TEXT_SECONDARY),
            ))),
            Some(comments) => {
                for comment in comments {
                    lines.push(Line::from(vec![
                        Span::styled(
                            timeago::format(comment.created_at, now),
                            Style::default().fg(COLOR_TEXT_SECONDARY),
                        ),
                        Span::raw("  "),
                        Span::raw(comment.content.clone()),
                    ]));
                }
            }
        }
        lines.push(Line::default());
        lines.push(Line::from(vec![
            Span::styled("> ", Style::default().fg(COLOR_ACCENT)),
            Span::raw(pane.input.clone()),
            Span::styled(
                if pane.submitting { "  (sending…)" } else { "" },
                Style::default().fg(COLOR_TEXT_SECONDARY),
            ),
        ]));

        let title = comment_pane_title(pane.comments.as_ref().map(Vec::len));
        let body = Paragraph::new(lines)
            .style(Style::default().fg(COLOR_TEXT_PRIMARY).bg(COLOR_PANEL_BG))
            .wrap(Wrap { trim: false })
            .block(pane_block(&title, true));
        frame.render_widget(body, area);
    }

    fn render_compose(&self, frame: &mut Frame, area: Rect) {
        let popup = centered_rect(area, 70, 60);
        frame.render_widget(Clear, popup);
        let Some(form) = self.compose.as_ref() else {
            return;
        };

        let marker = |field: ComposeField| {
            if form.field == Some(field) {
                Span::styled("▌ ", Style::default().fg(COLOR_ACCENT))
            } else {
                Span::raw("  ")
            }
        };
        let mut lines = vec![
            Line::from(vec![marker(ComposeField::Title), Span::raw("Title: "), Span::raw(form.title.clone())]),
            Line::default(),
            Line::from(vec![marker(ComposeField::Content), Span::raw("What's happening?")]),
        ];
        for wrapped in wrap(&form.content, popup.width.saturating_sub(6) as usize) {
            lines.push(Line::from(format!("  {wrapped}")));
        }
        lines.push(Line::default());
        lines.push(Line::from(vec![
            marker(ComposeField::Images),
            Span::raw("Images (paths): "),
            Span::raw(form.images.clone()),
        ]));
        lines.push(Line::default());
        lines.push(Line::from(Span::styled(
            if self.submit_in_progress {
                "posting…"
            } else {
                "Tab fields · Ctrl+Enter post · Esc cancel"
            },
            Style::default().fg(COLOR_TEXT_SECONDARY),
        )));

        let body = Paragraph::new(lines)
            .style(Style::default().fg(COLOR_TEXT_PRIMARY).bg(COLOR_PANEL_BG))
            .wrap(Wrap { trim: false })
            .block(pane_block("New post", true));
        frame.render_widget(body, popup);
    }

    fn render_status(&self, frame: &mut Frame, area: Rect) {
        let style = if self.status_message.starts_with('⚠') {
            Style::default().fg(COLOR_ERROR)
        } else if self.status_message.starts_with('✓') {
            Style::default().fg(COLOR_SUCCESS)
        } else {
            Style::default().fg(COLOR_TEXT_SECONDARY)
        };
        let line = Line::from(vec![
            Span::styled(self.status_message.clone(), style),
            Span::styled(
                format!("  ({})", self.config_path),
                Style::default().fg(COLOR_BORDER_IDLE),
            ),
        ]);
        frame.render_widget(Paragraph::new(line), area);
    }
}

fn pane_block(title: &str, focused: bool) -> Block<'static> {
    let border = if focused {
        COLOR_BORDER_FOCUSED
    } else {
        COLOR_BORDER_IDLE
    };
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .title(title.to_string())
}

fn centered_rect(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

fn feed_item(row: &ViewPost, now: DateTime<Utc>, width: usize) -> ListItem<'static> {
    let category = row.post.category;
    let mut header = vec![
        Span::styled(
            vote_label(row),
            Style::default()
                .fg(vote_color(row.my_vote))
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        Span::styled(
            format!("#{}", category.as_str()),
            Style::default().fg(category.color()),
        ),
        Span::raw("  "),
        Span::styled(
            timeago::format(row.post.created_at, now),
            Style::default().fg(COLOR_TEXT_SECONDARY),
        ),
        Span::raw("  "),
        Span::styled(
            format!("💬 {}", row.post.comment_count),
            Style::default().fg(COLOR_TEXT_SECONDARY),
        ),
    ];
    if !row.post.images.is_empty() {
        header.push(Span::raw("  "));
        header.push(Span::styled(
            image_badge(row.post.images.len()),
            Style::default().fg(COLOR_TEXT_SECONDARY),
        ));
    }

    let mut lines = vec![Line::from(header)];
    if let Some(title) = row.post.title.as_ref() {
        lines.push(Line::from(Span::styled(
            title.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )));
    }
    for wrapped in wrap(&row.post.content, width.max(20)) {
        lines.push(Line::from(wrapped.into_owned()));
    }
    lines.push(Line::default());
    ListItem::new(lines)
}

fn vote_label(row: &ViewPost) -> String {
    match row.my_vote {
        Some(1) => format!("▲ {}", row.votes),
        Some(-1) => format!("▼ {}", row.votes),
        _ => format!("△ {}", row.votes),
    }
}

fn vote_color(my_vote: Option<i8>) -> Color {
    match my_vote {
        Some(1) => COLOR_SUCCESS,
        Some(-1) => COLOR_ERROR,
        _ => COLOR_TEXT_PRIMARY,
    }
}

fn image_badge(count: usize) -> String {
    if count == 1 {
        "🖼 1 image (o opens)".to_string()
    } else {
        format!("🖼 {count} images (o opens)")
    }
}

fn trending_count_label(count: usize) -> String {
    if count == 1 {
        "1 post".to_string()
    } else {
        format!("{count} posts")
    }
}

fn comment_pane_title(count: Option<usize>) -> String {
    match count {
        Some(count) => format!("Comments ({count}) · Enter sends · Esc closes"),
        None => "Comments · Esc closes".to_string(),
    }
}

fn empty_feed_message(filter: &Filter) -> String {
    format!(
        "No posts found for {}\nBe the first to post!",
        filter.label()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{MockCommentService, MockFeedService, MockSubmitService};
    use crate::storage::{Options as StoreOptions, Store};
    use crate::tags::Category;
    use tempfile::tempdir;

    fn model(dir: &tempfile::TempDir) -> Model {
        let store = Store::open(StoreOptions {
            path: Some(dir.path().join("state.db")),
        })
        .unwrap();
        Model::new(Options {
            feed_service: Arc::new(MockFeedService),
            comment_service: Arc::new(MockCommentService),
            submit_service: Arc::new(MockSubmitService),
            votes: VoteOverlay::new(Arc::new(store)),
            refresh_interval: Duration::from_secs(60),
            config_path: "~/.config/campus-echo/config.yaml".into(),
        })
    }

    fn sample_posts() -> Vec<Post> {
        vec![
            Post {
                id: "1".into(),
                title: None,
                content: "library coffee #Complaint #CafeteriaFood".into(),
                category: Category::Complaint,
                created_at: Utc::now(),
                server_votes: 42,
                comment_count: 5,
                images: vec!["http://h/assets/a.png".into()],
            },
            Post {
                id: "2".into(),
                title: None,
                content: "thesis done #FinalsWeek".into(),
                category: Category::General,
                created_at: Utc::now() - chrono::Duration::hours(1),
                server_votes: 356,
                comment_count: 45,
                images: Vec::new(),
            },
        ]
    }

    #[test]
    fn successful_refresh_replaces_posts_and_trending() {
        let dir = tempdir().unwrap();
        let mut model = model(&dir);
        assert!(model.current_view().is_none());

        model.apply_response(AsyncResponse::Posts {
            result: Ok(sample_posts()),
        });
        let view = model.current_view().unwrap();
        assert_eq!(view.len(), 2);
        assert_eq!(model.trending.len(), 3);
        assert_eq!(model.trending[0].count, 1);
    }

    #[test]
    fn failed_refresh_keeps_previous_collection() {
        let dir = tempdir().unwrap();
        let mut model = model(&dir);
        model.apply_response(AsyncResponse::Posts {
            result: Ok(sample_posts()),
        });
        model.apply_response(AsyncResponse::Posts {
            result: Err(anyhow::anyhow!("backend unreachable")),
        });
        assert_eq!(model.current_view().unwrap().len(), 2);
        assert!(model.status_message.starts_with('⚠'));
        assert!(model.status_expires.is_some());
    }

    #[test]
    fn vote_keys_update_overlay_and_projection() {
        let dir = tempdir().unwrap();
        let mut model = model(&dir);
        model.apply_response(AsyncResponse::Posts {
            result: Ok(sample_posts()),
        });

        model.vote_selected(VoteDirection::Up);
        let view = model.current_view().unwrap();
        assert_eq!(view[0].votes, 43);
        assert_eq!(view[0].my_vote, Some(1));

        model.vote_selected(VoteDirection::Up);
        let view = model.current_view().unwrap();
        assert_eq!(view[0].votes, 42);
        assert_eq!(view[0].my_vote, None);
    }

    #[test]
    fn comment_reload_rederives_the_counter() {
        let dir = tempdir().unwrap();
        let mut model = model(&dir);
        model.apply_response(AsyncResponse::Posts {
            result: Ok(sample_posts()),
        });
        model.comment_pane = Some(CommentPane {
            post_id: "2".into(),
            comments: None,
            input: String::new(),
            submitting: false,
        });
        model.apply_response(AsyncResponse::Comments {
            post_id: "2".into(),
            result: Ok(vec![
                Comment {
                    post_id: "2".into(),
                    content: "congrats!".into(),
                    created_at: Utc::now(),
                },
                Comment {
                    post_id: "2".into(),
                    content: "same energy".into(),
                    created_at: Utc::now(),
                },
            ]),
        });
        let posts = model.feed.posts().unwrap();
        let post = posts.iter().find(|post| post.id == "2").unwrap();
        assert_eq!(post.comment_count, 2);
    }

    #[test]
    fn submit_success_closes_compose_and_marks_refresh() {
        let dir = tempdir().unwrap();
        let mut model = model(&dir);
        model.compose = Some(ComposeForm::new());
        model.submit_in_progress = true;
        model.apply_response(AsyncResponse::PostSubmitted { result: Ok(()) });
        assert!(model.compose.is_none());
        assert!(!model.submit_in_progress);
        // The queued refresh arrives over the channel from a worker thread.
        let response = model
            .response_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("refresh response");
        assert!(matches!(response, AsyncResponse::Posts { .. }));
    }

    #[test]
    fn submit_failure_keeps_compose_open() {
        let dir = tempdir().unwrap();
        let mut model = model(&dir);
        model.compose = Some(ComposeForm::new());
        model.submit_in_progress = true;
        model.apply_response(AsyncResponse::PostSubmitted {
            result: Err(anyhow::anyhow!("upload failed")),
        });
        assert!(model.compose.is_some());
        assert!(!model.submit_in_progress);
        assert!(model.status_message.starts_with('⚠'));
    }

    #[test]
    fn second_submit_is_a_noop_while_in_flight() {
        let dir = tempdir().unwrap();
        let mut model = model(&dir);
        let mut form = ComposeForm::new();
        form.content = "hello quad".into();
        model.compose = Some(form);
        model.submit_in_progress = true;
        model.submit_compose();
        // No PostSubmitted response was queued by the second attempt.
        assert!(model.response_rx.try_recv().is_err());
    }

    #[test]
    fn empty_compose_is_rejected_locally() {
        let dir = tempdir().unwrap();
        let mut model = model(&dir);
        model.compose = Some(ComposeForm::new());
        model.submit_compose();
        assert!(!model.submit_in_progress);
        assert!(model.status_message.starts_with('⚠'));
        assert!(model.response_rx.try_recv().is_err());
    }

    #[test]
    fn projection_labels() {
        let row = ViewPost {
            post: sample_posts().remove(0),
            votes: 43,
            my_vote: Some(1),
        };
        assert_eq!(vote_label(&row), "▲ 43");
        let row = ViewPost {
            my_vote: None,
            ..row
        };
        assert_eq!(vote_label(&row), "△ 43");
        assert_eq!(image_badge(2), "🖼 2 images (o opens)");
        assert_eq!(trending_count_label(1), "1 post");
        assert_eq!(
            empty_feed_message(&Filter::parse("#FinalsWeek")),
            "No posts found for #FinalsWeek\nBe the first to post!"
        );
    }
}
