use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Terminal,
};
use tokio::sync::{broadcast, mpsc};
use tracing_subscriber::EnvFilter;

use rentdesk_chat::chat_types::{ChannelStatus, StatusFilter, Thread};
use rentdesk_chat::derivation::{counterpart, preview_text, receipt_state, unread_count, ReceiptState};
use rentdesk_chat::presenter::present;
use rentdesk_chat::thread_store::StoreChange;
use rentdesk_chat::utils::notice::{Notice, NoticeLevel};
use rentdesk_chat::{ChatSync, Config};

struct View {
    viewer_id: String,
    threads: Vec<Thread>,
    online: Vec<String>,
    filter: StatusFilter,
    query: String,
    searching: bool,
    selected: usize,
    loading: bool,
    connected: bool,
    notice: Option<Notice>,
}

impl View {
    fn new(viewer_id: String) -> Self {
        Self {
            viewer_id,
            threads: vec![],
            online: vec![],
            filter: StatusFilter::All,
            query: String::new(),
            searching: false,
            selected: 0,
            loading: true,
            connected: false,
            notice: None,
        }
    }

    fn shown(&self) -> Vec<Thread> {
        present(&self.threads, self.filter, &self.query, &self.viewer_id)
    }

    fn clamp_selection(&mut self, len: usize) {
        if len == 0 {
            self.selected = 0;
        } else if self.selected >= len {
            self.selected = len - 1;
        }
    }
}

/// Store contents and presence, re-read after every store change
struct Snapshot {
    threads: Vec<Thread>,
    online: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // The alternate screen owns stdout; log to stderr only on request
    if std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    }

    let args: Vec<String> = std::env::args().collect();
    let config = Config::from_args(&args)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    let sync = Arc::new(ChatSync::new(config).map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?);

    let (change_tx, mut change_rx) = mpsc::unbounded_channel::<StoreChange>();
    sync.store()
        .subscribe(Arc::new(move |change: &StoreChange| {
            let _ = change_tx.send(change.clone());
        }))
        .await;

    // Re-read the store off the UI thread
    let (snap_tx, mut snap_rx) = mpsc::unbounded_channel::<Snapshot>();
    {
        let sync = sync.clone();
        tokio::spawn(async move {
            while change_rx.recv().await.is_some() {
                while change_rx.try_recv().is_ok() {}
                let snapshot = Snapshot {
                    threads: sync.store().get_all().await,
                    online: sync.presence().online().await,
                };
                if snap_tx.send(snapshot).is_err() {
                    break;
                }
            }
        });
    }

    let guard = sync.attach_listener();
    let catch_up = sync.spawn_catch_up();
    let transport = sync.spawn_transport();
    {
        let sync = sync.clone();
        tokio::spawn(async move {
            let _ = sync.load().await;
        });
    }

    let mut notices = sync.notices().subscribe();

    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    let res = run_app(&mut terminal, &sync, &mut snap_rx, &mut notices);
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Some(handle) = transport {
        handle.abort();
    }
    catch_up.abort();
    sync.connection().disconnect();
    guard.detach().await;

    if let Err(e) = res {
        eprintln!("TUI error: {e}");
    }
    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    sync: &Arc<ChatSync>,
    snapshots: &mut mpsc::UnboundedReceiver<Snapshot>,
    notices: &mut broadcast::Receiver<Notice>,
) -> std::io::Result<()> {
    let mut view = View::new(sync.viewer_id().to_string());
    let mut last_redraw = Instant::now();

    loop {
        while let Ok(snapshot) = snapshots.try_recv() {
            view.threads = snapshot.threads;
            view.online = snapshot.online;
        }
        loop {
            match notices.try_recv() {
                Ok(notice) => view.notice = Some(notice),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        view.loading = sync.loader().is_loading();
        view.connected = sync.connection().is_connected();

        let shown = view.shown();
        view.clamp_selection(shown.len());

        if crossterm::event::poll(Duration::from_millis(5))? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if view.searching {
                    match key.code {
                        KeyCode::Enter | KeyCode::Esc => view.searching = false,
                        KeyCode::Backspace => {
                            view.query.pop();
                        }
                        KeyCode::Char(c) => view.query.push(c),
                        _ => {}
                    }
                } else {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                        KeyCode::Char('/') => view.searching = true,
                        KeyCode::Tab => view.filter = view.filter.next(),
                        KeyCode::Up => view.selected = view.selected.saturating_sub(1),
                        KeyCode::Down => view.selected += 1,
                        KeyCode::Char('r') => {
                            let sync = sync.clone();
                            tokio::spawn(async move {
                                let _ = sync.refresh().await;
                            });
                        }
                        KeyCode::Enter => {
                            if let Some(thread) = shown.get(view.selected) {
                                let sync = sync.clone();
                                let id = thread.id.clone();
                                tokio::spawn(async move {
                                    if let Err(e) = sync.mark_read(&id).await {
                                        sync.notices().error(format!("Failed to mark read: {}", e));
                                    }
                                });
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        if last_redraw.elapsed() >= Duration::from_millis(33) {
            terminal.draw(|f| draw(f, &view, &shown))?;
            last_redraw = Instant::now();
        }

        std::thread::sleep(Duration::from_millis(8));
    }
}

fn status_color(status: ChannelStatus) -> Color {
    match status {
        ChannelStatus::Inquiry => Color::Yellow,
        ChannelStatus::Active => Color::Green,
        ChannelStatus::Ended => Color::DarkGray,
    }
}

fn receipt_span(state: ReceiptState) -> Span<'static> {
    match state {
        ReceiptState::Unread => Span::styled("● ", Style::default().fg(Color::Cyan)),
        ReceiptState::Delivered => Span::styled("✓ ", Style::default().fg(Color::Gray)),
        ReceiptState::Seen => Span::styled("✓✓", Style::default().fg(Color::Cyan)),
        ReceiptState::None => Span::raw("  "),
    }
}

fn draw(f: &mut ratatui::Frame, view: &View, shown: &[Thread]) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(3), Constraint::Length(4)].as_ref())
        .split(f.size());

    let search_style = if view.searching {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    let header = Paragraph::new(Line::from(vec![
        Span::styled(format!(" Filter: {} ", view.filter), Style::default().fg(Color::Magenta)),
        Span::raw("  "),
        Span::styled(format!("Search: {}", view.query), search_style),
    ]))
    .block(Block::default().title("Inbox").borders(Borders::ALL));
    f.render_widget(header, chunks[0]);

    let rows: Vec<Line> = if view.loading && shown.is_empty() {
        vec![Line::from("Loading conversations...")]
    } else if shown.is_empty() {
        vec![Line::from("No conversations")]
    } else {
        shown
            .iter()
            .enumerate()
            .map(|(idx, thread)| {
                let other = counterpart(thread, &view.viewer_id);
                let online = view.online.iter().any(|id| *id == other.id);
                let mut name_style = Style::default().fg(Color::White);
                if idx == view.selected {
                    name_style = name_style.add_modifier(Modifier::REVERSED);
                }
                Line::from(vec![
                    receipt_span(receipt_state(thread, &view.viewer_id)),
                    Span::raw(" "),
                    Span::styled(if online { "◉ " } else { "  " }, Style::default().fg(Color::Green)),
                    Span::styled(format!("{:<22}", other.display_name()), name_style),
                    Span::styled(
                        format!("{:<13}", thread.status.label()),
                        Style::default().fg(status_color(thread.status)),
                    ),
                    Span::raw(preview_text(thread, &view.viewer_id)),
                ])
            })
            .collect()
    };
    let list = Paragraph::new(rows).block(Block::default().title("Conversations").borders(Borders::ALL));
    f.render_widget(list, chunks[1]);

    let mut info = vec![Line::from(vec![
        Span::raw(format!("Threads: {}", view.threads.len())),
        Span::raw("   "),
        Span::raw(format!("Unread: {}", unread_count(&view.threads, &view.viewer_id))),
        Span::raw("   "),
        if view.connected {
            Span::styled("live", Style::default().fg(Color::Green))
        } else {
            Span::styled("offline", Style::default().fg(Color::Red))
        },
        Span::raw("   "),
        Span::raw("Tab filter  / search  r refresh  Enter mark read  q quit"),
    ])];
    if let Some(notice) = &view.notice {
        let color = match notice.level {
            NoticeLevel::Success => Color::Green,
            NoticeLevel::Error => Color::Red,
        };
        info.push(Line::from(Span::styled(notice.text.clone(), Style::default().fg(color))));
    }
    let info_para = Paragraph::new(info).block(Block::default().title("Info").borders(Borders::ALL));
    f.render_widget(info_para, chunks[2]);
}
