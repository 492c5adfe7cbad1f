// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The terminal dashboard (spec.md §10's `top` subcommand), ported from
//! `pkg/termui/top.go`'s `TopUI`. The original drives `tview`/`tcell`;
//! here the same update/render/input-capture shape is rebuilt on
//! `ratatui`/`crossterm` instead.

use std::collections::BTreeMap;
use std::io::Stdout;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table};
use ratatui::Terminal;

use spy_attach::SuspendedThread;
use spy_core::duration::format_duration;
use spy_core::GoProcess;

struct GoroutineGroup {
    func_name: String,
    count: usize,
    by_status: BTreeMap<String, usize>,
}

/// Everything `update()` recomputes on a refresh. Held across frames so
/// keypresses can re-render without refetching.
struct Snapshot {
    go_version: String,
    goroutine_count: usize,
    uptime: Duration,
    groups: Vec<GoroutineGroup>,
    status_dist: BTreeMap<String, usize>,
    last_gc_ago: Option<Duration>,
    pause_total: Duration,
    num_gc: u32,
    recent_pauses: [Duration; 3],
    fetch_duration: Duration,
}

fn fetch(proc: &GoProcess, filter: &str) -> Result<Snapshot> {
    let start = Instant::now();

    let facts = proc.runtime_info().context("reading runtime info")?;
    let (mem, mem_err) = proc.mem_stats();
    if let Some(e) = mem_err {
        log::warn!("partial memstats read: {e}");
    }
    let tasks = proc.tasks(false).context("listing tasks")?;

    let needle = filter.to_lowercase();
    let mut groups: BTreeMap<String, GoroutineGroup> = BTreeMap::new();
    let mut status_dist = BTreeMap::new();
    for t in &tasks {
        *status_dist.entry(t.status.clone()).or_insert(0) += 1;

        let func_name = t.start_func.clone().unwrap_or_else(|| "unknown".to_string());
        if !needle.is_empty() && !func_name.to_lowercase().contains(&needle) {
            continue;
        }
        let entry = groups.entry(func_name.clone()).or_insert_with(|| GoroutineGroup {
            func_name,
            count: 0,
            by_status: BTreeMap::new(),
        });
        entry.count += 1;
        *entry.by_status.entry(t.status.clone()).or_insert(0) += 1;
    }

    let mut groups: Vec<GoroutineGroup> = groups.into_values().collect();
    groups.sort_by(|a, b| b.count.cmp(&a.count));

    let pause_of = |i: usize| Duration::from_nanos(*mem.pause_ns.get(i).unwrap_or(&0));

    Ok(Snapshot {
        go_version: facts.version,
        goroutine_count: tasks.len(),
        uptime: {
            let now_ns = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos() as i64;
            Duration::from_nanos((now_ns - facts.init_time_ns).max(0) as u64)
        },
        groups,
        status_dist,
        last_gc_ago: if mem.last_gc_ns > 0 {
            let now_s = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs();
            Some(Duration::from_secs(now_s.saturating_sub(mem.last_gc_ns)))
        } else {
            None
        },
        pause_total: Duration::from_nanos(mem.pause_total_ns),
        num_gc: mem.num_gc,
        recent_pauses: [pause_of(0), pause_of(1), pause_of(2)],
        fetch_duration: start.elapsed(),
    })
}

struct Dashboard {
    pid: i32,
    refresh: Duration,
    proc: GoProcess,
    snapshot: Option<Snapshot>,
    suspended: Vec<SuspendedThread>,
    search_filter: String,
    search_active: bool,
    last_tick: Instant,
}

impl Dashboard {
    fn new(pid: i32, refresh: Duration, proc: GoProcess) -> Self {
        Dashboard {
            pid,
            refresh,
            proc,
            snapshot: None,
            suspended: Vec::new(),
            search_filter: String::new(),
            search_active: false,
            last_tick: Instant::now(),
        }
    }

    fn refresh_now(&mut self) {
        match fetch(&self.proc, &self.search_filter) {
            Ok(s) => self.snapshot = Some(s),
            Err(e) => log::warn!("refresh failed: {e}"),
        }
        self.last_tick = Instant::now();
    }

    fn is_suspended(&self) -> bool {
        !self.suspended.is_empty()
    }

    fn toggle_suspend(&mut self) {
        if self.is_suspended() {
            self.suspended.clear();
            self.refresh_now();
            return;
        }
        match spy_attach::list_threads(self.pid) {
            Ok(tids) => {
                for tid in tids {
                    match SuspendedThread::attach(tid) {
                        Ok(t) => self.suspended.push(t),
                        Err(e) => log::warn!("failed to suspend thread {tid}: {e}"),
                    }
                }
            }
            Err(e) => log::warn!("failed to list threads for pid {}: {e}", self.pid),
        }
    }
}

fn help_line(filter: &str) -> Line<'static> {
    let filter_part = if filter.is_empty() {
        Span::styled(" | No active filter", Style::default().fg(Color::Green))
    } else {
        Span::styled(
            format!(" | Current filter: {filter:?}"),
            Style::default().fg(Color::Green),
        )
    };
    Line::from(vec![
        Span::styled(
            "Press q to quit, r to refresh, s to suspend/resume, / to search",
            Style::default().fg(Color::Yellow),
        ),
        filter_part,
    ])
}

fn render(f: &mut ratatui::Frame, dash: &Dashboard) {
    let mut constraints = vec![
        Constraint::Length(1),
        Constraint::Length(3),
        Constraint::Min(3),
        Constraint::Length(1),
    ];
    if dash.search_active {
        constraints.push(Constraint::Length(1));
    }
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(f.area());

    let snap = dash.snapshot.as_ref();

    let title = match snap {
        Some(s) => {
            let paused = if dash.is_suspended() { " (PAUSED)" } else { "" };
            format!(
                "PID: {} | Go: {} | Goroutines: {} | Refresh: {}s | Update: {:?}{}",
                dash.pid,
                s.go_version,
                s.goroutine_count,
                dash.refresh.as_secs(),
                s.fetch_duration,
                paused
            )
        }
        None => format!("PID: {} | loading...", dash.pid),
    };
    f.render_widget(
        Paragraph::new(title)
            .style(Style::default().add_modifier(Modifier::BOLD))
            .alignment(ratatui::layout::Alignment::Center),
        chunks[0],
    );

    let mem_text = match snap {
        Some(s) => {
            let last_gc = s
                .last_gc_ago
                .map(|d| format!("{} ago", format_duration(d)))
                .unwrap_or_else(|| "never".to_string());
            let status_str: Vec<String> = s
                .status_dist
                .iter()
                .map(|(k, v)| format!("{k}:{v}"))
                .collect();
            format!(
                "GC Stats: Last: {} | Total Pause: {} | Count: {}\nRecent Pauses: {}, {}, {}\nGoroutine Status: {}",
                last_gc,
                format_duration(s.pause_total),
                s.num_gc,
                format_duration(s.recent_pauses[0]),
                format_duration(s.recent_pauses[1]),
                format_duration(s.recent_pauses[2]),
                status_str.join(" "),
            )
        }
        None => String::new(),
    };
    f.render_widget(
        Paragraph::new(mem_text).block(Block::default().borders(Borders::NONE)),
        chunks[1],
    );

    let rows: Vec<Row> = snap
        .map(|s| {
            s.groups
                .iter()
                .map(|g| {
                    let status_str: Vec<String> = g
                        .by_status
                        .iter()
                        .map(|(k, v)| format!("{k}:{v}"))
                        .collect();
                    Row::new(vec![
                        Cell::from(g.count.to_string()),
                        Cell::from(status_str.join(" ")),
                        Cell::from(g.func_name.clone()),
                    ])
                })
                .collect()
        })
        .unwrap_or_default();

    let table = Table::new(
        rows,
        [
            Constraint::Length(8),
            Constraint::Percentage(40),
            Constraint::Percentage(50),
        ],
    )
    .header(
        Row::new(vec!["Count", "Status", "Function"])
            .style(Style::default().fg(Color::Yellow).bg(Color::DarkGray)),
    );
    f.render_widget(table, chunks[2]);

    f.render_widget(Paragraph::new(help_line(&dash.search_filter)), chunks[3]);

    if dash.search_active {
        f.render_widget(
            Paragraph::new(format!("Search: {}", dash.search_filter)),
            chunks[4],
        );
    }
}

/// Launches the dashboard; blocks until the user quits. Mirrors
/// `TopUI.Run`'s refresh-ticker-plus-input-capture loop.
pub fn run(pid: i32, refresh: Duration) -> Result<()> {
    let proc = GoProcess::attach(pid).with_context(|| format!("attaching to pid {pid}"))?;

    let mut stdout = std::io::stdout();
    enable_raw_mode().context("enabling raw mode")?;
    execute!(stdout, EnterAlternateScreen).context("entering alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("creating terminal")?;

    let result = event_loop(&mut terminal, pid, refresh, proc);

    let _ = disable_raw_mode();
    let _ = execute!(terminal.backend_mut(), LeaveAlternateScreen);
    let _ = terminal.show_cursor();

    result
}

fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    pid: i32,
    refresh: Duration,
    proc: GoProcess,
) -> Result<()> {
    let mut dash = Dashboard::new(pid, refresh, proc);
    dash.refresh_now();

    loop {
        terminal.draw(|f| render(f, &dash))?;

        let timeout = refresh
            .checked_sub(dash.last_tick.elapsed())
            .unwrap_or(Duration::from_millis(0));

        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if dash.search_active {
                    match key.code {
                        KeyCode::Esc | KeyCode::Enter => {
                            dash.search_active = false;
                            dash.refresh_now();
                        }
                        KeyCode::Backspace => {
                            dash.search_filter.pop();
                        }
                        KeyCode::Char(c) => dash.search_filter.push(c),
                        _ => {}
                    }
                    continue;
                }
                match key.code {
                    KeyCode::Char('q') => break,
                    KeyCode::Char('r') => dash.refresh_now(),
                    KeyCode::Char('s') => dash.toggle_suspend(),
                    KeyCode::Char('/') => dash.search_active = true,
                    _ => {}
                }
            }
        }

        if !dash.is_suspended() && dash.last_tick.elapsed() >= refresh {
            dash.refresh_now();
        }
    }

    Ok(())
}
