use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState, Wrap},
    Frame, Terminal,
};
use regtrack::{regulation_detail, RegulationDetail, RegulationSummary, RuleStage, StageKind};
use rusqlite::Connection;
use std::io;

pub struct App {
    pub regulations: Vec<RegulationSummary>,
    pub filtered: Vec<RegulationSummary>,
    pub state: TableState,
    pub stage_filter: Option<StageKind>,
    pub detail: Option<RegulationDetail>,
    pub status: Option<String>,
}

impl App {
    pub fn new(regulations: Vec<RegulationSummary>) -> Self {
        let mut state = TableState::default();
        if !regulations.is_empty() {
            state.select(Some(0));
        }

        Self {
            filtered: regulations.clone(),
            regulations,
            state,
            stage_filter: None,
            detail: None,
            status: None,
        }
    }

    pub fn selected(&self) -> Option<&RegulationSummary> {
        self.state.selected().and_then(|i| self.filtered.get(i))
    }

    /// Open the detail pane for the selected row, or close it when open
    pub fn toggle_detail(&mut self, conn: &Connection) {
        if self.detail.take().is_some() {
            return;
        }

        let Some(id) = self.selected().map(|s| s.regulation.id) else {
            return;
        };
        match regulation_detail(conn, id) {
            Ok(detail) => self.detail = Some(detail),
            Err(e) => self.status = Some(format!("Failed to load regulation {id}: {e}")),
        }
    }

    pub fn apply_filter(&mut self, stage: Option<StageKind>) {
        self.stage_filter = stage;
        self.detail = None;

        self.filtered = match stage {
            None => self.regulations.clone(),
            Some(wanted) => self
                .regulations
                .iter()
                .filter(|s| s.current_stage.as_ref().and_then(RuleStage::kind) == Some(wanted))
                .cloned()
                .collect(),
        };

        if self.filtered.is_empty() {
            self.state.select(None);
        } else {
            self.state.select(Some(0));
        }
    }

    pub fn next(&mut self) {
        let len = self.filtered.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
        self.detail = None;
    }

    pub fn previous(&mut self) {
        let len = self.filtered.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
        self.detail = None;
    }

    pub fn stage_counts(&self) -> [usize; 3] {
        let mut counts = [0; 3];
        for summary in &self.regulations {
            match summary.current_stage.as_ref().and_then(RuleStage::kind) {
                Some(StageKind::Anprm) => counts[0] += 1,
                Some(StageKind::Nprm) => counts[1] += 1,
                Some(StageKind::Final) => counts[2] += 1,
                None => {}
            }
        }
        counts
    }
}

pub fn run_ui(app: &mut App, conn: &Connection) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app, conn);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res?;
    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    conn: &Connection,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Enter => app.toggle_detail(conn),
                KeyCode::Char('1') => app.apply_filter(Some(StageKind::Anprm)),
                KeyCode::Char('2') => app.apply_filter(Some(StageKind::Nprm)),
                KeyCode::Char('3') => app.apply_filter(Some(StageKind::Final)),
                KeyCode::Char('c') => app.apply_filter(None),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Content
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    if app.detail.is_some() {
        let content = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
            .split(chunks[1]);

        render_table(f, content[0], app);
        render_detail_panel(f, content[1], app);
    } else {
        render_table(f, chunks[1], app);
    }

    render_status_bar(f, chunks[2], app);
}

fn stage_color(kind: Option<StageKind>) -> Color {
    match kind {
        Some(StageKind::Anprm) => Color::Cyan,
        Some(StageKind::Nprm) => Color::Yellow,
        Some(StageKind::Final) => Color::Green,
        None => Color::White,
    }
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let [anprm, nprm, final_rules] = app.stage_counts();

    let spans = vec![
        Span::styled(
            "Federal Rulemaking Tracker",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  |  "),
        Span::styled(
            format!("Regulations: {}", app.regulations.len()),
            Style::default().fg(Color::White),
        ),
        Span::raw("  |  "),
        Span::styled(format!("ANPRM {}", anprm), Style::default().fg(stage_color(Some(StageKind::Anprm)))),
        Span::raw("  "),
        Span::styled(format!("NPRM {}", nprm), Style::default().fg(stage_color(Some(StageKind::Nprm)))),
        Span::raw("  "),
        Span::styled(
            format!("Final {}", final_rules),
            Style::default().fg(stage_color(Some(StageKind::Final))),
        ),
    ];

    let header = Paragraph::new(vec![Line::from(spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn render_table(f: &mut Frame, area: Rect, app: &mut App) {
    let header_cells = ["RIN", "Stage", "Published", "Agency", "Title"].iter().map(|h| {
        Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    });

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows = app.filtered.iter().map(|summary| {
        let stage = summary.current_stage.as_ref();
        let color = stage_color(stage.and_then(RuleStage::kind));

        Row::new(vec![
            Cell::from(summary.regulation.rin.clone()),
            Cell::from(stage.map(|s| s.stage_type.clone()).unwrap_or_else(|| "-".to_string()))
                .style(Style::default().fg(color)),
            Cell::from(
                stage
                    .and_then(|s| s.publication_date)
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::from(truncate(summary.agency_name.as_deref().unwrap_or("-"), 24)),
            Cell::from(truncate(&summary.regulation.title, 60)),
        ])
        .height(1)
    });

    let title = match app.stage_filter {
        Some(kind) => format!(" Regulations ({}) ", kind.display_name()),
        None => " Regulations ".to_string(),
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(12),
            Constraint::Length(7),
            Constraint::Length(12),
            Constraint::Length(26),
            Constraint::Min(20),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(title),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let selected = app.state.selected().map(|i| i + 1).unwrap_or(0);

    let mut spans = vec![Span::styled(
        format!(" Row: {}/{} ", selected, app.filtered.len()),
        Style::default().fg(Color::Cyan),
    )];

    if let Some(status) = &app.status {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(status.as_str(), Style::default().fg(Color::Red)));
    }

    for (key, label) in [
        ("Enter", " Details"),
        ("1/2/3", " ANPRM/NPRM/Final"),
        ("c", " Clear"),
        ("↑/↓", " Nav"),
    ] {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(key, Style::default().fg(Color::Yellow)));
        spans.push(Span::raw(label));
    }
    spans.push(Span::raw(" | "));
    spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::White)));

    f.render_widget(status_bar, area);
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Regulation Details ");

    let Some(detail) = &app.detail else {
        f.render_widget(Paragraph::new("No regulation selected").block(block), area);
        return;
    };

    let label = |text: &'static str| {
        Span::styled(text, Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
    };
    let section = |text: &'static str| {
        Line::from(Span::styled(
            text,
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
        ))
    };

    let mut content = vec![
        Line::from(Span::styled(
            detail.regulation.title.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(vec![label("RIN: "), Span::raw(detail.regulation.rin.clone())]),
    ];

    if let Some(agency) = &detail.agency {
        content.push(Line::from(vec![label("Agency: "), Span::raw(agency.name.clone())]));
    }
    if !detail.committees.is_empty() {
        let names: Vec<&str> = detail.committees.iter().map(|c| c.name.as_str()).collect();
        content.push(Line::from(vec![label("Committees: "), Span::raw(names.join(", "))]));
    }
    if let Some(current) = &detail.current_stage {
        content.push(Line::from(vec![
            label("Current: "),
            Span::styled(
                current.stage_type.clone(),
                Style::default().fg(stage_color(current.kind())),
            ),
        ]));
    }

    content.push(Line::from(""));
    content.push(section("STAGES"));
    for stage in &detail.stages {
        content.push(Line::from(vec![
            Span::styled(
                format!("{:<6} ", stage.stage_type),
                Style::default().fg(stage_color(stage.kind())),
            ),
            Span::raw(
                stage
                    .publication_date
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Span::raw("  "),
            Span::styled(
                stage.federal_register_id.clone().unwrap_or_default(),
                Style::default().fg(Color::DarkGray),
            ),
        ]));
    }

    content.push(Line::from(""));
    content.push(section("DOCUMENTS"));
    for document in &detail.documents {
        content.push(Line::from(document.title.clone()));
        if let Some(url) = &document.url {
            content.push(Line::from(Span::styled(url.clone(), Style::default().fg(Color::Green))));
        }
    }

    if let Some(description) = &detail.regulation.description {
        content.push(Line::from(""));
        content.push(section("ABSTRACT"));
        content.push(Line::from(Span::styled(
            description.clone(),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    content.push(Line::from(""));
    content.push(Line::from(Span::styled(
        "Press Enter to close",
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
    )));

    let panel = Paragraph::new(content).block(block).wrap(Wrap { trim: true });
    f.render_widget(panel, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
