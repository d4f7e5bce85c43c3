//! Ratatui-based terminal UI.
//!
//! Two pages: a configuration page (files, alpha, model families and their
//! bounds) and a results page (checkable result list, progress, plot and
//! detail panel). All state lives in the [`Session`]; this module only maps
//! keys to session calls and draws.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Gauge, List, ListItem, ListState, Paragraph, Wrap},
};

use crate::domain::{Accuracy, ModelKind};
use crate::error::AppError;
use crate::report::{beta_text, fmt_float, params_display};
use crate::session::bounds::{Axis, BOUNDS_WARNING};
use crate::session::Session;

mod plotters_chart;

use plotters_chart::ResultChart;

/// Start the TUI on an already configured session.
pub fn run(session: Session, export_dir: PathBuf) -> Result<(), AppError> {
    let _guard = TerminalGuard::new()?;

    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal =
        Terminal::new(backend).map_err(|e| AppError::io(format!("Failed to initialize terminal: {e}")))?;

    let mut app = App::new(session, export_dir);
    app.event_loop(&mut terminal)
}

/// Ensures the terminal is restored (raw mode, alternate screen) on exit.
struct TerminalGuard;

impl TerminalGuard {
    fn new() -> Result<Self, AppError> {
        enable_raw_mode().map_err(|e| AppError::io(format!("Failed to enable raw mode: {e}")))?;
        if let Err(e) = execute!(io::stdout(), EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(AppError::io(format!("Failed to enter alternate screen: {e}")));
        }
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Page {
    Config,
    Results,
}

/// One editable row of the configuration page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Input,
    Observations,
    Alpha,
    Uncertainty,
    Enabled(ModelKind),
    BetaEnabled(ModelKind),
    Beta(ModelKind),
    Lower(ModelKind, usize),
    Upper(ModelKind, usize),
}

impl Field {
    fn all() -> Vec<Field> {
        let mut fields = vec![Field::Input, Field::Observations, Field::Alpha, Field::Uncertainty];
        for kind in ModelKind::ALL {
            fields.push(Field::Enabled(kind));
            fields.push(Field::BetaEnabled(kind));
            fields.push(Field::Beta(kind));
            for param in 0..kind.arity() {
                fields.push(Field::Lower(kind, param));
                fields.push(Field::Upper(kind, param));
            }
        }
        fields
    }

    /// Step used by ←/→ on numeric fields.
    fn step(self) -> Option<f64> {
        match self {
            Field::Alpha | Field::Beta(_) => Some(0.05),
            Field::Lower(kind, p) | Field::Upper(kind, p) => Some(match kind.param_csv_names()[p] {
                "PD" => 0.01,
                "n" => 0.1,
                _ => 1.0,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AxisEnd {
    Lower,
    Upper,
}

const AXIS_CONTROLS: [(Axis, AxisEnd); 4] = [
    (Axis::X, AxisEnd::Lower),
    (Axis::X, AxisEnd::Upper),
    (Axis::Y, AxisEnd::Lower),
    (Axis::Y, AxisEnd::Upper),
];

struct TextEdit {
    field: Field,
    buffer: String,
}

struct App {
    session: Session,
    export_dir: PathBuf,
    page: Page,
    fields: Vec<Field>,
    selected_field: usize,
    editing: Option<TextEdit>,
    axis_focus: usize,
    popup: Option<String>,
    confirm_delete: bool,
    status: String,
}

impl App {
    fn new(session: Session, export_dir: PathBuf) -> Self {
        Self {
            session,
            export_dir,
            page: Page::Config,
            fields: Field::all(),
            selected_field: 0,
            editing: None,
            axis_focus: 0,
            popup: None,
            confirm_delete: false,
            status: "Configure the run, then press r.".to_string(),
        }
    }

    fn event_loop<B: ratatui::backend::Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<(), AppError> {
        let mut needs_redraw = true;
        loop {
            if self.session.pump() > 0 || self.session.is_running() {
                needs_redraw = true;
            }

            if needs_redraw {
                terminal
                    .draw(|f| self.draw(f))
                    .map_err(|e| AppError::io(format!("Terminal draw error: {e}")))?;
                needs_redraw = false;
            }

            if !event::poll(Duration::from_millis(100)).map_err(|e| AppError::io(format!("Event poll error: {e}")))? {
                continue;
            }

            match event::read().map_err(|e| AppError::io(format!("Event read error: {e}")))? {
                Event::Key(key) => {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if self.handle_key(key.code)? {
                        break;
                    }
                    needs_redraw = true;
                }
                Event::Resize(_, _) => {
                    needs_redraw = true;
                }
                _ => {}
            }
        }
        self.session.cancel_run();
        Ok(())
    }

    /// Returns `true` when the user asked to quit.
    fn handle_key(&mut self, code: KeyCode) -> Result<bool, AppError> {
        if self.popup.take().is_some() {
            return Ok(false);
        }
        if self.confirm_delete {
            self.confirm_delete = false;
            if matches!(code, KeyCode::Char('y') | KeyCode::Char('Y')) {
                self.delete_checked()?;
            } else {
                self.status = "Delete canceled.".to_string();
            }
            return Ok(false);
        }
        if self.editing.is_some() {
            self.handle_edit(code);
            return Ok(false);
        }

        if code == KeyCode::Char('q') {
            return Ok(true);
        }
        match self.page {
            Page::Config => self.handle_config_key(code),
            Page::Results => self.handle_results_key(code)?,
        }
        Ok(false)
    }

    fn handle_config_key(&mut self, code: KeyCode) {
        let field = self.fields[self.selected_field];
        match code {
            KeyCode::Up => self.selected_field = self.selected_field.saturating_sub(1),
            KeyCode::Down => {
                if self.selected_field + 1 < self.fields.len() {
                    self.selected_field += 1;
                }
            }
            KeyCode::Left => self.step_field(field, -1.0),
            KeyCode::Right => self.step_field(field, 1.0),
            KeyCode::Enter | KeyCode::Char(' ') => self.activate_field(field),
            KeyCode::Char('r') => self.start_run(),
            KeyCode::Tab => self.page = Page::Results,
            _ => {}
        }
    }

    fn handle_results_key(&mut self, code: KeyCode) -> Result<(), AppError> {
        match code {
            KeyCode::Up => self.move_selection(-1),
            KeyCode::Down => self.move_selection(1),
            KeyCode::Char(' ') => {
                if let Some(ordinal) = self.session.selected().map(|e| e.ordinal()) {
                    self.session.toggle_checked(ordinal)?;
                }
            }
            KeyCode::Char('a') => self.session.toggle_check_all(),
            KeyCode::Char('d') => {
                if self.session.can_act_on_checked() {
                    self.confirm_delete = true;
                }
            }
            KeyCode::Char('s') => {
                if self.session.can_act_on_checked() {
                    self.status = match self.session.export_checked(&self.export_dir) {
                        Ok(path) => format!("Saved results to {}", path.display()),
                        Err(e) => format!("Save failed: {e}"),
                    };
                }
            }
            KeyCode::Char('p') => {
                self.status = match self.session.export_parameter_table(&self.export_dir) {
                    Ok(path) => format!("Saved parameter table to {}", path.display()),
                    Err(e) => format!("Save failed: {e}"),
                };
            }
            KeyCode::Char('c') => {
                if self.session.is_running() {
                    self.session.cancel_run();
                    self.status = "Cancel requested; finishing the current model.".to_string();
                }
            }
            KeyCode::Char('f') => self.axis_focus = (self.axis_focus + 1) % AXIS_CONTROLS.len(),
            KeyCode::Left => self.step_axis(-1.0),
            KeyCode::Right => self.step_axis(1.0),
            KeyCode::Esc | KeyCode::Char('b') | KeyCode::Tab => self.page = Page::Config,
            _ => {}
        }
        Ok(())
    }

    fn start_run(&mut self) {
        match self.session.start_run() {
            Ok(()) => {
                self.page = Page::Results;
                self.status = "Run started.".to_string();
            }
            Err(e) => self.popup = Some(e.message().to_string()),
        }
    }

    fn delete_checked(&mut self) -> Result<(), AppError> {
        let removed = self.session.delete_checked()?;
        self.status = format!("Deleted {removed} result(s).");
        Ok(())
    }

    fn move_selection(&mut self, delta: isize) {
        let count = self.session.registry().count();
        if count == 0 {
            return;
        }
        let next = match self.session.selected() {
            Some(entry) => entry.ordinal().saturating_add_signed(delta).clamp(1, count),
            None => 1,
        };
        if let Err(e) = self.session.select(next) {
            self.status = e.message().to_string();
        }
    }

    fn step_axis(&mut self, direction: f64) {
        let (axis, end) = AXIS_CONTROLS[self.axis_focus];
        let bounds = self.session.plot().axis(axis);
        let update = match end {
            AxisEnd::Lower => {
                let value = bounds.lower().stepped(direction);
                self.session.on_axis_lower_changed(axis, value)
            }
            AxisEnd::Upper => {
                let value = bounds.upper().stepped(direction);
                self.session.on_axis_upper_changed(axis, value)
            }
        };
        if !update.valid {
            self.status = BOUNDS_WARNING.to_string();
        }
    }

    fn step_field(&mut self, field: Field, direction: f64) {
        let Some(step) = field.step() else {
            return;
        };
        let delta = step * direction;
        match field {
            Field::Alpha => {
                let alpha = &mut self.session.config_mut().alpha;
                *alpha = (*alpha + delta).max(step);
            }
            Field::Beta(kind) => {
                let model = self.session.config_mut().model_mut(kind);
                model.beta = (model.beta + delta).clamp(0.0, 1.0);
            }
            Field::Lower(kind, p) => {
                let value = self.session.config().model(kind).bounds()[p].lower() + delta;
                self.apply_bound(field, kind, p, value);
            }
            Field::Upper(kind, p) => {
                let value = self.session.config().model(kind).bounds()[p].upper() + delta;
                self.apply_bound(field, kind, p, value);
            }
            _ => {}
        }
    }

    fn apply_bound(&mut self, field: Field, kind: ModelKind, param: usize, value: f64) {
        let valid = match field {
            Field::Lower(..) => self.session.on_param_lower_changed(kind, param, value),
            _ => self.session.on_param_upper_changed(kind, param, value),
        };
        if valid == Some(false) {
            self.status = format!("{}: {BOUNDS_WARNING}", kind.code());
        }
    }

    fn activate_field(&mut self, field: Field) {
        let config = self.session.config_mut();
        match field {
            Field::Uncertainty => config.want_uncertainty = !config.want_uncertainty,
            Field::Enabled(kind) => {
                let model = config.model_mut(kind);
                model.enabled = !model.enabled;
            }
            Field::BetaEnabled(kind) => {
                let model = config.model_mut(kind);
                model.beta_enabled = !model.beta_enabled;
            }
            _ => {
                let buffer = self.field_value(field);
                self.editing = Some(TextEdit { field, buffer });
                self.status = "Editing. Enter to apply, Esc to cancel.".to_string();
            }
        }
    }

    fn handle_edit(&mut self, code: KeyCode) {
        let Some(edit) = self.editing.as_mut() else {
            return;
        };
        match code {
            KeyCode::Esc => {
                self.editing = None;
                self.status = "Edit canceled.".to_string();
            }
            KeyCode::Enter => {
                if let Some(edit) = self.editing.take() {
                    self.apply_edit(edit);
                }
            }
            KeyCode::Backspace => {
                edit.buffer.pop();
            }
            KeyCode::Char(c) => edit.buffer.push(c),
            _ => {}
        }
    }

    fn apply_edit(&mut self, edit: TextEdit) {
        let text = edit.buffer.trim();
        let path = || (!text.is_empty()).then(|| PathBuf::from(text));
        match edit.field {
            Field::Input => self.session.config_mut().input_file = path(),
            Field::Observations => self.session.config_mut().observations_file = path(),
            field => {
                let Some(value) = text.parse::<f64>().ok().filter(|v| v.is_finite()) else {
                    self.status = format!("Invalid number '{text}'.");
                    return;
                };
                match field {
                    Field::Alpha => self.session.config_mut().alpha = value,
                    Field::Beta(kind) => self.session.config_mut().model_mut(kind).beta = value,
                    Field::Lower(kind, p) | Field::Upper(kind, p) => self.apply_bound(field, kind, p, value),
                    _ => {}
                }
            }
        }
        if self.status.starts_with("Editing") {
            self.status.clear();
        }
    }

    fn field_value(&self, field: Field) -> String {
        let config = self.session.config();
        let path = |p: &Option<PathBuf>| p.as_ref().map(|p| p.display().to_string()).unwrap_or_default();
        let flag = |b: bool| if b { "[x]" } else { "[ ]" }.to_string();
        match field {
            Field::Input => path(&config.input_file),
            Field::Observations => path(&config.observations_file),
            Field::Alpha => fmt_float(config.alpha),
            Field::Uncertainty => flag(config.want_uncertainty),
            Field::Enabled(kind) => flag(config.model(kind).enabled),
            Field::BetaEnabled(kind) => flag(config.model(kind).beta_enabled),
            Field::Beta(kind) => fmt_float(config.model(kind).beta),
            Field::Lower(kind, p) => fmt_float(config.model(kind).bounds()[p].lower()),
            Field::Upper(kind, p) => fmt_float(config.model(kind).bounds()[p].upper()),
        }
    }

    fn field_label(field: Field) -> String {
        match field {
            Field::Input => "Input file".to_string(),
            Field::Observations => "Observations file".to_string(),
            Field::Alpha => "Alpha".to_string(),
            Field::Uncertainty => "Calculate uncertainty".to_string(),
            Field::Enabled(kind) => format!("{} ({})", kind.code(), kind.display_name()),
            Field::BetaEnabled(_) => "  beta refinement".to_string(),
            Field::Beta(_) => "  beta".to_string(),
            Field::Lower(kind, p) => format!("  {} min", kind.param_symbols()[p]),
            Field::Upper(kind, p) => format!("  {} max", kind.param_symbols()[p]),
        }
    }

    fn draw(&mut self, frame: &mut ratatui::Frame<'_>) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(0), Constraint::Length(3)])
            .split(frame.area());

        self.draw_header(frame, chunks[0]);
        match self.page {
            Page::Config => self.draw_config(frame, chunks[1]),
            Page::Results => self.draw_results(frame, chunks[1]),
        }
        self.draw_footer(frame, chunks[2]);

        if let Some(message) = &self.popup {
            draw_popup(frame, "Cannot start", message);
        } else if self.confirm_delete {
            let count = self.session.registry().checked_ordinals().len();
            draw_popup(frame, "Delete", &format!("Delete {count} checked result(s)? (y/n)"));
        }
    }

    fn draw_header(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let page = match self.page {
            Page::Config => "configuration",
            Page::Results => "results",
        };
        let line = Line::from(vec![
            Span::styled("tracer", Style::default().fg(Color::Cyan)),
            Span::raw(format!(" | {page} | {} result(s)", self.session.registry().count())),
        ]);
        frame.render_widget(Paragraph::new(line).block(Block::default().borders(Borders::ALL)), area);
    }

    fn draw_config(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let config = self.session.config();
        let items: Vec<ListItem> = self
            .fields
            .iter()
            .map(|&field| {
                let value = match &self.editing {
                    Some(edit) if edit.field == field => format!("{}_", edit.buffer),
                    _ => self.field_value(field),
                };
                let mut spans = vec![Span::raw(format!("{:<24} {value}", Self::field_label(field)))];
                if let Field::Enabled(kind) = field {
                    if config.model(kind).has_warning() {
                        spans.push(Span::styled(
                            format!("  {BOUNDS_WARNING}"),
                            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                        ));
                    }
                }
                ListItem::new(Line::from(spans))
            })
            .collect();

        let list = List::new(items)
            .block(Block::default().title("Configuration").borders(Borders::ALL))
            .highlight_style(Style::default().fg(Color::Black).bg(Color::White))
            .highlight_symbol("» ");

        let mut state = ListState::default();
        state.select(Some(self.selected_field));
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_results(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
            .split(area);
        let left = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(3)])
            .split(columns[0]);
        let right = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(8)])
            .split(columns[1]);

        self.draw_result_list(frame, left[0]);
        self.draw_progress(frame, left[1]);
        self.draw_chart(frame, right[0]);
        self.draw_details(frame, right[1]);
    }

    fn draw_result_list(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let registry = self.session.registry();
        let items: Vec<ListItem> = registry
            .entries()
            .iter()
            .map(|e| {
                let mark = if e.is_checked() { "[x]" } else { "[ ]" };
                ListItem::new(format!("{mark} {}", e.display_name()))
            })
            .collect();

        let title = format!("Results (a: {})", self.session.check_button_label());
        let list = List::new(items)
            .block(Block::default().title(title).borders(Borders::ALL))
            .highlight_style(Style::default().fg(Color::Black).bg(Color::White))
            .highlight_symbol("» ");

        let mut state = ListState::default();
        state.select(self.session.selected().map(|e| e.ordinal() - 1));
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_progress(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let title = if self.session.busy_label().is_empty() {
            "Idle".to_string()
        } else {
            self.session.busy_label().to_string()
        };
        let gauge = Gauge::default()
            .block(Block::default().title(title).borders(Borders::ALL))
            .gauge_style(Style::default().fg(Color::Cyan))
            .ratio((self.session.progress() / 100.0).clamp(0.0, 1.0))
            .label(self.session.progress_label().to_string());
        frame.render_widget(gauge, area);
    }

    fn draw_chart(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let (axis, end) = AXIS_CONTROLS[self.axis_focus];
        let control = self.session.plot().axis(axis);
        let focused = match end {
            AxisEnd::Lower => control.lower().value(),
            AxisEnd::Upper => control.upper().value(),
        };
        let title = format!("Plot (f: {axis:?} {end:?} = {})", fmt_float(focused));
        let block = Block::default().title(title).borders(Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        frame.render_widget(Clear, inner);

        let Some(entry) = self.session.selected() else {
            let msg = Paragraph::new("No result selected.").style(Style::default().fg(Color::Yellow));
            frame.render_widget(msg, inner);
            return;
        };

        let result = entry.result();
        let observations: Vec<(f64, f64)> = result.observations.points().collect();
        let output: Vec<(f64, f64)> = result.output.points().collect();
        let widget = ResultChart {
            observations: &observations,
            output: &output,
            viewport: self.session.plot().viewport(),
            x_label: "year",
            y_label: "TU",
        };
        frame.render_widget(widget, inner);
    }

    fn draw_details(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let mut lines: Vec<Line> = Vec::new();
        if let Some(entry) = self.session.selected() {
            let result = entry.result();
            lines.push(Line::from(format!(
                "{}  {} ({})",
                entry.display_name(),
                result.model_type.code(),
                result.model_type.display_name()
            )));
            lines.push(Line::from(params_display(result)));
            if let Accuracy::Confidence { confidence_level, .. } = &result.accuracy {
                let levels: Vec<String> = confidence_level.iter().copied().map(fmt_float).collect();
                lines.push(Line::from(format!("confidence level: {}", levels.join(", "))));
            }
            lines.push(Line::from(format!(
                "beta: {} | MSE: {} | ME: {}",
                beta_text(result),
                fmt_float(result.mse),
                fmt_float(result.model_efficiency)
            )));
        }
        for failure in self.session.failures() {
            lines.push(Line::from(Span::styled(
                format!("{} failed: {}", failure.kind.code(), failure.message),
                Style::default().fg(Color::Red),
            )));
        }

        let p = Paragraph::new(Text::from(lines))
            .wrap(Wrap { trim: true })
            .block(Block::default().title("Details").borders(Borders::ALL));
        frame.render_widget(p, area);
    }

    fn draw_footer(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let help = match self.page {
            Page::Config => "↑/↓ select  ←/→ adjust  Enter edit/toggle  r run  Tab results  q quit",
            Page::Results => {
                "↑/↓ select  space check  a all  d delete  s save  p params  f/←/→ axis  c cancel  b back  q quit"
            }
        };
        let line = Line::from(vec![
            Span::styled(help, Style::default().fg(Color::Gray)),
            Span::raw(" | "),
            Span::styled(&self.status, Style::default().fg(Color::Yellow)),
        ]);
        frame.render_widget(Paragraph::new(line).block(Block::default().borders(Borders::ALL)), area);
    }
}

fn draw_popup(frame: &mut ratatui::Frame<'_>, title: &str, message: &str) {
    let area = frame.area();
    let height = (message.lines().count() as u16 + 4).min(area.height);
    let width = (area.width * 3 / 5).max(30).min(area.width);
    let rect = Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    };
    let p = Paragraph::new(message.to_string())
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().title(title.to_string()).borders(Borders::ALL));
    frame.render_widget(Clear, rect);
    frame.render_widget(p, rect);
}
