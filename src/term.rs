//! # terminal host
//!
//! Runs the driver in a terminal: frames go to a TUI canvas, keys come from
//! crossterm, and the refresh callback is a fixed-rate loop paced with
//! spin_sleep. ROM fetches are served from a directory at the top of the
//! next loop iteration, so they complete asynchronously from the driver's
//! point of view.
//!
//! Most terminals only ever report key presses. Where the terminal supports
//! the keyboard enhancement protocol we ask for release events too;
//! otherwise a pressed key is held for a few frames and then let go.
use std::collections::HashMap;
use std::io::{self, Stdout};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use thiserror::Error;
use tui::backend::CrosstermBackend;
use tui::layout::Rect;
use tui::style::{Color, Modifier, Style};
use tui::symbols::Marker;
use tui::text::{Span, Spans};
use tui::widgets::canvas::{Canvas, Points};
use tui::widgets::{Block, Borders, Paragraph};
use tui::Terminal;

use crate::display::{Display, Panel, Raster, Resolution, Rgb};
use crate::driver::{DriverConfig, EmulatorDriver, HostEvent};
use crate::keypad::{Edge, LogicalKey};
use crate::machine::Machine;
use crate::rom::{self, DirRomSource};

const PANEL_WIDTH: u16 = 28;

const HELP: [&str; 5] = [
    "space  run/pause",
    "enter  step",
    "bksp   reset",
    "up/dn  change rom",
    "esc    quit",
];

#[derive(Debug, Error)]
pub enum HostError {
    #[error("terminal error: {0}")]
    Terminal(#[from] io::Error),
}

#[derive(Debug, Clone)]
pub struct HostConfig {
    /// how often the refresh callback fires
    pub refresh_hz: f64,
    /// where ROM images live, one file per catalog name
    pub rom_dir: PathBuf,
    /// frames a key stays down on terminals that never report releases
    pub legacy_hold_frames: u32,
}

impl Default for HostConfig {
    fn default() -> Self {
        HostConfig {
            refresh_hz: 60.0,
            rom_dir: PathBuf::from("roms"),
            legacy_hold_frames: 6,
        }
    }
}

/// raw mode and the alternate screen for as long as this lives
pub struct TermSession {
    enhanced: bool,
}

impl TermSession {
    pub fn start() -> Result<TermSession, io::Error> {
        terminal::enable_raw_mode()?;
        // from here on an early return drops the session and restores the
        // terminal
        let mut session = TermSession { enhanced: false };
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        if terminal::supports_keyboard_enhancement().unwrap_or(false) {
            execute!(
                stdout,
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
            )?;
            session.enhanced = true;
        } else {
            log::warn!("terminal doesn't report key releases, holding keys for a few frames");
        }
        Ok(session)
    }

    pub fn reports_releases(&self) -> bool {
        self.enhanced
    }
}

impl Drop for TermSession {
    fn drop(&mut self) {
        let mut stdout = io::stdout();
        if self.enhanced {
            if let Err(e) = execute!(stdout, PopKeyboardEnhancementFlags) {
                log::error!("failed to restore keyboard mode: {}", e);
            }
        }
        if let Err(e) = execute!(stdout, LeaveAlternateScreen) {
            log::error!("failed to leave alternate screen: {}", e);
        }
        if let Err(e) = terminal::disable_raw_mode() {
            log::error!("failed to leave raw mode: {}", e);
        }
    }
}

fn colour(rgb: Rgb) -> Color {
    Color::Rgb(rgb.0, rgb.1, rgb.2)
}

/// monochrome display in a terminal, rendered using TUI and crossterm. one
/// terminal cell per machine pixel
pub struct TermDisplay {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    resolution: Resolution,
    pixel_size: usize,
    on: Rgb,
    off: Rgb,
    // reused between frames
    on_coords: Vec<(f64, f64)>,
    off_coords: Vec<(f64, f64)>,
}

impl TermDisplay {
    pub fn new(config: &DriverConfig) -> Result<TermDisplay, io::Error> {
        let backend = CrosstermBackend::new(io::stdout());
        let mut terminal = Terminal::new(backend)?;
        terminal.hide_cursor()?;
        terminal.clear()?;
        let pixels = config.resolution.pixel_count();
        Ok(TermDisplay {
            terminal,
            resolution: config.resolution,
            pixel_size: config.pixel_size.max(1),
            on: config.on_colour,
            off: config.off_colour,
            on_coords: Vec::with_capacity(pixels),
            off_coords: Vec::with_capacity(pixels),
        })
    }
}

/// sample each logical pixel from its top-left device pixel and sort it
/// into the lit or unlit plane, in canvas coordinates (y grows downwards
/// as negative numbers)
fn split_planes(
    frame: &Raster,
    resolution: Resolution,
    pixel_size: usize,
    on: Rgb,
    on_coords: &mut Vec<(f64, f64)>,
    off_coords: &mut Vec<(f64, f64)>,
) {
    on_coords.clear();
    off_coords.clear();
    for y in 0..resolution.height {
        for x in 0..resolution.width {
            let point = (x as f64, -1.0 * y as f64);
            if frame.pixel(x * pixel_size, y * pixel_size) == Some(on) {
                on_coords.push(point);
            } else {
                off_coords.push(point);
            }
        }
    }
}

impl Display for TermDisplay {
    fn present(&mut self, frame: &Raster, panel: &Panel<'_>) -> Result<(), io::Error> {
        split_planes(
            frame,
            self.resolution,
            self.pixel_size,
            self.on,
            &mut self.on_coords,
            &mut self.off_coords,
        );

        let resolution = self.resolution;
        let (on, off) = (colour(self.on), colour(self.off));
        let on_coords = self.on_coords.as_slice();
        let off_coords = self.off_coords.as_slice();
        let lines = panel_lines(panel);

        self.terminal.draw(|f| {
            let area = f.size();
            let screen = Rect::new(
                0,
                0,
                2 + resolution.width as u16,
                2 + resolution.height as u16,
            );
            if screen.intersects(area) {
                let canvas = Canvas::default()
                    .block(
                        Block::default()
                            .title("CHIP-8")
                            .borders(Borders::ALL)
                            .style(Style::default().bg(off)),
                    )
                    .x_bounds(resolution.x_bounds())
                    .y_bounds(resolution.y_bounds())
                    .marker(Marker::Block)
                    .paint(|ctx| {
                        ctx.draw(&Points {
                            coords: off_coords,
                            color: off,
                        });
                        ctx.draw(&Points {
                            coords: on_coords,
                            color: on,
                        });
                    });
                f.render_widget(canvas, screen.intersection(area));
            }

            let side = Rect::new(screen.right() + 1, 0, PANEL_WIDTH, screen.height);
            if side.intersects(area) {
                let status = Paragraph::new(lines)
                    .block(Block::default().title("keypad").borders(Borders::ALL));
                f.render_widget(status, side.intersection(area));
            }
        })?;
        Ok(())
    }
}

fn panel_lines(panel: &Panel<'_>) -> Vec<Spans<'static>> {
    let mut lines = vec![
        Spans::from(format!("rom:   {}", panel.rom.unwrap_or("-"))),
        Spans::from(format!("state: {}", panel.state)),
        Spans::from(""),
    ];
    for row in 0..4u8 {
        let keys: Vec<Span> = (0..4u8)
            .filter_map(|col| LogicalKey::new(row * 4 + col))
            .map(|key| {
                let label = panel.keymap.host_key(key).unwrap_or('?').to_ascii_uppercase();
                let style = if panel.keys.is_held(key) {
                    Style::default().add_modifier(Modifier::REVERSED)
                } else {
                    Style::default()
                };
                Span::styled(format!(" {} ", label), style)
            })
            .collect();
        lines.push(Spans::from(keys));
    }
    lines.push(Spans::from(""));
    lines.extend(HELP.iter().map(|&h| Spans::from(h)));
    lines
}

pub enum Input {
    Event(HostEvent),
    Quit,
}

/// turns crossterm events into driver events
pub struct TermInput {
    reports_releases: bool,
    hold_frames: u32,
    // frames left before a legacy key press is released
    held: HashMap<char, u32>,
    rom: Option<&'static str>,
}

impl TermInput {
    pub fn new(reports_releases: bool, hold_frames: u32, rom: Option<&str>) -> Self {
        TermInput {
            reports_releases,
            hold_frames,
            held: HashMap::new(),
            rom: rom.and_then(|r| rom::ROM_CATALOG.iter().copied().find(|&c| c == r)),
        }
    }

    /// everything for this frame, without blocking on the terminal
    pub fn drain(&mut self) -> Result<Vec<Input>, io::Error> {
        let mut events = Vec::new();
        while event::poll(Duration::from_millis(0))? {
            events.push(event::read()?);
        }
        Ok(self.frame(events))
    }

    /// inputs for one frame: releases due for keys held since earlier
    /// frames, then `events` in order. a legacy press made here stays down
    /// for `hold_frames` refreshes counting this frame's
    pub fn frame(&mut self, events: impl IntoIterator<Item = Event>) -> Vec<Input> {
        let mut inputs = self.expire();
        inputs.extend(events.into_iter().filter_map(|e| self.translate(e)));
        inputs
    }

    /// count down held keys on terminals that never report releases
    fn expire(&mut self) -> Vec<Input> {
        let mut released = Vec::new();
        self.held.retain(|&code, frames| {
            *frames = frames.saturating_sub(1);
            if *frames == 0 {
                released.push(code);
                false
            } else {
                true
            }
        });
        released.sort_unstable();
        released
            .into_iter()
            .map(|code| {
                Input::Event(HostEvent::Key {
                    code,
                    edge: Edge::Released,
                })
            })
            .collect()
    }

    pub fn translate(&mut self, event: Event) -> Option<Input> {
        match event {
            Event::Key(key) => self.key(key),
            _ => None,
        }
    }

    fn key(&mut self, key: KeyEvent) -> Option<Input> {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return Some(Input::Quit);
        }
        if let KeyCode::Char(c) = key.code {
            if c != ' ' {
                return self.hex_key(c.to_ascii_lowercase(), key.kind);
            }
        }
        if key.kind != KeyEventKind::Press {
            return None;
        }
        let event = match key.code {
            KeyCode::Esc => return Some(Input::Quit),
            KeyCode::Char(' ') => HostEvent::PlayPause,
            KeyCode::Enter => HostEvent::Step,
            KeyCode::Backspace => HostEvent::Reset,
            KeyCode::Up => self.cycle_rom(-1),
            KeyCode::Down => self.cycle_rom(1),
            _ => return None,
        };
        Some(Input::Event(event))
    }

    fn hex_key(&mut self, code: char, kind: KeyEventKind) -> Option<Input> {
        let edge = match kind {
            KeyEventKind::Press | KeyEventKind::Repeat => Edge::Pressed,
            KeyEventKind::Release => Edge::Released,
        };
        if !self.reports_releases {
            // already down: keep it down a little longer, no new edge
            if self.held.insert(code, self.hold_frames.max(1)).is_some() {
                return None;
            }
        }
        Some(Input::Event(HostEvent::Key { code, edge }))
    }

    fn cycle_rom(&mut self, step: isize) -> HostEvent {
        let next = rom::cycle(self.rom, step);
        self.rom = Some(next);
        HostEvent::SelectRom(next.to_owned())
    }
}

/// drive `machine` in this terminal until the user quits
pub fn run<M: Machine>(machine: M, config: DriverConfig, host: HostConfig) -> Result<(), HostError> {
    let session = TermSession::start()?;
    let display = TermDisplay::new(&config)?;
    let mut input = TermInput::new(
        session.reports_releases(),
        host.legacy_hold_frames,
        config.default_rom.as_deref(),
    );
    let source = DirRomSource::new(&host.rom_dir).with_max_len(config.max_rom_len);
    let mut driver = EmulatorDriver::new(machine, display, config);
    let frame = Duration::from_secs_f64(1.0 / host.refresh_hz.max(1.0));

    if let Err(e) = driver.boot() {
        log::error!("boot: {}", e);
    }

    'host: loop {
        let started = Instant::now();

        if let Err(e) = driver.complete_fetches(&source) {
            log::error!("{}", e);
        }

        for next in input.drain()? {
            match next {
                Input::Quit => break 'host,
                Input::Event(event) => {
                    if let Err(e) = driver.dispatch(event) {
                        log::error!("{}", e);
                    }
                }
            }
        }

        if driver.wants_refresh() {
            if let Err(e) = driver.dispatch(HostEvent::Refresh) {
                log::error!("{}", e);
            }
        }

        // clamp to the refresh rate
        if let Some(rest) = frame.checked_sub(started.elapsed()) {
            spin_sleep::sleep(rest);
        }
    }

    drop(driver);
    drop(session);
    Ok(())
}
