use std::collections::VecDeque;
use std::io;
use thiserror::Error;

use crate::control::{Action, Control, RunController, RunState};
use crate::display::{
    Display, FrameRenderer, Panel, Raster, RenderError, Resolution, Rgb, PIXEL_OFF_COLOUR,
    PIXEL_ON_COLOUR, PIXEL_SIZE,
};
use crate::keypad::{Edge, KeyIndicator, Keymap};
use crate::machine::Machine;
use crate::rom::{self, FetchRequest, RomError, RomSource, RomTicket};

#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Rom(#[from] RomError),

    #[error("failed to render frame: {0}")]
    Render(#[from] RenderError),

    #[error("failed to present frame: {0}")]
    Display(#[from] io::Error),

    #[error("{0} is not in the ROM catalog")]
    UnknownRom(String),
}

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub resolution: Resolution,
    pub pixel_size: usize,
    pub on_colour: Rgb,
    pub off_colour: Rgb,
    pub keymap: Keymap,
    /// fetched on boot; `None` boots with an empty machine
    pub default_rom: Option<String>,
    /// redraw straight after a reset instead of leaving the old frame up
    pub redraw_on_reset: bool,
    pub max_rom_len: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            resolution: Resolution::default(),
            pixel_size: PIXEL_SIZE,
            on_colour: PIXEL_ON_COLOUR,
            off_colour: PIXEL_OFF_COLOUR,
            keymap: Keymap::default(),
            default_rom: Some(rom::DEFAULT_ROM.to_owned()),
            redraw_on_reset: true,
            max_rom_len: rom::MAX_ROM_LEN,
        }
    }
}

/// everything the host can tell the driver
#[derive(Debug)]
pub enum HostEvent {
    Key { code: char, edge: Edge },
    Refresh,
    PlayPause,
    Step,
    Reset,
    SelectRom(String),
    RomFetched {
        ticket: RomTicket,
        result: Result<Vec<u8>, RomError>,
    },
}

/// Owns the machine and everything needed to present it. Hosts feed it
/// `HostEvent`s one at a time; a step and the render that follows it always
/// happen inside a single `dispatch`, so input can never land mid-step.
pub struct EmulatorDriver<M: Machine, D: Display> {
    machine: M,
    display: D,
    controller: RunController,
    keymap: Keymap,
    indicator: KeyIndicator,
    renderer: FrameRenderer,
    raster: Raster,
    max_rom_len: usize,
    default_rom: Option<String>,
    selected: Option<String>,
    next_ticket: u64,
    awaiting: Option<RomTicket>,
    outbox: VecDeque<FetchRequest>,
}

impl<M: Machine, D: Display> EmulatorDriver<M, D> {
    pub fn new(machine: M, display: D, config: DriverConfig) -> Self {
        let renderer = FrameRenderer::new(
            config.resolution,
            config.pixel_size,
            config.on_colour,
            config.off_colour,
        );
        let raster = renderer.surface();
        EmulatorDriver {
            machine,
            display,
            controller: RunController::new(config.redraw_on_reset),
            keymap: config.keymap,
            indicator: KeyIndicator::default(),
            renderer,
            raster,
            max_rom_len: config.max_rom_len,
            default_rom: config.default_rom,
            selected: None,
            next_ticket: 0,
            awaiting: None,
            outbox: VecDeque::new(),
        }
    }

    /// ask for the default ROM then draw the initial, empty frame. a default
    /// outside the catalog is not fetched, but the frame is still drawn
    pub fn boot(&mut self) -> Result<(), DriverError> {
        let mut unknown = None;
        match self.default_rom.clone() {
            Some(name) if rom::in_catalog(&name) => {
                self.selected = Some(name);
                self.request_fetch();
            }
            Some(name) if !name.is_empty() => unknown = Some(name),
            _ => {}
        }
        self.render()?;
        match unknown {
            Some(name) => Err(DriverError::UnknownRom(name)),
            None => Ok(()),
        }
    }

    pub fn dispatch(&mut self, event: HostEvent) -> Result<(), DriverError> {
        match event {
            HostEvent::Key { code, edge } => self.key(code, edge),
            HostEvent::Refresh => self.apply(Control::RefreshFired, None),
            HostEvent::PlayPause => self.apply(Control::PlayPauseToggled, None),
            HostEvent::Step => self.apply(Control::SingleStepRequested, None),
            HostEvent::Reset => self.apply(Control::ResetRequested, None),
            HostEvent::SelectRom(name) => self.select_rom(name),
            HostEvent::RomFetched { ticket, result } => self.rom_fetched(ticket, result),
        }
    }

    /// next ROM the host should go and fetch
    pub fn next_fetch(&mut self) -> Option<FetchRequest> {
        self.outbox.pop_front()
    }

    /// fetch every outstanding request from `source` and feed the results
    /// back in. returns the first failure; later requests are still served
    pub fn complete_fetches<S: RomSource + ?Sized>(
        &mut self,
        source: &S,
    ) -> Result<(), DriverError> {
        let mut outcome = Ok(());
        while let Some(req) = self.next_fetch() {
            let result = source.fetch(&req.name);
            let done = self.dispatch(HostEvent::RomFetched {
                ticket: req.ticket,
                result,
            });
            if outcome.is_ok() {
                outcome = done;
            }
        }
        outcome
    }

    pub fn wants_refresh(&self) -> bool {
        self.controller.wants_refresh()
    }

    pub fn run_state(&self) -> RunState {
        self.controller.state()
    }

    pub fn selected_rom(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    pub fn machine(&self) -> &M {
        &self.machine
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    fn key(&mut self, code: char, edge: Edge) -> Result<(), DriverError> {
        let event = match self.keymap.event(code, edge) {
            Some(event) => event,
            None => {
                log::trace!("ignoring unmapped key {:?}", code);
                return Ok(());
            }
        };
        match event.edge {
            Edge::Pressed => self.machine.press_key(event.key),
            Edge::Released => self.machine.release_key(event.key),
        }
        self.indicator.apply(event);
        self.present()
    }

    fn select_rom(&mut self, name: String) -> Result<(), DriverError> {
        if name.is_empty() {
            return Ok(());
        }
        if !rom::in_catalog(&name) {
            return Err(DriverError::UnknownRom(name));
        }
        log::info!("selected {}", name);
        self.selected = Some(name);
        self.apply(Control::RomSelected, None)
    }

    fn rom_fetched(
        &mut self,
        ticket: RomTicket,
        result: Result<Vec<u8>, RomError>,
    ) -> Result<(), DriverError> {
        if self.awaiting != Some(ticket) {
            log::warn!("dropping ROM fetch {:?}, superseded", ticket);
            return Ok(());
        }
        self.awaiting = None;

        let rom = result?;
        if rom.len() > self.max_rom_len {
            return Err(RomError::TooLarge {
                name: self.selected.clone().unwrap_or_default(),
                size: rom.len(),
                max_size: self.max_rom_len,
            }
            .into());
        }
        self.apply(Control::RomLoaded, Some(rom.as_slice()))
    }

    /// run the controller's actions in order. a failed render doesn't stop
    /// the remaining actions; the first failure is reported
    fn apply(&mut self, control: Control, rom: Option<&[u8]>) -> Result<(), DriverError> {
        let mut outcome = Ok(());
        for action in self.controller.on(control) {
            let done = match action {
                Action::Step => {
                    self.machine.tick();
                    self.render()
                }
                Action::Reset => {
                    self.machine.reset();
                    Ok(())
                }
                Action::Render => self.render(),
                Action::FetchRom => {
                    self.request_fetch();
                    Ok(())
                }
                Action::LoadRom => {
                    if let Some(rom) = rom {
                        log::info!("loading {} bytes", rom.len());
                        self.machine.load_rom(rom);
                    }
                    Ok(())
                }
            };
            if let Err(e) = done {
                log::error!("{:?} failed: {}", action, e);
                if outcome.is_ok() {
                    outcome = Err(e);
                }
            }
        }
        outcome
    }

    fn request_fetch(&mut self) {
        if let Some(name) = &self.selected {
            let ticket = RomTicket(self.next_ticket);
            self.next_ticket += 1;
            self.awaiting = Some(ticket);
            self.outbox.push_back(FetchRequest {
                ticket,
                name: name.clone(),
            });
        }
    }

    /// read the frame buffer and put it on screen. a bad frame buffer leaves
    /// the previous frame showing
    fn render(&mut self) -> Result<(), DriverError> {
        self.renderer
            .render(self.machine.frame_buffer(), &mut self.raster)?;
        self.present()
    }

    fn present(&mut self) -> Result<(), DriverError> {
        let panel = Panel {
            state: self.controller.state(),
            rom: self.selected.as_deref(),
            keys: &self.indicator,
            keymap: &self.keymap,
        };
        self.display.present(&self.raster, &panel)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::DummyDisplay;
    use crate::testing::{Call, CallLog, MapRomSource, RecordingDisplay, RecordingMachine};

    type TestDriver = EmulatorDriver<RecordingMachine, RecordingDisplay>;

    fn driver_with(config: DriverConfig) -> (TestDriver, CallLog) {
        let log = CallLog::default();
        let driver = EmulatorDriver::new(
            RecordingMachine::new(&log),
            RecordingDisplay::new(&log),
            config,
        );
        (driver, log)
    }

    fn driver() -> (TestDriver, CallLog) {
        driver_with(DriverConfig::default())
    }

    fn roms() -> MapRomSource {
        MapRomSource::new(&[
            ("PONG", &[0x6a, 0x02][..]),
            ("TETRIS", &[0xa2, 0xb4, 0x23][..]),
        ])
    }

    fn count(log: &CallLog, call: &Call) -> usize {
        log.borrow().iter().filter(|&c| c == call).count()
    }

    #[test]
    fn test_boot_requests_default_rom_and_draws() -> Result<(), DriverError> {
        let (mut d, log) = driver();
        d.boot()?;
        assert_eq!(*log.borrow(), vec![Call::Present]);
        let req = d.next_fetch().expect("default ROM requested");
        assert_eq!(req.name, "PONG");
        assert_eq!(d.next_fetch(), None);
        assert_eq!(d.run_state(), RunState::Stopped);
        assert!(!d.wants_refresh());

        d.dispatch(HostEvent::RomFetched {
            ticket: req.ticket,
            result: Ok(vec![1, 2, 3]),
        })?;
        assert_eq!(log.borrow().last(), Some(&Call::LoadRom(vec![1, 2, 3])));
        assert_eq!(count(&log, &Call::Reset), 0);
        Ok(())
    }

    #[test]
    fn test_boot_without_default_rom() -> Result<(), DriverError> {
        let (mut d, log) = driver_with(DriverConfig {
            default_rom: None,
            ..DriverConfig::default()
        });
        d.boot()?;
        assert_eq!(d.next_fetch(), None);
        assert_eq!(*log.borrow(), vec![Call::Present]);
        Ok(())
    }

    #[test]
    fn test_boot_with_default_rom_outside_catalog() {
        let (mut d, log) = driver_with(DriverConfig {
            default_rom: Some("ELITE".to_owned()),
            ..DriverConfig::default()
        });
        match d.boot() {
            Err(DriverError::UnknownRom(name)) => assert_eq!(name, "ELITE"),
            other => panic!("expected UnknownRom, got {:?}", other),
        }
        assert_eq!(d.next_fetch(), None);
        assert_eq!(d.selected_rom(), None);
        // the empty frame is drawn regardless
        assert_eq!(*log.borrow(), vec![Call::Present]);
        assert_eq!(d.run_state(), RunState::Stopped);
    }

    #[test]
    fn test_three_single_steps() -> Result<(), DriverError> {
        let (mut d, log) = driver();
        for _ in 0..3 {
            d.dispatch(HostEvent::Step)?;
            assert_eq!(d.run_state(), RunState::Stopped);
            assert!(!d.wants_refresh());
        }
        assert_eq!(count(&log, &Call::Tick), 3);
        assert_eq!(count(&log, &Call::Present), 3);
        Ok(())
    }

    #[test]
    fn test_pause_after_third_refresh() -> Result<(), DriverError> {
        let (mut d, log) = driver();
        d.dispatch(HostEvent::PlayPause)?;
        assert!(d.wants_refresh());
        for n in 1..=5 {
            d.dispatch(HostEvent::Refresh)?;
            if n == 3 {
                d.dispatch(HostEvent::PlayPause)?;
            }
        }
        assert_eq!(count(&log, &Call::Tick), 3);
        assert_eq!(count(&log, &Call::Present), 3);
        assert_eq!(d.run_state(), RunState::Stopped);
        assert!(!d.wants_refresh());
        Ok(())
    }

    #[test]
    fn test_step_ignored_while_running() -> Result<(), DriverError> {
        let (mut d, log) = driver();
        d.dispatch(HostEvent::PlayPause)?;
        d.dispatch(HostEvent::Step)?;
        assert_eq!(count(&log, &Call::Tick), 0);
        assert_eq!(d.run_state(), RunState::Running);
        Ok(())
    }

    #[test]
    fn test_rom_switch_stops_running() -> Result<(), DriverError> {
        let (mut d, log) = driver();
        d.dispatch(HostEvent::PlayPause)?;
        d.dispatch(HostEvent::Refresh)?;
        d.dispatch(HostEvent::SelectRom("TETRIS".to_owned()))?;
        assert_eq!(d.run_state(), RunState::Stopped);

        d.complete_fetches(&roms())?;
        for _ in 0..4 {
            d.dispatch(HostEvent::Refresh)?;
        }
        assert_eq!(count(&log, &Call::Tick), 1);

        d.dispatch(HostEvent::PlayPause)?;
        d.dispatch(HostEvent::Refresh)?;
        assert_eq!(count(&log, &Call::Tick), 2);
        Ok(())
    }

    #[test]
    fn test_pong_then_tetris() -> Result<(), DriverError> {
        let (mut d, log) = driver();
        let source = roms();
        d.dispatch(HostEvent::SelectRom("PONG".to_owned()))?;
        d.complete_fetches(&source)?;
        d.dispatch(HostEvent::SelectRom("TETRIS".to_owned()))?;
        d.complete_fetches(&source)?;

        assert_eq!(
            *log.borrow(),
            vec![
                Call::Reset,
                Call::Present,
                Call::LoadRom(vec![0x6a, 0x02]),
                Call::Reset,
                Call::Present,
                Call::LoadRom(vec![0xa2, 0xb4, 0x23]),
            ]
        );
        assert_eq!(d.selected_rom(), Some("TETRIS"));
        Ok(())
    }

    #[test]
    fn test_rom_switch_clears_the_screen() -> Result<(), DriverError> {
        let (mut d, _log) = driver();
        d.dispatch(HostEvent::Step)?;
        assert_ne!(d.raster(), &FrameRenderer::default().surface());
        d.dispatch(HostEvent::SelectRom("PONG".to_owned()))?;
        assert_eq!(d.raster(), &FrameRenderer::default().surface());
        Ok(())
    }

    #[test]
    fn test_superseded_fetch_is_dropped() -> Result<(), DriverError> {
        let (mut d, log) = driver();
        d.dispatch(HostEvent::SelectRom("PONG".to_owned()))?;
        d.dispatch(HostEvent::SelectRom("TETRIS".to_owned()))?;
        d.complete_fetches(&roms())?;

        let loads: Vec<Call> = log
            .borrow()
            .iter()
            .filter(|c| matches!(c, Call::LoadRom(_)))
            .cloned()
            .collect();
        assert_eq!(loads, vec![Call::LoadRom(vec![0xa2, 0xb4, 0x23])]);
        Ok(())
    }

    #[test]
    fn test_failed_fetch_leaves_machine_alone() -> Result<(), DriverError> {
        let (mut d, log) = driver();
        d.dispatch(HostEvent::SelectRom("UFO".to_owned()))?;
        let calls_before = log.borrow().len();

        match d.complete_fetches(&roms()) {
            Err(DriverError::Rom(RomError::NotFound { name })) => assert_eq!(name, "UFO"),
            other => panic!("expected NotFound, got {:?}", other),
        }
        assert_eq!(log.borrow().len(), calls_before);

        // still usable afterwards
        d.dispatch(HostEvent::Step)?;
        assert_eq!(count(&log, &Call::Tick), 1);
        Ok(())
    }

    #[test]
    fn test_oversized_rom_rejected() {
        let (mut d, log) = driver_with(DriverConfig {
            max_rom_len: 2,
            ..DriverConfig::default()
        });
        d.dispatch(HostEvent::SelectRom("TETRIS".to_owned())).unwrap();
        match d.complete_fetches(&roms()) {
            Err(DriverError::Rom(RomError::TooLarge { size, max_size, .. })) => {
                assert_eq!((size, max_size), (3, 2));
            }
            other => panic!("expected TooLarge, got {:?}", other),
        }
        assert!(!log.borrow().iter().any(|c| matches!(c, Call::LoadRom(_))));
    }

    #[test]
    fn test_unknown_and_empty_rom_names() {
        let (mut d, log) = driver();
        d.dispatch(HostEvent::PlayPause).unwrap();
        d.dispatch(HostEvent::SelectRom(String::new())).unwrap();
        assert!(matches!(
            d.dispatch(HostEvent::SelectRom("ELITE".to_owned())),
            Err(DriverError::UnknownRom(_))
        ));
        assert!(log.borrow().is_empty());
        assert_eq!(d.run_state(), RunState::Running);
        assert_eq!(d.next_fetch(), None);
    }

    #[test]
    fn test_unmapped_keys_do_nothing() -> Result<(), DriverError> {
        let (mut d, log) = driver();
        for code in ['p', 'o', ' ', '9', '\n'] {
            d.dispatch(HostEvent::Key {
                code,
                edge: Edge::Pressed,
            })?;
            d.dispatch(HostEvent::Key {
                code,
                edge: Edge::Released,
            })?;
        }
        assert!(log.borrow().is_empty());
        Ok(())
    }

    #[test]
    fn test_repeated_press_never_releases() -> Result<(), DriverError> {
        let (mut d, log) = driver();
        d.dispatch(HostEvent::Key { code: 'w', edge: Edge::Pressed })?;
        d.dispatch(HostEvent::Key { code: 'w', edge: Edge::Pressed })?;
        assert_eq!(count(&log, &Call::Press(0x5)), 2);
        assert_eq!(count(&log, &Call::Release(0x5)), 0);
        assert!(d.machine().is_held(0x5));

        d.dispatch(HostEvent::Key { code: 'w', edge: Edge::Released })?;
        assert_eq!(count(&log, &Call::Release(0x5)), 1);
        assert!(!d.machine().is_held(0x5));
        Ok(())
    }

    #[test]
    fn test_key_indicator_tracks_edges() -> Result<(), DriverError> {
        let (mut d, _log) = driver();
        d.dispatch(HostEvent::Key { code: 'v', edge: Edge::Pressed })?;
        assert_eq!(d.display().held, vec![0xf]);
        d.dispatch(HostEvent::Key { code: 'v', edge: Edge::Released })?;
        assert!(d.display().held.is_empty());
        Ok(())
    }

    #[test]
    fn test_keys_reach_headless_machine() -> Result<(), DriverError> {
        let log = CallLog::default();
        let mut d = EmulatorDriver::new(
            RecordingMachine::new(&log),
            DummyDisplay,
            DriverConfig::default(),
        );
        d.dispatch(HostEvent::Key { code: '1', edge: Edge::Pressed })?;
        assert_eq!(*log.borrow(), vec![Call::Press(0x0)]);
        assert!(d.machine().is_held(0x0));
        Ok(())
    }

    #[test]
    fn test_reset_redraws_when_enabled() -> Result<(), DriverError> {
        let (mut d, log) = driver();
        d.dispatch(HostEvent::Step)?;
        log.borrow_mut().clear();
        d.dispatch(HostEvent::Reset)?;
        assert_eq!(*log.borrow(), vec![Call::Reset, Call::Present]);
        assert_eq!(d.raster(), &FrameRenderer::default().surface());
        assert_eq!(d.run_state(), RunState::Stopped);
        Ok(())
    }

    #[test]
    fn test_reset_leaves_stale_frame_when_disabled() -> Result<(), DriverError> {
        let (mut d, log) = driver_with(DriverConfig {
            redraw_on_reset: false,
            ..DriverConfig::default()
        });
        d.dispatch(HostEvent::Step)?;
        let stale = d.raster().clone();
        log.borrow_mut().clear();
        d.dispatch(HostEvent::Reset)?;
        assert_eq!(*log.borrow(), vec![Call::Reset]);
        assert_eq!(d.raster(), &stale);
        Ok(())
    }

    #[test]
    fn test_reset_keeps_running() -> Result<(), DriverError> {
        let (mut d, _log) = driver();
        d.dispatch(HostEvent::PlayPause)?;
        d.dispatch(HostEvent::Reset)?;
        assert_eq!(d.run_state(), RunState::Running);
        assert!(d.wants_refresh());
        Ok(())
    }

    #[test]
    fn test_bad_frame_buffer_keeps_previous_frame() -> Result<(), DriverError> {
        let (mut d, log) = driver();
        d.dispatch(HostEvent::Step)?;
        let good = d.raster().clone();

        let log_len = log.borrow().len();
        d.machine_mut_for_test().truncate_frame(100);
        match d.dispatch(HostEvent::Step) {
            Err(DriverError::Render(RenderError::FrameSize { expected, actual })) => {
                assert_eq!((expected, actual), (2048, 100));
            }
            other => panic!("expected FrameSize, got {:?}", other),
        }
        assert_eq!(d.raster(), &good);
        // ticked, but nothing presented
        assert_eq!(log.borrow()[log_len..], [Call::Tick]);
        Ok(())
    }

    impl<M: Machine, D: Display> EmulatorDriver<M, D> {
        fn machine_mut_for_test(&mut self) -> &mut M {
            &mut self.machine
        }
    }
}
