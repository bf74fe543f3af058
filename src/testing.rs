//! Test doubles for the driver's collaborators. The machine and display
//! share one call log so tests can check what happened in which order.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::rc::Rc;

use crate::display::{Display, Panel, Raster, DISPLAY_HEIGHT, DISPLAY_WIDTH};
use crate::keypad::{LogicalKey, KEY_COUNT};
use crate::machine::Machine;
use crate::rom::{RomError, RomSource};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Reset,
    LoadRom(Vec<u8>),
    Tick,
    Press(u8),
    Release(u8),
    Present,
}

pub type CallLog = Rc<RefCell<Vec<Call>>>;

/// lights one more pixel per tick so rendered frames change
pub struct RecordingMachine {
    log: CallLog,
    frame: Vec<u8>,
    keys: [bool; KEY_COUNT],
    ticks: usize,
}

impl RecordingMachine {
    pub fn new(log: &CallLog) -> Self {
        RecordingMachine {
            log: Rc::clone(log),
            frame: vec![0; DISPLAY_WIDTH * DISPLAY_HEIGHT],
            keys: [false; KEY_COUNT],
            ticks: 0,
        }
    }

    pub fn is_held(&self, line: u8) -> bool {
        self.keys[line as usize]
    }

    /// pretend the machine's memory layout changed underneath us
    pub fn truncate_frame(&mut self, len: usize) {
        self.frame.truncate(len);
    }
}

impl Machine for RecordingMachine {
    fn reset(&mut self) {
        self.frame.iter_mut().for_each(|px| *px = 0);
        self.keys = [false; KEY_COUNT];
        self.ticks = 0;
        self.log.borrow_mut().push(Call::Reset);
    }

    fn load_rom(&mut self, rom: &[u8]) {
        self.log.borrow_mut().push(Call::LoadRom(rom.to_vec()));
    }

    fn tick(&mut self) {
        if !self.frame.is_empty() {
            let idx = self.ticks % self.frame.len();
            self.frame[idx] = 1;
        }
        self.ticks += 1;
        self.log.borrow_mut().push(Call::Tick);
    }

    fn press_key(&mut self, key: LogicalKey) {
        self.keys[key.index()] = true;
        self.log.borrow_mut().push(Call::Press(key.value()));
    }

    fn release_key(&mut self, key: LogicalKey) {
        self.keys[key.index()] = false;
        self.log.borrow_mut().push(Call::Release(key.value()));
    }

    fn frame_buffer(&self) -> &[u8] {
        &self.frame
    }
}

pub struct RecordingDisplay {
    log: CallLog,
    /// keys lit on the most recent present
    pub held: Vec<u8>,
}

impl RecordingDisplay {
    pub fn new(log: &CallLog) -> Self {
        RecordingDisplay {
            log: Rc::clone(log),
            held: Vec::new(),
        }
    }
}

impl Display for RecordingDisplay {
    fn present(&mut self, _frame: &Raster, panel: &Panel<'_>) -> Result<(), io::Error> {
        self.held = LogicalKey::all()
            .filter(|&k| panel.keys.is_held(k))
            .map(LogicalKey::value)
            .collect();
        self.log.borrow_mut().push(Call::Present);
        Ok(())
    }
}

pub struct MapRomSource {
    roms: HashMap<String, Vec<u8>>,
}

impl MapRomSource {
    pub fn new(roms: &[(&str, &[u8])]) -> Self {
        MapRomSource {
            roms: roms
                .iter()
                .map(|&(name, bytes)| (name.to_owned(), bytes.to_vec()))
                .collect(),
        }
    }
}

impl RomSource for MapRomSource {
    fn fetch(&self, name: &str) -> Result<Vec<u8>, RomError> {
        self.roms.get(name).cloned().ok_or_else(|| RomError::NotFound {
            name: name.to_owned(),
        })
    }
}
