use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use thiserror::Error;

/// ROMs offered to the user, fetched by name from the asset directory
pub const ROM_CATALOG: [&str; 23] = [
    "PONG", "15PUZZLE", "BLITZ", "CONNECT4", "HIDDEN", "INVADERS", "MAZE", "MISSILE", "SYZYGY",
    "TETRIS", "UFO", "VERS", "BLINKY", "BRIX", "GUESS", "IBM", "KALEID", "MERLIN", "PUZZLE",
    "TANK", "TICTAC", "VBRIX", "WIPEOFF",
];

pub const DEFAULT_ROM: &str = "PONG";

/// where CHIP-8 programs get loaded, and how much room they have
const CHIP8_PROGRAM_ADDR: usize = 0x0200;
const CHIP8_RAM_SIZE_BYTES: usize = 4096;
pub const MAX_ROM_LEN: usize = CHIP8_RAM_SIZE_BYTES - CHIP8_PROGRAM_ADDR;

#[derive(Debug, Error)]
pub enum RomError {
    #[error("ROM {name} not found")]
    NotFound { name: String },

    #[error("failed to read ROM {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("ROM {name} is too large ({size} bytes), max size is {max_size} bytes")]
    TooLarge {
        name: String,
        size: usize,
        max_size: usize,
    },
}

pub fn in_catalog(name: &str) -> bool {
    ROM_CATALOG.contains(&name)
}

/// catalog entry `step` places away from `name`, wrapping at both ends.
/// names outside the catalog start from the first entry
pub fn cycle(name: Option<&str>, step: isize) -> &'static str {
    let len = ROM_CATALOG.len() as isize;
    match name.and_then(|n| ROM_CATALOG.iter().position(|&r| r == n)) {
        Some(i) => ROM_CATALOG[(i as isize + step).rem_euclid(len) as usize],
        None => ROM_CATALOG[0],
    }
}

/// identifies one fetch; only the newest ticket's completion is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RomTicket(pub(crate) u64);

/// asks the host to fetch a ROM and report back with the same ticket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub ticket: RomTicket,
    pub name: String,
}

/// somewhere named ROM images can be fetched from
pub trait RomSource {
    fn fetch(&self, name: &str) -> Result<Vec<u8>, RomError>;
}

/// static asset directory holding one file per ROM, named as in the catalog
#[derive(Debug, Clone)]
pub struct DirRomSource {
    root: PathBuf,
    max_len: usize,
}

impl DirRomSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirRomSource {
            root: root.into(),
            max_len: MAX_ROM_LEN,
        }
    }

    /// refuse files longer than `max_len` bytes without reading them whole
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }
}

impl RomSource for DirRomSource {
    fn fetch(&self, name: &str) -> Result<Vec<u8>, RomError> {
        let path = self.root.join(name);
        let f = File::open(&path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => RomError::NotFound {
                name: name.to_owned(),
            },
            _ => RomError::Io {
                name: name.to_owned(),
                source,
            },
        })?;
        // one byte past the limit is enough to tell it's too big
        let mut buf = Vec::new();
        f.take((self.max_len as u64).saturating_add(1))
            .read_to_end(&mut buf)
            .map_err(|source| RomError::Io {
                name: name.to_owned(),
                source,
            })?;
        if buf.len() > self.max_len {
            return Err(RomError::TooLarge {
                name: name.to_owned(),
                size: buf.len(),
                max_size: self.max_len,
            });
        }
        log::info!("fetched {} ({} bytes) from {}", name, buf.len(), path.display());
        Ok(buf)
    }
}
