use std::collections::HashMap;
use std::fmt;

/// how many input lines the machine has
pub const KEY_COUNT: usize = 16;

/// map of characters read from the keyboard to the chip8 hex keypad, one
/// row of four keys per keyboard row from '1' down to 'v'
///
///  1 2 3 4      0 1 2 3
///  q w e r  =>  4 5 6 7
///  a s d f      8 9 a b
///  z x c v      c d e f
pub const QWERTY_HEX_KEYMAP: [(char, u8); KEY_COUNT] = [
    ('1', 0x00),
    ('2', 0x01),
    ('3', 0x02),
    ('4', 0x03),
    ('q', 0x04),
    ('w', 0x05),
    ('e', 0x06),
    ('r', 0x07),
    ('a', 0x08),
    ('s', 0x09),
    ('d', 0x0a),
    ('f', 0x0b),
    ('z', 0x0c),
    ('x', 0x0d),
    ('c', 0x0e),
    ('v', 0x0f),
];

/// one of the machine's 16 input lines, 0x0-0xf
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicalKey(u8);

impl LogicalKey {
    pub fn new(line: u8) -> Option<Self> {
        if (line as usize) < KEY_COUNT {
            Some(LogicalKey(line))
        } else {
            None
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// every key, in line order
    pub fn all() -> impl Iterator<Item = LogicalKey> {
        (0..KEY_COUNT as u8).map(LogicalKey)
    }
}

impl fmt::Display for LogicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Pressed,
    Released,
}

/// transient; produced per host input callback and consumed immediately
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: LogicalKey,
    pub edge: Edge,
}

/// fixed host key -> logical key table. each host key maps to at most one
/// logical key
#[derive(Debug, Clone)]
pub struct Keymap {
    keys: HashMap<char, LogicalKey>,
}

impl Keymap {
    /// build a keymap from (host key, line) pairs; lines outside 0x0-0xf
    /// are dropped
    pub fn from_pairs(pairs: &[(char, u8)]) -> Self {
        let keys = pairs
            .iter()
            .filter_map(|&(c, line)| LogicalKey::new(line).map(|k| (c.to_ascii_lowercase(), k)))
            .collect();
        Keymap { keys }
    }

    pub fn translate(&self, host_key: char) -> Option<LogicalKey> {
        self.keys.get(&host_key.to_ascii_lowercase()).copied()
    }

    /// the host key bound to a logical key, used for labelling the keypad
    pub fn host_key(&self, key: LogicalKey) -> Option<char> {
        self.keys
            .iter()
            .find_map(|(&c, &k)| if k == key { Some(c) } else { None })
    }

    /// translate a host edge into a machine key event; unmapped keys are
    /// not events at all
    pub fn event(&self, host_key: char, edge: Edge) -> Option<KeyEvent> {
        self.translate(host_key).map(|key| KeyEvent { key, edge })
    }
}

impl Default for Keymap {
    fn default() -> Self {
        Keymap::from_pairs(&QWERTY_HEX_KEYMAP)
    }
}

/// mirror of which keys the host has seen held down. presentation only:
/// the machine's own key state is the source of truth
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyIndicator {
    held: [bool; KEY_COUNT],
}

impl KeyIndicator {
    pub fn apply(&mut self, event: KeyEvent) {
        self.held[event.key.index()] = event.edge == Edge::Pressed;
    }

    pub fn is_held(&self, key: LogicalKey) -> bool {
        self.held[key.index()]
    }
}
