use crate::keypad::LogicalKey;

/// The emulation core the driver steers. It owns CPU state, memory, timers
/// and the frame buffer; the driver only ever asks it to do things and reads
/// the frame buffer back between steps.
///
/// Construction is up to the implementor.
pub trait Machine {
    /// clear registers, memory and the frame buffer
    fn reset(&mut self);

    /// copy a program into memory at the program start address
    fn load_rom(&mut self, rom: &[u8]);

    /// advance by one logical step
    fn tick(&mut self);

    /// pressing an already pressed key must be a no-op
    fn press_key(&mut self, key: LogicalKey);

    fn release_key(&mut self, key: LogicalKey);

    /// one byte per pixel, row major, 0 = off and 1 = on. should be exactly
    /// width * height long; the renderer checks this every frame
    fn frame_buffer(&self) -> &[u8];
}
