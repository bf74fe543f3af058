use std::io;
use thiserror::Error;

use crate::control::RunState;
use crate::keypad::{KeyIndicator, Keymap};

pub const DISPLAY_WIDTH: usize = 64;
pub const DISPLAY_HEIGHT: usize = 32;
pub const PIXEL_SIZE: usize = 8;
pub const PIXEL_ON_COLOUR: Rgb = Rgb(0xff, 0xff, 0xff);
pub const PIXEL_OFF_COLOUR: Rgb = Rgb(0x00, 0x00, 0x00);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("frame buffer is {actual} bytes, expected {expected}")]
    FrameSize { expected: usize, actual: usize },
}

/// logical size of the machine's display, in machine pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: usize,
    pub height: usize,
}

impl Resolution {
    pub const fn new(width: usize, height: usize) -> Self {
        Resolution { width, height }
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    pub fn x_bounds(&self) -> [f64; 2] {
        [0.0, (self.width - 1) as f64]
    }

    pub fn y_bounds(&self) -> [f64; 2] {
        [-1.0 * (self.height - 1) as f64, 0.0]
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Resolution::new(DISPLAY_WIDTH, DISPLAY_HEIGHT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb(pub u8, pub u8, pub u8);

/// anything the renderer can paint squares onto
pub trait Surface {
    /// fill the square with top-left corner (x, y) in device pixels
    fn fill_square(&mut self, x: usize, y: usize, side: usize, colour: Rgb);
}

/// device-pixel surface. allocated once and painted over on every frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    width: usize,
    height: usize,
    pixels: Vec<Rgb>,
}

impl Raster {
    pub fn new(width: usize, height: usize, fill: Rgb) -> Self {
        Raster {
            width,
            height,
            pixels: vec![fill; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<Rgb> {
        if x < self.width && y < self.height {
            Some(self.pixels[y * self.width + x])
        } else {
            None
        }
    }
}

impl Surface for Raster {
    fn fill_square(&mut self, x: usize, y: usize, side: usize, colour: Rgb) {
        // clip to the surface rather than trusting the caller
        let x_end = (x + side).min(self.width);
        let y_end = (y + side).min(self.height);
        for row in y.min(y_end)..y_end {
            let start = row * self.width;
            self.pixels[start + x.min(x_end)..start + x_end].fill(colour);
        }
    }
}

/// rasterizes a one-byte-per-pixel frame buffer at a fixed integer scale
#[derive(Debug, Clone)]
pub struct FrameRenderer {
    resolution: Resolution,
    pixel_size: usize,
    on: Rgb,
    off: Rgb,
}

impl FrameRenderer {
    pub fn new(resolution: Resolution, pixel_size: usize, on: Rgb, off: Rgb) -> Self {
        FrameRenderer {
            resolution,
            pixel_size: pixel_size.max(1),
            on,
            off,
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn pixel_size(&self) -> usize {
        self.pixel_size
    }

    /// a blank surface exactly big enough for one scaled frame
    pub fn surface(&self) -> Raster {
        Raster::new(
            self.resolution.width * self.pixel_size,
            self.resolution.height * self.pixel_size,
            self.off,
        )
    }

    /// redraw the whole frame. a buffer of the wrong size is rejected before
    /// anything is painted; any pixel value other than 1 is drawn as off
    pub fn render(&self, frame: &[u8], surface: &mut impl Surface) -> Result<(), RenderError> {
        let expected = self.resolution.pixel_count();
        if frame.len() != expected {
            return Err(RenderError::FrameSize {
                expected,
                actual: frame.len(),
            });
        }

        let mut malformed = 0;
        for (idx, &px) in frame.iter().enumerate() {
            let x = idx % self.resolution.width;
            let y = idx / self.resolution.width;
            let colour = match px {
                1 => self.on,
                0 => self.off,
                _ => {
                    malformed += 1;
                    self.off
                }
            };
            surface.fill_square(
                x * self.pixel_size,
                y * self.pixel_size,
                self.pixel_size,
                colour,
            );
        }
        if malformed > 0 {
            log::warn!("{} pixels outside 0/1 drawn as off", malformed);
        }
        Ok(())
    }
}

impl Default for FrameRenderer {
    fn default() -> Self {
        FrameRenderer::new(
            Resolution::default(),
            PIXEL_SIZE,
            PIXEL_ON_COLOUR,
            PIXEL_OFF_COLOUR,
        )
    }
}

/// everything around the frame the host may want to show
#[derive(Debug, Clone, Copy)]
pub struct Panel<'a> {
    pub state: RunState,
    pub rom: Option<&'a str>,
    pub keys: &'a KeyIndicator,
    pub keymap: &'a Keymap,
}

/// Display is used by the driver to put a rendered frame in front of the
/// user. It should abstract the implementation details, so a variety of
/// kinds of screen would work.
pub trait Display {
    fn present(&mut self, frame: &Raster, panel: &Panel<'_>) -> Result<(), io::Error>;
}

/// for headless hosts and testing non-display routines
pub struct DummyDisplay;

impl Display for DummyDisplay {
    #[allow(unused)]
    fn present(&mut self, frame: &Raster, panel: &Panel<'_>) -> Result<(), io::Error> {
        Ok(())
    }
}
