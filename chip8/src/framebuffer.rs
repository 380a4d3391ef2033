//! Headless display buffer.
use std::{
    collections::HashSet,
    fmt::{self, Write},
};

use crate::{constants::*, devices::Screen};

/// Display buffer that sprites are drawn to, stored one `bool` per pixel
/// in row-major order.
///
/// Sprite coordinates are only wrapped once by the interpreter, so a pixel
/// can land past the bottom-right of the grid. Those pixels are kept in a
/// separate set, where they still toggle and collide, but are never shown.
pub struct FrameBuffer {
    pixels: Box<[bool; DISPLAY_BUFFER_SIZE]>,
    offscreen: HashSet<usize>,
    /// Number of times the buffer was presented.
    frames: u64,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self {
            pixels: Box::new([false; DISPLAY_BUFFER_SIZE]),
            offscreen: HashSet::new(),
            frames: 0,
        }
    }
}

impl FrameBuffer {
    pub fn new() -> Self {
        Default::default()
    }

    /// Visible pixels in row-major order.
    pub fn pixels(&self) -> &[bool; DISPLAY_BUFFER_SIZE] {
        &self.pixels
    }

    /// State of the visible pixel at the coordinate. Out of range is off.
    pub fn pixel(&self, x: usize, y: usize) -> bool {
        if x < DISPLAY_WIDTH && y < DISPLAY_HEIGHT {
            self.pixels[x + y * DISPLAY_WIDTH]
        } else {
            false
        }
    }

    /// Number of pixels that are on, including pixels outside the visible grid.
    pub fn lit_count(&self) -> usize {
        self.pixels.iter().filter(|px| **px).count() + self.offscreen.len()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Returns the contents of the display as a human readable string.
    pub fn dump(&self) -> Result<String, fmt::Error> {
        let mut buf = String::new();

        for row in self.pixels.chunks(DISPLAY_WIDTH) {
            for px in row {
                if *px {
                    write!(buf, "#")?;
                } else {
                    write!(buf, ".")?;
                }
            }
            writeln!(buf)?;
        }

        Ok(buf)
    }
}

impl Screen for FrameBuffer {
    fn set_pixel(&mut self, x: usize, y: usize) -> bool {
        let index = x + y * DISPLAY_WIDTH;

        match self.pixels.get_mut(index) {
            Some(px) => {
                *px = !*px;
                !*px
            }
            None => {
                // Returns true when the pixel was removed, meaning it is now off.
                if self.offscreen.remove(&index) {
                    true
                } else {
                    self.offscreen.insert(index);
                    false
                }
            }
        }
    }

    fn clear(&mut self) {
        self.pixels.fill(false);
        self.offscreen.clear();
    }

    fn render(&mut self) {
        self.frames += 1;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_set_pixel_toggles() {
        let mut fb = FrameBuffer::new();

        assert!(!fb.set_pixel(3, 2));
        assert!(fb.pixel(3, 2));
        assert!(fb.pixels()[3 + 2 * DISPLAY_WIDTH]);

        assert!(fb.set_pixel(3, 2));
        assert!(!fb.pixel(3, 2));
    }

    #[test]
    fn test_offscreen_pixels_collide() {
        let mut fb = FrameBuffer::new();

        assert!(!fb.set_pixel(10, DISPLAY_HEIGHT + 3));
        assert_eq!(fb.lit_count(), 1);
        assert!(!fb.pixels().iter().any(|px| *px));

        assert!(fb.set_pixel(10, DISPLAY_HEIGHT + 3));
        assert_eq!(fb.lit_count(), 0);
    }

    #[test]
    fn test_dump() {
        let mut fb = FrameBuffer::new();
        fb.set_pixel(0, 0);
        fb.set_pixel(DISPLAY_WIDTH - 1, DISPLAY_HEIGHT - 1);

        let dump = fb.dump().unwrap();
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), DISPLAY_HEIGHT);
        assert!(lines[0].starts_with("#."));
        assert!(lines[DISPLAY_HEIGHT - 1].ends_with(".#"));

        fb.clear();
        assert_eq!(fb.lit_count(), 0);
    }
}
