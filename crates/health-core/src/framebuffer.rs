//! Monochrome framebuffer with change tracking.
//!
//! Holds one bit per pixel of the 128x64 OLED. Pages can be drawn here off
//! screen and compared, dumped (the simulator prints it as text) or flushed
//! to a real panel, in which case only the bounding box of pixels that
//! changed since the last flush is sent.

use core::convert::Infallible;

use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use log::debug;

use crate::config::{SCREEN_HEIGHT_PX, SCREEN_WIDTH_PX};

const WIDTH: usize = SCREEN_WIDTH_PX as usize;
const HEIGHT: usize = SCREEN_HEIGHT_PX as usize;

/// Packed size of the framebuffer in bytes (1024 for 128x64).
const BYTE_COUNT: usize = WIDTH * HEIGHT / 8;

/// Bounding box of pixels that have changed since the last flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DirtyRect {
    min_x: usize,
    min_y: usize,
    max_x: usize,
    max_y: usize,
}

impl DirtyRect {
    fn from_point(x: usize, y: usize) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    fn expand(&mut self, x: usize, y: usize) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }
}

/// 128x64 one-bit framebuffer implementing `DrawTarget<Color = BinaryColor>`.
#[derive(Clone)]
pub struct FrameBuffer {
    bits: [u8; BYTE_COUNT],
    dirty: Option<DirtyRect>,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuffer {
    /// All pixels off.
    pub const fn new() -> Self {
        Self {
            bits: [0; BYTE_COUNT],
            dirty: None,
        }
    }

    #[inline]
    fn index(x: usize, y: usize) -> (usize, u8) {
        let bit = y * WIDTH + x;
        (bit / 8, 1 << (bit % 8))
    }

    /// Write a single pixel, expanding the dirty rect only if it changed.
    #[inline]
    fn set_pixel(&mut self, x: usize, y: usize, color: BinaryColor) {
        let (byte, mask) = Self::index(x, y);
        let was_on = self.bits[byte] & mask != 0;
        if was_on == color.is_on() {
            return;
        }

        self.bits[byte] ^= mask;
        match &mut self.dirty {
            Some(rect) => rect.expand(x, y),
            None => self.dirty = Some(DirtyRect::from_point(x, y)),
        }
    }

    /// Color of the pixel at `(x, y)`; off outside the screen.
    pub fn pixel(&self, x: usize, y: usize) -> BinaryColor {
        if x >= WIDTH || y >= HEIGHT {
            return BinaryColor::Off;
        }
        let (byte, mask) = Self::index(x, y);
        BinaryColor::from(self.bits[byte] & mask != 0)
    }

    /// Packed pixel data, row-major, least significant bit first.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    /// Whether any pixel is lit.
    pub fn is_blank(&self) -> bool {
        self.bits.iter().all(|b| *b == 0)
    }

    /// Whether pixels changed since the last flush.
    pub fn is_dirty(&self) -> bool {
        self.dirty.is_some()
    }

    /// Forget pending changes without sending them anywhere.
    pub fn mark_clean(&mut self) {
        self.dirty = None;
    }

    /// Flush the dirty region to a panel, then reset the dirty state.
    ///
    /// If nothing changed, this is a no-op.
    pub fn flush<D>(&mut self, display: &mut D) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = BinaryColor>,
    {
        let Some(rect) = self.dirty.take() else {
            return Ok(());
        };

        let width = rect.max_x - rect.min_x + 1;
        let height = rect.max_y - rect.min_y + 1;
        debug!(
            "Flushing {}x{} dirty region at ({}, {})",
            width, height, rect.min_x, rect.min_y
        );

        let area = Rectangle::new(
            Point::new(rect.min_x as i32, rect.min_y as i32),
            Size::new(width as u32, height as u32),
        );
        let colors = (rect.min_y..=rect.max_y)
            .flat_map(move |y| (rect.min_x..=rect.max_x).map(move |x| (x, y)))
            .map(|(x, y)| self.pixel(x, y));

        display.fill_contiguous(&area, colors)
    }
}

impl OriginDimensions for FrameBuffer {
    fn size(&self) -> Size {
        Size::new(SCREEN_WIDTH_PX, SCREEN_HEIGHT_PX)
    }
}

impl DrawTarget for FrameBuffer {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(coord, color) in pixels {
            if coord.x >= 0 && coord.y >= 0 && (coord.x as usize) < WIDTH && (coord.y as usize) < HEIGHT
            {
                self.set_pixel(coord.x as usize, coord.y as usize, color);
            }
        }
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        let area = area.intersection(&self.bounding_box());
        if let Some(bottom_right) = area.bottom_right() {
            for y in area.top_left.y..=bottom_right.y {
                for x in area.top_left.x..=bottom_right.x {
                    self.set_pixel(x as usize, y as usize, color);
                }
            }
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        for y in 0..HEIGHT {
            for x in 0..WIDTH {
                self.set_pixel(x, y, color);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use embedded_graphics::primitives::PrimitiveStyle;

    use super::*;

    /// Panel stand-in that records every pixel written to it.
    struct RecordingPanel {
        written: Vec<(Point, BinaryColor)>,
    }

    impl OriginDimensions for RecordingPanel {
        fn size(&self) -> Size {
            Size::new(SCREEN_WIDTH_PX, SCREEN_HEIGHT_PX)
        }
    }

    impl DrawTarget for RecordingPanel {
        type Color = BinaryColor;
        type Error = Infallible;

        fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
        where
            I: IntoIterator<Item = Pixel<Self::Color>>,
        {
            self.written
                .extend(pixels.into_iter().map(|Pixel(p, c)| (p, c)));
            Ok(())
        }
    }

    #[test]
    fn test_new_buffer_is_blank_and_clean() {
        let fb = FrameBuffer::new();
        assert!(fb.is_blank());
        assert!(!fb.is_dirty());
        assert_eq!(fb.as_bytes().len(), 1024);
    }

    #[test]
    fn test_pixels_outside_screen_are_ignored() {
        let mut fb = FrameBuffer::new();
        fb.draw_iter([
            Pixel(Point::new(-1, 0), BinaryColor::On),
            Pixel(Point::new(128, 10), BinaryColor::On),
            Pixel(Point::new(3, 64), BinaryColor::On),
        ])
        .unwrap();
        assert!(fb.is_blank());
        assert!(!fb.is_dirty());
    }

    #[test]
    fn test_unchanged_pixels_do_not_dirty() {
        let mut fb = FrameBuffer::new();
        fb.clear(BinaryColor::Off).unwrap();
        assert!(!fb.is_dirty());
    }

    #[test]
    fn test_flush_sends_only_dirty_region() {
        let mut fb = FrameBuffer::new();
        Rectangle::new(Point::new(10, 20), Size::new(3, 2))
            .into_styled(PrimitiveStyle::with_fill(BinaryColor::On))
            .draw(&mut fb)
            .unwrap();
        assert_eq!(fb.pixel(10, 20), BinaryColor::On);
        assert_eq!(fb.pixel(13, 20), BinaryColor::Off);

        let mut panel = RecordingPanel {
            written: Vec::new(),
        };
        fb.flush(&mut panel).unwrap();

        assert_eq!(panel.written.len(), 6);
        assert!(panel.written.iter().all(|(_, c)| *c == BinaryColor::On));
        assert_eq!(panel.written[0].0, Point::new(10, 20));
        assert!(!fb.is_dirty());

        // Nothing changed since, so a second flush writes nothing.
        fb.flush(&mut panel).unwrap();
        assert_eq!(panel.written.len(), 6);
    }
}
