//! SSD1306 128x64 OLED behind the core `Screen` trait
//!
//! Frames are composed in a core `FrameBuffer`. Presenting copies only the
//! region that changed into the driver's buffer and then pushes it over I2C.

use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use embedded_hal_async::i2c::I2c;
use health_core::display::{DisplayError, Screen};
use health_core::framebuffer::FrameBuffer;
use log::error;
use ssd1306::mode::BufferedGraphicsModeAsync;
use ssd1306::prelude::*;
use ssd1306::{I2CDisplayInterface, Ssd1306Async};

/// Fixed 7-bit bus address of the module
pub const SSD1306_ADDRESS: u8 = 0x3C;

type Panel<I> = Ssd1306Async<
    I2CInterface<I>,
    DisplaySize128x64,
    BufferedGraphicsModeAsync<DisplaySize128x64>,
>;

pub struct Oled<I> {
    canvas: FrameBuffer,
    panel: Panel<I>,
}

impl<I: I2c> Oled<I> {
    /// Initialize the controller and blank the panel.
    pub async fn new(i2c: I) -> Result<Self, DisplayError> {
        let interface = I2CDisplayInterface::new(i2c);
        let mut panel = Ssd1306Async::new(interface, DisplaySize128x64, DisplayRotation::Rotate0)
            .into_buffered_graphics_mode();

        panel.init().await.map_err(|e| {
            error!("SSD1306 init failed: {:?}", e);
            DisplayError::NotFound {
                details: "no response at 0x3C",
            }
        })?;

        Ok(Self {
            canvas: FrameBuffer::new(),
            panel,
        })
    }
}

impl<I> OriginDimensions for Oled<I> {
    fn size(&self) -> Size {
        self.canvas.size()
    }
}

impl<I> DrawTarget for Oled<I> {
    type Color = BinaryColor;
    type Error = DisplayError;

    fn draw_iter<P>(&mut self, pixels: P) -> Result<(), Self::Error>
    where
        P: IntoIterator<Item = Pixel<Self::Color>>,
    {
        self.canvas.draw_iter(pixels).map_err(|e| match e {})
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        self.canvas.fill_solid(area, color).map_err(|e| match e {})
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.canvas.clear(color).map_err(|e| match e {})
    }
}

impl<I: I2c> Screen for Oled<I> {
    async fn present(&mut self) -> Result<(), Self::Error> {
        self.canvas.flush(&mut self.panel).map_err(|e| {
            error!("SSD1306 buffer update failed: {:?}", e);
            DisplayError::WriteFailed {
                operation: "buffer update",
                details: "pixel outside the panel",
            }
        })?;

        self.panel.flush().await.map_err(|e| {
            error!("SSD1306 flush failed: {:?}", e);
            DisplayError::WriteFailed {
                operation: "flush",
                details: "I2C communication error",
            }
        })
    }
}
