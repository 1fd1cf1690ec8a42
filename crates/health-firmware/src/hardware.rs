//! Board wiring: the shared I2C bus and who sits on it
//!
//! | Device   | Address | Role                |
//! |----------|---------|---------------------|
//! | SSD1306  | 0x3C    | 128x64 OLED         |
//! | MAX30100 | 0x57    | pulse oximeter      |
//! | BMP280   | 0x76    | body temperature    |

use esp_hal::Async;
use esp_hal::i2c::master::I2c;
use health_core::i2c_bus::{I2cBus, SharedI2cDevice};
use static_cell::StaticCell;

/// Bus clock; the MAX30100 tops out at 400 kHz
pub const I2C_FREQUENCY_KHZ: u32 = 400;

pub type I2cDriver = I2c<'static, Async>;

/// Handle each driver gets onto the shared bus
pub type BusDevice = SharedI2cDevice<'static, I2cDriver>;

static I2C_BUS: StaticCell<I2cBus<I2cDriver>> = StaticCell::new();

/// Park the I2C driver in a static so every device can borrow it.
pub fn share_i2c(i2c: I2cDriver) -> &'static I2cBus<I2cDriver> {
    I2C_BUS.init(I2cBus::new(i2c))
}

/// One handle per device on the bus
pub struct BusDevices {
    pub display: BusDevice,
    pub oximeter: BusDevice,
    pub thermometer: BusDevice,
}

impl BusDevices {
    pub fn new(bus: &'static I2cBus<I2cDriver>) -> Self {
        Self {
            display: SharedI2cDevice::new(bus),
            oximeter: SharedI2cDevice::new(bus),
            thermometer: SharedI2cDevice::new(bus),
        }
    }
}
