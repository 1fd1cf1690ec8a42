use bme280::i2c::AsyncBME280;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;
use log::{error, info, warn};

use super::{SensorError, Thermometer};

/// Primary bus address (SDO tied low)
pub const BMP280_ADDRESS: u8 = 0x76;

const REG_CHIP_ID: u8 = 0xD0;

/// What the id register says is sitting at the thermometer's address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipKind {
    /// 0xFF: wrong address, or an old BMP180/BMP085
    NoDevice,
    Bmp280(u8),
    Bme280,
    Bme680,
    Unknown(u8),
}

impl ChipKind {
    pub const fn from_id(id: u8) -> Self {
        match id {
            0xFF => Self::NoDevice,
            0x56..=0x58 => Self::Bmp280(id),
            0x60 => Self::Bme280,
            0x61 => Self::Bme680,
            other => Self::Unknown(other),
        }
    }

    pub const fn describe(self) -> &'static str {
        match self {
            Self::NoDevice => "id 0xFF: bad address, or a BMP180/BMP085",
            Self::Bmp280(_) => "BMP280",
            Self::Bme280 => "BME280",
            Self::Bme680 => "BME680, not supported",
            Self::Unknown(_) => "unknown chip id",
        }
    }

    /// Chips the driver knows how to read
    pub const fn is_supported(self) -> bool {
        matches!(self, Self::Bmp280(_) | Self::Bme280)
    }
}

async fn read_chip_id<I: I2c>(i2c: &mut I) -> Result<u8, I::Error> {
    let mut id = [0u8];
    i2c.write_read(BMP280_ADDRESS, &[REG_CHIP_ID], &mut id).await?;
    Ok(id[0])
}

/// BMP280 temperature readings through the `bme280` driver.
pub struct Bmp280Thermometer<I, D> {
    sensor: AsyncBME280<I>,
    delay: D,
}

impl<I, D> Bmp280Thermometer<I, D>
where
    I: I2c,
    D: DelayNs,
{
    /// Probe the chip id, then load the calibration data.
    pub async fn new(mut i2c: I, mut delay: D) -> Result<Self, SensorError> {
        let id = read_chip_id(&mut i2c).await.map_err(|e| {
            warn!("BMP280: no response at 0x76: {:?}", e);
            SensorError::NotFound {
                sensor: "BMP280",
                details: "no response at 0x76",
            }
        })?;

        let kind = ChipKind::from_id(id);
        info!("BMP280: chip id 0x{:02X} ({})", id, kind.describe());
        if !kind.is_supported() {
            return Err(SensorError::NotFound {
                sensor: "BMP280",
                details: kind.describe(),
            });
        }

        let mut sensor = AsyncBME280::new_primary(i2c);
        sensor.init(&mut delay).await.map_err(|e| {
            error!("BMP280 init failed: {:?}", e);
            SensorError::InitializationFailed {
                sensor: "BMP280",
                details: "failed to load calibration data",
            }
        })?;

        Ok(Self { sensor, delay })
    }
}

impl<I, D> Thermometer for Bmp280Thermometer<I, D>
where
    I: I2c,
    D: DelayNs,
{
    async fn read_celsius(&mut self) -> Result<f32, SensorError> {
        let measurements = self.sensor.measure(&mut self.delay).await.map_err(|e| {
            error!("BMP280 measurement failed: {:?}", e);
            SensorError::ReadFailed {
                sensor: "BMP280",
                operation: "measure temperature",
                details: "I2C communication error or invalid data",
            }
        })?;
        Ok(measurements.temperature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chip_id_classification() {
        assert_eq!(ChipKind::from_id(0xFF), ChipKind::NoDevice);
        assert_eq!(ChipKind::from_id(0x56), ChipKind::Bmp280(0x56));
        assert_eq!(ChipKind::from_id(0x58), ChipKind::Bmp280(0x58));
        assert_eq!(ChipKind::from_id(0x60), ChipKind::Bme280);
        assert_eq!(ChipKind::from_id(0x61), ChipKind::Bme680);
        assert_eq!(ChipKind::from_id(0x12), ChipKind::Unknown(0x12));
    }

    #[test]
    fn test_only_bmp280_family_supported() {
        assert!(ChipKind::Bmp280(0x58).is_supported());
        assert!(ChipKind::Bme280.is_supported());
        assert!(!ChipKind::NoDevice.is_supported());
        assert!(!ChipKind::Bme680.is_supported());
        assert!(!ChipKind::Unknown(0).is_supported());
    }
}
