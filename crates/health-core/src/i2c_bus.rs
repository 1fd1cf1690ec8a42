//! One I2C bus, several drivers
//!
//! The pulse oximeter, the thermometer and the OLED all sit on the same two
//! wires. Each driver gets its own [`SharedI2cDevice`] handle; a handle locks
//! the bus for the duration of one transaction and awaits the transfer while
//! holding the lock, so other tasks keep running but never interleave bytes
//! on the bus.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embedded_hal_async::i2c::{ErrorType, I2c, Operation};

/// The bus itself, shared by reference between handles
pub type I2cBus<T> = Mutex<CriticalSectionRawMutex, T>;

/// Per-driver handle onto a shared [`I2cBus`].
pub struct SharedI2cDevice<'a, T> {
    bus: &'a I2cBus<T>,
}

impl<'a, T> SharedI2cDevice<'a, T> {
    #[inline]
    pub const fn new(bus: &'a I2cBus<T>) -> Self {
        Self { bus }
    }
}

impl<T> Clone for SharedI2cDevice<'_, T> {
    fn clone(&self) -> Self {
        Self { bus: self.bus }
    }
}

impl<T: ErrorType> ErrorType for SharedI2cDevice<'_, T> {
    type Error = T::Error;
}

impl<T: I2c> I2c for SharedI2cDevice<'_, T> {
    #[inline]
    async fn read(&mut self, address: u8, read: &mut [u8]) -> Result<(), Self::Error> {
        self.bus.lock().await.read(address, read).await
    }

    #[inline]
    async fn write(&mut self, address: u8, write: &[u8]) -> Result<(), Self::Error> {
        self.bus.lock().await.write(address, write).await
    }

    #[inline]
    async fn write_read(
        &mut self,
        address: u8,
        write: &[u8],
        read: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.bus.lock().await.write_read(address, write, read).await
    }

    #[inline]
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.bus.lock().await.transaction(address, operations).await
    }
}
