//! ESP32-S3 side of the health monitor
//!
//! Hardware bindings for the hardware-independent `health_core` crate: the
//! shared I2C bus, the SSD1306 screen and the WiFi/web server stack.

#![no_std]

pub mod hardware;
pub mod net;
pub mod oled;
