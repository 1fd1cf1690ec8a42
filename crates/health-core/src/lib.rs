//! Hardware-independent core library for the health monitor
//!
//! This crate contains all platform-agnostic logic of the device: the
//! sampler that reads the pulse oximeter and thermometer, the bounded queue
//! that hands snapshots to the display task, the latest-reading store read
//! by the HTTP endpoint, display rendering, request routing and the mDNS
//! responder's packet handling.
//!
//! It is `#![no_std]` so it compiles on both the ESP32-S3 and desktop hosts
//! (for the simulator and tests).

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod context;
pub mod display;
pub mod framebuffer;
pub mod http;
pub mod i2c_bus;
pub mod init;
pub mod mdns;
pub mod queue;
pub mod reading;
pub mod readout;
pub mod sampler;
pub mod sensors;
pub mod store;

pub use context::MonitorContext;
pub use reading::SensorReading;
