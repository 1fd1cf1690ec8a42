//! Device identity, timing and pipeline configuration

use embassy_time::Duration;

use crate::queue::PushPolicy;

/// Interval between snapshots handed to the display pipeline
pub const REPORTING_PERIOD_MS: u64 = 1000;

/// Longest the sampler waits on a full display queue before dropping.
///
/// Must stay well under the MAX30100 FIFO window (16 samples, 160 ms): the
/// sampler does not drain the sensor while it waits.
pub const QUEUE_WAIT_MS: u64 = 50;

/// Number of readings the display queue can hold
pub const QUEUE_CAPACITY: usize = 10;

/// mDNS host name; the device answers as `healthmonitor.local`
pub const DEVICE_NAME: &str = "healthmonitor";

/// Access point SSID used when no station credentials are available
pub const PROVISIONING_AP_SSID: &str = "HMSWifiManager";

/// Access point password used when no station credentials are available
pub const PROVISIONING_AP_PASSWORD: &str = "12345678";

/// Address of the device on its own provisioning network
pub const PROVISIONING_AP_ADDRESS: [u8; 4] = [192, 168, 4, 1];

/// TCP port of the web server
pub const HTTP_PORT: u16 = 80;

/// Display width in pixels (SSD1306 128x64 OLED)
pub const SCREEN_WIDTH_PX: u32 = 128;

/// Display height in pixels
pub const SCREEN_HEIGHT_PX: u32 = 64;

/// Runtime configuration of the sampling pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Minimum time between two snapshots pushed to the display queue
    pub reporting_period: Duration,
    /// What the sampler does when the display queue stays full
    pub push_policy: PushPolicy,
}

impl MonitorConfig {
    /// Firmware defaults: 1 s reporting period, drop the oldest queued
    /// reading after giving the display [`QUEUE_WAIT_MS`] to catch up.
    pub const DEFAULT: Self = Self {
        reporting_period: Duration::from_millis(REPORTING_PERIOD_MS),
        push_policy: PushPolicy::DropOldest {
            wait: Duration::from_millis(QUEUE_WAIT_MS),
        },
    };

    pub const fn with_push_policy(mut self, push_policy: PushPolicy) -> Self {
        self.push_policy = push_policy;
        self
    }

    pub const fn with_reporting_period(mut self, reporting_period: Duration) -> Self {
        self.reporting_period = reporting_period;
        self
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Station credentials baked in at build time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StationCredentials<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
}

/// How the device joins a network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkMode<'a> {
    /// Join an existing network as a client
    Station(StationCredentials<'a>),
    /// Open the fixed provisioning access point
    Provisioning,
}

impl<'a> NetworkMode<'a> {
    /// Pick the network mode from optional build-time credentials.
    ///
    /// A missing or empty SSID means the device has never been provisioned,
    /// so it falls back to the access point. An empty password is allowed
    /// (open networks).
    pub fn select(ssid: Option<&'a str>, password: Option<&'a str>) -> Self {
        match ssid.map(str::trim) {
            Some(ssid) if !ssid.is_empty() => Self::Station(StationCredentials {
                ssid,
                password: password.unwrap_or(""),
            }),
            _ => Self::Provisioning,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_reporting_period_is_one_second() {
        assert_eq!(
            MonitorConfig::default().reporting_period,
            Duration::from_millis(1000)
        );
    }

    #[test]
    fn test_missing_ssid_selects_provisioning() {
        assert_eq!(NetworkMode::select(None, None), NetworkMode::Provisioning);
        assert_eq!(
            NetworkMode::select(Some("  "), Some("secret")),
            NetworkMode::Provisioning
        );
    }

    #[test]
    fn test_ssid_selects_station() {
        assert_eq!(
            NetworkMode::select(Some("home"), None),
            NetworkMode::Station(StationCredentials {
                ssid: "home",
                password: "",
            })
        );
    }
}
