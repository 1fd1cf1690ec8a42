//! Boot-time bring-up bookkeeping
//!
//! Each peripheral's initialization result is recorded in an [`InitReport`];
//! once everything has been tried, [`InitReport::decide`] tells `main`
//! whether to run, run with some parts missing, or halt.

use core::fmt;

use log::{error, info, warn};

use crate::display::DisplayError;
use crate::sensors::SensorError;

/// Parts of the device brought up at boot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Display,
    PulseOximeter,
    Thermometer,
    Network,
}

impl Component {
    pub const ALL: [Self; 4] = [
        Self::Display,
        Self::PulseOximeter,
        Self::Thermometer,
        Self::Network,
    ];

    /// The device is useless without these.
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::Display | Self::PulseOximeter)
    }

    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Display => "display",
            Self::PulseOximeter => "pulse oximeter",
            Self::Thermometer => "thermometer",
            Self::Network => "network",
        };
        f.write_str(name)
    }
}

/// Why a component failed to come up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitFailure {
    Sensor(SensorError),
    Display(DisplayError),
    Other(&'static str),
}

impl From<SensorError> for InitFailure {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

impl From<DisplayError> for InitFailure {
    fn from(e: DisplayError) -> Self {
        Self::Display(e)
    }
}

impl From<&'static str> for InitFailure {
    fn from(details: &'static str) -> Self {
        Self::Other(details)
    }
}

impl fmt::Display for InitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor(e) => write!(f, "{}", e),
            Self::Display(e) => write!(f, "{}", e),
            Self::Other(details) => f.write_str(details),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComponentStatus {
    #[default]
    NotAttempted,
    Ready,
    Failed(InitFailure),
}

/// What `main` should do after bring-up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootDecision {
    /// Everything came up
    Run,
    /// Only non-essential parts are missing; this is the first of them
    RunDegraded(Component),
    /// An essential part is missing; stop here
    Halt(Component),
}

/// Collected bring-up results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InitReport {
    statuses: [ComponentStatus; 4],
}

impl InitReport {
    pub const fn new() -> Self {
        Self {
            statuses: [ComponentStatus::NotAttempted; 4],
        }
    }

    /// Record the outcome of bringing up `component`, passing the value through.
    pub fn record<T, E>(&mut self, component: Component, result: Result<T, E>) -> Option<T>
    where
        E: Into<InitFailure>,
    {
        match result {
            Ok(value) => {
                info!("{} initialized", component);
                self.statuses[component.index()] = ComponentStatus::Ready;
                Some(value)
            }
            Err(e) => {
                let failure = e.into();
                if component.is_fatal() {
                    error!("{} initialization failed: {}", component, failure);
                } else {
                    warn!("{} initialization failed: {}", component, failure);
                }
                self.statuses[component.index()] = ComponentStatus::Failed(failure);
                None
            }
        }
    }

    pub fn status(&self, component: Component) -> ComponentStatus {
        self.statuses[component.index()]
    }

    /// Essential components must be ready; anything else may be missing.
    pub fn decide(&self) -> BootDecision {
        let mut degraded = None;
        for component in Component::ALL {
            if self.status(component) == ComponentStatus::Ready {
                continue;
            }
            if component.is_fatal() {
                return BootDecision::Halt(component);
            }
            degraded.get_or_insert(component);
        }

        match degraded {
            Some(component) => BootDecision::RunDegraded(component),
            None => BootDecision::Run,
        }
    }
}
