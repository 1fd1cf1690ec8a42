//! Shared state handed to every task of the monitor

use crate::config::MonitorConfig;
use crate::queue::ReadingQueue;
use crate::store::LatestReading;

/// Everything the sampler, the display task and the HTTP workers share.
///
/// Built once at startup and passed by reference to each task. On the
/// firmware it lives in a `StaticCell`; tests and the simulator keep it on
/// the stack.
pub struct MonitorContext {
    pub config: MonitorConfig,
    /// Most recent reading, refreshed every sampling iteration
    pub latest: LatestReading,
    /// Snapshots waiting to be drawn on the display
    pub queue: ReadingQueue,
}

impl MonitorContext {
    pub const fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            latest: LatestReading::new(),
            queue: ReadingQueue::new(),
        }
    }
}

impl Default for MonitorContext {
    fn default() -> Self {
        Self::new(MonitorConfig::DEFAULT)
    }
}
