//! Bounded hand-off queue between the sampler and the display task
//!
//! The queue is a fixed-capacity FIFO built on an embassy-sync [`Channel`].
//! Readings are copied in and out by value and delivered in the order they
//! were pushed. What happens when the queue is full is decided by a
//! [`PushPolicy`]: wait forever, or wait a bounded time and then drop either
//! the oldest queued reading or the new one. Every dropped reading is counted.

use core::sync::atomic::{AtomicU32, Ordering};

use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use embassy_time::Duration;
use embedded_hal_async::delay::DelayNs;
use log::{debug, warn};

use crate::config::QUEUE_CAPACITY;
use crate::reading::SensorReading;

/// Channel type backing the queue
pub type ReadingChannel = Channel<CriticalSectionRawMutex, SensorReading, QUEUE_CAPACITY>;

/// What a push does when the queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushPolicy {
    /// Wait until the consumer frees a slot, however long that takes
    Block,
    /// Wait up to `wait`, then evict the oldest queued reading
    DropOldest { wait: Duration },
    /// Wait up to `wait`, then discard the reading being pushed
    DropNewest { wait: Duration },
}

/// Result of a policy-driven push
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PushOutcome {
    /// The reading was queued without losing anything
    Queued,
    /// The reading was queued after evicting this older one
    Evicted(SensorReading),
    /// The reading itself was discarded
    Dropped(SensorReading),
}

impl PushOutcome {
    /// Whether a reading was lost on this push
    pub const fn lost_reading(&self) -> bool {
        !matches!(self, Self::Queued)
    }
}

/// Fixed-capacity FIFO of [`SensorReading`]s
pub struct ReadingQueue {
    channel: ReadingChannel,
    dropped: AtomicU32,
}

impl ReadingQueue {
    /// Number of readings the queue holds when full
    pub const CAPACITY: usize = QUEUE_CAPACITY;

    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            dropped: AtomicU32::new(0),
        }
    }

    /// Enqueue at the tail, waiting as long as the queue is full.
    pub async fn push(&self, reading: SensorReading) {
        self.channel.send(reading).await;
    }

    /// Enqueue following `policy`.
    ///
    /// `delay` times the bounded wait of the drop policies; it is not used by
    /// [`PushPolicy::Block`].
    pub async fn push_with<D: DelayNs>(
        &self,
        reading: SensorReading,
        policy: PushPolicy,
        delay: &mut D,
    ) -> PushOutcome {
        let wait = match policy {
            PushPolicy::Block => {
                self.push(reading).await;
                return PushOutcome::Queued;
            }
            PushPolicy::DropOldest { wait } | PushPolicy::DropNewest { wait } => wait,
        };

        // Fast path, no need to arm the timer when there is room.
        let reading = match self.channel.try_send(reading) {
            Ok(()) => return PushOutcome::Queued,
            Err(TrySendError::Full(reading)) => reading,
        };

        debug!("Reading queue full, waiting up to {} ms", wait.as_millis());
        let wait_us = u32::try_from(wait.as_micros()).unwrap_or(u32::MAX);
        match select(self.channel.send(reading), delay.delay_us(wait_us)).await {
            Either::First(()) => PushOutcome::Queued,
            Either::Second(()) => self.overflow(reading, policy),
        }
    }

    /// Apply the drop half of `policy` after the bounded wait ran out.
    fn overflow(&self, reading: SensorReading, policy: PushPolicy) -> PushOutcome {
        // The consumer may have freed a slot right as the wait expired.
        let reading = match self.channel.try_send(reading) {
            Ok(()) => return PushOutcome::Queued,
            Err(TrySendError::Full(reading)) => reading,
        };

        let outcome = match policy {
            PushPolicy::DropOldest { .. } => match self.channel.try_receive() {
                Ok(evicted) => match self.channel.try_send(reading) {
                    Ok(()) => PushOutcome::Evicted(evicted),
                    // Another producer took the slot we freed.
                    Err(TrySendError::Full(reading)) => PushOutcome::Dropped(reading),
                },
                Err(_) => match self.channel.try_send(reading) {
                    Ok(()) => PushOutcome::Queued,
                    Err(TrySendError::Full(reading)) => PushOutcome::Dropped(reading),
                },
            },
            PushPolicy::DropNewest { .. } | PushPolicy::Block => PushOutcome::Dropped(reading),
        };

        if outcome.lost_reading() {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(
                "Display queue stayed full, {:?} ({} readings dropped so far)",
                outcome, total
            );
        }
        outcome
    }

    /// Enqueue without waiting; hands the reading back if the queue is full.
    pub fn try_push(&self, reading: SensorReading) -> Result<(), SensorReading> {
        match self.channel.try_send(reading) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(reading)) => Err(reading),
        }
    }

    /// Remove and return the head entry, waiting while the queue is empty.
    pub async fn pop(&self) -> SensorReading {
        self.channel.receive().await
    }

    /// Remove and return the head entry if there is one.
    pub fn try_pop(&self) -> Option<SensorReading> {
        self.channel.try_receive().ok()
    }

    /// Number of readings currently queued
    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.channel.is_full()
    }

    /// Total readings lost to the drop policies since boot
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for ReadingQueue {
    fn default() -> Self {
        Self::new()
    }
}
