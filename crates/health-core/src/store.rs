//! Latest-reading snapshot cell shared with the HTTP read-out

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use crate::reading::SensorReading;

/// Holds the most recent [`SensorReading`].
///
/// The sampler overwrites it every iteration and HTTP workers copy it out on
/// every request. Both sides go through a critical section, so a reader
/// always sees one whole reading, never fields from two different samples.
pub struct LatestReading {
    cell: Mutex<CriticalSectionRawMutex, Cell<SensorReading>>,
}

impl LatestReading {
    /// Create a store holding [`SensorReading::ZERO`].
    pub const fn new() -> Self {
        Self {
            cell: Mutex::new(Cell::new(SensorReading::ZERO)),
        }
    }

    /// Replace the stored reading.
    pub fn publish(&self, reading: SensorReading) {
        self.cell.lock(|cell| cell.set(reading));
    }

    /// Copy out the stored reading.
    pub fn snapshot(&self) -> SensorReading {
        self.cell.lock(|cell| cell.get())
    }
}

impl Default for LatestReading {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_zeroed() {
        assert_eq!(LatestReading::new().snapshot(), SensorReading::ZERO);
    }

    #[test]
    fn test_publish_overwrites() {
        let store = LatestReading::new();
        store.publish(SensorReading::new(72, 97, 98.6));
        store.publish(SensorReading::new(80, 95, 99.1));
        assert_eq!(store.snapshot(), SensorReading::new(80, 95, 99.1));
    }

    #[test]
    fn test_readers_on_other_threads_never_see_mixed_samples() {
        let store = LatestReading::new();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 0..5_000 {
                    // Every field carries the same counter, so a torn read
                    // would show up as mismatched fields.
                    store.publish(SensorReading::new(i, i, i as f32));
                }
            });

            scope.spawn(|| {
                for _ in 0..5_000 {
                    let seen = store.snapshot();
                    assert_eq!(seen.pulse_rate, seen.spo2);
                    assert_eq!(seen.pulse_rate as f32, seen.temperature_f);
                }
            });
        });
    }
}
