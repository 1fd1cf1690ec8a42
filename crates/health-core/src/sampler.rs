//! Sampling loop body: read sensors, refresh the store, gate queue pushes

use embassy_time::{Duration, Instant};
use embedded_hal_async::delay::DelayNs;
use log::{debug, info, warn};

use crate::context::MonitorContext;
use crate::queue::PushOutcome;
use crate::reading::{SensorReading, celsius_to_fahrenheit};
use crate::sensors::{OximeterReading, PulseOximeter, Thermometer};

/// Decides when the next snapshot goes to the display queue.
///
/// The gate opens once strictly more than `period` has passed since the last
/// report. The first report is measured from time zero (boot).
#[derive(Debug, Clone, Copy)]
pub struct ReportGate {
    period: Duration,
    last_report: Instant,
}

impl ReportGate {
    pub const fn new(period: Duration) -> Self {
        Self {
            period,
            last_report: Instant::from_ticks(0),
        }
    }

    /// Returns true, and restarts the period, if a report is due at `now`.
    pub fn poll(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_report) > self.period {
            self.last_report = now;
            true
        } else {
            false
        }
    }
}

/// What one sampling iteration did
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    pub reading: SensorReading,
    /// Set when the reporting period elapsed and the reading was pushed
    pub pushed: Option<PushOutcome>,
}

/// Reads both sensors every iteration and feeds the rest of the pipeline.
///
/// Values are not validated: whatever the drivers report, including the
/// zeros an unsynchronized oximeter produces, is published. A failed read
/// publishes placeholders instead (zero pulse and SpO2, the last good
/// temperature) and is logged once per failure streak.
pub struct Sampler<'a, P, T> {
    context: &'a MonitorContext,
    oximeter: P,
    thermometer: T,
    gate: ReportGate,
    last_celsius: f32,
    oximeter_failing: bool,
    thermometer_failing: bool,
}

impl<'a, P, T> Sampler<'a, P, T>
where
    P: PulseOximeter,
    T: Thermometer,
{
    pub fn new(context: &'a MonitorContext, oximeter: P, thermometer: T) -> Self {
        Self {
            context,
            oximeter,
            thermometer,
            gate: ReportGate::new(context.config.reporting_period),
            last_celsius: 0.0,
            oximeter_failing: false,
            thermometer_failing: false,
        }
    }

    /// Read both sensors into a fresh reading.
    pub async fn sample(&mut self) -> SensorReading {
        let pulse = match self.oximeter.update().await {
            Ok(pulse) => {
                if self.oximeter_failing {
                    info!("Pulse oximeter readings recovered");
                    self.oximeter_failing = false;
                }
                if pulse.beats > 0 {
                    debug!("Beat detected!");
                }
                pulse
            }
            Err(e) => {
                if !self.oximeter_failing {
                    warn!("Pulse oximeter read failed, reporting zeros: {}", e);
                    self.oximeter_failing = true;
                }
                OximeterReading::default()
            }
        };

        match self.thermometer.read_celsius().await {
            Ok(celsius) => {
                if self.thermometer_failing {
                    info!("Temperature readings recovered");
                    self.thermometer_failing = false;
                }
                self.last_celsius = celsius;
            }
            Err(e) => {
                if !self.thermometer_failing {
                    warn!("Temperature read failed, repeating last value: {}", e);
                    self.thermometer_failing = true;
                }
            }
        }

        SensorReading::new(
            pulse.heart_rate_bpm as i32,
            i32::from(pulse.spo2_percent),
            celsius_to_fahrenheit(self.last_celsius),
        )
    }

    /// One iteration of the sampling loop at time `now`.
    ///
    /// The store is refreshed unconditionally; the reading is pushed to the
    /// display queue only when the reporting period has elapsed, following
    /// the configured push policy (`delay` times its bounded wait).
    pub async fn step<D: DelayNs>(&mut self, now: Instant, delay: &mut D) -> StepReport {
        let reading = self.sample().await;
        self.context.latest.publish(reading);

        let pushed = if self.gate.poll(now) {
            debug!("Reporting {}", reading);
            let outcome = self
                .context
                .queue
                .push_with(reading, self.context.config.push_policy, delay)
                .await;
            Some(outcome)
        } else {
            None
        };

        StepReport { reading, pushed }
    }
}

#[cfg(test)]
mod tests {
    use core::cell::Cell;

    use embassy_futures::block_on;

    use super::*;
    use crate::config::MonitorConfig;
    use crate::queue::{PushPolicy, ReadingQueue};
    use crate::queue::tests::NoWait;
    use crate::sensors::SensorError;
    use crate::sensors::max30100::FIFO_WINDOW_MS;

    struct FakeOximeter<'a>(&'a Cell<Result<OximeterReading, SensorError>>);

    impl PulseOximeter for FakeOximeter<'_> {
        async fn update(&mut self) -> Result<OximeterReading, SensorError> {
            self.0.get()
        }
    }

    struct FakeThermometer<'a>(&'a Cell<Result<f32, SensorError>>);

    impl Thermometer for FakeThermometer<'_> {
        async fn read_celsius(&mut self) -> Result<f32, SensorError> {
            self.0.get()
        }
    }

    const READ_FAILED: SensorError = SensorError::ReadFailed {
        sensor: "fake",
        operation: "read",
        details: "bus error",
    };

    fn pulse(bpm: f32, spo2: u8) -> Result<OximeterReading, SensorError> {
        Ok(OximeterReading {
            heart_rate_bpm: bpm,
            spo2_percent: spo2,
            beats: 0,
        })
    }

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    #[test]
    fn test_gate_requires_strictly_more_than_a_period() {
        let mut gate = ReportGate::new(Duration::from_millis(1000));
        assert!(!gate.poll(at(0)));
        assert!(!gate.poll(at(1000)));
        assert!(gate.poll(at(1001)));
        assert!(!gate.poll(at(2001)));
        assert!(gate.poll(at(2002)));
    }

    #[test]
    fn test_at_most_one_push_per_reporting_period() {
        let context = MonitorContext::new(MonitorConfig::DEFAULT);
        let oximeter = Cell::new(pulse(72.0, 97));
        let thermometer = Cell::new(Ok(37.0));
        let mut sampler = Sampler::new(
            &context,
            FakeOximeter(&oximeter),
            FakeThermometer(&thermometer),
        );

        // A tight loop: one step every 10 ms of simulated time for 5 s.
        let mut push_times = Vec::new();
        for ms in (0..=5000).step_by(10) {
            let report = block_on(sampler.step(at(ms), &mut NoWait));
            if report.pushed.is_some() {
                assert_eq!(report.pushed, Some(PushOutcome::Queued));
                push_times.push(ms);
            }
        }

        assert_eq!(push_times, vec![1010, 2020, 3030, 4040]);
        assert_eq!(context.queue.len(), 4);
    }

    #[test]
    fn test_bursts_within_a_period_do_not_push() {
        let context = MonitorContext::default();
        let oximeter = Cell::new(pulse(72.0, 97));
        let thermometer = Cell::new(Ok(37.0));
        let mut sampler = Sampler::new(
            &context,
            FakeOximeter(&oximeter),
            FakeThermometer(&thermometer),
        );

        assert!(block_on(sampler.step(at(1500), &mut NoWait)).pushed.is_some());
        for _ in 0..1000 {
            assert!(block_on(sampler.step(at(1900), &mut NoWait)).pushed.is_none());
        }
        assert!(block_on(sampler.step(at(2501), &mut NoWait)).pushed.is_some());
        assert_eq!(context.queue.len(), 2);
    }

    #[test]
    fn test_store_refreshed_every_iteration() {
        let context = MonitorContext::default();
        let oximeter = Cell::new(pulse(72.0, 97));
        let thermometer = Cell::new(Ok(37.0));
        let mut sampler = Sampler::new(
            &context,
            FakeOximeter(&oximeter),
            FakeThermometer(&thermometer),
        );

        block_on(sampler.step(at(10), &mut NoWait));
        assert_eq!(context.latest.snapshot().pulse_rate, 72);

        oximeter.set(pulse(75.9, 96));
        thermometer.set(Ok(100.0));
        block_on(sampler.step(at(20), &mut NoWait));

        // Neither step was due for a push, the store still moved on.
        assert!(context.queue.is_empty());
        assert_eq!(context.latest.snapshot(), SensorReading::new(75, 96, 212.0));
    }

    #[test]
    fn test_unsynced_oximeter_zeros_are_forwarded() {
        let context = MonitorContext::default();
        let oximeter = Cell::new(pulse(0.0, 0));
        let thermometer = Cell::new(Ok(0.0));
        let mut sampler = Sampler::new(
            &context,
            FakeOximeter(&oximeter),
            FakeThermometer(&thermometer),
        );

        let report = block_on(sampler.step(at(1001), &mut NoWait));

        assert_eq!(report.reading, SensorReading::new(0, 0, 32.0));
        assert_eq!(context.queue.try_pop(), Some(SensorReading::new(0, 0, 32.0)));
    }

    #[test]
    fn test_failed_reads_publish_placeholders() {
        let context = MonitorContext::default();
        let oximeter = Cell::new(pulse(72.0, 97));
        let thermometer = Cell::new(Ok(37.0));
        let mut sampler = Sampler::new(
            &context,
            FakeOximeter(&oximeter),
            FakeThermometer(&thermometer),
        );
        let first = block_on(sampler.sample());

        oximeter.set(Err(READ_FAILED));
        thermometer.set(Err(READ_FAILED));
        let second = block_on(sampler.sample());

        assert_eq!(second.pulse_rate, 0);
        assert_eq!(second.spo2, 0);
        assert_eq!(second.temperature_f, first.temperature_f);
    }

    #[test]
    fn test_full_queue_follows_configured_policy() {
        let config = MonitorConfig::DEFAULT.with_push_policy(PushPolicy::DropNewest {
            wait: Duration::from_millis(100),
        });
        let context = MonitorContext::new(config);
        let oximeter = Cell::new(pulse(72.0, 97));
        let thermometer = Cell::new(Ok(37.0));
        let mut sampler = Sampler::new(
            &context,
            FakeOximeter(&oximeter),
            FakeThermometer(&thermometer),
        );

        // Nobody consumes: the eleventh report has nowhere to go.
        let mut outcomes = Vec::new();
        for period in 1..=11u64 {
            let report = block_on(sampler.step(at(period * 1001), &mut NoWait));
            outcomes.push(report.pushed);
        }

        assert!(outcomes[..10].iter().all(|o| *o == Some(PushOutcome::Queued)));
        assert!(matches!(outcomes[10], Some(PushOutcome::Dropped(_))));
        assert_eq!(context.queue.dropped(), 1);
        assert!(context.queue.is_full());
    }

    /// Completes at once but remembers the longest wait it was asked for.
    #[derive(Default)]
    struct LongestWait(u32);

    impl DelayNs for LongestWait {
        async fn delay_ns(&mut self, ns: u32) {
            self.0 = self.0.max(ns);
        }
    }

    #[test]
    fn test_default_policy_wait_fits_in_sensor_fifo() {
        let context = MonitorContext::new(MonitorConfig::DEFAULT);
        for n in 0..ReadingQueue::CAPACITY as i32 {
            context.queue.try_push(SensorReading::new(n, 0, 0.0)).unwrap();
        }
        let oximeter = Cell::new(pulse(72.0, 97));
        let thermometer = Cell::new(Ok(37.0));
        let mut sampler = Sampler::new(
            &context,
            FakeOximeter(&oximeter),
            FakeThermometer(&thermometer),
        );

        let mut delay = LongestWait::default();
        let report = block_on(sampler.step(at(1001), &mut delay));

        assert!(matches!(report.pushed, Some(PushOutcome::Evicted(_))));
        let waited_ms = u64::from(delay.0) / 1_000_000;
        assert!(waited_ms > 0);
        assert!(
            waited_ms < FIFO_WINDOW_MS,
            "sampler stalled {waited_ms} ms, the FIFO overflows after {FIFO_WINDOW_MS} ms"
        );
    }
}
