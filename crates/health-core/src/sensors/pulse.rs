//! Beat detection and SpO2 estimation for raw optical pulse samples
//!
//! The MAX30100 only delivers raw IR and red LED photodiode counts at a fixed
//! sample rate. [`PulseProcessor`] turns that stream into a heart rate and a
//! saturation estimate:
//!
//! - a DC remover per channel strips the slowly varying tissue absorption
//! - a low-pass filter smooths the inverted IR waveform
//! - a threshold-following beat detector times the beats
//! - every few beats the ratio of red to IR AC energy is mapped to SpO2
//!
//! Time is derived from the sample count, so the processor is fully
//! deterministic and does not need a clock.

use num_traits::Float;

/// Rate the sensor is configured to sample at
pub const SAMPLE_RATE_HZ: u32 = 100;

/// Time between two samples in milliseconds
pub const SAMPLE_PERIOD_MS: u32 = 1000 / SAMPLE_RATE_HZ;

const DC_REMOVER_ALPHA: f32 = 0.95;

/// Beat detection is suppressed while the DC removers settle after power-up
const INIT_HOLDOFF_MS: u32 = 2000;
/// Refractory period after a detected beat
const MASKING_HOLDOFF_MS: u32 = 200;
/// Weight of the newest beat interval in the running period average
const PERIOD_FILTER_ALPHA: f32 = 0.6;
const MIN_THRESHOLD: f32 = 20.0;
const MAX_THRESHOLD: f32 = 800.0;
/// How far the waveform must fall below its peak to count as a beat
const STEP_RESILIENCY: f32 = 30.0;
const THRESHOLD_FALLOFF_TARGET: f32 = 0.3;
const THRESHOLD_DECAY_FACTOR: f32 = 0.99;
/// Without a beat for this long, the rate estimate is discarded
const INVALID_READOUT_DELAY_MS: u32 = 2000;

/// SpO2 is recomputed after this many beats
const SPO2_EVERY_N_BEATS: u8 = 3;

/// Saturation by AC energy ratio index
const SPO2_TABLE: [u8; 43] = [
    100, 100, 100, 100, 99, 99, 99, 99, 99, 99, 98, 98, 98, 98, 98, 97, 97, 97, 97, 97, 97, 96, 96,
    96, 96, 96, 96, 95, 95, 95, 95, 95, 95, 94, 94, 94, 94, 94, 93, 93, 93, 93, 93,
];

/// One FIFO entry from the sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawPulseSample {
    pub ir: u16,
    pub red: u16,
}

/// First-order high-pass removing the DC component of a channel
#[derive(Debug, Clone, Copy, Default)]
struct DcRemover {
    w: f32,
}

impl DcRemover {
    fn step(&mut self, x: f32) -> f32 {
        let previous = self.w;
        self.w = x + DC_REMOVER_ALPHA * self.w;
        self.w - previous
    }
}

/// Second-order Butterworth low-pass, fs = 100 Hz, fc = 10 Hz
#[derive(Debug, Clone, Copy, Default)]
struct LowPass {
    v: [f32; 2],
}

impl LowPass {
    fn step(&mut self, x: f32) -> f32 {
        self.v[0] = self.v[1];
        self.v[1] = 2.452_372_8e-1 * x + 0.509_525_45 * self.v[0];
        self.v[0] + self.v[1]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DetectorState {
    Init,
    Waiting,
    FollowingSlope,
    MaybeDetected,
    Masking,
}

#[derive(Debug, Clone, Copy)]
struct BeatDetector {
    state: DetectorState,
    threshold: f32,
    beat_period_ms: f32,
    last_max: f32,
    last_beat_ms: u32,
}

impl BeatDetector {
    const fn new() -> Self {
        Self {
            state: DetectorState::Init,
            threshold: MIN_THRESHOLD,
            beat_period_ms: 0.0,
            last_max: 0.0,
            last_beat_ms: 0,
        }
    }

    fn rate_bpm(&self) -> f32 {
        if self.beat_period_ms > 0.0 {
            60_000.0 / self.beat_period_ms
        } else {
            0.0
        }
    }

    /// Feed one filtered sample taken at `now_ms`; returns true on a beat.
    fn check(&mut self, sample: f32, now_ms: u32) -> bool {
        let mut beat = false;

        match self.state {
            DetectorState::Init => {
                if now_ms > INIT_HOLDOFF_MS {
                    self.state = DetectorState::Waiting;
                }
            }
            DetectorState::Waiting => {
                if sample > self.threshold {
                    self.threshold = sample.min(MAX_THRESHOLD);
                    self.state = DetectorState::FollowingSlope;
                }

                if now_ms.wrapping_sub(self.last_beat_ms) > INVALID_READOUT_DELAY_MS {
                    self.beat_period_ms = 0.0;
                    self.last_max = 0.0;
                }

                self.decrease_threshold();
            }
            DetectorState::FollowingSlope => {
                if sample < self.threshold {
                    self.state = DetectorState::MaybeDetected;
                } else {
                    self.threshold = sample.min(MAX_THRESHOLD);
                }
            }
            DetectorState::MaybeDetected => {
                if sample + STEP_RESILIENCY < self.threshold {
                    beat = true;
                    self.last_max = sample;
                    self.state = DetectorState::Masking;

                    let delta = now_ms.wrapping_sub(self.last_beat_ms) as f32;
                    if delta > 0.0 {
                        self.beat_period_ms = PERIOD_FILTER_ALPHA * delta
                            + (1.0 - PERIOD_FILTER_ALPHA) * self.beat_period_ms;
                    }
                    self.last_beat_ms = now_ms;
                } else {
                    self.state = DetectorState::FollowingSlope;
                }
            }
            DetectorState::Masking => {
                if now_ms.wrapping_sub(self.last_beat_ms) > MASKING_HOLDOFF_MS {
                    self.state = DetectorState::Waiting;
                }
                self.decrease_threshold();
            }
        }

        beat
    }

    fn decrease_threshold(&mut self) {
        if self.last_max > 0.0 && self.beat_period_ms > 0.0 {
            let samples_per_beat = self.beat_period_ms / SAMPLE_PERIOD_MS as f32;
            self.threshold -= self.last_max * (1.0 - THRESHOLD_FALLOFF_TARGET) / samples_per_beat;
        } else {
            self.threshold *= THRESHOLD_DECAY_FACTOR;
        }

        if self.threshold < MIN_THRESHOLD {
            self.threshold = MIN_THRESHOLD;
        }
    }
}

/// Accumulates AC energy of both channels between SpO2 updates
#[derive(Debug, Clone, Copy, Default)]
struct Spo2Estimator {
    ir_sq_sum: f32,
    red_sq_sum: f32,
    samples: u32,
    beats: u8,
    spo2: u8,
}

impl Spo2Estimator {
    fn update(&mut self, ir_ac: f32, red_ac: f32, beat: bool) {
        self.ir_sq_sum += ir_ac * ir_ac;
        self.red_sq_sum += red_ac * red_ac;
        self.samples += 1;

        if !beat {
            return;
        }

        self.beats += 1;
        if self.beats < SPO2_EVERY_N_BEATS {
            return;
        }

        let n = self.samples as f32;
        if let Some(ratio) = energy_ratio(self.red_sq_sum / n, self.ir_sq_sum / n) {
            let index = if ratio > 66.0 {
                (ratio - 66.0) as usize
            } else if ratio > 50.0 {
                (ratio - 50.0) as usize
            } else {
                0
            };
            self.spo2 = SPO2_TABLE[index.min(SPO2_TABLE.len() - 1)];
        }

        *self = Self {
            spo2: self.spo2,
            ..Self::default()
        };
    }
}

/// `100 * ln(red) / ln(ir)` of the mean AC energies, `None` when undefined.
fn energy_ratio(red_mean: f32, ir_mean: f32) -> Option<f32> {
    if !(red_mean > 0.0 && ir_mean > 0.0) {
        return None;
    }
    let ir_ln = Float::ln(ir_mean);
    let ratio = 100.0 * Float::ln(red_mean) / ir_ln;
    ratio.is_finite().then_some(ratio)
}

/// Turns the raw sample stream into heart rate and SpO2.
#[derive(Debug, Clone, Copy)]
pub struct PulseProcessor {
    ir_dc: DcRemover,
    red_dc: DcRemover,
    low_pass: LowPass,
    detector: BeatDetector,
    spo2: Spo2Estimator,
    elapsed_ms: u32,
}

impl PulseProcessor {
    pub const fn new() -> Self {
        Self {
            ir_dc: DcRemover { w: 0.0 },
            red_dc: DcRemover { w: 0.0 },
            low_pass: LowPass { v: [0.0; 2] },
            detector: BeatDetector::new(),
            spo2: Spo2Estimator {
                ir_sq_sum: 0.0,
                red_sq_sum: 0.0,
                samples: 0,
                beats: 0,
                spo2: 0,
            },
            elapsed_ms: 0,
        }
    }

    /// Process one sample; returns true if it completed a beat.
    pub fn push(&mut self, sample: RawPulseSample) -> bool {
        self.elapsed_ms = self.elapsed_ms.wrapping_add(SAMPLE_PERIOD_MS);

        let ir_ac = self.ir_dc.step(sample.ir as f32);
        let red_ac = self.red_dc.step(sample.red as f32);

        let pulse = self.low_pass.step(-ir_ac);
        let beat = self.detector.check(pulse, self.elapsed_ms);
        self.spo2.update(ir_ac, red_ac, beat);

        if self.detector.rate_bpm() == 0.0 {
            // Lost the pulse, the saturation estimate is stale as well.
            self.spo2.spo2 = 0;
        }

        beat
    }

    /// Averaged heart rate, zero until beats are being detected
    pub fn heart_rate_bpm(&self) -> f32 {
        self.detector.rate_bpm()
    }

    /// Latest SpO2 estimate in percent, zero until enough beats were seen
    pub fn spo2_percent(&self) -> u8 {
        self.spo2.spo2
    }
}

impl Default for PulseProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A 72 bpm pulse riding on a large DC level, like a finger on the sensor.
    pub(crate) fn synthetic_pulse(seconds: u32) -> impl Iterator<Item = RawPulseSample> {
        let beat_hz = 72.0 / 60.0;
        (0..seconds * SAMPLE_RATE_HZ).map(move |n| {
            let t = n as f64 / SAMPLE_RATE_HZ as f64;
            let wave = (2.0 * core::f64::consts::PI * beat_hz * t).sin();
            RawPulseSample {
                ir: (50_000.0 + 500.0 * wave) as u16,
                red: (40_000.0 + 300.0 * wave) as u16,
            }
        })
    }

    #[test]
    fn test_energy_ratio() {
        assert_eq!(energy_ratio(86_000.0, 86_000.0), Some(100.0));
        let ratio = energy_ratio(20_000.0, 86_000.0).unwrap();
        assert!((ratio - 87.16).abs() < 0.01, "ratio {ratio}");
    }

    #[test]
    fn test_energy_ratio_undefined_without_signal() {
        assert_eq!(energy_ratio(0.0, 86_000.0), None);
        assert_eq!(energy_ratio(20_000.0, 0.0), None);
        // ln(1) = 0 in the denominator
        assert_eq!(energy_ratio(20_000.0, 1.0), None);
    }

    #[test]
    fn test_no_beats_during_init_holdoff() {
        let mut processor = PulseProcessor::new();
        let beats = synthetic_pulse(2).filter(|s| processor.push(*s)).count();
        assert_eq!(beats, 0);
        assert_eq!(processor.heart_rate_bpm(), 0.0);
    }

    #[test]
    fn test_locks_onto_steady_pulse() {
        let mut processor = PulseProcessor::new();
        let beats = synthetic_pulse(12).filter(|s| processor.push(*s)).count();

        assert!(beats >= 6, "only {beats} beats detected");
        let bpm = processor.heart_rate_bpm();
        assert!((60.0..=85.0).contains(&bpm), "heart rate {bpm}");
        let spo2 = processor.spo2_percent();
        assert!((90..=100).contains(&spo2), "spo2 {spo2}");
    }

    #[test]
    fn test_flat_signal_reports_zero() {
        let mut processor = PulseProcessor::new();
        for _ in 0..(5 * SAMPLE_RATE_HZ) {
            processor.push(RawPulseSample {
                ir: 50_000,
                red: 40_000,
            });
        }
        assert_eq!(processor.heart_rate_bpm(), 0.0);
        assert_eq!(processor.spo2_percent(), 0);
    }

    #[test]
    fn test_rate_resets_after_finger_removed() {
        let mut processor = PulseProcessor::new();
        synthetic_pulse(10).for_each(|s| {
            processor.push(s);
        });
        assert!(processor.heart_rate_bpm() > 0.0);

        for _ in 0..(4 * SAMPLE_RATE_HZ) {
            processor.push(RawPulseSample { ir: 0, red: 0 });
        }
        assert_eq!(processor.heart_rate_bpm(), 0.0);
        assert_eq!(processor.spo2_percent(), 0);
    }
}
