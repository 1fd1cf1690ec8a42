//! JSON read-out of the latest reading, as served on `/readData`

use core::fmt::Write;

use heapless::String;

use crate::reading::SensorReading;
use crate::store::LatestReading;

/// Enough for three fields at their widest (`i32::MIN` and `f32::MAX`)
pub const READOUT_CAPACITY: usize = 160;

/// Widest `{:.2}` rendering of an `f32` (`-f32::MAX` with two decimals)
const TEMPERATURE_CAPACITY: usize = 48;

/// Two decimals, like the serial log, minus trailing zeros (`98.96`, `99.1`, `32`).
fn format_temperature(temperature_f: f32) -> String<TEMPERATURE_CAPACITY> {
    let mut text: String<TEMPERATURE_CAPACITY> = String::new();
    let _ = write!(text, "{:.2}", temperature_f);

    if text.contains('.') {
        let len = text.trim_end_matches('0').trim_end_matches('.').len();
        text.truncate(len);
    }
    if text.as_str() == "-0" {
        text.clear();
        let _ = text.push('0');
    }
    text
}

/// Format `reading` as the flat JSON object the landing page polls.
///
/// Every value is a JSON string.
pub fn render_readout(reading: &SensorReading) -> String<READOUT_CAPACITY> {
    let mut body = String::new();
    // Cannot overflow: the capacity covers the widest possible values.
    let _ = write!(
        body,
        r#"{{"pulseRateValue":"{}","spo2Value":"{}","tempValue":"{}"}}"#,
        reading.pulse_rate,
        reading.spo2,
        format_temperature(reading.temperature_f)
    );
    body
}

/// Read the store and render it.
pub fn read_latest(store: &LatestReading) -> String<READOUT_CAPACITY> {
    render_readout(&store.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::celsius_to_fahrenheit;

    #[test]
    fn test_readout_matches_page_format() {
        let store = LatestReading::new();
        store.publish(SensorReading::new(80, 95, 99.1));

        assert_eq!(
            read_latest(&store).as_str(),
            r#"{"pulseRateValue":"80","spo2Value":"95","tempValue":"99.1"}"#
        );
    }

    #[test]
    fn test_whole_degrees_have_no_fraction() {
        assert_eq!(
            render_readout(&SensorReading::new(0, 0, 32.0)).as_str(),
            r#"{"pulseRateValue":"0","spo2Value":"0","tempValue":"32"}"#
        );
    }

    #[test]
    fn test_converted_temperature_has_at_most_two_decimals() {
        let reading = SensorReading::new(72, 97, celsius_to_fahrenheit(37.2));
        assert_eq!(
            render_readout(&reading).as_str(),
            r#"{"pulseRateValue":"72","spo2Value":"97","tempValue":"98.96"}"#
        );
        assert_eq!(format_temperature(celsius_to_fahrenheit(25.51)).as_str(), "77.92");
        assert_eq!(format_temperature(-0.001).as_str(), "0");
        assert_eq!(format_temperature(100.0).as_str(), "100");
    }

    #[test]
    fn test_repeated_readouts_are_identical() {
        let store = LatestReading::new();
        store.publish(SensorReading::new(72, 97, 98.6));

        let first = read_latest(&store);
        let second = read_latest(&store);
        assert_eq!(first, second);
        assert!(first.as_str().contains(r#""tempValue":"98.6""#));
    }

    #[test]
    fn test_extreme_values_fit() {
        let body = render_readout(&SensorReading::new(i32::MIN, i32::MIN, f32::MAX));
        assert!(body.ends_with("\"}"));
        assert!(body.contains("-2147483648"));
    }

    #[test]
    fn test_readout_follows_latest_publish() {
        let store = LatestReading::new();
        store.publish(SensorReading::new(72, 97, 98.6));
        store.publish(SensorReading::new(75, 96, 98.7));
        assert!(read_latest(&store).as_str().starts_with(r#"{"pulseRateValue":"75""#));
    }
}
