//! Real-time signal detection with configurable thresholds

use super::config::Thresholds;
use super::types::Record;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalType {
    /// Estimated planetary Kp
    RealtimeKp,
    /// Nowcast northern hemispheric power
    NowcastPower,
    /// Solar wind bulk speed
    BulkSpeed,
    /// Solar wind proton density
    ProtonDensity,
}

impl SignalType {
    /// Stable identifier used in alert keys
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::RealtimeKp => "kp",
            SignalType::NowcastPower => "nowcast-power",
            SignalType::BulkSpeed => "bulk-speed",
            SignalType::ProtonDensity => "proton-density",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            SignalType::RealtimeKp => "",
            SignalType::NowcastPower => " GW",
            SignalType::BulkSpeed => " km/s",
            SignalType::ProtonDensity => " p/cc",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeSignal {
    pub signal_type: SignalType,
    pub value: f64,
    pub threshold: f64,
    pub observed_at: DateTime<Utc>,
}

/// A nowcast whose predicted arrival is now, with high hemispheric power.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrivalSignal {
    pub forecast: String,
    pub arrival: DateTime<Utc>,
    pub north_power: f64,
    pub record: Record,
}

pub struct SignalDetector {
    thresholds: Thresholds,
}

impl SignalDetector {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn with_defaults() -> Self {
        Self::new(Thresholds::default())
    }

    /// Threshold crossings on one aligned minute.
    ///
    /// Every reading at or above its threshold yields a signal; missing
    /// readings never do.
    pub fn detect_realtime(&self, record: &Record) -> Vec<RealtimeSignal> {
        let t = &self.thresholds;
        let checks = [
            (SignalType::RealtimeKp, record.realtime_kp, t.realtime_kp),
            (SignalType::NowcastPower, record.north_power, t.nowcast_power_gw),
            (SignalType::BulkSpeed, record.bulk_speed, t.bulk_speed_kms),
            (SignalType::ProtonDensity, record.proton_density, t.proton_density_pcc),
        ];

        checks
            .into_iter()
            .filter_map(|(signal_type, value, threshold)| {
                let value = value?;
                (value >= threshold).then_some(RealtimeSignal {
                    signal_type,
                    value,
                    threshold,
                    observed_at: record.timestamp,
                })
            })
            .collect()
    }

    /// Arrival check on the record whose forecast is nearest to `now`.
    ///
    /// Fires when the predicted arrival is strictly within the arrival window
    /// and the predicted northern power strictly exceeds its threshold.
    pub fn detect_arrival(&self, record: &Record, now: DateTime<Utc>) -> Option<ArrivalSignal> {
        let arrival = record.forecast_time()?;
        let north_power = record.north_power?;

        let distance = (arrival - now).num_seconds().abs();
        if distance < self.thresholds.arrival_window_secs
            && north_power > self.thresholds.predicted_power_gw
        {
            Some(ArrivalSignal {
                forecast: record.forecast.clone()?,
                arrival,
                north_power,
                record: record.clone(),
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 22, 0, 0).unwrap()
    }

    fn quiet_record() -> Record {
        let mut r = Record::empty(now());
        r.realtime_kp = Some(2.33);
        r.north_power = Some(25.0);
        r.bulk_speed = Some(380.0);
        r.proton_density = Some(4.1);
        r
    }

    #[test]
    fn test_quiet_record_has_no_signals() {
        let detector = SignalDetector::with_defaults();
        assert!(detector.detect_realtime(&quiet_record()).is_empty());
    }

    #[test]
    fn test_boundary_values_trigger() {
        let detector = SignalDetector::with_defaults();
        let mut r = quiet_record();
        r.realtime_kp = Some(5.0);
        r.bulk_speed = Some(500.0);

        let signals = detector.detect_realtime(&r);
        let types: Vec<_> = signals.iter().map(|s| s.signal_type).collect();
        assert_eq!(types, vec![SignalType::RealtimeKp, SignalType::BulkSpeed]);
        assert_eq!(signals[1].threshold, 500.0);
    }

    #[test]
    fn test_missing_readings_never_signal() {
        let detector = SignalDetector::with_defaults();
        assert!(detector.detect_realtime(&Record::empty(now())).is_empty());
    }

    #[test]
    fn test_storm_minute() {
        let detector = SignalDetector::with_defaults();
        let mut r = quiet_record();
        r.realtime_kp = Some(8.67);
        r.north_power = Some(150.0);
        r.bulk_speed = Some(760.0);
        r.proton_density = Some(22.0);

        assert_eq!(detector.detect_realtime(&r).len(), 4);
    }

    #[test]
    fn test_arrival_inside_window() {
        let detector = SignalDetector::with_defaults();
        let mut r = quiet_record();
        r.forecast = Some("2024-05-10_22:01".to_string());
        r.north_power = Some(71.0);

        let signal = detector.detect_arrival(&r, now()).unwrap();
        assert_eq!(signal.arrival, now() + Duration::minutes(1));
        assert_eq!(signal.north_power, 71.0);
    }

    #[test]
    fn test_arrival_requires_window_and_power() {
        let detector = SignalDetector::with_defaults();

        let mut far = quiet_record();
        far.forecast = Some("2024-05-10_22:02".to_string());
        far.north_power = Some(120.0);
        assert!(detector.detect_arrival(&far, now()).is_none());

        let mut weak = quiet_record();
        weak.forecast = Some("2024-05-10_22:00".to_string());
        weak.north_power = Some(70.0);
        assert!(detector.detect_arrival(&weak, now()).is_none());

        let mut no_forecast = quiet_record();
        no_forecast.north_power = Some(120.0);
        assert!(detector.detect_arrival(&no_forecast, now()).is_none());
    }
}
