use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Serialize, Serializer};

use crate::message::TelemetryMessage;

/// Meters per second to miles per hour. The old scripts also used 2.237 in
/// places; the difference stays below 0.03%.
pub const MPS_TO_MPH: f64 = 2.23694;

const SECTOR_DEGREES: f64 = 22.5;

#[inline]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[inline]
pub fn mps_to_mph(mps: f64) -> f64 {
    round2(mps * MPS_TO_MPH)
}

#[inline]
pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    round2(celsius * 9.0 / 5.0 + 32.0)
}

/// One of the 16 compass points.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinal {
    N,
    NNE,
    NE,
    ENE,
    E,
    ESE,
    SE,
    SSE,
    S,
    SSW,
    SW,
    WSW,
    W,
    WNW,
    NW,
    NNW,
}

const COMPASS: [Cardinal; 16] = [
    Cardinal::N,
    Cardinal::NNE,
    Cardinal::NE,
    Cardinal::ENE,
    Cardinal::E,
    Cardinal::ESE,
    Cardinal::SE,
    Cardinal::SSE,
    Cardinal::S,
    Cardinal::SSW,
    Cardinal::SW,
    Cardinal::WSW,
    Cardinal::W,
    Cardinal::WNW,
    Cardinal::NW,
    Cardinal::NNW,
];

impl Cardinal {
    /// Sector boundaries round half away from zero, so 11.25 is NNE and
    /// 348.75 wraps to N.
    pub fn from_degrees(degrees: f64) -> Cardinal {
        let sector = (degrees.rem_euclid(360.0) / SECTOR_DEGREES).round() as usize;
        COMPASS[sector % COMPASS.len()]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Cardinal::N => "N",
            Cardinal::NNE => "NNE",
            Cardinal::NE => "NE",
            Cardinal::ENE => "ENE",
            Cardinal::E => "E",
            Cardinal::ESE => "ESE",
            Cardinal::SE => "SE",
            Cardinal::SSE => "SSE",
            Cardinal::S => "S",
            Cardinal::SSW => "SSW",
            Cardinal::SW => "SW",
            Cardinal::WSW => "WSW",
            Cardinal::W => "W",
            Cardinal::WNW => "WNW",
            Cardinal::NW => "NW",
            Cardinal::NNW => "NNW",
        }
    }
}

impl fmt::Display for Cardinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Cardinal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindUpdate {
    pub gust_mph: f64,
    pub direction_degrees: f64,
    pub cardinal: Cardinal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionsUpdate {
    pub observed_at: Option<DateTime<Utc>>,
    pub wind_lull_mph: f64,
    pub wind_avg_mph: f64,
    pub wind: WindUpdate,
    pub temperature_fahrenheit: f64,
    pub humidity_pct: f64,
    pub station_pressure_hpa: f64,
    pub rain_rate: f64,
    pub uv_index: f64,
}

/// A decoded message in consumer-facing units.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Wind(WindUpdate),
    Conditions(ConditionsUpdate),
}

fn wind(gust_mps: f64, direction_degrees: f64) -> WindUpdate {
    WindUpdate {
        gust_mph: mps_to_mph(gust_mps),
        direction_degrees,
        cardinal: Cardinal::from_degrees(direction_degrees),
    }
}

/// Returns `None` for message types that carry nothing we track.
pub fn normalize(message: &TelemetryMessage) -> Option<Normalized> {
    match message {
        TelemetryMessage::RapidWind(rapid) => Some(Normalized::Wind(wind(
            rapid.gust_speed_mps,
            rapid.direction_degrees,
        ))),
        TelemetryMessage::Observation(obs) => Some(Normalized::Conditions(ConditionsUpdate {
            observed_at: Utc.timestamp_opt(obs.epoch_seconds, 0).single(),
            wind_lull_mph: mps_to_mph(obs.wind_lull_mps),
            wind_avg_mph: mps_to_mph(obs.wind_avg_mps),
            wind: wind(obs.wind_gust_mps, obs.wind_direction_degrees),
            temperature_fahrenheit: celsius_to_fahrenheit(obs.air_temperature_celsius),
            humidity_pct: obs.relative_humidity_pct,
            station_pressure_hpa: obs.station_pressure_hpa,
            rain_rate: obs.rain_accumulation_mm,
            uv_index: obs.uv_index,
        })),
        TelemetryMessage::Unknown(_) => None,
    }
}
