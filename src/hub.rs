//! The single current-conditions record and its update/publish contract.
//!
//! `WeatherHub` is the only writer of `WeatherState`. Every merge and every
//! snapshot happens under one lock, so readers never see half of an
//! observation applied.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use log::{debug, trace, warn};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::{
    decode::decode,
    message::TelemetryMessage,
    normalize::{normalize, Cardinal, ConditionsUpdate, Normalized, WindUpdate},
};

// Slow subscribers lose the oldest snapshots past this many
const NOTIFY_CAPACITY: usize = 64;

/// Latest known conditions, in consumer-facing units.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeatherState {
    pub wind_gust_mph: Option<f64>,
    pub wind_avg_mph: Option<f64>,
    pub wind_lull_mph: Option<f64>,
    pub wind_direction_degrees: Option<f64>,
    pub wind_cardinal: Option<Cardinal>,
    pub temperature_fahrenheit: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub station_pressure_hpa: Option<f64>,
    // Millimeters accumulated over the hub's last reporting interval
    pub rain_rate: Option<f64>,
    pub uv_index: Option<f64>,
    pub observed_at: Option<DateTime<Utc>>,
    pub last_updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    WindGust,
    WindAvg,
    WindLull,
    WindDirection,
    WindCardinal,
    Temperature,
    Humidity,
    StationPressure,
    RainRate,
    UvIndex,
    ObservedAt,
    LastUpdatedAt,
}

/// The fields whose value changed during one `apply`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppliedUpdate {
    changed: Vec<Field>,
}

impl AppliedUpdate {
    pub fn is_noop(&self) -> bool {
        self.changed.is_empty()
    }

    pub fn changed(&self) -> &[Field] {
        &self.changed
    }

    fn set<T: PartialEq>(&mut self, slot: &mut Option<T>, value: T, field: Field) {
        if slot.as_ref() != Some(&value) {
            self.changed.push(field);
        }
        *slot = Some(value);
    }
}

impl WeatherState {
    fn merge_wind(&mut self, wind: WindUpdate, update: &mut AppliedUpdate) {
        update.set(&mut self.wind_gust_mph, wind.gust_mph, Field::WindGust);
        update.set(
            &mut self.wind_direction_degrees,
            wind.direction_degrees,
            Field::WindDirection,
        );
        update.set(&mut self.wind_cardinal, wind.cardinal, Field::WindCardinal);
    }

    fn merge_conditions(&mut self, conditions: ConditionsUpdate, update: &mut AppliedUpdate) {
        self.merge_wind(conditions.wind, update);
        update.set(&mut self.wind_avg_mph, conditions.wind_avg_mph, Field::WindAvg);
        update.set(&mut self.wind_lull_mph, conditions.wind_lull_mph, Field::WindLull);
        update.set(
            &mut self.temperature_fahrenheit,
            conditions.temperature_fahrenheit,
            Field::Temperature,
        );
        update.set(&mut self.humidity_pct, conditions.humidity_pct, Field::Humidity);
        update.set(
            &mut self.station_pressure_hpa,
            conditions.station_pressure_hpa,
            Field::StationPressure,
        );
        update.set(&mut self.rain_rate, conditions.rain_rate, Field::RainRate);
        update.set(&mut self.uv_index, conditions.uv_index, Field::UvIndex);
        // Never keep the previous sample's time next to new readings
        if self.observed_at != conditions.observed_at {
            self.observed_at = conditions.observed_at;
            update.changed.push(Field::ObservedAt);
        }
    }

    /// Stamp the update time, never letting it stall or move backwards.
    fn touch(&mut self, now: DateTime<Utc>, update: &mut AppliedUpdate) {
        let stamp = match self.last_updated_at {
            Some(previous) if now <= previous => previous + Duration::nanoseconds(1),
            _ => now,
        };
        update.set(&mut self.last_updated_at, stamp, Field::LastUpdatedAt);
    }
}

pub struct WeatherHub {
    state: Mutex<WeatherState>,
    notify: broadcast::Sender<WeatherState>,
}

impl WeatherHub {
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            state: Mutex::new(WeatherState::default()),
            notify,
        }
    }

    // Merges never leave the state half-written, so a poisoned lock is still
    // safe to read.
    fn lock(&self) -> MutexGuard<'_, WeatherState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A point-in-time copy of the current state.
    pub fn snapshot(&self) -> WeatherState {
        self.lock().clone()
    }

    /// Receives a fresh snapshot after every apply that changed something.
    pub fn subscribe(&self) -> broadcast::Receiver<WeatherState> {
        self.notify.subscribe()
    }

    pub fn apply(&self, message: &TelemetryMessage) -> AppliedUpdate {
        let normalized = match normalize(message) {
            Some(normalized) => normalized,
            None => return AppliedUpdate::default(),
        };

        let mut update = AppliedUpdate::default();
        let mut state = self.lock();
        match normalized {
            Normalized::Wind(wind) => state.merge_wind(wind, &mut update),
            Normalized::Conditions(conditions) => state.merge_conditions(conditions, &mut update),
        }
        state.touch(Utc::now(), &mut update);

        // Sent under the lock so subscribers see updates in apply order
        self.notify.send(state.clone()).ok();
        update
    }

    /// Decode, normalize and apply one raw payload. Bad payloads are dropped
    /// and leave the state untouched.
    pub fn ingest(&self, payload: &[u8]) -> Option<AppliedUpdate> {
        let message = match decode(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!("dropping {} byte payload: {}", payload.len(), e);
                return None;
            }
        };

        if let TelemetryMessage::Unknown(kind) = &message {
            debug!("ignoring message of type `{}`", kind);
        }

        let update = self.apply(&message);
        if !update.is_noop() {
            trace!("applied update to {:?}", update.changed());
        }
        Some(update)
    }
}

impl Default for WeatherHub {
    fn default() -> Self {
        Self::new()
    }
}
