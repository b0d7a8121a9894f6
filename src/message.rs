/// Low-latency wind sample, broadcast by the hub every few seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct RapidWind {
    pub gust_speed_mps: f64,
    pub direction_degrees: f64,
}

/// Full sensor-suite sample, in the hub's native metric units.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub epoch_seconds: i64,
    pub wind_lull_mps: f64,
    pub wind_avg_mps: f64,
    pub wind_gust_mps: f64,
    pub wind_direction_degrees: f64,
    pub station_pressure_hpa: f64,
    pub air_temperature_celsius: f64,
    pub relative_humidity_pct: f64,
    pub rain_accumulation_mm: f64,
    pub uv_index: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryMessage {
    RapidWind(RapidWind),
    Observation(Observation),
    // The hub speaks more message types than we consume
    Unknown(String),
}
