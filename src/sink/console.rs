use std::fmt::Display;

use async_trait::async_trait;

use super::Sink;
use crate::hub::WeatherState;

pub struct ConsoleSink;

fn or_dash<T: Display>(value: Option<T>) -> String {
    value.map_or_else(|| "--".to_string(), |v| v.to_string())
}

fn describe(state: &WeatherState) -> String {
    format!(
        "[update] {}: gust {} mph from {} ({} deg), avg {} mph, lull {} mph, temp {}F, humidity {}%, pressure {} hPa, rain {} mm, uv {}",
        or_dash(state.last_updated_at),
        or_dash(state.wind_gust_mph),
        or_dash(state.wind_cardinal),
        or_dash(state.wind_direction_degrees),
        or_dash(state.wind_avg_mph),
        or_dash(state.wind_lull_mph),
        or_dash(state.temperature_fahrenheit),
        or_dash(state.humidity_pct),
        or_dash(state.station_pressure_hpa),
        or_dash(state.rain_rate),
        or_dash(state.uv_index),
    )
}

#[async_trait]
impl Sink for ConsoleSink {
    async fn update(&mut self, state: &WeatherState) -> anyhow::Result<()> {
        println!("{}", describe(state));
        Ok(())
    }
}
