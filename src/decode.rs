//! Decoding of the hub's JSON datagrams.
//!
//! Every datagram is a JSON object with a string `type` field. The two types
//! we consume carry their readings in positional arrays:
//!
//! - `rapid_wind`: `ob` is `[epoch, speed m/s, direction deg]`
//! - `obs_st`: `obs` is a list of samples, newest first, each laid out as
//!   `[epoch, lull, avg, gust, direction, interval, pressure, temp, rh, rain, uv, ...]`
//!
//! The indices below are the hub's wire format and must not move.

use chrono::{TimeZone, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::message::{Observation, RapidWind, TelemetryMessage};

const RAPID_WIND_SPEED: usize = 1;
const RAPID_WIND_DIRECTION: usize = 2;

const OBS_EPOCH: usize = 0;
const OBS_WIND_LULL: usize = 1;
const OBS_WIND_AVG: usize = 2;
const OBS_WIND_GUST: usize = 3;
const OBS_WIND_DIRECTION: usize = 4;
const OBS_STATION_PRESSURE: usize = 6;
const OBS_AIR_TEMPERATURE: usize = 7;
const OBS_RELATIVE_HUMIDITY: usize = 8;
const OBS_RAIN_ACCUMULATION: usize = 9;
const OBS_UV_INDEX: usize = 10;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("malformed payload: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> DecodeError {
        DecodeError::Malformed(err.to_string())
    }
}

fn malformed<S: Into<String>>(reason: S) -> DecodeError {
    DecodeError::Malformed(reason.into())
}

fn parse_object(bytes: &[u8]) -> Result<serde_json::Map<String, Value>, DecodeError> {
    let text = std::str::from_utf8(bytes)?;
    match serde_json::from_str(text)? {
        Value::Object(map) => Ok(map),
        _ => Err(malformed("top level is not an object")),
    }
}

/// Decode one datagram as broadcast by the hub.
pub fn decode(bytes: &[u8]) -> Result<TelemetryMessage, DecodeError> {
    let object = parse_object(bytes)?;
    let kind = object
        .get("type")
        .ok_or_else(|| malformed("missing `type`"))?
        .as_str()
        .ok_or_else(|| malformed("`type` is not a string"))?;

    match kind {
        "rapid_wind" => decode_rapid_wind(object.get("ob")).map(TelemetryMessage::RapidWind),
        "obs_st" => decode_observation(object.get("obs")).map(TelemetryMessage::Observation),
        other => Ok(TelemetryMessage::Unknown(other.to_string())),
    }
}

/// Decode the body of the station REST endpoint, which carries the same
/// `obs` layout as `obs_st` but no `type` discriminator.
pub fn decode_station_observations(bytes: &[u8]) -> Result<TelemetryMessage, DecodeError> {
    let object = parse_object(bytes)?;
    decode_observation(object.get("obs")).map(TelemetryMessage::Observation)
}

fn number_at(sample: &[Value], index: usize, field: &'static str) -> Result<f64, DecodeError> {
    sample
        .get(index)
        .and_then(Value::as_f64)
        .ok_or_else(|| malformed(format!("{} at index {} is not a number", field, index)))
}

fn decode_rapid_wind(ob: Option<&Value>) -> Result<RapidWind, DecodeError> {
    let ob = ob
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("rapid_wind without `ob` array"))?;
    if ob.len() <= RAPID_WIND_DIRECTION {
        return Err(malformed(format!(
            "rapid_wind `ob` has {} elements, expected at least {}",
            ob.len(),
            RAPID_WIND_DIRECTION + 1
        )));
    }

    Ok(RapidWind {
        gust_speed_mps: number_at(ob, RAPID_WIND_SPEED, "wind speed")?,
        direction_degrees: number_at(ob, RAPID_WIND_DIRECTION, "wind direction")?,
    })
}

fn decode_observation(obs: Option<&Value>) -> Result<Observation, DecodeError> {
    let sample = obs
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("observation without `obs` array"))?
        .first()
        .ok_or_else(|| malformed("`obs` holds no samples"))?
        .as_array()
        .ok_or_else(|| malformed("observation sample is not an array"))?;
    if sample.len() <= OBS_UV_INDEX {
        return Err(malformed(format!(
            "observation sample has {} elements, expected at least {}",
            sample.len(),
            OBS_UV_INDEX + 1
        )));
    }

    let epoch_seconds = sample[OBS_EPOCH]
        .as_i64()
        .ok_or_else(|| malformed("observation timestamp is not an integer"))?;
    if Utc.timestamp_opt(epoch_seconds, 0).single().is_none() {
        return Err(malformed(format!(
            "observation timestamp {} is out of range",
            epoch_seconds
        )));
    }

    Ok(Observation {
        epoch_seconds,
        wind_lull_mps: number_at(sample, OBS_WIND_LULL, "wind lull")?,
        wind_avg_mps: number_at(sample, OBS_WIND_AVG, "wind average")?,
        wind_gust_mps: number_at(sample, OBS_WIND_GUST, "wind gust")?,
        wind_direction_degrees: number_at(sample, OBS_WIND_DIRECTION, "wind direction")?,
        station_pressure_hpa: number_at(sample, OBS_STATION_PRESSURE, "station pressure")?,
        air_temperature_celsius: number_at(sample, OBS_AIR_TEMPERATURE, "air temperature")?,
        relative_humidity_pct: number_at(sample, OBS_RELATIVE_HUMIDITY, "relative humidity")?,
        rain_accumulation_mm: number_at(sample, OBS_RAIN_ACCUMULATION, "rain accumulation")?,
        uv_index: number_at(sample, OBS_UV_INDEX, "uv index")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const OBS_ST: &str = r#"{"serial_number":"ST-00000512","type":"obs_st","hub_sn":"HB-00013030","obs":[[1700000000,1.0,2.0,3.0,180,3,1013.0,20.0,55,0.0,5.0,0,0,0,2.4,1]],"firmware_revision":129}"#;

    fn assert_malformed(result: Result<TelemetryMessage, DecodeError>) {
        match result {
            Err(DecodeError::Malformed(_)) => {}
            other => panic!("expected malformed, got {:?}", other),
        }
    }

    #[test]
    fn decodes_rapid_wind() {
        let message = decode(br#"{"type":"rapid_wind","ob":[1588948614,0.18,42]}"#).unwrap();
        assert_eq!(
            message,
            TelemetryMessage::RapidWind(RapidWind {
                gust_speed_mps: 0.18,
                direction_degrees: 42.0,
            })
        );
    }

    #[test]
    fn decodes_first_observation_sample_by_position() {
        let message = decode(OBS_ST.as_bytes()).unwrap();
        assert_eq!(
            message,
            TelemetryMessage::Observation(Observation {
                epoch_seconds: 1_700_000_000,
                wind_lull_mps: 1.0,
                wind_avg_mps: 2.0,
                wind_gust_mps: 3.0,
                wind_direction_degrees: 180.0,
                station_pressure_hpa: 1013.0,
                air_temperature_celsius: 20.0,
                relative_humidity_pct: 55.0,
                rain_accumulation_mm: 0.0,
                uv_index: 5.0,
            })
        );
    }

    #[test]
    fn only_newest_sample_is_read() {
        let payload = br#"{"type":"obs_st","obs":[[1,0,0,0,90,0,1000,10,40,0,1],[0,"x"]]}"#;
        match decode(payload).unwrap() {
            TelemetryMessage::Observation(obs) => assert_eq!(obs.air_temperature_celsius, 10.0),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unsupported_type_is_not_an_error() {
        let message = decode(br#"{"type":"hub_status","uptime":1670133}"#).unwrap();
        assert_eq!(message, TelemetryMessage::Unknown("hub_status".to_string()));
    }

    #[test]
    fn invalid_utf8_is_an_encoding_error() {
        match decode(&[b'{', 0xff, 0xfe, b'}']) {
            Err(DecodeError::Encoding(_)) => {}
            other => panic!("expected encoding error, got {:?}", other),
        }
    }

    #[test]
    fn rejects_non_json_and_missing_type() {
        assert_malformed(decode(b"not json"));
        assert_malformed(decode(b"[1,2,3]"));
        assert_malformed(decode(br#"{"ob":[0,1,2]}"#));
        assert_malformed(decode(br#"{"type":7}"#));
    }

    #[test]
    fn rejects_short_or_non_numeric_rapid_wind() {
        assert_malformed(decode(br#"{"type":"rapid_wind"}"#));
        assert_malformed(decode(br#"{"type":"rapid_wind","ob":[1588948614,0.18]}"#));
        assert_malformed(decode(br#"{"type":"rapid_wind","ob":[1588948614,"fast",42]}"#));
        assert_malformed(decode(br#"{"type":"rapid_wind","ob":[1588948614,0.18,null]}"#));
    }

    #[test]
    fn rejects_short_or_non_numeric_observation() {
        assert_malformed(decode(br#"{"type":"obs_st"}"#));
        assert_malformed(decode(br#"{"type":"obs_st","obs":[]}"#));
        assert_malformed(decode(br#"{"type":"obs_st","obs":[[1700000000,1.0,2.0]]}"#));
        assert_malformed(decode(
            br#"{"type":"obs_st","obs":[[1700000000,1.0,2.0,3.0,180,0,1013.0,null,55,0.0,5.0]]}"#,
        ));
        assert_malformed(decode(
            br#"{"type":"obs_st","obs":[[17.5,1.0,2.0,3.0,180,0,1013.0,20.0,55,0.0,5.0]]}"#,
        ));
    }

    #[test]
    fn rejects_unrepresentable_observation_timestamp() {
        assert_malformed(decode(
            br#"{"type":"obs_st","obs":[[9223372036854775807,1.0,2.0,3.0,180,0,1013.0,20.0,55,0.0,5.0]]}"#,
        ));
        assert_malformed(decode_station_observations(
            br#"{"obs":[[-9223372036854775808,1.0,2.0,3.0,180,0,1013.0,20.0,55,0.0,5.0]]}"#,
        ));
    }

    #[test]
    fn truncated_datagram_is_malformed() {
        let truncated = &OBS_ST.as_bytes()[..OBS_ST.len() / 2];
        assert_malformed(decode(truncated));
    }

    #[test]
    fn station_body_uses_same_layout() {
        let body = br#"{"station_id":1234,"obs":[[1700000000,1.0,2.0,3.0,180,0,1013.0,20.0,55,0.0,5.0]]}"#;
        let from_rest = decode_station_observations(body).unwrap();
        let from_hub = decode(OBS_ST.as_bytes()).unwrap();
        assert_eq!(from_rest, from_hub);
    }
}
