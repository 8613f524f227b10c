//! Structural decoding of partner daily-metric payloads.
//!
//! The partner API has shipped three response shapes without a version flag:
//! a bare array of flat records, an object whose `data` member is that array,
//! and a `data.metrics` map from date to typed fragments. The shape is told
//! apart by which keys are present, never by an out-of-band signal.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use somna_types::{date_only, CanonicalMetric, MetricFields};

use crate::PartnerError;

const UPSTREAM_ERROR_FALLBACK_STATUS: u16 = 502;

/// Recognized layouts of a successful partner response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WireShape<'a> {
    FlatArray(&'a [Value]),
    Enveloped(&'a [Value]),
    FragmentMap(&'a Map<String, Value>),
    /// Lone flat record, as older revisions returned for single-date queries.
    FlatObject(&'a Map<String, Value>),
}

/// Fragment types folded into canonical fields, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum FragmentKind {
    Sleep,
    AvgSleepHrv,
    SleepRhr,
    RecoveryIndex,
    MovementIndex,
    ReadinessScore,
    ActiveMinutes,
    Vo2Max,
    MetabolicScore,
    NightRhr,
}

impl FragmentKind {
    fn from_type(raw: &str) -> Option<Self> {
        match raw {
            "sleep" => Some(Self::Sleep),
            "avg_sleep_hrv" => Some(Self::AvgSleepHrv),
            "sleep_rhr" => Some(Self::SleepRhr),
            "recovery_index" => Some(Self::RecoveryIndex),
            "movement_index" => Some(Self::MovementIndex),
            "readiness_score" => Some(Self::ReadinessScore),
            "active_minutes" => Some(Self::ActiveMinutes),
            "vo2_max" => Some(Self::Vo2Max),
            "metabolic_score" => Some(Self::MetabolicScore),
            "night_rhr" => Some(Self::NightRhr),
            _ => None,
        }
    }
}

/// Classifies a 2xx response body.
///
/// An object carrying a non-null `error` member is an upstream rejection even
/// though the HTTP status said otherwise.
pub fn detect_wire_shape(payload: &Value) -> Result<WireShape<'_>, PartnerError> {
    let object = match payload {
        Value::Array(items) => return Ok(WireShape::FlatArray(items)),
        Value::Object(object) => object,
        _ => {
            return Err(PartnerError::malformed(
                "response body must be a JSON array or object",
            ))
        }
    };

    if object.get("error").is_some_and(|error| !error.is_null()) {
        return Err(upstream_error_from_body(object, payload));
    }

    match object.get("data") {
        Some(Value::Object(data)) => match data.get("metrics") {
            Some(Value::Object(metrics)) => Ok(WireShape::FragmentMap(metrics)),
            Some(_) => Err(PartnerError::malformed(
                "data.metrics must be an object keyed by date",
            )),
            None => Err(PartnerError::malformed("data object has no metrics map")),
        },
        Some(Value::Array(items)) => Ok(WireShape::Enveloped(items)),
        Some(_) => Err(PartnerError::malformed(
            "data must be an array of records or a metrics object",
        )),
        None if object.contains_key("date") => Ok(WireShape::FlatObject(object)),
        None => Err(PartnerError::malformed("unrecognized response shape")),
    }
}

/// Converts a successful response body into canonical records.
///
/// `subject_id` is used for records that do not name their owner. Any
/// structural problem fails the whole payload.
pub fn normalize_daily_metrics(
    payload: &Value,
    subject_id: &str,
) -> Result<Vec<CanonicalMetric>, PartnerError> {
    match detect_wire_shape(payload)? {
        WireShape::FlatArray(items) | WireShape::Enveloped(items) => items
            .iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::Object(record) => normalize_flat_record(record, subject_id),
                _ => Err(PartnerError::malformed(format!(
                    "record {index} is not an object"
                ))),
            })
            .collect(),
        WireShape::FlatObject(record) => Ok(vec![normalize_flat_record(record, subject_id)?]),
        WireShape::FragmentMap(metrics) => normalize_fragment_map(metrics, subject_id),
    }
}

fn upstream_error_from_body(object: &Map<String, Value>, payload: &Value) -> PartnerError {
    let status = object
        .get("status")
        .and_then(Value::as_u64)
        .filter(|status| (100..600).contains(status) && !(200..300).contains(status))
        .and_then(|status| u16::try_from(status).ok())
        .unwrap_or(UPSTREAM_ERROR_FALLBACK_STATUS);
    PartnerError::Upstream {
        status,
        body: payload.clone(),
    }
}

fn normalize_flat_record(
    record: &Map<String, Value>,
    fallback_subject: &str,
) -> Result<CanonicalMetric, PartnerError> {
    let raw_date = record
        .get("date")
        .and_then(Value::as_str)
        .ok_or_else(|| PartnerError::malformed("record has no date string"))?;
    let date = date_only(raw_date).map_err(|error| PartnerError::malformed(error.to_string()))?;
    let subject = record
        .get("email")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|email| !email.is_empty())
        .unwrap_or(fallback_subject);

    let int = |key: &str| read_i64(record.get(key), key);
    let float = |key: &str| read_f64(record.get(key), key);
    let fields = MetricFields {
        total_sleep_minutes: int("total_sleep")?,
        deep_sleep_minutes: int("deep_sleep")?,
        rem_sleep_minutes: int("rem_sleep")?,
        light_sleep_minutes: int("light_sleep")?,
        sleep_score: int("sleep_score")?,
        sleep_efficiency: float("sleep_efficiency")?,
        restorative_sleep_minutes: int("restorative_sleep")?,
        time_in_bed_minutes: int("time_in_bed")?,
        bedtime_start: read_instant(record.get("bedtime_start"), "bedtime_start")?,
        bedtime_end: read_instant(record.get("bedtime_end"), "bedtime_end")?,
        tosses_and_turns: int("tosses_and_turns")?,
        movements: int("movements")?,
        morning_alertness_minutes: int("morning_alertness")?,
        temperature_deviation: float("temperature_deviation")?,
        average_body_temp_celsius: float("average_body_temp_celsius")?,
        avg_sleep_hrv: float("avg_sleep_hrv")?,
        night_rhr: float("night_rhr")?,
        sleep_rhr: float("sleep_rhr")?,
        readiness_score: float("readiness_score")?,
        recovery_index: float("recovery_index")?,
        movement_index: float("movement_index")?,
        active_minutes: int("active_minutes")?,
        vo2_max: float("vo2_max")?,
        metabolic_score: float("metabolic_score")?,
    };

    Ok(CanonicalMetric::new(subject, date, Value::Object(record.clone())).with_fields(fields))
}

fn normalize_fragment_map(
    metrics: &Map<String, Value>,
    subject_id: &str,
) -> Result<Vec<CanonicalMetric>, PartnerError> {
    let mut records = Vec::with_capacity(metrics.len());
    for (raw_date, fragments) in metrics {
        let date = date_only(raw_date)
            .map_err(|error| PartnerError::malformed(format!("metrics key: {error}")))?;
        let Value::Array(list) = fragments else {
            return Err(PartnerError::malformed(format!(
                "metrics for {raw_date} must be a list of fragments"
            )));
        };
        let fields = fold_fragments(raw_date, list)?;
        records.push(CanonicalMetric::new(subject_id, date, fragments.clone()).with_fields(fields));
    }
    records.sort_by_key(|record| record.date);
    Ok(records)
}

fn fold_fragments(raw_date: &str, fragments: &[Value]) -> Result<MetricFields, PartnerError> {
    let mut known = Vec::with_capacity(fragments.len());
    for (index, fragment) in fragments.iter().enumerate() {
        let type_name = fragment
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                PartnerError::malformed(format!("fragment {index} for {raw_date} has no type"))
            })?;
        let Some(kind) = FragmentKind::from_type(type_name) else {
            continue;
        };
        let Some(Value::Object(object)) = fragment.get("object") else {
            return Err(PartnerError::malformed(format!(
                "{type_name} fragment for {raw_date} has no object"
            )));
        };
        known.push((kind, object));
    }

    // Stable sort: same-type fragments keep list order.
    known.sort_by_key(|(kind, _)| *kind);

    let mut fields = MetricFields::default();
    for (kind, object) in known {
        apply_fragment(&mut fields, kind, object)?;
    }
    Ok(fields)
}

fn apply_fragment(
    fields: &mut MetricFields,
    kind: FragmentKind,
    object: &Map<String, Value>,
) -> Result<(), PartnerError> {
    let value = object.get("value");
    match kind {
        FragmentKind::Sleep => {
            let int = |key: &str, leaf: &str| read_i64(nested(object, key, leaf), key);
            let float = |key: &str, leaf: &str| read_f64(nested(object, key, leaf), key);
            fill(&mut fields.sleep_score, int("sleep_score", "score")?);
            fill(&mut fields.total_sleep_minutes, int("total_sleep", "minutes")?);
            fill(&mut fields.deep_sleep_minutes, int("deep_sleep", "minutes")?);
            fill(&mut fields.rem_sleep_minutes, int("rem_sleep", "minutes")?);
            fill(&mut fields.light_sleep_minutes, int("light_sleep", "minutes")?);
            fill(
                &mut fields.sleep_efficiency,
                float("sleep_efficiency", "percentage")?,
            );
            fill(
                &mut fields.restorative_sleep_minutes,
                int("restorative_sleep", "minutes")?,
            );
            fill(&mut fields.time_in_bed_minutes, int("time_in_bed", "minutes")?);
            fill(
                &mut fields.bedtime_start,
                read_instant(object.get("bedtime_start"), "bedtime_start")?,
            );
            fill(
                &mut fields.bedtime_end,
                read_instant(object.get("bedtime_end"), "bedtime_end")?,
            );
            fill(&mut fields.tosses_and_turns, int("tosses_and_turns", "count")?);
            fill(&mut fields.movements, int("movements", "count")?);
            fill(
                &mut fields.morning_alertness_minutes,
                int("morning_alertness", "minutes")?,
            );
            fill(
                &mut fields.temperature_deviation,
                float("temperature_deviation", "value")?,
            );
            fill(
                &mut fields.average_body_temp_celsius,
                float("average_body_temperature", "celsius")?,
            );
            fill(&mut fields.night_rhr, float("night_rhr", "avg")?);
        }
        FragmentKind::AvgSleepHrv => fill(&mut fields.avg_sleep_hrv, read_f64(value, "avg_sleep_hrv")?),
        FragmentKind::SleepRhr => fill(&mut fields.sleep_rhr, read_f64(value, "sleep_rhr")?),
        FragmentKind::RecoveryIndex => {
            fill(&mut fields.recovery_index, read_f64(value, "recovery_index")?)
        }
        FragmentKind::MovementIndex => {
            fill(&mut fields.movement_index, read_f64(value, "movement_index")?)
        }
        FragmentKind::ReadinessScore => {
            fill(&mut fields.readiness_score, read_f64(value, "readiness_score")?)
        }
        FragmentKind::ActiveMinutes => {
            fill(&mut fields.active_minutes, read_i64(value, "active_minutes")?)
        }
        FragmentKind::Vo2Max => fill(&mut fields.vo2_max, read_f64(value, "vo2_max")?),
        FragmentKind::MetabolicScore => {
            fill(&mut fields.metabolic_score, read_f64(value, "metabolic_score")?)
        }
        FragmentKind::NightRhr => {
            let reading = match read_f64(object.get("avg"), "night_rhr")? {
                Some(avg) => Some(avg),
                None => read_f64(value, "night_rhr")?,
            };
            fill(&mut fields.night_rhr, reading);
        }
    }
    Ok(())
}

fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
    if slot.is_none() {
        *slot = value;
    }
}

fn nested<'a>(object: &'a Map<String, Value>, key: &str, leaf: &str) -> Option<&'a Value> {
    object.get(key).and_then(|inner| inner.get(leaf))
}

fn read_f64(value: Option<&Value>, field: &str) -> Result<Option<f64>, PartnerError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => Ok(number.as_f64()),
        Some(other) => Err(PartnerError::malformed(format!(
            "{field} must be numeric, got {other}"
        ))),
    }
}

fn read_i64(value: Option<&Value>, field: &str) -> Result<Option<i64>, PartnerError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => Ok(number
            .as_i64()
            .or_else(|| number.as_f64().map(|float| float.round() as i64))),
        Some(other) => Err(PartnerError::malformed(format!(
            "{field} must be numeric, got {other}"
        ))),
    }
}

/// Reads epoch seconds (fractional seconds are truncated), or an RFC 3339 string.
fn read_instant(value: Option<&Value>, field: &str) -> Result<Option<DateTime<Utc>>, PartnerError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => number
            .as_i64()
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|seconds| seconds.is_finite())
                    .map(|seconds| seconds.trunc() as i64)
            })
            .and_then(|seconds| DateTime::from_timestamp(seconds, 0))
            .map(Some)
            .ok_or_else(|| PartnerError::malformed(format!("{field} is not a valid epoch"))),
        Some(Value::String(raw)) => DateTime::parse_from_rfc3339(raw)
            .map(|instant| Some(instant.with_timezone(&Utc)))
            .map_err(|error| PartnerError::malformed(format!("{field}: {error}"))),
        Some(other) => Err(PartnerError::malformed(format!(
            "{field} must be an epoch or timestamp, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::{detect_wire_shape, normalize_daily_metrics, WireShape};
    use crate::PartnerError;
    use serde_json::{json, Value};

    fn fragment_payload(fragments: Value) -> Value {
        json!({ "data": { "metrics": { "2025-12-01": fragments } } })
    }

    #[test]
    fn fragment_map_folds_sleep_and_standalone_heart_rate() {
        let payload = fragment_payload(json!([
            { "type": "sleep", "object": { "total_sleep": { "minutes": 400 } } },
            { "type": "night_rhr", "object": { "value": 52 } }
        ]));

        let records = normalize_daily_metrics(&payload, "self").expect("normalize");
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.date.to_string(), "2025-12-01");
        assert_eq!(record.subject_id, "self");
        assert_eq!(record.fields.total_sleep_minutes, Some(400));
        assert_eq!(record.fields.night_rhr, Some(52.0));
        assert_eq!(
            record.raw_payload,
            payload["data"]["metrics"]["2025-12-01"].clone()
        );
    }

    #[test]
    fn duplicate_field_resolution_ignores_fragment_order() {
        let sleep = json!({ "type": "sleep", "object": { "night_rhr": { "avg": 50 } } });
        let standalone = json!({ "type": "night_rhr", "object": { "avg": 58 } });

        let forward = normalize_daily_metrics(
            &fragment_payload(json!([sleep.clone(), standalone.clone()])),
            "self",
        )
        .expect("forward");
        let reversed =
            normalize_daily_metrics(&fragment_payload(json!([standalone, sleep])), "self")
                .expect("reversed");

        assert_eq!(forward[0].fields.night_rhr, Some(50.0));
        assert_eq!(forward[0].fields, reversed[0].fields);
    }

    #[test]
    fn unknown_fragment_types_are_ignored_but_kept_raw() {
        let payload = fragment_payload(json!([
            { "type": "glucose_variability", "object": { "value": "n/a" } },
            { "type": "avg_sleep_hrv", "object": { "value": 44.5 } }
        ]));
        let records = normalize_daily_metrics(&payload, "self").expect("normalize");
        assert_eq!(records[0].fields.avg_sleep_hrv, Some(44.5));
        assert_eq!(records[0].raw_payload.as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn fragment_map_dates_are_sorted_ascending() {
        let payload = json!({ "data": { "metrics": {
            "2025-12-03": [],
            "2025-12-01": [],
            "2025-12-02": []
        } } });
        let dates = normalize_daily_metrics(&payload, "self")
            .expect("normalize")
            .into_iter()
            .map(|record| record.date.to_string())
            .collect::<Vec<_>>();
        assert_eq!(dates, vec!["2025-12-01", "2025-12-02", "2025-12-03"]);
    }

    #[test]
    fn all_three_shapes_produce_equal_fields() {
        let flat = json!({
            "date": "2025-11-22",
            "sleep_score": 81,
            "total_sleep": 420,
            "deep_sleep": 95,
            "sleep_efficiency": 91.5,
            "bedtime_start": 1_763_765_400,
            "avg_sleep_hrv": 48.0,
            "readiness_score": 77,
            "night_rhr": 54
        });
        let fragments = json!({ "data": { "metrics": { "2025-11-22": [
            { "type": "readiness_score", "object": { "value": 77 } },
            { "type": "sleep", "object": {
                "sleep_score": { "score": 81 },
                "total_sleep": { "minutes": 420 },
                "deep_sleep": { "minutes": 95 },
                "sleep_efficiency": { "percentage": 91.5 },
                "bedtime_start": 1_763_765_400
            } },
            { "type": "avg_sleep_hrv", "object": { "value": 48.0 } },
            { "type": "night_rhr", "object": { "avg": 54 } }
        ] } } });

        let from_flat = normalize_daily_metrics(&json!([flat.clone()]), "self").expect("flat");
        let from_envelope =
            normalize_daily_metrics(&json!({ "data": [flat] }), "self").expect("envelope");
        let from_fragments = normalize_daily_metrics(&fragments, "self").expect("fragments");

        assert_eq!(from_flat[0].fields, from_envelope[0].fields);
        assert_eq!(from_flat[0].fields, from_fragments[0].fields);
        assert_eq!(from_flat[0].date, from_fragments[0].date);
        assert!(from_flat[0].fields.bedtime_start.is_some());
    }

    #[test]
    fn flat_records_use_email_as_subject_and_null_as_absent() {
        let payload = json!([{
            "date": "2025-11-22T00:00:00Z",
            "email": "ana@example.com",
            "total_sleep": null,
            "readiness_score": 0
        }]);
        let records = normalize_daily_metrics(&payload, "self").expect("normalize");
        assert_eq!(records[0].subject_id, "ana@example.com");
        assert_eq!(records[0].fields.total_sleep_minutes, None);
        assert_eq!(records[0].fields.readiness_score, Some(0.0));
    }

    #[test]
    fn non_numeric_field_fails_whole_payload() {
        let payload = json!([
            { "date": "2025-11-21", "total_sleep": 400 },
            { "date": "2025-11-22", "total_sleep": "seven hours" }
        ]);
        let error = normalize_daily_metrics(&payload, "self").expect_err("malformed");
        assert!(matches!(error, PartnerError::MalformedResponse(message) if message.contains("total_sleep")));
    }

    #[test]
    fn missing_date_and_unknown_shapes_are_malformed() {
        for payload in [
            json!([{ "total_sleep": 400 }]),
            json!({ "unexpected": true }),
            json!("plain text"),
            json!({ "data": { "metrics": { "yesterday": [] } } }),
            json!({ "data": { "metrics": { "2025-11-22": [{ "object": {} }] } } }),
        ] {
            let error = normalize_daily_metrics(&payload, "self").expect_err("malformed");
            assert!(matches!(error, PartnerError::MalformedResponse(_)), "{payload}");
        }
    }

    #[test]
    fn error_member_in_success_body_is_upstream_error() {
        let error = detect_wire_shape(&json!({ "error": "token expired", "status": 401 }))
            .expect_err("upstream");
        assert_eq!(error.upstream_status(), Some(401));

        let error = detect_wire_shape(&json!({ "error": { "code": "x" }, "status": 200 }))
            .expect_err("upstream");
        assert_eq!(error.upstream_status(), Some(502));

        let body = json!({ "error": null, "data": [] });
        let shape = detect_wire_shape(&body).expect("shape");
        assert!(matches!(shape, WireShape::Enveloped(items) if items.is_empty()));
    }

    #[test]
    fn bedtime_accepts_fractional_epoch_seconds() {
        let payload = json!([{
            "date": "2025-11-22",
            "bedtime_start": 1_763_765_400.0,
            "bedtime_end": 1_763_793_000.75
        }]);
        let records = normalize_daily_metrics(&payload, "self").expect("normalize");
        let fields = &records[0].fields;
        assert_eq!(
            fields.bedtime_start.map(|instant| instant.timestamp()),
            Some(1_763_765_400)
        );
        assert_eq!(
            fields.bedtime_end.map(|instant| instant.timestamp()),
            Some(1_763_793_000)
        );

        let error = normalize_daily_metrics(
            &json!([{ "date": "2025-11-22", "bedtime_start": "late" }]),
            "self",
        )
        .expect_err("malformed");
        assert!(matches!(error, PartnerError::MalformedResponse(_)));
    }
}
