use crate::error::ValidationError;
use crate::messaging::{EnviroGrowReading, TestDeviceReading};
use crate::normalize::{flatten_readings, into_object};
use crate::sensor::{EnviroSensor, Sensor};
use serde::de::DeserializeOwned;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Sensor,
    TestDevice,
    EnviroSensor,
    EnviroGrow,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Sensor(Sensor),
    TestDevice(TestDeviceReading),
    EnviroSensor(EnviroSensor),
    EnviroGrow(EnviroGrowReading),
}

impl RecordKind {
    pub fn name(&self) -> &'static str {
        match self {
            RecordKind::Sensor => "sensor",
            RecordKind::TestDevice => "testdevice",
            RecordKind::EnviroSensor => "enviro_sensor",
            RecordKind::EnviroGrow => "enviro_grow",
        }
    }

    /// Decodes and validates a JSON payload into a record of this kind
    ///
    /// Unknown fields are ignored, numeric fields accept numeric strings
    pub fn decode(&self, payload: &[u8]) -> Result<Record, ValidationError> {
        let value: Value = serde_json::from_slice(payload).map_err(ValidationError::Malformed)?;
        let fields = match self {
            RecordKind::EnviroGrow => flatten_readings(value)?,
            _ => into_object(value)?,
        };
        let value = Value::Object(fields);

        let record = match self {
            RecordKind::Sensor => Record::Sensor(from_fields(value)?),
            RecordKind::TestDevice => Record::TestDevice(from_fields(value)?),
            RecordKind::EnviroSensor => Record::EnviroSensor(from_fields(value)?),
            RecordKind::EnviroGrow => Record::EnviroGrow(from_fields(value)?),
        };
        record.validate()?;
        Ok(record)
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Sensor(_) => RecordKind::Sensor,
            Record::TestDevice(_) => RecordKind::TestDevice,
            Record::EnviroSensor(_) => RecordKind::EnviroSensor,
            Record::EnviroGrow(_) => RecordKind::EnviroGrow,
        }
    }

    /// Device that must exist before this record can be committed.
    ///
    /// Only grow readings register their device on the fly, test device
    /// readings reference a sensor that was provisioned beforehand.
    pub fn implied_device(&self) -> Option<EnviroSensor> {
        match self {
            Record::EnviroGrow(reading) => Some(reading.device()),
            _ => None,
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Record::Sensor(sensor) => sensor.validate(),
            Record::TestDevice(_) => Ok(()),
            Record::EnviroSensor(sensor) => sensor.validate(),
            Record::EnviroGrow(reading) => reading.validate(),
        }
    }
}

impl EnviroSensor {
    /// Decodes and validates an explicit device registration
    pub fn decode(payload: &[u8]) -> Result<Self, ValidationError> {
        let value: Value = serde_json::from_slice(payload).map_err(ValidationError::Malformed)?;
        let device: EnviroSensor = from_fields(Value::Object(into_object(value)?))?;
        device.validate()?;
        Ok(device)
    }
}

fn from_fields<T: DeserializeOwned>(value: Value) -> Result<T, ValidationError> {
    serde_json::from_value(value).map_err(ValidationError::Field)
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn grow_payload() -> Value {
        json!({
            "uid": "abc123",
            "nickname": "plant1",
            "model": "grow",
            "timestamp": "2024-01-01T00:00:00Z",
            "temperature": 21.5,
            "humidity": 55.0,
            "pressure": 1013.2,
            "luminance": 300.0,
            "moisture_a": 10.0,
            "moisture_b": 12.0,
            "moisture_c": 9.0
        })
    }

    fn decode_grow(value: &Value) -> Result<Record, ValidationError> {
        RecordKind::EnviroGrow.decode(value.to_string().as_bytes())
    }

    #[test]
    fn test_decode_grow_scenario() {
        let record = decode_grow(&grow_payload()).unwrap();

        let Record::EnviroGrow(reading) = record else {
            panic!("expected grow reading");
        };
        assert_eq!("abc123", reading.uid);
        assert_eq!("plant1", reading.nickname);
        assert_eq!(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            reading.timestamp
        );
        assert_eq!(21.5, reading.temperature);
        assert_eq!(1013.2, reading.pressure);
        assert_eq!(None, reading.voltage);
    }

    #[test]
    fn test_nested_and_flat_shapes_are_equal() {
        let flat = grow_payload();
        let mut nested = json!({
            "uid": "abc123",
            "nickname": "plant1",
            "model": "grow",
            "timestamp": "2024-01-01T00:00:00Z",
        });
        let mut readings = flat.as_object().unwrap().clone();
        for key in ["uid", "nickname", "model", "timestamp"] {
            readings.remove(key);
        }
        nested["readings"] = Value::Object(readings);

        assert_eq!(decode_grow(&flat).unwrap(), decode_grow(&nested).unwrap());
    }

    #[test]
    fn test_top_level_wins_over_nested() {
        let mut payload = grow_payload();
        payload["readings"] = json!({"temperature": 99.0, "voltage": 3.3});

        let Record::EnviroGrow(reading) = decode_grow(&payload).unwrap() else {
            panic!("expected grow reading");
        };
        assert_eq!(21.5, reading.temperature);
        assert_eq!(Some(3.3), reading.voltage);
    }

    #[test]
    fn test_model_defaults_to_grow() {
        let mut payload = grow_payload();
        payload.as_object_mut().unwrap().remove("model");

        let record = decode_grow(&payload).unwrap();
        assert_eq!("grow", record.implied_device().unwrap().model);
    }

    #[test]
    fn test_rejects_string_temperature() {
        let mut payload = grow_payload();
        payload["temperature"] = json!("hot");

        assert!(matches!(decode_grow(&payload), Err(ValidationError::Field(_))));
    }

    #[test]
    fn test_accepts_numeric_string() {
        let mut payload = grow_payload();
        payload["humidity"] = json!("55.0");

        let Record::EnviroGrow(reading) = decode_grow(&payload).unwrap() else {
            panic!("expected grow reading");
        };
        assert_eq!(55.0, reading.humidity);
    }

    #[test]
    fn test_rejects_missing_fields() {
        for field in ["uid", "nickname", "timestamp", "temperature", "moisture_c"] {
            let mut payload = grow_payload();
            payload.as_object_mut().unwrap().remove(field);

            let res = decode_grow(&payload);
            assert!(matches!(res, Err(ValidationError::Field(_))), "{}", field);
        }
    }

    #[test]
    fn test_rejects_malformed_timestamp() {
        for raw in [json!("01/01/2024"), json!(1704067200), json!("")] {
            let mut payload = grow_payload();
            payload["timestamp"] = raw;

            assert!(matches!(decode_grow(&payload), Err(ValidationError::Field(_))));
        }
    }

    #[test]
    fn test_rejects_long_uid() {
        let mut payload = grow_payload();
        payload["uid"] = json!("x".repeat(17));

        let res = decode_grow(&payload);
        assert!(matches!(res, Err(ValidationError::Constraint { field: "uid", .. })));
    }

    #[test]
    fn test_rejects_non_json_payloads() {
        let res = RecordKind::TestDevice.decode(b"not json");
        assert!(matches!(res, Err(ValidationError::Malformed(_))));

        let res = RecordKind::TestDevice.decode(&[0xff, 0xfe]);
        assert!(matches!(res, Err(ValidationError::Malformed(_))));

        let res = RecordKind::Sensor.decode(b"[1, 2, 3]");
        assert!(matches!(res, Err(ValidationError::NotAnObject)));
    }

    #[test]
    fn test_decode_test_device() {
        let payload = br#"{"time": "2024-01-01T00:00:00", "sensor_id": 3, "temperature": 19}"#;

        let record = RecordKind::TestDevice.decode(payload).unwrap();
        assert_eq!(
            Record::TestDevice(TestDeviceReading {
                time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                sensor_id: Some(3),
                temperature: 19.0,
            }),
            record
        );
        assert_eq!(None, record.implied_device());
    }

    #[test]
    fn test_decode_devices() {
        let sensor = RecordKind::Sensor
            .decode(br#"{"name": "demo1", "location": "kitchen"}"#)
            .unwrap();
        assert_eq!(Record::Sensor(Sensor::new("demo1", "kitchen")), sensor);

        let enviro = RecordKind::EnviroSensor
            .decode(br#"{"uid": "e6614c31", "nickname": "basil", "model": "grow"}"#)
            .unwrap();
        assert_eq!(RecordKind::EnviroSensor, enviro.kind());

        let res = RecordKind::EnviroSensor
            .decode(br#"{"uid": "e6614c31", "nickname": " ", "model": "grow"}"#);
        assert!(matches!(res, Err(ValidationError::Constraint { field: "nickname", .. })));
    }

    #[test]
    fn test_decode_registration() {
        let payload = br#"{"uid": "e6614c31", "nickname": "basil", "model": "grow"}"#;
        let device = EnviroSensor::decode(payload).unwrap();
        assert_eq!("e6614c31", device.uid);
        assert_eq!("basil", device.nickname);

        let res = EnviroSensor::decode(br#"{"uid": "", "nickname": "basil", "model": "grow"}"#);
        assert!(matches!(res, Err(ValidationError::Constraint { field: "uid", .. })));
        let res = EnviroSensor::decode(b"[]");
        assert!(matches!(res, Err(ValidationError::NotAnObject)));
    }
}
