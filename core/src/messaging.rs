use crate::error::ValidationError;
use crate::sensor::{require_non_empty, validate_uid, EnviroSensor};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_model() -> String {
    "grow".to_owned()
}

/// Temperature only reading of the test device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestDeviceReading {
    #[serde(deserialize_with = "crate::normalize::timestamp")]
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub sensor_id: Option<i32>,
    #[serde(deserialize_with = "crate::normalize::lax_f64")]
    pub temperature: f64,
}

/// Multi-field reading of an enviro grow board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnviroGrowReading {
    pub nickname: String,
    pub uid: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(deserialize_with = "crate::normalize::timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(deserialize_with = "crate::normalize::lax_f64")]
    pub temperature: f64,
    #[serde(deserialize_with = "crate::normalize::lax_f64")]
    pub humidity: f64,
    #[serde(deserialize_with = "crate::normalize::lax_f64")]
    pub pressure: f64,
    #[serde(deserialize_with = "crate::normalize::lax_f64")]
    pub luminance: f64,
    #[serde(deserialize_with = "crate::normalize::lax_f64")]
    pub moisture_a: f64,
    #[serde(deserialize_with = "crate::normalize::lax_f64")]
    pub moisture_b: f64,
    #[serde(deserialize_with = "crate::normalize::lax_f64")]
    pub moisture_c: f64,
    #[serde(default, deserialize_with = "crate::normalize::lax_opt_f64")]
    pub voltage: Option<f64>,
}

impl EnviroGrowReading {
    /// The device row this reading has to reference.
    pub fn device(&self) -> EnviroSensor {
        EnviroSensor {
            uid: self.uid.clone(),
            nickname: self.nickname.clone(),
            model: self.model.clone(),
            location: None,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        validate_uid(&self.uid)?;
        require_non_empty("nickname", &self.nickname)?;
        require_non_empty("model", &self.model)
    }
}
