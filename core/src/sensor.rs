use crate::error::ValidationError;
use serde::{Deserialize, Serialize};

/// Longest uid the `enviro_sensors` table accepts.
pub const MAX_UID_LEN: usize = 16;

/// Numerically keyed sensor, `id` is assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    #[serde(default)]
    pub id: Option<i32>,
    pub name: String,
    pub location: String,
}

/// Device identified by its board uid, registered on first sighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnviroSensor {
    pub uid: String,
    pub nickname: String,
    pub model: String,
    #[serde(default)]
    pub location: Option<String>,
}

impl Sensor {
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Sensor {
            id: None,
            name: name.into(),
            location: location.into(),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("name", &self.name)
    }
}

impl EnviroSensor {
    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        validate_uid(&self.uid)?;
        require_non_empty("nickname", &self.nickname)?;
        require_non_empty("model", &self.model)
    }
}

pub(crate) fn validate_uid(uid: &str) -> Result<(), ValidationError> {
    let len = uid.chars().count();
    if len == 0 || len > MAX_UID_LEN {
        return Err(ValidationError::constraint(
            "uid",
            format!("expected 1..={} characters, got {}", MAX_UID_LEN, len),
        ));
    }
    Ok(())
}

pub(crate) fn require_non_empty(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::constraint(field, "must not be empty"));
    }
    Ok(())
}
