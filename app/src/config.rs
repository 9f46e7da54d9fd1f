use crate::error::ConfigError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttBroker {
    pub host: String,
    pub port: u16,
}

impl std::fmt::Display for MqttBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug)]
pub struct Config {
    database_url: String,
    server_port: u16,
    mqtt_brokers: Vec<MqttBroker>,
    mqtt_client_id: String,
    mqtt_keep_alive_s: u64,
    mqtt_timeout_ms: u64,
    db_max_connections: u32,
    db_timeout_ms: u64,
    drain_timeout_ms: u64,
    timescale_hypertables: bool,
    seed_demo_sensors: bool,
    trace_stdout: bool,
    mqtt_index: RwLock<usize>,
}

impl Config {
    /// Reads the process environment, after loading a `.env` file if present
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_vars(env::vars())
    }

    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(_, v)| !v.trim().is_empty())
            .collect();

        let database_url = vars
            .get("DATABASE_URL")
            .cloned()
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let mqtt_brokers = match vars.get("MQTT_BROKERS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| parse_broker("MQTT_BROKERS", s))
                .collect::<Result<Vec<_>, _>>()?,
            None => vec![MqttBroker {
                host: vars
                    .get("MQTT_HOST")
                    .cloned()
                    .unwrap_or_else(|| "localhost".to_owned()),
                port: parse_var(&vars, "MQTT_PORT", 1883)?,
            }],
        };
        if mqtt_brokers.is_empty() {
            return Err(ConfigError::Missing("MQTT_BROKERS"));
        }

        let mqtt_client_id = vars
            .get("MQTT_CLIENT_ID")
            .cloned()
            .unwrap_or_else(|| {
                let suffix = uuid::Uuid::new_v4().simple().to_string();
                format!("fastscale-{}", &suffix[..8])
            });

        Ok(Config {
            database_url,
            server_port: parse_var(&vars, "SERVER_PORT", 8000)?,
            mqtt_brokers,
            mqtt_client_id,
            mqtt_keep_alive_s: parse_var(&vars, "MQTT_KEEP_ALIVE_S", 30)?,
            mqtt_timeout_ms: parse_var(&vars, "MQTT_TIMEOUT_MS", 5000)?,
            db_max_connections: parse_var(&vars, "DB_MAX_CONNECTIONS", 5)?,
            db_timeout_ms: parse_var(&vars, "DB_TIMEOUT_MS", 5000)?,
            drain_timeout_ms: parse_var(&vars, "DRAIN_TIMEOUT_MS", 5000)?,
            timescale_hypertables: parse_var(&vars, "TIMESCALE_HYPERTABLES", false)?,
            seed_demo_sensors: parse_var(&vars, "SEED_DEMO_SENSORS", false)?,
            trace_stdout: parse_var(&vars, "TRACE_STDOUT", false)?,
            mqtt_index: RwLock::new(0),
        })
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn server_port(&self) -> u16 {
        self.server_port
    }

    pub fn mqtt_brokers(&self) -> &[MqttBroker] {
        &self.mqtt_brokers
    }

    pub fn current_mqtt_broker(&self) -> MqttBroker {
        let index = *self.mqtt_index.read();
        self.mqtt_brokers[index].clone()
    }

    pub fn next_mqtt_broker(&self) -> MqttBroker {
        let mut index = self.mqtt_index.write();
        *index = (*index + 1) % self.mqtt_brokers.len();
        self.mqtt_brokers[*index].clone()
    }

    pub fn mqtt_client_id(&self) -> &str {
        &self.mqtt_client_id
    }

    pub fn mqtt_keep_alive(&self) -> Duration {
        Duration::from_secs(self.mqtt_keep_alive_s)
    }

    pub fn mqtt_timeout(&self) -> Duration {
        Duration::from_millis(self.mqtt_timeout_ms)
    }

    pub fn db_max_connections(&self) -> u32 {
        self.db_max_connections
    }

    pub fn db_timeout(&self) -> Duration {
        Duration::from_millis(self.db_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn timescale_hypertables(&self) -> bool {
        self.timescale_hypertables
    }

    pub fn seed_demo_sensors(&self) -> bool {
        self.seed_demo_sensors
    }

    pub fn trace_stdout(&self) -> bool {
        self.trace_stdout
    }
}

fn parse_var<T: FromStr>(
    vars: &HashMap<String, String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(var) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            var,
            value: value.clone(),
        }),
        None => Ok(default),
    }
}

fn parse_broker(var: &'static str, raw: &str) -> Result<MqttBroker, ConfigError> {
    let invalid = || ConfigError::Invalid {
        var,
        value: raw.to_owned(),
    };
    let stripped = raw
        .trim_start_matches("mqtt://")
        .trim_start_matches("tcp://");
    let (host, port) = match stripped.rsplit_once(':') {
        Some((host, port)) => (host, port.parse().map_err(|_| invalid())?),
        None => (stripped, 1883),
    };
    if host.is_empty() {
        return Err(invalid());
    }
    Ok(MqttBroker {
        host: host.to_owned(),
        port,
    })
}
