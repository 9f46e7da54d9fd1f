use fastscale_core::ValidationError;
use std::error;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("Invalid value for {var}: {value}")]
    Invalid {
        var: &'static str,
        value: std::string::String,
    },
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Referenced device does not exist: {0}")]
    ForeignKey(std::string::String),
    #[error("Duplicate key: {0}")]
    Conflict(std::string::String),
    #[error("Database connection failed: {0}")]
    Connection(#[source] sqlx::Error),
    #[error("Database operation timed out after {0} ms")]
    Timeout(u128),
    #[error(transparent)]
    Sql(sqlx::Error),
}

impl From<sqlx::Error> for PersistenceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.into_owned());
                match code.as_deref() {
                    Some("23503") => PersistenceError::ForeignKey(db_err.message().to_owned()),
                    Some("23505") => PersistenceError::Conflict(db_err.message().to_owned()),
                    _ => PersistenceError::Sql(sqlx::Error::Database(db_err)),
                }
            }
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => PersistenceError::Connection(err),
            other => PersistenceError::Sql(other),
        }
    }
}

impl PersistenceError {
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            PersistenceError::Connection(_) | PersistenceError::Timeout(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Couldn't connect to broker {0}: {1}")]
    Connect(std::string::String, std::string::String),
    #[error("Broker rejected subscription: {0}")]
    Subscribe(std::string::String),
    #[error("Invalid topic filter: {0}")]
    InvalidFilter(std::string::String),
    #[error("Request failed: {0}")]
    Client(#[from] rumqttc::ClientError),
    #[error("Timeout")]
    Timeout(),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Database unavailable: {0}")]
    Database(#[source] PersistenceError),
    #[error("Schema setup failed: {0}")]
    Schema(#[source] PersistenceError),
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error("Logging setup failed: {0}")]
    Logging(std::string::String),
    #[error("Couldn't register signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

#[derive(Debug, Error)]
pub enum ObserverError {
    #[error("{0}")]
    User(Box<dyn error::Error + Send + Sync>),
    #[error("{0}")]
    Internal(Box<dyn error::Error + Send + Sync>),
}

impl From<PersistenceError> for ObserverError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::ForeignKey(_) | PersistenceError::Conflict(_) => {
                ObserverError::User(Box::from(err))
            }
            _ => ObserverError::Internal(Box::from(err)),
        }
    }
}

impl From<ValidationError> for ObserverError {
    fn from(err: ValidationError) -> Self {
        ObserverError::User(Box::from(err))
    }
}

impl From<BrokerError> for ObserverError {
    fn from(err: BrokerError) -> Self {
        ObserverError::Internal(Box::from(err))
    }
}
