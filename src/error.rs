use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Service {service} is already running")]
    AlreadyRunning { service: String },

    #[error("Service {service} is not running")]
    NotRunning { service: String },

    #[error("Service {service} is already registered")]
    AlreadyRegistered { service: String },

    #[error("Service {service} not found")]
    NotFound { service: String },

    #[error("Service {service} is registered with a different type")]
    TypeMismatch { service: String },

    #[error(
        "Timed out after {timeout:?} waiting for {dependency} to reach state {state}{}",
        if *registered { "" } else { " (never registered)" }
    )]
    DependencyTimeout {
        dependency: String,
        state: String,
        timeout: Duration,
        registered: bool,
    },

    #[error("Service {service} does not publish state {state}")]
    UnknownState { service: String, state: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Fatal error in {service}: {message}")]
    Fatal { service: String, message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },

    #[error("Shutdown budget exhausted, abandoned: {}", services.join(", "))]
    ShutdownTimeout { services: Vec<String> },
}

impl ServiceError {
    pub fn component<C: Into<String>, M: Into<String>>(component: C, message: M) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn fatal<S: Into<String>, M: Into<String>>(service: S, message: M) -> Self {
        Self::Fatal {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn already_running<S: Into<String>>(service: S) -> Self {
        Self::AlreadyRunning {
            service: service.into(),
        }
    }

    pub fn not_running<S: Into<String>>(service: S) -> Self {
        Self::NotRunning {
            service: service.into(),
        }
    }

    /// Whether the error must abort the whole activation
    pub fn is_fatal(&self) -> bool {
        matches!(self, ServiceError::Fatal { .. })
    }

    /// Whether the system can keep running after this error
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ServiceError::Fatal { .. } | ServiceError::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
