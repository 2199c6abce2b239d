use std::path::PathBuf;
use thiserror::Error;

use crate::domain::model::Role;

#[derive(Error, Debug)]
pub enum PairgenError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration '{field}'")]
    MissingConfigError { field: String },

    #[error("Duplicate {role} template for {app_id}: '{}' and '{}'", first.display(), second.display())]
    DuplicateTemplate {
        app_id: String,
        role: Role,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Placeholder '{placeholder}' of {app_id} has no binding")]
    UnboundPlaceholder {
        app_id: String,
        placeholder: String,
    },

    #[error("Binding '{placeholder}' = '{value}' of {app_id} contains placeholder token '{nested}'")]
    RecursiveBinding {
        app_id: String,
        placeholder: String,
        value: String,
        nested: String,
    },

    #[error("Port {port} requested by both {first_app} and {second_app}")]
    BindingConflict {
        port: u16,
        first_app: String,
        second_app: String,
    },

    #[error("Port {port} for {app_id} is outside 1..=65535")]
    PortOutOfRange { app_id: String, port: u32 },

    #[error("{app_id} has {errors} consistency error(s); instantiation skipped")]
    InconsistentPair { app_id: String, errors: usize },

    #[error("Worker failed: {message}")]
    WorkerError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Template,
    Binding,
    Consistency,
    Io,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl PairgenError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            PairgenError::IoError(_) | PairgenError::CsvError(_) => ErrorCategory::Io,
            PairgenError::SerializationError(_) | PairgenError::WorkerError { .. } => {
                ErrorCategory::Internal
            }
            PairgenError::ConfigValidationError { .. }
            | PairgenError::InvalidConfigValueError { .. }
            | PairgenError::MissingConfigError { .. } => ErrorCategory::Configuration,
            PairgenError::DuplicateTemplate { .. } => ErrorCategory::Template,
            PairgenError::UnboundPlaceholder { .. }
            | PairgenError::RecursiveBinding { .. }
            | PairgenError::BindingConflict { .. }
            | PairgenError::PortOutOfRange { .. } => ErrorCategory::Binding,
            PairgenError::InconsistentPair { .. } => ErrorCategory::Consistency,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            PairgenError::UnboundPlaceholder { .. }
            | PairgenError::RecursiveBinding { .. }
            | PairgenError::InconsistentPair { .. } => ErrorSeverity::High,
            PairgenError::WorkerError { .. } => ErrorSeverity::Medium,
            _ => ErrorSeverity::Critical,
        }
    }

    /// 是否會中止整個批次 (而非只影響單一應用)
    pub fn is_run_fatal(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            PairgenError::IoError(_) => "Check that the input directory exists and the output directory is writable",
            PairgenError::SerializationError(_) | PairgenError::CsvError(_) => {
                "Check free disk space and permissions of the output directory"
            }
            PairgenError::ConfigValidationError { .. }
            | PairgenError::InvalidConfigValueError { .. }
            | PairgenError::MissingConfigError { .. } => {
                "Fix the configuration file or command line arguments and run again"
            }
            PairgenError::DuplicateTemplate { .. } => {
                "Rename or remove one of the templates so each app has one template per role"
            }
            PairgenError::UnboundPlaceholder { .. } => {
                "Add the variable under [bindings] or [apps.<id>.bindings] in the batch config"
            }
            PairgenError::RecursiveBinding { .. } => {
                "Binding values must be plain text without placeholder tokens"
            }
            PairgenError::BindingConflict { .. } => {
                "Give every app distinct backend_port/frontend_port values"
            }
            PairgenError::PortOutOfRange { .. } => "Lower --base-port or the explicit port values",
            PairgenError::InconsistentPair { .. } => {
                "See diagnostics.json for the routes or ports the two templates disagree on"
            }
            PairgenError::WorkerError { .. } => "Re-run with --verbose and report the log",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            PairgenError::DuplicateTemplate { app_id, role, .. } => {
                format!("Found more than one {} template for {}", role, app_id)
            }
            PairgenError::BindingConflict { port, .. } => {
                format!("Port {} would be used by two applications", port)
            }
            PairgenError::IoError(e) => format!("File access failed: {}", e),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PairgenError>;
