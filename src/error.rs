// Error types for the entity store and the analytics layer

use thiserror::Error;

/// Errors raised by the entity store (CRUD on employees, trips, types, expenses)
#[derive(Debug, Error)]
pub enum StoreError {
    /// Requested row does not exist
    #[error("{entity} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Expense type names are unique across the table
    #[error("Expense Type with this name already exists")]
    DuplicateName(String),

    /// A write pointed a foreign key at a row that does not exist
    #[error("{entity} {id} does not exist")]
    InvalidReference { entity: &'static str, id: i64 },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        StoreError::NotFound { entity, id }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Errors raised while aggregating analytics or rendering reports
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// Selector is neither a metric name nor "all"
    #[error("Invalid data type: {0}")]
    InvalidDataType(String),

    /// Report token is neither "text" nor "json"
    #[error("Invalid report type: {0}")]
    InvalidReportType(String),

    /// Report generation requested on a facade built without a report format
    #[error("Report factory is not set")]
    ReportFactoryNotSet,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AnalyticsError {
    /// True for errors caused by caller input rather than by the system
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            AnalyticsError::InvalidDataType(_) | AnalyticsError::InvalidReportType(_)
        )
    }
}

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
