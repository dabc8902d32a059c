//! Error types for jobs-supasync.

use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for jobs-supasync operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
        /// Source error if any
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// PostgreSQL connection error
    #[error("PostgreSQL connection error: {message}")]
    PostgresConnection {
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// PostgreSQL query error
    #[error("PostgreSQL query error on table '{table}': {message}")]
    PostgresQuery {
        /// Table name
        table: String,
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<tokio_postgres::Error>,
    },

    /// Supabase transport error (request never got a response)
    #[error("Supabase request error on table '{table}': {message}")]
    SupabaseRequest {
        /// Table name
        table: String,
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<reqwest::Error>,
    },

    /// Supabase answered with a non-success status
    #[error("Supabase returned {status} on table '{table}': {body}")]
    SupabaseResponse {
        /// Table name
        table: String,
        /// HTTP status code
        status: u16,
        /// Response body, as returned
        body: String,
    },

    /// A timestamp could not be interpreted
    #[error("Invalid timestamp '{value}': {message}")]
    Timestamp {
        /// Raw value
        value: String,
        /// Error message
        message: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error with source.
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a PostgreSQL connection error.
    pub fn postgres_connection(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::PostgresConnection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a PostgreSQL query error.
    pub fn postgres_query(
        table: impl Into<String>,
        message: impl Into<String>,
        source: tokio_postgres::Error,
    ) -> Self {
        Self::PostgresQuery {
            table: table.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a Supabase transport error.
    pub fn supabase_request(
        table: impl Into<String>,
        message: impl Into<String>,
        source: reqwest::Error,
    ) -> Self {
        Self::SupabaseRequest {
            table: table.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a Supabase status error.
    pub fn supabase_response(table: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::SupabaseResponse {
            table: table.into(),
            status,
            body: body.into(),
        }
    }

    /// Create a timestamp error.
    pub fn timestamp(value: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Timestamp {
            value: value.into(),
            message: message.into(),
        }
    }

    /// Create a serialization error.
    pub fn serialization(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Serialization {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get the error code for metrics/logging.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "CONFIG_ERROR",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::PostgresConnection { .. } => "PG_CONNECTION_ERROR",
            Error::PostgresQuery { .. } => "PG_QUERY_ERROR",
            Error::SupabaseRequest { .. } => "SUPABASE_REQUEST_ERROR",
            Error::SupabaseResponse { .. } => "SUPABASE_RESPONSE_ERROR",
            Error::Timestamp { .. } => "TIMESTAMP_ERROR",
            Error::Serialization { .. } => "SERIALIZATION_ERROR",
            Error::Io(_) => "IO_ERROR",
        }
    }
}
