use thiserror::Error;

pub type DashResult<T> = Result<T, DashboardError>;

/// Failures surfaced by the dashboard pipeline.
///
/// Normalisation and composition failures abort a reload before anything is
/// presented, so the previously rendered dashboard stays visible.
#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("malformed aggregate result: {reason}")]
    MalformedAggregate { reason: String },

    #[error("malformed column record #{index} in group '{group}': {reason}")]
    MalformedColumn {
        group: String,
        index: usize,
        reason: String,
    },

    #[error("column '{column}' is not available for grouping")]
    InvalidGrouping { column: String },

    #[error("network request failed ({context}): {source}")]
    Network {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("service returned {status} for {context}")]
    Status {
        context: String,
        status: reqwest::StatusCode,
    },

    #[error("failed to render chart '{chart}': {reason}")]
    Render { chart: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DashboardError {
    pub(crate) fn network(context: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedAggregate {
            reason: reason.into(),
        }
    }

    /// True for failures of the registration or retrieval round-trip.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Status { .. })
    }
}
