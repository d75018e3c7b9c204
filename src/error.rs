//! Error taxonomy for the monitoring pipeline
//!
//! Every failure carries an [`ErrorKind`] so callers branch on severity
//! (skip this feed / skip forecast processing / abort the run) instead of
//! on which variant was raised.

/// Severity class of a [`MonitorError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network failure or timeout: the feed is absent this cycle.
    Fetch,
    /// Payload does not match its schema: the feed is absent this cycle.
    Format,
    /// Forecast grid is structurally broken: forecast processing stops.
    KpForecast,
    /// Store unreachable or unexpected constraint failure: the run aborts.
    Persistence,
    /// Malformed configuration: compiled-in defaults are used instead.
    Config,
    /// Notification could not be delivered: logged, never retried.
    Delivery,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Fetch => "FETCH",
            ErrorKind::Format => "FORMAT",
            ErrorKind::KpForecast => "KP_FORECAST",
            ErrorKind::Persistence => "PERSISTENCE",
            ErrorKind::Config => "CONFIG",
            ErrorKind::Delivery => "DELIVERY",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("fetch failed for {feed}: {reason}")]
    Fetch { feed: String, reason: String },

    #[error("request for {feed} timed out after {timeout_secs}s")]
    Timeout { feed: String, timeout_secs: u64 },

    #[error("{feed} format error: {reason}")]
    Format { feed: String, reason: String },

    #[error("KP forecast error: {0}")]
    KpForecast(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("delivery to {recipient} failed: {reason}")]
    Delivery { recipient: String, reason: String },
}

impl MonitorError {
    pub fn format(feed: &str, reason: impl Into<String>) -> Self {
        MonitorError::Format {
            feed: feed.to_string(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MonitorError::Fetch { .. } | MonitorError::Timeout { .. } => ErrorKind::Fetch,
            MonitorError::Format { .. } => ErrorKind::Format,
            MonitorError::KpForecast(_) => ErrorKind::KpForecast,
            MonitorError::Persistence(_) => ErrorKind::Persistence,
            MonitorError::Config(_) => ErrorKind::Config,
            MonitorError::Delivery { .. } => ErrorKind::Delivery,
        }
    }

    /// True when the whole pipeline run must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Persistence)
    }
}

impl From<rusqlite::Error> for MonitorError {
    fn from(err: rusqlite::Error) -> Self {
        MonitorError::Persistence(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_fetch_kind() {
        let err = MonitorError::Timeout {
            feed: "ace-swepam".to_string(),
            timeout_secs: 10,
        };
        assert_eq!(err.kind(), ErrorKind::Fetch);
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("timed out after 10s"));
    }

    #[test]
    fn test_only_persistence_is_fatal() {
        assert!(MonitorError::Persistence("disk full".into()).is_fatal());
        assert!(!MonitorError::KpForecast("missing table".into()).is_fatal());
        assert!(!MonitorError::format("nowcast", "empty payload").is_fatal());
        assert!(!MonitorError::Config("bad json".into()).is_fatal());
    }

    #[test]
    fn test_rusqlite_error_maps_to_persistence() {
        let err: MonitorError = rusqlite::Error::InvalidQuery.into();
        assert_eq!(err.kind(), ErrorKind::Persistence);
    }
}
