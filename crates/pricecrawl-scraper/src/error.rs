use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScraperError {
    /// The page answered with an error status, or not at all.
    #[error("URL validation failed for {url}: {reason}")]
    UrlValidation {
        url: String,
        status: Option<u16>,
        reason: String,
    },

    #[error("navigation to {url} timed out after {timeout_secs}s")]
    NavigationTimeout { url: String, timeout_secs: u64 },

    /// A browser-automation call failed for a reason other than a timeout.
    #[error("browser error: {0}")]
    Browser(String),

    #[error("no extraction strategy yielded products for {url}: {reason}")]
    Extraction { url: String, reason: String },

    #[error(transparent)]
    Vision(#[from] VisionError),

    #[error("filesystem error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error for {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("sink rejected batch: {0}")]
    Sink(String),

    #[error("no categories discovered for store {store}")]
    NoCategories { store: String },
}

impl ScraperError {
    /// `true` for failures that may succeed on a second attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            ScraperError::NavigationTimeout { .. } => true,
            ScraperError::Vision(e) => e.is_retryable(),
            ScraperError::UrlValidation { .. }
            | ScraperError::Browser(_)
            | ScraperError::Extraction { .. }
            | ScraperError::Io { .. }
            | ScraperError::Json { .. }
            | ScraperError::Sink(_)
            | ScraperError::NoCategories { .. } => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("vision HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("vision API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("vision response could not be parsed: {0}")]
    Parse(String),

    #[error("screenshot could not be prepared: {0}")]
    Image(String),
}

impl VisionError {
    /// Timeouts, connection failures, 429 and 5xx are transient. Auth and
    /// request-validation statuses are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            VisionError::Http(e) => {
                e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
            }
            VisionError::Status { status, .. } => *status == 429 || *status >= 500,
            VisionError::Parse(_) | VisionError::Image(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigation_timeout_is_retryable() {
        let err = ScraperError::NavigationTimeout {
            url: "https://testmart.example/c/a".to_string(),
            timeout_secs: 30,
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn url_validation_is_not_retryable() {
        let err = ScraperError::UrlValidation {
            url: "https://testmart.example/c/b".to_string(),
            status: Some(404),
            reason: "HTTP 404".to_string(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn vision_status_classification() {
        let status = |status| VisionError::Status {
            status,
            body: String::new(),
        };
        assert!(status(500).is_retryable());
        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());
        assert!(!status(400).is_retryable());
        assert!(!status(401).is_retryable());
        assert!(!status(403).is_retryable());
        assert!(!status(422).is_retryable());
    }

    #[test]
    fn wrapped_vision_error_keeps_classification() {
        let err: ScraperError = VisionError::Status {
            status: 502,
            body: "bad gateway".to_string(),
        }
        .into();
        assert!(err.is_retryable());
    }
}
