use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Order in which extraction strategies are consulted for a listing page.
///
/// Network interception always runs passively while the page loads; the
/// policy only decides what happens after its captures are inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractionPolicy {
    /// Network captures, then DOM heuristics, then vision only if both yielded
    /// nothing. One vision call at most per page, and usually none.
    #[default]
    VisionLastResort,
    /// Network captures, then vision on every page that has none, DOM
    /// heuristics when vision yields nothing.
    VisionPrimary,
}

impl std::fmt::Display for ExtractionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionPolicy::VisionLastResort => write!(f, "vision-last-resort"),
            ExtractionPolicy::VisionPrimary => write!(f, "vision-primary"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub env: Environment,
    pub log_level: String,
    pub retailers_path: PathBuf,
    pub output_dir: PathBuf,
    pub artifact_dir: PathBuf,
    pub database_url: Option<String>,
    pub headless: bool,
    pub nav_timeout_secs: u64,
    pub page_delay_ms: u64,
    pub max_pages_per_category: u32,
    pub max_concurrent_sessions: usize,
    pub extraction_policy: ExtractionPolicy,
    pub vision_api_key: Option<String>,
    pub vision_model: String,
    pub vision_base_url: String,
    pub vision_max_attempts: u32,
    pub vision_backoff_ms: u64,
    pub vision_timeout_secs: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("retailers_path", &self.retailers_path)
            .field("output_dir", &self.output_dir)
            .field("artifact_dir", &self.artifact_dir)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[redacted]"),
            )
            .field("headless", &self.headless)
            .field("nav_timeout_secs", &self.nav_timeout_secs)
            .field("page_delay_ms", &self.page_delay_ms)
            .field("max_pages_per_category", &self.max_pages_per_category)
            .field("max_concurrent_sessions", &self.max_concurrent_sessions)
            .field("extraction_policy", &self.extraction_policy)
            .field(
                "vision_api_key",
                &self.vision_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("vision_model", &self.vision_model)
            .field("vision_base_url", &self.vision_base_url)
            .field("vision_max_attempts", &self.vision_max_attempts)
            .field("vision_backoff_ms", &self.vision_backoff_ms)
            .field("vision_timeout_secs", &self.vision_timeout_secs)
            .finish()
    }
}
