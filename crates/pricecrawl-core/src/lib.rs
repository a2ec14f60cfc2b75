pub mod app_config;
pub mod config;
pub mod crawl;
pub mod offers;
pub mod retailers;

use thiserror::Error;

pub use app_config::{AppConfig, Environment, ExtractionPolicy};
pub use config::{load_app_config, load_app_config_from_env};
pub use crawl::{CategoryOutcome, CategoryUrl, CrawlProgress, FailedCategory, RunSummary};
pub use offers::{dedup_key, infer_on_sale, ProductOffer};
pub use retailers::{
    load_retailers, parse_retailers, RetailerAdapter, RetailersFile, SeedCategory, SelectorSet,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read retailers file {path}: {source}")]
    RetailersFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse retailers file: {0}")]
    RetailersFileParse(#[from] serde_yaml::Error),

    #[error("retailer config validation failed: {0}")]
    Validation(String),
}
