pub mod artifacts;
pub mod browser;
pub mod checkpoint;
pub mod crawl_config;
pub mod dedup;
pub mod discovery;
pub mod error;
pub mod extract;
pub mod navigator;
pub mod normalize;
pub mod orchestrator;
pub mod price;
pub mod record;
pub(crate) mod retry;
pub mod sink;
pub mod vision;

pub use artifacts::ArtifactStore;
pub use browser::chromium::ChromiumBrowser;
pub use browser::{BrowserPage, CapturedResponse, PageFactory, PageResponse, ResponseSubscription};
pub use checkpoint::CheckpointStore;
pub use crawl_config::CrawlConfig;
pub use dedup::Deduplicator;
pub use discovery::Discovery;
pub use error::{ScraperError, VisionError};
pub use extract::{Strategy, VisionExtractor};
pub use navigator::Navigator;
pub use normalize::Normalizer;
pub use orchestrator::{CrawlOrchestrator, Phase};
pub use price::parse_price_cents;
pub use record::{RawRecord, RecordSource};
pub use sink::{MemorySink, OfferSink};
pub use vision::VisionClient;
