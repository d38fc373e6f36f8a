// Public modules
pub mod bulletin;
pub mod clustering;
pub mod config;
pub mod error;
pub mod extractor;
pub mod feeds;
pub mod judge;
pub mod models;
pub mod oracle;
pub mod redirect;
pub mod render;
pub mod synthesizer;

// Re-export commonly used types
pub use bulletin::{BulletinArtifacts, BulletinGenerator};
pub use clustering::{CandidateSet, ClusterOutcome, StoryClusterer};
pub use config::{Config, Engine, MatchPolicy};
pub use error::{ConfigError, DecodeError, FetchError, OracleError, ResolveError};
pub use extractor::ContentResolver;
pub use feeds::{load_feeds, FeedFetcher};
pub use judge::{Grade, SimilarityJudge};
pub use models::{ArticleRecord, ClusterRow, ClusterSelection, StoryMaterial, StorySegment};
pub use oracle::{build_oracle, ChatMessage, Oracle, OracleRole};
pub use redirect::GoogleNewsDecoder;
pub use render::{PdfRenderer, SpeechSynthesizer};
pub use synthesizer::BroadcastSynthesizer;
