pub mod bidding;
pub mod checkpoint;
pub mod credentials;
pub mod markup;
pub mod runlog;

pub use bidding::{BulletinId, ClassifiedRecord, EnrichedRecord, Enrichment, RawRecord, Situation};
pub use checkpoint::{Checkpoint, CheckpointError, CheckpointStore, FileCheckpointStore};
pub use credentials::{Credentials, CredentialsError};
pub use markup::Markup;
pub use runlog::{LogEntry, LogLevel, RunLog};
