pub mod file;
pub mod message;
pub mod record;

pub use file::{File, FileKind, FileMetadata};
pub use message::{CanonicalMessage, ReplyRef, MAX_FILES};
pub use record::{BridgeEntry, StoredRecord};
