pub mod blob;
pub mod blob_id;
pub mod error;
pub mod snapshot_id;

pub use blob::{BlobHandle, BlobHandles, BlobType};
pub use blob_id::BlobId;
pub use error::{Result, SnapfsError};
pub use snapshot_id::SnapshotId;
