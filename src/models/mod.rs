pub mod blob_id;
pub mod file_record;

pub use blob_id::{BlobId, InvalidBlobId};
pub use file_record::FileRecord;
