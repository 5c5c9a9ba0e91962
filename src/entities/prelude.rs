pub use super::blob_chunks::Entity as BlobChunks;
pub use super::blob_files::Entity as BlobFiles;
