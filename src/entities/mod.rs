pub mod prelude;

pub mod blob_chunks;
pub mod blob_files;
