pub mod blob_store;
pub mod file_service;
pub mod worker;
