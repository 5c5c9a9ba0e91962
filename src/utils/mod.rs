pub mod auth;
pub mod http_date;
pub mod mime_types;
