pub mod download_service;
pub mod status_service;
pub mod storage;
pub mod upload_service;
