pub mod download;
pub mod health;
pub mod status;
pub mod upload;
