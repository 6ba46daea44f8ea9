pub mod clock;
pub mod headers;
pub mod staging;
