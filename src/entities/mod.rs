pub mod uploaded_files;

pub mod prelude {
    pub use super::uploaded_files::Entity as UploadedFiles;
}
