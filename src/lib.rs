pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;

pub use crate::application::use_cases::file_intake::FileIntake;
pub use crate::application::use_cases::import_processor::ImportProcessor;
pub use crate::application::use_cases::materializer::PageMaterializer;
pub use crate::application::use_cases::row_validator::RowValidator;
pub use crate::domain::error::{AppError, Result};
pub use crate::domain::settings::ImporterSettings;
