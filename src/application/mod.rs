pub mod use_cases;

pub use use_cases::file_intake::FileIntake;
pub use use_cases::import_processor::ImportProcessor;
pub use use_cases::materializer::PageMaterializer;
pub use use_cases::row_validator::RowValidator;
