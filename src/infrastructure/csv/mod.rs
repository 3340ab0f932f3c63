// ============================================================
// CSV INFRASTRUCTURE
// ============================================================
// Encoding-aware reading of delimited import files

pub mod reader;

pub use reader::CsvReader;
