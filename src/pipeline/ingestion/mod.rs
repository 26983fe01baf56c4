// Pipeline ingestion: locating and reading raw exports, import checklist

pub mod import_check;
pub mod reader;

pub use import_check::{run_import_check, ImportChecklist, ImportOutcome, TableStatus};
pub use reader::{read_raw, RawFile};
