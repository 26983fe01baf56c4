// Pipeline processing: coercion, vocabularies, cleaning, derived fields and integrity checks

pub mod cleaning;
pub mod coerce;
pub mod derive;
pub mod integrity;
pub mod vocab;

pub use cleaning::{clean_table, Cleaned, CleaningStatus, TableBrief, TableCleaning};
pub use integrity::{check_integrity, OrphanFinding};
