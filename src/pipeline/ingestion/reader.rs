//! Reading raw CRM exports into all-text tables.
//!
//! Supports delimited text (`.csv`, `.tsv`, `.txt`) in UTF-8/UTF-16 or legacy
//! Windows code pages, and spreadsheets (`.xlsx`, `.xls`) through calamine.

use calamine::{open_workbook_auto, Data, Reader};
use encoding_rs::{Encoding, WINDOWS_1251, WINDOWS_1252};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::domain::Dataset;
use crate::error::{PipelineError, Result};
use crate::pipeline::processing::coerce::is_null_token;
use crate::table::Table;

const TEXT_EXTENSIONS: &[&str] = &["csv", "tsv", "txt"];
const SHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "xlsb", "ods"];
const DELIMITERS: &[u8] = &[b',', b';', b'\t', b'|'];
const SNIFF_LINES: usize = 20;

/// A raw export loaded as text, with what was learned while reading it
#[derive(Debug, Clone)]
pub struct RawFile {
    pub path: PathBuf,
    pub table: Table,
    pub format: FileFormat,
    /// Encoding label for text files
    pub encoding: Option<String>,
    pub delimiter: Option<char>,
    pub size_bytes: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Delimited,
    Spreadsheet,
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn is_supported(path: &Path) -> bool {
    extension(path)
        .map(|e| TEXT_EXTENSIONS.contains(&e.as_str()) || SHEET_EXTENSIONS.contains(&e.as_str()))
        .unwrap_or(false)
}

/// Find the export for `dataset`: the configured file name first, then any
/// supported file whose stem contains the table name (case-insensitive).
pub fn locate(raw_dir: &Path, configured_name: &str, dataset: Dataset) -> Option<PathBuf> {
    let exact = raw_dir.join(configured_name);
    if exact.is_file() {
        return Some(exact);
    }

    let needle = dataset.as_str().to_lowercase();
    let mut candidates: Vec<PathBuf> = fs::read_dir(raw_dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_supported(p))
        .filter(|p| {
            p.file_stem()
                .and_then(|s| s.to_str())
                .map(|s| s.to_lowercase().contains(&needle))
                .unwrap_or(false)
        })
        .collect();
    candidates.sort();

    let found = candidates.into_iter().next();
    if let Some(path) = &found {
        debug!(table = %dataset, path = %path.display(), "Located export by fuzzy match");
    }
    found
}

/// Load a raw export; every cell becomes an optional string.
pub fn read_raw(path: &Path, dataset: Dataset) -> Result<RawFile> {
    if !path.is_file() {
        return Err(PipelineError::MissingFile(path.display().to_string()));
    }
    let bytes = fs::read(path)?;
    let sha256 = hex::encode(Sha256::digest(&bytes));
    let size_bytes = bytes.len() as u64;

    let ext = extension(path).unwrap_or_default();
    let raw = if SHEET_EXTENSIONS.contains(&ext.as_str()) {
        RawFile {
            path: path.to_path_buf(),
            table: read_spreadsheet(path, dataset)?,
            format: FileFormat::Spreadsheet,
            encoding: None,
            delimiter: None,
            size_bytes,
            sha256,
        }
    } else {
        let (text, encoding) = decode(&bytes, path)?;
        let delimiter = if ext == "tsv" { b'\t' } else { sniff_delimiter(&text) };
        RawFile {
            path: path.to_path_buf(),
            table: read_delimited(&text, delimiter, dataset)?,
            format: FileFormat::Delimited,
            encoding: Some(encoding.to_string()),
            delimiter: Some(delimiter as char),
            size_bytes,
            sha256,
        }
    };

    info!(
        table = %dataset,
        path = %path.display(),
        rows = raw.table.num_rows(),
        cols = raw.table.num_columns(),
        "Read raw export"
    );
    Ok(raw)
}

/// Decode text bytes: BOM first, then strict UTF-8, then a legacy code page
/// picked by [`legacy_code_page`].
pub fn decode(bytes: &[u8], path: &Path) -> Result<(String, &'static str)> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, had_errors) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        if had_errors {
            return Err(PipelineError::Encoding {
                path: path.display().to_string(),
                message: format!("invalid {} content after BOM", encoding.name()),
            });
        }
        return Ok((text.into_owned(), encoding.name()));
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok((text.to_string(), "UTF-8"));
    }

    let encoding = legacy_code_page(bytes);
    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors {
        return Err(PipelineError::Encoding {
            path: path.display().to_string(),
            message: format!("not valid UTF-8 or {}", encoding.name()),
        });
    }
    debug!(path = %path.display(), encoding = encoding.name(), "Decoded with legacy code page");
    Ok((text.into_owned(), encoding.name()))
}

/// Both single-byte code pages decode almost any input, so choose by shape:
/// Cyrillic words are runs of high bytes, while Western European text has
/// isolated accented letters between ASCII ones.
pub fn legacy_code_page(bytes: &[u8]) -> &'static Encoding {
    let high = bytes.iter().filter(|b| **b >= 0x80).count();
    let paired = bytes
        .windows(2)
        .filter(|w| w[0] >= 0x80 && w[1] >= 0x80)
        .count();
    if high > 0 && paired * 2 >= high {
        WINDOWS_1251
    } else {
        WINDOWS_1252
    }
}

/// Pick the delimiter that splits the first lines into the most consistent
/// number of fields (more than one). Defaults to a comma.
pub fn sniff_delimiter(text: &str) -> u8 {
    let sample: String = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(SNIFF_LINES)
        .collect::<Vec<_>>()
        .join("\n");

    let mut best = (b',', 0.0_f64, 0_usize);
    for &delimiter in DELIMITERS {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(sample.as_bytes());
        let counts: Vec<usize> = reader.records().filter_map(|r| r.ok()).map(|r| r.len()).collect();
        if counts.is_empty() {
            continue;
        }

        let mut freq: HashMap<usize, usize> = HashMap::new();
        for c in &counts {
            *freq.entry(*c).or_default() += 1;
        }
        let Some((&mode, &hits)) = freq.iter().max_by_key(|(fields, hits)| (**hits, **fields)) else {
            continue;
        };
        if mode <= 1 {
            continue;
        }

        let consistency = hits as f64 / counts.len() as f64;
        if consistency > best.1 || (consistency == best.1 && mode > best.2) {
            best = (delimiter, consistency, mode);
        }
    }
    best.0
}

fn cell(value: &str) -> Option<String> {
    if is_null_token(value) {
        None
    } else {
        Some(value.to_string())
    }
}

/// Trim header names, name blank ones and suffix duplicates (`Id`, `Id.1`).
pub fn dedupe_headers(raw: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    raw.into_iter()
        .enumerate()
        .map(|(i, h)| {
            let trimmed = h.trim().trim_start_matches('\u{feff}').to_string();
            let base = if trimmed.is_empty() {
                format!("Unnamed: {i}")
            } else {
                trimmed
            };
            let n = seen.entry(base.clone()).or_insert(0);
            let name = if *n == 0 { base } else { format!("{base}.{n}") };
            *n += 1;
            name
        })
        .collect()
}

pub fn read_delimited(text: &str, delimiter: u8, dataset: Dataset) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = dedupe_headers(reader.headers()?.iter().map(str::to_string));
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|v| v.trim().is_empty()) {
            continue;
        }
        rows.push(record.iter().map(cell).collect());
    }
    Ok(Table::from_text_rows(dataset.as_str(), &headers, rows))
}

fn sheet_cell(value: &Data) -> Option<String> {
    match value {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => cell(s),
        Data::Int(i) => Some(i.to_string()),
        // Identifiers come back as floats; keep them integral
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => Some(format!("{}", *f as i64)),
        Data::Float(f) => Some(f.to_string()),
        Data::Bool(b) => Some(b.to_string()),
        Data::DateTime(dt) if dt.is_duration() => dt.as_duration().map(|d| {
            let secs = d.num_seconds();
            format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
        }),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => cell(s),
    }
}

pub fn read_spreadsheet(path: &Path, dataset: Dataset) -> Result<Table> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook.worksheet_range_at(0).ok_or_else(|| {
        PipelineError::Config(format!("workbook {} has no sheets", path.display()))
    })??;

    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Ok(Table::new(dataset.as_str()));
    };
    let headers = dedupe_headers(
        header_row
            .iter()
            .map(|h| sheet_cell(h).unwrap_or_default()),
    );

    let body = rows
        .map(|r| r.iter().map(sheet_cell).collect::<Vec<_>>())
        .filter(|r| r.iter().any(Option::is_some))
        .collect();
    Ok(Table::from_text_rows(dataset.as_str(), &headers, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sniff_delimiter_prefers_consistent_split() {
        assert_eq!(sniff_delimiter("a;b;c\n1;2;3\n4;5;6\n"), b';');
        assert_eq!(sniff_delimiter("a\tb\n1\t2\n"), b'\t');
        assert_eq!(sniff_delimiter("a,b\n\"1,5\",2\n"), b',');
        assert_eq!(sniff_delimiter("single\nvalue\n"), b',');
    }

    #[test]
    fn test_dedupe_headers() {
        let headers = dedupe_headers(vec![
            " Id ".to_string(),
            "Id".to_string(),
            "".to_string(),
            "Id".to_string(),
        ]);
        assert_eq!(headers, vec!["Id", "Id.1", "Unnamed: 2", "Id.2"]);
    }

    #[test]
    fn test_decode_falls_back_to_windows_1251() {
        // "Привет" in Windows-1251
        let bytes = [0xCF, 0xF0, 0xE8, 0xE2, 0xE5, 0xF2];
        let (text, encoding) = decode(&bytes, Path::new("x.csv")).unwrap();
        assert_eq!(text, "Привет");
        assert_eq!(encoding, "windows-1251");
    }

    #[test]
    fn test_decode_picks_windows_1252_for_isolated_umlauts() {
        // "City\nMünchen\nDüsseldorf" in Windows-1252
        let bytes = b"City\nM\xFCnchen\nD\xFCsseldorf";
        let (text, encoding) = decode(bytes, Path::new("x.csv")).unwrap();
        assert_eq!(text, "City\nMünchen\nDüsseldorf");
        assert_eq!(encoding, "windows-1252");
    }

    #[test]
    fn test_legacy_code_page_prefers_1251_for_cyrillic_runs() {
        // "Id;Имя" in Windows-1251
        let bytes = [b'I', b'd', b';', 0xC8, 0xEC, 0xFF];
        assert_eq!(legacy_code_page(&bytes), WINDOWS_1251);
        assert_eq!(legacy_code_page(b"Stra\xDFe"), WINDOWS_1252);
    }

    #[test]
    fn test_decode_strips_utf8_bom() {
        let (text, encoding) = decode(b"\xEF\xBB\xBFId,Name", Path::new("x.csv")).unwrap();
        assert_eq!(text, "Id,Name");
        assert_eq!(encoding, "UTF-8");
    }

    #[test]
    fn test_read_delimited_keeps_ids_as_text_and_nulls_tokens() {
        let table = read_delimited("Id;City\n007;Berlin\n008;nan\n;\n", b';', Dataset::Deals).unwrap();
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.text("Id").unwrap()[0].as_deref(), Some("007"));
        assert_eq!(table.text("City").unwrap()[1], None);
    }

    #[test]
    fn test_locate_falls_back_to_fuzzy_name() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("crm_deals_export.csv"), "Id\n1\n").unwrap();
        fs::write(dir.path().join("notes.md"), "deals").unwrap();

        let found = locate(dir.path(), "Deals (Done).xlsx", Dataset::Deals).unwrap();
        assert!(found.ends_with("crm_deals_export.csv"));
        assert!(locate(dir.path(), "Calls.csv", Dataset::Calls).is_none());
    }

    #[test]
    fn test_read_raw_records_encoding_and_checksum() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Spend.csv");
        fs::write(&path, "Date,Source,Spend\n01.02.2024,Google,\"12,5\"\n").unwrap();

        let raw = read_raw(&path, Dataset::Spend).unwrap();
        assert_eq!(raw.encoding.as_deref(), Some("UTF-8"));
        assert_eq!(raw.delimiter, Some(','));
        assert_eq!(raw.sha256.len(), 64);
        assert_eq!(raw.table.text("Spend").unwrap()[0].as_deref(), Some("12,5"));
    }

    #[test]
    fn test_read_raw_missing_file() {
        let err = read_raw(Path::new("nope/Deals.csv"), Dataset::Deals).unwrap_err();
        assert!(matches!(err, PipelineError::MissingFile(_)));
    }
}
