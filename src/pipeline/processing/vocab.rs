//! Reference vocabularies used to canonicalize categorical CRM columns.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use super::coerce::{is_null_token, normalize_text};
use crate::constants as col;
use crate::constants::UNKNOWN;
use crate::domain::Dataset;

/// A closed set of canonical values with accepted spellings
pub struct Vocabulary {
    pub name: &'static str,
    index: HashMap<String, &'static str>,
}

/// Outcome of canonicalizing one cell
#[derive(Debug, Clone, PartialEq)]
pub enum Canonical {
    /// Matched a canonical value (directly or through an alias)
    Known(&'static str),
    /// Normalized text that is not part of the vocabulary
    OutOfVocabulary(String),
    /// Null in the export, filled with `unknown`
    Missing,
}

impl Canonical {
    pub fn into_value(self) -> String {
        match self {
            Canonical::Known(v) => v.to_string(),
            Canonical::OutOfVocabulary(v) => v,
            Canonical::Missing => UNKNOWN.to_string(),
        }
    }
}

impl Vocabulary {
    fn new(name: &'static str, entries: &[(&'static str, &[&str])]) -> Self {
        let mut index = HashMap::new();
        for (canonical, aliases) in entries {
            index.insert(normalize_text(canonical), *canonical);
            for alias in *aliases {
                index.insert(normalize_text(alias), *canonical);
            }
        }
        Self { name, index }
    }

    pub fn canonicalize(&self, raw: Option<&str>) -> Canonical {
        let Some(raw) = raw.filter(|v| !is_null_token(v)) else {
            return Canonical::Missing;
        };
        let normalized = normalize_text(raw);
        match self.index.get(&normalized) {
            Some(canonical) => Canonical::Known(canonical),
            None if normalized == UNKNOWN => Canonical::Missing,
            None => Canonical::OutOfVocabulary(normalized),
        }
    }

    pub fn values(&self) -> Vec<&'static str> {
        let mut v: Vec<_> = self.index.values().copied().collect();
        v.sort_unstable();
        v.dedup();
        v
    }
}

static DEAL_STAGE: Lazy<Vocabulary> = Lazy::new(|| {
    Vocabulary::new(
        "deal_stage",
        &[
            ("new lead", &["new", "lead"]),
            ("need to call", &["need to call - sales", "to call"]),
            ("call delayed", &["delayed call"]),
            ("need a consultation", &["consultation"]),
            ("qualificated", &["qualified"]),
            ("test sent", &[]),
            ("registered on webinar", &["webinar"]),
            ("registered on offline day", &["offline day"]),
            ("waiting for payment", &["wait for payment", "awaiting payment"]),
            ("payment done", &["paid", "payment completed", "won", "closed won"]),
            ("free education", &[]),
            ("lost", &["closed lost", "lost deal"]),
        ],
    )
});

static DEAL_QUALITY: Lazy<Vocabulary> = Lazy::new(|| {
    Vocabulary::new(
        "deal_quality",
        &[
            ("a - high", &["a", "high", "a-high"]),
            ("b - medium", &["b", "medium", "b-medium"]),
            ("c - low", &["c", "low", "c-low"]),
            ("d - non target", &["d", "non target", "d-non target"]),
            ("e - non qualified", &["e", "non qualified", "e-non qualified"]),
            ("f", &[]),
        ],
    )
});

static PAYMENT_TYPE: Lazy<Vocabulary> = Lazy::new(|| {
    Vocabulary::new(
        "payment_type",
        &[
            ("one payment", &["single payment", "full payment", "one-time payment"]),
            ("recurring payments", &["recurring payment", "installments", "instalments", "monthly"]),
            ("reservation", &["deposit"]),
        ],
    )
});

static CALL_TYPE: Lazy<Vocabulary> = Lazy::new(|| {
    Vocabulary::new(
        "call_type",
        &[
            ("outbound", &["outgoing"]),
            ("inbound", &["incoming"]),
            ("missed", &["missed call"]),
        ],
    )
});

static CALL_STATUS: Lazy<Vocabulary> = Lazy::new(|| {
    Vocabulary::new(
        "call_status",
        &[
            ("attended dialled", &["attended dialed", "attended"]),
            ("unattended dialled", &["unattended dialed", "unattended"]),
            ("received", &[]),
            ("missed", &[]),
            ("scheduled", &[]),
            ("overdue", &[]),
            ("cancelled", &["canceled"]),
            ("completed", &["done"]),
        ],
    )
});

static OUTGOING_CALL_STATUS: Lazy<Vocabulary> = Lazy::new(|| {
    Vocabulary::new(
        "outgoing_call_status",
        &[
            ("completed", &["done"]),
            ("scheduled", &[]),
            ("overdue", &[]),
            ("cancelled", &["canceled"]),
        ],
    )
});

/// Vocabulary governing a categorical column, if any
pub fn vocabulary_for(dataset: Dataset, column: &str) -> Option<&'static Vocabulary> {
    let v: &'static Lazy<Vocabulary> = match (dataset, column) {
        (Dataset::Deals, col::STAGE) => &DEAL_STAGE,
        (Dataset::Deals, col::QUALITY) => &DEAL_QUALITY,
        (Dataset::Deals, col::PAYMENT_TYPE) => &PAYMENT_TYPE,
        (Dataset::Calls, col::CALL_TYPE) => &CALL_TYPE,
        (Dataset::Calls, col::CALL_STATUS) => &CALL_STATUS,
        (Dataset::Calls, col::OUTGOING_CALL_STATUS) => &OUTGOING_CALL_STATUS,
        _ => return None,
    };
    Some(Lazy::force(v))
}

static LEVEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ABC][0-2]").expect("valid regex"));

/// Normalize a free-text German level (`b1`, `В 1`, `A2/B1`) to `A0`..`C2`.
///
/// Cyrillic look-alike letters are mapped to Latin before matching; the
/// first level found wins.
pub fn normalize_level(raw: Option<&str>) -> Option<String> {
    let raw = raw.filter(|v| !is_null_token(v))?;
    let text: String = raw
        .trim()
        .chars()
        .map(|c| match c {
            'А' | 'а' => 'A',
            'В' | 'в' | 'Б' | 'б' => 'B',
            'С' | 'с' => 'C',
            other => other,
        })
        .collect::<String>()
        .to_uppercase()
        .replace(' ', "");
    LEVEL.find(&text).map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_aliases_map_to_canonical() {
        let vocab = vocabulary_for(Dataset::Deals, col::STAGE).unwrap();
        assert_eq!(vocab.canonicalize(Some("  Payment   Done")), Canonical::Known("payment done"));
        assert_eq!(vocab.canonicalize(Some("Closed Lost")), Canonical::Known("lost"));
        assert_eq!(vocab.canonicalize(None), Canonical::Missing);
        assert_eq!(vocab.canonicalize(Some("nan")), Canonical::Missing);
    }

    #[test]
    fn test_out_of_vocabulary_keeps_normalized_text() {
        let vocab = vocabulary_for(Dataset::Calls, col::CALL_TYPE).unwrap();
        assert_eq!(
            vocab.canonicalize(Some("Video  Call")),
            Canonical::OutOfVocabulary("video call".to_string())
        );
        assert_eq!(Canonical::Missing.into_value(), "unknown");
    }

    #[test]
    fn test_no_vocabulary_for_free_text() {
        assert!(vocabulary_for(Dataset::Deals, col::CITY).is_none());
        assert!(vocabulary_for(Dataset::Calls, col::STAGE).is_none());
    }

    #[test]
    fn test_normalize_level_handles_cyrillic() {
        assert_eq!(normalize_level(Some("b1")), Some("B1".to_string()));
        assert_eq!(normalize_level(Some("В 2")), Some("B2".to_string()));
        assert_eq!(normalize_level(Some("с1 (advanced)")), Some("C1".to_string()));
        assert_eq!(normalize_level(Some("A2/B1")), Some("A2".to_string()));
        assert_eq!(normalize_level(Some("native")), None);
        assert_eq!(normalize_level(None), None);
    }
}
