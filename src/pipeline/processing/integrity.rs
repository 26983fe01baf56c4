//! Referential integrity between the cleaned tables.
//!
//! Orphans are reported and logged; rows are never dropped here.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::{info, warn};

use crate::constants as col;
use crate::domain::Dataset;
use crate::observability::metrics;
use crate::table::Table;

const MAX_EXAMPLES: usize = 10;

/// Result of checking one foreign key
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrphanFinding {
    /// e.g. `Calls.CONTACTID -> Contacts.Id`
    pub relation: String,
    pub checked: usize,
    pub orphans: usize,
    pub examples: Vec<String>,
}

/// Count values of `child` that do not appear in `parent`, ignoring nulls.
pub fn find_orphans(
    relation: String,
    child: &[Option<String>],
    parent: &[Option<String>],
) -> OrphanFinding {
    let known: HashSet<&str> = parent.iter().flatten().map(String::as_str).collect();
    let mut checked = 0;
    let mut orphans = 0;
    let mut examples = BTreeSet::new();
    for value in child.iter().flatten() {
        checked += 1;
        if !known.contains(value.as_str()) {
            orphans += 1;
            if examples.len() < MAX_EXAMPLES {
                examples.insert(value.clone());
            }
        }
    }
    OrphanFinding {
        relation,
        checked,
        orphans,
        examples: examples.into_iter().collect(),
    }
}

fn relation(
    child: (&Table, Dataset, &str),
    parent: (&Table, Dataset, &str),
) -> Option<OrphanFinding> {
    let (child_table, child_ds, child_col) = child;
    let (parent_table, parent_ds, parent_col) = parent;
    let child_values = child_table.text(child_col)?;
    let parent_values = parent_table.text(parent_col)?;
    Some(find_orphans(
        format!("{child_ds}.{child_col} -> {parent_ds}.{parent_col}"),
        child_values,
        parent_values,
    ))
}

/// Check every foreign key whose tables are available.
pub fn check_integrity(
    contacts: Option<&Table>,
    calls: Option<&Table>,
    deals: Option<&Table>,
    spend: Option<&Table>,
) -> Vec<OrphanFinding> {
    let mut findings = Vec::new();

    if let (Some(calls), Some(contacts)) = (calls, contacts) {
        findings.extend(relation(
            (calls, Dataset::Calls, col::CONTACT_ID),
            (contacts, Dataset::Contacts, col::ID),
        ));
    }
    if let (Some(deals), Some(contacts)) = (deals, contacts) {
        findings.extend(relation(
            (deals, Dataset::Deals, col::CONTACT_NAME),
            (contacts, Dataset::Contacts, col::ID),
        ));
    }
    if let (Some(deals), Some(spend)) = (deals, spend) {
        findings.extend(relation(
            (deals, Dataset::Deals, col::CAMPAIGN),
            (spend, Dataset::Spend, col::CAMPAIGN),
        ));
    }

    for finding in &findings {
        metrics::cleaning::record_orphans(&finding.relation, finding.orphans);
        if finding.orphans > 0 {
            warn!(
                relation = %finding.relation,
                orphans = finding.orphans,
                checked = finding.checked,
                examples = ?finding.examples,
                "Orphan foreign keys"
            );
        } else {
            info!(relation = %finding.relation, checked = finding.checked, "Foreign keys resolve");
        }
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Column, ColumnData};

    fn text(values: &[Option<&str>]) -> ColumnData {
        ColumnData::Text(values.iter().map(|v| v.map(str::to_string)).collect())
    }

    #[test]
    fn test_find_orphans_ignores_nulls_and_caps_examples() {
        let parent: Vec<Option<String>> = vec![Some("1".into())];
        let child: Vec<Option<String>> = (0..15)
            .map(|i| Some(format!("x{i:02}")))
            .chain([Some("1".to_string()), None])
            .collect();

        let finding = find_orphans("a -> b".into(), &child, &parent);
        assert_eq!(finding.checked, 16);
        assert_eq!(finding.orphans, 15);
        assert_eq!(finding.examples.len(), 10);
    }

    #[test]
    fn test_check_integrity_skips_missing_tables() {
        let mut contacts = Table::new("Contacts");
        contacts.set_column(Column::new(col::ID, text(&[Some("c1"), Some("c2")])));
        let mut calls = Table::new("Calls");
        calls.set_column(Column::new(col::CONTACT_ID, text(&[Some("c1"), Some("c9"), None])));
        let mut deals = Table::new("Deals");
        deals.set_column(Column::new(col::CONTACT_NAME, text(&[Some("c2")])));
        deals.set_column(Column::new(col::CAMPAIGN, text(&[Some("spring")])));

        let findings = check_integrity(Some(&contacts), Some(&calls), Some(&deals), None);

        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].relation, "Calls.CONTACTID -> Contacts.Id");
        assert_eq!(findings[0].orphans, 1);
        assert_eq!(findings[0].examples, vec!["c9".to_string()]);
        assert_eq!(findings[1].orphans, 0);
    }
}
