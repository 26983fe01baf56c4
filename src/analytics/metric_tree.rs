//! The unit-economics metric tree: which metric is built from which, down
//! to the raw export columns.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Target,
    Financial,
    Decision,
    Product,
    Atomic,
}

#[derive(Debug, Clone, Serialize)]
pub struct TreeNode {
    pub id: &'static str,
    pub label: &'static str,
    pub kind: NodeKind,
    pub layer: usize,
    pub title: &'static str,
    pub essence: &'static str,
    pub formula: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricTree {
    pub nodes: Vec<TreeNode>,
    /// `(input, output)` pairs
    pub edges: Vec<(&'static str, &'static str)>,
}

impl MetricTree {
    pub fn node(&self, id: &str) -> Option<&TreeNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Inputs feeding `id`
    pub fn inputs(&self, id: &str) -> Vec<&'static str> {
        self.edges.iter().filter(|(_, to)| *to == id).map(|(from, _)| *from).collect()
    }

    /// Metrics that use `id`
    pub fn outputs(&self, id: &str) -> Vec<&'static str> {
        self.edges.iter().filter(|(from, _)| *from == id).map(|(_, to)| *to).collect()
    }

    pub fn layers(&self) -> Vec<Vec<&TreeNode>> {
        let depth = self.nodes.iter().map(|n| n.layer + 1).max().unwrap_or(0);
        (0..depth)
            .map(|layer| self.nodes.iter().filter(|n| n.layer == layer).collect())
            .collect()
    }
}

type NodeSpec = (&'static str, &'static str, NodeKind, &'static str, &'static str, &'static str);

const LAYERS: &[&[NodeSpec]] = &[
    &[("cm", "CM", NodeKind::Target, "CM, contribution margin", "Margin left after acquisition costs", "CM = UA * (LTV - CPA)")],
    &[
        ("ua", "UA", NodeKind::Decision, "UA, units", "Distinct people who reached us and may become customers", "UA = max(unique(Deals.Contact Name), unique(Contacts.Id), unique(Calls.CONTACTID))"),
        ("ltv", "LTV", NodeKind::Product, "LTV, margin per unit", "Average gross margin per unit, including C1", "LTV = CLTV * C1"),
        ("cpa", "CPA", NodeKind::Decision, "CPA, cost per unit", "Cost of acquiring one potential customer", "CPA = AC / UA"),
    ],
    &[
        ("cltv", "CLTV", NodeKind::Product, "CLTV, margin per customer", "Average gross margin per customer, without C1", "CLTV = AOV * APC"),
        ("c1", "C1", NodeKind::Decision, "C1, conversion", "Share of units that became buyers", "C1 = B / UA"),
        ("ac", "AC", NodeKind::Product, "AC, marketing budget", "Money spent on acquisition", "AC = sum(Spend.Spend)"),
    ],
    &[
        ("b", "B", NodeKind::Product, "B, buyers", "Number of buyers (Deals.Stage = 'payment done')", "B = unique(Deals.Id)"),
        ("aov", "AOV", NodeKind::Decision, "AOV, average order value", "Average revenue per transaction", "AOV = Revenue / T"),
        ("apc", "APC", NodeKind::Decision, "APC, payments per customer", "Average number of transactions per buyer", "APC = T / B"),
        ("cac", "CAC", NodeKind::Product, "CAC, cost per customer", "Cost of acquiring one buyer", "CAC = AC / B"),
    ],
    &[
        ("t", "T", NodeKind::Product, "T, transactions", "Total months of study paid for", "T = sum(Deals.Months of study)"),
        ("revenue", "Revenue", NodeKind::Financial, "Revenue", "Total revenue over buyers", "Revenue = sum(R_I)"),
    ],
    &[("ri", "R_I", NodeKind::Product, "R_I, revenue per student", "What one buyer brings over the course", "R_I = AOV_I * Months of study")],
    &[(
        "aov_i",
        "AOV_I",
        NodeKind::Product,
        "AOV_I, average payment of a deal",
        "Average monthly payment given the first payment, the remainder and the course length",
        "IF(Offer Total Amount - Initial Amount Paid > 0; ((Months of study - 1) * (Offer Total Amount - Initial Amount Paid) / (Course duration - 1) + Initial Amount Paid) / Months of study; Offer Total Amount / Course duration)",
    )],
    &[
        ("deal_contact_name", "Contact Name", NodeKind::Atomic, "Deals: Contact Name", "Contact identifier, a source for UA", "Source: Deals"),
        ("deal_stage", "Stage", NodeKind::Atomic, "Deals: Stage", "Selects buyers (payment done)", "Used in B"),
        ("deal_product", "Product", NodeKind::Atomic, "Deals: Product", "Product segmentation", "Used in the product breakdown"),
        ("deal_course_duration", "Course duration", NodeKind::Atomic, "Deals: Course duration", "Course length, feeds AOV_I", "Source: Deals"),
        ("deal_months", "Months of study", NodeKind::Atomic, "Deals: Months of study", "Months studied; summed into T", "Source of transactions"),
        ("deal_initial", "Initial Amount", NodeKind::Atomic, "Deals: Initial Amount Paid", "First payment, used by AOV_I", "Source: Deals"),
    ],
    &[
        ("deal_total", "Offer Total", NodeKind::Atomic, "Deals: Offer Total Amount", "Full course price, used by AOV_I", "Source: Deals"),
        ("deal_created", "Created Time", NodeKind::Atomic, "Deals: Created Time", "Deal creation date; sets the period and the UA pace", "Used in test planning"),
        ("spend_spend", "Spend", NodeKind::Atomic, "Spend: Spend", "Advertising spend; source of AC", "Source: Spend"),
        ("contacts_id", "Contacts Id", NodeKind::Atomic, "Contacts: Id", "Contact identifier, a source for UA", "Source: Contacts"),
        ("calls_contact", "Calls CONTACTID", NodeKind::Atomic, "Calls: CONTACTID", "Contact identifier, a source for UA", "Source: Calls"),
    ],
];

const EDGES: &[(&str, &str)] = &[
    ("ua", "cm"),
    ("ltv", "cm"),
    ("cpa", "cm"),
    ("cltv", "ltv"),
    ("c1", "ltv"),
    ("aov", "cltv"),
    ("apc", "cltv"),
    ("revenue", "aov"),
    ("t", "aov"),
    ("t", "apc"),
    ("b", "apc"),
    ("b", "c1"),
    ("ua", "c1"),
    ("ac", "cpa"),
    ("ua", "cpa"),
    ("ri", "revenue"),
    ("aov_i", "ri"),
    ("deal_course_duration", "aov_i"),
    ("deal_months", "aov_i"),
    ("deal_initial", "aov_i"),
    ("deal_total", "aov_i"),
    ("deal_months", "ri"),
    ("deal_months", "t"),
    ("deal_stage", "b"),
    ("deal_product", "b"),
    ("deal_contact_name", "ua"),
    ("contacts_id", "ua"),
    ("calls_contact", "ua"),
    ("deal_created", "ua"),
    ("spend_spend", "ac"),
    ("ac", "cac"),
    ("b", "cac"),
];

pub fn metric_tree() -> MetricTree {
    let nodes = LAYERS
        .iter()
        .enumerate()
        .flat_map(|(layer, specs)| {
            specs.iter().map(move |&(id, label, kind, title, essence, formula)| TreeNode {
                id,
                label,
                kind,
                layer,
                title,
                essence,
                formula,
            })
        })
        .collect();
    MetricTree {
        nodes,
        edges: EDGES.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_edges_reference_known_nodes() {
        let tree = metric_tree();
        let ids: HashSet<&str> = tree.nodes.iter().map(|n| n.id).collect();
        assert_eq!(ids.len(), tree.nodes.len());
        for (from, to) in &tree.edges {
            assert!(ids.contains(from), "unknown node {from}");
            assert!(ids.contains(to), "unknown node {to}");
        }
    }

    #[test]
    fn test_cm_inputs_and_layers() {
        let tree = metric_tree();
        assert_eq!(tree.inputs("cm"), vec!["ua", "ltv", "cpa"]);
        assert_eq!(tree.outputs("b"), vec!["apc", "c1", "cac"]);
        assert_eq!(tree.layers()[0][0].kind, NodeKind::Target);
        assert_eq!(tree.layers().len(), 9);
    }
}
