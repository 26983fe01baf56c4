use askama::Template;
use serde_json::Value;

/// One entry of the top navigation
pub struct NavLink {
    pub href: &'static str,
    pub label: &'static str,
}

pub const NAV: &[(&str, &[NavLink])] = &[
    (
        "Data",
        &[
            NavLink { href: "/data/import", label: "Import" },
            NavLink { href: "/data/cleaning", label: "Cleaning" },
            NavLink { href: "/data/descriptive", label: "Descriptive" },
        ],
    ),
    (
        "Visualization",
        &[
            NavLink { href: "/viz/timeseries", label: "Time series" },
            NavLink { href: "/viz/campaigns", label: "Campaigns" },
            NavLink { href: "/viz/sales", label: "Sales" },
            NavLink { href: "/viz/payments", label: "Payments" },
            NavLink { href: "/viz/geo", label: "Geography" },
        ],
    ),
    (
        "Product",
        &[
            NavLink { href: "/product/unit-economics", label: "Unit economics" },
            NavLink { href: "/product/growth-points", label: "Growth points" },
            NavLink { href: "/product/metric-tree", label: "Metric tree" },
            NavLink { href: "/product/hypotheses", label: "Hypotheses" },
        ],
    ),
    (
        "Reports",
        &[
            NavLink { href: "/reports/full", label: "Full report" },
            NavLink { href: "/reports/full-ue", label: "Unit economics report" },
        ],
    ),
];

pub struct DataTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl DataTable {
    pub fn new(headers: &[&str], rows: Vec<Vec<String>>) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows,
        }
    }
}

pub struct Chart {
    pub id: String,
    /// Serialized Plotly figure
    pub figure: String,
}

/// A titled block of a page: any mix of note, chart and table.
pub struct Panel {
    pub title: String,
    pub note: Option<String>,
    pub chart: Option<Chart>,
    pub table: Option<DataTable>,
}

impl Panel {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            note: None,
            chart: None,
            table: None,
        }
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn chart(mut self, id: impl Into<String>, figure: &Value) -> Self {
        self.chart = Some(Chart {
            id: id.into(),
            figure: figure.to_string(),
        });
        self
    }

    pub fn table(mut self, table: DataTable) -> Self {
        self.table = Some(table);
        self
    }
}

pub struct FilterOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

pub struct FilterField {
    pub name: String,
    pub label: String,
    pub multiple: bool,
    pub options: Vec<FilterOption>,
}

impl FilterField {
    /// Select with an "All" entry first; `selected` values are pre-selected.
    pub fn select(name: &str, label: &str, values: &[String], selected: &[String], multiple: bool) -> Self {
        let mut options = Vec::with_capacity(values.len() + 1);
        if !multiple {
            options.push(FilterOption {
                value: String::new(),
                label: "All".to_string(),
                selected: selected.is_empty(),
            });
        }
        options.extend(values.iter().map(|v| FilterOption {
            value: v.clone(),
            label: v.clone(),
            selected: selected.contains(v),
        }));
        Self {
            name: name.to_string(),
            label: label.to_string(),
            multiple,
            options,
        }
    }
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub title: String,
    pub nav: &'static [(&'static str, &'static [NavLink])],
    pub tables: DataTable,
    pub last_import: Option<String>,
    pub last_cleaning: Option<String>,
}

#[derive(Template)]
#[template(path = "page.html")]
pub struct PageTemplate {
    pub title: String,
    pub nav: &'static [(&'static str, &'static [NavLink])],
    pub intro: Option<String>,
    pub action: String,
    pub filters: Vec<FilterField>,
    pub empty: Option<String>,
    pub panels: Vec<Panel>,
}

#[derive(Template)]
#[template(path = "report.html")]
pub struct ReportTemplate {
    pub title: String,
    pub nav: &'static [(&'static str, &'static [NavLink])],
    pub empty: Option<String>,
    /// Markdown rendered to HTML
    pub body: String,
}
