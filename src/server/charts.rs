//! Plotly figure specs for the dashboard. Each builder returns the JSON that
//! the page hands to `Plotly.newPlot`.

use serde_json::{json, Value};

use crate::analytics::campaigns::{ChannelMetrics, FunnelStep};
use crate::analytics::descriptive::CategoricalSummary;
use crate::analytics::geo::CityStats;
use crate::analytics::metric_tree::{MetricTree, NodeKind};
use crate::analytics::payments::PaymentSegment;
use crate::analytics::sales::{LostReasonShare, OwnerMetrics};
use crate::analytics::timeseries::TimeSeries;
use crate::analytics::unit_economics::GrowthScenario;

fn figure(data: Vec<Value>, layout: Value) -> Value {
    json!({ "data": data, "layout": layout })
}

fn layout(title: &str) -> Value {
    json!({
        "title": { "text": title },
        "margin": { "t": 48, "r": 24, "b": 48, "l": 56 },
        "legend": { "orientation": "h" },
        "hovermode": "x unified",
    })
}

pub fn daily_activity(ts: &TimeSeries) -> Value {
    let dates: Vec<String> = ts.daily.iter().map(|p| p.date.to_string()).collect();
    let deals: Vec<u64> = ts.daily.iter().map(|p| p.deals_created).collect();
    let calls: Vec<u64> = ts.daily.iter().map(|p| p.calls_total).collect();
    let rate: Vec<Option<f64>> = ts.daily.iter().map(|p| p.deal_rate_pct).collect();

    let mut layout = layout("Deals created and calls per day");
    layout["yaxis2"] = json!({ "title": "deals per call, %", "overlaying": "y", "side": "right" });
    figure(
        vec![
            json!({ "type": "scatter", "mode": "lines", "name": "Deals created", "x": dates, "y": deals }),
            json!({ "type": "scatter", "mode": "lines", "name": "Calls", "x": dates, "y": calls }),
            json!({
                "type": "scatter", "mode": "lines", "name": "Deal rate, %", "x": dates, "y": rate,
                "yaxis": "y2", "line": { "dash": "dot" },
            }),
        ],
        layout,
    )
}

pub fn daily_closed(ts: &TimeSeries) -> Value {
    let dates: Vec<String> = ts.closed.iter().map(|p| p.date.to_string()).collect();
    let closed: Vec<u64> = ts.closed.iter().map(|p| p.deals_closed).collect();
    figure(
        vec![json!({ "type": "bar", "name": "Deals closed", "x": dates, "y": closed })],
        layout("Deals closed per day"),
    )
}

pub fn time_to_close(ts: &TimeSeries) -> Value {
    let labels: Vec<&str> = ts.ttc_bins.iter().map(|b| b.label).collect();
    let counts: Vec<u64> = ts.ttc_bins.iter().map(|b| b.count).collect();
    let mut layout = layout("Days from creation to closing");
    layout["xaxis"] = json!({ "type": "category" });
    figure(vec![json!({ "type": "bar", "x": labels, "y": counts, "name": "Deals" })], layout)
}

pub fn funnel(steps: &[FunnelStep]) -> Value {
    let stages: Vec<&str> = steps.iter().map(|s| s.stage).collect();
    let counts: Vec<f64> = steps.iter().map(|s| s.count).collect();
    let mut layout = layout("Impressions to payments");
    layout["hovermode"] = json!("closest");
    figure(
        vec![json!({ "type": "funnel", "y": stages, "x": counts, "textinfo": "value+percent previous" })],
        layout,
    )
}

pub fn spend_vs_revenue(channels: &[ChannelMetrics], title: &str) -> Value {
    let keys: Vec<String> = channels.iter().map(|c| c.key.join(" / ")).collect();
    let spend: Vec<f64> = channels.iter().map(|c| c.spend).collect();
    let revenue: Vec<f64> = channels.iter().map(|c| c.revenue).collect();
    let mut layout = layout(title);
    layout["barmode"] = json!("group");
    figure(
        vec![
            json!({ "type": "bar", "name": "Spend", "x": keys, "y": spend }),
            json!({ "type": "bar", "name": "Revenue", "x": keys, "y": revenue }),
        ],
        layout,
    )
}

pub fn owner_conversion(owners: &[OwnerMetrics]) -> Value {
    let names: Vec<&str> = owners.iter().map(|o| o.owner.as_str()).collect();
    let deals: Vec<u64> = owners.iter().map(|o| o.n_deals).collect();
    let paid: Vec<u64> = owners.iter().map(|o| o.n_paid).collect();
    let cr: Vec<f64> = owners.iter().map(|o| o.cr_deals_to_paid * 100.0).collect();
    let mut layout = layout("Deals, payments and conversion per owner");
    layout["barmode"] = json!("group");
    layout["yaxis2"] = json!({ "title": "CR, %", "overlaying": "y", "side": "right" });
    figure(
        vec![
            json!({ "type": "bar", "name": "Deals", "x": names, "y": deals }),
            json!({ "type": "bar", "name": "Paid", "x": names, "y": paid }),
            json!({ "type": "scatter", "mode": "markers", "name": "CR, %", "x": names, "y": cr, "yaxis": "y2" }),
        ],
        layout,
    )
}

/// Stacked bars of lost-reason shares, one trace per reason.
pub fn lost_reasons(shares: &[LostReasonShare]) -> Value {
    let mut reasons: Vec<&str> = shares.iter().map(|s| s.lost_reason.as_str()).collect();
    reasons.sort_unstable();
    reasons.dedup();
    let traces = reasons
        .into_iter()
        .map(|reason| {
            let rows: Vec<&LostReasonShare> = shares.iter().filter(|s| s.lost_reason == reason).collect();
            json!({
                "type": "bar",
                "name": reason,
                "x": rows.iter().map(|s| s.owner.as_str()).collect::<Vec<_>>(),
                "y": rows.iter().map(|s| s.share_owner_lost * 100.0).collect::<Vec<_>>(),
            })
        })
        .collect();
    let mut layout = layout("Lost reasons per owner, % of the owner's lost deals");
    layout["barmode"] = json!("stack");
    layout["hovermode"] = json!("closest");
    figure(traces, layout)
}

pub fn payment_segments(segments: &[PaymentSegment]) -> Value {
    let labels: Vec<String> = segments
        .iter()
        .map(|s| format!("{} / {} / {}", s.payment_type, s.product, s.education_type))
        .collect();
    let deals: Vec<u64> = segments.iter().map(|s| s.n_deals).collect();
    let paid: Vec<u64> = segments.iter().map(|s| s.n_paid).collect();
    let mut layout = layout("Deals and payments per segment");
    layout["barmode"] = json!("group");
    figure(
        vec![
            json!({ "type": "bar", "name": "Deals", "x": labels, "y": deals }),
            json!({ "type": "bar", "name": "Paid", "x": labels, "y": paid }),
        ],
        layout,
    )
}

/// Bubble map: size by deals, colour by win rate.
pub fn city_map(cities: &[CityStats]) -> Value {
    let max_deals = cities.iter().map(|c| c.deals).max().unwrap_or(1).max(1) as f64;
    let sizes: Vec<f64> = cities
        .iter()
        .map(|c| 6.0 + 34.0 * (c.deals as f64 / max_deals).sqrt())
        .collect();
    let text: Vec<String> = cities
        .iter()
        .map(|c| format!("{}: {} deals, {} paid, win rate {:.1} %", c.city, c.deals, c.paid, c.win_rate * 100.0))
        .collect();
    figure(
        vec![json!({
            "type": "scattergeo",
            "lat": cities.iter().map(|c| c.lat).collect::<Vec<_>>(),
            "lon": cities.iter().map(|c| c.lon).collect::<Vec<_>>(),
            "text": text,
            "hoverinfo": "text",
            "marker": {
                "size": sizes,
                "color": cities.iter().map(|c| c.win_rate).collect::<Vec<_>>(),
                "colorscale": "Viridis",
                "colorbar": { "title": "win rate" },
                "line": { "width": 0.5, "color": "#333" },
            },
        })],
        json!({
            "title": { "text": "Deals by city" },
            "margin": { "t": 48, "r": 0, "b": 0, "l": 0 },
            "geo": {
                "scope": "europe",
                "resolution": 50,
                "showcountries": true,
                "lataxis": { "range": [47.0, 55.5] },
                "lonaxis": { "range": [5.5, 15.5] },
            },
        }),
    )
}

pub fn top_categories(summary: &CategoricalSummary) -> Value {
    let values: Vec<&str> = summary.top.iter().map(|c| c.value.as_str()).collect();
    let counts: Vec<usize> = summary.top.iter().map(|c| c.count).collect();
    let mut layout = layout(&summary.column);
    layout["hovermode"] = json!("closest");
    figure(vec![json!({ "type": "bar", "x": values, "y": counts, "name": "Rows" })], layout)
}

pub fn growth_points(growth: &[GrowthScenario], segment: &str) -> Value {
    let rows: Vec<&GrowthScenario> = growth.iter().filter(|g| g.segment == segment).collect();
    let levers: Vec<&str> = rows.iter().map(|g| g.lever.as_str()).collect();
    let deltas: Vec<Option<f64>> = rows.iter().map(|g| g.cm_delta).collect();
    let mut layout = layout(&format!("CM change after a 10 % lever move, {segment}"));
    layout["hovermode"] = json!("closest");
    figure(vec![json!({ "type": "bar", "x": levers, "y": deltas, "name": "CM delta" })], layout)
}

/// Layered drawing of the metric tree: layers top to bottom, edges as line
/// segments.
pub fn metric_tree(tree: &MetricTree) -> Value {
    let mut positions = std::collections::HashMap::new();
    for (depth, layer) in tree.layers().iter().enumerate() {
        let width = layer.len().max(1) as f64;
        for (idx, node) in layer.iter().enumerate() {
            positions.insert(node.id, ((idx as f64 + 0.5) / width, -(depth as f64)));
        }
    }

    let mut edge_x: Vec<Option<f64>> = Vec::new();
    let mut edge_y: Vec<Option<f64>> = Vec::new();
    for (from, to) in &tree.edges {
        if let (Some(a), Some(b)) = (positions.get(from), positions.get(to)) {
            edge_x.extend([Some(a.0), Some(b.0), None]);
            edge_y.extend([Some(a.1), Some(b.1), None]);
        }
    }

    let colour = |kind: NodeKind| match kind {
        NodeKind::Target => "#d62728",
        NodeKind::Financial => "#2ca02c",
        NodeKind::Decision => "#1f77b4",
        NodeKind::Product => "#ff7f0e",
        NodeKind::Atomic => "#7f7f7f",
    };
    let nodes: Vec<_> = tree
        .nodes
        .iter()
        .filter_map(|n| positions.get(n.id).map(|p| (n, *p)))
        .collect();

    figure(
        vec![
            json!({
                "type": "scatter", "mode": "lines", "x": edge_x, "y": edge_y,
                "hoverinfo": "skip", "line": { "width": 1, "color": "#bbb" }, "showlegend": false,
            }),
            json!({
                "type": "scatter", "mode": "markers+text",
                "x": nodes.iter().map(|(_, p)| p.0).collect::<Vec<_>>(),
                "y": nodes.iter().map(|(_, p)| p.1).collect::<Vec<_>>(),
                "text": nodes.iter().map(|(n, _)| n.label).collect::<Vec<_>>(),
                "hovertext": nodes.iter().map(|(n, _)| format!("{}<br>{}", n.title, n.formula)).collect::<Vec<_>>(),
                "hoverinfo": "text",
                "textposition": "top center",
                "marker": { "size": 16, "color": nodes.iter().map(|(n, _)| colour(n.kind)).collect::<Vec<_>>() },
                "showlegend": false,
            }),
        ],
        json!({
            "title": { "text": "Metric tree" },
            "height": 720,
            "margin": { "t": 48, "r": 24, "b": 24, "l": 24 },
            "xaxis": { "visible": false },
            "yaxis": { "visible": false },
            "hovermode": "closest",
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::metric_tree::metric_tree as build_tree;

    #[test]
    fn test_metric_tree_figure_has_every_node() {
        let tree = build_tree();
        let fig = metric_tree(&tree);
        let labels = fig["data"][1]["text"].as_array().unwrap();
        assert_eq!(labels.len(), tree.nodes.len());
        // three entries per edge: start, end, gap
        assert_eq!(fig["data"][0]["x"].as_array().unwrap().len(), tree.edges.len() * 3);
    }

    #[test]
    fn test_empty_city_map_is_still_a_figure() {
        let fig = city_map(&[]);
        assert_eq!(fig["data"][0]["type"], "scattergeo");
        assert!(fig["data"][0]["lat"].as_array().unwrap().is_empty());
    }
}
