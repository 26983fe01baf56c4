// Observability: metrics recorded by the pipeline stages and the dashboard

pub mod metrics;

pub use self::metrics::{init, render, MetricName};
