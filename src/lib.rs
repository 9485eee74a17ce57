// Library exports for histoboard

pub mod aggregate;
pub mod chart;
pub mod compose;
pub mod config;
pub mod controller;
pub mod error;
pub mod html;
pub mod ir;
pub mod selection;
pub mod session;
pub mod source;
pub mod telemetry;
pub mod title;

pub use aggregate::{normalize, ColumnSummary, GroupId, NormalizedAggregate, RawAggregateResult};
pub use compose::Composer;
pub use config::{ChartGeometry, DashboardConfig, OutputFormat};
pub use controller::{ControlEvent, PageSink, ReloadController, ReloadOutcome, ReloadState};
pub use error::{DashResult, DashboardError};
pub use ir::{ChartJob, LayoutMode, Page};
pub use selection::SelectionState;
pub use source::{AggregateSource, DatasetId, HttpSource};
pub use title::make_title;
