//! Dashboard state machine.
//!
//! User input is applied as [`DashboardEvent`]s to a [`DashboardState`].
//! Rendering re-derives everything downstream of the state on each call
//! (partitions → series → columns → chart) and leans on the query layer's
//! memo cache so unchanged inputs never reach the engine twice.

use chrono::NaiveDate;
use polars::prelude::DataFrame;
use serde::Serialize;
use std::sync::Arc;

use super::{chart, export};
use crate::config::DashboardConfig;
use crate::data::numeric_columns;
use crate::error::QueryError;
use crate::query::{DateRange, QueryLayer, SeriesRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    AwaitingDateRange,
    AwaitingPartitionSelection,
    AwaitingColumnSelection,
    Rendering,
}

/// Limits of the date picker. The default range spans both limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateBounds {
    pub min: NaiveDate,
    pub max: NaiveDate,
}

impl DateBounds {
    pub fn new(min: NaiveDate, max: NaiveDate) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn from_config(config: &DashboardConfig) -> Self {
        Self::new(config.date_min, config.date_max())
    }

    pub fn default_range(&self) -> DateRange {
        DateRange::new(self.min, self.max)
    }

    fn clamp(&self, date: NaiveDate) -> NaiveDate {
        date.clamp(self.min, self.max)
    }

    /// Sort, duplicate a lone date into a one-day range and clamp.
    ///
    /// `None` when no date was picked.
    pub fn normalize(&self, dates: &[NaiveDate]) -> Option<DateRange> {
        let first = dates.iter().min()?;
        let last = dates.iter().max()?;
        Some(DateRange::new(self.clamp(*first), self.clamp(*last)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DashboardEvent {
    DateRangeChanged(Vec<NaiveDate>),
    Reset,
    PartitionSelected(String),
    ColumnsSelected(Vec<String>),
    ShowTable(bool),
}

/// What the user has chosen so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardState {
    pub date_range: Option<DateRange>,
    pub partition: Option<String>,
    /// `None` until the user touches the column picker.
    pub columns: Option<Vec<String>>,
    pub show_table: bool,
}

impl DashboardState {
    pub fn initial(bounds: &DateBounds) -> Self {
        Self {
            date_range: Some(bounds.default_range()),
            partition: None,
            columns: None,
            show_table: false,
        }
    }

    #[must_use]
    pub fn apply(mut self, event: DashboardEvent, bounds: &DateBounds) -> Self {
        match event {
            DashboardEvent::DateRangeChanged(dates) => {
                self.date_range = bounds.normalize(&dates);
            }
            DashboardEvent::Reset => self.date_range = Some(bounds.default_range()),
            DashboardEvent::PartitionSelected(p) => self.partition = Some(p),
            DashboardEvent::ColumnsSelected(c) => self.columns = Some(c),
            DashboardEvent::ShowTable(show) => self.show_table = show,
        }
        self
    }

    /// Apply `events` in order starting from the initial state.
    pub fn from_events(bounds: &DateBounds, events: impl IntoIterator<Item = DashboardEvent>) -> Self {
        events
            .into_iter()
            .fold(Self::initial(bounds), |state, event| state.apply(event, bounds))
    }
}

/// Everything the page needs to draw one frame.
#[derive(Debug, Clone)]
pub struct DashboardView {
    pub stage: Stage,
    pub bounds: DateBounds,
    pub date_range: Option<DateRange>,
    pub partitions: Vec<String>,
    pub partition: Option<String>,
    pub numeric_columns: Vec<String>,
    pub columns: Vec<String>,
    pub chart: Option<serde_json::Value>,
    pub show_table: bool,
    pub table: Option<Arc<DataFrame>>,
    pub export_link: Option<String>,
    /// Set when a query failed; the page shows it instead of the chart.
    pub error: Option<String>,
}

impl DashboardView {
    fn new(bounds: DateBounds, state: &DashboardState) -> Self {
        Self {
            stage: Stage::AwaitingDateRange,
            bounds,
            date_range: state.date_range,
            partitions: Vec::new(),
            partition: None,
            numeric_columns: Vec::new(),
            columns: Vec::new(),
            chart: None,
            show_table: state.show_table,
            table: None,
            export_link: None,
            error: None,
        }
    }
}

pub struct DashboardController {
    layer: Arc<QueryLayer>,
    config: Arc<DashboardConfig>,
}

impl DashboardController {
    pub fn new(layer: Arc<QueryLayer>, config: Arc<DashboardConfig>) -> Self {
        Self { layer, config }
    }

    pub fn bounds(&self) -> DateBounds {
        DateBounds::from_config(&self.config)
    }

    /// Run the whole chain for `state`. Query failures end up in
    /// [`DashboardView::error`], never as a panic or an `Err`.
    pub fn render(&self, state: &DashboardState) -> DashboardView {
        let mut view = DashboardView::new(self.bounds(), state);
        if let Err(e) = self.fill(state, &mut view) {
            tracing::error!("Dashboard query failed: {e}");
            view.chart = None;
            view.error = Some(e.to_string());
        }
        view
    }

    fn fill(&self, state: &DashboardState, view: &mut DashboardView) -> Result<(), QueryError> {
        let Some(range) = state.date_range else {
            return Ok(());
        };
        view.stage = Stage::AwaitingPartitionSelection;

        let config = &self.config;
        view.partitions = self.layer.partitions(&config.table, &config.partition_column)?;

        let requested = state
            .partition
            .as_ref()
            .filter(|p| view.partitions.contains(*p));
        let Some(partition) = requested.or(view.partitions.first()).cloned() else {
            return Ok(());
        };
        view.partition = Some(partition.clone());
        view.stage = Stage::AwaitingColumnSelection;

        let request = SeriesRequest {
            table: config.table.clone(),
            date_range: range,
            partition_column: config.partition_column.clone(),
            key_word: partition.clone(),
            index_column: config.index_column.clone(),
        };
        let df = self.layer.query_series(&request)?;

        view.numeric_columns = numeric_columns(&df, config.index_column.as_str());
        view.columns = match &state.columns {
            None => view.numeric_columns.iter().take(1).cloned().collect(),
            Some(chosen) => chosen
                .iter()
                .filter(|c| view.numeric_columns.contains(*c))
                .cloned()
                .collect(),
        };

        if state.show_table {
            view.export_link = match export::export_link(&df) {
                Ok(link) => Some(link),
                Err(e) => {
                    tracing::warn!("Export failed: {e:#}");
                    None
                }
            };
            view.table = Some(Arc::clone(&df));
        }

        if view.columns.is_empty() {
            return Ok(());
        }
        view.chart = Some(chart::build_chart(
            &df,
            config.index_column.as_str(),
            &view.columns,
            &partition,
        )?);
        view.stage = Stage::Rendering;
        Ok(())
    }
}
