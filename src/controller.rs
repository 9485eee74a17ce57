// Reload controller: fetch -> normalise -> compose -> present

use crate::aggregate::{normalize, NormalizedAggregate, RawAggregateResult};
use crate::compose::Composer;
use crate::error::{DashResult, DashboardError};
use crate::ir::{LayoutMode, Page};
use crate::selection::SelectionState;
use crate::source::{AggregateSource, DatasetId};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadState {
    Idle,
    Fetching,
    Composing,
    Rendered,
    Error,
}

/// Receives finished pages. Implementations must leave the previous output
/// untouched when `present` fails.
pub trait PageSink {
    fn present(&mut self, page: &Page) -> DashResult<()>;
}

/// User interactions with the dashboard controls.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    SubmitUrl(String),
    SelectGrouping(Option<String>),
    SelectColumns(Vec<String>),
    SetLayout(LayoutMode),
}

/// Option values the currently drawn selectors accept.
///
/// Replaced wholesale after every successful composition, so events aimed
/// at options of an earlier page are never honoured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlBindings {
    generation: u64,
    grouping: Vec<String>,
    columns: Vec<String>,
}

impl ControlBindings {
    fn attach(page: &Page, generation: u64) -> Self {
        Self {
            generation,
            grouping: page
                .grouping_options
                .iter()
                .map(|o| o.value.clone())
                .collect(),
            columns: page.column_options.iter().map(|o| o.value.clone()).collect(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn accepts_grouping(&self, value: &str) -> bool {
        self.grouping.iter().any(|g| g == value)
    }

    pub fn accepts_column(&self, value: &str) -> bool {
        self.columns.iter().any(|c| c == value)
    }
}

/// A fetch that has been issued but not yet applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReload {
    ticket: u64,
    dataset: DatasetId,
    grouping: Option<String>,
    fresh: bool,
}

impl PendingReload {
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    pub fn dataset(&self) -> &DatasetId {
        &self.dataset
    }

    pub fn grouping(&self) -> Option<&str> {
        self.grouping.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    Rendered,
    /// A newer reload was issued after this one; its result was dropped
    Superseded,
}

/// Owns the selection state and the last composed page, and drives every
/// reload of the dashboard.
pub struct ReloadController<S, K> {
    source: S,
    sink: K,
    composer: Composer,
    state: ReloadState,
    layout: LayoutMode,
    dataset: Option<DatasetId>,
    selection: SelectionState,
    aggregate: Option<NormalizedAggregate>,
    page: Option<Page>,
    bindings: Option<ControlBindings>,
    binding_generation: u64,
    latest_ticket: u64,
    last_error: Option<String>,
}

impl<S: AggregateSource, K: PageSink> ReloadController<S, K> {
    pub fn new(source: S, sink: K, composer: Composer) -> Self {
        Self {
            source,
            sink,
            composer,
            state: ReloadState::Idle,
            layout: LayoutMode::default(),
            dataset: None,
            selection: SelectionState::default(),
            aggregate: None,
            page: None,
            bindings: None,
            binding_generation: 0,
            latest_ticket: 0,
            last_error: None,
        }
    }

    pub fn with_layout(mut self, layout: LayoutMode) -> Self {
        self.layout = layout;
        self
    }

    // =========================================================================
    // Full reloads
    // =========================================================================

    /// Register a dataset URL and render it ungrouped with every column
    /// visible.
    pub fn load_dataset(&mut self, url: &str) -> DashResult<ReloadOutcome> {
        self.state = ReloadState::Fetching;
        let dataset = match self.source.register_dataset(url) {
            Ok(id) => id,
            Err(e) => return Err(self.fail(e)),
        };
        info!(dataset = %dataset, "dataset loaded");

        let pending = self.issue(dataset, None, true);
        let result = self.fetch(&pending);
        self.complete_refresh(pending, result)
    }

    /// Re-fetch the current dataset with a new grouping column.
    pub fn set_grouping(&mut self, column: Option<&str>) -> DashResult<ReloadOutcome> {
        let pending = self.begin_refresh(column)?;
        let result = self.fetch(&pending);
        self.complete_refresh(pending, result)
    }

    /// Validate the grouping and issue a fetch ticket for it.
    ///
    /// Invalid groupings are rejected here, before anything goes over the
    /// network. Each call supersedes all earlier tickets.
    pub fn begin_refresh(&mut self, column: Option<&str>) -> DashResult<PendingReload> {
        let dataset = self
            .dataset
            .clone()
            .ok_or_else(|| DashboardError::InvalidGrouping {
                column: column.unwrap_or_default().to_string(),
            })?;
        let grouping = self.selection.check_grouping(column)?;
        Ok(self.issue(dataset, grouping, false))
    }

    /// Run the fetch for a pending reload against the source.
    pub fn fetch(&self, pending: &PendingReload) -> DashResult<RawAggregateResult> {
        self.source
            .fetch_aggregate(&pending.dataset, pending.grouping.as_deref())
    }

    /// Apply the result of a fetch.
    ///
    /// Results of superseded tickets are discarded without touching any
    /// state. Otherwise the result is normalised and composed; only when
    /// both succeed is the page presented and the controls rebound.
    pub fn complete_refresh(
        &mut self,
        pending: PendingReload,
        result: DashResult<RawAggregateResult>,
    ) -> DashResult<ReloadOutcome> {
        if pending.ticket != self.latest_ticket {
            debug!(
                ticket = pending.ticket,
                latest = self.latest_ticket,
                "dropping superseded reload"
            );
            return Ok(ReloadOutcome::Superseded);
        }

        let raw = match result {
            Ok(raw) => raw,
            Err(e) => return Err(self.fail(e)),
        };

        self.state = ReloadState::Composing;
        let aggregate = match normalize(&raw) {
            Ok(aggregate) => aggregate,
            Err(e) => return Err(self.fail(e)),
        };

        let universe = aggregate.column_universe();
        let selection = if pending.fresh || self.dataset.as_ref() != Some(&pending.dataset) {
            SelectionState::initialize(universe, pending.grouping.as_deref())
        } else {
            let mut next = self.selection.clone();
            next.update_universe(universe);
            if let Err(e) = next.set_grouping(pending.grouping.as_deref()) {
                return Err(self.fail(e));
            }
            next
        };

        let page = self.composer.compose(&aggregate, &selection, self.layout);
        if let Err(e) = self.sink.present(&page) {
            return Err(self.fail(e));
        }

        info!(
            groups = page.nav.len(),
            charts = page.charts().count(),
            grouping = ?selection.active_grouping(),
            "dashboard rendered"
        );
        self.dataset = Some(pending.dataset);
        self.selection = selection;
        self.aggregate = Some(aggregate);
        self.commit_page(page);
        Ok(ReloadOutcome::Rendered)
    }

    // =========================================================================
    // Local recomposition
    // =========================================================================

    /// Change which columns get charts. Never re-fetches.
    pub fn set_visible_columns<I, T>(&mut self, columns: I) -> DashResult<()>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut selection = self.selection.clone();
        selection.set_visible_columns(columns);
        self.recompose(selection, self.layout)
    }

    /// Switch between tabbed and side-by-side layout. Never re-fetches.
    pub fn set_layout(&mut self, layout: LayoutMode) -> DashResult<()> {
        self.recompose(self.selection.clone(), layout)
    }

    fn recompose(&mut self, selection: SelectionState, layout: LayoutMode) -> DashResult<()> {
        let Some(aggregate) = &self.aggregate else {
            // Nothing drawn yet; the choice applies to the next load
            self.selection = selection;
            self.layout = layout;
            return Ok(());
        };

        let page = self.composer.compose(aggregate, &selection, layout);
        if let Err(e) = self.sink.present(&page) {
            return Err(self.fail(e));
        }

        self.selection = selection;
        self.layout = layout;
        self.commit_page(page);
        Ok(())
    }

    // =========================================================================
    // Control events
    // =========================================================================

    /// Route a control event. Selector events must name an option of the
    /// currently drawn page.
    pub fn dispatch(&mut self, event: ControlEvent) -> DashResult<()> {
        match event {
            ControlEvent::SubmitUrl(url) => self.load_dataset(&url).map(|_| ()),
            ControlEvent::SelectGrouping(column) => {
                let value = column.as_deref().unwrap_or_default();
                let bound = self
                    .bindings
                    .as_ref()
                    .is_some_and(|b| b.accepts_grouping(value));
                if !bound {
                    return Err(DashboardError::InvalidGrouping {
                        column: value.to_string(),
                    });
                }
                self.set_grouping(column.as_deref()).map(|_| ())
            }
            ControlEvent::SelectColumns(columns) => {
                let accepted: Vec<String> = match &self.bindings {
                    Some(bindings) => columns
                        .into_iter()
                        .filter(|c| bindings.accepts_column(c))
                        .collect(),
                    None => Vec::new(),
                };
                self.set_visible_columns(accepted)
            }
            ControlEvent::SetLayout(layout) => self.set_layout(layout),
        }
    }

    /// Leave the error state once the error has been shown to the user.
    pub fn acknowledge_error(&mut self) {
        if self.state == ReloadState::Error {
            self.state = ReloadState::Idle;
            self.last_error = None;
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn state(&self) -> ReloadState {
        self.state
    }

    pub fn layout(&self) -> LayoutMode {
        self.layout
    }

    pub fn dataset(&self) -> Option<&DatasetId> {
        self.dataset.as_ref()
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn page(&self) -> Option<&Page> {
        self.page.as_ref()
    }

    pub fn bindings(&self) -> Option<&ControlBindings> {
        self.bindings.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    fn issue(&mut self, dataset: DatasetId, grouping: Option<String>, fresh: bool) -> PendingReload {
        self.latest_ticket += 1;
        self.state = ReloadState::Fetching;
        PendingReload {
            ticket: self.latest_ticket,
            dataset,
            grouping,
            fresh,
        }
    }

    fn commit_page(&mut self, page: Page) {
        // Detach the old bindings before attaching the ones for this page
        self.bindings = None;
        self.binding_generation += 1;
        self.bindings = Some(ControlBindings::attach(&page, self.binding_generation));
        self.page = Some(page);
        self.state = ReloadState::Rendered;
        self.last_error = None;
    }

    fn fail(&mut self, error: DashboardError) -> DashboardError {
        warn!(error = %error, "reload aborted");
        self.state = ReloadState::Error;
        self.last_error = Some(error.to_string());
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;

    /// Serves canned aggregates keyed by grouping column.
    #[derive(Default)]
    struct FakeSource {
        responses: HashMap<Option<String>, Value>,
        fetches: Cell<usize>,
        fail_registration: bool,
    }

    impl FakeSource {
        fn with(mut self, grouping: Option<&str>, body: Value) -> Self {
            self.responses.insert(grouping.map(str::to_string), body);
            self
        }
    }

    impl AggregateSource for FakeSource {
        fn register_dataset(&self, url: &str) -> DashResult<DatasetId> {
            if self.fail_registration {
                return Err(DashboardError::Config(format!("cannot register {}", url)));
            }
            Ok(DatasetId::new(format!("id-{}", url.len())))
        }

        fn fetch_aggregate(
            &self,
            _id: &DatasetId,
            grouping: Option<&str>,
        ) -> DashResult<RawAggregateResult> {
            self.fetches.set(self.fetches.get() + 1);
            let body = self
                .responses
                .get(&grouping.map(str::to_string))
                .cloned()
                .ok_or_else(|| DashboardError::Config("no canned response".to_string()))?;
            Ok(serde_json::from_value(body).unwrap())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        pages: RefCell<Vec<Page>>,
        broken: Cell<bool>,
    }

    impl PageSink for &RecordingSink {
        fn present(&mut self, page: &Page) -> DashResult<()> {
            if self.broken.get() {
                return Err(DashboardError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk full",
                )));
            }
            self.pages.borrow_mut().push(page.clone());
            Ok(())
        }
    }

    fn ungrouped() -> Value {
        json!({
            "(ALL)": [
                {"name": "age", "data": {"10": 5, "20": 3}},
                {"name": "sex", "data": {"male": 3, "female": 5}}
            ]
        })
    }

    fn by_sex() -> Value {
        json!({
            "(ALL)": [
                {"name": "age", "data": {"10": 5, "20": 3}},
                {"name": "sex", "data": {"male": 3, "female": 5}}
            ],
            "male": [{"name": "age", "data": {"10": 2, "20": 1}}],
            "female": [{"name": "age", "data": {"10": 3, "20": 2}}]
        })
    }

    fn source() -> FakeSource {
        FakeSource::default()
            .with(None, ungrouped())
            .with(Some("sex"), by_sex())
    }

    #[test]
    fn test_load_dataset_renders() {
        let source = source();
        let sink = RecordingSink::default();
        let mut controller = ReloadController::new(&source, &sink, Composer::default());

        let outcome = controller.load_dataset("http://example.com/a.csv").unwrap();
        assert_eq!(outcome, ReloadOutcome::Rendered);
        assert_eq!(controller.state(), ReloadState::Rendered);
        assert_eq!(sink.pages.borrow().len(), 1);
        assert_eq!(controller.page().unwrap().charts().count(), 2);
        assert_eq!(controller.bindings().unwrap().generation(), 1);
    }

    #[test]
    fn test_grouping_refetches_and_keeps_filter() {
        let source = source();
        let sink = RecordingSink::default();
        let mut controller = ReloadController::new(&source, &sink, Composer::default());
        controller.load_dataset("http://example.com/a.csv").unwrap();

        controller.set_visible_columns(["age"]).unwrap();
        assert_eq!(source.fetches.get(), 1);

        controller.set_grouping(Some("sex")).unwrap();
        assert_eq!(source.fetches.get(), 2);
        assert_eq!(controller.selection().active_grouping(), Some("sex"));

        let page = controller.page().unwrap();
        let labels: Vec<&str> = page.nav.iter().map(|n| n.label.as_str()).collect();
        assert_eq!(labels, vec!["ALL", "male", "female"]);
        // Filter survived the grouping change: only age charts
        assert!(page.charts().all(|c| c.column_name == "age"));
        assert_eq!(page.charts().count(), 3);
        assert_eq!(controller.bindings().unwrap().generation(), 3);
    }

    #[test]
    fn test_invalid_grouping_rejected_before_fetch() {
        let source = source();
        let sink = RecordingSink::default();
        let mut controller = ReloadController::new(&source, &sink, Composer::default());
        controller.load_dataset("http://example.com/a.csv").unwrap();

        let err = controller.set_grouping(Some("height")).unwrap_err();
        assert!(matches!(err, DashboardError::InvalidGrouping { .. }));
        assert_eq!(source.fetches.get(), 1);
        assert_eq!(controller.state(), ReloadState::Rendered);
    }

    #[test]
    fn test_failed_fetch_keeps_last_page() {
        let source = FakeSource::default().with(None, ungrouped());
        let sink = RecordingSink::default();
        let mut controller = ReloadController::new(&source, &sink, Composer::default());
        controller.load_dataset("http://example.com/a.csv").unwrap();
        let before = controller.page().cloned();

        // No canned response for this grouping
        assert!(controller.set_grouping(Some("sex")).is_err());
        assert_eq!(controller.state(), ReloadState::Error);
        assert!(controller.last_error().is_some());
        assert_eq!(controller.page().cloned(), before);
        assert_eq!(sink.pages.borrow().len(), 1);
        assert_eq!(controller.selection().active_grouping(), None);

        controller.acknowledge_error();
        assert_eq!(controller.state(), ReloadState::Idle);
    }

    #[test]
    fn test_malformed_aggregate_aborts_before_present() {
        let source = FakeSource::default()
            .with(None, ungrouped())
            .with(Some("sex"), json!({"male": []}));
        let sink = RecordingSink::default();
        let mut controller = ReloadController::new(&source, &sink, Composer::default());
        controller.load_dataset("http://example.com/a.csv").unwrap();

        let err = controller.set_grouping(Some("sex")).unwrap_err();
        assert!(matches!(err, DashboardError::MalformedAggregate { .. }));
        assert_eq!(sink.pages.borrow().len(), 1);
        assert_eq!(controller.bindings().unwrap().generation(), 1);
    }

    #[test]
    fn test_registration_failure() {
        let source = FakeSource {
            fail_registration: true,
            ..FakeSource::default()
        };
        let sink = RecordingSink::default();
        let mut controller = ReloadController::new(&source, &sink, Composer::default());

        assert!(controller.load_dataset("http://example.com/a.csv").is_err());
        assert_eq!(controller.state(), ReloadState::Error);
        assert_eq!(source.fetches.get(), 0);
        assert!(controller.page().is_none());
    }

    #[test]
    fn test_superseded_reload_is_dropped() {
        let source = source();
        let sink = RecordingSink::default();
        let mut controller = ReloadController::new(&source, &sink, Composer::default());
        controller.load_dataset("http://example.com/a.csv").unwrap();

        let first = controller.begin_refresh(Some("sex")).unwrap();
        let second = controller.begin_refresh(None).unwrap();
        assert!(second.ticket() > first.ticket());

        let second_result = controller.fetch(&second);
        let first_result = controller.fetch(&first);

        assert_eq!(
            controller.complete_refresh(second, second_result).unwrap(),
            ReloadOutcome::Rendered
        );
        // The older response arrives late and must not overwrite the view
        assert_eq!(
            controller.complete_refresh(first, first_result).unwrap(),
            ReloadOutcome::Superseded
        );
        assert_eq!(controller.selection().active_grouping(), None);
        assert_eq!(controller.page().unwrap().nav.len(), 1);
        assert_eq!(sink.pages.borrow().len(), 2);
    }

    #[test]
    fn test_dispatch_uses_current_bindings() {
        let source = source();
        let sink = RecordingSink::default();
        let mut controller = ReloadController::new(&source, &sink, Composer::default());

        // No page drawn yet, so no selector to act on
        assert!(controller
            .dispatch(ControlEvent::SelectGrouping(Some("sex".to_string())))
            .is_err());

        controller
            .dispatch(ControlEvent::SubmitUrl("http://example.com/a.csv".to_string()))
            .unwrap();
        controller
            .dispatch(ControlEvent::SelectGrouping(Some("sex".to_string())))
            .unwrap();
        assert_eq!(controller.page().unwrap().nav.len(), 3);

        controller
            .dispatch(ControlEvent::SelectColumns(vec![]))
            .unwrap();
        assert_eq!(controller.page().unwrap().charts().count(), 0);
        assert_eq!(source.fetches.get(), 2);

        controller
            .dispatch(ControlEvent::SetLayout(LayoutMode::SideBySide))
            .unwrap();
        assert_eq!(controller.page().unwrap().layout, LayoutMode::SideBySide);
        assert_eq!(source.fetches.get(), 2);
    }

    #[test]
    fn test_new_dataset_resets_filter() {
        let source = source();
        let sink = RecordingSink::default();
        let mut controller = ReloadController::new(&source, &sink, Composer::default());
        controller.load_dataset("http://example.com/a.csv").unwrap();
        controller.set_visible_columns(["age"]).unwrap();

        controller.load_dataset("http://example.com/a.csv").unwrap();
        assert!(controller.selection().is_visible("sex"));
        assert!(controller.selection().is_visible("age"));
    }

    #[test]
    fn test_sink_failure_on_recompose_enters_error() {
        let source = source();
        let sink = RecordingSink::default();
        let mut controller = ReloadController::new(&source, &sink, Composer::default());
        controller.load_dataset("http://example.com/a.csv").unwrap();
        let before = controller.page().cloned();

        sink.broken.set(true);
        let err = controller.set_visible_columns(["age"]).unwrap_err();
        assert!(matches!(err, DashboardError::Io(_)));
        assert_eq!(controller.state(), ReloadState::Error);
        assert!(controller.last_error().unwrap().contains("disk full"));
        assert_eq!(controller.page().cloned(), before);
        // The rejected filter was not committed
        assert!(controller.selection().is_visible("sex"));

        controller.acknowledge_error();
        assert_eq!(controller.state(), ReloadState::Idle);
    }
}
