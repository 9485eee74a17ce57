use crate::error::{DashResult, DashboardError};
use indexmap::IndexSet;
use tracing::warn;

/// User-controlled view state: the active grouping column and the columns
/// selected for histogram display.
///
/// Both are always drawn from the column universe of the last loaded
/// dataset, i.e. the non-private column names of its `ALL` group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionState {
    universe: Vec<String>,
    active_grouping: Option<String>,
    visible_columns: IndexSet<String>,
}

impl SelectionState {
    /// Fresh dataset load: every column becomes visible, and the requested
    /// grouping is kept only if the dataset has such a column.
    pub fn initialize(universe: Vec<String>, requested_grouping: Option<&str>) -> Self {
        let active_grouping = requested_grouping
            .filter(|g| !g.is_empty())
            .filter(|g| universe.iter().any(|c| c == *g))
            .map(str::to_string);
        let visible_columns = universe.iter().cloned().collect();

        Self {
            universe,
            active_grouping,
            visible_columns,
        }
    }

    /// Same dataset, new column universe (after a grouping reload).
    ///
    /// The column filter is preserved, minus columns that no longer exist.
    pub fn update_universe(&mut self, universe: Vec<String>) {
        self.visible_columns.retain(|c| universe.contains(c));
        if let Some(active) = &self.active_grouping {
            if !universe.contains(active) {
                warn!(column = %active, "grouping column vanished from dataset");
                self.active_grouping = None;
            }
        }
        self.universe = universe;
    }

    /// Validate and apply a grouping choice. `None` or an empty string
    /// selects "no grouping".
    ///
    /// The caller is responsible for re-fetching with the new grouping.
    pub fn set_grouping(&mut self, column: Option<&str>) -> DashResult<()> {
        self.active_grouping = self.check_grouping(column)?;
        Ok(())
    }

    /// Membership check used before any fetch is issued.
    pub fn check_grouping(&self, column: Option<&str>) -> DashResult<Option<String>> {
        match column.filter(|c| !c.is_empty()) {
            None => Ok(None),
            Some(c) if self.universe.iter().any(|u| u == c) => Ok(Some(c.to_string())),
            Some(c) => Err(DashboardError::InvalidGrouping {
                column: c.to_string(),
            }),
        }
    }

    /// Replace the visible column set. Names outside the universe are dropped.
    pub fn set_visible_columns<I, S>(&mut self, columns: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut visible = IndexSet::new();
        for column in columns {
            let column = column.into();
            if self.universe.contains(&column) {
                visible.insert(column);
            } else {
                warn!(column = %column, "ignoring unknown column in visibility filter");
            }
        }
        self.visible_columns = visible;
    }

    pub fn show_all(&mut self) {
        self.visible_columns = self.universe.iter().cloned().collect();
    }

    pub fn universe(&self) -> &[String] {
        &self.universe
    }

    pub fn active_grouping(&self) -> Option<&str> {
        self.active_grouping.as_deref()
    }

    pub fn is_visible(&self, column: &str) -> bool {
        self.visible_columns.contains(column)
    }

    pub fn visible_columns(&self) -> impl Iterator<Item = &str> {
        self.visible_columns.iter().map(String::as_str)
    }
}
