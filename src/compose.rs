// Page composition: normalised aggregate + selection -> render instructions

use crate::aggregate::{ColumnSummary, GroupId, NormalizedAggregate, NormalizedGroup};
use crate::config::ChartGeometry;
use crate::ir::{
    slot_id, ChartJob, ChartLayout, ColumnSlot, LayoutMode, NavEntry, Page, SelectOption, TabPane,
};
use crate::selection::SelectionState;
use crate::title::make_title;
use indexmap::IndexSet;
use tracing::debug;

/// Turns a normalised aggregate and the current selection into a [`Page`].
///
/// Holds only configuration; composing the same inputs twice yields equal
/// pages.
#[derive(Debug, Clone)]
pub struct Composer {
    geometry: ChartGeometry,
    side_by_side_limit: usize,
}

impl Composer {
    pub fn new(geometry: ChartGeometry, side_by_side_limit: usize) -> Self {
        Self {
            geometry,
            side_by_side_limit,
        }
    }

    pub fn geometry(&self) -> &ChartGeometry {
        &self.geometry
    }

    pub fn compose(
        &self,
        aggregate: &NormalizedAggregate,
        selection: &SelectionState,
        layout: LayoutMode,
    ) -> Page {
        // 1. Selectors are seeded from the ALL group only
        let universe = aggregate.column_universe();
        let grouping_options = grouping_options(&universe, selection.active_grouping());
        let column_options = universe
            .iter()
            .map(|name| SelectOption {
                value: name.clone(),
                label: make_title(name),
                selected: selection.is_visible(name),
            })
            .collect();

        // 2. Navigation and panes, one per group
        let limit = match layout {
            LayoutMode::Tabs => usize::MAX,
            LayoutMode::SideBySide => self.side_by_side_limit,
        };

        // Group ids and slot ids share the page's id space
        let mut taken: IndexSet<String> = aggregate
            .groups()
            .iter()
            .map(|g| g.id.to_string())
            .collect();
        let mut nav = Vec::new();
        let mut panes = Vec::new();
        for group in aggregate.groups().iter().take(limit) {
            nav.push(NavEntry {
                label: group.id.to_string(),
                target: group.id.clone(),
            });
            panes.push(self.compose_pane(group, selection, &mut taken));
        }

        // 3. Tabbed pages land on the last tab
        let active_tab = match layout {
            LayoutMode::Tabs => nav.last().map(|entry| entry.target.clone()),
            LayoutMode::SideBySide => None,
        };

        Page {
            layout,
            nav,
            panes,
            grouping_options,
            column_options,
            active_tab,
        }
    }

    fn compose_pane(
        &self,
        group: &NormalizedGroup,
        selection: &SelectionState,
        taken: &mut IndexSet<String>,
    ) -> TabPane {
        let slots: Vec<ColumnSlot> = group
            .columns
            .iter()
            .map(|column| ColumnSlot {
                column: column.name.clone(),
                element_id: slot_id(&group.id, &column.name, taken),
            })
            .collect();

        let charts = group
            .columns
            .iter()
            .zip(&slots)
            .filter_map(|(column, slot)| self.compose_chart(&group.id, column, slot, selection))
            .collect();

        TabPane {
            group: group.id.clone(),
            slots,
            charts,
        }
    }

    /// Build the chart job for one column, or `None` if the column is hidden,
    /// private, empty or not made of counts.
    fn compose_chart(
        &self,
        group_id: &GroupId,
        column: &ColumnSummary,
        slot: &ColumnSlot,
        selection: &SelectionState,
    ) -> Option<ChartJob> {
        if !selection.is_visible(&column.name) || column.is_private() || column.data.is_empty() {
            return None;
        }

        let Some(y_values) = column.numeric_values() else {
            debug!(group = %group_id, column = %column.name, "skipping non-numeric column");
            return None;
        };

        let x_categories: Vec<String> = column.data.keys().cloned().collect();

        Some(ChartJob {
            group_id: group_id.clone(),
            column_name: column.name.clone(),
            element_id: slot.element_id.clone(),
            title: make_title(&column.name),
            width: self.geometry.width_for(x_categories.len()),
            height: self.geometry.height,
            layout: ChartLayout {
                padding_right: self.geometry.padding_right,
                title_size: self.geometry.title_size,
                legend_position: self.geometry.legend_position.clone(),
            },
            x_categories,
            y_values,
        })
    }
}

impl Default for Composer {
    fn default() -> Self {
        Self::new(ChartGeometry::default(), 3)
    }
}

fn grouping_options(universe: &[String], active: Option<&str>) -> Vec<SelectOption> {
    let blank = SelectOption {
        value: String::new(),
        label: String::new(),
        selected: active.is_none(),
    };

    std::iter::once(blank)
        .chain(universe.iter().map(|name| SelectOption {
            value: name.clone(),
            label: make_title(name),
            selected: active == Some(name.as_str()),
        }))
        .collect()
}
