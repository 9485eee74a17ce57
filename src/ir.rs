use crate::aggregate::{dom_safe, unique_id, GroupId};
use indexmap::IndexSet;
use serde::Serialize;

// =============================================================================
// Render instructions
// =============================================================================

/// How groups are laid out on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum LayoutMode {
    /// One tab per group, the last tab shown
    #[default]
    Tabs,
    /// The first few groups next to each other, no tabs
    SideBySide,
}

/// Everything a renderer needs to draw the dashboard.
/// Produced by the composer; the renderer just walks it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub layout: LayoutMode,
    pub nav: Vec<NavEntry>,
    pub panes: Vec<TabPane>,
    /// Blank "no grouping" option first, then the column universe
    pub grouping_options: Vec<SelectOption>,
    pub column_options: Vec<SelectOption>,
    /// Tab to show after drawing (tabbed layout only)
    pub active_tab: Option<GroupId>,
}

impl Page {
    pub fn charts(&self) -> impl Iterator<Item = &ChartJob> {
        self.panes.iter().flat_map(|p| p.charts.iter())
    }

    pub fn pane(&self, id: &str) -> Option<&TabPane> {
        self.panes.iter().find(|p| p.group.as_str() == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavEntry {
    pub label: String,
    /// Fragment the entry links to (`#<target>`)
    pub target: GroupId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TabPane {
    pub group: GroupId,
    /// One addressable slot per column of the group, charted or not
    pub slots: Vec<ColumnSlot>,
    pub charts: Vec<ChartJob>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnSlot {
    pub column: String,
    pub element_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

/// Layout options handed to the chart primitive with each job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartLayout {
    pub padding_right: u32,
    pub title_size: u32,
    pub legend_position: String,
}

/// One fully resolved bar chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartJob {
    pub group_id: GroupId,
    pub column_name: String,
    /// Id of the slot this chart is drawn into, unique within the page
    pub element_id: String,
    pub title: String,
    pub x_categories: Vec<String>,
    pub y_values: Vec<f64>,
    pub width: u32,
    pub height: u32,
    pub layout: ChartLayout,
}

/// Page-unique element id for a column slot.
///
/// Columns that sanitise to the same text, or group/column pairs that join
/// to the same text, get `-2`, `-3`... suffixes in composition order.
pub fn slot_id(group: &GroupId, column: &str, taken: &mut IndexSet<String>) -> String {
    unique_id(&format!("{}-{}", group, dom_safe(column)), taken)
}
