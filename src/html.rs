//! Static HTML rendering of a composed [`Page`].
//!
//! Writes `index.html` plus one image per chart job under
//! `charts/<group>/`. Charts are rendered in memory and written to a staging
//! directory first; the previous dashboard is only replaced once every file
//! of the new one is on disk.

use crate::chart::render_chart;
use crate::config::OutputFormat;
use crate::controller::PageSink;
use crate::error::DashResult;
use crate::ir::{ChartJob, LayoutMode, Page, SelectOption, TabPane};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const CHART_DIR: &str = "charts";
const STAGING_DIR: &str = ".charts.staging";
const RETIRED_DIR: &str = ".charts.old";

/// Writes dashboards into a directory.
#[derive(Debug, Clone)]
pub struct HtmlSink {
    out_dir: PathBuf,
    format: OutputFormat,
    presented: usize,
}

impl HtmlSink {
    pub fn new(out_dir: impl Into<PathBuf>, format: OutputFormat) -> Self {
        Self {
            out_dir: out_dir.into(),
            format,
            presented: 0,
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn index_path(&self) -> PathBuf {
        self.out_dir.join("index.html")
    }

    /// Number of pages written so far.
    pub fn presented(&self) -> usize {
        self.presented
    }

    /// Chart path relative to the chart directory.
    fn chart_file(&self, job: &ChartJob) -> String {
        format!("{}/{}.{}", job.group_id, job.element_id, self.format.extension())
    }
}

impl PageSink for HtmlSink {
    fn present(&mut self, page: &Page) -> DashResult<()> {
        // Render everything before touching the directory
        let mut files = HashMap::new();
        for job in page.charts() {
            let bytes = render_chart(job, self.format)?;
            files.insert(job.element_id.clone(), (self.chart_file(job), bytes));
        }
        let sources: HashMap<String, String> = files
            .iter()
            .map(|(id, (file, _))| (id.clone(), format!("{}/{}", CHART_DIR, file)))
            .collect();
        let document = render_document(page, &sources);

        // Build the new chart tree next to the live one
        let staging = self.out_dir.join(STAGING_DIR);
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;
        for (file, bytes) in files.values() {
            let target = staging.join(file);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(target, bytes)?;
        }
        let index_tmp = self.out_dir.join(".index.html.tmp");
        fs::write(&index_tmp, document)?;

        // Nothing live has been touched up to here
        let chart_dir = self.out_dir.join(CHART_DIR);
        let retired = self.out_dir.join(RETIRED_DIR);
        if retired.exists() {
            fs::remove_dir_all(&retired)?;
        }
        if chart_dir.exists() {
            fs::rename(&chart_dir, &retired)?;
        }
        fs::rename(&staging, &chart_dir)?;
        fs::rename(&index_tmp, self.index_path())?;
        if retired.exists() {
            fs::remove_dir_all(&retired)?;
        }

        self.presented += 1;
        debug!(dir = %self.out_dir.display(), charts = files.len(), "dashboard written");
        Ok(())
    }
}

/// Render the page as a standalone HTML document. `sources` maps chart
/// element ids to image paths.
pub fn render_document(page: &Page, sources: &HashMap<String, String>) -> String {
    let nav = match page.layout {
        LayoutMode::Tabs => render_tabs(page),
        LayoutMode::SideBySide => render_alt_nav(page),
    };
    let panes: String = page
        .panes
        .iter()
        .map(|pane| render_pane(page, pane, sources))
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Dashboard</title>
    <style>{css}</style>
</head>
<body>
    <div class="controls">
        <label>Group by <select id="grouping-select">{grouping}</select></label>
        <label>Histograms <select id="histogram-select" multiple>{columns}</select></label>
    </div>
    {nav}
    <div id="content" class="{layout_class}">
{panes}    </div>
    <script>{js}</script>
</body>
</html>
"#,
        css = CSS,
        js = JS,
        grouping = render_options(&page.grouping_options),
        columns = render_options(&page.column_options),
        nav = nav,
        layout_class = match page.layout {
            LayoutMode::Tabs => "tab-content",
            LayoutMode::SideBySide => "side-by-side",
        },
        panes = panes,
    )
}

fn render_tabs(page: &Page) -> String {
    let items: String = page
        .nav
        .iter()
        .map(|entry| {
            let active = page.active_tab.as_ref() == Some(&entry.target);
            format!(
                r##"<li{class}><a href="#{target}" data-toggle="tab">{label}</a></li>"##,
                class = if active { r#" class="active""# } else { "" },
                target = html_escape(entry.target.as_str()),
                label = html_escape(&entry.label),
            )
        })
        .collect();
    format!(r#"<ul id="tabs" class="nav-tabs">{}</ul>"#, items)
}

fn render_alt_nav(page: &Page) -> String {
    let items: String = page
        .nav
        .iter()
        .map(|entry| {
            format!(
                r##"<div class="group-nav"><a href="#{target}">{label}</a></div>"##,
                target = html_escape(entry.target.as_str()),
                label = html_escape(&entry.label),
            )
        })
        .collect();
    format!(r#"<div id="alt-tabs">{}</div>"#, items)
}

fn render_pane(page: &Page, pane: &TabPane, sources: &HashMap<String, String>) -> String {
    let active = page.layout == LayoutMode::SideBySide || page.active_tab.as_ref() == Some(&pane.group);
    let mut html = format!(
        "        <div id=\"{id}\" class=\"tab-pane group-nav{active}\">\n",
        id = html_escape(pane.group.as_str()),
        active = if active { " active" } else { "" },
    );

    for slot in &pane.slots {
        let chart = pane.charts.iter().find(|c| c.element_id == slot.element_id);
        let body = match chart.and_then(|c| sources.get(&c.element_id).map(|src| (c, src))) {
            Some((chart, src)) => format!(
                r#"<img src="{src}" alt="{alt}" width="{w}" height="{h}">"#,
                src = html_escape(src),
                alt = html_escape(&chart.title),
                w = chart.width,
                h = chart.height,
            ),
            None => String::new(),
        };
        html.push_str(&format!(
            "            <div id=\"{id}\" class=\"gg\" data-column=\"{column}\">{body}</div>\n",
            id = html_escape(&slot.element_id),
            column = html_escape(&slot.column),
            body = body,
        ));
    }

    html.push_str("        </div>\n");
    html
}

fn render_options(options: &[SelectOption]) -> String {
    options
        .iter()
        .map(|o| {
            format!(
                r#"<option value="{value}"{selected}>{label}</option>"#,
                value = html_escape(&o.value),
                selected = if o.selected { " selected" } else { "" },
                label = html_escape(&o.label),
            )
        })
        .collect()
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

const CSS: &str = r#"
body { font-family: system-ui, sans-serif; margin: 16px; }
.controls label { margin-right: 16px; }
.nav-tabs { list-style: none; padding: 0; display: flex; gap: 4px; }
.nav-tabs li a { padding: 4px 10px; border: 1px solid #ccc; text-decoration: none; }
.nav-tabs li.active a { background: #eee; }
.tab-content .tab-pane { display: none; }
.tab-content .tab-pane.active { display: block; }
.side-by-side { display: flex; gap: 24px; }
.gg { float: left; }
"#;

const JS: &str = r#"
document.querySelectorAll('#tabs a').forEach(function (link) {
  link.addEventListener('click', function (ev) {
    ev.preventDefault();
    var target = link.getAttribute('href').slice(1);
    document.querySelectorAll('#tabs li').forEach(function (li) { li.classList.remove('active'); });
    link.parentElement.classList.add('active');
    document.querySelectorAll('.tab-pane').forEach(function (pane) {
      pane.classList.toggle('active', pane.id === target);
    });
  });
});
document.getElementById('histogram-select').addEventListener('change', function (ev) {
  var shown = Array.from(ev.target.selectedOptions).map(function (o) { return o.value; });
  document.querySelectorAll('.gg').forEach(function (slot) {
    slot.style.display = shown.indexOf(slot.dataset.column) >= 0 ? '' : 'none';
  });
});
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{normalize, RawAggregateResult};
    use crate::compose::Composer;
    use crate::selection::SelectionState;
    use serde_json::json;

    fn page(layout: LayoutMode) -> Page {
        let raw: RawAggregateResult = serde_json::from_value(json!({
            "(ALL)": [
                {"name": "age", "data": {"10": 5, "20": 3}},
                {"name": "note", "data": {"<b>": "x"}}
            ],
            "male": [{"name": "age", "data": {"10": 2, "20": 1}}]
        }))
        .unwrap();
        let aggregate = normalize(&raw).unwrap();
        let selection = SelectionState::initialize(aggregate.column_universe(), None);
        Composer::default().compose(&aggregate, &selection, layout)
    }

    #[test]
    fn test_document_has_tabs_and_slots() {
        let page = page(LayoutMode::Tabs);
        let mut sources = HashMap::new();
        sources.insert("ALL-age".to_string(), "charts/ALL/ALL-age.svg".to_string());

        let html = render_document(&page, &sources);
        assert!(html.contains(r##"<a href="#ALL" data-toggle="tab">ALL</a>"##));
        assert!(html.contains(r##"<li class="active"><a href="#male""##));
        assert!(html.contains(r#"<div id="male" class="tab-pane group-nav active">"#));
        assert!(html.contains(r#"<img src="charts/ALL/ALL-age.svg" alt="Age""#));
        // Non-numeric column gets an empty slot
        assert!(html.contains(r#"<div id="ALL-note" class="gg" data-column="note"></div>"#));
        assert!(html.contains(r#"<option value="" selected></option>"#));
    }

    #[test]
    fn test_document_side_by_side() {
        let html = render_document(&page(LayoutMode::SideBySide), &HashMap::new());
        assert!(html.contains(r#"<div id="alt-tabs">"#));
        assert!(!html.contains(r#"<ul id="tabs""#));
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape(r#"<a href="x">&'"#), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn test_sink_writes_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = HtmlSink::new(dir.path(), OutputFormat::Svg);

        sink.present(&page(LayoutMode::Tabs)).unwrap();
        assert!(sink.index_path().exists());
        assert!(dir.path().join("charts/ALL/ALL-age.svg").exists());
        assert!(dir.path().join("charts/male/male-age.svg").exists());
        assert!(!dir.path().join(STAGING_DIR).exists());
        assert!(!dir.path().join(RETIRED_DIR).exists());

        // Stale chart files from the previous page are cleared
        let mut narrowed = page(LayoutMode::Tabs);
        narrowed.panes.retain(|p| p.group.as_str() == "ALL");
        sink.present(&narrowed).unwrap();
        assert!(!dir.path().join("charts/male").exists());
        assert!(dir.path().join("charts/ALL/ALL-age.svg").exists());
        assert_eq!(sink.presented(), 2);
    }

    #[test]
    fn test_sink_keeps_colliding_columns_apart() {
        let raw: RawAggregateResult = serde_json::from_value(json!({
            "(ALL)": [
                {"name": "in school", "data": {"y": 1, "n": 2}},
                {"name": "in_school", "data": {"y": 3, "n": 4}}
            ]
        }))
        .unwrap();
        let aggregate = normalize(&raw).unwrap();
        let selection = SelectionState::initialize(aggregate.column_universe(), None);
        let page = Composer::default().compose(&aggregate, &selection, LayoutMode::Tabs);

        let dir = tempfile::tempdir().unwrap();
        let mut sink = HtmlSink::new(dir.path(), OutputFormat::Svg);
        sink.present(&page).unwrap();

        let written = fs::read_dir(dir.path().join("charts/ALL")).unwrap().count();
        assert_eq!(written, 2);

        let html = fs::read_to_string(sink.index_path()).unwrap();
        assert_eq!(html.matches(r#"id="ALL-in_school""#).count(), 1);
        assert_eq!(html.matches(r#"id="ALL-in_school-2""#).count(), 1);
        assert!(html.contains(r#"<img src="charts/ALL/ALL-in_school-2.svg" alt="In School""#));
    }

    #[test]
    fn test_sink_failure_leaves_previous_dashboard() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = HtmlSink::new(dir.path(), OutputFormat::Svg);
        sink.present(&page(LayoutMode::Tabs)).unwrap();
        let before = fs::read_to_string(sink.index_path()).unwrap();

        // A directory squatting on the index temp file makes the write fail
        fs::create_dir(dir.path().join(".index.html.tmp")).unwrap();
        let mut narrowed = page(LayoutMode::Tabs);
        narrowed.panes.retain(|p| p.group.as_str() == "ALL");
        assert!(sink.present(&narrowed).is_err());

        assert_eq!(fs::read_to_string(sink.index_path()).unwrap(), before);
        assert!(dir.path().join("charts/male/male-age.svg").exists());
        assert_eq!(sink.presented(), 1);
    }
}
