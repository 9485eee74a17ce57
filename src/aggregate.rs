// Aggregate results as fetched from the service, and their normalised form

use crate::error::{DashResult, DashboardError};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::debug;

/// Group label the service uses for the ungrouped summary.
pub const ALL_SENTINEL: &str = "(ALL)";

/// Identifier the ungrouped summary is published under after normalisation.
pub const ALL_GROUP_ID: &str = "ALL";

/// Columns whose name starts with this character are never charted.
pub const PRIVATE_PREFIX: char = '_';

// =============================================================================
// Raw (wire) model
// =============================================================================

/// `group label -> [ {name, data}, ... ]` exactly as the service returned it.
///
/// Entries are kept as raw JSON so that shape problems are reported by
/// [`normalize`] with a precise error instead of a generic decode failure.
/// Group and column order is the service's order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawAggregateResult {
    pub groups: IndexMap<String, Value>,
}

impl RawAggregateResult {
    pub fn from_json_str(body: &str) -> DashResult<Self> {
        serde_json::from_str(body)
            .map_err(|e| DashboardError::malformed(format!("not a JSON object of groups: {}", e)))
    }
}

/// Per-column `category -> count` summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub name: String,
    pub data: IndexMap<String, Value>,
}

impl ColumnSummary {
    pub fn new(name: impl Into<String>, data: IndexMap<String, Value>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn is_private(&self) -> bool {
        is_private_name(&self.name)
    }

    /// Values in category order, or `None` if any value is not a number.
    pub fn numeric_values(&self) -> Option<Vec<f64>> {
        self.data.values().map(Value::as_f64).collect()
    }
}

pub fn is_private_name(name: &str) -> bool {
    name.starts_with(PRIVATE_PREFIX)
}

// =============================================================================
// Normalised model
// =============================================================================

/// Group identifier that is safe to use as an element id or URL fragment.
///
/// Only [`normalize`] creates these, so downstream code never sees the raw
/// sentinel label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct GroupId(String);

impl GroupId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_all(&self) -> bool {
        self.0 == ALL_GROUP_ID
    }

    fn all() -> Self {
        GroupId(ALL_GROUP_ID.to_string())
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedGroup {
    pub id: GroupId,
    /// Label as sent by the service
    pub label: String,
    pub columns: Vec<ColumnSummary>,
}

/// Ordered groups of one aggregate result. Always contains the `ALL` group.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedAggregate {
    groups: Vec<NormalizedGroup>,
    all_index: usize,
}

impl NormalizedAggregate {
    pub fn groups(&self) -> &[NormalizedGroup] {
        &self.groups
    }

    /// The ungrouped summary, wherever it appeared in the input.
    pub fn all(&self) -> &NormalizedGroup {
        &self.groups[self.all_index]
    }

    pub fn get(&self, id: &str) -> Option<&NormalizedGroup> {
        self.groups.iter().find(|g| g.id.as_str() == id)
    }

    /// Non-private column names of the `ALL` group, in service order.
    pub fn column_universe(&self) -> Vec<String> {
        self.all()
            .columns
            .iter()
            .filter(|c| !c.is_private())
            .map(|c| c.name.clone())
            .collect()
    }
}

// =============================================================================
// Normalisation
// =============================================================================

/// Convert a raw result into ordered groups with DOM-safe identifiers.
///
/// The sentinel group becomes `ALL`; other labels are sanitised and
/// de-duplicated. Fails if the sentinel is missing or any entry is not a list
/// of `{name, data}` records.
pub fn normalize(raw: &RawAggregateResult) -> DashResult<NormalizedAggregate> {
    if !raw.groups.contains_key(ALL_SENTINEL) {
        return Err(DashboardError::malformed(format!(
            "missing '{}' group",
            ALL_SENTINEL
        )));
    }

    let mut taken: IndexSet<String> = IndexSet::new();
    taken.insert(ALL_GROUP_ID.to_string());

    let mut groups = Vec::with_capacity(raw.groups.len());
    let mut all_index = 0;

    for (label, entry) in &raw.groups {
        let id = if label == ALL_SENTINEL {
            all_index = groups.len();
            GroupId::all()
        } else {
            let id = unique_id(&dom_safe(label), &mut taken);
            if id != *label {
                debug!(label = %label, id = %id, "relabelled group");
            }
            GroupId(id)
        };

        let columns = parse_columns(label, entry)?;
        groups.push(NormalizedGroup {
            id,
            label: label.clone(),
            columns,
        });
    }

    Ok(NormalizedAggregate { groups, all_index })
}

fn parse_columns(group: &str, entry: &Value) -> DashResult<Vec<ColumnSummary>> {
    let records = entry.as_array().ok_or_else(|| {
        DashboardError::malformed(format!("group '{}' is not a list of columns", group))
    })?;

    records
        .iter()
        .enumerate()
        .map(|(index, record)| parse_column(group, index, record))
        .collect()
}

fn parse_column(group: &str, index: usize, record: &Value) -> DashResult<ColumnSummary> {
    let obj = record.as_object().ok_or_else(|| {
        DashboardError::malformed(format!(
            "group '{}' entry #{} is not a column record",
            group, index
        ))
    })?;

    let column_error = |reason: &str| DashboardError::MalformedColumn {
        group: group.to_string(),
        index,
        reason: reason.to_string(),
    };

    let name = obj
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| column_error("missing string field 'name'"))?;

    let data = match obj.get("data") {
        Some(Value::Object(map)) => map
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        // The service sends null for columns it could not summarise
        Some(Value::Null) => IndexMap::new(),
        Some(_) => return Err(column_error("field 'data' is not a mapping")),
        None => return Err(column_error("missing field 'data'")),
    };

    Ok(ColumnSummary::new(name, data))
}

/// Replace every character that is not valid in an id/fragment.
pub(crate) fn dom_safe(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        "group".to_string()
    } else {
        cleaned
    }
}

pub(crate) fn unique_id(base: &str, taken: &mut IndexSet<String>) -> String {
    let mut candidate = base.to_string();
    let mut n = 2;
    while taken.contains(&candidate) {
        candidate = format!("{}-{}", base, n);
        n += 1;
    }
    taken.insert(candidate.clone());
    candidate
}
