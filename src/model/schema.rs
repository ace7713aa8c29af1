//! Metrics-view schema: the named dimensions and measures a query may use,
//! bound to a base table.
//!
//! Loading views from disk is the caller's job; this module only describes
//! the shape the compiler reads.

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use super::time::Calendar;
use crate::validation::ValidationError;

/// Column data type, as far as the compiler cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    String,
    Int,
    Float,
    Bool,
    Date,
    Timestamp,
}

impl DataType {
    pub fn is_temporal(self) -> bool {
        matches!(self, DataType::Date | DataType::Timestamp)
    }
}

/// A dimension: either a bare column or a SQL expression over the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Column name; defaults to `name` when neither column nor expression is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default)]
    pub data_type: DataType,
}

impl DimensionDef {
    pub fn column(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            column: Some(name.clone()),
            name,
            display_name: None,
            expression: None,
            data_type: DataType::String,
        }
    }

    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.column = None;
        self.expression = Some(expression.into());
        self
    }

    pub fn with_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasureKind {
    /// An aggregate over table rows.
    #[default]
    Simple,
    /// An expression over other measures, referenced by name.
    Derived,
}

/// A measure definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Aggregate SQL (`SUM(revenue)`) for simple measures; an expression over
    /// measure names (`revenue / NULLIF(orders, 0)`) for derived ones.
    pub expression: String,
    #[serde(default)]
    pub kind: MeasureKind,
    /// Measures a derived expression reads.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
    /// Aggregate at this coarser dimension set and join back.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub per: Vec<String>,
}

impl MeasureDef {
    pub fn simple(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            expression: expression.into(),
            kind: MeasureKind::Simple,
            references: vec![],
            per: vec![],
        }
    }

    pub fn derived(
        name: impl Into<String>,
        expression: impl Into<String>,
        references: &[&str],
    ) -> Self {
        Self {
            kind: MeasureKind::Derived,
            references: references.iter().map(|r| r.to_string()).collect(),
            ..Self::simple(name, expression)
        }
    }

    pub fn per(mut self, dims: &[&str]) -> Self {
        self.per = dims.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    pub fn is_derived(&self) -> bool {
        self.kind == MeasureKind::Derived
    }
}

fn default_first_day_of_week() -> u8 {
    1
}

fn default_first_month_of_year() -> u8 {
    1
}

/// A metrics view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsView {
    pub name: String,
    /// Database schema of `table`, if qualified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_schema: Option<String>,
    pub table: String,
    /// Default time dimension for time ranges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_dimension: Option<String>,
    #[serde(default = "default_first_day_of_week")]
    pub first_day_of_week: u8,
    #[serde(default = "default_first_month_of_year")]
    pub first_month_of_year: u8,
    #[serde(default)]
    pub dimensions: Vec<DimensionDef>,
    #[serde(default)]
    pub measures: Vec<MeasureDef>,
}

impl MetricsView {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            database_schema: None,
            table: table.into(),
            time_dimension: None,
            first_day_of_week: 1,
            first_month_of_year: 1,
            dimensions: vec![],
            measures: vec![],
        }
    }

    pub fn with_time_dimension(mut self, name: impl Into<String>) -> Self {
        self.time_dimension = Some(name.into());
        self
    }

    pub fn with_dimension(mut self, dim: DimensionDef) -> Self {
        self.dimensions.push(dim);
        self
    }

    pub fn with_measure(mut self, measure: MeasureDef) -> Self {
        self.measures.push(measure);
        self
    }

    pub fn dimension(&self, name: &str) -> Option<&DimensionDef> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    pub fn measure(&self, name: &str) -> Option<&MeasureDef> {
        self.measures.iter().find(|m| m.name == name)
    }

    /// The measures `names` need, grouped into dependency levels.
    ///
    /// Level 0 holds simple measures; level `n` holds derived measures whose
    /// deepest reference is at level `n - 1`. Within a level, measures keep
    /// their schema order.
    pub fn measure_levels(&self, names: &[&str]) -> Result<Vec<Vec<&MeasureDef>>, ValidationError> {
        let mut graph: DiGraph<&MeasureDef, ()> = DiGraph::new();
        let mut index: HashMap<&str, NodeIndex> = HashMap::new();

        let mut pending: Vec<(&str, Option<&str>)> = names.iter().map(|n| (*n, None)).collect();
        while let Some((name, referrer)) = pending.pop() {
            if index.contains_key(name) {
                continue;
            }
            let def = self.measure(name).ok_or_else(|| {
                ValidationError::InvalidSchema(match referrer {
                    Some(by) => format!("measure '{by}' references unknown measure '{name}'"),
                    None => format!("unknown measure '{name}'"),
                })
            })?;
            index.insert(name, graph.add_node(def));
            if def.is_derived() {
                pending.extend(def.references.iter().map(|r| (r.as_str(), Some(name))));
            }
        }

        for node in graph.node_indices().collect::<Vec<_>>() {
            let def = graph[node];
            if !def.is_derived() {
                continue;
            }
            for r in &def.references {
                if let Some(&dep) = index.get(r.as_str()) {
                    graph.add_edge(dep, node, ());
                }
            }
        }

        let order = toposort(&graph, None).map_err(|cycle| {
            ValidationError::InvalidSchema(format!(
                "measure '{}' depends on itself",
                graph[cycle.node_id()].name
            ))
        })?;

        let mut depth: HashMap<NodeIndex, usize> = HashMap::new();
        let mut levels: Vec<Vec<&MeasureDef>> = Vec::new();
        for node in order {
            let level = graph
                .neighbors_directed(node, Direction::Incoming)
                .filter_map(|dep| depth.get(&dep))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            depth.insert(node, level);
            if levels.len() <= level {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[level].push(graph[node]);
        }

        let position = |m: &MeasureDef| self.measures.iter().position(|d| d.name == m.name);
        for level in &mut levels {
            level.sort_by_key(|m| position(*m));
        }
        Ok(levels)
    }

    pub fn calendar(&self) -> Calendar {
        Calendar {
            first_day_of_week: self.first_day_of_week,
            first_month_of_year: self.first_month_of_year,
        }
    }
}
