//! The query model: one analytical request against a metrics view.

use serde::{Deserialize, Serialize};

use super::expr::Expression;
use super::time::{TimeGrain, TimeRange};

/// A requested dimension, optionally truncated to a time grain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_grain: Option<TimeGrain>,
    /// Output column name; defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl Dimension {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            time_grain: None,
            alias: None,
        }
    }

    pub fn with_grain(mut self, grain: TimeGrain) -> Self {
        self.time_grain = Some(grain);
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// How an ad-hoc or comparison measure is computed. Absent for plain schema
/// measures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MeasureCompute {
    /// `COUNT(*)`
    Count,
    /// `COUNT(DISTINCT dimension)`
    CountDistinct { dimension: String },
    /// The measure's value in the comparison period.
    ComparisonValue { measure: String },
    /// Base value minus comparison value.
    ComparisonDelta { measure: String },
    /// `(base - comparison) / comparison`
    ComparisonRatio { measure: String },
    /// Percentage of the ungrouped total. `total` is filled in by the
    /// percent-of-total pass.
    PercentOfTotal {
        measure: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total: Option<f64>,
    },
}

impl MeasureCompute {
    /// The schema measure this compute reads, if any.
    pub fn base_measure(&self) -> Option<&str> {
        match self {
            MeasureCompute::Count | MeasureCompute::CountDistinct { .. } => None,
            MeasureCompute::ComparisonValue { measure }
            | MeasureCompute::ComparisonDelta { measure }
            | MeasureCompute::ComparisonRatio { measure }
            | MeasureCompute::PercentOfTotal { measure, .. } => Some(measure),
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            MeasureCompute::ComparisonValue { .. }
                | MeasureCompute::ComparisonDelta { .. }
                | MeasureCompute::ComparisonRatio { .. }
        )
    }
}

/// A requested measure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    /// Schema measure name, or the output name of a computed measure.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute: Option<MeasureCompute>,
}

impl Measure {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            compute: None,
        }
    }

    pub fn computed(name: impl Into<String>, compute: MeasureCompute) -> Self {
        Self {
            name: name.into(),
            compute: Some(compute),
        }
    }

    /// The schema measure whose expression this output is built from.
    pub fn schema_measure(&self) -> Option<&str> {
        match &self.compute {
            None => Some(&self.name),
            Some(c) => c.base_measure(),
        }
    }

    pub fn is_comparison(&self) -> bool {
        self.compute.as_ref().is_some_and(MeasureCompute::is_comparison)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub name: String,
    #[serde(default)]
    pub desc: bool,
}

impl Sort {
    pub fn asc(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            desc: false,
        }
    }

    pub fn desc(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            desc: true,
        }
    }
}

/// One analytical request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Query {
    pub metrics_view: String,
    pub dimensions: Vec<Dimension>,
    pub measures: Vec<Measure>,
    /// Pre-aggregation filter over dimensions.
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub filter: Option<Expression>,
    /// Post-aggregation filter over requested outputs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub having: Option<Expression>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison_time_range: Option<TimeRange>,
    pub sort: Vec<Sort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    /// IANA timezone for relative time ranges and truncation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    /// Raw-rows mode: select every accessible dimension, ungrouped.
    pub rows: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pivot_on: Vec<String>,
    /// Cap recorded by the row cap pass.
    #[serde(skip)]
    pub effective_row_cap: Option<u64>,
}

impl Query {
    pub fn new(metrics_view: impl Into<String>) -> Self {
        Self {
            metrics_view: metrics_view.into(),
            ..Default::default()
        }
    }

    pub fn with_dimension(mut self, dim: Dimension) -> Self {
        self.dimensions.push(dim);
        self
    }

    pub fn with_measure(mut self, measure: Measure) -> Self {
        self.measures.push(measure);
        self
    }

    pub fn with_where(mut self, filter: Expression) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_having(mut self, having: Expression) -> Self {
        self.having = Some(having);
        self
    }

    pub fn with_time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    pub fn with_comparison_time_range(mut self, range: TimeRange) -> Self {
        self.comparison_time_range = Some(range);
        self
    }

    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort.push(sort);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_time_zone(mut self, tz: impl Into<String>) -> Self {
        self.time_zone = Some(tz.into());
        self
    }

    /// Output column names in select order.
    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.dimensions
            .iter()
            .map(Dimension::output_name)
            .chain(self.measures.iter().map(|m| m.name.as_str()))
    }

    pub fn dimension_by_output(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.output_name() == name)
    }

    pub fn measure_by_name(&self, name: &str) -> Option<&Measure> {
        self.measures.iter().find(|m| m.name == name)
    }

    pub fn has_comparison_measures(&self) -> bool {
        self.measures.iter().any(Measure::is_comparison)
    }
}
