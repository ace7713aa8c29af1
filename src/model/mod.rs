//! Query model, expressions, time handling, and the metrics-view schema.

pub mod duration;
pub mod expr;
pub mod query;
pub mod schema;
pub mod security;
pub mod time;
pub mod value;

pub use duration::{Duration, InvalidDuration, StandardDuration};
pub use expr::{Condition, Expression, Operator, RawExpression, Subquery};
pub use query::{Dimension, Measure, MeasureCompute, Query, Sort};
pub use schema::{DataType, DimensionDef, MeasureDef, MeasureKind, MetricsView};
pub use security::Security;
pub use time::{Calendar, TimeGrain, TimeRange};
pub use value::Value;
