//! # metricsql
//!
//! Compiles declarative metrics queries into dialect-specific SQL.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │          Query (dimensions, measures, filters)           │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [validation]
//! ┌─────────────────────────────────────────────────────────┐
//! │     Query passes: time range → row cap → % of total      │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [plan builder + translator]
//! ┌─────────────────────────────────────────────────────────┐
//! │                 PlanTree (SelectBlock arena)             │
//! │      Tree passes: comparison join → normalization        │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [emitter]
//! ┌─────────────────────────────────────────────────────────┐
//! │              SQL text + positional arguments             │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod compile;
pub mod config;
pub mod emit;
pub mod error;
pub mod executor;
pub mod model;
pub mod plan;
pub mod rewrite;
pub mod sql;
pub mod translate;
pub mod validation;

// Re-export SQL submodules at crate level
pub use sql::dialect;
pub use sql::token;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::compile::{CompileOptions, CompileOutput, Compiler};
    pub use crate::dialect::{Dialect, SqlDialect};
    pub use crate::error::{CompileError, CompileResult, ErrorKind};
    pub use crate::executor::{cancel_pair, CancelHandle, CancelSignal, Executor, ExecutorError};
    pub use crate::model::{
        Dimension, Expression, Measure, MeasureCompute, MetricsView, Operator, Query, Security,
        Sort, TimeGrain, TimeRange, Value,
    };
}

// Also export at crate root for convenience
pub use compile::{CompileOptions, CompileOutput, Compiler};
pub use dialect::Dialect;
pub use error::{CompileError, CompileResult};
pub use model::{Query, Value};
