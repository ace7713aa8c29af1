//! End-to-end compilation from a query to SQL.
//!
//! ```text
//! Query → Validate → Query Passes → Build Plan → Tree Passes → Emit → SQL + args
//! ```
//!
//! # Example
//!
//! ```ignore
//! use metricsql::compile::{CompileOptions, Compiler};
//! use metricsql::executor::CancelSignal;
//! use metricsql::model::{Dimension, Measure, MetricsView, Query, Security};
//! use metricsql::sql::Dialect;
//!
//! let view: MetricsView = load_view()?;
//! let security = Security::open();
//! let options = CompileOptions::default().with_dialect(Dialect::Postgres);
//! let compiler = Compiler::new(&view, &security, options);
//!
//! let query = Query::new("sales")
//!     .with_dimension(Dimension::new("region"))
//!     .with_measure(Measure::new("revenue"));
//! let output = compiler.compile(query, &CancelSignal::never()).await?;
//! println!("{} {:?}", output.sql, output.args);
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::{Settings, SettingsError};
use crate::emit;
use crate::error::{CompileError, CompileResult};
use crate::executor::{CancelSignal, Executor};
use crate::model::{MetricsView, Query, Security, Value};
use crate::plan::Builder;
use crate::rewrite::{PassContext, Pipeline};
use crate::sql::Dialect;
use crate::validation;

// ============================================================================
// Options
// ============================================================================

/// Options for compilation.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// SQL dialect to generate.
    pub dialect: Dialect,

    /// Row cap; `None` uses the dialect default, `Some(0)` disables it.
    pub row_cap: Option<u64>,

    /// Allow one-sided joins for sorted comparison queries.
    pub approximate_comparisons: bool,

    /// Anchor for relative time ranges; `None` means now.
    pub execution_time: Option<DateTime<Utc>>,

    /// Time zone applied when the query names none.
    pub time_zone: Option<String>,

    /// Limit on each grand-total sub-query.
    pub subquery_timeout: Duration,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            row_cap: None,
            approximate_comparisons: false,
            execution_time: None,
            time_zone: None,
            subquery_timeout: Duration::from_secs(30),
        }
    }
}

impl CompileOptions {
    /// Build options from the `[compiler]` table of a settings file.
    pub fn from_settings(settings: &Settings) -> Result<Self, SettingsError> {
        let compiler = &settings.compiler;
        Ok(Self {
            dialect: compiler.dialect()?,
            row_cap: compiler.row_cap,
            approximate_comparisons: compiler.approximate_comparisons,
            execution_time: None,
            time_zone: compiler.time_zone()?,
            subquery_timeout: compiler.subquery_timeout()?,
        })
    }

    /// Set the SQL dialect.
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_row_cap(mut self, cap: u64) -> Self {
        self.row_cap = Some(cap);
        self
    }

    pub fn with_approximate_comparisons(mut self, enabled: bool) -> Self {
        self.approximate_comparisons = enabled;
        self
    }

    /// Pin the anchor for relative time ranges.
    pub fn with_execution_time(mut self, at: DateTime<Utc>) -> Self {
        self.execution_time = Some(at);
        self
    }

    pub fn with_time_zone(mut self, tz: impl Into<String>) -> Self {
        self.time_zone = Some(tz.into());
        self
    }

    pub fn with_subquery_timeout(mut self, timeout: Duration) -> Self {
        self.subquery_timeout = timeout;
        self
    }
}

// ============================================================================
// Result Types
// ============================================================================

/// Result of compiling a query to SQL.
#[derive(Debug, Clone)]
pub struct CompileOutput {
    /// The generated SQL string.
    pub sql: String,

    /// Positional arguments, in placeholder order.
    pub args: Vec<Value>,

    /// The dialect used for generation.
    pub dialect: Dialect,

    /// Row cap applied by the compiler, if any. The statement fetches one
    /// row more than this so truncation can be detected.
    pub row_cap: Option<u64>,

    /// The query after rewriting (resolved time ranges, captured totals).
    pub query: Query,
}

impl CompileOutput {
    /// True when the statement returned more rows than the cap allows.
    pub fn is_truncated(&self, row_count: usize) -> bool {
        self.row_cap
            .is_some_and(|cap| u64::try_from(row_count).map_or(true, |n| n > cap))
    }
}

// ============================================================================
// Compiler
// ============================================================================

/// Compiles queries against one metrics view and access policy.
///
/// A compiler holds only shared, read-only state; any number of
/// compilations may run through the same instance concurrently.
pub struct Compiler<'a> {
    view: &'a MetricsView,
    security: &'a Security,
    options: CompileOptions,
    executor: Option<&'a dyn Executor>,
    pipeline: Pipeline,
}

impl<'a> Compiler<'a> {
    pub fn new(view: &'a MetricsView, security: &'a Security, options: CompileOptions) -> Self {
        Self {
            view,
            security,
            options,
            executor: None,
            pipeline: Pipeline::new(),
        }
    }

    /// Attach the collaborator that evaluates grand totals.
    pub fn with_executor(mut self, executor: &'a dyn Executor) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Compile `query` to a single statement and its arguments.
    ///
    /// Either a complete statement is returned or an error; no partial SQL
    /// escapes.
    #[tracing::instrument(
        name = "compile",
        skip_all,
        fields(view = %query.metrics_view, dialect = %self.options.dialect)
    )]
    pub async fn compile(&self, mut query: Query, cancel: &CancelSignal) -> CompileResult<CompileOutput> {
        check_cancelled(cancel, "before validation")?;
        if query.time_zone.is_none() {
            query.time_zone = self.options.time_zone.clone();
        }
        validation::validate(&query, self.view, self.security)?;

        let dialect = self.options.dialect.dialect();
        let ctx = PassContext {
            view: self.view,
            dialect,
            execution_time: self.options.execution_time.unwrap_or_else(Utc::now),
            row_cap: self.options.row_cap,
            approximate_comparisons: self.options.approximate_comparisons,
            executor: self.executor,
            cancel,
            subquery_timeout: self.options.subquery_timeout,
        };

        let query = self.pipeline.rewrite_query(query, &ctx).await?;
        check_cancelled(cancel, "after query rewrites")?;

        let tree = Builder::new(self.view, self.security, dialect).build(&query)?;
        let tree = self.pipeline.rewrite_tree(tree, &query, &ctx)?;
        let (sql, args) = emit::emit(&tree, dialect)?;

        tracing::debug!(
            target: "metricsql::compile",
            blocks = tree.len(),
            args = args.len(),
            row_cap = ?query.effective_row_cap,
            "compiled query"
        );

        Ok(CompileOutput {
            sql,
            args,
            dialect: self.options.dialect,
            row_cap: query.effective_row_cap,
            query,
        })
    }
}

fn check_cancelled(cancel: &CancelSignal, stage: &str) -> CompileResult<()> {
    if cancel.is_cancelled() {
        return Err(CompileError::Cancelled(format!("cancelled {stage}")));
    }
    Ok(())
}
