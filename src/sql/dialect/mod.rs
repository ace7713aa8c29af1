//! SQL Dialect definitions and capability contract.
//!
//! Each backend implements `SqlDialect` to describe what it can do and how
//! it spells it:
//!
//! - Identifier quoting: `"` (PG/DuckDB/Snowflake/ClickHouse/Druid), `` ` `` (MySQL/BigQuery), `[]` (T-SQL)
//! - Placeholders: `?`, `$n` (Postgres), `@pn` (T-SQL)
//! - Time truncation honouring timezone and week/year start
//! - Null-safe join predicates
//! - Pagination: LIMIT/OFFSET vs OFFSET FETCH
//!
//! The translator, builder and emitter only ever branch on these capability
//! flags and generators, never on a backend's name.
//!
//! # Usage
//!
//! ```ignore
//! use metricsql::sql::dialect::{self, Dialect, SqlDialect};
//!
//! let pg = Dialect::Postgres.dialect();
//! assert_eq!(pg.placeholder(2), "$2");
//!
//! let druid = dialect::lookup("druid").unwrap();
//! assert!(druid.requires_aggregate_normalization());
//! ```
//!
//! # Capability Matrix
//!
//! | Capability | DuckDB | Postgres | MySQL | T-SQL | Snowflake | BigQuery | ClickHouse | Druid |
//! |------------|--------|----------|-------|-------|-----------|----------|------------|-------|
//! | ILIKE | ✓ | ✓ | ❌ | ❌ | ✓ | ❌ | ✓ | ❌ |
//! | FULL OUTER JOIN | ✓ | ✓ | ❌ | ✓ | ✓ | ✓ | ✓ | ✓ |
//! | NULLS FIRST/LAST | ✓ | ✓ | ❌ | ❌ | ✓ | ✓ | ✓ | ❌ |
//! | GROUP BY ordinal | ❌ | ❌ | ❌ | ❌ | ✓ | ✓ | ❌ | ❌ |
//! | Approximate comparisons | ✓ | ❌ | ❌ | ❌ | ❌ | ❌ | ✓ | ✓ |
//! | Aggregate normalization | ❌ | ❌ | ❌ | ❌ | ❌ | ❌ | ❌ | ✓ |
//! | Default row cap | 0 | 0 | 0 | 0 | 0 | 0 | 0 | 100000 |

mod bigquery;
mod clickhouse;
mod druid;
mod duckdb;
pub mod helpers;
mod mysql;
mod postgres;
mod snowflake;
mod tsql;

pub use bigquery::BigQuery;
pub use clickhouse::ClickHouse;
pub use druid::Druid;
pub use duckdb::DuckDb;
pub use mysql::MySql;
pub use postgres::Postgres;
pub use snowflake::Snowflake;
pub use tsql::TSql;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::LazyLock;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::token::{Token, TokenStream};
use crate::model::TimeGrain;

/// Calendar conventions for time truncation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruncOptions {
    /// IANA timezone name. `UTC` means no conversion.
    pub time_zone: String,
    /// 1 = Monday … 7 = Sunday.
    pub first_day_of_week: u8,
    /// 1 = January … 12 = December.
    pub first_month_of_year: u8,
}

impl Default for TruncOptions {
    fn default() -> Self {
        Self {
            time_zone: "UTC".into(),
            first_day_of_week: 1,
            first_month_of_year: 1,
        }
    }
}

impl TruncOptions {
    pub fn is_utc(&self) -> bool {
        self.time_zone.is_empty() || self.time_zone.eq_ignore_ascii_case("UTC")
    }

    /// Days to shift forward so a week starting on `first_day_of_week`
    /// lines up with an ISO (Monday) week.
    pub fn week_shift_days(&self) -> u8 {
        (8 - self.first_day_of_week.clamp(1, 7)) % 7
    }

    /// Months to shift back so a fiscal year lines up with a calendar year.
    pub fn year_shift_months(&self) -> u8 {
        self.first_month_of_year.clamp(1, 12) - 1
    }
}

/// SQL dialect trait - the capability contract every backend implements.
///
/// The default implementations follow ANSI SQL where possible.
pub trait SqlDialect: std::fmt::Debug + Send + Sync {
    /// Dialect name for display/logging, and its registry key.
    fn name(&self) -> &'static str;

    // =========================================================================
    // Identifier and Literal Quoting
    // =========================================================================

    /// Quote an identifier (table, column, alias).
    fn quote_identifier(&self, ident: &str) -> String;

    /// Quote a string literal.
    ///
    /// All dialects use single quotes with `''` for escaping.
    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_single(s)
    }

    /// Placeholder for the 1-based positional argument `index`.
    fn placeholder(&self, _index: usize) -> String {
        "?".into()
    }

    // =========================================================================
    // Capability Flags
    // =========================================================================

    /// Whether `ILIKE` is available. Without it the translator lower-cases
    /// both sides of a `LIKE`.
    fn supports_ilike(&self) -> bool {
        false
    }

    /// Whether this dialect supports FULL OUTER JOIN.
    fn supports_full_outer_join(&self) -> bool {
        true
    }

    /// Whether this dialect supports NULLS FIRST/LAST in ORDER BY.
    fn supports_nulls_ordering(&self) -> bool {
        true
    }

    /// Whether GROUP BY may reference select-list ordinals (`GROUP BY 1, 2`).
    fn supports_group_by_ordinal(&self) -> bool {
        false
    }

    /// Whether period comparisons may use a one-sided join.
    fn supports_approximate_comparisons(&self) -> bool {
        false
    }

    /// Whether blocks with join children must group explicitly and wrap
    /// measures in a deterministic first-value aggregate.
    fn requires_aggregate_normalization(&self) -> bool {
        false
    }

    /// Row cap applied when the configuration does not set one. 0 = unlimited.
    fn default_row_cap(&self) -> u64 {
        0
    }

    // =========================================================================
    // Generators
    // =========================================================================

    /// Truncate `expr` to `grain`, honouring timezone and calendar starts.
    ///
    /// Returns `None` when this backend cannot express the requested
    /// combination.
    fn date_trunc(&self, expr: &str, grain: TimeGrain, opts: &TruncOptions) -> Option<String>;

    /// Null-safe equality used to join period and per-grain children.
    fn join_on(&self, left: &TokenStream, right: &TokenStream) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.append(left).keyword(Token::IsNotDistinctFrom).append(right);
        ts
    }

    /// Deterministic first-value aggregate.
    fn any_value(&self, expr: &TokenStream) -> TokenStream {
        helpers::call("ANY_VALUE", expr)
    }

    // =========================================================================
    // Pagination
    // =========================================================================

    /// Emit LIMIT/OFFSET or equivalent pagination clause.
    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset_standard(limit, offset)
    }

    /// Whether this dialect requires ORDER BY for OFFSET/LIMIT.
    ///
    /// T-SQL requires ORDER BY when using OFFSET FETCH.
    fn requires_order_by_for_offset(&self) -> bool {
        false
    }
}

// =============================================================================
// Registry
// =============================================================================

static REGISTRY: LazyLock<HashMap<&'static str, &'static dyn SqlDialect>> = LazyLock::new(|| {
    Dialect::ALL
        .iter()
        .map(|d| (d.dialect().name(), d.dialect()))
        .collect()
});

/// Look up a backend by registry key (case-insensitive).
pub fn lookup(name: &str) -> Option<&'static dyn SqlDialect> {
    REGISTRY.get(name.to_ascii_lowercase().as_str()).copied()
}

/// Registered backend keys, sorted.
pub fn registered() -> Vec<&'static str> {
    let mut names: Vec<_> = REGISTRY.keys().copied().collect();
    names.sort_unstable();
    names
}

// =============================================================================
// Dialect handle
// =============================================================================

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dialect {
    #[default]
    DuckDb,
    Postgres,
    MySql,
    TSql,
    Snowflake,
    BigQuery,
    ClickHouse,
    Druid,
}

impl Dialect {
    pub const ALL: [Dialect; 8] = [
        Dialect::DuckDb,
        Dialect::Postgres,
        Dialect::MySql,
        Dialect::TSql,
        Dialect::Snowflake,
        Dialect::BigQuery,
        Dialect::ClickHouse,
        Dialect::Druid,
    ];

    /// Get the dialect implementation.
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::DuckDb => &DuckDb,
            Dialect::Postgres => &Postgres,
            Dialect::MySql => &MySql,
            Dialect::TSql => &TSql,
            Dialect::Snowflake => &Snowflake,
            Dialect::BigQuery => &BigQuery,
            Dialect::ClickHouse => &ClickHouse,
            Dialect::Druid => &Druid,
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dialect().name())
    }
}

/// Unknown dialect name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown dialect '{0}'")]
pub struct UnknownDialect(pub String);

impl FromStr for Dialect {
    type Err = UnknownDialect;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.to_ascii_lowercase();
        let key = match key.as_str() {
            "postgresql" | "pg" => "postgres",
            "mssql" | "sqlserver" => "tsql",
            other => other,
        };
        Dialect::ALL
            .into_iter()
            .find(|d| d.dialect().name() == key)
            .ok_or_else(|| UnknownDialect(s.to_string()))
    }
}

impl Serialize for Dialect {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.dialect().name())
    }
}

impl<'de> Deserialize<'de> for Dialect {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
