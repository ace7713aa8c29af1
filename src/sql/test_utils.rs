//! Parses emitted SQL with sqlparser to catch syntax slips in unit tests.

use sqlparser::dialect::{
    BigQueryDialect, ClickHouseDialect, DuckDbDialect, GenericDialect, MsSqlDialect,
    MySqlDialect, PostgreSqlDialect, SnowflakeDialect,
};
use sqlparser::parser::Parser;

use super::dialect::Dialect;

/// Validates that a SQL string is syntactically valid for the given dialect.
///
/// Druid has no sqlparser dialect and is checked with the generic one.
pub fn validate_sql(sql: &str, dialect: Dialect) -> Result<(), String> {
    let parser_dialect: Box<dyn sqlparser::dialect::Dialect> = match dialect {
        Dialect::Postgres => Box::new(PostgreSqlDialect {}),
        Dialect::DuckDb => Box::new(DuckDbDialect {}),
        Dialect::MySql => Box::new(MySqlDialect {}),
        Dialect::TSql => Box::new(MsSqlDialect {}),
        Dialect::Snowflake => Box::new(SnowflakeDialect {}),
        Dialect::BigQuery => Box::new(BigQueryDialect {}),
        Dialect::ClickHouse => Box::new(ClickHouseDialect {}),
        Dialect::Druid => Box::new(GenericDialect {}),
    };

    Parser::parse_sql(&*parser_dialect, sql)
        .map(|_| ())
        .map_err(|e| format!("Invalid SQL for {:?}: {}\nSQL: {}", dialect, e, sql))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_quoted_identifiers() {
        validate_sql("SELECT \"region\" FROM \"sales\".\"orders\"", Dialect::Postgres).unwrap();
        validate_sql("SELECT `region` FROM `orders` GROUP BY 1", Dialect::BigQuery).unwrap();
        validate_sql("SELECT [region] FROM [orders]", Dialect::TSql).unwrap();
    }

    #[test]
    fn test_validate_invalid_sql() {
        let result = validate_sql("SELEC region FORM orders", Dialect::Postgres);
        assert!(result.is_err());
    }
}
