use sqlparser::dialect::ClickHouseDialect;
use sqlparser::parser::Parser;

/// Parses `sql` with a dialect-aware parser before it's handed to the
/// warehouse. A parse failure is only ever logged: the warehouse, not this
/// parser, is the source of truth for whether a statement is acceptable.
pub fn check_syntax(sql: &str) {
    let dialect = ClickHouseDialect {};
    if let Err(err) = Parser::parse_sql(&dialect, sql) {
        tracing::warn!(error = %err, sql, "SQL failed local syntax validation; executing anyway");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_statement_does_not_panic() {
        check_syntax("SELECT 1");
    }

    #[test]
    fn invalid_statement_is_only_logged() {
        check_syntax("SELEKT FROM WHERE");
    }
}
