use nlsql_model::SortOrder;
use sqlparser::ast::{Expr, Ident, OrderBy, OrderByExpr, Statement};
use sqlparser::dialect::ClickHouseDialect;
use sqlparser::parser::Parser;

use crate::error::{Error, Result};

/// Replaces the `ORDER BY` clause of a single `SELECT` statement with
/// `sort_by sort_order`, inserting one if none exists. Operates on the
/// parsed AST rather than slicing text, so reapplying the same rewrite
/// to its own output is a no-op by construction: idempotence falls out
/// of overwriting one AST field instead of pattern-matching substrings.
pub fn replace_order_by(sql: &str, sort_by: &str, sort_order: SortOrder) -> Result<String> {
    let dialect = ClickHouseDialect {};
    let mut statements = Parser::parse_sql(&dialect, sql)?;

    if statements.len() != 1 {
        return Err(Error::UnsupportedStatement("multiple statements"));
    }

    let order_expr = OrderByExpr {
        expr: Expr::Identifier(Ident::new(sort_by)),
        asc: Some(matches!(sort_order, SortOrder::Asc)),
        nulls_first: None,
        with_fill: None,
    };

    match &mut statements[0] {
        Statement::Query(query) => {
            query.order_by = Some(OrderBy {
                exprs: vec![order_expr],
                interpolate: None,
            });
        }
        _ => return Err(Error::UnsupportedStatement("non-SELECT statement")),
    }

    Ok(statements[0].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_existing_order_by() {
        let rewritten =
            replace_order_by("SELECT * FROM t ORDER BY a LIMIT 10", "b", SortOrder::Desc).unwrap();
        assert_eq!(rewritten, "SELECT * FROM t ORDER BY b DESC LIMIT 10");
    }

    #[test]
    fn inserts_order_by_when_absent() {
        let rewritten =
            replace_order_by("SELECT * FROM t LIMIT 10", "b", SortOrder::Desc).unwrap();
        assert_eq!(rewritten, "SELECT * FROM t ORDER BY b DESC LIMIT 10");
    }

    #[test]
    fn rewrite_is_idempotent() {
        let once = replace_order_by("SELECT * FROM t ORDER BY a LIMIT 10", "b", SortOrder::Desc).unwrap();
        let twice = replace_order_by(&once, "b", SortOrder::Desc).unwrap();
        assert_eq!(once, twice);
    }
}
