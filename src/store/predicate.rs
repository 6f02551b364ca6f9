//! Fetch predicates.
//!
//! The three shapes the engine asks a store for. `ArrayOverlaps` is the one
//! PostgreSQL-specific primitive: "array column shares an element with this
//! set", rendered as `col && '{...}'`. Values are inlined as literals
//! rather than bound, so array and uuid columns compare without parameter
//! type juggling.

use crate::relation::codec::{sql_array_literal, sql_literal};
use crate::value::{Record, Scalar};
use sea_query::{DynIden, Expr, PostgresQueryBuilder, Query, SelectStatement};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Array column overlaps `values`
    ArrayOverlaps { column: String, values: Vec<Scalar> },
    /// Scalar column is one of `values`
    In { column: String, values: Vec<Scalar> },
    /// Scalar column equals `value`
    Eq { column: String, value: Scalar },
}

impl Predicate {
    pub fn column(&self) -> &str {
        match self {
            Predicate::ArrayOverlaps { column, .. }
            | Predicate::In { column, .. }
            | Predicate::Eq { column, .. } => column,
        }
    }

    /// Evaluate the predicate against an in-memory record
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Predicate::ArrayOverlaps { column, values } => record
                .get(column)
                .elements()
                .iter()
                .any(|item| values.contains(item)),
            Predicate::In { column, values } => record
                .get(column)
                .as_scalar()
                .is_some_and(|value| values.contains(value)),
            Predicate::Eq { column, value } => record.get(column).as_scalar() == Some(value),
        }
    }

    /// SQL condition with inlined literals
    pub fn to_condition(&self) -> String {
        match self {
            Predicate::ArrayOverlaps { column, values } => {
                format!("{} && {}", quote_ident(column), sql_array_literal(values))
            }
            Predicate::In { values, .. } if values.is_empty() => "FALSE".to_string(),
            Predicate::In { column, values } => {
                let list: Vec<String> = values.iter().map(sql_literal).collect();
                format!("{} IN ({})", quote_ident(column), list.join(", "))
            }
            Predicate::Eq { column, value } => {
                format!("{} = {}", quote_ident(column), sql_literal(value))
            }
        }
    }

    /// `SELECT * FROM table WHERE <condition>`
    pub fn to_select(&self, table: &str) -> SelectStatement {
        let mut query = Query::select();
        query
            .column(sea_query::Asterisk)
            .from(DynIden::from(table.to_string()))
            .and_where(Expr::cust(self.to_condition()));
        query
    }

    pub fn to_sql(&self, table: &str) -> String {
        let (sql, _) = self.to_select(table).build(PostgresQueryBuilder);
        sql
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_condition())
    }
}

/// Double-quoted SQL identifier
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::AttrValue;

    #[test]
    fn test_array_overlaps_sql() {
        let predicate = Predicate::ArrayOverlaps {
            column: "tag_ids".to_string(),
            values: vec![Scalar::Int(1), Scalar::Int(2)],
        };
        assert_eq!(predicate.to_condition(), r#""tag_ids" && '{1,2}'"#);
        let sql = predicate.to_sql("videos");
        assert!(sql.starts_with(r#"SELECT * FROM "videos""#), "got {sql}");
        assert!(sql.contains(r#"WHERE "tag_ids" && '{1,2}'"#), "got {sql}");
    }

    #[test]
    fn test_in_sql() {
        let predicate = Predicate::In {
            column: "id".to_string(),
            values: vec![Scalar::Int(1), Scalar::from("x'y")],
        };
        assert_eq!(predicate.to_condition(), r#""id" IN (1, 'x''y')"#);

        let empty = Predicate::In {
            column: "id".to_string(),
            values: vec![],
        };
        assert_eq!(empty.to_condition(), "FALSE");
    }

    #[test]
    fn test_matches_records() {
        let video = Record::loaded(
            "videos",
            [("id", AttrValue::from(1i64)), ("tag_ids", vec![3i64, 4].into())],
        );
        let overlaps = Predicate::ArrayOverlaps {
            column: "tag_ids".to_string(),
            values: vec![Scalar::Int(4), Scalar::Int(9)],
        };
        assert!(overlaps.matches(&video));

        let within = Predicate::In {
            column: "id".to_string(),
            values: vec![Scalar::Int(2)],
        };
        assert!(!within.matches(&video));

        let eq = Predicate::Eq {
            column: "id".to_string(),
            value: Scalar::Int(1),
        };
        assert!(eq.matches(&video));
        assert_eq!(eq.to_string(), r#""id" = 1"#);
    }
}
