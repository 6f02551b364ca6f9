//! Transaction statements.
//!
//! Units of work nest: the outermost level is a real transaction, every
//! inner level is a savepoint named after its depth (`sp_1`, `sp_2`, ...).
//! The helpers here only render statements; [`PgStore`](crate::store::PgStore)
//! tracks the depth and executes them.

use std::fmt;

/// Transaction isolation level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

fn savepoint(level: usize) -> String {
    format!("sp_{level}")
}

/// Statement opening a new level when `open` levels are already open
pub fn begin_statement(open: usize, isolation: Option<IsolationLevel>) -> String {
    match (open, isolation) {
        (0, None) => "BEGIN".to_string(),
        (0, Some(level)) => format!("BEGIN ISOLATION LEVEL {level}"),
        (n, _) => format!("SAVEPOINT {}", savepoint(n)),
    }
}

/// Statement committing the innermost of `open` levels
///
/// Returns `None` when nothing is open.
pub fn commit_statement(open: usize) -> Option<String> {
    match open {
        0 => None,
        1 => Some("COMMIT".to_string()),
        n => Some(format!("RELEASE SAVEPOINT {}", savepoint(n - 1))),
    }
}

/// Statement rolling back the innermost of `open` levels
///
/// Returns `None` when nothing is open.
pub fn rollback_statement(open: usize) -> Option<String> {
    match open {
        0 => None,
        1 => Some("ROLLBACK".to_string()),
        n => Some(format!("ROLLBACK TO SAVEPOINT {}", savepoint(n - 1))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outermost_level_is_a_transaction() {
        assert_eq!(begin_statement(0, None), "BEGIN");
        assert_eq!(
            begin_statement(0, Some(IsolationLevel::Serializable)),
            "BEGIN ISOLATION LEVEL SERIALIZABLE"
        );
        assert_eq!(commit_statement(1).as_deref(), Some("COMMIT"));
        assert_eq!(rollback_statement(1).as_deref(), Some("ROLLBACK"));
    }

    #[test]
    fn test_inner_levels_are_savepoints() {
        assert_eq!(begin_statement(1, Some(IsolationLevel::Serializable)), "SAVEPOINT sp_1");
        assert_eq!(begin_statement(2, None), "SAVEPOINT sp_2");
        assert_eq!(commit_statement(2).as_deref(), Some("RELEASE SAVEPOINT sp_1"));
        assert_eq!(rollback_statement(3).as_deref(), Some("ROLLBACK TO SAVEPOINT sp_2"));
    }

    #[test]
    fn test_nothing_open() {
        assert_eq!(commit_statement(0), None);
        assert_eq!(rollback_statement(0), None);
    }
}
