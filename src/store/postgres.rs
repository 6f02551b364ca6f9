//! PostgreSQL store.
//!
//! `PgStore` renders fetches, inserts and single-column updates with
//! `sea-query` and runs them through an [`Executor`]. Values are inlined as
//! SQL literals (see [`Predicate`]), so array and uuid columns need no
//! parameter type hints. Units of work map to `BEGIN` at the outermost
//! level and to savepoints below it.

use super::{check_rules, Fetcher, Predicate, Rule, StoreWriter, UnitOfWork};
use crate::error::StoreError;
use crate::executor::{Attributes, Executor};
use crate::relation::codec::{sql_array_literal, sql_literal};
use crate::store::predicate::quote_ident;
use crate::transaction::{begin_statement, commit_statement, rollback_statement, IsolationLevel};
use crate::value::{AttrValue, Record};
use sea_query::{DynIden, Expr, PostgresQueryBuilder, Query};
use std::cell::Cell;
use std::collections::HashMap;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

pub struct PgStore<E: Executor> {
    executor: E,
    isolation: Option<IsolationLevel>,
    depth: Cell<usize>,
    validators: HashMap<String, Vec<Rule>>,
}

impl<E: Executor> PgStore<E> {
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            isolation: None,
            depth: Cell::new(0),
            validators: HashMap::new(),
        }
    }

    /// Isolation level used when the outermost unit of work begins
    pub fn with_isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = Some(level);
        self
    }

    /// Add a validation run by `save(record, true)`
    pub fn add_validator<F>(&mut self, entity: &str, rule: F)
    where
        F: Fn(&Record) -> Result<(), String> + 'static,
    {
        self.validators
            .entry(entity.to_string())
            .or_default()
            .push(Box::new(rule));
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Number of open unit-of-work levels
    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    fn insert(&self, record: &mut Record) -> Result<(), StoreError> {
        let sql = insert_sql(record);
        let row = self.returning_row(&sql, record)?;
        apply_row(record, row);
        Ok(())
    }

    fn update_changed(&self, record: &mut Record) -> Result<(), StoreError> {
        let changed: Vec<String> = record.changed_attributes().map(str::to_string).collect();
        if changed.is_empty() {
            return Ok(());
        }
        let sql = update_sql(record, &changed)?;
        let row = self.returning_row(&sql, record)?;
        apply_row(record, row);
        Ok(())
    }

    fn returning_row(&self, sql: &str, record: &Record) -> Result<Attributes, StoreError> {
        self.executor.query_all(sql)?.into_iter().next().ok_or_else(|| {
            StoreError::QueryError(format!(
                "{} {} was not written",
                record.entity(),
                record.id().map(ToString::to_string).unwrap_or_default()
            ))
        })
    }

    fn run(&self, statement: &str) -> Result<(), StoreError> {
        self.executor.execute(statement).map(|_| ())
    }
}

impl<E: Executor> Fetcher for PgStore<E> {
    fn fetch(&self, entity: &str, predicate: &Predicate) -> Result<Vec<Record>, StoreError> {
        let sql = predicate.to_sql(entity);
        let rows = self.executor.query_all(&sql)?;
        Ok(rows.into_iter().map(|row| Record::loaded(entity, row)).collect())
    }
}

impl<E: Executor> StoreWriter for PgStore<E> {
    fn save(&self, record: &mut Record, validate: bool) -> Result<(), StoreError> {
        if validate {
            check_rules(&self.validators, record)?;
        }
        if record.is_new_record() {
            self.insert(record)?;
        } else {
            self.update_changed(record)?;
        }
        record.mark_persisted();
        Ok(())
    }

    fn update_attribute(
        &self,
        record: &mut Record,
        name: &str,
        value: AttrValue,
    ) -> Result<(), StoreError> {
        if record.is_new_record() {
            return Err(StoreError::Other(format!(
                "cannot update {name} on a new {} record",
                record.entity()
            )));
        }
        let mut query = Query::update();
        query
            .table(DynIden::from(record.entity().to_string()))
            .value(DynIden::from(name.to_string()), Expr::cust(literal(&value)))
            .and_where(Expr::cust(primary_key_condition(record)?));
        let (sql, _) = query.build(PostgresQueryBuilder);

        if self.executor.execute(&sql)? == 0 {
            return Err(StoreError::Other(format!(
                "{} {} does not exist",
                record.entity(),
                record.id().map(ToString::to_string).unwrap_or_default()
            )));
        }
        record.set(name, value);
        record.clear_change(name);
        Ok(())
    }
}

impl<E: Executor> UnitOfWork for PgStore<E> {
    fn begin(&self) -> Result<(), StoreError> {
        let open = self.depth.get();
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::begin_span(open).entered();

        self.run(&begin_statement(open, self.isolation))?;
        self.depth.set(open + 1);
        Ok(())
    }

    fn commit(&self) -> Result<(), StoreError> {
        let open = self.depth.get();
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::commit_span(open).entered();

        let statement = commit_statement(open)
            .ok_or_else(|| StoreError::Other("commit without an open unit of work".to_string()))?;
        if let Err(err) = self.run(&statement) {
            // a failed COMMIT ends the transaction; a failed RELEASE keeps the savepoint
            if open == 1 {
                self.depth.set(0);
            }
            return Err(err);
        }
        self.depth.set(open - 1);
        Ok(())
    }

    fn rollback(&self) -> Result<(), StoreError> {
        let open = self.depth.get();
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::rollback_span(open).entered();

        let statement = rollback_statement(open)
            .ok_or_else(|| StoreError::Other("rollback without an open unit of work".to_string()))?;
        // the level is gone even if the statement fails
        self.depth.set(open - 1);
        self.run(&statement)
    }
}

fn literal(value: &AttrValue) -> String {
    match value {
        AttrValue::Null => "NULL".to_string(),
        AttrValue::Scalar(scalar) => sql_literal(scalar),
        AttrValue::Array(items) => sql_array_literal(items),
    }
}

fn primary_key_condition(record: &Record) -> Result<String, StoreError> {
    let id = record.id().ok_or_else(|| {
        StoreError::Other(format!("{} record has no primary key", record.entity()))
    })?;
    Ok(format!("{} = {}", quote_ident(record.primary_key()), sql_literal(id)))
}

/// `INSERT ... RETURNING *` for every non-null attribute
fn insert_sql(record: &Record) -> String {
    let (columns, values): (Vec<DynIden>, Vec<Expr>) = record
        .attributes()
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(name, value)| (DynIden::from(name.clone()), Expr::cust(literal(value))))
        .unzip();

    if columns.is_empty() {
        return format!(
            "INSERT INTO {} DEFAULT VALUES RETURNING *",
            quote_ident(record.entity())
        );
    }

    let mut query = Query::insert();
    query
        .into_table(DynIden::from(record.entity().to_string()))
        .columns(columns)
        .values_panic(values)
        .returning_col(sea_query::Asterisk);
    let (sql, _) = query.build(PostgresQueryBuilder);
    sql
}

/// `UPDATE ... SET <changed> WHERE pk = id RETURNING *`
fn update_sql(record: &Record, changed: &[String]) -> Result<String, StoreError> {
    let mut query = Query::update();
    query.table(DynIden::from(record.entity().to_string()));
    for name in changed {
        query.value(DynIden::from(name.clone()), Expr::cust(literal(record.get(name))));
    }
    query
        .and_where(Expr::cust(primary_key_condition(record)?))
        .returning_col(sea_query::Asterisk);
    let (sql, _) = query.build(PostgresQueryBuilder);
    Ok(sql)
}

/// Copy the row the database returned (defaults, generated keys) into the record
fn apply_row(record: &mut Record, row: Attributes) {
    for (name, value) in row {
        record.set(name, value);
    }
}
