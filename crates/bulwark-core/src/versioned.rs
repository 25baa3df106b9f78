//! SQL for optimistic version-locked updates.
//!
//! Rows taking part in optimistic locking carry an integer `version` column
//! keyed by `id`. An update only applies when the version it was computed
//! from is still current, and bumps the version in the same statement.

use std::collections::HashSet;

use crate::types::Value;
use crate::validate::{validate_identifier, ValidationError};

/// Primary key column of versioned rows.
pub const ID_COLUMN: &str = "id";

/// Version column of versioned rows.
pub const VERSION_COLUMN: &str = "version";

/// A statement ready for binding.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Build the read half of a read-modify-write cycle.
pub fn version_read(table: &str, id: &Value) -> Result<SqlStatement, ValidationError> {
    validate_identifier(table)?;
    Ok(SqlStatement {
        sql: format!(
            "SELECT {} FROM {} WHERE {} = ?",
            VERSION_COLUMN, table, ID_COLUMN
        ),
        params: vec![id.clone()],
    })
}

/// Build `UPDATE t SET a = ?, ..., version = version + 1 WHERE id = ? AND version = ?`.
///
/// Parameters are bound in order: update values, then `id`, then the
/// expected version.
pub fn versioned_update(
    table: &str,
    id: &Value,
    updates: &[(&str, Value)],
    expected_version: i64,
) -> Result<SqlStatement, ValidationError> {
    validate_identifier(table)?;
    if updates.is_empty() {
        return Err(ValidationError::EmptyUpdate);
    }

    let mut seen = HashSet::with_capacity(updates.len());
    let mut assignments = Vec::with_capacity(updates.len() + 1);
    let mut params = Vec::with_capacity(updates.len() + 2);

    for (column, value) in updates {
        validate_identifier(column)?;
        if column.eq_ignore_ascii_case(ID_COLUMN) || column.eq_ignore_ascii_case(VERSION_COLUMN) {
            return Err(ValidationError::ProtectedColumn(column.to_string()));
        }
        if !seen.insert(column.to_ascii_lowercase()) {
            return Err(ValidationError::DuplicateColumn(column.to_string()));
        }
        assignments.push(format!("{} = ?", column));
        params.push(value.clone());
    }
    assignments.push(format!("{v} = {v} + 1", v = VERSION_COLUMN));

    params.push(id.clone());
    params.push(Value::Integer(expected_version));

    Ok(SqlStatement {
        sql: format!(
            "UPDATE {} SET {} WHERE {} = ? AND {} = ?",
            table,
            assignments.join(", "),
            ID_COLUMN,
            VERSION_COLUMN
        ),
        params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versioned_update_sql() {
        let stmt = versioned_update(
            "documents",
            &Value::from(42),
            &[("title", "Draft".into()), ("word_count", 120.into())],
            3,
        )
        .unwrap();

        assert_eq!(
            stmt.sql,
            "UPDATE documents SET title = ?, word_count = ?, version = version + 1 WHERE id = ? AND version = ?"
        );
        assert_eq!(
            stmt.params,
            vec![
                Value::from("Draft"),
                Value::from(120),
                Value::from(42),
                Value::from(3)
            ]
        );
    }

    #[test]
    fn test_version_read_sql() {
        let stmt = version_read("documents", &Value::from(7)).unwrap();
        assert_eq!(stmt.sql, "SELECT version FROM documents WHERE id = ?");
        assert_eq!(stmt.params, vec![Value::from(7)]);
    }

    #[test]
    fn test_rejects_protected_columns() {
        let result = versioned_update("documents", &Value::from(1), &[("version", 9.into())], 1);
        assert_eq!(result, Err(ValidationError::ProtectedColumn("version".to_string())));

        let result = versioned_update("documents", &Value::from(1), &[("ID", 9.into())], 1);
        assert!(matches!(result, Err(ValidationError::ProtectedColumn(_))));
    }

    #[test]
    fn test_rejects_bad_input() {
        assert_eq!(
            versioned_update("documents", &Value::from(1), &[], 1),
            Err(ValidationError::EmptyUpdate)
        );
        assert!(versioned_update("docs; --", &Value::from(1), &[("a", 1.into())], 1).is_err());
        assert!(matches!(
            versioned_update("documents", &Value::from(1), &[("a", 1.into()), ("A", 2.into())], 1),
            Err(ValidationError::DuplicateColumn(_))
        ));
    }
}
