//! Input validation for anything that ends up inside SQL text.
//!
//! Values travel as bound parameters and never need this. Identifiers and
//! caller-supplied dates are different: they are whitelisted here before a
//! write path assembles SQL from them.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::config::ValidationConfig;
use crate::normalize::count_placeholders;
use crate::types::Value;

/// Errors raised before a request reaches the store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid identifier '{0}': use letters, digits and underscores, starting with a letter or underscore (max 64 chars)")]
    InvalidIdentifier(String),

    #[error("Identifier '{0}' is a reserved SQL keyword")]
    ReservedKeyword(String),

    #[error("Table '{0}' is not in the allowed list")]
    TableNotAllowed(String),

    #[error("Column '{0}' is managed by optimistic locking and cannot be set directly")]
    ProtectedColumn(String),

    #[error("Column '{0}' appears more than once")]
    DuplicateColumn(String),

    #[error("Update must set at least one column")]
    EmptyUpdate,

    #[error("Invalid date '{0}': expected a real calendar date as YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Invalid date range: {start} is after {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },

    #[error("Date range spans {days} days, more than the allowed {max_days}")]
    RangeTooWide { days: i64, max_days: i64 },

    #[error("Limit {limit} outside 1..={max}")]
    InvalidLimit { limit: i64, max: i64 },

    #[error("Query expects {expected} parameters but {actual} were supplied")]
    ParameterCount { expected: usize, actual: usize },

    #[error("Query is empty")]
    EmptyQuery,
}

lazy_static! {
    static ref IDENTIFIER_PATTERN: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,63}$").unwrap();

    static ref DATE_PATTERN: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap();
}

/// Keywords that are never accepted as bare identifiers.
const RESERVED_KEYWORDS: &[&str] = &[
    "ADD", "ALL", "ALTER", "AND", "AS", "ATTACH", "BEGIN", "BETWEEN", "BY", "CASE", "CHECK",
    "COLUMN", "COMMIT", "CONSTRAINT", "CREATE", "CROSS", "DEFAULT", "DELETE", "DETACH",
    "DISTINCT", "DROP", "ELSE", "END", "EXCEPT", "EXISTS", "FOREIGN", "FROM", "GROUP",
    "HAVING", "IN", "INDEX", "INNER", "INSERT", "INTERSECT", "INTO", "IS", "JOIN", "LIKE",
    "LIMIT", "NOT", "NULL", "OFFSET", "ON", "OR", "ORDER", "PRAGMA", "PRIMARY", "REFERENCES",
    "REPLACE", "ROLLBACK", "SELECT", "SET", "TABLE", "THEN", "TRANSACTION", "TRIGGER",
    "UNION", "UNIQUE", "UPDATE", "USING", "VACUUM", "VALUES", "VIEW", "WHEN", "WHERE", "WITH",
];

/// Check that a name is safe to splice into SQL as an identifier.
pub fn validate_identifier(name: &str) -> Result<&str, ValidationError> {
    if !IDENTIFIER_PATTERN.is_match(name) {
        return Err(ValidationError::InvalidIdentifier(name.to_string()));
    }
    if RESERVED_KEYWORDS
        .iter()
        .any(|kw| kw.eq_ignore_ascii_case(name))
    {
        return Err(ValidationError::ReservedKeyword(name.to_string()));
    }
    Ok(name)
}

/// Parse a strict `YYYY-MM-DD` date.
pub fn validate_date(text: &str) -> Result<NaiveDate, ValidationError> {
    if !DATE_PATTERN.is_match(text) {
        return Err(ValidationError::InvalidDate(text.to_string()));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidDate(text.to_string()))
}

/// Check that bare `?` placeholders match the number of supplied values.
///
/// Queries using numbered or named placeholders are left to the store.
pub fn validate_params(query: &str, params: &[Value]) -> Result<(), ValidationError> {
    if query.trim().is_empty() {
        return Err(ValidationError::EmptyQuery);
    }
    let found = count_placeholders(query);
    if !found.numbered && found.anonymous != params.len() {
        return Err(ValidationError::ParameterCount {
            expected: found.anonymous,
            actual: params.len(),
        });
    }
    Ok(())
}

/// Configured validator: identifier rules plus allow-lists and bounds.
#[derive(Debug, Clone, Default)]
pub struct InputValidator {
    config: ValidationConfig,
}

impl InputValidator {
    /// Create a validator from configuration.
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validate a table name against identifier rules and the allow-list.
    pub fn validate_table<'a>(&self, name: &'a str) -> Result<&'a str, ValidationError> {
        validate_identifier(name)?;
        if !self.config.allowed_tables.is_empty()
            && !self.config.allowed_tables.iter().any(|t| t == name)
        {
            return Err(ValidationError::TableNotAllowed(name.to_string()));
        }
        Ok(name)
    }

    /// Validate a column name.
    pub fn validate_column<'a>(&self, name: &'a str) -> Result<&'a str, ValidationError> {
        validate_identifier(name)
    }

    /// Validate an inclusive date range given as text.
    pub fn validate_date_range(
        &self,
        start: &str,
        end: &str,
    ) -> Result<(NaiveDate, NaiveDate), ValidationError> {
        let start = validate_date(start)?;
        let end = validate_date(end)?;
        if start > end {
            return Err(ValidationError::InvertedRange { start, end });
        }
        let days = (end - start).num_days() + 1;
        if days > self.config.max_date_range_days {
            return Err(ValidationError::RangeTooWide {
                days,
                max_days: self.config.max_date_range_days,
            });
        }
        Ok((start, end))
    }

    /// Validate a page size.
    pub fn validate_limit(&self, limit: i64) -> Result<i64, ValidationError> {
        if limit < 1 || limit > self.config.max_limit {
            return Err(ValidationError::InvalidLimit {
                limit,
                max: self.config.max_limit,
            });
        }
        Ok(limit)
    }

    /// Validate a query and its bound values.
    pub fn validate_params(&self, query: &str, params: &[Value]) -> Result<(), ValidationError> {
        validate_params(query, params)
    }
}
