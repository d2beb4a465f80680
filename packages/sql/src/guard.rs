//! Syntactic SQL guards.
//!
//! These are allow-list checks, not a parser: identifiers may only contain
//! `[A-Za-z0-9_.]` and statements must start with `SELECT`. Literal values
//! never go through here; they are escaped by [`crate::filter`].

use crate::SqlError;

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Quotes a table or column name for the SQL-Server dialect.
///
/// Dotted names are quoted segment by segment: `dbo.cadHandler` becomes
/// `[dbo].[cadHandler]`. Brackets in the input are rejected like any other
/// character outside the allow-list; bracketed column names in filter text
/// are unwrapped by [`crate::filter`] before they get here.
///
/// # Errors
///
/// Returns [`SqlError::InvalidIdentifier`] if the name is empty, has an
/// empty segment, or contains a character outside `[A-Za-z0-9_.]`.
pub fn quote_identifier(name: &str) -> Result<String, SqlError> {
    let invalid = || SqlError::InvalidIdentifier {
        identifier: name.to_string(),
    };

    if name.is_empty() {
        return Err(invalid());
    }

    let mut quoted = Vec::new();
    for segment in name.split('.') {
        if segment.is_empty() || !segment.chars().all(is_identifier_char) {
            return Err(invalid());
        }
        quoted.push(format!("[{segment}]"));
    }

    Ok(quoted.join("."))
}

/// Rejects any statement that does not begin with `SELECT`.
///
/// Leading whitespace is ignored and the keyword is matched
/// case-insensitively.
///
/// # Errors
///
/// Returns [`SqlError::RejectedStatement`] for empty or non-`SELECT`
/// statements.
pub fn assert_select_only(sql: &str) -> Result<(), SqlError> {
    let trimmed = sql.trim_start();
    let starts_with_select = trimmed
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("SELECT"));

    if starts_with_select {
        Ok(())
    } else {
        log::debug!("Rejected non-SELECT statement");
        Err(SqlError::RejectedStatement)
    }
}

/// Checks trusted clause text (e.g. a fixed `ORDER BY` list) against the
/// narrow clause allow-list: alphanumerics, `_`, `.`, `,` and whitespace.
///
/// # Errors
///
/// Returns [`SqlError::InvalidClause`] if any other character is present.
pub fn sanitize_clause(text: &str) -> Result<&str, SqlError> {
    if text
        .chars()
        .all(|c| is_identifier_char(c) || c == '.' || c == ',' || c.is_whitespace())
    {
        Ok(text)
    } else {
        Err(SqlError::InvalidClause {
            clause: text.to_string(),
        })
    }
}
