//! `SELECT` statement builder for the SQL-Server dialect.

use std::fmt::Write as _;

use crate::SqlError;
use crate::filter::Filter;
use crate::guard::quote_identifier;

/// Hard ceiling on rows requested from a single source.
pub const MAX_ROWS: u32 = 1000;

/// Row limit used when the caller does not supply one.
pub const DEFAULT_LIMIT: u32 = 100;

/// Clamps a requested row limit: absent or zero becomes [`DEFAULT_LIMIT`],
/// anything above [`MAX_ROWS`] becomes [`MAX_ROWS`].
#[must_use]
pub fn clamp_limit(limit: Option<u32>) -> u32 {
    match limit {
        None | Some(0) => DEFAULT_LIMIT,
        Some(n) => n.min(MAX_ROWS),
    }
}

/// Sort direction for an `ORDER BY` term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    /// Ascending
    #[default]
    Asc,
    /// Descending
    Desc,
}

impl SortDirection {
    const fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// One `ORDER BY` term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// Column name.
    pub column: String,
    /// Direction.
    pub direction: SortDirection,
}

impl OrderBy {
    /// Ascending order on `column`.
    #[must_use]
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Asc,
        }
    }

    /// Descending order on `column`.
    #[must_use]
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Desc,
        }
    }

    /// Parses a comma-separated list such as `event_time DESC, id`.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::InvalidOrderBy`] if a term has more than a
    /// column and a direction, or the direction is not `ASC`/`DESC`.
    pub fn parse_list(text: &str) -> Result<Vec<Self>, SqlError> {
        let invalid = || SqlError::InvalidOrderBy {
            clause: text.to_string(),
        };

        text.split(',')
            .map(|term| {
                let mut words = term.split_whitespace();
                let column = words.next().ok_or_else(invalid)?;
                let direction = match words.next() {
                    None => SortDirection::Asc,
                    Some(word) if word.eq_ignore_ascii_case("ASC") => SortDirection::Asc,
                    Some(word) if word.eq_ignore_ascii_case("DESC") => SortDirection::Desc,
                    Some(_) => return Err(invalid()),
                };
                if words.next().is_some() {
                    return Err(invalid());
                }
                Ok(Self {
                    column: column.to_string(),
                    direction,
                })
            })
            .collect()
    }

    fn to_sql(&self) -> Result<String, SqlError> {
        Ok(format!(
            "{} {}",
            quote_identifier(&self.column)?,
            self.direction.as_sql()
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowWindow {
    Top(u32),
    Page { offset: u64, fetch: u32 },
}

/// Builder for a single-table `SELECT`.
///
/// Every table and column name is validated and bracket-quoted when the
/// statement is rendered, so a builder can be assembled from caller input
/// without pre-checking.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    table: String,
    columns: Vec<String>,
    filter: Option<Filter>,
    order_by: Vec<OrderBy>,
    window: RowWindow,
}

impl SelectQuery {
    /// Starts a `SELECT * FROM table` with the default row limit.
    #[must_use]
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            filter: None,
            order_by: Vec::new(),
            window: RowWindow::Top(DEFAULT_LIMIT),
        }
    }

    /// Restricts the projection. An empty list selects `*`.
    #[must_use]
    pub fn columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a predicate, AND-ed with any predicate already present.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => Filter::and([existing, filter]),
            None => filter,
        });
        self
    }

    /// Adds a predicate if one is given.
    #[must_use]
    pub fn filter_opt(self, filter: Option<Filter>) -> Self {
        match filter {
            Some(filter) => self.filter(filter),
            None => self,
        }
    }

    /// Appends an `ORDER BY` term.
    #[must_use]
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    /// Limits the result with `TOP n`, clamped via [`clamp_limit`].
    #[must_use]
    pub fn top(mut self, limit: Option<u32>) -> Self {
        self.window = RowWindow::Top(clamp_limit(limit));
        self
    }

    /// Requests a page with `OFFSET .. ROWS FETCH NEXT .. ROWS ONLY`. The
    /// fetch size is clamped via [`clamp_limit`].
    #[must_use]
    pub fn page(mut self, offset: u64, fetch: u32) -> Self {
        self.window = RowWindow::Page {
            offset,
            fetch: clamp_limit(Some(fetch)),
        };
        self
    }

    /// Name of the table this query reads.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Renders the statement.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::InvalidIdentifier`] for any bad table or column
    /// name, or [`SqlError::InvalidFilter`] if the predicate fails to render.
    pub fn to_sql(&self) -> Result<String, SqlError> {
        let table = quote_identifier(&self.table)?;
        let projection = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns
                .iter()
                .map(|c| quote_identifier(c))
                .collect::<Result<Vec<_>, _>>()?
                .join(", ")
        };

        let mut sql = match self.window {
            RowWindow::Top(n) => format!("SELECT TOP {n} {projection} FROM {table}"),
            RowWindow::Page { .. } => format!("SELECT {projection} FROM {table}"),
        };

        if let Some(filter) = &self.filter {
            write!(sql, " WHERE {}", filter.to_sql()?).ok();
        }

        let order = self
            .order_by
            .iter()
            .map(OrderBy::to_sql)
            .collect::<Result<Vec<_>, _>>()?;

        match self.window {
            RowWindow::Top(_) => {
                if !order.is_empty() {
                    write!(sql, " ORDER BY {}", order.join(", ")).ok();
                }
            }
            RowWindow::Page { offset, fetch } => {
                let order = if order.is_empty() {
                    "(SELECT NULL)".to_string()
                } else {
                    order.join(", ")
                };
                write!(
                    sql,
                    " ORDER BY {order} OFFSET {offset} ROWS FETCH NEXT {fetch} ROWS ONLY"
                )
                .ok();
            }
        }

        log::trace!("Built query: {sql}");

        Ok(sql)
    }
}
