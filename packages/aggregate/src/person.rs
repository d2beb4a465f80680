//! Person-name queries and the policy that turns them into predicates.
//!
//! Matching people across tables is best-effort: names are stored split or
//! whole, with or without middle names, in whatever case the clerk typed.
//! [`NameMatchPolicy`] keeps the matching rule swappable.

use blotter_source::PersonMapping;
use blotter_sql::Filter;

/// A name search term split into first/last tokens.
///
/// `"Last, First"` splits on the comma; `"First Middle Last"` takes the
/// first and last words. A lone word is stored as `last` and matched
/// against either name column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonQuery {
    /// First-name token.
    pub first: Option<String>,
    /// Last-name token, or the only token.
    pub last: Option<String>,
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() { None } else { Some(s.to_string()) }
}

impl PersonQuery {
    /// Splits free text into name tokens.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let text = text.trim();

        if let Some((last, first)) = text.split_once(',') {
            return Self {
                first: first.split_whitespace().next().and_then(non_empty),
                last: non_empty(last),
            };
        }

        let words: Vec<&str> = text.split_whitespace().collect();
        match words.as_slice() {
            [] => Self::default(),
            [only] => Self {
                first: None,
                last: non_empty(only),
            },
            [first, .., last] => Self {
                first: non_empty(first),
                last: non_empty(last),
            },
        }
    }

    /// Creates a query from already-split names.
    #[must_use]
    pub fn from_parts(first: &str, last: &str) -> Self {
        Self {
            first: non_empty(first),
            last: non_empty(last),
        }
    }

    /// Whether there is nothing to search for.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.first.is_none() && self.last.is_none()
    }

    /// The predicate selecting this person in a table described by
    /// `person`, or `None` for an empty query.
    #[must_use]
    pub fn filter_for(&self, person: &PersonMapping, policy: &dyn NameMatchPolicy) -> Option<Filter> {
        if self.is_empty() {
            return None;
        }

        if let (Some(first_col), Some(last_col)) = (&person.first_name, &person.last_name) {
            return Some(match (&self.first, &self.last) {
                (Some(first), Some(last)) => Filter::and([
                    policy.predicate(first_col, first),
                    policy.predicate(last_col, last),
                ]),
                (Some(token), None) | (None, Some(token)) => Filter::or([
                    policy.predicate(first_col, token),
                    policy.predicate(last_col, token),
                ]),
                (None, None) => return None,
            });
        }

        person
            .full_name
            .as_deref()
            .map(|column| policy.full_name_predicate(column, self))
    }
}

/// How a name token is compared with a column.
pub trait NameMatchPolicy: Send + Sync + std::fmt::Debug {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Predicate matching `token` against a single-name column.
    fn predicate(&self, column: &str, token: &str) -> Filter;

    /// Predicate matching `query` against a full-name column. Defaults to
    /// every token matching.
    fn full_name_predicate(&self, column: &str, query: &PersonQuery) -> Filter {
        Filter::and(
            query
                .first
                .iter()
                .chain(query.last.iter())
                .map(|token| self.predicate(column, token)),
        )
    }
}

/// `LIKE '%token%'` on each name column.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubstringMatch;

impl NameMatchPolicy for SubstringMatch {
    fn name(&self) -> &'static str {
        "substring"
    }

    fn predicate(&self, column: &str, token: &str) -> Filter {
        Filter::contains(column, token)
    }
}

/// Equality on each name column. Full names match `First Last` or
/// `Last, First`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactMatch;

impl NameMatchPolicy for ExactMatch {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn predicate(&self, column: &str, token: &str) -> Filter {
        Filter::equals(column, token)
    }

    fn full_name_predicate(&self, column: &str, query: &PersonQuery) -> Filter {
        match (&query.first, &query.last) {
            (Some(first), Some(last)) => Filter::or([
                Filter::equals(column, format!("{first} {last}")),
                Filter::equals(column, format!("{last}, {first}")),
            ]),
            (Some(token), None) | (None, Some(token)) => Filter::equals(column, token.as_str()),
            (None, None) => Filter::and([]),
        }
    }
}

#[cfg(test)]
mod tests {
    use blotter_source::source_by_id;

    use super::*;

    #[test]
    fn parses_last_comma_first() {
        assert_eq!(
            PersonQuery::parse("Smith, John Q"),
            PersonQuery {
                first: Some("John".into()),
                last: Some("Smith".into())
            }
        );
    }

    #[test]
    fn parses_first_middle_last() {
        assert_eq!(
            PersonQuery::parse("  John  Quincy Smith "),
            PersonQuery::from_parts("John", "Smith")
        );
    }

    #[test]
    fn single_and_empty_queries() {
        assert_eq!(
            PersonQuery::parse("Smith"),
            PersonQuery {
                first: None,
                last: Some("Smith".into())
            }
        );
        assert!(PersonQuery::parse("   ").is_empty());
        assert_eq!(PersonQuery::parse("Smith,").first, None);
    }

    #[test]
    fn split_name_columns_with_substring_policy() {
        let person = source_by_id("arrests").unwrap().person.unwrap();
        let filter = PersonQuery::parse("John Smith")
            .filter_for(&person, &SubstringMatch)
            .unwrap();
        assert_eq!(
            filter.to_sql().unwrap(),
            "[firstname] LIKE '%John%' AND [lastname] LIKE '%Smith%'"
        );
    }

    #[test]
    fn single_token_matches_either_column() {
        let person = source_by_id("sex_offenders").unwrap().person.unwrap();
        let filter = PersonQuery::parse("Smith")
            .filter_for(&person, &SubstringMatch)
            .unwrap();
        assert_eq!(
            filter.to_sql().unwrap(),
            "[first_name] LIKE '%Smith%' OR [last_name] LIKE '%Smith%'"
        );
    }

    #[test]
    fn full_name_column_exact_and_partial() {
        let person = source_by_id("probation").unwrap().person.unwrap();
        let query = PersonQuery::from_parts("John", "Smith");

        assert_eq!(
            query.filter_for(&person, &ExactMatch).unwrap().to_sql().unwrap(),
            "[Name] = 'John Smith' OR [Name] = 'Smith, John'"
        );
        assert_eq!(
            query
                .filter_for(&person, &SubstringMatch)
                .unwrap()
                .to_sql()
                .unwrap(),
            "[Name] LIKE '%John%' AND [Name] LIKE '%Smith%'"
        );
    }

    #[test]
    fn wildcards_in_names_are_literal() {
        let person = source_by_id("arrests").unwrap().person.unwrap();
        let filter = PersonQuery::parse("O'Br%en")
            .filter_for(&person, &SubstringMatch)
            .unwrap();
        assert_eq!(
            filter.to_sql().unwrap(),
            "[firstname] LIKE '%O''Br[%]en%' OR [lastname] LIKE '%O''Br[%]en%'"
        );
    }

    #[test]
    fn empty_query_has_no_filter() {
        let person = source_by_id("arrests").unwrap().person.unwrap();
        assert!(PersonQuery::default().filter_for(&person, &SubstringMatch).is_none());
    }
}
