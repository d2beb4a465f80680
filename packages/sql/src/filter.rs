//! Structured `WHERE` predicates.
//!
//! A [`Filter`] is rendered with every column name passed through
//! [`quote_identifier`] and every text literal single-quote escaped, so a
//! rendered filter can never carry a second statement or an unquoted
//! identifier. Free-form filter text from callers is accepted only through
//! [`Filter::parse`], which understands a deliberately small grammar:
//!
//! ```text
//! expr    := and ( OR and )*
//! and     := primary ( AND primary )*
//! primary := '(' expr ')'
//!          | column op literal
//!          | column [NOT] LIKE 'text'
//!          | column IS [NOT] NULL
//!          | column IN ( literal, ... )
//! op      := = | != | <> | < | <= | > | >=
//! ```

use crate::SqlError;
use crate::guard::quote_identifier;

/// Deepest parenthesis nesting [`Filter::parse`] accepts.
pub const MAX_FILTER_DEPTH: usize = 64;

/// A literal value on the right-hand side of a predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Text, rendered single-quoted with embedded quotes doubled.
    Text(String),
    /// Whole number.
    Integer(i64),
    /// Floating-point number. Must be finite to render.
    Float(f64),
}

impl Literal {
    fn to_sql(&self) -> Result<String, SqlError> {
        match self {
            Self::Text(s) => Ok(format!("'{}'", s.replace('\'', "''"))),
            Self::Integer(n) => Ok(n.to_string()),
            Self::Float(f) if f.is_finite() => Ok(f.to_string()),
            Self::Float(f) => Err(SqlError::InvalidFilter {
                message: format!("non-finite number {f}"),
            }),
        }
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<>` (also parsed from `!=`)
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
}

impl CompareOp {
    /// The SQL spelling of this operator.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
        }
    }
}

/// A `WHERE` predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `column op value`
    Compare {
        /// Column name (validated when rendered).
        column: String,
        /// Operator.
        op: CompareOp,
        /// Right-hand side.
        value: Literal,
    },
    /// `column [NOT] LIKE 'pattern'`
    Like {
        /// Column name.
        column: String,
        /// `LIKE` pattern, wildcards included.
        pattern: String,
        /// Whether this is `NOT LIKE`.
        negated: bool,
    },
    /// `column IN (values...)`
    In {
        /// Column name.
        column: String,
        /// Candidate values. An empty list matches nothing.
        values: Vec<Literal>,
    },
    /// `column IS [NOT] NULL`
    IsNull {
        /// Column name.
        column: String,
        /// Whether this is `IS NOT NULL`.
        negated: bool,
    },
    /// Conjunction. An empty conjunction matches everything.
    And(Vec<Self>),
    /// Disjunction. An empty disjunction matches nothing.
    Or(Vec<Self>),
}

/// Escapes SQL-Server `LIKE` wildcards so `token` matches literally.
#[must_use]
pub fn escape_like(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    for c in token.chars() {
        match c {
            '[' => out.push_str("[[]"),
            '%' => out.push_str("[%]"),
            '_' => out.push_str("[_]"),
            _ => out.push(c),
        }
    }
    out
}

impl Filter {
    /// `column op value`.
    #[must_use]
    pub fn compare(column: impl Into<String>, op: CompareOp, value: impl Into<Literal>) -> Self {
        Self::Compare {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    /// `column = value`.
    #[must_use]
    pub fn equals(column: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::compare(column, CompareOp::Eq, value)
    }

    /// `column LIKE '%token%'` with wildcards inside `token` escaped.
    #[must_use]
    pub fn contains(column: impl Into<String>, token: &str) -> Self {
        Self::Like {
            column: column.into(),
            pattern: format!("%{}%", escape_like(token)),
            negated: false,
        }
    }

    /// `column IN (values...)`.
    #[must_use]
    pub fn is_in<L: Into<Literal>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = L>,
    ) -> Self {
        Self::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Conjunction of `filters`, flattening nested conjunctions. A single
    /// filter is returned as-is.
    #[must_use]
    pub fn and(filters: impl IntoIterator<Item = Self>) -> Self {
        let mut parts = Vec::new();
        for filter in filters {
            match filter {
                Self::And(inner) => parts.extend(inner),
                other => parts.push(other),
            }
        }
        if parts.len() == 1 {
            parts.remove(0)
        } else {
            Self::And(parts)
        }
    }

    /// Disjunction of `filters`, flattening nested disjunctions. A single
    /// filter is returned as-is.
    #[must_use]
    pub fn or(filters: impl IntoIterator<Item = Self>) -> Self {
        let mut parts = Vec::new();
        for filter in filters {
            match filter {
                Self::Or(inner) => parts.extend(inner),
                other => parts.push(other),
            }
        }
        if parts.len() == 1 {
            parts.remove(0)
        } else {
            Self::Or(parts)
        }
    }

    /// Renders the predicate as SQL text.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::InvalidIdentifier`] for a bad column name or
    /// [`SqlError::InvalidFilter`] for a non-finite number.
    pub fn to_sql(&self) -> Result<String, SqlError> {
        match self {
            Self::Compare { column, op, value } => Ok(format!(
                "{} {} {}",
                quote_identifier(column)?,
                op.as_sql(),
                value.to_sql()?
            )),
            Self::Like {
                column,
                pattern,
                negated,
            } => Ok(format!(
                "{} {}LIKE {}",
                quote_identifier(column)?,
                if *negated { "NOT " } else { "" },
                Literal::Text(pattern.clone()).to_sql()?
            )),
            Self::In { column, values } => {
                let column = quote_identifier(column)?;
                if values.is_empty() {
                    return Ok("1 = 0".to_string());
                }
                let rendered = values
                    .iter()
                    .map(Literal::to_sql)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!("{column} IN ({})", rendered.join(", ")))
            }
            Self::IsNull { column, negated } => Ok(format!(
                "{} IS {}NULL",
                quote_identifier(column)?,
                if *negated { "NOT " } else { "" }
            )),
            Self::And(parts) => Self::join(parts, " AND ", "1 = 1"),
            Self::Or(parts) => Self::join(parts, " OR ", "1 = 0"),
        }
    }

    fn join(parts: &[Self], separator: &str, empty: &str) -> Result<String, SqlError> {
        if parts.is_empty() {
            return Ok(empty.to_string());
        }
        let rendered = parts
            .iter()
            .map(|part| {
                let sql = part.to_sql()?;
                Ok(match part {
                    Self::And(inner) | Self::Or(inner) if inner.len() > 1 => format!("({sql})"),
                    _ => sql,
                })
            })
            .collect::<Result<Vec<_>, SqlError>>()?;
        Ok(rendered.join(separator))
    }

    /// Parses a free-form filter fragment into a predicate tree.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::InvalidFilter`] if the text does not match the
    /// grammar in the module docs, or [`SqlError::FilterTooDeep`] if groups
    /// nest deeper than [`MAX_FILTER_DEPTH`].
    pub fn parse(text: &str) -> Result<Self, SqlError> {
        let tokens = tokenize(text)?;
        if tokens.is_empty() {
            return Err(invalid("empty filter"));
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let filter = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(invalid(format!(
                "unexpected {:?} after end of expression",
                parser.tokens[parser.pos]
            )));
        }
        Ok(filter)
    }
}

fn invalid(message: impl Into<String>) -> SqlError {
    SqlError::InvalidFilter {
        message: message.into(),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Text(String),
    Number(String),
    Op(CompareOp),
    LParen,
    RParen,
    Comma,
    And,
    Or,
    Not,
    Like,
    Is,
    Null,
    In,
}

#[allow(clippy::too_many_lines)]
fn tokenize(text: &str) -> Result<Vec<Token>, SqlError> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            _ if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Op(CompareOp::Eq));
                i += 1;
            }
            '!' => {
                if chars.get(i + 1) != Some(&'=') {
                    return Err(invalid("expected '=' after '!'"));
                }
                tokens.push(Token::Op(CompareOp::NotEq));
                i += 2;
            }
            '<' => match chars.get(i + 1) {
                Some('=') => {
                    tokens.push(Token::Op(CompareOp::LtEq));
                    i += 2;
                }
                Some('>') => {
                    tokens.push(Token::Op(CompareOp::NotEq));
                    i += 2;
                }
                _ => {
                    tokens.push(Token::Op(CompareOp::Lt));
                    i += 1;
                }
            },
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op(CompareOp::GtEq));
                    i += 2;
                } else {
                    tokens.push(Token::Op(CompareOp::Gt));
                    i += 1;
                }
            }
            '\'' => {
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(invalid("unterminated string literal")),
                        Some('\'') if chars.get(i + 1) == Some(&'\'') => {
                            value.push('\'');
                            i += 2;
                        }
                        Some('\'') => {
                            i += 1;
                            break;
                        }
                        Some(&other) => {
                            value.push(other);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Text(value));
            }
            '[' => {
                let start = i + 1;
                let Some(len) = chars[start..].iter().position(|&ch| ch == ']') else {
                    return Err(invalid("unterminated bracketed identifier"));
                };
                let mut name: String = chars[start..start + len].iter().collect();
                i = start + len + 1;
                // Allow `[schema].[column]` and `[schema].column`.
                while chars.get(i) == Some(&'.') {
                    name.push('.');
                    i += 1;
                    let (segment, next) = read_segment(&chars, i)?;
                    name.push_str(&segment);
                    i = next;
                }
                tokens.push(Token::Ident(name));
            }
            '-' | '0'..='9' => {
                let start = i;
                if c == '-' {
                    i += 1;
                    if !chars.get(i).is_some_and(char::is_ascii_digit) {
                        return Err(invalid("expected digit after '-'"));
                    }
                }
                while chars
                    .get(i)
                    .is_some_and(|ch| ch.is_ascii_digit() || *ch == '.')
                {
                    i += 1;
                }
                tokens.push(Token::Number(chars[start..i].iter().collect()));
            }
            _ if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while chars
                    .get(i)
                    .is_some_and(|ch| ch.is_ascii_alphanumeric() || *ch == '_' || *ch == '.')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.to_ascii_uppercase().as_str() {
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    "NOT" => Token::Not,
                    "LIKE" => Token::Like,
                    "IS" => Token::Is,
                    "NULL" => Token::Null,
                    "IN" => Token::In,
                    _ => Token::Ident(word),
                });
            }
            other => return Err(invalid(format!("unexpected character {other:?}"))),
        }
    }

    Ok(tokens)
}

fn read_segment(chars: &[char], start: usize) -> Result<(String, usize), SqlError> {
    if chars.get(start) == Some(&'[') {
        let Some(len) = chars[start + 1..].iter().position(|&ch| ch == ']') else {
            return Err(invalid("unterminated bracketed identifier"));
        };
        let segment = chars[start + 1..start + 1 + len].iter().collect();
        return Ok((segment, start + len + 2));
    }
    let mut end = start;
    while chars
        .get(end)
        .is_some_and(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
    {
        end += 1;
    }
    Ok((chars[start..end].iter().collect(), end))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token) -> Result<(), SqlError> {
        match self.next() {
            Some(ref token) if token == expected => Ok(()),
            other => Err(invalid(format!("expected {expected:?}, found {other:?}"))),
        }
    }

    fn parse_or(&mut self) -> Result<Filter, SqlError> {
        let mut parts = vec![self.parse_and()?];
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            parts.push(self.parse_and()?);
        }
        Ok(Filter::or(parts))
    }

    fn parse_and(&mut self) -> Result<Filter, SqlError> {
        let mut parts = vec![self.parse_primary()?];
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            parts.push(self.parse_primary()?);
        }
        Ok(Filter::and(parts))
    }

    fn parse_primary(&mut self) -> Result<Filter, SqlError> {
        match self.next() {
            Some(Token::LParen) => {
                if self.depth == MAX_FILTER_DEPTH {
                    return Err(SqlError::FilterTooDeep {
                        limit: MAX_FILTER_DEPTH,
                    });
                }
                self.depth += 1;
                let inner = self.parse_or()?;
                self.expect(&Token::RParen)?;
                self.depth -= 1;
                Ok(inner)
            }
            Some(Token::Ident(column)) => self.parse_predicate(column),
            other => Err(invalid(format!("expected column name, found {other:?}"))),
        }
    }

    fn parse_predicate(&mut self, column: String) -> Result<Filter, SqlError> {
        match self.next() {
            Some(Token::Op(op)) => Ok(Filter::Compare {
                column,
                op,
                value: self.parse_literal()?,
            }),
            Some(Token::Like) => Ok(Filter::Like {
                column,
                pattern: self.parse_text()?,
                negated: false,
            }),
            Some(Token::Not) => {
                self.expect(&Token::Like)?;
                Ok(Filter::Like {
                    column,
                    pattern: self.parse_text()?,
                    negated: true,
                })
            }
            Some(Token::Is) => {
                let negated = self.peek() == Some(&Token::Not);
                if negated {
                    self.pos += 1;
                }
                self.expect(&Token::Null)?;
                Ok(Filter::IsNull { column, negated })
            }
            Some(Token::In) => {
                self.expect(&Token::LParen)?;
                let mut values = vec![self.parse_literal()?];
                while self.peek() == Some(&Token::Comma) {
                    self.pos += 1;
                    values.push(self.parse_literal()?);
                }
                self.expect(&Token::RParen)?;
                Ok(Filter::In { column, values })
            }
            other => Err(invalid(format!(
                "expected operator after {column:?}, found {other:?}"
            ))),
        }
    }

    fn parse_text(&mut self) -> Result<String, SqlError> {
        match self.next() {
            Some(Token::Text(s)) => Ok(s),
            other => Err(invalid(format!("expected string literal, found {other:?}"))),
        }
    }

    fn parse_literal(&mut self) -> Result<Literal, SqlError> {
        match self.next() {
            Some(Token::Text(s)) => Ok(Literal::Text(s)),
            Some(Token::Number(n)) => {
                if n.contains('.') {
                    n.parse::<f64>()
                        .map(Literal::Float)
                        .map_err(|_| invalid(format!("invalid number {n:?}")))
                } else {
                    n.parse::<i64>()
                        .map(Literal::Integer)
                        .map_err(|_| invalid(format!("invalid number {n:?}")))
                }
            }
            other => Err(invalid(format!("expected literal, found {other:?}"))),
        }
    }
}
