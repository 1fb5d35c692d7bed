//! Filtering, sorting and paging of record lists.
//!
//! Filters are small expressions such as `featured = true && year >= 2020`
//! or `slug = "welcome"`; `&&` binds tighter than `||`. Sort specs are comma
//! separated field names, `-` prefixed for descending order.

use std::cmp::Ordering;

use serde_json::Value;
use trails_common::{Error, Result};

use crate::record::Record;
use crate::schema::CollectionDef;

pub const DEFAULT_PER_PAGE: usize = 30;
pub const MAX_PER_PAGE: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
    NotLike,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: Op,
    pub value: Value,
}

/// Disjunction of conjunctions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    pub any_of: Vec<Vec<Condition>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordQuery {
    pub filter: Option<Filter>,
    pub sort: Vec<SortKey>,
    pub page: usize,
    pub per_page: usize,
}

impl Default for RecordQuery {
    fn default() -> Self {
        Self {
            filter: None,
            sort: Vec::new(),
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

/// One page of query results.
#[derive(Debug, Clone)]
pub struct Page {
    pub page: usize,
    pub per_page: usize,
    pub total_items: usize,
    pub total_pages: usize,
    pub items: Vec<Record>,
}

impl RecordQuery {
    /// Build a query from raw request parameters, checking field names
    /// against `collection`.
    pub fn parse(
        collection: &CollectionDef,
        filter: Option<&str>,
        sort: Option<&str>,
        page: Option<usize>,
        per_page: Option<usize>,
    ) -> Result<Self> {
        let filter = match filter.map(str::trim).filter(|f| !f.is_empty()) {
            Some(expr) => Some(Filter::parse(expr, collection)?),
            None => None,
        };
        let sort = match sort {
            Some(keys) => parse_sort(keys, collection)?,
            None => Vec::new(),
        };
        Ok(Self {
            filter,
            sort,
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
        })
    }

    /// Filter, sort and slice `records`.
    pub fn run(&self, records: Vec<Record>) -> Page {
        let mut matched: Vec<Record> = records
            .into_iter()
            .filter(|r| self.filter.as_ref().is_none_or(|f| f.matches(r)))
            .collect();

        if !self.sort.is_empty() {
            matched.sort_by(|a, b| {
                for key in &self.sort {
                    let ord = compare_values(&a.get(&key.field), &b.get(&key.field));
                    let ord = if key.descending { ord.reverse() } else { ord };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        let total_items = matched.len();
        let total_pages = total_items.div_ceil(self.per_page);
        let items = matched
            .into_iter()
            .skip((self.page - 1).saturating_mul(self.per_page))
            .take(self.per_page)
            .collect();

        Page {
            page: self.page,
            per_page: self.per_page,
            total_items,
            total_pages,
            items,
        }
    }
}

impl Filter {
    pub fn parse(expr: &str, collection: &CollectionDef) -> Result<Self> {
        let tokens = tokenize(expr)?;
        let mut parser = Parser { tokens, pos: 0 };
        let filter = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(bad_filter(&format!("unexpected token at {}", parser.pos)));
        }
        for cond in filter.any_of.iter().flatten() {
            if !collection.has_column(&cond.field) {
                return Err(bad_filter(&format!("unknown field `{}`", cond.field)));
            }
        }
        Ok(filter)
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.any_of
            .iter()
            .any(|all| all.iter().all(|c| c.matches(record)))
    }

    /// Both filters must hold.
    pub fn and(self, other: Filter) -> Filter {
        let mut any_of = Vec::new();
        for left in &self.any_of {
            for right in &other.any_of {
                any_of.push(left.iter().chain(right).cloned().collect());
            }
        }
        Filter { any_of }
    }
}

impl Condition {
    fn matches(&self, record: &Record) -> bool {
        let actual = record.get(&self.field);
        match self.op {
            Op::Eq => loosely_equal(&actual, &self.value),
            Op::Ne => !loosely_equal(&actual, &self.value),
            Op::Gt => comparable(&actual, &self.value) == Some(Ordering::Greater),
            Op::Ge => matches!(
                comparable(&actual, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Op::Lt => comparable(&actual, &self.value) == Some(Ordering::Less),
            Op::Le => matches!(
                comparable(&actual, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Op::Like => contains(&actual, &self.value),
            Op::NotLike => !contains(&actual, &self.value),
        }
    }
}

fn bad_filter(msg: &str) -> Error {
    Error::Constraint(format!("invalid filter: {msg}"))
}

fn parse_sort(keys: &str, collection: &CollectionDef) -> Result<Vec<SortKey>> {
    let mut sort = Vec::new();
    for part in keys.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (descending, field) = match part.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, part.strip_prefix('+').unwrap_or(part)),
        };
        if !collection.has_column(field) {
            return Err(Error::Constraint(format!(
                "invalid sort: unknown field `{field}`"
            )));
        }
        sort.push(SortKey {
            field: field.to_string(),
            descending,
        });
    }
    Ok(sort)
}

/// Null and empty values equal each other, as do numbers of any representation.
fn loosely_equal(a: &Value, b: &Value) -> bool {
    let blank = |v: &Value| v.is_null() || v.as_str() == Some("");
    match (a, b) {
        (x, y) if blank(x) && blank(y) => true,
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(items), single) if !single.is_array() => items.contains(single),
        _ => a == b,
    }
}

fn comparable(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::String(h), Value::String(n)) => h.to_lowercase().contains(&n.to_lowercase()),
        (Value::Array(items), n) => items.contains(n),
        _ => false,
    }
}

/// Total order for sorting: nulls first, then bools, numbers, strings.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    comparable(a, b).unwrap_or_else(|| rank(a).cmp(&rank(b)))
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Literal(Value),
    Op(Op),
    And,
    Or,
}

fn tokenize(expr: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        let next = chars.get(i + 1).copied();
        match c {
            '&' if next == Some('&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if next == Some('|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Op(Op::Ne));
                i += 2;
            }
            '!' if next == Some('~') => {
                tokens.push(Token::Op(Op::NotLike));
                i += 2;
            }
            '>' | '<' => {
                let or_equal = next == Some('=');
                let op = match (c, or_equal) {
                    ('>', true) => Op::Ge,
                    ('>', false) => Op::Gt,
                    ('<', true) => Op::Le,
                    _ => Op::Lt,
                };
                tokens.push(Token::Op(op));
                i += if or_equal { 2 } else { 1 };
            }
            '=' => {
                tokens.push(Token::Op(Op::Eq));
                i += 1;
            }
            '~' => {
                tokens.push(Token::Op(Op::Like));
                i += 1;
            }
            '"' | '\'' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(bad_filter("unterminated string")),
                        Some('\\') => {
                            if let Some(escaped) = chars.get(i + 1) {
                                s.push(*escaped);
                            }
                            i += 2;
                        }
                        Some(ch) if *ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            s.push(*ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Literal(Value::String(s)));
            }
            c if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = if text.contains('.') {
                    text.parse::<f64>().ok().map(Value::from)
                } else {
                    text.parse::<i64>().ok().map(Value::from)
                };
                tokens.push(Token::Literal(
                    number.ok_or_else(|| bad_filter(&format!("bad number `{text}`")))?,
                ));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "true" => Token::Literal(Value::Bool(true)),
                    "false" => Token::Literal(Value::Bool(false)),
                    "null" => Token::Literal(Value::Null),
                    _ => Token::Ident(word),
                });
            }
            other => return Err(bad_filter(&format!("unexpected character `{other}`"))),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn parse_or(&mut self) -> Result<Filter> {
        let mut any_of = vec![self.parse_and()?];
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            any_of.push(self.parse_and()?);
        }
        Ok(Filter { any_of })
    }

    fn parse_and(&mut self) -> Result<Vec<Condition>> {
        let mut all = vec![self.parse_condition()?];
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            all.push(self.parse_condition()?);
        }
        Ok(all)
    }

    fn parse_condition(&mut self) -> Result<Condition> {
        let Some(Token::Ident(field)) = self.next() else {
            return Err(bad_filter("expected a field name"));
        };
        let Some(Token::Op(op)) = self.next() else {
            return Err(bad_filter(&format!("expected an operator after `{field}`")));
        };
        let Some(Token::Literal(value)) = self.next() else {
            return Err(bad_filter(&format!("expected a value after `{field}`")));
        };
        Ok(Condition { field, op, value })
    }
}
