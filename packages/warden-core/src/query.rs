//! Data-access query descriptors.
//!
//! A [`QueryDescriptor`] names the tables a query touches and accumulates
//! row-level predicates. It carries nothing else about the query shape: the
//! data-access layer owns projection, ordering and paging, and only consults
//! the descriptor to build its WHERE clause.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::types::TenantId;

const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$";

// Compiled on first use; `pattern_compiles` below covers the literal.
static IDENTIFIER: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(IDENTIFIER_PATTERN).ok());

/// Returns true for plain or schema-qualified SQL identifiers (`orders`, `app.orders`).
#[must_use]
pub fn is_identifier(s: &str) -> bool {
    IDENTIFIER.as_ref().is_some_and(|re| re.is_match(s))
}

fn check_identifier(s: &str) -> Result<(), QueryError> {
    if is_identifier(s) {
        Ok(())
    } else {
        Err(QueryError::InvalidIdentifier(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Values and operators
// ---------------------------------------------------------------------------

/// Scalar value bound into a predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<TenantId> for Value {
    fn from(id: TenantId) -> Self {
        Value::Int(id.0)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// Renders the value as a SQL literal. Meant for audit output, not execution.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => f.write_str(if *b { "TRUE" } else { "FALSE" }),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
        }
    }
}

/// Comparison operators supported in predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Neq => "<>",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
        }
    }
}

// ---------------------------------------------------------------------------
// Tables and predicates
// ---------------------------------------------------------------------------

/// A table targeted by a query, with an optional alias.
///
/// Deserialization goes through the same identifier checks as the
/// constructors, so every `TableRef` holds a valid name and alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTableRef")]
pub struct TableRef {
    name: String,
    alias: Option<String>,
}

#[derive(Deserialize)]
struct RawTableRef {
    name: String,
    #[serde(default)]
    alias: Option<String>,
}

impl TryFrom<RawTableRef> for TableRef {
    type Error = QueryError;

    fn try_from(raw: RawTableRef) -> Result<Self, Self::Error> {
        let table = TableRef::new(raw.name)?;
        match raw.alias {
            Some(alias) => table.with_alias(alias),
            None => Ok(table),
        }
    }
}

impl TableRef {
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidIdentifier`] if `name` is not an identifier.
    pub fn new(name: impl Into<String>) -> Result<Self, QueryError> {
        let name = name.into();
        check_identifier(&name)?;
        Ok(Self { name, alias: None })
    }

    /// # Errors
    ///
    /// Returns [`QueryError::InvalidIdentifier`] if `alias` is not an identifier.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Result<Self, QueryError> {
        let alias = alias.into();
        check_identifier(&alias)?;
        self.alias = Some(alias);
        Ok(self)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Name used to qualify columns of this table: the alias if set, else the name.
    #[must_use]
    pub fn qualifier(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// A single `column <op> value` condition, optionally qualified by a table.
///
/// Column and qualifier are rendered into SQL text, so both are validated on
/// every construction path, deserialization included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPredicate")]
pub struct Predicate {
    qualifier: Option<String>,
    column: String,
    op: CompareOp,
    value: Value,
}

#[derive(Deserialize)]
struct RawPredicate {
    #[serde(default)]
    qualifier: Option<String>,
    column: String,
    op: CompareOp,
    value: Value,
}

impl TryFrom<RawPredicate> for Predicate {
    type Error = QueryError;

    fn try_from(raw: RawPredicate) -> Result<Self, Self::Error> {
        let predicate = Predicate::new(raw.column, raw.op, raw.value)?;
        match raw.qualifier {
            Some(qualifier) => predicate.qualified(qualifier),
            None => Ok(predicate),
        }
    }
}

impl Predicate {
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidIdentifier`] if `column` is not an identifier.
    pub fn new(
        column: impl Into<String>,
        op: CompareOp,
        value: impl Into<Value>,
    ) -> Result<Self, QueryError> {
        let column = column.into();
        check_identifier(&column)?;
        Ok(Self {
            qualifier: None,
            column,
            op,
            value: value.into(),
        })
    }

    /// Shorthand for an equality predicate.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidIdentifier`] if `column` is not an identifier.
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Result<Self, QueryError> {
        Self::new(column, CompareOp::Eq, value)
    }

    /// # Errors
    ///
    /// Returns [`QueryError::InvalidIdentifier`] if `qualifier` is not an identifier.
    pub fn qualified(mut self, qualifier: impl Into<String>) -> Result<Self, QueryError> {
        let qualifier = qualifier.into();
        check_identifier(&qualifier)?;
        self.qualifier = Some(qualifier);
        Ok(self)
    }

    #[must_use]
    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    #[must_use]
    pub fn column(&self) -> &str {
        &self.column
    }

    #[must_use]
    pub fn op(&self) -> CompareOp {
        self.op
    }

    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    fn column_sql(&self) -> String {
        match &self.qualifier {
            Some(q) => format!("{q}.{}", self.column),
            None => self.column.clone(),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.column_sql(), self.op.as_sql(), self.value)
    }
}

// ---------------------------------------------------------------------------
// QueryDescriptor
// ---------------------------------------------------------------------------

/// Target tables of an outgoing query plus its accumulated predicates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    tables: Vec<TableRef>,
    predicates: Vec<Predicate>,
}

impl QueryDescriptor {
    /// Creates a descriptor with no tables and no predicates.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a single-table descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidIdentifier`] if `table` is not an identifier.
    pub fn from_table(table: impl Into<String>) -> Result<Self, QueryError> {
        Ok(Self::new().with_table(TableRef::new(table)?))
    }

    #[must_use]
    pub fn with_table(mut self, table: TableRef) -> Self {
        self.tables.push(table);
        self
    }

    #[must_use]
    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    #[must_use]
    pub fn tables(&self) -> &[TableRef] {
        &self.tables
    }

    #[must_use]
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn push_predicate(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }

    /// Removes and returns every predicate matching `f`, preserving order of the rest.
    pub fn take_predicates(&mut self, mut f: impl FnMut(&Predicate) -> bool) -> Vec<Predicate> {
        let (taken, kept) = std::mem::take(&mut self.predicates)
            .into_iter()
            .partition(|p| f(p));
        self.predicates = kept;
        taken
    }

    /// Builds a parameterised WHERE clause with placeholders numbered from
    /// `first_param` (`$1`, `$2`, ...). An empty predicate list yields `1=1`.
    #[must_use]
    pub fn where_clause(&self, first_param: usize) -> (String, Vec<Value>) {
        if self.predicates.is_empty() {
            return ("1=1".to_string(), Vec::new());
        }

        let mut params = Vec::with_capacity(self.predicates.len());
        let conditions: Vec<String> = self
            .predicates
            .iter()
            .enumerate()
            .map(|(i, p)| {
                params.push(p.value.clone());
                format!("{} {} ${}", p.column_sql(), p.op.as_sql(), first_param + i)
            })
            .collect();

        (conditions.join(" AND "), params)
    }

    /// WHERE clause with values inlined as literals, for logs and the CLI.
    #[must_use]
    pub fn literal_where(&self) -> String {
        if self.predicates.is_empty() {
            return "1=1".to_string();
        }
        self.predicates
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}
