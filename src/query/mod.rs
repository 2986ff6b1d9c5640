//! Result filters
//!
//! Results are selected with a small boolean language over a fixed set of
//! compound, user and routine attributes:
//!
//! ```text
//! Cpd.name == "CompoundX" AND (Usr.usr_name IN ('alice', 'bob') OR Rtn.alias LIKE 'assay%')
//! ```
//!
//! Filters are plain data ([`Filter`]): they are built in code, parsed from
//! text with [`Filter::parse`], or assembled from form rows with
//! [`Filter::from_rows`]. Execution compiles them to a parameterized SQL
//! predicate; values are never spliced into SQL text.
//!
//! ## Fields
//!
//! | Text form         | Column                   |
//! |-------------------|--------------------------|
//! | `Cpd.name`        | `compounds.name`         |
//! | `Cpd.group`       | `compounds.group`        |
//! | `Cpd.smiles`      | `compounds.smiles`       |
//! | `Cpd.cas`         | `compounds.cas`          |
//! | `Cpd.formula`     | `compounds.formula`      |
//! | `Cpd.batch`       | `compounds.batch`        |
//! | `Usr.usr_name`    | `users.usr_name`         |
//! | `Usr.first_name`  | `users.first_name`       |
//! | `Usr.last_name`   | `users.last_name`        |
//! | `Usr.affiliation` | `users.affiliation`      |
//! | `Rtn.alias`       | `routines.alias`         |
//! | `Rtn.author`      | `routines.author`        |
//!
//! The qualifiers `compounds`, `users` and `routines` are accepted as well.

mod executor;
mod parser;

pub use executor::{compile, CompiledFilter, QueryResult, RoutineResult};
pub use parser::parse_filter;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FilterError;
use crate::value::Value;

/// A queryable attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    /// `Cpd.name`
    CompoundName,
    /// `Cpd.group`
    CompoundGroup,
    /// `Cpd.smiles`
    CompoundSmiles,
    /// `Cpd.cas`
    CompoundCas,
    /// `Cpd.formula`
    CompoundFormula,
    /// `Cpd.batch`
    CompoundBatch,
    /// `Usr.usr_name`
    UserName,
    /// `Usr.first_name`
    UserFirstName,
    /// `Usr.last_name`
    UserLastName,
    /// `Usr.affiliation`
    UserAffiliation,
    /// `Rtn.alias`
    RoutineAlias,
    /// `Rtn.author`
    RoutineAuthor,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Entity {
    Compound,
    User,
    Routine,
}

impl Entity {
    fn from_qualifier(qualifier: &str) -> Option<Self> {
        match qualifier.to_ascii_lowercase().as_str() {
            "cpd" | "compounds" => Some(Self::Compound),
            "usr" | "users" => Some(Self::User),
            "rtn" | "routines" => Some(Self::Routine),
            _ => None,
        }
    }
}

impl Field {
    /// Every queryable field.
    pub const ALL: [Self; 12] = [
        Self::CompoundName,
        Self::CompoundGroup,
        Self::CompoundSmiles,
        Self::CompoundCas,
        Self::CompoundFormula,
        Self::CompoundBatch,
        Self::UserName,
        Self::UserFirstName,
        Self::UserLastName,
        Self::UserAffiliation,
        Self::RoutineAlias,
        Self::RoutineAuthor,
    ];

    const fn entity(self) -> Entity {
        match self {
            Self::CompoundName
            | Self::CompoundGroup
            | Self::CompoundSmiles
            | Self::CompoundCas
            | Self::CompoundFormula
            | Self::CompoundBatch => Entity::Compound,
            Self::UserName | Self::UserFirstName | Self::UserLastName | Self::UserAffiliation => {
                Entity::User
            }
            Self::RoutineAlias | Self::RoutineAuthor => Entity::Routine,
        }
    }

    /// Column name in the owning table.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::CompoundName => "name",
            Self::CompoundGroup => "group",
            Self::CompoundSmiles => "smiles",
            Self::CompoundCas => "cas",
            Self::CompoundFormula => "formula",
            Self::CompoundBatch => "batch",
            Self::UserName => "usr_name",
            Self::UserFirstName => "first_name",
            Self::UserLastName => "last_name",
            Self::UserAffiliation => "affiliation",
            Self::RoutineAlias => "alias",
            Self::RoutineAuthor => "author",
        }
    }

    /// Qualifier used in the text form (`Cpd`, `Usr` or `Rtn`).
    #[must_use]
    pub const fn qualifier(self) -> &'static str {
        match self.entity() {
            Entity::Compound => "Cpd",
            Entity::User => "Usr",
            Entity::Routine => "Rtn",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.qualifier(), self.column())
    }
}

impl FromStr for Field {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || FilterError::UnknownField(s.trim().to_string());
        let (qualifier, column) = s.trim().split_once('.').ok_or_else(unknown)?;
        let entity = Entity::from_qualifier(qualifier.trim()).ok_or_else(unknown)?;
        let column = column.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|field| field.entity() == entity && field.column() == column)
            .ok_or_else(unknown)
    }
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparator {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `<=`
    Le,
    /// `>=`
    Ge,
    /// `IN (...)`
    In,
    /// `NOT IN (...)`
    NotIn,
    /// `LIKE` with `%` and `_` wildcards
    Like,
}

impl Comparator {
    /// Every operator, in menu order.
    pub const ALL: [Self; 7] = [
        Self::Eq,
        Self::Ne,
        Self::Le,
        Self::Ge,
        Self::In,
        Self::NotIn,
        Self::Like,
    ];

    /// SQL spelling.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::Like => "LIKE",
        }
    }

    /// Whether the operator takes a list operand.
    #[must_use]
    pub const fn takes_list(self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Comparator {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_ascii_uppercase().as_str() {
            "=" | "==" => Ok(Self::Eq),
            "!=" | "<>" => Ok(Self::Ne),
            "<=" => Ok(Self::Le),
            ">=" => Ok(Self::Ge),
            "IN" => Ok(Self::In),
            "NOT IN" => Ok(Self::NotIn),
            "LIKE" => Ok(Self::Like),
            _ => Err(FilterError::UnsupportedOperator(s.trim().to_string())),
        }
    }
}

/// Right-hand side of a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// One value
    Single(Value),
    /// Value list for `IN` / `NOT IN`
    List(Vec<Value>),
}

/// An atomic comparison `field comparator operand`.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    field: Field,
    comparator: Comparator,
    operand: Operand,
}

impl Condition {
    /// Create a condition, checking that the operand fits the operator.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::InvalidOperand`] for a list with a scalar
    /// operator (or the reverse), an empty list, a null operand, or a
    /// non-text `LIKE` pattern
    pub fn new(field: Field, comparator: Comparator, operand: Operand) -> Result<Self, FilterError> {
        let invalid = |reason: &str| FilterError::InvalidOperand {
            operator: comparator.symbol().to_string(),
            reason: reason.to_string(),
        };
        match (&operand, comparator.takes_list()) {
            (Operand::List(values), true) if values.is_empty() => {
                return Err(invalid("value list is empty"))
            }
            (Operand::List(values), true) if values.iter().any(Value::is_null) => {
                return Err(invalid("NULL is not a valid list entry"))
            }
            (Operand::List(_), true) => {}
            (Operand::List(_), false) => return Err(invalid("expected a single value")),
            (Operand::Single(_), true) => return Err(invalid("expected a value list")),
            (Operand::Single(Value::Null), false) => return Err(invalid("NULL cannot be compared")),
            (Operand::Single(value), false) => {
                if comparator == Comparator::Like && value.as_text().is_none() {
                    return Err(invalid("pattern must be text"));
                }
            }
        }
        Ok(Self {
            field,
            comparator,
            operand,
        })
    }

    /// Queried field.
    #[must_use]
    pub const fn field(&self) -> Field {
        self.field
    }

    /// Operator.
    #[must_use]
    pub const fn comparator(&self) -> Comparator {
        self.comparator
    }

    /// Operand.
    #[must_use]
    pub const fn operand(&self) -> &Operand {
        &self.operand
    }
}

fn write_literal(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::Int(_) | Value::Float(_) | Value::Bool(_) => write!(f, "{value}"),
        other => write!(f, "'{}'", other.to_string().replace('\'', "''")),
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ", self.field, self.comparator)?;
        match &self.operand {
            Operand::Single(value) => write_literal(f, value),
            Operand::List(values) => {
                f.write_str("(")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write_literal(f, value)?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Boolean filter over [`Condition`]s.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// A single comparison
    Condition(Condition),
    /// All operands must match
    And(Vec<Filter>),
    /// At least one operand must match
    Or(Vec<Filter>),
}

impl Filter {
    fn single(field: Field, comparator: Comparator, value: Value) -> Result<Self, FilterError> {
        Condition::new(field, comparator, Operand::Single(value)).map(Self::Condition)
    }

    fn list<V: Into<Value>>(
        field: Field,
        comparator: Comparator,
        values: impl IntoIterator<Item = V>,
    ) -> Result<Self, FilterError> {
        let values = values.into_iter().map(Into::into).collect();
        Condition::new(field, comparator, Operand::List(values)).map(Self::Condition)
    }

    /// `field = value`
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::InvalidOperand`] for a null value
    pub fn eq(field: Field, value: impl Into<Value>) -> Result<Self, FilterError> {
        Self::single(field, Comparator::Eq, value.into())
    }

    /// `field != value`
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::InvalidOperand`] for a null value
    pub fn ne(field: Field, value: impl Into<Value>) -> Result<Self, FilterError> {
        Self::single(field, Comparator::Ne, value.into())
    }

    /// `field <= value`
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::InvalidOperand`] for a null value
    pub fn le(field: Field, value: impl Into<Value>) -> Result<Self, FilterError> {
        Self::single(field, Comparator::Le, value.into())
    }

    /// `field >= value`
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::InvalidOperand`] for a null value
    pub fn ge(field: Field, value: impl Into<Value>) -> Result<Self, FilterError> {
        Self::single(field, Comparator::Ge, value.into())
    }

    /// `field LIKE pattern`
    ///
    /// # Errors
    ///
    /// Never fails for text patterns; kept fallible like the other builders
    pub fn like(field: Field, pattern: impl Into<String>) -> Result<Self, FilterError> {
        Self::single(field, Comparator::Like, Value::Text(pattern.into()))
    }

    /// `field IN (values)`
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::InvalidOperand`] for an empty list
    pub fn is_in<V: Into<Value>>(
        field: Field,
        values: impl IntoIterator<Item = V>,
    ) -> Result<Self, FilterError> {
        Self::list(field, Comparator::In, values)
    }

    /// `field NOT IN (values)`
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::InvalidOperand`] for an empty list
    pub fn not_in<V: Into<Value>>(
        field: Field,
        values: impl IntoIterator<Item = V>,
    ) -> Result<Self, FilterError> {
        Self::list(field, Comparator::NotIn, values)
    }

    /// Conjunction of `self` and `other`, flattening nested `And`s.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        let mut operands = match self {
            Self::And(operands) => operands,
            single => vec![single],
        };
        match other {
            Self::And(more) => operands.extend(more),
            single => operands.push(single),
        }
        Self::And(operands)
    }

    /// Disjunction of `self` and `other`, flattening nested `Or`s.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        let mut operands = match self {
            Self::Or(operands) => operands,
            single => vec![single],
        };
        match other {
            Self::Or(more) => operands.extend(more),
            single => operands.push(single),
        }
        Self::Or(operands)
    }

    /// Parse the text form.
    ///
    /// # Errors
    ///
    /// Returns a [`FilterError`] if the text is not a valid filter
    pub fn parse(text: &str) -> Result<Self, FilterError> {
        parse_filter(text)
    }

    /// Combine form rows into a filter. `AND` binds tighter than `OR`.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::Empty`] for no rows, or the first row error
    pub fn from_rows(rows: &[FilterRow]) -> Result<Self, FilterError> {
        let mut groups: Vec<Vec<Self>> = Vec::new();
        for (i, row) in rows.iter().enumerate() {
            let condition = row.to_filter()?;
            match groups.last_mut() {
                Some(group) if i > 0 && row.connective == Connective::And => group.push(condition),
                _ => groups.push(vec![condition]),
            }
        }
        let mut disjuncts = groups
            .into_iter()
            .map(|mut group| {
                if group.len() == 1 {
                    group.remove(0)
                } else {
                    Self::And(group)
                }
            })
            .collect::<Vec<_>>();
        match disjuncts.len() {
            0 => Err(FilterError::Empty),
            1 => Ok(disjuncts.remove(0)),
            _ => Ok(Self::Or(disjuncts)),
        }
    }

    /// Number of atomic conditions.
    #[must_use]
    pub fn condition_count(&self) -> usize {
        match self {
            Self::Condition(_) => 1,
            Self::And(operands) | Self::Or(operands) => {
                operands.iter().map(Self::condition_count).sum()
            }
        }
    }
}

impl From<Condition> for Filter {
    fn from(condition: Condition) -> Self {
        Self::Condition(condition)
    }
}

impl FromStr for Filter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_filter(s)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (operands, keyword) = match self {
            Self::Condition(condition) => return write!(f, "{condition}"),
            Self::And(operands) => (operands, " AND "),
            Self::Or(operands) => (operands, " OR "),
        };
        for (i, operand) in operands.iter().enumerate() {
            if i > 0 {
                f.write_str(keyword)?;
            }
            if matches!(operand, Self::Condition(_)) {
                write!(f, "{operand}")?;
            } else {
                write!(f, "({operand})")?;
            }
        }
        Ok(())
    }
}

/// How a [`FilterRow`] joins the row before it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Connective {
    /// Both rows must match
    #[default]
    And,
    /// Either row may match
    Or,
}

/// One row of a point-and-click filter form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRow {
    /// Queried field
    pub field: Field,
    /// Operator
    pub comparator: Comparator,
    /// Raw value; comma-separated for `IN` / `NOT IN`
    pub value: String,
    /// Link to the previous row, ignored on the first row
    #[serde(default)]
    pub connective: Connective,
}

impl FilterRow {
    /// Row joined to its predecessor with `AND`.
    #[must_use]
    pub fn new(field: Field, comparator: Comparator, value: impl Into<String>) -> Self {
        Self {
            field,
            comparator,
            value: value.into(),
            connective: Connective::And,
        }
    }

    /// Set the connective.
    #[must_use]
    pub const fn connective(mut self, connective: Connective) -> Self {
        self.connective = connective;
        self
    }

    fn to_filter(&self) -> Result<Filter, FilterError> {
        let operand = if self.comparator.takes_list() {
            Operand::List(
                self.value
                    .split(',')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(Value::from)
                    .collect(),
            )
        } else {
            Operand::Single(Value::from(self.value.trim()))
        };
        Condition::new(self.field, self.comparator, operand).map(Filter::Condition)
    }
}
