//! Text form of filters, parsed with sqlparser
//!
//! The input is parsed as a single SQL expression and then lowered to a
//! [`Filter`]. Only comparisons between a whitelisted field on the left and
//! literals on the right survive the lowering; everything else (functions,
//! subqueries, arithmetic, `BETWEEN`, ...) is rejected.

use sqlparser::ast::{BinaryOperator, Expr, UnaryOperator, Value as SqlLiteral};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};

use super::{Comparator, Condition, Field, Filter, Operand};
use crate::error::FilterError;
use crate::value::Value;

/// Parse a filter such as `Cpd.name == "CompoundX" AND Rtn.alias IN ('a', 'b')`.
///
/// `==` is accepted as `=`, `<>` as `!=`. Strings may be single- or
/// double-quoted.
///
/// # Errors
///
/// Returns [`FilterError::Empty`] for blank input, [`FilterError::Syntax`]
/// for text that is not a single expression, [`FilterError::UnknownField`]
/// for fields outside the whitelist and [`FilterError::UnsupportedOperator`]
/// for other operators
pub fn parse_filter(input: &str) -> Result<Filter, FilterError> {
    if input.trim().is_empty() {
        return Err(FilterError::Empty);
    }
    let syntax = |reason: String| FilterError::Syntax {
        input: input.to_string(),
        reason,
    };

    let dialect = GenericDialect {};
    let tokens = Tokenizer::new(&dialect, input)
        .tokenize()
        .map_err(|e| syntax(e.to_string()))?
        .into_iter()
        .map(|token| if token == Token::DoubleEq { Token::Eq } else { token })
        .collect();

    let mut parser = Parser::new(&dialect).with_tokens(tokens);
    let expr = parser.parse_expr().map_err(|e| syntax(e.to_string()))?;
    let trailing = parser.peek_token().token;
    if trailing != Token::EOF {
        return Err(syntax(format!("unexpected '{trailing}' after the filter")));
    }

    lower(&expr).map_err(|e| match e {
        Lowering::Filter(e) => e,
        Lowering::Unsupported(reason) => syntax(reason),
    })
}

enum Lowering {
    Filter(FilterError),
    Unsupported(String),
}

impl From<FilterError> for Lowering {
    fn from(e: FilterError) -> Self {
        Self::Filter(e)
    }
}

fn lower(expr: &Expr) -> Result<Filter, Lowering> {
    match expr {
        Expr::Nested(inner) => lower(inner),
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => Ok(lower(left)?.and(lower(right)?)),
        Expr::BinaryOp {
            left,
            op: BinaryOperator::Or,
            right,
        } => Ok(lower(left)?.or(lower(right)?)),
        Expr::BinaryOp { left, op, right } => {
            let comparator = match op {
                BinaryOperator::Eq => Comparator::Eq,
                BinaryOperator::NotEq => Comparator::Ne,
                BinaryOperator::LtEq => Comparator::Le,
                BinaryOperator::GtEq => Comparator::Ge,
                other => return Err(FilterError::UnsupportedOperator(other.to_string()).into()),
            };
            let field = field(left)?;
            let value = literal(right, comparator)?;
            Ok(Condition::new(field, comparator, Operand::Single(value))?.into())
        }
        Expr::InList {
            expr,
            list,
            negated,
        } => {
            let comparator = if *negated {
                Comparator::NotIn
            } else {
                Comparator::In
            };
            let field = field(expr)?;
            let values = list
                .iter()
                .map(|item| literal(item, comparator))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Condition::new(field, comparator, Operand::List(values))?.into())
        }
        Expr::Like {
            negated,
            expr,
            pattern,
            escape_char,
            ..
        } => {
            if *negated {
                return Err(FilterError::UnsupportedOperator("NOT LIKE".to_string()).into());
            }
            if escape_char.is_some() {
                return Err(Lowering::Unsupported("LIKE ... ESCAPE is not supported".to_string()));
            }
            let field = field(expr)?;
            let value = literal(pattern, Comparator::Like)?;
            Ok(Condition::new(field, Comparator::Like, Operand::Single(value))?.into())
        }
        Expr::UnaryOp {
            op: UnaryOperator::Not,
            ..
        } => Err(FilterError::UnsupportedOperator("NOT".to_string()).into()),
        other => Err(Lowering::Unsupported(format!(
            "'{other}' is not a comparison"
        ))),
    }
}

fn field(expr: &Expr) -> Result<Field, Lowering> {
    match expr {
        Expr::CompoundIdentifier(parts) => {
            let path = parts
                .iter()
                .map(|ident| ident.value.as_str())
                .collect::<Vec<_>>()
                .join(".");
            Ok(path.parse()?)
        }
        Expr::Identifier(ident) => Err(FilterError::UnknownField(ident.value.clone()).into()),
        Expr::Nested(inner) => field(inner),
        other => Err(Lowering::Unsupported(format!(
            "expected a field on the left, found '{other}'"
        ))),
    }
}

fn literal(expr: &Expr, comparator: Comparator) -> Result<Value, Lowering> {
    let invalid = |reason: String| {
        Lowering::Filter(FilterError::InvalidOperand {
            operator: comparator.symbol().to_string(),
            reason,
        })
    };
    match expr {
        Expr::Value(SqlLiteral::SingleQuotedString(s) | SqlLiteral::DoubleQuotedString(s)) => {
            Ok(Value::Text(s.clone()))
        }
        Expr::Value(SqlLiteral::Number(n, _)) => number(n).ok_or_else(|| invalid(format!("'{n}' is not a number"))),
        Expr::Value(SqlLiteral::Boolean(b)) => Ok(Value::Bool(*b)),
        Expr::Value(SqlLiteral::Null) => Ok(Value::Null),
        // "text" in the generic dialect is a quoted identifier
        Expr::Identifier(ident) if ident.quote_style == Some('"') => Ok(Value::Text(ident.value.clone())),
        Expr::UnaryOp {
            op: UnaryOperator::Minus,
            expr,
        } => match expr.as_ref() {
            Expr::Value(SqlLiteral::Number(n, _)) => number(&format!("-{n}"))
                .ok_or_else(|| invalid(format!("'-{n}' is not a number"))),
            other => Err(invalid(format!("'-{other}' is not a literal"))),
        },
        Expr::Nested(inner) => literal(inner, comparator),
        other => Err(invalid(format!("'{other}' is not a literal"))),
    }
}

fn number(text: &str) -> Option<Value> {
    text.parse::<i64>()
        .map(Value::Int)
        .or_else(|_| text.parse::<f64>().map(Value::Float))
        .ok()
}
