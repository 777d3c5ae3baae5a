use anyhow::{bail, Result};

use super::record::{Record, Value};
use super::schema::Schema;

/// Represents errors that expression evaluation can have.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    /// Two operand values of different data types cannot be compared, and
    /// boolean operators only accept boolean operands.
    #[error("cannot compare values of different data types")]
    CompareValueOfDifferentDataType,
}

/// A predicate expression evaluated against a record.
///
/// Evaluation is deterministic: the same record, schema and expression
/// always produce the same value. Scans treat a result of
/// `Value::Bool(true)` as a match and anything else as a non-match.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A literal value.
    Const(Value),

    /// The value of the record attribute at the given position.
    AttrRef(usize),

    Equals(Box<Expression>, Box<Expression>),
    Smaller(Box<Expression>, Box<Expression>),
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),
}

impl Expression {
    pub fn constant(value: Value) -> Self {
        Expression::Const(value)
    }

    pub fn attr(attnum: usize) -> Self {
        Expression::AttrRef(attnum)
    }

    pub fn equals(left: Expression, right: Expression) -> Self {
        Expression::Equals(Box::new(left), Box::new(right))
    }

    pub fn smaller(left: Expression, right: Expression) -> Self {
        Expression::Smaller(Box::new(left), Box::new(right))
    }

    pub fn and(left: Expression, right: Expression) -> Self {
        Expression::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Expression, right: Expression) -> Self {
        Expression::Or(Box::new(left), Box::new(right))
    }

    pub fn not(operand: Expression) -> Self {
        Expression::Not(Box::new(operand))
    }

    /// Evaluate the expression against a record laid out by the given
    /// schema.
    pub fn eval(&self, record: &Record, schema: &Schema) -> Result<Value> {
        match self {
            Expression::Const(value) => Ok(value.clone()),
            Expression::AttrRef(attnum) => record.get_attr(schema, *attnum),
            Expression::Equals(left, right) => {
                let left = left.eval(record, schema)?;
                let right = right.eval(record, schema)?;
                Ok(Value::Bool(values_equal(&left, &right)?))
            }
            Expression::Smaller(left, right) => {
                let left = left.eval(record, schema)?;
                let right = right.eval(record, schema)?;
                Ok(Value::Bool(value_smaller(&left, &right)?))
            }
            Expression::And(left, right) => {
                let left = as_bool(left.eval(record, schema)?)?;
                let right = as_bool(right.eval(record, schema)?)?;
                Ok(Value::Bool(left && right))
            }
            Expression::Or(left, right) => {
                let left = as_bool(left.eval(record, schema)?)?;
                let right = as_bool(right.eval(record, schema)?)?;
                Ok(Value::Bool(left || right))
            }
            Expression::Not(operand) => {
                let value = as_bool(operand.eval(record, schema)?)?;
                Ok(Value::Bool(!value))
            }
        }
    }
}

fn values_equal(left: &Value, right: &Value) -> Result<bool> {
    match (left, right) {
        (Value::Int(l), Value::Int(r)) => Ok(l == r),
        (Value::Float(l), Value::Float(r)) => Ok(l == r),
        (Value::Bool(l), Value::Bool(r)) => Ok(l == r),
        (Value::String(l), Value::String(r)) => Ok(l == r),
        _ => bail!(Error::CompareValueOfDifferentDataType),
    }
}

fn value_smaller(left: &Value, right: &Value) -> Result<bool> {
    match (left, right) {
        (Value::Int(l), Value::Int(r)) => Ok(l < r),
        (Value::Float(l), Value::Float(r)) => Ok(l < r),
        (Value::Bool(l), Value::Bool(r)) => Ok(l < r),
        (Value::String(l), Value::String(r)) => Ok(l < r),
        _ => bail!(Error::CompareValueOfDifferentDataType),
    }
}

fn as_bool(value: Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(b),
        _ => bail!(Error::CompareValueOfDifferentDataType),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::schema::{Attribute, DataType};

    fn sample() -> (Schema, Record) {
        let schema = Schema::new(vec![
            Attribute::new("a", DataType::Int, 0),
            Attribute::new("b", DataType::String, 8),
        ]);
        let mut record = Record::new(&schema);
        record.set_attr(&schema, 0, &Value::Int(5)).unwrap();
        record
            .set_attr(&schema, 1, &Value::String("row5".to_string()))
            .unwrap();
        (schema, record)
    }

    #[test]
    fn test_eval_comparisons() -> Result<()> {
        let (schema, record) = sample();

        let eq = Expression::equals(Expression::attr(0), Expression::constant(Value::Int(5)));
        assert_eq!(Value::Bool(true), eq.eval(&record, &schema)?);

        let lt = Expression::smaller(Expression::attr(0), Expression::constant(Value::Int(5)));
        assert_eq!(Value::Bool(false), lt.eval(&record, &schema)?);

        // a >= 5, spelled as NOT (a < 5).
        let ge = Expression::not(Expression::smaller(
            Expression::attr(0),
            Expression::constant(Value::Int(5)),
        ));
        assert_eq!(Value::Bool(true), ge.eval(&record, &schema)?);
        Ok(())
    }

    #[test]
    fn test_eval_boolean_connectives() -> Result<()> {
        let (schema, record) = sample();

        let both = Expression::and(
            Expression::equals(Expression::attr(0), Expression::constant(Value::Int(5))),
            Expression::equals(
                Expression::attr(1),
                Expression::constant(Value::String("row5".to_string())),
            ),
        );
        assert_eq!(Value::Bool(true), both.eval(&record, &schema)?);

        let either = Expression::or(
            Expression::smaller(Expression::attr(0), Expression::constant(Value::Int(0))),
            Expression::constant(Value::Bool(true)),
        );
        assert_eq!(Value::Bool(true), either.eval(&record, &schema)?);
        Ok(())
    }

    #[test]
    fn test_mismatched_types_fail() {
        let (schema, record) = sample();

        let expr = Expression::equals(
            Expression::attr(0),
            Expression::constant(Value::String("5".to_string())),
        );
        let err = expr.eval(&record, &schema).unwrap_err();
        assert_eq!(
            Error::CompareValueOfDifferentDataType,
            err.downcast::<Error>().unwrap()
        );

        // Boolean connectives demand boolean operands.
        let expr = Expression::and(
            Expression::constant(Value::Int(1)),
            Expression::constant(Value::Bool(true)),
        );
        assert!(expr.eval(&record, &schema).is_err());
    }
}
