//! Expression evaluator
//!
//! Pure and total for well-typed input: there is no I/O, no mutation of
//! the environment and no construct that can loop. Failures that depend
//! on data (division by zero, overflow, a missing binding) are
//! [`EvalError`]s, never panics.
//!
//! Null handling:
//! - arithmetic with a null operand yields null
//! - every comparison involving null is false
//! - `coalesce` and the aggregates skip nulls

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{Days, NaiveDate, NaiveDateTime};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ast::*;
use super::typeck::{resolve_path, FieldSchema};

const SECONDS_PER_DAY: i64 = 86_400;

/// Runtime value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Int(i64),
    Decimal(Decimal),
    Str(String),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    /// Length in seconds
    Duration(i64),
    /// Values of a collection path (`lines.amount`)
    List(Vec<Value>),
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Str(s) => write!(f, "{}", s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Date(d) => write!(f, "{}", d),
            Value::DateTime(dt) => write!(f, "{}", dt),
            Value::Duration(s) => write!(f, "{}s", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "int",
            Value::Decimal(_) => "decimal",
            Value::Str(_) => "str",
            Value::Bool(_) => "bool",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::Duration(_) => "duration",
            Value::List(_) => "list",
        }
    }

    fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Int(i) => Some(Decimal::from(*i)),
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

/// Evaluation failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("no value bound for '{0}'")]
    Unbound(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic overflow in {0}")]
    Overflow(String),

    /// Only reachable when evaluating an expression that was not type-checked
    #[error("type error: {0}")]
    Type(String),

    #[error("invalid argument to '{func}': {message}")]
    InvalidArgument { func: String, message: String },
}

/// Field bindings plus the clock used by `today` and `now`
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    pub bindings: BTreeMap<String, Value>,
    pub now: NaiveDateTime,
    /// Declared field types. Without them `sum` over an empty collection
    /// cannot tell `decimal` from `int` and yields `0`.
    pub schema: Option<FieldSchema>,
}

impl Environment {
    pub fn new(now: NaiveDateTime) -> Self {
        Environment {
            bindings: BTreeMap::new(),
            now,
            schema: None,
        }
    }

    pub fn with_schema(mut self, schema: FieldSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    fn field_type(&self, path: &FieldPath) -> Option<ExprType> {
        let schema = self.schema.as_ref()?;
        resolve_path(path, schema).ok().map(|p| p.ty)
    }

    /// Bind a path key (`total`, `signatory.aml_status`, `lines.amount`)
    pub fn bind(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.bindings.insert(key.into(), value.into());
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.now.date()
    }
}

/// Evaluate an expression against an environment
pub fn evaluate(expr: &Expr, env: &Environment) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(Literal::Int(i)) => Ok(Value::Int(*i)),
        Expr::Literal(Literal::Decimal(d)) => Ok(Value::Decimal(*d)),
        Expr::Literal(Literal::Str(s)) => Ok(Value::Str(s.clone())),
        Expr::Literal(Literal::Bool(b)) => Ok(Value::Bool(*b)),
        Expr::Duration(d) => d
            .total_seconds()
            .map(Value::Duration)
            .ok_or_else(|| EvalError::Overflow(format!("duration {}", d))),
        Expr::FieldRef(path) => {
            let key = path.key();
            env.bindings.get(&key).cloned().ok_or(EvalError::Unbound(key))
        }
        Expr::Unary { op, operand } => unary(*op, evaluate(operand, env)?),
        Expr::Binary {
            op: BinaryOp::And,
            left,
            right,
        } => {
            if !truthy(&evaluate(left, env)?) {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(truthy(&evaluate(right, env)?)))
        }
        Expr::Binary {
            op: BinaryOp::Or,
            left,
            right,
        } => {
            if truthy(&evaluate(left, env)?) {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(truthy(&evaluate(right, env)?)))
        }
        Expr::Binary { op, left, right } => {
            let l = evaluate(left, env)?;
            let r = evaluate(right, env)?;
            if op.is_comparison() {
                return Ok(Value::Bool(compare(*op, &l, &r)));
            }
            arithmetic(*op, l, r)
        }
        Expr::In { value, list, negated } => {
            let v = evaluate(value, env)?;
            if v.is_null() {
                return Ok(Value::Bool(false));
            }
            let mut found = false;
            for item in list {
                if compare(BinaryOp::Eq, &v, &evaluate(item, env)?) {
                    found = true;
                    break;
                }
            }
            Ok(Value::Bool(found != *negated))
        }
        Expr::If {
            condition,
            then_branch,
            else_branch,
        } => {
            if truthy(&evaluate(condition, env)?) {
                evaluate(then_branch, env)
            } else {
                evaluate(else_branch, env)
            }
        }
        Expr::FuncCall { func, args } => {
            let values = args
                .iter()
                .map(|a| evaluate(a, env))
                .collect::<Result<Vec<_>, _>>()?;
            let element = match args.first() {
                Some(Expr::FieldRef(path)) => env.field_type(path),
                _ => None,
            };
            call(*func, values, element, env)
        }
    }
}

fn truthy(value: &Value) -> bool {
    matches!(value, Value::Bool(true))
}

fn unary(op: UnaryOp, value: Value) -> Result<Value, EvalError> {
    match (op, value) {
        (_, Value::Null) => Ok(Value::Null),
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Neg, Value::Int(i)) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| EvalError::Overflow("negation".into())),
        (UnaryOp::Neg, Value::Decimal(d)) => Ok(Value::Decimal(-d)),
        (UnaryOp::Neg, Value::Duration(s)) => s
            .checked_neg()
            .map(Value::Duration)
            .ok_or_else(|| EvalError::Overflow("negation".into())),
        (op, v) => Err(EvalError::Type(format!("cannot apply {:?} to {}", op, v.type_name()))),
    }
}

/// Ordering of two non-null values of compatible types
fn order(l: &Value, r: &Value) -> Option<Ordering> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
        (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
        (Value::Duration(a), Value::Duration(b)) => Some(a.cmp(b)),
        _ => match (l.as_decimal(), r.as_decimal()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => None,
        },
    }
}

fn compare(op: BinaryOp, l: &Value, r: &Value) -> bool {
    if l.is_null() || r.is_null() {
        return false;
    }
    let Some(ordering) = order(l, r) else {
        return false;
    };
    match op {
        BinaryOp::Eq => ordering == Ordering::Equal,
        BinaryOp::NotEq => ordering != Ordering::Equal,
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::LtEq => ordering != Ordering::Greater,
        BinaryOp::GtEq => ordering != Ordering::Less,
        _ => false,
    }
}

fn overflow(op: BinaryOp) -> EvalError {
    EvalError::Overflow(format!("'{}'", op.symbol()))
}

fn add_days(date: NaiveDate, seconds: i64) -> Option<NaiveDate> {
    let days = seconds.div_euclid(SECONDS_PER_DAY);
    if days >= 0 {
        date.checked_add_days(Days::new(days as u64))
    } else {
        date.checked_sub_days(Days::new(days.unsigned_abs()))
    }
}

fn add_seconds(dt: NaiveDateTime, seconds: i64) -> Option<NaiveDateTime> {
    let delta = chrono::Duration::try_seconds(seconds)?;
    dt.checked_add_signed(delta)
}

fn arithmetic(op: BinaryOp, l: Value, r: Value) -> Result<Value, EvalError> {
    use Value::*;

    if l.is_null() || r.is_null() {
        return Ok(Null);
    }

    let result = match (op, &l, &r) {
        (BinaryOp::Add, Int(a), Int(b)) => a.checked_add(*b).map(Int),
        (BinaryOp::Sub, Int(a), Int(b)) => a.checked_sub(*b).map(Int),
        (BinaryOp::Mul, Int(a), Int(b)) => a.checked_mul(*b).map(Int),

        (BinaryOp::Add, Date(d), Duration(s)) | (BinaryOp::Add, Duration(s), Date(d)) => add_days(*d, *s).map(Date),
        (BinaryOp::Sub, Date(d), Duration(s)) => s.checked_neg().and_then(|n| add_days(*d, n)).map(Date),
        (BinaryOp::Add, DateTime(dt), Duration(s)) | (BinaryOp::Add, Duration(s), DateTime(dt)) => {
            add_seconds(*dt, *s).map(DateTime)
        }
        (BinaryOp::Sub, DateTime(dt), Duration(s)) => s.checked_neg().and_then(|n| add_seconds(*dt, n)).map(DateTime),
        (BinaryOp::Sub, Date(a), Date(b)) => a
            .signed_duration_since(*b)
            .num_days()
            .checked_mul(SECONDS_PER_DAY)
            .map(Duration),
        (BinaryOp::Sub, DateTime(a), DateTime(b)) => Some(Duration(a.signed_duration_since(*b).num_seconds())),

        (BinaryOp::Add, Duration(a), Duration(b)) => a.checked_add(*b).map(Duration),
        (BinaryOp::Sub, Duration(a), Duration(b)) => a.checked_sub(*b).map(Duration),
        (BinaryOp::Mul, Duration(a), Int(b)) | (BinaryOp::Mul, Int(b), Duration(a)) => a.checked_mul(*b).map(Duration),

        (BinaryOp::Div, _, _) => {
            let (Some(a), Some(b)) = (l.as_decimal(), r.as_decimal()) else {
                return Err(type_error(op, &l, &r));
            };
            if b.is_zero() {
                return Err(EvalError::DivisionByZero);
            }
            a.checked_div(b).map(Decimal)
        }
        (BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul, _, _) => {
            let (Some(a), Some(b)) = (l.as_decimal(), r.as_decimal()) else {
                return Err(type_error(op, &l, &r));
            };
            match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Sub => a.checked_sub(b),
                _ => a.checked_mul(b),
            }
            .map(Decimal)
        }
        _ => return Err(type_error(op, &l, &r)),
    };

    result.ok_or_else(|| overflow(op))
}

fn type_error(op: BinaryOp, l: &Value, r: &Value) -> EvalError {
    EvalError::Type(format!(
        "operator '{}' is not defined for {} and {}",
        op.symbol(),
        l.type_name(),
        r.type_name()
    ))
}

fn invalid(func: Function, message: impl Into<String>) -> EvalError {
    EvalError::InvalidArgument {
        func: func.name().to_string(),
        message: message.into(),
    }
}

/// Non-null items of an aggregate argument
fn items(func: Function, value: Value) -> Result<Vec<Value>, EvalError> {
    match value {
        Value::List(items) => Ok(items.into_iter().filter(|v| !v.is_null()).collect()),
        Value::Null => Ok(Vec::new()),
        other => Err(invalid(func, format!("expected a collection, found {}", other.type_name()))),
    }
}

fn extreme(func: Function, values: Vec<Value>, wanted: Ordering) -> Result<Value, EvalError> {
    let mut best: Option<Value> = None;
    for value in values.into_iter().filter(|v| !v.is_null()) {
        best = match best {
            None => Some(value),
            Some(current) => match order(&value, &current) {
                Some(o) if o == wanted => Some(value),
                Some(_) => Some(current),
                None => return Err(invalid(func, "values cannot be ordered")),
            },
        };
    }
    Ok(best.unwrap_or(Value::Null))
}

fn take_first(func: Function, args: &mut Vec<Value>) -> Result<Value, EvalError> {
    if args.is_empty() {
        return Err(invalid(func, "missing argument"));
    }
    Ok(args.remove(0))
}

/// `element` is the declared type of a field-path argument, when known
fn call(
    func: Function,
    mut args: Vec<Value>,
    element: Option<ExprType>,
    env: &Environment,
) -> Result<Value, EvalError> {
    match func {
        Function::Today => Ok(Value::Date(env.today())),
        Function::Now => Ok(Value::DateTime(env.now)),
        Function::Count => {
            let values = items(func, take_first(func, &mut args)?)?;
            Ok(Value::Int(values.len() as i64))
        }
        Function::Sum => {
            let values = items(func, take_first(func, &mut args)?)?;
            let mut int_total: Option<i64> = Some(0);
            let mut dec_total = Decimal::ZERO;
            for value in &values {
                match value {
                    Value::Int(i) => {
                        int_total = int_total.and_then(|t| t.checked_add(*i));
                        dec_total = dec_total.checked_add(Decimal::from(*i)).ok_or_else(|| overflow(BinaryOp::Add))?;
                    }
                    Value::Decimal(d) => {
                        int_total = None;
                        dec_total = dec_total.checked_add(*d).ok_or_else(|| overflow(BinaryOp::Add))?;
                    }
                    other => return Err(invalid(func, format!("cannot sum {}", other.type_name()))),
                }
            }
            let all_ints = values.iter().all(|v| matches!(v, Value::Int(_)));
            match (all_ints, int_total) {
                _ if element == Some(ExprType::Decimal) => Ok(Value::Decimal(dec_total)),
                (true, Some(total)) => Ok(Value::Int(total)),
                (true, None) => Err(overflow(BinaryOp::Add)),
                (false, _) => Ok(Value::Decimal(dec_total)),
            }
        }
        Function::Avg => {
            let values = items(func, take_first(func, &mut args)?)?;
            if values.is_empty() {
                return Ok(Value::Null);
            }
            let mut total = Decimal::ZERO;
            for value in &values {
                let d = value
                    .as_decimal()
                    .ok_or_else(|| invalid(func, format!("cannot average {}", value.type_name())))?;
                total = total.checked_add(d).ok_or_else(|| overflow(BinaryOp::Add))?;
            }
            total
                .checked_div(Decimal::from(values.len() as i64))
                .map(Value::Decimal)
                .ok_or_else(|| overflow(BinaryOp::Div))
        }
        Function::Min | Function::Max => {
            let wanted = if func == Function::Min { Ordering::Less } else { Ordering::Greater };
            let values = if args.len() == 1 {
                items(func, take_first(func, &mut args)?)?
            } else {
                args
            };
            extreme(func, values, wanted)
        }
        Function::DaysUntil | Function::DaysSince => {
            let days = match take_first(func, &mut args)? {
                Value::Null => return Ok(Value::Null),
                Value::Date(d) => d.signed_duration_since(env.today()).num_days(),
                Value::DateTime(dt) => dt.signed_duration_since(env.now).num_days(),
                other => return Err(invalid(func, format!("expected a date, found {}", other.type_name()))),
            };
            Ok(Value::Int(if func == Function::DaysUntil { days } else { -days }))
        }
        Function::Concat => {
            let text: String = args
                .iter()
                .filter(|v| !v.is_null())
                .map(|v| v.to_string())
                .collect();
            Ok(Value::Str(text))
        }
        Function::Coalesce => Ok(args.into_iter().find(|v| !v.is_null()).unwrap_or(Value::Null)),
        Function::Abs => match take_first(func, &mut args)? {
            Value::Null => Ok(Value::Null),
            Value::Int(i) => i.checked_abs().map(Value::Int).ok_or_else(|| EvalError::Overflow("abs".into())),
            Value::Decimal(d) => Ok(Value::Decimal(d.abs())),
            Value::Duration(s) => s
                .checked_abs()
                .map(Value::Duration)
                .ok_or_else(|| EvalError::Overflow("abs".into())),
            other => Err(invalid(func, format!("expected a number, found {}", other.type_name()))),
        },
        Function::Round => {
            let value = take_first(func, &mut args)?;
            let places = match args.first() {
                None => 0,
                Some(Value::Int(p)) if (0..=28).contains(p) => *p as u32,
                Some(other) => return Err(invalid(func, format!("invalid number of places: {}", other))),
            };
            match value {
                Value::Null => Ok(Value::Null),
                Value::Int(i) => Ok(Value::Int(i)),
                Value::Decimal(d) => Ok(Value::Decimal(
                    d.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero),
                )),
                other => Err(invalid(func, format!("expected a number, found {}", other.type_name()))),
            }
        }
        Function::Len => match take_first(func, &mut args)? {
            Value::Null => Ok(Value::Null),
            Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
            other => Err(invalid(func, format!("expected str, found {}", other.type_name()))),
        },
    }
}
