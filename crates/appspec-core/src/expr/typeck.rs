//! Static type checking
//!
//! Every accepted expression has exactly one type. Operators are defined
//! over an enumerated set of operand pairs; anything else is a diagnostic.
//! Paths are resolved hop by hop: each intermediate segment must be a
//! reference field, and the next segment is looked up in the target
//! entity's schema. A path that crosses a `has_many` is a collection and
//! may only appear as the argument of an aggregate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ast::*;
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::parser::tokenizer::Span;

/// How a field looks from inside an expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaField {
    Scalar(ExprType),
    /// A reference to another entity; `many` for `has_many`
    Reference { target: String, many: bool },
}

/// Fields visible to an expression, plus the schemas of every entity an
/// arrow path may reach
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub entity: Option<String>,
    pub fields: BTreeMap<String, SchemaField>,
    pub entities: BTreeMap<String, BTreeMap<String, SchemaField>>,
}

impl FieldSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_entity(name: impl Into<String>) -> Self {
        FieldSchema {
            entity: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, field: SchemaField) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    pub fn with_scalar(self, name: impl Into<String>, ty: ExprType) -> Self {
        self.with_field(name, SchemaField::Scalar(ty))
    }

    pub fn with_entity(mut self, name: impl Into<String>, fields: BTreeMap<String, SchemaField>) -> Self {
        self.entities.insert(name.into(), fields);
        self
    }
}

/// Resolved type of a field path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathType {
    pub ty: ExprType,
    /// The path crosses a `has_many` and denotes a collection
    pub many: bool,
}

/// Positionless; callers relocate
fn error(code: DiagnosticCode, message: impl Into<String>) -> Diagnostic {
    Diagnostic::error(code, message, &Span::default())
}

fn mismatch(message: impl Into<String>) -> Diagnostic {
    error(DiagnosticCode::TypeMismatch, message)
}

/// Resolve a path against the schema, following reference hops
pub fn resolve_path(path: &FieldPath, schema: &FieldSchema) -> Result<PathType, Diagnostic> {
    let segments = path.fields();
    let Some(first) = segments.first() else {
        return Err(error(DiagnosticCode::UnknownPath, "empty field path"));
    };

    let mut current = schema.fields.get(&first.name).ok_or_else(|| {
        let owner = schema.entity.as_deref().unwrap_or("this context");
        error(
            DiagnosticCode::UnknownPath,
            format!("unknown field '{}' on {}", first.name, owner),
        )
    })?;
    let mut many = false;

    for (previous, segment) in segments.iter().zip(segments.iter().skip(1)) {
        let SchemaField::Reference { target, many: hop_many } = current else {
            return Err(error(
                DiagnosticCode::NotAReference,
                format!(
                    "'{}' is not a reference field; cannot traverse to '{}' in '{}'",
                    previous.name, segment.name, path
                ),
            ));
        };
        many |= *hop_many;
        let fields = schema.entities.get(target).ok_or_else(|| {
            error(
                DiagnosticCode::UnknownPath,
                format!("no schema for entity '{}' reached by '{}'", target, path),
            )
        })?;
        current = fields.get(&segment.name).ok_or_else(|| {
            error(
                DiagnosticCode::UnknownPath,
                format!("entity '{}' has no field '{}'", target, segment.name),
            )
        })?;
    }

    let ty = match current {
        SchemaField::Scalar(ty) => *ty,
        SchemaField::Reference { many: hop_many, .. } => {
            many |= *hop_many;
            ExprType::Str
        }
    };
    Ok(PathType { ty, many })
}

/// Infer the type of an expression.
///
/// `Expr` nodes carry no positions, so diagnostics are reported at 0:0;
/// [`crate::ir::SpannedExpr::type_check`] places them at the expression.
pub fn type_check(expr: &Expr, schema: &FieldSchema) -> Result<ExprType, Diagnostic> {
    Checker { schema }.infer(expr)
}

struct Checker<'a> {
    schema: &'a FieldSchema,
}

impl<'a> Checker<'a> {
    fn infer(&self, expr: &Expr) -> Result<ExprType, Diagnostic> {
        match expr {
            Expr::Literal(Literal::Int(_)) => Ok(ExprType::Int),
            Expr::Literal(Literal::Decimal(_)) => Ok(ExprType::Decimal),
            Expr::Literal(Literal::Str(_)) => Ok(ExprType::Str),
            Expr::Literal(Literal::Bool(_)) => Ok(ExprType::Bool),
            Expr::Duration(_) => Ok(ExprType::Duration),
            Expr::FieldRef(path) => {
                let resolved = resolve_path(path, self.schema)?;
                if resolved.many {
                    return Err(mismatch(format!(
                        "'{}' is a collection; use it inside count, sum, avg, min or max",
                        path
                    )));
                }
                Ok(resolved.ty)
            }
            Expr::Unary { op, operand } => self.unary(*op, operand),
            Expr::Binary { op, left, right } => self.binary(*op, left, right),
            Expr::FuncCall { func, args } => self.call(*func, args),
            Expr::In { value, list, .. } => {
                let value_ty = self.infer(value)?;
                for item in list {
                    let item_ty = self.infer(item)?;
                    if !comparable(value_ty, item_ty) {
                        return Err(mismatch(format!(
                            "'in' list item '{}' is {}, expected {}",
                            item, item_ty, value_ty
                        )));
                    }
                }
                Ok(ExprType::Bool)
            }
            Expr::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.expect_bool(condition, "if condition")?;
                let then_ty = self.infer(then_branch)?;
                let else_ty = self.infer(else_branch)?;
                unify(then_ty, else_ty).ok_or_else(|| {
                    mismatch(format!(
                        "if branches have different types: {} and {}",
                        then_ty, else_ty
                    ))
                })
            }
        }
    }

    fn expect_bool(&self, expr: &Expr, what: &str) -> Result<(), Diagnostic> {
        let ty = self.infer(expr)?;
        if ty != ExprType::Bool {
            return Err(mismatch(format!("{} must be bool, found {}", what, ty)));
        }
        Ok(())
    }

    fn unary(&self, op: UnaryOp, operand: &Expr) -> Result<ExprType, Diagnostic> {
        let ty = self.infer(operand)?;
        match op {
            UnaryOp::Not if ty == ExprType::Bool => Ok(ExprType::Bool),
            UnaryOp::Neg if ty.is_numeric() || ty == ExprType::Duration => Ok(ty),
            UnaryOp::Not => Err(mismatch(format!("'not' requires bool, found {}", ty))),
            UnaryOp::Neg => Err(mismatch(format!("'-' requires a number or duration, found {}", ty))),
        }
    }

    fn binary(&self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<ExprType, Diagnostic> {
        let l = self.infer(left)?;
        let r = self.infer(right)?;
        binary_result(op, l, r).ok_or_else(|| {
            let hint = if op == BinaryOp::Add && l == ExprType::Str && r == ExprType::Str {
                "; use concat(...) to join strings"
            } else {
                ""
            };
            mismatch(format!(
                "operator '{}' is not defined for {} and {}{}",
                op.symbol(),
                l,
                r,
                hint
            ))
        })
    }

    fn call(&self, func: Function, args: &[Expr]) -> Result<ExprType, Diagnostic> {
        use ExprType::*;

        let arity = |min: usize, max: usize| -> Result<(), Diagnostic> {
            if args.len() < min || args.len() > max {
                let expected = match (min, max) {
                    (0, 0) => "no arguments".to_string(),
                    (a, b) if a == b => format!("{} argument(s)", a),
                    (a, usize::MAX) => format!("at least {} argument(s)", a),
                    (a, b) => format!("{} to {} arguments", a, b),
                };
                return Err(mismatch(format!(
                    "'{}' takes {}, found {}",
                    func.name(),
                    expected,
                    args.len()
                )));
            }
            Ok(())
        };

        match func {
            Function::Today => {
                arity(0, 0)?;
                Ok(Date)
            }
            Function::Now => {
                arity(0, 0)?;
                Ok(Datetime)
            }
            Function::Count => {
                arity(1, 1)?;
                self.collection(func, &args[0])?;
                Ok(Int)
            }
            Function::Sum | Function::Avg => {
                arity(1, 1)?;
                let element = self.collection(func, &args[0])?;
                if !element.is_numeric() {
                    return Err(mismatch(format!(
                        "'{}' requires numeric values, found {}",
                        func.name(),
                        element
                    )));
                }
                Ok(if func == Function::Avg { Decimal } else { element })
            }
            Function::Min | Function::Max => {
                arity(1, usize::MAX)?;
                if args.len() == 1 {
                    let element = self.collection(func, &args[0])?;
                    if !element.is_ordered() {
                        return Err(mismatch(format!("'{}' cannot order {} values", func.name(), element)));
                    }
                    return Ok(element);
                }
                let ty = self.same_type(func, args)?;
                if !ty.is_ordered() {
                    return Err(mismatch(format!("'{}' cannot order {} values", func.name(), ty)));
                }
                Ok(ty)
            }
            Function::DaysUntil | Function::DaysSince => {
                arity(1, 1)?;
                let ty = self.infer(&args[0])?;
                if !ty.is_temporal() {
                    return Err(mismatch(format!(
                        "'{}' requires a date or datetime, found {}",
                        func.name(),
                        ty
                    )));
                }
                Ok(Int)
            }
            Function::Concat => {
                arity(1, usize::MAX)?;
                for arg in args {
                    self.infer(arg)?;
                }
                Ok(Str)
            }
            Function::Coalesce => {
                arity(1, usize::MAX)?;
                self.same_type(func, args)
            }
            Function::Abs => {
                arity(1, 1)?;
                let ty = self.infer(&args[0])?;
                if ty.is_numeric() || ty == Duration {
                    Ok(ty)
                } else {
                    Err(mismatch(format!("'abs' requires a number or duration, found {}", ty)))
                }
            }
            Function::Round => {
                arity(1, 2)?;
                let ty = self.infer(&args[0])?;
                if !ty.is_numeric() {
                    return Err(mismatch(format!("'round' requires a number, found {}", ty)));
                }
                if let Some(places) = args.get(1) {
                    let places_ty = self.infer(places)?;
                    if places_ty != Int {
                        return Err(mismatch(format!("'round' places must be int, found {}", places_ty)));
                    }
                }
                Ok(ty)
            }
            Function::Len => {
                arity(1, 1)?;
                let ty = self.infer(&args[0])?;
                if ty != Str {
                    return Err(mismatch(format!("'len' requires str, found {}", ty)));
                }
                Ok(Int)
            }
        }
    }

    /// Aggregate argument: must be a collection path; returns the element type
    fn collection(&self, func: Function, arg: &Expr) -> Result<ExprType, Diagnostic> {
        let Expr::FieldRef(path) = arg else {
            return Err(mismatch(format!(
                "'{}' requires a collection path such as 'lines.amount'",
                func.name()
            )));
        };
        let resolved = resolve_path(path, self.schema)?;
        if !resolved.many {
            return Err(mismatch(format!(
                "'{}' requires a collection, but '{}' is a single value",
                func.name(),
                path
            )));
        }
        Ok(resolved.ty)
    }

    fn same_type(&self, func: Function, args: &[Expr]) -> Result<ExprType, Diagnostic> {
        let mut ty = self.infer(&args[0])?;
        for arg in &args[1..] {
            let next = self.infer(arg)?;
            ty = unify(ty, next).ok_or_else(|| {
                mismatch(format!(
                    "'{}' arguments have different types: {} and {}",
                    func.name(),
                    ty,
                    next
                ))
            })?;
        }
        Ok(ty)
    }
}

/// Common type of two branches: equal types, or int widened to decimal
fn unify(a: ExprType, b: ExprType) -> Option<ExprType> {
    if a == b {
        Some(a)
    } else if a.is_numeric() && b.is_numeric() {
        Some(ExprType::Decimal)
    } else {
        None
    }
}

fn comparable(a: ExprType, b: ExprType) -> bool {
    unify(a, b).is_some()
}

/// Result type of a binary operator, `None` when the pair is not defined
pub fn binary_result(op: BinaryOp, l: ExprType, r: ExprType) -> Option<ExprType> {
    use ExprType::*;

    match op {
        BinaryOp::And | BinaryOp::Or => (l == Bool && r == Bool).then_some(Bool),
        BinaryOp::Eq | BinaryOp::NotEq => comparable(l, r).then_some(Bool),
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::LtEq | BinaryOp::GtEq => {
            (comparable(l, r) && l.is_ordered() && r.is_ordered()).then_some(Bool)
        }
        BinaryOp::Add => match (l, r) {
            (Int, Int) => Some(Int),
            (a, b) if a.is_numeric() && b.is_numeric() => Some(Decimal),
            (Date, Duration) | (Duration, Date) => Some(Date),
            (Datetime, Duration) | (Duration, Datetime) => Some(Datetime),
            (Duration, Duration) => Some(Duration),
            _ => None,
        },
        BinaryOp::Sub => match (l, r) {
            (Int, Int) => Some(Int),
            (a, b) if a.is_numeric() && b.is_numeric() => Some(Decimal),
            (Date, Duration) => Some(Date),
            (Datetime, Duration) => Some(Datetime),
            (Duration, Duration) | (Date, Date) | (Datetime, Datetime) => Some(Duration),
            _ => None,
        },
        BinaryOp::Mul => match (l, r) {
            (Int, Int) => Some(Int),
            (a, b) if a.is_numeric() && b.is_numeric() => Some(Decimal),
            (Duration, Int) | (Int, Duration) => Some(Duration),
            _ => None,
        },
        BinaryOp::Div => (l.is_numeric() && r.is_numeric()).then_some(Decimal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::lexer::tokenize;
    use crate::expr::parser::{parse, DEFAULT_MAX_DEPTH};

    fn invoice_schema() -> FieldSchema {
        let party: BTreeMap<String, SchemaField> = [
            ("aml_status".to_string(), SchemaField::Scalar(ExprType::Str)),
            ("name".to_string(), SchemaField::Scalar(ExprType::Str)),
        ]
        .into_iter()
        .collect();
        let line: BTreeMap<String, SchemaField> =
            [("amount".to_string(), SchemaField::Scalar(ExprType::Decimal))].into_iter().collect();
        FieldSchema::for_entity("Invoice")
            .with_scalar("total", ExprType::Decimal)
            .with_scalar("count", ExprType::Int)
            .with_scalar("status", ExprType::Str)
            .with_scalar("due_date", ExprType::Date)
            .with_scalar("created_at", ExprType::Datetime)
            .with_scalar("paid", ExprType::Bool)
            .with_field(
                "signatory",
                SchemaField::Reference {
                    target: "Party".into(),
                    many: false,
                },
            )
            .with_field(
                "lines",
                SchemaField::Reference {
                    target: "Line".into(),
                    many: true,
                },
            )
            .with_entity("Party", party)
            .with_entity("Line", line)
    }

    fn check(text: &str) -> Result<ExprType, Diagnostic> {
        let expr = parse(&tokenize(text).unwrap(), DEFAULT_MAX_DEPTH).unwrap();
        type_check(&expr, &invoice_schema())
    }

    #[test]
    fn test_comparison_against_today_is_bool() {
        assert_eq!(check("due_date > today").unwrap(), ExprType::Bool);
    }

    #[test]
    fn test_date_plus_duration_is_date() {
        assert_eq!(check("today() + 14d").unwrap(), ExprType::Date);
        assert_eq!(check("created_at + 2 hours").unwrap(), ExprType::Datetime);
        assert_eq!(check("due_date - today").unwrap(), ExprType::Duration);
    }

    #[test]
    fn test_string_plus_string_rejected() {
        let err = check("status + status").unwrap_err();
        assert_eq!(err.code, DiagnosticCode::TypeMismatch);
        assert!(err.message.contains("concat"));
        assert_eq!(check("concat(status, \"-\", total)").unwrap(), ExprType::Str);
    }

    #[test]
    fn test_numeric_widening() {
        assert_eq!(check("count + 1").unwrap(), ExprType::Int);
        assert_eq!(check("total + 1").unwrap(), ExprType::Decimal);
        assert_eq!(check("count / 2").unwrap(), ExprType::Decimal);
    }

    #[test]
    fn test_arrow_hops_resolve_through_references() {
        assert_eq!(check("self->signatory->aml_status = \"clear\"").unwrap(), ExprType::Bool);
    }

    #[test]
    fn test_hop_through_scalar_is_rejected() {
        let err = check("status->name = \"x\"").unwrap_err();
        assert_eq!(err.code, DiagnosticCode::NotAReference);
    }

    #[test]
    fn test_unknown_field() {
        let err = check("missing > 1").unwrap_err();
        assert_eq!(err.code, DiagnosticCode::UnknownPath);
    }

    #[test]
    fn test_aggregates_require_collections() {
        assert_eq!(check("sum(lines.amount)").unwrap(), ExprType::Decimal);
        assert_eq!(check("count(lines)").unwrap(), ExprType::Int);
        assert_eq!(check("avg(lines.amount) > 10").unwrap(), ExprType::Bool);
        assert!(check("sum(total)").is_err());
        assert!(check("lines.amount > 1").is_err());
    }

    #[test]
    fn test_boolean_operators_require_bool() {
        assert!(check("paid and total").is_err());
        assert_eq!(check("paid or not paid").unwrap(), ExprType::Bool);
    }

    #[test]
    fn test_if_branches_unify() {
        assert_eq!(check("if paid then 0 else total").unwrap(), ExprType::Decimal);
        assert!(check("if paid then 0 else status").is_err());
        assert!(check("if total then 0 else 1").is_err());
    }

    #[test]
    fn test_in_list_types() {
        assert_eq!(check("status in [\"a\", \"b\"]").unwrap(), ExprType::Bool);
        assert!(check("status in [1, 2]").is_err());
    }

    #[test]
    fn test_function_arity() {
        assert!(check("today(1)").is_err());
        assert!(check("len()").is_err());
        assert_eq!(check("round(total, 2)").unwrap(), ExprType::Decimal);
        assert_eq!(check("days_until(due_date)").unwrap(), ExprType::Int);
    }

    #[test]
    fn test_bool_is_not_ordered() {
        assert!(check("paid < paid").is_err());
        assert_eq!(check("paid = true").unwrap(), ExprType::Bool);
    }
}
