//! Expression AST
//!
//! The node set is closed: there is no loop, no lambda and no call to a
//! user-supplied name. `FuncCall` can only carry one of the [`Function`]
//! variants, so an expression tree always terminates when evaluated.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The seven static types of the expression language
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExprType {
    Int,
    Decimal,
    Str,
    Bool,
    Date,
    Datetime,
    Duration,
}

impl ExprType {
    pub fn is_numeric(self) -> bool {
        matches!(self, ExprType::Int | ExprType::Decimal)
    }

    pub fn is_ordered(self) -> bool {
        !matches!(self, ExprType::Bool)
    }

    pub fn is_temporal(self) -> bool {
        matches!(self, ExprType::Date | ExprType::Datetime)
    }
}

impl std::fmt::Display for ExprType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            ExprType::Int => "int",
            ExprType::Decimal => "decimal",
            ExprType::Str => "str",
            ExprType::Bool => "bool",
            ExprType::Date => "date",
            ExprType::Datetime => "datetime",
            ExprType::Duration => "duration",
        };
        f.write_str(name)
    }
}

/// The closed set of callable functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Function {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    DaysUntil,
    DaysSince,
    Today,
    Now,
    Concat,
    Coalesce,
    Abs,
    Round,
    Len,
}

const FUNCTIONS: &[(&str, Function)] = &[
    ("count", Function::Count),
    ("sum", Function::Sum),
    ("avg", Function::Avg),
    ("min", Function::Min),
    ("max", Function::Max),
    ("days_until", Function::DaysUntil),
    ("days_since", Function::DaysSince),
    ("today", Function::Today),
    ("now", Function::Now),
    ("concat", Function::Concat),
    ("coalesce", Function::Coalesce),
    ("abs", Function::Abs),
    ("round", Function::Round),
    ("len", Function::Len),
];

impl Function {
    pub fn from_name(name: &str) -> Option<Function> {
        FUNCTIONS.iter().find(|(n, _)| *n == name).map(|(_, f)| *f)
    }

    pub fn name(self) -> &'static str {
        FUNCTIONS
            .iter()
            .find(|(_, f)| *f == self)
            .map(|(n, _)| *n)
            .unwrap_or("?")
    }

    /// Every function of the language, in declaration order
    pub fn all() -> impl Iterator<Item = Function> {
        FUNCTIONS.iter().map(|(_, f)| *f)
    }

    /// Functions that may be written without parentheses
    pub fn is_nullary(self) -> bool {
        matches!(self, Function::Today | Function::Now)
    }
}

/// Unit of a duration literal, normalized to its compact spelling
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DurationUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
    Years,
}

impl DurationUnit {
    /// Parse a compact suffix (`d`) or a word form (`days`, `day`)
    pub fn parse(text: &str) -> Option<DurationUnit> {
        let unit = match text {
            "s" | "second" | "seconds" => DurationUnit::Seconds,
            "m" | "min" | "minute" | "minutes" => DurationUnit::Minutes,
            "h" | "hour" | "hours" => DurationUnit::Hours,
            "d" | "day" | "days" => DurationUnit::Days,
            "w" | "week" | "weeks" => DurationUnit::Weeks,
            "y" | "year" | "years" => DurationUnit::Years,
            _ => return None,
        };
        Some(unit)
    }

    pub fn compact(self) -> &'static str {
        match self {
            DurationUnit::Seconds => "s",
            DurationUnit::Minutes => "m",
            DurationUnit::Hours => "h",
            DurationUnit::Days => "d",
            DurationUnit::Weeks => "w",
            DurationUnit::Years => "y",
        }
    }

    pub fn seconds(self) -> i64 {
        match self {
            DurationUnit::Seconds => 1,
            DurationUnit::Minutes => 60,
            DurationUnit::Hours => 3_600,
            DurationUnit::Days => 86_400,
            DurationUnit::Weeks => 7 * 86_400,
            DurationUnit::Years => 365 * 86_400,
        }
    }
}

/// A duration literal such as `14d`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DurationLiteral {
    pub amount: i64,
    pub unit: DurationUnit,
}

impl DurationLiteral {
    /// Parse the compact form produced by the lexer (`14d`, `30min`)
    pub fn parse_compact(text: &str) -> Option<DurationLiteral> {
        let split = text.find(|c: char| !c.is_ascii_digit())?;
        let (digits, suffix) = text.split_at(split);
        Some(DurationLiteral {
            amount: digits.parse().ok()?,
            unit: DurationUnit::parse(suffix)?,
        })
    }

    /// Total length in seconds, `None` on overflow
    pub fn total_seconds(&self) -> Option<i64> {
        self.amount.checked_mul(self.unit.seconds())
    }
}

impl std::fmt::Display for DurationLiteral {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}{}", self.amount, self.unit.compact())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Literal {
    Int(i64),
    Decimal(Decimal),
    Str(String),
    Bool(bool),
}

/// How a path segment is reached from the previous one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Hop {
    Root,
    Dot,
    Arrow,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathSegment {
    pub name: String,
    pub hop: Hop,
}

/// A field path: `status`, `customer.name`, `self->signatory->aml_status`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldPath {
    pub segments: Vec<PathSegment>,
}

impl FieldPath {
    pub fn simple(name: &str) -> Self {
        FieldPath {
            segments: vec![PathSegment {
                name: name.to_string(),
                hop: Hop::Root,
            }],
        }
    }

    /// Segments after an optional leading `self`
    pub fn fields(&self) -> &[PathSegment] {
        match self.segments.first() {
            Some(first) if first.name == "self" && self.segments.len() > 1 => &self.segments[1..],
            _ => &self.segments,
        }
    }

    /// Binding key used by the evaluator: field names joined with `.`
    pub fn key(&self) -> String {
        self.fields()
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for segment in &self.segments {
            match segment.hop {
                Hop::Root => {}
                Hop::Dot => f.write_str(".")?,
                Hop::Arrow => f.write_str("->")?,
            }
            f.write_str(&segment.name)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "or",
            BinaryOp::And => "and",
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::LtEq => "<=",
            BinaryOp::GtEq => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::Lt | BinaryOp::Gt | BinaryOp::LtEq | BinaryOp::GtEq
        )
    }
}

/// Expression tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
    Literal(Literal),
    FieldRef(FieldPath),
    Duration(DurationLiteral),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    FuncCall {
        func: Function,
        args: Vec<Expr>,
    },
    In {
        value: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    If {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
}

impl Expr {
    /// Visit every field path in the tree
    pub fn walk_paths<'a>(&'a self, visit: &mut dyn FnMut(&'a FieldPath)) {
        match self {
            Expr::FieldRef(path) => visit(path),
            Expr::Literal(_) | Expr::Duration(_) => {}
            Expr::Unary { operand, .. } => operand.walk_paths(visit),
            Expr::Binary { left, right, .. } => {
                left.walk_paths(visit);
                right.walk_paths(visit);
            }
            Expr::FuncCall { args, .. } => args.iter().for_each(|a| a.walk_paths(visit)),
            Expr::In { value, list, .. } => {
                value.walk_paths(visit);
                list.iter().for_each(|a| a.walk_paths(visit));
            }
            Expr::If {
                condition,
                then_branch,
                else_branch,
            } => {
                condition.walk_paths(visit);
                then_branch.walk_paths(visit);
                else_branch.walk_paths(visit);
            }
        }
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Expr::Literal(Literal::Int(i)) => write!(f, "{}", i),
            Expr::Literal(Literal::Decimal(d)) => write!(f, "{}", d),
            Expr::Literal(Literal::Str(s)) => write!(f, "\"{}\"", s),
            Expr::Literal(Literal::Bool(b)) => write!(f, "{}", b),
            Expr::FieldRef(path) => write!(f, "{}", path),
            Expr::Duration(d) => write!(f, "{}", d),
            Expr::Unary { op: UnaryOp::Not, operand } => write!(f, "not {}", operand),
            Expr::Unary { op: UnaryOp::Neg, operand } => write!(f, "-{}", operand),
            Expr::Binary { op, left, right } => write!(f, "({} {} {})", left, op.symbol(), right),
            Expr::FuncCall { func, args } => {
                write!(f, "{}(", func.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expr::In { value, list, negated } => {
                write!(f, "{} {}in [", value, if *negated { "not " } else { "" })?;
                for (i, item) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Expr::If {
                condition,
                then_branch,
                else_branch,
            } => write!(f, "if {} then {} else {}", condition, then_branch, else_branch),
        }
    }
}
