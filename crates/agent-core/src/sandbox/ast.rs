use super::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Assign { target: Target, value: Expr },
    AugAssign {
        target: Target,
        op: BinaryOp,
        value: Expr,
    },
    Pass,
}

impl Stmt {
    pub fn deeper_than(&self, limit: usize) -> bool {
        match self {
            Self::Expr(expr) => expr.deeper_than(limit),
            Self::Assign { target, value } | Self::AugAssign { target, value, .. } => {
                value.deeper_than(limit)
                    || matches!(target, Target::Item { key, .. } if key.deeper_than(limit))
            }
            Self::Pass => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Name(String),
    /// `name[key] = value`
    Item { name: String, key: Expr },
}

impl Target {
    pub fn root_name(&self) -> &str {
        match self {
            Self::Name(name) | Self::Item { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Constant(Value),
    FString(Vec<FStringPart>),
    Name(String),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Conditional {
        condition: Box<Expr>,
        then_value: Box<Expr>,
        else_value: Box<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Subscript {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        object: Box<Expr>,
        start: Option<Box<Expr>>,
        end: Option<Box<Expr>>,
    },
    Attribute {
        object: Box<Expr>,
        name: String,
    },
}

impl Expr {
    /// Whether the tree has more than `limit` levels. Never descends past
    /// `limit`, so it is safe on trees of any depth.
    pub fn deeper_than(&self, limit: usize) -> bool {
        let Some(below) = limit.checked_sub(1) else {
            return true;
        };
        let any_deeper = |exprs: &[&Expr]| exprs.iter().any(|expr| expr.deeper_than(below));

        match self {
            Self::Constant(_) | Self::Name(_) => false,
            Self::FString(parts) => parts.iter().any(|part| {
                matches!(part, FStringPart::Interpolation { expr, .. } if expr.deeper_than(below))
            }),
            Self::List(items) => items.iter().any(|item| item.deeper_than(below)),
            Self::Dict(entries) => entries
                .iter()
                .any(|(key, value)| key.deeper_than(below) || value.deeper_than(below)),
            Self::Unary { operand, .. } => operand.deeper_than(below),
            Self::Binary { left, right, .. }
            | Self::Compare { left, right, .. }
            | Self::And(left, right)
            | Self::Or(left, right) => any_deeper(&[&**left, &**right]),
            Self::Conditional {
                condition,
                then_value,
                else_value,
            } => any_deeper(&[&**condition, &**then_value, &**else_value]),
            Self::Call { func, args, kwargs } => {
                func.deeper_than(below)
                    || args.iter().any(|arg| arg.deeper_than(below))
                    || kwargs.iter().any(|(_, arg)| arg.deeper_than(below))
            }
            Self::Subscript { object, index } => any_deeper(&[&**object, &**index]),
            Self::Slice { object, start, end } => {
                object.deeper_than(below)
                    || [start, end]
                        .into_iter()
                        .flatten()
                        .any(|bound| bound.deeper_than(below))
            }
            Self::Attribute { object, .. } => object.deeper_than(below),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FStringPart {
    Literal(String),
    Interpolation {
        expr: Box<Expr>,
        repr: bool,
        spec: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::Pow => "**",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    In,
    NotIn,
    Is,
    IsNot,
}
