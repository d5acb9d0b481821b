use std::collections::{BTreeMap, HashMap};
use std::pin::Pin;

use serde_json::Map;

use crate::tools::{ToolRegistry, FINAL_ANSWER_TOOL};

use super::ast::{BinaryOp, CompareOp, Expr, FStringPart, Stmt, Target, UnaryOp};
use super::error::InterpreterError;
use super::parser::parse_program;
use super::value::Value;

type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Upper bound on collections built by `range`, `*` and friends.
pub const MAX_COLLECTION_LEN: usize = 1_000_000;

/// Largest `.Nf` precision an f-string may ask for.
pub const MAX_FORMAT_PRECISION: usize = 100;

pub(crate) const BUILTINS: &[&str] = &[
    FINAL_ANSWER_TOOL,
    "print",
    "len",
    "str",
    "int",
    "float",
    "bool",
    "abs",
    "round",
    "min",
    "max",
    "sum",
    "sorted",
    "range",
];

/// Non-local exits from evaluation.
enum Interrupt {
    Error(InterpreterError),
    /// `final_answer(...)` was called; unwinds to the step boundary
    FinalAnswer(Value),
}

impl From<InterpreterError> for Interrupt {
    fn from(error: InterpreterError) -> Self {
        Self::Error(error)
    }
}

type Flow<T> = std::result::Result<T, Interrupt>;

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Every statement ran; carries the value of the last one
    Completed(Value),
    FinalAnswer(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub print_outputs: String,
    pub outcome: Outcome,
}

/// Evaluates model-written code against a tool registry and a variable scope.
///
/// The scope is borrowed so that variables survive across the steps of a run.
pub struct Sandbox<'a> {
    tools: &'a ToolRegistry,
    variables: &'a mut HashMap<String, Value>,
    print_outputs: String,
}

impl<'a> Sandbox<'a> {
    pub fn new(tools: &'a ToolRegistry, variables: &'a mut HashMap<String, Value>) -> Self {
        Self {
            tools,
            variables,
            print_outputs: String::new(),
        }
    }

    pub async fn evaluate(mut self, code: &str) -> Result<Evaluation, InterpreterError> {
        let program = parse_program(code)?;
        let mut last = Value::None;

        for stmt in &program {
            match self.exec_stmt(stmt).await {
                Ok(value) => last = value,
                Err(Interrupt::FinalAnswer(value)) => {
                    return Ok(Evaluation {
                        print_outputs: self.print_outputs,
                        outcome: Outcome::FinalAnswer(value),
                    });
                }
                Err(Interrupt::Error(error)) => return Err(error),
            }
        }

        Ok(Evaluation {
            print_outputs: self.print_outputs,
            outcome: Outcome::Completed(last),
        })
    }

    fn is_reserved(&self, name: &str) -> bool {
        BUILTINS.contains(&name) || self.tools.contains(name)
    }

    async fn exec_stmt(&mut self, stmt: &Stmt) -> Flow<Value> {
        match stmt {
            Stmt::Pass => Ok(Value::None),
            Stmt::Expr(expr) => self.eval(expr).await,
            Stmt::Assign { target, value } => {
                self.check_target(target)?;
                let value = self.eval(value).await?;
                self.assign(target, value.clone()).await?;
                Ok(value)
            }
            Stmt::AugAssign { target, op, value } => {
                self.check_target(target)?;
                let current = match target {
                    Target::Name(name) => self.lookup(name)?,
                    Target::Item { name, key } => {
                        let container = self.lookup(name)?;
                        let key = self.eval(key).await?;
                        subscript(&container, &key)?
                    }
                };
                let rhs = self.eval(value).await?;
                let value = binary(*op, &current, &rhs)?;
                self.assign(target, value.clone()).await?;
                Ok(value)
            }
        }
    }

    fn check_target(&self, target: &Target) -> Flow<()> {
        let name = target.root_name();
        if self.is_reserved(name) {
            return Err(InterpreterError::ReservedName(name.to_string()).into());
        }
        Ok(())
    }

    async fn assign(&mut self, target: &Target, value: Value) -> Flow<()> {
        match target {
            Target::Name(name) => {
                self.variables.insert(name.clone(), value);
            }
            Target::Item { name, key } => {
                let key = self.eval(key).await?;
                let container = self
                    .variables
                    .get_mut(name)
                    .ok_or_else(|| InterpreterError::Name(format!("name '{name}' is not defined")))?;
                set_item(container, key, value)?;
            }
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Flow<Value> {
        if let Some(value) = self.variables.get(name) {
            return Ok(value.clone());
        }
        if self.is_reserved(name) {
            return Err(InterpreterError::Type(format!(
                "'{name}' is a function; call it with parentheses"
            ))
            .into());
        }
        Err(InterpreterError::Name(format!("name '{name}' is not defined")).into())
    }

    fn eval<'s>(&'s mut self, expr: &'s Expr) -> BoxFuture<'s, Flow<Value>> {
        Box::pin(async move {
            match expr {
                Expr::Constant(value) => Ok(value.clone()),
                Expr::Name(name) => self.lookup(name),
                Expr::FString(parts) => self.eval_fstring(parts).await,
                Expr::List(items) => {
                    let mut values = Vec::with_capacity(items.len());
                    for item in items {
                        values.push(self.eval(item).await?);
                    }
                    Ok(Value::List(values))
                }
                Expr::Dict(entries) => {
                    let mut map = BTreeMap::new();
                    for (key, value) in entries {
                        let key = dict_key(&self.eval(key).await?)?;
                        let value = self.eval(value).await?;
                        map.insert(key, value);
                    }
                    Ok(Value::Dict(map))
                }
                Expr::Unary { op, operand } => {
                    let value = self.eval(operand).await?;
                    Ok(unary(*op, &value)?)
                }
                Expr::Binary { op, left, right } => {
                    let left = self.eval(left).await?;
                    let right = self.eval(right).await?;
                    Ok(binary(*op, &left, &right)?)
                }
                Expr::Compare { op, left, right } => {
                    let left = self.eval(left).await?;
                    let right = self.eval(right).await?;
                    Ok(Value::Bool(compare(*op, &left, &right)?))
                }
                Expr::And(left, right) => {
                    let left = self.eval(left).await?;
                    if !left.is_truthy() {
                        return Ok(left);
                    }
                    self.eval(right).await
                }
                Expr::Or(left, right) => {
                    let left = self.eval(left).await?;
                    if left.is_truthy() {
                        return Ok(left);
                    }
                    self.eval(right).await
                }
                Expr::Conditional {
                    condition,
                    then_value,
                    else_value,
                } => {
                    if self.eval(condition).await?.is_truthy() {
                        self.eval(then_value).await
                    } else {
                        self.eval(else_value).await
                    }
                }
                Expr::Subscript { object, index } => {
                    let object = self.eval(object).await?;
                    let index = self.eval(index).await?;
                    Ok(subscript(&object, &index)?)
                }
                Expr::Slice { object, start, end } => {
                    let object = self.eval(object).await?;
                    let start = match start {
                        Some(expr) => Some(self.eval(expr).await?),
                        None => None,
                    };
                    let end = match end {
                        Some(expr) => Some(self.eval(expr).await?),
                        None => None,
                    };
                    Ok(slice(&object, start.as_ref(), end.as_ref())?)
                }
                Expr::Attribute { object, name } => {
                    let object = self.eval(object).await?;
                    Err(InterpreterError::Attribute(format!(
                        "'{}' object attribute '{}' can only be called",
                        object.type_name(),
                        name
                    ))
                    .into())
                }
                Expr::Call { func, args, kwargs } => self.eval_call(func, args, kwargs).await,
            }
        })
    }

    async fn eval_fstring(&mut self, parts: &[FStringPart]) -> Flow<Value> {
        let mut rendered = String::new();
        for part in parts {
            match part {
                FStringPart::Literal(text) => rendered.push_str(text),
                FStringPart::Interpolation { expr, repr, spec } => {
                    let value = self.eval(expr).await?;
                    let text = match spec {
                        Some(spec) => format_with_spec(&value, spec)?,
                        None if *repr => value.repr(),
                        None => value.to_string(),
                    };
                    rendered.push_str(&text);
                }
            }
        }
        Ok(Value::Str(rendered))
    }

    async fn eval_call(
        &mut self,
        func: &Expr,
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> Flow<Value> {
        let mut positional = Vec::with_capacity(args.len());
        for arg in args {
            positional.push(self.eval(arg).await?);
        }
        let mut named = Vec::with_capacity(kwargs.len());
        for (name, arg) in kwargs {
            named.push((name.clone(), self.eval(arg).await?));
        }

        match func {
            Expr::Name(name) => self.call_function(name, positional, named).await,
            Expr::Attribute { object, name } => {
                let receiver = self.eval(object).await?;
                let (result, updated) = call_method(receiver, name, positional)?;
                if let (Some(updated), Expr::Name(variable)) = (updated, object.as_ref()) {
                    self.variables.insert(variable.clone(), updated);
                }
                Ok(result)
            }
            other => {
                let value = self.eval(other).await?;
                Err(InterpreterError::Type(format!(
                    "'{}' object is not callable",
                    value.type_name()
                ))
                .into())
            }
        }
    }

    async fn call_function(
        &mut self,
        name: &str,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Flow<Value> {
        if name == FINAL_ANSWER_TOOL {
            let answer = args
                .into_iter()
                .next()
                .or_else(|| kwargs.into_iter().find(|(key, _)| key == "answer").map(|(_, v)| v))
                .ok_or_else(|| {
                    InterpreterError::Type("final_answer() missing argument 'answer'".to_string())
                })?;
            return Err(Interrupt::FinalAnswer(answer));
        }

        if name == "print" {
            self.print(args, &kwargs);
            return Ok(Value::None);
        }

        if BUILTINS.contains(&name) {
            if let Some((key, _)) = kwargs.first() {
                return Err(InterpreterError::Type(format!(
                    "{name}() got an unexpected keyword argument '{key}'"
                ))
                .into());
            }
            return Ok(call_builtin(name, args)?);
        }

        if self.tools.contains(name) {
            return Ok(self.call_tool(name, args, kwargs).await?);
        }

        match self.variables.get(name) {
            Some(value) => Err(InterpreterError::Type(format!(
                "'{}' object is not callable",
                value.type_name()
            ))
            .into()),
            None => Err(InterpreterError::Name(format!("name '{name}' is not defined")).into()),
        }
    }

    fn print(&mut self, args: Vec<Value>, kwargs: &[(String, Value)]) {
        let option = |key: &str, default: &str| {
            kwargs
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| default.to_string())
        };
        let sep = option("sep", " ");
        let end = option("end", "\n");

        let line: Vec<String> = args.iter().map(Value::to_string).collect();
        self.print_outputs.push_str(&line.join(&sep));
        self.print_outputs.push_str(&end);
    }

    async fn call_tool(
        &self,
        name: &str,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, InterpreterError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| InterpreterError::Name(format!("name '{name}' is not defined")))?;
        let schema = tool.to_schema().function;
        let params = schema.required_params();

        if args.len() > params.len() {
            return Err(InterpreterError::Type(format!(
                "{name}() takes {} positional arguments but {} were given",
                params.len(),
                args.len()
            )));
        }

        let mut payload = Map::new();
        for (param, value) in params.iter().zip(args) {
            payload.insert(param.clone(), value.to_json());
        }
        for (key, value) in kwargs {
            if payload.contains_key(&key) {
                return Err(InterpreterError::Type(format!(
                    "{name}() got multiple values for argument '{key}'"
                )));
            }
            payload.insert(key, value.to_json());
        }

        log::debug!("sandbox calling tool '{}'", name);
        tool.execute(serde_json::Value::Object(payload))
            .await
            .map(Value::from_agent)
            .map_err(|error| InterpreterError::Tool {
                name: name.to_string(),
                message: error.to_string(),
            })
    }
}

fn dict_key(value: &Value) -> Result<String, InterpreterError> {
    match value {
        Value::Str(key) => Ok(key.clone()),
        Value::Int(_) | Value::Float(_) | Value::Bool(_) | Value::None => Ok(value.to_string()),
        other => Err(InterpreterError::Type(format!(
            "unhashable type: '{}'",
            other.type_name()
        ))),
    }
}

fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let resolved = if index < 0 { index + len } else { index };
    (0..len).contains(&resolved).then_some(resolved as usize)
}

fn subscript(object: &Value, index: &Value) -> Result<Value, InterpreterError> {
    match (object, index) {
        (Value::List(items), index) => {
            let position = index.as_i64().ok_or_else(|| {
                InterpreterError::Type("list indices must be integers".to_string())
            })?;
            normalize_index(position, items.len())
                .map(|i| items[i].clone())
                .ok_or_else(|| InterpreterError::Index("list index out of range".to_string()))
        }
        (Value::Str(text), index) => {
            let position = index.as_i64().ok_or_else(|| {
                InterpreterError::Type("string indices must be integers".to_string())
            })?;
            let chars: Vec<char> = text.chars().collect();
            normalize_index(position, chars.len())
                .map(|i| Value::Str(chars[i].to_string()))
                .ok_or_else(|| InterpreterError::Index("string index out of range".to_string()))
        }
        (Value::Dict(entries), key) => {
            let key = dict_key(key)?;
            entries
                .get(&key)
                .cloned()
                .ok_or_else(|| InterpreterError::Key(format!("'{key}'")))
        }
        (other, _) => Err(InterpreterError::Type(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn set_item(container: &mut Value, key: Value, value: Value) -> Result<(), InterpreterError> {
    match container {
        Value::Dict(entries) => {
            entries.insert(dict_key(&key)?, value);
            Ok(())
        }
        Value::List(items) => {
            let position = key.as_i64().ok_or_else(|| {
                InterpreterError::Type("list indices must be integers".to_string())
            })?;
            let index = normalize_index(position, items.len()).ok_or_else(|| {
                InterpreterError::Index("list assignment index out of range".to_string())
            })?;
            items[index] = value;
            Ok(())
        }
        other => Err(InterpreterError::Type(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

fn slice_bounds(
    len: usize,
    start: Option<&Value>,
    end: Option<&Value>,
) -> Result<(usize, usize), InterpreterError> {
    let resolve = |bound: Option<&Value>, default: usize| -> Result<usize, InterpreterError> {
        match bound {
            None | Some(Value::None) => Ok(default),
            Some(value) => {
                let raw = value.as_i64().ok_or_else(|| {
                    InterpreterError::Type("slice indices must be integers".to_string())
                })?;
                let len = len as i64;
                let resolved = if raw < 0 { raw + len } else { raw };
                Ok(resolved.clamp(0, len) as usize)
            }
        }
    };
    let start = resolve(start, 0)?;
    let end = resolve(end, len)?;
    Ok((start, end.max(start)))
}

fn slice(object: &Value, start: Option<&Value>, end: Option<&Value>) -> Result<Value, InterpreterError> {
    match object {
        Value::List(items) => {
            let (from, to) = slice_bounds(items.len(), start, end)?;
            Ok(Value::List(items[from..to].to_vec()))
        }
        Value::Str(text) => {
            let chars: Vec<char> = text.chars().collect();
            let (from, to) = slice_bounds(chars.len(), start, end)?;
            Ok(Value::Str(chars[from..to].iter().collect()))
        }
        other => Err(InterpreterError::Type(format!(
            "'{}' object is not sliceable",
            other.type_name()
        ))),
    }
}

fn unary(op: UnaryOp, value: &Value) -> Result<Value, InterpreterError> {
    match (op, value) {
        (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
        (UnaryOp::Neg, Value::Int(n)) => n
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| InterpreterError::Value("integer overflow".to_string())),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Neg, Value::Bool(b)) => Ok(Value::Int(-i64::from(*b))),
        (UnaryOp::Pos, Value::Int(_) | Value::Float(_)) => Ok(value.clone()),
        (UnaryOp::Pos, Value::Bool(b)) => Ok(Value::Int(i64::from(*b))),
        (_, other) => Err(InterpreterError::Type(format!(
            "bad operand type for unary operator: '{}'",
            other.type_name()
        ))),
    }
}

fn overflow() -> InterpreterError {
    InterpreterError::Value("integer overflow".to_string())
}

fn repeat_count(count: i64) -> Result<usize, InterpreterError> {
    Ok(usize::try_from(count.max(0)).unwrap_or(0))
}

fn check_len(len: usize) -> Result<(), InterpreterError> {
    if len > MAX_COLLECTION_LEN {
        return Err(InterpreterError::Value(format!(
            "result would exceed {MAX_COLLECTION_LEN} elements"
        )));
    }
    Ok(())
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, InterpreterError> {
    use Value::{List, Str};

    match (op, left, right) {
        (BinaryOp::Add, Str(a), Str(b)) => Ok(Str(format!("{a}{b}"))),
        (BinaryOp::Add, List(a), List(b)) => {
            check_len(a.len() + b.len())?;
            Ok(List(a.iter().chain(b).cloned().collect()))
        }
        (BinaryOp::Mul, Str(text), count) | (BinaryOp::Mul, count, Str(text))
            if count.as_i64().is_some() =>
        {
            let times = repeat_count(count.as_i64().unwrap_or(0))?;
            check_len(text.len().saturating_mul(times))?;
            Ok(Str(text.repeat(times)))
        }
        (BinaryOp::Mul, List(items), count) | (BinaryOp::Mul, count, List(items))
            if count.as_i64().is_some() =>
        {
            let times = repeat_count(count.as_i64().unwrap_or(0))?;
            check_len(items.len().saturating_mul(times))?;
            let mut repeated = Vec::with_capacity(items.len() * times);
            for _ in 0..times {
                repeated.extend(items.iter().cloned());
            }
            Ok(List(repeated))
        }
        _ => match (left.as_i64(), right.as_i64()) {
            (Some(a), Some(b)) => integer_binary(op, a, b),
            _ => match (left.as_f64(), right.as_f64()) {
                (Some(a), Some(b)) => float_binary(op, a, b),
                _ => Err(InterpreterError::Type(format!(
                    "unsupported operand type(s) for {}: '{}' and '{}'",
                    op.symbol(),
                    left.type_name(),
                    right.type_name()
                ))),
            },
        },
    }
}

fn integer_binary(op: BinaryOp, a: i64, b: i64) -> Result<Value, InterpreterError> {
    match op {
        BinaryOp::Add => a.checked_add(b).map(Value::Int).ok_or_else(overflow),
        BinaryOp::Sub => a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
        BinaryOp::Mul => a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
        BinaryOp::Div => {
            if b == 0 {
                return Err(InterpreterError::ZeroDivision);
            }
            Ok(Value::Float(a as f64 / b as f64))
        }
        BinaryOp::FloorDiv => {
            if b == 0 {
                return Err(InterpreterError::ZeroDivision);
            }
            let quotient = a.checked_div(b).ok_or_else(overflow)?;
            let adjust = a % b != 0 && ((a < 0) != (b < 0));
            Ok(Value::Int(if adjust { quotient - 1 } else { quotient }))
        }
        BinaryOp::Mod => {
            if b == 0 {
                return Err(InterpreterError::ZeroDivision);
            }
            let remainder = a.checked_rem(b).ok_or_else(overflow)?;
            let adjust = remainder != 0 && ((remainder < 0) != (b < 0));
            Ok(Value::Int(if adjust { remainder + b } else { remainder }))
        }
        BinaryOp::Pow => {
            if b < 0 {
                return Ok(Value::Float((a as f64).powf(b as f64)));
            }
            let exponent = u32::try_from(b).map_err(|_| overflow())?;
            a.checked_pow(exponent).map(Value::Int).ok_or_else(overflow)
        }
    }
}

fn float_binary(op: BinaryOp, a: f64, b: f64) -> Result<Value, InterpreterError> {
    let value = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod if b == 0.0 => {
            return Err(InterpreterError::ZeroDivision)
        }
        BinaryOp::Div => a / b,
        BinaryOp::FloorDiv => (a / b).floor(),
        BinaryOp::Mod => a - b * (a / b).floor(),
        BinaryOp::Pow => a.powf(b),
    };
    Ok(Value::Float(value))
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, InterpreterError> {
    let ordering = |expected: &[std::cmp::Ordering]| {
        left.partial_cmp_loose(right)
            .map(|ordering| expected.contains(&ordering))
            .ok_or_else(|| {
                InterpreterError::Type(format!(
                    "comparison not supported between instances of '{}' and '{}'",
                    left.type_name(),
                    right.type_name()
                ))
            })
    };

    use std::cmp::Ordering::{Equal, Greater, Less};
    match op {
        CompareOp::Eq | CompareOp::Is => Ok(left.loose_eq(right)),
        CompareOp::NotEq | CompareOp::IsNot => Ok(!left.loose_eq(right)),
        CompareOp::Lt => ordering(&[Less]),
        CompareOp::LtEq => ordering(&[Less, Equal]),
        CompareOp::Gt => ordering(&[Greater]),
        CompareOp::GtEq => ordering(&[Greater, Equal]),
        CompareOp::In => contains(right, left),
        CompareOp::NotIn => contains(right, left).map(|found| !found),
    }
}

fn contains(container: &Value, item: &Value) -> Result<bool, InterpreterError> {
    match (container, item) {
        (Value::Str(haystack), Value::Str(needle)) => Ok(haystack.contains(needle.as_str())),
        (Value::List(items), item) => Ok(items.iter().any(|candidate| candidate.loose_eq(item))),
        (Value::Dict(entries), key) => Ok(entries.contains_key(&dict_key(key)?)),
        (other, _) => Err(InterpreterError::Type(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

fn format_with_spec(value: &Value, spec: &str) -> Result<String, InterpreterError> {
    if let Some(precision) = spec
        .strip_prefix('.')
        .and_then(|rest| rest.strip_suffix('f'))
        .and_then(|digits| digits.parse::<usize>().ok())
    {
        if precision > MAX_FORMAT_PRECISION {
            return Err(InterpreterError::Value(format!(
                "format precision too large, at most {MAX_FORMAT_PRECISION} digits"
            )));
        }
        let number = value.as_f64().ok_or_else(|| {
            InterpreterError::Value(format!(
                "unknown format code 'f' for object of type '{}'",
                value.type_name()
            ))
        })?;
        return Ok(format!("{number:.precision$}"));
    }

    match spec {
        "" | "s" => Ok(value.to_string()),
        "d" => value.as_i64().map(|n| n.to_string()).ok_or_else(|| {
            InterpreterError::Value(format!(
                "unknown format code 'd' for object of type '{}'",
                value.type_name()
            ))
        }),
        other => Err(InterpreterError::Unsupported(format!("format spec ':{other}'"))),
    }
}

fn iterable(value: Value, function: &str) -> Result<Vec<Value>, InterpreterError> {
    match value {
        Value::List(items) => Ok(items),
        Value::Str(text) => Ok(text.chars().map(|c| Value::Str(c.to_string())).collect()),
        Value::Dict(entries) => Ok(entries.into_keys().map(Value::Str).collect()),
        other => Err(InterpreterError::Type(format!(
            "{function}() argument must be iterable, not '{}'",
            other.type_name()
        ))),
    }
}

fn expect_args(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), InterpreterError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{min} to {max}")
        };
        return Err(InterpreterError::Type(format!(
            "{name}() takes {expected} arguments ({} given)",
            args.len()
        )));
    }
    Ok(())
}

fn call_builtin(name: &str, mut args: Vec<Value>) -> Result<Value, InterpreterError> {
    match name {
        "len" => {
            expect_args(name, &args, 1, 1)?;
            let len = match &args[0] {
                Value::Str(text) => text.chars().count(),
                Value::List(items) => items.len(),
                Value::Dict(entries) => entries.len(),
                other => {
                    return Err(InterpreterError::Type(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    )))
                }
            };
            Ok(Value::Int(len as i64))
        }
        "str" => {
            expect_args(name, &args, 0, 1)?;
            Ok(Value::Str(args.first().map(Value::to_string).unwrap_or_default()))
        }
        "int" => {
            expect_args(name, &args, 0, 1)?;
            match args.pop().unwrap_or(Value::Int(0)) {
                Value::Int(n) => Ok(Value::Int(n)),
                Value::Bool(b) => Ok(Value::Int(i64::from(b))),
                Value::Float(f) if f.is_finite() => Ok(Value::Int(f.trunc() as i64)),
                Value::Str(text) => text.trim().parse::<i64>().map(Value::Int).map_err(|_| {
                    InterpreterError::Value(format!(
                        "invalid literal for int() with base 10: '{text}'"
                    ))
                }),
                other => Err(InterpreterError::Type(format!(
                    "int() argument must be a string or a number, not '{}'",
                    other.type_name()
                ))),
            }
        }
        "float" => {
            expect_args(name, &args, 0, 1)?;
            match args.pop().unwrap_or(Value::Float(0.0)) {
                Value::Str(text) => text.trim().parse::<f64>().map(Value::Float).map_err(|_| {
                    InterpreterError::Value(format!("could not convert string to float: '{text}'"))
                }),
                other => other.as_f64().map(Value::Float).ok_or_else(|| {
                    InterpreterError::Type(format!(
                        "float() argument must be a string or a number, not '{}'",
                        other.type_name()
                    ))
                }),
            }
        }
        "bool" => {
            expect_args(name, &args, 0, 1)?;
            Ok(Value::Bool(args.first().is_some_and(Value::is_truthy)))
        }
        "abs" => {
            expect_args(name, &args, 1, 1)?;
            match &args[0] {
                Value::Int(n) => n.checked_abs().map(Value::Int).ok_or_else(overflow),
                Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
                Value::Float(f) => Ok(Value::Float(f.abs())),
                other => Err(InterpreterError::Type(format!(
                    "bad operand type for abs(): '{}'",
                    other.type_name()
                ))),
            }
        }
        "round" => {
            expect_args(name, &args, 1, 2)?;
            let number = args[0].as_f64().ok_or_else(|| {
                InterpreterError::Type(format!(
                    "type '{}' doesn't define __round__",
                    args[0].type_name()
                ))
            })?;
            match args.get(1) {
                None | Some(Value::None) => Ok(Value::Int(number.round() as i64)),
                Some(digits) => {
                    let digits = digits.as_i64().ok_or_else(|| {
                        InterpreterError::Type("ndigits must be an integer".to_string())
                    })?;
                    let factor = 10f64.powi(digits.clamp(-308, 308) as i32);
                    Ok(Value::Float((number * factor).round() / factor))
                }
            }
        }
        "min" | "max" => {
            let items = if args.len() == 1 {
                iterable(args.remove(0), name)?
            } else {
                args
            };
            let mut best: Option<Value> = None;
            for item in items {
                best = Some(match best {
                    None => item,
                    Some(current) => {
                        let ordering = item.partial_cmp_loose(&current).ok_or_else(|| {
                            InterpreterError::Type(format!(
                                "'{}' not supported between '{}' and '{}'",
                                name,
                                item.type_name(),
                                current.type_name()
                            ))
                        })?;
                        let replace = if name == "min" {
                            ordering.is_lt()
                        } else {
                            ordering.is_gt()
                        };
                        if replace {
                            item
                        } else {
                            current
                        }
                    }
                });
            }
            best.ok_or_else(|| InterpreterError::Value(format!("{name}() arg is an empty sequence")))
        }
        "sum" => {
            expect_args(name, &args, 1, 2)?;
            let start = args.get(1).cloned().unwrap_or(Value::Int(0));
            let items = iterable(args.remove(0), name)?;
            items
                .iter()
                .try_fold(start, |total, item| binary(BinaryOp::Add, &total, item))
        }
        "sorted" => {
            expect_args(name, &args, 1, 1)?;
            let mut items = iterable(args.remove(0), name)?;
            let mut failure = None;
            items.sort_by(|a, b| {
                a.partial_cmp_loose(b).unwrap_or_else(|| {
                    failure.get_or_insert_with(|| {
                        InterpreterError::Type(format!(
                            "'<' not supported between instances of '{}' and '{}'",
                            a.type_name(),
                            b.type_name()
                        ))
                    });
                    std::cmp::Ordering::Equal
                })
            });
            match failure {
                Some(error) => Err(error),
                None => Ok(Value::List(items)),
            }
        }
        "range" => {
            expect_args(name, &args, 1, 3)?;
            let mut bounds = Vec::with_capacity(args.len());
            for arg in &args {
                bounds.push(arg.as_i64().ok_or_else(|| {
                    InterpreterError::Type(format!(
                        "'{}' object cannot be interpreted as an integer",
                        arg.type_name()
                    ))
                })?);
            }
            let (start, stop, step) = match bounds.as_slice() {
                [stop] => (0, *stop, 1),
                [start, stop] => (*start, *stop, 1),
                [start, stop, step] => (*start, *stop, *step),
                _ => {
                    return Err(InterpreterError::Type(format!(
                        "range expected at most 3 arguments, got {}",
                        bounds.len()
                    )))
                }
            };
            if step == 0 {
                return Err(InterpreterError::Value("range() arg 3 must not be zero".to_string()));
            }
            let mut values = Vec::new();
            let mut current = start;
            while (step > 0 && current < stop) || (step < 0 && current > stop) {
                values.push(Value::Int(current));
                check_len(values.len())?;
                current = match current.checked_add(step) {
                    Some(next) => next,
                    None => break,
                };
            }
            Ok(Value::List(values))
        }
        other => Err(InterpreterError::Name(format!("name '{other}' is not defined"))),
    }
}

/// Returns the call result and, for mutating methods, the new receiver.
fn call_method(
    receiver: Value,
    method: &str,
    mut args: Vec<Value>,
) -> Result<(Value, Option<Value>), InterpreterError> {
    let no_attribute = |receiver: &Value| {
        InterpreterError::Attribute(format!(
            "'{}' object has no attribute '{}'",
            receiver.type_name(),
            method
        ))
    };
    let string_arg = |args: &[Value], index: usize| -> Result<String, InterpreterError> {
        match args.get(index) {
            Some(Value::Str(text)) => Ok(text.clone()),
            Some(other) => Err(InterpreterError::Type(format!(
                "{method}() argument must be str, not '{}'",
                other.type_name()
            ))),
            None => Err(InterpreterError::Type(format!("{method}() missing required argument"))),
        }
    };

    match receiver {
        Value::Str(ref text) => {
            let result = match method {
                "upper" => Value::Str(text.to_uppercase()),
                "lower" => Value::Str(text.to_lowercase()),
                "strip" => Value::Str(text.trim().to_string()),
                "lstrip" => Value::Str(text.trim_start().to_string()),
                "rstrip" => Value::Str(text.trim_end().to_string()),
                "startswith" => Value::Bool(text.starts_with(string_arg(&args, 0)?.as_str())),
                "endswith" => Value::Bool(text.ends_with(string_arg(&args, 0)?.as_str())),
                "replace" => {
                    let from = string_arg(&args, 0)?;
                    let to = string_arg(&args, 1)?;
                    Value::Str(text.replace(&from, &to))
                }
                "split" => {
                    let parts: Vec<Value> = match args.first() {
                        None | Some(Value::None) => text
                            .split_whitespace()
                            .map(|part| Value::Str(part.to_string()))
                            .collect(),
                        Some(_) => {
                            let separator = string_arg(&args, 0)?;
                            if separator.is_empty() {
                                return Err(InterpreterError::Value("empty separator".to_string()));
                            }
                            text.split(separator.as_str())
                                .map(|part| Value::Str(part.to_string()))
                                .collect()
                        }
                    };
                    Value::List(parts)
                }
                "join" => {
                    let items = iterable(args.pop().unwrap_or(Value::List(Vec::new())), method)?;
                    let mut pieces = Vec::with_capacity(items.len());
                    for item in items {
                        match item {
                            Value::Str(piece) => pieces.push(piece),
                            other => {
                                return Err(InterpreterError::Type(format!(
                                    "sequence item: expected str instance, '{}' found",
                                    other.type_name()
                                )))
                            }
                        }
                    }
                    Value::Str(pieces.join(text))
                }
                _ => return Err(no_attribute(&receiver)),
            };
            Ok((result, None))
        }
        Value::List(mut items) => match method {
            "append" => {
                expect_args(method, &args, 1, 1)?;
                items.extend(args);
                check_len(items.len())?;
                Ok((Value::None, Some(Value::List(items))))
            }
            "extend" => {
                expect_args(method, &args, 1, 1)?;
                items.extend(iterable(args.remove(0), method)?);
                check_len(items.len())?;
                Ok((Value::None, Some(Value::List(items))))
            }
            "index" => {
                expect_args(method, &args, 1, 1)?;
                items
                    .iter()
                    .position(|item| item.loose_eq(&args[0]))
                    .map(|index| (Value::Int(index as i64), None))
                    .ok_or_else(|| InterpreterError::Value(format!("{} is not in list", args[0].repr())))
            }
            _ => Err(no_attribute(&Value::List(items))),
        },
        Value::Dict(ref entries) => match method {
            "get" => {
                expect_args(method, &args, 1, 2)?;
                let key = dict_key(&args[0])?;
                let fallback = args.get(1).cloned().unwrap_or(Value::None);
                Ok((entries.get(&key).cloned().unwrap_or(fallback), None))
            }
            "keys" => Ok((
                Value::List(entries.keys().cloned().map(Value::Str).collect()),
                None,
            )),
            "values" => Ok((Value::List(entries.values().cloned().collect()), None)),
            "items" => Ok((
                Value::List(
                    entries
                        .iter()
                        .map(|(key, value)| Value::List(vec![Value::Str(key.clone()), value.clone()]))
                        .collect(),
                ),
                None,
            )),
            _ => Err(no_attribute(&receiver)),
        },
        other => Err(no_attribute(&other)),
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use crate::agent::AgentType;
    use crate::tools::{Tool, ToolError};

    use super::*;

    struct AddTool;

    #[async_trait]
    impl Tool for AddTool {
        fn name(&self) -> &str {
            "add"
        }

        fn description(&self) -> &str {
            "adds two integers"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            json!({
                "type": "object",
                "properties": {"a": {"type": "integer"}, "b": {"type": "integer"}},
                "required": ["a", "b"]
            })
        }

        async fn execute(&self, args: serde_json::Value) -> Result<AgentType, ToolError> {
            match (args["a"].as_i64(), args["b"].as_i64()) {
                (Some(a), Some(b)) => Ok(AgentType::Json { value: json!(a + b) }),
                _ => Err(ToolError::InvalidArguments("a and b must be integers".to_string())),
            }
        }
    }

    struct SnapshotTool;

    #[async_trait]
    impl Tool for SnapshotTool {
        fn name(&self) -> &str {
            "snapshot"
        }

        fn description(&self) -> &str {
            "renders an image"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object", "properties": {}})
        }

        async fn execute(&self, _args: serde_json::Value) -> Result<AgentType, ToolError> {
            Ok(AgentType::image("shot.png"))
        }
    }

    fn registry() -> ToolRegistry {
        let registry = ToolRegistry::new();
        registry.register(AddTool).unwrap();
        registry.register(SnapshotTool).unwrap();
        registry
    }

    async fn run(code: &str) -> Result<Evaluation, InterpreterError> {
        let tools = registry();
        let mut variables = HashMap::new();
        Sandbox::new(&tools, &mut variables).evaluate(code).await
    }

    async fn final_value(code: &str) -> Value {
        match run(code).await.expect("evaluation should succeed").outcome {
            Outcome::FinalAnswer(value) => value,
            other => panic!("expected final answer, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn final_answer_terminates_evaluation() {
        let evaluation = run("print('before')\nfinal_answer('Answer.')\nprint('after')")
            .await
            .unwrap();
        assert_eq!(evaluation.print_outputs, "before\n");
        assert_eq!(
            evaluation.outcome,
            Outcome::FinalAnswer(Value::Str("Answer.".to_string()))
        );
    }

    #[tokio::test]
    async fn final_answer_accepts_keyword() {
        assert_eq!(final_value("final_answer(answer=41 + 1)").await, Value::Int(42));
    }

    #[tokio::test]
    async fn completed_evaluation_reports_last_value() {
        let evaluation = run("x = 2\ny = x * 10\ny + 1").await.unwrap();
        assert_eq!(evaluation.outcome, Outcome::Completed(Value::Int(21)));
    }

    #[tokio::test]
    async fn tools_bind_positional_and_keyword_arguments() {
        assert_eq!(final_value("final_answer(add(1, b=2))").await, Value::Int(3));
        assert_eq!(final_value("final_answer(add(a=5, b=6))").await, Value::Int(11));
    }

    #[tokio::test]
    async fn tool_errors_surface_with_tool_name() {
        let error = run("add('x', 1)").await.unwrap_err();
        assert!(matches!(error, InterpreterError::Tool { ref name, .. } if name == "add"));
    }

    #[tokio::test]
    async fn media_values_pass_through_to_final_answer() {
        assert_eq!(
            final_value("img = snapshot()\nfinal_answer(img)").await,
            Value::Media(AgentType::image("shot.png"))
        );
    }

    #[tokio::test]
    async fn variables_persist_in_borrowed_scope() {
        let tools = registry();
        let mut variables = HashMap::new();
        Sandbox::new(&tools, &mut variables)
            .evaluate("counter = 1")
            .await
            .unwrap();
        let evaluation = Sandbox::new(&tools, &mut variables)
            .evaluate("counter += 1\ncounter")
            .await
            .unwrap();
        assert_eq!(evaluation.outcome, Outcome::Completed(Value::Int(2)));
        assert_eq!(variables.get("counter"), Some(&Value::Int(2)));
    }

    #[tokio::test]
    async fn assigning_to_tool_or_builtin_fails() {
        assert_eq!(
            run("final_answer = 3").await.unwrap_err(),
            InterpreterError::ReservedName("final_answer".to_string())
        );
        assert!(matches!(
            run("add = 1").await,
            Err(InterpreterError::ReservedName(_))
        ));
    }

    #[tokio::test]
    async fn undefined_names_raise_name_error() {
        assert!(matches!(run("missing + 1").await, Err(InterpreterError::Name(_))));
    }

    #[tokio::test]
    async fn strings_lists_and_dicts() {
        let code = r#"
words = "a b c".split()
words.append("d")
data = {"count": len(words)}
data["joined"] = "-".join(words)
final_answer(f"{data['joined']} ({data['count']}) {3 / 2:.2f} {words[-1].upper()}")
"#;
        assert_eq!(
            final_value(code).await,
            Value::Str("a-b-c-d (4) 1.50 D".to_string())
        );
    }

    #[tokio::test]
    async fn python_arithmetic_semantics() {
        assert_eq!(final_value("final_answer(-7 // 2)").await, Value::Int(-4));
        assert_eq!(final_value("final_answer(-7 % 3)").await, Value::Int(2));
        assert_eq!(final_value("final_answer(7 / 2)").await, Value::Float(3.5));
        assert_eq!(final_value("final_answer(2 ** 10)").await, Value::Int(1024));
        assert!(matches!(run("1 / 0").await, Err(InterpreterError::ZeroDivision)));
    }

    #[tokio::test]
    async fn builtins_cover_common_helpers() {
        assert_eq!(
            final_value("final_answer([sum(range(5)), max([3, 9, 2]), min(4, 1), abs(-2)])").await,
            Value::List(vec![Value::Int(10), Value::Int(9), Value::Int(1), Value::Int(2)])
        );
        assert_eq!(
            final_value("final_answer(sorted(['b', 'a']))").await,
            Value::List(vec![Value::Str("a".to_string()), Value::Str("b".to_string())])
        );
        assert_eq!(final_value("final_answer(int('12') + float('0.5'))").await, Value::Float(12.5));
    }

    #[tokio::test]
    async fn conditionals_and_boolean_logic() {
        assert_eq!(
            final_value("x = 5\nfinal_answer('big' if x > 3 and not x == 4 else 'small')").await,
            Value::Str("big".to_string())
        );
        assert_eq!(final_value("final_answer(None or 'fallback')").await, Value::Str("fallback".to_string()));
        assert_eq!(final_value("final_answer('b' in ['a', 'b'])").await, Value::Bool(true));
    }

    #[tokio::test]
    async fn huge_ranges_are_rejected() {
        assert!(matches!(
            run("range(10000000)").await,
            Err(InterpreterError::Value(_))
        ));
    }

    #[tokio::test]
    async fn print_supports_sep_and_end() {
        let evaluation = run("print(1, 2, sep=', ', end='!')").await.unwrap();
        assert_eq!(evaluation.print_outputs, "1, 2!");
    }

    #[tokio::test]
    async fn format_precision_is_capped() {
        let error = run("x = f'{1:.70000f}'").await.unwrap_err();
        assert!(matches!(error, InterpreterError::Value(ref message) if message.contains("precision")));

        let Value::Str(text) = final_value("final_answer(f'{2:.100f}')").await else {
            panic!("expected a string");
        };
        assert_eq!(text.len(), 102);
        assert!(run("f'{1:.99999999999999999999999f}'").await.is_err());
    }

    #[tokio::test]
    async fn nesting_limits_surface_as_errors() {
        let parens = format!("x = {}1{}", "(".repeat(1000), ")".repeat(1000));
        assert!(matches!(run(&parens).await, Err(InterpreterError::Syntax { .. })));

        let chain = format!("final_answer(1{})", " + 1".repeat(90));
        assert_eq!(final_value(&chain).await, Value::Int(91));
    }
}
