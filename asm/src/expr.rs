use std::{
    fmt::{self, Display, Formatter},
    time::{SystemTime, UNIX_EPOCH},
};

use crate::{ast::Operand, lexer::MacroFn};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("unresolved symbol: \"{0}\"")]
    UnresolvedSymbol(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("unknown function: \"{0}\"")]
    UnknownFunction(String),

    #[error("the arguments of \"{0}\" do not match any of its signatures")]
    Signature(String),

    #[error("operator \"{0}\" cannot be applied to a string")]
    StringOperand(&'static str),

    #[error("operator \"{0}\" needs integral operands")]
    RealOperand(&'static str),

    #[error("{0}")]
    Function(String),

    #[error("the loop counter can only be used inside a loop")]
    LoopCounterOutsideLoop,
}

impl EvalError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnresolvedSymbol(_) => "Z0605",
            Self::LoopCounterOutsideLoop => "Z0705",
            _ => "Z0606",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Real(f64),
    Str(String),
}

impl Value {
    /// Integral reals collapse into integers.
    pub fn from_real(value: f64) -> Self {
        if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
            Self::Int(value as i64)
        } else {
            Self::Real(value)
        }
    }

    /// Reals round down. Strings have no numeric value.
    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Bool(value) => Some(*value as i64),
            Self::Int(value) => Some(*value),
            Self::Real(value) => Some(value.floor() as i64),
            Self::Str(_) => None,
        }
    }

    #[inline]
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Self::Bool(value) => Some(*value as i64 as f64),
            Self::Int(value) => Some(*value as f64),
            Self::Real(value) => Some(*value),
            Self::Str(_) => None,
        }
    }

    /// Booleans and integers, but not reals.
    #[inline]
    fn integral(&self) -> Option<i64> {
        match self {
            Self::Bool(value) => Some(*value as i64),
            Self::Int(value) => Some(*value),
            Self::Real(_) | Self::Str(_) => None,
        }
    }

    #[inline]
    pub fn is_true(&self) -> bool {
        match self {
            Self::Bool(value) => *value,
            Self::Int(value) => *value != 0,
            Self::Real(value) => *value != 0.0,
            Self::Str(text) => !text.is_empty(),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Real(value) => write!(f, "{value}"),
            Self::Str(text) => f.write_str(text),
        }
    }
}

/// The three outcomes of evaluating an expression.
#[derive(Clone, Debug, PartialEq)]
pub enum EvalResult {
    Resolved(Value),
    Deferred,
    Error(EvalError),
}

/// What a symbol lookup found.
#[derive(Clone, Debug, PartialEq)]
pub enum SymbolValue {
    Resolved(Value),
    /// Declared but its value is not known yet.
    Pending,
    Undefined,
}

/// Park-Miller minimal standard generator behind `rnd()`.
#[derive(Clone, Debug)]
pub struct Random {
    seed: i64,
}

impl Random {
    const MODULUS: i64 = 2_147_483_647;

    pub fn new(seed: i64) -> Self {
        let mut seed = seed % Self::MODULUS;
        if seed <= 0 {
            seed += Self::MODULUS - 1;
        }
        Self { seed: seed.max(1) }
    }

    /// Seeded with the milliseconds since the Unix epoch.
    pub fn from_clock() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as i64)
            .unwrap_or(1);
        Self::new(millis)
    }

    fn next_real(&mut self) -> f64 {
        self.seed = self.seed * 16807 % Self::MODULUS;
        (self.seed - 1) as f64 / (Self::MODULUS - 1) as f64
    }

    /// A number in `from..to`.
    pub fn integer(&mut self, from: i64, to: i64) -> i64 {
        (from as f64 + self.next_real() * (to - from) as f64).floor() as i64
    }
}

pub trait EvalContext {
    fn current_address(&self) -> i64;

    fn loop_counter(&self) -> Option<i64>;

    /// Looks up `name`, starting at the root module when `root` is set.
    fn symbol(&mut self, name: &str, root: bool) -> SymbolValue;

    /// The generator `rnd()` draws from. `None` rejects the call.
    fn random(&mut self) -> Option<&mut Random> {
        None
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprNode {
    Value(i64),
    Real(f64),
    Bool(bool),
    Str(String),
    Symbol { name: String, root: bool },
    CurrentAddress,
    LoopCounter,
    MacroFn(MacroFn, Box<Operand>),
    Function(String, usize),
    Plus,
    Neg,
    Invert,
    NotLogical,
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    ShiftLeft,
    ShiftRight,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
    Equal,
    NotEqual,
    And,
    Xor,
    Or,
    AndLogical,
    OrLogical,
    Ternary,
}

/// An expression in postfix order. Evaluation never mutates it.
#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    nodes: Vec<ExprNode>,
}

impl Expr {
    #[inline]
    pub fn new(nodes: Vec<ExprNode>) -> Self {
        Self { nodes }
    }

    #[inline]
    pub fn nodes(&self) -> &[ExprNode] {
        &self.nodes
    }

    /// A lone string literal.
    pub fn as_str_literal(&self) -> Option<&str> {
        match self.nodes.as_slice() {
            [ExprNode::Str(text)] => Some(text),
            _ => None,
        }
    }

    pub fn evaluate<C: EvalContext>(&self, ctx: &mut C, late_binding: bool) -> EvalResult {
        match self.eval(ctx, late_binding) {
            Ok(Some(value)) => EvalResult::Resolved(value),
            Ok(None) => EvalResult::Deferred,
            Err(e) => EvalResult::Error(e),
        }
    }

    fn eval<C: EvalContext>(&self, ctx: &mut C, late_binding: bool) -> Result<Option<Value>, EvalError> {
        let mut scratch = Vec::new();
        let mut index = 0;
        while index < self.nodes.len() {
            match &self.nodes[index] {
                ExprNode::Value(value) => scratch.push(Value::Int(*value)),
                ExprNode::Real(value) => scratch.push(Value::Real(*value)),
                ExprNode::Bool(value) => scratch.push(Value::Bool(*value)),
                ExprNode::Str(text) => scratch.push(Value::Str(text.clone())),
                ExprNode::Symbol { name, root } => match ctx.symbol(name, *root) {
                    SymbolValue::Resolved(value) => scratch.push(value),
                    _ if late_binding => return Ok(None),
                    _ => return Err(EvalError::UnresolvedSymbol(name.clone())),
                },
                ExprNode::CurrentAddress => scratch.push(Value::Int(ctx.current_address())),
                ExprNode::LoopCounter => match ctx.loop_counter() {
                    Some(counter) => scratch.push(Value::Int(counter)),
                    None => return Err(EvalError::LoopCounterOutsideLoop),
                },
                ExprNode::MacroFn(func, operand) => scratch.push(Value::Bool(func.test(operand))),
                ExprNode::Function(name, argc) => {
                    let args = scratch.split_off(scratch.len().saturating_sub(*argc));
                    let value = if name.eq_ignore_ascii_case("rnd") {
                        rnd(ctx, &args)?
                    } else {
                        call(name, args)?
                    };
                    scratch.push(value);
                }
                ExprNode::Ternary => {
                    let rhs = pop(&mut scratch);
                    let lhs = pop(&mut scratch);
                    let condition = pop(&mut scratch);
                    scratch.push(if condition.is_true() { lhs } else { rhs });
                }
                node @ (ExprNode::Plus | ExprNode::Neg | ExprNode::Invert | ExprNode::NotLogical) => {
                    let rhs = pop(&mut scratch);
                    scratch.push(unary(node, rhs)?);
                }
                node => {
                    let rhs = pop(&mut scratch);
                    let lhs = pop(&mut scratch);
                    scratch.push(binary(node, lhs, rhs)?);
                }
            }
            index += 1;
        }
        Ok(scratch.pop())
    }
}

#[inline]
fn pop(scratch: &mut Vec<Value>) -> Value {
    scratch.pop().unwrap_or(Value::Int(0))
}

fn int(value: &Value, op: &'static str) -> Result<i64, EvalError> {
    match value {
        Value::Str(_) => Err(EvalError::StringOperand(op)),
        Value::Real(_) => Err(EvalError::RealOperand(op)),
        _ => Ok(value.integral().unwrap_or_default()),
    }
}

fn real(value: &Value, op: &'static str) -> Result<f64, EvalError> {
    value.as_real().ok_or(EvalError::StringOperand(op))
}

fn unary(node: &ExprNode, rhs: Value) -> Result<Value, EvalError> {
    let value = match (node, &rhs) {
        (ExprNode::Plus, Value::Real(value)) => Value::Real(*value),
        (ExprNode::Neg, Value::Real(value)) => Value::Real(-value),
        (ExprNode::NotLogical, Value::Real(value)) => Value::Bool(*value == 0.0),
        (ExprNode::Plus, _) => Value::Int(int(&rhs, "+")?),
        (ExprNode::Neg, _) => Value::Int(int(&rhs, "-")?.wrapping_neg()),
        (ExprNode::Invert, _) => Value::Int(!int(&rhs, "~")?),
        _ => Value::Bool(int(&rhs, "!")? == 0),
    };
    Ok(value)
}

fn binary(node: &ExprNode, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    match (node, &lhs, &rhs) {
        (ExprNode::Add, Value::Str(lhs), Value::Str(rhs)) => {
            return Ok(Value::Str(format!("{lhs}{rhs}")))
        }
        (ExprNode::Equal, Value::Str(lhs), Value::Str(rhs)) => return Ok(Value::Bool(lhs == rhs)),
        (ExprNode::NotEqual, Value::Str(lhs), Value::Str(rhs)) => return Ok(Value::Bool(lhs != rhs)),
        (_, Value::Real(_), _) | (_, _, Value::Real(_)) => return real_binary(node, &lhs, &rhs),
        _ => {}
    }

    let op = operator(node);
    let lhs = int(&lhs, op)?;
    let rhs = int(&rhs, op)?;
    let value = match node {
        ExprNode::Mul => lhs.wrapping_mul(rhs),
        ExprNode::Div if rhs == 0 => return Err(EvalError::DivisionByZero),
        ExprNode::Div => lhs.wrapping_div(rhs),
        ExprNode::Rem if rhs == 0 => return Err(EvalError::DivisionByZero),
        ExprNode::Rem => lhs.wrapping_rem(rhs),
        ExprNode::Add => lhs.wrapping_add(rhs),
        ExprNode::Sub => lhs.wrapping_sub(rhs),
        ExprNode::ShiftLeft => lhs.wrapping_shl(rhs as u32),
        ExprNode::ShiftRight => lhs.wrapping_shr(rhs as u32),
        ExprNode::LessThan => return Ok(Value::Bool(lhs < rhs)),
        ExprNode::LessThanEqual => return Ok(Value::Bool(lhs <= rhs)),
        ExprNode::GreaterThan => return Ok(Value::Bool(lhs > rhs)),
        ExprNode::GreaterThanEqual => return Ok(Value::Bool(lhs >= rhs)),
        ExprNode::Equal => return Ok(Value::Bool(lhs == rhs)),
        ExprNode::NotEqual => return Ok(Value::Bool(lhs != rhs)),
        ExprNode::And => lhs & rhs,
        ExprNode::Xor => lhs ^ rhs,
        ExprNode::Or => lhs | rhs,
        ExprNode::AndLogical => return Ok(Value::Bool(lhs != 0 && rhs != 0)),
        ExprNode::OrLogical => return Ok(Value::Bool(lhs != 0 || rhs != 0)),
        _ => 0,
    };
    Ok(Value::Int(value))
}

/// Binary operators with at least one real operand.
fn real_binary(node: &ExprNode, lhs: &Value, rhs: &Value) -> Result<Value, EvalError> {
    let op = operator(node);
    let lhs = real(lhs, op)?;
    let rhs = real(rhs, op)?;
    let value = match node {
        ExprNode::Mul => lhs * rhs,
        ExprNode::Div if rhs.abs() < f64::EPSILON => return Err(EvalError::DivisionByZero),
        ExprNode::Div => lhs / rhs,
        ExprNode::Add => lhs + rhs,
        ExprNode::Sub => lhs - rhs,
        ExprNode::LessThan => return Ok(Value::Bool(lhs < rhs)),
        ExprNode::LessThanEqual => return Ok(Value::Bool(lhs <= rhs)),
        ExprNode::GreaterThan => return Ok(Value::Bool(lhs > rhs)),
        ExprNode::GreaterThanEqual => return Ok(Value::Bool(lhs >= rhs)),
        ExprNode::Equal => return Ok(Value::Bool(lhs == rhs)),
        ExprNode::NotEqual => return Ok(Value::Bool(lhs != rhs)),
        ExprNode::AndLogical => return Ok(Value::Bool(lhs != 0.0 && rhs != 0.0)),
        ExprNode::OrLogical => return Ok(Value::Bool(lhs != 0.0 || rhs != 0.0)),
        _ => return Err(EvalError::RealOperand(op)),
    };
    Ok(Value::from_real(value))
}

fn operator(node: &ExprNode) -> &'static str {
    match node {
        ExprNode::Mul => "*",
        ExprNode::Div => "/",
        ExprNode::Rem => "%",
        ExprNode::Add => "+",
        ExprNode::Sub => "-",
        ExprNode::ShiftLeft => "<<",
        ExprNode::ShiftRight => ">>",
        ExprNode::LessThan => "<",
        ExprNode::LessThanEqual => "<=",
        ExprNode::GreaterThan => ">",
        ExprNode::GreaterThanEqual => ">=",
        ExprNode::Equal => "==",
        ExprNode::NotEqual => "!=",
        ExprNode::And => "&",
        ExprNode::Xor => "^",
        ExprNode::Or => "|",
        ExprNode::AndLogical => "&&",
        ExprNode::OrLogical => "||",
        _ => "?",
    }
}

/// `rnd()` draws from 0..0x10000, `rnd(from, to)` from `from..to`.
fn rnd<C: EvalContext>(ctx: &mut C, args: &[Value]) -> Result<Value, EvalError> {
    let signature = || EvalError::Signature("rnd".to_string());
    let (from, to) = match args {
        [] => (0, 0x10000),
        [from, to] => (
            from.integral().ok_or_else(signature)?,
            to.integral().ok_or_else(signature)?,
        ),
        _ => return Err(signature()),
    };
    let random = ctx
        .random()
        .ok_or_else(|| EvalError::Function("rnd() cannot be used here".into()))?;
    Ok(Value::Int(random.integer(from, to)))
}

/// One-argument functions over reals.
fn real_function(name: &str) -> Option<fn(f64) -> f64> {
    let func: fn(f64) -> f64 = match name {
        "sin" => f64::sin,
        "cos" => f64::cos,
        "tan" => f64::tan,
        "asin" => f64::asin,
        "acos" => f64::acos,
        "atan" => f64::atan,
        "sinh" => f64::sinh,
        "cosh" => f64::cosh,
        "tanh" => f64::tanh,
        "sqrt" => f64::sqrt,
        "exp" => f64::exp,
        "log10" => f64::log10,
        "floor" | "int" => f64::floor,
        "ceiling" => f64::ceil,
        "truncate" => f64::trunc,
        // Halves round up, toward positive infinity.
        "round" => |x: f64| (x + 0.5).floor(),
        "frac" => |x: f64| x - x.floor(),
        _ => return None,
    };
    Some(func)
}

/// Built-in functions, dispatched on name and argument shape.
fn call(name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
    use Value::{Int, Real, Str};

    let signature = || EvalError::Signature(name.to_string());
    let lower = name.to_ascii_lowercase();
    if let Some(func) = real_function(&lower) {
        return match args.as_slice() {
            [x] => Ok(Value::from_real(func(x.as_real().ok_or_else(signature)?))),
            _ => Err(signature()),
        };
    }
    if let ("str", [value]) = (lower.as_str(), args.as_slice()) {
        return Ok(Str(value.to_string()));
    }

    // Booleans pass wherever integers do.
    let args: Vec<Value> = args
        .into_iter()
        .map(|value| match value {
            Value::Bool(value) => Int(value as i64),
            value => value,
        })
        .collect();
    let reals = || -> Result<Vec<f64>, EvalError> {
        args.iter().map(|value| value.as_real().ok_or_else(signature)).collect()
    };
    let value = match (lower.as_str(), args.as_slice()) {
        ("pi", []) => Real(std::f64::consts::PI),
        ("nat", []) => Real(std::f64::consts::E),
        ("abs", [Int(n)]) => Int(n.wrapping_abs()),
        ("abs", [Real(x)]) => Value::from_real(x.abs()),
        ("sign", [Int(n)]) => Int(n.signum()),
        ("sign", [Real(x)]) => Int(if *x == 0.0 { 0 } else { x.signum() as i64 }),
        ("min", [Int(a), Int(b)]) => Int(*a.min(b)),
        ("max", [Int(a), Int(b)]) => Int(*a.max(b)),
        ("min", [_, _]) => match reals()?.as_slice() {
            [a, b] => Value::from_real(a.min(*b)),
            _ => return Err(signature()),
        },
        ("max", [_, _]) => match reals()?.as_slice() {
            [a, b] => Value::from_real(a.max(*b)),
            _ => return Err(signature()),
        },
        ("atan2", [_, _]) => match reals()?.as_slice() {
            [y, x] => Value::from_real(y.atan2(*x)),
            _ => return Err(signature()),
        },
        ("pow", [_, _]) => match reals()?.as_slice() {
            [x, y] => Value::from_real(x.powf(*y)),
            _ => return Err(signature()),
        },
        ("log", [_]) => match reals()?.as_slice() {
            [x] => Value::from_real(x.ln()),
            _ => return Err(signature()),
        },
        ("log", [_, _]) => match reals()?.as_slice() {
            [x, base] if *base == 0.0 => Value::from_real(x.ln()),
            [x, base] => Value::from_real(x.ln() / base.ln()),
            _ => return Err(signature()),
        },
        ("low" | "lowbyte", [Int(n)]) => Int(n & 0xFF),
        ("high" | "highbyte", [Int(n)]) => Int((n >> 8) & 0xFF),
        ("word", [Int(n)]) => Int(n & 0xFFFF),
        ("len" | "length", [Str(s)]) => Int(s.chars().count() as i64),
        ("left", [Str(s), Int(n)]) => Str(s.chars().take((*n).max(0) as usize).collect()),
        ("right", [Str(s), Int(n)]) => {
            let count = s.chars().count();
            let take = ((*n).max(0) as usize).min(count);
            Str(s.chars().skip(count - take).collect())
        }
        ("substr", [Str(s), Int(start), Int(n)]) => Str(
            s.chars()
                .skip((*start).max(0) as usize)
                .take((*n).max(0) as usize)
                .collect(),
        ),
        ("fill", [Str(s), Int(n)]) => {
            let count = (*n).max(0) as usize;
            if s.chars().count().saturating_mul(count) > 0x4000 {
                return Err(EvalError::Function(
                    "the result of fill() would be longer than 0x4000 characters".into(),
                ));
            }
            Str(s.repeat(count))
        }
        ("lowercase" | "lcase", [Str(s)]) => Str(s.to_lowercase()),
        ("uppercase" | "ucase", [Str(s)]) => Str(s.to_uppercase()),
        ("scraddr", [Int(line), Int(col)]) => {
            check_screen(*line, *col)?;
            let da = 0x4000 | (col >> 3) | (line << 5);
            Int(((da & 0xF81F) | ((da & 0x0700) >> 3) | ((da & 0x00E0) << 3)) & 0xFFFF)
        }
        ("attraddr", [Int(line), Int(col)]) => {
            check_screen(*line, *col)?;
            Int(0x5800 + (line >> 3) * 32 + (col >> 3))
        }
        ("ink", [Int(n)]) => Int(n & 0x07),
        ("paper", [Int(n)]) => Int((n & 0x07) << 3),
        ("bright", [Int(n)]) => Int(if *n == 0 { 0x00 } else { 0x40 }),
        ("flash", [Int(n)]) => Int(if *n == 0 { 0x00 } else { 0x80 }),
        ("attr", [Int(ink), Int(paper), rest @ ..]) if rest.len() <= 2 => {
            let mut attr = (ink & 0x07) | ((paper & 0x07) << 3);
            for (value, bit) in rest.iter().zip([0x40, 0x80]) {
                match value {
                    Int(0) => {}
                    Int(_) => attr |= bit,
                    _ => return Err(signature()),
                }
            }
            Int(attr & 0xFF)
        }
        (
            "pi" | "nat" | "abs" | "sign" | "min" | "max" | "atan2" | "pow" | "log" | "low"
            | "lowbyte" | "high" | "highbyte" | "word" | "len" | "length" | "left" | "right"
            | "substr" | "fill" | "lowercase" | "lcase" | "uppercase" | "ucase" | "str"
            | "scraddr" | "attraddr" | "ink" | "paper" | "bright" | "flash" | "attr",
            _,
        ) => return Err(signature()),
        _ => return Err(EvalError::UnknownFunction(name.to_string())),
    };
    Ok(value)
}

fn check_screen(line: i64, col: i64) -> Result<(), EvalError> {
    if !(0..=191).contains(&line) {
        return Err(EvalError::Function(format!(
            "the line argument must be between 0 and 191, not {line}"
        )));
    }
    if !(0..=255).contains(&col) {
        return Err(EvalError::Function(format!(
            "the column argument must be between 0 and 255, not {col}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use fxhash::FxHashMap;

    use super::*;

    #[derive(Default)]
    struct MapContext {
        symbols: FxHashMap<String, SymbolValue>,
        counter: Option<i64>,
        random: Option<Random>,
    }

    impl EvalContext for MapContext {
        fn current_address(&self) -> i64 {
            0x8000
        }

        fn loop_counter(&self) -> Option<i64> {
            self.counter
        }

        fn symbol(&mut self, name: &str, _root: bool) -> SymbolValue {
            self.symbols.get(name).cloned().unwrap_or(SymbolValue::Undefined)
        }

        fn random(&mut self) -> Option<&mut Random> {
            self.random.as_mut()
        }
    }

    fn eval(nodes: Vec<ExprNode>) -> EvalResult {
        Expr::new(nodes).evaluate(&mut MapContext::default(), false)
    }

    fn func(name: &str, args: Vec<ExprNode>) -> Vec<ExprNode> {
        let argc = args.len();
        let mut nodes = args;
        nodes.push(ExprNode::Function(name.into(), argc));
        nodes
    }

    fn sym(name: &str) -> ExprNode {
        ExprNode::Symbol {
            name: name.into(),
            root: false,
        }
    }

    #[test]
    fn arithmetic() {
        let mut ctx = MapContext::default();
        // (2 + 3) * 4 - 1
        let expr = Expr::new(vec![
            ExprNode::Value(2),
            ExprNode::Value(3),
            ExprNode::Add,
            ExprNode::Value(4),
            ExprNode::Mul,
            ExprNode::Value(1),
            ExprNode::Sub,
        ]);
        assert_eq!(EvalResult::Resolved(Value::Int(19)), expr.evaluate(&mut ctx, false));
    }

    #[test]
    fn ternary_and_logic() {
        let mut ctx = MapContext::default();
        let expr = Expr::new(vec![
            ExprNode::Value(1),
            ExprNode::Value(0),
            ExprNode::OrLogical,
            ExprNode::Value(10),
            ExprNode::Value(20),
            ExprNode::Ternary,
        ]);
        assert_eq!(EvalResult::Resolved(Value::Int(10)), expr.evaluate(&mut ctx, false));
    }

    #[test]
    fn late_binding() {
        let mut ctx = MapContext::default();
        let expr = Expr::new(vec![sym("later"), ExprNode::Value(1), ExprNode::Add]);
        assert_eq!(EvalResult::Deferred, expr.evaluate(&mut ctx, true));
        assert_eq!(
            EvalResult::Error(EvalError::UnresolvedSymbol("later".into())),
            expr.evaluate(&mut ctx, false)
        );

        ctx.symbols.insert("later".into(), SymbolValue::Pending);
        assert_eq!(EvalResult::Deferred, expr.evaluate(&mut ctx, true));

        ctx.symbols
            .insert("later".into(), SymbolValue::Resolved(Value::Int(0x1233)));
        assert_eq!(
            EvalResult::Resolved(Value::Int(0x1234)),
            expr.evaluate(&mut ctx, true)
        );
    }

    #[test]
    fn division_by_zero() {
        let mut ctx = MapContext::default();
        ctx.symbols
            .insert("value".into(), SymbolValue::Resolved(Value::Int(0)));
        let expr = Expr::new(vec![ExprNode::Value(1), sym("value"), ExprNode::Div]);
        let result = expr.evaluate(&mut ctx, true);
        assert_eq!(EvalResult::Error(EvalError::DivisionByZero), result);
        assert_eq!("Z0606", EvalError::DivisionByZero.code());
    }

    #[test]
    fn current_address_and_counter() {
        let mut ctx = MapContext::default();
        let expr = Expr::new(vec![ExprNode::CurrentAddress, ExprNode::LoopCounter, ExprNode::Add]);
        assert_eq!(
            EvalResult::Error(EvalError::LoopCounterOutsideLoop),
            expr.evaluate(&mut ctx, true)
        );
        ctx.counter = Some(3);
        assert_eq!(
            EvalResult::Resolved(Value::Int(0x8003)),
            expr.evaluate(&mut ctx, true)
        );
    }

    #[test]
    fn strings() {
        let mut ctx = MapContext::default();
        let concat = Expr::new(vec![
            ExprNode::Str("ab".into()),
            ExprNode::Str("cd".into()),
            ExprNode::Add,
        ]);
        assert_eq!(
            EvalResult::Resolved(Value::Str("abcd".into())),
            concat.evaluate(&mut ctx, false)
        );

        let bad = Expr::new(vec![ExprNode::Str("ab".into()), ExprNode::Value(1), ExprNode::Mul]);
        assert_eq!(
            EvalResult::Error(EvalError::StringOperand("*")),
            bad.evaluate(&mut ctx, false)
        );
    }

    #[test]
    fn functions() {
        let mut ctx = MapContext::default();
        let cases = [
            (vec![ExprNode::Value(0x1234), ExprNode::Function("high".into(), 1)], Value::Int(0x12)),
            (vec![ExprNode::Value(0x1234), ExprNode::Function("LOW".into(), 1)], Value::Int(0x34)),
            (
                vec![ExprNode::Value(3), ExprNode::Value(7), ExprNode::Function("max".into(), 2)],
                Value::Int(7),
            ),
            (
                vec![ExprNode::Str("hello".into()), ExprNode::Function("len".into(), 1)],
                Value::Int(5),
            ),
            (
                vec![
                    ExprNode::Value(0),
                    ExprNode::Value(0),
                    ExprNode::Function("scraddr".into(), 2),
                ],
                Value::Int(0x4000),
            ),
            (
                vec![
                    ExprNode::Value(1),
                    ExprNode::Value(2),
                    ExprNode::Value(1),
                    ExprNode::Function("attr".into(), 3),
                ],
                Value::Int(0x51),
            ),
        ];
        for (nodes, expected) in cases {
            assert_eq!(
                EvalResult::Resolved(expected),
                Expr::new(nodes).evaluate(&mut ctx, false)
            );
        }

        let unknown = Expr::new(vec![ExprNode::Function("nope".into(), 0)]);
        assert_eq!(
            EvalResult::Error(EvalError::UnknownFunction("nope".into())),
            unknown.evaluate(&mut ctx, false)
        );
        let mismatch = Expr::new(vec![ExprNode::Value(1), ExprNode::Function("len".into(), 1)]);
        assert_eq!(
            EvalResult::Error(EvalError::Signature("len".into())),
            mismatch.evaluate(&mut ctx, false)
        );
    }

    #[test]
    fn reals_and_booleans() {
        use ExprNode::{Bool, Real, Value as Int};

        let cases = [
            (vec![Real(1.5), Int(3), ExprNode::Mul], Value::Real(4.5)),
            (vec![Real(1.5), Real(0.5), ExprNode::Add], Value::Int(2)),
            (vec![Int(7), Real(2.0), ExprNode::Div], Value::Real(3.5)),
            (vec![Int(7), Int(2), ExprNode::Div], Value::Int(3)),
            (vec![Int(1), Real(1.5), ExprNode::LessThan], Value::Bool(true)),
            (vec![Int(2), Int(2), ExprNode::Equal], Value::Bool(true)),
            (vec![Bool(true), Int(1), ExprNode::Add], Value::Int(2)),
            (vec![Real(2.5), ExprNode::Neg], Value::Real(-2.5)),
            (vec![Bool(false), ExprNode::NotLogical], Value::Bool(true)),
        ];
        for (nodes, expected) in cases {
            assert_eq!(EvalResult::Resolved(expected), eval(nodes));
        }

        assert_eq!(
            EvalResult::Error(EvalError::RealOperand("&")),
            eval(vec![Real(1.5), Int(1), ExprNode::And])
        );
        assert_eq!(
            EvalResult::Error(EvalError::DivisionByZero),
            eval(vec![Int(1), Real(0.0), ExprNode::Div])
        );
        assert_eq!(Some(-2), Value::Real(-1.5).as_int());
        assert_eq!("true", Value::Bool(true).to_string());
        assert_eq!("0.25", Value::Real(0.25).to_string());
    }

    #[test]
    fn math_functions() {
        use ExprNode::{Real, Value as Int};

        let cases = [
            (func("sqrt", vec![Int(16)]), Value::Int(4)),
            (func("pow", vec![Int(2), Int(10)]), Value::Int(1024)),
            (func("floor", vec![Real(2.7)]), Value::Int(2)),
            (func("ceiling", vec![Real(2.1)]), Value::Int(3)),
            (func("round", vec![Real(2.5)]), Value::Int(3)),
            (func("round", vec![Real(-2.5)]), Value::Int(-2)),
            (func("truncate", vec![Real(-2.7)]), Value::Int(-2)),
            (func("int", vec![Real(-1.5)]), Value::Int(-2)),
            (func("frac", vec![Real(2.75)]), Value::Real(0.75)),
            (func("sin", vec![Int(0)]), Value::Int(0)),
            (func("log", vec![Int(8), Int(2)]), Value::Int(3)),
            (func("log10", vec![Int(1000)]), Value::Int(3)),
            (func("pi", vec![]), Value::Real(std::f64::consts::PI)),
            (func("nat", vec![]), Value::Real(std::f64::consts::E)),
            (func("abs", vec![Real(-1.5)]), Value::Real(1.5)),
            (func("sign", vec![Real(-2.5)]), Value::Int(-1)),
            (func("min", vec![Real(1.5), Int(2)]), Value::Real(1.5)),
            (func("str", vec![ExprNode::Bool(true)]), Value::Str("true".into())),
            (func("str", vec![Real(1.5)]), Value::Str("1.5".into())),
            (func("high", vec![ExprNode::Bool(true)]), Value::Int(0)),
        ];
        for (nodes, expected) in cases {
            assert_eq!(EvalResult::Resolved(expected), eval(nodes));
        }

        assert_eq!(
            EvalResult::Error(EvalError::Signature("sqrt".into())),
            eval(func("sqrt", vec![ExprNode::Str("x".into())]))
        );
        assert_eq!(
            EvalResult::Error(EvalError::Signature("pow".into())),
            eval(func("pow", vec![Int(2)]))
        );
    }

    #[test]
    fn random_numbers() {
        let rnd = Expr::new(func("rnd", vec![]));
        let ranged = Expr::new(func("rnd", vec![ExprNode::Value(10), ExprNode::Value(20)]));

        let mut ctx = MapContext::default();
        assert!(matches!(rnd.evaluate(&mut ctx, false), EvalResult::Error(EvalError::Function(_))));

        ctx.random = Some(Random::new(42));
        let drawn: Vec<_> = (0..3).map(|_| rnd.evaluate(&mut ctx, false)).collect();
        assert_eq!(
            vec![
                EvalResult::Resolved(Value::Int(21)),
                EvalResult::Resolved(Value::Int(34379)),
                EvalResult::Resolved(Value::Int(48196)),
            ],
            drawn
        );

        ctx.random = Some(Random::new(42));
        let drawn: Vec<_> = (0..3).map(|_| ranged.evaluate(&mut ctx, false)).collect();
        assert_eq!(
            vec![
                EvalResult::Resolved(Value::Int(10)),
                EvalResult::Resolved(Value::Int(15)),
                EvalResult::Resolved(Value::Int(17)),
            ],
            drawn
        );

        let mismatch = Expr::new(func("rnd", vec![ExprNode::Real(1.5), ExprNode::Value(2)]));
        assert_eq!(
            EvalResult::Error(EvalError::Signature("rnd".into())),
            mismatch.evaluate(&mut ctx, false)
        );
    }
}
