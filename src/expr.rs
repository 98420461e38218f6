//! Expression engine (component C2): condition evaluation, the arithmetic
//! expression evaluator, and template-string interpolation with embedded
//! mutation.
//!
//! All three public entry points are infallible at the call site: every
//! internal [`ExprError`] is swallowed and converted into "no-op, value
//! unchanged" per the specification's error policy (§7) — bad arithmetic,
//! an unknown variable in a mutation, or a string operand in arithmetic
//! never unwinds past this module.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::{
    error::ExprError,
    variable::{Value, VarType, VariableStore},
};

fn brace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{[^{}]*\}").unwrap())
}

fn bracket_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[(%[^\[\]]+)\]").unwrap())
}

fn var_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"%[A-Za-z_][A-Za-z0-9_]*").unwrap())
}

/// Comparable operand produced by resolving one side of a condition.
enum Operand {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl Operand {
    fn as_num(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(f) => Some(*f),
            Self::Str(_) | Self::Bool(_) => None,
        }
    }
}

/// Finds the first relational operator in `s`, preferring the two-character
/// forms over their one-character prefixes at the same starting position.
fn find_operator(s: &str) -> Option<(usize, &'static str)> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if i + 1 < bytes.len() {
            match &s[i..=i + 1] {
                "<=" => return Some((i, "<=")),
                ">=" => return Some((i, ">=")),
                "==" => return Some((i, "==")),
                "!=" => return Some((i, "!=")),
                _ => {}
            }
        }
        match bytes[i] {
            b'<' => return Some((i, "<")),
            b'>' => return Some((i, ">")),
            _ => {}
        }
        i += 1;
    }
    None
}

fn resolve_operand(store: &VariableStore, token: &str) -> Option<Operand> {
    if token.starts_with('%') {
        return match store.get(token)? {
            Value::Integer(n) => Some(Operand::Int(*n)),
            Value::Float(f) => Some(Operand::Float(*f)),
            Value::Boolean(b) => Some(Operand::Bool(*b)),
            Value::String(s) => Some(Operand::Str(s.clone())),
            Value::Point(_) | Value::Rect(_) => None,
        };
    }
    if let Ok(n) = token.parse::<i64>() {
        return Some(Operand::Int(n));
    }
    if let Ok(f) = token.parse::<f64>() {
        return Some(Operand::Float(f));
    }
    Some(Operand::Str(token.to_owned()))
}

fn apply_ord<T: PartialOrd>(a: T, b: T, op: &str) -> bool {
    match op {
        "<" => a < b,
        ">" => a > b,
        "<=" => a <= b,
        ">=" => a >= b,
        "==" => a == b,
        "!=" => a != b,
        _ => false,
    }
}

fn compare(store: &VariableStore, left: &str, right: &str, op: &str) -> bool {
    let (Some(l), Some(r)) = (resolve_operand(store, left), resolve_operand(store, right)) else {
        return false;
    };
    match (l, r) {
        (Operand::Int(a), Operand::Int(b)) => apply_ord(a, b, op),
        (Operand::Str(a), Operand::Str(b)) => apply_ord(a.as_str(), b.as_str(), op),
        (Operand::Bool(a), Operand::Bool(b)) => match op {
            "==" => a == b,
            "!=" => a != b,
            _ => false,
        },
        (l, r) => match (l.as_num(), r.as_num()) {
            (Some(a), Some(b)) => apply_ord(a, b, op),
            _ => false,
        },
    }
}

/// Evaluates a condition string against the store.
///
/// Finds a relational operator (longest match preferred); absent that, a
/// bare variable name is tested for truthiness, and anything else is
/// attempted as a nonzero-is-true arithmetic expression. Type-incompatible
/// comparisons are not errors — they simply evaluate to `false`.
#[must_use]
pub fn evaluate_condition(store: &VariableStore, condition: &str) -> bool {
    if let Some((pos, op)) = find_operator(condition) {
        let left = condition[..pos].trim();
        let right = condition[pos + op.len()..].trim();
        return compare(store, left, right, op);
    }

    let trimmed = condition.trim();
    if trimmed.starts_with('%') {
        return store.get(trimmed).is_some_and(Value::truthy);
    }

    eval_arithmetic(store, trimmed).map(|n| n != 0.0).unwrap_or(false)
}

/// Substitutes every `%name` token in `expr` with its numeric string form.
/// Fails if a referenced variable is undefined or string-typed.
fn substitute_numeric(store: &VariableStore, expr: &str) -> Result<String, ExprError> {
    let mut err = None;
    let substituted = var_token_re().replace_all(expr, |caps: &Captures| {
        let name = &caps[0];
        match store.get(name) {
            Some(Value::Integer(n)) => n.to_string(),
            Some(Value::Float(f)) => f.to_string(),
            Some(Value::Boolean(b)) => if *b { "1" } else { "0" }.to_string(),
            Some(Value::String(_)) => {
                err.get_or_insert_with(|| ExprError::StringInArithmetic(name.to_owned()));
                String::new()
            }
            Some(Value::Point(_) | Value::Rect(_)) | None => {
                err.get_or_insert_with(|| ExprError::NoSuchVariable(name.to_owned()));
                String::new()
            }
        }
    });
    match err {
        Some(e) => Err(e),
        None => Ok(substituted.into_owned()),
    }
}

#[derive(Clone, Copy)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

impl Op {
    fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Self::Add),
            '-' => Some(Self::Sub),
            '*' => Some(Self::Mul),
            '/' => Some(Self::Div),
            _ => None,
        }
    }

    fn precedence(self) -> u8 {
        match self {
            Self::Add | Self::Sub => 1,
            Self::Mul | Self::Div => 2,
        }
    }

    fn apply(self, a: f64, b: f64) -> Result<f64, ExprError> {
        match self {
            Self::Add => Ok(a + b),
            Self::Sub => Ok(a - b),
            Self::Mul => Ok(a * b),
            Self::Div => {
                if b == 0.0 {
                    Err(ExprError::DivisionByZero)
                } else {
                    Ok(a / b)
                }
            }
        }
    }
}

enum Token {
    Number(f64),
    Operator(Op),
}

fn tokenize(expr: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = expr.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || c == '.' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let number: String = chars[start..i].iter().collect();
            let value = number
                .parse::<f64>()
                .map_err(|_| ExprError::Malformed(expr.to_owned()))?;
            tokens.push(Token::Number(value));
        } else if let Some(op) = Op::from_char(c) {
            tokens.push(Token::Operator(op));
            i += 1;
        } else {
            return Err(ExprError::Malformed(expr.to_owned()));
        }
    }
    Ok(tokens)
}

/// Converts infix tokens to RPN via shunting-yard, then evaluates in double
/// precision. Matches left-to-right associativity for equal-precedence
/// operators.
fn evaluate_rpn(tokens: Vec<Token>) -> Result<f64, ExprError> {
    let mut output: Vec<Token> = Vec::new();
    let mut op_stack: Vec<Op> = Vec::new();

    for token in tokens {
        match token {
            Token::Number(_) => output.push(token),
            Token::Operator(op) => {
                while let Some(top) = op_stack.last() {
                    if top.precedence() >= op.precedence() {
                        output.push(Token::Operator(op_stack.pop().unwrap()));
                    } else {
                        break;
                    }
                }
                op_stack.push(op);
            }
        }
    }
    while let Some(op) = op_stack.pop() {
        output.push(Token::Operator(op));
    }

    let mut stack: Vec<f64> = Vec::new();
    for token in output {
        match token {
            Token::Number(n) => stack.push(n),
            Token::Operator(op) => {
                let b = stack.pop().ok_or_else(|| ExprError::Malformed("not enough operands".into()))?;
                let a = stack.pop().ok_or_else(|| ExprError::Malformed("not enough operands".into()))?;
                stack.push(op.apply(a, b)?);
            }
        }
    }

    if stack.len() != 1 {
        return Err(ExprError::Malformed("unbalanced expression".into()));
    }
    Ok(stack[0])
}

/// Evaluates an arithmetic expression in double precision, substituting
/// `%`-referenced variables with their numeric form first.
pub fn eval_arithmetic(store: &VariableStore, expr: &str) -> Result<f64, ExprError> {
    let substituted = substitute_numeric(store, expr)?;
    let tokens = tokenize(&substituted)?;
    evaluate_rpn(tokens)
}

/// Casts an arithmetic result into the target variable type at the
/// assignment site: integer truncates toward zero, boolean is `result != 0`.
fn cast_to(ty: VarType, result: f64) -> Value {
    match ty {
        VarType::Integer => Value::Integer(result.trunc() as i64),
        VarType::Float => Value::Float(result),
        VarType::Boolean => Value::Boolean(result != 0.0),
        VarType::String => Value::String(result.to_string()),
        // Point/Rect are not valid arithmetic assignment targets; callers
        // should not reach this with those types, but fall back to a
        // string-like representation rather than panicking.
        VarType::Point | VarType::Rect => Value::String(result.to_string()),
    }
}

/// Applies a single mutation expression (`%name++`, `%name--`, or
/// `%name=<expr>`) to the store. Whitespace is stripped first.
pub fn apply_mutation(store: &mut VariableStore, expression: &str) -> Result<(), ExprError> {
    let op: String = expression.chars().filter(|c| !c.is_whitespace()).collect();

    if let Some(name) = op.strip_suffix("++") {
        return increment(store, name, 1);
    }
    if let Some(name) = op.strip_suffix("--") {
        return increment(store, name, -1);
    }

    if let Some(eq_pos) = op.find('=') {
        if eq_pos == 0 {
            return Err(ExprError::Malformed(op));
        }
        let name = &op[..eq_pos];
        let expr_str = &op[eq_pos + 1..];
        let ty = match store.get(name) {
            Some(v) => v.var_type(),
            None => return Err(ExprError::NoSuchVariable(name.to_owned())),
        };
        let value = evaluate_rhs(store, expr_str, ty)?;
        store.set(name, value).map_err(ExprError::from)?;
        return Ok(());
    }

    Err(ExprError::Malformed(op))
}

/// `true` if `s` is, in its entirety, a single `%name` reference with no
/// surrounding arithmetic — the direct variable-to-variable copy form.
fn is_bare_variable(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some('%') => {}
        _ => return false,
    }
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Coerces a source value to the target type, following the same cross-type
/// table as a bare-variable assignment RHS: numeric types widen freely,
/// strings only convert to/from boolean truthiness, and points/rects never
/// participate.
fn coerce(value: &Value, target: VarType) -> Result<Value, ExprError> {
    use Value::{Boolean, Float, Integer, String as Str};
    Ok(match (value, target) {
        (Integer(n), VarType::Integer) => Integer(*n),
        (Integer(n), VarType::Float) => Float(*n as f64),
        (Integer(n), VarType::String) => Str(n.to_string()),
        (Integer(n), VarType::Boolean) => Boolean(*n != 0),
        (Float(x), VarType::Float) => Float(*x),
        (Float(x), VarType::Integer) => Integer(x.trunc() as i64),
        (Float(x), VarType::String) => Str(x.to_string()),
        (Float(x), VarType::Boolean) => Boolean(*x != 0.0),
        (Boolean(b), VarType::Boolean) => Boolean(*b),
        (Boolean(b), VarType::Integer) => Integer(i64::from(*b)),
        (Boolean(b), VarType::Float) => Float(if *b { 1.0 } else { 0.0 }),
        (Boolean(b), VarType::String) => Str(if *b { "true" } else { "false" }.to_owned()),
        (Str(s), VarType::String) => Str(s.clone()),
        (Str(s), VarType::Boolean) => Boolean(!s.is_empty()),
        _ => return Err(ExprError::TypeIncompatible),
    })
}

/// Evaluates the right-hand side of a `%name=<expr>` mutation against the
/// target type: a bare `%name` reference coerces directly between types; an
/// expression containing `+ - * /` runs through the arithmetic evaluator; a
/// plain literal is parsed per the target type.
fn evaluate_rhs(store: &VariableStore, expr_str: &str, target: VarType) -> Result<Value, ExprError> {
    if is_bare_variable(expr_str) {
        let source = store
            .get(expr_str)
            .ok_or_else(|| ExprError::NoSuchVariable(expr_str.to_owned()))?;
        return coerce(source, target);
    }
    if expr_str.chars().any(|c| "+-*/".contains(c)) {
        return Ok(cast_to(target, eval_arithmetic(store, expr_str)?));
    }
    Value::parse(target, expr_str).ok_or_else(|| ExprError::Malformed(expr_str.to_owned()))
}

fn increment(store: &mut VariableStore, name: &str, delta: i64) -> Result<(), ExprError> {
    let Some(Value::Integer(current)) = store.get(name) else {
        return Err(ExprError::NoSuchVariable(name.to_owned()));
    };
    let next = current + delta;
    store.set(name, Value::Integer(next)).map_err(ExprError::from)
}

/// Runs the log-string processor: `{mutation}` forms are executed and
/// erased (left to right), then `[%name]` forms are substituted with the
/// variable's stringified value.
#[must_use]
pub fn interpolate(store: &mut VariableStore, template: &str) -> String {
    let without_mutations = brace_re().replace_all(template, |caps: &Captures| {
        let inner = &caps[0][1..caps[0].len() - 1];
        let _ = apply_mutation(store, inner);
        String::new()
    });

    bracket_re()
        .replace_all(&without_mutations, |caps: &Captures| {
            let name = &caps[1];
            match store.get(name) {
                Some(value) => value.to_string(),
                None => caps[0].to_owned(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::{Point, Rect};

    fn store_with(defs: &[&str]) -> VariableStore {
        let mut store = VariableStore::new();
        for d in defs {
            store.parse_definition(d).unwrap();
        }
        store
    }

    #[test]
    fn condition_integer_comparison() {
        let store = store_with(&["%ix=5"]);
        assert!(evaluate_condition(&store, "%ix>0"));
        assert!(!evaluate_condition(&store, "%ix<0"));
    }

    #[test]
    fn condition_bare_variable_truthiness() {
        let store = store_with(&["%ix=5"]);
        assert!(evaluate_condition(&store, "%ix"));

        let zero = store_with(&["%ix=0"]);
        assert!(!evaluate_condition(&zero, "%ix"));
    }

    #[test]
    fn condition_string_comparison_is_lexicographic() {
        let store = store_with(&["%sA=apple", "%sB=banana"]);
        assert!(evaluate_condition(&store, "%sA<%sB"));
    }

    #[test]
    fn condition_boolean_only_supports_eq_and_ne() {
        let store = store_with(&["%bA=true", "%bB=false"]);
        assert!(evaluate_condition(&store, "%bA!=%bB"));
        assert!(!evaluate_condition(&store, "%bA<%bB"));
    }

    #[test]
    fn condition_type_incompatible_is_false_not_error() {
        let store = store_with(&["%sA=hello", "%iB=1"]);
        assert!(!evaluate_condition(&store, "%sA==%iB"));
    }

    #[test]
    fn arithmetic_precedence_and_division() {
        let store = store_with(&["%iA=2", "%iB=3"]);
        let result = eval_arithmetic(&store, "%iA+%iB*2").unwrap();
        assert_eq!(result, 8.0);
    }

    #[test]
    fn arithmetic_division_by_zero_fails() {
        let store = store_with(&["%iA=1", "%iB=0"]);
        assert!(eval_arithmetic(&store, "%iA/%iB").is_err());
    }

    #[test]
    fn arithmetic_string_variable_fails() {
        let store = store_with(&["%sA=hi"]);
        assert!(eval_arithmetic(&store, "%sA+1").is_err());
    }

    #[test]
    fn mutation_increment_and_decrement() {
        let mut store = store_with(&["%iK=0"]);
        apply_mutation(&mut store, "%iK++").unwrap();
        assert_eq!(store.get("%iK"), Some(&Value::Integer(1)));
        apply_mutation(&mut store, " %iK-- ").unwrap();
        assert_eq!(store.get("%iK"), Some(&Value::Integer(0)));
    }

    #[test]
    fn mutation_assignment_casts_to_target_type() {
        let mut store = store_with(&["%iK=0", "%fSum=0"]);
        apply_mutation(&mut store, "%iK=3*2").unwrap();
        assert_eq!(store.get("%iK"), Some(&Value::Integer(6)));
        apply_mutation(&mut store, "%fSum=1/4").unwrap();
        assert_eq!(store.get("%fSum"), Some(&Value::Float(0.25)));
    }

    #[test]
    fn mutation_bare_variable_assignment_coerces_across_types() {
        let mut store = store_with(&["%iSrc=7", "%sDst="]);
        apply_mutation(&mut store, "%sDst=%iSrc").unwrap();
        assert_eq!(store.get("%sDst"), Some(&Value::String("7".to_owned())));
    }

    #[test]
    fn mutation_arithmetic_on_string_target_stores_numeric_text() {
        let mut store = store_with(&["%iA=3", "%sDst="]);
        apply_mutation(&mut store, "%sDst=%iA+1").unwrap();
        assert_eq!(store.get("%sDst"), Some(&Value::String("4".to_owned())));
    }

    #[test]
    fn mutation_string_literal_target_takes_text_verbatim() {
        let mut store = store_with(&["%sDst="]);
        apply_mutation(&mut store, "%sDst=hello").unwrap();
        assert_eq!(store.get("%sDst"), Some(&Value::String("hello".to_owned())));
    }

    #[test]
    fn mutation_point_source_coercion_is_rejected() {
        let mut store = store_with(&["%pA=1,2", "%sDst="]);
        assert!(apply_mutation(&mut store, "%sDst=%pA").is_err());
    }

    #[test]
    fn interpolation_order_mutation_before_substitution() {
        let mut store = store_with(&["%iK=0"]);
        let output = interpolate(&mut store, "v={%iK++}[%iK]");
        assert_eq!(output, "v=1");
        assert_eq!(store.get("%iK"), Some(&Value::Integer(1)));
    }

    #[test]
    fn interpolation_leaves_unknown_bracket_refs_untouched() {
        let mut store = VariableStore::new();
        let output = interpolate(&mut store, "[%iMissing]");
        assert_eq!(output, "[%iMissing]");
    }

    #[test]
    fn point_and_rect_display_format() {
        assert_eq!(Point::new(1, 2).to_string(), "1,2");
        assert_eq!(Rect::new(1, 2, 3, 4).to_string(), "1,2,3,4");
    }
}
