//! Binary arithmetic: natural-language routing, evaluation, and the `math` node.
//!
//! The router recognises a single `a OP b` expression in free text, e.g.
//! `10 - 4`, `50 minus 25`, `multiply 4 and 6`, `subtract 5 from 10`, or the
//! same forms buried inside a longer sentence.

use std::fmt;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::{traits::ExecutionContext, ExecutableNode, NodeError, State};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MathError {
    #[error("division by zero is not allowed")]
    DivisionByZero,

    #[error("cannot convert '{0}' to a number")]
    InvalidOperand(String),

    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("integer overflow computing {0}")]
    Overflow(String),
}

// ---------------------------------------------------------------------------
// Numbers and operators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    /// Integer if the text parses as one, otherwise float.
    pub fn parse(text: &str) -> Result<Self, MathError> {
        let s = text.trim();
        if let Ok(i) = s.parse::<i64>() {
            return Ok(Number::Int(i));
        }
        s.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(Number::Float)
            .ok_or_else(|| MathError::InvalidOperand(text.to_owned()))
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    fn to_json(self) -> serde_json::Value {
        match self {
            Number::Int(i) => json!(i),
            Number::Float(f) => json!(f),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{i}"),
            Number::Float(x) => write!(f, "{x}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

impl Op {
    /// Map an operator symbol or word to an operator.
    pub fn from_token(token: &str) -> Result<Self, MathError> {
        match token.trim().to_lowercase().as_str() {
            "+" | "plus" | "add" => Ok(Op::Add),
            "-" | "minus" | "subtract" => Ok(Op::Sub),
            "*" | "x" | "×" | "times" | "multiply" => Ok(Op::Mul),
            "/" | "÷" | "divide" | "divided" | "divided by" => Ok(Op::Div),
            other => Err(MathError::UnsupportedOperator(other.to_owned())),
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Op::Add => '+',
            Op::Sub => '-',
            Op::Mul => '*',
            Op::Div => '/',
        }
    }
}

/// A parsed `lhs op rhs` expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MathExpr {
    pub lhs: Number,
    pub op: Op,
    pub rhs: Number,
}

impl fmt::Display for MathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.lhs, self.op.symbol(), self.rhs)
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Evaluate an expression. Integer operands stay integers except for
/// inexact division.
pub fn evaluate(expr: &MathExpr) -> Result<Number, MathError> {
    if let (Number::Int(a), Number::Int(b)) = (expr.lhs, expr.rhs) {
        let checked = match expr.op {
            Op::Add => a.checked_add(b),
            Op::Sub => a.checked_sub(b),
            Op::Mul => a.checked_mul(b),
            Op::Div => {
                if b == 0 {
                    return Err(MathError::DivisionByZero);
                }
                match a.checked_rem(b) {
                    Some(0) => a.checked_div(b),
                    Some(_) => return Ok(Number::Float(a as f64 / b as f64)),
                    None => None,
                }
            }
        };
        return checked
            .map(Number::Int)
            .ok_or_else(|| MathError::Overflow(expr.to_string()));
    }

    let (a, b) = (expr.lhs.as_f64(), expr.rhs.as_f64());
    let value = match expr.op {
        Op::Add => a + b,
        Op::Sub => a - b,
        Op::Mul => a * b,
        Op::Div => {
            if b == 0.0 {
                return Err(MathError::DivisionByZero);
            }
            let q = a / b;
            if (q - q.round()).abs() < 1e-12 && q.abs() < i64::MAX as f64 {
                return Ok(Number::Int(q.round() as i64));
            }
            q
        }
    };
    Ok(Number::Float(value))
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

const NUM: &str = r"-?\d+(?:\.\d+)?";

// Longer phrases first so alternation prefers them.
const OP_WORDS: &[&str] = &[
    "divided by",
    "divided",
    "divide",
    "multiply",
    "times",
    "plus",
    "add",
    "minus",
    "subtract",
];

struct Patterns {
    symbol_between: Regex,
    word_between: Regex,
    verb_first: Regex,
    subtract_from: Regex,
    loose_symbol: Regex,
    loose_word: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let words = OP_WORDS
            .iter()
            .map(|w| regex::escape(w))
            .collect::<Vec<_>>()
            .join("|");
        let build = |p: String| Regex::new(&p).expect("static math pattern");
        Patterns {
            symbol_between: build(format!(r"^\s*({NUM})\s*([+\-*/×÷])\s*({NUM})\s*$")),
            word_between: build(format!(r"^\s*({NUM})\s+({words})\s+({NUM})\s*$")),
            verb_first: build(format!(
                r"^\s*({words})\s+({NUM})(?:\s*(?:and|by)\s*({NUM}))\s*$"
            )),
            subtract_from: build(format!(r"^\s*(subtract|minus)\s+({NUM})\s+from\s+({NUM})\s*$")),
            loose_symbol: build(format!(r"({NUM})\s*([+\-*/×÷])\s*({NUM})")),
            loose_word: build(format!(r"({NUM}).*?({words}).*?({NUM})")),
        }
    })
}

/// Whether `text` looks like a simple binary math query.
pub fn is_math_query(text: &str) -> bool {
    let t = text.trim().to_lowercase();
    if t.is_empty() {
        return false;
    }
    let p = patterns();
    p.symbol_between.is_match(&t)
        || p.word_between.is_match(&t)
        || p.verb_first.is_match(&t)
        || p.subtract_from.is_match(&t)
        || p.loose_symbol.is_match(&t)
        || p.loose_word.is_match(&t)
}

/// Parse the first binary expression found in `text`.
///
/// Anchored forms are tried before the loose in-sentence forms. `subtract X
/// from Y` yields `Y - X`.
pub fn parse_math_expression(text: &str) -> Option<MathExpr> {
    let t = text.trim().to_lowercase();
    if t.is_empty() {
        return None;
    }
    let p = patterns();

    let infix = |re: &Regex| -> Option<MathExpr> {
        let c = re.captures(&t)?;
        build_expr(&c[1], &c[2], &c[3])
    };

    if p.symbol_between.is_match(&t) {
        return infix(&p.symbol_between);
    }
    if let Some(expr) = infix(&p.word_between) {
        return Some(expr);
    }
    if let Some(c) = p.verb_first.captures(&t) {
        if let Some(expr) = build_expr(&c[2], &c[1], &c[3]) {
            return Some(expr);
        }
    }
    if let Some(c) = p.subtract_from.captures(&t) {
        return build_expr(&c[3], "-", &c[2]);
    }
    if p.loose_symbol.is_match(&t) {
        return infix(&p.loose_symbol);
    }
    infix(&p.loose_word)
}

fn build_expr(lhs: &str, op: &str, rhs: &str) -> Option<MathExpr> {
    Some(MathExpr {
        lhs: Number::parse(lhs).ok()?,
        op: Op::from_token(op).ok()?,
        rhs: Number::parse(rhs).ok()?,
    })
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// Reads `input_text`, evaluates the expression in it, and writes `answer`
/// plus a structured `math` record. Evaluation failures land in `error`.
pub struct MathNode;

#[async_trait]
impl ExecutableNode for MathNode {
    async fn execute(&self, mut state: State, _ctx: &ExecutionContext) -> Result<State, NodeError> {
        let text = state.get_str("input_text").unwrap_or_default().to_owned();

        let Some(expr) = parse_math_expression(&text) else {
            state.set_error(format!("no arithmetic expression found in '{text}'"));
            return Ok(state);
        };

        match evaluate(&expr) {
            Ok(result) => {
                debug!(%expr, %result, "evaluated expression");
                state.insert("answer", format!("{expr} = {result} (computed via tool)"));
                state.insert(
                    "math",
                    json!({
                        "lhs": expr.lhs.to_json(),
                        "op": expr.op.symbol().to_string(),
                        "rhs": expr.rhs.to_json(),
                        "result": result.to_json(),
                    }),
                );
            }
            Err(e) => {
                state.insert("answer", format!("Error computing expression: {e}"));
                state.set_error(e.to_string());
            }
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(text: &str) -> MathExpr {
        parse_math_expression(text).unwrap_or_else(|| panic!("no match for {text:?}"))
    }

    fn eval(lhs: Number, op: Op, rhs: Number) -> Result<Number, MathError> {
        evaluate(&MathExpr { lhs, op, rhs })
    }

    #[test]
    fn plus_ints_stays_int() {
        assert_eq!(eval(Number::Int(5), Op::Add, Number::Int(3)), Ok(Number::Int(8)));
    }

    #[test]
    fn subtract_float_int() {
        let r = eval(Number::Float(5.5), Op::Sub, Number::Int(2)).unwrap();
        assert!((r.as_f64() - 3.5).abs() < 1e-9);
    }

    #[test]
    fn multiply_parsed_strings() {
        let a = Number::parse("6").unwrap();
        let b = Number::parse(" 7 ").unwrap();
        assert_eq!(eval(a, Op::Mul, b), Ok(Number::Int(42)));
    }

    #[test]
    fn exact_division_collapses_to_int() {
        assert_eq!(eval(Number::Int(10), Op::Div, Number::Int(2)), Ok(Number::Int(5)));
        assert_eq!(eval(Number::Float(9.0), Op::Div, Number::Float(3.0)), Ok(Number::Int(3)));
    }

    #[test]
    fn inexact_division_is_float() {
        let r = eval(Number::Int(7), Op::Div, Number::Int(2)).unwrap();
        assert!((r.as_f64() - 3.5).abs() < 1e-9);
    }

    #[test]
    fn division_by_zero_is_distinct_from_bad_input() {
        assert_eq!(
            eval(Number::Int(5), Op::Div, Number::Int(0)),
            Err(MathError::DivisionByZero)
        );
        assert_eq!(
            eval(Number::Float(5.0), Op::Div, Number::Float(0.0)),
            Err(MathError::DivisionByZero)
        );
        assert!(matches!(Number::parse("five"), Err(MathError::InvalidOperand(_))));
        assert!(matches!(Op::from_token("modulo"), Err(MathError::UnsupportedOperator(_))));
    }

    #[test]
    fn integer_overflow_is_reported() {
        assert!(matches!(
            eval(Number::Int(i64::MAX), Op::Add, Number::Int(1)),
            Err(MathError::Overflow(_))
        ));
    }

    #[test]
    fn parses_symbol_forms() {
        assert_eq!(expr("10 - 4"), MathExpr { lhs: Number::Int(10), op: Op::Sub, rhs: Number::Int(4) });
        assert_eq!(expr("10-4").op, Op::Sub);
        assert_eq!(expr("3 × 4").op, Op::Mul);
        assert_eq!(expr("8 ÷ 2").op, Op::Div);
    }

    #[test]
    fn parses_word_forms() {
        let e = expr("50 minus 25");
        assert_eq!((e.lhs, e.op, e.rhs), (Number::Int(50), Op::Sub, Number::Int(25)));
        assert_eq!(expr("9 divided by 3").op, Op::Div);
        assert_eq!(expr("Multiply 4 and 6").op, Op::Mul);
        let e = expr("divide 8 by 2");
        assert_eq!((e.lhs, e.op, e.rhs), (Number::Int(8), Op::Div, Number::Int(2)));
    }

    #[test]
    fn subtract_from_reverses_operands() {
        let e = expr("subtract 5 from 10");
        assert_eq!((e.lhs, e.op, e.rhs), (Number::Int(10), Op::Sub, Number::Int(5)));
    }

    #[test]
    fn finds_expressions_inside_sentences() {
        let e = expr("what is 5 plus 3?");
        assert_eq!((e.lhs, e.op, e.rhs), (Number::Int(5), Op::Add, Number::Int(3)));
        assert!(is_math_query("could you tell me 2.5 * 4 please"));
        assert_eq!(expr("could you tell me 2.5 * 4 please").lhs, Number::Float(2.5));
    }

    #[test]
    fn plain_questions_are_not_math() {
        assert!(!is_math_query("What is LangGraph?"));
        assert!(!is_math_query("   "));
        assert!(parse_math_expression("tell me a story").is_none());
    }

    #[tokio::test]
    async fn math_node_writes_answer_and_record() {
        let state: State = [("input_text", "what is 6 times 7")].into_iter().collect();
        let out = MathNode
            .execute(state, &ExecutionContext::detached("math"))
            .await
            .unwrap();
        assert_eq!(out.get_str("answer"), Some("6 * 7 = 42 (computed via tool)"));
        assert_eq!(out.get("math").and_then(|m| m.get("result")), Some(&json!(42)));
        assert!(out.error().is_none());
    }

    #[tokio::test]
    async fn math_node_encodes_division_by_zero_in_state() {
        let state: State = [("input_text", "5 / 0")].into_iter().collect();
        let out = MathNode
            .execute(state, &ExecutionContext::detached("math"))
            .await
            .expect("evaluation errors are data, not escalation");
        assert_eq!(out.error(), Some("division by zero is not allowed"));
        assert!(out.get_str("answer").unwrap().starts_with("Error computing expression"));
    }
}
