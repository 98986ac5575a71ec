// ABOUTME: Expression evaluation for template directives
// ABOUTME: Resolves expressions with a small scoped grammar, falling back to dot-path lookup

use serde_json::{Number, Value as JsonValue};
use std::borrow::Cow;
use std::cmp::Ordering;
use tracing::trace;

use super::context::RenderContext;
use super::error::{Result, TemplateError};

/// A directive expression, parsed once and evaluated many times.
///
/// Evaluation is attempted in two tiers. The scoped tier treats every context
/// binding as an identifier and interprets the parsed expression tree. When
/// parsing or evaluation fails, the raw text is resolved as a dot-separated
/// path instead, where any missing step simply yields absence.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    parsed: std::result::Result<Expr, String>,
}

impl Expression {
    pub fn new(source: &str) -> Self {
        let source = source.trim().to_string();
        let parsed = Parser::new(&source).and_then(|mut parser| parser.parse());
        Self { source, parsed }
    }

    /// Whether the scoped grammar accepted this expression
    pub fn is_scoped(&self) -> bool {
        self.parsed.is_ok()
    }

    /// Evaluate against a context. `Ok(None)` means the value is absent.
    pub fn evaluate(&self, context: &RenderContext<'_>) -> Result<Option<JsonValue>> {
        Ok(self.resolve(context)?.map(Cow::into_owned))
    }

    /// Evaluate without copying values that already live in the context
    pub(crate) fn resolve<'c>(
        &'c self,
        context: &'c RenderContext<'_>,
    ) -> Result<Option<Cow<'c, JsonValue>>> {
        match &self.parsed {
            Ok(expr) => match eval(expr, context) {
                Ok(value) => return Ok(value),
                Err(reason) => {
                    trace!("Scoped evaluation of `{}` failed: {}", self.source, reason)
                }
            },
            Err(reason) => trace!("Scoped parse of `{}` failed: {}", self.source, reason),
        }

        Ok(resolve_path(&self.source, context)?.map(Cow::Borrowed))
    }
}

/// Evaluate an expression string once without keeping the parsed form
pub fn evaluate(source: &str, context: &RenderContext<'_>) -> Result<Option<JsonValue>> {
    Expression::new(source).evaluate(context)
}

/// Traverse `a.b.0.c` through maps by key and sequences by position
pub fn lookup_path(path: &str, context: &RenderContext<'_>) -> Result<Option<JsonValue>> {
    Ok(resolve_path(path, context)?.cloned())
}

fn resolve_path<'c>(path: &str, context: &'c RenderContext<'_>) -> Result<Option<&'c JsonValue>> {
    let path = path.trim();
    if path.is_empty() {
        return Err(TemplateError::directive(path, "empty expression"));
    }

    if path.split('.').any(|segment| segment.trim().is_empty()) {
        return Err(TemplateError::directive(path, "path contains an empty segment"));
    }

    let mut segments = path.split('.').map(str::trim);

    let Some(mut current) = segments.next().and_then(|head| context.lookup(head)) else {
        return Ok(None);
    };

    for segment in segments {
        let next = match current {
            JsonValue::Object(map) => map.get(segment),
            JsonValue::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return Ok(None),
        }
    }

    Ok(Some(current))
}

/// Falsy values are absence, null, false, zero and the empty string.
/// Empty sequences and maps are truthy.
pub fn is_truthy(value: Option<&JsonValue>) -> bool {
    match value {
        None | Some(JsonValue::Null) => false,
        Some(JsonValue::Bool(flag)) => *flag,
        Some(JsonValue::Number(number)) => number.as_f64().is_some_and(|n| n != 0.0),
        Some(JsonValue::String(text)) => !text.is_empty(),
        Some(JsonValue::Array(_)) | Some(JsonValue::Object(_)) => true,
    }
}

/// String form used when a value is written into the output
pub fn to_output(value: Option<&JsonValue>) -> String {
    match value {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(text)) => text.clone(),
        Some(JsonValue::Bool(flag)) => flag.to_string(),
        Some(JsonValue::Number(number)) => number.to_string(),
        Some(JsonValue::Array(items)) => items
            .iter()
            .map(|item| to_output(Some(item)))
            .collect::<Vec<_>>()
            .join(","),
        Some(object @ JsonValue::Object(_)) => object.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(JsonValue),
    Identifier(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum UnaryOp {
    Not,
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinaryOp {
    Or,
    And,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Number),
    Str(String),
    Ident(String),
    Dot,
    LeftBracket,
    RightBracket,
    LeftParen,
    RightParen,
    Bang,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqualEqual,
    BangEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    AndAnd,
    OrOr,
}

/// Binding power of binary operators, higher binds tighter
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest = 0,
    Or = 1,
    And = 2,
    Equality = 3,
    Comparison = 4,
    Additive = 5,
    Multiplicative = 6,
    Unary = 7,
}

impl Precedence {
    fn next_level(self) -> Self {
        match self {
            Precedence::Lowest => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Additive,
            Precedence::Additive => Precedence::Multiplicative,
            Precedence::Multiplicative | Precedence::Unary => Precedence::Unary,
        }
    }
}

fn binary_operator(token: &Token) -> Option<(BinaryOp, Precedence)> {
    let op = match token {
        Token::OrOr => (BinaryOp::Or, Precedence::Or),
        Token::AndAnd => (BinaryOp::And, Precedence::And),
        Token::EqualEqual => (BinaryOp::Equal, Precedence::Equality),
        Token::BangEqual => (BinaryOp::NotEqual, Precedence::Equality),
        Token::Less => (BinaryOp::Less, Precedence::Comparison),
        Token::LessEqual => (BinaryOp::LessEqual, Precedence::Comparison),
        Token::Greater => (BinaryOp::Greater, Precedence::Comparison),
        Token::GreaterEqual => (BinaryOp::GreaterEqual, Precedence::Comparison),
        Token::Plus => (BinaryOp::Add, Precedence::Additive),
        Token::Minus => (BinaryOp::Subtract, Precedence::Additive),
        Token::Star => (BinaryOp::Multiply, Precedence::Multiplicative),
        Token::Slash => (BinaryOp::Divide, Precedence::Multiplicative),
        Token::Percent => (BinaryOp::Remainder, Precedence::Multiplicative),
        _ => return None,
    };
    Some(op)
}

/// Longer expressions are left to the dot-path lookup. Bounds the parse and
/// evaluation recursion, since nesting depth never exceeds the token count.
const MAX_EXPRESSION_TOKENS: usize = 512;

fn tokenize(input: &str) -> std::result::Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        if tokens.len() > MAX_EXPRESSION_TOKENS {
            return Err(format!("expression exceeds {} tokens", MAX_EXPRESSION_TOKENS));
        }
        let c = chars[pos];
        let next = chars.get(pos + 1).copied();

        if c.is_whitespace() {
            pos += 1;
            continue;
        }

        if c.is_ascii_digit() {
            let start = pos;
            while pos < chars.len() && chars[pos].is_ascii_digit() {
                pos += 1;
            }
            let is_fraction = chars.get(pos) == Some(&'.')
                && chars.get(pos + 1).is_some_and(|d| d.is_ascii_digit());
            if is_fraction {
                pos += 1;
                while pos < chars.len() && chars[pos].is_ascii_digit() {
                    pos += 1;
                }
            }
            let text: String = chars[start..pos].iter().collect();
            tokens.push(Token::Number(parse_number(&text)?));
            continue;
        }

        if c.is_alphabetic() || c == '_' || c == '$' {
            let start = pos;
            while pos < chars.len()
                && (chars[pos].is_alphanumeric() || chars[pos] == '_' || chars[pos] == '$')
            {
                pos += 1;
            }
            tokens.push(Token::Ident(chars[start..pos].iter().collect()));
            continue;
        }

        if c == '"' || c == '\'' {
            let (text, end) = read_string(&chars, pos)?;
            tokens.push(Token::Str(text));
            pos = end;
            continue;
        }

        let (token, width) = match (c, next) {
            ('=', Some('=')) => {
                let width = if chars.get(pos + 2) == Some(&'=') { 3 } else { 2 };
                (Token::EqualEqual, width)
            }
            ('!', Some('=')) => {
                let width = if chars.get(pos + 2) == Some(&'=') { 3 } else { 2 };
                (Token::BangEqual, width)
            }
            ('<', Some('=')) => (Token::LessEqual, 2),
            ('>', Some('=')) => (Token::GreaterEqual, 2),
            ('&', Some('&')) => (Token::AndAnd, 2),
            ('|', Some('|')) => (Token::OrOr, 2),
            ('<', _) => (Token::Less, 1),
            ('>', _) => (Token::Greater, 1),
            ('!', _) => (Token::Bang, 1),
            ('.', _) => (Token::Dot, 1),
            ('[', _) => (Token::LeftBracket, 1),
            (']', _) => (Token::RightBracket, 1),
            ('(', _) => (Token::LeftParen, 1),
            (')', _) => (Token::RightParen, 1),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('%', _) => (Token::Percent, 1),
            (other, _) => return Err(format!("unexpected character '{}'", other)),
        };
        tokens.push(token);
        pos += width;
    }

    Ok(tokens)
}

fn parse_number(text: &str) -> std::result::Result<Number, String> {
    if let Ok(integer) = text.parse::<i64>() {
        return Ok(Number::from(integer));
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(|| format!("invalid number literal '{}'", text))
}

fn read_string(chars: &[char], start: usize) -> std::result::Result<(String, usize), String> {
    let quote = chars[start];
    let mut text = String::new();
    let mut pos = start + 1;

    while pos < chars.len() {
        match chars[pos] {
            '\\' => {
                let escaped = chars.get(pos + 1).ok_or("unterminated escape sequence")?;
                text.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => *other,
                });
                pos += 2;
            }
            c if c == quote => return Ok((text, pos + 1)),
            c => {
                text.push(c);
                pos += 1;
            }
        }
    }

    Err("unterminated string literal".to_string())
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(input: &str) -> std::result::Result<Self, String> {
        Ok(Self {
            tokens: tokenize(input)?,
            pos: 0,
        })
    }

    fn parse(&mut self) -> std::result::Result<Expr, String> {
        if self.tokens.is_empty() {
            return Err("empty expression".to_string());
        }
        let expr = self.parse_expression(Precedence::Lowest)?;
        match self.peek() {
            None => Ok(expr),
            Some(token) => Err(format!("unexpected trailing token {:?}", token)),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> std::result::Result<(), String> {
        match self.advance() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(format!("expected {:?}, found {:?}", expected, token)),
            None => Err(format!("expected {:?}, found end of input", expected)),
        }
    }

    fn parse_expression(&mut self, min: Precedence) -> std::result::Result<Expr, String> {
        let mut left = self.parse_prefix()?;

        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.advance();
                    match self.advance() {
                        Some(Token::Ident(name)) => left = Expr::Member(Box::new(left), name),
                        other => return Err(format!("expected property name, found {:?}", other)),
                    }
                }
                Some(Token::LeftBracket) => {
                    self.advance();
                    let index = self.parse_expression(Precedence::Lowest)?;
                    self.expect(Token::RightBracket)?;
                    left = Expr::Index(Box::new(left), Box::new(index));
                }
                Some(token) => {
                    let Some((op, precedence)) = binary_operator(token) else {
                        break;
                    };
                    if precedence < min {
                        break;
                    }
                    self.advance();
                    let right = self.parse_expression(precedence.next_level())?;
                    left = Expr::Binary(op, Box::new(left), Box::new(right));
                }
                None => break,
            }
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> std::result::Result<Expr, String> {
        match self.advance() {
            Some(Token::Bang) => {
                let operand = self.parse_expression(Precedence::Unary)?;
                Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)))
            }
            Some(Token::Minus) => {
                let operand = self.parse_expression(Precedence::Unary)?;
                Ok(Expr::Unary(UnaryOp::Negate, Box::new(operand)))
            }
            Some(Token::Number(number)) => Ok(Expr::Literal(JsonValue::Number(number))),
            Some(Token::Str(text)) => Ok(Expr::Literal(JsonValue::String(text))),
            Some(Token::Ident(name)) => Ok(match name.as_str() {
                "true" => Expr::Literal(JsonValue::Bool(true)),
                "false" => Expr::Literal(JsonValue::Bool(false)),
                "null" => Expr::Literal(JsonValue::Null),
                _ => Expr::Identifier(name),
            }),
            Some(Token::LeftParen) => {
                let inner = self.parse_expression(Precedence::Lowest)?;
                self.expect(Token::RightParen)?;
                Ok(inner)
            }
            Some(token) => Err(format!("unexpected token {:?}", token)),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

/// Result of an operator, always a fresh value
type Computed = std::result::Result<Option<JsonValue>, String>;

/// Evaluated value, borrowed from the context or the expression when possible
type EvalResult<'c> = std::result::Result<Option<Cow<'c, JsonValue>>, String>;

fn owned<'c>(computed: Computed) -> EvalResult<'c> {
    computed.map(|value| value.map(Cow::Owned))
}

fn eval<'c>(expr: &'c Expr, context: &'c RenderContext<'_>) -> EvalResult<'c> {
    match expr {
        Expr::Literal(value) => Ok(Some(Cow::Borrowed(value))),
        Expr::Identifier(name) => Ok(context.lookup(name).map(Cow::Borrowed)),
        Expr::Member(target, property) => {
            let target = eval(target, context)?;
            read_property(target, &JsonValue::String(property.clone()))
        }
        Expr::Index(target, index) => {
            let target = eval(target, context)?;
            let index = eval(index, context)?;
            read_property(target, index.as_deref().unwrap_or(&JsonValue::Null))
        }
        Expr::Unary(UnaryOp::Not, operand) => {
            let value = eval(operand, context)?;
            let negated = JsonValue::Bool(!is_truthy(value.as_deref()));
            Ok(Some(Cow::Owned(negated)))
        }
        Expr::Unary(UnaryOp::Negate, operand) => {
            let value = eval(operand, context)?;
            let n = as_number(value.as_deref()).ok_or("cannot negate a non-number")?;
            owned(number_value(-n).map(Some))
        }
        Expr::Binary(BinaryOp::And, left, right) => {
            let left = eval(left, context)?;
            if is_truthy(left.as_deref()) {
                eval(right, context)
            } else {
                Ok(left)
            }
        }
        Expr::Binary(BinaryOp::Or, left, right) => {
            let left = eval(left, context)?;
            if is_truthy(left.as_deref()) {
                Ok(left)
            } else {
                eval(right, context)
            }
        }
        Expr::Binary(op, left, right) => {
            let left = eval(left, context)?;
            let right = eval(right, context)?;
            owned(apply_binary(*op, left.as_deref(), right.as_deref()))
        }
    }
}

fn read_property<'c>(target: Option<Cow<'c, JsonValue>>, key: &JsonValue) -> EvalResult<'c> {
    match target {
        None => Err(format!("cannot read property {} of an absent value", key)),
        Some(Cow::Borrowed(value)) => property_of(value, key),
        Some(Cow::Owned(value)) => {
            let found = property_of(&value, key)?;
            Ok(found.map(|child| Cow::Owned(child.into_owned())))
        }
    }
}

fn property_of<'v>(target: &'v JsonValue, key: &JsonValue) -> EvalResult<'v> {
    let value = match (target, key) {
        (JsonValue::Null, _) => return Err(format!("cannot read property {} of null", key)),
        (JsonValue::Object(map), JsonValue::String(name)) => map.get(name).map(Cow::Borrowed),
        (JsonValue::Array(items), JsonValue::String(name)) if name == "length" => {
            Some(Cow::Owned(JsonValue::from(items.len())))
        }
        (JsonValue::String(text), JsonValue::String(name)) if name == "length" => {
            Some(Cow::Owned(JsonValue::from(text.chars().count())))
        }
        (JsonValue::Array(items), JsonValue::Number(n)) => n
            .as_u64()
            .and_then(|i| items.get(i as usize))
            .map(Cow::Borrowed),
        (JsonValue::String(text), JsonValue::Number(n)) => n
            .as_u64()
            .and_then(|i| text.chars().nth(i as usize))
            .map(|c| Cow::Owned(JsonValue::String(c.to_string()))),
        _ => None,
    };
    Ok(value)
}

fn apply_binary(op: BinaryOp, left: Option<&JsonValue>, right: Option<&JsonValue>) -> Computed {
    match op {
        BinaryOp::Equal => Ok(Some(JsonValue::Bool(loose_equals(left, right)))),
        BinaryOp::NotEqual => Ok(Some(JsonValue::Bool(!loose_equals(left, right)))),
        BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => {
            let ordering = compare(left, right)?;
            let result = match op {
                BinaryOp::Less => ordering == Ordering::Less,
                BinaryOp::LessEqual => ordering != Ordering::Greater,
                BinaryOp::Greater => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Ok(Some(JsonValue::Bool(result)))
        }
        BinaryOp::Add => {
            let is_text = |value: Option<&JsonValue>| matches!(value, Some(JsonValue::String(_)));
            if is_text(left) || is_text(right) {
                return Ok(Some(JsonValue::String(to_output(left) + &to_output(right))));
            }
            let (l, r) = numeric_operands(left, right)?;
            number_value(l + r).map(Some)
        }
        BinaryOp::Subtract => {
            let (l, r) = numeric_operands(left, right)?;
            number_value(l - r).map(Some)
        }
        BinaryOp::Multiply => {
            let (l, r) = numeric_operands(left, right)?;
            number_value(l * r).map(Some)
        }
        BinaryOp::Divide | BinaryOp::Remainder => {
            let (l, r) = numeric_operands(left, right)?;
            if r == 0.0 {
                return Err("division by zero".to_string());
            }
            let result = if op == BinaryOp::Divide { l / r } else { l % r };
            number_value(result).map(Some)
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("logical operators short-circuit in eval"),
    }
}

fn loose_equals(left: Option<&JsonValue>, right: Option<&JsonValue>) -> bool {
    match (left, right) {
        (None | Some(JsonValue::Null), None | Some(JsonValue::Null)) => true,
        (Some(JsonValue::Number(l)), Some(JsonValue::Number(r))) => l.as_f64() == r.as_f64(),
        (Some(l), Some(r)) => l == r,
        _ => false,
    }
}

fn compare(
    left: Option<&JsonValue>,
    right: Option<&JsonValue>,
) -> std::result::Result<Ordering, String> {
    match (left, right) {
        (Some(JsonValue::String(l)), Some(JsonValue::String(r))) => Ok(l.cmp(r)),
        _ => {
            let (l, r) = numeric_operands(left, right)?;
            l.partial_cmp(&r).ok_or_else(|| "values are not comparable".to_string())
        }
    }
}

fn numeric_operands(
    left: Option<&JsonValue>,
    right: Option<&JsonValue>,
) -> std::result::Result<(f64, f64), String> {
    match (as_number(left), as_number(right)) {
        (Some(l), Some(r)) => Ok((l, r)),
        _ => Err("arithmetic requires numeric operands".to_string()),
    }
}

fn as_number(value: Option<&JsonValue>) -> Option<f64> {
    match value {
        Some(JsonValue::Number(n)) => n.as_f64(),
        _ => None,
    }
}

fn number_value(n: f64) -> std::result::Result<JsonValue, String> {
    const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return Ok(JsonValue::from(n as i64));
    }
    Number::from_f64(n)
        .map(JsonValue::Number)
        .ok_or_else(|| format!("result {} is not a finite number", n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> RenderContext<'static> {
        RenderContext::from_json(&json!({
            "name": "Bo",
            "count": 3,
            "price": 2.5,
            "admin": false,
            "user": {"name": "Ada", "roles": ["editor", "admin"]},
            "items": ["a", "b", "c"],
            "my-key": "dashed",
            "empty": "",
            "nothing": null
        }))
        .unwrap()
    }

    fn eval_str(source: &str) -> Option<JsonValue> {
        evaluate(source, &context()).unwrap()
    }

    #[test]
    fn test_identifiers_and_paths() {
        assert_eq!(eval_str("name"), Some(json!("Bo")));
        assert_eq!(eval_str("user.name"), Some(json!("Ada")));
        assert_eq!(eval_str("user.roles[1]"), Some(json!("admin")));
        assert_eq!(eval_str("user['name']"), Some(json!("Ada")));
        assert_eq!(eval_str("items.length"), Some(json!(3)));
        assert_eq!(eval_str("missing"), None);
    }

    #[test]
    fn test_comparison_and_logic() {
        assert_eq!(eval_str("count == 3"), Some(json!(true)));
        assert_eq!(eval_str("count === 3.0"), Some(json!(true)));
        assert_eq!(eval_str("name != 'Bo'"), Some(json!(false)));
        assert_eq!(eval_str("count > 2 && !admin"), Some(json!(true)));
        assert_eq!(eval_str("admin || 'fallback'"), Some(json!("fallback")));
        assert_eq!(eval_str("'a' < 'b'"), Some(json!(true)));
        assert_eq!(eval_str("missing == null"), Some(json!(true)));
        assert_eq!(eval_str("!missing"), Some(json!(true)));
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval_str("count + 1"), Some(json!(4)));
        assert_eq!(eval_str("count * price"), Some(json!(7.5)));
        assert_eq!(eval_str("(count - 1) * 2"), Some(json!(4)));
        assert_eq!(eval_str("count % 2"), Some(json!(1)));
        assert_eq!(eval_str("-count"), Some(json!(-3)));
        assert_eq!(eval_str("'n=' + count"), Some(json!("n=3")));
        assert_eq!(eval_str("1 + 2 * 3"), Some(json!(7)));
    }

    #[test]
    fn test_fallback_to_dot_path() {
        // not valid scoped syntax, resolved by plain key and index lookup
        assert_eq!(eval_str("my-key"), Some(json!("dashed")));
        assert_eq!(eval_str("items.0"), Some(json!("a")));
        assert_eq!(eval_str("user.roles.1"), Some(json!("admin")));
        assert!(!Expression::new("items.0").is_scoped());
    }

    #[test]
    fn test_absent_intermediate_yields_absence() {
        assert_eq!(eval_str("missing.deeper.still"), None);
        assert_eq!(eval_str("nothing.field"), None);
        assert_eq!(eval_str("count / 0"), None);
    }

    #[test]
    fn test_malformed_paths_are_errors() {
        let ctx = context();
        assert!(evaluate("", &ctx).is_err());
        assert!(evaluate("user.", &ctx).is_err());
        assert!(evaluate("user..name", &ctx).is_err());
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(None));
        assert!(!is_truthy(Some(&json!(null))));
        assert!(!is_truthy(Some(&json!(false))));
        assert!(!is_truthy(Some(&json!(0))));
        assert!(!is_truthy(Some(&json!(0.0))));
        assert!(!is_truthy(Some(&json!(""))));
        assert!(is_truthy(Some(&json!([]))));
        assert!(is_truthy(Some(&json!({}))));
        assert!(is_truthy(Some(&json!("0"))));
        assert!(is_truthy(Some(&json!(-1))));
    }

    #[test]
    fn test_output_form() {
        assert_eq!(to_output(None), "");
        assert_eq!(to_output(Some(&json!(null))), "");
        assert_eq!(to_output(Some(&json!(42))), "42");
        assert_eq!(to_output(Some(&json!(true))), "true");
        assert_eq!(to_output(Some(&json!(["a", 1, null]))), "a,1,");
        assert_eq!(to_output(Some(&json!({"k": 1}))), r#"{"k":1}"#);
    }

    #[test]
    fn test_parser_rejects_garbage() {
        assert!(!Expression::new("a +").is_scoped());
        assert!(!Expression::new("a = b").is_scoped());
        assert!(!Expression::new("'open").is_scoped());
        assert!(!Expression::new("a b").is_scoped());
        assert!(Expression::new("!(a && b) || c[0].d").is_scoped());
    }

    #[test]
    fn test_member_access_borrows_from_context() {
        let ctx = context();
        let member = Expression::new("user.roles[0]");
        let length = Expression::new("user.roles.length");
        let fallback = Expression::new("user.roles.1");

        assert!(matches!(member.resolve(&ctx).unwrap(), Some(Cow::Borrowed(v)) if v == "editor"));
        assert!(matches!(length.resolve(&ctx).unwrap(), Some(Cow::Owned(v)) if v == 2));
        assert!(matches!(fallback.resolve(&ctx).unwrap(), Some(Cow::Borrowed(v)) if v == "admin"));
    }

    #[test]
    fn test_property_of_computed_value() {
        assert_eq!(eval_str("(admin || user).name"), Some(json!("Ada")));
        assert_eq!(eval_str("('ab' + 'c').length"), Some(json!(3)));
    }

    #[test]
    fn test_deep_nesting_falls_back_to_path_lookup() {
        let depth = 20_000;
        let source = format!("{}count{}", "(".repeat(depth), ")".repeat(depth));
        let expression = Expression::new(&source);

        assert!(!expression.is_scoped());
        assert_eq!(expression.evaluate(&context()).unwrap(), None);

        let shallow = format!("{}count{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(eval_str(&shallow), Some(json!(3)));
    }
}
