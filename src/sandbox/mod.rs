//! Execution sandbox.
//!
//! The script is never evaluated as source text. It is tokenized, parsed by
//! recursive descent into a call-sequence representation, checked against
//! the capability dispatch table, and only then interpreted. The capability
//! surface is an enumerable allow-list; there is no denylist of forbidden
//! substrings anywhere.
//!
//! Error messages deliberately carry the substrings the repair loop
//! classifies on (`no attribute`, `is not callable`, `tuple`,
//! `unexpected end of input`, `did not bind 'result'`), including a
//! `Did you mean '…'?` hint for near-miss operation names.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::iter::Peekable;
use std::vec::IntoIter;

use crate::structure::OUTPUT_NAME;

/* ───────────────────────── artifact ───────────────────────── */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Number(f64),
    Text(String),
    Point(Vec<f64>),
}

/// One recorded operation of the build sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpRecord {
    pub op: String,
    pub args: Vec<ArgValue>,
}

/// The output artifact: a lightweight solid description (base plane plus
/// the validated operation sequence). Geometry kernels are out of scope;
/// this is what gets stored and returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolidModel {
    pub plane: String,
    pub units: String,
    pub operations: Vec<OpRecord>,
}

impl SolidModel {
    fn new(plane: String) -> Self {
        Self {
            plane,
            units: "mm".to_string(),
            operations: Vec::new(),
        }
    }
}

/* ───────────────────────── capabilities ───────────────────────── */

struct OpSpec {
    name: &'static str,
    min_args: usize,
    max_args: usize,
    /// Accepts (x, y) point tuples, singly or as a bracketed list.
    points: bool,
}

const fn op(name: &'static str, min_args: usize, max_args: usize) -> OpSpec {
    OpSpec {
        name,
        min_args,
        max_args,
        points: false,
    }
}

const fn op_points(name: &'static str, min_args: usize, max_args: usize) -> OpSpec {
    OpSpec {
        name,
        min_args,
        max_args,
        points: true,
    }
}

/// The complete capability surface for chain calls. Anything absent is
/// rejected before interpretation starts.
static DISPATCH: &[OpSpec] = &[
    op("box", 3, 3),
    op("sphere", 1, 1),
    op("cylinder", 2, 3),
    op("circle", 1, 1),
    op("ellipse", 2, 2),
    op("rect", 2, 3),
    op("polygon", 2, 3),
    op_points("polyline", 2, 16),
    op("moveTo", 2, 2),
    op("lineTo", 2, 2),
    op("close", 0, 0),
    op("extrude", 1, 2),
    op("revolve", 0, 3),
    op("twistExtrude", 2, 2),
    op("sweep", 1, 2),
    op("loft", 0, 1),
    op("cut", 1, 1),
    op("union", 1, 1),
    op("intersect", 1, 1),
    op("hole", 1, 2),
    op("cboreHole", 3, 4),
    op("cskHole", 3, 4),
    op("fillet", 1, 1),
    op("chamfer", 1, 2),
    op("shell", 1, 1),
    op("faces", 1, 1),
    op("edges", 0, 1),
    op("vertices", 0, 1),
    op("workplane", 0, 1),
    op("translate", 2, 3),
    op("rotate", 3, 7),
    op("mirror", 1, 2),
    op("center", 2, 2),
    op_points("pushPoints", 1, 8),
    op("rarray", 4, 5),
    op("offset2D", 1, 2),
    op("tag", 1, 1),
];

fn find_spec(name: &str) -> Option<&'static OpSpec> {
    DISPATCH.iter().find(|s| s.name == name)
}

/// Chain-call names in the dispatch table (the vocabulary minus the
/// `Workplane` entry constructor).
pub fn capability_names() -> impl Iterator<Item = &'static str> {
    DISPATCH.iter().map(|s| s.name)
}

/* ───────────────────────── lexer ───────────────────────── */

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Num(f64),
    Str(String),
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Eq,
    Newline,
}

fn lex(script: &str) -> Result<Vec<Tok>, String> {
    let chars: Vec<char> = script.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\n' => {
                tokens.push(Tok::Newline);
                i += 1;
            }
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '.' if !(i + 1 < chars.len() && chars[i + 1].is_ascii_digit()) => {
                tokens.push(Tok::Dot);
                i += 1;
            }
            ',' => {
                tokens.push(Tok::Comma);
                i += 1;
            }
            '(' => {
                tokens.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Tok::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Tok::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Tok::RBracket);
                i += 1;
            }
            '=' => {
                tokens.push(Tok::Eq);
                i += 1;
            }
            '"' | '\'' => {
                let quote = c;
                let start = i + 1;
                let mut j = start;
                let mut text = String::new();
                let mut escaped = false;
                let mut closed = false;
                while j < chars.len() {
                    let ch = chars[j];
                    if escaped {
                        text.push(ch);
                        escaped = false;
                    } else if ch == '\\' {
                        escaped = true;
                    } else if ch == quote {
                        closed = true;
                        break;
                    } else {
                        text.push(ch);
                    }
                    j += 1;
                }
                if !closed {
                    return Err("unexpected end of input: unterminated string literal".to_string());
                }
                tokens.push(Tok::Str(text));
                i = j + 1;
            }
            '-' | '.' | '0'..='9' => {
                let start = i;
                let mut j = i;
                if chars[j] == '-' {
                    j += 1;
                }
                let digits_start = j;
                while j < chars.len()
                    && (chars[j].is_ascii_digit()
                        || (chars[j] == '.'
                            && j + 1 < chars.len()
                            && chars[j + 1].is_ascii_digit()))
                {
                    j += 1;
                }
                if j == digits_start {
                    return Err(format!("syntax error: unexpected character '{c}'"));
                }
                let text: String = chars[start..j].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| format!("syntax error: malformed number '{text}'"))?;
                tokens.push(Tok::Num(value));
                i = j;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                let mut j = i;
                while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
                    j += 1;
                }
                tokens.push(Tok::Ident(chars[start..j].iter().collect()));
                i = j;
            }
            c if c.is_whitespace() => {
                i += 1;
            }
            _ => {
                return Err(format!("syntax error: unexpected character '{c}'"));
            }
        }
    }

    Ok(tokens)
}

/* ───────────────────────── parser ───────────────────────── */

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Num(f64),
    Str(String),
    Tuple(Vec<Value>),
    List(Vec<Value>),
    Ref(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: String,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Root {
    Workplane(Vec<Value>),
    Var(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chain {
    pub root: Root,
    pub calls: Vec<Call>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub target: Option<String>,
    pub chain: Chain,
}

type TokIter = Peekable<IntoIter<Tok>>;

pub fn parse(script: &str) -> Result<Vec<Stmt>, String> {
    let tokens = lex(script)?;
    let mut it = tokens.into_iter().peekable();
    let mut stmts = Vec::new();

    while let Some(tok) = it.peek() {
        match tok {
            Tok::Newline => {
                it.next();
            }
            Tok::Ident(name) if name == "import" => {
                skip_to_newline(&mut it);
            }
            Tok::Ident(_) => {
                let Some(Tok::Ident(name)) = it.next() else {
                    unreachable!()
                };
                let stmt = match it.peek() {
                    Some(Tok::Eq) => {
                        it.next();
                        let chain = parse_chain(&mut it)?;
                        Stmt {
                            target: Some(name),
                            chain,
                        }
                    }
                    Some(Tok::Dot) => {
                        let chain = parse_chain_from(name, &mut it)?;
                        Stmt {
                            target: None,
                            chain,
                        }
                    }
                    Some(Tok::LParen) => {
                        return Err(format!(
                            "call to '{name}' is outside the sandbox capability surface"
                        ));
                    }
                    _ => {
                        return Err(format!("syntax error: unexpected statement '{name}'"));
                    }
                };
                expect_statement_end(&stmt, &mut it)?;
                stmts.push(stmt);
            }
            Tok::RParen => {
                return Err("syntax error: unbalanced ')'".to_string());
            }
            _ => {
                return Err("syntax error: a statement cannot start here".to_string());
            }
        }
    }

    Ok(stmts)
}

fn expect(it: &mut TokIter, want: &Tok, msg: &str) -> Result<(), String> {
    match it.next() {
        Some(tok) if &tok == want => Ok(()),
        Some(_) => Err(format!("syntax error: {msg}")),
        None => Err(format!("unexpected end of input: {msg}")),
    }
}

fn skip_to_newline(it: &mut TokIter) {
    for tok in it.by_ref() {
        if tok == Tok::Newline {
            break;
        }
    }
}

/// After a chain, only a newline or end of input may follow. A bare
/// identifier here is the classic missing-dot mistake.
fn expect_statement_end(stmt: &Stmt, it: &mut TokIter) -> Result<(), String> {
    match it.peek() {
        None | Some(Tok::Newline) => Ok(()),
        Some(Tok::Ident(next)) => {
            let prev = stmt
                .chain
                .calls
                .last()
                .map(|c| c.name.as_str())
                .unwrap_or("Workplane");
            Err(format!(
                "'{prev}()' result is not callable; missing '.' before '{next}'?"
            ))
        }
        Some(Tok::RParen) => Err("syntax error: unbalanced ')'".to_string()),
        Some(_) => Err("syntax error: unexpected token after call chain".to_string()),
    }
}

fn parse_chain(it: &mut TokIter) -> Result<Chain, String> {
    match it.next() {
        Some(Tok::Ident(name)) => parse_chain_from(name, it),
        Some(_) => Err("syntax error: expected a call chain".to_string()),
        None => Err("unexpected end of input: expected a call chain".to_string()),
    }
}

fn parse_chain_from(first: String, it: &mut TokIter) -> Result<Chain, String> {
    let root = if first == "cq" {
        expect(it, &Tok::Dot, "expected '.' after 'cq'")?;
        let ctor = match it.next() {
            Some(Tok::Ident(n)) => n,
            _ => return Err("syntax error: expected a constructor after 'cq.'".to_string()),
        };
        if ctor != "Workplane" {
            return Err(format!(
                "module 'cq' has no attribute '{ctor}'. Did you mean 'Workplane'?"
            ));
        }
        expect(it, &Tok::LParen, "expected '(' after 'Workplane'")?;
        let args = parse_args(it, "Workplane")?;
        Root::Workplane(args)
    } else {
        Root::Var(first)
    };

    let mut calls = Vec::new();
    while matches!(it.peek(), Some(Tok::Dot)) {
        it.next();
        let name = match it.next() {
            Some(Tok::Ident(n)) => n,
            Some(_) => return Err("syntax error: expected an operation name after '.'".to_string()),
            None => return Err("unexpected end of input after '.'".to_string()),
        };
        match it.next() {
            Some(Tok::LParen) => {}
            Some(_) => return Err(format!("syntax error: expected '(' after '{name}'")),
            None => return Err(format!("unexpected end of input after '{name}'")),
        }
        let args = parse_args(it, &name)?;
        calls.push(Call { name, args });
    }

    Ok(Chain { root, calls })
}

fn parse_args(it: &mut TokIter, op_name: &str) -> Result<Vec<Value>, String> {
    let mut args = Vec::new();
    loop {
        match it.peek() {
            Some(Tok::RParen) => {
                it.next();
                return Ok(args);
            }
            None => {
                return Err(format!(
                    "unexpected end of input inside '{op_name}' argument list"
                ));
            }
            _ => {}
        }

        args.push(parse_value(it, op_name)?);

        match it.peek() {
            Some(Tok::Comma) => {
                it.next();
            }
            Some(Tok::RParen) => {}
            None => {
                return Err(format!(
                    "unexpected end of input inside '{op_name}' argument list"
                ));
            }
            Some(_) => {
                return Err(format!(
                    "syntax error: expected ',' or ')' in '{op_name}' argument list"
                ));
            }
        }
    }
}

/// A bracketed list literal, as in `pushPoints([(5, 5), (-5, -5)])`. The
/// opening '[' has already been consumed.
fn parse_list(it: &mut TokIter, op_name: &str) -> Result<Vec<Value>, String> {
    let mut items = Vec::new();
    loop {
        match it.peek() {
            Some(Tok::RBracket) => {
                it.next();
                return Ok(items);
            }
            None => {
                return Err(format!(
                    "unexpected end of input inside '{op_name}' argument list"
                ));
            }
            _ => {}
        }

        items.push(parse_value(it, op_name)?);

        match it.peek() {
            Some(Tok::Comma) => {
                it.next();
            }
            Some(Tok::RBracket) => {}
            None => {
                return Err(format!(
                    "unexpected end of input inside '{op_name}' argument list"
                ));
            }
            Some(_) => {
                return Err(format!(
                    "syntax error: expected ',' or ']' in '{op_name}' argument list"
                ));
            }
        }
    }
}

fn parse_value(it: &mut TokIter, op_name: &str) -> Result<Value, String> {
    match it.next() {
        Some(Tok::Num(n)) => Ok(Value::Num(n)),
        Some(Tok::Str(s)) => Ok(Value::Str(s)),
        Some(Tok::Ident(name)) => Ok(Value::Ref(name)),
        Some(Tok::LParen) => {
            let inner = parse_args(it, op_name)?;
            Ok(Value::Tuple(inner))
        }
        Some(Tok::LBracket) => {
            let inner = parse_list(it, op_name)?;
            Ok(Value::List(inner))
        }
        Some(Tok::Newline) | None => Err(format!(
            "unexpected end of input inside '{op_name}' argument list"
        )),
        Some(_) => Err(format!(
            "syntax error: unexpected token in '{op_name}' argument list"
        )),
    }
}

/* ───────────────────────── interpreter ───────────────────────── */

/// Run a script against the capability surface. Returns the artifact bound
/// to `result`, or an error message shaped for the repair-loop classifier.
pub fn run(script: &str) -> Result<SolidModel, String> {
    let stmts = parse(script)?;

    // Capability check over the whole call sequence before any
    // interpretation happens. Chain roots must be the entry constructor
    // or a name bound by an earlier statement.
    let mut bound: HashSet<&str> = HashSet::new();
    for stmt in &stmts {
        if let Root::Var(name) = &stmt.chain.root {
            if !bound.contains(name.as_str()) {
                return Err(format!(
                    "access to '{name}' is outside the sandbox capability surface"
                ));
            }
        }
        for call in &stmt.chain.calls {
            if find_spec(&call.name).is_none() {
                let hint = match suggest(&call.name) {
                    Some(s) => format!(" Did you mean '{s}'?"),
                    None => String::new(),
                };
                return Err(format!(
                    "'Workplane' object has no attribute '{}'.{hint}",
                    call.name
                ));
            }
        }
        if let Some(target) = &stmt.target {
            bound.insert(target);
        }
    }

    let mut env: HashMap<String, SolidModel> = HashMap::new();
    for stmt in &stmts {
        let model = eval_chain(&stmt.chain, &env)?;
        if let Some(target) = &stmt.target {
            env.insert(target.clone(), model);
        }
    }

    env.remove(OUTPUT_NAME)
        .ok_or_else(|| format!("script did not bind '{OUTPUT_NAME}'"))
}

fn eval_chain(chain: &Chain, env: &HashMap<String, SolidModel>) -> Result<SolidModel, String> {
    let mut model = match &chain.root {
        Root::Workplane(args) => {
            let plane = match args.first() {
                Some(Value::Str(s)) => s.clone(),
                None => "XY".to_string(),
                Some(_) => {
                    return Err(
                        "Workplane() expected a plane name string as its argument".to_string()
                    );
                }
            };
            SolidModel::new(plane)
        }
        Root::Var(name) => match env.get(name) {
            Some(m) => m.clone(),
            None => {
                return Err(format!(
                    "access to '{name}' is outside the sandbox capability surface"
                ));
            }
        },
    };

    for call in &chain.calls {
        let spec = find_spec(&call.name).expect("capability check ran first");

        let has_grouped_arg = call
            .args
            .iter()
            .any(|a| matches!(a, Value::Tuple(_) | Value::List(_)));
        let args = if spec.points && has_grouped_arg {
            let points = collect_points(&call.name, &call.args)?;
            check_count(spec, points.len())?;
            points.into_iter().map(ArgValue::Point).collect()
        } else {
            check_arity(spec, &call.args)?;
            let mut args = Vec::with_capacity(call.args.len());
            for value in &call.args {
                args.push(resolve_arg(&call.name, value, env)?);
            }
            args
        };
        model.operations.push(OpRecord {
            op: call.name.clone(),
            args,
        });
    }

    Ok(model)
}

/// Flatten point tuples and bracketed point lists into coordinate rows.
fn collect_points(op_name: &str, args: &[Value]) -> Result<Vec<Vec<f64>>, String> {
    let mut points = Vec::new();
    for arg in args {
        match arg {
            Value::Tuple(coords) => points.push(point_coords(op_name, coords)?),
            Value::List(items) => {
                for item in items {
                    match item {
                        Value::Tuple(coords) => points.push(point_coords(op_name, coords)?),
                        _ => {
                            return Err(format!(
                                "{op_name}() expected (x, y) point tuples in its list argument"
                            ));
                        }
                    }
                }
            }
            _ => {
                return Err(format!(
                    "{op_name}() mixes point tuples with plain positional arguments"
                ));
            }
        }
    }
    Ok(points)
}

fn point_coords(op_name: &str, items: &[Value]) -> Result<Vec<f64>, String> {
    let mut coords = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::Num(n) => coords.push(*n),
            _ => {
                return Err(format!(
                    "{op_name}() expected numeric (x, y) point tuples"
                ));
            }
        }
    }
    if coords.len() < 2 || coords.len() > 3 {
        return Err(format!(
            "{op_name}() expected numeric (x, y) point tuples"
        ));
    }
    Ok(coords)
}

fn check_arity(spec: &OpSpec, args: &[Value]) -> Result<(), String> {
    if args.len() == 1 && matches!(args[0], Value::Tuple(_)) && spec.min_args > 1 {
        return Err(format!(
            "{}() expected {} positional arguments but received a single tuple",
            spec.name, spec.min_args
        ));
    }
    if args
        .iter()
        .any(|a| matches!(a, Value::Tuple(_) | Value::List(_)))
    {
        return Err(format!("{}() does not accept a tuple argument", spec.name));
    }
    check_count(spec, args.len())
}

fn check_count(spec: &OpSpec, count: usize) -> Result<(), String> {
    if count < spec.min_args {
        return Err(format!(
            "{}() missing required positional arguments: expected at least {}, got {}",
            spec.name, spec.min_args, count
        ));
    }
    if count > spec.max_args {
        return Err(format!(
            "{}() takes at most {} positional arguments, got {}",
            spec.name, spec.max_args, count
        ));
    }
    Ok(())
}

fn resolve_arg(
    op_name: &str,
    value: &Value,
    env: &HashMap<String, SolidModel>,
) -> Result<ArgValue, String> {
    match value {
        Value::Num(n) => Ok(ArgValue::Number(*n)),
        Value::Str(s) => Ok(ArgValue::Text(s.clone())),
        Value::Ref(name) => {
            if env.contains_key(name) {
                Ok(ArgValue::Text(name.clone()))
            } else {
                Err(format!(
                    "name '{name}' is not defined (argument of {op_name}())"
                ))
            }
        }
        Value::Tuple(_) | Value::List(_) => {
            Err(format!("{op_name}() does not accept a tuple argument"))
        }
    }
}

/* ───────────────────────── suggestions ───────────────────────── */

/// Nearest capability name within edit distance 2, for the
/// `Did you mean '…'?` hint.
fn suggest(name: &str) -> Option<&'static str> {
    let mut best: Option<(&'static str, usize)> = None;
    for candidate in capability_names() {
        let d = levenshtein(name, candidate);
        if d <= 2 && best.map(|(_, bd)| d < bd).unwrap_or(true) {
            best = Some((candidate, d));
        }
    }
    best.map(|(c, _)| c)
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            cur[j + 1] = (prev[j + 1] + 1).min(cur[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}
