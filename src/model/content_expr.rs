//! Compiles content expressions like `paragraph block*` or `heading{1,3}`
//! into deterministic automata, stored in a per-schema arena.

use super::schema::NodeTypeData;
use displaydoc::Display;
use std::collections::HashMap;
use thiserror::Error;

/// The state of the expression that matches nothing but the empty fragment.
pub(crate) const EMPTY: usize = 0;

/// Errors in a content expression
#[derive(Debug, Display, Error, PartialEq, Eq, Clone)]
pub enum ContentExprError {
    /// Expected number, got '{0}'
    ExpectedNumber(String),
    /// Unclosed braced range
    UnclosedRange,
    /// No node type or group '{0}' found
    UnknownName(String),
    /// Mixing inline and block content
    MixedInline,
    /// Missing closing paren
    MissingParen,
    /// Unexpected token '{0}'
    UnexpectedToken(String),
    /// Unexpected end of expression
    UnexpectedEnd,
    /// Unexpected trailing text
    TrailingText,
    /// Only non-generatable nodes ({0}) in a required position
    DeadEnd(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MatchEdge {
    pub(crate) node_type: usize,
    pub(crate) next: usize,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MatchState {
    pub(crate) valid_end: bool,
    pub(crate) next: Vec<MatchEdge>,
}

/// All match states of a schema. State `EMPTY` is shared by every leaf type.
#[derive(Debug)]
pub(crate) struct Automaton {
    states: Vec<MatchState>,
}

impl Automaton {
    pub(crate) fn new() -> Self {
        Automaton {
            states: vec![MatchState {
                valid_end: true,
                next: Vec::new(),
            }],
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.states.len()
    }

    pub(crate) fn state(&self, index: usize) -> &MatchState {
        &self.states[index]
    }

    pub(crate) fn first_edge_type(&self, index: usize) -> Option<usize> {
        self.states[index].next.first().map(|e| e.node_type)
    }

    /// Compile an expression against the given node types, returning the
    /// index of its start state.
    pub(crate) fn compile(
        &mut self,
        source: &str,
        types: &[NodeTypeData],
    ) -> Result<usize, ContentExprError> {
        let mut stream = TokenStream::new(source, types);
        if stream.next().is_none() {
            return Ok(EMPTY);
        }
        let expr = parse_expr(&mut stream)?;
        if let Some(token) = stream.next() {
            return Err(if token == ")" {
                ContentExprError::UnexpectedToken(token.to_owned())
            } else {
                ContentExprError::TrailingText
            });
        }
        let nfa = Nfa::build(&expr);
        let start = self.push_dfa(&nfa);
        self.check_for_dead_ends(start, types)?;
        Ok(start)
    }

    fn push_state(&mut self, valid_end: bool) -> usize {
        self.states.push(MatchState {
            valid_end,
            next: Vec::new(),
        });
        self.states.len() - 1
    }

    /// Subset construction. Sets of NFA states are kept sorted, so they can
    /// be used as keys directly.
    fn push_dfa(&mut self, nfa: &Nfa) -> usize {
        let accept = nfa.accept();
        let mut labeled: HashMap<Vec<usize>, usize> = HashMap::new();

        let start_set = nfa.null_from(0);
        let base = self.push_state(start_set.contains(&accept));
        labeled.insert(start_set.clone(), base);
        let mut work = vec![start_set];

        let mut i = 0;
        while i < work.len() {
            let mut out: Vec<(usize, Vec<usize>)> = Vec::new();
            for &node in &work[i] {
                for edge in &nfa.states[node] {
                    let (term, to) = match (edge.term, edge.to) {
                        (Some(term), Some(to)) => (term, to),
                        _ => continue,
                    };
                    let pos = match out.iter().position(|(t, _)| *t == term) {
                        Some(pos) => pos,
                        None => {
                            out.push((term, Vec::new()));
                            out.len() - 1
                        }
                    };
                    for n in nfa.null_from(to) {
                        if !out[pos].1.contains(&n) {
                            out[pos].1.push(n);
                        }
                    }
                }
            }
            for (term, mut set) in out {
                set.sort_unstable();
                let target = match labeled.get(&set) {
                    Some(&target) => target,
                    None => {
                        let target = self.push_state(set.contains(&accept));
                        labeled.insert(set.clone(), target);
                        work.push(set);
                        target
                    }
                };
                self.states[base + i].next.push(MatchEdge {
                    node_type: term,
                    next: target,
                });
            }
            i += 1;
        }
        base
    }

    fn check_for_dead_ends(&self, start: usize, types: &[NodeTypeData]) -> Result<(), ContentExprError> {
        for state in &self.states[start..] {
            if state.valid_end {
                continue;
            }
            let generatable = state.next.iter().any(|edge| {
                let t = &types[edge.node_type];
                !(t.is_text || t.has_required_attrs())
            });
            if !generatable {
                let names: Vec<&str> = state
                    .next
                    .iter()
                    .map(|edge| types[edge.node_type].name.as_str())
                    .collect();
                return Err(ContentExprError::DeadEnd(names.join(", ")));
            }
        }
        Ok(())
    }
}

struct TokenStream<'a> {
    tokens: Vec<&'a str>,
    pos: usize,
    inline: Option<bool>,
    types: &'a [NodeTypeData],
}

fn tokenize(source: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = None;
    for (i, c) in source.char_indices() {
        let word = c.is_ascii_alphanumeric() || c == '_';
        if let Some(s) = start {
            if word {
                continue;
            }
            tokens.push(&source[s..i]);
            start = None;
        }
        if word {
            start = Some(i);
        } else if !c.is_whitespace() {
            tokens.push(&source[i..i + c.len_utf8()]);
        }
    }
    if let Some(s) = start {
        tokens.push(&source[s..]);
    }
    tokens
}

impl<'a> TokenStream<'a> {
    fn new(source: &'a str, types: &'a [NodeTypeData]) -> Self {
        TokenStream {
            tokens: tokenize(source),
            pos: 0,
            inline: None,
            types,
        }
    }

    fn next(&self) -> Option<&'a str> {
        self.tokens.get(self.pos).copied()
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.next() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }
}

#[derive(Debug)]
enum Expr {
    Choice(Vec<Expr>),
    Seq(Vec<Expr>),
    Plus(Box<Expr>),
    Star(Box<Expr>),
    Opt(Box<Expr>),
    Range {
        min: usize,
        max: Option<usize>,
        expr: Box<Expr>,
    },
    Name(usize),
}

fn parse_expr(stream: &mut TokenStream) -> Result<Expr, ContentExprError> {
    let mut exprs = vec![parse_expr_seq(stream)?];
    while stream.eat("|") {
        exprs.push(parse_expr_seq(stream)?);
    }
    Ok(if exprs.len() == 1 {
        exprs.remove(0)
    } else {
        Expr::Choice(exprs)
    })
}

fn parse_expr_seq(stream: &mut TokenStream) -> Result<Expr, ContentExprError> {
    let mut exprs = vec![parse_expr_subscript(stream)?];
    while let Some(token) = stream.next() {
        if token == ")" || token == "|" {
            break;
        }
        exprs.push(parse_expr_subscript(stream)?);
    }
    Ok(if exprs.len() == 1 {
        exprs.remove(0)
    } else {
        Expr::Seq(exprs)
    })
}

fn parse_expr_subscript(stream: &mut TokenStream) -> Result<Expr, ContentExprError> {
    let mut expr = parse_expr_atom(stream)?;
    loop {
        if stream.eat("+") {
            expr = Expr::Plus(Box::new(expr));
        } else if stream.eat("*") {
            expr = Expr::Star(Box::new(expr));
        } else if stream.eat("?") {
            expr = Expr::Opt(Box::new(expr));
        } else if stream.eat("{") {
            expr = parse_expr_range(stream, expr)?;
        } else {
            break;
        }
    }
    Ok(expr)
}

fn parse_num(stream: &mut TokenStream) -> Result<usize, ContentExprError> {
    let token = stream.next().ok_or(ContentExprError::UnexpectedEnd)?;
    let num = token
        .parse()
        .map_err(|_| ContentExprError::ExpectedNumber(token.to_owned()))?;
    stream.pos += 1;
    Ok(num)
}

fn parse_expr_range(stream: &mut TokenStream, expr: Expr) -> Result<Expr, ContentExprError> {
    let min = parse_num(stream)?;
    let mut max = Some(min);
    if stream.eat(",") {
        max = if stream.next() != Some("}") {
            Some(parse_num(stream)?)
        } else {
            None
        };
    }
    if !stream.eat("}") {
        return Err(ContentExprError::UnclosedRange);
    }
    Ok(Expr::Range {
        min,
        max,
        expr: Box::new(expr),
    })
}

fn resolve_name(stream: &TokenStream, name: &str) -> Result<Vec<usize>, ContentExprError> {
    if let Some(index) = stream.types.iter().position(|t| t.name == name) {
        return Ok(vec![index]);
    }
    let group: Vec<usize> = stream
        .types
        .iter()
        .enumerate()
        .filter(|(_, t)| t.groups.iter().any(|g| g == name))
        .map(|(i, _)| i)
        .collect();
    if group.is_empty() {
        return Err(ContentExprError::UnknownName(name.to_owned()));
    }
    Ok(group)
}

fn parse_expr_atom(stream: &mut TokenStream) -> Result<Expr, ContentExprError> {
    if stream.eat("(") {
        let expr = parse_expr(stream)?;
        if !stream.eat(")") {
            return Err(ContentExprError::MissingParen);
        }
        return Ok(expr);
    }
    let token = stream.next().ok_or(ContentExprError::UnexpectedEnd)?;
    if !token.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ContentExprError::UnexpectedToken(token.to_owned()));
    }
    let types = resolve_name(stream, token)?;
    let mut exprs = Vec::with_capacity(types.len());
    for index in types {
        let inline = stream.types[index].is_inline();
        match stream.inline {
            None => stream.inline = Some(inline),
            Some(seen) if seen != inline => return Err(ContentExprError::MixedInline),
            Some(_) => {}
        }
        exprs.push(Expr::Name(index));
    }
    stream.pos += 1;
    Ok(if exprs.len() == 1 {
        exprs.remove(0)
    } else {
        Expr::Choice(exprs)
    })
}

#[derive(Debug, Clone, Copy)]
struct NfaEdge {
    term: Option<usize>,
    to: Option<usize>,
}

type EdgeRef = (usize, usize);

/// A non-deterministic automaton, node 0 is the start and the last node
/// added is the accepting one.
struct Nfa {
    states: Vec<Vec<NfaEdge>>,
}

impl Nfa {
    fn build(expr: &Expr) -> Self {
        let mut nfa = Nfa {
            states: vec![Vec::new()],
        };
        let ends = nfa.compile(expr, 0);
        let accept = nfa.node();
        nfa.connect(&ends, accept);
        nfa
    }

    fn accept(&self) -> usize {
        self.states.len() - 1
    }

    fn node(&mut self) -> usize {
        self.states.push(Vec::new());
        self.states.len() - 1
    }

    fn edge(&mut self, from: usize, to: Option<usize>, term: Option<usize>) -> EdgeRef {
        self.states[from].push(NfaEdge { term, to });
        (from, self.states[from].len() - 1)
    }

    fn connect(&mut self, edges: &[EdgeRef], to: usize) {
        for &(state, edge) in edges {
            self.states[state][edge].to = Some(to);
        }
    }

    fn compile(&mut self, expr: &Expr, from: usize) -> Vec<EdgeRef> {
        match expr {
            Expr::Choice(exprs) => exprs
                .iter()
                .flat_map(|expr| self.compile(expr, from))
                .collect(),
            Expr::Seq(exprs) => {
                let mut from = from;
                let last = exprs.len() - 1;
                for (i, expr) in exprs.iter().enumerate() {
                    let next = self.compile(expr, from);
                    if i == last {
                        return next;
                    }
                    from = self.node();
                    self.connect(&next, from);
                }
                Vec::new()
            }
            Expr::Star(expr) => {
                let looped = self.node();
                self.edge(from, Some(looped), None);
                let inner = self.compile(expr, looped);
                self.connect(&inner, looped);
                vec![self.edge(looped, None, None)]
            }
            Expr::Plus(expr) => {
                let looped = self.node();
                let first = self.compile(expr, from);
                self.connect(&first, looped);
                let inner = self.compile(expr, looped);
                self.connect(&inner, looped);
                vec![self.edge(looped, None, None)]
            }
            Expr::Opt(expr) => {
                let mut edges = vec![self.edge(from, None, None)];
                edges.extend(self.compile(expr, from));
                edges
            }
            Expr::Range { min, max, expr } => {
                let mut cur = from;
                for _ in 0..*min {
                    let next = self.node();
                    let edges = self.compile(expr, cur);
                    self.connect(&edges, next);
                    cur = next;
                }
                match max {
                    None => {
                        let edges = self.compile(expr, cur);
                        self.connect(&edges, cur);
                    }
                    Some(max) => {
                        for _ in *min..*max {
                            let next = self.node();
                            self.edge(cur, Some(next), None);
                            let edges = self.compile(expr, cur);
                            self.connect(&edges, next);
                            cur = next;
                        }
                    }
                }
                vec![self.edge(cur, None, None)]
            }
            Expr::Name(index) => vec![self.edge(from, None, Some(*index))],
        }
    }

    /// The set of nodes reachable from `node` through null edges, sorted.
    fn null_from(&self, node: usize) -> Vec<usize> {
        let mut result = Vec::new();
        let mut passed = Vec::new();
        let mut stack = vec![node];
        while let Some(node) = stack.pop() {
            let edges = &self.states[node];
            if let [NfaEdge {
                term: None,
                to: Some(to),
            }] = edges[..]
            {
                if !passed.contains(&node) {
                    passed.push(node);
                    stack.push(to);
                }
                continue;
            }
            if result.contains(&node) {
                continue;
            }
            result.push(node);
            for edge in edges {
                if let NfaEdge {
                    term: None,
                    to: Some(to),
                } = *edge
                {
                    if !result.contains(&to) {
                        stack.push(to);
                    }
                }
            }
        }
        result.sort_unstable();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::{tokenize, ContentExprError};
    use crate::model::{Schema, SchemaError, SchemaSpec};
    use serde_json::json;

    fn compile(expr: &str) -> Result<Schema, SchemaError> {
        let spec: SchemaSpec = serde_json::from_value(json!({
            "nodes": {
                "doc": {"content": expr},
                "paragraph": {"content": "text*", "group": "block"},
                "heading": {"content": "text*", "group": "block"},
                "image": {"inline": true, "group": "inline"},
                "text": {"group": "inline"}
            }
        }))
        .unwrap();
        Schema::new(spec)
    }

    fn kind(expr: &str) -> ContentExprError {
        match compile(expr).unwrap_err() {
            SchemaError::Content { kind, .. } => kind,
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn tokenizes_words_and_punctuation() {
        assert_eq!(tokenize("paragraph block*"), vec!["paragraph", "block", "*"]);
        assert_eq!(
            tokenize("(text | image)*"),
            vec!["(", "text", "|", "image", ")", "*"]
        );
        assert_eq!(
            tokenize("heading{1, 3}"),
            vec!["heading", "{", "1", ",", "3", "}"]
        );
    }

    #[test]
    fn plus_compiles_to_two_states() {
        let before = compile("").unwrap().inner.automaton.len();
        let after = compile("paragraph+").unwrap().inner.automaton.len();
        // "text*" takes one state for both paragraph and heading
        assert_eq!(after - before, 2);
    }

    #[test]
    fn reports_syntax_errors() {
        assert_eq!(kind("paragraph{x}"), ContentExprError::ExpectedNumber("x".into()));
        assert_eq!(kind("paragraph{2"), ContentExprError::UnclosedRange);
        assert_eq!(kind("nothing"), ContentExprError::UnknownName("nothing".into()));
        assert_eq!(kind("paragraph image"), ContentExprError::MixedInline);
        assert_eq!(kind("(paragraph"), ContentExprError::MissingParen);
        assert_eq!(kind("paragraph)"), ContentExprError::UnexpectedToken(")".into()));
        assert_eq!(kind("paragraph |"), ContentExprError::UnexpectedEnd);
        assert_eq!(kind("*"), ContentExprError::UnexpectedToken("*".into()));
    }

    #[test]
    fn text_alone_in_required_position_is_a_dead_end() {
        assert!(matches!(kind("text+"), ContentExprError::DeadEnd(_)));
        assert!(compile("text*").is_ok());
    }

    #[test]
    fn names_are_ascii_words() {
        assert_eq!(tokenize("blöck+"), vec!["bl", "ö", "ck", "+"]);
        assert_eq!(kind("paragraphé"), ContentExprError::UnexpectedToken("é".into()));
        let spec: SchemaSpec = serde_json::from_value(json!({
            "nodes": {
                "doc": {"content": "blöck+"},
                "blöck": {"content": "text*"},
                "text": {}
            }
        }))
        .unwrap();
        assert!(matches!(
            Schema::new(spec),
            Err(SchemaError::Content {
                kind: ContentExprError::UnknownName(_),
                ..
            })
        ));
    }
}
