//! Dockerfile parser producing an owned [`SyntaxTree`].
//!
//! The parser never fails outright. Arguments it cannot make sense of become
//! `ERROR` nodes in place, and the extraction routines decide whether that
//! makes the file malformed.
//!
//! Node kinds:
//!
//! - `source_file` — root, one child per instruction
//! - `from_instruction` — `param`*, `image_spec`, optional `image_alias` (field `as`)
//! - `image_spec` — `image_name` (field `name`), optional `image_tag` (field
//!   `tag`, text includes the leading `:`), optional `image_digest` (field
//!   `digest`, text includes the leading `@`)
//! - `expose_instruction` — `expose_port` (fields `port`, `protocol`) or `expansion`
//! - `label_instruction` — `label_pair` (fields `key`, `value`)
//! - `<keyword>_instruction` for every other known instruction, without children

use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::{alpha1, char, digit1, space0};
use nom::combinator::{all_consuming, map, opt, peek, recognize, rest};
use nom::multi::many0;
use nom::sequence::{delimited, pair, preceded, separated_pair, tuple};
use nom::{IResult, Offset};
use std::collections::VecDeque;
use std::ops::Range;

use crate::syntax::{Node, SyntaxTree};

pub const ERROR: &str = "ERROR";

/// Parse Dockerfile `source`.
pub fn parse(source: &str) -> SyntaxTree {
    let escape = escape_directive(source);
    let mut root = Node::new("source_file", 0..source.len());
    for line in logical_lines(source, escape) {
        let tokens = tokenize(source, &line);
        if let Some(node) = instruction(source, &tokens) {
            root.push(node);
        }
    }
    SyntaxTree::new(source, root)
}

// ── Lines and tokens ────────────────────────────────────────────────────────

/// The escape character from a leading `# escape=` parser directive.
fn escape_directive(source: &str) -> char {
    let mut escape = '\\';
    for line in source.lines() {
        let Ok((_, (key, value))) = directive(line.trim()) else {
            break;
        };
        if key.eq_ignore_ascii_case("escape") {
            if let Some(c @ ('\\' | '`')) = value.trim().chars().next() {
                escape = c;
            }
        }
    }
    escape
}

fn directive(input: &str) -> IResult<&str, (&str, &str)> {
    preceded(
        pair(char('#'), space0),
        separated_pair(alpha1, tuple((space0, char('='), space0)), rest),
    )(input)
}

/// Split into instructions. Each instruction is the list of byte ranges of its
/// physical lines, with continuation escapes, comments and blank lines removed.
/// Here-document bodies (`RUN <<EOF` up to `EOF`) belong to no instruction.
fn logical_lines(source: &str, escape: char) -> Vec<Vec<Range<usize>>> {
    let mut lines = Vec::new();
    let mut current = Vec::new();
    let mut heredocs: VecDeque<Heredoc<'_>> = VecDeque::new();
    let mut offset = 0;
    for physical in source.split_inclusive('\n') {
        let start = offset;
        offset += physical.len();

        let content = physical.trim_end_matches(|c: char| c == '\n' || c == '\r');
        if current.is_empty() {
            if let Some(doc) = heredocs.front() {
                if doc.ends_at(content) {
                    heredocs.pop_front();
                }
                continue;
            }
        }
        let trimmed = content.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let body = content.trim_end();
        let head = body.strip_suffix(escape);
        heredocs.extend(heredoc_markers(head.unwrap_or(body)));
        match head {
            Some(head) => current.push(start..start + head.len()),
            None => {
                current.push(start..start + body.len());
                lines.push(std::mem::take(&mut current));
            }
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// A `<<WORD` marker. With `<<-WORD` the terminator may be indented by tabs.
struct Heredoc<'a> {
    word: &'a str,
    strip_tabs: bool,
}

impl Heredoc<'_> {
    fn ends_at(&self, line: &str) -> bool {
        let line = if self.strip_tabs { line.trim_start_matches('\t') } else { line };
        line == self.word
    }
}

fn heredoc_markers(text: &str) -> Vec<Heredoc<'_>> {
    let mut found = Vec::new();
    let mut rest = text;
    while let Some(at) = rest.find("<<") {
        match heredoc(&rest[at..]) {
            Ok((tail, doc)) => {
                found.push(doc);
                rest = tail;
            }
            Err(_) => rest = &rest[at + 2..],
        }
    }
    found
}

/// `<<[-]WORD`, `<<[-]"WORD"` or `<<[-]'WORD'`
fn heredoc(input: &str) -> IResult<&str, Heredoc<'_>> {
    map(
        preceded(
            tag("<<"),
            pair(
                opt(char('-')),
                alt((
                    delimited(char('"'), heredoc_word, char('"')),
                    delimited(char('\''), heredoc_word, char('\'')),
                    heredoc_word,
                )),
            ),
        ),
        |(dash, word)| Heredoc { word, strip_tabs: dash.is_some() },
    )(input)
}

fn heredoc_word(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))(input)
}

/// Whitespace-separated tokens; quoted runs are kept inside one token.
fn tokenize(source: &str, segments: &[Range<usize>]) -> Vec<Range<usize>> {
    let mut tokens = Vec::new();
    for segment in segments {
        let mut start: Option<usize> = None;
        let mut quote: Option<char> = None;
        let mut escaped = false;
        for (i, c) in source[segment.clone()].char_indices() {
            let at = segment.start + i;
            if let Some(q) = quote {
                if escaped {
                    escaped = false;
                } else if c == '\\' && q == '"' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
                continue;
            }
            if c.is_whitespace() {
                if let Some(s) = start.take() {
                    tokens.push(s..at);
                }
            } else {
                start.get_or_insert(at);
                if c == '"' || c == '\'' {
                    quote = Some(c);
                }
            }
        }
        if let Some(s) = start {
            tokens.push(s..segment.end);
        }
    }
    tokens
}

/// Byte range of `part`, a subslice of `text`, which itself starts at `token.start`.
fn span_of(token: &Range<usize>, text: &str, part: &str) -> Range<usize> {
    let start = token.start + text.offset(part);
    start..start + part.len()
}

// ── Instructions ────────────────────────────────────────────────────────────

fn instruction(source: &str, tokens: &[Range<usize>]) -> Option<Node> {
    let (keyword, args) = tokens.split_first()?;
    let end = args.last().map_or(keyword.end, |last| last.end);
    let span = keyword.start..end;
    let node = match source[keyword.clone()].to_ascii_uppercase().as_str() {
        "FROM" => from_instruction(source, span, args),
        "EXPOSE" => expose_instruction(source, span, args),
        "LABEL" => label_instruction(source, span, args),
        other => Node::new(kind_of(other), span),
    };
    Some(node)
}

fn kind_of(keyword: &str) -> &'static str {
    match keyword {
        "ADD" => "add_instruction",
        "ARG" => "arg_instruction",
        "CMD" => "cmd_instruction",
        "COPY" => "copy_instruction",
        "ENTRYPOINT" => "entrypoint_instruction",
        "ENV" => "env_instruction",
        "HEALTHCHECK" => "healthcheck_instruction",
        "MAINTAINER" => "maintainer_instruction",
        "ONBUILD" => "onbuild_instruction",
        "RUN" => "run_instruction",
        "SHELL" => "shell_instruction",
        "STOPSIGNAL" => "stopsignal_instruction",
        "USER" => "user_instruction",
        "VOLUME" => "volume_instruction",
        "WORKDIR" => "workdir_instruction",
        _ => ERROR,
    }
}

fn from_instruction(source: &str, span: Range<usize>, args: &[Range<usize>]) -> Node {
    let mut node = Node::new("from_instruction", span);
    let mut rest = args;
    while let Some((first, tail)) = rest.split_first() {
        if !source[first.clone()].starts_with("--") {
            break;
        }
        node.push(Node::new("param", first.clone()));
        rest = tail;
    }

    let Some((image, rest)) = rest.split_first() else {
        return node;
    };
    node.push(image_spec(source, image.clone()));
    match rest {
        [] => {}
        [keyword, alias] if source[keyword.clone()].eq_ignore_ascii_case("as") => {
            node.push(Node::new("image_alias", alias.clone()).with_field("as"));
        }
        [only] => node.push(Node::new(ERROR, only.clone())),
        [first, .., last] => node.push(Node::new(ERROR, first.start..last.end)),
    }
    node
}

fn image_spec(source: &str, token: Range<usize>) -> Node {
    let text = &source[token.clone()];
    let Ok((_, (name, tag, digest))) = image_reference(text) else {
        return Node::new(ERROR, token);
    };
    let mut node = Node::new("image_spec", token.clone())
        .with_child(Node::new("image_name", span_of(&token, text, name)).with_field("name"));
    if let Some(tag) = tag {
        node.push(Node::new("image_tag", span_of(&token, text, tag)).with_field("tag"));
    }
    if let Some(digest) = digest {
        node.push(Node::new("image_digest", span_of(&token, text, digest)).with_field("digest"));
    }
    node
}

fn expose_instruction(source: &str, span: Range<usize>, args: &[Range<usize>]) -> Node {
    let mut node = Node::new("expose_instruction", span);
    for token in args {
        let text = &source[token.clone()];
        if text.starts_with('$') {
            node.push(Node::new("expansion", token.clone()));
            continue;
        }
        node.push(match port_spec(text) {
            Ok((_, (port, protocol))) => {
                let mut port_node = Node::new("expose_port", token.clone())
                    .with_child(Node::new("port", span_of(token, text, port)).with_field("port"));
                if let Some(protocol) = protocol {
                    port_node.push(
                        Node::new("protocol", span_of(token, text, protocol)).with_field("protocol"),
                    );
                }
                port_node
            }
            Err(_) => Node::new(ERROR, token.clone()),
        });
    }
    node
}

fn label_instruction(source: &str, span: Range<usize>, args: &[Range<usize>]) -> Node {
    let mut node = Node::new("label_instruction", span);
    let Some(first) = args.first() else {
        node.push(Node::new(ERROR, node.span()));
        return node;
    };

    // Legacy `LABEL key some value` form: one pair, value is the rest.
    if !source[first.clone()].contains('=') {
        match (args.get(1), args.last()) {
            (Some(value_start), Some(value_end)) => {
                let value = value_start.start..value_end.end;
                node.push(
                    Node::new("label_pair", first.start..value_end.end)
                        .with_child(Node::new("label_key", first.clone()).with_field("key"))
                        .with_child(Node::new("label_value", value).with_field("value")),
                );
            }
            _ => node.push(Node::new(ERROR, first.clone())),
        }
        return node;
    }

    for token in args {
        let text = &source[token.clone()];
        node.push(match label_assignment(text) {
            Ok((_, (key, value))) => Node::new("label_pair", token.clone())
                .with_child(Node::new("label_key", span_of(token, text, key)).with_field("key"))
                .with_child(Node::new("label_value", span_of(token, text, value)).with_field("value")),
            Err(_) => Node::new(ERROR, token.clone()),
        });
    }
    node
}

// ── Argument grammars ───────────────────────────────────────────────────────

/// `[host[:port]/]path[:tag][@digest]`
fn image_reference(input: &str) -> IResult<&str, (&str, Option<&str>, Option<&str>)> {
    all_consuming(tuple((image_name, opt(image_tag), opt(image_digest))))(input)
}

fn path_component(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !matches!(c, ':' | '@' | '/'))(input)
}

fn registry_host(input: &str) -> IResult<&str, &str> {
    recognize(tuple((path_component, char(':'), digit1, peek(char('/')))))(input)
}

fn image_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((registry_host, path_component)),
        many0(pair(char('/'), path_component)),
    ))(input)
}

fn image_tag(input: &str) -> IResult<&str, &str> {
    recognize(preceded(char(':'), take_while1(|c: char| c != '@')))(input)
}

fn image_digest(input: &str) -> IResult<&str, &str> {
    recognize(preceded(char('@'), take_while1(|_: char| true)))(input)
}

/// `port[-port][/protocol]`
fn port_spec(input: &str) -> IResult<&str, (&str, Option<&str>)> {
    all_consuming(pair(
        recognize(pair(digit1, opt(pair(char('-'), digit1)))),
        opt(preceded(char('/'), alpha1)),
    ))(input)
}

/// `key=value`, value possibly empty or quoted.
fn label_assignment(input: &str) -> IResult<&str, (&str, &str)> {
    all_consuming(separated_pair(take_while1(|c: char| c != '='), char('='), rest))(input)
}
