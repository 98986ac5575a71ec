// ABOUTME: Directive processor for the native template dialect
// ABOUTME: Scans interpolation and block directives into a node tree and expands it

use serde_json::Value as JsonValue;
use std::fmt;
use tracing::warn;

use super::context::RenderContext;
use super::expr::{is_truthy, to_output, Expression};

/// A parsed native template.
///
/// Parsing never fails. A directive that cannot be understood is kept as
/// literal text and reported through [`Template::diagnostics`].
#[derive(Debug, Clone)]
pub struct Template {
    nodes: Vec<Node>,
    diagnostics: Vec<Diagnostic>,
}

/// A malformed directive found while parsing
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub line: usize,
    pub directive: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {} ({})", self.line, self.message, self.directive)
    }
}

#[derive(Debug, Clone)]
enum Node {
    Text(String),
    Interpolation {
        expression: Expression,
        escape: bool,
        source: String,
    },
    Conditional {
        condition: Expression,
        then_branch: Vec<Node>,
        else_branch: Vec<Node>,
        source: String,
    },
    Loop {
        binding: String,
        iterable: Expression,
        body: Vec<Node>,
        source: String,
    },
}

impl Template {
    pub fn parse(source: &str) -> Self {
        let mut parser = BlockParser::new(source);
        let nodes = parser.parse_document();
        for diagnostic in &parser.diagnostics {
            warn!("Malformed directive left unexpanded at {}", diagnostic);
        }
        Self {
            nodes,
            diagnostics: parser.diagnostics,
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Expand every directive against `context`
    pub fn render(&self, context: &RenderContext<'_>) -> String {
        let mut out = String::new();
        render_nodes(&self.nodes, context, &mut out);
        out
    }
}

/// Parse and expand `source` in one step
pub fn render_str(source: &str, context: &RenderContext<'_>) -> String {
    Template::parse(source).render(context)
}

/// Escape `& < > " '` in a single pass
pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn render_nodes(nodes: &[Node], context: &RenderContext<'_>, out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Interpolation {
                expression,
                escape,
                source,
            } => match expression.resolve(context) {
                Ok(value) => {
                    let text = to_output(value.as_deref());
                    if *escape {
                        out.push_str(&escape_html(&text));
                    } else {
                        out.push_str(&text);
                    }
                }
                Err(e) => {
                    warn!("{}", e);
                    out.push_str(source);
                }
            },
            Node::Conditional {
                condition,
                then_branch,
                else_branch,
                source,
            } => match condition.resolve(context) {
                Ok(value) if is_truthy(value.as_deref()) => {
                    render_nodes(then_branch, context, out)
                }
                Ok(_) => render_nodes(else_branch, context, out),
                Err(e) => {
                    warn!("{}", e);
                    out.push_str(source);
                }
            },
            Node::Loop {
                binding,
                iterable,
                body,
                source,
            } => match iterable.resolve(context) {
                Ok(value) => {
                    let Some(JsonValue::Array(items)) = value.as_deref() else {
                        continue;
                    };
                    let count = items.len();
                    for (index, item) in items.iter().enumerate() {
                        let mut scope = context.child();
                        scope.set("index", JsonValue::from(index));
                        scope.set("first", JsonValue::Bool(index == 0));
                        scope.set("last", JsonValue::Bool(index + 1 == count));
                        scope.set(binding.as_str(), item.clone());
                        render_nodes(body, &scope, out);
                    }
                }
                Err(e) => {
                    warn!("{}", e);
                    out.push_str(source);
                }
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum PieceKind<'s> {
    Text,
    Raw(&'s str),
    Escaped(&'s str),
    Tag(&'s str),
}

#[derive(Debug, Clone, Copy)]
struct Piece<'s> {
    kind: PieceKind<'s>,
    start: usize,
    end: usize,
}

/// Split the source into text runs and delimited directives.
///
/// `{{{` must be closed by `}}}`. An opener without its closer is reported
/// and kept as literal text.
fn scan<'s>(source: &'s str, diagnostics: &mut Vec<Diagnostic>) -> Vec<Piece<'s>> {
    let mut pieces = Vec::new();
    let mut pos = 0;

    while pos < source.len() {
        let rest = &source[pos..];
        let next_open = [rest.find("{{"), rest.find("{%")]
            .into_iter()
            .flatten()
            .min();

        let Some(offset) = next_open else {
            pieces.push(Piece {
                kind: PieceKind::Text,
                start: pos,
                end: source.len(),
            });
            break;
        };
        if offset > 0 {
            pieces.push(Piece {
                kind: PieceKind::Text,
                start: pos,
                end: pos + offset,
            });
            pos += offset;
            continue;
        }

        let (opener, delimited) = if rest.starts_with("{{{") {
            let raw = close_delimiter(source, pos, "{{{", "}}}")
                .map(|(inner, end)| (PieceKind::Raw(inner), end));
            ("{{{", raw)
        } else if rest.starts_with("{{") {
            let escaped = close_delimiter(source, pos, "{{", "}}")
                .map(|(inner, end)| (PieceKind::Escaped(inner), end));
            ("{{", escaped)
        } else {
            let tag = close_delimiter(source, pos, "{%", "%}")
                .map(|(inner, end)| (PieceKind::Tag(inner), end));
            ("{%", tag)
        };

        match delimited {
            Some((kind, end)) => {
                pieces.push(Piece {
                    kind,
                    start: pos,
                    end,
                });
                pos = end;
            }
            None => {
                diagnostics.push(Diagnostic {
                    line: line_of(source, pos),
                    directive: opener.to_string(),
                    message: "unterminated directive".to_string(),
                });
                pieces.push(Piece {
                    kind: PieceKind::Text,
                    start: pos,
                    end: pos + opener.len(),
                });
                pos += opener.len();
            }
        }
    }

    pieces
}

fn close_delimiter<'s>(
    source: &'s str,
    start: usize,
    open: &str,
    close: &str,
) -> Option<(&'s str, usize)> {
    let inner_start = start + open.len();
    source[inner_start..].find(close).map(|offset| {
        let inner_end = inner_start + offset;
        (&source[inner_start..inner_end], inner_end + close.len())
    })
}

fn line_of(source: &str, offset: usize) -> usize {
    source[..offset].matches('\n').count() + 1
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BlockKind {
    If,
    For,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CloseKind {
    Else,
    EndIf,
    EndFor,
}

#[derive(Debug, Clone, Copy)]
struct CloseTag {
    kind: CloseKind,
    start: usize,
    end: usize,
}

enum TagKind<'s> {
    If(&'s str),
    For(&'s str, &'s str),
    Close(CloseKind),
}

fn classify_tag(inner: &str) -> Result<TagKind<'_>, String> {
    let inner = inner.trim();
    let keyword = inner.split_whitespace().next().unwrap_or_default();
    let rest = inner[keyword.len()..].trim();

    match keyword {
        "if" if rest.is_empty() => Err("`if` requires a condition".to_string()),
        "if" => Ok(TagKind::If(rest)),
        "for" => parse_for_head(rest).map(|(binding, iterable)| TagKind::For(binding, iterable)),
        "else" | "endif" | "endfor" if !rest.is_empty() => {
            Err(format!("`{}` takes no arguments", keyword))
        }
        "else" => Ok(TagKind::Close(CloseKind::Else)),
        "endif" => Ok(TagKind::Close(CloseKind::EndIf)),
        "endfor" => Ok(TagKind::Close(CloseKind::EndFor)),
        "" => Err("empty tag".to_string()),
        other => Err(format!("unknown tag `{}`", other)),
    }
}

fn parse_for_head(head: &str) -> Result<(&str, &str), String> {
    let malformed = || format!("expected `for <name> in <expression>`, found `for {}`", head);

    let binding = head.split_whitespace().next().ok_or_else(malformed)?;
    let is_identifier = binding
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && binding.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$');
    if !is_identifier {
        return Err(malformed());
    }

    let after_binding = head[binding.len()..].trim_start();
    let iterable = after_binding
        .strip_prefix("in")
        .filter(|rest| rest.starts_with(char::is_whitespace))
        .map(str::trim)
        .filter(|rest| !rest.is_empty())
        .ok_or_else(malformed)?;

    Ok((binding, iterable))
}

/// Deepest `if`/`for` nesting the parser will open; deeper tags stay literal
const MAX_BLOCK_DEPTH: usize = 128;

/// Recursive-descent parser over scanned pieces.
///
/// `open` holds the blocks currently being parsed, innermost last. A closing
/// tag ends the nearest open block of its kind, leaving any blocks opened
/// after it unclosed; a closing tag with no matching open block is literal.
struct BlockParser<'s> {
    source: &'s str,
    pieces: Vec<Piece<'s>>,
    pos: usize,
    open: Vec<BlockKind>,
    diagnostics: Vec<Diagnostic>,
}

impl<'s> BlockParser<'s> {
    fn new(source: &'s str) -> Self {
        let mut diagnostics = Vec::new();
        let pieces = scan(source, &mut diagnostics);
        Self {
            source,
            pieces,
            pos: 0,
            open: Vec::new(),
            diagnostics,
        }
    }

    fn parse_document(&mut self) -> Vec<Node> {
        let (nodes, close) = self.parse_sequence();
        debug_assert!(close.is_none(), "closing tags never escape the document level");
        nodes
    }

    fn parse_sequence(&mut self) -> (Vec<Node>, Option<CloseTag>) {
        let source = self.source;
        let mut nodes = Vec::new();

        while let Some(piece) = self.pieces.get(self.pos).copied() {
            self.pos += 1;
            let span = &source[piece.start..piece.end];

            match piece.kind {
                PieceKind::Text => push_text(&mut nodes, span),
                PieceKind::Raw(inner) | PieceKind::Escaped(inner) => {
                    if inner.trim().is_empty() {
                        self.report(piece.start, span, "empty expression");
                        push_text(&mut nodes, span);
                    } else {
                        nodes.push(Node::Interpolation {
                            expression: Expression::new(inner),
                            escape: matches!(piece.kind, PieceKind::Escaped(_)),
                            source: span.to_string(),
                        });
                    }
                }
                PieceKind::Tag(inner) => {
                    let pending = match classify_tag(inner) {
                        Ok(TagKind::If(_) | TagKind::For(..))
                            if self.open.len() >= MAX_BLOCK_DEPTH =>
                        {
                            self.report(piece.start, span, "blocks nest too deeply");
                            push_text(&mut nodes, span);
                            None
                        }
                        Ok(TagKind::If(condition)) => self.parse_if(piece, condition, &mut nodes),
                        Ok(TagKind::For(binding, iterable)) => {
                            self.parse_for(piece, binding, iterable, &mut nodes)
                        }
                        Ok(TagKind::Close(kind)) => Some(CloseTag {
                            kind,
                            start: piece.start,
                            end: piece.end,
                        }),
                        Err(message) => {
                            self.report(piece.start, span, &message);
                            push_text(&mut nodes, span);
                            None
                        }
                    };

                    if let Some(close) = pending {
                        if self.closes_open_block(close.kind) {
                            return (nodes, Some(close));
                        }
                        let text = &source[close.start..close.end];
                        self.report(close.start, text, "closing tag without a matching block");
                        push_text(&mut nodes, text);
                    }
                }
            }
        }

        (nodes, None)
    }

    fn closes_open_block(&self, kind: CloseKind) -> bool {
        match kind {
            CloseKind::Else => self.open.last() == Some(&BlockKind::If),
            CloseKind::EndIf => self.open.contains(&BlockKind::If),
            CloseKind::EndFor => self.open.contains(&BlockKind::For),
        }
    }

    /// Parse an `if` block. Returns a closing tag that belongs to an
    /// enclosing block when this one turns out to be unclosed.
    fn parse_if(
        &mut self,
        open: Piece<'s>,
        condition: &'s str,
        nodes: &mut Vec<Node>,
    ) -> Option<CloseTag> {
        let source = self.source;
        self.open.push(BlockKind::If);
        let (then_branch, mut close) = self.parse_sequence();

        let mut else_tag = None;
        let mut else_branch = Vec::new();
        if let Some(tag) = close.filter(|tag| tag.kind == CloseKind::Else) {
            else_tag = Some(tag);
            loop {
                let (part, next) = self.parse_sequence();
                else_branch.extend(part);
                match next {
                    Some(extra) if extra.kind == CloseKind::Else => {
                        let text = &source[extra.start..extra.end];
                        self.report(extra.start, text, "`else` already seen for this block");
                        push_text(&mut else_branch, text);
                    }
                    other => {
                        close = other;
                        break;
                    }
                }
            }
        }
        self.open.pop();

        match close {
            Some(end) if end.kind == CloseKind::EndIf => {
                nodes.push(Node::Conditional {
                    condition: Expression::new(condition),
                    then_branch,
                    else_branch,
                    source: source[open.start..end.end].to_string(),
                });
                None
            }
            other => {
                self.keep_unclosed(open, "if", nodes);
                nodes.extend(then_branch);
                if let Some(tag) = else_tag {
                    push_text(nodes, &source[tag.start..tag.end]);
                }
                nodes.extend(else_branch);
                other
            }
        }
    }

    fn parse_for(
        &mut self,
        open: Piece<'s>,
        binding: &'s str,
        iterable: &'s str,
        nodes: &mut Vec<Node>,
    ) -> Option<CloseTag> {
        self.open.push(BlockKind::For);
        let (body, close) = self.parse_sequence();
        self.open.pop();

        match close {
            Some(end) if end.kind == CloseKind::EndFor => {
                nodes.push(Node::Loop {
                    binding: binding.to_string(),
                    iterable: Expression::new(iterable),
                    body,
                    source: self.source[open.start..end.end].to_string(),
                });
                None
            }
            other => {
                self.keep_unclosed(open, "for", nodes);
                nodes.extend(body);
                other
            }
        }
    }

    /// An unclosed block keeps its opening tag as text; its body is still expanded
    fn keep_unclosed(&mut self, open: Piece<'s>, keyword: &str, nodes: &mut Vec<Node>) {
        let text = &self.source()[open.start..open.end];
        self.report(open.start, text, &format!("`{}` block is never closed", keyword));
        push_text(nodes, text);
    }

    fn source(&self) -> &'s str {
        self.source
    }

    fn report(&mut self, offset: usize, directive: &str, message: &str) {
        self.diagnostics.push(Diagnostic {
            line: line_of(self.source, offset),
            directive: directive.to_string(),
            message: message.to_string(),
        });
    }
}

fn push_text(nodes: &mut Vec<Node>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Node::Text(last)) = nodes.last_mut() {
        last.push_str(text);
    } else {
        nodes.push(Node::Text(text.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(source: &str, data: JsonValue) -> String {
        let context = RenderContext::from_json(&data).unwrap();
        render_str(source, &context)
    }

    #[test]
    fn test_plain_text_is_verbatim() {
        let source = "<p>No directives { here } or %} there</p>\n";
        assert_eq!(render(source, json!({})), source);
    }

    #[test]
    fn test_escaped_and_raw_interpolation() {
        let data = json!({"name": "<Bo>", "count": "<b>3</b>"});
        assert_eq!(
            render("Hello {{ name }}, you have {{{ count }}} items", data),
            "Hello &lt;Bo&gt;, you have <b>3</b> items"
        );
        assert_eq!(render("{{ v }}", json!({"v": "<b>"})), "&lt;b&gt;");
        assert_eq!(render("{{{ v }}}", json!({"v": "<b>"})), "<b>");
    }

    #[test]
    fn test_escape_covers_all_five_characters_once() {
        assert_eq!(
            escape_html(r#"a & b < c > "d" 'e'"#),
            "a &amp; b &lt; c &gt; &quot;d&quot; &#39;e&#39;"
        );
        assert_eq!(escape_html("&amp;"), "&amp;amp;");
    }

    #[test]
    fn test_missing_value_renders_empty() {
        assert_eq!(render("[{{ nope }}][{{{ nope.deeper }}}]", json!({})), "[][]");
    }

    #[test]
    fn test_conditional_blocks() {
        let source = "{% if show %}Hi {{ name }}{% endif %}!";
        assert_eq!(render(source, json!({"show": true, "name": "Ada"})), "Hi Ada!");
        assert_eq!(render(source, json!({"show": 0, "name": "Ada"})), "!");
        assert_eq!(render(source, json!({"name": "Ada"})), "!");
    }

    #[test]
    fn test_conditional_else_branch() {
        let source = "{% if user %}Hello {{ user.name }}{% else %}Sign in{% endif %}";
        assert_eq!(render(source, json!({"user": {"name": "Ada"}})), "Hello Ada");
        assert_eq!(render(source, json!({"user": null})), "Sign in");
    }

    #[test]
    fn test_conditional_truthiness_of_containers() {
        let source = "{% if items %}yes{% else %}no{% endif %}";
        assert_eq!(render(source, json!({"items": []})), "yes");
        assert_eq!(render(source, json!({"items": {}})), "yes");
        assert_eq!(render(source, json!({"items": ""})), "no");
    }

    #[test]
    fn test_nested_conditionals_pair_correctly() {
        let source = "{% if a %}A{% if b %}B{% endif %}a{% endif %}.";
        assert_eq!(render(source, json!({"a": true, "b": true})), "ABa.");
        assert_eq!(render(source, json!({"a": true, "b": false})), "Aa.");
        assert_eq!(render(source, json!({"a": false, "b": true})), ".");
    }

    #[test]
    fn test_loop_bindings() {
        let source =
            "{% for x in letters %}[{{ index }}:{{ x }}:{{ first }}:{{ last }}]{% endfor %}";
        assert_eq!(
            render(source, json!({"letters": ["a", "b", "c"]})),
            "[0:a:true:false][1:b:false:false][2:c:false:true]"
        );
    }

    #[test]
    fn test_loop_over_non_sequence_is_empty() {
        let source = "<{% for x in value %}{{ x }}{% endfor %}>";
        assert_eq!(render(source, json!({"value": 42})), "<>");
        assert_eq!(render(source, json!({"value": {"a": 1}})), "<>");
        assert_eq!(render(source, json!({})), "<>");
    }

    #[test]
    fn test_loop_scope_does_not_leak() {
        let source = "{% for name in names %}{{ name }},{% endfor %}{{ name }}";
        assert_eq!(render(source, json!({"names": ["a", "b"], "name": "outer"})), "a,b,outer");
    }

    #[test]
    fn test_nested_loops_and_conditionals() {
        let source = concat!(
            "{% for row in rows %}{% for cell in row.cells %}",
            "{% if cell.on %}{{ cell.v }}{% endif %}",
            "{% endfor %};{% endfor %}"
        );
        let data = json!({"rows": [
            {"cells": [{"on": true, "v": 1}, {"on": false, "v": 2}]},
            {"cells": [{"on": true, "v": 3}]}
        ]});
        assert_eq!(render(source, data), "1;3;");
    }

    #[test]
    fn test_loop_over_objects_with_expressions() {
        let source =
            "{% for p in people %}{% if p.age >= 18 %}{{ p.name }} {% endif %}{% endfor %}";
        let data = json!({"people": [{"name": "Ada", "age": 36}, {"name": "Kid", "age": 9}]});
        assert_eq!(render(source, data), "Ada ");
    }

    #[test]
    fn test_malformed_directives_are_preserved() {
        let data = json!({"user": {"name": "Ada"}});
        assert_eq!(render("a {{ user. }} b", data.clone()), "a {{ user. }} b");
        assert_eq!(render("{{ }}", data.clone()), "{{ }}");
        assert_eq!(render("{% include x %}", data.clone()), "{% include x %}");
        assert_eq!(render("open {{ user.name", data.clone()), "open {{ user.name");
        let bad_head = "{% for in items %}x{% endfor %}";
        assert_eq!(render(bad_head, data.clone()), bad_head);
        assert_eq!(render("{% endif %} {{ user.name }}", data), "{% endif %} Ada");
    }

    #[test]
    fn test_failing_condition_keeps_block_source() {
        let source = "{% if user..name %}{{ x }}{% endif %}";
        assert_eq!(render(source, json!({"x": 1})), source);
    }

    #[test]
    fn test_unclosed_block_keeps_tag_and_expands_body() {
        let template = Template::parse("{% if flag %}Hi {{ name }}");
        assert_eq!(template.diagnostics().len(), 1);

        let context = RenderContext::from_json(&json!({"name": "Ada"})).unwrap();
        assert_eq!(template.render(&context), "{% if flag %}Hi Ada");
    }

    #[test]
    fn test_endif_closes_through_unclosed_loop() {
        let template = Template::parse("{% if a %}{% for x in xs %}{{ x }}{% endif %}");
        let context = RenderContext::from_json(&json!({"a": true, "xs": [1]})).unwrap();

        assert_eq!(template.render(&context), "{% for x in xs %}");
        assert_eq!(template.diagnostics().len(), 1);
        assert!(template.diagnostics()[0].message.contains("never closed"));
    }

    #[test]
    fn test_diagnostics_report_lines() {
        let template = Template::parse("ok\n{% bogus %}\n{% else %}");
        let lines: Vec<usize> = template.diagnostics().iter().map(|d| d.line).collect();
        assert_eq!(lines, vec![2, 3]);
        assert!(Template::parse("{% if a %}{% else %}{% endif %}").diagnostics().is_empty());
    }

    #[test]
    fn test_unterminated_raw_interpolation_is_literal() {
        let template = Template::parse("Hi {{{ name }}!");
        let context = RenderContext::from_json(&json!({"name": "Ada"})).unwrap();

        assert_eq!(template.render(&context), "Hi {{{ name }}!");
        assert_eq!(template.diagnostics().len(), 1);
        assert_eq!(template.diagnostics()[0].directive, "{{{");
        assert_eq!(template.diagnostics()[0].message, "unterminated directive");
    }

    #[test]
    fn test_excessive_block_nesting_stays_literal() {
        let levels = 5000;
        let source = format!(
            "{}x{}",
            "{% if a %}".repeat(levels),
            "{% endif %}".repeat(levels)
        );
        let template = Template::parse(&source);
        let context = RenderContext::from_json(&json!({"a": true})).unwrap();

        let spill = levels - MAX_BLOCK_DEPTH;
        assert_eq!(
            template.render(&context),
            format!("{}x{}", "{% if a %}".repeat(spill), "{% endif %}".repeat(spill))
        );
        assert_eq!(template.diagnostics().len(), spill * 2);
    }

    #[test]
    fn test_loop_over_large_collection_reads_outer_binding() {
        let rows: Vec<JsonValue> = (0..20_000).map(|id| json!({"id": id})).collect();
        let context = RenderContext::from_json(&json!({ "rows": rows })).unwrap();
        let template =
            Template::parse("{% for r in rows %}{{ r.id }}/{{ rows.length }};{% endfor %}");

        let started = std::time::Instant::now();
        let out = template.render(&context);

        assert!(out.starts_with("0/20000;1/20000;"));
        assert!(out.ends_with("19999/20000;"));
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
    }
}
