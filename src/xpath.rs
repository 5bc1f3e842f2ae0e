//! A small XPath subset for reading SRA experiment packages.
//!
//! Supported syntax, relative to a context node:
//!
//! * `A/B` child steps, `A//B` descendant steps, `*` for any element
//! * one predicate per element step: `RUN_ATTRIBUTE[TAG='read_length']` or
//!   `Read[@index='0']`
//! * terminal steps `@attr`, `text()` (non-blank direct text children) and
//!   `name()` (element tag name)
//!
//! Parsing never fails. Syntax that cannot be understood produces a step that
//! matches nothing, so a bad path reads as missing data.

use std::collections::HashSet;

use roxmltree::{Node, NodeId};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a, 'input> {
    Node(Node<'a, 'input>),
    Str(&'a str),
}

impl<'a, 'input> Value<'a, 'input> {
    pub fn as_str(&self) -> Option<&'a str> {
        match self {
            Value::Str(value) => Some(*value),
            Value::Node(_) => None,
        }
    }

    pub fn as_node(&self) -> Option<Node<'a, 'input>> {
        match self {
            Value::Node(node) => Some(*node),
            Value::Str(_) => None,
        }
    }
}

/// Result of a successful [`resolve`]: either the single indexed element or
/// the whole matched set.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved<'a, 'input> {
    One(Value<'a, 'input>),
    Many(Vec<Value<'a, 'input>>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePath {
    steps: Vec<Step>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Element {
        axis: Axis,
        name: NameTest,
        predicate: Option<Predicate>,
    },
    Attribute(Axis, String),
    Text(Axis),
    Name(Axis),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NameTest {
    Any,
    Named(String),
    Never,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    ChildText { name: String, value: String },
    Attribute { name: String, value: String },
    Never,
}

impl NodePath {
    pub fn parse(path: &str) -> Self {
        let mut steps = Vec::new();
        let mut axis = Axis::Child;
        for segment in path.split('/') {
            if segment.is_empty() {
                axis = Axis::Descendant;
                continue;
            }
            steps.push(parse_step(segment.trim(), axis));
            axis = Axis::Child;
        }
        Self { steps }
    }

    pub fn select<'a, 'input>(&self, context: Node<'a, 'input>) -> Vec<Value<'a, 'input>> {
        let mut current = vec![Value::Node(context)];
        for step in &self.steps {
            let nodes = current
                .iter()
                .filter_map(Value::as_node)
                .collect::<Vec<_>>();
            let (axis, contexts) = match step {
                Step::Element { axis, .. }
                | Step::Attribute(axis, _)
                | Step::Text(axis)
                | Step::Name(axis) => (*axis, nodes),
            };
            let contexts = match axis {
                Axis::Child => contexts,
                Axis::Descendant => descendants_or_self(&contexts),
            };
            current = apply_step(step, &contexts);
            if current.is_empty() {
                break;
            }
        }
        current
    }
}

impl From<&str> for NodePath {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

/// Reads `primary`; if that matches nothing and a fallback is supplied, reads
/// the fallback instead. With `index`, only that element of whichever set
/// matched is returned. `None` means the data is absent, never an error.
pub fn resolve<'a, 'input>(
    context: Node<'a, 'input>,
    primary: &str,
    fallback: Option<&str>,
    index: Option<usize>,
) -> Option<Resolved<'a, 'input>> {
    let values = NodePath::parse(primary).select(context);
    if values.is_empty() {
        return match fallback {
            Some(fallback) => resolve(context, fallback, None, index),
            None => None,
        };
    }
    match index {
        Some(index) => values.get(index).copied().map(Resolved::One),
        None => Some(Resolved::Many(values)),
    }
}

pub fn safe_read<'a, 'input>(
    context: Node<'a, 'input>,
    primary: &str,
    fallback: Option<&str>,
) -> Vec<Value<'a, 'input>> {
    match resolve(context, primary, fallback, None) {
        Some(Resolved::Many(values)) => values,
        Some(Resolved::One(value)) => vec![value],
        None => Vec::new(),
    }
}

pub fn safe_read_at<'a, 'input>(
    context: Node<'a, 'input>,
    primary: &str,
    fallback: Option<&str>,
    index: usize,
) -> Option<Value<'a, 'input>> {
    match resolve(context, primary, fallback, Some(index))? {
        Resolved::One(value) => Some(value),
        Resolved::Many(values) => values.into_iter().next(),
    }
}

/// First string value of the path (or its fallback).
pub fn read_text<'a>(context: Node<'a, '_>, primary: &str, fallback: Option<&str>) -> Option<&'a str> {
    safe_read_at(context, primary, fallback, 0).and_then(|value| value.as_str())
}

/// All string values of the path, in document order.
pub fn read_texts<'a>(context: Node<'a, '_>, path: &str) -> Vec<&'a str> {
    safe_read(context, path, None)
        .iter()
        .filter_map(Value::as_str)
        .collect()
}

pub fn read_nodes<'a, 'input>(context: Node<'a, 'input>, path: &str) -> Vec<Node<'a, 'input>> {
    safe_read(context, path, None)
        .iter()
        .filter_map(Value::as_node)
        .collect()
}

fn parse_step(segment: &str, axis: Axis) -> Step {
    match segment {
        "text()" => return Step::Text(axis),
        "name()" => return Step::Name(axis),
        _ => {}
    }
    if let Some(name) = segment.strip_prefix('@') {
        return Step::Attribute(axis, name.to_string());
    }

    let (name, predicate) = match segment.split_once('[') {
        Some((name, rest)) => {
            let predicate = rest
                .strip_suffix(']')
                .map(parse_predicate)
                .unwrap_or(Predicate::Never);
            (name, Some(predicate))
        }
        None => (segment, None),
    };
    let name = match name {
        "*" => NameTest::Any,
        "" => NameTest::Never,
        name if name.contains(['(', ')', ']', '@']) => NameTest::Never,
        name => NameTest::Named(name.to_string()),
    };
    Step::Element {
        axis,
        name,
        predicate,
    }
}

fn parse_predicate(body: &str) -> Predicate {
    let Some((lhs, rhs)) = body.split_once('=') else {
        return Predicate::Never;
    };
    let rhs = rhs.trim();
    let value = rhs
        .strip_prefix('\'')
        .and_then(|value| value.strip_suffix('\''))
        .or_else(|| rhs.strip_prefix('"').and_then(|value| value.strip_suffix('"')));
    let Some(value) = value else {
        return Predicate::Never;
    };
    let lhs = lhs.trim();
    match lhs.strip_prefix('@') {
        Some(name) => Predicate::Attribute {
            name: name.to_string(),
            value: value.to_string(),
        },
        None if !lhs.is_empty() => Predicate::ChildText {
            name: lhs.to_string(),
            value: value.to_string(),
        },
        None => Predicate::Never,
    }
}

fn apply_step<'a, 'input>(step: &Step, contexts: &[Node<'a, 'input>]) -> Vec<Value<'a, 'input>> {
    let mut out = Vec::new();
    for node in contexts {
        match step {
            Step::Element {
                name, predicate, ..
            } => {
                for child in node.children().filter(|child| child.is_element()) {
                    if matches_name(child, name)
                        && predicate.as_ref().is_none_or(|p| matches_predicate(child, p))
                    {
                        out.push(Value::Node(child));
                    }
                }
            }
            Step::Attribute(_, name) => {
                if let Some(value) = node.attribute(name.as_str()) {
                    out.push(Value::Str(value));
                }
            }
            Step::Text(_) => out.extend(text_children(*node).map(Value::Str)),
            Step::Name(_) => {
                if node.is_element() {
                    out.push(Value::Str(node.tag_name().name()));
                }
            }
        }
    }
    out
}

fn matches_name(node: Node<'_, '_>, test: &NameTest) -> bool {
    match test {
        NameTest::Any => true,
        NameTest::Named(name) => node.tag_name().name() == name,
        NameTest::Never => false,
    }
}

fn matches_predicate(node: Node<'_, '_>, predicate: &Predicate) -> bool {
    match predicate {
        Predicate::ChildText { name, value } => node
            .children()
            .filter(|child| child.is_element() && child.tag_name().name() == name)
            .any(|child| text_children(child).any(|text| text == value)),
        Predicate::Attribute { name, value } => node.attribute(name.as_str()) == Some(value.as_str()),
        Predicate::Never => false,
    }
}

fn text_children<'a>(node: Node<'a, '_>) -> impl Iterator<Item = &'a str> {
    node.children()
        .filter(|child| child.is_text())
        .filter_map(|child| child.text())
        .filter(|text| !text.trim().is_empty())
}

fn descendants_or_self<'a, 'input>(nodes: &[Node<'a, 'input>]) -> Vec<Node<'a, 'input>> {
    let mut seen: HashSet<NodeId> = HashSet::new();
    let mut out: Vec<Node<'a, 'input>> = Vec::new();
    for node in nodes {
        // a context nested in an earlier one was already walked
        if seen.contains(&node.id()) {
            continue;
        }
        for candidate in node.descendants() {
            if seen.insert(candidate.id()) {
                out.push(candidate);
            }
        }
    }
    out
}
