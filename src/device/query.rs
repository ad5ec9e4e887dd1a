//! Declarative element queries over a snapshot tree.
//!
//! Queries are pure: they borrow the tree, never mutate it, and return
//! matches in traversal order. Callers that act on "the first match" should
//! position-sort the result so the choice does not depend on how the
//! inspector happened to order siblings.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

use super::types::UIElement;

/// Element type filter: a single type or any of a set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypeFilter {
    One(String),
    Many(Vec<String>),
}

impl TypeFilter {
    pub fn matches(&self, element_type: &str) -> bool {
        match self {
            TypeFilter::One(t) => t == element_type,
            TypeFilter::Many(types) => types.iter().any(|t| t == element_type),
        }
    }
}

/// Predicate over UI elements. Absent fields are wildcards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub element_type: Option<TypeFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Case-sensitive substring of identifier, label or value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Traits the element must carry (subset match)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub traits: Vec<String>,
}

impl ElementQuery {
    pub fn by_identifier(identifier: impl Into<String>) -> Self {
        Self {
            identifier: Some(identifier.into()),
            ..Default::default()
        }
    }

    pub fn by_label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Default::default()
        }
    }

    pub fn of_type(element_type: impl Into<String>) -> Self {
        Self {
            element_type: Some(TypeFilter::One(element_type.into())),
            ..Default::default()
        }
    }

    pub fn containing(text: impl Into<String>) -> Self {
        Self {
            contains_text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn visible_only(mut self) -> Self {
        self.visible = Some(true);
        self
    }

    /// True when no field is set (matches every element)
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn matches(&self, element: &UIElement) -> bool {
        if let Some(ref id) = self.identifier {
            if element.identifier.as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        if let Some(ref label) = self.label {
            if element.label.as_deref() != Some(label.as_str()) {
                return false;
            }
        }
        if let Some(ref filter) = self.element_type {
            if !filter.matches(&element.element_type) {
                return false;
            }
        }
        if let Some(ref value) = self.value {
            if element.value.as_deref() != Some(value.as_str()) {
                return false;
            }
        }
        if let Some(ref text) = self.contains_text {
            let hit = [&element.identifier, &element.label, &element.value]
                .iter()
                .any(|field| field.as_deref().is_some_and(|f| f.contains(text.as_str())));
            if !hit {
                return false;
            }
        }
        if let Some(visible) = self.visible {
            if element.visible != visible {
                return false;
            }
        }
        if let Some(enabled) = self.enabled {
            if element.enabled != enabled {
                return false;
            }
        }
        self.traits.iter().all(|t| element.traits.contains(t))
    }

    /// Short human-readable form, used in error messages
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(ref filter) = self.element_type {
            match filter {
                TypeFilter::One(t) => parts.push(t.clone()),
                TypeFilter::Many(types) => parts.push(format!("[{}]", types.join("|"))),
            }
        }
        if let Some(ref id) = self.identifier {
            parts.push(format!("#{}", id));
        }
        if let Some(ref label) = self.label {
            parts.push(format!("\"{}\"", label));
        }
        if let Some(ref value) = self.value {
            parts.push(format!("value=\"{}\"", value));
        }
        if let Some(ref text) = self.contains_text {
            parts.push(format!("*{}*", text));
        }
        if let Some(visible) = self.visible {
            parts.push(if visible { "visible" } else { "hidden" }.to_string());
        }
        if let Some(enabled) = self.enabled {
            parts.push(if enabled { "enabled" } else { "disabled" }.to_string());
        }
        for t in &self.traits {
            parts.push(format!("+{}", t));
        }
        if parts.is_empty() {
            "*".to_string()
        } else {
            parts.join(" ")
        }
    }
}

/// Result of running a query against one snapshot
#[derive(Debug, Clone)]
pub struct FindResult<'a> {
    pub query: ElementQuery,
    pub elements: Vec<&'a UIElement>,
    /// Every node visited, matched or not
    pub total_searched: usize,
}

impl<'a> FindResult<'a> {
    /// Matches in on-screen reading order
    pub fn sorted(mut self) -> Self {
        sort_by_position(&mut self.elements);
        self
    }

    /// First match in on-screen reading order
    pub fn first_by_position(&self) -> Option<&'a UIElement> {
        self.elements
            .iter()
            .copied()
            .min_by(|a, b| compare_position(a, b))
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }
}

/// Match `query` against every node of `tree` (depth-first, pre-order).
pub fn find_elements<'a>(tree: &'a UIElement, query: &ElementQuery) -> FindResult<'a> {
    let mut elements = Vec::new();
    let mut total_searched = 0;

    for node in tree.iter() {
        total_searched += 1;
        if query.matches(node) {
            elements.push(node);
        }
    }

    FindResult {
        query: query.clone(),
        elements,
        total_searched,
    }
}

fn compare_position(a: &UIElement, b: &UIElement) -> Ordering {
    a.frame
        .y
        .total_cmp(&b.frame.y)
        .then_with(|| a.frame.x.total_cmp(&b.frame.x))
}

/// Sort top-to-bottom, then left-to-right by frame origin.
/// Stable, so ties keep traversal order.
pub fn sort_by_position(elements: &mut [&UIElement]) {
    elements.sort_by(|a, b| compare_position(a, b));
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("Invalid element query '{query}': {reason}")]
pub struct QueryParseError {
    pub query: String,
    pub reason: String,
}

/// Parse the textual query syntax into one query per comma-separated part.
///
/// `#id`, `"label"` / `'label'`, `TypeName`, `TypeName#id`, `*substring*`;
/// any other bare token is treated as an identifier.
pub fn parse_query_string(text: &str) -> Result<Vec<ElementQuery>, QueryParseError> {
    let err = |reason: &str| QueryParseError {
        query: text.to_string(),
        reason: reason.to_string(),
    };

    let parts = split_outside_quotes(text).ok_or_else(|| err("unterminated quote"))?;
    let mut queries = Vec::with_capacity(parts.len());

    for part in parts {
        let part = part.trim();
        if part.is_empty() {
            return Err(err("empty query"));
        }
        queries.push(parse_query_part(part).ok_or_else(|| err("empty selector"))?);
    }

    Ok(queries)
}

fn parse_query_part(part: &str) -> Option<ElementQuery> {
    if let Some(id) = part.strip_prefix('#') {
        return (!id.is_empty()).then(|| ElementQuery::by_identifier(id));
    }

    if let Some(inner) = strip_matching_quotes(part) {
        return (!inner.is_empty()).then(|| ElementQuery::by_label(inner));
    }

    if part.len() > 2 && part.starts_with('*') && part.ends_with('*') {
        return Some(ElementQuery::containing(&part[1..part.len() - 1]));
    }

    if let Some((type_name, id)) = part.split_once('#') {
        if is_type_name(type_name) && !id.is_empty() {
            let mut query = ElementQuery::of_type(type_name);
            query.identifier = Some(id.to_string());
            return Some(query);
        }
    }

    if is_type_name(part) {
        return Some(ElementQuery::of_type(part));
    }

    Some(ElementQuery::by_identifier(part))
}

fn is_type_name(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_alphanumeric())
}

/// Strip one pair of matching `"` or `'` quotes
pub(crate) fn strip_matching_quotes(s: &str) -> Option<&str> {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' || first == b'\'') && first == last {
            return Some(&s[1..s.len() - 1]);
        }
    }
    None
}

/// Split on commas outside quotes. A quote only opens at the start of a
/// part, so apostrophes inside bare text stay literal.
fn split_outside_quotes(text: &str) -> Option<Vec<&str>> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut at_part_start = true;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') if at_part_start => {
                quote = Some(c);
                at_part_start = false;
            }
            (None, ',') => {
                parts.push(&text[start..i]);
                start = i + 1;
                at_part_start = true;
            }
            (None, c) if c.is_whitespace() => {}
            _ => at_part_start = false,
        }
    }

    if quote.is_some() {
        return None;
    }
    parts.push(&text[start..]);
    Some(parts)
}

/// Resolve a textual query, taking the union of every comma-separated part.
/// Each node appears once; the result is position-sorted.
pub fn find_by_query_string<'a>(
    tree: &'a UIElement,
    text: &str,
) -> Result<Vec<&'a UIElement>, QueryParseError> {
    let queries = parse_query_string(text)?;
    let mut union: Vec<&'a UIElement> = Vec::new();

    for query in &queries {
        for element in find_elements(tree, query).elements {
            if !union.iter().any(|seen| std::ptr::eq(*seen, element)) {
                union.push(element);
            }
        }
    }

    sort_by_position(&mut union);
    Ok(union)
}

/// Collect elements that look like what the caller meant: identifiers or
/// labels overlapping `needle`, or elements of the same type.
///
/// Returned as `#identifier` or `"label"` strings, fuzzy hits first.
pub fn suggest_similar(
    tree: &UIElement,
    needle: &str,
    element_type: Option<&str>,
    limit: usize,
) -> Vec<String> {
    let needle = needle.trim().to_lowercase();
    let needle_words = words(&needle);

    let mut ranked: Vec<(u8, &UIElement)> = tree
        .iter()
        .filter(|e| e.identifier.is_some() || e.label.is_some())
        .filter_map(|e| {
            let fuzzy = [&e.identifier, &e.label].iter().any(|name| {
                let Some(name) = name.as_deref() else {
                    return false;
                };
                let name = name.to_lowercase();
                if name.is_empty() || needle.is_empty() {
                    return false;
                }
                name.contains(&needle)
                    || needle.contains(&name)
                    || words(&name).iter().any(|w| needle_words.contains(w))
            });
            let same_type = element_type.is_some_and(|t| e.element_type == t);

            if fuzzy {
                Some((0, e))
            } else if same_type {
                Some((1, e))
            } else {
                None
            }
        })
        .collect();

    ranked.sort_by(|(ra, a), (rb, b)| ra.cmp(rb).then_with(|| compare_position(a, b)));

    let mut suggestions: Vec<String> = Vec::new();
    for (_, element) in ranked {
        let hint = match (&element.identifier, &element.label) {
            (Some(id), _) => format!("#{}", id),
            (None, Some(label)) => format!("\"{}\"", label),
            (None, None) => continue,
        };
        if !suggestions.contains(&hint) {
            suggestions.push(hint);
        }
        if suggestions.len() >= limit {
            break;
        }
    }
    suggestions
}

fn words(s: &str) -> Vec<&str> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 3)
        .collect()
}
