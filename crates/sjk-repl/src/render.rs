//! Type-aware expression value rendering.
//!
//! The supervisor never invokes language-specific formatters; it works
//! from the debugger's value-child enumeration. Ordered sequences,
//! key-value mappings, and small structured records render as HTML
//! tables alongside a plain-text form; everything else renders as the
//! plain summary only.

use crate::debugger::ValueNode;
use sjk_types::{ValueChild, ValueDescription};

/// Maximum sequence elements rendered as rows.
const SEQUENCE_LIMIT: usize = 100;

/// Maximum mapping entries rendered as rows.
const MAPPING_LIMIT: usize = 100;

/// Maximum record fields rendered as rows.
const RECORD_LIMIT: usize = 50;

/// Plain and HTML forms of a rendered value.
#[derive(Debug, Clone)]
pub struct RenderedValue {
    pub description: ValueDescription,
    pub text: String,
    pub html: Option<String>,
}

/// Renders a value tree into display forms.
#[must_use]
pub fn render(value: &ValueNode) -> RenderedValue {
    let text = if value.value.is_empty() {
        value.type_name.clone()
    } else {
        value.value.clone()
    };

    let (children, table_html) = if is_sequence(&value.type_name) {
        render_sequence(value)
    } else if is_mapping(&value.type_name) {
        render_mapping(value)
    } else if (2..=RECORD_LIMIT).contains(&value.children.len()) {
        render_record(value)
    } else {
        (Vec::new(), None)
    };
    // Values with no table form still publish an HTML rendering so the
    // client always has both representations to choose from.
    let html = table_html.or_else(|| Some(format!("<pre>{}</pre>", escape(&text))));

    RenderedValue {
        description: ValueDescription {
            type_name: value.type_name.clone(),
            summary: text.clone(),
            children,
            html: html.clone(),
        },
        text,
        html,
    }
}

/// Ordered-sequence detection from the Swift type name.
fn is_sequence(type_name: &str) -> bool {
    type_name.contains("Array<")
        || type_name.contains("ContiguousArray<")
        || type_name.contains("ArraySlice<")
        || (type_name.starts_with('[') && type_name.ends_with(']') && !type_name.contains(':'))
}

/// Key-value-mapping detection from the Swift type name.
fn is_mapping(type_name: &str) -> bool {
    type_name.contains("Dictionary<") || (type_name.starts_with('[') && type_name.contains(':'))
}

fn render_sequence(value: &ValueNode) -> (Vec<ValueChild>, Option<String>) {
    if value.children.is_empty() || value.children.len() > SEQUENCE_LIMIT {
        return (Vec::new(), None);
    }

    let children: Vec<ValueChild> = value
        .children
        .iter()
        .enumerate()
        .map(|(index, child)| ValueChild {
            name: index.to_string(),
            type_name: child.type_name.clone(),
            value: display_value(child),
        })
        .collect();

    let rows: String = children
        .iter()
        .map(|child| {
            format!(
                "<tr><td>{}</td><td>{}</td></tr>",
                escape(&child.name),
                escape(&child.value)
            )
        })
        .collect();
    let html = format!(
        "<div><div>{} ({} elements)</div><table><thead><tr><th>Index</th><th>Value</th></tr></thead><tbody>{rows}</tbody></table></div>",
        escape(&value.type_name),
        children.len(),
    );

    (children, Some(html))
}

fn render_mapping(value: &ValueNode) -> (Vec<ValueChild>, Option<String>) {
    if value.children.is_empty() || value.children.len() > MAPPING_LIMIT {
        return (Vec::new(), None);
    }

    let children: Vec<ValueChild> = value
        .children
        .iter()
        .map(|entry| {
            // Dictionary entries surface key/value sub-children; fall
            // back to (name, value) when the binding flattens them.
            let key = entry
                .children
                .iter()
                .find(|c| c.name == "key")
                .map(display_value)
                .unwrap_or_else(|| entry.name.clone());
            let val = entry
                .children
                .iter()
                .find(|c| c.name == "value")
                .map(display_value)
                .unwrap_or_else(|| display_value(entry));
            ValueChild {
                name: key,
                type_name: entry.type_name.clone(),
                value: val,
            }
        })
        .collect();

    let rows: String = children
        .iter()
        .map(|child| {
            format!(
                "<tr><td>{}</td><td>{}</td></tr>",
                escape(&child.name),
                escape(&child.value)
            )
        })
        .collect();
    let html = format!(
        "<div><div>{} ({} entries)</div><table><thead><tr><th>Key</th><th>Value</th></tr></thead><tbody>{rows}</tbody></table></div>",
        escape(&value.type_name),
        children.len(),
    );

    (children, Some(html))
}

fn render_record(value: &ValueNode) -> (Vec<ValueChild>, Option<String>) {
    let children: Vec<ValueChild> = value
        .children
        .iter()
        .enumerate()
        .map(|(index, child)| ValueChild {
            name: if child.name.is_empty() {
                format!("[{index}]")
            } else {
                child.name.clone()
            },
            type_name: child.type_name.clone(),
            value: display_value(child),
        })
        .collect();

    let rows: String = children
        .iter()
        .map(|child| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape(&child.name),
                escape(&child.type_name),
                escape(&child.value)
            )
        })
        .collect();
    let display_type = value.type_name.rsplit('.').next().unwrap_or("Object");
    let html = format!(
        "<div><div>{}</div><table><thead><tr><th>Property</th><th>Type</th><th>Value</th></tr></thead><tbody>{rows}</tbody></table></div>",
        escape(display_type),
    );

    (children, Some(html))
}

fn display_value(node: &ValueNode) -> String {
    if node.value.is_empty() {
        "nil".to_string()
    } else {
        node.value.trim_matches('"').to_string()
    }
}

/// Minimal HTML escaping for table cells.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}
