use super::types::UIElement;

/// Format one element as a single summary line.
///
/// Example output:
/// ```text
/// Button "Log In" #login_button (20, 330) 350x50
/// TextField #email_field value="me@example.com" (20, 200) 350x44 [disabled]
/// ```
pub fn format_element(element: &UIElement) -> String {
    let mut parts = Vec::new();

    parts.push(element.element_type.clone());

    if let Some(ref label) = element.label {
        if !label.is_empty() {
            parts.push(format!("\"{}\"", truncate_str(label, 40)));
        }
    }

    if let Some(ref id) = element.identifier {
        if !id.is_empty() {
            parts.push(format!("#{}", id));
        }
    }

    if let Some(ref value) = element.value {
        if !value.is_empty() {
            parts.push(format!("value=\"{}\"", truncate_str(value, 30)));
        }
    } else if let Some(ref placeholder) = element.placeholder {
        if !placeholder.is_empty() {
            parts.push(format!("placeholder=\"{}\"", truncate_str(placeholder, 30)));
        }
    }

    parts.push(format!(
        "({}, {}) {}x{}",
        element.frame.x as i32,
        element.frame.y as i32,
        element.frame.width as i32,
        element.frame.height as i32
    ));

    let mut states = Vec::new();
    if !element.enabled {
        states.push("disabled");
    }
    if !element.visible {
        states.push("hidden");
    }
    if !states.is_empty() {
        parts.push(format!("[{}]", states.join(", ")));
    }

    parts.join(" ")
}

/// Format a whole snapshot as an indented outline, one element per line
pub fn format_tree(root: &UIElement) -> String {
    let mut lines = Vec::new();
    push_lines(root, 0, &mut lines);
    lines.join("\n")
}

fn push_lines(element: &UIElement, depth: usize, lines: &mut Vec<String>) {
    lines.push(format!("{}{}", "  ".repeat(depth), format_element(element)));
    for child in &element.children {
        push_lines(child, depth + 1, lines);
    }
}

/// Format a list of matches for tool results
pub fn format_elements_compact(elements: &[&UIElement]) -> String {
    if elements.is_empty() {
        return "No matching elements".to_string();
    }

    elements
        .iter()
        .enumerate()
        .map(|(i, e)| format!("[{}] {}", i + 1, format_element(e)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Truncate a string to a maximum number of characters, adding "..." if truncated
fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
