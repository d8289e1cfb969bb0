//! Per-label content extraction for the node snapshot.
//!
//! Files keep their (bounded) text, folders keep nothing, and every other
//! node keeps the source lines it spans plus a little surrounding context.

use crate::graph::{FileContents, GraphNode, NodeLabel};

/// Maximum characters stored for a `File` node.
pub const MAX_FILE_CONTENT_CHARS: usize = 10_000;

/// Maximum characters stored for a symbol snippet.
pub const MAX_SNIPPET_CHARS: usize = 5_000;

/// Lines of context added above and below a symbol's range.
pub const CONTEXT_LINES: u32 = 2;

/// Appended whenever content was cut.
pub const TRUNCATION_MARKER: &str = "\n... [truncated]";

/// Stored instead of the raw text of binary-looking files.
pub const BINARY_PLACEHOLDER: &str = "[Binary file - content not stored]";

/// Number of leading characters inspected by [`is_binary_content`].
pub const BINARY_SAMPLE_CHARS: usize = 1_000;

/// Fraction of control characters above which a sample counts as binary.
pub const BINARY_CONTROL_RATIO: f64 = 0.10;

fn is_binary_control(c: char) -> bool {
    matches!(c as u32, 0..=8 | 14..=31 | 127)
}

/// Heuristic binary check over the first [`BINARY_SAMPLE_CHARS`] characters.
///
/// Counts characters in the ranges 0-8, 14-31 and 127. Tabs, newlines,
/// vertical tabs, form feeds and carriage returns are not counted.
pub fn is_binary_content(content: &str) -> bool {
    let mut sampled = 0usize;
    let mut control = 0usize;
    for c in content.chars().take(BINARY_SAMPLE_CHARS) {
        sampled += 1;
        if is_binary_control(c) {
            control += 1;
        }
    }

    if sampled == 0 {
        return false;
    }

    control as f64 / sampled as f64 > BINARY_CONTROL_RATIO
}

/// Cut `text` to at most `max_chars` characters, appending the marker if cut.
pub fn truncate_content(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => {
            let mut out = String::with_capacity(byte_idx + TRUNCATION_MARKER.len());
            out.push_str(&text[..byte_idx]);
            out.push_str(TRUNCATION_MARKER);
            out
        }
        None => text.to_string(),
    }
}

/// Lines `[start - CONTEXT_LINES, end + CONTEXT_LINES]` of `content`, clamped.
fn snippet(content: &str, start_line: u32, end_line: u32) -> String {
    let lines: Vec<&str> = content.split('\n').collect();
    if lines.is_empty() {
        return String::new();
    }

    let first = start_line.saturating_sub(CONTEXT_LINES) as usize;
    let last = (end_line.saturating_add(CONTEXT_LINES) as usize).min(lines.len() - 1);
    if first > last {
        return String::new();
    }

    lines[first..=last].join("\n")
}

/// Content stored for `node` in the bulk-load snapshot.
pub fn extract_content(node: &GraphNode, file_contents: &FileContents) -> String {
    match node.label {
        NodeLabel::Folder => String::new(),
        NodeLabel::File => match file_contents.get(&node.properties.file_path) {
            Some(content) if is_binary_content(content) => BINARY_PLACEHOLDER.to_string(),
            Some(content) => truncate_content(content, MAX_FILE_CONTENT_CHARS),
            None => String::new(),
        },
        _ => {
            let (Some(start), Some(end)) = (node.properties.start_line, node.properties.end_line)
            else {
                return String::new();
            };
            match file_contents.get(&node.properties.file_path) {
                Some(content) => truncate_content(&snippet(content, start, end), MAX_SNIPPET_CHARS),
                None => String::new(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(path: &str, text: &str) -> FileContents {
        let mut map = FileContents::new();
        map.insert(path.to_string(), text.to_string());
        map
    }

    #[test]
    fn test_binary_detection_control_heavy() {
        // 20% NUL bytes in the sample
        let sample: String = (0..1000)
            .map(|i| if i % 5 == 0 { '\u{0}' } else { 'a' })
            .collect();
        assert!(is_binary_content(&sample));
    }

    #[test]
    fn test_binary_detection_png_header() {
        let png = "\u{89}PNG\r\n\u{1a}\n\u{0}\u{0}\u{0}\rIHDR\u{0}\u{0}\u{1}\u{0}\u{0}\u{0}\u{1}\u{0}\u{8}\u{6}\u{0}\u{0}\u{0}";
        assert!(is_binary_content(png));
    }

    #[test]
    fn test_binary_detection_plain_source() {
        let source: String = (0..500)
            .map(|i| format!("def func_{i}(x):\n\treturn x + {i}  # comment\r\n"))
            .collect();
        assert!(!is_binary_content(&source));
    }

    #[test]
    fn test_binary_detection_threshold_is_strict() {
        // exactly 10% control characters is still text
        let sample: String = (0..100)
            .map(|i| if i % 10 == 0 { '\u{1}' } else { 'x' })
            .collect();
        assert!(!is_binary_content(&sample));
        assert!(!is_binary_content(""));
    }

    #[test]
    fn test_binary_detection_only_samples_prefix() {
        let mut text = "a".repeat(1000);
        text.push_str(&"\u{0}".repeat(5000));
        assert!(!is_binary_content(&text));
    }

    #[test]
    fn test_folder_content_is_empty() {
        let node = GraphNode::folder("src");
        assert_eq!(extract_content(&node, &contents("src", "ignored")), "");
    }

    #[test]
    fn test_file_content_truncated() {
        let text = "x".repeat(MAX_FILE_CONTENT_CHARS + 50);
        let node = GraphNode::file("big.py");
        let out = extract_content(&node, &contents("big.py", &text));
        assert!(out.ends_with(TRUNCATION_MARKER));
        assert_eq!(out.chars().count(), MAX_FILE_CONTENT_CHARS + TRUNCATION_MARKER.chars().count());
    }

    #[test]
    fn test_file_binary_placeholder() {
        let node = GraphNode::file("logo.png");
        let out = extract_content(&node, &contents("logo.png", &"\u{0}\u{1}\u{2}".repeat(100)));
        assert_eq!(out, BINARY_PLACEHOLDER);
    }

    #[test]
    fn test_missing_file_yields_empty() {
        let node = GraphNode::file("nowhere.py");
        assert_eq!(extract_content(&node, &FileContents::new()), "");
    }

    #[test]
    fn test_symbol_snippet_has_context_padding() {
        let text = (0..10).map(|i| format!("line{i}")).collect::<Vec<_>>().join("\n");
        let node = GraphNode::symbol(NodeLabel::Function, "a.py", "f", 4, 5);
        let out = extract_content(&node, &contents("a.py", &text));
        assert_eq!(out, "line2\nline3\nline4\nline5\nline6\nline7");
    }

    #[test]
    fn test_symbol_snippet_clamped_to_bounds() {
        let node = GraphNode::symbol(NodeLabel::Function, "a.py", "f", 0, 1);
        let out = extract_content(&node, &contents("a.py", "def f():\n pass\n"));
        assert_eq!(out, "def f():\n pass\n");

        let past_end = GraphNode::symbol(NodeLabel::Method, "a.py", "g", 40, 50);
        assert_eq!(extract_content(&past_end, &contents("a.py", "one\ntwo")), "");
    }

    #[test]
    fn test_symbol_without_lines_is_empty() {
        let mut node = GraphNode::symbol(NodeLabel::Class, "a.py", "C", 0, 3);
        node.properties.end_line = None;
        assert_eq!(extract_content(&node, &contents("a.py", "class C:\n  pass")), "");
    }

    #[test]
    fn test_symbol_snippet_truncated() {
        let text = (0..400).map(|_| "y".repeat(40)).collect::<Vec<_>>().join("\n");
        let node = GraphNode::symbol(NodeLabel::Function, "long.py", "huge", 0, 399);
        let out = extract_content(&node, &contents("long.py", &text));
        assert!(out.ends_with(TRUNCATION_MARKER));
        assert!(out.chars().count() <= MAX_SNIPPET_CHARS + TRUNCATION_MARKER.chars().count());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "é".repeat(20);
        let out = truncate_content(&text, 5);
        assert_eq!(out, format!("{}{}", "é".repeat(5), TRUNCATION_MARKER));
        assert_eq!(truncate_content("short", 5), "short");
    }
}
