use crate::models::{ContentNode, InlineSpan};
use once_cell::sync::Lazy;
use regex::Regex;

/// Decimal digits, a literal dot, and at most one following space.
static ORDERED_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]+\. ?").unwrap());

/// Shortest non-empty run between a `**` opener and the next `**`.
static BOLD_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*").unwrap());

/// Converts the explanation dialect into display nodes, one node per line.
///
/// Total and side-effect free: every input yields some node sequence, and the
/// empty string yields none.
pub fn render(text: &str) -> Vec<ContentNode> {
    if text.is_empty() {
        return Vec::new();
    }

    text.split('\n').map(classify_line).collect()
}

fn classify_line(line: &str) -> ContentNode {
    // Longer heading markers first so "### x" is never read as "# " + "## x"
    if let Some(rest) = line.strip_prefix("### ") {
        return heading(3, rest);
    }
    if let Some(rest) = line.strip_prefix("## ") {
        return heading(2, rest);
    }
    if let Some(rest) = line.strip_prefix("# ") {
        return heading(1, rest);
    }
    if let Some(rest) = line.strip_prefix("- ") {
        return ContentNode::ListItem {
            ordered: false,
            text: extract_spans(rest),
        };
    }
    if let Some(marker) = ORDERED_ITEM.find(line) {
        return ContentNode::ListItem {
            ordered: true,
            text: extract_spans(&line[marker.end()..]),
        };
    }
    if line.trim().is_empty() {
        return ContentNode::LineBreak;
    }

    ContentNode::Paragraph {
        text: extract_spans(line),
    }
}

fn heading(level: u8, rest: &str) -> ContentNode {
    ContentNode::Heading {
        level,
        text: extract_spans(rest),
    }
}

/// Splits a line into plain and bold runs. An unterminated `**` stays in the
/// surrounding plain text.
pub fn extract_spans(text: &str) -> Vec<InlineSpan> {
    let mut spans = Vec::new();
    let mut last_end = 0;

    for captures in BOLD_RUN.captures_iter(text) {
        let (Some(whole), Some(inner)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        if whole.start() > last_end {
            spans.push(InlineSpan::Plain(text[last_end..whole.start()].to_string()));
        }
        spans.push(InlineSpan::Bold(inner.as_str().to_string()));
        last_end = whole.end();
    }

    if last_end < text.len() {
        spans.push(InlineSpan::Plain(text[last_end..].to_string()));
    }

    spans
}
