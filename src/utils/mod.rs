use crate::models::{ContentNode, InlineSpan};
use base64::{Engine, engine::general_purpose::STANDARD};

/// `data:<mime>;base64,<payload>` URL for an inline image part.
pub fn to_data_url(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes))
}

/// Markup projection of rendered nodes. All text is escaped; only the tags
/// produced here reach the page.
pub fn render_html(nodes: &[ContentNode]) -> String {
    let mut html = String::new();

    for node in nodes {
        let inner = render_spans(node.spans());
        match node {
            ContentNode::Heading { level, .. } => {
                html.push_str(&format!("<h{level}>{inner}</h{level}>"));
            }
            ContentNode::ListItem { ordered, .. } => {
                let class = if *ordered { " class=\"ordered\"" } else { "" };
                html.push_str(&format!("<li{class}>{inner}</li>"));
            }
            ContentNode::Paragraph { .. } => html.push_str(&format!("<p>{inner}</p>")),
            ContentNode::LineBreak => html.push_str("<br />"),
        }
        html.push('\n');
    }

    html
}

fn render_spans(spans: &[InlineSpan]) -> String {
    spans
        .iter()
        .map(|span| {
            let text = html_escape::encode_text(span.text());
            match span {
                InlineSpan::Plain(_) => text.into_owned(),
                InlineSpan::Bold(_) => format!("<strong>{text}</strong>"),
            }
        })
        .collect()
}
