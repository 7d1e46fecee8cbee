use super::highlight::{background_hex, highlight_html_lines};
use super::view::{Block, ConversationView, Inline, MessageView};
use crate::domains::message::Role;

/// Protocols a link may use; anything else is dropped from the href.
const SAFE_PROTOCOLS: &[&str] = &["http", "https", "mailto", "irc", "ircs", "xmpp"];

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    // Writing into a String cannot fail.
    let _ = pulldown_cmark_escape::escape_html(&mut out, text);
    out
}

fn escape_href(href: &str) -> String {
    let mut out = String::with_capacity(href.len());
    let _ = pulldown_cmark_escape::escape_href(&mut out, href);
    out
}

/// Relative links and the safe protocols pass; `javascript:`, `data:` and
/// the like become an empty href.
pub fn sanitize_href(href: &str) -> &str {
    let Some(colon) = href.find(':') else {
        return href;
    };
    let scheme = &href[..colon];
    if scheme.contains(['/', '?', '#']) {
        return href;
    }
    if SAFE_PROTOCOLS
        .iter()
        .any(|safe| scheme.eq_ignore_ascii_case(safe))
    {
        href
    } else {
        ""
    }
}

pub fn conversation_html(view: &ConversationView) -> String {
    let mut out = String::from("<div class=\"conversation\">");
    for message in &view.messages {
        out.push_str(&message_html(message));
    }
    if view.typing {
        out.push_str(
            "<div class=\"message assistant typing\"><span class=\"dot\"></span><span class=\"dot\"></span><span class=\"dot\"></span></div>",
        );
    }
    out.push_str("<div class=\"scroll-anchor\" data-scroll=\"bottom\"></div></div>");
    out
}

pub fn message_html(message: &MessageView) -> String {
    let role = match message.role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
    };
    format!(
        "<div class=\"message {role}\" data-id=\"{}\"><div class=\"content\">{}</div><time>{}</time></div>",
        message.id,
        blocks_html(&message.blocks),
        escape_html(&message.time_label)
    )
}

pub fn blocks_html(blocks: &[Block]) -> String {
    blocks.iter().map(block_html).collect()
}

fn block_html(block: &Block) -> String {
    match block {
        Block::Paragraph(inlines) => format!("<p>{}</p>", inlines_html(inlines)),
        Block::Heading { level, content } => {
            format!("<h{level}>{}</h{level}>", inlines_html(content))
        }
        Block::List {
            ordered,
            start,
            items,
        } => list_html(*ordered, *start, items),
        Block::Quote(blocks) => format!("<blockquote>{}</blockquote>", blocks_html(blocks)),
        Block::Code { language, code } => code_html(language, code),
        Block::Table { header, rows } => table_html(header, rows),
        Block::Rule => "<hr />".to_string(),
        Block::Plain(text) => format!(
            "<p class=\"plain\" style=\"white-space: pre-wrap\">{}</p>",
            escape_html(text)
        ),
    }
}

fn list_html(ordered: bool, start: u64, items: &[Vec<Block>]) -> String {
    let body: String = items
        .iter()
        .map(|item| format!("<li>{}</li>", blocks_html(item)))
        .collect();
    match (ordered, start) {
        (true, 1) => format!("<ol>{body}</ol>"),
        (true, start) => format!("<ol start=\"{start}\">{body}</ol>"),
        (false, _) => format!("<ul>{body}</ul>"),
    }
}

fn code_html(language: &str, code: &str) -> String {
    let language = if language.is_empty() { "text" } else { language };
    let lines: String = highlight_html_lines(code, language)
        .into_iter()
        .enumerate()
        .map(|(index, line)| {
            format!(
                "<span class=\"line\"><span class=\"line-number\">{}</span>{line}</span>\n",
                index + 1
            )
        })
        .collect();
    format!(
        "<pre class=\"code-block\" data-language=\"{}\" style=\"background: {}\"><code>{lines}</code></pre>",
        escape_html(language),
        background_hex()
    )
}

fn table_html(header: &[Vec<Inline>], rows: &[Vec<Vec<Inline>>]) -> String {
    let head: String = header
        .iter()
        .map(|cell| format!("<th>{}</th>", inlines_html(cell)))
        .collect();
    let body: String = rows
        .iter()
        .map(|row| {
            let cells: String = row
                .iter()
                .map(|cell| format!("<td>{}</td>", inlines_html(cell)))
                .collect();
            format!("<tr>{cells}</tr>")
        })
        .collect();
    format!("<table><thead><tr>{head}</tr></thead><tbody>{body}</tbody></table>")
}

pub fn inlines_html(inlines: &[Inline]) -> String {
    inlines.iter().map(inline_html).collect()
}

fn inline_html(inline: &Inline) -> String {
    match inline {
        Inline::Text(text) => escape_html(text),
        Inline::Code(code) => format!("<code class=\"inline-code\">{}</code>", escape_html(code)),
        Inline::Emphasis(content) => format!("<em>{}</em>", inlines_html(content)),
        Inline::Strong(content) => format!("<strong>{}</strong>", inlines_html(content)),
        Inline::Strikethrough(content) => format!("<del>{}</del>", inlines_html(content)),
        Inline::Link {
            href,
            title,
            content,
        } => {
            let title = if title.is_empty() {
                String::new()
            } else {
                format!(" title=\"{}\"", escape_html(title))
            };
            format!(
                "<a href=\"{}\"{title} target=\"_blank\" rel=\"noopener noreferrer\">{}</a>",
                escape_href(sanitize_href(href)),
                inlines_html(content)
            )
        }
        Inline::SoftBreak => "\n".to_string(),
        Inline::HardBreak => "<br />".to_string(),
    }
}
