use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

use crate::domains::message::{Message, Role};
use crate::normalizer::normalize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Text(String),
    Code(String),
    Emphasis(Vec<Inline>),
    Strong(Vec<Inline>),
    Strikethrough(Vec<Inline>),
    Link {
        href: String,
        title: String,
        content: Vec<Inline>,
    },
    SoftBreak,
    HardBreak,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Paragraph(Vec<Inline>),
    /// Level is clamped to 1..=3.
    Heading {
        level: u8,
        content: Vec<Inline>,
    },
    List {
        ordered: bool,
        start: u64,
        items: Vec<Vec<Block>>,
    },
    Quote(Vec<Block>),
    Code {
        language: String,
        code: String,
    },
    Table {
        header: Vec<Vec<Inline>>,
        rows: Vec<Vec<Vec<Inline>>>,
    },
    Rule,
    /// Verbatim text shown with whitespace preserved (user input).
    Plain(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageView {
    pub id: u64,
    pub role: Role,
    pub time_label: String,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollAnchor {
    Bottom,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationView {
    pub messages: Vec<MessageView>,
    /// Loading and nothing has arrived yet for the current turn.
    pub typing: bool,
    pub scroll: ScrollAnchor,
}

impl ConversationView {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && !self.typing
    }
}

pub fn parse_markdown(markdown: &str) -> Vec<Block> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let mut builder = ViewBuilder::new();
    for event in Parser::new_ext(markdown, options) {
        builder.push(event);
    }
    builder.finish()
}

pub fn render_message(message: &Message) -> MessageView {
    let blocks = match message.role {
        Role::Assistant => parse_markdown(&normalize(&message.content)),
        Role::User | Role::System => {
            if message.content.is_empty() {
                Vec::new()
            } else {
                vec![Block::Plain(message.content.clone())]
            }
        }
    };
    MessageView {
        id: message.id,
        role: message.role,
        time_label: time_label(message.created_at),
        blocks,
    }
}

/// Builds the transcript view from an immutable snapshot. Non-visible roles
/// are dropped here as well as in the session.
pub fn render_conversation(messages: &[Message], loading: bool) -> ConversationView {
    let visible: Vec<&Message> = messages.iter().filter(|m| m.role.is_visible()).collect();
    let answered = visible
        .last()
        .map(|last| last.role == Role::Assistant && !last.content.is_empty())
        .unwrap_or(false);
    ConversationView {
        messages: visible.into_iter().map(render_message).collect(),
        typing: loading && !answered,
        scroll: ScrollAnchor::Bottom,
    }
}

pub fn time_label(unix_ts: i64) -> String {
    let format = format_description!("[hour]:[minute]");
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetDateTime::from_unix_timestamp(unix_ts)
        .map(|dt| dt.to_offset(offset))
        .ok()
        .and_then(|dt| dt.format(&format).ok())
        .unwrap_or_default()
}

enum Container {
    Root(Vec<Block>),
    Quote(Vec<Block>),
    List {
        ordered: bool,
        start: u64,
        items: Vec<Vec<Block>>,
    },
    Item(Vec<Block>),
    Table {
        header: Vec<Vec<Inline>>,
        rows: Vec<Vec<Vec<Inline>>>,
        row: Vec<Vec<Inline>>,
    },
}

enum Span {
    /// Text directly inside a tight list item.
    Loose,
    Paragraph,
    Heading(u8),
    Cell,
    Emphasis,
    Strong,
    Strikethrough,
    Link { href: String, title: String },
}

struct ViewBuilder {
    containers: Vec<Container>,
    spans: Vec<(Span, Vec<Inline>)>,
    code: Option<(String, String)>,
}

impl ViewBuilder {
    fn new() -> Self {
        Self {
            containers: vec![Container::Root(Vec::new())],
            spans: Vec::new(),
            code: None,
        }
    }

    fn push(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => {
                if let Some((_, code)) = self.code.as_mut() {
                    code.push_str(&text);
                } else {
                    self.push_text(&text);
                }
            }
            Event::Code(code) => self.push_inline(Inline::Code(code.to_string())),
            Event::Html(html) | Event::InlineHtml(html) => self.push_text(&html),
            Event::SoftBreak => self.push_inline(Inline::SoftBreak),
            Event::HardBreak => self.push_inline(Inline::HardBreak),
            Event::Rule => {
                self.close_loose();
                self.push_block(Block::Rule);
            }
            Event::TaskListMarker(done) => self.push_text(if done { "[x] " } else { "[ ] " }),
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => {
                self.close_loose();
                self.spans.push((Span::Paragraph, Vec::new()));
            }
            Tag::Heading { level, .. } => {
                self.close_loose();
                let level = (level as u8).clamp(1, 3);
                self.spans.push((Span::Heading(level), Vec::new()));
            }
            Tag::BlockQuote(_) => {
                self.close_loose();
                self.containers.push(Container::Quote(Vec::new()));
            }
            Tag::CodeBlock(kind) => {
                self.close_loose();
                let language = match kind {
                    CodeBlockKind::Fenced(info) => info
                        .split_whitespace()
                        .next()
                        .unwrap_or_default()
                        .to_string(),
                    CodeBlockKind::Indented => String::new(),
                };
                self.code = Some((language, String::new()));
            }
            Tag::List(start) => {
                self.close_loose();
                self.containers.push(Container::List {
                    ordered: start.is_some(),
                    start: start.unwrap_or(1),
                    items: Vec::new(),
                });
            }
            Tag::Item => self.containers.push(Container::Item(Vec::new())),
            Tag::Table(_) => {
                self.close_loose();
                self.containers.push(Container::Table {
                    header: Vec::new(),
                    rows: Vec::new(),
                    row: Vec::new(),
                });
            }
            Tag::TableCell => self.spans.push((Span::Cell, Vec::new())),
            Tag::Emphasis => self.open_span(Span::Emphasis),
            Tag::Strong => self.open_span(Span::Strong),
            Tag::Strikethrough => self.open_span(Span::Strikethrough),
            Tag::Link {
                dest_url, title, ..
            }
            | Tag::Image {
                dest_url, title, ..
            } => self.open_span(Span::Link {
                href: dest_url.to_string(),
                title: title.to_string(),
            }),
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                if let Some((_, inlines)) = self.spans.pop() {
                    self.push_block(Block::Paragraph(inlines));
                }
            }
            TagEnd::Heading(_) => {
                if let Some((span, content)) = self.spans.pop() {
                    let level = match span {
                        Span::Heading(level) => level,
                        _ => 3,
                    };
                    self.push_block(Block::Heading { level, content });
                }
            }
            TagEnd::CodeBlock => {
                if let Some((language, code)) = self.code.take() {
                    self.push_block(Block::Code { language, code });
                }
            }
            TagEnd::BlockQuote(_) => {
                self.close_loose();
                if let Some(Container::Quote(blocks)) = self.containers.pop() {
                    self.push_block(Block::Quote(blocks));
                }
            }
            TagEnd::List(_) => {
                if let Some(Container::List {
                    ordered,
                    start,
                    items,
                }) = self.containers.pop()
                {
                    self.push_block(Block::List {
                        ordered,
                        start,
                        items,
                    });
                }
            }
            TagEnd::Item => {
                self.close_loose();
                if let Some(Container::Item(blocks)) = self.containers.pop() {
                    if let Some(Container::List { items, .. }) = self.containers.last_mut() {
                        items.push(blocks);
                    }
                }
            }
            TagEnd::TableCell => {
                if let Some((_, inlines)) = self.spans.pop() {
                    if let Some(Container::Table { row, .. }) = self.containers.last_mut() {
                        row.push(inlines);
                    }
                }
            }
            TagEnd::TableHead => {
                if let Some(Container::Table { header, row, .. }) = self.containers.last_mut() {
                    *header = std::mem::take(row);
                }
            }
            TagEnd::TableRow => {
                if let Some(Container::Table { rows, row, .. }) = self.containers.last_mut() {
                    rows.push(std::mem::take(row));
                }
            }
            TagEnd::Table => {
                if let Some(Container::Table { header, rows, .. }) = self.containers.pop() {
                    self.push_block(Block::Table { header, rows });
                }
            }
            TagEnd::Emphasis
            | TagEnd::Strong
            | TagEnd::Strikethrough
            | TagEnd::Link
            | TagEnd::Image => self.close_span(),
            _ => {}
        }
    }

    fn open_span(&mut self, span: Span) {
        if self.spans.is_empty() {
            self.spans.push((Span::Loose, Vec::new()));
        }
        self.spans.push((span, Vec::new()));
    }

    fn close_span(&mut self) {
        let Some((span, content)) = self.spans.pop() else {
            return;
        };
        let inline = match span {
            Span::Emphasis => Inline::Emphasis(content),
            Span::Strong => Inline::Strong(content),
            Span::Strikethrough => Inline::Strikethrough(content),
            Span::Link { href, title } => Inline::Link {
                href,
                title,
                content,
            },
            Span::Loose | Span::Paragraph | Span::Heading(_) | Span::Cell => {
                self.spans.push((span, content));
                return;
            }
        };
        self.push_inline(inline);
    }

    fn push_text(&mut self, text: &str) {
        if let Some((_, inlines)) = self.spans.last_mut() {
            if let Some(Inline::Text(last)) = inlines.last_mut() {
                last.push_str(text);
                return;
            }
        }
        self.push_inline(Inline::Text(text.to_string()));
    }

    fn push_inline(&mut self, inline: Inline) {
        if self.spans.is_empty() {
            self.spans.push((Span::Loose, Vec::new()));
        }
        if let Some((_, inlines)) = self.spans.last_mut() {
            inlines.push(inline);
        }
    }

    /// Tight list items carry inline content without a paragraph; close it
    /// into one before a sibling block starts.
    fn close_loose(&mut self) {
        if !matches!(self.spans.first(), Some((Span::Loose, _))) {
            return;
        }
        while self.spans.len() > 1 {
            if self.top_is_inline_span() {
                self.close_span();
            } else if let Some((_, content)) = self.spans.pop() {
                if let Some((_, parent)) = self.spans.last_mut() {
                    parent.extend(content);
                }
            }
        }
        if let Some((_, inlines)) = self.spans.pop() {
            if !inlines.is_empty() {
                self.push_block(Block::Paragraph(inlines));
            }
        }
    }

    fn top_is_inline_span(&self) -> bool {
        matches!(
            self.spans.last(),
            Some((
                Span::Emphasis | Span::Strong | Span::Strikethrough | Span::Link { .. },
                _
            ))
        )
    }

    fn push_block(&mut self, block: Block) {
        match self.containers.last_mut() {
            Some(Container::Root(blocks))
            | Some(Container::Quote(blocks))
            | Some(Container::Item(blocks)) => blocks.push(block),
            Some(Container::List { items, .. }) => items.push(vec![block]),
            Some(Container::Table { .. }) | None => {}
        }
    }

    fn finish(mut self) -> Vec<Block> {
        self.close_loose();
        if let Some((language, code)) = self.code.take() {
            self.push_block(Block::Code { language, code });
        }
        while self.containers.len() > 1 {
            match self.containers.pop() {
                Some(Container::Quote(blocks)) => self.push_block(Block::Quote(blocks)),
                Some(Container::Item(blocks)) => {
                    if let Some(Container::List { items, .. }) = self.containers.last_mut() {
                        items.push(blocks);
                    }
                }
                Some(Container::List {
                    ordered,
                    start,
                    items,
                }) => self.push_block(Block::List {
                    ordered,
                    start,
                    items,
                }),
                Some(Container::Table { header, rows, .. }) => {
                    self.push_block(Block::Table { header, rows })
                }
                Some(Container::Root(_)) | None => break,
            }
        }
        match self.containers.pop() {
            Some(Container::Root(blocks)) => blocks,
            _ => Vec::new(),
        }
    }
}
