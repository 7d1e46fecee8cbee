use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{self, Write};

use super::highlight::highlight_terminal_lines;
use super::view::{Block, ConversationView, Inline, MessageView};
use crate::domains::message::Role;

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const BOLD_OFF: &str = "\x1b[22m";
const DIM: &str = "\x1b[2m";
const ITALIC: &str = "\x1b[3m";
const ITALIC_OFF: &str = "\x1b[23m";
const UNDERLINE: &str = "\x1b[4m";
const UNDERLINE_OFF: &str = "\x1b[24m";
const STRIKE: &str = "\x1b[9m";
const STRIKE_OFF: &str = "\x1b[29m";
const FG_OFF: &str = "\x1b[39m";
const INLINE_CODE: &str = "\x1b[38;2;230;110;110m";
const LINK: &str = "\x1b[38;2;96;165;250m";
const QUOTE_BAR: &str = "\x1b[38;2;59;130;246m";
const HEADING_COLORS: [&str; 3] = [
    "\x1b[38;2;255;255;255m",
    "\x1b[38;2;229;231;235m",
    "\x1b[38;2;209;213;219m",
];

static ANSI_ESCAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").unwrap());

pub fn visible_width(line: &str) -> usize {
    ANSI_ESCAPE.replace_all(line, "").chars().count()
}

pub fn typing_lines() -> Vec<String> {
    vec![format!("{DIM}assistant is typing ● ● ●{RESET}")]
}

pub fn message_lines(message: &MessageView) -> Vec<String> {
    let who = match message.role {
        Role::User => "you",
        Role::Assistant => "assistant",
        Role::System => "system",
    };
    let mut lines = vec![format!("{DIM}{who} · {}{RESET}", message.time_label)];
    lines.extend(blocks_lines(&message.blocks));
    lines
}

pub fn conversation_lines(view: &ConversationView) -> Vec<String> {
    let mut lines = Vec::new();
    for message in &view.messages {
        lines.extend(message_lines(message));
        lines.push(String::new());
    }
    if view.typing {
        lines.extend(typing_lines());
    }
    lines
}

pub fn blocks_lines(blocks: &[Block]) -> Vec<String> {
    let mut lines = Vec::new();
    for (index, block) in blocks.iter().enumerate() {
        if index > 0 {
            lines.push(String::new());
        }
        lines.extend(block_lines(block));
    }
    lines
}

fn block_lines(block: &Block) -> Vec<String> {
    match block {
        Block::Paragraph(inlines) => split_lines(&inlines_text(inlines)),
        Block::Heading { level, content } => {
            let color = HEADING_COLORS[usize::from(level.saturating_sub(1)).min(2)];
            let underline = if *level == 1 { UNDERLINE } else { "" };
            split_lines(&inlines_text(content))
                .into_iter()
                .map(|line| format!("{BOLD}{underline}{color}{line}{RESET}"))
                .collect()
        }
        Block::List {
            ordered,
            start,
            items,
        } => list_lines(*ordered, *start, items),
        Block::Quote(blocks) => blocks_lines(blocks)
            .into_iter()
            .map(|line| format!("{QUOTE_BAR}│{FG_OFF} {ITALIC}{line}{ITALIC_OFF}"))
            .collect(),
        Block::Code { language, code } => code_lines(language, code),
        Block::Table { header, rows } => table_lines(header, rows),
        Block::Rule => vec![format!("{DIM}{}{RESET}", "─".repeat(40))],
        Block::Plain(text) => split_lines(text),
    }
}

fn split_lines(text: &str) -> Vec<String> {
    text.split('\n').map(str::to_string).collect()
}

fn list_lines(ordered: bool, start: u64, items: &[Vec<Block>]) -> Vec<String> {
    let mut lines = Vec::new();
    for (offset, item) in items.iter().enumerate() {
        let marker = if ordered {
            format!("{}. ", start + offset as u64)
        } else {
            "• ".to_string()
        };
        let indent = " ".repeat(marker.chars().count());
        for (index, line) in blocks_lines(item).into_iter().enumerate() {
            if index == 0 {
                lines.push(format!("{marker}{line}"));
            } else if line.is_empty() {
                lines.push(line);
            } else {
                lines.push(format!("{indent}{line}"));
            }
        }
    }
    lines
}

fn code_lines(language: &str, code: &str) -> Vec<String> {
    let label = if language.is_empty() { "text" } else { language };
    let mut lines = vec![format!("{DIM}┌─ {label}{RESET}")];
    for (index, line) in highlight_terminal_lines(code, label).into_iter().enumerate() {
        lines.push(format!("{DIM}│ {:>3}{RESET} {line}{RESET}", index + 1));
    }
    lines.push(format!("{DIM}└─{RESET}"));
    lines
}

fn table_lines(header: &[Vec<Inline>], rows: &[Vec<Vec<Inline>>]) -> Vec<String> {
    let separator = format!(" {DIM}│{RESET} ");
    let render_row = |cells: &[Vec<Inline>]| -> String {
        cells
            .iter()
            .map(|cell| inlines_text(cell).replace('\n', " "))
            .collect::<Vec<_>>()
            .join(&separator)
    };
    let mut lines = vec![format!("{BOLD}{}{BOLD_OFF}", render_row(header))];
    let width = visible_width(&lines[0]).max(3);
    lines.push(format!("{DIM}{}{RESET}", "─".repeat(width)));
    lines.extend(rows.iter().map(|row| render_row(row)));
    lines
}

pub fn inlines_text(inlines: &[Inline]) -> String {
    inlines.iter().map(inline_text).collect()
}

fn inline_text(inline: &Inline) -> String {
    match inline {
        Inline::Text(text) => text.clone(),
        Inline::Code(code) => format!("{INLINE_CODE}{code}{FG_OFF}"),
        Inline::Emphasis(content) => format!("{ITALIC}{}{ITALIC_OFF}", inlines_text(content)),
        Inline::Strong(content) => format!("{BOLD}{}{BOLD_OFF}", inlines_text(content)),
        Inline::Strikethrough(content) => {
            format!("{STRIKE}{}{STRIKE_OFF}", inlines_text(content))
        }
        Inline::Link { href, content, .. } => {
            let label = inlines_text(content);
            if visible_width(&label) == 0 || label == *href {
                format!("{LINK}{UNDERLINE}{href}{UNDERLINE_OFF}{FG_OFF}")
            } else {
                format!("{LINK}{UNDERLINE}{label}{UNDERLINE_OFF}{FG_OFF} {DIM}({href}){RESET}")
            }
        }
        Inline::SoftBreak => " ".to_string(),
        Inline::HardBreak => "\n".to_string(),
    }
}

/// Redraws a live region at the bottom of the terminal in place. Lines
/// written before the region are left alone; `commit` turns the current
/// region into scrollback.
pub struct TerminalSurface<W: Write> {
    out: W,
    width: usize,
    live_rows: usize,
}

impl<W: Write> TerminalSurface<W> {
    pub fn new(out: W, width: usize) -> Self {
        Self {
            out,
            width: width.max(1),
            live_rows: 0,
        }
    }

    pub fn redraw(&mut self, lines: &[String]) -> io::Result<()> {
        if self.live_rows > 0 {
            write!(self.out, "\x1b[{}F", self.live_rows)?;
        }
        write!(self.out, "\x1b[J")?;
        let mut rows = 0;
        for line in lines {
            writeln!(self.out, "{line}")?;
            rows += visible_width(line).max(1).div_ceil(self.width);
        }
        self.live_rows = rows;
        self.out.flush()
    }

    pub fn commit(&mut self) {
        self.live_rows = 0;
    }

    pub fn print_line(&mut self, line: &str) -> io::Result<()> {
        self.commit();
        writeln!(self.out, "{line}")?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

pub fn terminal_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|width| *width > 0)
        .unwrap_or(100)
}
