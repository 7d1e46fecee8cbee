//! Structured rendering of (possibly partial) chat text.
//!
//! `view` turns markdown into a closed set of block and inline kinds; `html`
//! and `terminal` map each kind to output with one function per kind. Every
//! entry point is a pure function of its input, so re-rendering the same
//! buffer yields the same output.

pub mod highlight;
pub mod html;
pub mod terminal;
pub mod view;

pub use view::{
    parse_markdown, render_conversation, render_message, Block, ConversationView, Inline,
    MessageView, ScrollAnchor,
};
