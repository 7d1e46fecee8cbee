use once_cell::sync::Lazy;
use syntect::easy::HighlightLines;
use syntect::highlighting::{Color, Style, Theme, ThemeSet};
use syntect::html::{styled_line_to_highlighted_html, IncludeBackground};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::{as_24_bit_terminal_escaped, LinesWithEndings};

/// Code blocks always use this theme, whatever the surrounding surface does.
pub const CODE_THEME: &str = "base16-ocean.dark";

static SYNTAX_SET: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);
static THEMES: Lazy<ThemeSet> = Lazy::new(ThemeSet::load_defaults);
static FALLBACK_THEME: Lazy<Theme> = Lazy::new(Theme::default);

fn theme() -> &'static Theme {
    THEMES
        .themes
        .get(CODE_THEME)
        .or_else(|| THEMES.themes.values().next())
        .unwrap_or(&FALLBACK_THEME)
}

fn syntax_for(language: &str) -> &'static SyntaxReference {
    let token = language.trim();
    if token.is_empty() {
        return SYNTAX_SET.find_syntax_plain_text();
    }
    SYNTAX_SET
        .find_syntax_by_token(token)
        .unwrap_or_else(|| SYNTAX_SET.find_syntax_plain_text())
}

/// Name of the grammar that will be used, e.g. `Python` or `Plain Text`.
pub fn resolved_syntax_name(language: &str) -> &'static str {
    &syntax_for(language).name
}

pub fn background_hex() -> String {
    let color = theme().settings.background.unwrap_or(Color {
        r: 0x2b,
        g: 0x30,
        b: 0x3b,
        a: 0xff,
    });
    format!("#{:02x}{:02x}{:02x}", color.r, color.g, color.b)
}

fn highlight_lines<F>(code: &str, language: &str, mut emit: F)
where
    F: FnMut(&str, &[(Style, &str)]),
{
    let mut highlighter = HighlightLines::new(syntax_for(language), theme());
    for line in LinesWithEndings::from(code) {
        let ranges = highlighter
            .highlight_line(line, &SYNTAX_SET)
            .unwrap_or_default();
        emit(line, &ranges);
    }
}

/// One highlighted HTML fragment per source line, trailing newline removed.
pub fn highlight_html_lines(code: &str, language: &str) -> Vec<String> {
    let mut out = Vec::new();
    highlight_lines(code, language, |line, ranges| {
        let html = if ranges.is_empty() {
            super::html::escape_html(line)
        } else {
            styled_line_to_highlighted_html(ranges, IncludeBackground::No)
                .unwrap_or_else(|_| super::html::escape_html(line))
        };
        out.push(html.trim_end_matches(['\n', '\r']).to_string());
    });
    out
}

/// One 24-bit ANSI colored string per source line, trailing newline removed.
pub fn highlight_terminal_lines(code: &str, language: &str) -> Vec<String> {
    let mut out = Vec::new();
    highlight_lines(code, language, |line, ranges| {
        let escaped = if ranges.is_empty() {
            line.to_string()
        } else {
            as_24_bit_terminal_escaped(ranges, false)
        };
        out.push(escaped.replace(['\n', '\r'], ""));
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_tags_resolve_to_grammars() {
        assert_eq!(resolved_syntax_name("python"), "Python");
        assert_eq!(resolved_syntax_name("text"), "Plain Text");
        assert_eq!(resolved_syntax_name(""), "Plain Text");
        assert_eq!(resolved_syntax_name("no-such-language"), "Plain Text");
    }

    #[test]
    fn one_output_line_per_source_line() {
        let code = "def f():\n    return 1\n";
        assert_eq!(highlight_html_lines(code, "python").len(), 2);
        assert_eq!(highlight_terminal_lines(code, "python").len(), 2);
        assert!(highlight_html_lines(code, "python")[0].contains("def"));
    }

    #[test]
    fn background_is_a_dark_hex_color() {
        let hex = background_hex();
        assert!(hex.starts_with('#'));
        assert_eq!(hex.len(), 7);
    }
}
