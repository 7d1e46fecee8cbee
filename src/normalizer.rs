//! Turns raw assistant text into markdown the renderer can structure.
//!
//! The hosted agent frequently answers with escaped newlines and unfenced
//! code. This pass restores line breaks, keeps lists and existing fences as
//! they are, and wraps paragraphs that look like source code in a fenced
//! block with a guessed language. The code detector is a keyword heuristic;
//! misclassifying prose or plain code is expected now and then.

use once_cell::sync::Lazy;
use regex::Regex;

const FENCE: &str = "```";
const DEFAULT_LANGUAGE: &str = "text";

static CODE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?m)^(import|from|def|class|function|const|let|var|if|for|while)",
        r"(?m)^[ ]*[a-zA-Z_][a-zA-Z0-9_]*\s*[=:]",
        r"(?m)^[ ]*[{}\[\]()]",
        r"(?m)^\s*//|^\s*#|^\s*/\*",
        r"(?m);\s*$",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect()
});

/// Substrings that hint at a language, checked in order.
const LANGUAGE_HINTS: &[(&str, &[&str])] = &[
    ("python", &["import ", "def ", "print("]),
    ("javascript", &["function ", "const ", "console.log"]),
    ("c", &["#include", "int main"]),
    ("java", &["public class", "System.out"]),
];

pub fn normalize(raw: &str) -> String {
    let text = unescape_newlines(raw);
    split_paragraphs(&text)
        .into_iter()
        .map(normalize_paragraph)
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn unescape_newlines(raw: &str) -> String {
    raw.replace("\\n\\n", "\n\n").replace("\\n", "\n")
}

/// Splits on blank lines. A fenced block always forms its own paragraph, so
/// prose around it is never mistaken for part of the code, and blank lines
/// inside it do not split. An unterminated fence (common mid-stream)
/// swallows the rest of the text.
fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut in_fence = false;

    for line in text.lines() {
        if line.trim_start().starts_with(FENCE) {
            if in_fence {
                current.push(line);
                push_paragraph(&mut paragraphs, &current);
                current.clear();
            } else {
                push_paragraph(&mut paragraphs, &current);
                current.clear();
                current.push(line);
            }
            in_fence = !in_fence;
        } else if !in_fence && line.trim().is_empty() {
            push_paragraph(&mut paragraphs, &current);
            current.clear();
        } else {
            current.push(line);
        }
    }
    push_paragraph(&mut paragraphs, &current);
    paragraphs
}

fn push_paragraph(paragraphs: &mut Vec<String>, lines: &[&str]) {
    let paragraph = lines.join("\n");
    let trimmed = paragraph.trim();
    if !trimmed.is_empty() {
        paragraphs.push(trimmed.to_string());
    }
}

fn normalize_paragraph(paragraph: String) -> String {
    if paragraph.starts_with(FENCE) || is_list(&paragraph) || !looks_like_code(&paragraph) {
        return paragraph;
    }
    let language = detect_language(&paragraph);
    format!("{FENCE}{language}\n{paragraph}\n{FENCE}")
}

fn is_list(paragraph: &str) -> bool {
    paragraph.starts_with("- ")
        || paragraph.starts_with("* ")
        || paragraph.contains("\n- ")
        || paragraph.contains("\n* ")
}

pub fn looks_like_code(paragraph: &str) -> bool {
    paragraph.lines().count() > 2 && CODE_PATTERNS.iter().any(|re| re.is_match(paragraph))
}

pub fn detect_language(code: &str) -> &'static str {
    LANGUAGE_HINTS
        .iter()
        .find(|(_, hints)| hints.iter().any(|hint| code.contains(hint)))
        .map(|(language, _)| *language)
        .unwrap_or(DEFAULT_LANGUAGE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("  \n\n  "), "");
    }

    #[test]
    fn escaped_newlines_become_paragraphs() {
        let out = normalize("Hello there!\\n\\nSecond paragraph.\\nSame paragraph.");
        assert_eq!(out, "Hello there!\n\nSecond paragraph.\nSame paragraph.");
    }

    #[test]
    fn single_sentence_is_never_fenced() {
        let out = normalize("let me explain; it is simple;");
        assert!(!out.contains(FENCE));
    }

    #[test]
    fn braces_and_semicolons_become_a_fence() {
        let raw = "int main() {\n  int x = 1;\n  return x;\n}";
        let out = normalize(raw);
        assert_eq!(out, format!("```c\n{raw}\n```"));
    }

    #[test]
    fn language_hints_follow_lookup_order() {
        assert_eq!(detect_language("import os\nprint(os)"), "python");
        assert_eq!(detect_language("const x = 1;\nconsole.log(x);"), "javascript");
        assert_eq!(detect_language("#include <stdio.h>"), "c");
        assert_eq!(
            detect_language("public class A {}\nSystem.out.println(1);"),
            "java"
        );
        assert_eq!(detect_language("x := 1"), "text");
    }

    #[test]
    fn lists_pass_through() {
        let raw = "Steps:\n- first = 1;\n- second = 2;\n- third = 3;";
        assert_eq!(normalize(raw), raw);
    }

    #[test]
    fn prose_paragraphs_pass_through() {
        let raw = "This is prose.\nIt spans lines.\nNothing here is code.";
        assert_eq!(normalize(raw), raw);
    }

    #[test]
    fn existing_fences_survive_blank_lines() {
        let raw = "```rust\nfn a() {}\n\nfn b() {}\n```";
        assert_eq!(normalize(raw), raw);
    }

    #[test]
    fn prose_touching_a_fence_stays_outside_it() {
        let raw = "Here is the fix:\n```python\na = 1\n\nb = 2\n```\nThat is all.";
        assert_eq!(
            normalize(raw),
            "Here is the fix:\n\n```python\na = 1\n\nb = 2\n```\n\nThat is all."
        );
    }

    #[test]
    fn normalize_is_idempotent() {
        let samples = [
            "Here is code:\n\ndef add(a, b):\n    return a + b\nprint(add(1, 2))\n\nDone.",
            "- one\n- two\n\n\n\nTail text",
            "function f() {\n  return 1;\n}\n\nconst y = f();\nconsole.log(y);\nlet z = y;",
            "```js\nunterminated = 1;\n\nstill code",
            "# Title\nline one\nline two",
            "Here is the fix:\n```python\na = 1\n\nb = 2\n```",
            "x = 1;\ny = 2;\nz = 3;\n```\ninside\n```\nw = 4;\nv = 5;\nu = 6;",
            "intro\n```\n\n```\n```rust\nfn main() {}\n\n",
        ];
        for sample in samples {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "sample: {sample:?}");
        }
    }
}
