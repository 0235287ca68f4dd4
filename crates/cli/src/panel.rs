//! Bordered answer panel for the terminal.

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

pub const DEFAULT_WIDTH: usize = 80;

/// Draw `body` inside a rounded box `width` columns wide, titled `title`.
///
/// Widths are terminal columns, so wide characters (CJK, most emoji) take
/// two. Lines are word-wrapped; words longer than a line are split.
pub fn render_panel(title: &str, body: &str, width: usize) -> String {
    let width = width.max(20);
    let inner = width - 4;

    let mut title = title.replace('\n', " ");
    if title.width() > inner - 2 {
        title = truncate_to_width(&title, inner - 5) + "...";
    }
    let title = format!(" {title} ");
    let fill = width.saturating_sub(3 + title.width());

    let mut out = format!("╭─{title}{}╮\n", "─".repeat(fill));
    for line in wrap(body, inner) {
        let pad = inner.saturating_sub(line.width());
        out.push_str(&format!("│ {line}{} │\n", " ".repeat(pad)));
    }
    out.push_str(&format!("╰{}╯", "─".repeat(width - 2)));
    out
}

fn char_width(c: char) -> usize {
    c.width().unwrap_or(0)
}

fn truncate_to_width(text: &str, max: usize) -> String {
    let mut used = 0;
    text.chars()
        .take_while(|&c| {
            used += char_width(c);
            used <= max
        })
        .collect()
}

/// Split `word` into pieces no wider than `width` columns.
fn split_word(word: &str, width: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut used = 0;
    for (i, c) in word.char_indices() {
        let w = char_width(c);
        if used > 0 && used + w > width {
            pieces.push(&word[start..i]);
            start = i;
            used = 0;
        }
        used += w;
    }
    pieces.push(&word[start..]);
    pieces
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();

    for raw in text.lines() {
        let mut line = String::new();
        let mut line_len = 0;

        for word in raw.split_whitespace() {
            for piece in split_word(word, width) {
                let piece_len = piece.width();
                if line_len > 0 && line_len + 1 + piece_len > width {
                    lines.push(std::mem::take(&mut line));
                    line_len = 0;
                }
                if line_len > 0 {
                    line.push(' ');
                    line_len += 1;
                }
                line.push_str(piece);
                line_len += piece_len;
            }
        }
        lines.push(line);
    }

    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}
