//! Splits a finished answer into chunks a chat platform will accept.
//!
//! Chunks are exact slices of the input: joining them without separators gives the
//! original text back. Splits happen only after a paragraph break, a line break or a
//! sentence end, and never while a ``` fence is open. When no valid boundary exists
//! inside the length budget the chunk grows until the next one.

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum BoundaryKind {
    Sentence,
    Line,
    Paragraph,
}

#[derive(Clone, Copy, Debug)]
struct Boundary {
    byte_pos: usize,
    char_pos: usize,
    kind: BoundaryKind,
}

/// Lengths are measured in chars, not bytes.
pub fn segment(text: &str, max_length: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let max_length = max_length.max(1);
    let total_chars = text.chars().count();
    let boundaries = scan_boundaries(text);

    let mut chunks = Vec::new();
    let mut start_byte = 0;
    let mut start_char = 0;

    while total_chars - start_char > max_length {
        let limit = start_char + max_length;
        let Some(split) = choose_split(&boundaries, start_char, limit, max_length) else {
            break;
        };
        chunks.push(text[start_byte..split.byte_pos].to_owned());
        start_byte = split.byte_pos;
        start_char = split.char_pos;
    }

    if start_byte < text.len() {
        chunks.push(text[start_byte..].to_owned());
    }

    chunks
}

fn choose_split(
    boundaries: &[Boundary],
    start_char: usize,
    limit: usize,
    max_length: usize,
) -> Option<Boundary> {
    let in_window = || {
        boundaries.iter().filter(move |b| b.char_pos > start_char && b.char_pos <= limit)
    };

    // Stronger boundaries win, but only if they keep the chunk at least half full.
    let half = start_char + max_length / 2;
    in_window()
        .filter(|b| b.char_pos >= half)
        .max_by_key(|b| (b.kind, b.char_pos))
        .or_else(|| in_window().max_by_key(|b| b.char_pos))
        .or_else(|| boundaries.iter().find(|b| b.char_pos > limit))
        .copied()
}

fn scan_boundaries(text: &str) -> Vec<Boundary> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut boundaries = Vec::new();
    let mut in_fence = false;
    let mut at_line_start = true;

    for (index, &(byte_pos, ch)) in chars.iter().enumerate() {
        if at_line_start && is_fence_line(&text[byte_pos..]) {
            in_fence = !in_fence;
        }
        at_line_start = ch == '\n';

        if in_fence {
            continue;
        }

        match ch {
            '\n' => {
                let kind = if index > 0 && chars[index - 1].1 == '\n' {
                    BoundaryKind::Paragraph
                } else {
                    BoundaryKind::Line
                };
                boundaries.push(Boundary {
                    byte_pos: byte_pos + ch.len_utf8(),
                    char_pos: index + 1,
                    kind,
                });
            }
            '.' | '!' | '?' => {
                if let Some(&(next_byte, next)) = chars.get(index + 1) {
                    if next == ' ' || next == '\t' {
                        boundaries.push(Boundary {
                            byte_pos: next_byte + next.len_utf8(),
                            char_pos: index + 2,
                            kind: BoundaryKind::Sentence,
                        });
                    }
                }
            }
            _ => {}
        }
    }

    boundaries
}

fn is_fence_line(rest_of_text: &str) -> bool {
    rest_of_text.trim_start_matches([' ', '\t']).starts_with("```")
}
