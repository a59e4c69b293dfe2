//! Splits story text into pieces small enough for a speech backend.
//!
//! Paragraphs are packed greedily; a paragraph that alone exceeds the limit is
//! broken at sentence boundaries, a sentence at word boundaries, and a word at
//! character boundaries. Lengths are counted in characters, not bytes.

use crate::render::paragraphs;

/// Joiner placed in front of a unit when it is packed after another one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Joiner {
    Paragraph,
    Space,
    None,
}

impl Joiner {
    fn as_str(self) -> &'static str {
        match self {
            Joiner::Paragraph => "\n\n",
            Joiner::Space => " ",
            Joiner::None => "",
        }
    }
}

#[derive(Debug)]
struct Unit {
    text: String,
    joiner: Joiner,
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Splits `text` into chunks of at most `limit` characters.
pub fn chunk_text(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for unit in units(text, limit) {
        let unit_len = char_len(&unit.text);
        let joiner = unit.joiner.as_str();

        if current.is_empty() {
            current = unit.text;
            current_len = unit_len;
        } else if current_len + joiner.len() + unit_len <= limit {
            current.push_str(joiner);
            current.push_str(&unit.text);
            current_len += joiner.len() + unit_len;
        } else {
            chunks.push(std::mem::take(&mut current));
            current = unit.text;
            current_len = unit_len;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Breaks the text into units no longer than `limit`, each tagged with how
/// it joins the previous unit.
fn units(text: &str, limit: usize) -> Vec<Unit> {
    let mut out = Vec::new();

    for paragraph in paragraphs(text) {
        let start = out.len();
        if char_len(&paragraph) <= limit {
            out.push(Unit {
                text: paragraph,
                joiner: Joiner::Space,
            });
        } else {
            for sentence in sentences(&paragraph) {
                if char_len(sentence) <= limit {
                    out.push(Unit {
                        text: sentence.to_string(),
                        joiner: Joiner::Space,
                    });
                } else {
                    split_words(sentence, limit, &mut out);
                }
            }
        }
        if let Some(first) = out.get_mut(start) {
            first.joiner = Joiner::Paragraph;
        }
    }

    out
}

fn split_words(sentence: &str, limit: usize, out: &mut Vec<Unit>) {
    for word in sentence.split_whitespace() {
        if char_len(word) <= limit {
            out.push(Unit {
                text: word.to_string(),
                joiner: Joiner::Space,
            });
            continue;
        }

        let chars: Vec<char> = word.chars().collect();
        for (i, piece) in chars.chunks(limit).enumerate() {
            out.push(Unit {
                text: piece.iter().collect(),
                joiner: if i == 0 { Joiner::Space } else { Joiner::None },
            });
        }
    }
}

/// Sentences end at `.`, `!`, `?` or `…` followed by whitespace.
fn sentences(paragraph: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut iter = paragraph.char_indices().peekable();

    while let Some((_, c)) = iter.next() {
        if !matches!(c, '.' | '!' | '?' | '…') {
            continue;
        }
        if let Some(&(next_i, next)) = iter.peek() {
            if next.is_whitespace() {
                let sentence = paragraph[start..next_i].trim();
                if !sentence.is_empty() {
                    out.push(sentence);
                }
                start = next_i;
            }
        }
    }

    let tail = paragraph[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}
