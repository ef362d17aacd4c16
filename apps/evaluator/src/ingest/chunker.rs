//! Paragraph-first text chunking for reference documents.
//!
//! Text is split into paragraphs (`"\n\n"`); a paragraph longer than the chunk
//! size falls back to sentences. Units are packed into chunks of at most
//! `max_size` characters, and every chunk after the first starts with the tail
//! of the previous one. All sizes are counted in `char`s.

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

const PARAGRAPH_SEPARATOR: &str = "\n\n";
const SENTENCE_SEPARATOR: &str = " ";

/// Splits `text` into overlapping chunks of at most `max_size` characters.
///
/// `max_size == 0` falls back to [`DEFAULT_CHUNK_SIZE`]; an `overlap` that is not
/// smaller than `max_size` is clamped to `max_size / 4`. The overlap carried into
/// a chunk shrinks when the next unit would not otherwise fit, and a unit that
/// cannot fit even on its own is split at the character boundary.
pub fn chunk_text(text: &str, max_size: usize, overlap: usize) -> Vec<String> {
    let max_size = if max_size == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        max_size
    };
    let overlap = if overlap >= max_size {
        max_size / 4
    } else {
        overlap
    };

    let normalized = text.replace("\r\n", "\n");
    let mut builder = ChunkBuilder::new(max_size, overlap);

    for paragraph in normalized.split(PARAGRAPH_SEPARATOR) {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        if char_len(paragraph) > max_size {
            for sentence in split_sentences(paragraph) {
                builder.push(sentence, SENTENCE_SEPARATOR);
            }
        } else {
            builder.push(paragraph, PARAGRAPH_SEPARATOR);
        }
    }

    builder.finish()
}

/// Splits on `.`, `!` and `?`, keeping the terminators. Runs of terminators
/// (`"..."`, `"?!"`) stay with the sentence they end.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if !is_terminator(c) {
            continue;
        }
        if matches!(chars.peek(), Some((_, next)) if is_terminator(*next)) {
            continue;
        }
        let end = idx + c.len_utf8();
        sentences.push(&text[start..end]);
        start = end;
    }
    sentences.push(&text[start..]);

    sentences
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

struct ChunkBuilder {
    max_size: usize,
    overlap: usize,
    chunks: Vec<String>,
    buffer: String,
    /// Length of `buffer` in chars.
    buffer_len: usize,
    /// Chars at the front of `buffer` carried over from the previous chunk.
    seed_len: usize,
}

impl ChunkBuilder {
    fn new(max_size: usize, overlap: usize) -> Self {
        Self {
            max_size,
            overlap,
            chunks: Vec::new(),
            buffer: String::new(),
            buffer_len: 0,
            seed_len: 0,
        }
    }

    fn push(&mut self, unit: &str, separator: &str) {
        let separator_len = char_len(separator);
        let mut rest = unit;

        while !rest.is_empty() {
            let rest_len = char_len(rest);
            let joint = if self.buffer.is_empty() {
                0
            } else {
                separator_len
            };

            if self.buffer_len + joint + rest_len <= self.max_size {
                self.append(rest, separator);
                return;
            }

            if self.buffer_len > self.seed_len {
                self.close(rest_len + separator_len);
                continue;
            }

            // Only the carried-over seed is buffered and the unit still does
            // not fit: hard-split it.
            let room = self.max_size.saturating_sub(self.buffer_len + joint);
            if room == 0 {
                self.clear();
                continue;
            }

            let (head, tail) = rest.split_at(byte_offset(rest, room));
            self.append(head, separator);
            self.close(char_len(tail) + separator_len);
            rest = tail;
        }
    }

    fn append(&mut self, unit: &str, separator: &str) {
        if !self.buffer.is_empty() {
            self.buffer.push_str(separator);
            self.buffer_len += char_len(separator);
        }
        self.buffer.push_str(unit);
        self.buffer_len += char_len(unit);
    }

    /// Emits the buffer as a chunk and seeds the next one with its tail.
    /// `next_len` is the size of what will be appended next, separator included.
    fn close(&mut self, next_len: usize) {
        let chunk = std::mem::take(&mut self.buffer);

        let seed_len = if next_len <= self.max_size {
            self.overlap.min(self.max_size - next_len)
        } else {
            self.overlap
        };
        let seed = last_chars(&chunk, seed_len).to_string();

        self.buffer_len = char_len(&seed);
        self.seed_len = self.buffer_len;
        self.buffer = seed;
        self.chunks.push(chunk);
    }

    fn clear(&mut self) {
        self.buffer.clear();
        self.buffer_len = 0;
        self.seed_len = 0;
    }

    fn finish(mut self) -> Vec<String> {
        if self.buffer_len > self.seed_len {
            self.chunks.push(self.buffer);
        }
        self.chunks
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte offset of the `n`th char, or `s.len()` if `s` is shorter.
fn byte_offset(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

fn last_chars(s: &str, n: usize) -> &str {
    let len = char_len(s);
    if n >= len {
        s
    } else {
        &s[byte_offset(s, len - n)..]
    }
}
