//! Sentence segmentation over a growing token buffer

/// Sentences ending before this character index are not split off
const MIN_SENTENCE_CHARS: usize = 5;

/// Byte index of the first sentence-terminal character in `buf`
///
/// A terminal is `.`, `!` or `?` at character index 5 or later, followed by
/// whitespace or the end of the buffer. A `.` directly after a digit is part
/// of a number ("3.5") and never terminates.
#[must_use]
pub fn find_sentence_end(buf: &str) -> Option<usize> {
    let mut prev: Option<char> = None;
    let mut chars = buf.char_indices().enumerate().peekable();

    while let Some((index, (byte, ch))) = chars.next() {
        let is_terminal = matches!(ch, '.' | '!' | '?')
            && index >= MIN_SENTENCE_CHARS
            && !(ch == '.' && prev.is_some_and(char::is_numeric))
            && chars
                .peek()
                .is_none_or(|&(_, (_, next))| matches!(next, ' ' | '\n' | '\r' | '\t'));

        if is_terminal {
            return Some(byte);
        }
        prev = Some(ch);
    }

    None
}

/// Accumulates streamed tokens and yields whole sentences
#[derive(Debug, Default)]
pub struct SentenceBuffer {
    buf: String,
}

impl SentenceBuffer {
    /// Create an empty buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a token and take every sentence it completes
    pub fn push(&mut self, token: &str) -> Vec<String> {
        self.buf.push_str(token);

        let mut sentences = Vec::new();
        while let Some(end) = find_sentence_end(&self.buf) {
            // Terminals are single-byte ASCII
            let rest = self.buf.split_off(end + 1);
            sentences.push(std::mem::take(&mut self.buf));
            self.buf = rest.trim_start().to_string();
        }
        sentences
    }

    /// Text not yet terminated
    #[must_use]
    pub fn pending(&self) -> &str {
        &self.buf
    }

    /// Take the unterminated remainder, if it holds any text
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        let rest = rest.trim();
        (!rest.is_empty()).then(|| rest.to_string())
    }
}
