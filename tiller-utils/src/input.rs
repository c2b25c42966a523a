//! A byte-position cursor over a single line of command input.
use std::borrow::Cow;

use thiserror::Error;

/// An error raised by a failed cursor read.
///
/// A failed read never moves the cursor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    /// A quoted token was opened but never closed.
    #[error("malformed quoted string at byte {position}")]
    UnterminatedQuote {
        /// Byte offset of the opening quote.
        position: usize,
    },
    /// The characters at the cursor do not form a number.
    #[error("unparseable number {text:?}")]
    InvalidNumber {
        /// The text that failed to parse.
        text: String,
    },
    /// A read was attempted with no input remaining.
    #[error("end of input")]
    EndOfInput,
}

/// An opaque marker produced by [`InputCursor::mark`], consumed by
/// [`InputCursor::restore`] to backtrack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorMark(usize);

impl CursorMark {
    /// The byte offset this mark rewinds to.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.0
    }
}

/// A cursor over an immutable input line.
///
/// Reads are token oriented: tokens are separated by runs of ASCII space
/// (other whitespace is part of a token) and may be single- or double-quoted
/// with `\"`, `\'` and `\\` escapes. Copying the cursor is cheap; saving and
/// restoring a position goes through [`CursorMark`].
#[derive(Debug, Clone, Copy)]
pub struct InputCursor<'a> {
    source: &'a str,
    position: usize,
}

impl<'a> InputCursor<'a> {
    /// Creates a cursor at the start of `source`.
    #[must_use]
    pub const fn new(source: &'a str) -> Self {
        Self {
            source,
            position: 0,
        }
    }

    /// The full input line this cursor reads from.
    #[must_use]
    pub const fn source(&self) -> &'a str {
        self.source
    }

    /// The current byte offset into the source.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Everything from the cursor to the end of the source.
    #[must_use]
    pub fn remaining(&self) -> &'a str {
        &self.source[self.position..]
    }

    /// The number of unread bytes.
    #[must_use]
    pub const fn remaining_len(&self) -> usize {
        self.source.len() - self.position
    }

    /// Whether any non-space input remains.
    #[must_use]
    pub fn has_remaining(&self) -> bool {
        self.remaining().bytes().any(|b| b != b' ')
    }

    /// The next character, without consuming it.
    #[must_use]
    pub fn peek_char(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    /// Moves the cursor by `offset` bytes, clamped to the source bounds.
    ///
    /// The caller is responsible for landing on a character boundary.
    pub fn move_by(&mut self, offset: isize) {
        let position = self.position as isize + offset;
        self.position = position.clamp(0, self.source.len() as isize) as usize;
    }

    /// Saves the current position for a later [`restore`](Self::restore).
    #[must_use]
    pub const fn mark(&self) -> CursorMark {
        CursorMark(self.position)
    }

    /// Rewinds (or forwards) the cursor to a saved mark.
    pub const fn restore(&mut self, mark: CursorMark) {
        self.position = mark.0;
    }

    /// Byte offset of the next token, past any leading spaces.
    fn token_start(&self) -> usize {
        let bytes = self.source.as_bytes();
        let mut start = self.position;
        while start < bytes.len() && bytes[start] == b' ' {
            start += 1;
        }
        start
    }

    /// The raw text of the next token, with no quote interpretation.
    fn peek_raw_word(&self) -> &'a str {
        let start = self.token_start();
        let end = self.source[start..]
            .find(' ')
            .map_or(self.source.len(), |offset| start + offset);
        &self.source[start..end]
    }

    /// Scans the quoted token opening at `start`, decoding escapes.
    ///
    /// Returns the byte offset just past the closing quote and the decoded
    /// content.
    fn scan_quoted(&self, start: usize) -> Result<(usize, Cow<'a, str>), InputError> {
        let bytes = self.source.as_bytes();
        let quote = bytes[start];
        let mut decoded: Option<String> = None;
        let mut segment_start = start + 1;
        let mut i = start + 1;
        while i < bytes.len() {
            if bytes[i] == b'\\'
                && i + 1 < bytes.len()
                && matches!(bytes[i + 1], b'"' | b'\'' | b'\\')
            {
                let buffer = decoded.get_or_insert_with(String::new);
                buffer.push_str(&self.source[segment_start..i]);
                buffer.push(bytes[i + 1] as char);
                i += 2;
                segment_start = i;
            } else if bytes[i] == quote {
                let content = match decoded {
                    Some(mut buffer) => {
                        buffer.push_str(&self.source[segment_start..i]);
                        Cow::Owned(buffer)
                    }
                    None => Cow::Borrowed(&self.source[segment_start..i]),
                };
                return Ok((i + 1, content));
            } else {
                i += 1;
            }
        }
        Err(InputError::UnterminatedQuote { position: start })
    }

    /// Scans the next token. Returns `(start, end, content)` where `end` is
    /// the byte offset just past the token (excluding any trailing space).
    fn scan_token(&self) -> Result<(usize, usize, Cow<'a, str>), InputError> {
        let start = self.token_start();
        if start >= self.source.len() {
            return Err(InputError::EndOfInput);
        }
        match self.source.as_bytes()[start] {
            b'"' | b'\'' => {
                let (end, content) = self.scan_quoted(start)?;
                Ok((start, end, content))
            }
            _ => {
                let end = self.source[start..]
                    .find(' ')
                    .map_or(self.source.len(), |offset| start + offset);
                Ok((start, end, Cow::Borrowed(&self.source[start..end])))
            }
        }
    }

    /// Returns the next token without consuming it.
    ///
    /// A `"`- or `'`-prefixed token spans to the matching quote with `\"`,
    /// `\'` and `\\` escapes decoded; any other token spans to the next
    /// space.
    pub fn peek_string(&self) -> Result<Cow<'a, str>, InputError> {
        self.scan_token().map(|(_, _, content)| content)
    }

    /// Reads the next token, advancing past it and a single trailing space.
    pub fn read_string(&mut self) -> Result<Cow<'a, str>, InputError> {
        let (_, end, content) = self.scan_token()?;
        self.position = end;
        if self.source.as_bytes().get(self.position) == Some(&b' ') {
            self.position += 1;
        }
        Ok(content)
    }

    /// Reads the next space-delimited word verbatim, quotes and all.
    pub fn read_word(&mut self) -> Result<&'a str, InputError> {
        let word = self.peek_raw_word();
        if word.is_empty() {
            return Err(InputError::EndOfInput);
        }
        self.position = self.token_start() + word.len();
        if self.source.as_bytes().get(self.position) == Some(&b' ') {
            self.position += 1;
        }
        Ok(word)
    }

    /// Reads up to (not including) the next occurrence of `delimiter` and
    /// skips past it. If the delimiter does not occur, the rest of the input
    /// is consumed and returned.
    pub fn read_until_and_skip(&mut self, delimiter: char) -> &'a str {
        let remaining = self.remaining();
        match remaining.find(delimiter) {
            Some(index) => {
                let content = &remaining[..index];
                self.position += index + delimiter.len_utf8();
                content
            }
            None => {
                self.position = self.source.len();
                remaining
            }
        }
    }

    /// Consumes and returns the rest of the input, minus leading spaces.
    pub fn read_remaining(&mut self) -> &'a str {
        let start = self.token_start();
        self.position = self.source.len();
        &self.source[start..]
    }

    /// Reads an integer in the given radix with maximal munch: an optional
    /// sign followed by as many valid digits as the input provides. The read
    /// does not need to span a whole token.
    ///
    /// # Panics
    /// Panics if `radix` is not in `2..=36`.
    pub fn read_integer(&mut self, radix: u32) -> Result<i64, InputError> {
        let start = self.token_start();
        if start >= self.source.len() {
            return Err(InputError::EndOfInput);
        }
        let rest = self.source[start..].as_bytes();
        let mut end = 0;
        if matches!(rest.first(), Some(b'+' | b'-')) {
            end = 1;
        }
        let digits_start = end;
        while end < rest.len() && (rest[end] as char).is_digit(radix) {
            end += 1;
        }
        if end == digits_start {
            return Err(InputError::InvalidNumber {
                text: self.peek_raw_word().to_owned(),
            });
        }
        let text = &self.source[start..start + end];
        let value = i64::from_str_radix(text, radix).map_err(|_| InputError::InvalidNumber {
            text: text.to_owned(),
        })?;
        self.position = start + end;
        Ok(value)
    }

    /// Reads a decimal floating point number with maximal munch: sign,
    /// integer digits, an optional fraction and an optional exponent. The
    /// read does not need to span a whole token.
    pub fn read_float(&mut self) -> Result<f64, InputError> {
        let start = self.token_start();
        if start >= self.source.len() {
            return Err(InputError::EndOfInput);
        }
        let rest = self.source[start..].as_bytes();
        let mut end = 0;
        if matches!(rest.first(), Some(b'+' | b'-')) {
            end = 1;
        }
        let int_start = end;
        while end < rest.len() && rest[end].is_ascii_digit() {
            end += 1;
        }
        let mut has_digits = end > int_start;
        if end < rest.len() && rest[end] == b'.' {
            let fraction_start = end + 1;
            let mut i = fraction_start;
            while i < rest.len() && rest[i].is_ascii_digit() {
                i += 1;
            }
            if i > fraction_start || has_digits {
                end = i;
                has_digits = has_digits || i > fraction_start;
            }
        }
        if !has_digits {
            return Err(InputError::InvalidNumber {
                text: self.peek_raw_word().to_owned(),
            });
        }
        if end < rest.len() && matches!(rest[end], b'e' | b'E') {
            let mut i = end + 1;
            if i < rest.len() && matches!(rest[i], b'+' | b'-') {
                i += 1;
            }
            let exponent_digits = i;
            while i < rest.len() && rest[i].is_ascii_digit() {
                i += 1;
            }
            if i > exponent_digits {
                end = i;
            }
        }
        let text = &self.source[start..start + end];
        let value = text.parse().map_err(|_| InputError::InvalidNumber {
            text: text.to_owned(),
        })?;
        self.position = start + end;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_space_delimited_tokens() {
        let mut cursor = InputCursor::new("give alice apple");
        assert_eq!(cursor.read_string().unwrap(), "give");
        assert_eq!(cursor.read_string().unwrap(), "alice");
        assert_eq!(cursor.read_string().unwrap(), "apple");
        assert!(!cursor.has_remaining());
        assert_eq!(cursor.read_string(), Err(InputError::EndOfInput));
    }

    #[test]
    fn peek_does_not_consume() {
        let cursor = InputCursor::new("one two");
        assert_eq!(cursor.peek_string().unwrap(), "one");
        assert_eq!(cursor.peek_string().unwrap(), "one");
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn runs_of_spaces_separate_tokens() {
        let mut cursor = InputCursor::new("a   b");
        assert_eq!(cursor.read_string().unwrap(), "a");
        assert_eq!(cursor.read_string().unwrap(), "b");
        assert!(!cursor.has_remaining());
    }

    #[test]
    fn non_space_whitespace_is_part_of_tokens() {
        let mut cursor = InputCursor::new("a\tb c");
        assert_eq!(cursor.read_string().unwrap(), "a\tb");
        assert_eq!(cursor.read_string().unwrap(), "c");
    }

    #[test]
    fn double_quoted_token_spans_spaces() {
        let mut cursor = InputCursor::new("say \"hello world\" now");
        assert_eq!(cursor.read_string().unwrap(), "say");
        assert_eq!(cursor.read_string().unwrap(), "hello world");
        assert_eq!(cursor.read_string().unwrap(), "now");
    }

    #[test]
    fn single_quoted_token_spans_spaces() {
        let mut cursor = InputCursor::new("'a b' c");
        assert_eq!(cursor.read_string().unwrap(), "a b");
        assert_eq!(cursor.read_string().unwrap(), "c");
    }

    #[test]
    fn quote_escapes_are_decoded() {
        let mut cursor = InputCursor::new(r#""a \"b\" \\ c""#);
        assert_eq!(cursor.read_string().unwrap(), r#"a "b" \ c"#);
    }

    #[test]
    fn unterminated_quote_leaves_cursor_unchanged() {
        let mut cursor = InputCursor::new("\"oops");
        assert_eq!(
            cursor.read_string(),
            Err(InputError::UnterminatedQuote { position: 0 })
        );
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn read_until_and_skip_consumes_delimiter() {
        let mut cursor = InputCursor::new("key=value rest");
        assert_eq!(cursor.read_until_and_skip('='), "key");
        assert_eq!(cursor.read_string().unwrap(), "value");
        assert_eq!(cursor.read_string().unwrap(), "rest");
    }

    #[test]
    fn read_until_missing_delimiter_consumes_everything() {
        let mut cursor = InputCursor::new("no delimiter");
        assert_eq!(cursor.read_until_and_skip('='), "no delimiter");
        assert!(!cursor.has_remaining());
    }

    #[test]
    fn read_remaining_takes_the_rest() {
        let mut cursor = InputCursor::new("say  hello there");
        cursor.read_string().unwrap();
        assert_eq!(cursor.read_remaining(), "hello there");
        assert!(!cursor.has_remaining());
    }

    #[test]
    fn read_word_keeps_quotes_verbatim() {
        let mut cursor = InputCursor::new("\"a b\" c");
        assert_eq!(cursor.read_word().unwrap(), "\"a");
        assert_eq!(cursor.read_word().unwrap(), "b\"");
        assert_eq!(cursor.read_word().unwrap(), "c");
    }

    #[test]
    fn read_integer_decimal() {
        let mut cursor = InputCursor::new("-42 rest");
        assert_eq!(cursor.read_integer(10).unwrap(), -42);
        assert_eq!(cursor.read_string().unwrap(), "rest");
    }

    #[test]
    fn read_integer_hex() {
        let mut cursor = InputCursor::new("ff");
        assert_eq!(cursor.read_integer(16).unwrap(), 0xff);
    }

    #[test]
    fn read_integer_does_not_require_end_of_token() {
        let mut cursor = InputCursor::new("755abc");
        assert_eq!(cursor.read_integer(10).unwrap(), 755);
        assert_eq!(cursor.remaining(), "abc");
    }

    #[test]
    fn failed_integer_read_leaves_cursor_unchanged() {
        let mut cursor = InputCursor::new("abc");
        assert_eq!(
            cursor.read_integer(10),
            Err(InputError::InvalidNumber {
                text: "abc".to_owned()
            })
        );
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn read_float_variants() {
        let mut cursor = InputCursor::new("1.5 -0.25 2e3 7");
        assert!((cursor.read_float().unwrap() - 1.5).abs() < f64::EPSILON);
        assert!((cursor.read_float().unwrap() + 0.25).abs() < f64::EPSILON);
        assert!((cursor.read_float().unwrap() - 2000.0).abs() < f64::EPSILON);
        assert!((cursor.read_float().unwrap() - 7.0).abs() < f64::EPSILON);
    }

    #[test]
    fn failed_float_read_leaves_cursor_unchanged() {
        let mut cursor = InputCursor::new("x1");
        assert!(matches!(
            cursor.read_float(),
            Err(InputError::InvalidNumber { .. })
        ));
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn mark_and_restore_round_trip() {
        let mut cursor = InputCursor::new("a b c");
        cursor.read_string().unwrap();
        let mark = cursor.mark();
        cursor.read_string().unwrap();
        cursor.read_string().unwrap();
        cursor.restore(mark);
        assert_eq!(cursor.read_string().unwrap(), "b");
    }

    #[test]
    fn move_by_clamps_to_bounds() {
        let mut cursor = InputCursor::new("abc");
        cursor.move_by(10);
        assert_eq!(cursor.position(), 3);
        cursor.move_by(-100);
        assert_eq!(cursor.position(), 0);
        cursor.move_by(2);
        assert_eq!(cursor.remaining(), "c");
    }
}
