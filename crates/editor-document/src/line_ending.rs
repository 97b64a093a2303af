//! Line delimiter helpers.
//!
//! A document recognizes three delimiters: `"\r\n"`, `"\n"` and a lone `"\r"`. A `"\r\n"` pair
//! always counts as a single delimiter of length 2.

use crate::segment::SimpleSegment;

/// A newline sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    /// Unix-style LF (`'\n'`).
    #[default]
    Lf,
    /// Windows-style CRLF (`"\r\n"`).
    Crlf,
    /// Classic Mac CR (`'\r'`).
    Cr,
}

impl LineEnding {
    /// The delimiter text.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::Crlf => "\r\n",
            Self::Cr => "\r",
        }
    }

    /// Length of the delimiter in characters.
    pub fn len(self) -> usize {
        self.as_str().len()
    }

    /// Detect the line ending of the first delimiter in `text`, if any.
    pub fn detect_in_text(text: &str) -> Option<Self> {
        let mut chars = text.chars().skip_while(|c| *c != '\r' && *c != '\n');
        match (chars.next()?, chars.next()) {
            ('\r', Some('\n')) => Some(Self::Crlf),
            ('\r', _) => Some(Self::Cr),
            _ => Some(Self::Lf),
        }
    }

    /// Replace every delimiter in `text` with this line ending.
    pub fn apply_to_text(self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '\r' => {
                    if chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                    out.push_str(self.as_str());
                }
                '\n' => out.push_str(self.as_str()),
                c => out.push(c),
            }
        }
        out
    }
}

/// Iterator over the delimiters of a character stream, as character-offset segments.
pub struct Delimiters<I: Iterator<Item = char>> {
    chars: std::iter::Peekable<I>,
    offset: usize,
}

impl<I: Iterator<Item = char>> Iterator for Delimiters<I> {
    type Item = SimpleSegment;

    fn next(&mut self) -> Option<SimpleSegment> {
        while let Some(c) = self.chars.next() {
            let start = self.offset;
            self.offset += 1;
            match c {
                '\n' => return Some(SimpleSegment::new(start, 1)),
                '\r' => {
                    if self.chars.peek() == Some(&'\n') {
                        self.chars.next();
                        self.offset += 1;
                        return Some(SimpleSegment::new(start, 2));
                    }
                    return Some(SimpleSegment::new(start, 1));
                }
                _ => {}
            }
        }
        None
    }
}

/// Delimiters of `chars`, with offsets relative to the start of the stream.
pub fn delimiters<I: IntoIterator<Item = char>>(chars: I) -> Delimiters<I::IntoIter> {
    Delimiters {
        chars: chars.into_iter().peekable(),
        offset: 0,
    }
}

/// First delimiter in `text` at or after character offset `offset`.
pub fn next_new_line(text: &str, offset: usize) -> Option<SimpleSegment> {
    delimiters(text.chars().skip(offset))
        .next()
        .map(|d| SimpleSegment::new(d.offset + offset, d.length))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delimiters() {
        let found: Vec<_> = delimiters("a\r\nb\nc\rd\r".chars()).collect();
        assert_eq!(
            found,
            vec![
                SimpleSegment::new(1, 2),
                SimpleSegment::new(4, 1),
                SimpleSegment::new(6, 1),
                SimpleSegment::new(8, 1),
            ]
        );
    }

    #[test]
    fn test_next_new_line() {
        assert_eq!(next_new_line("ab\ncd\r\n", 0), Some(SimpleSegment::new(2, 1)));
        assert_eq!(next_new_line("ab\ncd\r\n", 3), Some(SimpleSegment::new(5, 2)));
        assert_eq!(next_new_line("ab", 0), None);
    }

    #[test]
    fn test_detect_and_apply() {
        assert_eq!(LineEnding::detect_in_text("a\r\nb"), Some(LineEnding::Crlf));
        assert_eq!(LineEnding::detect_in_text("你\nb"), Some(LineEnding::Lf));
        assert_eq!(LineEnding::detect_in_text("a\rb"), Some(LineEnding::Cr));
        assert_eq!(LineEnding::detect_in_text("ab"), None);
        assert_eq!(LineEnding::Crlf.apply_to_text("a\nb\rc\r\nd"), "a\r\nb\r\nc\r\nd");
        assert_eq!(LineEnding::Lf.apply_to_text("a\r\nb"), "a\nb");
    }
}
