use once_cell::unsync::OnceCell;
use std::fmt::{Display, Formatter};

/// The line and column (both 1-based) of a byte offset into a [`Code`].
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// A wrapper around the input source that lazily indexes line breaks so byte
/// offsets produced during lexing can be turned into human-readable
/// positions for diagnostics, without repeatedly rescanning the source.
pub struct Code<'c> {
    pub value: &'c str,
    line_breaks: OnceCell<Vec<usize>>,
}

impl<'c> From<&'c str> for Code<'c> {
    fn from(value: &'c str) -> Self {
        Code::new(value)
    }
}

impl<'c> Code<'c> {
    pub fn new(value: &'c str) -> Self {
        Self {
            value,
            line_breaks: OnceCell::new(),
        }
    }

    fn line_breaks(&self) -> &Vec<usize> {
        self.line_breaks.get_or_init(|| {
            self.value
                .char_indices()
                .filter_map(|(index, c)| if c == '\n' { Some(index) } else { None })
                .collect()
        })
    }

    /// Resolve a byte offset into the source to a 1-based line/column pair.
    /// Columns count Unicode scalar values, not bytes.
    pub fn position_at(&self, offset: usize) -> Position {
        let line_breaks = self.line_breaks();
        let line_index = match line_breaks.binary_search(&offset) {
            Ok(index) | Err(index) => index,
        };

        let line_start = if line_index == 0 {
            0
        } else {
            line_breaks[line_index - 1] + 1
        };
        let column = self.value[line_start..offset.min(self.value.len())]
            .chars()
            .count()
            + 1;
        Position::new(line_index + 1, column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_line_first_column() {
        let code = Code::new("abc\ndef");
        assert_eq!(code.position_at(0), Position::new(1, 1));
    }

    #[test]
    fn after_newline() {
        let code = Code::new("abc\ndef");
        assert_eq!(code.position_at(4), Position::new(2, 1));
    }

    #[test]
    fn multibyte_columns_count_scalars() {
        let code = Code::new("café\nbar");
        // 'é' is 2 bytes in utf-8; offset 6 is the byte right after it.
        let offset = "café".len();
        assert_eq!(code.position_at(offset), Position::new(1, 5));
    }
}
