use std::fmt;

/// A 1-based line/column position in the program text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Pos {
    pub line: usize,
    pub col: usize,
}

impl Pos {
    pub fn new(line: usize, col: usize) -> Self {
        Self { line, col }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Tracks the position of the byte most recently fed to the compiler.
/// A newline moves to the next line with column 0; every other byte advances
/// the column by one, so a multi-byte UTF-8 character spans several columns.
#[derive(Clone, Copy, Debug)]
pub struct Cursor {
    line: usize,
    col: usize,
}

impl Default for Cursor {
    fn default() -> Self {
        Self { line: 1, col: 0 }
    }
}

impl Cursor {
    /// Advance over `byte`. Returns its position unless it is a newline.
    pub fn advance(&mut self, byte: u8) -> Option<Pos> {
        if byte == b'\n' {
            self.line += 1;
            self.col = 0;
            return None;
        }
        self.col += 1;
        Some(self.pos())
    }

    pub fn pos(&self) -> Pos {
        Pos::new(self.line, self.col)
    }
}

/// Program text as raw bytes, with line starts for diagnostics.
pub struct Source<'a> {
    pub text: &'a [u8],
    line_starts: Vec<usize>,
}

impl<'a> Source<'a> {
    pub fn new(text: &'a [u8]) -> Self {
        let mut line_starts = vec![0usize];
        for (i, b) in text.iter().enumerate() {
            if *b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { text, line_starts }
    }

    fn line_bytes(&self, line_1: usize) -> &'a [u8] {
        let line_idx = line_1.saturating_sub(1);
        let Some(&start) = self.line_starts.get(line_idx) else {
            return &[];
        };
        let end = self
            .line_starts
            .get(line_idx + 1)
            .copied()
            .unwrap_or(self.text.len());
        let mut line = &self.text[start..end];
        while let [rest @ .., b'\n' | b'\r'] = line {
            line = rest;
        }
        line
    }

    pub fn line_text(&self, line_1: usize) -> String {
        String::from_utf8_lossy(self.line_bytes(line_1)).into_owned()
    }

    /// Columns are byte offsets; the caret is padded by the characters that
    /// those bytes display as.
    pub fn caret_line(&self, pos: Pos) -> String {
        let line = self.line_bytes(pos.line);
        let prefix = &line[..pos.col.saturating_sub(1).min(line.len())];
        let mut out = String::new();

        // Tabs are kept so the caret lines up under tab-indented text.
        for ch in String::from_utf8_lossy(prefix).chars() {
            out.push(if ch == '\t' { '\t' } else { ' ' });
        }
        out.push('^');
        out
    }

    pub fn render_pos(&self, pos: Pos) -> (String, String) {
        (self.line_text(pos.line), self.caret_line(pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_counts_columns_and_skips_newlines() {
        let mut c = Cursor::default();
        assert_eq!(c.advance(b'+'), Some(Pos::new(1, 1)));
        assert_eq!(c.advance(b'+'), Some(Pos::new(1, 2)));
        assert_eq!(c.advance(b'\n'), None);
        assert_eq!(c.pos(), Pos::new(2, 0));
        assert_eq!(c.advance(b']'), Some(Pos::new(2, 1)));
    }

    #[test]
    fn cursor_counts_bytes_not_characters() {
        let mut c = Cursor::default();
        for &byte in "é".as_bytes() {
            c.advance(byte);
        }
        assert_eq!(c.advance(b']'), Some(Pos::new(1, 3)));
    }

    #[test]
    fn caret_sits_under_column() {
        let src = Source::new(b"ab\n\t+]\n");
        assert_eq!(src.line_text(2), "\t+]");
        assert_eq!(src.caret_line(Pos::new(2, 3)), "\t ^");
        assert_eq!(src.line_text(9), "");
    }

    #[test]
    fn caret_after_multibyte_text_counts_displayed_characters() {
        let src = Source::new("é]".as_bytes());
        assert_eq!(src.render_pos(Pos::new(1, 3)), ("é]".to_string(), " ^".to_string()));
    }
}
