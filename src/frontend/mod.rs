use std::path::PathBuf;

pub mod ast;
pub mod build;
pub mod intern;

/// A byte range into the contents of a [`SourceFile`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    /// Used for synthesized nodes which have no source text
    pub const DUMMY: Self = Self { start: 0, end: 0 };

    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

#[derive(Debug)]
pub struct SourceFile {
    pub contents: String,
    pub origin: SourceFileOrigin,
}

impl SourceFile {
    pub fn memory(contents: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
            origin: SourceFileOrigin::Memory,
        }
    }

    pub fn value_of_span(&self, span: Span) -> &str {
        self.contents
            .get(span.start..span.end)
            .unwrap_or_default()
    }

    /// Finds the 1-based line and column of a byte offset. Offsets past the
    /// end of the file are clamped to the last character.
    pub fn position_of(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.contents.len());
        let before = &self.contents[..self.floor_char_boundary(offset)];

        let line = before.matches('\n').count() + 1;
        let column = match before.rfind('\n') {
            Some(newline) => before[newline + 1..].chars().count() + 1,
            None => before.chars().count() + 1,
        };

        (line, column)
    }

    /// Returns the text of a 1-based line without its line terminator
    pub fn line(&self, line: usize) -> Option<&str> {
        if line == 0 {
            return None;
        }

        self.contents
            .split('\n')
            .nth(line - 1)
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
    }

    pub fn line_count(&self) -> usize {
        self.contents.split('\n').count()
    }

    pub fn format_span_position(&self, span: Span) -> String {
        let (line, column) = self.position_of(span.start);
        format!("{}:l{line}:c{column}", self.origin)
    }

    fn floor_char_boundary(&self, mut offset: usize) -> usize {
        while !self.contents.is_char_boundary(offset) {
            offset -= 1;
        }

        offset
    }
}

#[derive(Debug)]
pub enum SourceFileOrigin {
    Memory,
    File(PathBuf),
}

impl core::fmt::Display for SourceFileOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceFileOrigin::Memory => f.write_str("<memory>"),
            SourceFileOrigin::File(path) => f.write_fmt(format_args!("{}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn positions_are_one_based() {
        let file = SourceFile::memory("fn main\n  ret x\nend");

        assert_eq!(file.position_of(0), (1, 1));
        assert_eq!(file.position_of(10), (2, 3));
        assert_eq!(file.position_of(16), (3, 1));
    }

    #[test]
    fn lines_are_looked_up_without_terminators() {
        let file = SourceFile::memory("a\r\nb\nc");

        assert_eq!(file.line(1), Some("a"));
        assert_eq!(file.line(2), Some("b"));
        assert_eq!(file.line(3), Some("c"));
        assert_eq!(file.line(4), None);
        assert_eq!(file.line(0), None);
        assert_eq!(file.line_count(), 3);
    }

    #[test]
    fn span_position_includes_origin() {
        let file = SourceFile {
            contents: "x\ny".to_string(),
            origin: SourceFileOrigin::File(PathBuf::from("main.mg")),
        };

        assert_eq!(file.format_span_position(Span::new(2, 3)), "main.mg:l2:c1");
    }
}
