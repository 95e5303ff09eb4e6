//! Incremental text editor addressed by original offsets.
//!
//! The buffer is kept as a list of chunks covering the original source.
//! Edits split chunks at their boundaries and replace chunk content or add
//! text around chunks, so every operation keeps referring to offsets in the
//! original text no matter how many edits were applied before it.

use std::rc::Rc;

use crate::location::LineIndex;
use crate::source_map::{SourceMap, SourceMapBuilder};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    #[error("Range {start}..{end} is out of bounds (length {len})")]
    OutOfBounds { start: usize, end: usize, len: usize },
    #[error("Cannot overwrite an empty range at {0}")]
    EmptyRange(usize),
    #[error("Offset {0} is not on a character boundary")]
    CharBoundary(usize),
    #[error("Cannot split a chunk that has already been edited at {0}")]
    SplitEdited(usize),
}

#[derive(Debug, Clone)]
struct Chunk {
    start: usize,
    end: usize,
    /// Text inserted before the chunk (`append_right`/`prepend_right`).
    intro: String,
    content: String,
    /// Text inserted after the chunk (`append_left`/`prepend_left`).
    outro: String,
    edited: bool,
}

impl Chunk {
    fn new(start: usize, end: usize, original: &str) -> Self {
        Chunk {
            start,
            end,
            intro: String::new(),
            content: original[start..end].to_string(),
            outro: String::new(),
            edited: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MagicString {
    original: Rc<str>,
    chunks: Vec<Chunk>,
    intro: String,
    outro: String,
}

impl MagicString {
    pub fn new(original: &str) -> Self {
        let original: Rc<str> = Rc::from(original);
        let chunks = if original.is_empty() {
            Vec::new()
        } else {
            vec![Chunk::new(0, original.len(), &original)]
        };
        MagicString {
            original,
            chunks,
            intro: String::new(),
            outro: String::new(),
        }
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn len(&self) -> usize {
        self.original.len()
    }

    pub fn is_empty(&self) -> bool {
        self.original.is_empty()
    }

    fn check(&self, start: usize, end: usize) -> Result<(), EditError> {
        let len = self.original.len();
        if start > end || end > len {
            return Err(EditError::OutOfBounds { start, end, len });
        }
        for offset in [start, end] {
            if !self.original.is_char_boundary(offset) {
                return Err(EditError::CharBoundary(offset));
            }
        }
        Ok(())
    }

    /// Ensures a chunk boundary exists at `offset`.
    fn split(&mut self, offset: usize) -> Result<(), EditError> {
        let Some(index) = self
            .chunks
            .iter()
            .position(|chunk| chunk.start < offset && offset < chunk.end)
        else {
            return Ok(());
        };
        let chunk = &mut self.chunks[index];
        if chunk.edited {
            return Err(EditError::SplitEdited(offset));
        }
        let tail = Chunk {
            start: offset,
            end: chunk.end,
            intro: String::new(),
            content: chunk.content.split_off(offset - chunk.start),
            outro: std::mem::take(&mut chunk.outro),
            edited: false,
        };
        chunk.end = offset;
        self.chunks.insert(index + 1, tail);
        Ok(())
    }

    fn range_indices(&self, start: usize, end: usize) -> std::ops::Range<usize> {
        let first = self.chunks.partition_point(|chunk| chunk.start < start);
        let last = self.chunks.partition_point(|chunk| chunk.end <= end);
        first..last.max(first)
    }

    fn edit(&mut self, start: usize, end: usize, content: &str, content_only: bool) -> Result<(), EditError> {
        self.check(start, end)?;
        if start == end {
            return Err(EditError::EmptyRange(start));
        }
        self.split(start)?;
        self.split(end)?;
        let indices = self.range_indices(start, end);
        for (i, index) in indices.enumerate() {
            let chunk = &mut self.chunks[index];
            chunk.content = if i == 0 { content.to_string() } else { String::new() };
            chunk.edited = true;
            if !content_only || i > 0 {
                chunk.intro.clear();
                chunk.outro.clear();
            }
        }
        Ok(())
    }

    /// Replaces `start..end`, dropping text previously inserted inside it.
    pub fn overwrite(&mut self, start: usize, end: usize, content: &str) -> Result<&mut Self, EditError> {
        self.edit(start, end, content, false)?;
        Ok(self)
    }

    /// Replaces `start..end`, keeping text inserted at its edges.
    pub fn update(&mut self, start: usize, end: usize, content: &str) -> Result<&mut Self, EditError> {
        self.edit(start, end, content, true)?;
        Ok(self)
    }

    pub fn remove(&mut self, start: usize, end: usize) -> Result<&mut Self, EditError> {
        self.check(start, end)?;
        if start == end {
            return Ok(self);
        }
        self.split(start)?;
        self.split(end)?;
        for index in self.range_indices(start, end) {
            let chunk = &mut self.chunks[index];
            chunk.intro.clear();
            chunk.outro.clear();
            chunk.content.clear();
            chunk.edited = true;
        }
        Ok(self)
    }

    /// Inserts at `offset`, attached to the text on its left.
    pub fn append_left(&mut self, offset: usize, content: &str) -> Result<&mut Self, EditError> {
        self.check(offset, offset)?;
        self.split(offset)?;
        match self.chunks.iter_mut().find(|chunk| chunk.end == offset) {
            Some(chunk) => chunk.outro.push_str(content),
            None => self.intro.push_str(content),
        }
        Ok(self)
    }

    pub fn prepend_left(&mut self, offset: usize, content: &str) -> Result<&mut Self, EditError> {
        self.check(offset, offset)?;
        self.split(offset)?;
        match self.chunks.iter_mut().find(|chunk| chunk.end == offset) {
            Some(chunk) => chunk.outro.insert_str(0, content),
            None => self.intro.insert_str(0, content),
        }
        Ok(self)
    }

    /// Replaces everything previously inserted at `offset` on the left with
    /// `content`.
    pub fn overwrite_left(&mut self, offset: usize, content: &str) -> Result<&mut Self, EditError> {
        self.check(offset, offset)?;
        self.split(offset)?;
        let inserted = match self.chunks.iter_mut().find(|chunk| chunk.end == offset) {
            Some(chunk) => &mut chunk.outro,
            None => &mut self.intro,
        };
        inserted.clear();
        inserted.push_str(content);
        Ok(self)
    }

    /// Inserts at `offset`, attached to the text on its right.
    pub fn append_right(&mut self, offset: usize, content: &str) -> Result<&mut Self, EditError> {
        self.check(offset, offset)?;
        self.split(offset)?;
        match self.chunks.iter_mut().find(|chunk| chunk.start == offset) {
            Some(chunk) => chunk.intro.push_str(content),
            None => self.outro.push_str(content),
        }
        Ok(self)
    }

    pub fn prepend_right(&mut self, offset: usize, content: &str) -> Result<&mut Self, EditError> {
        self.check(offset, offset)?;
        self.split(offset)?;
        match self.chunks.iter_mut().find(|chunk| chunk.start == offset) {
            Some(chunk) => chunk.intro.insert_str(0, content),
            None => self.outro.insert_str(0, content),
        }
        Ok(self)
    }

    /// Edited text of the original range `start..end`.
    ///
    /// Includes text appended to the right of `start` and to the left of
    /// `end`. An empty range yields everything inserted at that offset.
    pub fn slice(&self, start: usize, end: usize) -> Result<String, EditError> {
        self.check(start, end)?;
        let mut result = String::new();

        if start == end {
            if let Some(chunk) = self.chunks.iter().find(|chunk| chunk.end == start) {
                result.push_str(&chunk.outro);
            } else if start == 0 {
                result.push_str(&self.intro);
            }
            if let Some(chunk) = self.chunks.iter().find(|chunk| chunk.start == start) {
                result.push_str(&chunk.intro);
            } else if start == self.len() {
                result.push_str(&self.outro);
            }
            return Ok(result);
        }

        for chunk in self.chunks.iter().filter(|chunk| chunk.end > start && chunk.start < end) {
            let from = start.max(chunk.start);
            let to = end.min(chunk.end);
            if chunk.start >= start {
                result.push_str(&chunk.intro);
            }
            if from == chunk.start && to == chunk.end {
                result.push_str(&chunk.content);
            } else if chunk.edited {
                return Err(EditError::SplitEdited(if from != chunk.start { from } else { to }));
            } else {
                result.push_str(&chunk.content[from - chunk.start..to - chunk.start]);
            }
            if chunk.end <= end {
                result.push_str(&chunk.outro);
            }
        }
        Ok(result)
    }

    pub fn has_changed(&self) -> bool {
        !self.intro.is_empty()
            || !self.outro.is_empty()
            || self
                .chunks
                .iter()
                .any(|chunk| chunk.edited || !chunk.intro.is_empty() || !chunk.outro.is_empty())
    }

    /// Builds a source map for the current edits. `source` names the
    /// original file. Columns count UTF-16 code units.
    pub fn generate_map(&self, source: &str, file: Option<&str>) -> SourceMap {
        let index = LineIndex::new(&self.original);
        let mut builder = SourceMapBuilder::new();
        let mut line = 0u32;
        let mut column = 0u32;

        let origin = |offset: usize| {
            let position = index.position(offset);
            let line_start = offset - position.column as usize;
            (position.line, utf16_len(&self.original[line_start..offset]))
        };
        let advance = |text: &str, line: &mut u32, column: &mut u32| {
            for (i, part) in text.split('\n').enumerate() {
                if i > 0 {
                    *line += 1;
                    *column = 0;
                }
                *column += utf16_len(part);
            }
        };

        advance(&self.intro, &mut line, &mut column);
        for chunk in &self.chunks {
            advance(&chunk.intro, &mut line, &mut column);
            if !chunk.content.is_empty() {
                let (original_line, original_column) = origin(chunk.start);
                builder.add(line, column, original_line, original_column);
                if chunk.edited {
                    advance(&chunk.content, &mut line, &mut column);
                } else {
                    let mut offset = chunk.start;
                    for (i, part) in chunk.content.split('\n').enumerate() {
                        if i > 0 {
                            line += 1;
                            column = 0;
                            offset += 1;
                            if !part.is_empty() {
                                let (original_line, original_column) = origin(offset);
                                builder.add(line, column, original_line, original_column);
                            }
                        }
                        column += utf16_len(part);
                        offset += part.len();
                    }
                }
            }
            advance(&chunk.outro, &mut line, &mut column);
        }

        builder.build(source, &self.original, file)
    }
}

fn utf16_len(text: &str) -> u32 {
    text.encode_utf16().count() as u32
}

impl std::fmt::Display for MagicString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.intro)?;
        for chunk in &self.chunks {
            f.write_str(&chunk.intro)?;
            f.write_str(&chunk.content)?;
            f.write_str(&chunk.outro)?;
        }
        f.write_str(&self.outro)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overwrite_uses_original_offsets() {
        let mut s = MagicString::new("abcdefghij");
        s.overwrite(2, 4, "XYZ").unwrap();
        s.overwrite(6, 8, "").unwrap();
        assert_eq!(s.to_string(), "abXYZefij");
        assert_eq!(s.slice(0, 10).unwrap(), "abXYZefij");
        assert_eq!(s.slice(4, 6).unwrap(), "ef");
    }

    #[test]
    fn test_append_left_and_right() {
        let mut s = MagicString::new("<p></p>");
        s.append_left(3, "L").unwrap();
        s.append_right(3, "R").unwrap();
        s.append_left(0, "<!--a-->").unwrap();
        s.append_right(7, "<!--b-->").unwrap();
        assert_eq!(s.to_string(), "<!--a--><p>LR</p><!--b-->");
        assert_eq!(s.slice(0, 3).unwrap(), "<p>L");
        assert_eq!(s.slice(3, 7).unwrap(), "R</p>");
        assert_eq!(s.slice(3, 3).unwrap(), "LR");
    }

    #[test]
    fn test_overwrite_left_replaces_insertions() {
        let mut s = MagicString::new("<p></p>");
        s.append_left(3, "a").unwrap();
        s.append_right(3, "R").unwrap();
        s.overwrite_left(3, "b").unwrap();
        assert_eq!(s.to_string(), "<p>bR</p>");
        s.overwrite_left(0, "<!--x-->").unwrap();
        s.overwrite_left(0, "<!--y-->").unwrap();
        assert_eq!(s.to_string(), "<!--y--><p>bR</p>");
    }

    #[test]
    fn test_update_keeps_inserted_edges() {
        let mut s = MagicString::new("<b>old</b>");
        s.append_right(3, "[").unwrap();
        s.append_left(6, "]").unwrap();
        s.update(3, 6, "new").unwrap();
        assert_eq!(s.to_string(), "<b>[new]</b>");
        s.overwrite(3, 6, "x").unwrap();
        assert_eq!(s.to_string(), "<b>x</b>");
    }

    #[test]
    fn test_remove() {
        let mut s = MagicString::new("a<!-- ko -->b<!-- /ko -->c");
        s.remove(1, 12).unwrap();
        s.remove(13, 25).unwrap();
        assert_eq!(s.to_string(), "abc");
    }

    #[test]
    fn test_clone_is_independent() {
        let mut s = MagicString::new("hello world");
        s.overwrite(0, 5, "bye").unwrap();
        let mut copy = s.clone();
        copy.overwrite(6, 11, "moon").unwrap();
        assert_eq!(s.to_string(), "bye world");
        assert_eq!(copy.to_string(), "bye moon");
    }

    #[test]
    fn test_errors() {
        let mut s = MagicString::new("abc");
        assert_eq!(s.overwrite(1, 1, "x").unwrap_err(), EditError::EmptyRange(1));
        assert!(matches!(s.overwrite(2, 9, "x").unwrap_err(), EditError::OutOfBounds { .. }));
        s.overwrite(0, 3, "xyz").unwrap();
        assert_eq!(s.overwrite(1, 2, "q").unwrap_err(), EditError::SplitEdited(1));
    }

    #[test]
    fn test_slice_inside_unedited_chunk() {
        let s = MagicString::new("abcdef");
        assert_eq!(s.slice(1, 4).unwrap(), "bcd");
        assert!(!s.has_changed());
    }

    #[test]
    fn test_generate_map() {
        let mut s = MagicString::new("ab\ncd");
        s.overwrite(0, 1, "XX").unwrap();
        let map = s.generate_map("page.html", None);
        // XX -> 0:0, b -> 0:1, cd -> 1:0
        assert_eq!(map.mappings, "AAAA,EAAC;AACD");
        assert_eq!(map.sources, vec!["page.html".to_string()]);
        assert_eq!(map.sources_content, vec!["ab\ncd".to_string()]);
    }

    #[test]
    fn test_generate_map_counts_utf16_columns() {
        let mut s = MagicString::new("<p>日本</p><b></b>");
        s.overwrite(13, 16, "<B>").unwrap();
        let map = s.generate_map("page.html", None);
        // <p>日本</p> is 9 UTF-16 units wide and 13 bytes long
        assert_eq!(map.mappings, "AAAA,SAAS,GAAG");
    }
}
