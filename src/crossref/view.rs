//! Line-indexed view over a document with bounded backward search.

use ropey::Rope;

pub(super) struct DocumentView<'a> {
    text: &'a str,
    rope: Rope,
}

impl<'a> DocumentView<'a> {
    pub fn new(text: &'a str) -> DocumentView<'a> {
        DocumentView {
            text,
            rope: Rope::from_str(text),
        }
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    pub fn len_lines(&self) -> usize {
        self.rope.len_lines()
    }

    pub fn line_start(&self, line: usize) -> usize {
        self.rope.line_to_byte(line)
    }

    pub fn line_of(&self, offset: usize) -> usize {
        self.rope.byte_to_line(offset.min(self.text.len()))
    }

    /// Line text without its line terminator.
    pub fn line(&self, line: usize) -> Option<&'a str> {
        if line >= self.len_lines() {
            return None;
        }
        let start = self.line_start(line);
        let end = if line + 1 < self.len_lines() {
            self.line_start(line + 1)
        } else {
            self.text.len()
        };
        Some(self.text[start..end].trim_end_matches(['\n', '\r']))
    }

    pub fn lines(&self) -> impl Iterator<Item = (usize, &'a str)> + '_ {
        (0..self.len_lines()).filter_map(|line| Some((line, self.line(line)?)))
    }

    /// Byte offset where the window of `budget` chars ending at `offset` begins.
    pub fn window_start(&self, offset: usize, budget: usize) -> usize {
        if budget == 0 {
            return offset;
        }
        self.text[..offset]
            .char_indices()
            .rev()
            .nth(budget - 1)
            .map_or(0, |(start, _)| start)
    }

    /// Absolute offset of the last `needle` that lies entirely inside the window before `offset`.
    pub fn rfind_before(&self, offset: usize, budget: usize, needle: &str) -> Option<usize> {
        let start = self.window_start(offset, budget);
        self.text[start..offset]
            .rfind(needle)
            .map(|relative| start + relative)
    }

    /// First `needle` at or after `offset`.
    pub fn find_after(&self, offset: usize, needle: &str) -> Option<usize> {
        let offset = offset.min(self.text.len());
        self.text[offset..].find(needle).map(|relative| offset + relative)
    }

    /// First line of the paragraph-like block containing `line`, not earlier than `floor`.
    pub fn block_start(&self, line: usize, floor: usize) -> usize {
        let mut start = line;
        while start > floor
            && self
                .line(start - 1)
                .is_some_and(|prev| !prev.trim().is_empty())
        {
            start -= 1;
        }
        start
    }
}
