//! Indentation-aware text buffer for generated sources.

const INDENT: &str = "    ";

#[derive(Debug, Default)]
pub struct SourceWriter {
    buf: String,
    depth: usize,
}

impl SourceWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write one line at the current depth. An empty line carries no
    /// indentation.
    pub fn line(&mut self, text: impl AsRef<str>) -> &mut Self {
        let text = text.as_ref();
        if !text.is_empty() {
            for _ in 0..self.depth {
                self.buf.push_str(INDENT);
            }
            self.buf.push_str(text);
        }
        self.buf.push('\n');
        self
    }

    pub fn blank(&mut self) -> &mut Self {
        self.line("")
    }

    /// Write a line that opens a block and indent what follows.
    pub fn open(&mut self, text: impl AsRef<str>) -> &mut Self {
        self.line(text);
        self.depth += 1;
        self
    }

    /// Dedent and write the line closing a block.
    pub fn close(&mut self, text: impl AsRef<str>) -> &mut Self {
        self.depth = self.depth.saturating_sub(1);
        self.line(text)
    }

    /// Close a block and open the next one on the same line, as in
    /// `} else {`.
    pub fn reopen(&mut self, text: impl AsRef<str>) -> &mut Self {
        self.close(text);
        self.depth += 1;
        self
    }

    /// Write pre-rendered text verbatim, indenting every non-empty line.
    pub fn block(&mut self, text: &str) -> &mut Self {
        for l in text.lines() {
            self.line(l);
        }
        self
    }

    pub fn finish(self) -> String {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_indent_nested_blocks() {
        let mut w = SourceWriter::new();
        w.open("fn f() {")
            .open("loop {")
            .line("break;")
            .close("}")
            .blank()
            .close("}");
        assert_eq!(w.finish(), "fn f() {\n    loop {\n        break;\n    }\n\n}\n");
    }

    #[test]
    fn should_keep_depth_when_reopening() {
        let mut w = SourceWriter::new();
        w.open("if a {").line("x();").reopen("} else {").line("y();").close("}");
        assert_eq!(w.finish(), "if a {\n    x();\n} else {\n    y();\n}\n");
    }

    #[test]
    fn should_indent_every_line_of_a_block() {
        let mut w = SourceWriter::new();
        w.open("{").block("a\n\nb").close("}");
        assert_eq!(w.finish(), "{\n    a\n\n    b\n}\n");
    }
}
