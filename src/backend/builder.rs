/// Output streams of one lexical scope
///
/// The head holds stack slot allocations and is placed at the function entry.
/// The body holds instructions in order, and the tail holds the defer chain
/// written when the scope closes. They are joined as head, body, tail.
#[derive(Debug, Default)]
pub struct ScopeBuilder {
    head: String,
    body: String,
    tail: String,
    in_tail: bool,
}

impl ScopeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_line(buffer: &mut String, line: impl AsRef<str>) {
        buffer.push_str(line.as_ref());
        buffer.push('\n');
    }

    fn current(&mut self) -> &mut String {
        if self.in_tail {
            &mut self.tail
        } else {
            &mut self.body
        }
    }

    pub fn emit(&mut self, instruction: impl AsRef<str>) {
        let buffer = self.current();
        buffer.push_str("  ");
        Self::push_line(buffer, instruction);
    }

    pub fn label(&mut self, name: impl AsRef<str>) {
        Self::push_line(self.current(), format!("{}:", name.as_ref()));
    }

    /// Copies text into the output as is
    pub fn verbatim(&mut self, text: impl AsRef<str>) {
        for line in text.as_ref().lines() {
            Self::push_line(self.current(), line);
        }
    }

    pub fn hoist(&mut self, instruction: impl AsRef<str>) {
        self.head.push_str("  ");
        Self::push_line(&mut self.head, instruction);
    }

    /// Everything emitted from now on goes to the tail
    pub fn begin_tail(&mut self) {
        self.in_tail = true;
    }

    /// Folds a closed nested scope into this one. Its allocations join this
    /// head and its instructions continue where this scope currently writes.
    pub fn absorb(&mut self, nested: ScopeBuilder) {
        self.head.push_str(&nested.head);

        let buffer = self.current();
        buffer.push_str(&nested.body);
        buffer.push_str(&nested.tail);
    }

    pub fn finish(self) -> String {
        let mut output = self.head;
        output.push_str(&self.body);
        output.push_str(&self.tail);
        output
    }
}
