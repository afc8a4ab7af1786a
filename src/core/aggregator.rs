use super::exchange::ProtocolViolation;

/// Folds the fragments of one exchange into a single reply.
///
/// Fragments are concatenated verbatim in arrival order. Nothing is trimmed
/// and no separators are inserted.
#[derive(Debug, Default)]
pub struct StreamAggregator {
    buffer: String,
    fragments: usize,
    finished: bool,
}

impl StreamAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `text` and return the whole reply so far.
    pub fn push_fragment(&mut self, text: &str) -> Result<&str, ProtocolViolation> {
        if self.finished {
            return Err(ProtocolViolation::AggregatorFinished);
        }
        self.buffer.push_str(text);
        self.fragments += 1;
        Ok(&self.buffer)
    }

    /// Freeze the buffer and hand out the final text. An exchange that saw no
    /// fragments finishes with an empty reply.
    pub fn finish(&mut self) -> Result<String, ProtocolViolation> {
        if self.finished {
            return Err(ProtocolViolation::AggregatorFinished);
        }
        self.finished = true;
        Ok(std::mem::take(&mut self.buffer))
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}
