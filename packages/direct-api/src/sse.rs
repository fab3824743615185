/// Reassembles complete lines out of an SSE byte stream. HTTP chunk
/// boundaries land anywhere, so bytes are buffered until a newline arrives.
pub(crate) struct SseBuffer {
    buffer: Vec<u8>,
}

impl SseBuffer {
    pub(crate) fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Feed one network chunk, get back every line it completed.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            lines.push(line.trim_end_matches(['\n', '\r']).to_string());
        }
        lines
    }
}

/// The payload of a `data:` line, or `None` for event names, comments, and
/// blank keep-alive lines.
pub(crate) fn data_payload(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("data:")?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}
