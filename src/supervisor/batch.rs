use std::time::{Duration, Instant};

/// Groups output lines so observers are not woken for every line.
#[derive(Debug)]
pub struct LineBatcher {
    interval: Duration,
    max_bytes: usize,
    partial: String,
    lines: Vec<String>,
    bytes: usize,
    started: Option<Instant>,
}

impl LineBatcher {
    pub fn new(interval: Duration, max_bytes: usize) -> Self {
        Self {
            interval,
            max_bytes,
            partial: String::new(),
            lines: Vec::new(),
            bytes: 0,
            started: None,
        }
    }

    /**
     * Adds decoded text. Complete lines are returned for scanning right away
     * and also queued for the next batch; a trailing partial line waits for
     * its newline. Carriage returns are stripped.
     */
    pub fn push(&mut self, text: &str, now: Instant) -> Vec<String> {
        self.partial.push_str(text);
        let mut complete = Vec::new();
        while let Some(end) = self.partial.find('\n') {
            let line: String = self.partial.drain(..=end).collect();
            complete.push(line.trim_end_matches(['\n', '\r']).to_string());
        }
        for line in &complete {
            self.queue(line.clone(), now);
        }
        complete
    }

    fn queue(&mut self, line: String, now: Instant) {
        self.started.get_or_insert(now);
        self.bytes += line.len() + 1;
        self.lines.push(line);
    }

    /// Returns the queued lines if the batch is old enough or big enough.
    pub fn poll(&mut self, now: Instant) -> Option<Vec<String>> {
        let due = self.bytes >= self.max_bytes
            || self
                .started
                .is_some_and(|started| now.duration_since(started) >= self.interval);
        if due { self.take() } else { None }
    }

    /**
     * End of stream: an unterminated last line counts as a line. Returns it
     * (for scanning) along with whatever batch is left.
     */
    pub fn finish(&mut self, now: Instant) -> (Option<String>, Option<Vec<String>>) {
        let last = if self.partial.is_empty() {
            None
        } else {
            let line = std::mem::take(&mut self.partial)
                .trim_end_matches('\r')
                .to_string();
            self.queue(line.clone(), now);
            Some(line)
        };
        (last, self.take())
    }

    fn take(&mut self) -> Option<Vec<String>> {
        self.started = None;
        self.bytes = 0;
        if self.lines.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.lines))
        }
    }
}
