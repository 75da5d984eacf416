//! Destinations for replayed text.
//!
//! The replayer produces output through four primitives only, so a sink can
//! be a string, a writer, a UART shim or the `log` facade without the
//! replayer knowing which.

use std::io::Write;

/// Character sink used by the replayer.
pub trait OutputSink {
    fn write_str(&mut self, text: &str);

    /// Writes `text` `count` times.
    fn write_repeat(&mut self, text: &str, count: usize) {
        for _ in 0..count {
            self.write_str(text);
        }
    }

    /// Writes at most `max_bytes` bytes of `text`, stopping early at
    /// `terminator`. A character that would straddle the limit is left out.
    fn write_bounded(&mut self, text: &str, max_bytes: usize, terminator: char) {
        let end = bounded_len(text, max_bytes, terminator);
        self.write_str(&text[..end]);
    }

    fn write_newlines(&mut self, count: usize) {
        self.write_repeat("\n", count);
    }
}

/// Byte length [`OutputSink::write_bounded`] writes for these arguments.
pub fn bounded_len(text: &str, max_bytes: usize, terminator: char) -> usize {
    let mut end = text.find(terminator).unwrap_or(text.len()).min(max_bytes);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    end
}

impl<S: OutputSink + ?Sized> OutputSink for &mut S {
    fn write_str(&mut self, text: &str) {
        (**self).write_str(text);
    }

    fn write_repeat(&mut self, text: &str, count: usize) {
        (**self).write_repeat(text, count);
    }

    fn write_bounded(&mut self, text: &str, max_bytes: usize, terminator: char) {
        (**self).write_bounded(text, max_bytes, terminator);
    }

    fn write_newlines(&mut self, count: usize) {
        (**self).write_newlines(count);
    }
}

/// Collects everything into a `String`.
#[derive(Debug, Default, Clone)]
pub struct StringSink {
    buf: String,
}

impl StringSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn into_string(self) -> String {
        self.buf
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.buf.lines()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl OutputSink for StringSink {
    fn write_str(&mut self, text: &str) {
        self.buf.push_str(text);
    }

    fn write_repeat(&mut self, text: &str, count: usize) {
        self.buf.push_str(&text.repeat(count));
    }
}

/// Forwards to any [`std::io::Write`]. The first I/O error is kept and
/// further output is dropped.
pub struct IoSink<W: Write> {
    writer: W,
    error: Option<std::io::Error>,
}

impl<W: Write> IoSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, error: None }
    }

    pub fn error(&self) -> Option<&std::io::Error> {
        self.error.as_ref()
    }

    /// Flushes and returns the writer, or the first error seen.
    pub fn finish(mut self) -> std::io::Result<W> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write> OutputSink for IoSink<W> {
    fn write_str(&mut self, text: &str) {
        if self.error.is_some() {
            return;
        }
        if let Err(err) = self.writer.write_all(text.as_bytes()) {
            self.error = Some(err);
        }
    }
}

/// Emits each replayed line as one `log` record.
///
/// Lines are buffered until a newline arrives, so a record rendered through
/// many primitive calls becomes a single log entry.
pub struct LogFacadeSink {
    target: &'static str,
    level: log::Level,
    line: String,
}

impl LogFacadeSink {
    pub fn new(target: &'static str, level: log::Level) -> Self {
        Self {
            target,
            level,
            line: String::new(),
        }
    }

    fn emit(&mut self) {
        log::log!(target: self.target, self.level, "{}", self.line);
        self.line.clear();
    }
}

impl OutputSink for LogFacadeSink {
    fn write_str(&mut self, text: &str) {
        let mut rest = text;
        while let Some(pos) = rest.find('\n') {
            self.line.push_str(&rest[..pos]);
            self.emit();
            rest = &rest[pos + 1..];
        }
        self.line.push_str(rest);
    }
}

impl Drop for LogFacadeSink {
    fn drop(&mut self) {
        if !self.line.is_empty() {
            self.emit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_stops_at_limit_or_terminator() {
        let mut sink = StringSink::new();
        sink.write_bounded("abcdef", 3, '\0');
        sink.write_str("|");
        sink.write_bounded("ab\0cd", 10, '\0');
        sink.write_str("|");
        sink.write_bounded("héllo", 3, '\0');
        sink.write_str("|");
        // `é` is two bytes and does not fit after `h`.
        sink.write_bounded("héllo", 2, '\0');
        assert_eq!(sink.as_str(), "abc|ab|hé|h");
        assert_eq!(bounded_len("héllo", 2, '\0'), 1);
    }

    #[test]
    fn test_repeat_and_newlines() {
        let mut sink = StringSink::new();
        sink.write_repeat("ab", 3);
        sink.write_newlines(2);
        sink.write_repeat("x", 0);
        assert_eq!(sink.as_str(), "ababab\n\n");
    }

    struct CaptureLogger {
        lines: parking_lot::Mutex<Vec<(log::Level, String)>>,
    }

    impl log::Log for CaptureLogger {
        fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
            metadata.target() == "replay-capture"
        }

        fn log(&self, record: &log::Record<'_>) {
            if self.enabled(record.metadata()) {
                self.lines
                    .lock()
                    .push((record.level(), record.args().to_string()));
            }
        }

        fn flush(&self) {}
    }

    static CAPTURE: CaptureLogger = CaptureLogger {
        lines: parking_lot::const_mutex(Vec::new()),
    };

    #[test]
    fn test_log_facade_sink_emits_one_record_per_line() {
        let _ = log::set_logger(&CAPTURE);
        log::set_max_level(log::LevelFilter::Trace);

        {
            let mut sink = LogFacadeSink::new("replay-capture", log::Level::Info);
            sink.write_str("first ");
            sink.write_str("line\nsecond");
            sink.write_repeat("!", 2);
            sink.write_newlines(1);
            // Left without a newline; flushed when the sink is dropped.
            sink.write_str("tail");
        }

        let lines = CAPTURE.lines.lock().clone();
        assert_eq!(
            lines,
            [
                (log::Level::Info, "first line".to_string()),
                (log::Level::Info, "second!!".to_string()),
                (log::Level::Info, "tail".to_string()),
            ]
        );
    }

    #[test]
    fn test_io_sink_writes_through() {
        let mut sink = IoSink::new(Vec::new());
        sink.write_str("hello ");
        sink.write_repeat("-", 2);
        let out = sink.finish().unwrap();
        assert_eq!(out, b"hello --");
    }
}
