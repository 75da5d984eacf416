//! Reads records back out of the rings and renders them as text.
//!
//! Replay is destructive: every record handed to a sink is removed from its
//! ring. Records are taken one at a time under the recorder's lock and
//! rendered after the lock is released, so writers are never held up by
//! formatting.
//!
//! When the quiet ring is included, the two rings are merged in issue order,
//! using the sequence number each ring keeps per record rather than the
//! narrow stored counter. A record that was mirrored into both rings shows
//! up with the same sequence at both heads; the quiet copy is dropped and the
//! main copy rendered. A main copy rendered without the quiet ring marks its
//! quiet twin, which a later merged replay then skips.

use std::borrow::Cow;
use std::cmp::Ordering;

use parking_lot::lock_api::RawMutex;
use tracing::warn;

use crate::context::{Context, ContextKind};
use crate::error::{ConfigError, DecodeError};
use crate::format_spec::{Conversion, Count, Flags, FormatWalker, Segment, Specifier};
use crate::level_registry::LEVEL_NAMES;
use crate::output_sink::{bounded_len, OutputSink};
use crate::record_encoder::until_nul;
use crate::recorder::{Engine, Recorder};
use crate::ring_store::RingStore;
use crate::string_table::StringTable;
use crate::wire::{
    get_uint, read_prefix, sign_extend, RecordKind, RecordLayout, DATA_FLAG_TRUNCATED, TAG_CHAR,
    TAG_CUT, TAG_DATA_INLINE, TAG_DATA_TABLE, TAG_INT, TAG_PTR, TAG_STR_INLINE, TAG_STR_NULL,
    TAG_STR_TABLE,
};

/// Written where an argument stream was cut short.
pub const CUT_MARKER: &str = "<cut>";

/// Bytes shown per hex row.
pub const HEX_ROW: usize = 16;

/// Widths and precisions above this are clamped.
const MAX_FIELD_WIDTH: usize = 512;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayOptions {
    /// Merge the quiet ring into the output.
    pub include_quiet: bool,
}

/// Counts from one replay run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub rendered: usize,
    /// Quiet copies dropped because the main ring held the same record.
    pub mirrored_discarded: usize,
    /// Records abandoned because they could not be decoded.
    pub corrupt: usize,
}

/// Header fields of a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader<'a> {
    pub global: u32,
    pub main: u32,
    pub timestamp: Option<u32>,
    pub kind: RecordKind,
    pub line: u16,
    pub context: Option<Context>,
    pub file: &'a [u8],
    pub format: &'a [u8],
    /// Argument stream or data payload.
    pub payload: &'a [u8],
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn at_cut(&self) -> bool {
        self.peek() == Some(TAG_CUT)
    }

    fn rest(&self) -> &'a [u8] {
        let bytes = self.bytes;
        &bytes[self.pos.min(bytes.len())..]
    }

    fn byte(&mut self, field: &'static str) -> Result<u8, DecodeError> {
        let b = self.peek().ok_or(DecodeError::Truncated(field))?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], DecodeError> {
        let bytes = self.bytes;
        let slice = bytes
            .get(self.pos..self.pos + n)
            .ok_or(DecodeError::Truncated(field))?;
        self.pos += n;
        Ok(slice)
    }

    fn uint(&mut self, n: usize, field: &'static str) -> Result<u64, DecodeError> {
        self.take(n, field).map(get_uint)
    }

    /// Bytes up to the next NUL, which is consumed.
    fn cstr(&mut self, field: &'static str) -> Result<&'a [u8], DecodeError> {
        let rest = self.rest();
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(DecodeError::Truncated(field))?;
        self.pos += end + 1;
        Ok(&rest[..end])
    }

    /// A tagged integer: `base_tag + n` followed by `n` bytes.
    fn tagged(&mut self, base_tag: u8, field: &'static str) -> Result<(u64, usize), DecodeError> {
        let tag = self.byte(field)?;
        let n = tag.wrapping_sub(base_tag) as usize;
        if n > 8 {
            return Err(DecodeError::UnexpectedTag { tag, field });
        }
        Ok((self.uint(n, field)?, n))
    }
}

/// Width, precision and flags of one conversion after `*` values are read.
#[derive(Debug, Clone, Copy, Default)]
struct Field {
    flags: Flags,
    width: usize,
    precision: Option<usize>,
}

impl Field {
    fn pad<S: OutputSink + ?Sized>(&self, sink: &mut S, shown: usize, body: impl FnOnce(&mut S)) {
        let pad = self.width.saturating_sub(shown);
        if !self.flags.left {
            sink.write_repeat(" ", pad);
        }
        body(&mut *sink);
        if self.flags.left {
            sink.write_repeat(" ", pad);
        }
    }

    fn text<S: OutputSink + ?Sized>(&self, sink: &mut S, text: &str) {
        self.pad(sink, text.len(), |s| s.write_str(text));
    }
}

/// Decodes stored records and renders them through an [`OutputSink`].
pub struct RecordDecoder<'t> {
    layout: RecordLayout,
    table: &'t StringTable,
}

impl<'t> RecordDecoder<'t> {
    pub fn new(layout: RecordLayout, table: &'t StringTable) -> Self {
        Self { layout, table }
    }

    pub fn decode_header<'a>(&self, record: &'a [u8]) -> Result<RecordHeader<'a>, DecodeError> {
        let (total, prefix) = read_prefix(record).ok_or(DecodeError::Truncated("prefix"))?;
        let body = record
            .get(prefix..total)
            .ok_or(DecodeError::Truncated("prefix"))?;
        let mut r = Reader::new(body);
        let w = self.layout.counter.bytes();
        let global = r.uint(w, "global counter")? as u32;
        let main = r.uint(w, "main counter")? as u32;
        let timestamp = if self.layout.timestamps {
            Some(r.uint(4, "timestamp")? as u32)
        } else {
            None
        };
        let level = r.byte("level")?;
        let kind = RecordKind::from_byte(level).ok_or(DecodeError::UnknownLevel(level))?;
        let line = r.uint(2, "line")? as u16;
        let context = if self.layout.context {
            let id = r.byte("context id")?;
            let tag = r.byte("context kind")?;
            let kind = ContextKind::from_byte(tag).ok_or(DecodeError::UnexpectedTag {
                tag,
                field: "context kind",
            })?;
            Some(Context { id, kind })
        } else {
            None
        };
        let file = self.str_ref(&mut r, "file")?.unwrap_or_default();
        let format = self.str_ref(&mut r, "format")?.unwrap_or_default();
        Ok(RecordHeader {
            global,
            main,
            timestamp,
            kind,
            line,
            context,
            file: until_nul(file),
            format: until_nul(format),
            payload: r.rest(),
        })
    }

    /// Renders one record, newline included.
    pub fn render<S: OutputSink + ?Sized>(
        &self,
        record: &[u8],
        from_quiet: bool,
        sink: &mut S,
    ) -> Result<RecordKind, DecodeError> {
        let header = self.decode_header(record)?;
        render_prefix(&header, from_quiet, sink);
        let mut r = Reader::new(header.payload);
        match header.kind {
            RecordKind::Plain(_) | RecordKind::ContextSwitch => {
                self.render_format(header.format, &mut r, sink)?;
                sink.write_newlines(1);
            }
            RecordKind::Enter | RecordKind::Exit => {
                sink.write_str(if header.kind == RecordKind::Enter { "-> " } else { "<- " });
                sink.write_str(&String::from_utf8_lossy(header.format));
                sink.write_newlines(1);
            }
            RecordKind::Data(_) | RecordKind::Compare(_) => {
                sink.write_str(&String::from_utf8_lossy(header.format));
                self.render_data(header.kind, &mut r, sink)?;
            }
        }
        Ok(header.kind)
    }

    fn render_format<S: OutputSink + ?Sized>(
        &self,
        format: &[u8],
        r: &mut Reader<'_>,
        sink: &mut S,
    ) -> Result<(), DecodeError> {
        for segment in FormatWalker::new(format) {
            match segment {
                Segment::Literal(text) => sink.write_str(&String::from_utf8_lossy(text)),
                Segment::Stray => sink.write_str("%"),
                Segment::Spec(spec) if spec.conversion == Conversion::Percent => sink.write_str("%"),
                Segment::Spec(spec) => {
                    if !self.render_spec(&spec, r, sink)? {
                        sink.write_str(CUT_MARKER);
                        return Ok(());
                    }
                }
            }
        }
        // The last argument itself was shortened.
        if r.at_cut() {
            sink.write_str(CUT_MARKER);
        }
        Ok(())
    }

    /// Returns `false` when the stream was cut before this conversion.
    fn render_spec<S: OutputSink + ?Sized>(
        &self,
        spec: &Specifier,
        r: &mut Reader<'_>,
        sink: &mut S,
    ) -> Result<bool, DecodeError> {
        let mut field = Field {
            flags: spec.flags,
            ..Field::default()
        };
        match spec.width {
            Some(Count::Fixed(n)) => field.width = n as usize,
            Some(Count::Variadic) => {
                if r.at_cut() {
                    return Ok(false);
                }
                let v = read_count(r, "width")?;
                // A negative `*` width means left-justify.
                field.flags.left |= v < 0;
                field.width = v.unsigned_abs() as usize;
            }
            None => {}
        }
        match spec.precision {
            Some(Count::Fixed(n)) => field.precision = Some(n as usize),
            Some(Count::Variadic) => {
                if r.at_cut() {
                    return Ok(false);
                }
                let v = read_count(r, "precision")?;
                field.precision = (v >= 0).then_some(v as usize);
            }
            None => {}
        }
        field.width = field.width.min(MAX_FIELD_WIDTH);
        field.precision = field.precision.map(|p| p.min(MAX_FIELD_WIDTH));

        if spec.conversion == Conversion::Position {
            return Ok(true);
        }
        if r.at_cut() {
            return Ok(false);
        }
        match spec.conversion {
            Conversion::Char => {
                let tag = r.byte("char")?;
                if tag != TAG_CHAR {
                    return Err(DecodeError::UnexpectedTag { tag, field: "char" });
                }
                let byte = r.byte("char")?;
                // Widths count bytes; a lone non-ASCII byte is not valid text.
                let text = String::from_utf8_lossy(std::slice::from_ref(&byte));
                field.pad(sink, 1, |s| s.write_str(&text));
            }
            Conversion::Str => match self.str_ref(r, "string argument")? {
                Some(bytes) => {
                    let text = String::from_utf8_lossy(until_nul(bytes));
                    let limit = field.precision.unwrap_or(usize::MAX);
                    let shown = bounded_len(&text, limit, '\0');
                    field.pad(sink, shown, |s| s.write_bounded(&text, limit, '\0'));
                }
                None => field.text(sink, "(null)"),
            },
            Conversion::Pointer => {
                let (value, _) = r.tagged(TAG_PTR, "pointer")?;
                let text = match value {
                    0 => Cow::Borrowed("(nil)"),
                    v => Cow::Owned(format!("{v:#x}")),
                };
                field.text(sink, &text);
            }
            conversion => {
                let (raw, n) = r.tagged(TAG_INT, "integer")?;
                render_int(sink, conversion, field, raw, n);
            }
        }
        Ok(true)
    }

    fn render_data<S: OutputSink + ?Sized>(
        &self,
        kind: RecordKind,
        r: &mut Reader<'_>,
        sink: &mut S,
    ) -> Result<(), DecodeError> {
        if r.is_empty() || r.at_cut() {
            sink.write_str(" ");
            sink.write_str(CUT_MARKER);
            sink.write_newlines(1);
            return Ok(());
        }
        let flags = r.byte("data flags")?;
        if flags & DATA_FLAG_TRUNCATED != 0 {
            sink.write_str(" (truncated)");
        }
        sink.write_newlines(1);
        match kind {
            RecordKind::Compare(_) => {
                let expected = self.blob(r, "expected data")?;
                let actual = self.blob(r, "actual data")?;
                render_diff_rows(sink, expected, actual);
            }
            _ => {
                let data = self.blob(r, "data")?;
                render_hex_rows(sink, data);
            }
        }
        Ok(())
    }

    fn str_ref<'a>(&self, r: &mut Reader<'a>, field: &'static str) -> Result<Option<&'a [u8]>, DecodeError> {
        match r.byte(field)? {
            TAG_STR_TABLE => {
                let id = r.uint(self.layout.table_ref_bytes, field)? as u16;
                self.table
                    .resolve(id)
                    .map(Some)
                    .ok_or(DecodeError::UnknownTableEntry(id))
            }
            TAG_STR_INLINE => r.cstr(field).map(Some),
            TAG_STR_NULL => Ok(None),
            tag => Err(DecodeError::UnexpectedTag { tag, field }),
        }
    }

    fn blob<'a>(&self, r: &mut Reader<'a>, field: &'static str) -> Result<&'a [u8], DecodeError> {
        match r.byte(field)? {
            TAG_DATA_INLINE => {
                let len = r.uint(2, field)? as usize;
                r.take(len, field)
            }
            TAG_DATA_TABLE => {
                let id = r.uint(self.layout.table_ref_bytes, field)? as u16;
                let len = r.uint(2, field)? as usize;
                let bytes = self
                    .table
                    .resolve(id)
                    .ok_or(DecodeError::UnknownTableEntry(id))?;
                bytes.get(..len).ok_or(DecodeError::Truncated(field))
            }
            tag => Err(DecodeError::UnexpectedTag { tag, field }),
        }
    }
}

fn read_count(r: &mut Reader<'_>, field: &'static str) -> Result<i32, DecodeError> {
    let (raw, n) = r.tagged(TAG_INT, field)?;
    Ok(sign_extend(raw, n) as i32)
}

/// `00012  [     40213] T0 WARNING net.c:88: `
fn render_prefix<S: OutputSink + ?Sized>(header: &RecordHeader<'_>, from_quiet: bool, sink: &mut S) {
    sink.write_str(&format!("{:05}", header.main));
    sink.write_str(if from_quiet { "q " } else { "  " });
    if let Some(ts) = header.timestamp {
        sink.write_str(&format!("[{ts:>10}] "));
    }
    if let Some(ctx) = header.context {
        sink.write_str(&format!("{}{} ", ctx.kind.letter(), ctx.id));
    }
    sink.write_str(&format!("{:<7} ", kind_name(header.kind)));
    sink.write_str(&String::from_utf8_lossy(header.file));
    sink.write_str(&format!(":{}: ", header.line));
}

/// Display name of a record's level byte.
pub fn kind_name(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Plain(level) | RecordKind::Data(level) | RecordKind::Compare(level) => {
            LEVEL_NAMES.get(level as usize).copied().unwrap_or("?")
        }
        RecordKind::Enter => "ENTER",
        RecordKind::Exit => "EXIT",
        RecordKind::ContextSwitch => "SWITCH",
    }
}

/// C `printf` rendering of an integer stored as `n` significant bytes.
fn render_int<S: OutputSink + ?Sized>(sink: &mut S, conversion: Conversion, field: Field, raw: u64, n: usize) {
    let (negative, magnitude) = if conversion == Conversion::Signed {
        let v = sign_extend(raw, n);
        (v < 0, v.unsigned_abs())
    } else {
        (false, raw)
    };
    let mut digits = match conversion {
        Conversion::Octal => format!("{magnitude:o}"),
        Conversion::HexLower => format!("{magnitude:x}"),
        Conversion::HexUpper => format!("{magnitude:X}"),
        _ => magnitude.to_string(),
    };
    if field.precision == Some(0) && magnitude == 0 {
        digits.clear();
    }
    let flags = field.flags;
    let prefix = match conversion {
        Conversion::Signed if negative => "-",
        Conversion::Signed if flags.plus => "+",
        Conversion::Signed if flags.space => " ",
        Conversion::HexLower if flags.alt && magnitude != 0 => "0x",
        Conversion::HexUpper if flags.alt && magnitude != 0 => "0X",
        _ => "",
    };
    let mut zeros = field
        .precision
        .map_or(0, |p| p.saturating_sub(digits.len()));
    if conversion == Conversion::Octal && flags.alt && zeros == 0 && !digits.starts_with('0') {
        zeros = 1;
    }
    let mut pad = field
        .width
        .saturating_sub(prefix.len() + zeros + digits.len());
    if flags.zero && !flags.left && field.precision.is_none() {
        zeros += pad;
        pad = 0;
    }
    if !flags.left {
        sink.write_repeat(" ", pad);
    }
    sink.write_str(prefix);
    sink.write_repeat("0", zeros);
    sink.write_str(&digits);
    if flags.left {
        sink.write_repeat(" ", pad);
    }
}

fn printable(bytes: &[u8], keep: impl Fn(usize) -> bool) -> String {
    bytes
        .iter()
        .enumerate()
        .map(|(i, &b)| match keep(i) {
            false => ' ',
            true if b.is_ascii_graphic() || b == b' ' => b as char,
            true => '.',
        })
        .collect()
}

fn render_hex_row<S: OutputSink + ?Sized>(sink: &mut S, offset: usize, row: &[u8]) {
    sink.write_str(&format!("  {offset:04x}:"));
    for b in row {
        sink.write_str(&format!(" {b:02x}"));
    }
    sink.write_repeat("   ", HEX_ROW - row.len());
    sink.write_str("  |");
    sink.write_str(&printable(row, |_| true));
    sink.write_str("|");
    sink.write_newlines(1);
}

/// Classic hex dump: offset, sixteen bytes, printable column.
pub fn render_hex_rows<S: OutputSink + ?Sized>(sink: &mut S, data: &[u8]) {
    if data.is_empty() {
        sink.write_str("  (empty)");
        sink.write_newlines(1);
        return;
    }
    for (i, row) in data.chunks(HEX_ROW).enumerate() {
        render_hex_row(sink, i * HEX_ROW, row);
    }
}

/// Hex dump of `expected`, each row followed by a row showing only the
/// bytes of `actual` that differ (`--` where they match).
pub fn render_diff_rows<S: OutputSink + ?Sized>(sink: &mut S, expected: &[u8], actual: &[u8]) {
    let len = expected.len().min(actual.len());
    if len == 0 {
        sink.write_str("  (empty)");
        sink.write_newlines(1);
        return;
    }
    for (i, (a, b)) in expected[..len]
        .chunks(HEX_ROW)
        .zip(actual[..len].chunks(HEX_ROW))
        .enumerate()
    {
        render_hex_row(sink, i * HEX_ROW, a);
        sink.write_str("     ~:");
        for (x, y) in a.iter().zip(b) {
            if x == y {
                sink.write_str(" --");
            } else {
                sink.write_str(&format!(" {y:02x}"));
            }
        }
        sink.write_repeat("   ", HEX_ROW - a.len());
        sink.write_str("  |");
        sink.write_str(&printable(b, |j| a[j] != b[j]));
        sink.write_str("|");
        sink.write_newlines(1);
    }
}

/// Outcome of taking one record off a ring.
struct Taken {
    len: usize,
    from_quiet: bool,
    corrupt: bool,
}

/// Drops quiet records whose main copy has already been rendered.
fn skip_replayed(quiet: &mut RingStore) -> usize {
    let mut dropped = 0;
    while quiet.head_meta().is_some_and(|m| m.replayed) {
        match quiet.head_record_len() {
            Some(len) => quiet.remove(len),
            None => quiet.clear(),
        }
        dropped += 1;
    }
    dropped
}

/// Moves the oldest record (by sequence) into `scratch`. Also returns how
/// many quiet copies of main records were discarded on the way.
fn dequeue(engine: &mut Engine, include_quiet: bool, scratch: &mut [u8]) -> (usize, Option<Taken>) {
    let Engine { main, quiet, .. } = engine;
    let mut mirrors_dropped = 0;
    if include_quiet {
        if let Some(q) = quiet.as_mut() {
            mirrors_dropped += skip_replayed(q);
        }
    }
    let merged = quiet.as_mut().filter(|q| include_quiet && !q.is_empty());

    let (ring, from_quiet) = match merged {
        None if main.is_empty() => return (mirrors_dropped, None),
        None => (&mut *main, false),
        Some(q) if main.is_empty() => (q, true),
        Some(q) => match (main.head_meta(), q.head_meta()) {
            (Some(m), Some(qm)) => match qm.seq.cmp(&m.seq) {
                Ordering::Less => (q, true),
                Ordering::Equal => {
                    if let Some(len) = q.head_record_len() {
                        q.remove(len);
                    }
                    mirrors_dropped += 1;
                    (&mut *main, false)
                }
                Ordering::Greater => (&mut *main, false),
            },
            (None, _) => (&mut *main, false),
            (_, None) => (q, true),
        },
    };

    let seq = ring.head_meta().map(|m| m.seq);
    let taken = match ring.head_record_len() {
        Some(len) if len <= scratch.len() => {
            ring.peek_into(&mut scratch[..len]);
            ring.remove(len);
            Taken {
                len,
                from_quiet,
                corrupt: false,
            }
        }
        _ => {
            warn!(
                ring = if from_quiet { "quiet" } else { "main" },
                used = ring.used(),
                "undecodable record at ring head; discarding ring contents"
            );
            ring.clear();
            Taken {
                len: 0,
                from_quiet,
                corrupt: true,
            }
        }
    };

    // A mirrored record shown from main must not show up again when the
    // quiet ring is replayed later.
    if !from_quiet {
        if let (Some(seq), Some(q)) = (seq, quiet.as_mut()) {
            q.mark_replayed(seq);
        }
    }
    (mirrors_dropped, Some(taken))
}

/// Drains a recorder into a sink.
pub struct Replayer<'r, R: RawMutex = parking_lot::RawMutex> {
    recorder: &'r Recorder<R>,
    options: ReplayOptions,
}

impl<'r, R: RawMutex> Replayer<'r, R> {
    pub fn new(recorder: &'r Recorder<R>, options: ReplayOptions) -> Self {
        Self { recorder, options }
    }

    /// Renders the oldest record, if any. Returns `Ok(false)` once both rings
    /// are empty.
    ///
    /// # Errors
    ///
    /// [`ConfigError::ScratchTooSmall`] if `scratch` cannot hold the largest
    /// record the recorder may store.
    pub fn replay_next<S: OutputSink + ?Sized>(
        &self,
        sink: &mut S,
        scratch: &mut [u8],
        stats: &mut ReplayStats,
    ) -> Result<bool, ConfigError> {
        let Some((layout, table, config)) = self.recorder.decode_parts() else {
            return Ok(false);
        };
        if scratch.len() < config.min_scratch_len() {
            return Err(ConfigError::ScratchTooSmall(scratch.len(), config.min_scratch_len()));
        }
        let include_quiet = self.options.include_quiet;
        let Some((mirrors_dropped, taken)) = self
            .recorder
            .with_engine(|e| dequeue(e, include_quiet, scratch))
        else {
            return Ok(false);
        };
        stats.mirrored_discarded += mirrors_dropped;
        let Some(taken) = taken else {
            return Ok(false);
        };
        if taken.corrupt {
            stats.corrupt += 1;
            return Ok(true);
        }
        let decoder = RecordDecoder::new(layout, table);
        match decoder.render(&scratch[..taken.len], taken.from_quiet, sink) {
            Ok(_) => stats.rendered += 1,
            Err(err) => {
                sink.write_str(" <corrupt record>");
                sink.write_newlines(1);
                warn!(%err, "abandoned undecodable record");
                stats.corrupt += 1;
            }
        }
        Ok(true)
    }

    /// Renders every stored record, oldest first.
    pub fn replay<S: OutputSink + ?Sized>(&self, sink: &mut S, scratch: &mut [u8]) -> Result<ReplayStats, ConfigError> {
        let mut stats = ReplayStats::default();
        while self.replay_next(sink, scratch, &mut stats)? {}
        Ok(stats)
    }
}

impl<R: RawMutex> Recorder<R> {
    /// Drains the main ring (and the quiet ring, if `include_quiet`) into
    /// `sink`. See [`Replayer`].
    pub fn replay<S: OutputSink + ?Sized>(
        &self,
        sink: &mut S,
        scratch: &mut [u8],
        include_quiet: bool,
    ) -> Result<ReplayStats, ConfigError> {
        Replayer::new(self, ReplayOptions { include_quiet }).replay(sink, scratch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format_spec::parse_next;
    use crate::output_sink::StringSink;

    fn int(fmt: &str, raw: u64, n: usize) -> String {
        let spec = parse_next(fmt.as_bytes(), 0).unwrap();
        let field = Field {
            flags: spec.flags,
            width: match spec.width {
                Some(Count::Fixed(w)) => w as usize,
                _ => 0,
            },
            precision: match spec.precision {
                Some(Count::Fixed(p)) => Some(p as usize),
                _ => None,
            },
        };
        let mut sink = StringSink::new();
        render_int(&mut sink, spec.conversion, field, raw, n);
        sink.into_string()
    }

    #[test]
    fn test_integer_rendering_follows_printf() {
        assert_eq!(int("%d", 0xFE, 1), "-2");
        assert_eq!(int("%5d", 42, 1), "   42");
        assert_eq!(int("%-5d|", 42, 1), "42   ");
        assert_eq!(int("%05d", 0xFE, 1), "-0002");
        assert_eq!(int("%+d", 7, 1), "+7");
        assert_eq!(int("% d", 7, 1), " 7");
        assert_eq!(int("%.3d", 7, 1), "007");
        assert_eq!(int("%.0d", 0, 0), "");
        assert_eq!(int("%#x", 255, 1), "0xff");
        assert_eq!(int("%#X", 0, 0), "0");
        assert_eq!(int("%#o", 8, 1), "010");
        assert_eq!(int("%u", 0xFFFF_FFFF, 4), "4294967295");
        assert_eq!(int("%08.3x", 0xab, 1), "     0ab");
    }

    #[test]
    fn test_hex_rows() {
        let mut sink = StringSink::new();
        render_hex_rows(&mut sink, b"AB\x00");
        let expected = format!("  0000: 41 42 00{}  |AB.|\n", "   ".repeat(13));
        assert_eq!(sink.as_str(), expected);
    }

    #[test]
    fn test_diff_rows_mark_only_changes() {
        let a = [0u8; 4];
        let mut b = a;
        b[2] = 0x41;
        let mut sink = StringSink::new();
        render_diff_rows(&mut sink, &a, &b);
        let lines: Vec<_> = sink.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("     ~: -- -- 41 --"));
        assert!(lines[1].ends_with("|  A |"));
    }

    #[test]
    fn test_decoder_rejects_unknown_level() {
        let table = StringTable::new(4);
        let layout = crate::RecorderConfig {
            timestamps: false,
            ..crate::RecorderConfig::default()
        }
        .layout();
        let decoder = RecordDecoder::new(layout, &table);
        // prefix, two 2-byte counters, level 0x17
        let record = [6u8, 0, 0, 0, 0, 0x17];
        assert_eq!(
            decoder.decode_header(&record),
            Err(DecodeError::UnknownLevel(0x17))
        );
    }
}
