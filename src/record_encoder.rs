//! Turns a log call into the compact byte form stored in the rings.
//!
//! The encoder never fails a call. Space for the worst case is reserved up
//! front; if the argument stream still does not fit, whatever fits is kept
//! and a [`TAG_CUT`] marker ends the stream.

use crate::args::{Arg, LogBytes, LogStr};
use crate::context::Context;
use crate::format_spec::{Conversion, Count, FormatWalker, Segment, POINTER_BYTES};
use crate::string_table::StringTable;
use crate::wire::{
    byte_mask, put_uint, significant_bytes, RecordKind, RecordLayout, DATA_FLAG_TRUNCATED,
    TAG_CHAR, TAG_CUT, TAG_DATA_INLINE, TAG_DATA_TABLE, TAG_INT, TAG_PTR, TAG_STR_INLINE,
    TAG_STR_NULL, TAG_STR_TABLE,
};

/// Bytes a variadic width or precision is encoded with.
const COUNT_BYTES: usize = 4;

/// Write cursor over the body of one record.
///
/// One byte at the end is held back so a cut marker always fits.
pub struct RecordBuf<'a> {
    buf: &'a mut [u8],
    pos: usize,
    limit: usize,
}

impl<'a> RecordBuf<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        let limit = buf.len().saturating_sub(1);
        Self { buf, pos: 0, limit }
    }

    pub fn len(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos == 0
    }

    pub fn remaining(&self) -> usize {
        self.limit - self.pos
    }

    pub fn put(&mut self, byte: u8) -> bool {
        self.put_slice(&[byte])
    }

    pub fn put_slice(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() > self.remaining() {
            return false;
        }
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        true
    }

    pub fn put_uint(&mut self, value: u64, bytes: usize) -> bool {
        if bytes > self.remaining() {
            return false;
        }
        put_uint(&mut self.buf[self.pos..self.pos + bytes], value);
        self.pos += bytes;
        true
    }

    /// Ends the stream with a cut marker, using the held back byte if needed.
    pub fn cut(&mut self) {
        if self.pos < self.buf.len() {
            self.buf[self.pos] = TAG_CUT;
            self.pos += 1;
        }
    }

    fn patch(&mut self, at: usize, byte: u8) {
        if at < self.pos {
            self.buf[at] = byte;
        }
    }
}

/// Fields of a record header other than the counters, which the recorder
/// patches in once the record is admitted.
#[derive(Debug, Clone, Copy)]
pub struct Header<'a> {
    pub kind: RecordKind,
    pub line: u32,
    pub timestamp: u32,
    pub context: Context,
    pub file: LogStr<'a>,
    pub format: LogStr<'a>,
}

pub struct RecordEncoder<'t> {
    layout: RecordLayout,
    table: &'t StringTable,
    force_copy: bool,
}

impl<'t> RecordEncoder<'t> {
    pub fn new(layout: RecordLayout, table: &'t StringTable, force_copy: bool) -> Self {
        Self {
            layout,
            table,
            force_copy,
        }
    }

    /// Writes the header with zeroed counters.
    ///
    /// Returns the format bytes as stored, which may be a truncated prefix of
    /// the caller's format; the argument stream must be laid out against exactly
    /// these bytes. `None` means not even the fixed header fit.
    pub fn encode_header<'s>(&self, buf: &mut RecordBuf<'_>, header: &Header<'s>) -> Option<&'s [u8]> {
        let w = self.layout.counter.bytes();
        let mut ok = buf.put_uint(0, 2 * w);
        if self.layout.timestamps {
            ok &= buf.put_uint(header.timestamp as u64, 4);
        }
        ok &= buf.put(header.kind.to_byte());
        ok &= buf.put_uint(header.line.min(u16::MAX as u32) as u64, 2);
        if self.layout.context {
            ok &= buf.put(header.context.id);
            ok &= buf.put(header.context.kind as u8);
        }
        if !ok {
            return None;
        }
        // File names get at most a quarter of what is left so the format
        // keeps most of the budget.
        let file_budget = buf.remaining() / 4;
        self.encode_str_ref(buf, header.file, file_budget)?;
        let format_budget = buf.remaining();
        self.encode_str_ref(buf, header.format, format_budget)
    }

    /// Lays out one value per consuming specifier of `format`.
    ///
    /// Returns `false` if the stream had to be cut short.
    pub fn encode_args(&self, buf: &mut RecordBuf<'_>, format: &[u8], args: &[Arg<'_>]) -> bool {
        let mut args = args.iter().copied();
        for segment in FormatWalker::new(format) {
            let Segment::Spec(spec) = segment else {
                continue;
            };
            if spec.conversion == Conversion::Percent {
                continue;
            }
            for count in [spec.width, spec.precision] {
                if count == Some(Count::Variadic) {
                    let value = args.next().map_or(0, |a| a.bits());
                    if !self.put_int(buf, TAG_INT, value, COUNT_BYTES, true) {
                        buf.cut();
                        return false;
                    }
                }
            }

            let arg = args.next();
            let complete = match spec.conversion {
                Conversion::Signed
                | Conversion::Unsigned
                | Conversion::Octal
                | Conversion::HexLower
                | Conversion::HexUpper => {
                    let signed = spec.conversion == Conversion::Signed;
                    let value = arg.map_or(0, |a| a.bits());
                    self.put_int(buf, TAG_INT, value, spec.length.bytes(), signed)
                }
                Conversion::Char => {
                    let byte = match arg {
                        Some(Arg::Char(c)) => c,
                        Some(Arg::Int(v)) => v as u8,
                        Some(Arg::Uint(v)) => v as u8,
                        _ => b'?',
                    };
                    buf.put_slice(&[TAG_CHAR, byte])
                }
                Conversion::Str => match arg {
                    Some(Arg::Str(s)) => self.put_str_arg(buf, s),
                    _ => buf.put(TAG_STR_NULL),
                },
                Conversion::Pointer => {
                    let value = arg.map_or(0, |a| a.bits());
                    self.put_int(buf, TAG_PTR, value, POINTER_BYTES, false)
                }
                // The pointer is consumed for bookkeeping only; nothing is
                // stored and nothing is written back at replay.
                Conversion::Position | Conversion::Percent => true,
            };
            if !complete {
                buf.cut();
                return false;
            }
        }
        true
    }

    /// Writes a data flags byte followed by one reference per blob.
    ///
    /// Several blobs are cut to a common length so a compare record lines
    /// up byte for byte. Returns `false` if any blob was shortened.
    pub fn encode_data(&self, buf: &mut RecordBuf<'_>, blobs: &[LogBytes<'_>], max_len: usize) -> bool {
        let flags_at = buf.len();
        if blobs.is_empty() || !buf.put(0) {
            return false;
        }
        let common = blobs.iter().map(LogBytes::len).min().unwrap_or(0);
        let per_blob = buf.remaining().saturating_sub(3 * blobs.len()) / blobs.len();
        let len = common.min(max_len).min(per_blob);

        let mut complete = blobs.iter().all(|b| b.len() == len);
        for blob in blobs {
            let stored = self.put_blob(buf, *blob, len);
            complete &= stored == Some(len);
            if stored.is_none() {
                break;
            }
        }
        if !complete {
            buf.patch(flags_at, DATA_FLAG_TRUNCATED);
        }
        complete
    }

    fn put_int(&self, buf: &mut RecordBuf<'_>, base_tag: u8, value: u64, class_bytes: usize, signed: bool) -> bool {
        let n = significant_bytes(value, class_bytes, signed);
        if 1 + n > buf.remaining() {
            return false;
        }
        buf.put(base_tag + n as u8) && buf.put_uint(value & byte_mask(n), n)
    }

    fn put_str_arg(&self, buf: &mut RecordBuf<'_>, s: LogStr<'_>) -> bool {
        let full = until_nul(s.as_bytes()).len();
        let budget = buf.remaining();
        match self.encode_str_ref(buf, s, budget) {
            Some(stored) => until_nul(stored).len() == full,
            None => false,
        }
    }

    /// Stores `s` either as a table reference or as a NUL terminated copy of
    /// at most `max_inline` bytes. Returns the bytes a reader will see.
    fn encode_str_ref<'s>(&self, buf: &mut RecordBuf<'_>, s: LogStr<'s>, max_inline: usize) -> Option<&'s [u8]> {
        let w = self.layout.table_ref_bytes;
        if !self.force_copy && buf.remaining() > w {
            if let Some(id) = s.static_bytes().and_then(|b| self.table.intern(b)) {
                buf.put(TAG_STR_TABLE);
                buf.put_uint(id as u64, w);
                return Some(s.as_bytes());
            }
        }

        if buf.remaining() < 2 {
            return None;
        }
        let bytes = until_nul(s.as_bytes());
        let room = max_inline.min(buf.remaining()).saturating_sub(2);
        let n = char_floor(bytes, bytes.len().min(room));
        buf.put(TAG_STR_INLINE);
        buf.put_slice(&bytes[..n]);
        buf.put(0);
        Some(&bytes[..n])
    }

    fn put_blob(&self, buf: &mut RecordBuf<'_>, blob: LogBytes<'_>, len: usize) -> Option<usize> {
        let w = self.layout.table_ref_bytes;
        if !self.force_copy && buf.remaining() >= 1 + w + 2 {
            let id = blob
                .static_bytes()
                .and_then(|b| b.get(..len))
                .and_then(|b| self.table.intern(b));
            if let Some(id) = id {
                buf.put(TAG_DATA_TABLE);
                buf.put_uint(id as u64, w);
                buf.put_uint(len as u64, 2);
                return Some(len);
            }
        }

        if buf.remaining() < 3 {
            return None;
        }
        let n = len.min(buf.remaining() - 3);
        buf.put(TAG_DATA_INLINE);
        buf.put_uint(n as u64, 2);
        buf.put_slice(&blob.as_bytes()[..n]);
        Some(n)
    }
}

/// The part of `bytes` before the first NUL.
pub fn until_nul(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    &bytes[..end]
}

/// Largest `m <= n` that does not split a UTF-8 sequence.
fn char_floor(bytes: &[u8], mut n: usize) -> usize {
    while n > 0 && n < bytes.len() && bytes[n] & 0xC0 == 0x80 {
        n -= 1;
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::CounterWidth;

    fn layout() -> RecordLayout {
        RecordLayout {
            counter: CounterWidth::Two,
            timestamps: false,
            context: false,
            table_ref_bytes: 1,
            max_record_len: 64,
        }
    }

    #[test]
    fn test_integers_use_minimal_width() {
        let table = StringTable::new(4);
        let enc = RecordEncoder::new(layout(), &table, false);
        let mut scratch = [0u8; 32];
        let mut buf = RecordBuf::new(&mut scratch);
        assert!(enc.encode_args(&mut buf, b"%d %d %hhu %x", &[
            Arg::Int(0),
            Arg::Int(-2),
            Arg::Uint(0x1FF),
            Arg::Uint(0x1234),
        ]));
        let len = buf.len();
        assert_eq!(
            &scratch[..len],
            &[TAG_INT, TAG_INT + 1, 0xFE, TAG_INT + 1, 0xFF, TAG_INT + 2, 0x12, 0x34]
        );
    }

    #[test]
    fn test_variadic_width_precedes_value() {
        let table = StringTable::new(4);
        let enc = RecordEncoder::new(layout(), &table, false);
        let mut scratch = [0u8; 32];
        let mut buf = RecordBuf::new(&mut scratch);
        assert!(enc.encode_args(&mut buf, b"[%*c]", &[Arg::Int(3), Arg::Char(b'z')]));
        let len = buf.len();
        assert_eq!(&scratch[..len], &[TAG_INT + 1, 3, TAG_CHAR, b'z']);
    }

    #[test]
    fn test_position_consumes_without_storing() {
        let table = StringTable::new(4);
        let enc = RecordEncoder::new(layout(), &table, false);
        let mut scratch = [0u8; 32];
        let mut buf = RecordBuf::new(&mut scratch);
        assert!(enc.encode_args(&mut buf, b"%n%d", &[Arg::Ptr(0x1000), Arg::Int(5)]));
        let len = buf.len();
        assert_eq!(&scratch[..len], &[TAG_INT + 1, 5]);
    }

    #[test]
    fn test_static_string_becomes_reference() {
        let table = StringTable::new(4);
        let enc = RecordEncoder::new(layout(), &table, false);
        let mut scratch = [0u8; 32];
        let mut buf = RecordBuf::new(&mut scratch);
        assert!(enc.encode_args(&mut buf, b"%s", &[Arg::static_str("boot")]));
        assert_eq!(&scratch[..2], &[TAG_STR_TABLE, 0]);
        assert_eq!(table.resolve(0), Some(&b"boot"[..]));
    }

    #[test]
    fn test_forced_copy_inlines_static_string() {
        let table = StringTable::new(4);
        let enc = RecordEncoder::new(layout(), &table, true);
        let mut scratch = [0u8; 32];
        let mut buf = RecordBuf::new(&mut scratch);
        assert!(enc.encode_args(&mut buf, b"%s", &[Arg::static_str("boot")]));
        assert_eq!(&scratch[..6], b"\x40boot\0");
        assert!(table.is_empty());
    }

    #[test]
    fn test_overflow_truncates_and_cuts() {
        let table = StringTable::new(4);
        let enc = RecordEncoder::new(layout(), &table, false);
        let mut scratch = [0u8; 8];
        let mut buf = RecordBuf::new(&mut scratch);
        let long = String::from("abcdefghijklmnop");
        assert!(!enc.encode_args(&mut buf, b"%s %d", &[Arg::from(&long), Arg::Int(1)]));
        let len = buf.len();
        assert_eq!(&scratch[..len], b"\x40abcde\0\x7F");
    }

    #[test]
    fn test_inline_copy_keeps_whole_characters() {
        assert_eq!(char_floor("aé".as_bytes(), 2), 1);
        assert_eq!(char_floor("aé".as_bytes(), 3), 3);
    }

    #[test]
    fn test_compare_blobs_share_length() {
        let table = StringTable::new(4);
        let enc = RecordEncoder::new(layout(), &table, true);
        let mut scratch = [0u8; 64];
        let mut buf = RecordBuf::new(&mut scratch);
        let a = [1u8, 2, 3, 4];
        let b = [1u8, 2, 9];
        assert!(!enc.encode_data(&mut buf, &[LogBytes::from(&a), LogBytes::from(&b)], 16));
        assert_eq!(scratch[0], DATA_FLAG_TRUNCATED);
        assert_eq!(&scratch[1..7], &[TAG_DATA_INLINE, 0, 3, 1, 2, 3]);
        assert_eq!(&scratch[7..13], &[TAG_DATA_INLINE, 0, 3, 1, 2, 9]);
    }
}
