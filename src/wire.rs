//! Bit-level layout of a stored record.
//!
//! Every record in a ring is a contiguous byte run:
//!
//! ```text
//! prefix(1|2) | global(w) | main(w) | [timestamp(4)] | level(1) | line(2)
//!             | [ctx id(1) | ctx kind(1)] | file ref | format ref | payload
//! ```
//!
//! * `prefix` holds the total record length including itself. Records shorter
//!   than 128 bytes use one byte; longer ones set bit 7 of the first byte and
//!   store a 15-bit big-endian length in two bytes.
//! * `w` is the counter width derived from the ring capacities (1, 2 or 4 bytes).
//! * All multi-byte fields are big-endian.
//!
//! Nothing in here touches a ring or a lock, so the whole layout can be
//! exercised on plain byte slices.

/// Largest record a two byte prefix can describe.
pub const MAX_RECORD_LEN: usize = 0x7FFF;

/// Largest record that still fits a one byte prefix.
pub const SHORT_RECORD_MAX: usize = 0x7F;

/// Room left in front of an encoded body for the length prefix.
pub const PREFIX_ROOM: usize = 2;

/// Highest plain severity level.
pub const LEVEL_MAX: u8 = 13;
pub const LEVEL_ENTER: u8 = 14;
pub const LEVEL_EXIT: u8 = 15;
pub const LEVEL_CONTEXT_SWITCH: u8 = 16;
/// Data blob records occupy `LEVEL_DATA_BASE + level`.
pub const LEVEL_DATA_BASE: u8 = 0x20;
/// Data compare records occupy `LEVEL_COMPARE_BASE + level`.
pub const LEVEL_COMPARE_BASE: u8 = 0x30;

// Argument stream tags.
pub const TAG_INT: u8 = 0x10; // + significant byte count (0..=8)
pub const TAG_PTR: u8 = 0x20; // + significant byte count (0..=8)
pub const TAG_CHAR: u8 = 0x30;
pub const TAG_STR_INLINE: u8 = 0x40;
pub const TAG_STR_TABLE: u8 = 0x41;
pub const TAG_STR_NULL: u8 = 0x42;
pub const TAG_DATA_INLINE: u8 = 0x60;
pub const TAG_DATA_TABLE: u8 = 0x61;
/// Marks the point where the encoder ran out of record budget.
pub const TAG_CUT: u8 = 0x7F;

/// Bit in the data flags byte set when a blob had to be shortened.
pub const DATA_FLAG_TRUNCATED: u8 = 0x01;

/// What a record header's level byte says about the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Plain(u8),
    Enter,
    Exit,
    ContextSwitch,
    Data(u8),
    Compare(u8),
}

impl RecordKind {
    pub fn to_byte(self) -> u8 {
        match self {
            RecordKind::Plain(level) => level.min(LEVEL_MAX),
            RecordKind::Enter => LEVEL_ENTER,
            RecordKind::Exit => LEVEL_EXIT,
            RecordKind::ContextSwitch => LEVEL_CONTEXT_SWITCH,
            RecordKind::Data(level) => LEVEL_DATA_BASE + level.min(LEVEL_MAX),
            RecordKind::Compare(level) => LEVEL_COMPARE_BASE + level.min(LEVEL_MAX),
        }
    }

    /// Returns `None` for bytes outside every level range.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0..=LEVEL_MAX => Some(RecordKind::Plain(byte)),
            LEVEL_ENTER => Some(RecordKind::Enter),
            LEVEL_EXIT => Some(RecordKind::Exit),
            LEVEL_CONTEXT_SWITCH => Some(RecordKind::ContextSwitch),
            b if (LEVEL_DATA_BASE..=LEVEL_DATA_BASE + LEVEL_MAX).contains(&b) => {
                Some(RecordKind::Data(b - LEVEL_DATA_BASE))
            }
            b if (LEVEL_COMPARE_BASE..=LEVEL_COMPARE_BASE + LEVEL_MAX).contains(&b) => {
                Some(RecordKind::Compare(b - LEVEL_COMPARE_BASE))
            }
            _ => None,
        }
    }
}

/// Width of the global and main counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterWidth {
    One,
    Two,
    Four,
}

impl CounterWidth {
    /// Picks the narrowest width for rings holding `total_ring_bytes`
    /// together. Stored counters only number records for display; the replay
    /// merge orders by the full sequence each ring keeps.
    pub fn for_capacity(total_ring_bytes: usize) -> Self {
        if total_ring_bytes < 0x80 {
            CounterWidth::One
        } else if total_ring_bytes < 0x8000 {
            CounterWidth::Two
        } else {
            CounterWidth::Four
        }
    }

    pub const fn bytes(self) -> usize {
        match self {
            CounterWidth::One => 1,
            CounterWidth::Two => 2,
            CounterWidth::Four => 4,
        }
    }

    pub const fn mask(self) -> u32 {
        match self {
            CounterWidth::One => 0xFF,
            CounterWidth::Two => 0xFFFF,
            CounterWidth::Four => 0xFFFF_FFFF,
        }
    }

    /// Next counter value, wrapping at the configured width.
    pub const fn advance(self, value: u32) -> u32 {
        value.wrapping_add(1) & self.mask()
    }
}

/// Field presence and widths shared by the encoder and the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLayout {
    pub counter: CounterWidth,
    pub timestamps: bool,
    pub context: bool,
    /// Bytes used for a string table reference (1 or 2).
    pub table_ref_bytes: usize,
    /// Upper bound on a whole record, prefix included.
    pub max_record_len: usize,
}

impl RecordLayout {
    /// Length of the fixed part of the header that follows the prefix.
    pub const fn fixed_header_len(&self) -> usize {
        let mut len = 2 * self.counter.bytes() + 1 + 2;
        if self.timestamps {
            len += 4;
        }
        if self.context {
            len += 2;
        }
        len
    }

    /// Shortest record this layout can produce: one byte of prefix, the
    /// fixed header and two minimal string references.
    pub const fn min_record_len(&self) -> usize {
        1 + self.fixed_header_len() + 2 + 2
    }

    /// Prefix width a record of `max_record_len` may need.
    pub const fn max_prefix_len(&self) -> usize {
        if self.max_record_len > SHORT_RECORD_MAX {
            2
        } else {
            1
        }
    }

    /// Bytes available to the body of a record.
    pub const fn max_body_len(&self) -> usize {
        self.max_record_len - self.max_prefix_len()
    }

    /// Writes both counters at the start of an encoded body.
    pub fn patch_counters(&self, body: &mut [u8], global: u32, main: u32) {
        let w = self.counter.bytes();
        put_uint(&mut body[..w], global as u64);
        put_uint(&mut body[w..2 * w], main as u64);
    }
}

/// Bytes of prefix needed for a body of `body_len` bytes.
pub const fn prefix_len_for_body(body_len: usize) -> usize {
    if body_len + 1 <= SHORT_RECORD_MAX {
        1
    } else {
        2
    }
}

/// Places the length prefix directly in front of a body that starts at
/// `PREFIX_ROOM` within `buf`. Returns the range of the finished record.
pub fn finish_record(buf: &mut [u8], body_len: usize) -> std::ops::Range<usize> {
    let prefix = prefix_len_for_body(body_len);
    let total = body_len + prefix;
    let start = PREFIX_ROOM - prefix;
    if prefix == 1 {
        buf[start] = total as u8;
    } else {
        buf[start] = 0x80 | ((total >> 8) as u8 & 0x7F);
        buf[start + 1] = total as u8;
    }
    start..PREFIX_ROOM + body_len
}

/// Decodes a length prefix, returning `(total_len, prefix_len)`.
///
/// Fails when too few bytes are available or the length could not describe
/// a record with a body.
pub fn read_prefix(head: &[u8]) -> Option<(usize, usize)> {
    let first = *head.first()?;
    let (total, prefix) = if first & 0x80 != 0 {
        let second = *head.get(1)?;
        ((((first & 0x7F) as usize) << 8) | second as usize, 2)
    } else {
        (first as usize, 1)
    };
    if total <= prefix {
        return None;
    }
    Some((total, prefix))
}

/// Big-endian store of the low `dst.len()` bytes of `value`.
pub fn put_uint(dst: &mut [u8], value: u64) {
    let n = dst.len();
    for (i, b) in dst.iter_mut().enumerate() {
        *b = (value >> (8 * (n - 1 - i))) as u8;
    }
}

/// Big-endian load of up to eight bytes.
pub fn get_uint(src: &[u8]) -> u64 {
    src.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

/// Mask keeping the low `bytes` bytes.
pub const fn byte_mask(bytes: usize) -> u64 {
    if bytes >= 8 {
        u64::MAX
    } else {
        (1u64 << (8 * bytes)) - 1
    }
}

/// Sign-extends the low `bytes` bytes of `value`.
pub const fn sign_extend(value: u64, bytes: usize) -> i64 {
    if bytes == 0 {
        return 0;
    }
    if bytes >= 8 {
        return value as i64;
    }
    let shift = 64 - 8 * bytes as u32;
    ((value << shift) as i64) >> shift
}

/// Smallest number of bytes that reproduce `value` once it is masked to
/// `class_bytes` and re-extended (sign or zero) back to that class.
pub fn significant_bytes(value: u64, class_bytes: usize, signed: bool) -> usize {
    let value = value & byte_mask(class_bytes);
    if value == 0 {
        return 0;
    }
    if signed {
        let wide = sign_extend(value, class_bytes);
        (1..=class_bytes)
            .find(|&n| sign_extend(value & byte_mask(n), n) == wide)
            .unwrap_or(class_bytes)
    } else {
        (64 - value.leading_zeros() as usize).div_ceil(8)
    }
}
