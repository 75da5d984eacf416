//! printf-style format string interpreter.
//!
//! The encoder walks a format string to decide how to lay out the argument
//! stream, and the replayer walks the stored copy of the same string to pull
//! the values back out. Both sides go through [`FormatWalker`], so for a given
//! string they see exactly the same sequence of [`Specifier`]s.
//!
//! Floating point conversions are not recognized. Like every other unknown
//! conversion they come out as [`Segment::Stray`]: the `%` is kept as literal
//! text and scanning resumes right after it.

/// Conversion flags (`-`, `+`, space, `#`, `0`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub left: bool,
    pub plus: bool,
    pub space: bool,
    pub alt: bool,
    pub zero: bool,
}

/// A width or precision, either written in the format or taken from the
/// argument list (`*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Count {
    Fixed(u32),
    Variadic,
}

/// Length modifier of an integer conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LengthClass {
    /// `hh`
    Char,
    /// `h`
    Short,
    #[default]
    Int,
    /// `l`
    Long,
    /// `ll` and `q`
    LongLong,
    /// `j`
    Max,
    /// `z`
    Size,
    /// `t`
    PtrDiff,
}

impl LengthClass {
    /// Width in bytes of an argument of this class. `l`, `z` and `t` follow
    /// the 32 bit targets this recorder is built for.
    pub const fn bytes(self) -> usize {
        match self {
            LengthClass::Char => 1,
            LengthClass::Short => 2,
            LengthClass::Int | LengthClass::Long | LengthClass::Size | LengthClass::PtrDiff => 4,
            LengthClass::LongLong | LengthClass::Max => 8,
        }
    }
}

/// Bytes of a pointer argument.
pub const POINTER_BYTES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    /// `d`, `i`
    Signed,
    /// `u`
    Unsigned,
    /// `o`
    Octal,
    /// `x`
    HexLower,
    /// `X`
    HexUpper,
    /// `c`
    Char,
    /// `s`
    Str,
    /// `p`
    Pointer,
    /// `n`: consumes a pointer, renders nothing.
    Position,
    /// `%%`
    Percent,
}

impl Conversion {
    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            Conversion::Signed
                | Conversion::Unsigned
                | Conversion::Octal
                | Conversion::HexLower
                | Conversion::HexUpper
        )
    }
}

/// One parsed conversion specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Specifier {
    pub flags: Flags,
    pub width: Option<Count>,
    pub precision: Option<Count>,
    pub length: LengthClass,
    pub conversion: Conversion,
    /// Bytes of format text covered, the leading `%` included.
    pub consumed_len: usize,
}

impl Specifier {
    /// Number of arguments this specifier pulls from the argument list,
    /// variadic width and precision included.
    pub fn argument_count(&self) -> usize {
        if self.conversion == Conversion::Percent {
            return 0;
        }
        1 + usize::from(self.width == Some(Count::Variadic))
            + usize::from(self.precision == Some(Count::Variadic))
    }
}

/// Parses the specification starting at `text[pos]`, which must be `%`.
///
/// Returns `None` when the bytes after `%` do not form a supported
/// specification.
pub fn parse_next(text: &[u8], pos: usize) -> Option<Specifier> {
    if text.get(pos) != Some(&b'%') {
        return None;
    }
    let mut i = pos + 1;
    if text.get(i) == Some(&b'%') {
        return Some(Specifier {
            flags: Flags::default(),
            width: None,
            precision: None,
            length: LengthClass::Int,
            conversion: Conversion::Percent,
            consumed_len: 2,
        });
    }

    let mut flags = Flags::default();
    while let Some(&c) = text.get(i) {
        match c {
            b'-' => flags.left = true,
            b'+' => flags.plus = true,
            b' ' => flags.space = true,
            b'#' => flags.alt = true,
            b'0' => flags.zero = true,
            _ => break,
        }
        i += 1;
    }

    let width = parse_count(text, &mut i);

    let precision = if text.get(i) == Some(&b'.') {
        i += 1;
        Some(parse_count(text, &mut i).unwrap_or(Count::Fixed(0)))
    } else {
        None
    };

    let length = match (text.get(i), text.get(i + 1)) {
        (Some(b'h'), Some(b'h')) => {
            i += 2;
            LengthClass::Char
        }
        (Some(b'h'), _) => {
            i += 1;
            LengthClass::Short
        }
        (Some(b'l'), Some(b'l')) => {
            i += 2;
            LengthClass::LongLong
        }
        (Some(b'l'), _) => {
            i += 1;
            LengthClass::Long
        }
        (Some(b'q'), _) => {
            i += 1;
            LengthClass::LongLong
        }
        (Some(b'j'), _) => {
            i += 1;
            LengthClass::Max
        }
        (Some(b'z'), _) => {
            i += 1;
            LengthClass::Size
        }
        (Some(b't'), _) => {
            i += 1;
            LengthClass::PtrDiff
        }
        _ => LengthClass::Int,
    };

    let conversion = match text.get(i)? {
        b'd' | b'i' => Conversion::Signed,
        b'u' => Conversion::Unsigned,
        b'o' => Conversion::Octal,
        b'x' => Conversion::HexLower,
        b'X' => Conversion::HexUpper,
        b'c' => Conversion::Char,
        b's' => Conversion::Str,
        b'p' => Conversion::Pointer,
        b'n' => Conversion::Position,
        _ => return None,
    };

    Some(Specifier {
        flags,
        width,
        precision,
        length,
        conversion,
        consumed_len: i + 1 - pos,
    })
}

fn parse_count(text: &[u8], i: &mut usize) -> Option<Count> {
    if text.get(*i) == Some(&b'*') {
        *i += 1;
        return Some(Count::Variadic);
    }
    let start = *i;
    let mut value: u32 = 0;
    while let Some(&c) = text.get(*i) {
        if !c.is_ascii_digit() {
            break;
        }
        value = value.saturating_mul(10).saturating_add((c - b'0') as u32);
        *i += 1;
    }
    (*i > start).then_some(Count::Fixed(value))
}

/// A piece of a format string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Text to copy out verbatim. Never contains `%`.
    Literal(&'a [u8]),
    Spec(Specifier),
    /// A `%` that did not start a valid specification.
    Stray,
}

/// Iterator over the segments of a format string.
#[derive(Debug, Clone)]
pub struct FormatWalker<'a> {
    text: &'a [u8],
    pos: usize,
}

impl<'a> FormatWalker<'a> {
    pub fn new(text: &'a [u8]) -> Self {
        // C strings end at the first NUL.
        let end = text.iter().position(|&b| b == 0).unwrap_or(text.len());
        Self {
            text: &text[..end],
            pos: 0,
        }
    }
}

impl<'a> Iterator for FormatWalker<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Segment<'a>> {
        let rest = self.text.get(self.pos..).filter(|r| !r.is_empty())?;
        if rest[0] != b'%' {
            let len = rest.iter().position(|&b| b == b'%').unwrap_or(rest.len());
            self.pos += len;
            return Some(Segment::Literal(&rest[..len]));
        }
        match parse_next(self.text, self.pos) {
            Some(spec) => {
                self.pos += spec.consumed_len;
                Some(Segment::Spec(spec))
            }
            None => {
                self.pos += 1;
                Some(Segment::Stray)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specs(fmt: &str) -> Vec<Specifier> {
        FormatWalker::new(fmt.as_bytes())
            .filter_map(|s| match s {
                Segment::Spec(spec) => Some(spec),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_full_specification() {
        let spec = parse_next(b"%-+#08.3lld", 0).unwrap();
        assert!(spec.flags.left && spec.flags.plus && spec.flags.alt && spec.flags.zero);
        assert!(!spec.flags.space);
        assert_eq!(spec.width, Some(Count::Fixed(8)));
        assert_eq!(spec.precision, Some(Count::Fixed(3)));
        assert_eq!(spec.length, LengthClass::LongLong);
        assert_eq!(spec.conversion, Conversion::Signed);
        assert_eq!(spec.consumed_len, 11);
    }

    #[test]
    fn test_variadic_width_and_precision() {
        let spec = parse_next(b"%*.*s", 0).unwrap();
        assert_eq!(spec.width, Some(Count::Variadic));
        assert_eq!(spec.precision, Some(Count::Variadic));
        assert_eq!(spec.argument_count(), 3);
    }

    #[test]
    fn test_bare_dot_means_zero_precision() {
        let spec = parse_next(b"%.x", 0).unwrap();
        assert_eq!(spec.precision, Some(Count::Fixed(0)));
    }

    #[test]
    fn test_length_classes() {
        let lengths: Vec<_> = specs("%hhd %hd %d %ld %lld %jd %zu %td %qu")
            .iter()
            .map(|s| s.length.bytes())
            .collect();
        assert_eq!(lengths, vec![1, 2, 4, 4, 8, 8, 4, 4, 8]);
    }

    #[test]
    fn test_percent_literal_takes_no_argument() {
        let spec = parse_next(b"%%", 0).unwrap();
        assert_eq!(spec.conversion, Conversion::Percent);
        assert_eq!(spec.argument_count(), 0);
    }

    #[test]
    fn test_float_is_a_stray_percent() {
        let segments: Vec<_> = FormatWalker::new(b"t=%f!").collect();
        assert_eq!(
            segments,
            vec![
                Segment::Literal(b"t="),
                Segment::Stray,
                Segment::Literal(b"f!"),
            ]
        );
    }

    #[test]
    fn test_trailing_percent_is_stray() {
        let segments: Vec<_> = FormatWalker::new(b"100%").collect();
        assert_eq!(segments, vec![Segment::Literal(b"100"), Segment::Stray]);
    }

    #[test]
    fn test_walker_stops_at_nul() {
        let segments: Vec<_> = FormatWalker::new(b"ab\0%d").collect();
        assert_eq!(segments, vec![Segment::Literal(b"ab")]);
    }

    #[test]
    fn test_walk_is_deterministic() {
        let fmt = b"a=%5d b=%-*s c=%p n=%n %% %y %hhx";
        let first: Vec<_> = FormatWalker::new(fmt).collect();
        let second: Vec<_> = FormatWalker::new(fmt).collect();
        assert_eq!(first, second);
    }
}
