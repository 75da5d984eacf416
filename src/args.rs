//! Typed argument lists for recorder calls.
//!
//! A log call hands the recorder an ordered slice of [`Arg`] values instead of
//! a C variadic list. The `record!` family of macros builds that slice with
//! `Arg::from`, so most call sites never name these types.

/// A string argument.
///
/// `Static` strings live for the whole program and can be recorded as a short
/// reference into the recorder's string table. `Borrowed` strings are copied
/// into the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStr<'a> {
    Static(&'static str),
    Borrowed(&'a str),
}

impl<'a> LogStr<'a> {
    pub fn as_bytes(&self) -> &'a [u8] {
        match *self {
            LogStr::Static(s) => s.as_bytes(),
            LogStr::Borrowed(s) => s.as_bytes(),
        }
    }

    pub fn static_bytes(&self) -> Option<&'static [u8]> {
        match *self {
            LogStr::Static(s) => Some(s.as_bytes()),
            LogStr::Borrowed(_) => None,
        }
    }
}

impl<'a> From<&'a str> for LogStr<'a> {
    fn from(s: &'a str) -> Self {
        LogStr::Borrowed(s)
    }
}

/// A byte blob for data records, with the same static/borrowed split as
/// [`LogStr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogBytes<'a> {
    Static(&'static [u8]),
    Borrowed(&'a [u8]),
}

impl<'a> LogBytes<'a> {
    pub fn as_bytes(&self) -> &'a [u8] {
        match *self {
            LogBytes::Static(b) => b,
            LogBytes::Borrowed(b) => b,
        }
    }

    pub fn static_bytes(&self) -> Option<&'static [u8]> {
        match *self {
            LogBytes::Static(b) => Some(b),
            LogBytes::Borrowed(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl<'a> From<&'a [u8]> for LogBytes<'a> {
    fn from(b: &'a [u8]) -> Self {
        LogBytes::Borrowed(b)
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for LogBytes<'a> {
    fn from(b: &'a [u8; N]) -> Self {
        LogBytes::Borrowed(b)
    }
}

/// One value of a log call's argument list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arg<'a> {
    Int(i64),
    Uint(u64),
    Char(u8),
    Str(LogStr<'a>),
    Ptr(usize),
}

impl<'a> Arg<'a> {
    /// Wraps a string that lives for the whole program.
    pub const fn static_str(s: &'static str) -> Self {
        Arg::Str(LogStr::Static(s))
    }

    /// Raw bits as an integer conversion would see them.
    pub fn bits(&self) -> u64 {
        match *self {
            Arg::Int(v) => v as u64,
            Arg::Uint(v) => v,
            Arg::Char(c) => c as u64,
            Arg::Str(s) => s.as_bytes().as_ptr() as usize as u64,
            Arg::Ptr(p) => p as u64,
        }
    }
}

macro_rules! arg_from {
    ($variant:ident, $wide:ty: $($t:ty),*) => {
        $(
            impl<'a> From<$t> for Arg<'a> {
                fn from(v: $t) -> Self {
                    Arg::$variant(v as $wide)
                }
            }
        )*
    };
}

arg_from!(Int, i64: i8, i16, i32, i64, isize);
arg_from!(Uint, u64: u8, u16, u32, u64, usize);

impl<'a> From<bool> for Arg<'a> {
    fn from(v: bool) -> Self {
        Arg::Uint(v as u64)
    }
}

impl<'a> From<char> for Arg<'a> {
    fn from(c: char) -> Self {
        Arg::Char(if c.is_ascii() { c as u8 } else { b'?' })
    }
}

impl<'a> From<&'a str> for Arg<'a> {
    fn from(s: &'a str) -> Self {
        Arg::Str(LogStr::Borrowed(s))
    }
}

impl<'a> From<&'a String> for Arg<'a> {
    fn from(s: &'a String) -> Self {
        Arg::Str(LogStr::Borrowed(s.as_str()))
    }
}

impl<'a> From<LogStr<'a>> for Arg<'a> {
    fn from(s: LogStr<'a>) -> Self {
        Arg::Str(s)
    }
}

/// `None` records as a null string.
impl<'a> From<Option<&'a str>> for Arg<'a> {
    fn from(s: Option<&'a str>) -> Self {
        match s {
            Some(s) => Arg::Str(LogStr::Borrowed(s)),
            None => Arg::Ptr(0),
        }
    }
}

impl<'a, T> From<*const T> for Arg<'a> {
    fn from(p: *const T) -> Self {
        Arg::Ptr(p as usize)
    }
}

impl<'a, T> From<*mut T> for Arg<'a> {
    fn from(p: *mut T) -> Self {
        Arg::Ptr(p as usize)
    }
}

/// Where a log call was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    pub file: &'static str,
    pub line: u32,
}

impl CallSite {
    pub const fn new(file: &'static str, line: u32) -> Self {
        Self { file, line }
    }
}
