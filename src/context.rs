//! Execution context stamped into record headers when context tracking is on.

/// What kind of execution context produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContextKind {
    Task = 0,
    Interrupt = 1,
    Exception = 2,
}

impl ContextKind {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(ContextKind::Task),
            1 => Some(ContextKind::Interrupt),
            2 => Some(ContextKind::Exception),
            _ => None,
        }
    }

    /// Single letter used when rendering.
    pub fn letter(self) -> char {
        match self {
            ContextKind::Task => 'T',
            ContextKind::Interrupt => 'I',
            ContextKind::Exception => 'X',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Context {
    pub id: u8,
    pub kind: ContextKind,
}

impl Context {
    pub const fn task(id: u8) -> Self {
        Self {
            id,
            kind: ContextKind::Task,
        }
    }

    pub const fn interrupt(id: u8) -> Self {
        Self {
            id,
            kind: ContextKind::Interrupt,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::task(0)
    }
}

/// Reports the context a log call runs in.
pub trait ContextSource: Send + Sync {
    fn current(&self) -> Context;
}

/// Every call comes from the same context.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedContext(pub Context);

impl ContextSource for FixedContext {
    fn current(&self) -> Context {
        self.0
    }
}

impl<F> ContextSource for F
where
    F: Fn() -> Context + Send + Sync,
{
    fn current(&self) -> Context {
        self()
    }
}
