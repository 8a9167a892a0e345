use std::fmt;

macro_rules! err {
    ($base:ident, $msg:literal) => {
        DexError::with_context($base, $msg.to_string())
    };
    ($base:ident, $fmtstr:literal, $($args:tt)*) => {
        DexError::with_context($base, format!($fmtstr, $($args)*))
    };
    ($msg:literal) => {
        DexError::new($msg)
    };
    ($fmtstr:literal, $($args:tt)*) => {
        DexError::new(&format!($fmtstr, $($args)*))
    };
}

macro_rules! fail {
    ($msg:literal) => {
        return Err(DexError::new($msg))
    };
    (($msg:literal), ($context:literal)) => {
        return Err(DexError::with_context(DexError::new($msg), $context.to_string()))
    };
    ($fmtstr:literal, $($args:tt)*) => {
        return Err(DexError::new(&format!($fmtstr, $($args)*)))
    };
    (($fmtstr:literal, $($args:tt)*), ($contextfmt:literal, $($contextargs:tt)*)) => {
        return Err(DexError::with_context(DexError::new(&format!($fmtstr, $($args)*)), format!($contextfmt, $($contextargs)*)))
    };
}

/// Broad classification of a [`DexError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind
{
    /// Malformed dex input, or a value that does not fit its binary encoding.
    Format,
    /// A type that cannot be placed in a register category for the requested operation.
    UnsupportedType,
    /// A structural invariant of the class model was violated.
    Structure,
    /// Mutation of a frozen object.
    Frozen,
    /// A container was notified about a class it does not hold.
    NotAMember,
    /// A lookup by name or index found nothing.
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DexError
{
    kind: ErrorKind,
    msg: String,
    contexts: Vec<String>,
}

impl DexError
{
    pub(crate) fn new(msg: &str) -> Self
    {
        DexError::of(ErrorKind::Format, msg)
    }

    pub(crate) fn of(kind: ErrorKind, msg: impl Into<String>) -> Self
    {
        DexError {
            kind,
            msg: msg.into(),
            contexts: Vec::new(),
        }
    }

    pub(crate) fn unsupported_type(msg: impl Into<String>) -> Self
    {
        DexError::of(ErrorKind::UnsupportedType, msg)
    }

    pub(crate) fn structure(msg: impl Into<String>) -> Self
    {
        DexError::of(ErrorKind::Structure, msg)
    }

    pub(crate) fn frozen(what: impl fmt::Display) -> Self
    {
        DexError::of(ErrorKind::Frozen, format!("object is frozen: {}", what))
    }

    pub(crate) fn not_found(msg: impl Into<String>) -> Self
    {
        DexError::of(ErrorKind::NotFound, msg)
    }

    pub(crate) fn with_context(base: DexError, context: String) -> Self
    {
        let mut contexts = base.contexts;
        contexts.push(context);
        DexError { kind: base.kind, msg: base.msg, contexts }
    }

    pub fn kind(&self) -> ErrorKind
    {
        self.kind
    }

    pub fn message(&self) -> &str
    {
        &self.msg
    }
}

impl fmt::Display for DexError
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.msg)?;
        let mut connector = " for ";
        for context in &self.contexts
        {
            write!(f, "{}{}", connector, context)?;
            connector = " of ";
        }
        Ok(())
    }
}

impl std::error::Error for DexError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_chains_contexts() {
        let e = DexError::new("bad opcode 0x3e");
        let e = err!(e, "method {}", "run");
        let e = err!(e, "class {}", "a.B");
        assert_eq!(e.to_string(), "bad opcode 0x3e for method run of class a.B");
        assert_eq!(e.kind(), ErrorKind::Format);
    }

    #[test]
    fn kind_survives_context() {
        let e = DexError::frozen("Lfoo/Bar;");
        let e = DexError::with_context(e, "rename".to_string());
        assert_eq!(e.kind(), ErrorKind::Frozen);
        assert_eq!(e.message(), "object is frozen: Lfoo/Bar;");
    }
}
