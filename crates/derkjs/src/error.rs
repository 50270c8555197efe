//! Error taxonomy for the virtual machine.
//!
//! Two layers exist side by side. Script-visible errors (`TypeError`,
//! `RangeError`, plain `Error`) are ordinary heap values that travel through
//! the throw/catch machinery as [`RunError::Throw`]. Runtime-envelope errors
//! ([`VmError`]) are not catchable from script: they unwind the whole run and
//! surface from the public API as `Err(VmError)`.

use std::fmt;

use strum::{Display, EnumString, IntoStaticStr};

use crate::value::Value;

/// Termination status of a run, reported one line per error on stderr.
///
/// `snake_case` serialization keeps the stderr text and the host-facing enum
/// in lockstep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum VmErrCode {
    /// Normal termination.
    Ok,
    /// Property read or write on `undefined` or `null`.
    BadPropertyAccess,
    /// Calling a non-callable, assigning to a non-lvalue, or a malformed
    /// operand where no coercion is defined.
    BadOperation,
    /// Allocation failed even after a collection cycle.
    BadHeapAlloc,
    /// `halt` opcode or host abort.
    VmAbort,
    /// A thrown script error propagated past the root frame.
    UncaughtError,
}

impl VmErrCode {
    /// Process exit code the CLI maps this status to.
    #[must_use]
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Ok => 0,
            _ => 1,
        }
    }
}

/// Source position attached to envelope errors when the program image carries
/// a location table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeLoc {
    /// Index into the image's source-string list.
    pub source: u32,
    /// Byte span within that source.
    pub start: u32,
    pub end: u32,
}

/// A fatal, uncatchable runtime error.
#[derive(Debug, Clone)]
pub struct VmError {
    code: VmErrCode,
    message: String,
    location: Option<CodeLoc>,
}

impl VmError {
    pub(crate) fn new(code: VmErrCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            location: None,
        }
    }

    pub(crate) fn bad_operation(message: impl Into<String>) -> Self {
        Self::new(VmErrCode::BadOperation, message)
    }

    pub(crate) fn bad_property_access(message: impl Into<String>) -> Self {
        Self::new(VmErrCode::BadPropertyAccess, message)
    }

    pub(crate) fn heap_exhausted(live: usize, cap: usize) -> Self {
        Self::new(
            VmErrCode::BadHeapAlloc,
            format!("heap exhausted after collection: {live} live objects, cap {cap}"),
        )
    }

    pub(crate) fn abort() -> Self {
        Self::new(VmErrCode::VmAbort, "execution halted")
    }

    pub(crate) fn uncaught(message: impl Into<String>) -> Self {
        Self::new(VmErrCode::UncaughtError, message)
    }

    pub(crate) fn with_location(mut self, location: CodeLoc) -> Self {
        self.location = Some(location);
        self
    }

    /// The taxonomy entry this error belongs to.
    #[must_use]
    pub fn code(&self) -> VmErrCode {
        self.code
    }

    /// Human-readable detail, e.g. the `message` slot of an uncaught `Error`.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Source position of the failing instruction, if the image carried one.
    #[must_use]
    pub fn location(&self) -> Option<CodeLoc> {
        self.location
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(loc) = self.location {
            write!(f, " (source {} @ {}..{})", loc.source, loc.start, loc.end)?;
        }
        Ok(())
    }
}

impl std::error::Error for VmError {}

/// Control-flow result used throughout the VM.
///
/// `Throw` carries the in-flight script error value toward the nearest
/// `catch`; `Fatal` aborts the run with an envelope error.
#[derive(Debug)]
pub(crate) enum RunError {
    Throw(Value),
    Fatal(VmError),
}

impl From<VmError> for RunError {
    fn from(err: VmError) -> Self {
        Self::Fatal(err)
    }
}

pub(crate) type RunResult<T> = Result<T, RunError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_snake_case() {
        assert_eq!(VmErrCode::BadPropertyAccess.to_string(), "bad_property_access");
        assert_eq!(VmErrCode::UncaughtError.to_string(), "uncaught_error");
        assert_eq!(VmErrCode::Ok.to_string(), "ok");
    }

    #[test]
    fn exit_codes() {
        assert_eq!(VmErrCode::Ok.exit_code(), 0);
        assert_eq!(VmErrCode::VmAbort.exit_code(), 1);
    }
}
