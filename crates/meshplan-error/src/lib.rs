//! Error types shared across the meshplan crates.
//!
//! The error kinds mirror the semantic categories a scheduling run can fail
//! with: a bad schema declaration, an index outside its declared domain, a
//! missing key on a non-defaulting access path, an infeasible/unbounded LP,
//! an I/O failure on the persistence adapter, or a broken runtime invariant
//! (container underflow, weights not summing to one, ...).

use std::borrow::Cow;
use std::fmt::{self, Display, Formatter};
use std::ops::Deref;

#[cfg(feature = "backtrace")]
use std::backtrace::Backtrace;

pub type MeshResult<T> = Result<T, MeshError>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    SchemaViolation,
    IndexDomain,
    NoData,
    InfeasibleOrUnbounded,
    Io,
    InvariantBroken,
    Multiple,
    Context,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrString(Cow<'static, str>);

impl AsRef<str> for ErrString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for ErrString {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for ErrString {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<T: Into<Cow<'static, str>>> From<T> for ErrString {
    fn from(v: T) -> Self {
        Self(v.into())
    }
}

/// Exit codes match the external-interface contract: 0 success, 2 schema/data
/// validation, 3 LP infeasible, 4 I/O failure.
impl ErrorCode {
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorCode::SchemaViolation | ErrorCode::IndexDomain | ErrorCode::InvariantBroken => 2,
            ErrorCode::NoData => 2,
            ErrorCode::InfeasibleOrUnbounded => 3,
            ErrorCode::Io => 4,
            ErrorCode::Multiple | ErrorCode::Context => 2,
        }
    }
}

#[derive(Debug)]
pub enum MeshError {
    SchemaViolation {
        message: ErrString,
    },
    IndexDomain {
        message: ErrString,
    },
    NoData {
        message: ErrString,
    },
    InfeasibleOrUnbounded {
        message: ErrString,
    },
    Io {
        message: ErrString,
    },
    InvariantBroken {
        message: ErrString,
    },

    Multiple(MultiDisplay),

    Context {
        context: ErrorContext,
        source: Box<MeshError>,
        #[cfg(feature = "backtrace")]
        backtrace: Backtrace,
    },
}

impl MeshError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::SchemaViolation { .. } => ErrorCode::SchemaViolation,
            Self::IndexDomain { .. } => ErrorCode::IndexDomain,
            Self::NoData { .. } => ErrorCode::NoData,
            Self::InfeasibleOrUnbounded { .. } => ErrorCode::InfeasibleOrUnbounded,
            Self::Io { .. } => ErrorCode::Io,
            Self::InvariantBroken { .. } => ErrorCode::InvariantBroken,
            Self::Multiple(_) => ErrorCode::Multiple,
            Self::Context { .. } => ErrorCode::Context,
        }
    }

    /// Exit code for the CLI collaborator contract; unwraps through `Context`.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Context { source, .. } => source.exit_code(),
            other => other.code().exit_code(),
        }
    }

    pub fn with_context(self, msg: impl Into<String>) -> Self {
        MeshError::Context {
            context: ErrorContext::new(msg),
            source: Box::new(self),
            #[cfg(feature = "backtrace")]
            backtrace: Backtrace::capture(),
        }
    }
}

impl Display for MeshError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::SchemaViolation { message } => write!(f, "schema violation: {}", message),
            Self::IndexDomain { message } => write!(f, "index out of domain: {}", message),
            Self::NoData { message } => write!(f, "no data: {}", message),
            Self::InfeasibleOrUnbounded { message } => {
                write!(f, "LP infeasible or unbounded: {}", message)
            }
            Self::Io { message } => write!(f, "I/O error: {}", message),
            Self::InvariantBroken { message } => write!(f, "invariant broken: {}", message),
            Self::Multiple(m) => write!(f, "multiple errors:\n{}", m),
            Self::Context {
                context, source, ..
            } => write!(f, "{}\nCaused by: {}", context, source),
        }
    }
}

impl std::error::Error for MeshError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Context { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct ErrorContext {
    message: String,
}
impl ErrorContext {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}
impl Display for ErrorContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}
impl std::error::Error for ErrorContext {}

#[derive(Debug)]
pub struct MultiDisplay(Vec<MeshError>);
impl Display for MultiDisplay {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "[{}] {} (code: {:?})", i, e, e.code())?;
        }
        Ok(())
    }
}
impl From<Vec<MeshError>> for MultiDisplay {
    fn from(v: Vec<MeshError>) -> Self {
        Self(v)
    }
}

impl From<std::io::Error> for MeshError {
    fn from(source: std::io::Error) -> Self {
        MeshError::Io {
            message: source.to_string().into(),
        }
    }
}

pub trait ResultExt<T> {
    fn context(self, msg: impl Into<String>) -> MeshResult<T>;
    fn with_context<F: FnOnce() -> String>(self, f: F) -> MeshResult<T>;
}

impl<T, E: Into<MeshError>> ResultExt<T> for Result<T, E> {
    fn context(self, msg: impl Into<String>) -> MeshResult<T> {
        self.map_err(|e| e.into().with_context(msg))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> MeshResult<T> {
        self.map_err(|e| e.into().with_context(f()))
    }
}

pub trait IntoMeshError<T> {
    fn into_mesh_error(self) -> MeshResult<T>;
}
impl<T, E: Into<MeshError>> IntoMeshError<T> for Result<T, E> {
    fn into_mesh_error(self) -> MeshResult<T> {
        self.map_err(Into::into)
    }
}

#[doc(hidden)]
pub mod __private {
    #[inline]
    #[cold]
    #[must_use]
    pub fn must_use<E>(e: E) -> E {
        e
    }
}

#[macro_export]
macro_rules! mesh_err {
    (SchemaViolation: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::__private::must_use($crate::MeshError::SchemaViolation { message: format!($fmt, $($arg),*).into() })
    };
    (IndexDomain: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::__private::must_use($crate::MeshError::IndexDomain { message: format!($fmt, $($arg),*).into() })
    };
    (NoData: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::__private::must_use($crate::MeshError::NoData { message: format!($fmt, $($arg),*).into() })
    };
    (InfeasibleOrUnbounded: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::__private::must_use($crate::MeshError::InfeasibleOrUnbounded { message: format!($fmt, $($arg),*).into() })
    };
    (Io: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::__private::must_use($crate::MeshError::Io { message: format!($fmt, $($arg),*).into() })
    };
    (InvariantBroken: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::__private::must_use($crate::MeshError::InvariantBroken { message: format!($fmt, $($arg),*).into() })
    };
}

#[macro_export]
macro_rules! mesh_bail {
    ($($tt:tt)+) => { return Err($crate::mesh_err!($($tt)+)) };
}

#[macro_export]
macro_rules! ensure {
    ($cond:expr, $($tt:tt)+) => {
        if !$cond { $crate::mesh_bail!($($tt)+); }
    };
}
