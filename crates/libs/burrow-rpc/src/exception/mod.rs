//! Exception marshaling: capturing handler failures into
//! [`ExceptionInfo`](burrow_wire::ExceptionInfo) and rebuilding typed errors
//! from it on the client.
//!
//! Error kinds that can cross the wire implement [`Exception`]. Kinds that
//! can also be rebuilt on the client implement [`ReplayException`] and are
//! registered in an [`ExceptionRegistry`] under the assembly they belong to.

mod assembly;
mod builtin;
mod capture;
mod registry;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use burrow_wire::{ExceptionField, FieldType};

pub use assembly::{AssemblyName, AssemblyNameError};
pub use builtin::{
    ApplicationError, ArgumentError, ArgumentNullError, InvalidDataError, InvalidOperationError,
    KeyNotFoundError, MissingMethodError, NotSupportedError, UnauthorizedAccessError,
    CORE_ASSEMBLY,
};
pub use capture::capture;
pub use registry::{reconstruct, AssemblyState, ExceptionRegistry, RemoteError};

/// A failed call as seen by handlers and filters.
pub type Fault = Box<dyn Exception>;

pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An error kind that can be captured and sent to a remote caller.
pub trait Exception: std::error::Error + AsAny + Send + Sync + 'static {
    /// Dotted or `::`-separated type name, unique within its assembly.
    fn type_name(&self) -> &str;

    /// Assembly identity, e.g. `"search, Version=1.0, PublicKeyToken=ab12"`.
    fn assembly(&self) -> &str;

    fn message(&self) -> String {
        self.to_string()
    }

    fn origin(&self) -> Option<&str> {
        None
    }

    fn stack_trace(&self) -> Option<&str> {
        None
    }

    fn remote_stack_trace(&self) -> Option<&str> {
        None
    }

    fn remote_stack_index(&self) -> u32 {
        0
    }

    fn help_url(&self) -> Option<&str> {
        None
    }

    /// The kind-specific fields registered for this error, in replay order.
    fn fields(&self) -> Vec<(String, FieldValue)> {
        Vec::new()
    }

    fn inner(&self) -> Option<&dyn Exception> {
        None
    }
}

impl dyn Exception {
    pub fn is<T: Exception>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Exception>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

impl<E: Exception> From<E> for Fault {
    fn from(error: E) -> Self {
        Box::new(error)
    }
}

/// A typed value of a registered exception field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Bytes(Vec<u8>),
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    /// Present but not representable on the wire.
    Untyped,
}

impl FieldValue {
    pub(crate) fn to_wire(&self, member: &str) -> ExceptionField {
        let (type_tag, value) = match self {
            FieldValue::String(value) => (FieldType::String, Some(value.clone())),
            FieldValue::Bytes(value) => (FieldType::Bytes, Some(BASE64_STANDARD.encode(value))),
            FieldValue::Bool(value) => (FieldType::Bool, Some(value.to_string())),
            FieldValue::Int(value) => (FieldType::Int, Some(value.to_string())),
            FieldValue::UInt(value) => (FieldType::UInt, Some(value.to_string())),
            FieldValue::Float(value) => (FieldType::Float, Some(value.to_string())),
            FieldValue::Untyped => (FieldType::Untyped, None),
        };
        ExceptionField { member: member.to_string(), type_tag, value }
    }

    pub(crate) fn from_wire(field: &ExceptionField) -> Result<Self, ReplayError> {
        let invalid = |reason: String| ReplayError::InvalidField {
            member: field.member.clone(),
            reason,
        };
        let Some(raw) = field.value.as_deref() else {
            return Ok(FieldValue::Untyped);
        };
        Ok(match field.type_tag {
            FieldType::String => FieldValue::String(raw.to_string()),
            FieldType::Bytes => FieldValue::Bytes(
                BASE64_STANDARD.decode(raw).map_err(|err| invalid(err.to_string()))?,
            ),
            FieldType::Bool => {
                FieldValue::Bool(raw.parse().map_err(|_| invalid(format!("not a bool: {raw}")))?)
            }
            FieldType::Int => {
                FieldValue::Int(raw.parse().map_err(|_| invalid(format!("not an int: {raw}")))?)
            }
            FieldType::UInt => {
                FieldValue::UInt(raw.parse().map_err(|_| invalid(format!("not a uint: {raw}")))?)
            }
            FieldType::Float => {
                FieldValue::Float(raw.parse().map_err(|_| invalid(format!("not a float: {raw}")))?)
            }
            FieldType::Untyped => FieldValue::Untyped,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplayError {
    #[error("missing field: {member}")]
    MissingField { member: String },

    #[error("invalid field {member}: {reason}")]
    InvalidField { member: String, reason: String },
}

/// Everything an error kind is rebuilt from on the client.
#[derive(Debug, Clone, Default)]
pub struct ExceptionParts {
    pub message: Option<String>,
    pub origin: Option<String>,
    pub stack_trace: Option<String>,
    pub remote_stack_trace: Option<String>,
    pub remote_stack_index: u32,
    pub help_url: Option<String>,
    pub fields: Vec<(String, FieldValue)>,
    pub inner: Option<Arc<dyn Exception>>,
}

impl ExceptionParts {
    pub fn message_only(message: Option<String>) -> Self {
        Self { message, ..Self::default() }
    }

    pub fn field(&self, member: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(name, _)| name == member).map(|(_, value)| value)
    }

    /// A string field; absent or untyped reads as `None`, any other type is
    /// an error.
    pub fn string_field(&self, member: &str) -> Result<Option<String>, ReplayError> {
        match self.field(member) {
            None | Some(FieldValue::Untyped) => Ok(None),
            Some(FieldValue::String(value)) => Ok(Some(value.clone())),
            Some(other) => Err(ReplayError::InvalidField {
                member: member.to_string(),
                reason: format!("expected string, found {other:?}"),
            }),
        }
    }
}

/// An error kind the client can rebuild from captured parts.
pub trait ReplayException: Exception + Sized {
    const ASSEMBLY: &'static str;
    const TYPE_NAME: &'static str;

    fn replay(parts: &ExceptionParts) -> Result<Self, ReplayError>;
}

/// Common detail fields shared by the built-in error kinds, reusable by
/// application kinds.
#[derive(Debug, Clone, Default)]
pub struct ExceptionDetails {
    pub origin: Option<String>,
    pub stack_trace: Option<String>,
    pub remote_stack_trace: Option<String>,
    pub remote_stack_index: u32,
    pub help_url: Option<String>,
    pub inner: Option<Arc<dyn Exception>>,
}

impl ExceptionDetails {
    /// Details for an error raised here; records a backtrace when
    /// `RUST_BACKTRACE` enables one.
    pub fn here() -> Self {
        let backtrace = std::backtrace::Backtrace::capture();
        let stack_trace = match backtrace.status() {
            std::backtrace::BacktraceStatus::Captured => Some(backtrace.to_string()),
            _ => None,
        };
        Self { stack_trace, ..Self::default() }
    }

    pub fn from_parts(parts: &ExceptionParts) -> Self {
        Self {
            origin: parts.origin.clone(),
            stack_trace: parts.stack_trace.clone(),
            remote_stack_trace: parts.remote_stack_trace.clone(),
            remote_stack_index: parts.remote_stack_index,
            help_url: parts.help_url.clone(),
            inner: parts.inner.clone(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(value) => f.write_str(value),
            FieldValue::Bytes(value) => f.write_str(&BASE64_STANDARD.encode(value)),
            FieldValue::Bool(value) => write!(f, "{value}"),
            FieldValue::Int(value) => write!(f, "{value}"),
            FieldValue::UInt(value) => write!(f, "{value}"),
            FieldValue::Float(value) => write!(f, "{value}"),
            FieldValue::Untyped => f.write_str("<untyped>"),
        }
    }
}
