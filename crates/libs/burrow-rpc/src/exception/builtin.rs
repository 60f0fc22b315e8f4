use std::fmt;
use std::sync::Arc;

use super::{
    Exception, ExceptionDetails, ExceptionParts, Fault, FieldValue, ReplayError, ReplayException,
};

/// Assembly of the built-in error kinds; always loaded.
pub const CORE_ASSEMBLY: &str = "core";

const PARAM_NAME: &str = "param_name";

macro_rules! detail_builders {
    () => {
        pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
            self.details.origin = Some(origin.into());
            self
        }

        pub fn with_help_url(mut self, help_url: impl Into<String>) -> Self {
            self.details.help_url = Some(help_url.into());
            self
        }

        pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
            self.details.stack_trace = Some(stack_trace.into());
            self
        }

        pub fn with_inner(mut self, inner: impl Into<Fault>) -> Self {
            self.details.inner = Some(Arc::from(inner.into()));
            self
        }
    };
}

macro_rules! detail_accessors {
    ($type_name:expr) => {
        fn type_name(&self) -> &str {
            $type_name
        }

        fn assembly(&self) -> &str {
            CORE_ASSEMBLY
        }

        fn message(&self) -> String {
            self.message.clone()
        }

        fn origin(&self) -> Option<&str> {
            self.details.origin.as_deref()
        }

        fn stack_trace(&self) -> Option<&str> {
            self.details.stack_trace.as_deref()
        }

        fn remote_stack_trace(&self) -> Option<&str> {
            self.details.remote_stack_trace.as_deref()
        }

        fn remote_stack_index(&self) -> u32 {
            self.details.remote_stack_index
        }

        fn help_url(&self) -> Option<&str> {
            self.details.help_url.as_deref()
        }

        fn inner(&self) -> Option<&dyn Exception> {
            self.details.inner.as_deref()
        }
    };
}

macro_rules! core_exception {
    ($(#[$doc:meta])* $name:ident => $type_name:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Default)]
        pub struct $name {
            message: String,
            details: ExceptionDetails,
        }

        impl $name {
            pub fn new(message: impl Into<String>) -> Self {
                Self { message: message.into(), details: ExceptionDetails::here() }
            }

            detail_builders!();
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.message)
            }
        }

        impl std::error::Error for $name {}

        impl Exception for $name {
            detail_accessors!($type_name);
        }

        impl ReplayException for $name {
            const ASSEMBLY: &'static str = CORE_ASSEMBLY;
            const TYPE_NAME: &'static str = $type_name;

            fn replay(parts: &ExceptionParts) -> Result<Self, ReplayError> {
                Ok(Self {
                    message: parts.message.clone().unwrap_or_default(),
                    details: ExceptionDetails::from_parts(parts),
                })
            }
        }
    };
}

macro_rules! argument_exception {
    ($(#[$doc:meta])* $name:ident => $type_name:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Default)]
        pub struct $name {
            message: String,
            param_name: Option<String>,
            details: ExceptionDetails,
        }

        impl $name {
            pub fn with_param_name(mut self, param_name: impl Into<String>) -> Self {
                self.param_name = Some(param_name.into());
                self
            }

            pub fn param_name(&self) -> Option<&str> {
                self.param_name.as_deref()
            }

            detail_builders!();
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.message)
            }
        }

        impl std::error::Error for $name {}

        impl Exception for $name {
            detail_accessors!($type_name);

            fn fields(&self) -> Vec<(String, FieldValue)> {
                self.param_name
                    .iter()
                    .map(|name| (PARAM_NAME.to_string(), FieldValue::String(name.clone())))
                    .collect()
            }
        }

        impl ReplayException for $name {
            const ASSEMBLY: &'static str = CORE_ASSEMBLY;
            const TYPE_NAME: &'static str = $type_name;

            fn replay(parts: &ExceptionParts) -> Result<Self, ReplayError> {
                Ok(Self {
                    message: parts.message.clone().unwrap_or_default(),
                    param_name: parts.string_field(PARAM_NAME)?,
                    details: ExceptionDetails::from_parts(parts),
                })
            }
        }
    };
}

core_exception! {
    /// The generic error; also what reconstruction falls back to.
    ApplicationError => "core.ApplicationError"
}

core_exception! {
    InvalidOperationError => "core.InvalidOperationError"
}

core_exception! {
    /// Malformed input on the wire, including multi-part chunks that break
    /// the transfer invariants.
    InvalidDataError => "core.InvalidDataError"
}

core_exception! {
    NotSupportedError => "core.NotSupportedError"
}

core_exception! {
    KeyNotFoundError => "core.KeyNotFoundError"
}

core_exception! {
    /// No handler is registered for the requested method.
    MissingMethodError => "core.MissingMethodError"
}

core_exception! {
    UnauthorizedAccessError => "core.UnauthorizedAccessError"
}

argument_exception! {
    ArgumentError => "core.ArgumentError"
}

argument_exception! {
    ArgumentNullError => "core.ArgumentNullError"
}

impl ArgumentError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), param_name: None, details: ExceptionDetails::here() }
    }
}

impl ArgumentNullError {
    /// `param_name` was required but missing.
    pub fn new(param_name: impl Into<String>) -> Self {
        let param_name = param_name.into();
        Self {
            message: format!("value cannot be null: {param_name}"),
            param_name: Some(param_name),
            details: ExceptionDetails::here(),
        }
    }
}

impl MissingMethodError {
    pub fn for_method(method: &str) -> Self {
        Self::new(format!("no handler is registered for method {method:?}"))
    }
}
