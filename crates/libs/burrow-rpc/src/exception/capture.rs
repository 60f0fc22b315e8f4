use burrow_wire::{DetailLevel, ExceptionInfo};

use super::Exception;

/// Captures `error` at `level`.
///
/// `NoDetails` yields an empty info, `TypeOnly` the assembly and type name,
/// `MessageOnly` adds the message, and `FullDetails` records everything
/// including registered fields and the inner error chain.
pub fn capture(error: &dyn Exception, level: DetailLevel) -> ExceptionInfo {
    if level == DetailLevel::NoDetails {
        return ExceptionInfo::default();
    }

    let mut info = ExceptionInfo {
        assembly_name: Some(error.assembly().to_string()),
        full_type_name: Some(error.type_name().to_string()),
        ..ExceptionInfo::default()
    };
    match level {
        DetailLevel::NoDetails | DetailLevel::TypeOnly => {}
        DetailLevel::MessageOnly => info.message = Some(error.message()),
        DetailLevel::FullDetails => {
            info.message = Some(error.message());
            info.source = error.origin().map(str::to_owned);
            info.stack_trace = error.stack_trace().map(str::to_owned);
            info.remote_stack_trace = error.remote_stack_trace().map(str::to_owned);
            info.remote_stack_index = match error.remote_stack_index() {
                0 => None,
                index => Some(index),
            };
            info.help_url = error.help_url().map(str::to_owned);
            info.fields =
                error.fields().iter().map(|(member, value)| value.to_wire(member)).collect();
            info.inner = error.inner().map(|inner| Box::new(capture(inner, level)));
            info.has_full_details = true;
        }
    }
    info
}
