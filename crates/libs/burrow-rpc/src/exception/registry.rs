use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use burrow_wire::{ExceptionInfo, TypeResolution};

use super::assembly::{AssemblyName, AssemblyNameError};
use super::builtin::{
    ApplicationError, ArgumentError, ArgumentNullError, InvalidDataError, InvalidOperationError,
    KeyNotFoundError, MissingMethodError, NotSupportedError, UnauthorizedAccessError,
    CORE_ASSEMBLY,
};
use super::{Exception, ExceptionParts, Fault, FieldValue, ReplayError, ReplayException};

type ReplayFn = fn(&ExceptionParts) -> Result<Fault, ReplayError>;

fn replay_boxed<T: ReplayException>(parts: &ExceptionParts) -> Result<Fault, ReplayError> {
    T::replay(parts).map(|error| Box::new(error) as Fault)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyState {
    Loaded,
    /// Known but only usable once loaded, which the looser resolution
    /// policies may do on demand.
    Unloaded,
}

struct AssemblyEntry {
    public_key_token: Option<Vec<u8>>,
    loaded: bool,
    types: HashMap<String, ReplayFn>,
}

impl AssemblyEntry {
    fn new(loaded: bool, public_key_token: Option<Vec<u8>>) -> Self {
        Self { public_key_token, loaded, types: HashMap::new() }
    }
}

/// Maps (assembly, type name) to the constructor the client may rebuild a
/// remote error with.
pub struct ExceptionRegistry {
    assemblies: RwLock<HashMap<String, AssemblyEntry>>,
}

impl Default for ExceptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExceptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let assemblies = self.assemblies.read().expect("exception registry rwlock poisoned");
        let mut names: Vec<_> = assemblies.keys().collect();
        names.sort();
        f.debug_struct("ExceptionRegistry").field("assemblies", &names).finish()
    }
}

impl ExceptionRegistry {
    /// A registry holding the loaded core assembly with every built-in kind.
    pub fn new() -> Self {
        let registry = Self { assemblies: RwLock::new(HashMap::new()) };
        registry.insert_type::<ApplicationError>(CORE_ASSEMBLY, None);
        registry.insert_type::<ArgumentError>(CORE_ASSEMBLY, None);
        registry.insert_type::<ArgumentNullError>(CORE_ASSEMBLY, None);
        registry.insert_type::<InvalidOperationError>(CORE_ASSEMBLY, None);
        registry.insert_type::<InvalidDataError>(CORE_ASSEMBLY, None);
        registry.insert_type::<NotSupportedError>(CORE_ASSEMBLY, None);
        registry.insert_type::<KeyNotFoundError>(CORE_ASSEMBLY, None);
        registry.insert_type::<MissingMethodError>(CORE_ASSEMBLY, None);
        registry.insert_type::<UnauthorizedAccessError>(CORE_ASSEMBLY, None);
        registry
    }

    /// Declares an assembly, or updates the state and token of a known one.
    pub fn register_assembly(
        &self,
        name: &str,
        state: AssemblyState,
        public_key_token: Option<&[u8]>,
    ) -> Result<(), AssemblyNameError> {
        let parsed = AssemblyName::parse(name)?;
        let key = parsed.key();
        let token = public_key_token.map(<[u8]>::to_vec).or(parsed.public_key_token);
        let loaded = state == AssemblyState::Loaded;
        let mut assemblies = self.assemblies.write().expect("exception registry rwlock poisoned");
        let entry = assemblies
            .entry(key)
            .or_insert_with(|| AssemblyEntry::new(loaded, token.clone()));
        entry.loaded = loaded;
        entry.public_key_token = token;
        Ok(())
    }

    /// Registers `T` under its own assembly. An assembly not declared
    /// beforehand is added as loaded.
    pub fn register<T: ReplayException>(&self) -> Result<(), AssemblyNameError> {
        let parsed = AssemblyName::parse(T::ASSEMBLY)?;
        self.insert_type::<T>(&parsed.key(), parsed.public_key_token);
        Ok(())
    }

    fn insert_type<T: ReplayException>(&self, key: &str, token: Option<Vec<u8>>) {
        let mut assemblies = self.assemblies.write().expect("exception registry rwlock poisoned");
        assemblies
            .entry(key.to_string())
            .or_insert_with(|| AssemblyEntry::new(true, token))
            .types
            .insert(T::TYPE_NAME.to_string(), replay_boxed::<T>);
    }

    /// Marks a registered assembly loaded; `false` if it is unknown.
    pub fn load(&self, name: &str) -> bool {
        let key = name.to_ascii_lowercase();
        let mut assemblies = self.assemblies.write().expect("exception registry rwlock poisoned");
        match assemblies.get_mut(&key) {
            Some(entry) => {
                if !entry.loaded {
                    log::debug!("exception registry: loading assembly {name}");
                }
                entry.loaded = true;
                true
            }
            None => false,
        }
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        let key = name.to_ascii_lowercase();
        self.assemblies
            .read()
            .expect("exception registry rwlock poisoned")
            .get(&key)
            .is_some_and(|entry| entry.loaded)
    }

    /// The constructor `policy` allows for the type `info` names, if any.
    fn resolve(&self, info: &ExceptionInfo, policy: TypeResolution) -> Option<ReplayFn> {
        if policy == TypeResolution::NoResolution {
            return None;
        }
        let type_name = info.full_type_name.as_deref().filter(|name| !name.is_empty())?;
        let assembly = info.assembly_name.as_deref().filter(|name| !name.is_empty())?;
        if !is_valid_type_name(type_name) {
            return None;
        }

        if policy == TypeResolution::CoreOnly {
            let assemblies = self.assemblies.read().expect("exception registry rwlock poisoned");
            return assemblies.get(CORE_ASSEMBLY)?.types.get(type_name).copied();
        }

        let name = AssemblyName::parse(assembly).ok()?;
        if name.code_base.is_some() {
            return None;
        }
        let key = name.key();
        {
            let assemblies = self.assemblies.read().expect("exception registry rwlock poisoned");
            let entry = assemblies.get(&key)?;
            if entry.loaded {
                return entry.types.get(type_name).copied();
            }
            match policy {
                TypeResolution::LoadedOrStrongNamed => {
                    let requested = name.public_key_token.as_ref()?;
                    if entry.public_key_token.as_ref().is_some_and(|token| token != requested) {
                        return None;
                    }
                }
                TypeResolution::AnyAssembly => {}
                _ => return None,
            }
        }

        self.load(&name.name);
        let assemblies = self.assemblies.read().expect("exception registry rwlock poisoned");
        assemblies.get(&key)?.types.get(type_name).copied()
    }

    fn rebuild(&self, info: &ExceptionInfo, policy: TypeResolution, top: bool) -> (Fault, bool) {
        // The outermost error's own trace becomes its remote trace; inner
        // errors keep whatever remote trace they were captured with.
        let remote_stack_trace =
            if top { info.stack_trace.clone() } else { info.remote_stack_trace.clone() };

        if let Some(replay) = self.resolve(info, policy) {
            let rebuilt = if info.message.is_none() {
                construct(replay, &ExceptionParts::default())
            } else {
                let full = if info.has_full_details {
                    self.full_parts(info, policy, remote_stack_trace.clone())
                        .ok()
                        .and_then(|parts| construct(replay, &parts))
                } else {
                    None
                };
                full.or_else(|| {
                    construct(replay, &ExceptionParts::message_only(info.message.clone()))
                })
            };
            if let Some(error) = rebuilt {
                return (error, false);
            }
        }

        let generic = ApplicationError::replay(&ExceptionParts {
            message: info.message.clone(),
            remote_stack_trace,
            ..ExceptionParts::default()
        })
        .unwrap_or_default();
        (Box::new(generic) as Fault, true)
    }

    fn full_parts(
        &self,
        info: &ExceptionInfo,
        policy: TypeResolution,
        remote_stack_trace: Option<String>,
    ) -> Result<ExceptionParts, ReplayError> {
        let fields = info
            .fields
            .iter()
            .map(|field| Ok((field.member.clone(), FieldValue::from_wire(field)?)))
            .collect::<Result<Vec<_>, ReplayError>>()?;
        let inner = info
            .inner
            .as_deref()
            .map(|inner| Arc::from(self.rebuild(inner, policy, false).0));
        Ok(ExceptionParts {
            message: info.message.clone(),
            origin: info.source.clone(),
            stack_trace: info.stack_trace.clone(),
            remote_stack_trace,
            remote_stack_index: info.remote_stack_index.unwrap_or(0),
            help_url: info.help_url.clone(),
            fields,
            inner,
        })
    }
}

fn construct(replay: ReplayFn, parts: &ExceptionParts) -> Option<Fault> {
    match panic::catch_unwind(AssertUnwindSafe(|| replay(parts))) {
        Ok(Ok(error)) => Some(error),
        Ok(Err(err)) => {
            log::trace!("exception replay failed: {err}");
            None
        }
        Err(_) => {
            log::warn!("exception constructor panicked during replay");
            None
        }
    }
}

/// `^[A-Za-z_][A-Za-z0-9_]*((\.|::)[A-Za-z_][A-Za-z0-9_]*)*$`
fn is_valid_type_name(name: &str) -> bool {
    name.replace("::", ".").split('.').all(|segment| {
        let mut chars = segment.chars();
        matches!(chars.next(), Some(first) if first.is_ascii_alphabetic() || first == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

/// Rebuilds the error described by `info` under `policy`.
///
/// Never fails: anything that cannot be resolved or constructed becomes a
/// generic [`ApplicationError`] carrying the remote message.
pub fn reconstruct(
    info: &ExceptionInfo,
    policy: TypeResolution,
    registry: &ExceptionRegistry,
) -> RemoteError {
    let (exception, generic) = registry.rebuild(info, policy, true);
    RemoteError { exception, info: info.clone(), generic }
}

/// An error raised by the remote handler, rebuilt on the client.
#[derive(Debug)]
pub struct RemoteError {
    exception: Fault,
    info: ExceptionInfo,
    generic: bool,
}

impl RemoteError {
    pub fn exception(&self) -> &dyn Exception {
        self.exception.as_ref()
    }

    pub fn into_exception(self) -> Fault {
        self.exception
    }

    pub fn downcast_ref<T: Exception>(&self) -> Option<&T> {
        self.exception.as_ref().downcast_ref::<T>()
    }

    pub fn is<T: Exception>(&self) -> bool {
        self.exception.as_ref().is::<T>()
    }

    /// The info as received, before any resolution.
    pub fn info(&self) -> &ExceptionInfo {
        &self.info
    }

    pub fn message(&self) -> String {
        self.exception.message()
    }

    pub fn type_name(&self) -> &str {
        self.exception.type_name()
    }

    /// `true` when the named type was not used and the generic fallback was
    /// built instead.
    pub fn is_generic(&self) -> bool {
        self.generic
    }

    pub fn remote_stack_trace(&self) -> Option<&str> {
        self.exception.remote_stack_trace()
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = self.exception.message();
        if message.is_empty() {
            write!(f, "remote error ({})", self.exception.type_name())
        } else {
            write!(f, "remote error ({}): {message}", self.exception.type_name())
        }
    }
}

impl std::error::Error for RemoteError {}
