use serde::{Deserialize, Serialize};

/// How much of a failed call's error the server reveals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailLevel {
    NoDetails,
    TypeOnly,
    MessageOnly,
    #[default]
    FullDetails,
}

impl DetailLevel {
    pub fn includes_type(self) -> bool {
        self >= DetailLevel::TypeOnly
    }

    pub fn includes_message(self) -> bool {
        self >= DetailLevel::MessageOnly
    }
}

impl PartialOrd for DetailLevel {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DetailLevel {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (*self as u8).cmp(&(*other as u8))
    }
}

/// How much a client trusts the type named by a remote error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeResolution {
    /// Always produce the generic application error.
    NoResolution,
    /// Only the built-in core set.
    CoreOnly,
    #[default]
    LoadedOnly,
    /// Loaded assemblies, plus unloaded ones whose public key token matches.
    LoadedOrStrongNamed,
    AnyAssembly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    /// Standard base64 of the raw bytes.
    Bytes,
    Bool,
    Int,
    UInt,
    Float,
    /// Present on the sender but not representable; carries no value.
    Untyped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionField {
    pub member: String,
    pub type_tag: FieldType,
    #[serde(default)]
    pub value: Option<String>,
}

/// Portable form of a captured error. Which fields are set depends on the
/// detail level it was captured at.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExceptionInfo {
    #[serde(default)]
    pub assembly_name: Option<String>,
    #[serde(default)]
    pub full_type_name: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub stack_trace: Option<String>,
    #[serde(default)]
    pub remote_stack_trace: Option<String>,
    #[serde(default)]
    pub remote_stack_index: Option<u32>,
    #[serde(default)]
    pub help_url: Option<String>,
    #[serde(default)]
    pub has_full_details: bool,
    #[serde(default)]
    pub fields: Vec<ExceptionField>,
    #[serde(default)]
    pub inner: Option<Box<ExceptionInfo>>,
}

impl ExceptionInfo {
    pub fn is_empty(&self) -> bool {
        *self == ExceptionInfo::default()
    }

    pub fn field(&self, member: &str) -> Option<&ExceptionField> {
        self.fields.iter().find(|field| field.member == member)
    }
}
