use serde::{Deserialize, Serialize};

use crate::context::Extensions;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PingRequest {
    #[serde(default)]
    pub extensions: Extensions,
}

impl PingRequest {
    pub fn with_extension(mut self, key: impl Into<String>, value: impl Into<rmpv::Value>) -> Self {
        self.extensions.set(key, value);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PingResponse {
    #[serde(default)]
    pub extensions: Extensions,
}

impl PingResponse {
    pub fn with_extension(mut self, key: impl Into<String>, value: impl Into<rmpv::Value>) -> Self {
        self.extensions.set(key, value);
        self
    }

    pub fn merge_from(&mut self, other: &PingResponse) {
        self.extensions.merge_from(&other.extensions);
    }
}
