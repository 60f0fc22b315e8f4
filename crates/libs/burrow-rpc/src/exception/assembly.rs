use std::fmt;

/// Parsed assembly identity: `name, Version=…, Culture=…, PublicKeyToken=…,
/// CodeBase=…`. Every part after the simple name is optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyName {
    pub name: String,
    pub version: Option<String>,
    pub culture: Option<String>,
    pub public_key_token: Option<Vec<u8>>,
    pub code_base: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssemblyNameError {
    #[error("assembly name is empty")]
    Empty,

    #[error("malformed assembly attribute: {0}")]
    MalformedAttribute(String),

    #[error("invalid public key token: {0}")]
    InvalidToken(String),
}

impl AssemblyName {
    pub fn parse(input: &str) -> Result<Self, AssemblyNameError> {
        let mut parts = input.split(',').map(str::trim);
        let name = parts.next().unwrap_or_default();
        if name.is_empty() || name.contains('=') {
            return Err(AssemblyNameError::Empty);
        }

        let mut parsed = AssemblyName {
            name: name.to_string(),
            version: None,
            culture: None,
            public_key_token: None,
            code_base: None,
        };
        for part in parts {
            let Some((key, value)) = part.split_once('=') else {
                return Err(AssemblyNameError::MalformedAttribute(part.to_string()));
            };
            let value = value.trim();
            match key.trim().to_ascii_lowercase().as_str() {
                "version" => parsed.version = Some(value.to_string()),
                "culture" => parsed.culture = Some(value.to_string()),
                "publickeytoken" => {
                    if !value.eq_ignore_ascii_case("null") && !value.is_empty() {
                        let token = hex::decode(value)
                            .map_err(|_| AssemblyNameError::InvalidToken(value.to_string()))?;
                        parsed.public_key_token = Some(token);
                    }
                }
                "codebase" => parsed.code_base = Some(value.to_string()),
                // Unknown attributes do not change resolution.
                _ => {}
            }
        }
        Ok(parsed)
    }

    /// Lookup key: simple names compare case-insensitively.
    pub fn key(&self) -> String {
        self.name.to_ascii_lowercase()
    }

    pub fn is_strong_named(&self) -> bool {
        self.public_key_token.is_some()
    }
}

impl fmt::Display for AssemblyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(version) = &self.version {
            write!(f, ", Version={version}")?;
        }
        if let Some(culture) = &self.culture {
            write!(f, ", Culture={culture}")?;
        }
        if let Some(token) = &self.public_key_token {
            write!(f, ", PublicKeyToken={}", hex::encode(token))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{AssemblyName, AssemblyNameError};

    #[test]
    fn parses_full_identity() {
        let name = AssemblyName::parse(
            "Search, Version=1.0.0.0, Culture=neutral, PublicKeyToken=AB12cd34",
        )
        .expect("parse");
        assert_eq!(name.name, "Search");
        assert_eq!(name.key(), "search");
        assert_eq!(name.version.as_deref(), Some("1.0.0.0"));
        assert_eq!(name.public_key_token, Some(vec![0xab, 0x12, 0xcd, 0x34]));
        assert!(name.code_base.is_none());
        assert_eq!(
            name.to_string(),
            "Search, Version=1.0.0.0, Culture=neutral, PublicKeyToken=ab12cd34"
        );
    }

    #[test]
    fn null_token_is_not_strong_named() {
        let name = AssemblyName::parse("plugin, PublicKeyToken=null").expect("parse");
        assert!(!name.is_strong_named());
        let name = AssemblyName::parse("plugin, CodeBase=file:///tmp/x.so").expect("parse");
        assert_eq!(name.code_base.as_deref(), Some("file:///tmp/x.so"));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(AssemblyName::parse(""), Err(AssemblyNameError::Empty));
        assert_eq!(AssemblyName::parse(" , Version=1"), Err(AssemblyNameError::Empty));
        assert!(matches!(
            AssemblyName::parse("a, Version"),
            Err(AssemblyNameError::MalformedAttribute(_))
        ));
        assert!(matches!(
            AssemblyName::parse("a, PublicKeyToken=zz"),
            Err(AssemblyNameError::InvalidToken(_))
        ));
    }
}
