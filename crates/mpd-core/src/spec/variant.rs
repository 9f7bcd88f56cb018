//! Typed variants decoded from constraint tokens

use std::fmt;

use super::{Token, TokenKind};

/// A single constraint applied to a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Variant {
    /// `@<range>`, stored without the `@`.
    Version(String),
    /// `%name` or `%name@version`.
    Compiler {
        name: String,
        version: Option<String>,
    },
    /// `+name` / `~name` (`++` / `~~` when propagated to dependencies).
    Bool {
        name: String,
        enabled: bool,
        propagate: bool,
    },
    /// `name=value` (`name==value` when propagated).
    KeyValue {
        name: String,
        value: String,
        propagate: bool,
    },
}

impl Variant {
    /// Key under which versions are bucketed.
    pub const VERSION_KEY: &'static str = "version";
    /// Key under which compilers are bucketed.
    pub const COMPILER_KEY: &'static str = "compiler";

    /// Decode a token into a variant; `None` for names and edge markers.
    #[must_use]
    pub fn from_token(token: &Token) -> Option<Self> {
        let text = token.lexeme.as_str();
        let variant = match token.kind {
            TokenKind::Version => Self::Version(text[1..].to_string()),
            TokenKind::Compiler => Self::Compiler {
                name: text[1..].to_string(),
                version: None,
            },
            TokenKind::CompilerAndVersion => {
                let (name, version) = text[1..].split_once('@')?;
                Self::Compiler {
                    name: name.to_string(),
                    version: Some(version.to_string()),
                }
            }
            TokenKind::BoolVariant => Self::Bool {
                name: text[1..].to_string(),
                enabled: text.starts_with('+'),
                propagate: false,
            },
            TokenKind::PropagatedBoolVariant => Self::Bool {
                name: text[2..].to_string(),
                enabled: text.starts_with("++"),
                propagate: true,
            },
            TokenKind::KeyValueVariant => {
                let (name, value) = text.split_once('=')?;
                Self::KeyValue {
                    name: name.to_string(),
                    value: value.to_string(),
                    propagate: false,
                }
            }
            TokenKind::PropagatedKeyValueVariant => {
                let (name, value) = text.split_once("==")?;
                Self::KeyValue {
                    name: name.to_string(),
                    value: value.to_string(),
                    propagate: true,
                }
            }
            TokenKind::PackageName
            | TokenKind::DependencyEdge
            | TokenKind::StartVirtualEdge
            | TokenKind::EndVirtualEdge => return None,
        };
        Some(variant)
    }

    /// The bucket key: `version`, `compiler`, or the variant name.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Version(_) => Self::VERSION_KEY,
            Self::Compiler { .. } => Self::COMPILER_KEY,
            Self::Bool { name, .. } | Self::KeyValue { name, .. } => name,
        }
    }

    /// The value of a key-value variant, unquoted.
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::KeyValue { value, .. } => Some(value.trim_matches(|c| c == '"' || c == '\'')),
            _ => None,
        }
    }

    /// Compiler spec without the `%` sigil (`gcc@13.1`).
    #[must_use]
    pub fn compiler_spec(&self) -> Option<String> {
        match self {
            Self::Compiler { name, version: None } => Some(name.clone()),
            Self::Compiler {
                name,
                version: Some(version),
            } => Some(format!("{name}@{version}")),
            _ => None,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Version(range) => write!(f, "@{range}"),
            Self::Compiler { name, version } => match version {
                Some(version) => write!(f, "%{name}@{version}"),
                None => write!(f, "%{name}"),
            },
            Self::Bool {
                name,
                enabled,
                propagate,
            } => {
                let sigil = if *enabled { "+" } else { "~" };
                if *propagate {
                    write!(f, "{sigil}{sigil}{name}")
                } else {
                    write!(f, "{sigil}{name}")
                }
            }
            Self::KeyValue {
                name,
                value,
                propagate,
            } => {
                let sep = if *propagate { "==" } else { "=" };
                write!(f, "{name}{sep}{value}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::tokenize;

    fn variants(source: &str) -> Vec<Variant> {
        tokenize(source)
            .unwrap()
            .iter()
            .filter_map(Variant::from_token)
            .collect()
    }

    #[test]
    fn test_decode_keys() {
        let decoded = variants("@develop %gcc@13.1 +debug --shared cxxstd=20");
        let keys: Vec<_> = decoded.iter().map(Variant::key).collect();
        assert_eq!(keys, vec!["version", "compiler", "debug", "shared", "cxxstd"]);
        assert_eq!(decoded[1].compiler_spec().as_deref(), Some("gcc@13.1"));
        assert_eq!(decoded[4].value(), Some("20"));
    }

    #[test]
    fn test_minus_normalizes_to_tilde() {
        let decoded = variants("-shared");
        assert_eq!(decoded[0].to_string(), "~shared");
        assert_eq!(variants(&decoded[0].to_string()), decoded);
    }

    #[test]
    fn test_display_roundtrip() {
        for text in ["@1.2:1.4", "%clang", "++opt", "~~opt", "generator==ninja"] {
            let decoded = variants(text);
            assert_eq!(decoded[0].to_string(), text);
        }
    }

    #[test]
    fn test_quoted_value_is_unquoted() {
        let decoded = variants(r#"cflags="-O2 -g""#);
        assert_eq!(decoded[0].value(), Some("-O2 -g"));
        assert_eq!(decoded[0].to_string(), r#"cflags="-O2 -g""#);
    }

    #[test]
    fn test_names_are_not_variants() {
        assert!(variants("foo ^ bar").is_empty());
    }
}
