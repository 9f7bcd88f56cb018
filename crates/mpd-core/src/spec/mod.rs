//! Tokenizer for variant and dependency constraint strings
//!
//! Constraint strings follow the package manager's spec syntax:
//! - `foo` package names
//! - `@1.2`, `@develop` versions
//! - `%gcc`, `%gcc@13.1` compilers
//! - `+debug`, `~shared`, `++debug` boolean variants
//! - `cxxstd=20`, `cxxstd==20` key-value variants
//! - `^` dependency edges and `^[virtuals=mpi] openmpi` virtual edges
//!
//! Tokenizing is pure: the same input always yields the same token sequence,
//! and the returned iterator can be cloned to restart from any point.

mod token;
mod variant;

pub use variant::Variant;

use logos::Logos;
use std::fmt;
use std::ops::Range;
use thiserror::Error;
use token::Lexeme;

/// The kind of a constraint token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    PackageName,
    Version,
    Compiler,
    CompilerAndVersion,
    BoolVariant,
    PropagatedBoolVariant,
    KeyValueVariant,
    PropagatedKeyValueVariant,
    DependencyEdge,
    StartVirtualEdge,
    EndVirtualEdge,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PackageName => "package name",
            Self::Version => "version",
            Self::Compiler => "compiler",
            Self::CompilerAndVersion => "compiler and version",
            Self::BoolVariant => "boolean variant",
            Self::PropagatedBoolVariant => "propagated boolean variant",
            Self::KeyValueVariant => "key-value variant",
            Self::PropagatedKeyValueVariant => "propagated key-value variant",
            Self::DependencyEdge => "dependency edge",
            Self::StartVirtualEdge => "start of virtual edge",
            Self::EndVirtualEdge => "end of virtual edge",
        };
        f.write_str(name)
    }
}

/// A token with its kind, byte span, and source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Range<usize>,
    pub lexeme: String,
}

impl Token {
    #[must_use]
    pub fn new(kind: TokenKind, span: Range<usize>, lexeme: impl Into<String>) -> Self {
        Self {
            kind,
            span,
            lexeme: lexeme.into(),
        }
    }
}

/// A constraint string that matches no grammar rule
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed spec '{text}' at offset {offset}: {reason}")]
pub struct MalformedSpecError {
    /// The offending substring, up to the next whitespace.
    pub text: String,
    pub offset: usize,
    pub reason: &'static str,
}

/// Lazy token stream over a constraint string
///
/// Yields `Err` at most once; the stream is exhausted afterwards.
#[derive(Clone)]
pub struct Tokens<'source> {
    source: &'source str,
    lexer: logos::Lexer<'source, Lexeme>,
    in_virtual_edge: bool,
    finished: bool,
}

impl<'source> Tokens<'source> {
    #[must_use]
    pub fn new(source: &'source str) -> Self {
        Self {
            source,
            lexer: Lexeme::lexer(source),
            in_virtual_edge: false,
            finished: false,
        }
    }

    fn fail(&mut self, offset: usize, reason: &'static str) -> MalformedSpecError {
        self.finished = true;
        let rest = &self.source[offset..];
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        MalformedSpecError {
            text: rest[..end].to_string(),
            offset,
            reason,
        }
    }
}

impl Iterator for Tokens<'_> {
    type Item = Result<Token, MalformedSpecError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let Some(lexed) = self.lexer.next() else {
                self.finished = true;
                if self.in_virtual_edge {
                    let offset = self.source.rfind("^[").unwrap_or(0);
                    return Some(Err(self.fail(offset, "unterminated virtual edge")));
                }
                return None;
            };

            let span = self.lexer.span();
            let lexeme = match lexed {
                Ok(lexeme) => lexeme,
                Err(()) => return Some(Err(self.fail(span.start, "unrecognized token"))),
            };

            match lexeme {
                Lexeme::Comma if self.in_virtual_edge => continue,
                Lexeme::Comma => {
                    return Some(Err(self.fail(span.start, "',' outside a virtual edge")));
                }
                Lexeme::StartVirtualEdge if self.in_virtual_edge => {
                    return Some(Err(self.fail(span.start, "nested virtual edge")));
                }
                Lexeme::StartVirtualEdge => self.in_virtual_edge = true,
                Lexeme::EndVirtualEdge if !self.in_virtual_edge => {
                    return Some(Err(self.fail(span.start, "']' without a virtual edge")));
                }
                Lexeme::EndVirtualEdge => self.in_virtual_edge = false,
                Lexeme::PackageName => {}
                _ if self.in_virtual_edge => {
                    return Some(Err(
                        self.fail(span.start, "only virtual names may appear inside '^[...]'")
                    ));
                }
                _ => {}
            }

            let kind = lexeme.kind()?;
            return Some(Ok(Token::new(kind, span, self.lexer.slice())));
        }
    }
}

/// Tokenize a constraint string lazily
#[must_use]
pub fn tokens(source: &str) -> Tokens<'_> {
    Tokens::new(source)
}

/// Tokenize a constraint string, failing on the first malformed token
pub fn tokenize(source: &str) -> Result<Vec<Token>, MalformedSpecError> {
    Tokens::new(source).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_versions_and_compilers() {
        assert_eq!(
            kinds("root@6.30 %gcc %clang@17.0.1"),
            vec![
                TokenKind::PackageName,
                TokenKind::Version,
                TokenKind::Compiler,
                TokenKind::CompilerAndVersion,
            ]
        );
    }

    #[test]
    fn test_variants() {
        let tokens = tokenize("+debug ~shared -static ++opt cxxstd=20 build_type==Release").unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::BoolVariant,
                TokenKind::BoolVariant,
                TokenKind::BoolVariant,
                TokenKind::PropagatedBoolVariant,
                TokenKind::KeyValueVariant,
                TokenKind::PropagatedKeyValueVariant,
            ]
        );
        assert_eq!(tokens[4].lexeme, "cxxstd=20");
    }

    #[test]
    fn test_adjacent_tokens_without_whitespace() {
        let tokens = tokenize("cetlib@develop+debug~shared").unwrap();
        let lexemes: Vec<_> = tokens.iter().map(|t| t.lexeme.as_str()).collect();
        assert_eq!(lexemes, vec!["cetlib", "@develop", "+debug", "~shared"]);
    }

    #[test]
    fn test_quoted_value() {
        let tokens = tokenize(r#"cflags="-O2 -g" +x"#).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::KeyValueVariant);
        assert_eq!(tokens[0].lexeme, r#"cflags="-O2 -g""#);
        assert_eq!(tokens[1].kind, TokenKind::BoolVariant);
    }

    #[test]
    fn test_virtual_edge() {
        assert_eq!(
            kinds("^[virtuals=mpi,lapack] openmpi"),
            vec![
                TokenKind::StartVirtualEdge,
                TokenKind::PackageName,
                TokenKind::PackageName,
                TokenKind::EndVirtualEdge,
                TokenKind::PackageName,
            ]
        );
    }

    #[test]
    fn test_dependency_edge() {
        assert_eq!(
            kinds("^root +x11"),
            vec![
                TokenKind::DependencyEdge,
                TokenKind::PackageName,
                TokenKind::BoolVariant
            ]
        );
    }

    #[test]
    fn test_malformed_names_substring() {
        let err = tokenize("+debug $weird stuff").unwrap_err();
        assert_eq!(err.text, "$weird");
        assert_eq!(err.offset, 7);
    }

    #[test]
    fn test_unterminated_virtual_edge() {
        let err = tokenize("^[virtuals=mpi openmpi").unwrap_err();
        assert_eq!(err.reason, "unterminated virtual edge");
    }

    #[test]
    fn test_comma_outside_edge() {
        assert!(tokenize("a, b").is_err());
    }

    #[test]
    fn test_error_ends_stream() {
        let mut stream = tokens("# more");
        assert!(matches!(stream.next(), Some(Err(_))));
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_restartable() {
        let stream = tokens("foo@1.0 +bar");
        let first: Vec<_> = stream.clone().collect();
        let second: Vec<_> = stream.collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_empty() {
        assert!(tokenize("   ").unwrap().is_empty());
    }
}
