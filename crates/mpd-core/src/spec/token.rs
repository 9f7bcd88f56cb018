//! Raw lexemes recognized in variant and dependency strings

use logos::Logos;

use super::TokenKind;

/// What logos matches before the tokenizer applies bracket rules
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+")]
pub(crate) enum Lexeme {
    // ========== Names ==========
    #[regex(r"[A-Za-z0-9_][A-Za-z0-9_\-]*")]
    PackageName,

    // ========== Versions and compilers ==========
    /// `@1.2`, `@develop`, `@1.2:1.4,2.0`, `@=3.1`
    #[regex(r"@[A-Za-z0-9_.:,=\-]+")]
    Version,

    #[regex(r"%[A-Za-z0-9_][A-Za-z0-9_.\-]*")]
    Compiler,

    #[regex(r"%[A-Za-z0-9_][A-Za-z0-9_.\-]*@[A-Za-z0-9_.:,=\-]+")]
    CompilerAndVersion,

    // ========== Variants ==========
    /// `+debug`, `~shared`, `-shared`
    #[regex(r"[+~\-][A-Za-z0-9_][A-Za-z0-9_\-]*")]
    BoolVariant,

    /// `++debug`, `~~shared`, `--shared`
    #[regex(r"(\+\+|~~|--)[A-Za-z0-9_][A-Za-z0-9_\-]*")]
    PropagatedBoolVariant,

    /// `cxxstd=20`, `cflags="-O2 -g"`
    #[regex(r#"[A-Za-z0-9_][A-Za-z0-9_\-]*=("[^"]*"|'[^']*'|[A-Za-z0-9_.:,+@%/*\-]+)"#)]
    KeyValueVariant,

    /// `cxxstd==20`
    #[regex(r#"[A-Za-z0-9_][A-Za-z0-9_\-]*==("[^"]*"|'[^']*'|[A-Za-z0-9_.:,+@%/*\-]+)"#)]
    PropagatedKeyValueVariant,

    // ========== Edges ==========
    #[token("^")]
    DependencyEdge,

    /// `^[virtuals=`
    #[regex(r"\^\[[ \t]*virtuals[ \t]*=")]
    StartVirtualEdge,

    #[token("]")]
    EndVirtualEdge,

    /// Separates virtual names inside `^[virtuals=a,b]`; legal nowhere else
    #[token(",")]
    Comma,
}

impl Lexeme {
    /// The public token kind, or `None` for separators that never leave the tokenizer
    pub(crate) fn kind(self) -> Option<TokenKind> {
        let kind = match self {
            Self::PackageName => TokenKind::PackageName,
            Self::Version => TokenKind::Version,
            Self::Compiler => TokenKind::Compiler,
            Self::CompilerAndVersion => TokenKind::CompilerAndVersion,
            Self::BoolVariant => TokenKind::BoolVariant,
            Self::PropagatedBoolVariant => TokenKind::PropagatedBoolVariant,
            Self::KeyValueVariant => TokenKind::KeyValueVariant,
            Self::PropagatedKeyValueVariant => TokenKind::PropagatedKeyValueVariant,
            Self::DependencyEdge => TokenKind::DependencyEdge,
            Self::StartVirtualEdge => TokenKind::StartVirtualEdge,
            Self::EndVirtualEdge => TokenKind::EndVirtualEdge,
            Self::Comma => return None,
        };
        Some(kind)
    }
}
