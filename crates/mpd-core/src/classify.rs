//! Bucketing of constraint tokens into project-wide, per-package, and
//! dependency-only variants.
//!
//! Two channels feed the classifier:
//! - the general variant list (`mpd new-project cxxstd=20 cetlib +debug`),
//!   where a package name switches the bucket to that developed package;
//! - the explicit dependency channel (`-D 'root@6.30 +x11'`,
//!   `-D '^[virtuals=mpi] openmpi'`), for packages that are not developed.
//!
//! Dependency edges (`^`) are rejected in the general list; they belong to
//! the explicit channel.

use crate::spec::{MalformedSpecError, Token, TokenKind, Tokens, Variant};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// Variants keyed by [`Variant::key`]; the last occurrence of a key wins.
pub type VariantMap = BTreeMap<String, Variant>;

/// The classified contents of both channels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    /// Variants that apply to every developed package that declares them.
    pub general: VariantMap,
    /// Variants for specific developed packages.
    pub per_package: BTreeMap<String, VariantMap>,
    /// Constraints for packages that are resolved externally.
    pub dependency_only: BTreeMap<String, VariantMap>,
    /// Virtual capability -> concrete providers, in order of appearance.
    pub virtual_providers: BTreeMap<String, Vec<String>>,
}

/// Packages named in the general list that are not under development.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndeclaredPackageError {
    /// Package -> the requirements it would have received.
    pub packages: BTreeMap<String, Vec<String>>,
}

impl fmt::Display for UndeclaredPackageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "the following packages are not under development but received variants:"
        )?;
        for (name, requirements) in &self.packages {
            if requirements.is_empty() {
                writeln!(f, " - {name}")?;
            } else {
                writeln!(f, " - {name} ({})", requirements.join(" "))?;
            }
        }
        write!(
            f,
            "Either clone these packages into the source directory, or pass their \
             constraints with --dependency (e.g. -D '<package> <variants>')"
        )
    }
}

impl std::error::Error for UndeclaredPackageError {}

/// Errors produced while classifying constraint tokens.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    #[error(transparent)]
    Malformed(#[from] MalformedSpecError),

    #[error(
        "dependency constraint '{text}' is not allowed in the variant list; \
         pass it with --dependency instead"
    )]
    InlineDependency { text: String },

    #[error(transparent)]
    UndeclaredPackages(#[from] UndeclaredPackageError),

    #[error("variant '{text}' in dependency constraint does not follow a package name")]
    MissingPackageName { text: String },

    #[error("virtual edge for '{}' names no provider", .virtuals.join(", "))]
    MissingProvider { virtuals: Vec<String> },
}

/// Where the next variant goes.
enum Bucket {
    General,
    Package(String),
    Dependency(String),
    Unset,
}

/// Classifies constraint tokens against the set of developed packages.
#[derive(Debug, Clone, Default)]
pub struct VariantClassifier {
    declared: BTreeSet<String>,
}

impl VariantClassifier {
    #[must_use]
    pub fn new(declared: BTreeSet<String>) -> Self {
        Self { declared }
    }

    /// Classify the general variant list and then every explicit dependency spec.
    pub fn classify_strs(
        &self,
        variants: &str,
        dependencies: &[String],
    ) -> Result<Classification, ClassifyError> {
        let mut classification = self.classify(Tokens::new(variants))?;
        for spec in dependencies {
            self.classify_dependencies(Tokens::new(spec), &mut classification)?;
        }
        Ok(classification)
    }

    /// Classify the general variant channel.
    ///
    /// A package name switches the current bucket to that package; any
    /// dependency or virtual edge is an error.
    pub fn classify<I, E>(&self, tokens: I) -> Result<Classification, ClassifyError>
    where
        I: IntoIterator<Item = Result<Token, E>>,
        ClassifyError: From<E>,
    {
        let mut classification = Classification::default();
        let mut bucket = Bucket::General;

        for token in tokens {
            let token = token?;
            match token.kind {
                TokenKind::DependencyEdge
                | TokenKind::StartVirtualEdge
                | TokenKind::EndVirtualEdge => {
                    return Err(ClassifyError::InlineDependency {
                        text: token.lexeme,
                    });
                }
                TokenKind::PackageName => {
                    classification
                        .per_package
                        .entry(token.lexeme.clone())
                        .or_default();
                    bucket = Bucket::Package(token.lexeme);
                }
                _ => {
                    if let Some(variant) = Variant::from_token(&token) {
                        let map = bucket_map(&mut classification, &bucket, &token)?;
                        map.insert(variant.key().to_string(), variant);
                    }
                }
            }
        }

        self.validate(&classification)?;
        Ok(classification)
    }

    /// Classify one spec from the explicit dependency channel into `into`.
    ///
    /// A leading `^` is accepted and ignored. `^[virtuals=a,b] pkg` records
    /// `pkg` as a provider of `a` and `b`; variants after `pkg` apply to it.
    pub fn classify_dependencies<I, E>(
        &self,
        tokens: I,
        into: &mut Classification,
    ) -> Result<(), ClassifyError>
    where
        I: IntoIterator<Item = Result<Token, E>>,
        ClassifyError: From<E>,
    {
        let mut bucket = Bucket::Unset;
        let mut open_virtuals: Option<Vec<String>> = None;
        let mut awaiting_provider: Vec<String> = Vec::new();

        for token in tokens {
            let token = token?;
            match token.kind {
                TokenKind::DependencyEdge => {}
                TokenKind::StartVirtualEdge => open_virtuals = Some(Vec::new()),
                TokenKind::EndVirtualEdge => {
                    awaiting_provider = open_virtuals.take().unwrap_or_default();
                }
                TokenKind::PackageName => {
                    if let Some(virtuals) = open_virtuals.as_mut() {
                        virtuals.push(token.lexeme);
                        continue;
                    }
                    for virtual_name in awaiting_provider.drain(..) {
                        let providers = into.virtual_providers.entry(virtual_name).or_default();
                        if !providers.contains(&token.lexeme) {
                            providers.push(token.lexeme.clone());
                        }
                    }
                    into.dependency_only
                        .entry(token.lexeme.clone())
                        .or_default();
                    bucket = Bucket::Dependency(token.lexeme);
                }
                _ => {
                    if let Some(variant) = Variant::from_token(&token) {
                        let map = bucket_map(into, &bucket, &token)?;
                        map.insert(variant.key().to_string(), variant);
                    }
                }
            }
        }

        if !awaiting_provider.is_empty() {
            return Err(ClassifyError::MissingProvider {
                virtuals: awaiting_provider,
            });
        }
        Ok(())
    }

    fn validate(&self, classification: &Classification) -> Result<(), UndeclaredPackageError> {
        let packages: BTreeMap<_, _> = classification
            .per_package
            .iter()
            .filter(|(name, _)| !self.declared.contains(*name))
            .map(|(name, variants)| {
                let requirements = variants.values().map(ToString::to_string).collect();
                (name.clone(), requirements)
            })
            .collect();

        if packages.is_empty() {
            Ok(())
        } else {
            Err(UndeclaredPackageError { packages })
        }
    }
}

fn bucket_map<'a>(
    classification: &'a mut Classification,
    bucket: &Bucket,
    token: &Token,
) -> Result<&'a mut VariantMap, ClassifyError> {
    match bucket {
        Bucket::General => Ok(&mut classification.general),
        Bucket::Package(name) => Ok(classification.per_package.entry(name.clone()).or_default()),
        Bucket::Dependency(name) => Ok(classification
            .dependency_only
            .entry(name.clone())
            .or_default()),
        Bucket::Unset => Err(ClassifyError::MissingPackageName {
            text: token.lexeme.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::tokens;

    fn classifier(declared: &[&str]) -> VariantClassifier {
        VariantClassifier::new(declared.iter().map(|s| (*s).to_string()).collect())
    }

    fn rendered(map: &VariantMap) -> Vec<String> {
        map.values().map(ToString::to_string).collect()
    }

    #[test]
    fn test_general_and_per_package() {
        let result = classifier(&["cetlib", "art"])
            .classify(tokens("cxxstd=20 %gcc@13 cetlib +debug art ~shared cxxstd=17"))
            .unwrap();

        assert_eq!(rendered(&result.general), vec!["%gcc@13", "cxxstd=20"]);
        assert_eq!(rendered(&result.per_package["cetlib"]), vec!["+debug"]);
        assert_eq!(
            rendered(&result.per_package["art"]),
            vec!["cxxstd=17", "~shared"]
        );
        assert!(result.dependency_only.is_empty());
    }

    #[test]
    fn test_last_token_wins() {
        let result = classifier(&[]).classify(tokens("+debug ~debug")).unwrap();
        assert_eq!(rendered(&result.general), vec!["~debug"]);
    }

    #[test]
    fn test_inline_dependency_rejected() {
        let err = classifier(&["art"])
            .classify(tokens("art ^root +x11"))
            .unwrap_err();
        assert_eq!(
            err,
            ClassifyError::InlineDependency {
                text: "^".to_string()
            }
        );
        assert!(err.to_string().contains("--dependency"));
    }

    #[test]
    fn test_undeclared_packages_listed() {
        let err = classifier(&["art"])
            .classify(tokens("root +x11 art +debug geant4 cxxstd=20"))
            .unwrap_err();
        let ClassifyError::UndeclaredPackages(undeclared) = err else {
            panic!("expected undeclared packages");
        };
        assert_eq!(undeclared.packages.len(), 2);
        assert_eq!(undeclared.packages["root"], vec!["+x11"]);
        assert_eq!(undeclared.packages["geant4"], vec!["cxxstd=20"]);
        let message = undeclared.to_string();
        assert!(message.contains(" - geant4 (cxxstd=20)"));
        assert!(message.contains(" - root (+x11)"));
    }

    #[test]
    fn test_dependency_channel() {
        let mut result = Classification::default();
        let classifier = classifier(&[]);
        classifier
            .classify_dependencies(tokens("root@6.30 +x11"), &mut result)
            .unwrap();
        classifier
            .classify_dependencies(tokens("^[virtuals=mpi] openmpi +cuda"), &mut result)
            .unwrap();

        assert_eq!(
            rendered(&result.dependency_only["root"]),
            vec!["@6.30", "+x11"]
        );
        assert_eq!(rendered(&result.dependency_only["openmpi"]), vec!["+cuda"]);
        assert_eq!(result.virtual_providers["mpi"], vec!["openmpi"]);
    }

    #[test]
    fn test_multiple_virtuals_one_provider() {
        let mut result = Classification::default();
        classifier(&[])
            .classify_dependencies(tokens("^[virtuals=blas,lapack] openblas"), &mut result)
            .unwrap();
        assert_eq!(result.virtual_providers["blas"], vec!["openblas"]);
        assert_eq!(result.virtual_providers["lapack"], vec!["openblas"]);
    }

    #[test]
    fn test_dependency_variant_without_package() {
        let mut result = Classification::default();
        let err = classifier(&[])
            .classify_dependencies(tokens("+x11 root"), &mut result)
            .unwrap_err();
        assert!(matches!(err, ClassifyError::MissingPackageName { .. }));
    }

    #[test]
    fn test_virtual_edge_without_provider() {
        let mut result = Classification::default();
        let err = classifier(&[])
            .classify_dependencies(tokens("^[virtuals=mpi]"), &mut result)
            .unwrap_err();
        assert_eq!(
            err,
            ClassifyError::MissingProvider {
                virtuals: vec!["mpi".to_string()]
            }
        );
    }

    #[test]
    fn test_classify_strs_combines_channels() {
        let result = classifier(&["art"])
            .classify_strs("art +debug", &["root +x11".to_string()])
            .unwrap();
        assert!(result.per_package.contains_key("art"));
        assert!(result.dependency_only.contains_key("root"));
    }

    #[test]
    fn test_malformed_propagates() {
        let err = classifier(&[]).classify(tokens("+debug $")).unwrap_err();
        assert!(matches!(err, ClassifyError::Malformed(_)));
    }
}
