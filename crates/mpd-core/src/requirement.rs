//! Ordered constraint lists stored per package

use crate::classify::VariantMap;
use crate::spec::{MalformedSpecError, Tokens, Variant};
use serde::{Deserialize, Serialize};

/// Constraints for one package, as handed to the resolver.
///
/// The version constraint (if any) is first and the compiler (if any) is
/// last. The remaining entries keep their insertion order, so regenerating
/// a requirement from the same inputs produces the same list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRequirement {
    #[serde(default)]
    pub require: Vec<String>,
}

impl PackageRequirement {
    /// Build a requirement from variants in priority order.
    ///
    /// A later variant with the same key replaces the earlier one in place.
    pub fn from_variants<'a>(variants: impl IntoIterator<Item = &'a Variant>) -> Self {
        let mut ordered: Vec<&Variant> = Vec::new();
        for variant in variants {
            match ordered.iter().position(|v| v.key() == variant.key()) {
                Some(index) => ordered[index] = variant,
                None => ordered.push(variant),
            }
        }

        let rank = |v: &&Variant| match v {
            Variant::Version(_) => 0,
            Variant::Compiler { .. } => 2,
            _ => 1,
        };
        ordered.sort_by_key(rank);

        Self {
            require: ordered.into_iter().map(ToString::to_string).collect(),
        }
    }

    /// Re-tokenize the stored constraints into a variant map.
    pub fn variants(&self) -> Result<VariantMap, MalformedSpecError> {
        let mut map = VariantMap::new();
        for text in &self.require {
            for token in Tokens::new(text) {
                if let Some(variant) = Variant::from_token(&token?) {
                    map.insert(variant.key().to_string(), variant);
                }
            }
        }
        Ok(map)
    }

    /// The constraints joined into one spec fragment.
    #[must_use]
    pub fn spec_string(&self) -> String {
        self.require.join(" ")
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.require.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::VariantClassifier;
    use crate::spec::{tokenize, tokens};
    use proptest::prelude::*;

    fn decoded(text: &str) -> Vec<Variant> {
        tokenize(text)
            .unwrap()
            .iter()
            .filter_map(Variant::from_token)
            .collect()
    }

    #[test]
    fn test_version_first_compiler_last() {
        let variants = decoded("%gcc@13 +debug @develop cxxstd=20");
        let requirement = PackageRequirement::from_variants(&variants);
        assert_eq!(
            requirement.require,
            vec!["@develop", "+debug", "cxxstd=20", "%gcc@13"]
        );
    }

    #[test]
    fn test_later_replaces_in_place() {
        let variants = decoded("@develop cxxstd=17 +debug cxxstd=20 @1.2");
        let requirement = PackageRequirement::from_variants(&variants);
        assert_eq!(requirement.require, vec!["@1.2", "cxxstd=20", "+debug"]);
    }

    #[test]
    fn test_spec_string() {
        let variants = decoded("@develop ~shared");
        let requirement = PackageRequirement::from_variants(&variants);
        assert_eq!(requirement.spec_string(), "@develop ~shared");
        assert!(!requirement.is_empty());
    }

    fn variant_strategy() -> impl Strategy<Value = String> {
        let name = "[a-z][a-z0-9_]{0,6}";
        prop_oneof![
            "[0-9]{1,2}(\\.[0-9]{1,2}){0,2}".prop_map(|v| format!("@{v}")),
            name.prop_map(|n| format!("%{n}")),
            (name, "[0-9]{1,2}").prop_map(|(n, v)| format!("%{n}@{v}")),
            (prop_oneof![Just("+"), Just("~"), Just("++"), Just("~~")], name)
                .prop_map(|(s, n)| format!("{s}{n}")),
            (name, "[a-z0-9]{1,5}").prop_map(|(n, v)| format!("{n}={v}")),
            (name, "[a-z0-9]{1,5}").prop_map(|(n, v)| format!("{n}=={v}")),
        ]
    }

    proptest! {
        #[test]
        fn test_requirement_roundtrip(parts in prop::collection::vec(variant_strategy(), 0..8)) {
            let source = parts.join(" ");
            let classifier = VariantClassifier::default();
            let original = classifier.classify(tokens(&source)).unwrap().general;

            let requirement = PackageRequirement::from_variants(original.values());
            let reparsed = classifier
                .classify(tokens(&requirement.spec_string()))
                .unwrap()
                .general;

            prop_assert_eq!(&reparsed, &original);
            prop_assert_eq!(requirement.variants().unwrap(), original);
        }
    }
}
