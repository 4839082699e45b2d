use crate::artifacts::branch::{INVALID_BRANCH_NAME_REGEX, PSEUDO_REF_REGEX};
use crate::error::{BitError, Result};
use anyhow::Context;

pub const HEADS_PREFIX: &str = "refs/heads/";
pub const TAGS_PREFIX: &str = "refs/tags/";
pub const REMOTES_PREFIX: &str = "refs/remotes/";
pub const HEAD_REF_NAME: &str = "HEAD";

fn matches(pattern: &str, name: &str) -> Result<bool> {
    let re = regex::Regex::new(pattern)
        .with_context(|| format!("invalid ref name regex: {pattern}"))?;

    Ok(re.is_match(name))
}

/// Full reference name such as `HEAD` or `refs/heads/master`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefName(String);

impl RefName {
    pub fn try_parse(name: impl Into<String>) -> Result<Self> {
        let name = name.into();

        let valid = if name.starts_with("refs/") {
            !matches(INVALID_BRANCH_NAME_REGEX, &name)?
        } else {
            matches(PSEUDO_REF_REGEX, &name)?
        };

        if valid {
            Ok(Self(name))
        } else {
            Err(BitError::InvalidName(name))
        }
    }

    pub fn head() -> Self {
        Self(HEAD_REF_NAME.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_head(&self) -> bool {
        self.0 == HEAD_REF_NAME
    }

    pub fn is_branch(&self) -> bool {
        self.0.starts_with(HEADS_PREFIX)
    }

    /// The branch this name refers to, if it lives under `refs/heads/`
    pub fn branch_name(&self) -> Option<BranchName> {
        self.0
            .strip_prefix(HEADS_PREFIX)
            .map(|short| BranchName(short.to_string()))
    }

    /// Name without its `refs/<kind>/` prefix
    pub fn shorthand(&self) -> &str {
        [HEADS_PREFIX, TAGS_PREFIX, REMOTES_PREFIX]
            .iter()
            .find_map(|prefix| self.0.strip_prefix(prefix))
            .unwrap_or(&self.0)
    }
}

impl AsRef<str> for RefName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RefName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RefName {
    type Err = BitError;

    fn from_str(s: &str) -> Result<Self> {
        Self::try_parse(s)
    }
}

/// Short branch name, the part after `refs/heads/`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BranchName(String);

impl BranchName {
    pub fn try_parse(name: impl Into<String>) -> Result<Self> {
        let name = name.into();

        if name.is_empty() || name.starts_with('-') || matches(INVALID_BRANCH_NAME_REGEX, &name)? {
            return Err(BitError::InvalidName(name));
        }

        Ok(Self(name))
    }

    /// Accept either `feature` or `refs/heads/feature`
    pub fn from_ref_or_short(name: &str) -> Result<Self> {
        Self::try_parse(name.strip_prefix(HEADS_PREFIX).unwrap_or(name))
    }

    pub fn to_ref_name(&self) -> RefName {
        RefName(format!("{HEADS_PREFIX}{}", self.0))
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BranchName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::proptest;
    use rstest::rstest;

    proptest! {
        #[test]
        fn names_with_safe_characters_are_valid(
            prefix in "[a-zA-Z0-9_][a-zA-Z0-9_-]*",
            suffix in "[a-zA-Z0-9_-]+"
        ) {
            assert!(BranchName::try_parse(prefix.clone()).is_ok());
            assert!(BranchName::try_parse(format!("{}/{}", prefix, suffix)).is_ok());
        }

        #[test]
        fn names_breaking_component_rules_are_invalid(
            prefix in "[a-zA-Z0-9_-]+",
            suffix in "[a-zA-Z0-9_-]+"
        ) {
            for name in [
                format!(".{}", suffix),
                format!("{}.lock", prefix),
                format!("{}..{}", prefix, suffix),
                format!("{}/.{}", prefix, suffix),
                format!("/{}", suffix),
                format!("{}/", prefix),
                format!("{}@{{{}}}", prefix, suffix),
                format!("{}\x00{}", prefix, suffix),
                format!("{}//{}", prefix, suffix),
            ] {
                assert!(BranchName::try_parse(name).is_err());
            }
        }

        #[test]
        fn names_with_special_characters_are_invalid(
            prefix in "[a-zA-Z0-9_-]+",
            suffix in "[a-zA-Z0-9_-]+",
            special_char in r"[\*:\?\[\\^~ ]"
        ) {
            let branch_name = format!("{}{}{}", prefix, special_char, suffix);
            assert!(BranchName::try_parse(branch_name).is_err());
        }
    }

    #[rstest]
    #[case("")]
    #[case("@")]
    #[case("-b")]
    fn rejects_reserved_names(#[case] name: &str) {
        assert!(matches!(BranchName::try_parse(name), Err(BitError::InvalidName(_))));
    }

    #[rstest]
    #[case("HEAD", true)]
    #[case("ORIG_HEAD", true)]
    #[case("refs/heads/feature/x", true)]
    #[case("refs/remotes/origin/master", true)]
    #[case("head", false)]
    #[case("refs/heads/bad..name", false)]
    #[case("refs/heads/", false)]
    fn validates_full_ref_names(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(RefName::try_parse(name).is_ok(), valid);
    }

    #[rstest]
    fn converts_between_short_and_full_names() {
        let branch = BranchName::from_ref_or_short("refs/heads/feature/x").unwrap();
        assert_eq!(branch.as_ref(), "feature/x");
        assert_eq!(branch.to_ref_name().as_str(), "refs/heads/feature/x");
        assert_eq!(branch.to_ref_name().branch_name(), Some(branch));

        let remote = RefName::try_parse("refs/remotes/origin/master").unwrap();
        assert_eq!(remote.shorthand(), "origin/master");
        assert!(!remote.is_branch());
    }
}
