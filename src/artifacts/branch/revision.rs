use crate::areas::database::Database;
use crate::areas::refs::Refs;
use crate::artifacts::branch::branch_name::{BranchName, HEAD_REF_NAME, RefName};
use crate::artifacts::branch::{ANCESTOR_REGEX, PARENT_REGEX};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::error::{BitError, Result};
use anyhow::Context;

/// Shortest hex prefix accepted as an abbreviated object id
const MIN_PREFIX_LENGTH: usize = 4;

/// A revision expression identifying a commit.
///
/// Supported forms:
/// - Ref names: `master`, `feature/x`, `refs/heads/master`, `origin/master`, `HEAD`
/// - The alias `@` for `HEAD`
/// - Full or abbreviated object ids (at least 4 hex digits), used when no
///   ref of that name exists
/// - Parent: `<rev>^`
/// - Ancestor: `<rev>~<n>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revision {
    /// A ref name or, failing that, an object id prefix
    Ref(String),
    /// The Nth first-parent ancestor of a revision
    Ancestor(Box<Revision>, usize),
    /// The first parent of a revision
    Parent(Box<Revision>),
}

impl Revision {
    pub fn try_parse(revision: &str) -> Result<Revision> {
        let parent_re = regex::Regex::new(PARENT_REGEX)
            .with_context(|| format!("invalid parent regex: {PARENT_REGEX}"))?;
        let ancestor_re = regex::Regex::new(ANCESTOR_REGEX)
            .with_context(|| format!("invalid ancestor regex: {ANCESTOR_REGEX}"))?;

        if let Some(caps) = parent_re.captures(revision) {
            let base_revision = Self::try_parse(&caps[1])?;

            Ok(Revision::Parent(Box::new(base_revision)))
        } else if let Some(caps) = ancestor_re.captures(revision) {
            let generations: usize = caps[2]
                .parse()
                .with_context(|| format!("failed to parse generations in revision: {revision}"))?;
            let base_revision = Self::try_parse(&caps[1])?;

            Ok(Revision::Ancestor(Box::new(base_revision), generations))
        } else {
            let name = if revision == "@" { HEAD_REF_NAME } else { revision };
            BranchName::try_parse(name)?;

            Ok(Revision::Ref(name.to_string()))
        }
    }

    /// Resolve to a commit id
    pub fn resolve(&self, refs: &Refs, database: &Database) -> Result<ObjectId> {
        match self {
            Revision::Ref(name) => {
                if let Some(oid) = Self::resolve_ref(name, refs)? {
                    return Ok(oid);
                }

                if Self::looks_like_oid(name) {
                    Self::resolve_oid(name, database)
                } else {
                    Err(BitError::NotFound(format!("revision {name}")))
                }
            }
            Revision::Parent(base_revision) => {
                let oid = base_revision.resolve(refs, database)?;
                Self::resolve_commit_parent(&oid, database)
            }
            Revision::Ancestor(base_revision, generations) => {
                let mut oid = base_revision.resolve(refs, database)?;
                for _ in 0..*generations {
                    oid = Self::resolve_commit_parent(&oid, database)?;
                }

                Ok(oid)
            }
        }
    }

    /// Try the ref namespaces in git's lookup order
    fn resolve_ref(name: &str, refs: &Refs) -> Result<Option<ObjectId>> {
        let candidates = [
            name.to_string(),
            format!("refs/{name}"),
            format!("refs/tags/{name}"),
            format!("refs/heads/{name}"),
            format!("refs/remotes/{name}"),
            format!("refs/remotes/{name}/HEAD"),
        ];

        for candidate in candidates {
            let Ok(ref_name) = RefName::try_parse(candidate) else {
                continue;
            };

            if refs.find(&ref_name)?.is_some() {
                return refs.try_resolve(&ref_name);
            }
        }

        Ok(None)
    }

    fn resolve_commit_parent(oid: &ObjectId, database: &Database) -> Result<ObjectId> {
        database
            .parse_object_as_commit(oid)?
            .parent()
            .cloned()
            .ok_or_else(|| BitError::NotFound(format!("parent of {}", oid.to_short_oid())))
    }

    fn resolve_oid(prefix: &str, database: &Database) -> Result<ObjectId> {
        let commits = database
            .find_objects_by_prefix(prefix)?
            .into_iter()
            .filter(|oid| {
                database
                    .read_raw(oid)
                    .map(|(object_type, _)| object_type == ObjectType::Commit)
                    .unwrap_or(false)
            })
            .collect::<Vec<_>>();

        match commits.as_slice() {
            [] => Err(BitError::NotFound(format!("revision {prefix}"))),
            [oid] => Ok(oid.clone()),
            candidates => Err(anyhow::anyhow!(
                "short object id {} is ambiguous: {}",
                prefix,
                candidates
                    .iter()
                    .map(ObjectId::to_short_oid)
                    .collect::<Vec<_>>()
                    .join(", ")
            )
            .into()),
        }
    }

    fn looks_like_oid(s: &str) -> bool {
        s.len() >= MIN_PREFIX_LENGTH && s.len() <= 64 && s.chars().all(|c| c.is_ascii_hexdigit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rstest::rstest;

    fn reference(name: &str) -> Revision {
        Revision::Ref(name.to_string())
    }

    #[rstest]
    #[case("main", reference("main"))]
    #[case("@", reference("HEAD"))]
    #[case("main^", Revision::Parent(Box::new(reference("main"))))]
    #[case("main~3", Revision::Ancestor(Box::new(reference("main")), 3))]
    #[case("main^^", Revision::Parent(Box::new(Revision::Parent(Box::new(reference("main"))))))]
    #[case("refs/heads/x~0", Revision::Ancestor(Box::new(reference("refs/heads/x")), 0))]
    fn parses_revision_expressions(#[case] input: &str, #[case] expected: Revision) {
        assert_eq!(Revision::try_parse(input).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("invalid name")]
    #[case("invalid:name")]
    #[case(".invalid")]
    #[case("/invalid")]
    #[case("invalid/")]
    #[case("invalid.lock")]
    #[case("invalid..name")]
    #[case("bad name^")]
    #[case("bad:name~2")]
    fn rejects_invalid_names(#[case] input: &str) {
        assert!(Revision::try_parse(input).is_err());
    }

    fn valid_branch_name_strategy() -> impl Strategy<Value = String> {
        prop::string::string_regex("[a-zA-Z0-9][a-zA-Z0-9_/-]*[a-zA-Z0-9]")
            .unwrap()
            .prop_filter("Must not contain invalid patterns", |s| {
                !s.contains("..") && !s.ends_with(".lock") && !s.contains("//") && s.len() < 256
            })
    }

    proptest! {
        #[test]
        fn valid_names_parse_as_refs(name in valid_branch_name_strategy()) {
            prop_assert_eq!(Revision::try_parse(&name).unwrap(), Revision::Ref(name.clone()));
        }

        #[test]
        fn parent_suffixes_nest(name in valid_branch_name_strategy(), parent_count in 1usize..5) {
            let revision_str = format!("{}{}", name, "^".repeat(parent_count));

            let mut current = Revision::try_parse(&revision_str).unwrap();
            for _ in 0..parent_count {
                let Revision::Parent(base) = current else {
                    panic!("expected a parent revision");
                };
                current = *base;
            }
            prop_assert_eq!(current, Revision::Ref(name));
        }

        #[test]
        fn ancestor_suffix_records_generations(
            oid in "[0-9a-f]{4,64}",
            generations in 0usize..100
        ) {
            let parsed = Revision::try_parse(&format!("{}~{}", oid, generations)).unwrap();
            prop_assert_eq!(parsed, Revision::Ancestor(Box::new(Revision::Ref(oid)), generations));
        }
    }

    #[rstest]
    #[case("abc", false)]
    #[case("abcd", true)]
    #[case("abcg", false)]
    fn oid_prefixes_need_four_hex_digits(#[case] input: &str, #[case] expected: bool) {
        assert_eq!(Revision::looks_like_oid(input), expected);
    }
}
