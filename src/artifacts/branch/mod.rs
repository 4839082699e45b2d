//! Reference names and revision expressions

pub mod branch_name;
pub mod revision;

/// Patterns a ref name component may not contain (git check-ref-format)
pub const INVALID_BRANCH_NAME_REGEX: &str =
    r"^\.|\/\.|\.\.|^\/|\/$|\.lock$|\.lock\/|@\{|^@$|[\x00-\x20\*:\?\[\\~\^\x7f]|\/\/";
/// Top-level pseudo refs such as `HEAD` or `ORIG_HEAD`
pub const PSEUDO_REF_REGEX: &str = r"^[A-Z][A-Z_]*$";
pub const PARENT_REGEX: &str = r"^(.+)\^$";
pub const ANCESTOR_REGEX: &str = r"^(.+)\~(\d+)$";
