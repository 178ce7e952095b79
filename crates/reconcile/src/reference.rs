//! Parent reference resolution.
//!
//! A declared parent is either a name or unset. Unset means "top of the
//! hierarchy", which the store spells with a root sentinel that differs per
//! kind (`root` for accounts, `<Root>` for scheduler pools). The resolver
//! decides when that sentinel has to be written and strips it on read-back.
//!
//! Parents are referenced by name. A concurrent rename of the parent between
//! planning and the write lands the child under whatever object holds the
//! name at write time, or fails to resolve; callers that rename parents must
//! apply the rename before touching children.

use crate::error::{Error, Result};

/// Wire spelling of "attach to the top".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootSentinel {
    wire: &'static str,
    id_prefix: Option<&'static str>,
}

impl RootSentinel {
    /// A sentinel recognized only by its exact wire value.
    pub const fn exact(wire: &'static str) -> Self {
        Self {
            wire,
            id_prefix: None,
        }
    }

    /// A sentinel that the store may also report as an object id with a prefix.
    pub const fn with_id_prefix(wire: &'static str, prefix: &'static str) -> Self {
        Self {
            wire,
            id_prefix: Some(prefix),
        }
    }

    /// The value written to reparent to the top.
    pub fn wire_value(&self) -> &'static str {
        self.wire
    }

    /// Whether an observed wire value means "top of the hierarchy".
    pub fn is_root(&self, observed: &str) -> bool {
        observed == self.wire || self.id_prefix.is_some_and(|p| observed.starts_with(p))
    }
}

/// `root`
pub const ACCOUNT_ROOT: RootSentinel = RootSentinel::exact("root");
/// `<Root>`, also reported as a `#`-prefixed id.
pub const POOL_ROOT: RootSentinel = RootSentinel::with_id_prefix("<Root>", "#");

/// What an Update has to do with the parent attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentWrite {
    /// Leave the attribute untouched.
    Keep,
    /// Write this value.
    Set(String),
}

/// Maps declared parents to wire values and back.
#[derive(Debug, Clone, Copy)]
pub struct ParentResolver {
    field: &'static str,
    sentinel: RootSentinel,
}

impl ParentResolver {
    pub const fn new(field: &'static str, sentinel: RootSentinel) -> Self {
        Self { field, sentinel }
    }

    /// Attribute the parent is written to.
    pub fn field(&self) -> &'static str {
        self.field
    }

    /// Reject an explicitly empty parent; unset is fine.
    pub fn validate(&self, object: &str, declared: Option<&str>) -> Result<()> {
        match declared {
            // no principal or pool name is blank, so whitespace counts as empty
            Some(name) if name.trim().is_empty() => Err(Error::UnresolvedReference {
                object: object.to_string(),
                field: self.field,
                reason: "is empty or only whitespace; leave it unset to attach to the top"
                    .to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Value to include in a create call, if any.
    pub fn for_create(&self, object: &str, declared: Option<&str>) -> Result<Option<String>> {
        self.validate(object, declared)?;
        Ok(declared.map(str::to_string))
    }

    /// Write needed on Update.
    ///
    /// A declared parent is always written. An unset parent writes the root
    /// sentinel only when the object currently hangs under some other
    /// parent; otherwise nothing is written.
    pub fn for_update(
        &self,
        object: &str,
        declared: Option<&str>,
        observed: Option<&str>,
    ) -> Result<ParentWrite> {
        self.validate(object, declared)?;
        Ok(match (declared, observed) {
            (Some(parent), _) => ParentWrite::Set(parent.to_string()),
            (None, Some(current)) if !current.is_empty() && !self.sentinel.is_root(current) => {
                ParentWrite::Set(self.sentinel.wire_value().to_string())
            }
            (None, _) => ParentWrite::Keep,
        })
    }

    /// Declared form of an observed wire parent.
    pub fn to_declared(&self, observed: Option<&str>) -> Option<String> {
        observed
            .filter(|p| !p.is_empty() && !self.sentinel.is_root(p))
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCOUNT: ParentResolver = ParentResolver::new("parent_name", ACCOUNT_ROOT);
    const POOL: ParentResolver = ParentResolver::new("parent_name", POOL_ROOT);

    #[test]
    fn test_create_omits_unset_parent() {
        assert_eq!(ACCOUNT.for_create("account a", None).unwrap(), None);
        assert_eq!(
            ACCOUNT.for_create("account a", Some("team")).unwrap(),
            Some("team".to_string())
        );
    }

    #[test]
    fn test_update_reparents_to_root_sentinel() {
        let write = ACCOUNT
            .for_update("account a", None, Some("teamA"))
            .unwrap();
        assert_eq!(write, ParentWrite::Set("root".to_string()));

        let write = POOL.for_update("pool p", None, Some("research")).unwrap();
        assert_eq!(write, ParentWrite::Set("<Root>".to_string()));
    }

    #[test]
    fn test_update_without_parent_either_side_writes_nothing() {
        assert_eq!(
            ACCOUNT.for_update("account a", None, None).unwrap(),
            ParentWrite::Keep
        );
        assert_eq!(
            ACCOUNT.for_update("account a", None, Some("root")).unwrap(),
            ParentWrite::Keep
        );
    }

    #[test]
    fn test_update_declared_parent_always_written() {
        assert_eq!(
            ACCOUNT.for_update("account a", Some("teamB"), Some("teamB")).unwrap(),
            ParentWrite::Set("teamB".to_string())
        );
    }

    #[test]
    fn test_read_back_strips_sentinel() {
        assert_eq!(ACCOUNT.to_declared(Some("root")), None);
        assert_eq!(ACCOUNT.to_declared(Some("teamA")), Some("teamA".to_string()));
        assert_eq!(ACCOUNT.to_declared(Some("")), None);
        assert_eq!(POOL.to_declared(Some("<Root>")), None);
        assert_eq!(POOL.to_declared(Some("#1-2-3-4")), None);
        assert_eq!(POOL.to_declared(Some("research")), Some("research".to_string()));
    }

    #[test]
    fn test_empty_string_is_distinct_error() {
        let err = ACCOUNT.for_create("account a", Some("")).unwrap_err();
        assert_eq!(err.label(), "unresolved_reference");
        assert!(err.to_string().contains("empty or only whitespace"), "{err}");

        let blank = ACCOUNT.for_update("account a", Some(" \t"), None).unwrap_err();
        assert_eq!(blank.label(), "unresolved_reference");
        assert!(ACCOUNT.validate("account a", Some(" team ")).is_ok());
    }
}
