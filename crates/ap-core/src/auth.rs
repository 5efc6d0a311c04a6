//! Principal sets and the authorization predicate used on every read and
//! mutation of an Action.

use serde::{Deserialize, Serialize};

use crate::error::{ApError, Result};

/// Pseudo-principal granting access to any authenticated caller where the
/// rule allows it.
pub const ALL_AUTHENTICATED_USERS: &str = "all_authenticated_users";

// ---------------------------------------------------------------------------
// PrincipalSet
// ---------------------------------------------------------------------------

/// Non-empty, duplicate-free, order-preserving list of principal URNs.
///
/// Deserializes from either a bare string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "OneOrMany", into = "Vec<String>")]
pub struct PrincipalSet(Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl TryFrom<OneOrMany> for PrincipalSet {
    type Error = ApError;

    fn try_from(value: OneOrMany) -> Result<Self> {
        match value {
            OneOrMany::One(p) => PrincipalSet::new(vec![p]),
            OneOrMany::Many(ps) => PrincipalSet::new(ps),
        }
    }
}

impl From<PrincipalSet> for Vec<String> {
    fn from(set: PrincipalSet) -> Self {
        set.0
    }
}

impl PrincipalSet {
    pub fn new<I, S>(principals: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for p in principals {
            let p = p.into();
            if p.trim().is_empty() {
                return Err(ApError::InvalidRequest("principal must not be blank".into()));
            }
            if !out.contains(&p) {
                out.push(p);
            }
        }
        if out.is_empty() {
            return Err(ApError::InvalidRequest(
                "principal set must not be empty".into(),
            ));
        }
        Ok(Self(out))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn contains(&self, principal: &str) -> bool {
        self.0.iter().any(|p| p == principal)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Caller
// ---------------------------------------------------------------------------

/// The verified identities behind one inbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    primary: String,
    identities: PrincipalSet,
}

impl Caller {
    /// `primary` is always part of the identity set, in first position.
    pub fn new<I, S>(primary: impl Into<String>, linked: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let primary = primary.into();
        let all = std::iter::once(primary.clone()).chain(linked.into_iter().map(Into::into));
        Ok(Self {
            identities: PrincipalSet::new(all)?,
            primary,
        })
    }

    pub fn primary_identity(&self) -> &str {
        &self.primary
    }

    pub fn identities(&self) -> &PrincipalSet {
        &self.identities
    }
}

// ---------------------------------------------------------------------------
// Predicate
// ---------------------------------------------------------------------------

/// True when any of the caller's identities appears in `required`.
///
/// With `allow_all_authenticated`, a rule containing
/// [`ALL_AUTHENTICATED_USERS`] admits every caller.
pub fn is_authorized(caller: &Caller, required: &[String], allow_all_authenticated: bool) -> bool {
    if allow_all_authenticated && required.iter().any(|p| p == ALL_AUTHENTICATED_USERS) {
        return true;
    }
    required.iter().any(|p| caller.identities.contains(p))
}

/// [`is_authorized`] against an Action principal set, without the
/// all-authenticated shortcut.
pub fn require(caller: &Caller, required: &PrincipalSet, what: impl FnOnce() -> String) -> Result<()> {
    if is_authorized(caller, required.as_slice(), false) {
        Ok(())
    } else {
        Err(ApError::NotAuthorized(what()))
    }
}
