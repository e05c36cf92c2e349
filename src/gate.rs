use std::collections::BTreeSet;

use crate::error::Error;
use crate::session::AuthenticatedSession;
use crate::token::ValidatedIdentity;

/// Anything carrying a realm role set.
///
/// API handlers pass a freshly validated [`ValidatedIdentity`]; UI code may
/// pass the stored [`AuthenticatedSession`], whose roles can lag the
/// provider by up to the inactivity window.
pub trait HasRoles {
    fn roles(&self) -> &BTreeSet<String>;
}

impl HasRoles for ValidatedIdentity {
    fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }
}

impl HasRoles for AuthenticatedSession {
    fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    Allowed,
    Denied { missing_role: String },
}

impl Authorization {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// # Errors
    ///
    /// Returns [`Error::Forbidden`] naming the missing role when denied.
    pub fn into_result(self) -> Result<(), Error> {
        match self {
            Self::Allowed => Ok(()),
            Self::Denied { missing_role } => Err(Error::Forbidden { role: missing_role }),
        }
    }
}

/// `Allowed` iff `required_role` is one of the identity's roles.
#[must_use]
pub fn authorize<I: HasRoles + ?Sized>(identity: &I, required_role: &str) -> Authorization {
    if identity.roles().contains(required_role) {
        Authorization::Allowed
    } else {
        Authorization::Denied {
            missing_role: required_role.to_owned(),
        }
    }
}
