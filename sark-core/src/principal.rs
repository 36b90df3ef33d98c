//! The authenticated actor on whose behalf an invocation is made.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::ids::PrincipalId;

/// An authenticated principal (human operator or service account) invoking a capability.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Principal {
    id: PrincipalId,
    role: String,
    teams: Vec<String>,
    mfa_verified: bool,
    mfa_methods: Vec<String>,
}

impl Principal {
    /// Starts building a principal.
    #[must_use]
    pub fn builder(role: impl Into<String>) -> PrincipalBuilder {
        PrincipalBuilder::new(role)
    }

    /// Identifier of the principal.
    #[must_use]
    pub const fn id(&self) -> PrincipalId {
        self.id
    }

    /// Role assigned to the principal (drives rule matching).
    #[must_use]
    pub fn role(&self) -> &str {
        &self.role
    }

    /// Team memberships associated with the principal.
    #[must_use]
    pub fn teams(&self) -> &[String] {
        &self.teams
    }

    /// Whether the principal completed MFA for the current session.
    #[must_use]
    pub const fn mfa_verified(&self) -> bool {
        self.mfa_verified
    }

    /// MFA methods available to the principal (e.g. `"totp"`, `"sms"`, `"push"`).
    #[must_use]
    pub fn mfa_methods(&self) -> &[String] {
        &self.mfa_methods
    }

    /// Marks the principal as MFA-verified for the remainder of this request.
    pub fn mark_mfa_verified(&mut self) {
        self.mfa_verified = true;
    }
}

/// Builder for [`Principal`].
#[derive(Debug, Default)]
pub struct PrincipalBuilder {
    id: Option<PrincipalId>,
    role: String,
    teams: Vec<String>,
    mfa_verified: bool,
    mfa_methods: Vec<String>,
}

impl PrincipalBuilder {
    /// Creates a new builder with the supplied role.
    #[must_use]
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            id: None,
            role: role.into(),
            teams: Vec::new(),
            mfa_verified: false,
            mfa_methods: Vec::new(),
        }
    }

    /// Sets an explicit principal id; a random one is generated otherwise.
    #[must_use]
    pub const fn id(mut self, id: PrincipalId) -> Self {
        self.id = Some(id);
        self
    }

    /// Adds team memberships.
    #[must_use]
    pub fn teams<I, S>(mut self, teams: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.teams.extend(teams.into_iter().map(Into::into));
        self
    }

    /// Marks the principal as already MFA-verified.
    #[must_use]
    pub const fn mfa_verified(mut self, verified: bool) -> Self {
        self.mfa_verified = verified;
        self
    }

    /// Adds available MFA methods.
    #[must_use]
    pub fn mfa_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mfa_methods.extend(methods.into_iter().map(Into::into));
        self
    }

    /// Builds the principal.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPrincipal`] when the role is empty.
    pub fn build(self) -> Result<Principal, Error> {
        if self.role.trim().is_empty() {
            return Err(Error::InvalidPrincipal {
                reason: "role cannot be empty",
            });
        }

        Ok(Principal {
            id: self.id.unwrap_or_default(),
            role: self.role,
            teams: self.teams,
            mfa_verified: self.mfa_verified,
            mfa_methods: self.mfa_methods,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_requires_role() {
        let err = Principal::builder("   ").build().unwrap_err();
        assert!(matches!(err, Error::InvalidPrincipal { .. }));
    }

    #[test]
    fn builder_assembles_principal() {
        let principal = Principal::builder("analyst")
            .teams(["secops", "oncall"])
            .mfa_methods(["totp"])
            .build()
            .unwrap();

        assert_eq!(principal.role(), "analyst");
        assert_eq!(principal.teams(), ["secops", "oncall"]);
        assert!(!principal.mfa_verified());
    }
}
