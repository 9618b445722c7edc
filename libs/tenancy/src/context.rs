//! Request-scoped tenant identity types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tenant identifier.
///
/// Tenants map to organization rows in the storage layer, which keys them by
/// signed 64-bit integers.
pub type TenantId = i64;

/// Where a resolved tenant identity came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantSource {
    /// Explicit per-request override header.
    Header,
    /// The authenticated principal's organization attribute.
    Principal,
    /// No tenant signal was present (public or super-admin context).
    None,
}

/// Request-scoped tenant context.
///
/// Created at request start from [`TenantResolver::resolve`] and discarded at
/// request end. Never cache one between requests: the context is only
/// meaningful for the connection borrow window it was resolved for.
///
/// An unbound context is a legitimate state, not an error. Whether it means
/// "see everything" or "see nothing" is decided by the data-access guard
/// based on the `superuser` flag.
///
/// [`TenantResolver::resolve`]: crate::resolver::TenantResolver::resolve
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: Option<TenantId>,
    source: TenantSource,
    superuser: bool,
}

impl TenantContext {
    /// Context bound to a specific tenant.
    #[must_use]
    pub fn for_tenant(tenant_id: TenantId, source: TenantSource) -> Self {
        Self {
            tenant_id: Some(tenant_id),
            source,
            superuser: false,
        }
    }

    /// Context with no tenant signal.
    #[must_use]
    pub fn unbound() -> Self {
        Self {
            tenant_id: None,
            source: TenantSource::None,
            superuser: false,
        }
    }

    /// Unbound super-admin context. The data-access guard lifts tenant
    /// filtering only for this combination.
    #[must_use]
    pub fn superuser() -> Self {
        Self {
            tenant_id: None,
            source: TenantSource::None,
            superuser: true,
        }
    }

    /// Set the super-admin flag, typically copied from the principal.
    #[must_use]
    pub fn with_superuser(mut self, superuser: bool) -> Self {
        self.superuser = superuser;
        self
    }

    #[must_use]
    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    #[must_use]
    pub fn source(&self) -> TenantSource {
        self.source
    }

    #[must_use]
    pub fn is_superuser(&self) -> bool {
        self.superuser
    }

    /// Whether a tenant is attached to this context.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.tenant_id.is_some()
    }
}

impl Default for TenantContext {
    fn default() -> Self {
        Self::unbound()
    }
}

/// An already-authenticated principal, produced by the external identity
/// layer.
///
/// This crate only consumes principals; it never issues, validates, or
/// refreshes credentials.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Subject identifier assigned by the identity provider.
    pub subject_id: Uuid,
    /// Organization the subject belongs to, if any.
    pub organization_id: Option<TenantId>,
    /// Super-admin flag. Lifts tenant filtering only while no tenant is
    /// bound.
    #[serde(default)]
    pub superuser: bool,
}

impl Principal {
    #[must_use]
    pub fn new(subject_id: Uuid, organization_id: Option<TenantId>) -> Self {
        Self {
            subject_id,
            organization_id,
            superuser: false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn unbound_is_default() {
        let ctx = TenantContext::default();
        assert_eq!(ctx.tenant_id(), None);
        assert_eq!(ctx.source(), TenantSource::None);
        assert!(!ctx.is_superuser());
        assert!(!ctx.is_bound());
    }

    #[test]
    fn bound_context_keeps_source() {
        let ctx = TenantContext::for_tenant(7, TenantSource::Header);
        assert_eq!(ctx.tenant_id(), Some(7));
        assert_eq!(ctx.source(), TenantSource::Header);
        assert!(ctx.is_bound());
    }

    #[test]
    fn superuser_context_is_unbound() {
        let ctx = TenantContext::superuser();
        assert!(ctx.is_superuser());
        assert!(!ctx.is_bound());
    }

    #[test]
    fn principal_superuser_defaults_to_false_in_serde() {
        let p: Principal = serde_json::from_value(serde_json::json!({
            "subject_id": "2c1f7f7e-68b2-4d8f-9a61-0a2a1c4e5b6d",
            "organization_id": 9
        }))
        .unwrap();
        assert!(!p.superuser);
        assert_eq!(p.organization_id, Some(9));
    }
}
