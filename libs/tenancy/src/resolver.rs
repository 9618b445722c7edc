//! Derives a candidate tenant identity from request inputs.

use crate::config::TenancyConfig;
use crate::context::{Principal, TenantContext, TenantId, TenantSource};

/// Resolves the tenant for a request.
///
/// Precedence: explicit override header > authenticated principal's
/// organization > none. A present-but-malformed override degrades to an
/// unbound context (logged); it does not fall through to the principal and
/// it never fails the request; tenant absence is a legitimate state.
#[derive(Clone, Debug)]
pub struct TenantResolver {
    header_name: String,
}

impl TenantResolver {
    #[must_use]
    pub fn new(header_name: impl Into<String>) -> Self {
        Self {
            header_name: header_name.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &TenancyConfig) -> Self {
        Self::new(config.header_name.clone())
    }

    /// Name of the override header this resolver consumes.
    #[must_use]
    pub fn header_name(&self) -> &str {
        &self.header_name
    }

    /// Resolve a tenant context from the override header value (if the
    /// header was present) and the authenticated principal (if any).
    ///
    /// The super-admin flag is copied from the principal regardless of which
    /// branch produced the tenant outcome.
    #[must_use]
    pub fn resolve(
        &self,
        header_value: Option<&str>,
        principal: Option<&Principal>,
    ) -> TenantContext {
        let superuser = principal.is_some_and(|p| p.superuser);

        if let Some(raw) = header_value {
            return match raw.trim().parse::<TenantId>() {
                Ok(tenant_id) => {
                    TenantContext::for_tenant(tenant_id, TenantSource::Header)
                        .with_superuser(superuser)
                }
                Err(_) => {
                    tracing::warn!(
                        header = %self.header_name,
                        value = %raw,
                        "malformed tenant override header, proceeding without tenant"
                    );
                    TenantContext::unbound().with_superuser(superuser)
                }
            };
        }

        if let Some(p) = principal
            && let Some(org_id) = p.organization_id
        {
            return TenantContext::for_tenant(org_id, TenantSource::Principal)
                .with_superuser(superuser);
        }

        TenantContext::unbound().with_superuser(superuser)
    }
}

impl Default for TenantResolver {
    fn default() -> Self {
        Self::from_config(&TenancyConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn principal(org: Option<TenantId>) -> Principal {
        Principal::new(Uuid::new_v4(), org)
    }

    #[test]
    fn header_takes_precedence_over_principal() {
        let resolver = TenantResolver::default();
        let p = principal(Some(3));
        let ctx = resolver.resolve(Some("7"), Some(&p));
        assert_eq!(ctx.tenant_id(), Some(7));
        assert_eq!(ctx.source(), TenantSource::Header);
    }

    #[test]
    fn principal_organization_used_without_header() {
        let resolver = TenantResolver::default();
        let p = principal(Some(9));
        let ctx = resolver.resolve(None, Some(&p));
        assert_eq!(ctx.tenant_id(), Some(9));
        assert_eq!(ctx.source(), TenantSource::Principal);
    }

    #[test]
    fn no_signal_resolves_unbound() {
        let resolver = TenantResolver::default();
        let ctx = resolver.resolve(None, None);
        assert_eq!(ctx.tenant_id(), None);
        assert_eq!(ctx.source(), TenantSource::None);
    }

    #[test]
    fn malformed_header_degrades_to_unbound() {
        // A bad override must not fall through to the principal: the caller
        // explicitly asked for a tenant and we could not honor it.
        let resolver = TenantResolver::default();
        let p = principal(Some(3));
        let ctx = resolver.resolve(Some("not-a-number"), Some(&p));
        assert_eq!(ctx.tenant_id(), None);
        assert_eq!(ctx.source(), TenantSource::None);
    }

    #[test]
    fn principal_without_organization_resolves_unbound() {
        let resolver = TenantResolver::default();
        let p = principal(None);
        let ctx = resolver.resolve(None, Some(&p));
        assert_eq!(ctx.tenant_id(), None);
    }

    #[test]
    fn superuser_flag_survives_every_branch() {
        let resolver = TenantResolver::default();
        let mut p = principal(Some(3));
        p.superuser = true;

        assert!(resolver.resolve(Some("7"), Some(&p)).is_superuser());
        assert!(resolver.resolve(Some("bad"), Some(&p)).is_superuser());
        assert!(resolver.resolve(None, Some(&p)).is_superuser());
    }

    #[test]
    fn header_value_is_trimmed() {
        let resolver = TenantResolver::default();
        let ctx = resolver.resolve(Some(" 42 "), None);
        assert_eq!(ctx.tenant_id(), Some(42));
    }
}
