//! Ambient current-tenant propagation.
//!
//! Operation bodies sometimes sit several calls away from the request
//! boundary that resolved the tenant. Rather than threading the value
//! implicitly through decoration, this module provides a reentrant
//! task-local scope: [`with_tenant`] resolves the effective tenant exactly
//! once on entry (an explicit override wins over the ambient value), exposes
//! it to everything inside the scope via [`current_tenant`], and restores
//! the prior ambient state when the scope ends. Nested scopes compose
//! without explicit save/restore at each boundary.

use crate::context::TenantId;

tokio::task_local! {
    static CURRENT_TENANT: Option<TenantId>;
}

/// The tenant visible to the current task, if any scope is active.
///
/// Returns `None` both outside any scope and inside a scope that was entered
/// without a tenant.
#[must_use]
pub fn current_tenant() -> Option<TenantId> {
    CURRENT_TENANT.try_with(|t| *t).ok().flatten()
}

/// Run `fut` with the effective tenant in ambient scope.
///
/// The effective tenant is `override_id` when given, otherwise whatever the
/// surrounding scope carries. The surrounding value is restored once `fut`
/// completes, whether it succeeds, errors, or is dropped mid-flight.
pub async fn with_tenant<F>(override_id: Option<TenantId>, fut: F) -> F::Output
where
    F: Future,
{
    let effective = override_id.or_else(current_tenant);
    CURRENT_TENANT.scope(effective, fut).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_scope_means_no_tenant() {
        assert_eq!(current_tenant(), None);
    }

    #[tokio::test]
    async fn override_wins_over_ambient() {
        with_tenant(Some(1), async {
            assert_eq!(current_tenant(), Some(1));
            with_tenant(Some(2), async {
                assert_eq!(current_tenant(), Some(2));
            })
            .await;
            // Prior ambient state restored after the nested scope.
            assert_eq!(current_tenant(), Some(1));
        })
        .await;
        assert_eq!(current_tenant(), None);
    }

    #[tokio::test]
    async fn nested_scope_without_override_inherits() {
        with_tenant(Some(7), async {
            with_tenant(None, async {
                assert_eq!(current_tenant(), Some(7));
            })
            .await;
        })
        .await;
    }

    #[tokio::test]
    async fn scope_without_tenant_shadows_nothing() {
        with_tenant(None, async {
            assert_eq!(current_tenant(), None);
        })
        .await;
    }
}
