//! Tenant-aware data access guard.
//!
//! Generic per-entity CRUD that applies its own tenant filter and write
//! validation on top of the engine's row-security policies. The redundancy
//! is deliberate: a dropped or misconfigured policy must not turn into a
//! cross-tenant leak, so reads carry an explicit equality filter against the
//! bound tenant and writes verify ownership before touching a row.
//!
//! All operations take the same connection the session binder bound; a
//! guard call on any other connection still gets the app-level filter but
//! loses the substrate underneath it.

use std::marker::PhantomData;

use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, Condition, ConnectionTrait, IntoActiveModel,
    ModelTrait, PaginatorTrait, QueryFilter, QuerySelect, Select, Value,
};

use tenancy::{TenantContext, TenantId};

use crate::entity::TenantOwned;
use crate::error::GuardError;

/// Behavior flags for a [`TenantGuard`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GuardOpts {
    /// Apply tenant filtering and write validation. Off only for repos that
    /// operate across tenants by design (platform administration).
    pub enforce_tenant: bool,
    /// Rely on the engine's row-security policies alone and skip the
    /// redundant app-level read filter. Write validation still applies.
    pub trust_substrate: bool,
}

impl GuardOpts {
    /// Full enforcement: app-level filter plus the substrate.
    #[must_use]
    pub const fn enforced() -> Self {
        Self {
            enforce_tenant: true,
            trust_substrate: false,
        }
    }
}

impl Default for GuardOpts {
    fn default() -> Self {
        Self::enforced()
    }
}

/// Per-entity tenant guard.
///
/// Stateless apart from its flags; the tenant comes from the
/// [`TenantContext`] passed to every call, never from the guard itself.
pub struct TenantGuard<E> {
    opts: GuardOpts,
    _entity: PhantomData<E>,
}

impl<E> TenantGuard<E>
where
    E: TenantOwned,
    E::Column: ColumnTrait + Copy,
{
    #[must_use]
    pub fn new(opts: GuardOpts) -> Self {
        Self {
            opts,
            _entity: PhantomData,
        }
    }

    /// Guard with full enforcement.
    #[must_use]
    pub fn enforced() -> Self {
        Self::new(GuardOpts::enforced())
    }

    #[must_use]
    pub fn opts(&self) -> GuardOpts {
        self.opts
    }

    /// The read filter for this context, `None` when no filtering applies.
    ///
    /// Bound tenant: equality on the tenant column. Unbound super-admin: no
    /// filter. Unbound otherwise: deny-all, mirroring the substrate's
    /// fail-closed posture even where the substrate is absent.
    fn read_filter(&self, ctx: &TenantContext) -> Option<Condition> {
        let tenant_col = E::tenant_col()?;
        if !self.opts.enforce_tenant || self.opts.trust_substrate {
            return None;
        }
        match ctx.tenant_id() {
            Some(tenant_id) => Some(Condition::all().add(tenant_col.eq(tenant_id))),
            None if ctx.is_superuser() => None,
            None => Some(Condition::all().add(Expr::value(false))),
        }
    }

    fn scoped_select(&self, ctx: &TenantContext) -> Select<E> {
        let mut select = E::find();
        if let Some(cond) = self.read_filter(ctx) {
            select = select.filter(cond);
        }
        select
    }

    /// Fetch one row by id, tenant filter applied.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Db`] if the query fails.
    pub async fn get<C>(
        &self,
        conn: &C,
        ctx: &TenantContext,
        id: impl Into<Value> + Send,
    ) -> Result<Option<E::Model>, GuardError>
    where
        C: ConnectionTrait,
    {
        let found = self
            .scoped_select(ctx)
            .filter(E::id_col().eq(id.into()))
            .one(conn)
            .await?;
        Ok(found)
    }

    /// Fetch one row matching an arbitrary predicate, tenant filter applied
    /// in addition.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Db`] if the query fails.
    pub async fn get_by<C>(
        &self,
        conn: &C,
        ctx: &TenantContext,
        predicate: Condition,
    ) -> Result<Option<E::Model>, GuardError>
    where
        C: ConnectionTrait,
    {
        let found = self.scoped_select(ctx).filter(predicate).one(conn).await?;
        Ok(found)
    }

    /// List rows, tenant filter applied in addition to any caller filter.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Db`] if the query fails.
    pub async fn list<C>(
        &self,
        conn: &C,
        ctx: &TenantContext,
        filter: Option<Condition>,
        skip: Option<u64>,
        limit: Option<u64>,
    ) -> Result<Vec<E::Model>, GuardError>
    where
        C: ConnectionTrait,
    {
        let mut select = self.scoped_select(ctx);
        if let Some(cond) = filter {
            select = select.filter(cond);
        }
        let rows = select.offset(skip).limit(limit).all(conn).await?;
        Ok(rows)
    }

    /// Count rows visible to this context.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Db`] if the query fails.
    pub async fn count<C>(
        &self,
        conn: &C,
        ctx: &TenantContext,
        filter: Option<Condition>,
    ) -> Result<u64, GuardError>
    where
        C: ConnectionTrait,
        E::Model: Send + Sync,
    {
        let mut select = self.scoped_select(ctx);
        if let Some(cond) = filter {
            select = select.filter(cond);
        }
        Ok(select.count(conn).await?)
    }

    /// Insert a row, stamping the bound tenant.
    ///
    /// If the entity carries a tenant attribute and the caller left it
    /// unset, it is stamped with the bound tenant. A conflicting
    /// caller-supplied value is overwritten by the bound tenant and logged:
    /// the caller value is untrusted input, and the bound tenant wins.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Db`] if the insert fails.
    pub async fn create<C>(
        &self,
        conn: &C,
        ctx: &TenantContext,
        mut values: E::ActiveModel,
    ) -> Result<E::Model, GuardError>
    where
        C: ConnectionTrait,
        E::ActiveModel: ActiveModelTrait<Entity = E> + Send,
        E::Model: IntoActiveModel<E::ActiveModel>,
    {
        if self.opts.enforce_tenant
            && let Some(tenant_col) = E::tenant_col()
            && let Some(bound) = ctx.tenant_id()
        {
            let supplied = match values.get(tenant_col) {
                ActiveValue::Set(v) | ActiveValue::Unchanged(v) => tenant_of(&v),
                ActiveValue::NotSet => None,
            };
            match supplied {
                Some(t) if t != bound => {
                    tracing::warn!(
                        security = true,
                        entity = E::default().table_name(),
                        supplied = t,
                        bound,
                        "caller-supplied tenant on create overridden by bound tenant"
                    );
                    values.set(tenant_col, Value::BigInt(Some(bound)));
                }
                Some(_) => {}
                None => values.set(tenant_col, Value::BigInt(Some(bound))),
            }
        }
        Ok(values.insert(conn).await?)
    }

    /// Apply `changes` to an already-loaded row.
    ///
    /// When a tenant is bound, the existing row must belong to it;
    /// otherwise the update is refused with [`GuardError::CrossTenant`],
    /// which callers must keep distinguishable from "record not found". An
    /// attempt inside `changes` to move the row to another tenant is
    /// silently corrected back to the bound value and logged as a security
    /// event, not surfaced to the caller as an error.
    ///
    /// # Errors
    ///
    /// [`GuardError::CrossTenant`] on ownership mismatch, [`GuardError::Db`]
    /// if the update fails.
    pub async fn update<C>(
        &self,
        conn: &C,
        ctx: &TenantContext,
        existing: &E::Model,
        mut changes: E::ActiveModel,
    ) -> Result<E::Model, GuardError>
    where
        C: ConnectionTrait,
        E::ActiveModel: ActiveModelTrait<Entity = E> + Send,
        E::Model: IntoActiveModel<E::ActiveModel>,
    {
        if self.opts.enforce_tenant
            && let Some(tenant_col) = E::tenant_col()
            && let Some(bound) = ctx.tenant_id()
        {
            let owner = tenant_of(&existing.get(tenant_col));
            if owner != Some(bound) {
                return Err(GuardError::CrossTenant("row is owned by another tenant"));
            }

            let attempted = match changes.get(tenant_col) {
                ActiveValue::Set(v) => tenant_of(&v),
                ActiveValue::Unchanged(_) | ActiveValue::NotSet => Some(bound),
            };
            if attempted != Some(bound) {
                tracing::warn!(
                    security = true,
                    entity = E::default().table_name(),
                    attempted,
                    bound,
                    "attempt to reassign tenant attribute corrected to bound tenant"
                );
                changes.set(tenant_col, Value::BigInt(Some(bound)));
            }
        }

        // The update targets the row the caller loaded, not whatever the
        // changes happen to carry.
        if matches!(changes.get(E::id_col()), ActiveValue::NotSet) {
            changes.set(E::id_col(), existing.get(E::id_col()));
        }

        Ok(changes.update(conn).await?)
    }

    /// Delete one row by id.
    ///
    /// Same tenant-match precondition as [`update`](Self::update). Returns
    /// `false` when no such row exists. Note that under an active
    /// row-security policy a cross-tenant row is invisible to the lookup and
    /// reads as "not found" at the engine level; the explicit
    /// [`GuardError::CrossTenant`] arm covers the substrate-absent case.
    ///
    /// # Errors
    ///
    /// [`GuardError::CrossTenant`] on ownership mismatch, [`GuardError::Db`]
    /// if the delete fails.
    pub async fn delete<C>(
        &self,
        conn: &C,
        ctx: &TenantContext,
        id: impl Into<Value> + Send,
    ) -> Result<bool, GuardError>
    where
        C: ConnectionTrait,
    {
        let id_value: Value = id.into();
        let found = E::find()
            .filter(E::id_col().eq(id_value.clone()))
            .one(conn)
            .await?;
        let Some(existing) = found else {
            return Ok(false);
        };

        if self.opts.enforce_tenant
            && let Some(tenant_col) = E::tenant_col()
            && let Some(bound) = ctx.tenant_id()
            && tenant_of(&existing.get(tenant_col)) != Some(bound)
        {
            return Err(GuardError::CrossTenant("row is owned by another tenant"));
        }

        let result = E::delete_many()
            .filter(E::id_col().eq(id_value))
            .exec(conn)
            .await?;
        Ok(result.rows_affected > 0)
    }
}

impl<E> Default for TenantGuard<E>
where
    E: TenantOwned,
    E::Column: ColumnTrait + Copy,
{
    fn default() -> Self {
        Self::enforced()
    }
}

/// Extract a tenant id from a column value of any integer width.
fn tenant_of(value: &Value) -> Option<TenantId> {
    match value {
        Value::TinyInt(v) => v.map(TenantId::from),
        Value::SmallInt(v) => v.map(TenantId::from),
        Value::Int(v) => v.map(TenantId::from),
        Value::BigInt(v) => *v,
        Value::TinyUnsigned(v) => v.map(TenantId::from),
        Value::SmallUnsigned(v) => v.map(TenantId::from),
        Value::Unsigned(v) => v.map(TenantId::from),
        Value::BigUnsigned(v) => v.and_then(|u| TenantId::try_from(u).ok()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_of_handles_integer_widths() {
        assert_eq!(tenant_of(&Value::Int(Some(7))), Some(7));
        assert_eq!(tenant_of(&Value::BigInt(Some(7))), Some(7));
        assert_eq!(tenant_of(&Value::BigInt(None)), None);
        assert_eq!(tenant_of(&Value::String(None)), None);
        assert_eq!(tenant_of(&Value::BigUnsigned(Some(u64::MAX))), None);
    }
}
