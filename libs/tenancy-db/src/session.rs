//! Connection-scoped tenant binding.
//!
//! The engine's row-security policies read the bound tenant from a session
//! variable that lives on the physical connection, and the pool hands the
//! same physical connection to unrelated requests back to back. This module
//! owns the lifecycle that keeps that variable truthful for exactly one
//! request's borrow window:
//!
//! 1. before handling, clear the variable unconditionally (a prior borrower
//!    may have bound it and failed to clean up), then bind the resolved
//!    tenant if there is one;
//! 2. run all business queries on that same connection;
//! 3. clear again, unconditionally, before the connection is released,
//!    whether the handler succeeded or failed. A scope cancelled before
//!    its clear could run poisons the binder instead; pool integrations
//!    check [`SessionBinder::needs_discard`] and drop the connection
//!    rather than reuse it.
//!
//! A failed bind is logged and the request proceeds unbound; the engine
//! policies then deny tenant-scoped rows to non-admins, so resolution stays
//! fail-open while the data layer fails closed.

use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseBackend, DbErr, Statement};

use tenancy::{TenantContext, TenantId};

use crate::rls::SESSION_VAR;

/// Scalar session-state capability consumed from the storage engine: one
/// read, one set, one reset.
///
/// Implementations must target the single physical connection the request
/// has checked out; binding any other connection has no effect on the
/// queries actually run.
#[async_trait]
pub trait SessionState: Send {
    /// Set the session variable to `value`.
    async fn set(&mut self, value: &str) -> Result<(), DbErr>;

    /// Reset the session variable to its unbound state. Must be idempotent.
    async fn reset(&mut self) -> Result<(), DbErr>;

    /// Read the session variable back, `None` when unbound.
    async fn current(&mut self) -> Result<Option<String>, DbErr>;
}

/// [`SessionState`] implementation over a live engine connection.
///
/// On Postgres the variable is manipulated with `set_config` /
/// `current_setting`. Engines without per-session state (`SQLite` in local
/// development) turn set/reset into logged no-ops and always read back
/// unbound, since there is no substrate to signal to.
pub struct EngineSession<'c, C> {
    conn: &'c C,
    var: &'static str,
}

impl<'c, C> EngineSession<'c, C>
where
    C: ConnectionTrait,
{
    /// Session over the default tenant variable.
    #[must_use]
    pub fn new(conn: &'c C) -> Self {
        Self {
            conn,
            var: SESSION_VAR,
        }
    }
}

#[async_trait]
impl<C> SessionState for EngineSession<'_, C>
where
    C: ConnectionTrait + Send + Sync,
{
    async fn set(&mut self, value: &str) -> Result<(), DbErr> {
        let backend = self.conn.get_database_backend();
        if backend != DatabaseBackend::Postgres {
            tracing::debug!(var = self.var, "engine has no session state, skipping bind");
            return Ok(());
        }
        self.conn
            .execute(Statement::from_sql_and_values(
                backend,
                "SELECT set_config($1, $2, FALSE)",
                [self.var.into(), value.into()],
            ))
            .await?;
        Ok(())
    }

    async fn reset(&mut self) -> Result<(), DbErr> {
        let backend = self.conn.get_database_backend();
        if backend != DatabaseBackend::Postgres {
            return Ok(());
        }
        // set_config with an empty string; current_setting reads it back as
        // unbound. RESET cannot take a bind parameter.
        self.conn
            .execute(Statement::from_sql_and_values(
                backend,
                "SELECT set_config($1, '', FALSE)",
                [self.var.into()],
            ))
            .await?;
        Ok(())
    }

    async fn current(&mut self) -> Result<Option<String>, DbErr> {
        let backend = self.conn.get_database_backend();
        if backend != DatabaseBackend::Postgres {
            return Ok(None);
        }
        let row = self
            .conn
            .query_one(Statement::from_sql_and_values(
                backend,
                "SELECT current_setting($1, TRUE)",
                [self.var.into()],
            ))
            .await?;
        let raw: Option<String> = match row {
            Some(row) => row.try_get_by_index(0)?,
            None => None,
        };
        Ok(raw.filter(|s| !s.is_empty()))
    }
}

/// Phases of one request's binding lifecycle, in order. `Clearing` is
/// unconditional: it must be reached even when `Executing` failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingPhase {
    Init,
    Resolving,
    Bound,
    Unbound,
    Executing,
    Clearing,
    Released,
    /// A scope was dropped before its clear could run. The binding may be
    /// stale and the connection must be discarded, never pooled.
    Poisoned,
}

/// Binds and clears the tenant on one checked-out connection.
///
/// Owns the double-clear discipline: [`bind`](Self::bind) always issues a
/// defensive reset before setting anything, and [`clear`](Self::clear) must
/// be called before the connection is released, on every path. Prefer
/// [`scoped`](Self::scoped), which pairs the two mechanically.
pub struct SessionBinder<S> {
    session: S,
    phase: BindingPhase,
    bound: Option<TenantId>,
}

impl<S> SessionBinder<S>
where
    S: SessionState,
{
    #[must_use]
    pub fn new(session: S) -> Self {
        Self {
            session,
            phase: BindingPhase::Init,
            bound: None,
        }
    }

    #[must_use]
    pub fn phase(&self) -> BindingPhase {
        self.phase
    }

    /// Tenant this binder last bound successfully, if any.
    #[must_use]
    pub fn bound_tenant(&self) -> Option<TenantId> {
        self.bound
    }

    /// Whether the connection behind this binder must be discarded instead
    /// of returned to the pool.
    ///
    /// True whenever the lifecycle has not reached a clean endpoint: after
    /// a cancelled scope ([`BindingPhase::Poisoned`]), after a failed
    /// [`clear`](Self::clear), or while a binding is still active.
    #[must_use]
    pub fn needs_discard(&self) -> bool {
        !matches!(self.phase, BindingPhase::Init | BindingPhase::Released)
    }

    /// Bind the resolved tenant onto the connection.
    ///
    /// Always issues a clear first: never assume a freshly borrowed
    /// connection starts clean, since the pool may hand back one a prior
    /// request bound and failed to clear. Command failures are logged and
    /// leave the request unbound rather than failing it; the row-security
    /// policies then deny tenant-scoped rows to non-admins.
    pub async fn bind(&mut self, ctx: &TenantContext) {
        self.transition(BindingPhase::Resolving);

        if let Err(e) = self.session.reset().await {
            tracing::warn!(error = %e, "defensive tenant clear failed before bind");
        }

        match ctx.tenant_id() {
            Some(tenant_id) => match self.session.set(&tenant_id.to_string()).await {
                Ok(()) => {
                    self.bound = Some(tenant_id);
                    self.transition(BindingPhase::Bound);
                }
                Err(e) => {
                    tracing::warn!(
                        tenant_id,
                        error = %e,
                        "failed to bind tenant, proceeding unbound"
                    );
                    self.bound = None;
                    self.transition(BindingPhase::Unbound);
                }
            },
            None => {
                self.bound = None;
                self.transition(BindingPhase::Unbound);
            }
        }
    }

    /// Clear the binding before the connection goes back to the pool.
    ///
    /// Idempotent; repeated calls on an already-unbound connection are
    /// no-ops.
    ///
    /// # Errors
    ///
    /// A failed clear is returned (and logged at `error`) so pool
    /// integrations can discard the connection: a connection whose binding
    /// state is unknown must never be returned for reuse.
    pub async fn clear(&mut self) -> Result<(), DbErr> {
        self.transition(BindingPhase::Clearing);
        match self.session.reset().await {
            Ok(()) => {
                self.bound = None;
                self.transition(BindingPhase::Released);
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "failed to clear tenant binding, discard this connection instead of pooling it"
                );
                Err(e)
            }
        }
    }

    /// Read the bound tenant back from the connection.
    ///
    /// Unparsable values read back as unbound (logged).
    ///
    /// # Errors
    ///
    /// Returns the engine error if the session-state read fails.
    pub async fn read_bound(&mut self) -> Result<Option<TenantId>, DbErr> {
        let raw = self.session.current().await?;
        Ok(raw.and_then(|s| match s.parse::<TenantId>() {
            Ok(tenant_id) => Some(tenant_id),
            Err(_) => {
                tracing::warn!(value = %s, "unparsable tenant binding on connection");
                None
            }
        }))
    }

    /// Run `f` inside a bind/clear pair on this connection.
    ///
    /// The clear runs whether `f` succeeds or errors; its own failure is
    /// logged inside [`clear`](Self::clear) and does not replace `f`'s
    /// outcome. If the enclosing future is dropped mid-flight the clear
    /// cannot run here; the binder is then marked
    /// [`BindingPhase::Poisoned`] and [`needs_discard`](Self::needs_discard)
    /// reports the connection as unsafe to pool. The defensive reset in
    /// [`bind`](Self::bind) still protects the next borrower should a
    /// poisoned connection be pooled anyway.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returned.
    pub async fn scoped<T, E, F, Fut>(&mut self, ctx: &TenantContext, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.bind(ctx).await;
        self.transition(BindingPhase::Executing);
        let result = {
            let mut guard = PoisonOnDrop {
                binder: self,
                armed: true,
            };
            let result = f().await;
            guard.armed = false;
            result
        };
        let _ = self.clear().await;
        result
    }

    fn transition(&mut self, next: BindingPhase) {
        tracing::trace!(from = ?self.phase, to = ?next, "tenant binding phase");
        self.phase = next;
    }
}

/// Marks the binder poisoned if the executing scope is dropped before the
/// post-handler clear disarms it.
struct PoisonOnDrop<'a, S> {
    binder: &'a mut SessionBinder<S>,
    armed: bool,
}

impl<S> Drop for PoisonOnDrop<'_, S> {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!(
                bound = self.binder.bound,
                "scope dropped before clearing its tenant binding, poisoning connection"
            );
            self.binder.phase = BindingPhase::Poisoned;
        }
    }
}
