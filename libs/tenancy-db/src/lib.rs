//! Storage-side tenant isolation enforcement.
//!
//! Multi-tenant requests share a fixed pool of physical connections, and the
//! engine-level row-security policies key off a mutable per-connection
//! session variable. Correctness therefore rests on three cooperating
//! pieces, all in this crate:
//!
//! - [`session`]: binds the resolved tenant onto the request's checked-out
//!   connection and clears it again before the connection can be reused.
//!   The double-clear lifecycle (defensive clear before bind, unconditional
//!   clear after the handler) is the single invariant the whole subsystem
//!   exists to uphold.
//! - [`rls`]: the declarative row-security contract this crate satisfies but
//!   does not reimplement, plus a startup self-check that every guarded
//!   table actually carries an active policy.
//! - [`guard`]: a per-entity data-access guard that applies its own tenant
//!   filter and write validation independently of the engine's policies,
//!   deliberate redundancy against substrate misconfiguration.
//!
//! Entities opt in through the [`TenantOwned`] capability trait, checked at
//! compile time. Identity resolution lives upstream in the `tenancy` crate.

pub mod entity;
pub mod error;
pub mod guard;
pub mod rls;
pub mod session;

pub use entity::TenantOwned;
pub use error::GuardError;
pub use guard::{GuardOpts, TenantGuard};
pub use rls::{GuardedTable, SESSION_VAR, verify_policies};
pub use session::{BindingPhase, EngineSession, SessionBinder, SessionState};
