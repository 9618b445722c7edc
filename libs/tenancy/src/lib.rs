//! Tenant identity resolution and request-scoped tenancy context.
//!
//! This crate owns the identity side of tenant isolation: deriving a
//! candidate tenant from request inputs, carrying it through the request as
//! an explicit [`TenantContext`], and caching display-only tenant metadata.
//!
//! It deliberately has no database dependencies. Enforcement against the
//! storage layer lives in `stratum-tenancy-db`, which consumes the context
//! types defined here.
//!
//! Resolution is fail-open: a malformed or absent tenant signal yields an
//! unbound context and the request proceeds. The storage-side guard and the
//! engine's row-security policies then fail closed for tenant-scoped data.

pub mod ambient;
pub mod cache;
pub mod config;
pub mod context;
pub mod resolver;

pub use ambient::{current_tenant, with_tenant};
pub use cache::{TenantCache, TenantDescriptor};
pub use config::TenancyConfig;
pub use context::{Principal, TenantContext, TenantId, TenantSource};
pub use resolver::TenantResolver;
