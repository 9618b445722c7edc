/// Errors from guarded data access.
#[derive(thiserror::Error, Debug)]
pub enum GuardError {
    /// Database error occurred during the operation.
    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),

    /// Write refused because the row belongs to another tenant.
    ///
    /// Deliberately distinguishable from "record not found": callers must be
    /// able to tell an authorization refusal from an absent row.
    #[error("not authorized for tenant: {0}")]
    CrossTenant(&'static str),

    /// A guarded table has no active row-security policy.
    #[error("no active row security policy on table: {0}")]
    PolicyMissing(String),
}
