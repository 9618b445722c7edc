//! Row-security substrate contract.
//!
//! The relational engine evaluates a declarative per-table predicate on
//! every statement: a row is visible when the bound tenant is unset, when
//! the row's tenant attribute equals the bound tenant, or when the
//! requesting principal satisfies the deployment's admin-bypass branch. This
//! crate consumes that capability, it does not reimplement it. Its only
//! obligation toward the engine is having the session variable set before a
//! statement arrives, which [`crate::session`] owns.
//!
//! What lives here is the contract surface: the session variable name, the
//! DDL templates a deployment applies per guarded table, and a startup
//! self-check asserting that every guarded table actually carries an active
//! policy. A missing policy is undetectable at request time (the engine
//! silently returns everything), so the self-check is the only place the
//! gap can surface.

use sea_orm::{ConnectionTrait, DatabaseBackend, IdenStatic, Statement};

use crate::entity::TenantOwned;
use crate::error::GuardError;

/// Session variable carrying the bound tenant.
pub const SESSION_VAR: &str = "app.current_tenant";

/// Helper function the policies call to read the bound tenant as an integer.
pub const CURRENT_TENANT_FN: &str = "app.current_tenant_id";

/// A table participating in row security.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardedTable {
    pub table: String,
    pub tenant_column: String,
}

impl GuardedTable {
    #[must_use]
    pub fn new(table: impl Into<String>, tenant_column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            tenant_column: tenant_column.into(),
        }
    }

    /// Derive the guarded table for a tenant-owned entity, `None` for global
    /// entities.
    #[must_use]
    pub fn of<E>() -> Option<Self>
    where
        E: TenantOwned,
    {
        let col = E::tenant_col()?;
        Some(Self::new(E::default().table_name(), col.as_str()))
    }
}

/// DDL creating the schema and the bound-tenant helper function.
///
/// `current_setting` raises on a missing variable; the helper swallows that
/// and reads unset or unparsable state as "no tenant", matching the
/// fail-open resolution posture.
#[must_use]
pub fn session_helper_ddl() -> Vec<String> {
    vec![
        "CREATE SCHEMA IF NOT EXISTS app".to_owned(),
        format!(
            "CREATE OR REPLACE FUNCTION {CURRENT_TENANT_FN}()\n\
             RETURNS BIGINT AS $$\n\
             BEGIN\n\
                 RETURN NULLIF(current_setting('{SESSION_VAR}', TRUE), '')::BIGINT;\n\
             EXCEPTION\n\
                 WHEN OTHERS THEN\n\
                     RETURN NULL;\n\
             END;\n\
             $$ LANGUAGE plpgsql STABLE"
        ),
    ]
}

/// DDL enabling row security and installing the tenant-isolation policy on
/// one guarded table.
///
/// `admin_predicate` is the deployment's admin-bypass branch (e.g. an
/// `EXISTS` probe against its principal table); when `None` the policy only
/// carries the unset-tenant and tenant-equality branches.
#[must_use]
pub fn policy_ddl(table: &GuardedTable, admin_predicate: Option<&str>) -> Vec<String> {
    let mut using = format!(
        "({f}() IS NULL) OR ({col} = {f}())",
        f = CURRENT_TENANT_FN,
        col = table.tenant_column,
    );
    if let Some(admin) = admin_predicate {
        using = format!("{using} OR ({admin})");
    }
    vec![
        format!("ALTER TABLE {} ENABLE ROW LEVEL SECURITY", table.table),
        format!(
            "CREATE POLICY tenant_isolation ON {} USING ({using})",
            table.table
        ),
    ]
}

/// Startup self-check: assert every guarded table has at least one active
/// policy.
///
/// Run once at boot, after migrations. Skipped with a debug log on engines
/// without row security (there is nothing to verify and the app-level guard
/// is the only filter).
///
/// # Errors
///
/// Returns [`GuardError::PolicyMissing`] naming the first unguarded table,
/// or [`GuardError::Db`] if the catalog query fails.
pub async fn verify_policies<C>(conn: &C, tables: &[GuardedTable]) -> Result<(), GuardError>
where
    C: ConnectionTrait,
{
    let backend = conn.get_database_backend();
    if backend != DatabaseBackend::Postgres {
        tracing::debug!("engine has no row security, skipping policy self-check");
        return Ok(());
    }

    for guarded in tables {
        let row = conn
            .query_one(Statement::from_sql_and_values(
                backend,
                "SELECT COUNT(*) FROM pg_policies \
                 WHERE schemaname = current_schema() AND tablename = $1",
                [guarded.table.clone().into()],
            ))
            .await?;
        let policies: i64 = match row {
            Some(row) => row.try_get_by_index(0)?,
            None => 0,
        };
        if policies == 0 {
            return Err(GuardError::PolicyMissing(guarded.table.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::collections::BTreeMap;

    use sea_orm::{MockDatabase, Value};

    use super::*;

    fn policy_count(n: i64) -> BTreeMap<&'static str, Value> {
        BTreeMap::from([("count", Value::BigInt(Some(n)))])
    }

    #[tokio::test]
    async fn policy_check_flags_unguarded_table() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![policy_count(0)]])
            .into_connection();

        let err = verify_policies(&db, &[GuardedTable::new("notes", "tenant_id")])
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::PolicyMissing(table) if table == "notes"));
    }

    #[tokio::test]
    async fn policy_check_passes_when_every_table_is_guarded() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![policy_count(1)], vec![policy_count(2)]])
            .into_connection();

        let tables = [
            GuardedTable::new("notes", "tenant_id"),
            GuardedTable::new("projects", "tenant_id"),
        ];
        verify_policies(&db, &tables).await.unwrap();
    }

    #[test]
    fn policy_ddl_covers_all_branches() {
        let table = GuardedTable::new("notes", "tenant_id");
        let ddl = policy_ddl(&table, Some("is_platform_admin()"));

        assert_eq!(ddl.len(), 2);
        assert!(ddl[0].contains("ALTER TABLE notes ENABLE ROW LEVEL SECURITY"));
        assert!(ddl[1].contains("CREATE POLICY tenant_isolation ON notes"));
        assert!(ddl[1].contains("app.current_tenant_id() IS NULL"));
        assert!(ddl[1].contains("tenant_id = app.current_tenant_id()"));
        assert!(ddl[1].contains("is_platform_admin()"));
    }

    #[test]
    fn policy_ddl_without_admin_branch() {
        let table = GuardedTable::new("notes", "tenant_id");
        let ddl = policy_ddl(&table, None);
        assert!(!ddl[1].contains(" OR ()"));
        assert!(ddl[1].contains("tenant_id = app.current_tenant_id()"));
    }

    #[test]
    fn helper_ddl_reads_session_var() {
        let ddl = session_helper_ddl();
        assert!(ddl[1].contains("current_setting('app.current_tenant', TRUE)"));
        assert!(ddl[1].contains("RETURN NULL"));
    }
}
