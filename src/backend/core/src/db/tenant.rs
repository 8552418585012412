//! Tenant context and row-level-security checkout.
//!
//! No raw pool connection should be reachable by tenant-scoped code without
//! going through [`Database::checkout`]. It binds `app.current_tenant_id`,
//! `app.current_user_id`, and `app.current_role` as session GUCs on the
//! connection before handing it back, so Postgres' own RLS policies (see
//! `migrations/0001_init.sql`) do the enforcement rather than application code.

use serde::{Deserialize, Serialize};
use sqlx::{pool::PoolConnection, Postgres};

use crate::error::{AiseoError, ErrorCode, Result};

/// The three-value role recorded as `app.current_role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    Analyst,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Analyst => "analyst",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = AiseoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "admin" => Ok(Self::Admin),
            "manager" => Ok(Self::Manager),
            "analyst" => Ok(Self::Analyst),
            other => Err(AiseoError::new(
                ErrorCode::ValidationError,
                format!("unknown role: {other}"),
            )),
        }
    }
}

/// Identifies the tenant (and, optionally, the acting user/role) a request is
/// scoped to. Every tenant-facing query runs against a connection checked out
/// with this context.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant_id: String,
    pub user_id: Option<String>,
    pub role: Role,
}

impl TenantContext {
    pub fn new(tenant_id: impl Into<String>, role: Role) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: None,
            role,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// An internal-system context (the outbox dispatcher, the quota-sync job)
    /// that never binds `app.current_tenant_id` and so is only valid against
    /// tables without RLS predicates (`events_outbox`, `tenant_usage`).
    pub fn system() -> Self {
        Self {
            tenant_id: String::new(),
            user_id: None,
            role: Role::Admin,
        }
    }
}

/// A pool connection with the tenant GUCs already bound. Dropping it returns
/// the connection to the pool; Postgres resets session-level `SET` values set
/// via `set_config(..., is_local => true)` at transaction end regardless, but
/// we scope them `false` here since checkout hands out a plain connection, not
/// a transaction, and callers may run several statements against it.
pub struct TenantConn(pub(crate) PoolConnection<Postgres>);

impl std::ops::Deref for TenantConn {
    type Target = PoolConnection<Postgres>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::ops::DerefMut for TenantConn {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

pub(crate) async fn bind_session(conn: &mut PoolConnection<Postgres>, ctx: &TenantContext) -> Result<()> {
    sqlx::query("SELECT set_config('app.current_tenant_id', $1, false)")
        .bind(&ctx.tenant_id)
        .execute(&mut **conn)
        .await?;

    sqlx::query("SELECT set_config('app.current_user_id', $1, false)")
        .bind(ctx.user_id.as_deref().unwrap_or(""))
        .execute(&mut **conn)
        .await?;

    sqlx::query("SELECT set_config('app.current_role', $1, false)")
        .bind(ctx.role.as_str())
        .execute(&mut **conn)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_str() {
        for role in [Role::Admin, Role::Manager, Role::Analyst] {
            let parsed: Role = role.as_str().parse().unwrap();
            assert_eq!(parsed, role);
        }
    }

    #[test]
    fn unknown_role_is_rejected() {
        let result: Result<Role> = "superuser".parse();
        assert!(result.is_err());
    }
}
