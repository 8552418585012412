//! Per-tenant quota enforcement.
//!
//! Hot-path checks hit Redis (an atomic increment-with-limit Lua script);
//! the durable `tenant_usage` table is reconciled hourly by taking the
//! `GREATEST` of the existing row and whatever Redis currently holds, so a
//! late durable write never regresses a counter below what Redis already
//! saw (spec §4.4). Redis being unreachable fails the quota check *open*
//! (request allowed, loudly logged) rather than blocking every tenant on a
//! cache outage.

pub mod engine;

pub use engine::{QuotaCheck, QuotaEngine, QuotaKind};
