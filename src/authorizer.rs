// src/authorizer.rs

//! Permission assertions over the caller's `PermissionSet`.
//!
//! The vocabulary is fixed: `service:{name}:{level}` and
//! `capability:{name}:{level}` with levels `read < write < admin`. Holding a
//! higher level satisfies a lower one, and `capability:{cap}:admin` satisfies
//! every assertion.

use crate::context::{PermissionSet, RequestContext};
use crate::error::GatekeeperError;
use std::fmt;
use std::sync::Arc;

/// Access level, ordered so that a higher level implies the lower ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Read,
    Write,
    Admin,
}

impl Level {
    const ALL: [Level; 3] = [Level::Read, Level::Write, Level::Admin];

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Read => "read",
            Level::Write => "write",
            Level::Admin => "admin",
        }
    }
}

/// What a permission is granted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope<'a> {
    Service(&'a str),
    Capability(&'a str),
}

impl Scope<'_> {
    /// The permission string granting `level` on this scope.
    pub fn permission(&self, level: Level) -> String {
        self.to_string() + ":" + level.as_str()
    }
}

impl fmt::Display for Scope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Service(name) => write!(f, "service:{}", name),
            Scope::Capability(name) => write!(f, "capability:{}", name),
        }
    }
}

/// Reads the caller's permissions for an assertion.
pub type PermissionAccessor = Arc<dyn Fn(&RequestContext) -> PermissionSet + Send + Sync>;

fn permissions_from_context(ctx: &RequestContext) -> PermissionSet {
    ctx.permissions().cloned().unwrap_or_default()
}

/// Performs authorization assertions for one capability.
#[derive(Clone)]
pub struct Authorizer {
    capability: String,
    permissions: PermissionAccessor,
}

impl fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authorizer").field("capability", &self.capability).finish_non_exhaustive()
    }
}

impl Authorizer {
    /// Creates an authorizer that reads permissions from the `RequestContext`.
    pub fn new(capability: impl Into<String>) -> Result<Self, GatekeeperError> {
        Self::with_accessor(capability, Arc::new(permissions_from_context))
    }

    /// Creates an authorizer that reads permissions through `accessor`.
    pub fn with_accessor(capability: impl Into<String>, accessor: PermissionAccessor) -> Result<Self, GatekeeperError> {
        let capability = capability.into();
        if capability.is_empty() {
            return Err(GatekeeperError::InvalidConfiguration("capability cannot be an empty string".to_string()));
        }
        Ok(Self { capability, permissions: accessor })
    }

    pub fn capability(&self) -> &str {
        &self.capability
    }

    /// At least read access to every service in `services`.
    pub fn assert_services_reader_or_capability_admin(&self, ctx: &RequestContext, services: &[&str]) -> Result<(), GatekeeperError> {
        self.assert_services(ctx, services, Level::Read)
    }

    /// At least write access to every service in `services`.
    pub fn assert_services_writer_or_capability_admin(&self, ctx: &RequestContext, services: &[&str]) -> Result<(), GatekeeperError> {
        self.assert_services(ctx, services, Level::Write)
    }

    /// Admin access to every service in `services`.
    pub fn assert_services_admin_or_capability_admin(&self, ctx: &RequestContext, services: &[&str]) -> Result<(), GatekeeperError> {
        self.assert_services(ctx, services, Level::Admin)
    }

    pub fn assert_capability_reader_or_capability_admin(&self, ctx: &RequestContext) -> Result<(), GatekeeperError> {
        self.assert_capability(ctx, Level::Read)
    }

    pub fn assert_capability_writer_or_capability_admin(&self, ctx: &RequestContext) -> Result<(), GatekeeperError> {
        self.assert_capability(ctx, Level::Write)
    }

    pub fn assert_capability_admin(&self, ctx: &RequestContext) -> Result<(), GatekeeperError> {
        self.assert_capability(ctx, Level::Admin)
    }

    fn assert_services(&self, ctx: &RequestContext, services: &[&str], required: Level) -> Result<(), GatekeeperError> {
        let scopes: Vec<Scope<'_>> = services.iter().map(|s| Scope::Service(*s)).collect();
        self.assert_scopes(ctx, &scopes, required)
    }

    fn assert_capability(&self, ctx: &RequestContext, required: Level) -> Result<(), GatekeeperError> {
        self.assert_scopes(ctx, &[Scope::Capability(&self.capability)], required)
    }

    /// The single predicate behind every assertion: capability admin wins,
    /// otherwise each scope needs `required` or higher. Missing scopes are
    /// reported as the `required` permission, in input order.
    fn assert_scopes(&self, ctx: &RequestContext, scopes: &[Scope<'_>], required: Level) -> Result<(), GatekeeperError> {
        let held = (self.permissions)(ctx);

        if held.contains(&Scope::Capability(&self.capability).permission(Level::Admin)) {
            return Ok(());
        }

        let missing: Vec<String> = scopes
            .iter()
            .filter(|scope| !holds(&held, scope, required))
            .map(|scope| scope.permission(required))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(GatekeeperError::MissingPermissions(missing))
        }
    }
}

fn holds(held: &PermissionSet, scope: &Scope<'_>, required: Level) -> bool {
    Level::ALL
        .iter()
        .filter(|level| **level >= required)
        .any(|level| held.contains(&scope.permission(*level)))
}
