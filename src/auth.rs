//! Session and role resolution — the identity seam.
//!
//! The core never derives organization scope from request payloads; every
//! handler resolves the ambient bearer token to a [`Session`] first and
//! threads its `org_id` through all store access. Identity internals are a
//! black box behind [`SessionResolver`].

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// What an organization member is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Supervisor,
    Worker,
}

impl Role {
    /// Whether this role may plan and assign work.
    pub fn can_schedule(&self) -> bool {
        matches!(self, Role::Admin | Role::Supervisor)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::Supervisor => write!(f, "supervisor"),
            Self::Worker => write!(f, "worker"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "supervisor" => Ok(Self::Supervisor),
            "worker" => Ok(Self::Worker),
            _ => Err(format!("Unknown role: {s}")),
        }
    }
}

/// A resolved caller identity.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: Uuid,
    pub org_id: Uuid,
    pub role: Role,
}

/// Maps an ambient bearer token to a session, or `None` if unauthenticated.
#[async_trait]
pub trait SessionResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> Option<Session>;
}

/// Token-table resolver backed by a static in-memory map.
///
/// Suitable for development and tests; production deployments plug in
/// their own [`SessionResolver`].
#[derive(Default)]
pub struct StaticTokenResolver {
    tokens: HashMap<String, Session>,
}

impl StaticTokenResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token for a session.
    pub fn insert(&mut self, token: impl Into<String>, session: Session) {
        self.tokens.insert(token.into(), session);
    }

    /// Parse `CREWPLAN_TOKENS` — comma-separated `token=user_id:org_id:role`
    /// entries. Malformed entries are skipped with a warning.
    pub fn from_env() -> Self {
        let mut resolver = Self::new();
        let raw = match std::env::var("CREWPLAN_TOKENS") {
            Ok(raw) => raw,
            Err(_) => return resolver,
        };

        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            match parse_token_entry(entry) {
                Some((token, session)) => resolver.insert(token, session),
                None => warn!(entry, "Skipping malformed CREWPLAN_TOKENS entry"),
            }
        }
        resolver
    }
}

fn parse_token_entry(entry: &str) -> Option<(String, Session)> {
    let (token, rest) = entry.split_once('=')?;
    let mut parts = rest.split(':');
    let user_id = parts.next()?.parse().ok()?;
    let org_id = parts.next()?.parse().ok()?;
    let role = parts.next()?.parse().ok()?;
    Some((
        token.to_string(),
        Session {
            user_id,
            org_id,
            role,
        },
    ))
}

#[async_trait]
impl SessionResolver for StaticTokenResolver {
    async fn resolve(&self, token: &str) -> Option<Session> {
        self.tokens.get(token).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduling_roles() {
        assert!(Role::Admin.can_schedule());
        assert!(Role::Supervisor.can_schedule());
        assert!(!Role::Worker.can_schedule());
    }

    #[test]
    fn parses_token_entry() {
        let user = Uuid::new_v4();
        let org = Uuid::new_v4();
        let entry = format!("secret={user}:{org}:supervisor");
        let (token, session) = parse_token_entry(&entry).unwrap();
        assert_eq!(token, "secret");
        assert_eq!(session.user_id, user);
        assert_eq!(session.org_id, org);
        assert_eq!(session.role, Role::Supervisor);
    }

    #[test]
    fn rejects_malformed_entry() {
        assert!(parse_token_entry("no-equals-sign").is_none());
        assert!(parse_token_entry("tok=not-a-uuid:x:worker").is_none());
    }

    #[tokio::test]
    async fn resolves_registered_token() {
        let mut resolver = StaticTokenResolver::new();
        let session = Session {
            user_id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            role: Role::Worker,
        };
        resolver.insert("tok", session.clone());

        let resolved = resolver.resolve("tok").await.unwrap();
        assert_eq!(resolved.user_id, session.user_id);
        assert!(resolver.resolve("other").await.is_none());
    }
}
