//! The access control engine.

use tracing::debug;

use super::config::{RbacConfig, RuleAction};
use super::error::RbacResult;
use super::permission::{ConnectionAccessor, HeaderMap, Permission};

/// A compiled policy: matches when any of its permissions matches.
#[derive(Debug)]
struct Policy {
    name: String,
    permissions: Vec<Permission>,
}

impl Policy {
    fn matches(&self, conn: Option<&dyn ConnectionAccessor>, headers: Option<&HeaderMap>) -> bool {
        self.permissions.iter().any(|p| p.matches(conn, headers))
    }
}

/// Boolean policy engine over destination address, port, and headers.
///
/// Consumes only a read-only view of the connection's local address and
/// a caller-supplied header map; it never touches connection state.
#[derive(Debug)]
pub struct AccessControlEngine {
    action: RuleAction,
    policies: Vec<Policy>,
}

impl AccessControlEngine {
    /// Compile an engine from configuration, validating predicates.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed CIDR ranges or addresses.
    pub fn new(config: &RbacConfig) -> RbacResult<Self> {
        let mut policies = Vec::with_capacity(config.policies.len());
        for (name, policy) in &config.policies {
            let permissions = policy
                .permissions
                .iter()
                .map(Permission::compile)
                .collect::<RbacResult<Vec<_>>>()?;
            policies.push(Policy {
                name: name.clone(),
                permissions,
            });
        }

        Ok(Self {
            action: config.action,
            policies,
        })
    }

    /// Compile an engine from a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a predicate is invalid.
    pub fn from_json(json: &str) -> RbacResult<Self> {
        let config: RbacConfig = serde_json::from_str(json)?;
        Self::new(&config)
    }

    /// Evaluate whether the request is allowed.
    ///
    /// Returns the decision plus a reason naming the policy that drove
    /// it. With `action = Allow` the policies enumerate what is
    /// permitted; with `action = Deny` they enumerate what is blocked.
    #[must_use]
    pub fn allowed(
        &self,
        conn: Option<&dyn ConnectionAccessor>,
        headers: Option<&HeaderMap>,
    ) -> (bool, String) {
        for policy in &self.policies {
            if policy.matches(conn, headers) {
                let (allowed, verdict) = match self.action {
                    RuleAction::Allow => (true, "allowed"),
                    RuleAction::Deny => (false, "denied"),
                };
                debug!(policy = %policy.name, allowed, "access control policy matched");
                return (allowed, format!("{verdict} by policy '{}'", policy.name));
            }
        }

        match self.action {
            RuleAction::Allow => (false, "no allow policy matched".to_string()),
            RuleAction::Deny => (true, "no deny policy matched".to_string()),
        }
    }

    /// Number of compiled policies.
    #[must_use]
    pub fn policy_count(&self) -> usize {
        self.policies.len()
    }
}
