//! Access control configuration model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// What matching a policy means for the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuleAction {
    /// Policies enumerate what is allowed; anything else is denied.
    Allow,
    /// Policies enumerate what is denied; anything else is allowed.
    Deny,
}

/// Top-level access control configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RbacConfig {
    /// Optional config version tag, for operators.
    #[serde(default)]
    pub version: String,

    /// How a policy match is interpreted.
    pub action: RuleAction,

    /// Named policies, evaluated in name order for deterministic reasons.
    #[serde(default)]
    pub policies: BTreeMap<String, PolicyConfig>,
}

/// One named policy: a disjunction of permissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// The policy matches when any of these permissions matches.
    pub permissions: Vec<PermissionConfig>,
}

/// A single permission predicate over the connection and headers.
///
/// An absent predicate never restricts; a predicate that cannot be
/// evaluated (no local address, no headers) does not match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PermissionConfig {
    /// Matches every request.
    Any,

    /// Destination (local) IP within a CIDR range, e.g. `"1.2.3.0/24"`.
    DestinationIp {
        /// The CIDR range, `a.b.c.d/len` or a bare address.
        address: String,
    },

    /// Destination (local) port equality.
    DestinationPort {
        /// The port to match.
        port: u16,
    },

    /// A header with this name is present, whatever its value.
    HeaderPresent {
        /// Header name.
        name: String,
    },

    /// A header with this name carries exactly this value.
    HeaderValue {
        /// Header name.
        name: String,
        /// Required value.
        value: String,
    },

    /// All nested rules must match.
    AndRules {
        /// The conjuncts.
        rules: Vec<PermissionConfig>,
    },

    /// At least one nested rule must match.
    OrRules {
        /// The disjuncts.
        rules: Vec<PermissionConfig>,
    },
}
