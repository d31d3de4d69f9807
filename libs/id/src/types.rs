//! Typed id definitions for all control-plane resources.

use crate::define_id;

// =============================================================================
// Tenancy
// =============================================================================

define_id!(CustomerId, "cus");
define_id!(TemplateId, "tpl");

// =============================================================================
// Runtime
// =============================================================================

define_id!(NodeId, "node");
define_id!(DeploymentId, "dep");

/// Reference of the node the control plane itself runs on.
pub const LOCAL_NODE_REF: &str = "local";

impl NodeId {
    /// The local node sentinel.
    #[must_use]
    pub fn local() -> Self {
        Self(LOCAL_NODE_REF.to_string())
    }

    /// Returns true if this id is the local node sentinel.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.0 == LOCAL_NODE_REF
    }
}
