//! Structured audit logging for switch control operations.
//!
//! Every control-plane mutation (static address, VLAN, forwarding domain,
//! port configuration, hardware commit, topology reset) produces one
//! [`AuditRecord`]. Records are emitted through `tracing` with the full
//! record attached as JSON under the `audit` target, so they can be filtered
//! and shipped independently of regular diagnostics.
//!
//! Outcome decides severity:
//!
//! | Outcome    | Level |
//! |------------|-------|
//! | Success    | info  |
//! | InProgress | debug |
//! | Failure    | warn  |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Audit event categories for the switch core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditCategory {
    /// Static MAC table changes
    StaticMacTable,
    /// VLAN table changes
    VlanTable,
    /// Forwarding domain allocation and release
    ForwardingDomain,
    /// Per-port configuration changes
    PortConfig,
    /// Writes of dirty entries to the chip
    HardwareCommit,
    /// Table flushes triggered by topology changes
    TopologyReset,
    /// Switch startup and shutdown
    SystemLifecycle,
}

impl fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditCategory::StaticMacTable => write!(f, "STATIC_MAC_TABLE"),
            AuditCategory::VlanTable => write!(f, "VLAN_TABLE"),
            AuditCategory::ForwardingDomain => write!(f, "FORWARDING_DOMAIN"),
            AuditCategory::PortConfig => write!(f, "PORT_CONFIG"),
            AuditCategory::HardwareCommit => write!(f, "HARDWARE_COMMIT"),
            AuditCategory::TopologyReset => write!(f, "TOPOLOGY_RESET"),
            AuditCategory::SystemLifecycle => write!(f, "SYSTEM_LIFECYCLE"),
        }
    }
}

/// Outcome of an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure,
    InProgress,
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditOutcome::Success => write!(f, "success"),
            AuditOutcome::Failure => write!(f, "failure"),
            AuditOutcome::InProgress => write!(f, "in_progress"),
        }
    }
}

/// One audited control operation.
///
/// Built with the `with_*` methods and handed to [`audit_log!`](crate::audit_log).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// UTC time the record was created
    pub timestamp: DateTime<Utc>,

    pub category: AuditCategory,

    /// Component that performed the action (e.g. "AddressTable")
    pub source: String,

    pub action: String,

    pub outcome: AuditOutcome,

    /// Affected object, e.g. a MAC address, VLAN id or table index
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,

    /// Examples: "static_mac", "vlan", "fid", "port"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditRecord {
    /// Create a new record stamped with the current time.
    ///
    /// The outcome defaults to InProgress until explicitly set.
    pub fn new(
        category: AuditCategory,
        source: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            category,
            source: source.into(),
            action: action.into(),
            outcome: AuditOutcome::InProgress,
            object_id: None,
            object_type: None,
            details: None,
            error: None,
        }
    }

    pub fn with_outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_object_id(mut self, id: impl Into<String>) -> Self {
        self.object_id = Some(id.into());
        self
    }

    pub fn with_object_type(mut self, obj_type: impl Into<String>) -> Self {
        self.object_type = Some(obj_type.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Set the error message and mark outcome as Failure.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self.outcome = AuditOutcome::Failure;
        self
    }

    /// Serialize the record for the `audit_json` log field.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"error":"serialization_failed","message":"{}"}}"#, e))
    }
}

/// Debug-level log line tagged with its source component.
///
/// ```ignore
/// debug_log!("PortSteering", port = 2, "frame dropped");
/// ```
#[macro_export]
macro_rules! debug_log {
    ($source:expr, $($arg:tt)*) => {
        tracing::debug!(
            source = $source,
            $($arg)*
        )
    };
}

/// Warn-level log line tagged with its source component.
#[macro_export]
macro_rules! warn_log {
    ($source:expr, $($arg:tt)*) => {
        tracing::warn!(
            source = $source,
            $($arg)*
        )
    };
}

/// Emit an [`AuditRecord`] at the level matching its outcome.
///
/// ```ignore
/// let record = AuditRecord::new(AuditCategory::VlanTable, "VlanTable", "add_vlan")
///     .with_outcome(AuditOutcome::Success)
///     .with_object_id("100")
///     .with_object_type("vlan");
/// audit_log!(record);
/// ```
#[macro_export]
macro_rules! audit_log {
    ($record:expr) => {
        let record = $record;
        match record.outcome {
            $crate::audit::AuditOutcome::Success => {
                tracing::info!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    outcome = %record.outcome,
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
            $crate::audit::AuditOutcome::InProgress => {
                tracing::debug!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    outcome = %record.outcome,
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
            $crate::audit::AuditOutcome::Failure => {
                tracing::warn!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    outcome = %record.outcome,
                    error = record.error.as_deref().unwrap_or(""),
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
        }
    };
}

/// Install a JSON `tracing` subscriber. `RUST_LOG` overrides `log_level`.
pub fn init_logging(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .json(),
        )
        .init();
}

/// Install a human-readable `tracing` subscriber for development.
pub fn init_logging_pretty(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .pretty(),
        )
        .init();
}
