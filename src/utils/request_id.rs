//! Request identifiers used to correlate log lines across a dispatch.

use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Build an id of the form `REQ-{unix_millis}-{8 hex}[-{suffix}]`.
///
/// Batch jobs pass their slot index as the suffix.
pub fn generate_request_id(suffix: Option<&str>) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let random = Uuid::new_v4().simple().to_string();
    match suffix {
        Some(s) if !s.is_empty() => format!("REQ-{}-{}-{}", millis, &random[..8], s),
        _ => format!("REQ-{}-{}", millis, &random[..8]),
    }
}
