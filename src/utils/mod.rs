//! 工具模块：日志脱敏与请求标识生成。
//!
//! | Item | Description |
//! |------|-------------|
//! | [`Sanitizer`] | Masks credentials before headers, URLs and params reach the logs |
//! | [`generate_request_id`] | Correlation ids attached to every dispatch |

pub mod request_id;
pub mod sanitize;

pub use request_id::generate_request_id;
pub use sanitize::{
    default_sensitive_headers, default_sensitive_params, mask_pattern, sanitize_headers,
    sanitize_url, sanitize_value, Sanitizer, MASK,
};
