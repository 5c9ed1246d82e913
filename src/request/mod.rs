//! 请求构建模块：端点模板、参数校验与请求组装。
//!
//! # Request Construction
//!
//! | Item | Description |
//! |------|-------------|
//! | [`endpoint`] | `{placeholder}` rendering, URL joining, query flattening |
//! | [`validator`] | [`RequestValidator`] trait plus [`RequiredFieldsValidator`] and [`JsonSchemaRequestValidator`] |

pub mod endpoint;
pub mod validator;

pub use endpoint::{join_url, placeholders, render_endpoint, to_query_pairs, RenderedEndpoint};
pub use validator::{
    JsonSchemaRequestValidator, RequestValidator, RequiredFieldsValidator, NON_FIELD_ERRORS,
};
