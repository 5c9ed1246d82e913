//! 响应处理模块：解析、校验与格式化。
//!
//! # Response Processing
//!
//! After the transport returns, a dispatch runs three pluggable stages:
//!
//! | Stage | Trait | Built-ins |
//! |-------|-------|-----------|
//! | Parse | [`ResponseParser`] | [`JsonParser`], [`TextParser`], [`ContentParser`], [`RawParser`], [`StreamParser`], [`FileWriteParser`] |
//! | Validate | [`ResponseValidator`] | [`StatusCodeValidator`], [`JsonSchemaValidator`], closures |
//! | Format | [`ResponseFormatter`] | [`DefaultFormatter`], closures |
//!
//! Parser failures surface as `Parse` errors and validator failures as
//! `ResponseValidation` errors; neither is retried.

pub mod formatter;
pub mod parser;
pub mod validator;

pub use formatter::{DefaultFormatter, FormatContext, ResponseFormatter};
pub use parser::{
    ContentParser, FileWriteParser, JsonParser, ParseContext, RawParser, ResponseParser,
    StreamParser, TextParser, DEFAULT_CHUNK_SIZE, DEFAULT_DOWNLOAD_DIR, DEFAULT_FILE_NAME,
};
pub use validator::{
    JsonSchemaValidator, ResponseMeta, ResponseValidator, StatusCodeValidator, ValidatorChain,
};
