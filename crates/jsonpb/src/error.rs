/// Error is the complete set of failures surfaced while decoding.
/// A Parser which has returned an Error is halted: every subsequent
/// `feed` or `end` replays the same status. Errors are therefore Clone,
/// and PartialEq so tests can match on them directly.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("unexpected input near `{0}`")]
    Lexical(String),

    #[error("unknown field `{field}` of message `{message}`")]
    UnknownField { field: String, message: String },

    #[error("{0}")]
    TypeMismatch(String),

    #[error("cannot parse number `{literal}`: {detail}")]
    Number { literal: String, detail: String },

    #[error("unknown value `{name}` for enum field `{field}`")]
    EnumName { field: String, name: String },

    #[error("invalid base64 in field `{field}`: {detail}")]
    Base64 { field: String, detail: String },

    #[error("invalid duration `{0}`")]
    Duration(String),

    #[error("invalid timestamp `{0}`")]
    Timestamp(String),

    #[error("nesting too deep")]
    NestingTooDeep,

    #[error("unexpected end of input")]
    PrematureEof,

    #[error("invalid UTF-8 in `{0}`")]
    Utf8(String),

    #[error("internal error: {0}")]
    Internal(&'static str),
}
