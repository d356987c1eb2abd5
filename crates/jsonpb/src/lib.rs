//! Streaming decoder from proto3 JSON into typed field-emission events.
//!
//! A [`Parser`] consumes a JSON byte stream in arbitrary chunks and
//! drives a [`Sink`] with structured callbacks (message, sequence, and
//! submessage framing, string runs, typed scalar puts) resolved against
//! a protobuf schema. The schema is consumed through the read-only
//! [`schema::MessageDef`] / [`schema::FieldDef`] traits;
//! [`schema::SchemaPool`] is the built-in implementation.
//!
//! ```
//! use jsonpb::schema::{FieldType, SchemaPool};
//! use jsonpb::{Options, Parser, TraceSink};
//!
//! let mut builder = SchemaPool::builder();
//! builder.message("test.Item").field(1, "count", FieldType::Int32);
//! let pool = builder.build().unwrap();
//!
//! let root = pool.message("test.Item").unwrap();
//! let mut parser = Parser::new(root, TraceSink::new(), Options::default());
//! parser.feed(b"{\"count\": 42}").unwrap();
//! parser.end().unwrap();
//!
//! assert_eq!(
//!     parser.sink().calls,
//!     vec!["start_msg", "put_int32(count, 42)", "end_msg"],
//! );
//! ```

mod error;
pub use error::Error;

// Read-only descriptor traits, and the in-memory pool + builder.
pub mod schema;

// The event-stream consumer trait, and a recording implementation.
mod sink;
pub use sink::{Sink, TraceSink};

// Accumulator, capture regions, and the multipart text controller.
mod text;

// The table-driven lexical core.
mod fsm;

// Numeric literal conversion against the bound field's type.
mod number;

// Duration / Timestamp literals and base64 payloads.
mod wkt;

// The streaming driver and semantic layer.
mod parser;
pub use parser::{Options, Parser, MAX_DEPTH};
