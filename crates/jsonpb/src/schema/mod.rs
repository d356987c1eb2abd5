//! Read-only descriptor views consumed by the parser, plus an in-memory
//! pool implementation and its builder.
//!
//! The parser is generic over [`MessageDef`] and [`FieldDef`] so that any
//! schema registry (a generated descriptor set, a dynamic pool, a test
//! fixture) can drive it. [`SchemaPool`] is the reference implementation.

pub mod build;
pub mod pool;

pub use build::{BuildError, FieldType, MessageBuilder, SchemaBuilder};
pub use pool::{Fld, Msg, SchemaPool};

/// The declared type of a field, as relevant to JSON decoding.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Bool,
    Int32,
    Int64,
    UInt32,
    UInt64,
    Float,
    Double,
    String,
    Bytes,
    Enum,
    Message,
}

/// Message types whose JSON representation is structurally special.
/// Classification is by full name (`google.protobuf.*`).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WellKnown {
    DoubleValue,
    FloatValue,
    Int64Value,
    UInt64Value,
    Int32Value,
    UInt32Value,
    BoolValue,
    StringValue,
    BytesValue,
    Value,
    Struct,
    ListValue,
    Duration,
    Timestamp,
}

impl WellKnown {
    pub fn from_full_name(name: &str) -> Option<Self> {
        use WellKnown::*;

        Some(match name {
            "google.protobuf.DoubleValue" => DoubleValue,
            "google.protobuf.FloatValue" => FloatValue,
            "google.protobuf.Int64Value" => Int64Value,
            "google.protobuf.UInt64Value" => UInt64Value,
            "google.protobuf.Int32Value" => Int32Value,
            "google.protobuf.UInt32Value" => UInt32Value,
            "google.protobuf.BoolValue" => BoolValue,
            "google.protobuf.StringValue" => StringValue,
            "google.protobuf.BytesValue" => BytesValue,
            "google.protobuf.Value" => Value,
            "google.protobuf.Struct" => Struct,
            "google.protobuf.ListValue" => ListValue,
            "google.protobuf.Duration" => Duration,
            "google.protobuf.Timestamp" => Timestamp,
            _ => return None,
        })
    }

    /// Wrappers accept a scalar JSON value in place of an object.
    pub fn is_wrapper(&self) -> bool {
        use WellKnown::*;
        matches!(
            self,
            DoubleValue
                | FloatValue
                | Int64Value
                | UInt64Value
                | Int32Value
                | UInt32Value
                | BoolValue
                | StringValue
                | BytesValue
        )
    }
}

/// A read-only view of one message type.
///
/// Implementations are cheap `Copy` handles (typically an index into a
/// pool); the parser stores them by value in its frame stack.
pub trait MessageDef: Copy {
    type Field: FieldDef<Message = Self>;

    /// Fully-qualified name, e.g. `google.protobuf.Duration`.
    fn full_name(&self) -> &str;

    /// Resolve a JSON member name to a field. Both the proto-declared
    /// field name and a distinct `json_name` must resolve.
    fn field_by_json_name(&self, name: &str) -> Option<Self::Field>;

    /// Resolve a field by its declared number. Mapentry messages expose
    /// key as 1 and value as 2; well-known synthetic members use their
    /// `descriptor.proto` numbers.
    fn field_by_number(&self, number: u32) -> Option<Self::Field>;

    /// Well-known-type classification, if any.
    fn well_known(&self) -> Option<WellKnown>;
}

/// A read-only view of one field of a message.
pub trait FieldDef: Copy {
    type Message: MessageDef<Field = Self>;

    /// The proto-declared field name.
    fn name(&self) -> &str;

    fn number(&self) -> u32;

    fn kind(&self) -> FieldKind;

    fn is_repeated(&self) -> bool;

    /// True for `map<K,V>` fields. Map fields are also repeated; their
    /// message type is the synthetic mapentry.
    fn is_map(&self) -> bool;

    /// The message type of a `FieldKind::Message` field.
    fn message_type(&self) -> Option<Self::Message>;

    /// Resolve a symbolic enum value name for a `FieldKind::Enum` field.
    fn enum_value(&self, name: &str) -> Option<i32>;
}
