use super::{FieldDef, FieldKind, MessageDef, WellKnown};
use fxhash::FxHashMap;
use std::fmt;

/// An immutable pool of message, field, and enum descriptors.
///
/// Built once through [`super::SchemaBuilder`] and then only read.
/// Handles into the pool ([`Msg`], [`Fld`]) are `Copy` and borrow the
/// pool, so they can be freely stored in parser frames.
pub struct SchemaPool {
    pub(super) messages: Vec<MessageData>,
    pub(super) enums: Vec<EnumData>,
    pub(super) by_name: FxHashMap<String, usize>,
}

pub(super) struct MessageData {
    pub(super) full_name: String,
    pub(super) fields: Vec<FieldData>,
    // Maps both the proto name and a distinct json_name to a field index.
    pub(super) by_json_name: FxHashMap<String, usize>,
    pub(super) by_number: FxHashMap<u32, usize>,
    pub(super) well_known: Option<WellKnown>,
}

pub(super) struct FieldData {
    pub(super) name: String,
    pub(super) number: u32,
    pub(super) kind: FieldKind,
    pub(super) repeated: bool,
    pub(super) map: bool,
    // Index of the message type (for Message kind) into SchemaPool::messages.
    pub(super) message: Option<usize>,
    // Index of the enum type (for Enum kind) into SchemaPool::enums.
    pub(super) enum_: Option<usize>,
}

pub(super) struct EnumData {
    pub(super) by_name: FxHashMap<String, i32>,
}

impl SchemaPool {
    pub fn builder() -> super::SchemaBuilder {
        super::SchemaBuilder::new()
    }

    /// Look up a message type by its fully-qualified name.
    pub fn message(&self, full_name: &str) -> Option<Msg<'_>> {
        self.by_name
            .get(full_name)
            .map(|&id| Msg { pool: self, id })
    }
}

impl fmt::Debug for SchemaPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaPool")
            .field("messages", &self.messages.len())
            .field("enums", &self.enums.len())
            .finish()
    }
}

/// A `Copy` handle to one message type of a [`SchemaPool`].
#[derive(Copy, Clone)]
pub struct Msg<'p> {
    pool: &'p SchemaPool,
    id: usize,
}

/// A `Copy` handle to one field of a [`SchemaPool`] message.
#[derive(Copy, Clone)]
pub struct Fld<'p> {
    pool: &'p SchemaPool,
    msg: usize,
    index: usize,
}

impl<'p> Msg<'p> {
    fn data(&self) -> &'p MessageData {
        &self.pool.messages[self.id]
    }

    fn field(&self, index: usize) -> Fld<'p> {
        Fld {
            pool: self.pool,
            msg: self.id,
            index,
        }
    }
}

impl<'p> MessageDef for Msg<'p> {
    type Field = Fld<'p>;

    fn full_name(&self) -> &str {
        &self.data().full_name
    }

    fn field_by_json_name(&self, name: &str) -> Option<Fld<'p>> {
        let index = *self.data().by_json_name.get(name)?;
        Some(self.field(index))
    }

    fn field_by_number(&self, number: u32) -> Option<Fld<'p>> {
        let index = *self.data().by_number.get(&number)?;
        Some(self.field(index))
    }

    fn well_known(&self) -> Option<WellKnown> {
        self.data().well_known
    }
}

impl<'p> Fld<'p> {
    fn data(&self) -> &'p FieldData {
        &self.pool.messages[self.msg].fields[self.index]
    }
}

impl<'p> FieldDef for Fld<'p> {
    type Message = Msg<'p>;

    fn name(&self) -> &str {
        &self.data().name
    }

    fn number(&self) -> u32 {
        self.data().number
    }

    fn kind(&self) -> FieldKind {
        self.data().kind
    }

    fn is_repeated(&self) -> bool {
        self.data().repeated
    }

    fn is_map(&self) -> bool {
        self.data().map
    }

    fn message_type(&self) -> Option<Msg<'p>> {
        self.data().message.map(|id| Msg {
            pool: self.pool,
            id,
        })
    }

    fn enum_value(&self, name: &str) -> Option<i32> {
        let enum_ = &self.pool.enums[self.data().enum_?];
        enum_.by_name.get(name).copied()
    }
}

impl fmt::Debug for Msg<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.data().full_name)
    }
}

impl fmt::Debug for Fld<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}",
            self.pool.messages[self.msg].full_name,
            self.data().name
        )
    }
}
