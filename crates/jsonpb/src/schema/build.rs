use super::pool::{EnumData, FieldData, MessageData, SchemaPool};
use super::{FieldKind, WellKnown};
use fxhash::FxHashMap;

#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    #[error("duplicate message name `{0}`")]
    DuplicateMessage(String),
    #[error("duplicate enum name `{0}`")]
    DuplicateEnum(String),
    #[error("duplicate field number {number} in message `{message}`")]
    DuplicateFieldNumber { message: String, number: u32 },
    #[error("duplicate JSON name `{name}` in message `{message}`")]
    DuplicateJsonName { message: String, name: String },
    #[error("field `{message}.{field}` references unknown type `{type_name}`")]
    UnresolvedType {
        message: String,
        field: String,
        type_name: String,
    },
    #[error("map field `{message}.{field}` has non-scalar key type")]
    InvalidMapKey { message: String, field: String },
}

/// The declared type of a field under construction. Message and enum
/// references are by fully-qualified name, resolved at `build`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Bool,
    Int32,
    Int64,
    UInt32,
    UInt64,
    Float,
    Double,
    String,
    Bytes,
    Enum(String),
    Message(String),
}

impl FieldType {
    fn kind(&self) -> FieldKind {
        match self {
            FieldType::Bool => FieldKind::Bool,
            FieldType::Int32 => FieldKind::Int32,
            FieldType::Int64 => FieldKind::Int64,
            FieldType::UInt32 => FieldKind::UInt32,
            FieldType::UInt64 => FieldKind::UInt64,
            FieldType::Float => FieldKind::Float,
            FieldType::Double => FieldKind::Double,
            FieldType::String => FieldKind::String,
            FieldType::Bytes => FieldKind::Bytes,
            FieldType::Enum(_) => FieldKind::Enum,
            FieldType::Message(_) => FieldKind::Message,
        }
    }

    fn is_valid_map_key(&self) -> bool {
        matches!(
            self,
            FieldType::Bool
                | FieldType::Int32
                | FieldType::Int64
                | FieldType::UInt32
                | FieldType::UInt64
                | FieldType::String
        )
    }
}

/// Accumulates message and enum declarations, then resolves cross
/// references and synthesizes mapentry types into a [`SchemaPool`].
pub struct SchemaBuilder {
    messages: Vec<MessageDraft>,
    enums: Vec<(String, Vec<(String, i32)>)>,
}

pub struct MessageBuilder<'b> {
    draft: &'b mut MessageDraft,
}

struct MessageDraft {
    full_name: String,
    fields: Vec<FieldDraft>,
}

pub struct FieldDraft {
    name: String,
    json_name: Option<String>,
    number: u32,
    type_: FieldType,
    repeated: bool,
    // For map fields: the key type. `type_` is then the value type.
    map_key: Option<FieldType>,
}

impl FieldDraft {
    /// Override the derived lowerCamelCase `json_name`.
    pub fn json_name(&mut self, name: &str) -> &mut Self {
        self.json_name = Some(name.to_string());
        self
    }
}

impl<'b> MessageBuilder<'b> {
    pub fn field(&mut self, number: u32, name: &str, type_: FieldType) -> &mut FieldDraft {
        self.push(number, name, type_, false, None)
    }

    pub fn repeated(&mut self, number: u32, name: &str, type_: FieldType) -> &mut FieldDraft {
        self.push(number, name, type_, true, None)
    }

    pub fn map(
        &mut self,
        number: u32,
        name: &str,
        key: FieldType,
        value: FieldType,
    ) -> &mut FieldDraft {
        self.push(number, name, value, true, Some(key))
    }

    fn push(
        &mut self,
        number: u32,
        name: &str,
        type_: FieldType,
        repeated: bool,
        map_key: Option<FieldType>,
    ) -> &mut FieldDraft {
        self.draft.fields.push(FieldDraft {
            name: name.to_string(),
            json_name: None,
            number,
            type_,
            repeated,
            map_key,
        });
        self.draft.fields.last_mut().unwrap()
    }
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            enums: Vec::new(),
        }
    }

    /// Begin a message type. Fields are added through the returned builder.
    pub fn message(&mut self, full_name: &str) -> MessageBuilder<'_> {
        self.messages.push(MessageDraft {
            full_name: full_name.to_string(),
            fields: Vec::new(),
        });
        MessageBuilder {
            draft: self.messages.last_mut().unwrap(),
        }
    }

    /// Declare an enum type with its name → value mapping.
    pub fn enum_type(&mut self, full_name: &str, values: &[(&str, i32)]) -> &mut Self {
        self.enums.push((
            full_name.to_string(),
            values
                .iter()
                .map(|(n, v)| (n.to_string(), *v))
                .collect(),
        ));
        self
    }

    /// Register the `google.protobuf` well-known types so that schemas
    /// may reference wrappers, Value/Struct/ListValue, Duration, and
    /// Timestamp by name.
    pub fn with_well_known_types(mut self) -> Self {
        use FieldType::*;

        self.enum_type("google.protobuf.NullValue", &[("NULL_VALUE", 0)]);

        let wrappers: &[(&str, FieldType)] = &[
            ("google.protobuf.DoubleValue", Double),
            ("google.protobuf.FloatValue", Float),
            ("google.protobuf.Int64Value", Int64),
            ("google.protobuf.UInt64Value", UInt64),
            ("google.protobuf.Int32Value", Int32),
            ("google.protobuf.UInt32Value", UInt32),
            ("google.protobuf.BoolValue", Bool),
            ("google.protobuf.StringValue", String),
            ("google.protobuf.BytesValue", Bytes),
        ];
        for (name, type_) in wrappers {
            self.message(name).field(1, "value", type_.clone());
        }

        {
            let mut m = self.message("google.protobuf.Duration");
            m.field(1, "seconds", Int64);
            m.field(2, "nanos", Int32);
        }
        {
            let mut m = self.message("google.protobuf.Timestamp");
            m.field(1, "seconds", Int64);
            m.field(2, "nanos", Int32);
        }
        {
            let mut m = self.message("google.protobuf.Value");
            m.field(1, "null_value", Enum("google.protobuf.NullValue".into()));
            m.field(2, "number_value", Double);
            m.field(3, "string_value", String);
            m.field(4, "bool_value", Bool);
            m.field(5, "struct_value", Message("google.protobuf.Struct".into()));
            m.field(6, "list_value", Message("google.protobuf.ListValue".into()));
        }
        self.message("google.protobuf.Struct").map(
            1,
            "fields",
            String,
            Message("google.protobuf.Value".into()),
        );
        self.message("google.protobuf.ListValue").repeated(
            1,
            "values",
            Message("google.protobuf.Value".into()),
        );

        self
    }

    /// Resolve all cross references, synthesize mapentry messages, and
    /// produce the immutable pool.
    pub fn build(mut self) -> Result<SchemaPool, BuildError> {
        // Mapentry messages are synthesized up front so that name
        // resolution below covers them uniformly.
        let mut entries = Vec::new();
        for draft in &self.messages {
            for field in &draft.fields {
                let Some(key) = &field.map_key else { continue };

                if !key.is_valid_map_key() {
                    return Err(BuildError::InvalidMapKey {
                        message: draft.full_name.clone(),
                        field: field.name.clone(),
                    });
                }
                let mut entry = MessageDraft {
                    full_name: map_entry_name(&draft.full_name, &field.name),
                    fields: Vec::new(),
                };
                entry.fields.push(FieldDraft {
                    name: "key".to_string(),
                    json_name: None,
                    number: 1,
                    type_: key.clone(),
                    repeated: false,
                    map_key: None,
                });
                entry.fields.push(FieldDraft {
                    name: "value".to_string(),
                    json_name: None,
                    number: 2,
                    type_: field.type_.clone(),
                    repeated: false,
                    map_key: None,
                });
                entries.push(entry);
            }
        }
        self.messages.extend(entries);

        let mut enums = Vec::new();
        let mut enums_by_name = FxHashMap::default();
        for (full_name, values) in self.enums {
            if enums_by_name
                .insert(full_name.clone(), enums.len())
                .is_some()
            {
                return Err(BuildError::DuplicateEnum(full_name));
            }
            enums.push(EnumData {
                by_name: values.into_iter().collect(),
            });
        }

        let mut by_name = FxHashMap::default();
        for (id, draft) in self.messages.iter().enumerate() {
            if by_name.insert(draft.full_name.clone(), id).is_some() {
                return Err(BuildError::DuplicateMessage(draft.full_name.clone()));
            }
        }

        let mut messages = Vec::with_capacity(self.messages.len());
        for draft in &self.messages {
            let mut fields = Vec::with_capacity(draft.fields.len());
            let mut by_json_name = FxHashMap::default();
            let mut by_number = FxHashMap::default();

            for field in &draft.fields {
                let index = fields.len();
                if by_number.insert(field.number, index).is_some() {
                    return Err(BuildError::DuplicateFieldNumber {
                        message: draft.full_name.clone(),
                        number: field.number,
                    });
                }

                let (message, enum_) = match &field.type_ {
                    FieldType::Message(name) => {
                        let id = *by_name.get(name).ok_or_else(|| {
                            BuildError::UnresolvedType {
                                message: draft.full_name.clone(),
                                field: field.name.clone(),
                                type_name: name.clone(),
                            }
                        })?;
                        (Some(id), None)
                    }
                    FieldType::Enum(name) => {
                        let id = *enums_by_name.get(name).ok_or_else(|| {
                            BuildError::UnresolvedType {
                                message: draft.full_name.clone(),
                                field: field.name.clone(),
                                type_name: name.clone(),
                            }
                        })?;
                        (None, Some(id))
                    }
                    _ => (None, None),
                };
                // For a map field, the resolved message type is its entry.
                let message = if field.map_key.is_some() {
                    Some(by_name[&map_entry_name(&draft.full_name, &field.name)])
                } else {
                    message
                };

                // Both the proto name and the (derived or explicit)
                // json_name resolve to this field on input.
                let json_name = field
                    .json_name
                    .clone()
                    .unwrap_or_else(|| lower_camel(&field.name));
                for name in [field.name.as_str(), json_name.as_str()] {
                    if let Some(prior) = by_json_name.insert(name.to_string(), index) {
                        if prior != index {
                            return Err(BuildError::DuplicateJsonName {
                                message: draft.full_name.clone(),
                                name: name.to_string(),
                            });
                        }
                    }
                }

                fields.push(FieldData {
                    name: field.name.clone(),
                    number: field.number,
                    kind: if field.map_key.is_some() {
                        FieldKind::Message
                    } else {
                        field.type_.kind()
                    },
                    repeated: field.repeated,
                    map: field.map_key.is_some(),
                    message,
                    enum_,
                });
            }

            messages.push(MessageData {
                full_name: draft.full_name.clone(),
                fields,
                by_json_name,
                by_number,
                well_known: WellKnown::from_full_name(&draft.full_name),
            });
        }

        Ok(SchemaPool {
            messages,
            enums,
            by_name,
        })
    }
}

/// protoc names the synthetic entry message after the field:
/// `parent.Msg` + field `foo_bar` => `parent.Msg.FooBarEntry`.
fn map_entry_name(parent: &str, field: &str) -> String {
    let mut name = String::with_capacity(parent.len() + field.len() + 7);
    name.push_str(parent);
    name.push('.');
    let mut upper = true;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            name.extend(c.to_uppercase());
            upper = false;
        } else {
            name.push(c);
        }
    }
    name.push_str("Entry");
    name
}

fn lower_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}
