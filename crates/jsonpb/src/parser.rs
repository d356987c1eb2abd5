//! The streaming driver: lexical dispatch through the FSM table, and
//! the semantic layer which binds JSON members to schema fields, maps
//! tokens onto typed sink emissions, rewrites well-known types, and
//! walks `map<K,V>` objects as mapentry sequences.

use crate::fsm::{self, Action, Cell, State};
use crate::number::{self, Scalar};
use crate::schema::{FieldDef, FieldKind, MessageDef, WellKnown};
use crate::sink::Sink;
use crate::text::{Mode, TextAccum};
use crate::wkt;
use crate::Error;

/// Maximum nesting depth, for both JSON containers and parser frames.
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Copy, Clone, Default)]
pub struct Options {
    /// Silently skip unknown member names, including their whole value
    /// subtree. When false, unknown members are a hard error.
    pub ignore_json_unknown: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Container {
    Object,
    Array,
}

/// The JSON shape of an incoming value, as needed to resolve bindings
/// before the value itself has been decoded.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Tok {
    Object,
    Array,
    Str,
    Num,
    Bool,
}

/// One level of semantic context. A frame with `msg == None` is a
/// suppressed subtree: nesting is tracked, nothing is emitted.
struct Frame<M: MessageDef> {
    msg: Option<M>,
    field: Option<M::Field>,
    // This frame is the sequence of elements of a repeated field.
    seq: bool,
    // This frame is the entry sequence of a map field; `map_field` is
    // the map field in the enclosing message.
    map: bool,
    // This frame is a single mapentry. Set only after its key has been
    // emitted, so key emission cannot close the frame early.
    mapentry: bool,
    // This frame was synthesized for a well-known type and closes
    // automatically when its single member's value completes.
    synth: bool,
    map_field: Option<M::Field>,
}

impl<M: MessageDef> Frame<M> {
    fn new(msg: Option<M>) -> Self {
        Frame {
            msg,
            field: None,
            seq: false,
            map: false,
            mapentry: false,
            synth: false,
            map_field: None,
        }
    }
}

/// A streaming proto3-JSON decoder.
///
/// Feed input in arbitrary chunks with [`feed`](Self::feed), then call
/// [`end`](Self::end). Emissions reach the sink in strict document
/// order and are invariant to how the input is split. Once an error is
/// returned the parser is halted: all further calls replay it.
pub struct Parser<M: MessageDef, S: Sink<M::Field>> {
    sink: S,
    options: Options,
    status: Option<Error>,

    state: State,
    containers: Vec<Container>,
    frames: Vec<Frame<M>>,
    text: TextAccum,

    root_started: bool,
    str_is_name: bool,
    // \uXXXX accumulator and a held high surrogate awaiting its low pair.
    uni: u32,
    pending_high: Option<u32>,
}

impl<M: MessageDef, S: Sink<M::Field>> Parser<M, S> {
    pub fn new(root: M, sink: S, options: Options) -> Self {
        tracing::debug!(root = root.full_name(), "created json decoder");
        Parser {
            sink,
            options,
            status: None,
            state: State::Start,
            containers: Vec::new(),
            frames: vec![Frame::new(Some(root))],
            text: TextAccum::new(),
            root_started: false,
            str_is_name: false,
            uni: 0,
            pending_high: None,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// The last error, if the parser has halted.
    pub fn status(&self) -> Result<(), Error> {
        match &self.status {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Consume the next chunk of the document. The chunk boundary may
    /// fall anywhere, including inside a token.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<(), Error> {
        if let Some(err) = &self.status {
            return Err(err.clone());
        }
        match self.run(chunk) {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::debug!(error = %err, "halting parse");
                self.status = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Terminate the document. Verifies that the FSM reached its
    /// accepting state with all stacks unwound.
    pub fn end(&mut self) -> Result<(), Error> {
        if let Some(err) = &self.status {
            return Err(err.clone());
        }
        match self.finish_eof() {
            Ok(()) => Ok(()),
            Err(err) => {
                self.status = Some(err.clone());
                Err(err)
            }
        }
    }

    fn finish_eof(&mut self) -> Result<(), Error> {
        // A number at the top level may be terminated by EOF alone.
        if fsm::number_can_end(self.state) {
            self.finish_number(&[], 0)?;
        }
        if self.state == State::Done {
            debug_assert!(self.containers.is_empty() && self.frames.len() == 1);
            Ok(())
        } else {
            Err(Error::PrematureEof)
        }
    }

    fn run(&mut self, chunk: &[u8]) -> Result<(), Error> {
        let mut pos = 0;

        while pos < chunk.len() {
            // Fast path: a contiguous run of plain string content is
            // consumed wholesale; the open capture will cover it.
            if self.state == State::Str {
                let mut end = pos;
                while end < chunk.len()
                    && !matches!(chunk[end], b'"' | b'\\')
                    && chunk[end] >= 0x20
                {
                    end += 1;
                }
                if end > pos {
                    if self.pending_high.is_some() {
                        return Err(unpaired_surrogate(self.pending_high.unwrap()));
                    }
                    pos = end;
                    if pos == chunk.len() {
                        break;
                    }
                }
            }

            let b = chunk[pos];
            match fsm::lookup(self.state, fsm::classify(b)) {
                Cell::Dead => return Err(lexical(chunk, pos)),
                Cell::To(next) => {
                    self.state = next;
                    pos += 1;
                }
                Cell::Do(action) => {
                    if self.apply(action, chunk, pos, b)? {
                        pos += 1;
                    }
                }
            }
        }

        // Chunk boundary: commit any open capture into the accumulator
        // and re-arm it for the next chunk. Push-eager runs are NOT
        // flushed here: a run interrupted by a seam coalesces with its
        // continuation, so the emitted events depend only on the
        // document bytes and never on how they were split.
        self.text.suspend(chunk);
        Ok(())
    }

    /// Dispatch one FSM action. Returns whether the current byte was
    /// consumed (number termination retries it).
    fn apply(&mut self, action: Action, chunk: &[u8], pos: usize, b: u8) -> Result<bool, Error> {
        match action {
            Action::ObjBegin => {
                self.push_container(Container::Object)?;
                self.begin_value(Tok::Object)?;
                self.state = State::ObjOpen;
                Ok(true)
            }
            Action::ObjEnd | Action::ObjEndEmpty => {
                self.on_object_end()?;
                Ok(true)
            }
            Action::ArrBegin => {
                self.push_container(Container::Array)?;
                self.begin_value(Tok::Array)?;
                self.state = State::ArrOpen;
                Ok(true)
            }
            Action::ArrEnd | Action::ArrEndEmpty => {
                self.on_array_end()?;
                Ok(true)
            }
            Action::NameBegin => {
                self.str_is_name = true;
                self.text.start_accumulate()?;
                self.text.begin(pos + 1)?;
                self.state = State::Str;
                Ok(true)
            }
            Action::StrBegin => {
                self.on_string_begin(pos)?;
                Ok(true)
            }
            Action::StrEnd => {
                self.on_string_end(chunk, pos)?;
                Ok(true)
            }
            Action::EscBegin => {
                self.emit_run(chunk, pos)?;
                self.state = State::StrEsc;
                Ok(true)
            }
            Action::EscChar => {
                self.on_escape_char(pos, b)?;
                Ok(true)
            }
            Action::EscU => {
                self.uni = 0;
                self.state = State::Uni0;
                Ok(true)
            }
            Action::HexDigit => {
                self.on_hex_digit(pos, b)?;
                Ok(true)
            }
            Action::NumBegin => {
                self.text.start_accumulate()?;
                self.text.begin(pos)?;
                self.state = match b {
                    b'-' => State::NumMinus,
                    b'0' => State::NumZero,
                    b'I' => State::Inf1,
                    _ => State::NumInt,
                };
                Ok(true)
            }
            Action::NumEnd => {
                self.finish_number(chunk, pos)?;
                Ok(false) // retry the delimiter in the new state
            }
            Action::NumEndInf => {
                self.finish_number(chunk, pos + 1)?;
                Ok(true)
            }
            Action::LitTrue => {
                self.on_bool(true)?;
                Ok(true)
            }
            Action::LitFalse => {
                self.on_bool(false)?;
                Ok(true)
            }
            Action::LitNull => {
                self.on_null()?;
                Ok(true)
            }
        }
    }

    // ----- value entry: bindings, well-known rewriting, frames -----

    /// Called at the first token of every value. Resolves what the
    /// value will decode into, pushing sequence/map/synthetic frames as
    /// needed, and rejecting shapes the binding cannot accept.
    fn begin_value(&mut self, tok: Tok) -> Result<(), Error> {
        if self.root_started {
            return self.enter_value(tok);
        }
        self.root_started = true;

        let root = self.frames[0].msg.expect("root frame has a message");
        match root.well_known() {
            None if tok == Tok::Object => {
                self.sink.start_msg();
                Ok(())
            }
            None => Err(Error::TypeMismatch(format!(
                "expected JSON object for message `{}`",
                root.full_name()
            ))),
            Some(wk) => {
                self.sink.start_msg();
                self.enter_wkt_root(root, wk, tok)
            }
        }
    }

    /// A root message which is itself a well-known type accepts its
    /// special JSON shape directly; members land in the root frame
    /// without a submessage wrap.
    fn enter_wkt_root(&mut self, root: M, wk: WellKnown, tok: Tok) -> Result<(), Error> {
        match wk {
            WellKnown::Value => {
                let number = match tok {
                    Tok::Num => 2,
                    Tok::Str => 3,
                    Tok::Bool => 4,
                    Tok::Object => 5,
                    Tok::Array => 6,
                };
                self.bind_by_number(root, number)?;
                self.enter_value(tok)
            }
            WellKnown::Struct => {
                if tok != Tok::Object {
                    return Err(type_mismatch(tok, "google.protobuf.Struct"));
                }
                self.bind_by_number(root, 1)?;
                self.enter_value(tok)
            }
            WellKnown::ListValue => {
                if tok != Tok::Array {
                    return Err(type_mismatch(tok, "google.protobuf.ListValue"));
                }
                self.bind_by_number(root, 1)?;
                self.enter_value(tok)
            }
            WellKnown::Duration | WellKnown::Timestamp => {
                if tok != Tok::Str {
                    return Err(type_mismatch(tok, root.full_name()));
                }
                // The accumulated string is parsed at its closing quote.
                Ok(())
            }
            // Wrappers accept their scalar directly; the expanded
            // object form parses as a plain message.
            _ => {
                if tok == Tok::Object {
                    return Ok(());
                }
                self.bind_by_number(root, 1)?;
                self.enter_value(tok)
            }
        }
    }

    fn enter_value(&mut self, tok: Tok) -> Result<(), Error> {
        loop {
            let top = self.frames.last().expect("frame stack is never empty");

            // Suppressed subtree, or the value of a skipped unknown
            // member: track nesting, bind nothing.
            if top.msg.is_none() || top.field.is_none() {
                if matches!(tok, Tok::Object | Tok::Array) {
                    self.push_frame(Frame::new(None))?;
                }
                return Ok(());
            }
            let f = top.field.expect("checked above");

            if f.is_map() {
                if tok != Tok::Object {
                    return Err(type_mismatch_field(tok, &f));
                }
                let entry = f
                    .message_type()
                    .ok_or(Error::Internal("map field without entry type"))?;
                self.sink.start_seq(f);
                let mut frame = Frame::new(Some(entry));
                frame.map = true;
                frame.map_field = Some(f);
                self.push_frame(frame)?;
                return Ok(());
            }

            if f.is_repeated() && !top.seq {
                if tok != Tok::Array {
                    return Err(type_mismatch_field(tok, &f));
                }
                self.sink.start_seq(f);
                let mut frame = Frame::new(top.msg);
                frame.seq = true;
                frame.field = Some(f);
                self.push_frame(frame)?;
                return Ok(());
            }

            if f.kind() != FieldKind::Message {
                return self.check_scalar_shape(tok, f);
            }

            let sub = f
                .message_type()
                .ok_or(Error::Internal("message field without type"))?;
            match sub.well_known() {
                Some(WellKnown::Value) => {
                    let number = match tok {
                        Tok::Num => 2,
                        Tok::Str => 3,
                        Tok::Bool => 4,
                        Tok::Object => 5,
                        Tok::Array => 6,
                    };
                    self.push_synth(sub, f)?;
                    self.bind_by_number(sub, number)?;
                }
                Some(WellKnown::Struct) => {
                    if tok != Tok::Object {
                        return Err(type_mismatch_field(tok, &f));
                    }
                    self.push_synth(sub, f)?;
                    self.bind_by_number(sub, 1)?;
                }
                Some(WellKnown::ListValue) => {
                    if tok != Tok::Array {
                        return Err(type_mismatch_field(tok, &f));
                    }
                    self.push_synth(sub, f)?;
                    self.bind_by_number(sub, 1)?;
                }
                Some(WellKnown::Duration | WellKnown::Timestamp) => {
                    return if tok == Tok::Str {
                        Ok(())
                    } else {
                        Err(type_mismatch_field(tok, &f))
                    };
                }
                None => {
                    return if tok == Tok::Object {
                        self.start_subobject(sub, f)?;
                        Ok(())
                    } else {
                        Err(type_mismatch_field(tok, &f))
                    };
                }
                // Wrappers: a scalar stands in for the object form.
                Some(_) => {
                    if tok == Tok::Object {
                        self.start_subobject(sub, f)?;
                        return Ok(());
                    }
                    self.push_synth(sub, f)?;
                    self.bind_by_number(sub, 1)?;
                }
            }
            // A synthetic member was bound: re-dispatch the token
            // against it (Struct recurses into its fields map, Value
            // into Struct/ListValue, wrappers into their scalar).
        }
    }

    fn check_scalar_shape(&self, tok: Tok, f: M::Field) -> Result<(), Error> {
        let ok = match tok {
            Tok::Object | Tok::Array => false,
            Tok::Bool => f.kind() == FieldKind::Bool,
            Tok::Str => f.kind() != FieldKind::Bool,
            Tok::Num => matches!(
                f.kind(),
                FieldKind::Int32
                    | FieldKind::Int64
                    | FieldKind::UInt32
                    | FieldKind::UInt64
                    | FieldKind::Float
                    | FieldKind::Double
                    | FieldKind::Enum
            ),
        };
        if ok {
            Ok(())
        } else {
            Err(type_mismatch_field(tok, &f))
        }
    }

    fn start_subobject(&mut self, sub: M, f: M::Field) -> Result<(), Error> {
        self.sink.start_sub_msg(f);
        self.sink.start_msg();
        self.push_frame(Frame::new(Some(sub)))
    }

    fn push_synth(&mut self, sub: M, f: M::Field) -> Result<(), Error> {
        self.sink.start_sub_msg(f);
        self.sink.start_msg();
        let mut frame = Frame::new(Some(sub));
        frame.synth = true;
        self.push_frame(frame)
    }

    fn bind_by_number(&mut self, msg: M, number: u32) -> Result<(), Error> {
        let field = msg
            .field_by_number(number)
            .ok_or(Error::Internal("well-known type is missing a field"))?;
        self.frames.last_mut().expect("frame stack is never empty").field = Some(field);
        Ok(())
    }

    // ----- value completion -----

    /// Runs after every completed value: closes mapentry and synthetic
    /// frames whose lifetime ended with it, unbinds the finished member,
    /// and selects the continuation state.
    fn after_value(&mut self) -> Result<(), Error> {
        loop {
            let top = self.frames.last().expect("frame stack is never empty");
            if top.mapentry {
                let frame = self.frames.pop().expect("checked above");
                self.sink.end_msg();
                self.sink.end_sub_msg(
                    frame
                        .map_field
                        .ok_or(Error::Internal("mapentry without map field"))?,
                );
                continue;
            }
            if top.synth {
                self.frames.pop();
                self.sink.end_msg();
                let parent = self
                    .frames
                    .last()
                    .and_then(|f| f.field)
                    .ok_or(Error::Internal("synthetic frame without parent field"))?;
                self.sink.end_sub_msg(parent);
                continue;
            }
            if top.seq || top.map {
                // Elements and entries keep the binding for the next value.
                break;
            }
            self.frames.last_mut().expect("frame stack is never empty").field = None;
            break;
        }

        match self.containers.last() {
            None => {
                self.sink.end_msg();
                self.state = State::Done;
            }
            Some(Container::Object) => self.state = State::ObjNext,
            Some(Container::Array) => self.state = State::ArrNext,
        }
        Ok(())
    }

    fn on_object_end(&mut self) -> Result<(), Error> {
        self.pop_container();

        let top = self.frames.last().expect("frame stack is never empty");
        if top.map {
            let frame = self.frames.pop().expect("checked above");
            self.sink.end_seq(
                frame
                    .map_field
                    .ok_or(Error::Internal("map frame without map field"))?,
            );
        } else if top.msg.is_none() {
            self.frames.pop();
        } else if self.frames.len() > 1 {
            self.frames.pop();
            self.sink.end_msg();
            let parent = self
                .frames
                .last()
                .and_then(|f| f.field)
                .ok_or(Error::Internal("subobject without parent field"))?;
            self.sink.end_sub_msg(parent);
        }
        // Otherwise: the root object itself; after_value closes it.

        self.after_value()
    }

    fn on_array_end(&mut self) -> Result<(), Error> {
        self.pop_container();

        let top = self.frames.last().expect("frame stack is never empty");
        if top.msg.is_none() {
            self.frames.pop();
        } else if top.seq {
            let frame = self.frames.pop().expect("checked above");
            self.sink.end_seq(
                frame
                    .field
                    .ok_or(Error::Internal("sequence frame without field"))?,
            );
        } else {
            return Err(Error::Internal("unbalanced array close"));
        }

        self.after_value()
    }

    // ----- strings -----

    fn on_string_begin(&mut self, pos: usize) -> Result<(), Error> {
        self.str_is_name = false;
        self.begin_value(Tok::Str)?;

        // Proto string fields stream their runs straight to the sink;
        // every other consumer needs the contiguous final text.
        let top = self.frames.last().expect("frame stack is never empty");
        let eager = match (top.msg, top.field) {
            (Some(_), Some(f)) => f.kind() == FieldKind::String,
            _ => false,
        };
        if eager {
            let f = top.field.expect("checked above");
            self.sink.start_str(f);
            self.text.start_push_eager()?;
        } else {
            self.text.start_accumulate()?;
        }
        self.text.begin(pos + 1)?;
        self.state = State::Str;
        Ok(())
    }

    fn on_string_end(&mut self, chunk: &[u8], pos: usize) -> Result<(), Error> {
        if let Some(high) = self.pending_high {
            return Err(unpaired_surrogate(high));
        }
        if self.str_is_name {
            return self.on_member_name(chunk, pos);
        }

        let (msg, field) = {
            let top = self.frames.last().expect("frame stack is never empty");
            (top.msg, top.field)
        };

        let f = match (msg, field) {
            (Some(m), None) if self.frames.len() == 1 => {
                // A string as the root value: only Duration/Timestamp
                // roots reach here with nothing bound.
                return match m.well_known() {
                    Some(WellKnown::Duration) => self.finish_duration(chunk, pos, None, m),
                    Some(WellKnown::Timestamp) => self.finish_timestamp(chunk, pos, None, m),
                    _ => self.discard_text(chunk, pos),
                };
            }
            (None, _) | (_, None) => return self.discard_text(chunk, pos),
            (Some(_), Some(f)) => f,
        };

        match f.kind() {
            FieldKind::String => {
                self.emit_run(chunk, pos)?;
                self.text.end();
                self.sink.end_str(f);
                self.after_value()
            }
            FieldKind::Bytes => {
                let decoded = {
                    let text = self.text.finish(chunk, pos)?;
                    wkt::decode_base64(text, f.name())?
                };
                self.text.end();
                self.sink.start_str(f);
                self.sink.str_chunk(f, &decoded);
                self.sink.end_str(f);
                self.after_value()
            }
            FieldKind::Enum => {
                let value = {
                    let text = self.text.finish(chunk, pos)?;
                    let name = std::str::from_utf8(text)
                        .map_err(|_| Error::Utf8("enum value".to_string()))?;
                    f.enum_value(name).ok_or_else(|| Error::EnumName {
                        field: f.name().to_string(),
                        name: name.to_string(),
                    })?
                };
                self.text.end();
                self.sink.put_enum(f, value);
                self.after_value()
            }
            FieldKind::Int32
            | FieldKind::Int64
            | FieldKind::UInt32
            | FieldKind::UInt64
            | FieldKind::Float
            | FieldKind::Double => {
                let scalar = {
                    let text = self.text.finish(chunk, pos)?;
                    number::parse(text, f.kind(), true)?
                };
                self.text.end();
                self.emit_scalar(f, scalar);
                self.after_value()
            }
            FieldKind::Message => {
                let sub = f
                    .message_type()
                    .ok_or(Error::Internal("message field without type"))?;
                match sub.well_known() {
                    Some(WellKnown::Duration) => self.finish_duration(chunk, pos, Some(f), sub),
                    Some(WellKnown::Timestamp) => self.finish_timestamp(chunk, pos, Some(f), sub),
                    _ => Err(Error::Internal("string bound to non-string message field")),
                }
            }
            FieldKind::Bool => Err(Error::Internal("string bound to bool field")),
        }
    }

    fn discard_text(&mut self, chunk: &[u8], pos: usize) -> Result<(), Error> {
        let _ = self.text.finish(chunk, pos)?;
        self.text.end();
        self.after_value()
    }

    // ----- member names and map keys -----

    fn on_member_name(&mut self, chunk: &[u8], pos: usize) -> Result<(), Error> {
        self.state = State::ObjColon;

        let (msg, map) = {
            let top = self.frames.last().expect("frame stack is never empty");
            (top.msg, top.map)
        };
        let Some(m) = msg else {
            // Inside a suppressed subtree member names are not resolved.
            let _ = self.text.finish(chunk, pos)?;
            self.text.end();
            return Ok(());
        };
        if map {
            return self.on_map_key(chunk, pos);
        }

        let found = {
            let text = self.text.finish(chunk, pos)?;
            let name = std::str::from_utf8(text)
                .map_err(|_| Error::Utf8("member name".to_string()))?;
            match m.field_by_json_name(name) {
                Some(f) => Some(f),
                None if self.options.ignore_json_unknown => {
                    tracing::debug!(member = name, in_message = m.full_name(), "skipping unknown member");
                    None
                }
                None => {
                    return Err(Error::UnknownField {
                        field: name.to_string(),
                        message: m.full_name().to_string(),
                    })
                }
            }
        };
        self.text.end();
        self.frames.last_mut().expect("frame stack is never empty").field = found;
        Ok(())
    }

    /// Mapentry choreography: the member name is the entry's key. Push
    /// the entry frame, emit the key through the matching scalar path,
    /// and only then mark the frame as a mapentry and bind its value.
    fn on_map_key(&mut self, chunk: &[u8], pos: usize) -> Result<(), Error> {
        let (entry, map_field) = {
            let top = self.frames.last().expect("frame stack is never empty");
            (
                top.msg.expect("map frames carry the entry message"),
                top.map_field
                    .ok_or(Error::Internal("map frame without map field"))?,
            )
        };
        let key = entry
            .field_by_number(1)
            .ok_or(Error::Internal("mapentry without key field"))?;
        let value = entry
            .field_by_number(2)
            .ok_or(Error::Internal("mapentry without value field"))?;

        let mut frame = Frame::new(Some(entry));
        frame.map_field = Some(map_field);
        self.push_frame(frame)?;
        self.sink.start_sub_msg(map_field);
        self.sink.start_msg();

        match key.kind() {
            FieldKind::String => {
                self.sink.start_str(key);
                {
                    let text = self.text.finish(chunk, pos)?;
                    self.sink.str_chunk(key, text);
                }
                self.sink.end_str(key);
            }
            FieldKind::Bool => {
                let v = {
                    let text = self.text.finish(chunk, pos)?;
                    match text {
                        b"true" => true,
                        b"false" => false,
                        _ => {
                            return Err(Error::TypeMismatch(format!(
                                "invalid bool key for map field `{}`",
                                map_field.name()
                            )))
                        }
                    }
                };
                self.sink.put_bool(key, v);
            }
            FieldKind::Int32 | FieldKind::Int64 | FieldKind::UInt32 | FieldKind::UInt64 => {
                let scalar = {
                    let text = self.text.finish(chunk, pos)?;
                    number::parse(text, key.kind(), true)?
                };
                self.emit_scalar(key, scalar);
            }
            _ => return Err(Error::Internal("invalid map key kind")),
        }
        self.text.end();

        let top = self.frames.last_mut().expect("frame stack is never empty");
        top.mapentry = true;
        top.field = Some(value);
        Ok(())
    }

    // ----- escapes -----

    fn on_escape_char(&mut self, pos: usize, b: u8) -> Result<(), Error> {
        if let Some(high) = self.pending_high {
            return Err(unpaired_surrogate(high));
        }
        let out = match b {
            b'"' => b'"',
            b'\\' => b'\\',
            b'/' => b'/',
            b'b' => 0x08,
            b'f' => 0x0c,
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            _ => return Err(Error::Internal("unreachable escape character")),
        };
        self.text_out(&[out])?;
        self.text.begin(pos + 1)?;
        self.state = State::Str;
        Ok(())
    }

    fn on_hex_digit(&mut self, pos: usize, b: u8) -> Result<(), Error> {
        self.uni = (self.uni << 4) | fsm::hex_value(b);
        self.state = match self.state {
            State::Uni0 => State::Uni1,
            State::Uni1 => State::Uni2,
            State::Uni2 => State::Uni3,
            State::Uni3 => return self.end_unicode_escape(pos),
            _ => return Err(Error::Internal("hex digit outside unicode escape")),
        };
        Ok(())
    }

    fn end_unicode_escape(&mut self, pos: usize) -> Result<(), Error> {
        let unit = self.uni & 0xffff;
        self.uni = 0;

        let code_point = match self.pending_high.take() {
            Some(high) => {
                if !(0xdc00..=0xdfff).contains(&unit) {
                    return Err(unpaired_surrogate(high));
                }
                0x10000 + ((high - 0xd800) << 10) + (unit - 0xdc00)
            }
            None if (0xd800..=0xdbff).contains(&unit) => {
                // Hold the high half; the low half must follow directly.
                self.pending_high = Some(unit);
                self.state = State::Str;
                return self.text.begin(pos + 1);
            }
            None if (0xdc00..=0xdfff).contains(&unit) => {
                return Err(unpaired_surrogate(unit));
            }
            None => unit,
        };

        let c = char::from_u32(code_point)
            .ok_or(Error::Internal("combined surrogates exceed char range"))?;
        let mut buf = [0u8; 4];
        self.text_out(c.encode_utf8(&mut buf).as_bytes())?;
        self.state = State::Str;
        self.text.begin(pos + 1)
    }

    /// Close the open capture. In push-eager mode the completed run,
    /// coalesced across any feed seams it spanned, is emitted as one
    /// string chunk; run boundaries are escapes and the closing quote,
    /// so the emission sequence is invariant to input splits.
    fn emit_run(&mut self, chunk: &[u8], pos: usize) -> Result<(), Error> {
        if self.text.mode() == Mode::PushEager {
            let field = self.eager_field()?;
            if let Some(run) = self.text.take(chunk, pos)? {
                self.sink.str_chunk(field, run);
            }
            self.text.clear_run();
        } else {
            // Accumulate: the region joins the buffered value.
            self.text.take(chunk, pos)?;
        }
        Ok(())
    }

    /// Escape output routed by multipart mode: accumulated, or streamed
    /// to the sink as string data.
    fn text_out(&mut self, bytes: &[u8]) -> Result<(), Error> {
        match self.text.mode() {
            Mode::Accumulate => self.text.push(bytes),
            Mode::PushEager => {
                let field = self.eager_field()?;
                self.sink.str_chunk(field, bytes);
                Ok(())
            }
            Mode::Inactive => Err(Error::Internal("text fed while inactive")),
        }
    }

    fn eager_field(&self) -> Result<M::Field, Error> {
        self.frames
            .last()
            .and_then(|f| f.field)
            .ok_or(Error::Internal("streaming text without a bound field"))
    }

    // ----- numbers, bools, null -----

    fn finish_number(&mut self, chunk: &[u8], pos: usize) -> Result<(), Error> {
        self.begin_value(Tok::Num)?;

        let (msg, field) = {
            let top = self.frames.last().expect("frame stack is never empty");
            (top.msg, top.field)
        };
        let (Some(_), Some(f)) = (msg, field) else {
            // No binding: the literal is validated by the FSM alone and
            // silently discarded.
            let _ = self.text.finish(chunk, pos)?;
            self.text.end();
            return self.after_value();
        };

        let scalar = {
            let text = self.text.finish(chunk, pos)?;
            number::parse(text, f.kind(), false)?
        };
        self.text.end();
        self.emit_scalar(f, scalar);
        self.after_value()
    }

    fn on_bool(&mut self, value: bool) -> Result<(), Error> {
        self.begin_value(Tok::Bool)?;

        let (msg, field) = {
            let top = self.frames.last().expect("frame stack is never empty");
            (top.msg, top.field)
        };
        if let (Some(_), Some(f)) = (msg, field) {
            self.sink.put_bool(f, value);
        }
        self.after_value()
    }

    fn on_null(&mut self) -> Result<(), Error> {
        if !self.root_started {
            self.root_started = true;
            let root = self.frames[0].msg.expect("root frame has a message");
            if root.well_known() != Some(WellKnown::Value) {
                return Err(Error::TypeMismatch(format!(
                    "JSON null is not valid for message `{}`",
                    root.full_name()
                )));
            }
            self.sink.start_msg();
            let null_field = root
                .field_by_number(1)
                .ok_or(Error::Internal("well-known type is missing a field"))?;
            self.sink.put_enum(null_field, 0);
            return self.after_value();
        }

        let (suppressed, field, in_element) = {
            let top = self.frames.last().expect("frame stack is never empty");
            (
                top.msg.is_none(),
                top.field,
                top.seq || top.mapentry,
            )
        };
        if suppressed || field.is_none() {
            return self.after_value();
        }
        let f = field.expect("checked above");

        let value_target = f.kind() == FieldKind::Message
            && f.message_type().and_then(|m| m.well_known()) == Some(WellKnown::Value);
        if value_target {
            let sub = f.message_type().expect("checked above");
            let null_field = sub
                .field_by_number(1)
                .ok_or(Error::Internal("well-known type is missing a field"))?;
            self.sink.start_sub_msg(f);
            self.sink.start_msg();
            self.sink.put_enum(null_field, 0);
            self.sink.end_msg();
            self.sink.end_sub_msg(f);
        } else if in_element {
            // A mapentry must emit exactly one key and one value, and a
            // repeated element cannot be absent.
            return Err(Error::TypeMismatch(format!(
                "JSON null is not valid for field `{}`",
                f.name()
            )));
        }
        // Otherwise the member is treated as absent: no emission.
        self.after_value()
    }

    // ----- duration and timestamp emission -----

    fn finish_duration(
        &mut self,
        chunk: &[u8],
        pos: usize,
        wrap: Option<M::Field>,
        msg: M,
    ) -> Result<(), Error> {
        let (seconds, nanos) = {
            let text = self.text.finish(chunk, pos)?;
            wkt::parse_duration(text)?
        };
        self.text.end();
        self.emit_seconds_nanos(wrap, msg, seconds, nanos)
    }

    fn finish_timestamp(
        &mut self,
        chunk: &[u8],
        pos: usize,
        wrap: Option<M::Field>,
        msg: M,
    ) -> Result<(), Error> {
        let (seconds, nanos) = {
            let text = self.text.finish(chunk, pos)?;
            wkt::parse_timestamp(text)?
        };
        self.text.end();
        self.emit_seconds_nanos(wrap, msg, seconds, nanos)
    }

    /// Both Duration and Timestamp reduce to synthetic `seconds` and
    /// `nanos` members, optionally wrapped in a submessage when bound
    /// through a field.
    fn emit_seconds_nanos(
        &mut self,
        wrap: Option<M::Field>,
        msg: M,
        seconds: i64,
        nanos: i32,
    ) -> Result<(), Error> {
        let seconds_field = msg
            .field_by_number(1)
            .ok_or(Error::Internal("well-known type is missing a field"))?;
        let nanos_field = msg
            .field_by_number(2)
            .ok_or(Error::Internal("well-known type is missing a field"))?;

        if let Some(f) = wrap {
            self.sink.start_sub_msg(f);
            self.sink.start_msg();
        }
        self.sink.put_int64(seconds_field, seconds);
        self.sink.put_int32(nanos_field, nanos);
        if let Some(f) = wrap {
            self.sink.end_msg();
            self.sink.end_sub_msg(f);
        }
        self.after_value()
    }

    // ----- small helpers -----

    fn emit_scalar(&mut self, f: M::Field, scalar: Scalar) {
        match scalar {
            Scalar::I32(v) => self.sink.put_int32(f, v),
            Scalar::I64(v) => self.sink.put_int64(f, v),
            Scalar::U32(v) => self.sink.put_uint32(f, v),
            Scalar::U64(v) => self.sink.put_uint64(f, v),
            Scalar::F32(v) => self.sink.put_float(f, v),
            Scalar::F64(v) => self.sink.put_double(f, v),
            Scalar::Enum(v) => self.sink.put_enum(f, v),
        }
    }

    fn push_container(&mut self, c: Container) -> Result<(), Error> {
        if self.containers.len() >= MAX_DEPTH {
            return Err(Error::NestingTooDeep);
        }
        self.containers.push(c);
        Ok(())
    }

    fn pop_container(&mut self) {
        let popped = self.containers.pop();
        debug_assert!(popped.is_some(), "container close without open");
    }

    fn push_frame(&mut self, frame: Frame<M>) -> Result<(), Error> {
        if self.frames.len() >= MAX_DEPTH {
            return Err(Error::NestingTooDeep);
        }
        self.frames.push(frame);
        Ok(())
    }
}

fn lexical(chunk: &[u8], pos: usize) -> Error {
    let end = (pos + 12).min(chunk.len());
    Error::Lexical(String::from_utf8_lossy(&chunk[pos..end]).into_owned())
}

fn unpaired_surrogate(unit: u32) -> Error {
    Error::Lexical(format!("\\u{unit:04x} (unpaired surrogate)"))
}

fn type_mismatch(tok: Tok, type_name: &str) -> Error {
    Error::TypeMismatch(format!(
        "JSON {} is not valid for `{}`",
        tok_name(tok),
        type_name
    ))
}

fn type_mismatch_field<F: FieldDef>(tok: Tok, f: &F) -> Error {
    Error::TypeMismatch(format!(
        "JSON {} is not valid for field `{}`",
        tok_name(tok),
        f.name()
    ))
}

fn tok_name(tok: Tok) -> &'static str {
    match tok {
        Tok::Object => "object",
        Tok::Array => "array",
        Tok::Str => "string",
        Tok::Num => "number",
        Tok::Bool => "boolean",
    }
}
