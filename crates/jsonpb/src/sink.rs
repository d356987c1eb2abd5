use crate::schema::FieldDef;

/// Sink receives the decoded event stream, in strict document order.
///
/// Framing events always pair: `start_msg`/`end_msg`,
/// `start_seq`/`end_seq`, `start_sub_msg`/`end_sub_msg`, and
/// `start_str`/`end_str`. String content arrives as zero or more
/// `str_chunk` runs between `start_str` and `end_str`. Run boundaries
/// are fixed by the document alone (each escape sequence produces its
/// own run), never by how the input was split across feed calls, so
/// the full event sequence depends only on the document bytes. A run
/// may borrow directly from the input buffer of the current feed call,
/// or from the decoder's accumulator when it spanned a feed boundary;
/// either way it is valid only for the duration of the callback.
///
/// Sinks are infallible. A sink that must reject data records that fact
/// itself and inspects it after the parse.
pub trait Sink<F: FieldDef> {
    fn start_msg(&mut self);
    fn end_msg(&mut self);

    fn start_sub_msg(&mut self, field: F);
    fn end_sub_msg(&mut self, field: F);

    fn start_seq(&mut self, field: F);
    fn end_seq(&mut self, field: F);

    fn start_str(&mut self, field: F);
    fn str_chunk(&mut self, field: F, chunk: &[u8]);
    fn end_str(&mut self, field: F);

    fn put_bool(&mut self, field: F, value: bool);
    fn put_int32(&mut self, field: F, value: i32);
    fn put_int64(&mut self, field: F, value: i64);
    fn put_uint32(&mut self, field: F, value: u32);
    fn put_uint64(&mut self, field: F, value: u64);
    fn put_float(&mut self, field: F, value: f32);
    fn put_double(&mut self, field: F, value: f64);
    fn put_enum(&mut self, field: F, value: i32);
}

/// TraceSink records every event as a rendered call string.
///
/// It exists for tests and debugging: event traces compare with
/// `assert_eq!` or snapshot directly.
#[derive(Debug, Default)]
pub struct TraceSink {
    pub calls: Vec<String>,
}

impl TraceSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<F: FieldDef> Sink<F> for TraceSink {
    fn start_msg(&mut self) {
        self.calls.push("start_msg".to_string());
    }
    fn end_msg(&mut self) {
        self.calls.push("end_msg".to_string());
    }
    fn start_sub_msg(&mut self, field: F) {
        self.calls.push(format!("start_sub_msg({})", field.name()));
    }
    fn end_sub_msg(&mut self, field: F) {
        self.calls.push(format!("end_sub_msg({})", field.name()));
    }
    fn start_seq(&mut self, field: F) {
        self.calls.push(format!("start_seq({})", field.name()));
    }
    fn end_seq(&mut self, field: F) {
        self.calls.push(format!("end_seq({})", field.name()));
    }
    fn start_str(&mut self, field: F) {
        self.calls.push(format!("start_str({})", field.name()));
    }
    fn str_chunk(&mut self, field: F, chunk: &[u8]) {
        self.calls.push(format!(
            "str_chunk({}, {:?})",
            field.name(),
            String::from_utf8_lossy(chunk)
        ));
    }
    fn end_str(&mut self, field: F) {
        self.calls.push(format!("end_str({})", field.name()));
    }
    fn put_bool(&mut self, field: F, value: bool) {
        self.calls.push(format!("put_bool({}, {})", field.name(), value));
    }
    fn put_int32(&mut self, field: F, value: i32) {
        self.calls.push(format!("put_int32({}, {})", field.name(), value));
    }
    fn put_int64(&mut self, field: F, value: i64) {
        self.calls.push(format!("put_int64({}, {})", field.name(), value));
    }
    fn put_uint32(&mut self, field: F, value: u32) {
        self.calls.push(format!("put_uint32({}, {})", field.name(), value));
    }
    fn put_uint64(&mut self, field: F, value: u64) {
        self.calls.push(format!("put_uint64({}, {})", field.name(), value));
    }
    fn put_float(&mut self, field: F, value: f32) {
        self.calls.push(format!("put_float({}, {})", field.name(), value));
    }
    fn put_double(&mut self, field: F, value: f64) {
        self.calls.push(format!("put_double({}, {})", field.name(), value));
    }
    fn put_enum(&mut self, field: F, value: i32) {
        self.calls.push(format!("put_enum({}, {})", field.name(), value));
    }
}
