use jsonpb::schema::{FieldType, SchemaPool};
use jsonpb::{Error, Options, Parser, TraceSink};
use pretty_assertions::assert_eq;

fn pool() -> SchemaPool {
    let mut b = SchemaPool::builder().with_well_known_types();
    b.enum_type(
        "test.Corpus",
        &[("UNIVERSAL", 0), ("IMAGES", 1), ("WEB", 2)],
    );
    {
        let mut m = b.message("test.Item");
        m.field(1, "i", FieldType::Int32);
        m.field(2, "l", FieldType::Int64);
        m.field(3, "u", FieldType::UInt32);
        m.field(4, "ul", FieldType::UInt64);
        m.field(5, "f", FieldType::Float);
        m.field(6, "d", FieldType::Double);
        m.field(7, "ok", FieldType::Bool);
        m.field(8, "s", FieldType::String);
        m.field(9, "b", FieldType::Bytes);
        m.field(10, "corpus", FieldType::Enum("test.Corpus".into()));
        m.map(11, "m", FieldType::Int32, FieldType::String);
        m.map(12, "flags", FieldType::Bool, FieldType::Int32);
        m.map(
            13,
            "children",
            FieldType::String,
            FieldType::Message("test.Item".into()),
        );
        m.repeated(14, "tags", FieldType::String);
        m.field(15, "w", FieldType::Message("google.protobuf.Int32Value".into()));
        m.field(16, "dur", FieldType::Message("google.protobuf.Duration".into()));
        m.field(17, "ts", FieldType::Message("google.protobuf.Timestamp".into()));
        m.field(18, "val", FieldType::Message("google.protobuf.Value".into()));
        m.field(19, "st", FieldType::Message("google.protobuf.Struct".into()));
        m.field(20, "lv", FieldType::Message("google.protobuf.ListValue".into()));
        m.field(21, "nested", FieldType::Message("test.Item".into()));
        m.field(23, "renamed", FieldType::Int32).json_name("customName");
    }
    b.build().unwrap()
}

fn try_parse_opts(
    pool: &SchemaPool,
    root: &str,
    input: &[u8],
    options: Options,
) -> Result<Vec<String>, Error> {
    let root = pool.message(root).unwrap();
    let mut parser = Parser::new(root, TraceSink::new(), options);
    parser.feed(input)?;
    parser.end()?;
    Ok(parser.into_sink().calls)
}

fn try_parse(pool: &SchemaPool, root: &str, input: &str) -> Result<Vec<String>, Error> {
    try_parse_opts(pool, root, input.as_bytes(), Options::default())
}

fn parse(pool: &SchemaPool, root: &str, input: &str) -> Vec<String> {
    let calls = try_parse(pool, root, input).expect(input);
    check_pairing(&calls);
    calls
}

// Every start event must pair with its end at the same depth.
fn check_pairing(calls: &[String]) {
    let mut depth = Vec::new();
    for call in calls {
        let name = call.split('(').next().unwrap();
        match name {
            "start_msg" | "start_sub_msg" | "start_seq" | "start_str" => {
                depth.push(name.replace("start", "end"))
            }
            "end_msg" | "end_sub_msg" | "end_seq" | "end_str" => {
                assert_eq!(depth.pop().as_deref(), Some(name), "{calls:?}")
            }
            _ => (),
        }
    }
    assert!(depth.is_empty(), "unclosed events: {calls:?}");
}

#[test]
fn test_int32_bounds() {
    let pool = pool();
    assert_eq!(
        parse(&pool, "test.Item", r#"{"i":-2147483648}"#),
        vec!["start_msg", "put_int32(i, -2147483648)", "end_msg"],
    );
    assert!(matches!(
        try_parse(&pool, "test.Item", r#"{"i":2147483648}"#),
        Err(Error::Number { .. })
    ));
}

#[test]
fn test_scalars() {
    let pool = pool();
    assert_eq!(
        parse(
            &pool,
            "test.Item",
            r#"{"l":-9223372036854775808,"u":7,"ul":"18446744073709551615","ok":true}"#,
        ),
        vec![
            "start_msg",
            "put_int64(l, -9223372036854775808)",
            "put_uint32(u, 7)",
            "put_uint64(ul, 18446744073709551615)",
            "put_bool(ok, true)",
            "end_msg",
        ],
    );
}

#[test]
fn test_floats_and_specials() {
    let pool = pool();
    assert_eq!(
        parse(&pool, "test.Item", r#"{"d":Infinity,"f":-Infinity}"#),
        vec![
            "start_msg",
            "put_double(d, inf)",
            "put_float(f, -inf)",
            "end_msg",
        ],
    );
    assert_eq!(
        parse(&pool, "test.Item", r#"{"d":"NaN","f":"1.5"}"#),
        vec![
            "start_msg",
            "put_double(d, NaN)",
            "put_float(f, 1.5)",
            "end_msg",
        ],
    );
    // A float field rejects finite values beyond f32 range.
    assert!(matches!(
        try_parse(&pool, "test.Item", r#"{"f":3.5e38}"#),
        Err(Error::Number { .. })
    ));
}

#[test]
fn test_string_streams_chunks() {
    let pool = pool();
    assert_eq!(
        parse(&pool, "test.Item", r#"{"s":"hello"}"#),
        vec![
            "start_msg",
            "start_str(s)",
            "str_chunk(s, \"hello\")",
            "end_str(s)",
            "end_msg",
        ],
    );
    // Escapes split the value into multiple runs.
    assert_eq!(
        parse(&pool, "test.Item", r#"{"s":"a\nb"}"#),
        vec![
            "start_msg",
            "start_str(s)",
            "str_chunk(s, \"a\")",
            "str_chunk(s, \"\\n\")",
            "str_chunk(s, \"b\")",
            "end_str(s)",
            "end_msg",
        ],
    );
}

#[test]
fn test_unicode_escapes() {
    let pool = pool();
    // \u00e9 is two UTF-8 bytes; a surrogate pair combines into one
    // four-byte code point.
    assert_eq!(
        parse(&pool, "test.Item", r#"{"s":"\u00e9\uD83D\uDE00"}"#),
        vec![
            "start_msg",
            "start_str(s)",
            "str_chunk(s, \"\u{e9}\")",
            "str_chunk(s, \"\u{1F600}\")",
            "end_str(s)",
            "end_msg",
        ],
    );

    // Unpaired surrogates, either half, are lexical errors.
    assert!(matches!(
        try_parse(&pool, "test.Item", r#"{"s":"\uD83Dx"}"#),
        Err(Error::Lexical(_))
    ));
    assert!(matches!(
        try_parse(&pool, "test.Item", r#"{"s":"\uDE00"}"#),
        Err(Error::Lexical(_))
    ));
    assert!(matches!(
        try_parse(&pool, "test.Item", r#"{"s":"\uD83D"}"#),
        Err(Error::Lexical(_))
    ));
}

#[test]
fn test_bytes_base64() {
    let pool = pool();
    assert_eq!(
        parse(&pool, "test.Item", r#"{"b":"dGVzdA=="}"#),
        vec![
            "start_msg",
            "start_str(b)",
            "str_chunk(b, \"test\")",
            "end_str(b)",
            "end_msg",
        ],
    );
    // Unpadded input is rejected.
    assert!(matches!(
        try_parse(&pool, "test.Item", r#"{"b":"dGVzdA"}"#),
        Err(Error::Base64 { .. })
    ));
}

#[test]
fn test_enum_names_and_numbers() {
    let pool = pool();
    assert_eq!(
        parse(&pool, "test.Item", r#"{"corpus":"WEB"}"#),
        vec!["start_msg", "put_enum(corpus, 2)", "end_msg"],
    );
    assert_eq!(
        parse(&pool, "test.Item", r#"{"corpus":7}"#),
        vec!["start_msg", "put_enum(corpus, 7)", "end_msg"],
    );
    assert!(matches!(
        try_parse(&pool, "test.Item", r#"{"corpus":"SPAM"}"#),
        Err(Error::EnumName { .. })
    ));
}

#[test]
fn test_map_int32_keys() {
    let pool = pool();
    assert_eq!(
        parse(&pool, "test.Item", r#"{"m":{"1":"a","2":"b"}}"#),
        vec![
            "start_msg",
            "start_seq(m)",
            "start_sub_msg(m)",
            "start_msg",
            "put_int32(key, 1)",
            "start_str(value)",
            "str_chunk(value, \"a\")",
            "end_str(value)",
            "end_msg",
            "end_sub_msg(m)",
            "start_sub_msg(m)",
            "start_msg",
            "put_int32(key, 2)",
            "start_str(value)",
            "str_chunk(value, \"b\")",
            "end_str(value)",
            "end_msg",
            "end_sub_msg(m)",
            "end_seq(m)",
            "end_msg",
        ],
    );
}

#[test]
fn test_map_bool_keys_and_message_values() {
    let pool = pool();
    assert_eq!(
        parse(&pool, "test.Item", r#"{"flags":{"true":1,"false":0}}"#),
        vec![
            "start_msg",
            "start_seq(flags)",
            "start_sub_msg(flags)",
            "start_msg",
            "put_bool(key, true)",
            "put_int32(value, 1)",
            "end_msg",
            "end_sub_msg(flags)",
            "start_sub_msg(flags)",
            "start_msg",
            "put_bool(key, false)",
            "put_int32(value, 0)",
            "end_msg",
            "end_sub_msg(flags)",
            "end_seq(flags)",
            "end_msg",
        ],
    );

    // Message-valued maps nest a subobject inside each entry.
    assert_eq!(
        parse(&pool, "test.Item", r#"{"children":{"x":{"i":1}}}"#),
        vec![
            "start_msg",
            "start_seq(children)",
            "start_sub_msg(children)",
            "start_msg",
            "start_str(key)",
            "str_chunk(key, \"x\")",
            "end_str(key)",
            "start_sub_msg(value)",
            "start_msg",
            "put_int32(i, 1)",
            "end_msg",
            "end_sub_msg(value)",
            "end_msg",
            "end_sub_msg(children)",
            "end_seq(children)",
            "end_msg",
        ],
    );

    assert!(matches!(
        try_parse(&pool, "test.Item", r#"{"flags":{"yes":1}}"#),
        Err(Error::TypeMismatch(_))
    ));
}

#[test]
fn test_repeated_strings() {
    let pool = pool();
    assert_eq!(
        parse(&pool, "test.Item", r#"{"tags":["a","b"]}"#),
        vec![
            "start_msg",
            "start_seq(tags)",
            "start_str(tags)",
            "str_chunk(tags, \"a\")",
            "end_str(tags)",
            "start_str(tags)",
            "str_chunk(tags, \"b\")",
            "end_str(tags)",
            "end_seq(tags)",
            "end_msg",
        ],
    );
    // A scalar where the array is required.
    assert!(matches!(
        try_parse(&pool, "test.Item", r#"{"tags":"a"}"#),
        Err(Error::TypeMismatch(_))
    ));
}

#[test]
fn test_wrapper_accepts_scalar_and_quoted() {
    let pool = pool();
    let expect = vec![
        "start_msg",
        "start_sub_msg(w)",
        "start_msg",
        "put_int32(value, 42)",
        "end_msg",
        "end_sub_msg(w)",
        "end_msg",
    ];
    assert_eq!(parse(&pool, "test.Item", r#"{"w":42}"#), expect);
    // A quoted integer produces the identical events.
    assert_eq!(parse(&pool, "test.Item", r#"{"w":"42"}"#), expect);
}

#[test]
fn test_duration() {
    let pool = pool();
    assert_eq!(
        parse(&pool, "test.Item", r#"{"dur":"1.500000001s"}"#),
        vec![
            "start_msg",
            "start_sub_msg(dur)",
            "start_msg",
            "put_int64(seconds, 1)",
            "put_int32(nanos, 500000001)",
            "end_msg",
            "end_sub_msg(dur)",
            "end_msg",
        ],
    );
    assert_eq!(
        parse(&pool, "test.Item", r#"{"dur":"-1.5s"}"#),
        vec![
            "start_msg",
            "start_sub_msg(dur)",
            "start_msg",
            "put_int64(seconds, -1)",
            "put_int32(nanos, -500000000)",
            "end_msg",
            "end_sub_msg(dur)",
            "end_msg",
        ],
    );
    assert!(matches!(
        try_parse(&pool, "test.Item", r#"{"dur":"315576000001s"}"#),
        Err(Error::Duration(_))
    ));
}

#[test]
fn test_timestamp() {
    let pool = pool();
    assert_eq!(
        parse(&pool, "test.Item", r#"{"ts":"2017-01-02T03:04:05.6Z"}"#),
        vec![
            "start_msg",
            "start_sub_msg(ts)",
            "start_msg",
            "put_int64(seconds, 1483326245)",
            "put_int32(nanos, 600000000)",
            "end_msg",
            "end_sub_msg(ts)",
            "end_msg",
        ],
    );
    assert!(matches!(
        try_parse(&pool, "test.Item", r#"{"ts":"0000-12-31T23:59:59Z"}"#),
        Err(Error::Timestamp(_))
    ));
}

#[test]
fn test_value_polymorphism() {
    let pool = pool();
    assert_eq!(
        parse(&pool, "test.Item", r#"{"val":5}"#),
        vec![
            "start_msg",
            "start_sub_msg(val)",
            "start_msg",
            "put_double(number_value, 5)",
            "end_msg",
            "end_sub_msg(val)",
            "end_msg",
        ],
    );
    assert_eq!(
        parse(&pool, "test.Item", r#"{"val":null}"#),
        vec![
            "start_msg",
            "start_sub_msg(val)",
            "start_msg",
            "put_enum(null_value, 0)",
            "end_msg",
            "end_sub_msg(val)",
            "end_msg",
        ],
    );
    assert_eq!(
        parse(&pool, "test.Item", r#"{"val":"x"}"#),
        vec![
            "start_msg",
            "start_sub_msg(val)",
            "start_msg",
            "start_str(string_value)",
            "str_chunk(string_value, \"x\")",
            "end_str(string_value)",
            "end_msg",
            "end_sub_msg(val)",
            "end_msg",
        ],
    );
}

#[test]
fn test_struct_and_list_value() {
    let pool = pool();
    assert_eq!(
        parse(&pool, "test.Item", r#"{"st":{"k":true}}"#),
        vec![
            "start_msg",
            "start_sub_msg(st)",
            "start_msg",
            "start_seq(fields)",
            "start_sub_msg(fields)",
            "start_msg",
            "start_str(key)",
            "str_chunk(key, \"k\")",
            "end_str(key)",
            "start_sub_msg(value)",
            "start_msg",
            "put_bool(bool_value, true)",
            "end_msg",
            "end_sub_msg(value)",
            "end_msg",
            "end_sub_msg(fields)",
            "end_seq(fields)",
            "end_msg",
            "end_sub_msg(st)",
            "end_msg",
        ],
    );
    assert_eq!(
        parse(&pool, "test.Item", r#"{"lv":[1,"a"]}"#),
        vec![
            "start_msg",
            "start_sub_msg(lv)",
            "start_msg",
            "start_seq(values)",
            "start_sub_msg(values)",
            "start_msg",
            "put_double(number_value, 1)",
            "end_msg",
            "end_sub_msg(values)",
            "start_sub_msg(values)",
            "start_msg",
            "start_str(string_value)",
            "str_chunk(string_value, \"a\")",
            "end_str(string_value)",
            "end_msg",
            "end_sub_msg(values)",
            "end_seq(values)",
            "end_msg",
            "end_sub_msg(lv)",
            "end_msg",
        ],
    );
}

#[test]
fn test_well_known_roots() {
    let pool = pool();
    assert_eq!(
        parse(&pool, "google.protobuf.Duration", r#""1.5s""#),
        vec![
            "start_msg",
            "put_int64(seconds, 1)",
            "put_int32(nanos, 500000000)",
            "end_msg",
        ],
    );
    assert_eq!(
        parse(&pool, "google.protobuf.Value", "[true]"),
        vec![
            "start_msg",
            "start_sub_msg(list_value)",
            "start_msg",
            "start_seq(values)",
            "start_sub_msg(values)",
            "start_msg",
            "put_bool(bool_value, true)",
            "end_msg",
            "end_sub_msg(values)",
            "end_seq(values)",
            "end_msg",
            "end_sub_msg(list_value)",
            "end_msg",
        ],
    );
    assert_eq!(
        parse(&pool, "google.protobuf.Int32Value", "42"),
        vec!["start_msg", "put_int32(value, 42)", "end_msg"],
    );
    assert_eq!(
        parse(&pool, "google.protobuf.Value", "null"),
        vec!["start_msg", "put_enum(null_value, 0)", "end_msg"],
    );
}

#[test]
fn test_nested_and_json_names() {
    let pool = pool();
    assert_eq!(
        parse(&pool, "test.Item", r#"{"nested":{"customName":1,"renamed":2}}"#),
        vec![
            "start_msg",
            "start_sub_msg(nested)",
            "start_msg",
            "put_int32(renamed, 1)",
            "put_int32(renamed, 2)",
            "end_msg",
            "end_sub_msg(nested)",
            "end_msg",
        ],
    );
}

#[test]
fn test_null_members_are_absent() {
    let pool = pool();
    assert_eq!(
        parse(&pool, "test.Item", r#"{"i":null,"s":null}"#),
        vec!["start_msg", "end_msg"],
    );
    // Null cannot stand in for a repeated element or a map value.
    assert!(matches!(
        try_parse(&pool, "test.Item", r#"{"tags":[null]}"#),
        Err(Error::TypeMismatch(_))
    ));
    assert!(matches!(
        try_parse(&pool, "test.Item", r#"{"m":{"1":null}}"#),
        Err(Error::TypeMismatch(_))
    ));
}

#[test]
fn test_unknown_members() {
    let pool = pool();
    assert!(matches!(
        try_parse(&pool, "test.Item", r#"{"mystery":1}"#),
        Err(Error::UnknownField { .. })
    ));

    // With ignore_json_unknown the whole subtree is skipped silently.
    let options = Options {
        ignore_json_unknown: true,
    };
    let calls = try_parse_opts(
        &pool,
        "test.Item",
        br#"{"mystery":{"a":[1,{"b":"c"}],"d":null},"i":9}"#,
        options,
    )
    .unwrap();
    assert_eq!(calls, vec!["start_msg", "put_int32(i, 9)", "end_msg"]);
}

#[test]
fn test_type_mismatches() {
    let pool = pool();
    for input in [
        r#"{"ok":"true"}"#, // string for bool
        r#"{"i":{}}"#,      // object for scalar
        r#"{"i":[1]}"#,     // array for singular scalar
        r#"{"s":3}"#,       // number for string
        r#"{"nested":5}"#,  // scalar for message
        r#"{"dur":17}"#,    // number for Duration
    ] {
        assert!(
            matches!(
                try_parse(&pool, "test.Item", input),
                Err(Error::TypeMismatch(_))
            ),
            "{input}"
        );
    }
    // A non-object root for a plain message.
    assert!(matches!(
        try_parse(&pool, "test.Item", "17"),
        Err(Error::TypeMismatch(_))
    ));
}

#[test]
fn test_lexical_errors() {
    let pool = pool();
    for input in [
        r#"{"i":01}"#,
        r#"{"i":1,}"#,
        r#"{"i":1}{"#,
        r#"{'i':1}"#,
        r#"{"i":+1}"#,
        "{\"s\":\"a\tb\"}",
    ] {
        assert!(
            matches!(try_parse(&pool, "test.Item", input), Err(Error::Lexical(_))),
            "{input}"
        );
    }
    for input in [r#"{"i":1"#, r#"{"s":"abc"#, r#"{"i":"#, ""] {
        assert!(
            matches!(
                try_parse(&pool, "test.Item", input),
                Err(Error::PrematureEof)
            ),
            "{input}"
        );
    }
}

#[test]
fn test_nesting_limit() {
    let pool = pool();
    let mut input = String::from(r#"{"mystery":"#);
    input.push_str(&"[".repeat(70));
    let options = Options {
        ignore_json_unknown: true,
    };
    assert!(matches!(
        try_parse_opts(&pool, "test.Item", input.as_bytes(), options),
        Err(Error::NestingTooDeep)
    ));
}

#[test]
fn test_halted_parser_replays_error() {
    let pool = pool();
    let root = pool.message("test.Item").unwrap();
    let mut parser = Parser::new(root, TraceSink::new(), Options::default());

    let err = parser.feed(br#"{"i":true}"#).unwrap_err();
    assert!(matches!(err, Error::TypeMismatch(_)));

    // Subsequent input produces no further emissions, just the status.
    let events_before = parser.sink().calls.len();
    assert_eq!(parser.feed(b"1"), Err(err.clone()));
    assert_eq!(parser.end(), Err(err.clone()));
    assert_eq!(parser.status(), Err(err));
    assert_eq!(parser.sink().calls.len(), events_before);
}

// A plain string run interrupted by a feed boundary coalesces into the
// same single chunk a one-shot parse emits; runs split only at escapes.
#[test]
fn test_string_runs_coalesce_across_feeds() {
    let pool = pool();
    let root = pool.message("test.Item").unwrap();
    let mut parser = Parser::new(root, TraceSink::new(), Options::default());
    parser.feed(br#"{"s":"hel"#).unwrap();
    parser.feed(br#"lo \n"#).unwrap();
    parser.feed(br#"ab"}"#).unwrap();
    parser.end().unwrap();
    assert_eq!(
        parser.into_sink().calls,
        vec![
            "start_msg",
            "start_str(s)",
            "str_chunk(s, \"hello \")",
            "str_chunk(s, \"\\n\")",
            "str_chunk(s, \"ab\")",
            "end_str(s)",
            "end_msg",
        ],
    );
}

// Feeding the same document split at every byte boundary, and byte by
// byte, must yield the identical event trace as a one-shot parse.
#[test]
fn test_split_invariance() {
    let pool = pool();
    let fixtures = [
        r#"{"i":123,"l":-9223372036854775808,"ul":18446744073709551615}"#,
        r#"{"s":"hello \"world\"\n\u00e9\uD83D\uDE00","b":"dGVzdA=="}"#,
        r#"{"m":{"1":"a","2":"b"},"flags":{"true":7}}"#,
        r#"{"w":42,"dur":"1.500000001s","ts":"2017-01-02T03:04:05.6Z"}"#,
        r#"{"val":{"k":[1,"a",null,{"z":false}]},"lv":[]}"#,
        r#"{"tags":["a","b"],"nested":{"i":1,"d":Infinity}}"#,
        r#"  { "i" : 1 , "d" : 1.25e2 }  "#,
    ];

    for fixture in fixtures {
        let input = fixture.as_bytes();
        let expect = parse(&pool, "test.Item", fixture);

        for split in 0..=input.len() {
            let root = pool.message("test.Item").unwrap();
            let mut parser = Parser::new(root, TraceSink::new(), Options::default());
            parser.feed(&input[..split]).unwrap();
            parser.feed(&input[split..]).unwrap();
            parser.end().unwrap();
            assert_eq!(parser.into_sink().calls, expect, "split {split} of {fixture}");
        }

        let root = pool.message("test.Item").unwrap();
        let mut parser = Parser::new(root, TraceSink::new(), Options::default());
        for b in input {
            parser.feed(std::slice::from_ref(b)).unwrap();
        }
        parser.end().unwrap();
        assert_eq!(parser.into_sink().calls, expect, "byte-at-a-time {fixture}");
    }
}

// serde_json agrees these fixtures are well-formed JSON, so the split
// harness above is exercising the decoder and not typos.
#[test]
fn test_fixtures_are_valid_json() {
    for fixture in [
        r#"{"i":123}"#,
        r#"{"m":{"1":"a","2":"b"},"flags":{"true":7}}"#,
        r#"{"val":{"k":[1,"a",null,{"z":false}]},"lv":[]}"#,
    ] {
        serde_json::from_str::<serde_json::Value>(fixture).unwrap();
    }
}
