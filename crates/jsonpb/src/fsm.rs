//! The lexical core: a deterministic state machine over the JSON
//! grammar, precompiled into a `State x Class` transition table.
//!
//! Bytes map to a small set of character classes; each `(state, class)`
//! cell is either a plain state change, an action for the semantic
//! layer (which also decides the next state), or dead. Nesting is
//! handled by the parser's bounded container stack, making the whole
//! recognizer a regular core plus one explicit stack.
//!
//! Beyond RFC-7159 JSON the table accepts bare `Infinity` and
//! `-Infinity` as number tokens. Quoted numbers, durations, and
//! timestamps lex as ordinary strings and are re-interpreted against
//! the bound field by the semantic layer.

use lazy_static::lazy_static;

/// Character classes. `Etc` covers printable bytes with no structural
/// meaning (legal only inside strings) and all bytes >= 0x80; `Bad` is
/// the non-whitespace control range, illegal everywhere.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum Class {
    Space,
    White,
    LCurb,
    RCurb,
    LSqrb,
    RSqrb,
    Colon,
    Comma,
    Quote,
    Backslash,
    Slash,
    Plus,
    Minus,
    Point,
    Zero,
    Digit, // 1-9
    LowA,
    LowB,
    LowC,
    LowD,
    LowE,
    LowF,
    LowI,
    LowL,
    LowN,
    LowR,
    LowS,
    LowT,
    LowU,
    LowY,
    CapAF, // A B C D F
    CapE,
    CapI,
    Etc,
    Bad,
}

const NCLASS: usize = Class::Bad as usize + 1;

pub(crate) fn classify(b: u8) -> Class {
    use Class::*;

    match b {
        b' ' => Space,
        b'\t' | b'\n' | b'\r' => White,
        b'{' => LCurb,
        b'}' => RCurb,
        b'[' => LSqrb,
        b']' => RSqrb,
        b':' => Colon,
        b',' => Comma,
        b'"' => Quote,
        b'\\' => Backslash,
        b'/' => Slash,
        b'+' => Plus,
        b'-' => Minus,
        b'.' => Point,
        b'0' => Zero,
        b'1'..=b'9' => Digit,
        b'a' => LowA,
        b'b' => LowB,
        b'c' => LowC,
        b'd' => LowD,
        b'e' => LowE,
        b'f' => LowF,
        b'i' => LowI,
        b'l' => LowL,
        b'n' => LowN,
        b'r' => LowR,
        b's' => LowS,
        b't' => LowT,
        b'u' => LowU,
        b'y' => LowY,
        b'A'..=b'D' | b'F' => CapAF,
        b'E' => CapE,
        b'I' => CapI,
        0x00..=0x1f => Bad,
        _ => Etc,
    }
}

/// Parser states. Number and string states form the embedded
/// sub-machines; the remainder is the structural grammar.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum State {
    Start,    // expecting the root value
    Done,     // root value complete; whitespace only
    ObjOpen,  // after '{': member name or '}'
    ObjName,  // after ',': member name
    ObjColon, // after a member name: ':'
    ObjNext,  // after a member value: ',' or '}'
    ArrOpen,  // after '[': value or ']'
    ArrNext,  // after an element: ',' or ']'
    Value,    // after ':' or an array ',': any value

    Str,
    StrEsc,
    Uni0,
    Uni1,
    Uni2,
    Uni3,

    NumMinus,
    NumZero,
    NumInt,
    NumDot,
    NumFrac,
    NumExpMark,
    NumExpSign,
    NumExpDigit,

    True1,
    True2,
    True3,
    False1,
    False2,
    False3,
    False4,
    Null1,
    Null2,
    Null3,

    Inf1,
    Inf2,
    Inf3,
    Inf4,
    Inf5,
    Inf6,
    Inf7,
}

const NSTATE: usize = State::Inf7 as usize + 1;

/// Actions dispatched to the semantic layer. The handler performs the
/// semantic work and sets the next state (and may retry the byte).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Action {
    ObjBegin,
    ObjEnd,
    ObjEndEmpty,
    ArrBegin,
    ArrEnd,
    ArrEndEmpty,
    NameBegin,
    StrBegin,
    StrEnd,
    EscBegin,
    EscChar,
    EscU,
    HexDigit,
    NumBegin,
    NumEnd,    // delimiter reached: end the number, retry the byte
    NumEndInf, // final 'y' of Infinity: the token ends on this byte
    LitTrue,
    LitFalse,
    LitNull,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Cell {
    Dead,
    To(State),
    Do(Action),
}

struct Table([[Cell; NCLASS]; NSTATE]);

lazy_static! {
    static ref TABLE: Table = build();
}

#[inline]
pub(crate) fn lookup(state: State, class: Class) -> Cell {
    TABLE.0[state as usize][class as usize]
}

/// True for states in which an EOF (or delimiter) legally terminates a
/// number token.
pub(crate) fn number_can_end(state: State) -> bool {
    matches!(
        state,
        State::NumZero | State::NumInt | State::NumFrac | State::NumExpDigit
    )
}

/// Hex digit value; the table has already classified the byte.
pub(crate) fn hex_value(b: u8) -> u32 {
    match b {
        b'0'..=b'9' => (b - b'0') as u32,
        b'a'..=b'f' => (b - b'a' + 10) as u32,
        b'A'..=b'F' => (b - b'A' + 10) as u32,
        _ => unreachable!("byte classified as hex digit"),
    }
}

fn set(t: &mut Table, s: State, classes: &[Class], cell: Cell) {
    for &c in classes {
        t.0[s as usize][c as usize] = cell;
    }
}

// Classes which may legally terminate a number token mid-document.
const NUM_END: &[Class] = &[
    Class::Space,
    Class::White,
    Class::Comma,
    Class::RCurb,
    Class::RSqrb,
];

const WS: &[Class] = &[Class::Space, Class::White];

const HEX: &[Class] = &[
    Class::Zero,
    Class::Digit,
    Class::LowA,
    Class::LowB,
    Class::LowC,
    Class::LowD,
    Class::LowE,
    Class::LowF,
    Class::CapAF,
    Class::CapE,
];

// Fill a value-position row: every token which may begin a value.
fn value_row(t: &mut Table, s: State) {
    use {Action::*, Class::*, State::*};

    set(t, s, WS, Cell::To(s));
    set(t, s, &[LCurb], Cell::Do(ObjBegin));
    set(t, s, &[LSqrb], Cell::Do(ArrBegin));
    set(t, s, &[Quote], Cell::Do(StrBegin));
    set(t, s, &[Minus, Zero, Digit, CapI], Cell::Do(NumBegin));
    set(t, s, &[LowT], Cell::To(True1));
    set(t, s, &[LowF], Cell::To(False1));
    set(t, s, &[LowN], Cell::To(Null1));
}

fn build() -> Table {
    use {Action::*, Class::*, State::*};

    let mut t = Table([[Cell::Dead; NCLASS]; NSTATE]);

    value_row(&mut t, Start);
    value_row(&mut t, Value);
    value_row(&mut t, ArrOpen);
    set(&mut t, ArrOpen, &[RSqrb], Cell::Do(ArrEndEmpty));

    set(&mut t, Done, WS, Cell::To(Done));

    set(&mut t, ObjOpen, WS, Cell::To(ObjOpen));
    set(&mut t, ObjOpen, &[Quote], Cell::Do(NameBegin));
    set(&mut t, ObjOpen, &[RCurb], Cell::Do(ObjEndEmpty));

    set(&mut t, ObjName, WS, Cell::To(ObjName));
    set(&mut t, ObjName, &[Quote], Cell::Do(NameBegin));

    set(&mut t, ObjColon, WS, Cell::To(ObjColon));
    set(&mut t, ObjColon, &[Colon], Cell::To(Value));

    set(&mut t, ObjNext, WS, Cell::To(ObjNext));
    set(&mut t, ObjNext, &[Comma], Cell::To(ObjName));
    set(&mut t, ObjNext, &[RCurb], Cell::Do(ObjEnd));

    set(&mut t, ArrNext, WS, Cell::To(ArrNext));
    set(&mut t, ArrNext, &[Comma], Cell::To(Value));
    set(&mut t, ArrNext, &[RSqrb], Cell::Do(ArrEnd));

    // Strings: every class flows back into Str except the quote, the
    // escape introducer, and (unescaped) control characters.
    for c in 0..NCLASS as u8 {
        t.0[Str as usize][c as usize] = Cell::To(Str);
    }
    set(&mut t, Str, &[Quote], Cell::Do(StrEnd));
    set(&mut t, Str, &[Backslash], Cell::Do(EscBegin));
    set(&mut t, Str, &[White, Bad], Cell::Dead);

    set(
        &mut t,
        StrEsc,
        &[Quote, Backslash, Slash, LowB, LowF, LowN, LowR, LowT],
        Cell::Do(EscChar),
    );
    set(&mut t, StrEsc, &[LowU], Cell::Do(EscU));

    for s in [Uni0, Uni1, Uni2, Uni3] {
        set(&mut t, s, HEX, Cell::Do(HexDigit));
    }

    // Numbers.
    set(&mut t, NumMinus, &[Zero], Cell::To(NumZero));
    set(&mut t, NumMinus, &[Digit], Cell::To(NumInt));
    set(&mut t, NumMinus, &[CapI], Cell::To(Inf1));

    set(&mut t, NumZero, &[Point], Cell::To(NumDot));
    set(&mut t, NumZero, &[LowE, CapE], Cell::To(NumExpMark));
    set(&mut t, NumZero, NUM_END, Cell::Do(NumEnd));

    set(&mut t, NumInt, &[Zero, Digit], Cell::To(NumInt));
    set(&mut t, NumInt, &[Point], Cell::To(NumDot));
    set(&mut t, NumInt, &[LowE, CapE], Cell::To(NumExpMark));
    set(&mut t, NumInt, NUM_END, Cell::Do(NumEnd));

    set(&mut t, NumDot, &[Zero, Digit], Cell::To(NumFrac));

    set(&mut t, NumFrac, &[Zero, Digit], Cell::To(NumFrac));
    set(&mut t, NumFrac, &[LowE, CapE], Cell::To(NumExpMark));
    set(&mut t, NumFrac, NUM_END, Cell::Do(NumEnd));

    set(&mut t, NumExpMark, &[Plus, Minus], Cell::To(NumExpSign));
    set(&mut t, NumExpMark, &[Zero, Digit], Cell::To(NumExpDigit));

    set(&mut t, NumExpSign, &[Zero, Digit], Cell::To(NumExpDigit));

    set(&mut t, NumExpDigit, &[Zero, Digit], Cell::To(NumExpDigit));
    set(&mut t, NumExpDigit, NUM_END, Cell::Do(NumEnd));

    // Literals.
    set(&mut t, True1, &[LowR], Cell::To(True2));
    set(&mut t, True2, &[LowU], Cell::To(True3));
    set(&mut t, True3, &[LowE], Cell::Do(LitTrue));

    set(&mut t, False1, &[LowA], Cell::To(False2));
    set(&mut t, False2, &[LowL], Cell::To(False3));
    set(&mut t, False3, &[LowS], Cell::To(False4));
    set(&mut t, False4, &[LowE], Cell::Do(LitFalse));

    set(&mut t, Null1, &[LowU], Cell::To(Null2));
    set(&mut t, Null2, &[LowL], Cell::To(Null3));
    set(&mut t, Null3, &[LowL], Cell::Do(LitNull));

    set(&mut t, Inf1, &[LowN], Cell::To(Inf2));
    set(&mut t, Inf2, &[LowF], Cell::To(Inf3));
    set(&mut t, Inf3, &[LowI], Cell::To(Inf4));
    set(&mut t, Inf4, &[LowN], Cell::To(Inf5));
    set(&mut t, Inf5, &[LowI], Cell::To(Inf6));
    set(&mut t, Inf6, &[LowT], Cell::To(Inf7));
    set(&mut t, Inf7, &[LowY], Cell::Do(NumEndInf));

    t
}

#[cfg(test)]
mod test {
    use super::{Action::*, Cell, Class, State::*, *};

    #[test]
    fn test_classify() {
        assert_eq!(classify(b'{'), Class::LCurb);
        assert_eq!(classify(b'7'), Class::Digit);
        assert_eq!(classify(b'0'), Class::Zero);
        assert_eq!(classify(b'E'), Class::CapE);
        assert_eq!(classify(b'I'), Class::CapI);
        assert_eq!(classify(0x03), Class::Bad);
        assert_eq!(classify(0xe2), Class::Etc);
        assert_eq!(classify(b'#'), Class::Etc);
    }

    #[test]
    fn test_structural_cells() {
        assert_eq!(lookup(Start, Class::LCurb), Cell::Do(ObjBegin));
        assert_eq!(lookup(ObjOpen, Class::Quote), Cell::Do(NameBegin));
        assert_eq!(lookup(ObjOpen, Class::RCurb), Cell::Do(ObjEndEmpty));
        assert_eq!(lookup(Value, Class::Quote), Cell::Do(StrBegin));
        assert_eq!(lookup(ArrOpen, Class::RSqrb), Cell::Do(ArrEndEmpty));
        assert_eq!(lookup(Done, Class::LCurb), Cell::Dead);
        assert_eq!(lookup(Done, Class::Space), Cell::To(Done));
    }

    #[test]
    fn test_number_cells() {
        // "0." must continue with a digit; "00" is dead.
        assert_eq!(lookup(NumZero, Class::Point), Cell::To(NumDot));
        assert_eq!(lookup(NumZero, Class::Zero), Cell::Dead);
        assert_eq!(lookup(NumDot, Class::Comma), Cell::Dead);
        assert_eq!(lookup(NumFrac, Class::Comma), Cell::Do(NumEnd));
        assert_eq!(lookup(NumExpMark, Class::Minus), Cell::To(NumExpSign));
        assert_eq!(lookup(NumMinus, Class::CapI), Cell::To(Inf1));
        assert_eq!(lookup(Inf7, Class::LowY), Cell::Do(NumEndInf));
        assert!(number_can_end(NumZero));
        assert!(!number_can_end(NumDot));
        assert!(!number_can_end(NumExpSign));
    }

    #[test]
    fn test_string_cells() {
        // Raw multi-byte UTF-8 and whitespace-class bytes inside strings.
        assert_eq!(lookup(Str, Class::Etc), Cell::To(Str));
        assert_eq!(lookup(Str, Class::Space), Cell::To(Str));
        assert_eq!(lookup(Str, Class::White), Cell::Dead);
        assert_eq!(lookup(Str, Class::Quote), Cell::Do(StrEnd));
        assert_eq!(lookup(StrEsc, Class::LowN), Cell::Do(EscChar));
        assert_eq!(lookup(StrEsc, Class::LowA), Cell::Dead);
        assert_eq!(lookup(Uni2, Class::CapAF), Cell::Do(HexDigit));
        assert_eq!(lookup(Uni2, Class::LowI), Cell::Dead);
    }
}
