//! Conversion of an accumulated numeric literal into the bound field's
//! scalar type.
//!
//! Integer targets prefer an exact 64-bit integer parse, falling back
//! (for unquoted input only) to a double parse which must be integral
//! and in range. Quoted input is legal for every numeric field but must
//! be a pure integer literal when the target is not a float type.

use crate::schema::FieldKind;
use crate::Error;

/// A typed scalar ready for emission.
#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) enum Scalar {
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Enum(i32),
}

/// Interpret `text` by the declared `kind`. Callers have already ruled
/// out non-numeric kinds.
pub(crate) fn parse(text: &[u8], kind: FieldKind, quoted: bool) -> Result<Scalar, Error> {
    let literal = std::str::from_utf8(text)
        .map_err(|_| err(text, "not a number"))?;

    match kind {
        FieldKind::Int32 => {
            let v = signed(literal, quoted)?;
            i32::try_from(v)
                .map(Scalar::I32)
                .map_err(|_| err_str(literal, "out of range for int32"))
        }
        FieldKind::Int64 => signed(literal, quoted).map(Scalar::I64),
        FieldKind::UInt32 => {
            let v = unsigned(literal, quoted)?;
            u32::try_from(v)
                .map(Scalar::U32)
                .map_err(|_| err_str(literal, "out of range for uint32"))
        }
        FieldKind::UInt64 => unsigned(literal, quoted).map(Scalar::U64),
        FieldKind::Enum => {
            let v = signed(literal, quoted)?;
            i32::try_from(v)
                .map(Scalar::Enum)
                .map_err(|_| err_str(literal, "out of range for enum"))
        }
        FieldKind::Float => {
            let v = float(literal)?;
            if v.is_finite() && (v < f32::MIN as f64 || v > f32::MAX as f64) {
                return Err(err_str(literal, "out of range for float"));
            }
            Ok(Scalar::F32(v as f32))
        }
        FieldKind::Double => float(literal).map(Scalar::F64),
        _ => unreachable!("caller dispatches only numeric kinds"),
    }
}

fn signed(literal: &str, quoted: bool) -> Result<i64, Error> {
    if let Ok(v) = literal.parse::<i64>() {
        return Ok(v);
    }
    if quoted {
        return Err(err_str(literal, "quoted value must be an integer literal"));
    }
    let v = float(literal)?;
    integral(literal, v)?;
    if v < -9223372036854775808.0 || v >= 9223372036854775808.0 {
        return Err(err_str(literal, "out of range for int64"));
    }
    Ok(v as i64)
}

fn unsigned(literal: &str, quoted: bool) -> Result<u64, Error> {
    if let Ok(v) = literal.parse::<u64>() {
        return Ok(v);
    }
    if quoted {
        return Err(err_str(literal, "quoted value must be an integer literal"));
    }
    let v = float(literal)?;
    integral(literal, v)?;
    if v < 0.0 || v >= 18446744073709551616.0 {
        return Err(err_str(literal, "out of range for uint64"));
    }
    Ok(v as u64)
}

fn float(literal: &str) -> Result<f64, Error> {
    literal
        .parse::<f64>()
        .map_err(|_| err_str(literal, "invalid number"))
}

// A double is usable for an integer target only when its fractional
// part is exactly zero (which also rules out NaN and infinities).
fn integral(literal: &str, v: f64) -> Result<(), Error> {
    if v.fract() == 0.0 {
        Ok(())
    } else {
        Err(err_str(literal, "not an integer"))
    }
}

fn err(text: &[u8], detail: &str) -> Error {
    Error::Number {
        literal: String::from_utf8_lossy(text).into_owned(),
        detail: detail.to_string(),
    }
}

fn err_str(literal: &str, detail: &str) -> Error {
    Error::Number {
        literal: literal.to_string(),
        detail: detail.to_string(),
    }
}
