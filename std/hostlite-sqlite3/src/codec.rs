///
/// Value codec.
///
/// Converts engine cells into `Value`s and `Value`s (or their parts) into
/// bound parameters. Decoding dispatches on the cell's dynamic type tag for
/// the current row; the same column may change type from row to row.
///
/// Binding always uses `SQLITE_TRANSIENT` with an explicit byte length: the
/// engine copies the data before the bind call returns, so the caller's
/// buffer may be reused or freed immediately.
///
/// Integers follow `IntegerWidth`. Under `Narrow` (the default) reads use the
/// engine's 32-bit accessor and wider stored values wrap modulo 2^32; this is
/// part of the contract, not an accident. `Wide` reads full 64-bit values.
///

use std::borrow::Cow;
use std::ffi::{c_char, c_int, c_void};

use rusqlite::ffi;
use tracing::trace;

use crate::config::{CodecConfig, IntegerWidth, TextEncoding};
use crate::error::{Error, Result};
use crate::raw::{status_error, RawStatement};

/// One decoded cell
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Decode column `column` of the current row.
pub fn decode_column(stmt: &RawStatement, column: usize, codec: &CodecConfig) -> Result<Value> {
    let raw = stmt.as_ptr();
    let col = column as c_int;
    let tag = unsafe { ffi::sqlite3_column_type(raw, col) };
    match tag {
        ffi::SQLITE_TEXT => {
            // Fetch the pointer before the length, as the engine requires.
            let bytes = unsafe {
                let data = ffi::sqlite3_column_text(raw, col);
                let len = ffi::sqlite3_column_bytes(raw, col);
                copy_cell(data as *const c_void, len)
            };
            Ok(Value::Text(decode_text(&bytes, codec.text)))
        }
        ffi::SQLITE_BLOB => {
            let bytes = unsafe {
                let data = ffi::sqlite3_column_blob(raw, col);
                let len = ffi::sqlite3_column_bytes(raw, col);
                copy_cell(data, len)
            };
            Ok(Value::Blob(bytes))
        }
        ffi::SQLITE_INTEGER => {
            let value = match codec.integers {
                IntegerWidth::Narrow => unsafe { ffi::sqlite3_column_int(raw, col) as i64 },
                IntegerWidth::Wide => unsafe { ffi::sqlite3_column_int64(raw, col) },
            };
            Ok(Value::Integer(value))
        }
        ffi::SQLITE_FLOAT => Ok(Value::Float(unsafe { ffi::sqlite3_column_double(raw, col) })),
        ffi::SQLITE_NULL => Ok(Value::Null),
        tag => Err(Error::UnknownColumnType { column, tag }),
    }
}

/// Copy `len` bytes of engine-owned cell memory into an owned buffer.
unsafe fn copy_cell(data: *const c_void, len: c_int) -> Vec<u8> {
    let len = usize::try_from(len).unwrap_or(0);
    if data.is_null() || len == 0 {
        return Vec::new();
    }
    unsafe { std::slice::from_raw_parts(data as *const u8, len).to_vec() }
}

pub fn decode_text(bytes: &[u8], encoding: TextEncoding) -> String {
    match encoding {
        TextEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        TextEncoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
    }
}

pub fn encode_text(text: &str, encoding: TextEncoding) -> Result<Cow<'_, [u8]>> {
    match encoding {
        TextEncoding::Utf8 => Ok(Cow::Borrowed(text.as_bytes())),
        TextEncoding::Latin1 => text
            .chars()
            .map(|ch| u8::try_from(ch).map_err(|_| Error::Unencodable { ch }))
            .collect::<Result<Vec<u8>>>()
            .map(Cow::Owned),
    }
}

/// Parameter index as the engine expects it. Out-of-range values are left
/// for the engine to reject, so they surface as an ordinary engine error.
fn param_index(index: usize) -> c_int {
    c_int::try_from(index).unwrap_or(c_int::MAX)
}

fn check(code: c_int) -> Result<()> {
    if code == ffi::SQLITE_OK {
        Ok(())
    } else {
        Err(status_error(code))
    }
}

fn byte_len(len: usize) -> Result<c_int> {
    c_int::try_from(len).map_err(|_| status_error(ffi::SQLITE_TOOBIG))
}

pub fn bind_text(stmt: &RawStatement, index: usize, text: &str, encoding: TextEncoding) -> Result<()> {
    let bytes = encode_text(text, encoding)?;
    let len = byte_len(bytes.len())?;
    trace!(index, len, "bind text");
    let code = unsafe {
        ffi::sqlite3_bind_text(
            stmt.as_ptr(),
            param_index(index),
            bytes.as_ptr() as *const c_char,
            len,
            ffi::SQLITE_TRANSIENT(),
        )
    };
    check(code)
}

pub fn bind_blob(stmt: &RawStatement, index: usize, bytes: &[u8]) -> Result<()> {
    let len = byte_len(bytes.len())?;
    trace!(index, len, "bind blob");
    let code = unsafe {
        ffi::sqlite3_bind_blob(
            stmt.as_ptr(),
            param_index(index),
            bytes.as_ptr() as *const c_void,
            len,
            ffi::SQLITE_TRANSIENT(),
        )
    };
    check(code)
}

pub fn bind_int(stmt: &RawStatement, index: usize, value: i32) -> Result<()> {
    trace!(index, value, "bind int");
    check(unsafe { ffi::sqlite3_bind_int(stmt.as_ptr(), param_index(index), value) })
}

pub fn bind_int64(stmt: &RawStatement, index: usize, value: i64) -> Result<()> {
    trace!(index, value, "bind int64");
    check(unsafe { ffi::sqlite3_bind_int64(stmt.as_ptr(), param_index(index), value) })
}

pub fn bind_float(stmt: &RawStatement, index: usize, value: f64) -> Result<()> {
    trace!(index, value, "bind float");
    check(unsafe { ffi::sqlite3_bind_double(stmt.as_ptr(), param_index(index), value) })
}

pub fn bind_null(stmt: &RawStatement, index: usize) -> Result<()> {
    trace!(index, "bind null");
    check(unsafe { ffi::sqlite3_bind_null(stmt.as_ptr(), param_index(index)) })
}

/// Bind any `Value`, dispatching on its kind
pub fn bind_value(stmt: &RawStatement, index: usize, value: &Value, codec: &CodecConfig) -> Result<()> {
    match value {
        Value::Null => bind_null(stmt, index),
        Value::Integer(v) => bind_int64(stmt, index, *v),
        Value::Float(v) => bind_float(stmt, index, *v),
        Value::Text(v) => bind_text(stmt, index, v, codec.text),
        Value::Blob(v) => bind_blob(stmt, index, v),
    }
}
