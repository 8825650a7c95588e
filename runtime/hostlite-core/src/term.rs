//!
//! Terms
//!
//! A `Term` is the host's representation of one dynamically-typed value:
//! a tag byte plus a 64-bit payload. Primitive payloads are stored inline
//! (integers directly, floats as their IEEE-754 bits). String and byte
//! payloads hold an owned reference to a heap object, released together
//! with the term.
//!

use crate::value::{
    hostlite_bytes_decref, hostlite_bytes_incref, hostlite_string_decref, hostlite_string_incref,
    HostBytes, HostString,
};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermTag {
    Nil = 0,
    Int = 1,
    Float = 2,
    String = 3,
    Bytes = 4,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Term {
    pub tag: TermTag,
    pub _pad: [u8; 7],
    pub payload: u64,
}

impl Term {
    pub const NIL: Term = Term::with_payload(TermTag::Nil, 0);

    const fn with_payload(tag: TermTag, payload: u64) -> Self {
        Self { tag, _pad: [0; 7], payload }
    }

    pub const fn int(value: i64) -> Self {
        Self::with_payload(TermTag::Int, value as u64)
    }

    pub fn float(value: f64) -> Self {
        Self::with_payload(TermTag::Float, value.to_bits())
    }

    /// Takes ownership of one reference to `s`.
    pub fn string(s: *mut HostString) -> Self {
        Self::with_payload(TermTag::String, s as usize as u64)
    }

    /// Takes ownership of one reference to `b`.
    pub fn bytes(b: *mut HostBytes) -> Self {
        Self::with_payload(TermTag::Bytes, b as usize as u64)
    }

    pub fn is_nil(&self) -> bool {
        self.tag == TermTag::Nil
    }

    pub fn as_int(&self) -> Option<i64> {
        (self.tag == TermTag::Int).then_some(self.payload as i64)
    }

    pub fn as_float(&self) -> Option<f64> {
        (self.tag == TermTag::Float).then(|| f64::from_bits(self.payload))
    }

    pub fn as_string(&self) -> Option<*mut HostString> {
        (self.tag == TermTag::String).then_some(self.payload as usize as *mut HostString)
    }

    pub fn as_bytes(&self) -> Option<*mut HostBytes> {
        (self.tag == TermTag::Bytes).then_some(self.payload as usize as *mut HostBytes)
    }

    /// Add a reference to the heap payload, if any.
    ///
    /// # Safety
    /// A heap payload must still be live.
    pub unsafe fn retain(&self) {
        unsafe {
            match self.tag {
                TermTag::String => hostlite_string_incref(self.payload as usize as *mut HostString),
                TermTag::Bytes => hostlite_bytes_incref(self.payload as usize as *mut HostBytes),
                TermTag::Nil | TermTag::Int | TermTag::Float => {}
            }
        }
    }

    /// Drop the reference owned by this term.
    ///
    /// # Safety
    /// Must be called at most once per owned reference.
    pub unsafe fn release(self) {
        unsafe {
            match self.tag {
                TermTag::String => hostlite_string_decref(self.payload as usize as *mut HostString),
                TermTag::Bytes => hostlite_bytes_decref(self.payload as usize as *mut HostBytes),
                TermTag::Nil | TermTag::Int | TermTag::Float => {}
            }
        }
    }
}

/// Release a term received from the runtime
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlite_term_release(term: Term) {
    unsafe { term.release() }
}
