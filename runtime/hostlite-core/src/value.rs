//!
//! Host Heap Values
//!
//! Values handed to the host are either inline primitives (see `term`) or
//! pointers to reference-counted heap objects laid out with `#[repr(C)]`:
//!
//! - `HostString` - length-prefixed text, UTF-8 encoded
//! - `HostBytes`  - length-prefixed raw bytes
//! - `HostList`   - fixed-length sequence of terms (see `list`)
//!
//! Every constructor copies its input. A heap object never aliases memory
//! owned by the caller or by the database engine.
//!

use std::alloc::{alloc, dealloc, handle_alloc_error, Layout};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Type tags for heap objects
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapTag {
    String = 0,
    Bytes = 1,
    List = 2,
}

/// Header for all heap-allocated objects
#[repr(C)]
pub struct HeapHeader {
    pub refcount: AtomicUsize,
    pub tag: HeapTag,
    pub _pad: [u8; 7],
}

impl HeapHeader {
    pub fn new(tag: HeapTag) -> Self {
        Self {
            refcount: AtomicUsize::new(1),
            tag,
            _pad: [0; 7],
        }
    }

    pub fn incref(&self) {
        self.refcount.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns true when the last reference was dropped.
    pub fn decref(&self) -> bool {
        if self.refcount.fetch_sub(1, Ordering::Release) == 1 {
            std::sync::atomic::fence(Ordering::Acquire);
            true
        } else {
            false
        }
    }

    pub fn refcount(&self) -> usize {
        self.refcount.load(Ordering::Relaxed)
    }
}

/// A heap-allocated string
#[repr(C)]
pub struct HostString {
    pub header: HeapHeader,
    pub len: usize,
    pub data: [u8; 0],
}

impl HostString {
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.data.as_ptr(), self.len) }
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(self.as_bytes()).into_owned()
    }
}

/// A heap-allocated byte buffer
#[repr(C)]
pub struct HostBytes {
    pub header: HeapHeader,
    pub len: usize,
    pub data: [u8; 0],
}

impl HostBytes {
    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.data.as_ptr(), self.len) }
    }
}

pub(crate) fn trailing_layout<T>(len: usize) -> Layout {
    let size = std::mem::size_of::<T>().saturating_add(len);
    match Layout::from_size_align(size, std::mem::align_of::<T>()) {
        Ok(layout) => layout,
        Err(_) => handle_alloc_error(Layout::new::<T>()),
    }
}

unsafe fn alloc_with_payload<T>(
    tag: HeapTag,
    data: *const u8,
    len: usize,
    init: impl FnOnce(*mut T, HeapHeader) -> *mut u8,
) -> *mut T {
    let layout = trailing_layout::<T>(len);
    unsafe {
        let ptr = alloc(layout) as *mut T;
        if ptr.is_null() {
            handle_alloc_error(layout);
        }
        let payload = init(ptr, HeapHeader::new(tag));
        if !data.is_null() && len > 0 {
            std::ptr::copy_nonoverlapping(data, payload, len);
        }
        ptr
    }
}

/// Allocate a new string, copying `len` bytes from `data`
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlite_string_new(data: *const u8, len: usize) -> *mut HostString {
    unsafe {
        alloc_with_payload::<HostString>(HeapTag::String, data, len, |ptr, header| {
            std::ptr::write(&raw mut (*ptr).header, header);
            (*ptr).len = len;
            (*ptr).data.as_mut_ptr()
        })
    }
}

/// Increment reference count of a string
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlite_string_incref(s: *mut HostString) {
    if !s.is_null() {
        unsafe { (*s).header.incref(); }
    }
}

/// Decrement reference count and free if zero
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlite_string_decref(s: *mut HostString) {
    if !s.is_null() {
        unsafe {
            if (*s).header.decref() {
                let layout = trailing_layout::<HostString>((*s).len);
                dealloc(s as *mut u8, layout);
            }
        }
    }
}

/// Get string length in bytes
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlite_string_len(s: *const HostString) -> i64 {
    if s.is_null() {
        0
    } else {
        unsafe { (*s).len as i64 }
    }
}

/// Get pointer to string data
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlite_string_data(s: *const HostString) -> *const u8 {
    if s.is_null() {
        std::ptr::null()
    } else {
        unsafe { (*s).data.as_ptr() }
    }
}

/// Allocate a new byte buffer, copying `len` bytes from `data`
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlite_bytes_new(data: *const u8, len: usize) -> *mut HostBytes {
    unsafe {
        alloc_with_payload::<HostBytes>(HeapTag::Bytes, data, len, |ptr, header| {
            std::ptr::write(&raw mut (*ptr).header, header);
            (*ptr).len = len;
            (*ptr).data.as_mut_ptr()
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlite_bytes_incref(b: *mut HostBytes) {
    if !b.is_null() {
        unsafe { (*b).header.incref(); }
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlite_bytes_decref(b: *mut HostBytes) {
    if !b.is_null() {
        unsafe {
            if (*b).header.decref() {
                let layout = trailing_layout::<HostBytes>((*b).len);
                dealloc(b as *mut u8, layout);
            }
        }
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlite_bytes_len(b: *const HostBytes) -> i64 {
    if b.is_null() {
        0
    } else {
        unsafe { (*b).len as i64 }
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlite_bytes_data(b: *const HostBytes) -> *const u8 {
    if b.is_null() {
        std::ptr::null()
    } else {
        unsafe { (*b).data.as_ptr() }
    }
}

/// Allocate a host string from Rust text
pub fn host_string(s: &str) -> *mut HostString {
    unsafe { hostlite_string_new(s.as_ptr(), s.len()) }
}

/// Allocate host bytes from a Rust slice
pub fn host_bytes(b: &[u8]) -> *mut HostBytes {
    unsafe { hostlite_bytes_new(b.as_ptr(), b.len()) }
}

/// Copy the contents of a host string, treating null as empty.
///
/// # Safety
/// `s` must be null or point to a live `HostString`.
pub unsafe fn string_from_host(s: *const HostString) -> String {
    if s.is_null() {
        return String::new();
    }
    unsafe { (*s).to_string_lossy() }
}

/// Borrow the contents of host bytes, treating null as empty.
///
/// # Safety
/// `b` must be null or point to a live `HostBytes` that outlives the borrow.
pub unsafe fn bytes_from_host<'a>(b: *const HostBytes) -> &'a [u8] {
    if b.is_null() {
        return &[];
    }
    unsafe { (*b).as_slice() }
}
