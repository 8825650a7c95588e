//!
//! Host Lists
//!
//! A `HostList` is a reference-counted, fixed-length array of terms.
//! The list owns its elements: storing a term transfers its reference,
//! and freeing the list releases every element.
//!

use std::alloc::{alloc, dealloc, handle_alloc_error, Layout};

use crate::term::Term;
use crate::value::{HeapHeader, HeapTag};

#[repr(C)]
pub struct HostList {
    pub header: HeapHeader,
    pub len: usize,
    pub items: *mut Term,
}

impl HostList {
    pub fn as_slice(&self) -> &[Term] {
        if self.len == 0 {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.items, self.len) }
    }
}

fn items_layout(len: usize) -> Layout {
    match Layout::array::<Term>(len) {
        Ok(layout) => layout,
        Err(_) => handle_alloc_error(Layout::new::<Term>()),
    }
}

/// Create a list of `len` nil terms
#[unsafe(no_mangle)]
pub extern "C" fn hostlite_list_new(len: usize) -> *mut HostList {
    unsafe {
        let layout = Layout::new::<HostList>();
        let ptr = alloc(layout) as *mut HostList;
        if ptr.is_null() {
            handle_alloc_error(layout);
        }

        let items = if len == 0 {
            std::ptr::null_mut()
        } else {
            let items_layout = items_layout(len);
            let items = alloc(items_layout) as *mut Term;
            if items.is_null() {
                dealloc(ptr as *mut u8, layout);
                handle_alloc_error(items_layout);
            }
            for i in 0..len {
                items.add(i).write(Term::NIL);
            }
            items
        };

        std::ptr::write(
            ptr,
            HostList {
                header: HeapHeader::new(HeapTag::List),
                len,
                items,
            },
        );
        ptr
    }
}

/// Build a list from Rust-side terms, taking ownership of each
pub fn host_list(terms: Vec<Term>) -> *mut HostList {
    let list = hostlite_list_new(terms.len());
    for (i, term) in terms.into_iter().enumerate() {
        unsafe { (*list).items.add(i).write(term) };
    }
    list
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlite_list_len(list: *const HostList) -> i64 {
    if list.is_null() {
        0
    } else {
        unsafe { (*list).len as i64 }
    }
}

/// Copy the term at `index` into `out`, adding a reference for the caller.
/// Returns 1 on success, 0 when out of bounds.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlite_list_get(list: *const HostList, index: i64, out: *mut Term) -> i64 {
    if list.is_null() || out.is_null() {
        return 0;
    }
    unsafe {
        let Some(term) = usize::try_from(index).ok().and_then(|i| (*list).as_slice().get(i)) else {
            return 0;
        };
        term.retain();
        out.write(*term);
    }
    1
}

/// Store `term` at `index`, releasing the previous element.
/// Returns 1 on success, 0 when out of bounds (the term is released).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlite_list_set(list: *mut HostList, index: i64, term: Term) -> i64 {
    unsafe {
        if list.is_null() {
            term.release();
            return 0;
        }
        match usize::try_from(index) {
            Ok(i) if i < (*list).len => {
                let slot = (*list).items.add(i);
                slot.read().release();
                slot.write(term);
                1
            }
            _ => {
                term.release();
                0
            }
        }
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlite_list_incref(list: *mut HostList) {
    if !list.is_null() {
        unsafe { (*list).header.incref(); }
    }
}

/// Decrement reference count; frees the list and its elements at zero
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlite_list_decref(list: *mut HostList) {
    if list.is_null() {
        return;
    }
    unsafe {
        if (*list).header.decref() {
            let len = (*list).len;
            if len > 0 {
                for term in (*list).as_slice() {
                    term.release();
                }
                dealloc((*list).items as *mut u8, items_layout(len));
            }
            dealloc(list as *mut u8, Layout::new::<HostList>());
        }
    }
}
