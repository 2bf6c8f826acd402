//! Callback symbols the native enclave library links against.
//!
//! Each takes the opaque context the host passed into `sgxcc_invoke`, a
//! pointer to the call's [`CallContext`] id, and forwards to [`Callbacks`]
//! over the process wide registry.

use std::{
    ffi::c_void,
    slice,
    sync::LazyLock,
};

use ecc_types::{CallContext, HostCalls};
use tracing::error;

use crate::{callbacks::Callbacks, registry::Registry};

static CALLBACKS: LazyLock<Callbacks> = LazyLock::new(|| Callbacks::new(Registry::global()));

/// # Safety
/// `ptr` must be null with `len == 0`, or valid for `len` bytes.
unsafe fn input<'a>(ptr: *const u8, len: u32) -> &'a [u8] {
    if ptr.is_null() || len == 0 {
        return &[];
    }
    slice::from_raw_parts(ptr, len as usize)
}

/// # Safety
/// `ptr` must be null with `len == 0`, or valid for writes of `len` bytes.
unsafe fn output<'a>(ptr: *mut u8, len: u32) -> &'a mut [u8] {
    if ptr.is_null() || len == 0 {
        return &mut [];
    }
    slice::from_raw_parts_mut(ptr, len as usize)
}

/// # Safety
/// `ctx` must be null or point at a `u64`.
unsafe fn context(ctx: *const c_void) -> CallContext {
    if ctx.is_null() {
        error!("enclave passed a null call context");
        std::process::abort();
    }
    CallContext(*ctx.cast::<u64>())
}

/// # Safety
/// `out_len` must be valid for writes.
unsafe fn out_len<'a>(out_len: *mut u32) -> &'a mut u32 {
    if out_len.is_null() {
        error!("enclave passed a null length pointer");
        std::process::abort();
    }
    &mut *out_len
}

/// # Safety
/// Called by the enclave library only, with buffers valid for their stated sizes.
#[no_mangle]
pub unsafe extern "C" fn get_creator_name(
    msp_id: *mut u8,
    max_msp_id_len: u32,
    dn: *mut u8,
    max_dn_len: u32,
    ctx: *mut c_void,
) {
    let ctx = context(ctx);
    CALLBACKS.get_creator_name(output(msp_id, max_msp_id_len), output(dn, max_dn_len), ctx);
}

/// # Safety
/// Called by the enclave library only, with buffers valid for their stated sizes.
#[no_mangle]
pub unsafe extern "C" fn get_state(
    key: *const u8,
    key_len: u32,
    val: *mut u8,
    max_val_len: u32,
    val_len: *mut u32,
    ctx: *mut c_void,
) {
    let ctx = context(ctx);
    CALLBACKS.get_state(
        input(key, key_len),
        output(val, max_val_len),
        out_len(val_len),
        ctx,
    );
}

/// # Safety
/// Called by the enclave library only, with buffers valid for their stated sizes.
#[no_mangle]
pub unsafe extern "C" fn put_state(
    key: *const u8,
    key_len: u32,
    val: *const u8,
    val_len: u32,
    ctx: *mut c_void,
) {
    let ctx = context(ctx);
    CALLBACKS.put_state(input(key, key_len), input(val, val_len), ctx);
}

/// # Safety
/// Called by the enclave library only, with buffers valid for their stated sizes.
#[no_mangle]
pub unsafe extern "C" fn get_state_by_partial_composite_key(
    comp_key: *const u8,
    comp_key_len: u32,
    values: *mut u8,
    max_values_len: u32,
    values_len: *mut u32,
    ctx: *mut c_void,
) {
    let ctx = context(ctx);
    CALLBACKS.get_state_by_partial_composite_key(
        input(comp_key, comp_key_len),
        output(values, max_values_len),
        out_len(values_len),
        ctx,
    );
}
