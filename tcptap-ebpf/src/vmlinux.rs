//! Minimal kernel type bindings
//!
//! Generated with `aya-tool generate task_struct` against a 6.x x86_64
//! kernel and trimmed by hand to the fields the probes dereference.
//! Offsets are kernel-build specific; regenerate this file when
//! targeting a kernel with a different task_struct layout.

#![allow(non_camel_case_types)]

pub type pid_t = i32;

#[repr(C)]
#[derive(Copy, Clone)]
pub struct task_struct {
    pub _bindgen_padding_0: [u8; 2464],
    pub pid: pid_t,
    pub tgid: pid_t,
    pub _bindgen_padding_1: [u8; 8],
    pub real_parent: *mut task_struct,
}
