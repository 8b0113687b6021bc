//! The stack machine runtime, implemented in Rust!
//!
//! Everything here is exported with the exact symbol names and `repr(C)`
//! layouts declared in `runtime/support.h`, so the C unit the compiler
//! emits links straight against `liblolc.a`. The machine is one process-wide
//! VM: an accumulator `top`, a spill `stack`, a `binds` array for lexical
//! locals, and a singly linked chain of heap cells for captured bindings.
//! The generated code assumes those symbols are process globals; keep them
//! that way or regenerate the emitter templates.
//!
//! Values are tagged by a pointer to a `ManagedType` descriptor pairing a
//! kind name with an invoke function. Calling a value just tail-calls its
//! descriptor function: lambdas run their body, numbers and strings abort.
//!
//! Errors funnel through `fatalError`. Test builds only record the message
//! in `crash_message` and return, so the unit tests below can observe every
//! failure mode in-process.

use std::ffi::{c_char, CStr, CString};
use std::io::{self, Write};
use std::ptr;

/// A kind name plus the function `supCall` dispatches to.
#[repr(C)]
pub struct ManagedType {
    pub name: *const c_char,
    pub func: extern "C" fn(),
}

// Descriptors hold raw pointers to static C strings only.
unsafe impl Sync for ManagedType {}

#[repr(C)]
#[derive(Clone, Copy)]
pub union ManagedValue {
    pub number: i64,
    pub string: *const c_char,
    pub context: *mut HeapVariable,
}

/// A tagged value: descriptor pointer plus payload.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ManagedVariable {
    pub type_: *const ManagedType,
    pub v: ManagedValue,
}

/// One cell of the closure chain.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct HeapVariable {
    pub previous: *mut HeapVariable,
    pub v: ManagedVariable,
}

const UNBOUND: ManagedVariable =
    ManagedVariable { type_: ptr::null(), v: ManagedValue { number: 0 } };

#[no_mangle]
pub static mut top: ManagedVariable =
    ManagedVariable { type_: &type_number, v: ManagedValue { number: 0 } };

#[no_mangle]
pub static mut stack: [ManagedVariable; 1024] = [UNBOUND; 1024];

#[no_mangle]
pub static mut stack_index: u32 = 0;

#[no_mangle]
pub static mut binds: [ManagedVariable; 1024] = [UNBOUND; 1024];

#[no_mangle]
pub static mut binds_index: u32 = 0;

#[no_mangle]
pub static mut context_stack: *mut HeapVariable = ptr::null_mut();

#[no_mangle]
pub static mut crash_message: *const c_char = ptr::null();

#[no_mangle]
pub static mut program_args: *mut *mut c_char = ptr::null_mut();

#[no_mangle]
pub static mut program_args_count: i64 = 0;

/// The trivial heap. Cells leak; a copying collector can take over this
/// seam without touching any caller.
fn gc_alloc(cell: HeapVariable) -> *mut HeapVariable {
    Box::into_raw(Box::new(cell))
}

#[no_mangle]
pub extern "C" fn fatalError(message: *const c_char) {
    unsafe {
        crash_message = message;
    }
    #[cfg(not(test))]
    {
        let text = unsafe { CStr::from_ptr(message) }.to_string_lossy();
        eprintln!("error: {}", text);
        std::process::exit(1);
    }
}

#[no_mangle]
pub extern "C" fn supStackDup() {
    unsafe {
        stack[stack_index as usize] = top;
        stack_index += 1;
    }
}

#[no_mangle]
pub extern "C" fn supStackDrop() {
    unsafe {
        stack_index -= 1;
        top = stack[stack_index as usize];
    }
}

#[no_mangle]
pub extern "C" fn supPushNumber(n: i64) {
    supStackDup();
    unsafe {
        top.type_ = &type_number;
        top.v.number = n;
    }
}

#[no_mangle]
pub extern "C" fn supPushString(s: *const c_char) {
    supStackDup();
    unsafe {
        top.type_ = &type_string;
        top.v.string = s;
    }
}

/// Push a callable value. The current closure chain is captured into the
/// value; invoking it later restores the chain from there.
#[no_mangle]
pub extern "C" fn supPushLambda(lambda_type: *const ManagedType) {
    supStackDup();
    unsafe {
        top.type_ = lambda_type;
        top.v.context = context_stack;
    }
}

/// Move the accumulator into the next bind slot and restore the previous
/// accumulator from the stack. Slot 1 is the bottom; index 0 is never used.
#[no_mangle]
pub extern "C" fn supBind() {
    unsafe {
        binds_index += 1;
        binds[binds_index as usize] = top;
    }
    supStackDrop();
}

#[no_mangle]
pub extern "C" fn supGet(n: u32) {
    supStackDup();
    unsafe {
        top = binds[(binds_index - n) as usize];
    }
}

#[no_mangle]
pub extern "C" fn supSet(n: u32) {
    unsafe {
        binds[(binds_index - n) as usize] = top;
    }
    supStackDrop();
}

/// As `supBind`, but the binding goes into a fresh heap cell prepended to
/// the closure chain.
#[no_mangle]
pub extern "C" fn supBindCaptured() {
    unsafe {
        context_stack = gc_alloc(HeapVariable { previous: context_stack, v: top });
    }
    supStackDrop();
}

#[no_mangle]
pub extern "C" fn supGetCaptured(n: u32) {
    supStackDup();
    unsafe {
        let mut context = context_stack;
        for _ in 0..n {
            context = (*context).previous;
        }
        top = (*context).v;
    }
}

#[no_mangle]
pub extern "C" fn supSetCaptured(n: u32) {
    unsafe {
        let mut context = context_stack;
        for _ in 0..n {
            context = (*context).previous;
        }
        (*context).v = top;
    }
    supStackDrop();
}

/// Invoke the accumulator through its descriptor.
#[no_mangle]
pub extern "C" fn supCall() {
    unsafe { ((*top.type_).func)() }
}

extern "C" fn call_number_error() {
    fatalError(c"attempted to invoke a number".as_ptr());
}

extern "C" fn call_string_error() {
    fatalError(c"attempted to invoke a string".as_ptr());
}

#[no_mangle]
pub static type_number: ManagedType =
    ManagedType { name: c"number".as_ptr(), func: call_number_error };

#[no_mangle]
pub static type_string: ManagedType =
    ManagedType { name: c"string".as_ptr(), func: call_string_error };

// Built-ins read their operands off the top of `stack` (the call site has
// spilled them there) and leave the result in `top`. The last argument is
// popped first.

fn pop() -> ManagedVariable {
    unsafe {
        stack_index -= 1;
        stack[stack_index as usize]
    }
}

fn result_number(n: i64) {
    unsafe {
        top.type_ = &type_number;
        top.v.number = n;
    }
}

fn result_string(s: *const c_char) {
    unsafe {
        top.type_ = &type_string;
        top.v.string = s;
    }
}

extern "C" fn builtin_add() {
    let b = unsafe { pop().v.number };
    let a = unsafe { pop().v.number };
    result_number(a.wrapping_add(b));
}

extern "C" fn builtin_subtract() {
    let b = unsafe { pop().v.number };
    let a = unsafe { pop().v.number };
    result_number(a.wrapping_sub(b));
}

extern "C" fn builtin_equals() {
    let b = unsafe { pop().v.number };
    let a = unsafe { pop().v.number };
    result_number((a == b) as i64);
}

extern "C" fn builtin_less_than() {
    let b = unsafe { pop().v.number };
    let a = unsafe { pop().v.number };
    result_number((a < b) as i64);
}

extern "C" fn builtin_bitwise_or() {
    let b = unsafe { pop().v.number };
    let a = unsafe { pop().v.number };
    result_number(a | b);
}

extern "C" fn builtin_bitwise_and() {
    let b = unsafe { pop().v.number };
    let a = unsafe { pop().v.number };
    result_number(a & b);
}

extern "C" fn builtin_program_argument() {
    let i = unsafe { pop().v.number };
    unsafe {
        if i < 0 || i >= program_args_count {
            fatalError(c"program argument out of range".as_ptr());
            return;
        }
        result_string(*program_args.add(i as usize));
    }
}

/// C atoi: optional leading whitespace and sign, then a digit prefix.
/// Anything else is 0.
fn atoi(bytes: &[u8]) -> i64 {
    let mut i = 0;
    // the full isspace set, like the libc skip loop
    while i < bytes.len() && matches!(bytes[i], b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c) {
        i += 1;
    }
    let negative = i < bytes.len() && bytes[i] == b'-';
    if negative || (i < bytes.len() && bytes[i] == b'+') {
        i += 1;
    }
    let mut n: i64 = 0;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        n = n.wrapping_mul(10).wrapping_add(i64::from(bytes[i] - b'0'));
        i += 1;
    }
    if negative {
        n.wrapping_neg()
    } else {
        n
    }
}

extern "C" fn builtin_string_to_number() {
    let val = pop();
    if !ptr::eq(val.type_, &type_string) {
        fatalError(c"str-to-num needs a string".as_ptr());
        return;
    }
    let text = unsafe { CStr::from_ptr(val.v.string) };
    result_number(atoi(text.to_bytes()));
}

extern "C" fn builtin_number_to_string() {
    let n = unsafe { pop().v.number };
    // leaked just like every closure cell
    let text = CString::new(n.to_string()).unwrap();
    result_string(text.into_raw());
}

extern "C" fn builtin_put_string() {
    let val = pop();
    let text = unsafe { CStr::from_ptr(val.v.string) };
    let out = io::stdout();
    let mut out = out.lock();
    out.write_all(text.to_bytes()).unwrap();
    out.write_all(b"\n").unwrap();
    // the process exits through C, which would drop whatever sits in the
    // Rust-side buffer
    out.flush().unwrap();
    result_number(0);
}

#[no_mangle]
pub static sup_builtin_add: ManagedType =
    ManagedType { name: c"add".as_ptr(), func: builtin_add };

#[no_mangle]
pub static sup_builtin_subtract: ManagedType =
    ManagedType { name: c"subtract".as_ptr(), func: builtin_subtract };

#[no_mangle]
pub static sup_builtin_equals: ManagedType =
    ManagedType { name: c"equals".as_ptr(), func: builtin_equals };

#[no_mangle]
pub static sup_builtin_less_than: ManagedType =
    ManagedType { name: c"less_than".as_ptr(), func: builtin_less_than };

#[no_mangle]
pub static sup_builtin_bitwise_or: ManagedType =
    ManagedType { name: c"bitwise_or".as_ptr(), func: builtin_bitwise_or };

#[no_mangle]
pub static sup_builtin_bitwise_and: ManagedType =
    ManagedType { name: c"bitwise_and".as_ptr(), func: builtin_bitwise_and };

#[no_mangle]
pub static sup_builtin_program_argument: ManagedType =
    ManagedType { name: c"program_argument".as_ptr(), func: builtin_program_argument };

#[no_mangle]
pub static sup_builtin_string_to_number: ManagedType =
    ManagedType { name: c"string_to_number".as_ptr(), func: builtin_string_to_number };

#[no_mangle]
pub static sup_builtin_number_to_string: ManagedType =
    ManagedType { name: c"number_to_string".as_ptr(), func: builtin_number_to_string };

#[no_mangle]
pub static sup_builtin_put_string: ManagedType =
    ManagedType { name: c"put_string".as_ptr(), func: builtin_put_string };
