// This module is the host callback bridge: the sole seam where generated native code
// and host-side Rust logic interleave. Callbacks are registered in a HookTable slot
// vector at emission time; generated code marshals its arguments into a pair of small
// stack buffers (a tag byte and a 64-bit word per argument) and calls one extern "C"
// trampoline with the table pointer, the slot index and the buffers. The trampoline
// decodes the arguments into HostValue, invokes the registered closure, and reports
// failure by recording a Fault in the table and returning nonzero, at which point the
// generated code takes the abort path to the recovery context. The table is shared by
// the emitter and the compiled program behind an Rc so the raw pointer baked into the
// generated code stays valid for as long as the code can run.

//! Bridge between generated native code and host-side callbacks.

use std::cell::RefCell;

use crate::error::Fault;

/// Marshalled argument tags understood by the trampoline.
pub(crate) const TAG_INT: u8 = 0;
pub(crate) const TAG_REAL: u8 = 1;

/// A native value converted to its host representation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostValue {
    Int(i64),
    Real(f64),
}

impl std::fmt::Display for HostValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostValue::Int(v) => write!(f, "{v}"),
            HostValue::Real(v) => write!(f, "{v}"),
        }
    }
}

/// A registered host callback.
pub type HostHook = Box<dyn FnMut(&[HostValue]) -> Result<(), Fault>>;

/// Slot table of host callbacks plus the fault cell for the in-flight run.
///
/// Single-writer: emission registers hooks, execution invokes them; the two
/// phases never overlap.
#[derive(Default)]
pub struct HookTable {
    hooks: RefCell<Vec<HostHook>>,
    fault: RefCell<Option<Fault>>,
}

impl HookTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback, returning its slot index.
    pub fn register(&self, hook: HostHook) -> usize {
        let mut hooks = self.hooks.borrow_mut();
        hooks.push(hook);
        hooks.len() - 1
    }

    /// Record the fault that aborted the in-flight execution.
    pub fn record_fault(&self, fault: Fault) {
        log::debug!("fault recorded: {}", fault.message);
        *self.fault.borrow_mut() = Some(fault);
    }

    /// Take the recorded fault, if any.
    pub fn take_fault(&self) -> Option<Fault> {
        self.fault.borrow_mut().take()
    }

    fn invoke(&self, slot: usize, arguments: &[HostValue]) -> Result<(), Fault> {
        let mut hooks = self.hooks.borrow_mut();
        let hook = hooks
            .get_mut(slot)
            .unwrap_or_else(|| panic!("generated code referenced unknown hook slot {slot}"));
        hook(arguments)
    }
}

/// Entry point called from generated code.
///
/// `tags` and `words` each hold `argc` entries; tag 0 marks a sign-extended
/// integer, tag 1 an f64 bit pattern. Returns nonzero when the callback
/// failed, in which case a fault has been recorded and the caller must jump
/// to the recovery context.
///
/// # Safety
/// `table` must point to the `HookTable` whose address was baked into the
/// module, and the buffers must hold `argc` initialized entries.
pub(crate) unsafe extern "C" fn hook_trampoline(
    table: *const HookTable,
    slot: u64,
    argc: u64,
    tags: *const u8,
    words: *const u64,
) -> i32 {
    let table = &*table;
    let mut arguments = Vec::with_capacity(argc as usize);

    for i in 0..argc as usize {
        let word = *words.add(i);
        let value = match *tags.add(i) {
            TAG_REAL => HostValue::Real(f64::from_bits(word)),
            _ => HostValue::Int(word as i64),
        };
        arguments.push(value);
    }

    match table.invoke(slot as usize, &arguments) {
        Ok(()) => 0,
        Err(fault) => {
            table.record_fault(fault);
            1
        }
    }
}

/// Substitute `{}` placeholders in `template` with the given values, in order.
pub(crate) fn format_message(template: &str, arguments: &[HostValue]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut next = 0;

    while let Some(at) = rest.find("{}") {
        out.push_str(&rest[..at]);
        match arguments.get(next) {
            Some(value) => out.push_str(&value.to_string()),
            None => out.push_str("{}"),
        }
        next += 1;
        rest = &rest[at + 2..];
    }
    out.push_str(rest);
    out
}
