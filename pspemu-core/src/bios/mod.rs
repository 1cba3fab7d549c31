//! BIOS Function Registration and Dispatch
//!
//! Every host-implemented system module exposes a fixed descriptor table:
//! one row per guest-callable function, keyed by the 32-bit NID the guest
//! SDK derives from the export name. Registration is unconditional. A
//! function that is not implemented yet still gets registered so guest
//! import resolution succeeds, and calling it returns the well-known
//! not-implemented sentinel instead of taking the guest down. That is what
//! keeps partially covered games limping along instead of crashing.

pub mod modules;

use std::collections::HashMap;

use log::{debug, warn};

use crate::cpu::context::ThreadContext;

/// Returned in `$v0` by any function the BIOS does not implement. Guests
/// read it as a generic failure code; callers host-side must treat it as
/// "unsupported", never as a domain result.
pub const NOT_IMPLEMENTED_RETURN: i32 = -1;

/// One row of a module's export table.
#[derive(Debug, Clone, Copy)]
pub struct FunctionDescriptor {
    /// Stable 32-bit identifier matching the guest SDK's export hashing.
    pub nid: u32,
    /// Display name, for logs and the debugger only. Dispatch never goes
    /// through names.
    pub name: &'static str,
    pub implemented: bool,
    /// Implemented without touching per-call module state.
    pub stateless: bool,
}

impl FunctionDescriptor {
    /// A registered-but-unimplemented stub row.
    pub const fn stub(nid: u32, name: &'static str) -> Self {
        Self {
            nid,
            name,
            implemented: false,
            stateless: true,
        }
    }

    pub const fn implemented(nid: u32, name: &'static str, stateless: bool) -> Self {
        Self {
            nid,
            name,
            implemented: true,
            stateless,
        }
    }
}

/// Identifies a registered function for the debugger (BIOS function
/// breakpoints hold one of these).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionToken {
    pub module: &'static str,
    pub nid: u32,
}

/// A host-implemented system module.
///
/// The default `call` covers pure stub tables; modules with real
/// implementations override it and dispatch on the nid.
pub trait BiosModule {
    fn name(&self) -> &'static str;

    /// The module's fixed export table.
    fn functions(&self) -> &'static [FunctionDescriptor];

    /// Module lifecycle, invoked around a game run.
    fn start(&mut self) {}
    fn stop(&mut self) {}

    /// Invoke a function by nid. The return value lands in the guest's
    /// `$v0` by the dispatching engine.
    fn call(&mut self, nid: u32, ctx: &mut ThreadContext) -> i32 {
        let _ = (nid, ctx);
        NOT_IMPLEMENTED_RETURN
    }
}

/// A function known to the registry, with its cached descriptor.
#[derive(Debug, Clone)]
pub struct RegisteredFunction {
    pub token: FunctionToken,
    pub descriptor: FunctionDescriptor,
    /// Slot of the owning module inside the registry.
    module: usize,
}

/// One export of a loaded guest module, as handed over by the loader.
#[derive(Debug, Clone, Copy)]
pub struct StubExport {
    pub nid: u32,
    pub address: u32,
    /// System exports resolve through the BIOS, not through user code.
    pub system: bool,
}

/// A loaded guest module's export table.
#[derive(Debug, Clone)]
pub struct ModuleExports {
    pub name: String,
    pub exports: Vec<StubExport>,
}

/// The merged function table across every registered module. NIDs are the
/// sole dispatch key; there is no name-based path.
#[derive(Default)]
pub struct FunctionRegistry {
    modules: Vec<Box<dyn BiosModule>>,
    by_nid: HashMap<u32, RegisteredFunction>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module and every row of its table, implemented or not.
    pub fn register_module(&mut self, module: Box<dyn BiosModule>) {
        let slot = self.modules.len();
        let name = module.name();
        for descriptor in module.functions() {
            let registered = RegisteredFunction {
                token: FunctionToken {
                    module: name,
                    nid: descriptor.nid,
                },
                descriptor: *descriptor,
                module: slot,
            };
            if let Some(previous) = self.by_nid.insert(descriptor.nid, registered) {
                warn!(
                    "nid 0x{:08X} re-registered by {}::{} (was {}::{})",
                    descriptor.nid, name, descriptor.name, previous.token.module, previous.descriptor.name
                );
            }
        }
        debug!(
            "registered module {} ({} functions)",
            name,
            module.functions().len()
        );
        self.modules.push(module);
    }

    pub fn find_function(&self, nid: u32) -> Option<&RegisteredFunction> {
        self.by_nid.get(&nid)
    }

    /// Dispatch a call by nid. Unknown or unimplemented functions degrade to
    /// the sentinel; the guest keeps running either way.
    pub fn invoke(&mut self, nid: u32, ctx: &mut ThreadContext) -> i32 {
        match self.by_nid.get(&nid) {
            None => {
                warn!("call to unregistered nid 0x{:08X}", nid);
                NOT_IMPLEMENTED_RETURN
            }
            Some(function) if !function.descriptor.implemented => {
                debug!(
                    "{}::{} not implemented",
                    function.token.module, function.descriptor.name
                );
                NOT_IMPLEMENTED_RETURN
            }
            Some(function) => {
                let slot = function.module;
                self.modules[slot].call(nid, ctx)
            }
        }
    }

    pub fn start_all(&mut self) {
        for module in &mut self.modules {
            module.start();
        }
    }

    pub fn stop_all(&mut self) {
        for module in &mut self.modules {
            module.stop();
        }
    }

    /// Every registered function, in no particular order.
    pub fn functions(&self) -> impl Iterator<Item = &RegisteredFunction> {
        self.by_nid.values()
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestModule;

    static TEST_FUNCTIONS: [FunctionDescriptor; 2] = [
        FunctionDescriptor::implemented(0x1111_1111, "testEcho", true),
        FunctionDescriptor::stub(0x2222_2222, "testMissing"),
    ];

    impl BiosModule for TestModule {
        fn name(&self) -> &'static str {
            "sceTest"
        }

        fn functions(&self) -> &'static [FunctionDescriptor] {
            &TEST_FUNCTIONS
        }

        fn call(&mut self, nid: u32, ctx: &mut ThreadContext) -> i32 {
            match nid {
                // Echo $a0 back.
                0x1111_1111 => ctx.gpr[4] as i32,
                _ => NOT_IMPLEMENTED_RETURN,
            }
        }
    }

    #[test]
    fn unimplemented_functions_still_resolve() {
        let mut registry = FunctionRegistry::new();
        registry.register_module(Box::new(TestModule));
        let function = registry.find_function(0x2222_2222).unwrap();
        assert!(!function.descriptor.implemented);
        assert_eq!(function.token.module, "sceTest");
    }

    #[test]
    fn invoke_dispatches_or_degrades() {
        let mut registry = FunctionRegistry::new();
        registry.register_module(Box::new(TestModule));
        let mut ctx = ThreadContext::default();
        ctx.gpr[4] = 42;

        assert_eq!(registry.invoke(0x1111_1111, &mut ctx), 42);
        assert_eq!(registry.invoke(0x2222_2222, &mut ctx), NOT_IMPLEMENTED_RETURN);
        // Completely unknown nids degrade the same way instead of failing.
        assert_eq!(registry.invoke(0xDEAD_BEEF, &mut ctx), NOT_IMPLEMENTED_RETURN);
    }
}
