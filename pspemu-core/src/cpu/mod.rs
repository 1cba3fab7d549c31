//! CPU Control Plane
//!
//! The outward contract the rest of the emulator programs against: context
//! lifecycle, interrupt routing, syscall and export registration, callback
//! marshalling and execution stepping. The execution engine itself (the
//! interpreter or JIT that actually advances a program counter) sits behind
//! the [`ExecutionEngine`] trait; this module never interprets a single
//! instruction.
//!
//! Everything here is single threaded from the guest's point of view: one
//! context is active at a time, switches only take effect between blocks,
//! and `execute_block` is not re-entrant. Marshalling a callback runs the
//! engine to completion inside the call, which is exactly why re-entering
//! from a completion handler is a bug worth asserting on.

pub mod context;
pub mod interrupts;
pub mod syscalls;

use std::collections::HashMap;

use log::{debug, info};

use crate::bios::{BiosModule, FunctionRegistry, ModuleExports};
use context::{ContextStorage, TcsId, ThreadContext};
use interrupts::InterruptController;
use syscalls::{SyscallTable, UserExports};

/// Where a marshalled callback "returns" to. Never a valid guest code
/// address; the engine runs until the program counter lands here.
pub const CALLBACK_RETURN_ADDRESS: u32 = 0xFFFF_FFF0;

/// The execution engine seam. The engine advances the given context by one
/// scheduling quantum and reports how many instructions it retired.
pub trait ExecutionEngine {
    fn execute_block(&mut self, ctx: &mut ThreadContext) -> u32;
}

/// Overall run state, driven by the debugger surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Broken,
    Stopped,
}

/// Counters the control plane keeps while stepping.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuStatistics {
    pub instructions_executed: u64,
    pub blocks_executed: u64,
}

impl CpuStatistics {
    pub fn log_summary(&self) {
        info!(
            "cpu: {} instructions over {} blocks",
            self.instructions_executed, self.blocks_executed
        );
    }
}

/// The control plane. Owns context storage, interrupt routing, the syscall
/// and export tables and the BIOS function registry; delegates actual
/// execution to `E`.
pub struct Cpu<E: ExecutionEngine> {
    engine: E,
    contexts: ContextStorage,
    interrupts: InterruptController,
    syscalls: SyscallTable,
    exports: UserExports,
    registry: FunctionRegistry,
    run_state: RunState,
    debugging: bool,
    marshalling: bool,
    stats: CpuStatistics,
    /// Engine-private per-breakpoint data for fast re-identification during
    /// execution. Keyed by breakpoint id; not part of the breakpoint's
    /// logical identity and never persisted with it.
    breakpoint_tags: HashMap<u32, u64>,
}

impl<E: ExecutionEngine> Cpu<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            contexts: ContextStorage::new(),
            interrupts: InterruptController::new(),
            syscalls: SyscallTable::new(),
            exports: UserExports::new(),
            registry: FunctionRegistry::new(),
            run_state: RunState::Running,
            debugging: false,
            marshalling: false,
            stats: CpuStatistics::default(),
            breakpoint_tags: HashMap::new(),
        }
    }

    // --- Context lifecycle -------------------------------------------------

    pub fn allocate_context_storage(&mut self, pc: u32, registers: &[u32; 32]) -> TcsId {
        self.contexts.allocate(pc, registers)
    }

    pub fn release_context_storage(&mut self, tcs_id: TcsId) {
        self.contexts.release(tcs_id);
    }

    pub fn switch_context(&mut self, tcs_id: TcsId) {
        self.contexts.switch(tcs_id);
    }

    pub fn active_context(&self) -> Option<TcsId> {
        self.contexts.active_id()
    }

    pub fn context(&self, tcs_id: TcsId) -> Option<&ThreadContext> {
        self.contexts.get(tcs_id)
    }

    pub fn context_mut(&mut self, tcs_id: TcsId) -> Option<&mut ThreadContext> {
        self.contexts.get_mut(tcs_id)
    }

    // --- Interrupts --------------------------------------------------------

    pub fn register_interrupt_handler(
        &mut self,
        interrupt: usize,
        slot: usize,
        address: u32,
        argument: u32,
    ) {
        self.interrupts.register(interrupt, slot, address, argument);
    }

    pub fn unregister_interrupt_handler(&mut self, interrupt: usize, slot: usize) {
        self.interrupts.unregister(interrupt, slot);
    }

    pub fn set_pending_interrupt(&mut self, interrupt: usize) {
        self.interrupts.set_pending(interrupt);
    }

    pub fn interrupts_mask(&self) -> u32 {
        self.interrupts.mask()
    }

    pub fn set_interrupts_mask(&mut self, mask: u32) {
        self.interrupts.set_mask(mask);
    }

    pub fn interrupts(&self) -> &InterruptController {
        &self.interrupts
    }

    pub fn interrupts_mut(&mut self) -> &mut InterruptController {
        &mut self.interrupts
    }

    // --- Syscalls and exports ----------------------------------------------

    /// Register a host module's function table.
    pub fn register_module(&mut self, module: Box<dyn BiosModule>) {
        self.registry.register_module(module);
    }

    /// Assign (or return the existing) syscall slot for a NID.
    pub fn register_syscall(&mut self, nid: u32) -> u32 {
        self.syscalls.register(nid, &self.registry)
    }

    pub fn syscall(&self, sid: u32) -> Option<&syscalls::SyscallSlot> {
        self.syscalls.get(sid)
    }

    /// Bulk-register a loaded guest module's exports.
    pub fn register_user_exports(&mut self, module: &ModuleExports) {
        self.exports.register_module(module);
    }

    /// Resolve a user export to a guest address, 0 when absent.
    pub fn lookup_user_export(&self, nid: u32) -> u32 {
        self.exports.lookup(nid)
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.registry
    }

    // --- Debugging ---------------------------------------------------------

    pub fn enable_debugging(&mut self) {
        self.debugging = true;
        info!("debugging enabled");
    }

    pub fn debugging_enabled(&self) -> bool {
        self.debugging
    }

    /// Attach engine-private data to a breakpoint id.
    pub fn set_breakpoint_tag(&mut self, breakpoint_id: u32, tag: u64) {
        self.breakpoint_tags.insert(breakpoint_id, tag);
    }

    pub fn breakpoint_tag(&self, breakpoint_id: u32) -> Option<u64> {
        self.breakpoint_tags.get(&breakpoint_id).copied()
    }

    pub fn clear_breakpoint_tag(&mut self, breakpoint_id: u32) {
        self.breakpoint_tags.remove(&breakpoint_id);
    }

    // --- Execution ---------------------------------------------------------

    /// Advance the active context by one scheduling quantum. Returns the
    /// number of instructions executed.
    pub fn execute_block(&mut self) -> u32 {
        assert!(
            !self.marshalling,
            "execute_block invoked while a callback marshal is in flight"
        );
        if self.run_state != RunState::Running {
            return 0;
        }
        let ctx = match self.contexts.active_mut() {
            Some(ctx) => ctx,
            None => {
                debug!("execute_block with no active context");
                return 0;
            }
        };
        let executed = self.engine.execute_block(ctx);
        self.stats.blocks_executed += 1;
        self.stats.instructions_executed += u64::from(executed);
        executed
    }

    /// Synchronously run guest code at `callback_address` on the named
    /// context, then invoke `on_complete` with the captured `$v0` before
    /// returning. The context's saved state is restored afterwards, so from
    /// the guest's point of view the callback happened between two
    /// instructions.
    ///
    /// A callback that never returns hangs this call; that is a guest or
    /// engine fault, and there is no timeout to paper over it.
    pub fn marshal_callback<F>(
        &mut self,
        tcs_id: TcsId,
        callback_address: u32,
        arguments: &[u32],
        on_complete: F,
        state: i32,
    ) where
        F: FnOnce(TcsId, i32, i32),
    {
        assert!(
            !self.marshalling,
            "marshal_callback re-entered while a marshal is in flight"
        );
        let ctx = match self.contexts.get_mut(tcs_id) {
            Some(ctx) => ctx,
            None => panic!("marshal_callback on unknown context {}", tcs_id),
        };
        let saved = ctx.clone();
        ctx.pc = callback_address;
        ctx.set_arguments(arguments);
        ctx.gpr[31] = CALLBACK_RETURN_ADDRESS;
        self.marshalling = true;
        debug!(
            "marshalling callback 0x{:08X} on context {}",
            callback_address, tcs_id
        );

        loop {
            let ctx = self
                .contexts
                .get_mut(tcs_id)
                .expect("context released during marshal");
            if ctx.pc == CALLBACK_RETURN_ADDRESS {
                break;
            }
            let executed = self.engine.execute_block(ctx);
            self.stats.blocks_executed += 1;
            self.stats.instructions_executed += u64::from(executed);
        }

        let ctx = self.contexts.get_mut(tcs_id).expect("context released during marshal");
        let result = ctx.return_value();
        *ctx = saved;
        // The completion handler runs while the marshal flag is still set,
        // so an execute_block from inside it trips the assertion above.
        on_complete(tcs_id, state, result);
        self.marshalling = false;
    }

    // --- Run state ---------------------------------------------------------

    pub fn resume(&mut self) {
        self.run_state = RunState::Running;
    }

    pub fn break_execution(&mut self) {
        self.run_state = RunState::Broken;
    }

    pub fn stop(&mut self) {
        self.run_state = RunState::Stopped;
        self.stats.log_summary();
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn statistics(&self) -> CpuStatistics {
        self.stats
    }
}
