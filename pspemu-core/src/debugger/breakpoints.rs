//! Breakpoint Records and Registry
//!
//! The registry owns the canonical breakpoint records; it never decides when
//! one fires, that is the execution engine's job. Records are shared with
//! the hot execution path, so the fields that path reads are lock free:
//! the hit counter, the enabled flag and the mode are atomics, and the id
//! counter is an atomic allocator so ids stay process-unique without a
//! hidden global.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use crate::bios::FunctionToken;
use crate::disasm::MethodBody;

/// Memory access that triggers a memory breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryAccessType {
    Read,
    Write,
    ReadWrite,
}

/// What happens when a breakpoint is hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BreakpointMode {
    /// Count the hit and keep going.
    Silent = 0,
    /// Suspend execution.
    Break = 1,
    /// Log a message and keep going.
    Trace = 2,
}

impl BreakpointMode {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => BreakpointMode::Silent,
            2 => BreakpointMode::Trace,
            _ => BreakpointMode::Break,
        }
    }
}

/// The per-kind payload. Each kind carries exactly the fields that are
/// meaningful for it; the constructors on [`BreakpointRegistry`] are the
/// only way to build one, so an impossible combination (say, a memory
/// breakpoint with a function token) cannot be represented.
#[derive(Debug, Clone)]
pub enum BreakpointKind {
    /// Fires when the line at `address` is executed.
    CodeExecute { address: u32 },
    /// Fires when the named BIOS function is invoked.
    BiosFunction { function: FunctionToken },
    /// Fires when `address` is accessed.
    MemoryAccess {
        address: u32,
        access: MemoryAccessType,
    },
    /// Internal stepping breakpoint used by the stepping machinery.
    Stepping { address: u32 },
}

impl BreakpointKind {
    /// The target address, for the kinds that have one.
    pub fn address(&self) -> Option<u32> {
        match self {
            BreakpointKind::CodeExecute { address }
            | BreakpointKind::MemoryAccess { address, .. }
            | BreakpointKind::Stepping { address } => Some(*address),
            BreakpointKind::BiosFunction { .. } => None,
        }
    }
}

/// A breakpoint record. Identity (id and kind) is immutable; mode, enabled
/// state, hit count and the display name are the only mutable parts.
#[derive(Debug)]
pub struct Breakpoint {
    id: u32,
    kind: BreakpointKind,
    mode: AtomicU8,
    enabled: AtomicBool,
    hit_count: AtomicU64,
    name: Mutex<Option<String>>,
}

impl Breakpoint {
    fn new(id: u32, kind: BreakpointKind) -> Self {
        Self {
            id,
            kind,
            mode: AtomicU8::new(BreakpointMode::Break as u8),
            enabled: AtomicBool::new(true),
            hit_count: AtomicU64::new(0),
            name: Mutex::new(None),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn kind(&self) -> &BreakpointKind {
        &self.kind
    }

    pub fn mode(&self) -> BreakpointMode {
        BreakpointMode::from_raw(self.mode.load(Ordering::Relaxed))
    }

    pub fn set_mode(&self, mode: BreakpointMode) {
        self.mode.store(mode as u8, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn hit_count(&self) -> u64 {
        self.hit_count.load(Ordering::Relaxed)
    }

    /// Count one hit and return the new total. Lock free, safe to call from
    /// the execution hot path.
    pub fn record_hit(&self) -> u64 {
        self.hit_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn name(&self) -> Option<String> {
        self.name.lock().unwrap().clone()
    }

    pub fn set_name(&self, name: Option<String>) {
        *self.name.lock().unwrap() = name;
    }
}

/// Process-scoped id source. Ids below [`IdAllocator::FIRST_PUBLIC_ID`] are
/// reserved for internal and system breakpoints; everything handed out here
/// is strictly increasing and never reused.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU32,
}

impl IdAllocator {
    pub const FIRST_PUBLIC_ID: u32 = 100;

    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(Self::FIRST_PUBLIC_ID),
        }
    }

    pub fn allocate(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Owner of every live breakpoint record.
#[derive(Default)]
pub struct BreakpointRegistry {
    ids: IdAllocator,
    breakpoints: HashMap<u32, Arc<Breakpoint>>,
}

impl BreakpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, kind: BreakpointKind) -> Arc<Breakpoint> {
        let breakpoint = Arc::new(Breakpoint::new(self.ids.allocate(), kind));
        self.breakpoints.insert(breakpoint.id(), breakpoint.clone());
        breakpoint
    }

    pub fn add_code_execute(&mut self, address: u32) -> Arc<Breakpoint> {
        self.insert(BreakpointKind::CodeExecute { address })
    }

    pub fn add_bios_function(&mut self, function: FunctionToken) -> Arc<Breakpoint> {
        self.insert(BreakpointKind::BiosFunction { function })
    }

    pub fn add_memory_access(&mut self, address: u32, access: MemoryAccessType) -> Arc<Breakpoint> {
        self.insert(BreakpointKind::MemoryAccess { address, access })
    }

    pub fn add_stepping(&mut self, address: u32) -> Arc<Breakpoint> {
        self.insert(BreakpointKind::Stepping { address })
    }

    pub fn get(&self, id: u32) -> Option<Arc<Breakpoint>> {
        self.breakpoints.get(&id).cloned()
    }

    /// Remove and return the record. The id is dead afterwards; it will
    /// never be handed out again.
    pub fn remove(&mut self, id: u32) -> Option<Arc<Breakpoint>> {
        self.breakpoints.remove(&id)
    }

    /// The first breakpoint targeting exactly this address, if any.
    pub fn find_at_address(&self, address: u32) -> Option<Arc<Breakpoint>> {
        self.breakpoints
            .values()
            .find(|breakpoint| breakpoint.kind().address() == Some(address))
            .cloned()
    }

    /// Stamp code breakpoints onto a disassembled body so the view renders
    /// them inline with the instructions they target.
    pub fn annotate_body(&self, body: &mut MethodBody) {
        for instruction in &mut body.instructions {
            instruction.breakpoint_id = self
                .breakpoints
                .values()
                .find(|breakpoint| {
                    matches!(
                        breakpoint.kind(),
                        BreakpointKind::CodeExecute { address } if *address == instruction.address
                    ) && breakpoint.is_enabled()
                })
                .map(|breakpoint| breakpoint.id());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Breakpoint>> {
        self.breakpoints.values()
    }

    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }
}
