//! Debugging: the symbol database and the breakpoint registry.

pub mod breakpoints;
pub mod symbols;

pub use breakpoints::{
    Breakpoint, BreakpointKind, BreakpointMode, BreakpointRegistry, IdAllocator, MemoryAccessType,
};
pub use symbols::{Method, Symbol, SymbolDatabase, SymbolUpdate, Variable};
