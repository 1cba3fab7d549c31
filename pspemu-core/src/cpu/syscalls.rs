//! Syscall and Export Tables
//!
//! Guest code reaches the BIOS through numbered syscall slots. A slot is
//! assigned per NID at registration time and the resolved function is cached
//! in it, so the dispatch path never goes back through the registry's map.
//! User exports are the other direction: guest modules exporting code to
//! other guest modules, resolved to a plain address with 0 as the
//! "not found" sentinel (0 is never a valid guest code address).

use std::collections::HashMap;

use log::{debug, warn};

use crate::bios::{FunctionRegistry, ModuleExports, RegisteredFunction};

/// One assigned syscall dispatch slot.
#[derive(Debug, Clone)]
pub struct SyscallSlot {
    pub nid: u32,
    /// The resolved function, cached at registration. `None` when the nid
    /// was unknown to every registered module; calls through such a slot
    /// degrade to the not-implemented sentinel.
    pub function: Option<RegisteredFunction>,
}

/// NID to dispatch-slot table.
#[derive(Default)]
pub struct SyscallTable {
    slots: Vec<SyscallSlot>,
    by_nid: HashMap<u32, u32>,
}

impl SyscallTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign (or return the existing) dispatch slot for `nid`.
    pub fn register(&mut self, nid: u32, registry: &FunctionRegistry) -> u32 {
        if let Some(existing) = self.by_nid.get(&nid) {
            return *existing;
        }
        let function = registry.find_function(nid).cloned();
        if function.is_none() {
            warn!("syscall nid 0x{:08X} matches no registered function", nid);
        }
        let sid = self.slots.len() as u32;
        self.slots.push(SyscallSlot { nid, function });
        self.by_nid.insert(nid, sid);
        debug!("syscall 0x{:08X} -> slot {}", nid, sid);
        sid
    }

    pub fn get(&self, sid: u32) -> Option<&SyscallSlot> {
        self.slots.get(sid as usize)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Guest-module export map: NID to guest code address.
#[derive(Default)]
pub struct UserExports {
    exports: HashMap<u32, u32>,
}

impl UserExports {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bulk-register a loaded module's exports. System exports resolve
    /// through the BIOS instead and are skipped here.
    pub fn register_module(&mut self, module: &ModuleExports) {
        for export in &module.exports {
            if export.system {
                continue;
            }
            self.exports.insert(export.nid, export.address);
        }
        debug!(
            "registered exports for {} ({} total)",
            module.name,
            self.exports.len()
        );
    }

    /// Resolve a NID to a guest address, 0 when absent. Absence is a normal
    /// outcome for partially linked guests, not an error.
    pub fn lookup(&self, nid: u32) -> u32 {
        self.exports.get(&nid).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bios::modules::SceRtc;
    use crate::bios::StubExport;

    #[test]
    fn registration_is_idempotent_per_nid() {
        let mut registry = FunctionRegistry::new();
        registry.register_module(Box::new(SceRtc));
        let mut table = SyscallTable::new();

        let a = table.register(0x3F7A_D767, &registry);
        let b = table.register(0xC41C_2853, &registry);
        let c = table.register(0x3F7A_D767, &registry);
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);

        let slot = table.get(a).unwrap();
        assert_eq!(slot.nid, 0x3F7A_D767);
        assert_eq!(
            slot.function.as_ref().unwrap().descriptor.name,
            "sceRtcGetCurrentTick"
        );
    }

    #[test]
    fn unknown_nids_still_get_a_slot() {
        let registry = FunctionRegistry::new();
        let mut table = SyscallTable::new();
        let sid = table.register(0xDEAD_BEEF, &registry);
        assert!(table.get(sid).unwrap().function.is_none());
    }

    #[test]
    fn exports_resolve_or_return_zero() {
        let mut exports = UserExports::new();
        exports.register_module(&ModuleExports {
            name: "mylib".to_owned(),
            exports: vec![
                StubExport {
                    nid: 0x1234_5678,
                    address: 0x0882_0000,
                    system: false,
                },
                StubExport {
                    nid: 0xAAAA_BBBB,
                    address: 0x0883_0000,
                    system: true,
                },
            ],
        });
        assert_eq!(exports.lookup(0x1234_5678), 0x0882_0000);
        // System exports are skipped and unknown nids miss; both read as 0.
        assert_eq!(exports.lookup(0xAAAA_BBBB), 0);
        assert_eq!(exports.lookup(0x9999_9999), 0);
    }
}
