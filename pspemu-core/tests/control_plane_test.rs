// Integration tests for the CPU control plane
#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use pspemu_core::bios::modules::SceRtc;
    use pspemu_core::bios::{ModuleExports, StubExport};
    use pspemu_core::cpu::context::ThreadContext;
    use pspemu_core::cpu::{Cpu, ExecutionEngine, RunState, CALLBACK_RETURN_ADDRESS};

    /// An engine stand-in that models a callback returning immediately: one
    /// block computes `$v0` from `$a0` and jumps back through `$ra`.
    struct ReturningEngine;

    impl ExecutionEngine for ReturningEngine {
        fn execute_block(&mut self, ctx: &mut ThreadContext) -> u32 {
            ctx.gpr[2] = ctx.gpr[4].wrapping_add(1);
            ctx.pc = ctx.gpr[31];
            4
        }
    }

    fn cpu() -> Cpu<ReturningEngine> {
        Cpu::new(ReturningEngine)
    }

    #[test]
    fn test_context_lifecycle() {
        let mut cpu = cpu();
        let mut registers = [0u32; 32];
        registers[29] = 0x09F0_0000;
        let a = cpu.allocate_context_storage(0x0880_0000, &registers);
        let b = cpu.allocate_context_storage(0x0880_2000, &[0; 32]);

        cpu.switch_context(b);
        assert_eq!(cpu.active_context(), Some(b));
        cpu.switch_context(a);
        assert_eq!(cpu.context(a).unwrap().gpr[29], 0x09F0_0000);

        cpu.release_context_storage(b);
        assert!(cpu.context(b).is_none());
        assert_eq!(cpu.active_context(), Some(a));
    }

    #[test]
    fn test_execute_block_requires_active_context() {
        let mut cpu = cpu();
        assert_eq!(cpu.execute_block(), 0);

        let id = cpu.allocate_context_storage(0x0880_0000, &[0; 32]);
        cpu.switch_context(id);
        assert_eq!(cpu.execute_block(), 4);
        assert_eq!(cpu.statistics().blocks_executed, 1);
        assert_eq!(cpu.statistics().instructions_executed, 4);
    }

    #[test]
    fn test_run_state_gates_stepping() {
        let mut cpu = cpu();
        let id = cpu.allocate_context_storage(0x0880_0000, &[0; 32]);
        cpu.switch_context(id);

        cpu.break_execution();
        assert_eq!(cpu.run_state(), RunState::Broken);
        assert_eq!(cpu.execute_block(), 0);

        cpu.resume();
        assert_eq!(cpu.execute_block(), 4);

        cpu.stop();
        assert_eq!(cpu.execute_block(), 0);
    }

    #[test]
    fn test_marshal_callback_completes_synchronously() {
        let mut cpu = cpu();
        let id = cpu.allocate_context_storage(0x0880_0000, &[7; 32]);
        let before = cpu.context(id).unwrap().clone();

        let completions: Rc<RefCell<Vec<(i32, i32, i32)>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = completions.clone();
        cpu.marshal_callback(
            id,
            0x0881_0000,
            &[41],
            move |tcs_id, state, result| {
                sink.borrow_mut().push((tcs_id, state, result));
            },
            1234,
        );

        // Exactly one completion, before marshal_callback returned.
        assert_eq!(completions.borrow().len(), 1);
        let (tcs_id, state, result) = completions.borrow()[0];
        assert_eq!(tcs_id, id);
        assert_eq!(state, 1234);
        // The engine computed $a0 + 1.
        assert_eq!(result, 42);

        // The context is back to its pre-marshal state.
        assert_eq!(cpu.context(id).unwrap(), &before);
        assert_ne!(before.pc, CALLBACK_RETURN_ADDRESS);
    }

    #[test]
    fn test_interrupt_handler_table() {
        let mut cpu = cpu();
        cpu.register_interrupt_handler(30, 0, 0x0880_0500, 0x1000);
        // Registering into the occupied slot replaces the handler.
        cpu.register_interrupt_handler(30, 0, 0x0880_0600, 0x2000);
        assert_eq!(
            cpu.interrupts().handler(30, 0).unwrap().address,
            0x0880_0600
        );

        cpu.set_pending_interrupt(30);
        assert!(cpu.interrupts().is_pending(30));

        cpu.unregister_interrupt_handler(30, 0);
        assert!(cpu.interrupts().handler(30, 0).is_none());

        cpu.set_interrupts_mask(0xFFFF_FFFF);
        assert_eq!(cpu.interrupts_mask(), 0xFFFF_FFFF);
    }

    #[test]
    fn test_syscall_registration_is_stable() {
        let mut cpu = cpu();
        cpu.register_module(Box::new(SceRtc));

        let a = cpu.register_syscall(0x3F7A_D767);
        let b = cpu.register_syscall(0x3F7A_D767);
        assert_eq!(a, b);

        let slot = cpu.syscall(a).unwrap();
        assert_eq!(slot.nid, 0x3F7A_D767);
        assert!(slot.function.is_some());
    }

    #[test]
    fn test_user_export_lookup_misses_as_zero() {
        let mut cpu = cpu();
        assert_eq!(cpu.lookup_user_export(0x1234_5678), 0);

        cpu.register_user_exports(&ModuleExports {
            name: "game_lib".to_owned(),
            exports: vec![StubExport {
                nid: 0x1234_5678,
                address: 0x0884_0000,
                system: false,
            }],
        });
        assert_eq!(cpu.lookup_user_export(0x1234_5678), 0x0884_0000);
        assert_eq!(cpu.lookup_user_export(0x8765_4321), 0);
    }

    #[test]
    fn test_breakpoint_tags_are_a_side_table() {
        let mut cpu = cpu();
        assert_eq!(cpu.breakpoint_tag(100), None);
        cpu.set_breakpoint_tag(100, 0xCAFE);
        assert_eq!(cpu.breakpoint_tag(100), Some(0xCAFE));
        cpu.clear_breakpoint_tag(100);
        assert_eq!(cpu.breakpoint_tag(100), None);
        assert!(!cpu.debugging_enabled());
        cpu.enable_debugging();
        assert!(cpu.debugging_enabled());
    }
}
