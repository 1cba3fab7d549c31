// Unit tests for the Allegrex decoder and method body builder
#[cfg(test)]
mod tests {
    use pspemu_core::disasm::{self, DataShape, Instruction, Operand};

    #[test]
    fn test_decode_addiu() {
        // addiu $a0, $a1, 5
        let word = (9u32 << 26) | (5 << 21) | (4 << 16) | 5;
        let instruction = Instruction::decode(0x0880_0000, word);
        assert_eq!(instruction.opcode.entry.name, "addiu");
        assert_eq!(instruction.to_string(), "addiu $a0, $a1, 5");
    }

    #[test]
    fn test_classification_flags() {
        // bne $a0, $zero, +2
        let bne = (5u32 << 26) | (4 << 21) | 2;
        let instruction = Instruction::decode(0x0880_0000, bne);
        assert!(instruction.is_branch());
        assert!(!instruction.is_jump());

        // jal 0x08800040
        let jal = (3u32 << 26) | (0x0880_0040 >> 2);
        let instruction = Instruction::decode(0x0880_0000, jal);
        assert!(instruction.is_jump());
        assert_eq!(instruction.to_string(), "jal 0x08800040");

        // lv.q with a zero offset reads memory.
        let lv = (54u32 << 26) | (29 << 21);
        let instruction = Instruction::decode(0x0880_0000, lv);
        assert!(instruction.is_load());
    }

    #[test]
    fn test_vfpu_operand_rendering() {
        // vadd.s against register 0 renders the single class.
        let word = 24u32 << 26;
        let instruction = Instruction::decode(0, word);
        assert_eq!(instruction.opcode.to_string(), "vadd.s");
        match &instruction.operands[0] {
            Operand::VfpuRegister { shape, .. } => assert_eq!(*shape, DataShape::Single),
            other => panic!("wrong operand: {:?}", other),
        }
        assert_eq!(instruction.operands[0].to_string(), "S000");

        // vmmul renders the left matrix transposed.
        let word = (60u32 << 26) | (1 << 15) | (1 << 7);
        let instruction = Instruction::decode(0, word);
        assert_eq!(instruction.opcode.to_string(), "vmmul.q");
        let rendered = instruction.operands[1].to_string();
        assert!(rendered.starts_with('E'), "got {}", rendered);
    }

    #[test]
    fn test_disassemble_image_with_labels() {
        // A tiny function:
        //   addiu $sp, $sp, -16
        //   beq   $zero, $zero, +1   (to the jr)
        //   nop
        //   jr    $ra
        //   addiu $sp, $sp, 16
        let words: [u32; 5] = [
            (9 << 26) | (29 << 21) | (29 << 16) | 0xFFF0,
            (4 << 26) | 1,
            0,
            (31 << 21) | 8,
            (9 << 26) | (29 << 21) | (29 << 16) | 0x0010,
        ];
        let mut bytes = Vec::new();
        for word in words {
            bytes.extend_from_slice(&word.to_le_bytes());
        }

        let body = disasm::disassemble_method(0x0880_0000, &bytes).unwrap();
        assert_eq!(body.total_lines, 5);
        assert_eq!(body.locals_size, 4);
        assert_eq!(body.labels.len(), 1);
        assert_eq!(body.labels[0].address, 0x0880_000C);
        assert_eq!(body.labels[0].references, vec![1]);
    }
}
