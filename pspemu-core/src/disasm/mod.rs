//! Disassembly: opcode tables, instruction decoding, operand rendering and
//! per-function method body construction.

pub mod decoder;
pub mod method_body;
pub mod operand;
pub mod tables;

pub use decoder::{Instruction, Opcode};
pub use method_body::{Label, MethodBody};
pub use operand::{DataShape, JumpTarget, Operand, Register};

use crate::error::CoreError;

/// Decode a raw code image into a method body rooted at `address`.
///
/// The image must be a whole number of words and must not wrap the address
/// space; those are the only recoverable failures here. Unknown encodings
/// inside the image panic in the decoder, by design.
pub fn disassemble_method(address: u32, bytes: &[u8]) -> Result<MethodBody, CoreError> {
    if bytes.len() % 4 != 0 {
        return Err(CoreError::MisalignedImage {
            length: bytes.len(),
        });
    }
    let length = u32::try_from(bytes.len()).ok().filter(|len| address.checked_add(*len).is_some());
    let length = match length {
        Some(length) => length,
        None => {
            return Err(CoreError::AddressOverflow {
                address,
                length: bytes.len(),
            })
        }
    };
    let instructions = bytes
        .chunks_exact(4)
        .enumerate()
        .map(|(n, chunk)| {
            let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            Instruction::decode(address + (n as u32) * 4, word)
        })
        .collect();
    Ok(MethodBody::new(address, length, instructions))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disassemble_rejects_misaligned_images() {
        assert!(matches!(
            disassemble_method(0x0880_0000, &[0, 0, 0]),
            Err(CoreError::MisalignedImage { length: 3 })
        ));
    }

    #[test]
    fn disassemble_rejects_wrapping_images() {
        assert!(matches!(
            disassemble_method(0xFFFF_FFF8, &[0u8; 16]),
            Err(CoreError::AddressOverflow { .. })
        ));
    }

    #[test]
    fn disassemble_decodes_little_endian_words() {
        // One nop followed by jr $ra.
        let mut bytes = vec![0u8; 4];
        bytes.extend_from_slice(&((31u32 << 21) | 8).to_le_bytes());
        let body = disassemble_method(0x0880_0000, &bytes).unwrap();
        assert_eq!(body.total_lines, 2);
        assert_eq!(body.instructions[0].to_string(), "nop");
        assert_eq!(body.instructions[1].to_string(), "jr $ra");
    }
}
