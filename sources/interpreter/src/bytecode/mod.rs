use std::fmt;

use support::{bytes_ext::SafeBuf, descriptor::BaseType};

use crate::{
    error::Throwable,
    internal,
    object::value::{ObjectRef, RuntimeValue, ValueKind},
    thread::Thread,
};

mod binary;
mod invoke;
mod load_store;
mod ops;
mod unary;

pub use ops::{LookupSwitch, TableSwitch};

/// What the run loop does once an instruction has been handled
pub enum Progression {
    /// By this offset from the start of the instruction
    JumpRel(i32),
    Next,
    Return(Option<RuntimeValue>),
    Throw(ObjectRef),
}

pub trait Instruction: fmt::Debug {
    fn handle(&self, _thread: &mut Thread) -> Result<Progression, Throwable> {
        Ok(Progression::Next)
    }
}

/// Utility to box a value. Used below to box each instruction that we decode
fn b<T>(v: T) -> Box<T> {
    Box::new(v)
}

/// Decode the instruction at the front of `bytes`, which starts at `pc`.
/// `bytes` is left pointing just past it.
pub fn decode_instruction(bytes: &mut &[u8], pc: usize) -> Result<Box<dyn Instruction>, Throwable> {
    let instruction = bytes.try_get_u8()?;

    Ok(match instruction {
        0x00 => b(ops::Nop),

        // Constants
        0x01 => b(load_store::PushConst {
            value: RuntimeValue::null_ref(),
        }),
        0x02 => b(load_store::PushConst {
            value: RuntimeValue::Int(-1),
        }),
        0x03 => b(load_store::PushConst {
            value: RuntimeValue::Int(0),
        }),
        0x04 => b(load_store::PushConst {
            value: RuntimeValue::Int(1),
        }),
        0x05 => b(load_store::PushConst {
            value: RuntimeValue::Int(2),
        }),
        0x06 => b(load_store::PushConst {
            value: RuntimeValue::Int(3),
        }),
        0x07 => b(load_store::PushConst {
            value: RuntimeValue::Int(4),
        }),
        0x08 => b(load_store::PushConst {
            value: RuntimeValue::Int(5),
        }),
        0x09 => b(load_store::PushConst {
            value: RuntimeValue::Long(0),
        }),
        0x0a => b(load_store::PushConst {
            value: RuntimeValue::Long(1),
        }),
        0x0b => b(load_store::PushConst {
            value: RuntimeValue::Float(0.0),
        }),
        0x0c => b(load_store::PushConst {
            value: RuntimeValue::Float(1.0),
        }),
        0x0d => b(load_store::PushConst {
            value: RuntimeValue::Float(2.0),
        }),
        0x0e => b(load_store::PushConst {
            value: RuntimeValue::Double(0.0),
        }),
        0x0f => b(load_store::PushConst {
            value: RuntimeValue::Double(1.0),
        }),
        0x10 => b(load_store::PushConst {
            value: RuntimeValue::Int(bytes.try_get_i8()? as i32),
        }),
        0x11 => b(load_store::PushConst {
            // The intermediate value is then sign-extended to an int value.
            value: RuntimeValue::Int(bytes.try_get_i16()? as i32),
        }),
        0x12 => b(load_store::Ldc {
            index: bytes.try_get_u8()? as u16,
        }),
        0x13 => b(load_store::Ldc {
            index: bytes.try_get_u16()?,
        }),
        0x14 => b(load_store::Ldc2W {
            index: bytes.try_get_u16()?,
        }),

        // Loads
        0x15 => load(bytes.try_get_u8()? as usize, ValueKind::Int),
        0x16 => load(bytes.try_get_u8()? as usize, ValueKind::Long),
        0x17 => load(bytes.try_get_u8()? as usize, ValueKind::Float),
        0x18 => load(bytes.try_get_u8()? as usize, ValueKind::Double),
        0x19 => load(bytes.try_get_u8()? as usize, ValueKind::Reference),
        0x1a..=0x1d => load((instruction - 0x1a) as usize, ValueKind::Int),
        0x1e..=0x21 => load((instruction - 0x1e) as usize, ValueKind::Long),
        0x22..=0x25 => load((instruction - 0x22) as usize, ValueKind::Float),
        0x26..=0x29 => load((instruction - 0x26) as usize, ValueKind::Double),
        0x2a..=0x2d => load((instruction - 0x2a) as usize, ValueKind::Reference),

        0x2e => b(load_store::ArrayLoad {
            kind: load_store::ArrayKind::Int,
        }),
        0x2f => b(load_store::ArrayLoad {
            kind: load_store::ArrayKind::Long,
        }),
        0x30 => b(load_store::ArrayLoad {
            kind: load_store::ArrayKind::Float,
        }),
        0x31 => b(load_store::ArrayLoad {
            kind: load_store::ArrayKind::Double,
        }),
        0x32 => b(load_store::ArrayLoad {
            kind: load_store::ArrayKind::Reference,
        }),
        0x33 => b(load_store::ArrayLoad {
            kind: load_store::ArrayKind::Byte,
        }),
        0x34 => b(load_store::ArrayLoad {
            kind: load_store::ArrayKind::Char,
        }),
        0x35 => b(load_store::ArrayLoad {
            kind: load_store::ArrayKind::Short,
        }),

        // Stores
        0x36 => store(bytes.try_get_u8()? as usize, ValueKind::Int),
        0x37 => store(bytes.try_get_u8()? as usize, ValueKind::Long),
        0x38 => store(bytes.try_get_u8()? as usize, ValueKind::Float),
        0x39 => store(bytes.try_get_u8()? as usize, ValueKind::Double),
        0x3a => store(bytes.try_get_u8()? as usize, ValueKind::Reference),
        0x3b..=0x3e => store((instruction - 0x3b) as usize, ValueKind::Int),
        0x3f..=0x42 => store((instruction - 0x3f) as usize, ValueKind::Long),
        0x43..=0x46 => store((instruction - 0x43) as usize, ValueKind::Float),
        0x47..=0x4a => store((instruction - 0x47) as usize, ValueKind::Double),
        0x4b..=0x4e => store((instruction - 0x4b) as usize, ValueKind::Reference),

        0x4f => b(load_store::ArrayStore {
            kind: load_store::ArrayKind::Int,
        }),
        0x50 => b(load_store::ArrayStore {
            kind: load_store::ArrayKind::Long,
        }),
        0x51 => b(load_store::ArrayStore {
            kind: load_store::ArrayKind::Float,
        }),
        0x52 => b(load_store::ArrayStore {
            kind: load_store::ArrayKind::Double,
        }),
        0x53 => b(load_store::ArrayStore {
            kind: load_store::ArrayKind::Reference,
        }),
        0x54 => b(load_store::ArrayStore {
            kind: load_store::ArrayKind::Byte,
        }),
        0x55 => b(load_store::ArrayStore {
            kind: load_store::ArrayKind::Char,
        }),
        0x56 => b(load_store::ArrayStore {
            kind: load_store::ArrayKind::Short,
        }),

        // Stack
        0x57 => b(ops::Pop),
        0x58 => b(ops::Pop2),
        0x59 => b(ops::Dup { take: 1, skip: 0 }),
        0x5a => b(ops::Dup { take: 1, skip: 1 }),
        0x5b => b(ops::Dup { take: 1, skip: 2 }),
        0x5c => b(ops::Dup { take: 2, skip: 0 }),
        0x5d => b(ops::Dup { take: 2, skip: 1 }),
        0x5e => b(ops::Dup { take: 2, skip: 2 }),
        0x5f => b(ops::Swap),

        // Math
        0x60 => b(binary::Iadd),
        0x61 => b(binary::Ladd),
        0x62 => b(binary::Fadd),
        0x63 => b(binary::Dadd),
        0x64 => b(binary::Isub),
        0x65 => b(binary::Lsub),
        0x66 => b(binary::Fsub),
        0x67 => b(binary::Dsub),
        0x68 => b(binary::Imul),
        0x69 => b(binary::Lmul),
        0x6a => b(binary::Fmul),
        0x6b => b(binary::Dmul),
        0x6c => b(binary::Idiv),
        0x6d => b(binary::Ldiv),
        0x6e => b(binary::Fdiv),
        0x6f => b(binary::Ddiv),
        0x70 => b(binary::Irem),
        0x71 => b(binary::Lrem),
        0x72 => b(binary::Frem),
        0x73 => b(binary::Drem),
        0x74 => b(unary::Ineg),
        0x75 => b(unary::Lneg),
        0x76 => b(unary::Fneg),
        0x77 => b(unary::Dneg),
        0x78 => b(binary::Ishl),
        0x79 => b(binary::Lshl),
        0x7a => b(binary::Ishr),
        0x7b => b(binary::Lshr),
        0x7c => b(binary::Iushr),
        0x7d => b(binary::Lushr),
        0x7e => b(binary::Iand),
        0x7f => b(binary::Land),
        0x80 => b(binary::Ior),
        0x81 => b(binary::Lor),
        0x82 => b(binary::Ixor),
        0x83 => b(binary::Lxor),
        0x84 => b(unary::Iinc {
            index: bytes.try_get_u8()? as usize,
            constant: bytes.try_get_i8()? as i32,
        }),

        // Conversions
        0x85 => b(unary::I2l),
        0x86 => b(unary::I2f),
        0x87 => b(unary::I2d),
        0x88 => b(unary::L2i),
        0x89 => b(unary::L2f),
        0x8a => b(unary::L2d),
        0x8b => b(unary::F2i),
        0x8c => b(unary::F2l),
        0x8d => b(unary::F2d),
        0x8e => b(unary::D2i),
        0x8f => b(unary::D2l),
        0x90 => b(unary::D2f),
        0x91 => b(unary::I2b),
        0x92 => b(unary::I2c),
        0x93 => b(unary::I2s),

        // Comparisons
        0x94 => b(binary::Lcmp),
        0x95 => b(binary::Fcmpl),
        0x96 => b(binary::Fcmpg),
        0x97 => b(binary::Dcmpl),
        0x98 => b(binary::Dcmpg),
        0x99 => b(unary::IfEq {
            jump_to: bytes.try_get_i16()?,
        }),
        0x9a => b(unary::IfNe {
            jump_to: bytes.try_get_i16()?,
        }),
        0x9b => b(unary::IfLt {
            jump_to: bytes.try_get_i16()?,
        }),
        0x9c => b(unary::IfGe {
            jump_to: bytes.try_get_i16()?,
        }),
        0x9d => b(unary::IfGt {
            jump_to: bytes.try_get_i16()?,
        }),
        0x9e => b(unary::IfLe {
            jump_to: bytes.try_get_i16()?,
        }),
        0x9f => b(binary::IfICmpEq {
            jump_to: bytes.try_get_i16()?,
        }),
        0xa0 => b(binary::IfICmpNe {
            jump_to: bytes.try_get_i16()?,
        }),
        0xa1 => b(binary::IfICmpLt {
            jump_to: bytes.try_get_i16()?,
        }),
        0xa2 => b(binary::IfICmpGe {
            jump_to: bytes.try_get_i16()?,
        }),
        0xa3 => b(binary::IfICmpGt {
            jump_to: bytes.try_get_i16()?,
        }),
        0xa4 => b(binary::IfICmpLe {
            jump_to: bytes.try_get_i16()?,
        }),
        0xa5 => b(binary::IfACmpEq {
            jump_to: bytes.try_get_i16()?,
        }),
        0xa6 => b(binary::IfACmpNe {
            jump_to: bytes.try_get_i16()?,
        }),

        // Control
        0xa7 => b(ops::Goto {
            jump_to: bytes.try_get_i16()? as i32,
        }),
        0xa8 => b(ops::Unsupported { name: "jsr" }),
        0xa9 => b(ops::Unsupported { name: "ret" }),
        0xaa => {
            bytes.try_skip(3 - (pc % 4))?;

            let default = bytes.try_get_i32()?;
            let low = bytes.try_get_i32()?;
            let high = bytes.try_get_i32()?;
            if high < low {
                return Err(internal!("tableswitch high {} is below low {}", high, low));
            }

            let count = (high as i64 - low as i64 + 1) as usize;
            let offsets = (0..count)
                .map(|_| bytes.try_get_i32())
                .collect::<anyhow::Result<Vec<_>>>()?;

            b(ops::TableSwitch {
                default,
                low,
                high,
                offsets,
            })
        }
        0xab => {
            bytes.try_skip(3 - (pc % 4))?;

            let default = bytes.try_get_i32()?;
            let count = bytes.try_get_i32()?;
            if count < 0 {
                return Err(internal!("lookupswitch has {} pairs", count));
            }

            let pairs = (0..count)
                .map(|_| -> anyhow::Result<(i32, i32)> {
                    Ok((bytes.try_get_i32()?, bytes.try_get_i32()?))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;

            b(ops::LookupSwitch { default, pairs })
        }
        0xac => b(ops::ValueReturn {
            kind: ValueKind::Int,
        }),
        0xad => b(ops::ValueReturn {
            kind: ValueKind::Long,
        }),
        0xae => b(ops::ValueReturn {
            kind: ValueKind::Float,
        }),
        0xaf => b(ops::ValueReturn {
            kind: ValueKind::Double,
        }),
        0xb0 => b(ops::ValueReturn {
            kind: ValueKind::Reference,
        }),
        0xb1 => b(ops::VoidReturn),

        // References
        0xb2 => b(load_store::GetStatic {
            index: bytes.try_get_u16()?,
        }),
        0xb3 => b(load_store::PutStatic {
            index: bytes.try_get_u16()?,
        }),
        0xb4 => b(load_store::GetField {
            index: bytes.try_get_u16()?,
        }),
        0xb5 => b(load_store::PutField {
            index: bytes.try_get_u16()?,
        }),
        0xb6 => b(invoke::InvokeVirtual {
            index: bytes.try_get_u16()?,
        }),
        0xb7 => b(invoke::InvokeSpecial {
            index: bytes.try_get_u16()?,
        }),
        0xb8 => b(invoke::InvokeStatic {
            index: bytes.try_get_u16()?,
        }),
        0xb9 => {
            let index = bytes.try_get_u16()?;
            // The count and the trailing zero are redundant with the descriptor
            bytes.try_skip(2)?;
            b(invoke::InvokeInterface { index })
        }
        0xba => {
            bytes.try_skip(4)?;
            b(ops::Unsupported {
                name: "invokedynamic",
            })
        }
        0xbb => b(invoke::New {
            index: bytes.try_get_u16()?,
        }),
        0xbc => b(ops::NewArray {
            ty: BaseType::from_array_tag(bytes.try_get_u8()?)?,
        }),
        0xbd => b(ops::ANewArray {
            index: bytes.try_get_u16()?,
        }),
        0xbe => b(ops::ArrayLength),
        0xbf => b(ops::Athrow),
        0xc0 => b(ops::CheckCast {
            index: bytes.try_get_u16()?,
        }),
        0xc1 => b(ops::InstanceOf {
            index: bytes.try_get_u16()?,
        }),
        0xc2 => b(ops::MonitorEnter),
        0xc3 => b(ops::MonitorExit),

        // Extended
        0xc4 => {
            let widened = bytes.try_get_u8()?;
            match widened {
                0x15 => load(bytes.try_get_u16()? as usize, ValueKind::Int),
                0x16 => load(bytes.try_get_u16()? as usize, ValueKind::Long),
                0x17 => load(bytes.try_get_u16()? as usize, ValueKind::Float),
                0x18 => load(bytes.try_get_u16()? as usize, ValueKind::Double),
                0x19 => load(bytes.try_get_u16()? as usize, ValueKind::Reference),
                0x36 => store(bytes.try_get_u16()? as usize, ValueKind::Int),
                0x37 => store(bytes.try_get_u16()? as usize, ValueKind::Long),
                0x38 => store(bytes.try_get_u16()? as usize, ValueKind::Float),
                0x39 => store(bytes.try_get_u16()? as usize, ValueKind::Double),
                0x3a => store(bytes.try_get_u16()? as usize, ValueKind::Reference),
                0x84 => b(unary::Iinc {
                    index: bytes.try_get_u16()? as usize,
                    constant: bytes.try_get_i16()? as i32,
                }),
                0xa9 => {
                    bytes.try_skip(2)?;
                    b(ops::Unsupported { name: "ret" })
                }
                other => return Err(internal!("wide cannot modify opcode 0x{:x}", other)),
            }
        }
        0xc5 => b(ops::MultiANewArray {
            index: bytes.try_get_u16()?,
            dimensions: bytes.try_get_u8()?,
        }),
        0xc6 => b(unary::IfNull {
            jump_to: bytes.try_get_i16()?,
        }),
        0xc7 => b(unary::IfNonNull {
            jump_to: bytes.try_get_i16()?,
        }),
        0xc8 => b(ops::Goto {
            jump_to: bytes.try_get_i32()?,
        }),
        0xc9 => {
            bytes.try_skip(4)?;
            b(ops::Unsupported { name: "jsr_w" })
        }

        other => return Err(internal!("unknown opcode 0x{:x} at pc {}", other, pc)),
    })
}

fn load(index: usize, kind: ValueKind) -> Box<dyn Instruction> {
    b(load_store::LoadLocal { index, kind })
}

fn store(index: usize, kind: ValueKind) -> Box<dyn Instruction> {
    b(load_store::StoreLocal { index, kind })
}

#[cfg(test)]
mod tests {
    use classfile::{builder::CodeBuilder, opcode::*};

    use super::{decode_instruction, TableSwitch};

    fn decode_all(code: &[u8]) -> anyhow::Result<Vec<(usize, String)>> {
        let mut decoded = vec![];
        let mut bytes = code;

        while !bytes.is_empty() {
            let pc = code.len() - bytes.len();
            let instruction = decode_instruction(&mut bytes, pc)?;
            decoded.push((pc, format!("{:?}", instruction)));
        }

        Ok(decoded)
    }

    #[test]
    fn decodes_operands_and_lengths() -> anyhow::Result<()> {
        let mut code = CodeBuilder::new();
        code.op_i8(BIPUSH, -3)
            .op_i16(SIPUSH, 300)
            .op_u8(ISTORE, 4)
            .iinc(4, -1)
            .op(ILOAD_2)
            .op(IRETURN);

        let decoded = decode_all(&code.build()?.code)?;
        let pcs: Vec<usize> = decoded.iter().map(|(pc, _)| *pc).collect();

        assert_eq!(pcs, vec![0, 2, 5, 7, 10, 11]);
        assert_eq!(decoded[0].1, "PushConst { value: Int(-3) }");
        assert_eq!(decoded[1].1, "PushConst { value: Int(300) }");
        assert_eq!(decoded[3].1, "Iinc { index: 4, constant: -1 }");
        assert_eq!(decoded[4].1, "LoadLocal { index: 2, kind: Int }");
        Ok(())
    }

    #[test]
    fn wide_widens_the_index() -> anyhow::Result<()> {
        let code = [WIDE, ALOAD, 0x01, 0x00, WIDE, IINC, 0x01, 0x00, 0xff, 0xfe];
        let decoded = decode_all(&code)?;

        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].1, "LoadLocal { index: 256, kind: Reference }");
        assert_eq!(decoded[1].1, "Iinc { index: 256, constant: -2 }");
        Ok(())
    }

    #[test]
    fn tableswitch_padding_follows_pc() -> anyhow::Result<()> {
        let mut code = CodeBuilder::new();
        code.op(NOP)
            .op(ICONST_1)
            .raw_tableswitch(0, 2, 40, &[10, 20, 30])
            .op(RETURN);

        let decoded = decode_all(&code.build()?.code)?;

        assert_eq!(decoded.len(), 4);
        assert_eq!(
            decoded[2].1,
            "TableSwitch { default: 40, low: 0, high: 2, offsets: [10, 20, 30] }"
        );
        assert_eq!(decoded[3].0, 28);
        Ok(())
    }

    #[test]
    fn tableswitch_targets() {
        let switch = TableSwitch {
            default: 40,
            low: 0,
            high: 2,
            offsets: vec![10, 20, 30],
        };

        assert_eq!(switch.target(1), 20);
        assert_eq!(switch.target(0), 10);
        assert_eq!(switch.target(2), 30);
        assert_eq!(switch.target(99), 40);
        assert_eq!(switch.target(-1), 40);
    }

    #[test]
    fn unknown_opcodes_fault() {
        let code = [0xca];
        assert!(decode_all(&code).is_err());

        let truncated = [SIPUSH, 0x01];
        assert!(decode_all(&truncated).is_err());
    }
}
