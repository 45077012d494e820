//! The bytecode decoder.
//!
//! Instructions are one opcode byte followed by little-endian immediates.
//! Branch targets are absolute bytecode offsets. [`decode`] is the only entry
//! point the translator uses; [`Opcode::encode`] is the inverse, used by the
//! flow-graph scanner's callers and the test suites to assemble methods.

use crate::{ImportError, Result};
use ingot_ir::{CmpOp, TypeTag, UnOp};

/// A decoded instruction.
#[derive(Clone, Debug, PartialEq)]
pub enum Opcode {
    /// No operation.
    Nop,
    /// Push a 32-bit integer constant.
    LdcI4(i32),
    /// Push a 64-bit integer constant.
    LdcI8(i64),
    /// Push a 32-bit float constant.
    LdcR4(f32),
    /// Push a 64-bit float constant.
    LdcR8(f64),
    /// Push a null object reference.
    LdNull,
    /// Push the value of a local.
    LdLoc(u16),
    /// Pop into a local.
    StLoc(u16),
    /// Push the address of a local.
    LdLocA(u16),
    /// Pop two values, push the result of the binary operation.
    Bin(ingot_ir::BinOp),
    /// Pop one value, push the result of the unary operation.
    Un(UnOp),
    /// Pop two values, push a 0/1 comparison result.
    Cmp(CmpOp),
    /// Pop one value, push it converted to the given numeric type.
    Conv(TypeTag),
    /// Duplicate the top of stack.
    Dup,
    /// Discard the top of stack.
    Pop,
    /// Pop an address, push the value loaded through it.
    LdInd(TypeTag),
    /// Pop a value and an address, store through the address.
    StInd,
    /// Call the method named by a metadata token.
    Call(u32),
    /// Unconditional branch to an absolute offset.
    Br(u32),
    /// Branch if the popped value is nonzero.
    BrTrue(u32),
    /// Branch if the popped value is zero.
    BrFalse(u32),
    /// Multi-way branch on the popped selector; out-of-range falls through.
    Switch(Vec<u32>),
    /// Return from the method.
    Ret,
    /// Pop an exception object and raise it.
    Throw,
    /// Exit one or more protected regions, landing at an absolute offset.
    Leave(u32),
    /// End of a finally/fault handler body.
    EndFinally,
    /// Pop the filter verdict and end the filter.
    EndFilter,
}

impl Opcode {
    /// Returns `true` if this instruction always ends its basic block.
    #[must_use]
    pub const fn ends_block(&self) -> bool {
        matches!(
            self,
            Self::Br(_)
                | Self::BrTrue(_)
                | Self::BrFalse(_)
                | Self::Switch(_)
                | Self::Ret
                | Self::Throw
                | Self::Leave(_)
                | Self::EndFinally
                | Self::EndFilter
        )
    }

    /// Branch targets of this instruction, if any.
    #[must_use]
    pub fn targets(&self) -> Vec<u32> {
        match self {
            Self::Br(t) | Self::BrTrue(t) | Self::BrFalse(t) | Self::Leave(t) => vec![*t],
            Self::Switch(ts) => ts.clone(),
            _ => Vec::new(),
        }
    }

    /// Appends the encoded form of this instruction to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        use ingot_ir::BinOp;
        match self {
            Self::Nop => buf.push(0x00),
            Self::LdcI4(v) => {
                buf.push(0x01);
                buf.extend_from_slice(&v.to_le_bytes());
            }
            Self::LdcI8(v) => {
                buf.push(0x02);
                buf.extend_from_slice(&v.to_le_bytes());
            }
            Self::LdcR4(v) => {
                buf.push(0x03);
                buf.extend_from_slice(&v.to_le_bytes());
            }
            Self::LdcR8(v) => {
                buf.push(0x04);
                buf.extend_from_slice(&v.to_le_bytes());
            }
            Self::LdNull => buf.push(0x05),
            Self::LdLoc(n) => {
                buf.push(0x10);
                buf.extend_from_slice(&n.to_le_bytes());
            }
            Self::StLoc(n) => {
                buf.push(0x11);
                buf.extend_from_slice(&n.to_le_bytes());
            }
            Self::LdLocA(n) => {
                buf.push(0x12);
                buf.extend_from_slice(&n.to_le_bytes());
            }
            Self::Bin(op) => buf.push(match op {
                BinOp::Add => 0x20,
                BinOp::Sub => 0x21,
                BinOp::Mul => 0x22,
                BinOp::Div => 0x23,
                BinOp::Rem => 0x24,
                BinOp::And => 0x25,
                BinOp::Or => 0x26,
                BinOp::Xor => 0x27,
                BinOp::Shl => 0x28,
                BinOp::Shr => 0x29,
            }),
            Self::Un(op) => buf.push(match op {
                UnOp::Neg => 0x2a,
                UnOp::Not => 0x2b,
            }),
            Self::Cmp(op) => buf.push(match op {
                CmpOp::Eq => 0x30,
                CmpOp::Ne => 0x31,
                CmpOp::Lt => 0x32,
                CmpOp::Le => 0x33,
                CmpOp::Gt => 0x34,
                CmpOp::Ge => 0x35,
            }),
            Self::Conv(ty) => {
                buf.push(0x38);
                buf.push(type_code(*ty));
            }
            Self::Dup => buf.push(0x40),
            Self::Pop => buf.push(0x41),
            Self::LdInd(ty) => {
                buf.push(0x48);
                buf.push(type_code(*ty));
            }
            Self::StInd => buf.push(0x49),
            Self::Call(token) => {
                buf.push(0x50);
                buf.extend_from_slice(&token.to_le_bytes());
            }
            Self::Br(t) => {
                buf.push(0x60);
                buf.extend_from_slice(&t.to_le_bytes());
            }
            Self::BrTrue(t) => {
                buf.push(0x61);
                buf.extend_from_slice(&t.to_le_bytes());
            }
            Self::BrFalse(t) => {
                buf.push(0x62);
                buf.extend_from_slice(&t.to_le_bytes());
            }
            Self::Switch(ts) => {
                buf.push(0x63);
                buf.extend_from_slice(&(ts.len() as u32).to_le_bytes());
                for t in ts {
                    buf.extend_from_slice(&t.to_le_bytes());
                }
            }
            Self::Ret => buf.push(0x70),
            Self::Throw => buf.push(0x71),
            Self::Leave(t) => {
                buf.push(0x72);
                buf.extend_from_slice(&t.to_le_bytes());
            }
            Self::EndFinally => buf.push(0x73),
            Self::EndFilter => buf.push(0x74),
        }
    }
}

/// Decodes one instruction. Returns it and the offset of the next one.
pub fn decode(code: &[u8], offset: u32) -> Result<(Opcode, u32)> {
    use ingot_ir::BinOp;
    let mut cur = Cursor { code, pos: offset };
    let byte = cur.u8()?;
    let op = match byte {
        0x00 => Opcode::Nop,
        0x01 => Opcode::LdcI4(cur.u32()? as i32),
        0x02 => Opcode::LdcI8(cur.u64()? as i64),
        0x03 => Opcode::LdcR4(f32::from_le_bytes(cur.u32()?.to_le_bytes())),
        0x04 => Opcode::LdcR8(f64::from_le_bytes(cur.u64()?.to_le_bytes())),
        0x05 => Opcode::LdNull,
        0x10 => Opcode::LdLoc(cur.u16()?),
        0x11 => Opcode::StLoc(cur.u16()?),
        0x12 => Opcode::LdLocA(cur.u16()?),
        0x20 => Opcode::Bin(BinOp::Add),
        0x21 => Opcode::Bin(BinOp::Sub),
        0x22 => Opcode::Bin(BinOp::Mul),
        0x23 => Opcode::Bin(BinOp::Div),
        0x24 => Opcode::Bin(BinOp::Rem),
        0x25 => Opcode::Bin(BinOp::And),
        0x26 => Opcode::Bin(BinOp::Or),
        0x27 => Opcode::Bin(BinOp::Xor),
        0x28 => Opcode::Bin(BinOp::Shl),
        0x29 => Opcode::Bin(BinOp::Shr),
        0x2a => Opcode::Un(UnOp::Neg),
        0x2b => Opcode::Un(UnOp::Not),
        0x30 => Opcode::Cmp(CmpOp::Eq),
        0x31 => Opcode::Cmp(CmpOp::Ne),
        0x32 => Opcode::Cmp(CmpOp::Lt),
        0x33 => Opcode::Cmp(CmpOp::Le),
        0x34 => Opcode::Cmp(CmpOp::Gt),
        0x35 => Opcode::Cmp(CmpOp::Ge),
        0x38 => Opcode::Conv(cur.type_tag()?),
        0x40 => Opcode::Dup,
        0x41 => Opcode::Pop,
        0x48 => Opcode::LdInd(cur.type_tag()?),
        0x49 => Opcode::StInd,
        0x50 => Opcode::Call(cur.u32()?),
        0x60 => Opcode::Br(cur.u32()?),
        0x61 => Opcode::BrTrue(cur.u32()?),
        0x62 => Opcode::BrFalse(cur.u32()?),
        0x63 => {
            let count = cur.u32()? as usize;
            let mut targets = Vec::with_capacity(count);
            for _ in 0..count {
                targets.push(cur.u32()?);
            }
            Opcode::Switch(targets)
        }
        0x70 => Opcode::Ret,
        0x71 => Opcode::Throw,
        0x72 => Opcode::Leave(cur.u32()?),
        0x73 => Opcode::EndFinally,
        0x74 => Opcode::EndFilter,
        opcode => return Err(ImportError::BadOpcode { offset, opcode }),
    };
    Ok((op, cur.pos))
}

const fn type_code(ty: TypeTag) -> u8 {
    match ty {
        TypeTag::Int32 => 0,
        TypeTag::Int64 => 1,
        TypeTag::NativeInt => 2,
        TypeTag::Float32 => 3,
        TypeTag::Float64 => 4,
        TypeTag::Ref => 5,
        TypeTag::ByRef => 6,
        // Struct/void immediates never appear in the encoding.
        TypeTag::Struct(_) | TypeTag::Void => u8::MAX,
    }
}

struct Cursor<'a> {
    code: &'a [u8],
    pos: u32,
}

impl Cursor<'_> {
    fn take(&mut self, n: usize) -> Result<&[u8]> {
        let start = self.pos as usize;
        let end = start + n;
        if end > self.code.len() {
            return Err(ImportError::TruncatedCode { offset: self.pos });
        }
        self.pos = end as u32;
        Ok(&self.code[start..end])
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn type_tag(&mut self) -> Result<TypeTag> {
        let offset = self.pos;
        let tag = match self.u8()? {
            0 => TypeTag::Int32,
            1 => TypeTag::Int64,
            2 => TypeTag::NativeInt,
            3 => TypeTag::Float32,
            4 => TypeTag::Float64,
            5 => TypeTag::Ref,
            6 => TypeTag::ByRef,
            opcode => return Err(ImportError::BadOpcode { offset, opcode }),
        };
        Ok(tag)
    }
}
