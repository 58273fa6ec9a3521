/**
 * Copyright 2022 - Jahred Love
 *
 * Redistribution and use in source and binary forms, with or without modification,
 * are permitted provided that the following conditions are met:
 *
 * 1. Redistributions of source code must retain the above copyright notice, this
 * list of conditions and the following disclaimer.
 *
 * 2. Redistributions in binary form must reproduce the above copyright notice, this
 * list of conditions and the following disclaimer in the documentation and/or other
 * materials provided with the distribution.
 *
 * 3. Neither the name of the copyright holder nor the names of its contributors may
 * be used to endorse or promote products derived from this software without specific
 * prior written permission.
 *
 * THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS “AS IS” AND
 * ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO, THE IMPLIED
 * WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE DISCLAIMED.
 * IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT,
 * INDIRECT, INCIDENTAL, SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT
 * NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE, DATA, OR
 * PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
 * WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE)
 * ARISING IN ANY WAY OUT OF THE USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE
 * POSSIBILITY OF SUCH DAMAGE.
 */

// Binary container for a finished module. All integers are little-endian.
//
// header:   magic u32, version u32, name, nfuncs u32
// function: name, linkage u8, flags u8, ret u8, nvregs u32, types u8*,
//           nparams u32, params u32*, entry u32, nblocks u32
// block:    label (u8 present + string), ninsns u32, insns, terminator
// insn:     pos (u8 present + line u32 + col u32), tag u8, operands

use std::io::{self, Read, Write};

use crate::ir::{BlockId, CellField, FuncId, IrBlock, IrFunction, IrInsn, IrModule, IrOp, IrTerminator, Linkage, Ty, VRegId};
use crate::source::Pos;

const MAGIC_CELB: u32 = u32::from_le_bytes(*b"CELB");
const VERSION: u32 = 1;

const FLAG_ALWAYS_INLINE: u8 = 1 << 0;
const FLAG_FASTCC: u8 = 1 << 1;

const NO_RET: u8 = 0xFF;

fn wr_u8<W: Write>(w: &mut W, v: u8) -> io::Result<()> {
    w.write_all(&[v])
}
fn wr_u32le<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}
fn wr_str<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    wr_u32le(w, s.len() as u32)?;
    w.write_all(s.as_bytes())
}

fn ty_code(t: Ty) -> u8 {
    match t {
        Ty::U8 => 0,
        Ty::I32 => 1,
        Ty::Bool => 2,
        Ty::CellPtr => 3,
    }
}

fn field_code(fl: CellField) -> u8 {
    match fl {
        CellField::Value => 0,
        CellField::Previous => 1,
        CellField::Next => 2,
    }
}

mod tag {
    pub const CONST_U8: u8 = 0;
    pub const CONST_NULL: u8 = 1;
    pub const ADD_U8: u8 = 2;
    pub const SUB_U8: u8 = 3;
    pub const NE_U8: u8 = 4;
    pub const IS_NOT_NULL: u8 = 5;
    pub const TRUNC_I32: u8 = 6;
    pub const ZEXT_U8: u8 = 7;
    pub const ALLOC_CELL: u8 = 8;
    pub const LOAD_FIELD: u8 = 9;
    pub const STORE_FIELD: u8 = 10;
    pub const CALL: u8 = 11;
    pub const PHI: u8 = 12;

    pub const JMP: u8 = 0;
    pub const JMP_IF: u8 = 1;
    pub const RET: u8 = 2;
    pub const RET_VOID: u8 = 3;
    pub const UNREACHABLE: u8 = 4;
}

/// Whether `bytes` start with the container magic.
pub fn is_container(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && bytes[..4] == MAGIC_CELB.to_le_bytes()
}

pub fn write_module<W: Write>(m: &IrModule, w: &mut W) -> io::Result<()> {
    wr_u32le(w, MAGIC_CELB)?;
    wr_u32le(w, VERSION)?;
    wr_str(w, &m.name)?;
    wr_u32le(w, m.funcs.len() as u32)?;
    for f in &m.funcs {
        write_function(f, w)?;
    }
    Ok(())
}

fn write_function<W: Write>(f: &IrFunction, w: &mut W) -> io::Result<()> {
    wr_str(w, &f.name)?;
    wr_u8(w, if f.linkage == Linkage::External { 0 } else { 1 })?;
    let flags = (if f.always_inline { FLAG_ALWAYS_INLINE } else { 0 }) | (if f.fastcc { FLAG_FASTCC } else { 0 });
    wr_u8(w, flags)?;
    wr_u8(w, f.ret.map(ty_code).unwrap_or(NO_RET))?;

    wr_u32le(w, f.vreg_types.len() as u32)?;
    for &t in &f.vreg_types {
        wr_u8(w, ty_code(t))?;
    }
    wr_u32le(w, f.params.len() as u32)?;
    for p in &f.params {
        wr_u32le(w, p.0)?;
    }
    wr_u32le(w, f.entry.0)?;

    wr_u32le(w, f.blocks.len() as u32)?;
    for blk in &f.blocks {
        match &blk.label {
            Some(l) => {
                wr_u8(w, 1)?;
                wr_str(w, l)?;
            }
            None => wr_u8(w, 0)?,
        }
        wr_u32le(w, blk.insns.len() as u32)?;
        for insn in &blk.insns {
            write_insn(insn, w)?;
        }
        match &blk.term {
            IrTerminator::Jmp { target } => {
                wr_u8(w, tag::JMP)?;
                wr_u32le(w, target.0)?;
            }
            IrTerminator::JmpIf { cond, then_tgt, else_tgt } => {
                wr_u8(w, tag::JMP_IF)?;
                wr_u32le(w, cond.0)?;
                wr_u32le(w, then_tgt.0)?;
                wr_u32le(w, else_tgt.0)?;
            }
            IrTerminator::Ret { value: Some(v) } => {
                wr_u8(w, tag::RET)?;
                wr_u32le(w, v.0)?;
            }
            IrTerminator::Ret { value: None } => wr_u8(w, tag::RET_VOID)?,
            IrTerminator::Unreachable => wr_u8(w, tag::UNREACHABLE)?,
        }
    }
    Ok(())
}

fn write_insn<W: Write>(insn: &IrInsn, w: &mut W) -> io::Result<()> {
    match insn.pos {
        Some(p) => {
            wr_u8(w, 1)?;
            wr_u32le(w, p.line as u32)?;
            wr_u32le(w, p.col as u32)?;
        }
        None => wr_u8(w, 0)?,
    }
    match &insn.op {
        IrOp::ConstU8 { dst, imm } => {
            wr_u8(w, tag::CONST_U8)?;
            wr_u32le(w, dst.0)?;
            wr_u8(w, *imm)
        }
        IrOp::ConstNull { dst } => {
            wr_u8(w, tag::CONST_NULL)?;
            wr_u32le(w, dst.0)
        }
        IrOp::AddU8 { dst, a, b } | IrOp::SubU8 { dst, a, b } | IrOp::NeU8 { dst, a, b } => {
            let t = match &insn.op {
                IrOp::AddU8 { .. } => tag::ADD_U8,
                IrOp::SubU8 { .. } => tag::SUB_U8,
                _ => tag::NE_U8,
            };
            wr_u8(w, t)?;
            wr_u32le(w, dst.0)?;
            wr_u32le(w, a.0)?;
            wr_u32le(w, b.0)
        }
        IrOp::IsNotNull { dst, src } | IrOp::TruncI32 { dst, src } | IrOp::ZextU8 { dst, src } => {
            let t = match &insn.op {
                IrOp::IsNotNull { .. } => tag::IS_NOT_NULL,
                IrOp::TruncI32 { .. } => tag::TRUNC_I32,
                _ => tag::ZEXT_U8,
            };
            wr_u8(w, t)?;
            wr_u32le(w, dst.0)?;
            wr_u32le(w, src.0)
        }
        IrOp::AllocCell { dst } => {
            wr_u8(w, tag::ALLOC_CELL)?;
            wr_u32le(w, dst.0)
        }
        IrOp::LoadField { dst, cell, field } => {
            wr_u8(w, tag::LOAD_FIELD)?;
            wr_u32le(w, dst.0)?;
            wr_u32le(w, cell.0)?;
            wr_u8(w, field_code(*field))
        }
        IrOp::StoreField { cell, field, value } => {
            wr_u8(w, tag::STORE_FIELD)?;
            wr_u32le(w, cell.0)?;
            wr_u8(w, field_code(*field))?;
            wr_u32le(w, value.0)
        }
        IrOp::Call { dst, callee, args } => {
            wr_u8(w, tag::CALL)?;
            match dst {
                Some(d) => {
                    wr_u8(w, 1)?;
                    wr_u32le(w, d.0)?;
                }
                None => wr_u8(w, 0)?,
            }
            wr_u32le(w, callee.0)?;
            wr_u32le(w, args.len() as u32)?;
            for a in args {
                wr_u32le(w, a.0)?;
            }
            Ok(())
        }
        IrOp::Phi { dst, incomings } => {
            wr_u8(w, tag::PHI)?;
            wr_u32le(w, dst.0)?;
            wr_u32le(w, incomings.len() as u32)?;
            for (b, v) in incomings {
                wr_u32le(w, b.0)?;
                wr_u32le(w, v.0)?;
            }
            Ok(())
        }
    }
}

fn bad(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

struct Reader<'r, R: Read> {
    r: &'r mut R,
}

impl<R: Read> Reader<'_, R> {
    fn u8(&mut self) -> io::Result<u8> {
        let mut b = [0u8; 1];
        self.r.read_exact(&mut b)?;
        Ok(b[0])
    }

    fn u32(&mut self) -> io::Result<u32> {
        let mut b = [0u8; 4];
        self.r.read_exact(&mut b)?;
        Ok(u32::from_le_bytes(b))
    }

    fn flag(&mut self) -> io::Result<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            x => Err(bad(format!("bad presence flag {x}"))),
        }
    }

    fn string(&mut self) -> io::Result<String> {
        let len = self.u32()? as usize;
        let mut buf = Vec::new();
        self.r.by_ref().take(len as u64).read_to_end(&mut buf)?;
        if buf.len() != len {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated string"));
        }
        String::from_utf8(buf).map_err(|_| bad("string is not utf-8"))
    }

    fn vreg(&mut self) -> io::Result<VRegId> {
        Ok(VRegId(self.u32()?))
    }

    fn block(&mut self) -> io::Result<BlockId> {
        Ok(BlockId(self.u32()?))
    }

    fn ty(&mut self) -> io::Result<Ty> {
        ty_from_code(self.u8()?)
    }

    fn field(&mut self) -> io::Result<CellField> {
        match self.u8()? {
            0 => Ok(CellField::Value),
            1 => Ok(CellField::Previous),
            2 => Ok(CellField::Next),
            x => Err(bad(format!("bad cell field {x}"))),
        }
    }
}

fn ty_from_code(c: u8) -> io::Result<Ty> {
    match c {
        0 => Ok(Ty::U8),
        1 => Ok(Ty::I32),
        2 => Ok(Ty::Bool),
        3 => Ok(Ty::CellPtr),
        x => Err(bad(format!("bad type code {x}"))),
    }
}

pub fn read_module<R: Read>(r: &mut R) -> io::Result<IrModule> {
    let mut rd = Reader { r };
    if rd.u32()? != MAGIC_CELB {
        return Err(bad("bad magic"));
    }
    let version = rd.u32()?;
    if version != VERSION {
        return Err(bad(format!("unsupported version {version}")));
    }
    let name = rd.string()?;
    let nfuncs = rd.u32()?;
    let mut funcs = Vec::new();
    for _ in 0..nfuncs {
        funcs.push(read_function(&mut rd)?);
    }
    Ok(IrModule { name, funcs })
}

fn read_function<R: Read>(rd: &mut Reader<'_, R>) -> io::Result<IrFunction> {
    let name = rd.string()?;
    let linkage = match rd.u8()? {
        0 => Linkage::External,
        1 => Linkage::Internal,
        x => return Err(bad(format!("bad linkage {x}"))),
    };
    let flags = rd.u8()?;
    let ret = match rd.u8()? {
        NO_RET => None,
        c => Some(ty_from_code(c)?),
    };

    let nvregs = rd.u32()?;
    let mut vreg_types = Vec::new();
    for _ in 0..nvregs {
        vreg_types.push(rd.ty()?);
    }
    let nparams = rd.u32()?;
    let mut params = Vec::new();
    for _ in 0..nparams {
        params.push(rd.vreg()?);
    }
    let entry = rd.block()?;

    let nblocks = rd.u32()?;
    let mut blocks = Vec::new();
    for _ in 0..nblocks {
        let label = if rd.flag()? { Some(rd.string()?) } else { None };
        let ninsns = rd.u32()?;
        let mut insns = Vec::new();
        for _ in 0..ninsns {
            insns.push(read_insn(rd)?);
        }
        let term = match rd.u8()? {
            tag::JMP => IrTerminator::Jmp { target: rd.block()? },
            tag::JMP_IF => IrTerminator::JmpIf {
                cond: rd.vreg()?,
                then_tgt: rd.block()?,
                else_tgt: rd.block()?,
            },
            tag::RET => IrTerminator::Ret { value: Some(rd.vreg()?) },
            tag::RET_VOID => IrTerminator::Ret { value: None },
            tag::UNREACHABLE => IrTerminator::Unreachable,
            x => return Err(bad(format!("bad terminator tag {x}"))),
        };
        blocks.push(IrBlock { label, insns, term });
    }

    Ok(IrFunction {
        name,
        linkage,
        params,
        ret,
        always_inline: flags & FLAG_ALWAYS_INLINE != 0,
        fastcc: flags & FLAG_FASTCC != 0,
        entry,
        blocks,
        vreg_types,
    })
}

fn read_insn<R: Read>(rd: &mut Reader<'_, R>) -> io::Result<IrInsn> {
    let pos = if rd.flag()? {
        let line = rd.u32()? as usize;
        let col = rd.u32()? as usize;
        Some(Pos::new(line, col))
    } else {
        None
    };
    let op = match rd.u8()? {
        tag::CONST_U8 => IrOp::ConstU8 {
            dst: rd.vreg()?,
            imm: rd.u8()?,
        },
        tag::CONST_NULL => IrOp::ConstNull { dst: rd.vreg()? },
        tag::ADD_U8 => IrOp::AddU8 {
            dst: rd.vreg()?,
            a: rd.vreg()?,
            b: rd.vreg()?,
        },
        tag::SUB_U8 => IrOp::SubU8 {
            dst: rd.vreg()?,
            a: rd.vreg()?,
            b: rd.vreg()?,
        },
        tag::NE_U8 => IrOp::NeU8 {
            dst: rd.vreg()?,
            a: rd.vreg()?,
            b: rd.vreg()?,
        },
        tag::IS_NOT_NULL => IrOp::IsNotNull {
            dst: rd.vreg()?,
            src: rd.vreg()?,
        },
        tag::TRUNC_I32 => IrOp::TruncI32 {
            dst: rd.vreg()?,
            src: rd.vreg()?,
        },
        tag::ZEXT_U8 => IrOp::ZextU8 {
            dst: rd.vreg()?,
            src: rd.vreg()?,
        },
        tag::ALLOC_CELL => IrOp::AllocCell { dst: rd.vreg()? },
        tag::LOAD_FIELD => IrOp::LoadField {
            dst: rd.vreg()?,
            cell: rd.vreg()?,
            field: rd.field()?,
        },
        tag::STORE_FIELD => IrOp::StoreField {
            cell: rd.vreg()?,
            field: rd.field()?,
            value: rd.vreg()?,
        },
        tag::CALL => {
            let dst = if rd.flag()? { Some(rd.vreg()?) } else { None };
            let callee = FuncId(rd.u32()?);
            let nargs = rd.u32()?;
            let mut args = Vec::new();
            for _ in 0..nargs {
                args.push(rd.vreg()?);
            }
            IrOp::Call { dst, callee, args }
        }
        tag::PHI => {
            let dst = rd.vreg()?;
            let n = rd.u32()?;
            let mut incomings = Vec::new();
            for _ in 0..n {
                incomings.push((rd.block()?, rd.vreg()?));
            }
            IrOp::Phi { dst, incomings }
        }
        x => return Err(bad(format!("bad instruction tag {x}"))),
    };
    Ok(IrInsn { pos, op })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile_str;
    use crate::verify::verify_module;

    #[test]
    fn container_reads_back_to_the_same_listing() {
        let m = compile_str("+[>,.<-]").unwrap();
        let mut bytes = Vec::new();
        write_module(&m, &mut bytes).unwrap();
        assert_eq!(&bytes[..4], b"CELB");
        assert!(is_container(&bytes));
        assert!(!is_container(b"+[-]"));

        let back = read_module(&mut bytes.as_slice()).unwrap();
        verify_module(&back).unwrap();
        assert_eq!(back.to_string(), m.to_string());
    }

    #[test]
    fn truncated_and_foreign_input_is_rejected() {
        let m = compile_str("+").unwrap();
        let mut bytes = Vec::new();
        write_module(&m, &mut bytes).unwrap();

        let cut = &bytes[..bytes.len() - 3];
        assert!(read_module(&mut &cut[..]).is_err());

        let mut foreign = bytes.clone();
        foreign[0] ^= 0xFF;
        let err = read_module(&mut foreign.as_slice()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
