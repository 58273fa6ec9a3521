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

// Byte I/O primitives of the generated program. The C library's `getchar`
// and `putchar` are declared external and wrapped in two always-inline
// internal functions working on 8-bit values.

use crate::ir::{FnSig, FuncId, IrBuilder, IrOp, IrTerminator, Linkage, Ty};

pub const GETCHAR: &str = "getchar";
pub const PUTCHAR: &str = "putchar";

#[derive(Clone, Copy, Debug)]
pub struct Io {
    /// `in() -> u8`
    pub input: FuncId,
    /// `out(u8)`
    pub output: FuncId,
}

impl Io {
    pub fn define(b: &mut IrBuilder) -> Self {
        let getchar = b.declare(FnSig {
            name: GETCHAR,
            linkage: Linkage::External,
            params: &[],
            ret: Some(Ty::I32),
        });
        let putchar = b.declare(FnSig {
            name: PUTCHAR,
            linkage: Linkage::External,
            params: &[Ty::I32],
            ret: Some(Ty::I32),
        });

        // in: truncation maps EOF (-1) to 255.
        let input = b.declare(FnSig {
            name: "in",
            linkage: Linkage::Internal,
            params: &[],
            ret: Some(Ty::U8),
        });
        b.func_mut(input).always_inline = true;
        b.set_func(input);
        b.set_pos(None);
        let entry = b.new_block(None);
        b.set_block(entry);
        let wide = b.new_vreg(Ty::I32);
        b.emit(IrOp::Call {
            dst: Some(wide),
            callee: getchar,
            args: Vec::new(),
        });
        let byte = b.new_vreg(Ty::U8);
        b.emit(IrOp::TruncI32 { dst: byte, src: wide });
        b.term(IrTerminator::Ret { value: Some(byte) });

        let output = b.declare(FnSig {
            name: "out",
            linkage: Linkage::Internal,
            params: &[Ty::U8],
            ret: None,
        });
        b.func_mut(output).always_inline = true;
        let byte = b.params(output)[0];
        b.set_func(output);
        let entry = b.new_block(None);
        b.set_block(entry);
        let wide = b.new_vreg(Ty::I32);
        b.emit(IrOp::ZextU8 { dst: wide, src: byte });
        b.call(putchar, vec![wide]);
        b.term(IrTerminator::Ret { value: None });

        Self { input, output }
    }
}
