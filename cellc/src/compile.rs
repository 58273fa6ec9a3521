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

// Compilation driver: program shell setup, per-symbol translation and the
// final hand-off of the verified graph.

use tracing::debug;

use crate::error::CompileError;
use crate::ir::{CellField, FnSig, FuncId, IrBuilder, IrModule, IrTerminator, Linkage};
use crate::loops::LoopStack;
use crate::runtime::Io;
use crate::source::Cursor;
#[cfg(test)]
use crate::source::Pos;
use crate::tape::Tape;
use crate::translate::{self, Env, Instruction, Live};
use crate::verify;

pub const MODULE_NAME: &str = "cells";
pub const ENTRY_NAME: &str = "main";

pub struct Compiler {
    b: IrBuilder,
    env: Env,
    main: FuncId,
    loops: LoopStack,
    live: Live,
    cursor: Cursor,
    failed: Option<CompileError>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        let mut b = IrBuilder::new(MODULE_NAME);
        let io = Io::define(&mut b);
        let tape = Tape::define(&mut b);

        // The entry point, filled by the input.
        let main = b.declare(FnSig {
            name: ENTRY_NAME,
            linkage: Linkage::External,
            params: &[],
            ret: None,
        });
        b.set_func(main);
        b.set_pos(None);
        let entry = b.new_block(Some("entry".to_string()));
        b.set_block(entry);

        let null = b.const_null();
        let origin = tape.allocate(&mut b, null, null);
        let value = b.const_u8(0);

        Self {
            b,
            env: Env { tape, io },
            main,
            loops: LoopStack::default(),
            live: Live { value, cell: origin },
            cursor: Cursor::default(),
            failed: None,
        }
    }

    /// Feed one byte of program text. Newlines and unrecognised bytes only
    /// move the position. After an error every further call returns that
    /// error.
    pub fn translate_symbol(&mut self, byte: u8) -> Result<(), CompileError> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        let Some(pos) = self.cursor.advance(byte) else {
            return Ok(());
        };
        let Some(insn) = Instruction::decode(byte) else {
            return Ok(());
        };

        self.b.set_pos(Some(pos));
        match translate::translate(&mut self.b, &self.env, &mut self.loops, insn, self.live, pos) {
            Ok(live) => {
                self.live = live;
                Ok(())
            }
            Err(err) => {
                self.failed = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Position of the last byte fed.
    #[cfg(test)]
    pub fn position(&self) -> Pos {
        self.cursor.pos()
    }

    #[cfg(test)]
    pub fn depth(&self) -> usize {
        self.loops.depth()
    }

    #[cfg(test)]
    pub fn live(&self) -> Live {
        self.live
    }

    /// Close the entry function and return the verified module.
    pub fn finish(mut self) -> Result<IrModule, CompileError> {
        if let Some(err) = self.failed {
            return Err(err);
        }
        self.loops.check_closed(self.cursor.pos())?;

        if !self.b.is_open() {
            return Err(CompileError::internal("entry path already terminated"));
        }
        self.b.set_pos(None);
        self.b.store(self.live.cell, CellField::Value, self.live.value);
        self.b.term(IrTerminator::Ret { value: None });

        let module = self.b.finish();
        verify::verify_module(&module)?;
        debug!(
            funcs = module.funcs.len(),
            blocks = module.funcs[self.main.0 as usize].blocks.len(),
            "module finished"
        );
        Ok(module)
    }
}

/// Compile a whole program text, stopping at the first error.
pub fn compile_bytes(src: &[u8]) -> Result<IrModule, CompileError> {
    let mut c = Compiler::new();
    for &byte in src {
        c.translate_symbol(byte)?;
    }
    c.finish()
}

#[cfg(test)]
pub fn compile_str(src: &str) -> Result<IrModule, CompileError> {
    compile_bytes(src.as_bytes())
}
