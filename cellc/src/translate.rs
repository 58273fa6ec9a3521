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

// Instruction translator: one source symbol at a time against the two live
// registers.

use tracing::trace;

use crate::error::CompileError;
use crate::ir::{CellField, IrBuilder, IrOp, Ty, VRegId};
use crate::loops::LoopStack;
use crate::runtime::Io;
use crate::source::Pos;
use crate::tape::{Direction, Tape};

/// The compile-time state threaded through translation: the SSA value of the
/// current cell and the SSA reference to the current cell record. Every
/// translation step consumes one and returns its successor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Live {
    pub value: VRegId,
    pub cell: VRegId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Instruction {
    Inc,
    Dec,
    Read,
    Write,
    Forward,
    Backward,
    Open,
    Close,
}

impl Instruction {
    /// Anything outside the eight symbols is commentary and decodes to `None`.
    pub fn decode(byte: u8) -> Option<Self> {
        Some(match byte {
            b'+' => Instruction::Inc,
            b'-' => Instruction::Dec,
            b',' => Instruction::Read,
            b'.' => Instruction::Write,
            b'>' => Instruction::Forward,
            b'<' => Instruction::Backward,
            b'[' => Instruction::Open,
            b']' => Instruction::Close,
            _ => return None,
        })
    }
}

/// Functions the translator calls into.
#[derive(Clone, Copy, Debug)]
pub struct Env {
    pub tape: Tape,
    pub io: Io,
}

pub fn translate(
    b: &mut IrBuilder,
    env: &Env,
    loops: &mut LoopStack,
    insn: Instruction,
    live: Live,
    pos: Pos,
) -> Result<Live, CompileError> {
    trace!(?insn, %pos, depth = loops.depth(), "translate");
    let next = match insn {
        Instruction::Inc => Live {
            value: step_value(b, live.value, true),
            ..live
        },
        Instruction::Dec => Live {
            value: step_value(b, live.value, false),
            ..live
        },
        Instruction::Read => {
            let value = b.new_vreg(Ty::U8);
            b.emit(IrOp::Call {
                dst: Some(value),
                callee: env.io.input,
                args: Vec::new(),
            });
            Live { value, ..live }
        }
        Instruction::Write => {
            b.emit(IrOp::Call {
                dst: None,
                callee: env.io.output,
                args: vec![live.value],
            });
            live
        }
        Instruction::Forward => shift(b, &env.tape, live, Direction::Forward),
        Instruction::Backward => shift(b, &env.tape, live, Direction::Backward),
        Instruction::Open => loops.open(b, live, pos),
        Instruction::Close => loops.close(b, live, pos)?,
    };
    Ok(next)
}

fn step_value(b: &mut IrBuilder, value: VRegId, up: bool) -> VRegId {
    let one = b.const_u8(1);
    let dst = b.new_vreg(Ty::U8);
    b.emit(if up {
        IrOp::AddU8 { dst, a: value, b: one }
    } else {
        IrOp::SubU8 { dst, a: value, b: one }
    });
    dst
}

/// Commit the outgoing value, navigate, then load the incoming value.
fn shift(b: &mut IrBuilder, tape: &Tape, live: Live, dir: Direction) -> Live {
    b.store(live.cell, CellField::Value, live.value);
    let cell = tape.step(b, live.cell, dir);
    let value = b.load(cell, CellField::Value);
    Live { value, cell }
}
