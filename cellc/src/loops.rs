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

// Loop compiler.
//
// Loop structure:
// - caller: the block that was open when `[` was read;
// - head: merges the live registers and tests the current value;
// - body: everything between `[` and `]`;
// - end: where compilation continues after `]`.
//
// On `[` the caller jumps to the head, whose phis get their first incoming
// edge from the caller. The frame stays on the stack until the matching `]`,
// which jumps back to the head and supplies the second incoming edge from
// whichever block the body ended in.

use tracing::debug;

use crate::error::CompileError;
use crate::ir::{BlockId, IrBuilder, IrOp, IrTerminator, Ty, VRegId};
use crate::source::Pos;
use crate::translate::Live;

/// Pending merge points of one unclosed loop.
#[derive(Clone, Copy, Debug)]
pub struct LoopFrame {
    pub cell_phi: VRegId,
    pub value_phi: VRegId,
    pub head: BlockId,
    pub end: BlockId,
    pub opened_at: Pos,
}

#[derive(Debug, Default)]
pub struct LoopStack {
    frames: Vec<LoopFrame>,
}

impl LoopStack {
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    #[cfg(test)]
    pub fn innermost(&self) -> Option<&LoopFrame> {
        self.frames.last()
    }

    pub fn open(&mut self, b: &mut IrBuilder, live: Live, pos: Pos) -> Live {
        let caller = b.cur_block();
        let head = b.new_block(Some("loop.head".to_string()));
        let body = b.new_block(Some("loop.body".to_string()));
        let end = b.new_block(Some("loop.end".to_string()));

        b.term(IrTerminator::Jmp { target: head });

        b.set_block(head);
        let cell_phi = b.phi(Ty::CellPtr, vec![(caller, live.cell)]);
        let value_phi = b.phi(Ty::U8, vec![(caller, live.value)]);

        let zero = b.const_u8(0);
        let cond = b.new_vreg(Ty::Bool);
        b.emit(IrOp::NeU8 {
            dst: cond,
            a: value_phi,
            b: zero,
        });
        b.term(IrTerminator::JmpIf {
            cond,
            then_tgt: body,
            else_tgt: end,
        });

        self.frames.push(LoopFrame {
            cell_phi,
            value_phi,
            head,
            end,
            opened_at: pos,
        });
        debug!(depth = self.frames.len(), head = head.0, %pos, "loop opened");

        b.set_block(body);
        Live {
            value: value_phi,
            cell: cell_phi,
        }
    }

    pub fn close(&mut self, b: &mut IrBuilder, live: Live, pos: Pos) -> Result<Live, CompileError> {
        let Some(frame) = self.frames.last().copied() else {
            return Err(CompileError::UnmatchedClose { at: pos });
        };

        let body_end = b.cur_block();
        b.term(IrTerminator::Jmp { target: frame.head });

        if !b.add_incoming(frame.head, frame.value_phi, body_end, live.value)
            || !b.add_incoming(frame.head, frame.cell_phi, body_end, live.cell)
        {
            return Err(CompileError::internal(format!(
                "loop head b{} lost its merge points",
                frame.head.0
            )));
        }
        self.frames.pop();
        debug!(depth = self.frames.len(), head = frame.head.0, %pos, "loop closed");

        b.set_block(frame.end);
        Ok(Live {
            value: frame.value_phi,
            cell: frame.cell_phi,
        })
    }

    /// End-of-input check.
    pub fn check_closed(&self, at: Pos) -> Result<(), CompileError> {
        match self.frames.last() {
            None => Ok(()),
            Some(frame) => Err(CompileError::UnterminatedLoop {
                at,
                opened_at: frame.opened_at,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FnSig, Linkage};

    fn builder() -> (IrBuilder, Live) {
        let mut b = IrBuilder::new("loops");
        let f = b.declare(FnSig {
            name: "main",
            linkage: Linkage::External,
            params: &[Ty::CellPtr],
            ret: None,
        });
        b.set_func(f);
        let entry = b.new_block(Some("entry".to_string()));
        b.set_block(entry);
        let cell = b.params(f)[0];
        let value = b.const_u8(0);
        (b, Live { value, cell })
    }

    #[test]
    fn close_on_empty_stack_emits_nothing() {
        let (mut b, live) = builder();
        let mut loops = LoopStack::default();
        let err = loops.close(&mut b, live, Pos::new(1, 1)).unwrap_err();
        assert_eq!(err, CompileError::UnmatchedClose { at: Pos::new(1, 1) });
        assert!(b.is_open());
        assert_eq!(b.finish().funcs[0].blocks.len(), 1);
    }

    #[test]
    fn nested_loops_match_innermost_first() {
        let (mut b, live) = builder();
        let mut loops = LoopStack::default();
        let outer = loops.open(&mut b, live, Pos::new(1, 1));
        let outer_head = loops.innermost().unwrap().head;
        let inner = loops.open(&mut b, outer, Pos::new(1, 2));
        let inner_frame = *loops.innermost().unwrap();
        assert_eq!(loops.depth(), 2);

        let after_inner = loops.close(&mut b, inner, Pos::new(1, 3)).unwrap();
        assert_eq!(b.cur_block(), inner_frame.end);
        assert_eq!(after_inner.value, inner_frame.value_phi);

        loops.close(&mut b, after_inner, Pos::new(1, 4)).unwrap();
        assert_eq!(loops.depth(), 0);

        let m = b.finish();
        let head = &m.funcs[0].blocks[outer_head.0 as usize];
        for insn in head.insns.iter().take(2) {
            match &insn.op {
                IrOp::Phi { incomings, .. } => {
                    assert_eq!(incomings.len(), 2);
                    // Second edge comes from the inner loop's end block.
                    assert_eq!(incomings[1].0, inner_frame.end);
                }
                other => panic!("expected phi, got {other:?}"),
            }
        }
    }

    #[test]
    fn unclosed_frame_reports_its_origin() {
        let (mut b, live) = builder();
        let mut loops = LoopStack::default();
        loops.open(&mut b, live, Pos::new(3, 7));
        assert_eq!(
            loops.check_closed(Pos::new(4, 2)),
            Err(CompileError::UnterminatedLoop {
                at: Pos::new(4, 2),
                opened_at: Pos::new(3, 7),
            })
        );
    }
}
