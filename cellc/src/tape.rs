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

// Linked-cell memory model: the cell allocator and the tape navigator.
//
// Both are emitted as small internal functions of the generated program. The
// tape has no declared size; a neighbour is materialised the first time it is
// visited and linked back to the cell it was reached from, so the graph's own
// `previous`/`next` links are the only memo the navigator needs.

use crate::ir::{CellField, FnSig, FuncId, IrBuilder, IrOp, IrTerminator, Linkage, Ty, VRegId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    /// The link field followed when moving in this direction.
    pub fn field(self) -> CellField {
        match self {
            Direction::Forward => CellField::Next,
            Direction::Backward => CellField::Previous,
        }
    }
}

/// Handles to the emitted tape functions.
#[derive(Clone, Copy, Debug)]
pub struct Tape {
    pub alloc_cell: FuncId,
    pub move_forward: FuncId,
    pub move_backward: FuncId,
}

impl Tape {
    /// Emit `alloc_cell`, `move_forward` and `move_backward` into the module.
    /// Leaves the builder positioned inside `move_backward`.
    pub fn define(b: &mut IrBuilder) -> Self {
        let alloc_cell = define_alloc(b);
        let move_forward = define_move(b, alloc_cell, Direction::Forward);
        let move_backward = define_move(b, alloc_cell, Direction::Backward);
        Self {
            alloc_cell,
            move_forward,
            move_backward,
        }
    }

    pub fn navigator(&self, dir: Direction) -> FuncId {
        match dir {
            Direction::Forward => self.move_forward,
            Direction::Backward => self.move_backward,
        }
    }

    /// Emit a call to the cell allocator at the current insertion point.
    pub fn allocate(&self, b: &mut IrBuilder, previous: VRegId, next: VRegId) -> VRegId {
        call_cell(b, self.alloc_cell, vec![previous, next])
    }

    /// Emit a call to the navigator for `dir` at the current insertion point.
    pub fn step(&self, b: &mut IrBuilder, origin: VRegId, dir: Direction) -> VRegId {
        call_cell(b, self.navigator(dir), vec![origin])
    }
}

fn call_cell(b: &mut IrBuilder, callee: FuncId, args: Vec<VRegId>) -> VRegId {
    let dst = b.new_vreg(Ty::CellPtr);
    b.emit(IrOp::Call {
        dst: Some(dst),
        callee,
        args,
    });
    dst
}

/// `alloc_cell(previous, next)`: a fresh zero-valued cell wired to the given
/// neighbours. The neighbours themselves are not updated.
fn define_alloc(b: &mut IrBuilder) -> FuncId {
    let f = b.declare(FnSig {
        name: "alloc_cell",
        linkage: Linkage::Internal,
        params: &[Ty::CellPtr, Ty::CellPtr],
        ret: Some(Ty::CellPtr),
    });
    b.func_mut(f).always_inline = true;
    let params = b.params(f);

    b.set_func(f);
    b.set_pos(None);
    let entry = b.new_block(None);
    b.set_block(entry);

    let cell = b.new_vreg(Ty::CellPtr);
    b.emit(IrOp::AllocCell { dst: cell });
    let zero = b.const_u8(0);
    b.store(cell, CellField::Value, zero);
    b.store(cell, CellField::Previous, params[0]);
    b.store(cell, CellField::Next, params[1]);
    b.term(IrTerminator::Ret { value: Some(cell) });
    f
}

/// `move_forward(origin)` / `move_backward(origin)`: the neighbour of `origin`
/// in the given direction, allocated and linked on first visit.
fn define_move(b: &mut IrBuilder, alloc_cell: FuncId, dir: Direction) -> FuncId {
    let name = match dir {
        Direction::Forward => "move_forward",
        Direction::Backward => "move_backward",
    };
    let f = b.declare(FnSig {
        name,
        linkage: Linkage::Internal,
        params: &[Ty::CellPtr],
        ret: Some(Ty::CellPtr),
    });
    b.func_mut(f).fastcc = true;
    let origin = b.params(f)[0];

    b.set_func(f);
    b.set_pos(None);
    let entry = b.new_block(None);
    let existing = b.new_block(Some("existing".to_string()));
    let alloc = b.new_block(Some("alloc".to_string()));

    b.set_block(entry);
    let neighbour = b.load(origin, dir.field());
    let present = b.new_vreg(Ty::Bool);
    b.emit(IrOp::IsNotNull {
        dst: present,
        src: neighbour,
    });
    b.term(IrTerminator::JmpIf {
        cond: present,
        then_tgt: existing,
        else_tgt: alloc,
    });

    // Either the cell already exists.
    b.set_block(existing);
    b.term(IrTerminator::Ret { value: Some(neighbour) });

    // Or it is allocated with `origin` as its opposite neighbour.
    b.set_block(alloc);
    let null = b.const_null();
    let (previous, next) = match dir {
        Direction::Forward => (origin, null),
        Direction::Backward => (null, origin),
    };
    let fresh = call_cell(b, alloc_cell, vec![previous, next]);
    b.store(origin, dir.field(), fresh);
    b.term(IrTerminator::Ret { value: Some(fresh) });
    f
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{IrBuilder, IrOp, IrTerminator};

    #[test]
    fn navigator_links_new_cell_back_to_origin() {
        let mut b = IrBuilder::new("tape");
        let tape = Tape::define(&mut b);
        let m = b.finish();

        let fwd = m.func(tape.move_forward).unwrap();
        assert!(fwd.fastcc);
        assert_eq!(fwd.blocks.len(), 3);
        let alloc = &fwd.blocks[2];
        assert_eq!(alloc.label.as_deref(), Some("alloc"));
        let origin = fwd.params[0];
        let call_args = alloc.insns.iter().find_map(|i| match &i.op {
            IrOp::Call { callee, args, .. } if *callee == tape.alloc_cell => Some(args.clone()),
            _ => None,
        });
        // Moving forward: the new cell's `previous` is the origin.
        assert_eq!(call_args.map(|a| a[0]), Some(origin));
        assert!(alloc.insns.iter().any(|i| matches!(
            i.op,
            IrOp::StoreField { cell, field: CellField::Next, .. } if cell == origin
        )));
        assert!(matches!(fwd.blocks[1].term, IrTerminator::Ret { value: Some(_) }));
    }

    #[test]
    fn backward_navigator_uses_previous_link() {
        let mut b = IrBuilder::new("tape");
        let tape = Tape::define(&mut b);
        let m = b.finish();

        let bwd = m.func(tape.move_backward).unwrap();
        assert!(matches!(
            bwd.blocks[0].insns[0].op,
            IrOp::LoadField { field: CellField::Previous, .. }
        ));
        assert_eq!(Direction::Forward.field(), CellField::Next);
        assert!(m.func(tape.alloc_cell).unwrap().always_inline);
    }
}
