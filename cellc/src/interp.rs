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

// Direct execution of a finished module.
//
// The cell heap is an arena: records are addressed by index and the
// `previous`/`next` links are stored as optional indices, so the cyclic
// neighbour structure needs no shared ownership. Nothing is ever freed.

use std::io::{ErrorKind, Read, Write};

use tracing::debug;

use crate::error::RunError;
use crate::ir::{BlockId, CellField, FuncId, IrFunction, IrModule, IrOp, IrTerminator, VRegId};
use crate::runtime::{GETCHAR, PUTCHAR};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellRef(pub u32);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CellNode {
    pub value: u8,
    pub previous: Option<CellRef>,
    pub next: Option<CellRef>,
}

#[derive(Clone, Debug, Default)]
pub struct Heap {
    cells: Vec<CellNode>,
}

impl Heap {
    pub fn alloc(&mut self) -> CellRef {
        let id = CellRef(self.cells.len() as u32);
        self.cells.push(CellNode::default());
        id
    }

    pub fn get(&self, c: CellRef) -> Option<&CellNode> {
        self.cells.get(c.0 as usize)
    }

    fn get_mut(&mut self, c: CellRef) -> Option<&mut CellNode> {
        self.cells.get_mut(c.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Follow `offset` links from `origin` (`next` for positive offsets,
    /// `previous` for negative ones). `None` if the walk leaves the tape.
    #[cfg(test)]
    pub fn walk(&self, origin: CellRef, offset: isize) -> Option<CellRef> {
        let mut at = origin;
        self.get(at)?;
        for _ in 0..offset.unsigned_abs() {
            let node = self.get(at)?;
            at = if offset > 0 { node.next? } else { node.previous? };
        }
        Some(at)
    }

    /// Every `next` link must be mirrored by the neighbour's `previous` link,
    /// and the other way round.
    #[cfg(test)]
    pub fn check_links(&self) -> Result<(), String> {
        for (i, node) in self.cells.iter().enumerate() {
            let here = CellRef(i as u32);
            if let Some(n) = node.next {
                let back = self.get(n).and_then(|c| c.previous);
                if back != Some(here) {
                    return Err(format!("cell {i}: next={} but its previous={back:?}", n.0));
                }
            }
            if let Some(p) = node.previous {
                let fwd = self.get(p).and_then(|c| c.next);
                if fwd != Some(here) {
                    return Err(format!("cell {i}: previous={} but its next={fwd:?}", p.0));
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Value {
    U8(u8),
    I32(i32),
    Bool(bool),
    Cell(Option<CellRef>),
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Config {
    /// Maximum number of executed instructions and terminators.
    pub fuel: Option<u64>,
}

pub struct Machine<'m, R, W> {
    module: &'m IrModule,
    heap: Heap,
    input: R,
    output: W,
    config: Config,
    steps: u64,
}

fn malformed(f: &IrFunction, message: impl Into<String>) -> RunError {
    RunError::Malformed {
        func: f.name.clone(),
        message: message.into(),
    }
}

fn read(f: &IrFunction, regs: &[Option<Value>], v: VRegId) -> Result<Value, RunError> {
    regs.get(v.0 as usize)
        .copied()
        .flatten()
        .ok_or_else(|| malformed(f, format!("v{} read before assignment", v.0)))
}

fn read_u8(f: &IrFunction, regs: &[Option<Value>], v: VRegId) -> Result<u8, RunError> {
    match read(f, regs, v)? {
        Value::U8(x) => Ok(x),
        other => Err(malformed(f, format!("v{} is {other:?}, expected u8", v.0))),
    }
}

fn read_cell(f: &IrFunction, regs: &[Option<Value>], v: VRegId) -> Result<Option<CellRef>, RunError> {
    match read(f, regs, v)? {
        Value::Cell(c) => Ok(c),
        other => Err(malformed(f, format!("v{} is {other:?}, expected cell*", v.0))),
    }
}

fn write(f: &IrFunction, regs: &mut [Option<Value>], v: VRegId, value: Value) -> Result<(), RunError> {
    let slot = regs
        .get_mut(v.0 as usize)
        .ok_or_else(|| malformed(f, format!("v{} out of range", v.0)))?;
    *slot = Some(value);
    Ok(())
}

impl<'m, R: Read, W: Write> Machine<'m, R, W> {
    pub fn new(module: &'m IrModule, input: R, output: W, config: Config) -> Self {
        Self {
            module,
            heap: Heap::default(),
            input,
            output,
            config,
            steps: 0,
        }
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    #[cfg(test)]
    pub fn into_output(self) -> W {
        self.output
    }

    /// Run the entry function to completion.
    pub fn run(&mut self, entry: &str) -> Result<(), RunError> {
        debug!(entry, fuel = ?self.config.fuel, "run start");
        self.call(entry, &[])?;
        self.output.flush()?;
        debug!(steps = self.steps, cells = self.heap.len(), "run complete");
        Ok(())
    }

    pub fn call(&mut self, name: &str, args: &[Value]) -> Result<Option<Value>, RunError> {
        let id = self
            .module
            .find(name)
            .ok_or_else(|| RunError::MissingFunction(name.to_string()))?;
        self.invoke(id, args.to_vec())
    }

    fn tick(&mut self) -> Result<(), RunError> {
        self.steps += 1;
        if let Some(limit) = self.config.fuel {
            if self.steps > limit {
                return Err(RunError::OutOfFuel(limit));
            }
        }
        Ok(())
    }

    fn invoke(&mut self, id: FuncId, args: Vec<Value>) -> Result<Option<Value>, RunError> {
        let module = self.module;
        let f = module
            .func(id)
            .ok_or_else(|| RunError::MissingFunction(format!("#{}", id.0)))?;
        if f.is_declaration() {
            return self.external(f, &args);
        }
        if args.len() != f.params.len() {
            return Err(malformed(f, format!("called with {} arguments", args.len())));
        }

        let mut regs: Vec<Option<Value>> = vec![None; f.vreg_types.len()];
        for (p, a) in f.params.iter().zip(args) {
            write(f, &mut regs, *p, a)?;
        }

        let mut prev: Option<BlockId> = None;
        let mut cur = f.entry;
        loop {
            let blk = f
                .block(cur)
                .ok_or_else(|| malformed(f, format!("missing block b{}", cur.0)))?;

            // Phis read their inputs before any of them is assigned.
            let mut pending: Vec<(VRegId, Value)> = Vec::new();
            for insn in &blk.insns {
                let IrOp::Phi { dst, incomings } = &insn.op else {
                    break;
                };
                let from = prev.ok_or_else(|| malformed(f, "phi in entry block"))?;
                let (_, src) = incomings
                    .iter()
                    .find(|(b, _)| *b == from)
                    .ok_or_else(|| malformed(f, format!("phi v{} has no edge from b{}", dst.0, from.0)))?;
                pending.push((*dst, read(f, &regs, *src)?));
            }
            let body = &blk.insns[pending.len()..];
            for (d, v) in pending {
                write(f, &mut regs, d, v)?;
            }

            for insn in body {
                self.tick()?;
                self.exec(f, &mut regs, &insn.op)?;
            }

            self.tick()?;
            match &blk.term {
                IrTerminator::Jmp { target } => {
                    prev = Some(cur);
                    cur = *target;
                }
                IrTerminator::JmpIf { cond, then_tgt, else_tgt } => {
                    let taken = match read(f, &regs, *cond)? {
                        Value::Bool(b) => b,
                        other => return Err(malformed(f, format!("branch on {other:?}"))),
                    };
                    prev = Some(cur);
                    cur = if taken { *then_tgt } else { *else_tgt };
                }
                IrTerminator::Ret { value } => {
                    return value.map(|v| read(f, &regs, v)).transpose();
                }
                IrTerminator::Unreachable => {
                    return Err(malformed(f, format!("reached open block b{}", cur.0)));
                }
            }
        }
    }

    fn exec(&mut self, f: &IrFunction, regs: &mut [Option<Value>], op: &IrOp) -> Result<(), RunError> {
        match op {
            IrOp::ConstU8 { dst, imm } => write(f, regs, *dst, Value::U8(*imm)),
            IrOp::ConstNull { dst } => write(f, regs, *dst, Value::Cell(None)),
            IrOp::AddU8 { dst, a, b } => {
                let v = read_u8(f, regs, *a)?.wrapping_add(read_u8(f, regs, *b)?);
                write(f, regs, *dst, Value::U8(v))
            }
            IrOp::SubU8 { dst, a, b } => {
                let v = read_u8(f, regs, *a)?.wrapping_sub(read_u8(f, regs, *b)?);
                write(f, regs, *dst, Value::U8(v))
            }
            IrOp::NeU8 { dst, a, b } => {
                let v = read_u8(f, regs, *a)? != read_u8(f, regs, *b)?;
                write(f, regs, *dst, Value::Bool(v))
            }
            IrOp::IsNotNull { dst, src } => {
                let v = read_cell(f, regs, *src)?.is_some();
                write(f, regs, *dst, Value::Bool(v))
            }
            IrOp::TruncI32 { dst, src } => match read(f, regs, *src)? {
                Value::I32(x) => write(f, regs, *dst, Value::U8(x as u8)),
                other => Err(malformed(f, format!("trunc of {other:?}"))),
            },
            IrOp::ZextU8 { dst, src } => {
                let v = read_u8(f, regs, *src)?;
                write(f, regs, *dst, Value::I32(i32::from(v)))
            }
            IrOp::AllocCell { dst } => {
                let c = self.heap.alloc();
                write(f, regs, *dst, Value::Cell(Some(c)))
            }
            IrOp::LoadField { dst, cell, field } => {
                let node = self.deref(f, regs, *cell)?;
                let v = match field {
                    CellField::Value => Value::U8(node.value),
                    CellField::Previous => Value::Cell(node.previous),
                    CellField::Next => Value::Cell(node.next),
                };
                write(f, regs, *dst, v)
            }
            IrOp::StoreField { cell, field, value } => {
                let c = read_cell(f, regs, *cell)?.ok_or_else(|| RunError::NullCell { func: f.name.clone() })?;
                let v = read(f, regs, *value)?;
                let node = self
                    .heap
                    .get_mut(c)
                    .ok_or_else(|| malformed(f, format!("dangling cell {}", c.0)))?;
                match (field, v) {
                    (CellField::Value, Value::U8(x)) => node.value = x,
                    (CellField::Previous, Value::Cell(p)) => node.previous = p,
                    (CellField::Next, Value::Cell(n)) => node.next = n,
                    (field, v) => return Err(malformed(f, format!("store of {v:?} into {field:?}"))),
                }
                Ok(())
            }
            IrOp::Call { dst, callee, args } => {
                let vals = args.iter().map(|a| read(f, regs, *a)).collect::<Result<Vec<_>, _>>()?;
                let ret = self.invoke(*callee, vals)?;
                match (dst, ret) {
                    (Some(d), Some(v)) => write(f, regs, *d, v),
                    (None, _) => Ok(()),
                    (Some(d), None) => Err(malformed(f, format!("call result v{} never produced", d.0))),
                }
            }
            IrOp::Phi { dst, .. } => Err(malformed(f, format!("phi v{} after non-phi instruction", dst.0))),
        }
    }

    fn deref(&self, f: &IrFunction, regs: &[Option<Value>], cell: VRegId) -> Result<CellNode, RunError> {
        let c = read_cell(f, regs, cell)?.ok_or_else(|| RunError::NullCell { func: f.name.clone() })?;
        self.heap
            .get(c)
            .copied()
            .ok_or_else(|| malformed(f, format!("dangling cell {}", c.0)))
    }

    /// Host bindings for the C library calls the program declares.
    fn external(&mut self, f: &IrFunction, args: &[Value]) -> Result<Option<Value>, RunError> {
        match (f.name.as_str(), args) {
            (GETCHAR, []) => {
                let mut b = [0u8; 1];
                let c = loop {
                    match self.input.read(&mut b) {
                        Ok(0) => break -1,
                        Ok(_) => break i32::from(b[0]),
                        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                        Err(e) => return Err(e.into()),
                    }
                };
                Ok(Some(Value::I32(c)))
            }
            (PUTCHAR, [Value::I32(c)]) => {
                self.output.write_all(&[*c as u8])?;
                Ok(Some(Value::I32(*c)))
            }
            _ => Err(RunError::UnboundExternal(f.name.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{compile_str, ENTRY_NAME};

    fn run(src: &str, input: &[u8]) -> (Vec<u8>, Heap) {
        let m = compile_str(src).unwrap();
        let mut vm = Machine::new(&m, input, Vec::new(), Config { fuel: Some(1_000_000) });
        vm.run(ENTRY_NAME).unwrap();
        let heap = vm.heap().clone();
        (vm.into_output(), heap)
    }

    #[test]
    fn echo_copies_input_bytes() {
        let (out, _) = run(",.,.,.", b"abc");
        assert_eq!(out, b"abc");
    }

    #[test]
    fn read_at_end_of_input_yields_255() {
        let (out, _) = run(",.", b"");
        assert_eq!(out, [255]);
    }

    #[test]
    fn heap_links_stay_mirrored() {
        let (_, heap) = run(">>><<<<<>>>>>>+[<]", b"");
        assert_eq!(heap.len(), 7);
        heap.check_links().unwrap();
        assert_eq!(heap.walk(CellRef(0), -2).map(|c| heap.get(c).unwrap().next), Some(heap.walk(CellRef(0), -1)));
    }

    #[test]
    fn runaway_program_runs_out_of_fuel() {
        let m = compile_str("+[]").unwrap();
        let mut vm = Machine::new(&m, &b""[..], Vec::new(), Config { fuel: Some(500) });
        match vm.run(ENTRY_NAME) {
            Err(RunError::OutOfFuel(500)) => {}
            other => panic!("expected out of fuel, got {other:?}"),
        }
    }

    #[test]
    fn navigator_revisits_the_same_cell() {
        let m = compile_str("").unwrap();
        let mut vm = Machine::new(&m, &b""[..], Vec::new(), Config::default());
        let origin = vm
            .call("alloc_cell", &[Value::Cell(None), Value::Cell(None)])
            .unwrap()
            .unwrap();
        let right = vm.call("move_forward", &[origin]).unwrap().unwrap();
        let back = vm.call("move_backward", &[right]).unwrap().unwrap();
        let again = vm.call("move_forward", &[origin]).unwrap().unwrap();
        assert_eq!(back, origin);
        assert_eq!(again, right);
        assert_eq!(vm.heap().len(), 2);
        vm.heap().check_links().unwrap();
    }
}
