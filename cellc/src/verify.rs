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

use std::collections::HashSet;

use crate::error::CompileError;
use crate::ir::{BlockId, IrFunction, IrModule, IrOp, IrTerminator, Ty, VRegId};

/// Check the structural SSA invariants of every defined function.
/// A phi must have exactly one incoming edge per predecessor of its block.
pub fn verify_module(m: &IrModule) -> Result<(), CompileError> {
    for f in &m.funcs {
        if f.is_declaration() {
            continue;
        }
        verify_function(m, f)?;
    }
    Ok(())
}

fn err(f: &IrFunction, msg: impl Into<String>) -> CompileError {
    CompileError::internal(format!("fn {}: {}", f.name, msg.into()))
}

fn label(f: &IrFunction, b: BlockId) -> String {
    let lab = f
        .block(b)
        .and_then(|blk| blk.label.clone())
        .unwrap_or_else(|| "<unlabeled>".to_string());
    format!("b{}({})", b.0, lab)
}

/// Predecessor lists, indexed by block.
pub fn predecessors(f: &IrFunction) -> Result<Vec<Vec<BlockId>>, CompileError> {
    let mut preds: Vec<Vec<BlockId>> = vec![Vec::new(); f.blocks.len()];
    for (bi, blk) in f.blocks.iter().enumerate() {
        let from = BlockId(bi as u32);
        for tgt in blk.term.successors() {
            preds
                .get_mut(tgt.0 as usize)
                .ok_or_else(|| err(f, format!("{} branches to missing block b{}", label(f, from), tgt.0)))?
                .push(from);
        }
    }
    Ok(preds)
}

fn verify_function(m: &IrModule, f: &IrFunction) -> Result<(), CompileError> {
    let preds = predecessors(f)?;
    let ty_of = |v: VRegId| f.vreg_ty(v).ok_or_else(|| err(f, format!("vreg v{} has no type", v.0)));

    let mut defined: HashSet<VRegId> = f.params.iter().copied().collect();
    for (bi, blk) in f.blocks.iter().enumerate() {
        let this_block = BlockId(bi as u32);
        if matches!(blk.term, IrTerminator::Unreachable) {
            return Err(err(f, format!("{} is never terminated", label(f, this_block))));
        }

        let mut seen_non_phi = false;
        for insn in &blk.insns {
            if let Some(d) = insn.op.def() {
                if !defined.insert(d) {
                    return Err(err(f, format!("vreg v{} assigned more than once", d.0)));
                }
            }
            match &insn.op {
                IrOp::Phi { dst, incomings } => {
                    if seen_non_phi {
                        return Err(err(f, format!("phi v{} not at the start of {}", dst.0, label(f, this_block))));
                    }
                    let block_preds = &preds[bi];
                    if incomings.len() != block_preds.len() {
                        return Err(err(
                            f,
                            format!(
                                "phi v{} in {} has {} incoming edges for {} predecessors",
                                dst.0,
                                label(f, this_block),
                                incomings.len(),
                                block_preds.len()
                            ),
                        ));
                    }
                    let dst_ty = ty_of(*dst)?;
                    let mut from_seen: HashSet<BlockId> = HashSet::new();
                    for (pred, src) in incomings {
                        if !block_preds.contains(pred) || !from_seen.insert(*pred) {
                            return Err(err(
                                f,
                                format!(
                                    "phi v{} incoming from non-predecessor {} of {}",
                                    dst.0,
                                    label(f, *pred),
                                    label(f, this_block)
                                ),
                            ));
                        }
                        if ty_of(*src)? != dst_ty {
                            return Err(err(f, format!("phi v{} incoming type mismatch", dst.0)));
                        }
                    }
                }
                IrOp::Call { callee, args, .. } => {
                    seen_non_phi = true;
                    let target = m
                        .func(*callee)
                        .ok_or_else(|| err(f, format!("call to missing function #{}", callee.0)))?;
                    let arg_tys = args.iter().map(|a| ty_of(*a)).collect::<Result<Vec<Ty>, _>>()?;
                    if arg_tys != target.param_types() {
                        return Err(err(f, format!("call to {} with mismatched arguments", target.name)));
                    }
                }
                _ => seen_non_phi = true,
            }
        }

        if let IrTerminator::JmpIf { cond, .. } = &blk.term {
            if ty_of(*cond)? != Ty::Bool {
                return Err(err(f, format!("branch condition v{} is not bool", cond.0)));
            }
        }
    }

    // Every use refers to some definition in the function.
    for blk in &f.blocks {
        let term_uses = match &blk.term {
            IrTerminator::JmpIf { cond, .. } => vec![*cond],
            IrTerminator::Ret { value: Some(v) } => vec![*v],
            _ => Vec::new(),
        };
        for u in blk.insns.iter().flat_map(|i| i.op.uses()).chain(term_uses) {
            if !defined.contains(&u) {
                return Err(err(f, format!("use of undefined vreg v{}", u.0)));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FnSig, IrBuilder, Linkage};

    fn half_open_loop() -> IrModule {
        let mut b = IrBuilder::new("bad");
        let f = b.declare(FnSig {
            name: "f",
            linkage: Linkage::Internal,
            params: &[],
            ret: None,
        });
        b.set_func(f);
        let entry = b.new_block(Some("entry".to_string()));
        let head = b.new_block(Some("loop.head".to_string()));
        b.set_block(entry);
        let zero = b.const_u8(0);
        b.term(IrTerminator::Jmp { target: head });
        b.set_block(head);
        let p = b.phi(Ty::U8, vec![(entry, zero)]);
        let one = b.const_u8(1);
        let next = b.new_vreg(Ty::U8);
        b.emit(IrOp::AddU8 { dst: next, a: p, b: one });
        // Back edge without the matching incoming.
        b.term(IrTerminator::Jmp { target: head });
        b.finish()
    }

    #[test]
    fn phi_missing_back_edge_is_rejected() {
        let err = verify_module(&half_open_loop()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("has 1 incoming edges for 2 predecessors"), "msg: {msg}");
    }

    #[test]
    fn open_block_is_rejected() {
        let mut b = IrBuilder::new("bad");
        let f = b.declare(FnSig {
            name: "f",
            linkage: Linkage::Internal,
            params: &[],
            ret: None,
        });
        b.set_func(f);
        b.new_block(None);
        let msg = verify_module(&b.finish()).unwrap_err().to_string();
        assert!(msg.contains("never terminated"), "msg: {msg}");
    }
}
