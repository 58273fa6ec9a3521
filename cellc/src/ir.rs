use crate::source::Pos;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VRegId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub u32);

/// Value types carried by virtual registers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Ty {
    U8,
    I32,
    Bool,
    /// Pointer to a cell record (may be null).
    CellPtr,
}

/// The three fields of a cell record, in layout order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CellField {
    Value,
    Previous,
    Next,
}

impl CellField {
    pub fn ty(self) -> Ty {
        match self {
            CellField::Value => Ty::U8,
            CellField::Previous | CellField::Next => Ty::CellPtr,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Linkage {
    External,
    Internal,
}

#[derive(Clone, Debug)]
pub struct IrModule {
    pub name: String,
    pub funcs: Vec<IrFunction>,
}

impl IrModule {
    pub fn func(&self, id: FuncId) -> Option<&IrFunction> {
        self.funcs.get(id.0 as usize)
    }

    pub fn find(&self, name: &str) -> Option<FuncId> {
        self.funcs
            .iter()
            .position(|f| f.name == name)
            .map(|i| FuncId(i as u32))
    }
}

#[derive(Clone, Debug)]
pub struct IrFunction {
    pub name: String,
    pub linkage: Linkage,
    /// Parameters occupy the first vregs of the function, in order.
    pub params: Vec<VRegId>,
    pub ret: Option<Ty>,
    pub always_inline: bool,
    pub fastcc: bool,
    pub entry: BlockId,
    /// Empty for declarations.
    pub blocks: Vec<IrBlock>,
    pub vreg_types: Vec<Ty>,
}

impl IrFunction {
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn param_types(&self) -> Vec<Ty> {
        self.params
            .iter()
            .map(|p| self.vreg_types[p.0 as usize])
            .collect()
    }

    pub fn block(&self, id: BlockId) -> Option<&IrBlock> {
        self.blocks.get(id.0 as usize)
    }

    pub fn vreg_ty(&self, v: VRegId) -> Option<Ty> {
        self.vreg_types.get(v.0 as usize).copied()
    }
}

#[derive(Clone, Debug)]
pub struct IrBlock {
    pub label: Option<String>,
    pub insns: Vec<IrInsn>,
    pub term: IrTerminator,
}

#[derive(Clone, Debug)]
pub struct IrInsn {
    /// Source symbol this instruction was emitted for, if any.
    pub pos: Option<Pos>,
    pub op: IrOp,
}

#[derive(Clone, Debug)]
pub enum IrOp {
    // Constants
    ConstU8 { dst: VRegId, imm: u8 },
    ConstNull { dst: VRegId },

    // Arithmetic / compare (8-bit ops wrap modulo 256)
    AddU8 { dst: VRegId, a: VRegId, b: VRegId },
    SubU8 { dst: VRegId, a: VRegId, b: VRegId },
    NeU8 { dst: VRegId, a: VRegId, b: VRegId },
    IsNotNull { dst: VRegId, src: VRegId },

    // Width conversions
    TruncI32 { dst: VRegId, src: VRegId },
    ZextU8 { dst: VRegId, src: VRegId },

    // Cell records
    AllocCell { dst: VRegId },
    LoadField { dst: VRegId, cell: VRegId, field: CellField },
    StoreField { cell: VRegId, field: CellField, value: VRegId },

    // Calls
    Call { dst: Option<VRegId>, callee: FuncId, args: Vec<VRegId> },

    // SSA join
    Phi { dst: VRegId, incomings: Vec<(BlockId, VRegId)> },
}

impl IrOp {
    /// The vreg defined by this instruction, if any.
    pub fn def(&self) -> Option<VRegId> {
        match self {
            IrOp::ConstU8 { dst, .. }
            | IrOp::ConstNull { dst }
            | IrOp::AddU8 { dst, .. }
            | IrOp::SubU8 { dst, .. }
            | IrOp::NeU8 { dst, .. }
            | IrOp::IsNotNull { dst, .. }
            | IrOp::TruncI32 { dst, .. }
            | IrOp::ZextU8 { dst, .. }
            | IrOp::AllocCell { dst }
            | IrOp::LoadField { dst, .. }
            | IrOp::Phi { dst, .. } => Some(*dst),
            IrOp::Call { dst, .. } => *dst,
            IrOp::StoreField { .. } => None,
        }
    }

    /// Vregs read by this instruction (phi incomings included).
    pub fn uses(&self) -> Vec<VRegId> {
        match self {
            IrOp::ConstU8 { .. } | IrOp::ConstNull { .. } | IrOp::AllocCell { .. } => Vec::new(),
            IrOp::AddU8 { a, b, .. } | IrOp::SubU8 { a, b, .. } | IrOp::NeU8 { a, b, .. } => vec![*a, *b],
            IrOp::IsNotNull { src, .. } | IrOp::TruncI32 { src, .. } | IrOp::ZextU8 { src, .. } => vec![*src],
            IrOp::LoadField { cell, .. } => vec![*cell],
            IrOp::StoreField { cell, value, .. } => vec![*cell, *value],
            IrOp::Call { args, .. } => args.clone(),
            IrOp::Phi { incomings, .. } => incomings.iter().map(|(_, v)| *v).collect(),
        }
    }
}

#[derive(Clone, Debug)]
pub enum IrTerminator {
    Jmp { target: BlockId },
    JmpIf { cond: VRegId, then_tgt: BlockId, else_tgt: BlockId },
    Ret { value: Option<VRegId> },
    Unreachable,
}

impl IrTerminator {
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            IrTerminator::Jmp { target } => vec![*target],
            IrTerminator::JmpIf { then_tgt, else_tgt, .. } => vec![*then_tgt, *else_tgt],
            IrTerminator::Ret { .. } | IrTerminator::Unreachable => Vec::new(),
        }
    }
}

/// Signature used when declaring a function through the builder.
pub struct FnSig<'a> {
    pub name: &'a str,
    pub linkage: Linkage,
    pub params: &'a [Ty],
    pub ret: Option<Ty>,
}

#[derive(Debug)]
pub struct IrBuilder {
    pub module: IrModule,
    func: FuncId,
    cur: BlockId,
    pos: Option<Pos>,
}

impl IrBuilder {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module: IrModule {
                name: module_name.into(),
                funcs: Vec::new(),
            },
            func: FuncId(0),
            cur: BlockId(0),
            pos: None,
        }
    }

    /// Add a function. Declarations stay empty; a definition gets its blocks
    /// through `new_block` once it is made current with `set_func`.
    pub fn declare(&mut self, sig: FnSig<'_>) -> FuncId {
        let id = FuncId(self.module.funcs.len() as u32);
        let mut f = IrFunction {
            name: sig.name.to_string(),
            linkage: sig.linkage,
            params: Vec::with_capacity(sig.params.len()),
            ret: sig.ret,
            always_inline: false,
            fastcc: false,
            entry: BlockId(0),
            blocks: Vec::new(),
            vreg_types: Vec::new(),
        };
        for &ty in sig.params {
            let p = VRegId(f.vreg_types.len() as u32);
            f.vreg_types.push(ty);
            f.params.push(p);
        }
        self.module.funcs.push(f);
        id
    }

    pub fn func_mut(&mut self, id: FuncId) -> &mut IrFunction {
        &mut self.module.funcs[id.0 as usize]
    }

    pub fn params(&self, id: FuncId) -> Vec<VRegId> {
        self.module.funcs[id.0 as usize].params.clone()
    }

    pub fn set_func(&mut self, id: FuncId) {
        self.func = id;
    }

    /// Tag subsequently emitted instructions with a source position.
    pub fn set_pos(&mut self, pos: Option<Pos>) {
        self.pos = pos;
    }

    fn f(&mut self) -> &mut IrFunction {
        &mut self.module.funcs[self.func.0 as usize]
    }

    pub fn new_block(&mut self, label: Option<String>) -> BlockId {
        let f = self.f();
        let id = BlockId(f.blocks.len() as u32);
        f.blocks.push(IrBlock {
            label,
            insns: Vec::new(),
            term: IrTerminator::Unreachable,
        });
        id
    }

    pub fn set_block(&mut self, b: BlockId) {
        self.cur = b;
    }

    pub fn cur_block(&self) -> BlockId {
        self.cur
    }

    pub fn is_open(&self) -> bool {
        matches!(
            self.module.funcs[self.func.0 as usize].blocks[self.cur.0 as usize].term,
            IrTerminator::Unreachable
        )
    }

    pub fn new_vreg(&mut self, ty: Ty) -> VRegId {
        let f = self.f();
        let id = VRegId(f.vreg_types.len() as u32);
        f.vreg_types.push(ty);
        id
    }

    pub fn emit(&mut self, op: IrOp) {
        let pos = self.pos;
        let cur = self.cur;
        let b = &mut self.f().blocks[cur.0 as usize];
        b.insns.push(IrInsn { pos, op });
    }

    pub fn term(&mut self, term: IrTerminator) {
        let cur = self.cur;
        let b = &mut self.f().blocks[cur.0 as usize];
        b.term = term;
    }

    // Convenience emitters; each returns the defined vreg.

    pub fn const_u8(&mut self, imm: u8) -> VRegId {
        let dst = self.new_vreg(Ty::U8);
        self.emit(IrOp::ConstU8 { dst, imm });
        dst
    }

    pub fn const_null(&mut self) -> VRegId {
        let dst = self.new_vreg(Ty::CellPtr);
        self.emit(IrOp::ConstNull { dst });
        dst
    }

    pub fn load(&mut self, cell: VRegId, field: CellField) -> VRegId {
        let dst = self.new_vreg(field.ty());
        self.emit(IrOp::LoadField { dst, cell, field });
        dst
    }

    pub fn store(&mut self, cell: VRegId, field: CellField, value: VRegId) {
        self.emit(IrOp::StoreField { cell, field, value });
    }

    pub fn call(&mut self, callee: FuncId, args: Vec<VRegId>) -> Option<VRegId> {
        let ret = self.module.funcs[callee.0 as usize].ret;
        let dst = ret.map(|ty| self.new_vreg(ty));
        self.emit(IrOp::Call { dst, callee, args });
        dst
    }

    /// Emit a phi with its first incoming edges. More can be appended later
    /// with `add_incoming`.
    pub fn phi(&mut self, ty: Ty, incomings: Vec<(BlockId, VRegId)>) -> VRegId {
        let dst = self.new_vreg(ty);
        self.emit(IrOp::Phi { dst, incomings });
        dst
    }

    /// Append an incoming edge to the phi defining `dst` in block `at` of the
    /// current function. Returns false if no such phi exists.
    pub fn add_incoming(&mut self, at: BlockId, dst: VRegId, from: BlockId, value: VRegId) -> bool {
        let Some(b) = self.f().blocks.get_mut(at.0 as usize) else {
            return false;
        };
        for insn in &mut b.insns {
            if let IrOp::Phi { dst: d, incomings } = &mut insn.op {
                if *d == dst {
                    incomings.push((from, value));
                    return true;
                }
            }
        }
        false
    }

    pub fn finish(self) -> IrModule {
        self.module
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declare_assigns_param_vregs_first() {
        let mut b = IrBuilder::new("m");
        let f = b.declare(FnSig {
            name: "f",
            linkage: Linkage::Internal,
            params: &[Ty::CellPtr, Ty::U8],
            ret: Some(Ty::U8),
        });
        b.set_func(f);
        let entry = b.new_block(Some("entry".to_string()));
        b.set_block(entry);
        let k = b.const_u8(3);
        assert_eq!(b.params(f), vec![VRegId(0), VRegId(1)]);
        assert_eq!(k, VRegId(2));
        assert!(b.is_open());
        b.term(IrTerminator::Ret { value: Some(k) });
        assert!(!b.is_open());
    }

    #[test]
    fn add_incoming_targets_the_named_phi() {
        let mut b = IrBuilder::new("m");
        let f = b.declare(FnSig {
            name: "f",
            linkage: Linkage::Internal,
            params: &[],
            ret: None,
        });
        b.set_func(f);
        let entry = b.new_block(None);
        let head = b.new_block(None);
        b.set_block(entry);
        let zero = b.const_u8(0);
        b.set_block(head);
        let p0 = b.phi(Ty::U8, vec![(entry, zero)]);
        let p1 = b.phi(Ty::U8, vec![(entry, zero)]);
        assert!(b.add_incoming(head, p1, head, p0));
        assert!(!b.add_incoming(entry, p1, head, p0));

        let m = b.finish();
        match &m.funcs[0].blocks[head.0 as usize].insns[1].op {
            IrOp::Phi { incomings, .. } => assert_eq!(incomings.len(), 2),
            other => panic!("expected phi, got {other:?}"),
        }
    }
}
