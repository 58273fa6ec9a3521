// Textual listing of a module.

use std::fmt;

use crate::ir::{CellField, IrFunction, IrInsn, IrModule, IrOp, IrTerminator, Linkage, Ty};

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Ty::U8 => "u8",
            Ty::I32 => "i32",
            Ty::Bool => "bool",
            Ty::CellPtr => "cell*",
        })
    }
}

impl fmt::Display for CellField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CellField::Value => "value",
            CellField::Previous => "previous",
            CellField::Next => "next",
        })
    }
}

impl fmt::Display for IrModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module {}", self.name)?;
        for func in &self.funcs {
            writeln!(f)?;
            write_function(f, self, func)?;
        }
        Ok(())
    }
}

fn write_function(f: &mut fmt::Formatter<'_>, m: &IrModule, func: &IrFunction) -> fmt::Result {
    let ret = func.ret.map(|t| t.to_string()).unwrap_or_else(|| "void".to_string());
    let params: Vec<String> = func
        .params
        .iter()
        .map(|p| format!("{} v{}", func.vreg_types[p.0 as usize], p.0))
        .collect();

    if func.is_declaration() {
        return writeln!(f, "declare {} @{}({})", ret, func.name, params.join(", "));
    }

    let mut attrs = String::new();
    if func.linkage == Linkage::Internal {
        attrs.push_str("internal ");
    }
    if func.fastcc {
        attrs.push_str("fastcc ");
    }
    write!(f, "define {}{} @{}({})", attrs, ret, func.name, params.join(", "))?;
    if func.always_inline {
        write!(f, " alwaysinline")?;
    }
    writeln!(f, " {{")?;

    for (bi, blk) in func.blocks.iter().enumerate() {
        match &blk.label {
            Some(l) => writeln!(f, "b{}:  ; {}", bi, l)?,
            None => writeln!(f, "b{}:", bi)?,
        }
        for insn in &blk.insns {
            write!(f, "  ")?;
            write_insn(f, m, func, insn)?;
            match insn.pos {
                Some(p) => writeln!(f, "  ; {}", p)?,
                None => writeln!(f)?,
            }
        }
        match &blk.term {
            IrTerminator::Jmp { target } => writeln!(f, "  br b{}", target.0)?,
            IrTerminator::JmpIf { cond, then_tgt, else_tgt } => {
                writeln!(f, "  br v{}, b{}, b{}", cond.0, then_tgt.0, else_tgt.0)?
            }
            IrTerminator::Ret { value: Some(v) } => writeln!(f, "  ret v{}", v.0)?,
            IrTerminator::Ret { value: None } => writeln!(f, "  ret void")?,
            IrTerminator::Unreachable => writeln!(f, "  unreachable")?,
        }
    }
    writeln!(f, "}}")
}

fn write_insn(f: &mut fmt::Formatter<'_>, m: &IrModule, func: &IrFunction, insn: &IrInsn) -> fmt::Result {
    let ty = |v: &crate::ir::VRegId| func.vreg_types[v.0 as usize];
    match &insn.op {
        IrOp::ConstU8 { dst, imm } => write!(f, "v{} = u8 {}", dst.0, imm),
        IrOp::ConstNull { dst } => write!(f, "v{} = cell* null", dst.0),
        IrOp::AddU8 { dst, a, b } => write!(f, "v{} = add u8 v{}, v{}", dst.0, a.0, b.0),
        IrOp::SubU8 { dst, a, b } => write!(f, "v{} = sub u8 v{}, v{}", dst.0, a.0, b.0),
        IrOp::NeU8 { dst, a, b } => write!(f, "v{} = icmp ne u8 v{}, v{}", dst.0, a.0, b.0),
        IrOp::IsNotNull { dst, src } => write!(f, "v{} = notnull cell* v{}", dst.0, src.0),
        IrOp::TruncI32 { dst, src } => write!(f, "v{} = trunc i32 v{} to u8", dst.0, src.0),
        IrOp::ZextU8 { dst, src } => write!(f, "v{} = zext u8 v{} to i32", dst.0, src.0),
        IrOp::AllocCell { dst } => write!(f, "v{} = alloc cell", dst.0),
        IrOp::LoadField { dst, cell, field } => {
            write!(f, "v{} = load {} v{}.{}", dst.0, field.ty(), cell.0, field)
        }
        IrOp::StoreField { cell, field, value } => {
            write!(f, "store {} v{}, v{}.{}", field.ty(), value.0, cell.0, field)
        }
        IrOp::Call { dst, callee, args } => {
            let name = m.func(*callee).map(|c| c.name.as_str()).unwrap_or("<missing>");
            let args: Vec<String> = args.iter().map(|a| format!("{} v{}", ty(a), a.0)).collect();
            match dst {
                Some(d) => write!(f, "v{} = call {} @{}({})", d.0, ty(d), name, args.join(", ")),
                None => write!(f, "call void @{}({})", name, args.join(", ")),
            }
        }
        IrOp::Phi { dst, incomings } => {
            let edges: Vec<String> = incomings.iter().map(|(b, v)| format!("[v{}, b{}]", v.0, b.0)).collect();
            write!(f, "v{} = phi {} {}", dst.0, ty(dst), edges.join(", "))
        }
    }
}
