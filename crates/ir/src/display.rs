//! Textual display of bodies, blocks and expression trees.

use crate::{BlockFlags, BlockId, BlockKind, Body, ExprId, ExprKind};
use std::fmt::{self, Write};

/// Renders a whole body, one block per paragraph.
#[must_use]
pub fn body_to_string(body: &Body) -> String {
    let mut out = String::new();
    for (id, block) in body.blocks.iter_enumerated() {
        if block.flags.contains(BlockFlags::REMOVED) {
            continue;
        }
        let _ = write_block(&mut out, body, id);
        out.push('\n');
    }
    out
}

fn write_block(out: &mut String, body: &Body, id: BlockId) -> fmt::Result {
    let block = body.block(id);
    write!(out, "bb{}", id.index())?;
    if !block.range.is_empty() {
        write!(out, " [{}..{})", block.range.start, block.range.end)?;
    }
    write!(out, " {}", block.kind.mnemonic())?;
    match &block.kind {
        BlockKind::Goto(t) | BlockKind::CatchRet(t) => write!(out, " bb{}", t.index())?,
        BlockKind::Cond { target } => write!(out, " bb{}", target.index())?,
        BlockKind::Switch { targets } => {
            for (i, t) in targets.iter().enumerate() {
                let sep = if i == 0 { "" } else { "," };
                write!(out, "{sep} {i} => bb{}", t.index())?;
            }
        }
        BlockKind::CallFinally { handler, ret } => {
            write!(out, " bb{} ret bb{}", handler.index(), ret.index())?;
        }
        BlockKind::CallFinallyRet { cont } => write!(out, " -> bb{}", cont.index())?,
        BlockKind::Leave { target } => write!(out, " @{target}")?,
        _ => {}
    }
    writeln!(out, ":")?;
    for &stmt in &block.stmts {
        write!(out, "    ")?;
        write_expr(out, body, stmt)?;
        writeln!(out)?;
    }
    Ok(())
}

/// Renders one expression tree in prefix form.
pub fn write_expr(out: &mut impl Write, body: &Body, id: ExprId) -> fmt::Result {
    let expr = body.expr(id);
    match &expr.kind {
        ExprKind::IntCon(v) => write!(out, "{v}.{}", expr.ty),
        ExprKind::FloatCon(v) => write!(out, "{v}.{}", expr.ty),
        ExprKind::Null => write!(out, "null"),
        ExprKind::LocalLoad(l) => write!(out, "loc{}", l.index()),
        ExprKind::LocalAddr(l) => write!(out, "&loc{}", l.index()),
        ExprKind::LocalStore(l, v) => {
            write!(out, "loc{} = ", l.index())?;
            write_expr(out, body, *v)
        }
        ExprKind::Unary(op, a) => unary(out, body, &op.to_string(), *a),
        ExprKind::Binary(op, a, b) => binary(out, body, &op.to_string(), *a, *b),
        ExprKind::Compare(op, a, b) => binary(out, body, &format!("cmp.{op}"), *a, *b),
        ExprKind::Convert(a) => unary(out, body, &format!("conv.{}", expr.ty), *a),
        ExprKind::LoadInd(a) => unary(out, body, &format!("ldind.{}", expr.ty), *a),
        ExprKind::StoreInd(a, v) => binary(out, body, "stind", *a, *v),
        ExprKind::Call { token, args } => {
            write!(out, "call #{token:#x}(")?;
            for (i, &arg) in args.iter().enumerate() {
                if i > 0 {
                    write!(out, ", ")?;
                }
                write_expr(out, body, arg)?;
            }
            write!(out, ")")
        }
        ExprKind::CatchArg => write!(out, "catch.arg"),
        ExprKind::EndCatch => write!(out, "end.catch"),
        ExprKind::Comma(a, b) => binary(out, body, "comma", *a, *b),
        ExprKind::JumpTrue(a) => unary(out, body, "jmptrue", *a),
        ExprKind::SwitchSel(a) => unary(out, body, "switch", *a),
        ExprKind::EndFilter(a) => unary(out, body, "end.filter", *a),
        ExprKind::Return(None) => write!(out, "ret"),
        ExprKind::Return(Some(v)) => unary(out, body, "ret", *v),
        ExprKind::Throw(a) => unary(out, body, "throw", *a),
        ExprKind::Nop => write!(out, "nop"),
    }
}

fn unary(out: &mut impl Write, body: &Body, name: &str, a: ExprId) -> fmt::Result {
    write!(out, "{name}(")?;
    write_expr(out, body, a)?;
    write!(out, ")")
}

fn binary(out: &mut impl Write, body: &Body, name: &str, a: ExprId, b: ExprId) -> fmt::Result {
    write!(out, "{name}(")?;
    write_expr(out, body, a)?;
    write!(out, ", ")?;
    write_expr(out, body, b)?;
    write!(out, ")")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BasicBlock, BinOp, BlockKind, TypeTag};

    #[test]
    fn renders_statements() {
        let mut body = Body::new(&[TypeTag::Int32], TypeTag::Void, 8);
        let entry = body.alloc_block(BasicBlock::new(0..5));
        body.entry = entry;

        let a = body.alloc_expr(ExprKind::LocalLoad(crate::LocalId::from_usize(0)), TypeTag::Int32);
        let b = body.alloc_expr(ExprKind::IntCon(2), TypeTag::Int32);
        let sum = body.alloc_expr(ExprKind::Binary(BinOp::Add, a, b), TypeTag::Int32);
        let tmp = body.alloc_temp(TypeTag::Int32);
        let store = body.alloc_expr(ExprKind::LocalStore(tmp, sum), TypeTag::Void);
        body.block_mut(entry).stmts.push(store);
        body.block_mut(entry).kind = BlockKind::Return;

        let rendered = body_to_string(&body);
        assert!(rendered.contains("bb0 [0..5) ret:"), "{rendered}");
        assert!(rendered.contains("loc1 = add(loc0, 2.i32)"), "{rendered}");
    }
}
