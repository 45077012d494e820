//! First-pass flow-graph construction.
//!
//! One linear decode sweep finds instruction boundaries and block leaders
//! (branch targets, instructions after a terminator, exception-region
//! boundaries), then blocks are created in offset order with their declared
//! kinds and edges. `leave` blocks get no outgoing edges here; the importer
//! expands them when it reaches them.

use crate::decode::{decode, Opcode};
use crate::{ImportError, Result};
use ingot_data_structures::map::FxHashMap;
use ingot_ir::{
    BasicBlock, BlockFlags, BlockId, BlockKind, Body, EhRegion, TypeTag,
};
use tracing::debug;

/// Builds the initial flow graph over `code`.
///
/// `eh_regions` must be ordered innermost-first; region boundaries must fall
/// on instruction boundaries or the graph is rejected as malformed.
pub fn build_flow_graph(
    code: &[u8],
    eh_regions: Vec<EhRegion>,
    local_types: &[TypeTag],
    ret_ty: TypeTag,
    max_stack: u32,
) -> Result<Body> {
    if code.is_empty() {
        return Err(ImportError::Malformed { offset: 0, message: "empty method body".into() });
    }

    // Sweep once, keeping every decoded instruction.
    let mut instrs = Vec::new();
    let mut starts = FxHashMap::default();
    let mut offset = 0u32;
    while (offset as usize) < code.len() {
        let (op, next) = decode(code, offset)?;
        starts.insert(offset, instrs.len());
        instrs.push((offset, op, next));
        offset = next;
    }
    let code_end = offset;

    let boundary = |off: u32, what: &str| -> Result<()> {
        if off == code_end || starts.contains_key(&off) {
            Ok(())
        } else {
            Err(ImportError::Malformed {
                offset: off,
                message: format!("{what} {off:#x} is not an instruction boundary"),
            })
        }
    };

    // Leaders: offset 0, branch targets, successors of terminators, and
    // exception-region boundaries.
    let mut leaders = vec![0u32];
    for &(off, ref op, next) in &instrs {
        for target in op.targets() {
            if target >= code_end {
                return Err(ImportError::Malformed {
                    offset: off,
                    message: format!("branch target {target:#x} is out of bounds"),
                });
            }
            boundary(target, "branch target")?;
            leaders.push(target);
        }
        if op.ends_block() && next < code_end {
            leaders.push(next);
        }
    }
    for region in &eh_regions {
        for off in [
            region.try_range.start,
            region.try_range.end,
            region.handler_range.start,
            region.handler_range.end,
        ] {
            boundary(off, "exception region boundary")?;
            if off < code_end {
                leaders.push(off);
            }
        }
        if let Some(filter) = region.filter_start {
            boundary(filter, "filter start")?;
            leaders.push(filter);
        }
    }
    leaders.sort_unstable();
    leaders.dedup();

    let mut body = Body::new(local_types, ret_ty, max_stack);
    body.eh_regions = eh_regions.into_iter().collect();

    let mut block_at = FxHashMap::default();
    for (i, &start) in leaders.iter().enumerate() {
        let end = leaders.get(i + 1).copied().unwrap_or(code_end);
        let id = body.alloc_block(BasicBlock::new(start..end));
        block_at.insert(start, id);
    }
    let lookup = |off: u32| -> Result<BlockId> {
        block_at.get(&off).copied().ok_or(ImportError::Malformed {
            offset: off,
            message: "no block starts at branch target".into(),
        })
    };

    // Kinds and declared edges, from each block's final instruction.
    for i in 0..leaders.len() {
        let id = lookup(leaders[i])?;
        let end = body.block(id).range.end;
        let last = &instrs[starts[&body.block(id).range.start]..];
        let Some(&(off, ref op, _)) = last.iter().find(|&&(_, _, next)| next == end) else {
            return Err(ImportError::Malformed {
                offset: end,
                message: "block does not end on an instruction boundary".into(),
            });
        };
        let mut backward_targets = Vec::new();
        let kind = match op {
            Opcode::Br(t) => {
                backward_targets.push(*t);
                BlockKind::Goto(lookup(*t)?)
            }
            Opcode::BrTrue(t) | Opcode::BrFalse(t) => {
                backward_targets.push(*t);
                BlockKind::Cond { target: lookup(*t)? }
            }
            Opcode::Switch(ts) => {
                backward_targets.extend_from_slice(ts);
                BlockKind::Switch {
                    targets: ts.iter().map(|&t| lookup(t)).collect::<Result<_>>()?,
                }
            }
            Opcode::Leave(t) => {
                backward_targets.push(*t);
                BlockKind::Leave { target: *t }
            }
            Opcode::Ret => BlockKind::Return,
            Opcode::Throw => BlockKind::Throw,
            Opcode::EndFinally => BlockKind::FinallyRet,
            Opcode::EndFilter => BlockKind::FilterRet,
            _ => {
                if end == code_end {
                    return Err(ImportError::Malformed {
                        offset: off,
                        message: "control falls off the end of the method".into(),
                    });
                }
                BlockKind::Fallthrough
            }
        };
        for t in backward_targets {
            if t <= off {
                let target = lookup(t)?;
                body.block_mut(target).flags |= BlockFlags::BACKWARD_JUMP_TARGET;
            }
        }
        body.block_mut(id).kind = kind.clone();
        match kind {
            BlockKind::Goto(t) => body.add_edge(id, t),
            BlockKind::Cond { target } => {
                body.add_edge(id, target);
                body.add_edge(id, lookup(end)?);
            }
            BlockKind::Switch { targets } => {
                for t in targets {
                    body.add_edge(id, t);
                }
                body.add_edge(id, lookup(end)?);
            }
            BlockKind::Fallthrough => body.add_edge(id, lookup(end)?),
            // Leave edges are added during canonicalization; the rest exit
            // the method or the handler.
            _ => {}
        }
    }

    // Region membership and handler entries.
    for i in 0..body.blocks.len() {
        let id = BlockId::from_usize(i);
        let start = body.block(id).range.start;
        let try_index = body
            .eh_regions
            .iter_enumerated()
            .find_map(|(eh, r)| r.try_contains(start).then_some(eh));
        let handler_index = body.eh_regions.iter_enumerated().find_map(|(eh, r)| {
            (r.handler_contains(start) || r.filter_contains(start)).then_some(eh)
        });
        let block = body.block_mut(id);
        block.try_index = try_index;
        block.handler_index = handler_index;
    }
    for i in 0..body.eh_regions.len() {
        let region = &body.eh_regions[ingot_ir::EhIndex::from_usize(i)];
        let entries = [Some(region.handler_range.start), region.filter_start];
        for off in entries.into_iter().flatten() {
            let id = lookup(off)?;
            body.block_mut(id).flags |= BlockFlags::HANDLER_ENTRY;
        }
    }

    body.entry = lookup(0)?;
    debug!(blocks = body.blocks.len(), "built flow graph");
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingot_ir::HandlerKind;

    fn assemble(ops: &[Opcode]) -> Vec<u8> {
        let mut buf = Vec::new();
        for op in ops {
            op.encode(&mut buf);
        }
        buf
    }

    #[test]
    fn splits_at_branch_targets() {
        // 0: ldc 1; 5: brtrue 11; 10: ret is unreachable filler; 11: ret
        let code = assemble(&[
            Opcode::LdcI4(1),
            Opcode::BrTrue(11),
            Opcode::Ret,
            Opcode::Ret,
        ]);
        let body = build_flow_graph(&code, Vec::new(), &[], TypeTag::Void, 2).unwrap();
        assert_eq!(body.blocks.len(), 3);
        let b0 = &body.blocks[BlockId::from_usize(0)];
        assert!(matches!(b0.kind, BlockKind::Cond { .. }));
        assert_eq!(b0.succs.len(), 2);
        assert!(matches!(body.blocks[BlockId::from_usize(2)].kind, BlockKind::Return));
    }

    #[test]
    fn backward_target_flagged() {
        // 0: nop; 1: br 0
        let code = assemble(&[Opcode::Nop, Opcode::Br(0)]);
        let body = build_flow_graph(&code, Vec::new(), &[], TypeTag::Void, 1).unwrap();
        let entry = body.block(body.entry);
        assert!(entry.flags.contains(BlockFlags::BACKWARD_JUMP_TARGET));
    }

    #[test]
    fn handler_entry_and_region_membership() {
        // try { 0: nop; 1: leave 12 } finally { 6: nop; 7: endfinally } 8..: target
        let code = assemble(&[
            Opcode::Nop,
            Opcode::Leave(8),
            Opcode::Nop,
            Opcode::EndFinally,
            Opcode::Ret,
        ]);
        let regions = vec![EhRegion {
            kind: HandlerKind::Finally,
            try_range: 0..6,
            handler_range: 6..8,
            filter_start: None,
            enclosing_try: None,
            enclosing_handler: None,
        }];
        let body = build_flow_graph(&code, regions, &[], TypeTag::Void, 1).unwrap();
        let handler = body.block_at_offset(6).unwrap();
        assert!(body.block(handler).flags.contains(BlockFlags::HANDLER_ENTRY));
        assert!(body.block(handler).handler_index.is_some());
        assert!(body.block(body.entry).try_index.is_some());
        let leave = body.block_at_offset(0).unwrap();
        assert!(matches!(body.block(leave).kind, BlockKind::Leave { target: 8 }));
        assert!(body.block(leave).succs.is_empty());
        assert!(matches!(body.block(handler).kind, BlockKind::FinallyRet));
    }

    #[test]
    fn falling_off_the_end_is_malformed() {
        let code = assemble(&[Opcode::Nop]);
        assert!(matches!(
            build_flow_graph(&code, Vec::new(), &[], TypeTag::Void, 1),
            Err(ImportError::Malformed { .. })
        ));
    }

    #[test]
    fn misaligned_target_is_malformed() {
        let code = assemble(&[Opcode::LdcI4(0), Opcode::Pop, Opcode::Br(2)]);
        assert!(matches!(
            build_flow_graph(&code, Vec::new(), &[], TypeTag::Void, 1),
            Err(ImportError::Malformed { .. })
        ));
    }
}
