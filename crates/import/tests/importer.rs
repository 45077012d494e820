//! End-to-end importation tests: assemble a method, build its flow graph,
//! run the importer, inspect the resulting IR.

use ingot_import::{
    build_flow_graph, CallSig, ImportError, ImportOptions, Importer, MapResolver, Opcode,
};
use ingot_ir::{
    BinOp, BlockFlags, BlockId, BlockKind, Body, EhRegion, ExprKind, HandlerKind, TypeTag,
};

fn assemble(ops: &[Opcode]) -> Vec<u8> {
    let mut buf = Vec::new();
    for op in ops {
        op.encode(&mut buf);
    }
    buf
}

fn import_with(
    ops: &[Opcode],
    regions: Vec<EhRegion>,
    locals: &[TypeTag],
    ret_ty: TypeTag,
    max_stack: u32,
    resolver: &MapResolver,
) -> Result<Body, ImportError> {
    let code = assemble(ops);
    let body = build_flow_graph(&code, regions, locals, ret_ty, max_stack)?;
    Importer::new(body, &code, resolver, ImportOptions::default()).import()
}

fn import(
    ops: &[Opcode],
    regions: Vec<EhRegion>,
    locals: &[TypeTag],
    max_stack: u32,
) -> Result<Body, ImportError> {
    import_with(ops, regions, locals, TypeTag::Void, max_stack, &MapResolver::default())
}

fn region(kind: HandlerKind, try_range: std::ops::Range<u32>, handler_range: std::ops::Range<u32>) -> EhRegion {
    EhRegion {
        kind,
        try_range,
        handler_range,
        filter_start: None,
        enclosing_try: None,
        enclosing_handler: None,
    }
}

#[test]
fn straight_line_store() {
    // loc0 = 1 + 2; return
    let body = import(
        &[
            Opcode::LdcI4(1),
            Opcode::LdcI4(2),
            Opcode::Bin(BinOp::Add),
            Opcode::StLoc(0),
            Opcode::Ret,
        ],
        Vec::new(),
        &[TypeTag::Int32],
        2,
    )
    .unwrap();
    let entry = body.block(body.entry);
    assert!(entry.is_imported());
    assert_eq!(entry.stmts.len(), 2);
    let ExprKind::LocalStore(local, value) = body.expr(entry.stmts[0]).kind else {
        panic!("expected a store")
    };
    assert_eq!(local.index(), 0);
    assert!(matches!(body.expr(value).kind, ExprKind::Binary(BinOp::Add, ..)));
    assert!(matches!(body.expr(entry.stmts[1]).kind, ExprKind::Return(None)));
}

#[test]
fn join_spills_through_shared_temps() {
    // if (loc0) push 20 else push 10; loc0 = merged; return
    let body = import(
        &[
            Opcode::LdLoc(0),   // 0
            Opcode::BrTrue(18), // 3
            Opcode::LdcI4(10),  // 8
            Opcode::Br(23),     // 13
            Opcode::LdcI4(20),  // 18
            Opcode::StLoc(0),   // 23
            Opcode::Ret,        // 26
        ],
        Vec::new(),
        &[TypeTag::Int32],
        2,
    )
    .unwrap();

    let b1 = body.block_at_offset(8).unwrap();
    let b2 = body.block_at_offset(18).unwrap();
    let join = body.block_at_offset(23).unwrap();
    let base = body.block(join).temps_in.expect("join loads shared temps");
    assert_eq!(body.block(b1).temps_out, Some(base));
    assert_eq!(body.block(b2).temps_out, Some(base));
    assert!(body.local(base).is_temp);
    assert_eq!(body.local(base).ty, TypeTag::Int32);

    let state = body.block(join).entry_state.as_ref().unwrap();
    assert_eq!(state.depth(), 1);
    assert!(matches!(body.expr(state.entries()[0].expr).kind, ExprKind::LocalLoad(l) if l == base));

    // Both arms end in a store of the shared temp.
    for arm in [b1, b2] {
        let last = *body.block(arm).stmts.last().unwrap();
        assert!(matches!(body.expr(last).kind, ExprKind::LocalStore(l, _) if l == base));
    }
}

#[test]
fn type_widening_converges() {
    // One arm pushes Int32, the other NativeInt; the shared temp widens and
    // everything downstream sees NativeInt.
    let body = import(
        &[
            Opcode::LdLoc(0),                 // 0
            Opcode::BrTrue(18),               // 3
            Opcode::LdcI4(10),                // 8
            Opcode::Br(25),                   // 13
            Opcode::LdcI4(2),                 // 18
            Opcode::Conv(TypeTag::NativeInt), // 23
            Opcode::StLoc(1),                 // 25
            Opcode::Ret,                      // 28
        ],
        Vec::new(),
        &[TypeTag::Int32, TypeTag::NativeInt],
        2,
    )
    .unwrap();

    let join = body.block_at_offset(25).unwrap();
    let base = body.block(join).temps_in.unwrap();
    assert_eq!(body.local(base).ty, TypeTag::NativeInt);
    let state = body.block(join).entry_state.as_ref().unwrap();
    assert_eq!(state.entries()[0].ty, TypeTag::NativeInt);

    // The narrow arm stores through a widening conversion.
    let narrow = body.block_at_offset(8).unwrap();
    let last = *body.block(narrow).stmts.last().unwrap();
    let ExprKind::LocalStore(l, v) = body.expr(last).kind else { panic!("expected a store") };
    assert_eq!(l, base);
    assert!(matches!(body.expr(v).kind, ExprKind::Convert(_)));
}

#[test]
fn value_carried_around_a_loop_converges() {
    // A block that feeds its own entry widens the shared temp once, is
    // retranslated under the widened type, and importation then stops.
    let body = import(
        &[
            Opcode::LdcI4(1),                 // 0
            Opcode::Br(10),                   // 5
            Opcode::Conv(TypeTag::NativeInt), // 10
            Opcode::Dup,                      // 12
            Opcode::BrTrue(10),               // 13
            Opcode::Pop,                      // 18
            Opcode::Ret,                      // 19
        ],
        Vec::new(),
        &[],
        2,
    )
    .unwrap();

    let head = body.block_at_offset(10).unwrap();
    assert!(body.block(head).succs.contains(&head));
    let base = body.block(head).temps_in.expect("loop head loads a shared temp");
    assert_eq!(body.block(head).temps_out, Some(base));
    assert_eq!(body.local(base).ty, TypeTag::NativeInt);

    // The entry state carried around the back edge agrees with the temp.
    let state = body.block(head).entry_state.as_ref().unwrap();
    assert_eq!(state.depth(), 1);
    assert_eq!(state.entries()[0].ty, TypeTag::NativeInt);
    assert!(body.block(head).is_imported());

    // The block before the loop stores through a widening conversion.
    let last = *body.block(body.entry).stmts.last().unwrap();
    let ExprKind::LocalStore(l, v) = body.expr(last).kind else { panic!("expected a store") };
    assert_eq!(l, base);
    assert!(matches!(body.expr(v).kind, ExprKind::Convert(_)));
}

#[test]
fn entry_depth_disagreement_is_fatal() {
    // The fallthrough arm reaches offset 13 with one value, the branch arm
    // with none.
    let err = import(
        &[
            Opcode::LdLoc(0),   // 0
            Opcode::BrTrue(13), // 3
            Opcode::LdcI4(1),   // 8
            Opcode::Ret,        // 13
        ],
        Vec::new(),
        &[TypeTag::Int32],
        2,
    )
    .unwrap_err();
    assert!(matches!(err, ImportError::DepthMismatch { .. }));
}

#[test]
fn null_byref_unifies_with_address() {
    // A constant 0 merging with ldloca widens the temp to ByRef.
    let body = import(
        &[
            Opcode::LdLoc(0),   // 0
            Opcode::BrTrue(18), // 3
            Opcode::LdcI4(0),   // 8
            Opcode::Br(21),     // 13
            Opcode::LdLocA(0),  // 18
            Opcode::Pop,        // 21
            Opcode::Ret,        // 22
        ],
        Vec::new(),
        &[TypeTag::Int32],
        2,
    )
    .unwrap();
    let join = body.block_at_offset(21).unwrap();
    let base = body.block(join).temps_in.unwrap();
    assert_eq!(body.local(base).ty, TypeTag::ByRef);
}

#[test]
fn nonzero_int_against_byref_is_fatal() {
    let err = import(
        &[
            Opcode::LdLoc(0),   // 0
            Opcode::BrTrue(18), // 3
            Opcode::LdcI4(5),   // 8
            Opcode::Br(21),     // 13
            Opcode::LdLocA(0),  // 18
            Opcode::Pop,        // 21
            Opcode::Ret,        // 22
        ],
        Vec::new(),
        &[TypeTag::Int32],
        2,
    )
    .unwrap_err();
    assert!(matches!(err, ImportError::TypeMismatch { .. }));
}

#[test]
fn constant_branch_folds_and_drops_edge() {
    let body = import(
        &[
            Opcode::LdcI4(0),   // 0
            Opcode::BrTrue(11), // 5
            Opcode::Ret,        // 10
            Opcode::Ret,        // 11
        ],
        Vec::new(),
        &[],
        1,
    )
    .unwrap();
    let entry = body.block(body.entry);
    assert!(matches!(entry.kind, BlockKind::Fallthrough));
    assert_eq!(entry.succs.len(), 1);
    assert_eq!(entry.succs[0], body.block_at_offset(10).unwrap());
    // The untaken side is never translated.
    let dead = body.block_at_offset(11).unwrap();
    assert!(!body.block(dead).is_imported());
}

#[test]
fn leave_outside_any_region_is_a_goto() {
    let body = import(
        &[Opcode::Leave(5), Opcode::Ret],
        Vec::new(),
        &[],
        1,
    )
    .unwrap();
    assert_eq!(body.blocks.len(), 2);
    let entry = body.block(body.entry);
    assert!(matches!(entry.kind, BlockKind::Goto(t) if t == body.block_at_offset(5).unwrap()));
    assert!(entry.leave_blocks.is_empty());
}

#[test]
fn nested_finallys_chain_innermost_first() {
    // try { try { leave L } finally {} } finally {}  L: ret
    let body = import(
        &[
            Opcode::Leave(9),   // 0
            Opcode::Nop,        // 5: inner finally
            Opcode::EndFinally, // 6
            Opcode::Nop,        // 7: outer finally
            Opcode::EndFinally, // 8
            Opcode::Ret,        // 9
        ],
        vec![
            region(HandlerKind::Finally, 0..5, 5..7),
            region(HandlerKind::Finally, 0..5, 7..9),
        ],
        &[],
        1,
    )
    .unwrap();

    let leave = body.block(body.entry);
    let BlockKind::CallFinally { handler: h1, ret: r1 } = leave.kind else {
        panic!("expected callfinally, got {:?}", leave.kind)
    };
    assert_eq!(body.block(h1).range.start, 5);
    let BlockKind::CallFinallyRet { cont } = body.block(r1).kind else {
        panic!("expected callfinallyret")
    };
    let BlockKind::CallFinally { handler: h2, ret: r2 } = body.block(cont).kind else {
        panic!("expected a second callfinally")
    };
    assert_eq!(body.block(h2).range.start, 7);
    let BlockKind::CallFinallyRet { cont: done } = body.block(r2).kind else {
        panic!("expected callfinallyret")
    };
    assert_eq!(done, body.block_at_offset(9).unwrap());

    // Synthetic blocks are internal and never queued for translation.
    for id in [r1, cont, r2] {
        assert!(body.block(id).flags.contains(BlockFlags::INTERNAL));
        assert!(body.block(id).is_imported());
    }
    // Both finally bodies were translated.
    assert!(matches!(body.block(h1).kind, BlockKind::FinallyRet));
    assert!(body.block(body.block_at_offset(7).unwrap()).is_imported());
}

#[test]
fn catch_exits_coalesce_into_one_cleanup() {
    // leave crossing three nested catch handlers runs all cleanups as a
    // single combined statement and exits through a catchret.
    let body = import(
        &[
            Opcode::Ret,       // 0
            Opcode::LdNull,    // 1: middle try
            Opcode::Throw,     // 2
            Opcode::LdNull,    // 3: inner try
            Opcode::Throw,     // 4
            Opcode::Leave(10), // 5: innermost catch handler
            Opcode::Ret,       // 10
        ],
        vec![
            region(HandlerKind::Catch(0), 3..5, 5..10),
            region(HandlerKind::Catch(0), 1..3, 3..10),
            region(HandlerKind::Catch(0), 0..1, 1..10),
        ],
        &[],
        2,
    )
    .unwrap();

    let leave = body.block_at_offset(5).unwrap();
    let target = body.block_at_offset(10).unwrap();
    assert!(matches!(body.block(leave).kind, BlockKind::CatchRet(t) if t == target));
    assert_eq!(body.block(leave).stmts.len(), 1);
    let ExprKind::Comma(ab, c) = body.expr(body.block(leave).stmts[0]).kind else {
        panic!("expected coalesced cleanups")
    };
    let ExprKind::Comma(a, b) = body.expr(ab).kind else {
        panic!("expected a nested comma")
    };
    for e in [a, b, c] {
        assert!(matches!(body.expr(e).kind, ExprKind::EndCatch));
    }
}

#[test]
fn leave_out_of_a_finally_is_rejected() {
    let err = import(
        &[
            Opcode::Leave(11),  // 0: try
            Opcode::Leave(11),  // 5: finally body, illegal
            Opcode::EndFinally, // 10
            Opcode::Ret,        // 11
        ],
        vec![region(HandlerKind::Finally, 0..5, 5..11)],
        &[],
        1,
    )
    .unwrap_err();
    assert_eq!(err, ImportError::LeaveFromHandler { offset: 5 });
}

#[test]
fn leave_out_of_a_fault_is_rejected() {
    let err = import(
        &[
            Opcode::Leave(11),  // 0: try
            Opcode::Leave(11),  // 5: fault body, illegal
            Opcode::EndFinally, // 10
            Opcode::Ret,        // 11
        ],
        vec![region(HandlerKind::Fault, 0..5, 5..11)],
        &[],
        1,
    )
    .unwrap_err();
    assert_eq!(err, ImportError::LeaveFromHandler { offset: 5 });
}

#[test]
fn chain_steps_over_a_crossed_catch_try() {
    // A leave exiting a finally-protected try nested inside a catch-protected
    // try gets an intermediate hop outside the catch region.
    let body = import(
        &[
            Opcode::Leave(12),  // 0: inside both trys
            Opcode::Nop,        // 5: finally
            Opcode::EndFinally, // 6
            Opcode::Leave(12),  // 7: catch handler
            Opcode::Ret,        // 12
        ],
        vec![
            region(HandlerKind::Finally, 0..5, 5..7),
            region(HandlerKind::Catch(0), 0..7, 7..12),
        ],
        &[],
        1,
    )
    .unwrap();

    let entry = body.block(body.entry);
    let BlockKind::CallFinally { handler, ret } = entry.kind else {
        panic!("expected callfinally")
    };
    assert_eq!(body.block(handler).range.start, 5);
    let BlockKind::CallFinallyRet { cont } = body.block(ret).kind else {
        panic!("expected callfinallyret")
    };
    let mid = body.block(cont);
    assert!(mid.flags.contains(BlockFlags::INTERNAL));
    assert!(matches!(mid.kind, BlockKind::Goto(t) if t == body.block_at_offset(12).unwrap()));
}

#[test]
fn handler_entry_sees_the_exception_object() {
    let body = import(
        &[
            Opcode::Ret,      // 0: try
            Opcode::StLoc(0), // 1: catch handler stores the exception
            Opcode::Leave(9), // 4
            Opcode::Ret,      // 9
        ],
        vec![region(HandlerKind::Catch(0), 0..1, 1..9)],
        &[TypeTag::Ref],
        1,
    )
    .unwrap();
    let handler = body.block_at_offset(1).unwrap();
    assert!(body.block(handler).flags.contains(BlockFlags::HANDLER_ENTRY));
    let ExprKind::LocalStore(_, v) = body.expr(body.block(handler).stmts[0]).kind else {
        panic!("expected a store")
    };
    assert!(matches!(body.expr(v).kind, ExprKind::CatchArg));
}

#[test]
fn calls_resolve_through_the_token_table() {
    let mut resolver = MapResolver::default();
    resolver.define_call(
        7,
        CallSig { params: vec![TypeTag::Int32, TypeTag::Int32], ret: TypeTag::Int32 },
    );
    let body = import_with(
        &[
            Opcode::LdcI4(1),
            Opcode::LdcI4(2),
            Opcode::Call(7),
            Opcode::StLoc(0),
            Opcode::Ret,
        ],
        Vec::new(),
        &[TypeTag::Int32],
        TypeTag::Void,
        2,
        &resolver,
    )
    .unwrap();
    let entry = body.block(body.entry);
    let ExprKind::LocalStore(_, v) = body.expr(entry.stmts[0]).kind else { panic!() };
    let ExprKind::Call { token, ref args } = body.expr(v).kind else { panic!() };
    assert_eq!(token, 7);
    assert_eq!(args.len(), 2);
    assert!(matches!(body.expr(args[0]).kind, ExprKind::IntCon(1)));
    assert!(matches!(body.expr(args[1]).kind, ExprKind::IntCon(2)));
}

#[test]
fn pending_call_sequences_before_a_store() {
    // An unconsumed call below the stored value must run before the store,
    // in case the callee throws.
    let mut resolver = MapResolver::default();
    resolver.define_call(7, CallSig { params: Vec::new(), ret: TypeTag::Int32 });
    let body = import_with(
        &[
            Opcode::Call(7),  // 0
            Opcode::LdcI4(5), // 5
            Opcode::StLoc(0), // 10
            Opcode::Pop,      // 13
            Opcode::Ret,      // 14
        ],
        Vec::new(),
        &[TypeTag::Int32],
        TypeTag::Void,
        2,
        &resolver,
    )
    .unwrap();

    // temp = call; loc0 = 5; return
    let entry = body.block(body.entry);
    let ExprKind::LocalStore(temp, call) = body.expr(entry.stmts[0]).kind else {
        panic!("expected the call spilled first")
    };
    assert!(body.local(temp).is_temp);
    assert!(matches!(body.expr(call).kind, ExprKind::Call { token: 7, .. }));
    let ExprKind::LocalStore(local, v) = body.expr(entry.stmts[1]).kind else {
        panic!("expected the local store")
    };
    assert_eq!(local.index(), 0);
    assert!(matches!(body.expr(v).kind, ExprKind::IntCon(5)));
}

#[test]
fn discarded_call_survives_a_throw() {
    // A call still on the stack when the throw abandons it keeps its effect
    // in the statement list.
    let mut resolver = MapResolver::default();
    resolver.define_call(7, CallSig { params: Vec::new(), ret: TypeTag::Int32 });
    let body = import_with(
        &[Opcode::Call(7), Opcode::LdNull, Opcode::Throw],
        Vec::new(),
        &[],
        TypeTag::Void,
        2,
        &resolver,
    )
    .unwrap();
    let entry = body.block(body.entry);
    assert_eq!(entry.stmts.len(), 2);
    assert!(matches!(body.expr(entry.stmts[0]).kind, ExprKind::Call { token: 7, .. }));
    assert!(matches!(body.expr(entry.stmts[1]).kind, ExprKind::Throw(_)));
}

#[test]
fn unknown_token_aborts() {
    let err = import(
        &[Opcode::Call(99), Opcode::Ret],
        Vec::new(),
        &[],
        1,
    )
    .unwrap_err();
    assert!(matches!(err, ImportError::Aborted(_)));
}

#[test]
fn switch_keeps_all_targets_live() {
    let body = import(
        &[
            Opcode::LdLoc(0),         // 0
            Opcode::Switch(vec![16, 17]), // 3
            Opcode::Ret,              // 16
            Opcode::Ret,              // 17
        ],
        Vec::new(),
        &[TypeTag::Int32],
        1,
    )
    .unwrap();
    let entry = body.block(body.entry);
    assert!(matches!(entry.kind, BlockKind::Switch { ref targets } if targets.len() == 2));
    let last = *entry.stmts.last().unwrap();
    assert!(matches!(body.expr(last).kind, ExprKind::SwitchSel(_)));
    for off in [16, 17] {
        let b = body.block_at_offset(off).unwrap();
        assert!(body.block(b).is_imported());
        assert!(entry.succs.contains(&b));
    }
}

#[test]
fn blocks_survive_retranslation() {
    // The same graph imports deterministically: block count stays bounded by
    // the retranslations, no block index is ever invalidated.
    let body = import(
        &[
            Opcode::LdLoc(0),                 // 0
            Opcode::BrTrue(18),               // 3
            Opcode::LdcI4(10),                // 8
            Opcode::Br(25),                   // 13
            Opcode::LdcI4(2),                 // 18
            Opcode::Conv(TypeTag::NativeInt), // 23
            Opcode::StLoc(1),                 // 25
            Opcode::Ret,                      // 28
        ],
        Vec::new(),
        &[TypeTag::Int32, TypeTag::NativeInt],
        2,
    )
    .unwrap();
    for i in 0..body.blocks.len() {
        let b = body.block(BlockId::from_usize(i));
        assert!(
            b.is_imported() || b.flags.contains(BlockFlags::REMOVED),
            "bb{i} left in limbo"
        );
        assert!(!b.flags.contains(BlockFlags::PENDING));
    }
}
