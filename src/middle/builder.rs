//! The IR builder: lowers a typed AST into a well-formed CFG.

use crate::common::{Map, SymbolId};
use crate::front::ast::{self, BOp, Expr, Stmt};

use super::ir::{
    ArithOp, BasicBlock, Bin, BlockId, Cast, CastOp, CmpOp, Instruction, InstrId, Ir, MachineType,
    Op, RegId, SlotId, StackSlot, Value,
};

struct Builder {
    ir: Ir,
    tail: Option<InstrId>,
    cur_block: BlockId,
    /// Blocks placed but not yet given their first instruction; the next
    /// emitted instruction becomes the `start` of all of them at once.
    pending: Vec<BlockId>,
    slot_of: Map<SymbolId, SlotId>,
}

impl Builder {
    fn new() -> Self {
        let entry = BlockId(0);
        let mut ir = Ir {
            instrs: vec![],
            blocks: vec![BasicBlock {
                id: entry,
                start: None,
                end: None,
                len: 0,
            }],
            slots: vec![],
            first_instr: None,
            next_reg: 1,
            num_regs: 0,
        };
        ir.blocks.reserve(8);

        Builder {
            ir,
            tail: None,
            cur_block: entry,
            pending: vec![entry],
            slot_of: Map::new(),
        }
    }

    fn new_reg(&mut self) -> RegId {
        let r = self.ir.next_reg;
        self.ir.next_reg += 1;
        r
    }

    fn new_slot(&mut self, ty: MachineType) -> SlotId {
        let id = SlotId(self.ir.slots.len() as u32);
        self.ir.slots.push(StackSlot { id, ty });
        id
    }

    fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.ir.blocks.len() as u32);
        self.ir.blocks.push(BasicBlock {
            id,
            start: None,
            end: None,
            len: 0,
        });
        id
    }

    /// `place_block`: make `id` the current block and mark it as pending
    /// absorption of whatever instruction is emitted next.
    fn place_block(&mut self, id: BlockId) {
        self.cur_block = id;
        self.pending.push(id);
    }

    fn emit(&mut self, op: Op) -> InstrId {
        let block = self.cur_block;
        let id = InstrId(self.ir.instrs.len() as u32);

        self.ir.instrs.push(Instruction {
            op,
            block,
            prev: self.tail,
            next: None,
        });

        match self.tail {
            Some(p) => self.ir.instr_mut(p).next = Some(id),
            None => self.ir.first_instr = Some(id),
        }
        self.tail = Some(id);

        for b in self.pending.drain(..) {
            self.ir.blocks[b.index()].start = Some(id);
        }

        self.ir.blocks[block.index()].len += 1;

        id
    }

    fn gen_expr(&mut self, expr: &Expr) -> RegId {
        match expr {
            Expr::Int { value, ty, .. } => {
                let ty = ty.expect("internal error: sem left an Int's type unresolved");
                let dest = self.new_reg();
                self.emit(Op::Imm {
                    ty,
                    dest,
                    value: *value,
                });
                dest
            }

            Expr::Var { sym, ty, .. } => {
                let ty = ty.expect("internal error: sem left a Var's type unresolved");
                let sym = sym.expect("internal error: sem left a Var unresolved");
                let addr = *self
                    .slot_of
                    .get(&sym)
                    .expect("internal error: Var resolved to a symbol with no allocation yet");
                let dest = self.new_reg();
                self.emit(Op::Load { ty, dest, addr });
                dest
            }

            Expr::Cast { expr: inner, ty, .. } => {
                let src_ty = inner
                    .ty()
                    .expect("internal error: sem left a cast's source type unresolved");
                let src = self.gen_expr(inner);

                if src_ty.size_bytes() > ty.size_bytes() {
                    let dest = self.new_reg();
                    self.emit(Op::Cast(
                        CastOp::Trunc,
                        Cast {
                            src_ty,
                            dst_ty: *ty,
                            dest,
                            src: Value::Register(src),
                        },
                    ));
                    dest
                } else if src_ty.size_bytes() == ty.size_bytes() {
                    src
                } else {
                    let op = if ty.is_signed() {
                        CastOp::Sext
                    } else {
                        CastOp::Zext
                    };
                    let dest = self.new_reg();
                    self.emit(Op::Cast(
                        op,
                        Cast {
                            src_ty,
                            dst_ty: *ty,
                            dest,
                            src: Value::Register(src),
                        },
                    ));
                    dest
                }
            }

            Expr::BinOp {
                op, lhs, rhs, ty, ..
            } => {
                let ty = ty.expect("internal error: sem left a BinOp's type unresolved");
                let l = self.gen_expr(lhs);
                let r = self.gen_expr(rhs);
                let dest = self.new_reg();
                let bin = Bin {
                    ty,
                    dest,
                    lhs: Value::Register(l),
                    rhs: Value::Register(r),
                };

                let ir_op = match op {
                    BOp::Add => Op::Arith(ArithOp::Add, bin),
                    BOp::Sub => Op::Arith(ArithOp::Sub, bin),
                    BOp::Mul => Op::Arith(ArithOp::Mul, bin),
                    BOp::Div => Op::Arith(ArithOp::Div, bin),
                    BOp::Lt => Op::Cmp(CmpOp::Less, bin),
                    BOp::Le => Op::Cmp(CmpOp::Lequal, bin),
                    BOp::Ne => Op::Cmp(CmpOp::Nequal, bin),
                    BOp::Eq => Op::Cmp(CmpOp::Equal, bin),
                };
                self.emit(ir_op);
                dest
            }
        }
    }

    fn gen_block(&mut self, block: &ast::Block) {
        for stmt in &block.stmts {
            self.gen_stmt(stmt);
        }
    }

    fn gen_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block { block, .. } => self.gen_block(block),

            Stmt::VarDecl { ty, init, sym, .. } => {
                let slot = self.new_slot(*ty);
                self.slot_of.insert(
                    sym.expect("internal error: sem left a VarDecl unresolved"),
                    slot,
                );

                let r = self.gen_expr(init);
                self.emit(Op::Store {
                    ty: *ty,
                    addr: slot,
                    src: Value::Register(r),
                });
            }

            Stmt::Assign { value, sym, .. } => {
                let slot = *self
                    .slot_of
                    .get(&sym.expect("internal error: sem left an Assign unresolved"))
                    .expect("internal error: Assign resolved to a symbol with no allocation yet");

                let ty = value
                    .ty()
                    .expect("internal error: sem left an Assign's value type unresolved");
                let r = self.gen_expr(value);
                self.emit(Op::Store {
                    ty,
                    addr: slot,
                    src: Value::Register(r),
                });
            }

            Stmt::If {
                cond,
                then_blk,
                else_blk,
                ..
            } => {
                let then = self.new_block();
                let els = self.new_block();

                let cond_ty = cond
                    .ty()
                    .expect("internal error: sem left an if-condition's type unresolved");
                let cond_reg = self.gen_expr(cond);
                self.emit(Op::Branch {
                    ty: cond_ty,
                    cond: Value::Register(cond_reg),
                    then_block: then,
                    else_block: els,
                });

                self.place_block(then);
                self.gen_block(then_blk);

                let end = else_blk.as_ref().map(|_| self.new_block());
                if let Some(end) = end {
                    self.emit(Op::Jmp { target: end });
                }

                self.place_block(els);

                if let Some(else_blk) = else_blk {
                    self.gen_block(else_blk);
                    self.place_block(end.unwrap());
                }
            }

            Stmt::While { cond, body, .. } => {
                let start = self.new_block();
                let body_blk = self.new_block();
                let end = self.new_block();

                self.place_block(start);
                let cond_ty = cond
                    .ty()
                    .expect("internal error: sem left a while-condition's type unresolved");
                let cond_reg = self.gen_expr(cond);
                self.emit(Op::Branch {
                    ty: cond_ty,
                    cond: Value::Register(cond_reg),
                    then_block: body_blk,
                    else_block: end,
                });

                self.place_block(body_blk);
                self.gen_block(body);
                self.emit(Op::Jmp { target: start });

                self.place_block(end);
            }

            Stmt::Return { value, .. } => {
                let ty = value
                    .ty()
                    .expect("internal error: sem left a return value's type unresolved");
                let r = self.gen_expr(value);
                self.emit(Op::Ret {
                    ty,
                    value: Value::Register(r),
                });

                // Any code emitted after a terminator lives in a fresh
                // block, unreachable but addressable.
                let next = self.new_block();
                self.place_block(next);
            }
        }
    }
}

/// Lower a typed AST (post `front::sem::check`) into a CFG.
#[tracing::instrument(level = "debug", skip(program))]
pub fn build(program: &ast::Program) -> Ir {
    let mut b = Builder::new();
    b.gen_block(&program.body);

    for i in 0..b.ir.blocks.len() {
        b.ir.update_block_end(BlockId(i as u32));
    }
    b.ir.num_regs = b.ir.next_reg - 1;

    b.ir
}
