//! The IR data model.
//!
//! Instructions, basic blocks, and stack slots are identified by dense,
//! never-recycled ids rather than by pointers into a hand-rolled arena.
//! Blocks and slots double as indices into `Ir`'s backing `Vec`s since they
//! are created in emission order and never removed; instructions are not,
//! because folding and mem-to-reg splice and remove them, so `Ir::instrs`
//! is an append-only arena whose logical list order is carried by the
//! `prev`/`next` links, not by `Vec` position.

use derive_more::Display;

use crate::common::Id;

/// Reserved register id meaning "no register" (never a valid destination).
pub const REG_NONE: u32 = 0;
/// Reserved register id meaning "not yet filled in" — used as the initial
/// value of a φ parameter's register before renaming assigns it.
pub const REG_EMPTY: u32 = u32::MAX;

pub type RegId = u32;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
#[display("bb.{_0}")]
pub struct BlockId(pub u32);

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct InstrId(pub u32);

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
#[display("alloca {_0}")]
pub struct SlotId(pub u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}
impl InstrId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}
impl SlotId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A machine type that a value can carry. These are the only four integer
/// widths the language has; all of them are first-class.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
pub enum MachineType {
    #[display("i8")]
    I8,
    #[display("i16")]
    I16,
    #[display("i32")]
    I32,
    #[display("i64")]
    I64,
}

impl MachineType {
    pub fn size_bytes(self) -> u32 {
        match self {
            MachineType::I8 => 1,
            MachineType::I16 => 2,
            MachineType::I32 => 4,
            MachineType::I64 => 8,
        }
    }

    pub fn is_signed(self) -> bool {
        // Every machine type in this language is a signed integer; there is
        // no unsigned counterpart, so this always holds. Kept as a method
        // (rather than inlined `true`) because `Zext` is reachable in the
        // instruction set and its absence here would be surprising.
        true
    }

    pub fn from_size(size: u32) -> Self {
        match size {
            1 => MachineType::I8,
            2 => MachineType::I16,
            4 => MachineType::I32,
            8 => MachineType::I64,
            _ => panic!("internal error: no machine type of size {size}"),
        }
    }

    /// Mask `v` down to this type's bit width.
    pub fn truncate(self, v: u64) -> u64 {
        let bits = self.size_bytes() * 8;
        if bits >= 64 {
            v
        } else {
            v & ((1u64 << bits) - 1)
        }
    }

    /// Interpret the low `size_bytes()` bytes of `v` as a two's-complement
    /// signed integer of that width, sign-extended to `i64`.
    pub fn sign_extend(self, v: u64) -> i64 {
        let bits = self.size_bytes() * 8;
        if bits >= 64 {
            v as i64
        } else {
            let shift = 64 - bits;
            ((v << shift) as i64) >> shift
        }
    }
}

/// A promotable stack storage location introduced by a variable declaration.
/// No slot's address is ever observed outside a direct load or store, so
/// every slot in this language is promotable and after `mem2reg` none is
/// referenced by a `Load`/`Store` anymore.
#[derive(Clone, Copy, Debug)]
pub struct StackSlot {
    pub id: SlotId,
    pub ty: MachineType,
}

/// A value operand: either a register or an integer literal. `Load`/`Store`
/// addresses are always slots and are carried as a plain `SlotId` field on
/// those ops rather than wrapped in this enum, since an address only ever
/// appears in address position — these two variants are everywhere else an
/// operand can appear.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Value {
    Register(RegId),
    Integer(u64),
}

impl Value {
    pub fn as_register(self) -> Option<RegId> {
        match self {
            Value::Register(r) => Some(r),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum ArithOp {
    #[display("add")]
    Add,
    #[display("sub")]
    Sub,
    #[display("mul")]
    Mul,
    #[display("div")]
    Div,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum CmpOp {
    #[display("cmp lt")]
    Less,
    #[display("cmp le")]
    Lequal,
    #[display("cmp ne")]
    Nequal,
    #[display("cmp eq")]
    Equal,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum CastOp {
    #[display("sext")]
    Sext,
    #[display("zext")]
    Zext,
    #[display("trunc")]
    Trunc,
}

/// A φ operand: the register carried in along a given predecessor edge.
/// `reg` is `REG_EMPTY` until renaming fills it in.
#[derive(Clone, Copy, Debug)]
pub struct PhiParam {
    pub pred: BlockId,
    pub reg: RegId,
}

/// The op-specific payload shared by the binary arithmetic/comparison ops
/// (one shape reused across all eight opcodes).
#[derive(Clone, Debug)]
pub struct Bin {
    pub ty: MachineType,
    pub dest: RegId,
    pub lhs: Value,
    pub rhs: Value,
}

/// The op-specific payload shared by `Sext`/`Zext`/`Trunc`.
#[derive(Clone, Debug)]
pub struct Cast {
    pub src_ty: MachineType,
    pub dst_ty: MachineType,
    pub dest: RegId,
    pub src: Value,
}

#[derive(Clone, Debug)]
pub enum Op {
    Imm {
        ty: MachineType,
        dest: RegId,
        value: u64,
    },
    Copy {
        ty: MachineType,
        dest: RegId,
        src: Value,
    },
    Phi {
        ty: MachineType,
        dest: RegId,
        /// The slot this φ was synthesized for; provenance only, not read
        /// once renaming completes, but kept around for debugging.
        slot: SlotId,
        params: Vec<PhiParam>,
    },
    Load {
        ty: MachineType,
        dest: RegId,
        addr: SlotId,
    },
    Store {
        ty: MachineType,
        addr: SlotId,
        src: Value,
    },
    Cast(CastOp, Cast),
    Arith(ArithOp, Bin),
    Cmp(CmpOp, Bin),
    Ret {
        ty: MachineType,
        value: Value,
    },
    Jmp {
        target: BlockId,
    },
    Branch {
        ty: MachineType,
        cond: Value,
        then_block: BlockId,
        else_block: BlockId,
    },
}

impl Op {
    /// The register this instruction defines, if any.
    pub fn dest(&self) -> Option<RegId> {
        match self {
            Op::Imm { dest, .. }
            | Op::Copy { dest, .. }
            | Op::Phi { dest, .. }
            | Op::Load { dest, .. } => Some(*dest),
            Op::Cast(_, c) => Some(c.dest),
            Op::Arith(_, b) | Op::Cmp(_, b) => Some(b.dest),
            Op::Store { .. } | Op::Ret { .. } | Op::Jmp { .. } | Op::Branch { .. } => None,
        }
    }

    /// Visit every `Value`-typed operand (not including `dest`).
    pub fn for_each_value(&self, mut f: impl FnMut(Value)) {
        match self {
            Op::Imm { .. } => {}
            Op::Copy { src, .. } => f(*src),
            Op::Phi { .. } => {}
            Op::Load { .. } => {}
            Op::Store { src, .. } => f(*src),
            Op::Cast(_, c) => f(c.src),
            Op::Arith(_, b) | Op::Cmp(_, b) => {
                f(b.lhs);
                f(b.rhs);
            }
            Op::Ret { value, .. } => f(*value),
            Op::Jmp { .. } => {}
            Op::Branch { cond, .. } => f(*cond),
        }
    }

    /// Mutably visit every `Value`-typed operand (not including `dest`).
    /// Used by immediate folding; never touches `SlotAddress`-shaped values
    /// since a slot is never the folding table's key.
    pub fn for_each_value_mut(&mut self, mut f: impl FnMut(&mut Value)) {
        match self {
            Op::Imm { .. } => {}
            Op::Copy { src, .. } => f(src),
            Op::Phi { .. } => {}
            Op::Load { .. } => {}
            Op::Store { src, .. } => f(src),
            Op::Cast(_, c) => f(&mut c.src),
            Op::Arith(_, b) | Op::Cmp(_, b) => {
                f(&mut b.lhs);
                f(&mut b.rhs);
            }
            Op::Ret { value, .. } => f(value),
            Op::Jmp { .. } => {}
            Op::Branch { cond, .. } => f(cond),
        }
    }
}

/// A single instruction. Forms a doubly-linked list (via `prev`/`next`)
/// spanning the whole function; `block` is a back-pointer to the basic
/// block that currently owns this instruction.
#[derive(Clone, Debug)]
pub struct Instruction {
    pub op: Op,
    pub block: BlockId,
    pub prev: Option<InstrId>,
    pub next: Option<InstrId>,
}

/// A maximal run of instructions `[start, end]` inclusive (by the
/// `next`-link chain), `len` instructions long. A block with `len == 0` is
/// a placeholder: its `start` is `None` and the first instruction emitted
/// after it is absorbed by it (see `builder`).
#[derive(Clone, Debug)]
pub struct BasicBlock {
    pub id: BlockId,
    pub start: Option<InstrId>,
    pub end: Option<InstrId>,
    pub len: u32,
}

/// The (at most two) successor blocks of a basic block. No terminator in
/// this language's instruction set ever needs more than two.
#[derive(Clone, Copy, Default, Debug)]
pub struct Successors {
    data: [Option<BlockId>; 2],
    count: usize,
}

impl Successors {
    fn push(&mut self, b: BlockId) {
        self.data[self.count] = Some(b);
        self.count += 1;
    }

    pub fn iter(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.data[..self.count].iter().map(|b| b.unwrap())
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

/// A function's whole IR: the instruction list, block list, and slot list,
/// plus the register-id allocator.
#[derive(Clone, Debug)]
pub struct Ir {
    pub(crate) instrs: Vec<Instruction>,
    pub(crate) blocks: Vec<BasicBlock>,
    pub(crate) slots: Vec<StackSlot>,
    pub first_instr: Option<InstrId>,
    pub next_reg: RegId,
    pub num_regs: u32,
}

impl Ir {
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    pub fn instr(&self, id: InstrId) -> &Instruction {
        &self.instrs[id.index()]
    }

    pub fn instr_mut(&mut self, id: InstrId) -> &mut Instruction {
        &mut self.instrs[id.index()]
    }

    pub fn slot(&self, id: SlotId) -> &StackSlot {
        &self.slots[id.index()]
    }

    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.iter()
    }

    pub fn slots(&self) -> impl Iterator<Item = &StackSlot> {
        self.slots.iter()
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    /// Walk the instructions belonging to `block`, in list order.
    pub fn block_instrs(&self, block: BlockId) -> impl Iterator<Item = InstrId> + '_ {
        let b = self.block(block);
        let mut cur = b.start;
        let remaining = b.len;
        let mut left = remaining;
        std::iter::from_fn(move || {
            if left == 0 {
                return None;
            }
            let id = cur?;
            left -= 1;
            cur = self.instr(id).next;
            Some(id)
        })
    }

    /// Walk every instruction in the function, in list order.
    pub fn all_instrs(&self) -> impl Iterator<Item = InstrId> + '_ {
        let mut cur = self.first_instr;
        std::iter::from_fn(move || {
            let id = cur?;
            cur = self.instr(id).next;
            Some(id)
        })
    }

    /// The successor set of `block`, derived from its terminator rather
    /// than stored explicitly.
    pub fn successors(&self, block: BlockId) -> Successors {
        let b = self.block(block);
        let mut s = Successors::default();

        if b.len > 0 {
            let end = self.instr(b.end.unwrap());
            match &end.op {
                Op::Ret { .. } => {}
                Op::Jmp { target } => s.push(*target),
                Op::Branch {
                    then_block,
                    else_block,
                    ..
                } => {
                    s.push(*then_block);
                    s.push(*else_block);
                }
                _ => {
                    if let Some(next) = end.next {
                        s.push(self.instr(next).block);
                    }
                }
            }
        } else if let Some(start) = b.start {
            s.push(self.instr(start).block);
        }

        s
    }

    /// `bb_update_end`: recompute `end` by walking `len - 1` steps from
    /// `start`.
    pub fn update_block_end(&mut self, block: BlockId) {
        let (start, len) = {
            let b = self.block(block);
            (b.start, b.len)
        };

        let end = if len > 0 {
            let mut cur = start.unwrap();
            for _ in 1..len {
                cur = self.instr(cur).next.expect(
                    "internal error: block's len overruns the instruction list",
                );
            }
            Some(cur)
        } else {
            None
        };

        self.blocks[block.index()].end = end;
    }
}
