//! The decoded form of a `Code` attribute (JVMS §4.7.3).
//!
//! Bytecode offsets never appear in this form. Every offset the class file
//! refers to (branch targets, exception ranges, line numbers, local variable
//! ranges, stack map frames) is replaced by a `Label`, and the label is placed
//! in the instruction list in front of the instruction it names. Instructions
//! can therefore be removed or replaced without invalidating any table; the
//! encoder resolves labels back to offsets.

use super::attributes::AttributeInfo;
use super::constant_pool_index;
use super::u1;
use super::u2;

/// A position in an instruction list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

/// A single instruction, or the `Label` pseudo-instruction.
///
/// Each variant records the exact opcode it was decoded from, so that
/// `ldc`/`ldc_w`, `goto`/`goto_w` and the `wide` prefix survive a round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insn {
    Label(Label),
    /// Any instruction without operands, including the compact local variable
    /// forms such as `aload_0`.
    Simple { opcode: u1 },
    /// `bipush`, `sipush` and `newarray`.
    Int { opcode: u1, operand: i32 },
    /// Loads, stores and `ret` with an explicit local variable index.
    Var { opcode: u1, index: u2, wide: bool },
    Iinc { index: u2, increment: i16, wide: bool },
    /// `ldc`, `ldc_w` and `ldc2_w`.
    Ldc { opcode: u1, index: constant_pool_index },
    /// Field access, `invokevirtual`, `invokespecial`, `invokestatic`, `new`,
    /// `anewarray`, `checkcast` and `instanceof`.
    Cp { opcode: u1, index: constant_pool_index },
    InvokeInterface { index: constant_pool_index, count: u1 },
    InvokeDynamic { index: constant_pool_index },
    MultiANewArray { index: constant_pool_index, dimensions: u1 },
    Jump { opcode: u1, target: Label },
    TableSwitch { default: Label, low: i32, high: i32, targets: Vec<Label> },
    LookupSwitch { default: Label, pairs: Vec<(i32, Label)> },
}

impl Insn {
    /// Pseudo-instructions occupy no space in the encoded `code` array.
    pub fn is_pseudo(&self) -> bool {
        match *self {
            Insn::Label(_) => true,
            _ => false,
        }
    }

    /// The opcode, or `None` for a pseudo-instruction.
    pub fn opcode(&self) -> Option<u1> {
        use super::opcode;
        Some(match *self {
            Insn::Label(_) => return None,
            Insn::Simple { opcode }
            | Insn::Int { opcode, .. }
            | Insn::Var { opcode, .. }
            | Insn::Ldc { opcode, .. }
            | Insn::Cp { opcode, .. }
            | Insn::Jump { opcode, .. } => opcode,
            Insn::Iinc { .. } => opcode::IINC,
            Insn::InvokeInterface { .. } => opcode::INVOKEINTERFACE,
            Insn::InvokeDynamic { .. } => opcode::INVOKEDYNAMIC,
            Insn::MultiANewArray { .. } => opcode::MULTIANEWARRAY,
            Insn::TableSwitch { .. } => opcode::TABLESWITCH,
            Insn::LookupSwitch { .. } => opcode::LOOKUPSWITCH,
        })
    }

    /// The labels this instruction may transfer control to.
    pub fn targets(&self) -> Vec<Label> {
        match *self {
            Insn::Jump { target, .. } => vec![target],
            Insn::TableSwitch { default, ref targets, .. } => {
                let mut all = vec![default];
                all.extend(targets.iter().cloned());
                all
            }
            Insn::LookupSwitch { default, ref pairs } => {
                let mut all = vec![default];
                all.extend(pairs.iter().map(|&(_, l)| l));
                all
            }
            _ => Vec::new(),
        }
    }
}

/// A stable handle to a slot in an `InsnList`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InsnId(usize);

/// An arena of instructions.
///
/// Removing an instruction leaves a tombstone so that every `InsnId` handed
/// out stays valid while a method is being rewritten; `compact` drops the
/// tombstones once editing is finished.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InsnList {
    nodes: Vec<Option<Insn>>,
    next_label: u32,
}

impl InsnList {
    pub fn new() -> Self {
        InsnList::default()
    }

    /// Allocates a label that is not yet placed in the list.
    pub fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    pub fn push(&mut self, insn: Insn) -> InsnId {
        if let Insn::Label(Label(n)) = insn {
            if n >= self.next_label {
                self.next_label = n + 1;
            }
        }
        self.nodes.push(Some(insn));
        InsnId(self.nodes.len() - 1)
    }

    pub fn get(&self, id: InsnId) -> Option<&Insn> {
        self.nodes.get(id.0).and_then(|n| n.as_ref())
    }

    /// Removes an instruction, leaving a tombstone in its slot.
    pub fn remove(&mut self, id: InsnId) -> Option<Insn> {
        self.nodes.get_mut(id.0).and_then(|n| n.take())
    }

    /// Replaces the instruction in a live slot and returns the old one.
    pub fn replace(&mut self, id: InsnId, insn: Insn) -> Option<Insn> {
        match self.nodes.get_mut(id.0) {
            Some(slot @ Some(_)) => slot.replace(insn),
            _ => None,
        }
    }

    /// Iterates over the live instructions in order.
    pub fn iter(&self) -> impl Iterator<Item = (InsnId, &Insn)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|insn| (InsnId(i), insn)))
    }

    /// The number of live instructions, labels included.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_tombstones(&self) -> bool {
        self.nodes.iter().any(|n| n.is_none())
    }

    /// Drops tombstones. Invalidates every `InsnId`.
    pub fn compact(&mut self) {
        self.nodes.retain(|n| n.is_some());
    }
}

/// An exception handler, active in `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionTableEntry {
    pub start: Label,
    pub end: Label,
    pub handler: Label,
    /// Zero for a handler that catches everything, otherwise a
    /// `ConstantPoolInfo::Class` index.
    pub catch_type: constant_pool_index,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Code {
    pub max_stack: u2,
    pub max_locals: u2,
    pub instructions: InsnList,
    pub exception_table: Vec<ExceptionTableEntry>,
    pub attributes: Vec<AttributeInfo>,
}

impl Code {
    pub fn new(max_stack: u2, max_locals: u2) -> Self {
        Code {
            max_stack,
            max_locals,
            instructions: InsnList::new(),
            exception_table: Vec::new(),
            attributes: Vec::new(),
        }
    }
}
