//! Assembly of instruction lists into `code` arrays, and the derived values
//! that depend on instruction positions or on the instruction stream.

use std::collections::HashMap;

use byteorder::{BigEndian, WriteBytesExt};

use super::class_file::{write_attributes, AttributeContext};
use super::RecomputeMode;
use crate::error::{Error, Result};
use crate::model::class_file::attributes::{StackMapFrame, VerificationTypeInfo};
use crate::model::class_file::code::{Code, Insn, InsnList, Label};
use crate::model::class_file::constant_pool::{ConstantPool, ConstantPoolInfo};
use crate::model::class_file::descriptor::{field_slots, method_slots};
use crate::model::class_file::opcode::*;
use crate::model::class_file::MethodInfo;

/// Bytecode together with the offset every placed label resolved to.
#[derive(Debug)]
pub struct Assembled {
    pub bytecode: Vec<u8>,
    pub positions: HashMap<Label, u32>,
}

impl Assembled {
    pub fn pc(&self, label: Label) -> Result<u32> {
        self.positions
            .get(&label)
            .cloned()
            .ok_or_else(|| Error::Invariant(format!("label {:?} is not placed in the instruction list", label)))
    }
}

pub(crate) fn to_u16(what: &'static str, value: usize) -> Result<u16> {
    if value > 0xffff {
        return Err(Error::EncodingLimitExceeded { what, value: value as i64, limit: 0xffff });
    }
    Ok(value as u16)
}

fn is_wide_var(index: u16, wide: bool) -> bool {
    wide || index > 0xff
}

fn is_wide_iinc(index: u16, increment: i16, wide: bool) -> bool {
    wide || index > 0xff || increment < i16::from(i8::min_value()) || increment > i16::from(i8::max_value())
}

fn padding(pc: usize) -> usize {
    (4 - (pc + 1) % 4) % 4
}

fn insn_size(insn: &Insn, pc: usize) -> usize {
    match *insn {
        Insn::Label(_) => 0,
        Insn::Simple { .. } => 1,
        Insn::Int { opcode, .. } => {
            if opcode == SIPUSH {
                3
            } else {
                2
            }
        }
        Insn::Var { index, wide, .. } => {
            if is_wide_var(index, wide) {
                4
            } else {
                2
            }
        }
        Insn::Iinc { index, increment, wide } => {
            if is_wide_iinc(index, increment, wide) {
                6
            } else {
                3
            }
        }
        Insn::Ldc { opcode, index } => {
            if opcode == LDC && index <= 0xff {
                2
            } else {
                3
            }
        }
        Insn::Cp { .. } => 3,
        Insn::InvokeInterface { .. } | Insn::InvokeDynamic { .. } => 5,
        Insn::MultiANewArray { .. } => 4,
        Insn::Jump { opcode, .. } => {
            if opcode == GOTO_W || opcode == JSR_W {
                5
            } else {
                3
            }
        }
        Insn::TableSwitch { ref targets, .. } => 1 + padding(pc) + 12 + 4 * targets.len(),
        Insn::LookupSwitch { ref pairs, .. } => 1 + padding(pc) + 8 + 8 * pairs.len(),
    }
}

fn branch_offset(assembled: &Assembled, pc: usize, target: Label) -> Result<i64> {
    Ok(i64::from(assembled.pc(target)?) - pc as i64)
}

fn write_insn(out: &mut Vec<u8>, insn: &Insn, pc: usize, assembled: &Assembled) -> Result<()> {
    match *insn {
        Insn::Label(_) => {}
        Insn::Simple { opcode } => out.write_u8(opcode)?,
        Insn::Int { opcode, operand } => {
            out.write_u8(opcode)?;
            match opcode {
                SIPUSH => out.write_i16::<BigEndian>(operand as i16)?,
                BIPUSH => out.write_i8(operand as i8)?,
                _ => out.write_u8(operand as u8)?,
            }
        }
        Insn::Var { opcode, index, wide } => {
            if is_wide_var(index, wide) {
                out.write_u8(WIDE)?;
                out.write_u8(opcode)?;
                out.write_u16::<BigEndian>(index)?;
            } else {
                out.write_u8(opcode)?;
                out.write_u8(index as u8)?;
            }
        }
        Insn::Iinc { index, increment, wide } => {
            if is_wide_iinc(index, increment, wide) {
                out.write_u8(WIDE)?;
                out.write_u8(IINC)?;
                out.write_u16::<BigEndian>(index)?;
                out.write_i16::<BigEndian>(increment)?;
            } else {
                out.write_u8(IINC)?;
                out.write_u8(index as u8)?;
                out.write_i8(increment as i8)?;
            }
        }
        Insn::Ldc { opcode, index } => {
            if opcode == LDC && index <= 0xff {
                out.write_u8(LDC)?;
                out.write_u8(index as u8)?;
            } else {
                out.write_u8(if opcode == LDC { LDC_W } else { opcode })?;
                out.write_u16::<BigEndian>(index)?;
            }
        }
        Insn::Cp { opcode, index } => {
            out.write_u8(opcode)?;
            out.write_u16::<BigEndian>(index)?;
        }
        Insn::InvokeInterface { index, count } => {
            out.write_u8(INVOKEINTERFACE)?;
            out.write_u16::<BigEndian>(index)?;
            out.write_u8(count)?;
            out.write_u8(0)?;
        }
        Insn::InvokeDynamic { index } => {
            out.write_u8(INVOKEDYNAMIC)?;
            out.write_u16::<BigEndian>(index)?;
            out.write_u16::<BigEndian>(0)?;
        }
        Insn::MultiANewArray { index, dimensions } => {
            out.write_u8(MULTIANEWARRAY)?;
            out.write_u16::<BigEndian>(index)?;
            out.write_u8(dimensions)?;
        }
        Insn::Jump { opcode, target } => {
            let offset = branch_offset(assembled, pc, target)?;
            out.write_u8(opcode)?;
            if opcode == GOTO_W || opcode == JSR_W {
                out.write_i32::<BigEndian>(offset as i32)?;
            } else {
                if offset < i64::from(i16::min_value()) || offset > i64::from(i16::max_value()) {
                    return Err(Error::EncodingLimitExceeded {
                        what: "branch offset",
                        value: offset,
                        limit: i64::from(i16::max_value()),
                    });
                }
                out.write_i16::<BigEndian>(offset as i16)?;
            }
        }
        Insn::TableSwitch { default, low, high, ref targets } => {
            out.write_u8(TABLESWITCH)?;
            for _ in 0..padding(pc) {
                out.write_u8(0)?;
            }
            out.write_i32::<BigEndian>(branch_offset(assembled, pc, default)? as i32)?;
            out.write_i32::<BigEndian>(low)?;
            out.write_i32::<BigEndian>(high)?;
            for &target in targets {
                out.write_i32::<BigEndian>(branch_offset(assembled, pc, target)? as i32)?;
            }
        }
        Insn::LookupSwitch { default, ref pairs } => {
            out.write_u8(LOOKUPSWITCH)?;
            for _ in 0..padding(pc) {
                out.write_u8(0)?;
            }
            out.write_i32::<BigEndian>(branch_offset(assembled, pc, default)? as i32)?;
            out.write_i32::<BigEndian>(pairs.len() as i32)?;
            for &(key, target) in pairs {
                out.write_i32::<BigEndian>(key)?;
                out.write_i32::<BigEndian>(branch_offset(assembled, pc, target)? as i32)?;
            }
        }
    }
    Ok(())
}

/// Lays out the instructions, resolves every label and emits the bytecode.
/// Tombstones are skipped.
pub fn assemble(insns: &InsnList) -> Result<Assembled> {
    let mut positions = HashMap::new();
    let mut pc = 0;
    for (_, insn) in insns.iter() {
        if let Insn::Label(label) = *insn {
            positions.insert(label, pc as u32);
        }
        pc += insn_size(insn, pc);
    }
    let mut assembled = Assembled { bytecode: Vec::with_capacity(pc), positions };
    let mut bytecode = Vec::with_capacity(pc);
    for (_, insn) in insns.iter() {
        let at = bytecode.len();
        write_insn(&mut bytecode, insn, at, &assembled)?;
    }
    assembled.bytecode = bytecode;
    Ok(assembled)
}

fn malformed(what: &str, detail: &str) -> Error {
    Error::MalformedInput(format!("{}: {}", what, detail))
}

fn method_descriptor_slots(descriptor: &str) -> Result<(i32, i32)> {
    method_slots(descriptor)
        .map(|(a, r)| (i32::from(a), i32::from(r)))
        .ok_or_else(|| malformed("method descriptor", descriptor))
}

/// The change in operand stack depth, in slots, caused by an instruction
/// with no constant pool operand.
fn simple_delta(opcode: u8) -> i32 {
    match opcode {
        ACONST_NULL..=ICONST_5 | FCONST_0..=FCONST_2 | BIPUSH | SIPUSH => 1,
        LCONST_0 | LCONST_1 | DCONST_0 | DCONST_1 => 2,
        ILOAD | FLOAD | ALOAD => 1,
        LLOAD | DLOAD => 2,
        ILOAD_0..=ALOAD_3 => implicit_var(opcode).map(|(_, size)| i32::from(size)).unwrap_or(1),
        IALOAD | FALOAD | AALOAD | BALOAD | CALOAD | SALOAD => -1,
        LALOAD | DALOAD => 0,
        ISTORE | FSTORE | ASTORE => -1,
        LSTORE | DSTORE => -2,
        ISTORE_0..=ASTORE_3 => -implicit_var(opcode).map(|(_, size)| i32::from(size)).unwrap_or(1),
        IASTORE | FASTORE | AASTORE | BASTORE | CASTORE | SASTORE => -3,
        LASTORE | DASTORE => -4,
        POP => -1,
        POP2 => -2,
        DUP | DUP_X1 | DUP_X2 => 1,
        DUP2 | DUP2_X1 | DUP2_X2 => 2,
        // Binary arithmetic, alternating int, long, float, double.
        IADD..=DREM => {
            if (opcode - IADD) % 2 == 1 {
                -2
            } else {
                -1
            }
        }
        // Shifts pop an int shift distance.
        ISHL..=LUSHR => -1,
        // Bitwise operations, alternating int and long.
        IAND..=LXOR => {
            if (opcode - IAND) % 2 == 1 {
                -2
            } else {
                -1
            }
        }
        // i2l, i2d, f2l, f2d
        0x85 | 0x87 | 0x8c | 0x8d => 1,
        // l2i, l2f, d2i, d2f
        0x88 | 0x89 | 0x8e | 0x90 => -1,
        LCMP | DCMPL | DCMPG => -3,
        FCMPL | FCMPG => -1,
        IFEQ..=IFLE | IFNULL | IFNONNULL => -1,
        IF_ICMPEQ..=IF_ACMPNE => -2,
        JSR | JSR_W => 1,
        TABLESWITCH | LOOKUPSWITCH => -1,
        IRETURN | FRETURN | ARETURN | ATHROW | MONITORENTER | MONITOREXIT => -1,
        LRETURN | DRETURN => -2,
        NEW => 1,
        _ => 0,
    }
}

fn stack_delta(insn: &Insn, cp: &ConstantPool) -> Result<i32> {
    Ok(match *insn {
        Insn::Label(_) => 0,
        Insn::Cp { opcode, index } => match opcode {
            GETSTATIC | PUTSTATIC | GETFIELD | PUTFIELD => {
                let field = cp.member_ref(index)?;
                let size = i32::from(
                    field_slots(&field.descriptor).ok_or_else(|| malformed("field descriptor", &field.descriptor))?,
                );
                match opcode {
                    GETSTATIC => size,
                    PUTSTATIC => -size,
                    GETFIELD => size - 1,
                    _ => -size - 1,
                }
            }
            INVOKEVIRTUAL | INVOKESPECIAL | INVOKESTATIC => {
                let method = cp.member_ref(index)?;
                let (args, ret) = method_descriptor_slots(&method.descriptor)?;
                let receiver = if opcode == INVOKESTATIC { 0 } else { 1 };
                ret - args - receiver
            }
            _ => simple_delta(opcode),
        },
        Insn::InvokeInterface { index, .. } => {
            let method = cp.member_ref(index)?;
            let (args, ret) = method_descriptor_slots(&method.descriptor)?;
            ret - args - 1
        }
        Insn::InvokeDynamic { index } => match cp.get(index) {
            Some(&ConstantPoolInfo::InvokeDynamic { name_and_type_index, .. }) => {
                let (_, descriptor) = cp.name_and_type(name_and_type_index)?;
                let (args, ret) = method_descriptor_slots(&descriptor)?;
                ret - args
            }
            _ => return Err(malformed("invokedynamic", "operand is not a CONSTANT_InvokeDynamic")),
        },
        Insn::MultiANewArray { dimensions, .. } => 1 - i32::from(dimensions),
        Insn::Ldc { opcode, .. } => {
            if opcode == LDC2_W {
                2
            } else {
                1
            }
        }
        Insn::Iinc { .. } => 0,
        Insn::Simple { opcode } | Insn::Int { opcode, .. } | Insn::Var { opcode, .. } | Insn::Jump { opcode, .. } => {
            simple_delta(opcode)
        }
        Insn::TableSwitch { .. } | Insn::LookupSwitch { .. } => -1,
    })
}

/// Computes the maximum operand stack depth by walking every path through
/// the method. Exception handlers start with the exception on the stack.
pub fn max_stack(code: &Code, cp: &ConstantPool) -> Result<u16> {
    let mut insns = Vec::new();
    let mut at_label = HashMap::new();
    for (_, insn) in code.instructions.iter() {
        match *insn {
            Insn::Label(label) => {
                at_label.insert(label, insns.len());
            }
            _ => insns.push(insn),
        }
    }
    let index_of = |label: Label| {
        at_label
            .get(&label)
            .cloned()
            .ok_or_else(|| Error::Invariant(format!("label {:?} is not placed in the instruction list", label)))
    };

    let mut depth: Vec<Option<i32>> = vec![None; insns.len()];
    let mut work = vec![(0, 0)];
    for entry in &code.exception_table {
        work.push((index_of(entry.handler)?, 1));
    }
    let mut max = 0;
    while let Some((i, d)) = work.pop() {
        if i >= insns.len() || depth[i].is_some() {
            continue;
        }
        depth[i] = Some(d);
        let insn = insns[i];
        let after = d + stack_delta(insn, cp)?;
        if after < 0 {
            return Err(Error::MalformedInput(format!("operand stack underflow at instruction {}", i)));
        }
        max = max.max(d).max(after);
        for target in insn.targets() {
            work.push((index_of(target)?, after));
        }
        let terminal = insn.opcode().map(is_terminal).unwrap_or(false);
        if !terminal {
            work.push((i + 1, after));
        }
    }
    to_u16("max stack", max as usize)
}

/// Computes the number of local variable slots: the arguments (and `this`)
/// plus every slot an instruction touches. Never less than `code.max_locals`,
/// since rewrites only ever drop uses of locals.
pub fn max_locals(code: &Code, method: Option<&MethodInfo>, cp: &ConstantPool) -> Result<u16> {
    let mut max = 0usize;
    if let Some(method) = method {
        let descriptor = cp.utf8(method.descriptor_index)?;
        let (args, _) = method_descriptor_slots(&descriptor)?;
        max = args as usize + if method.is_static() { 0 } else { 1 };
    }
    for (_, insn) in code.instructions.iter() {
        let used = match *insn {
            Insn::Var { opcode, index, .. } => {
                let size = if opcode == RET { 1 } else { var_size(opcode) };
                usize::from(index) + usize::from(size)
            }
            Insn::Iinc { index, .. } => usize::from(index) + 1,
            Insn::Simple { opcode } => implicit_var(opcode).map(|(i, s)| usize::from(i + s)).unwrap_or(0),
            _ => 0,
        };
        max = max.max(used);
    }
    to_u16("max locals", max.max(usize::from(code.max_locals)))
}

fn write_verification_type(out: &mut Vec<u8>, v: &VerificationTypeInfo, assembled: &Assembled) -> Result<()> {
    out.write_u8(v.tag())?;
    match *v {
        VerificationTypeInfo::Object { class_index } => out.write_u16::<BigEndian>(class_index)?,
        VerificationTypeInfo::Uninitialized { label } => {
            out.write_u16::<BigEndian>(to_u16("uninitialized offset", assembled.pc(label)? as usize)?)?
        }
        _ => {}
    }
    Ok(())
}

/// Encodes a stack map table, deriving each frame's offset delta from the
/// label positions.
pub fn write_stack_map_table(
    out: &mut Vec<u8>,
    frames: &[StackMapFrame],
    assembled: &Assembled,
    mode: RecomputeMode,
) -> Result<()> {
    out.write_u16::<BigEndian>(to_u16("stack map frames", frames.len())?)?;
    let mut previous: Option<u32> = None;
    for frame in frames {
        let pc = assembled.pc(frame.label())?;
        let delta = match previous {
            None => i64::from(pc),
            Some(p) => i64::from(pc) - i64::from(p) - 1,
        };
        if delta < 0 {
            return Err(Error::Invariant(format!("stack map frame at offset {} is out of order", pc)));
        }
        let delta = to_u16("stack map frame offset delta", delta as usize)?;
        previous = Some(pc);
        let short = delta <= 63;
        // A compact frame whose delta no longer fits is only widened when
        // the caller asked for derived values to be recomputed.
        let widen = || -> Result<()> {
            if mode == RecomputeMode::Verbatim {
                return Err(Error::EncodingLimitExceeded {
                    what: "offset delta of a compact stack map frame",
                    value: i64::from(delta),
                    limit: 63,
                });
            }
            Ok(())
        };
        match *frame {
            StackMapFrame::SameFrame { .. } if short => out.write_u8(delta as u8)?,
            StackMapFrame::SameFrame { .. } | StackMapFrame::SameFrameExtended { .. } => {
                if let StackMapFrame::SameFrame { .. } = *frame {
                    widen()?;
                }
                out.write_u8(251)?;
                out.write_u16::<BigEndian>(delta)?;
            }
            StackMapFrame::SameLocals1StackItemFrame { ref stack_item, .. } if short => {
                out.write_u8(64 + delta as u8)?;
                write_verification_type(out, stack_item, assembled)?;
            }
            StackMapFrame::SameLocals1StackItemFrame { ref stack_item, .. }
            | StackMapFrame::SameLocals1StackItemFrameExtended { ref stack_item, .. } => {
                if let StackMapFrame::SameLocals1StackItemFrame { .. } = *frame {
                    widen()?;
                }
                out.write_u8(247)?;
                out.write_u16::<BigEndian>(delta)?;
                write_verification_type(out, stack_item, assembled)?;
            }
            StackMapFrame::ChopFrame { num_chopped, .. } => {
                out.write_u8(251 - num_chopped)?;
                out.write_u16::<BigEndian>(delta)?;
            }
            StackMapFrame::AppendFrame { ref locals, .. } => {
                out.write_u8(251 + locals.len() as u8)?;
                out.write_u16::<BigEndian>(delta)?;
                for v in locals {
                    write_verification_type(out, v, assembled)?;
                }
            }
            StackMapFrame::FullFrame { ref locals, ref stack, .. } => {
                out.write_u8(255)?;
                out.write_u16::<BigEndian>(delta)?;
                out.write_u16::<BigEndian>(to_u16("frame locals", locals.len())?)?;
                for v in locals {
                    write_verification_type(out, v, assembled)?;
                }
                out.write_u16::<BigEndian>(to_u16("frame stack", stack.len())?)?;
                for v in stack {
                    write_verification_type(out, v, assembled)?;
                }
            }
        }
    }
    Ok(())
}

/// Encodes the body of a `Code` attribute.
pub fn write_code(out: &mut Vec<u8>, code: &Code, ctx: &AttributeContext) -> Result<()> {
    let assembled = assemble(&code.instructions)?;
    let (max_stack, max_locals) = match ctx.mode {
        RecomputeMode::Verbatim => (code.max_stack, code.max_locals),
        RecomputeMode::Recompute => (max_stack(code, ctx.cp)?, max_locals(code, ctx.method, ctx.cp)?),
    };
    out.write_u16::<BigEndian>(max_stack)?;
    out.write_u16::<BigEndian>(max_locals)?;
    out.write_u32::<BigEndian>(u32::from(to_u16("code length", assembled.bytecode.len())?))?;
    out.extend_from_slice(&assembled.bytecode);
    out.write_u16::<BigEndian>(to_u16("exception table length", code.exception_table.len())?)?;
    for entry in &code.exception_table {
        for &label in &[entry.start, entry.end, entry.handler] {
            out.write_u16::<BigEndian>(to_u16("exception table offset", assembled.pc(label)? as usize)?)?;
        }
        out.write_u16::<BigEndian>(entry.catch_type)?;
    }
    let nested = AttributeContext { labels: Some(&assembled), ..*ctx };
    write_attributes(out, &code.attributes, &nested)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_assemble_resolves_labels_and_padding() {
        let mut list = InsnList::new();
        let end = list.new_label();
        list.push(Insn::Simple { opcode: ILOAD_0 });
        list.push(Insn::LookupSwitch { default: end, pairs: vec![(7, end)] });
        list.push(Insn::Label(end));
        list.push(Insn::Simple { opcode: RETURN });
        let assembled = assemble(&list).unwrap();
        // iload_0, lookupswitch, 2 bytes padding, default, npairs, key, offset, return
        assert_eq!(assembled.bytecode.len(), 1 + 1 + 2 + 16 + 1);
        assert_eq!(assembled.pc(end).unwrap(), 20);
        assert_eq!(&assembled.bytecode[4..8], &19i32.to_be_bytes());
    }

    #[test]
    fn test_wide_forms_chosen_when_needed() {
        let mut list = InsnList::new();
        list.push(Insn::Var { opcode: ALOAD, index: 300, wide: false });
        list.push(Insn::Iinc { index: 1, increment: 1000, wide: false });
        list.push(Insn::Ldc { opcode: LDC, index: 256 });
        let assembled = assemble(&list).unwrap();
        assert_eq!(&assembled.bytecode[..4], &[WIDE, ALOAD, 0x01, 0x2c]);
        assert_eq!(&assembled.bytecode[4..10], &[WIDE, IINC, 0x00, 0x01, 0x03, 0xe8]);
        assert_eq!(&assembled.bytecode[10..], &[LDC_W, 0x01, 0x00]);
    }

    #[test]
    fn test_unplaced_label() {
        let mut list = InsnList::new();
        let nowhere = list.new_label();
        list.push(Insn::Jump { opcode: GOTO, target: nowhere });
        assert!(assemble(&list).is_err());
    }

    #[test]
    fn test_max_stack_follows_branches_and_handlers() {
        let mut cp = ConstantPool::new();
        let println = cp.add_method_ref("java/io/PrintStream", "println", "(J)V").unwrap();
        let mut code = Code::new(0, 0);
        let handler = code.instructions.new_label();
        let start = code.instructions.new_label();
        code.instructions.push(Insn::Label(start));
        code.instructions.push(Insn::Simple { opcode: ACONST_NULL });
        code.instructions.push(Insn::Simple { opcode: LCONST_1 });
        code.instructions.push(Insn::Cp { opcode: INVOKEVIRTUAL, index: println });
        code.instructions.push(Insn::Simple { opcode: RETURN });
        code.instructions.push(Insn::Label(handler));
        code.instructions.push(Insn::Simple { opcode: DUP });
        code.instructions.push(Insn::Simple { opcode: ATHROW });
        code.exception_table.push(crate::model::class_file::code::ExceptionTableEntry {
            start,
            end: handler,
            handler,
            catch_type: 0,
        });
        assert_eq!(max_stack(&code, &cp).unwrap(), 3);
        code.instructions.push(Insn::Var { opcode: LSTORE, index: 4, wide: false });
        assert_eq!(max_locals(&code, None, &cp).unwrap(), 6);
    }
}
