//! Decoding of method bytecode and of the tables nested in a `Code`
//! attribute. Offsets are turned into labels named after the offset they
//! were read from, and a `Label` pseudo-instruction is placed in front of
//! every instruction some table or branch refers to.

use std::collections::{BTreeSet, HashSet};

use nom::multi::{count, length_count, length_data};
use nom::number::complete::{be_i16, be_i32, be_i8, be_u16, be_u32, be_u8};

use super::class_file::{attributes, cp_index_tag, maybe_cp_index_tag};
use super::{cut, Error, Input, ParseResult};
use crate::model::class_file::attributes::stack_map_frame::{self, VerificationTypeInfo};
use crate::model::class_file::attributes::stack_map_frame::verification_type_info::tags as vti;
use crate::model::class_file::attributes::{AttributeInfo, LineNumberInfo, LocalVariableInfo, StackMapFrame};
use crate::model::class_file::code::{Code, ExceptionTableEntry, Insn, InsnList, Label};
use crate::model::class_file::constant_pool::{ConstantPool, Tag};
use crate::model::class_file::opcode::*;

fn label_at(pc: i64) -> Result<Label, nom::Err<Error>> {
    if pc < 0 || pc > i64::from(u32::max_value()) {
        p_fail!(Error::InvalidOffset { offset: pc });
    }
    Ok(Label(pc as u32))
}

fn switch_padding(input: Input, pc: usize) -> ParseResult<()> {
    let padding = (4 - (pc + 1) % 4) % 4;
    let (input, _) = nom::bytes::complete::take(padding)(input)?;
    Ok((input, ()))
}

fn instruction(input: Input, pc: usize) -> ParseResult<Insn> {
    let at = |offset: i32| label_at(pc as i64 + i64::from(offset));
    let (input, opcode) = be_u8(input)?;
    match opcode {
        NOP..=DCONST_1 | ILOAD_0..=SALOAD | ISTORE_0..=LXOR | I2L..=DCMPG => {
            Ok((input, Insn::Simple { opcode }))
        }
        IRETURN..=RETURN | ARRAYLENGTH | ATHROW | MONITORENTER | MONITOREXIT => {
            Ok((input, Insn::Simple { opcode }))
        }
        BIPUSH => {
            let (input, v) = be_i8(input)?;
            Ok((input, Insn::Int { opcode, operand: i32::from(v) }))
        }
        SIPUSH => {
            let (input, v) = be_i16(input)?;
            Ok((input, Insn::Int { opcode, operand: i32::from(v) }))
        }
        NEWARRAY => {
            let (input, v) = be_u8(input)?;
            Ok((input, Insn::Int { opcode, operand: i32::from(v) }))
        }
        LDC => {
            let (input, index) = be_u8(input)?;
            Ok((input, Insn::Ldc { opcode, index: u16::from(index) }))
        }
        LDC_W | LDC2_W => {
            let (input, index) = be_u16(input)?;
            Ok((input, Insn::Ldc { opcode, index }))
        }
        ILOAD..=ALOAD | ISTORE..=ASTORE | RET => {
            let (input, index) = be_u8(input)?;
            Ok((input, Insn::Var { opcode, index: u16::from(index), wide: false }))
        }
        IINC => {
            let (input, index) = be_u8(input)?;
            let (input, increment) = be_i8(input)?;
            Ok((input, Insn::Iinc { index: u16::from(index), increment: i16::from(increment), wide: false }))
        }
        IFEQ..=JSR | IFNULL | IFNONNULL => {
            let (input, offset) = be_i16(input)?;
            Ok((input, Insn::Jump { opcode, target: at(i32::from(offset))? }))
        }
        GOTO_W | JSR_W => {
            let (input, offset) = be_i32(input)?;
            Ok((input, Insn::Jump { opcode, target: at(offset)? }))
        }
        TABLESWITCH => {
            let (input, _) = switch_padding(input, pc)?;
            let (input, default) = be_i32(input)?;
            let (input, low) = be_i32(input)?;
            let (input, high) = be_i32(input)?;
            if high < low {
                p_fail!(Error::InvalidSwitch { pc });
            }
            let n = (i64::from(high) - i64::from(low) + 1) as usize;
            let (input, offsets) = count(be_i32, n)(input)?;
            let mut targets = Vec::with_capacity(n);
            for offset in offsets {
                targets.push(at(offset)?);
            }
            Ok((input, Insn::TableSwitch { default: at(default)?, low, high, targets }))
        }
        LOOKUPSWITCH => {
            let (input, _) = switch_padding(input, pc)?;
            let (input, default) = be_i32(input)?;
            let (input, npairs) = be_i32(input)?;
            if npairs < 0 {
                p_fail!(Error::InvalidSwitch { pc });
            }
            let (input, raw) = count(nom::sequence::pair(be_i32, be_i32), npairs as usize)(input)?;
            let mut pairs = Vec::with_capacity(raw.len());
            for (key, offset) in raw {
                pairs.push((key, at(offset)?));
            }
            Ok((input, Insn::LookupSwitch { default: at(default)?, pairs }))
        }
        GETSTATIC..=INVOKESTATIC | NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => {
            let (input, index) = be_u16(input)?;
            Ok((input, Insn::Cp { opcode, index }))
        }
        INVOKEINTERFACE => {
            let (input, index) = be_u16(input)?;
            let (input, count) = be_u8(input)?;
            let (input, _) = be_u8(input)?;
            Ok((input, Insn::InvokeInterface { index, count }))
        }
        INVOKEDYNAMIC => {
            let (input, index) = be_u16(input)?;
            let (input, _) = be_u16(input)?;
            Ok((input, Insn::InvokeDynamic { index }))
        }
        MULTIANEWARRAY => {
            let (input, index) = be_u16(input)?;
            let (input, dimensions) = be_u8(input)?;
            Ok((input, Insn::MultiANewArray { index, dimensions }))
        }
        WIDE => {
            let (input, opcode) = be_u8(input)?;
            match opcode {
                ILOAD..=ALOAD | ISTORE..=ASTORE | RET => {
                    let (input, index) = be_u16(input)?;
                    Ok((input, Insn::Var { opcode, index, wide: true }))
                }
                IINC => {
                    let (input, index) = be_u16(input)?;
                    let (input, increment) = be_i16(input)?;
                    Ok((input, Insn::Iinc { index, increment, wide: true }))
                }
                _ => p_fail!(Error::UnknownOpcode { opcode, pc: pc + 1 }),
            }
        }
        _ => p_fail!(Error::UnknownOpcode { opcode, pc }),
    }
}

/// Decodes a `code` array into `(pc, instruction)` pairs.
pub fn instructions(code: Input) -> Result<Vec<(u32, Insn)>, nom::Err<Error>> {
    let mut insns = Vec::new();
    let mut input = code;
    while !input.is_empty() {
        let pc = code.len() - input.len();
        let (rest, insn) = instruction(input, pc).map_err(|e| cut(e, || Error::Truncated { section: "code" }))?;
        insns.push((pc as u32, insn));
        input = rest;
    }
    Ok(insns)
}

fn exception_table_entry<'a>(input: Input<'a>, cp: &ConstantPool) -> ParseResult<'a, ExceptionTableEntry> {
    let (input, start_pc) = be_u16(input)?;
    let (input, end_pc) = be_u16(input)?;
    let (input, handler_pc) = be_u16(input)?;
    let (input, catch_type) = maybe_cp_index_tag(input, cp, Tag::Class)?;
    Ok((
        input,
        ExceptionTableEntry {
            start: Label(u32::from(start_pc)),
            end: Label(u32::from(end_pc)),
            handler: Label(u32::from(handler_pc)),
            catch_type,
        },
    ))
}

/// Collects every label the instructions, exception table and nested
/// attributes refer to.
pub fn referenced_labels<'a, I>(insns: I, exception_table: &[ExceptionTableEntry], attributes: &[AttributeInfo]) -> BTreeSet<Label>
where
    I: IntoIterator<Item = &'a Insn>,
{
    let mut labels = BTreeSet::new();
    for insn in insns {
        labels.extend(insn.targets());
    }
    for entry in exception_table {
        labels.insert(entry.start);
        labels.insert(entry.end);
        labels.insert(entry.handler);
    }
    for attribute in attributes {
        match *attribute {
            AttributeInfo::LineNumberTable { ref entries, .. } => {
                labels.extend(entries.iter().map(|e| e.start));
            }
            AttributeInfo::LocalVariableTable { ref entries, .. }
            | AttributeInfo::LocalVariableTypeTable { ref entries, .. } => {
                for e in entries {
                    labels.insert(e.start);
                    labels.insert(e.end);
                }
            }
            AttributeInfo::StackMapTable { ref entries, .. } => {
                for frame in entries {
                    labels.insert(frame.label());
                    for v in frame.verification_types() {
                        if let VerificationTypeInfo::Uninitialized { label } = *v {
                            labels.insert(label);
                        }
                    }
                }
            }
            _ => {}
        }
    }
    labels
}

/// Parses the body of a `Code` attribute.
pub fn code<'a>(input: Input<'a>, cp: &ConstantPool) -> ParseResult<'a, Code> {
    let (input, max_stack) = be_u16(input)?;
    let (input, max_locals) = be_u16(input)?;
    let (input, bytecode) = length_data(be_u32)(input)?;
    let insns = instructions(bytecode)?;
    let (input, exception_table) = length_count(be_u16, |i| exception_table_entry(i, cp))(input)?;
    let (input, attributes) = attributes(input, cp)?;

    let code_length = bytecode.len() as u32;
    let referenced = referenced_labels(insns.iter().map(|&(_, ref insn)| insn), &exception_table, &attributes);
    let boundaries: HashSet<u32> = insns.iter().map(|&(pc, _)| pc).collect();
    for &Label(pc) in &referenced {
        if pc != code_length && !boundaries.contains(&pc) {
            p_fail!(Error::InvalidOffset { offset: i64::from(pc) });
        }
    }

    let mut instructions = InsnList::new();
    for (pc, insn) in insns {
        if referenced.contains(&Label(pc)) {
            instructions.push(Insn::Label(Label(pc)));
        }
        instructions.push(insn);
    }
    if referenced.contains(&Label(code_length)) {
        instructions.push(Insn::Label(Label(code_length)));
    }
    Ok((input, Code { max_stack, max_locals, instructions, exception_table, attributes }))
}

pub fn line_number_table(input: Input) -> ParseResult<Vec<LineNumberInfo>> {
    length_count(be_u16, |i| {
        let (i, start_pc) = be_u16(i)?;
        let (i, line_number) = be_u16(i)?;
        Ok((i, LineNumberInfo { start: Label(u32::from(start_pc)), line_number }))
    })(input)
}

pub fn local_variable_table<'a>(input: Input<'a>, cp: &ConstantPool) -> ParseResult<'a, Vec<LocalVariableInfo>> {
    length_count(be_u16, |i| {
        let (i, start_pc) = be_u16(i)?;
        let (i, length) = be_u16(i)?;
        let (i, name_index) = cp_index_tag(i, cp, Tag::Utf8)?;
        let (i, descriptor_index) = cp_index_tag(i, cp, Tag::Utf8)?;
        let (i, index) = be_u16(i)?;
        Ok((
            i,
            LocalVariableInfo {
                start: Label(u32::from(start_pc)),
                end: Label(u32::from(start_pc) + u32::from(length)),
                name_index,
                descriptor_index,
                index,
            },
        ))
    })(input)
}

fn verification_type_info(input: Input) -> ParseResult<VerificationTypeInfo> {
    let (input, tag) = be_u8(input)?;
    match tag {
        vti::TOP => Ok((input, VerificationTypeInfo::Top)),
        vti::INTEGER => Ok((input, VerificationTypeInfo::Integer)),
        vti::FLOAT => Ok((input, VerificationTypeInfo::Float)),
        vti::DOUBLE => Ok((input, VerificationTypeInfo::Double)),
        vti::LONG => Ok((input, VerificationTypeInfo::Long)),
        vti::NULL => Ok((input, VerificationTypeInfo::Null)),
        vti::UNINITIALIZED_THIS => Ok((input, VerificationTypeInfo::UninitializedThis)),
        vti::OBJECT => {
            let (input, class_index) = be_u16(input)?;
            Ok((input, VerificationTypeInfo::Object { class_index }))
        }
        vti::UNINITIALIZED => {
            let (input, offset) = be_u16(input)?;
            Ok((input, VerificationTypeInfo::Uninitialized { label: Label(u32::from(offset)) }))
        }
        _ => p_fail!(Error::UnknownVerificationTypeInfoTag { tag }),
    }
}

/// Parses a `StackMapTable`, resolving the relative offsets of the frames
/// into labels.
pub fn stack_map_table(input: Input) -> ParseResult<Vec<StackMapFrame>> {
    let (mut input, number_of_entries) = be_u16(input)?;
    let mut frames = Vec::with_capacity(number_of_entries as usize);
    let mut previous: Option<u32> = None;
    for _ in 0..number_of_entries {
        let (rest, tag) = be_u8(input)?;
        input = rest;
        let (rest, offset_delta) = match stack_map_frame::Tag::from(tag) {
            stack_map_frame::Tag::SameFrame(t) => (input, u16::from(t)),
            stack_map_frame::Tag::SameLocals1StackItemFrame(t) => (input, u16::from(t - 64)),
            stack_map_frame::Tag::Reserved(t) => p_fail!(Error::ReservedStackMapFrameTag { tag: t }),
            _ => be_u16(input)?,
        };
        input = rest;
        let pc = match previous {
            None => u32::from(offset_delta),
            Some(p) => p + u32::from(offset_delta) + 1,
        };
        previous = Some(pc);
        let label = Label(pc);
        let (rest, frame) = match stack_map_frame::Tag::from(tag) {
            stack_map_frame::Tag::SameFrame(_) => (input, StackMapFrame::SameFrame { label }),
            stack_map_frame::Tag::SameLocals1StackItemFrame(_) => {
                let (i, stack_item) = verification_type_info(input)?;
                (i, StackMapFrame::SameLocals1StackItemFrame { label, stack_item })
            }
            stack_map_frame::Tag::SameLocals1StackItemFrameExtended(_) => {
                let (i, stack_item) = verification_type_info(input)?;
                (i, StackMapFrame::SameLocals1StackItemFrameExtended { label, stack_item })
            }
            stack_map_frame::Tag::ChopFrame(t) => (input, StackMapFrame::ChopFrame { label, num_chopped: 251 - t }),
            stack_map_frame::Tag::SameFrameExtended(_) => (input, StackMapFrame::SameFrameExtended { label }),
            stack_map_frame::Tag::AppendFrame(t) => {
                let (i, locals) = count(verification_type_info, (t - 251) as usize)(input)?;
                (i, StackMapFrame::AppendFrame { label, locals })
            }
            stack_map_frame::Tag::FullFrame(_) => {
                let (i, locals) = length_count(be_u16, verification_type_info)(input)?;
                let (i, stack) = length_count(be_u16, verification_type_info)(i)?;
                (i, StackMapFrame::FullFrame { label, locals, stack })
            }
            stack_map_frame::Tag::Reserved(t) => p_fail!(Error::ReservedStackMapFrameTag { tag: t }),
        };
        input = rest;
        frames.push(frame);
    }
    Ok((input, frames))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_decode_branches_and_switch() {
        // 0: iload_0
        // 1: tableswitch (2 bytes padding) default=+27 low=0 high=1 [+23, +25]
        // 24: iconst_0 25: ireturn 26: iconst_1 27: ireturn 28: iconst_m1 ...
        let mut code = vec![ILOAD_0, TABLESWITCH, 0, 0];
        for v in &[27i32, 0, 1, 23, 25] {
            code.extend_from_slice(&v.to_be_bytes());
        }
        code.extend_from_slice(&[ICONST_0, IRETURN, ICONST_1, IRETURN, ICONST_M1, IRETURN]);
        let insns = instructions(&code).unwrap();
        assert_eq!(insns[1].0, 1);
        assert_eq!(
            insns[1].1,
            Insn::TableSwitch { default: Label(28), low: 0, high: 1, targets: vec![Label(24), Label(26)] }
        );
        assert_eq!(insns[2].0, 24);
    }

    #[test]
    fn test_wide() {
        let code = [WIDE, ILOAD, 0x01, 0x00, WIDE, IINC, 0x00, 0x02, 0xff, 0xff];
        let insns = instructions(&code).unwrap();
        assert_eq!(insns[0].1, Insn::Var { opcode: ILOAD, index: 256, wide: true });
        assert_eq!(insns[1].1, Insn::Iinc { index: 2, increment: -1, wide: true });
    }

    #[test]
    fn test_unknown_opcode() {
        let err = instructions(&[NOP, 0xfe]).unwrap_err();
        assert_eq!(err, nom::Err::Failure(Error::UnknownOpcode { opcode: 0xfe, pc: 1 }));
    }

    #[test]
    fn test_truncated() {
        let err = instructions(&[SIPUSH, 0x01]).unwrap_err();
        assert_eq!(err, nom::Err::Failure(Error::Truncated { section: "code" }));
    }

    #[test]
    fn test_stack_map_offsets() {
        // same_frame delta 3, then same_locals_1_stack_item delta 1 (Integer)
        let bytes = [0x00, 0x02, 3, 64 + 1, vti::INTEGER];
        let (rest, frames) = stack_map_table(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(frames[0], StackMapFrame::SameFrame { label: Label(3) });
        assert_eq!(
            frames[1],
            StackMapFrame::SameLocals1StackItemFrame { label: Label(5), stack_item: VerificationTypeInfo::Integer }
        );
    }
}
