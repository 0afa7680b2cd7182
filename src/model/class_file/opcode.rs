//! Instruction opcodes (JVMS §6.5, §7).

use super::u1;

pub const NOP: u1 = 0x00;
pub const ACONST_NULL: u1 = 0x01;
pub const ICONST_M1: u1 = 0x02;
pub const ICONST_0: u1 = 0x03;
pub const ICONST_1: u1 = 0x04;
pub const ICONST_2: u1 = 0x05;
pub const ICONST_3: u1 = 0x06;
pub const ICONST_4: u1 = 0x07;
pub const ICONST_5: u1 = 0x08;
pub const LCONST_0: u1 = 0x09;
pub const LCONST_1: u1 = 0x0a;
pub const FCONST_0: u1 = 0x0b;
pub const FCONST_1: u1 = 0x0c;
pub const FCONST_2: u1 = 0x0d;
pub const DCONST_0: u1 = 0x0e;
pub const DCONST_1: u1 = 0x0f;
pub const BIPUSH: u1 = 0x10;
pub const SIPUSH: u1 = 0x11;
pub const LDC: u1 = 0x12;
pub const LDC_W: u1 = 0x13;
pub const LDC2_W: u1 = 0x14;
pub const ILOAD: u1 = 0x15;
pub const LLOAD: u1 = 0x16;
pub const FLOAD: u1 = 0x17;
pub const DLOAD: u1 = 0x18;
pub const ALOAD: u1 = 0x19;
pub const ILOAD_0: u1 = 0x1a;
pub const LLOAD_0: u1 = 0x1e;
pub const FLOAD_0: u1 = 0x22;
pub const DLOAD_0: u1 = 0x26;
pub const ALOAD_0: u1 = 0x2a;
pub const ALOAD_3: u1 = 0x2d;
pub const IALOAD: u1 = 0x2e;
pub const LALOAD: u1 = 0x2f;
pub const FALOAD: u1 = 0x30;
pub const DALOAD: u1 = 0x31;
pub const AALOAD: u1 = 0x32;
pub const BALOAD: u1 = 0x33;
pub const CALOAD: u1 = 0x34;
pub const SALOAD: u1 = 0x35;
pub const ISTORE: u1 = 0x36;
pub const LSTORE: u1 = 0x37;
pub const FSTORE: u1 = 0x38;
pub const DSTORE: u1 = 0x39;
pub const ASTORE: u1 = 0x3a;
pub const ISTORE_0: u1 = 0x3b;
pub const LSTORE_0: u1 = 0x3f;
pub const FSTORE_0: u1 = 0x43;
pub const DSTORE_0: u1 = 0x47;
pub const ASTORE_0: u1 = 0x4b;
pub const ASTORE_3: u1 = 0x4e;
pub const IASTORE: u1 = 0x4f;
pub const LASTORE: u1 = 0x50;
pub const FASTORE: u1 = 0x51;
pub const DASTORE: u1 = 0x52;
pub const AASTORE: u1 = 0x53;
pub const BASTORE: u1 = 0x54;
pub const CASTORE: u1 = 0x55;
pub const SASTORE: u1 = 0x56;
pub const POP: u1 = 0x57;
pub const POP2: u1 = 0x58;
pub const DUP: u1 = 0x59;
pub const DUP_X1: u1 = 0x5a;
pub const DUP_X2: u1 = 0x5b;
pub const DUP2: u1 = 0x5c;
pub const DUP2_X1: u1 = 0x5d;
pub const DUP2_X2: u1 = 0x5e;
pub const SWAP: u1 = 0x5f;
pub const IADD: u1 = 0x60;
pub const LADD: u1 = 0x61;
pub const DREM: u1 = 0x73;
pub const INEG: u1 = 0x74;
pub const DNEG: u1 = 0x77;
pub const ISHL: u1 = 0x78;
pub const LSHL: u1 = 0x79;
pub const LUSHR: u1 = 0x7d;
pub const IAND: u1 = 0x7e;
pub const LXOR: u1 = 0x83;
pub const IINC: u1 = 0x84;
pub const I2L: u1 = 0x85;
pub const I2B: u1 = 0x91;
pub const I2S: u1 = 0x93;
pub const LCMP: u1 = 0x94;
pub const FCMPL: u1 = 0x95;
pub const FCMPG: u1 = 0x96;
pub const DCMPL: u1 = 0x97;
pub const DCMPG: u1 = 0x98;
pub const IFEQ: u1 = 0x99;
pub const IFLE: u1 = 0x9e;
pub const IF_ICMPEQ: u1 = 0x9f;
pub const IF_ACMPNE: u1 = 0xa6;
pub const GOTO: u1 = 0xa7;
pub const JSR: u1 = 0xa8;
pub const RET: u1 = 0xa9;
pub const TABLESWITCH: u1 = 0xaa;
pub const LOOKUPSWITCH: u1 = 0xab;
pub const IRETURN: u1 = 0xac;
pub const LRETURN: u1 = 0xad;
pub const FRETURN: u1 = 0xae;
pub const DRETURN: u1 = 0xaf;
pub const ARETURN: u1 = 0xb0;
pub const RETURN: u1 = 0xb1;
pub const GETSTATIC: u1 = 0xb2;
pub const PUTSTATIC: u1 = 0xb3;
pub const GETFIELD: u1 = 0xb4;
pub const PUTFIELD: u1 = 0xb5;
pub const INVOKEVIRTUAL: u1 = 0xb6;
pub const INVOKESPECIAL: u1 = 0xb7;
pub const INVOKESTATIC: u1 = 0xb8;
pub const INVOKEINTERFACE: u1 = 0xb9;
pub const INVOKEDYNAMIC: u1 = 0xba;
pub const NEW: u1 = 0xbb;
pub const NEWARRAY: u1 = 0xbc;
pub const ANEWARRAY: u1 = 0xbd;
pub const ARRAYLENGTH: u1 = 0xbe;
pub const ATHROW: u1 = 0xbf;
pub const CHECKCAST: u1 = 0xc0;
pub const INSTANCEOF: u1 = 0xc1;
pub const MONITORENTER: u1 = 0xc2;
pub const MONITOREXIT: u1 = 0xc3;
pub const WIDE: u1 = 0xc4;
pub const MULTIANEWARRAY: u1 = 0xc5;
pub const IFNULL: u1 = 0xc6;
pub const IFNONNULL: u1 = 0xc7;
pub const GOTO_W: u1 = 0xc8;
pub const JSR_W: u1 = 0xc9;

/// `newarray` element type codes.
pub mod array_type {
    use super::u1;
    pub const T_BOOLEAN: u1 = 4;
    pub const T_BYTE: u1 = 8;
    pub const T_INT: u1 = 10;
}

/// The local variable slot implied by a compact load or store such as
/// `aload_2`, together with the slot size.
pub fn implicit_var(opcode: u1) -> Option<(u16, u16)> {
    let (base, size) = match opcode {
        0x1a..=0x1d => (ILOAD_0, 1),
        0x1e..=0x21 => (LLOAD_0, 2),
        0x22..=0x25 => (FLOAD_0, 1),
        0x26..=0x29 => (DLOAD_0, 2),
        0x2a..=0x2d => (ALOAD_0, 1),
        0x3b..=0x3e => (ISTORE_0, 1),
        0x3f..=0x42 => (LSTORE_0, 2),
        0x43..=0x46 => (FSTORE_0, 1),
        0x47..=0x4a => (DSTORE_0, 2),
        0x4b..=0x4e => (ASTORE_0, 1),
        _ => return None,
    };
    Some((u16::from(opcode - base), size))
}

/// The slot size of the value moved by an explicit load or store.
pub fn var_size(opcode: u1) -> u16 {
    match opcode {
        LLOAD | DLOAD | LSTORE | DSTORE => 2,
        _ => 1,
    }
}

pub fn is_jump(opcode: u1) -> bool {
    match opcode {
        IFEQ..=JSR | IFNULL | IFNONNULL | GOTO_W | JSR_W => true,
        _ => false,
    }
}

/// Instructions after which control never falls through to the next one.
pub fn is_terminal(opcode: u1) -> bool {
    match opcode {
        GOTO | GOTO_W | RET | TABLESWITCH | LOOKUPSWITCH | ATHROW => true,
        IRETURN..=RETURN => true,
        _ => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_implicit_var() {
        assert_eq!(implicit_var(ALOAD_0), Some((0, 1)));
        assert_eq!(implicit_var(ALOAD_3), Some((3, 1)));
        assert_eq!(implicit_var(0x41), Some((2, 2))); // lstore_2
        assert_eq!(implicit_var(ALOAD), None);
    }

    #[test]
    fn test_classification() {
        assert!(is_jump(IFEQ));
        assert!(is_jump(GOTO_W));
        assert!(!is_jump(RET));
        assert!(is_terminal(ARETURN));
        assert!(!is_terminal(INVOKESTATIC));
    }
}
