//! Programmatic construction of classes, used for generated classes and for
//! building test inputs.
//!
//! Generated code is encoded with `RecomputeMode::Recompute`, so the builders
//! leave `max_stack` and `max_locals` at zero.

use super::attributes::{names, AttributeInfo};
use super::code::{Code, Insn, Label};
use super::constant_pool::{ConstantPool, ConstantPoolInfo};
use super::opcode::*;
use super::{class_access_flags, constant_pool_index, method_access_flags, u1, ClassFile, MethodInfo};
use crate::error::{Error, Result};
use crate::util::modified_utf8;
use crate::writer::{self, RecomputeMode};

/// The class file version of generated classes (Java 8).
pub const GENERATED_MAJOR_VERSION: u16 = 52;

pub const JAVA_LANG_OBJECT: &str = "java/lang/Object";

pub struct ClassBuilder {
    class: ClassFile,
}

impl ClassBuilder {
    /// Starts a class extending `java/lang/Object`. `name` is an internal
    /// name.
    pub fn new(name: &str, access_flags: class_access_flags::t) -> Self {
        let constant_pool = ConstantPool::from_entries(vec![
            ConstantPoolInfo::Utf8 { bytes: modified_utf8::from_str(name) },
            ConstantPoolInfo::Class { name_index: 1 },
            ConstantPoolInfo::Utf8 { bytes: modified_utf8::from_str(JAVA_LANG_OBJECT) },
            ConstantPoolInfo::Class { name_index: 3 },
        ]);
        ClassBuilder {
            class: ClassFile {
                minor_version: 0,
                major_version: GENERATED_MAJOR_VERSION,
                constant_pool,
                access_flags,
                this_class: 2,
                super_class: 4,
                interfaces: Vec::new(),
                fields: Vec::new(),
                methods: Vec::new(),
                attributes: Vec::new(),
            },
        }
    }

    pub fn version(&mut self, major_version: u16) -> &mut Self {
        self.class.major_version = major_version;
        self
    }

    pub fn implements(&mut self, interface: &str) -> Result<&mut Self> {
        let index = self.class.constant_pool.add_class(interface)?;
        self.class.interfaces.push(index);
        Ok(self)
    }

    pub fn constant_pool_mut(&mut self) -> &mut ConstantPool {
        &mut self.class.constant_pool
    }

    /// Adds a method whose body is produced by `body`. Abstract and native
    /// methods get no `Code` attribute and `body` is not called.
    pub fn method<F>(
        &mut self,
        access_flags: method_access_flags::t,
        name: &str,
        descriptor: &str,
        body: F,
    ) -> Result<&mut Self>
    where
        F: FnOnce(&mut CodeBuilder) -> Result<()>,
    {
        let cp = &mut self.class.constant_pool;
        let name_index = cp.add_utf8(name)?;
        let descriptor_index = cp.add_utf8(descriptor)?;
        let mut attributes = Vec::new();
        let bodiless = method_access_flags::ACC_ABSTRACT | method_access_flags::ACC_NATIVE;
        if access_flags & bodiless == 0 {
            let attribute_name_index = cp.add_utf8(names::CODE)?;
            let mut code = CodeBuilder { cp, code: Code::new(0, 0) };
            body(&mut code)?;
            attributes.push(AttributeInfo::Code { attribute_name_index, code: code.code });
        }
        self.class.methods.push(MethodInfo { access_flags, name_index, descriptor_index, attributes });
        Ok(self)
    }

    /// `public <init>()V` calling the `java/lang/Object` constructor.
    pub fn default_constructor(&mut self, access_flags: method_access_flags::t) -> Result<&mut Self> {
        self.method(access_flags, "<init>", "()V", |code| {
            code.aload(0);
            code.invokespecial(JAVA_LANG_OBJECT, "<init>", "()V")?;
            code.return_();
            Ok(())
        })
    }

    pub fn build(self) -> ClassFile {
        self.class
    }

    /// Encodes the class, computing stack and local sizes.
    pub fn to_bytes(self) -> Result<Vec<u8>> {
        writer::encode(&self.class, RecomputeMode::Recompute)
    }
}

/// Appends instructions to a method body, choosing the compact encoding of
/// each instruction where one exists.
pub struct CodeBuilder<'a> {
    cp: &'a mut ConstantPool,
    code: Code,
}

impl<'a> CodeBuilder<'a> {
    pub fn insn(&mut self, insn: Insn) -> &mut Self {
        self.code.instructions.push(insn);
        self
    }

    fn simple(&mut self, opcode: u1) -> &mut Self {
        self.insn(Insn::Simple { opcode })
    }

    fn cp_insn(&mut self, opcode: u1, index: constant_pool_index) -> &mut Self {
        self.insn(Insn::Cp { opcode, index })
    }

    pub fn new_label(&mut self) -> Label {
        self.code.instructions.new_label()
    }

    pub fn place(&mut self, label: Label) -> &mut Self {
        self.insn(Insn::Label(label))
    }

    pub fn jump(&mut self, opcode: u1, target: Label) -> &mut Self {
        self.insn(Insn::Jump { opcode, target })
    }

    fn var(&mut self, compact: u1, opcode: u1, slot: u16) -> &mut Self {
        if slot <= 3 {
            self.simple(compact + slot as u8)
        } else {
            self.insn(Insn::Var { opcode, index: slot, wide: false })
        }
    }

    pub fn aload(&mut self, slot: u16) -> &mut Self {
        self.var(ALOAD_0, ALOAD, slot)
    }

    pub fn astore(&mut self, slot: u16) -> &mut Self {
        self.var(ASTORE_0, ASTORE, slot)
    }

    /// Pushes an int constant using `iconst_<n>`, `bipush` or `sipush`.
    pub fn push_int(&mut self, value: i32) -> Result<&mut Self> {
        Ok(match value {
            -1..=5 => self.simple((ICONST_0 as i32 + value) as u8),
            -128..=127 => self.insn(Insn::Int { opcode: BIPUSH, operand: value }),
            -32768..=32767 => self.insn(Insn::Int { opcode: SIPUSH, operand: value }),
            _ => {
                return Err(Error::EncodingLimitExceeded {
                    what: "integer operand of a generated push",
                    value: i64::from(value),
                    limit: i64::from(i16::max_value()),
                })
            }
        })
    }

    fn ldc(&mut self, index: constant_pool_index) -> &mut Self {
        let opcode = if index <= 0xff { LDC } else { LDC_W };
        self.insn(Insn::Ldc { opcode, index })
    }

    pub fn ldc_int(&mut self, value: i32) -> Result<&mut Self> {
        let index = self.cp.add_integer(value)?;
        Ok(self.ldc(index))
    }

    pub fn ldc_string(&mut self, value: &str) -> Result<&mut Self> {
        let index = self.cp.add_string(value)?;
        Ok(self.ldc(index))
    }

    pub fn new_(&mut self, class: &str) -> Result<&mut Self> {
        let index = self.cp.add_class(class)?;
        Ok(self.cp_insn(NEW, index))
    }

    pub fn anewarray(&mut self, class: &str) -> Result<&mut Self> {
        let index = self.cp.add_class(class)?;
        Ok(self.cp_insn(ANEWARRAY, index))
    }

    pub fn newarray(&mut self, array_type: u8) -> &mut Self {
        self.insn(Insn::Int { opcode: NEWARRAY, operand: i32::from(array_type) })
    }

    pub fn getstatic(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<&mut Self> {
        let index = self.cp.add_field_ref(owner, name, descriptor)?;
        Ok(self.cp_insn(GETSTATIC, index))
    }

    pub fn invokestatic(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<&mut Self> {
        let index = self.cp.add_method_ref(owner, name, descriptor)?;
        Ok(self.cp_insn(INVOKESTATIC, index))
    }

    /// A static call to a method declared by an interface, such as `Set.of`.
    pub fn invokestatic_interface(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<&mut Self> {
        let index = self.cp.add_interface_method_ref(owner, name, descriptor)?;
        Ok(self.cp_insn(INVOKESTATIC, index))
    }

    pub fn invokevirtual(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<&mut Self> {
        let index = self.cp.add_method_ref(owner, name, descriptor)?;
        Ok(self.cp_insn(INVOKEVIRTUAL, index))
    }

    pub fn invokespecial(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<&mut Self> {
        let index = self.cp.add_method_ref(owner, name, descriptor)?;
        Ok(self.cp_insn(INVOKESPECIAL, index))
    }

    pub fn dup(&mut self) -> &mut Self {
        self.simple(DUP)
    }

    pub fn pop(&mut self) -> &mut Self {
        self.simple(POP)
    }

    pub fn aastore(&mut self) -> &mut Self {
        self.simple(AASTORE)
    }

    pub fn bastore(&mut self) -> &mut Self {
        self.simple(BASTORE)
    }

    pub fn areturn(&mut self) -> &mut Self {
        self.simple(ARETURN)
    }

    pub fn ireturn(&mut self) -> &mut Self {
        self.simple(IRETURN)
    }

    pub fn return_(&mut self) -> &mut Self {
        self.simple(RETURN)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::class_file::method_access_flags::{ACC_ABSTRACT, ACC_PUBLIC};

    fn first_code(class: &ClassFile) -> &Code {
        class.methods[0].code().unwrap()
    }

    #[test]
    fn test_push_int_encodings() {
        let mut builder = ClassBuilder::new("T", 0);
        builder
            .method(ACC_PUBLIC, "m", "()V", |code| {
                for &v in &[-1, 5, 6, -128, 127, 128, -32768, 32767] {
                    code.push_int(v)?;
                }
                Ok(())
            })
            .unwrap();
        let class = builder.build();
        let insns: Vec<Insn> = first_code(&class).instructions.iter().map(|(_, i)| i.clone()).collect();
        assert_eq!(
            insns,
            vec![
                Insn::Simple { opcode: ICONST_M1 },
                Insn::Simple { opcode: ICONST_5 },
                Insn::Int { opcode: BIPUSH, operand: 6 },
                Insn::Int { opcode: BIPUSH, operand: -128 },
                Insn::Int { opcode: BIPUSH, operand: 127 },
                Insn::Int { opcode: SIPUSH, operand: 128 },
                Insn::Int { opcode: SIPUSH, operand: -32768 },
                Insn::Int { opcode: SIPUSH, operand: 32767 },
            ]
        );
    }

    #[test]
    fn test_push_int_limit() {
        let mut builder = ClassBuilder::new("T", 0);
        let err = builder.method(ACC_PUBLIC, "m", "()V", |code| code.push_int(32768).map(|_| ())).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::EncodingLimitExceeded);
    }

    #[test]
    fn test_abstract_method_has_no_code() {
        let mut builder = ClassBuilder::new("T", 0);
        builder.method(ACC_PUBLIC | ACC_ABSTRACT, "m", "()V", |_| panic!("no body expected")).unwrap();
        assert!(builder.build().methods[0].code().is_none());
    }

    #[test]
    fn test_compact_local_access() {
        let mut builder = ClassBuilder::new("T", 0);
        builder
            .method(ACC_PUBLIC, "m", "()V", |code| {
                code.aload(3).astore(4);
                Ok(())
            })
            .unwrap();
        let class = builder.build();
        let insns: Vec<&Insn> = first_code(&class).instructions.iter().map(|(_, i)| i).collect();
        assert_eq!(*insns[0], Insn::Simple { opcode: ALOAD_3 });
        assert_eq!(*insns[1], Insn::Var { opcode: ASTORE, index: 4, wide: false });
    }
}
