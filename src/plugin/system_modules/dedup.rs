//! Shares identical sets between the descriptors built by one generated
//! method.
//!
//! Each set a descriptor needs is counted up front. A set referenced more
//! than once is built into its own local variable the first time it is used
//! and loaded from there afterwards; a set referenced once is built into a
//! scratch slot shared by all such sets of its element type.

use std::collections::{BTreeSet, HashMap};

use crate::error::Result;
use crate::model::class_file::builder::CodeBuilder;
use crate::model::module_descriptor::{AccessModifier, ModuleDescriptor, RequiresModifier};

/// Holds the `jdk/internal/module/Builder` being filled.
pub const BUILDER_VAR: u16 = 0;
/// Holds the array being returned.
pub const MD_VAR: u16 = 1;
const STRING_SET_VAR: u16 = 2;
const ENUM_SET_VAR: u16 = 3;
const FIRST_DEDUP_VAR: u16 = 4;
pub const MAX_LOCAL_VARS: u16 = 256;

/// Sets up to this size use the fixed arity `Set.of` overloads.
const MAX_SET_OF_ARITY: usize = 10;

const JAVA_UTIL_SET: &str = "java/util/Set";
const JAVA_LANG_STRING: &str = "java/lang/String";
const REQUIRES_MODIFIER: &str = "java/lang/module/ModuleDescriptor$Requires$Modifier";
const EXPORTS_MODIFIER: &str = "java/lang/module/ModuleDescriptor$Exports$Modifier";
const OPENS_MODIFIER: &str = "java/lang/module/ModuleDescriptor$Opens$Modifier";

/// A set of values as it appears in generated code. Modifier sets of
/// different clause kinds are different sets even when their elements
/// have the same names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SetKey {
    Strings(BTreeSet<String>),
    Requires(BTreeSet<RequiresModifier>),
    Exports(BTreeSet<AccessModifier>),
    Opens(BTreeSet<AccessModifier>),
}

impl SetKey {
    fn default_var(&self) -> u16 {
        match *self {
            SetKey::Strings(_) => STRING_SET_VAR,
            _ => ENUM_SET_VAR,
        }
    }

    fn elements(&self) -> Vec<Element> {
        fn constants<'a, I>(owner: &'static str, names: I) -> Vec<Element<'a>>
        where
            I: Iterator<Item = &'static str>,
        {
            names.map(|name| Element::EnumConstant { owner, name }).collect()
        }
        match *self {
            SetKey::Strings(ref strings) => strings.iter().map(|s| Element::Str(s)).collect(),
            SetKey::Requires(ref m) => constants(REQUIRES_MODIFIER, m.iter().map(|m| m.java_name())),
            SetKey::Exports(ref m) => constants(EXPORTS_MODIFIER, m.iter().map(|m| m.java_name())),
            SetKey::Opens(ref m) => constants(OPENS_MODIFIER, m.iter().map(|m| m.java_name())),
        }
    }

    /// Emits `Set.of(...)` for this set and stores the result in `var`.
    fn generate(&self, code: &mut CodeBuilder, var: u16) -> Result<()> {
        let elements = self.elements();
        if elements.len() <= MAX_SET_OF_ARITY {
            for e in &elements {
                e.push(code)?;
            }
            let descriptor = format!("({})Ljava/util/Set;", "Ljava/lang/Object;".repeat(elements.len()));
            code.invokestatic_interface(JAVA_UTIL_SET, "of", &descriptor)?;
        } else {
            code.push_int(elements.len() as i32)?;
            code.anewarray(JAVA_LANG_STRING)?;
            for (i, e) in elements.iter().enumerate() {
                code.dup();
                code.push_int(i as i32)?;
                e.push(code)?;
                code.aastore();
            }
            code.invokestatic_interface(JAVA_UTIL_SET, "of", "([Ljava/lang/Object;)Ljava/util/Set;")?;
        }
        code.astore(var);
        Ok(())
    }
}

/// One element of a generated set, in sorted order.
#[derive(Debug, Clone, Copy)]
enum Element<'a> {
    Str(&'a str),
    EnumConstant { owner: &'static str, name: &'static str },
}

impl<'a> Element<'a> {
    fn push(self, code: &mut CodeBuilder) -> Result<()> {
        match self {
            Element::Str(s) => {
                code.ldc_string(s)?;
            }
            Element::EnumConstant { owner, name } => {
                code.getstatic(owner, name, &format!("L{};", owner))?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct SetBuilder {
    ref_count: usize,
    /// The dedicated variable holding the set once it has been built.
    var: Option<u16>,
}

#[derive(Debug)]
pub struct DedupSetBuilder {
    sets: HashMap<SetKey, SetBuilder>,
    next_var: u16,
    enabled: bool,
}

impl DedupSetBuilder {
    /// With `enabled` false every set is rebuilt into its scratch slot on
    /// each use.
    pub fn new(enabled: bool) -> Self {
        DedupSetBuilder { sets: HashMap::new(), next_var: FIRST_DEDUP_VAR, enabled }
    }

    /// Counts a reference to `key`.
    pub fn add(&mut self, key: SetKey) {
        self.sets.entry(key).or_insert_with(SetBuilder::default).ref_count += 1;
    }

    /// Counts the sets `descriptor` will ask for.
    pub fn add_descriptor(&mut self, descriptor: &ModuleDescriptor) {
        for e in &descriptor.exports {
            self.add(SetKey::Strings(e.targets.clone()));
            self.add(SetKey::Exports(e.modifiers.clone()));
        }
        for o in &descriptor.opens {
            self.add(SetKey::Strings(o.targets.clone()));
            self.add(SetKey::Opens(o.modifiers.clone()));
        }
        for r in &descriptor.requires {
            self.add(SetKey::Requires(r.modifiers.clone()));
        }
        self.add(SetKey::Strings(descriptor.uses.clone()));
    }

    /// Returns the variable holding `key`, emitting the code that builds the
    /// set unless an earlier call already did.
    pub fn index_of(&mut self, code: &mut CodeBuilder, key: &SetKey) -> Result<u16> {
        let default = key.default_var();
        let enabled = self.enabled;
        let next_var = &mut self.next_var;
        let builder = self.sets.entry(key.clone()).or_insert_with(SetBuilder::default);
        if let Some(var) = builder.var {
            return Ok(var);
        }
        let mut var = default;
        if enabled && builder.ref_count > 1 {
            let candidate = *next_var;
            *next_var += 1;
            if candidate < MAX_LOCAL_VARS {
                builder.var = Some(candidate);
                var = candidate;
            }
        }
        key.generate(code, var)?;
        Ok(var)
    }

    /// Builds a string set into the scratch slot without sharing it.
    pub fn new_string_set(&mut self, code: &mut CodeBuilder, strings: &BTreeSet<String>) -> Result<u16> {
        SetKey::Strings(strings.clone()).generate(code, STRING_SET_VAR)?;
        Ok(STRING_SET_VAR)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::class_file::builder::ClassBuilder;
    use crate::model::class_file::method_access_flags::{ACC_PUBLIC, ACC_STATIC};
    use crate::model::class_file::{opcode, Insn};

    fn strings(items: &[&str]) -> SetKey {
        SetKey::Strings(items.iter().map(|s| s.to_string()).collect())
    }

    /// Runs `f` against a fresh method body and returns its instructions.
    fn emit<F>(f: F) -> Vec<Insn>
    where
        F: FnOnce(&mut CodeBuilder) -> Result<()>,
    {
        let mut class = ClassBuilder::new("p/Gen", 0);
        class
            .method(ACC_PUBLIC | ACC_STATIC, "gen", "()V", |code| {
                f(code)?;
                code.return_();
                Ok(())
            })
            .unwrap();
        let class = class.build();
        let insns = class.methods[0].code().unwrap().instructions.iter().map(|(_, i)| i.clone()).collect();
        insns
    }

    #[test]
    fn test_shared_set_gets_its_own_var() {
        let mut vars = Vec::new();
        let insns = emit(|code| {
            let mut dedup = DedupSetBuilder::new(true);
            let shared = strings(&["a", "b"]);
            let single = strings(&["c"]);
            dedup.add(shared.clone());
            dedup.add(shared.clone());
            dedup.add(single.clone());
            vars.push(dedup.index_of(code, &shared)?);
            vars.push(dedup.index_of(code, &single)?);
            vars.push(dedup.index_of(code, &shared)?);
            Ok(())
        });
        assert_eq!(vars, vec![FIRST_DEDUP_VAR, STRING_SET_VAR, FIRST_DEDUP_VAR]);
        let is_store = |op: u8| op == opcode::ASTORE || (opcode::ASTORE_0..=opcode::ASTORE_3).contains(&op);
        let stores = insns.iter().filter_map(Insn::opcode).filter(|&op| is_store(op)).count();
        assert_eq!(stores, 2);
    }

    #[test]
    fn test_disabled_always_rebuilds() {
        let mut vars = Vec::new();
        let insns = emit(|code| {
            let mut dedup = DedupSetBuilder::new(false);
            let shared = strings(&["a"]);
            dedup.add(shared.clone());
            dedup.add(shared.clone());
            vars.push(dedup.index_of(code, &shared)?);
            vars.push(dedup.index_of(code, &shared)?);
            Ok(())
        });
        assert_eq!(vars, vec![STRING_SET_VAR, STRING_SET_VAR]);
        let calls = insns.iter().filter(|i| i.opcode() == Some(opcode::INVOKESTATIC)).count();
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_distinct_sets_get_distinct_vars() {
        let mut vars = Vec::new();
        emit(|code| {
            let mut dedup = DedupSetBuilder::new(true);
            let mods = SetKey::Exports(BTreeSet::new());
            let other = SetKey::Opens(BTreeSet::new());
            for key in &[&mods, &mods, &other, &other] {
                dedup.add((*key).clone());
            }
            vars.push(dedup.index_of(code, &mods)?);
            vars.push(dedup.index_of(code, &other)?);
            Ok(())
        });
        assert_eq!(vars, vec![FIRST_DEDUP_VAR, FIRST_DEDUP_VAR + 1]);
    }

    #[test]
    fn test_out_of_vars_falls_back_to_default() {
        let mut last = 0;
        emit(|code| {
            let mut dedup = DedupSetBuilder::new(true);
            let keys: Vec<SetKey> = (0..(MAX_LOCAL_VARS - FIRST_DEDUP_VAR + 1))
                .map(|i| SetKey::Strings(Some(i.to_string()).into_iter().collect()))
                .collect();
            for key in &keys {
                dedup.add(key.clone());
                dedup.add(key.clone());
            }
            for key in &keys {
                last = dedup.index_of(code, key)?;
            }
            Ok(())
        });
        assert_eq!(last, STRING_SET_VAR);
    }

    #[test]
    fn test_large_set_uses_array() {
        let items: BTreeSet<String> = (0..11).map(|i| format!("m{:02}", i)).collect();
        let insns = emit(|code| {
            DedupSetBuilder::new(true).new_string_set(code, &items)?;
            Ok(())
        });
        assert!(insns.iter().any(|i| i.opcode() == Some(opcode::ANEWARRAY)));
        assert_eq!(insns.iter().filter(|i| i.opcode() == Some(opcode::AASTORE)).count(), 11);
    }
}
