//! Folds `Class.forName("<constant>")` into a class literal.
//!
//! The call is replaced only when the named class is known to the image and
//! the caller could have referred to it directly; anything else is left for
//! the runtime to resolve.

use log::{debug, trace};

use super::context::{is_accessible, ClassIndex};
use super::{Category, LinkContext, Plugin, Previsitor, Transformer};
use crate::config::PluginConfig;
use crate::error::{Error, Result};
use crate::model::class_file::opcode::{INVOKESTATIC, LDC, LDC_W};
use crate::model::class_file::{ConstantPool, ConstantPoolInfo, Insn, InsnId, InsnList};
use crate::model::module_descriptor::to_internal_name;
use crate::parser::parse_class_file;
use crate::pool::{Artifact, Pool};
use crate::writer::{encode_verified, RecomputeMode};

pub const NAME: &str = "class-for-name";

const JAVA_LANG_CLASS: &str = "java/lang/Class";
const FOR_NAME: &str = "forName";
const FOR_NAME_DESCRIPTOR: &str = "(Ljava/lang/String;)Ljava/lang/Class;";

/// Class literals in `ldc` need version 49.
const MIN_MAJOR_VERSION: u16 = 49;

#[derive(Debug, Default)]
pub struct ClassForNamePlugin;

impl ClassForNamePlugin {
    pub fn configure(_config: &PluginConfig) -> Result<Self> {
        Ok(ClassForNamePlugin)
    }
}

impl Plugin for ClassForNamePlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn category(&self) -> Category {
        Category::Transformer
    }
}

impl Previsitor for ClassForNamePlugin {
    fn previsit(&self, input: &Pool, context: &mut LinkContext) -> Result<()> {
        context.class_index = ClassIndex::build(input)?;
        Ok(())
    }
}

impl Transformer for ClassForNamePlugin {
    fn transform(&self, input: &Pool, context: &LinkContext) -> Result<Pool> {
        let mut out = input.builder();
        input.transform_and_copy(
            |artifact| {
                if !artifact.is_class() || artifact.is_module_info() {
                    return Ok(Some(artifact.clone()));
                }
                let rewritten = rewrite_class(artifact, &context.class_index).map_err(|e| e.at(artifact.path()))?;
                Ok(Some(match rewritten {
                    Some(bytes) => artifact.with_content(bytes),
                    None => artifact.clone(),
                }))
            },
            &mut out,
        )?;
        Ok(out.build())
    }
}

/// A `ldc "<name>"` immediately followed by a `Class.forName` call.
#[derive(Debug)]
struct Candidate {
    ldc: InsnId,
    call: InsnId,
    name: String,
}

/// Returns the new class bytes, or `None` if the class needs no change.
fn rewrite_class(artifact: &Artifact, index: &ClassIndex) -> Result<Option<Vec<u8>>> {
    let mut class = parse_class_file(artifact.content())
        .map_err(|cause| Error::MalformedClass { path: artifact.path().to_owned(), cause })?;
    if class.major_version < MIN_MAJOR_VERSION {
        trace!("{}: version {} predates class literals", artifact.path(), class.major_version);
        return Ok(None);
    }
    let caller = class.name()?;
    let cp = &mut class.constant_pool;
    let mut folded = 0;
    for method in &mut class.methods {
        if let Some(code) = method.code_mut() {
            folded += rewrite_method(&mut code.instructions, cp, &caller, artifact.module(), index)?;
        }
    }
    if folded == 0 {
        return Ok(None);
    }
    debug!("{}: folded {} Class.forName call(s)", artifact.path(), folded);
    for method in &mut class.methods {
        if let Some(code) = method.code_mut() {
            code.instructions.compact();
        }
    }
    encode_verified(&class, RecomputeMode::Recompute).map(Some)
}

fn is_for_name(cp: &ConstantPool, index: u16) -> bool {
    match cp.member_ref(index) {
        Ok(m) => m.owner == JAVA_LANG_CLASS && m.name == FOR_NAME && m.descriptor == FOR_NAME_DESCRIPTOR,
        Err(_) => false,
    }
}

fn candidates(insns: &InsnList, cp: &ConstantPool) -> Vec<Candidate> {
    let mut found = Vec::new();
    let mut pending: Option<(InsnId, String)> = None;
    for (id, insn) in insns.iter() {
        match *insn {
            Insn::Label(_) => continue,
            Insn::Ldc { opcode, index } if opcode == LDC || opcode == LDC_W => {
                pending = match cp.get(index) {
                    Some(&ConstantPoolInfo::String { .. }) => {
                        catching!("unreadable string constant: {}", cp.string(index)).map(|name| (id, name))
                    }
                    _ => None,
                };
                continue;
            }
            Insn::Cp { opcode: INVOKESTATIC, index } if is_for_name(cp, index) => {
                if let Some((ldc, name)) = pending.take() {
                    found.push(Candidate { ldc, call: id, name });
                }
            }
            _ => {}
        }
        pending = None;
    }
    found
}

/// Rewrites the candidates of one method and returns how many were folded.
fn rewrite_method(
    insns: &mut InsnList,
    cp: &mut ConstantPool,
    caller: &str,
    module: &str,
    index: &ClassIndex,
) -> Result<usize> {
    let mut folded = 0;
    for candidate in candidates(insns, cp) {
        let target = to_internal_name(&candidate.name);
        let entry = match index.find(&target, module) {
            Some(entry) => entry,
            None => {
                debug!("{}: Class.forName({:?}) names no class in the image", caller, candidate.name);
                continue;
            }
        };
        if !is_accessible(caller, &target, entry) {
            debug!("{}: {} is not accessible from the caller", caller, target);
            continue;
        }
        let class_index = cp.add_class(&target)?;
        let opcode = if class_index <= 0xff { LDC } else { LDC_W };
        insns.remove(candidate.ldc);
        insns.replace(candidate.call, Insn::Ldc { opcode, index: class_index });
        folded += 1;
    }
    Ok(folded)
}
