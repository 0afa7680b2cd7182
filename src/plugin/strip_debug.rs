//! Removes source file names, line numbers and local variable tables.

use log::trace;

use super::{Category, LinkContext, Plugin, Transformer};
use crate::config::PluginConfig;
use crate::error::{Error, Result};
use crate::model::class_file::{AttributeInfo, ClassFile};
use crate::parser::parse_class_file;
use crate::pool::{Artifact, Pool};
use crate::writer::{encode, RecomputeMode};

pub const NAME: &str = "strip-debug";

#[derive(Debug, Default)]
pub struct StripDebugPlugin;

impl StripDebugPlugin {
    pub fn configure(_config: &PluginConfig) -> Result<Self> {
        Ok(StripDebugPlugin)
    }
}

impl Plugin for StripDebugPlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn category(&self) -> Category {
        Category::Transformer
    }
}

impl Transformer for StripDebugPlugin {
    fn transform(&self, input: &Pool, _context: &LinkContext) -> Result<Pool> {
        let mut out = input.builder();
        input.transform_and_copy(
            |artifact| {
                if !artifact.is_class() || artifact.is_module_info() {
                    return Ok(Some(artifact.clone()));
                }
                strip_artifact(artifact).map(Some).map_err(|e| e.at(artifact.path()))
            },
            &mut out,
        )?;
        Ok(out.build())
    }
}

fn strip_artifact(artifact: &Artifact) -> Result<Artifact> {
    let mut class = parse_class_file(artifact.content())
        .map_err(|cause| Error::MalformedClass { path: artifact.path().to_owned(), cause })?;
    let removed = strip_class(&mut class);
    if removed == 0 {
        return Ok(artifact.clone());
    }
    trace!("{}: removed {} debug attribute(s)", artifact.path(), removed);
    Ok(artifact.with_content(encode(&class, RecomputeMode::Verbatim)?))
}

fn strip(attributes: &mut Vec<AttributeInfo>) -> usize {
    let before = attributes.len();
    attributes.retain(|a| !a.is_debug_info());
    before - attributes.len()
}

/// Removes debug attributes from the class, its fields, its methods and
/// their code, returning how many were removed.
pub fn strip_class(class: &mut ClassFile) -> usize {
    let mut removed = strip(&mut class.attributes);
    for field in &mut class.fields {
        removed += strip(&mut field.attributes);
    }
    for method in &mut class.methods {
        removed += strip(&mut method.attributes);
        if let Some(code) = method.code_mut() {
            removed += strip(&mut code.attributes);
        }
    }
    removed
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::class_file::attributes::{names, LineNumberInfo};
    use crate::model::class_file::builder::ClassBuilder;
    use crate::model::class_file::class_access_flags::ACC_PUBLIC;
    use crate::pool::PoolBuilder;

    fn class_with_lines() -> Vec<u8> {
        let mut builder = ClassBuilder::new("p/A", ACC_PUBLIC);
        builder
            .method(ACC_PUBLIC, "run", "()V", |code| {
                let start = code.new_label();
                code.place(start);
                code.return_();
                Ok(())
            })
            .unwrap();
        let mut class = builder.build();
        let cp = &mut class.constant_pool;
        let source_name = cp.add_utf8(names::SOURCE_FILE).unwrap();
        let source = cp.add_utf8("A.java").unwrap();
        let lines_name = cp.add_utf8(names::LINE_NUMBER_TABLE).unwrap();
        class.attributes.push(AttributeInfo::SourceFile { attribute_name_index: source_name, sourcefile_index: source });
        let code = class.methods[0].code_mut().unwrap();
        let start = match code.instructions.iter().next() {
            Some((_, &crate::model::class_file::Insn::Label(label))) => label,
            _ => unreachable!(),
        };
        code.attributes.push(AttributeInfo::LineNumberTable {
            attribute_name_index: lines_name,
            entries: vec![LineNumberInfo { start, line_number: 3 }],
        });
        code.max_stack = 0;
        code.max_locals = 1;
        encode(&class, RecomputeMode::Verbatim).unwrap()
    }

    #[test]
    fn test_strips_debug_attributes() {
        let mut builder = PoolBuilder::new();
        builder.add(Artifact::class_or_resource("/m/p/A.class", class_with_lines()).unwrap()).unwrap();
        builder.add(Artifact::class_or_resource("/m/p/a.txt", b"text".to_vec()).unwrap()).unwrap();
        let pool = builder.build();
        let out = StripDebugPlugin.transform(&pool, &LinkContext::new()).unwrap();

        let class = parse_class_file(out.get("/m/p/A.class").unwrap().content()).unwrap();
        assert!(class.find_attribute(names::SOURCE_FILE).is_none());
        assert!(class.methods[0].code().unwrap().attributes.is_empty());
        assert_eq!(out.get("/m/p/a.txt").unwrap().content(), b"text");
    }

    #[test]
    fn test_class_without_debug_info_is_unchanged() {
        let bytes = ClassBuilder::new("p/B", ACC_PUBLIC).to_bytes().unwrap();
        let mut builder = PoolBuilder::new();
        builder.add(Artifact::class_or_resource("/m/p/B.class", bytes.clone()).unwrap()).unwrap();
        let out = StripDebugPlugin.transform(&builder.build(), &LinkContext::new()).unwrap();
        assert_eq!(out.get("/m/p/B.class").unwrap().content(), &bytes[..]);
    }
}
