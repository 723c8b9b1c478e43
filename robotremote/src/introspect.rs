//! Argument and documentation introspection.

use crate::library::Signature;
use crate::registry::KeywordRegistry;

/// Documentation name for the library's own overview.
pub const INTRO_DOC: &str = "__intro__";
/// Documentation name for the library initializer. Always empty.
pub const INIT_DOC: &str = "__init__";

/// Argument specification strings; empty for unknown keywords.
pub fn keyword_arguments(registry: &KeywordRegistry, name: &str) -> Vec<String> {
    registry
        .resolve(name)
        .map(|keyword| argument_specs(keyword.signature()))
        .unwrap_or_default()
}

/// `name`, `name=default`, `*varargs`, `**kwargs`, receiver excluded.
pub fn argument_specs(signature: &Signature) -> Vec<String> {
    let mut specs: Vec<String> = signature
        .positional_order()
        .map(|param| match &param.default {
            Some(default) => format!("{}={default}", param.name),
            None => param.name.clone(),
        })
        .collect();
    if let Some(varargs) = signature.varargs_name() {
        specs.push(format!("*{varargs}"));
    }
    if let Some(kwargs) = signature.kwargs_name() {
        specs.push(format!("**{kwargs}"));
    }
    specs
}

pub fn keyword_documentation(registry: &KeywordRegistry, name: &str) -> String {
    match name {
        INTRO_DOC => registry.library().documentation().unwrap_or_default(),
        INIT_DOC => String::new(),
        _ => registry
            .resolve(name)
            .and_then(|keyword| keyword.doc().map(str::to_string))
            .unwrap_or_default(),
    }
}
