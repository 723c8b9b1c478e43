//! The backing library and its keywords.
//!
//! A [`Library`] is anything that can enumerate and resolve keywords.
//! [`KeywordSet`] is the ready-made implementation: register keywords with
//! closures and it behaves like a reflected object whose public members are
//! its keywords.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use indexmap::IndexMap;

use crate::arguments::Arguments;
use crate::capture::Console;
use crate::error::KeywordError;
use crate::value::Value;

/// Keyword implementation.
pub type KeywordFn =
    dyn Fn(&Arguments, &mut Console<'_>) -> Result<Value, KeywordError> + Send + Sync;

/// Capability interface of a backing library.
pub trait Library: Send + Sync {
    /// Custom keyword enumeration. `None` falls back to the public members
    /// that resolve to keywords.
    fn keyword_names(&self) -> Option<Vec<String>> {
        None
    }

    /// Every member name of the library, keywords or not.
    fn members(&self) -> Vec<String>;

    /// Resolve a member to a keyword. `None` if missing or not callable.
    fn keyword(&self, name: &str) -> Option<Keyword>;

    /// Library-level documentation.
    fn documentation(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Value>,
}

/// Parameter list of a keyword.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signature {
    receiver: Option<String>,
    params: Vec<Param>,
    varargs: Option<String>,
    kwargs: Option<String>,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signature of a keyword bound to the library; the receiver is implicit
    /// and never described or bound.
    pub fn method() -> Self {
        Self {
            receiver: Some("self".to_string()),
            ..Self::default()
        }
    }

    pub fn required(mut self, name: impl Into<String>) -> Self {
        self.params.push(Param {
            name: name.into(),
            default: None,
        });
        self
    }

    pub fn optional(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.params.push(Param {
            name: name.into(),
            default: Some(default.into()),
        });
        self
    }

    pub fn varargs(mut self, name: impl Into<String>) -> Self {
        self.varargs = Some(name.into());
        self
    }

    pub fn kwargs(mut self, name: impl Into<String>) -> Self {
        self.kwargs = Some(name.into());
        self
    }

    pub fn receiver(&self) -> Option<&str> {
        self.receiver.as_deref()
    }

    /// Parameters in declaration order.
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn varargs_name(&self) -> Option<&str> {
        self.varargs.as_deref()
    }

    pub fn kwargs_name(&self) -> Option<&str> {
        self.kwargs.as_deref()
    }

    /// Required parameters, then defaulted ones, each in declaration order.
    /// Positional arguments bind in this order.
    pub fn positional_order(&self) -> impl Iterator<Item = &Param> {
        let required = self.params.iter().filter(|p| p.default.is_none());
        let defaulted = self.params.iter().filter(|p| p.default.is_some());
        required.chain(defaulted)
    }
}

/// A named, invocable operation. Cheap to clone.
#[derive(Clone)]
pub struct Keyword {
    name: String,
    signature: Signature,
    doc: Option<String>,
    handler: Arc<KeywordFn>,
}

impl Keyword {
    pub fn new<F>(name: impl Into<String>, signature: Signature, handler: F) -> Self
    where
        F: Fn(&Arguments, &mut Console<'_>) -> Result<Value, KeywordError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            signature,
            doc: None,
            handler: Arc::new(handler),
        }
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    pub fn call(&self, args: &Arguments, console: &mut Console<'_>) -> Result<Value, KeywordError> {
        (self.handler)(args, console)
    }
}

impl fmt::Debug for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keyword")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("doc", &self.doc)
            .finish_non_exhaustive()
    }
}

/// A library member.
#[derive(Debug, Clone)]
pub enum Member {
    Keyword(Keyword),
    /// Plain data; listed as a member but never callable.
    Attribute(Value),
}

/// Library built from registered keywords.
///
/// Members can be added and removed after the set is shared with a server;
/// discovery always reflects the current members.
#[derive(Debug, Default)]
pub struct KeywordSet {
    doc: Option<String>,
    members: RwLock<IndexMap<String, Member>>,
}

impl KeywordSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn with_keyword(self, keyword: Keyword) -> Self {
        self.add_keyword(keyword);
        self
    }

    pub fn with_attribute(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.write_members()
            .insert(name.into(), Member::Attribute(value.into()));
        self
    }

    /// Register a keyword, replacing any member with the same name.
    pub fn add_keyword(&self, keyword: Keyword) {
        self.write_members()
            .insert(keyword.name().to_string(), Member::Keyword(keyword));
    }

    pub fn remove(&self, name: &str) -> bool {
        self.write_members().shift_remove(name).is_some()
    }

    fn write_members(&self) -> std::sync::RwLockWriteGuard<'_, IndexMap<String, Member>> {
        self.members.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_members(&self) -> std::sync::RwLockReadGuard<'_, IndexMap<String, Member>> {
        self.members.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Library for KeywordSet {
    fn members(&self) -> Vec<String> {
        self.read_members().keys().cloned().collect()
    }

    fn keyword(&self, name: &str) -> Option<Keyword> {
        match self.read_members().get(name)? {
            Member::Keyword(keyword) => Some(keyword.clone()),
            Member::Attribute(_) => None,
        }
    }

    fn documentation(&self) -> Option<String> {
        self.doc.clone()
    }
}
