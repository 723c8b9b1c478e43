//! Binding call arguments to a keyword signature.

use indexmap::IndexMap;

use crate::error::KeywordError;
use crate::library::Signature;
use crate::value::Value;

/// Arguments bound to a keyword's parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    params: IndexMap<String, Value>,
    varargs: Vec<Value>,
    kwargs: IndexMap<String, Value>,
}

impl Arguments {
    /// Bound value of a declared parameter.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// Bound value of a declared parameter, or a `TypeError`.
    pub fn value(&self, name: &str) -> Result<&Value, KeywordError> {
        self.get(name)
            .ok_or_else(|| KeywordError::type_error(format!("no argument named '{name}'")))
    }

    /// Text form of a declared parameter. Bytes are decoded lossily.
    pub fn text(&self, name: &str) -> Result<String, KeywordError> {
        Ok(match self.value(name)? {
            Value::Str(s) => s.clone(),
            other => other.to_string(),
        })
    }

    pub fn varargs(&self) -> &[Value] {
        &self.varargs
    }

    pub fn kwargs(&self) -> &IndexMap<String, Value> {
        &self.kwargs
    }

    /// Bind positional and named arguments the way a dynamic call would.
    pub fn bind(
        keyword: &str,
        signature: &Signature,
        args: Vec<Value>,
        kwargs: IndexMap<String, Value>,
    ) -> Result<Self, KeywordError> {
        let order: Vec<_> = signature.positional_order().collect();
        let given = args.len();

        let mut params = IndexMap::with_capacity(order.len());
        let mut positional = args.into_iter();
        for param in &order {
            match positional.next() {
                Some(value) => {
                    params.insert(param.name.clone(), value);
                }
                None => break,
            }
        }

        let varargs: Vec<Value> = positional.collect();
        if !varargs.is_empty() && signature.varargs_name().is_none() {
            return Err(KeywordError::type_error(format!(
                "{keyword}() takes at most {} arguments ({given} given)",
                order.len()
            )));
        }

        let mut extra = IndexMap::new();
        for (key, value) in kwargs {
            if order.iter().any(|p| p.name == key) {
                if params.contains_key(&key) {
                    return Err(KeywordError::type_error(format!(
                        "{keyword}() got multiple values for argument '{key}'"
                    )));
                }
                params.insert(key, value);
            } else if signature.kwargs_name().is_some() {
                extra.insert(key, value);
            } else {
                return Err(KeywordError::type_error(format!(
                    "{keyword}() got an unexpected keyword argument '{key}'"
                )));
            }
        }

        for param in &order {
            if params.contains_key(&param.name) {
                continue;
            }
            match &param.default {
                Some(default) => {
                    params.insert(param.name.clone(), default.clone());
                }
                None => {
                    return Err(KeywordError::type_error(format!(
                        "{keyword}() missing required argument '{}'",
                        param.name
                    )));
                }
            }
        }

        Ok(Self {
            params,
            varargs,
            kwargs: extra,
        })
    }
}
