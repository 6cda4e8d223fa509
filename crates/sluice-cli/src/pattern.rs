//! Structural pattern matching.

use sluice_ast::ast::{Lit, Pat};
use sluice_types::AdtRegistry;

use crate::value::Value;

pub fn lit_value(lit: &Lit) -> Value {
    match lit {
        Lit::Int(v) => Value::Int(*v),
        Lit::Float(v) => Value::Float(*v),
        Lit::Char(c) => Value::Char(*c),
        Lit::Str(s) => Value::Str(s.clone()),
        Lit::Bool(b) => Value::Bool(*b),
        Lit::Null => Value::Unit,
    }
}

/// Try to match a pattern against a value, returning bindings if successful.
///
/// A bare identifier naming a registered unit variant matches that variant;
/// any other identifier binds. Bindings of a failed match are discarded.
pub fn match_pattern(pat: &Pat, value: &Value, adts: &AdtRegistry) -> Option<Vec<(String, Value)>> {
    let mut bindings = Vec::new();
    if collect(pat, value, adts, &mut bindings) {
        Some(bindings)
    } else {
        None
    }
}

fn collect(pat: &Pat, value: &Value, adts: &AdtRegistry, out: &mut Vec<(String, Value)>) -> bool {
    match pat {
        Pat::Wildcard(_) => true,

        Pat::Ident(ident) => match adts.lookup_variant(&ident.text) {
            Some((_, variant)) if variant.arity() == 0 => {
                matches!(value, Value::Enum { variant: v, payload: None, .. } if *v == ident.text)
            }
            _ => {
                out.push((ident.text.clone(), value.clone()));
                true
            }
        },

        Pat::Literal(lit, _) => lit_value(lit) == *value,

        Pat::Nothing(_) => matches!(value, Value::Nothing),

        Pat::Just(inner, _) => match value {
            Value::Just(v) => collect(inner, v, adts, out),
            _ => false,
        },

        Pat::Tuple(pats, _) => match value {
            Value::Tuple(values) if values.len() == pats.len() => all(pats, values, adts, out),
            Value::Unit => pats.is_empty(),
            _ => false,
        },

        Pat::Variant { name, fields, .. } => match value {
            Value::Enum {
                variant, payload, ..
            } if *variant == name.text => match (fields.len(), payload) {
                (0, None) => true,
                (1, Some(p)) => collect(&fields[0], p, adts, out),
                (n, Some(p)) => match p.as_ref() {
                    Value::Tuple(values) if values.len() == n => all(fields, values, adts, out),
                    _ => false,
                },
                _ => false,
            },
            // positional struct pattern: Point(x, y)
            Value::Struct {
                name: sname,
                fields: values,
            } if *sname == name.text && values.len() == fields.len() => fields
                .iter()
                .zip(values)
                .all(|(p, (_, v))| collect(p, v, adts, out)),
            _ => false,
        },

        Pat::Struct { name, fields, .. } => match value {
            Value::Struct { name: sname, .. } if *sname == name.text => fields.iter().all(|f| {
                value
                    .field(&f.name.text)
                    .is_some_and(|v| collect(&f.pat, v, adts, out))
            }),
            _ => false,
        },
    }
}

fn all(pats: &[Pat], values: &[Value], adts: &AdtRegistry, out: &mut Vec<(String, Value)>) -> bool {
    pats.iter()
        .zip(values)
        .all(|(p, v)| collect(p, v, adts, out))
}
