//! Runtime values.

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use sluice_ast::ast::{Block, Expr};

use crate::env::ScopeRef;

/// Runtime values in Sluice
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    Char(char),
    Str(String),
    Bool(bool),
    List(Vec<Value>),
    /// Fixed arity, 0 or at least 2 elements
    Tuple(Vec<Value>),
    /// Duplicate-free; element order is insertion order but equality ignores it
    Set(Vec<Value>),
    /// Insertion-ordered entries, lookup by value equality
    Map(Vec<(Value, Value)>),
    Just(Box<Value>),
    Nothing,
    /// Struct value: `Point { x: 1, y: 2 }`, fields in declaration order
    Struct {
        name: String,
        fields: Vec<(String, Value)>,
    },
    /// Enum variant value: `Red` or `Circle(2.0)`
    Enum {
        enum_name: String,
        variant: String,
        payload: Option<Box<Value>>,
    },
    /// Function closure over a scope of the arena
    Function(Rc<Closure>),
    Native(Native),
    /// Host function by name
    HostFn(String),
    /// Struct or variant constructor
    Constructor(Rc<Constructor>),
    /// Typeclass method dispatcher
    Method(String),
    /// A `module` or the file's own module, referenced by name
    Module(String),
    Unit,
}

#[derive(Debug)]
pub struct Closure {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: FnBody,
    /// Defining scope, kept alive while the closure is
    pub scope: ScopeRef,
}

#[derive(Debug)]
pub enum FnBody {
    Block(Block),
    /// A composition bound with `=`, run when called
    Pipeline(Vec<Expr>),
}

/// Builtins implemented by the evaluator itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Native {
    Just,
    Set,
    Len,
}

impl Native {
    pub fn name(self) -> &'static str {
        match self {
            Native::Just => "Just",
            Native::Set => "Set",
            Native::Len => "len",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constructor {
    Struct {
        name: String,
        fields: Vec<String>,
    },
    Variant {
        enum_name: String,
        variant: String,
        arity: usize,
    },
}

impl Value {
    /// Call `f` on every closure in this value, looking inside containers.
    pub fn visit_closures(&self, f: &mut dyn FnMut(&Rc<Closure>)) {
        match self {
            Value::Function(c) => f(c),
            Value::List(items) | Value::Tuple(items) | Value::Set(items) => {
                for v in items {
                    v.visit_closures(f);
                }
            }
            Value::Map(entries) => {
                for (k, v) in entries {
                    k.visit_closures(f);
                    v.visit_closures(f);
                }
            }
            Value::Just(v) => v.visit_closures(f),
            Value::Struct { fields, .. } => {
                for (_, v) in fields {
                    v.visit_closures(f);
                }
            }
            Value::Enum {
                payload: Some(v), ..
            } => v.visit_closures(f),
            _ => {}
        }
    }

    /// Runtime type tag used for typeclass dispatch.
    pub fn type_tag(&self) -> &str {
        match self {
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::Char(_) => "Char",
            Value::Str(_) => "String",
            Value::Bool(_) => "Bool",
            Value::List(_) => "List",
            Value::Tuple(_) => "Tuple",
            Value::Set(_) => "Set",
            Value::Map(_) => "HashMap",
            Value::Just(_) | Value::Nothing => "Option",
            Value::Struct { name, .. } => name,
            Value::Enum { enum_name, .. } => enum_name,
            Value::Function(_)
            | Value::Native(_)
            | Value::HostFn(_)
            | Value::Constructor(_)
            | Value::Method(_) => "Function",
            Value::Module(_) => "Module",
            Value::Unit => "Unit",
        }
    }

    pub fn set_from(items: Vec<Value>) -> Value {
        let mut out: Vec<Value> = Vec::with_capacity(items.len());
        for item in items {
            if !out.contains(&item) {
                out.push(item);
            }
        }
        Value::Set(out)
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Struct { fields, .. } => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn map_get<'a>(entries: &'a [(Value, Value)], key: &Value) -> Option<&'a Value> {
        entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Ordering for `< <= > >=`; `None` when the operands are not comparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Char(a), Value::Char(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Nested form: strings and chars quoted.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => format!("{s:?}"),
            Value::Char(c) => format!("{c:?}"),
            other => other.to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => {
                a.len() == b.len() && a.iter().all(|x| b.contains(x))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| Value::map_get(b, k) == Some(v))
            }
            (Value::Just(a), Value::Just(b)) => a == b,
            (Value::Nothing, Value::Nothing) | (Value::Unit, Value::Unit) => true,
            (
                Value::Struct { name: n1, fields: f1 },
                Value::Struct { name: n2, fields: f2 },
            ) => n1 == n2 && f1 == f2,
            (
                Value::Enum {
                    enum_name: e1,
                    variant: v1,
                    payload: p1,
                },
                Value::Enum {
                    enum_name: e2,
                    variant: v2,
                    payload: p2,
                },
            ) => e1 == e2 && v1 == v2 && p1 == p2,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Constructor(a), Value::Constructor(b)) => a == b,
            (Value::Native(a), Value::Native(b)) => a == b,
            (Value::HostFn(a), Value::HostFn(b))
            | (Value::Method(a), Value::Method(b))
            | (Value::Module(a), Value::Module(b)) => a == b,
            _ => false,
        }
    }
}

fn write_seq(f: &mut fmt::Formatter<'_>, open: &str, items: &[Value], close: &str) -> fmt::Result {
    write!(f, "{open}")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item.repr())?;
    }
    write!(f, "{close}")
}

/// Top-level form as printed by `print`: strings unquoted.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            // Debug keeps the fractional part: 2.0 not 2
            Value::Float(v) => write!(f, "{v:?}"),
            Value::Char(c) => write!(f, "{c}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::List(items) => write_seq(f, "[", items, "]"),
            Value::Tuple(items) => write_seq(f, "(", items, ")"),
            Value::Set(items) if items.is_empty() => write!(f, "Set()"),
            Value::Set(items) => write_seq(f, "{", items, "}"),
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k.repr(), v.repr())?;
                }
                write!(f, "}}")
            }
            Value::Just(v) => write!(f, "Just({})", v.repr()),
            Value::Nothing => write!(f, "Nothing"),
            Value::Struct { name, fields } => {
                write!(f, "{name} {{ ")?;
                for (i, (field, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{field}: {}", v.repr())?;
                }
                write!(f, " }}")
            }
            Value::Enum {
                variant, payload, ..
            } => match payload {
                Some(p) => match p.as_ref() {
                    Value::Tuple(items) => write_seq(f, &format!("{variant}("), items, ")"),
                    other => write!(f, "{variant}({})", other.repr()),
                },
                None => write!(f, "{variant}"),
            },
            Value::Function(c) => match &c.name {
                Some(name) => write!(f, "<fn {name}>"),
                None => write!(f, "<fn>"),
            },
            Value::Native(n) => write!(f, "<builtin {}>", n.name()),
            Value::HostFn(name) => write!(f, "<host_fn {name}>"),
            Value::Constructor(c) => match c.as_ref() {
                Constructor::Struct { name, .. } => write!(f, "<constructor {name}>"),
                Constructor::Variant { variant, .. } => write!(f, "<constructor {variant}>"),
            },
            Value::Method(name) => write!(f, "<method {name}>"),
            Value::Module(name) => write!(f, "<module {name}>"),
            Value::Unit => write!(f, "()"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_quotes_only_nested_strings() {
        let v = Value::List(vec![Value::Str("a".into()), Value::Char('b'), Value::Int(1)]);
        assert_eq!(v.to_string(), r#"["a", 'b', 1]"#);
        assert_eq!(Value::Str("plain".into()).to_string(), "plain");
    }

    #[test]
    fn floats_keep_fraction() {
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::Float(0.5).to_string(), "0.5");
    }

    #[test]
    fn set_equality_ignores_order_and_dupes() {
        let a = Value::set_from(vec![Value::Int(3), Value::Int(1), Value::Int(5), Value::Int(5)]);
        let b = Value::set_from(vec![Value::Int(5), Value::Int(3), Value::Int(1)]);
        assert_eq!(a, b);
        let Value::Set(items) = &a else { unreachable!() };
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn numeric_equality_crosses_kinds() {
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_ne!(Value::Int(2), Value::Str("2".into()));
    }

    #[test]
    fn enum_and_struct_display() {
        let e = Value::Enum {
            enum_name: "Shape".into(),
            variant: "Rect".into(),
            payload: Some(Box::new(Value::Tuple(vec![Value::Float(1.0), Value::Float(2.0)]))),
        };
        assert_eq!(e.to_string(), "Rect(1.0, 2.0)");
        let s = Value::Struct {
            name: "Point".into(),
            fields: vec![("x".into(), Value::Int(1)), ("y".into(), Value::Int(2))],
        };
        assert_eq!(s.to_string(), "Point { x: 1, y: 2 }");
        assert_eq!(s.type_tag(), "Point");
    }
}
