//! Typeclass declarations, impl tables and `derives` validation.
//!
//! The registry is generic over the callable stored for each method so this
//! crate stays independent of the evaluator's value representation.

use std::collections::{HashMap, HashSet};

use sluice_ast::ast::TypeclassDef;
use thiserror::Error;

use crate::adt::AdtRegistry;

/// `Integer` and `Double` name the same runtime types as `Int` and `Float`.
pub fn canonical_type_name(name: &str) -> &str {
    match name {
        "Integer" => "Int",
        "Double" => "Float",
        other => other,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("unknown typeclass `{name}`")]
    UnknownTypeclass { name: String },
    #[error("`{method}` is not a method of typeclass `{typeclass}`")]
    UnknownMethod { typeclass: String, method: String },
    #[error("`{typeclass}.{method}` takes {expected} parameter(s), impl has {found}")]
    ArityMismatch {
        typeclass: String,
        method: String,
        expected: usize,
        found: usize,
    },
    #[error("method `{method}` defined twice in impl of `{typeclass}`")]
    DuplicateMethod { typeclass: String, method: String },
    #[error("method `{method}` is declared by both `{first}` and `{second}`")]
    AmbiguousMethod {
        method: String,
        first: String,
        second: String,
    },
    #[error("`{type_name}` derives `{typeclass}` but no impl provides `{method}`")]
    MissingDerivedMethod {
        type_name: String,
        typeclass: String,
        method: String,
    },
}

/// Required method signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    pub name: String,
    pub arity: usize,
}

#[derive(Debug, Clone)]
pub struct TypeclassInfo {
    pub name: String,
    pub methods: Vec<MethodInfo>,
    pub derives: Vec<String>,
}

impl TypeclassInfo {
    pub fn from_def(def: &TypeclassDef) -> Self {
        Self {
            name: def.name.text.clone(),
            methods: def
                .methods
                .iter()
                .map(|m| MethodInfo {
                    name: m.name.text.clone(),
                    arity: m.params.len(),
                })
                .collect(),
            derives: def
                .derives
                .iter()
                .map(|d| canonical_type_name(&d.text).to_string())
                .collect(),
        }
    }

    pub fn method(&self, name: &str) -> Option<&MethodInfo> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// Typeclass, impl and ADT tables for one program run.
#[derive(Debug, Clone)]
pub struct Registry<F> {
    classes: HashMap<String, TypeclassInfo>,
    /// (typeclass, concrete type) -> method table
    impls: HashMap<(String, String), HashMap<String, F>>,
    /// typeclass -> fallback method table from `impl C { … }`
    defaults: HashMap<String, HashMap<String, F>>,
    /// method name -> declaring typeclass
    owners: HashMap<String, String>,
    pub adts: AdtRegistry,
}

impl<F> Default for Registry<F> {
    fn default() -> Self {
        Self {
            classes: HashMap::new(),
            impls: HashMap::new(),
            defaults: HashMap::new(),
            owners: HashMap::new(),
            adts: AdtRegistry::new(),
        }
    }
}

impl<F> Registry<F> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare (or redeclare) a typeclass. Derived typeclasses must already
    /// exist, and a method name may belong to only one typeclass.
    pub fn define_typeclass(&mut self, info: TypeclassInfo) -> Result<(), RegistrationError> {
        for d in &info.derives {
            if !self.classes.contains_key(d) && *d != info.name {
                return Err(RegistrationError::UnknownTypeclass { name: d.clone() });
            }
        }
        for m in &info.methods {
            if let Some(owner) = self.owners.get(&m.name) {
                if *owner != info.name {
                    return Err(RegistrationError::AmbiguousMethod {
                        method: m.name.clone(),
                        first: owner.clone(),
                        second: info.name.clone(),
                    });
                }
            }
        }
        if let Some(old) = self.classes.get(&info.name) {
            for m in &old.methods {
                self.owners.remove(&m.name);
            }
        }
        for m in &info.methods {
            self.owners.insert(m.name.clone(), info.name.clone());
        }
        self.classes.insert(info.name.clone(), info);
        Ok(())
    }

    /// The typeclass declaring `method`, if any.
    pub fn method_owner(&self, method: &str) -> Option<&TypeclassInfo> {
        self.classes.get(self.owners.get(method)?)
    }

    /// Register an impl block. `for_type: None` is the default impl.
    /// Each method is `(name, parameter count, callable)`.
    pub fn register_impl(
        &mut self,
        typeclass: &str,
        for_type: Option<&str>,
        methods: Vec<(String, usize, F)>,
    ) -> Result<(), RegistrationError> {
        let typeclass = canonical_type_name(typeclass);
        let class = self
            .classes
            .get(typeclass)
            .ok_or_else(|| RegistrationError::UnknownTypeclass {
                name: typeclass.to_string(),
            })?;

        let mut table = HashMap::new();
        for (name, arity, f) in methods {
            let Some(sig) = class.method(&name) else {
                return Err(RegistrationError::UnknownMethod {
                    typeclass: typeclass.to_string(),
                    method: name,
                });
            };
            if sig.arity != arity {
                return Err(RegistrationError::ArityMismatch {
                    typeclass: typeclass.to_string(),
                    method: name,
                    expected: sig.arity,
                    found: arity,
                });
            }
            if table.contains_key(&name) {
                return Err(RegistrationError::DuplicateMethod {
                    typeclass: typeclass.to_string(),
                    method: name,
                });
            }
            table.insert(name, f);
        }

        match for_type {
            Some(ty) => {
                let key = (typeclass.to_string(), canonical_type_name(ty).to_string());
                self.impls.insert(key, table);
            }
            None => {
                self.defaults.insert(typeclass.to_string(), table);
            }
        }
        Ok(())
    }

    /// Find the implementation of `method` for a runtime type tag: the
    /// type-specific impl first, then the typeclass default.
    pub fn resolve(&self, method: &str, type_tag: &str) -> Option<&F> {
        let typeclass = self.owners.get(method)?;
        self.impls
            .get(&(typeclass.clone(), type_tag.to_string()))
            .and_then(|t| t.get(method))
            .or_else(|| self.defaults.get(typeclass).and_then(|t| t.get(method)))
    }

    fn missing_method(&self, type_name: &str, typeclass: &str) -> Option<String> {
        let class = self.classes.get(typeclass)?;
        let specific = self
            .impls
            .get(&(typeclass.to_string(), type_name.to_string()));
        let default = self.defaults.get(typeclass);
        class
            .methods
            .iter()
            .find(|m| {
                !specific.is_some_and(|t| t.contains_key(&m.name))
                    && !default.is_some_and(|t| t.contains_key(&m.name))
            })
            .map(|m| m.name.clone())
    }

    /// Check a `derives` clause: every listed typeclass, and every typeclass
    /// those derive in turn, must be fully implemented for `type_name`.
    pub fn validate_derives(
        &self,
        type_name: &str,
        derives: &[String],
    ) -> Result<(), RegistrationError> {
        let mut seen = HashSet::new();
        let mut pending: Vec<&str> = derives.iter().map(String::as_str).collect();
        while let Some(name) = pending.pop() {
            if !seen.insert(name) {
                continue;
            }
            let class = self
                .classes
                .get(name)
                .ok_or_else(|| RegistrationError::UnknownTypeclass {
                    name: name.to_string(),
                })?;
            if let Some(method) = self.missing_method(type_name, name) {
                return Err(RegistrationError::MissingDerivedMethod {
                    type_name: type_name.to_string(),
                    typeclass: name.to_string(),
                    method,
                });
            }
            pending.extend(class.derives.iter().map(String::as_str));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(name: &str, methods: &[(&str, usize)], derives: &[&str]) -> TypeclassInfo {
        TypeclassInfo {
            name: name.into(),
            methods: methods
                .iter()
                .map(|(n, a)| MethodInfo {
                    name: (*n).into(),
                    arity: *a,
                })
                .collect(),
            derives: derives.iter().map(|d| (*d).to_string()).collect(),
        }
    }

    fn registry() -> Registry<&'static str> {
        let mut reg = Registry::new();
        reg.define_typeclass(class("Eq", &[("eq", 2)], &[])).unwrap();
        reg.define_typeclass(class("Show", &[("show", 1)], &["Eq"]))
            .unwrap();
        reg
    }

    #[test]
    fn specific_impl_wins_over_default() {
        let mut reg = registry();
        reg.register_impl("Show", None, vec![("show".into(), 1, "default")])
            .unwrap();
        reg.register_impl("Show", Some("Point"), vec![("show".into(), 1, "point")])
            .unwrap();
        assert_eq!(reg.resolve("show", "Point"), Some(&"point"));
        assert_eq!(reg.resolve("show", "Int"), Some(&"default"));
        assert_eq!(reg.resolve("eq", "Int"), None);
        assert_eq!(reg.resolve("nope", "Int"), None);
    }

    #[test]
    fn type_aliases_share_impls() {
        let mut reg = registry();
        reg.register_impl("Show", Some("Integer"), vec![("show".into(), 1, "int")])
            .unwrap();
        assert_eq!(reg.resolve("show", "Int"), Some(&"int"));
    }

    #[test]
    fn impl_errors() {
        let mut reg = registry();
        assert!(matches!(
            reg.register_impl("Ord", None, vec![]),
            Err(RegistrationError::UnknownTypeclass { .. })
        ));
        assert!(matches!(
            reg.register_impl("Show", None, vec![("display".into(), 1, "x")]),
            Err(RegistrationError::UnknownMethod { .. })
        ));
        assert!(matches!(
            reg.register_impl("Show", None, vec![("show".into(), 2, "x")]),
            Err(RegistrationError::ArityMismatch {
                expected: 1,
                found: 2,
                ..
            })
        ));
        assert!(matches!(
            reg.register_impl(
                "Show",
                None,
                vec![("show".into(), 1, "a"), ("show".into(), 1, "b")]
            ),
            Err(RegistrationError::DuplicateMethod { .. })
        ));
    }

    #[test]
    fn method_names_are_unique_across_typeclasses() {
        let mut reg = registry();
        let err = reg
            .define_typeclass(class("Display", &[("show", 1)], &[]))
            .unwrap_err();
        assert!(matches!(err, RegistrationError::AmbiguousMethod { .. }));
        assert_eq!(reg.method_owner("show").map(|c| c.name.as_str()), Some("Show"));
    }

    #[test]
    fn derives_are_checked_transitively() {
        let mut reg = registry();
        reg.register_impl("Show", Some("Point"), vec![("show".into(), 1, "p")])
            .unwrap();
        // Show derives Eq, and Point has no eq
        let err = reg
            .validate_derives("Point", &["Show".to_string()])
            .unwrap_err();
        assert_eq!(
            err,
            RegistrationError::MissingDerivedMethod {
                type_name: "Point".into(),
                typeclass: "Eq".into(),
                method: "eq".into(),
            }
        );

        reg.register_impl("Eq", None, vec![("eq".into(), 2, "eq")])
            .unwrap();
        assert!(reg.validate_derives("Point", &["Show".to_string()]).is_ok());
    }

    #[test]
    fn unknown_derived_typeclass() {
        let reg = registry();
        let err = reg.validate_derives("Point", &["Hash".to_string()]).unwrap_err();
        assert!(matches!(err, RegistrationError::UnknownTypeclass { name } if name == "Hash"));
    }
}
