//! Algebraic Data Type (ADT) definitions and registry.
//!
//! Structs and enums are registered as their declarations are evaluated.
//! The registry also keeps a variant-name index so a bare `Circle(2.0)` or a
//! `Circle(r)` pattern can find its enum without qualification.

use std::collections::HashMap;

use sluice_ast::ast::{EnumDef, StructDef, TypeExpr};

use crate::typeclass::canonical_type_name;

/// Definition of an algebraic data type (struct or enum)
#[derive(Clone, Debug)]
pub struct AdtDef {
    /// Name of the ADT (e.g., "Point", "Shape")
    pub name: String,
    /// Kind of ADT (struct or enum)
    pub kind: AdtKind,
    /// Typeclasses named in the `derives` clause, canonicalised
    pub derives: Vec<String>,
}

/// Kind of ADT: struct with fields or enum with variants
#[derive(Clone, Debug)]
pub enum AdtKind {
    /// Struct with named, ordered fields
    Struct(Vec<FieldDef>),
    /// Enum with variants
    Enum(Vec<VariantDef>),
}

/// Field definition in a struct
#[derive(Clone, Debug)]
pub struct FieldDef {
    pub name: String,
    /// Declared type, informational only
    pub ty: String,
}

/// Variant definition in an enum
#[derive(Clone, Debug)]
pub struct VariantDef {
    /// Variant name (e.g., "Red", "Circle")
    pub name: String,
    pub fields: VariantFields,
}

/// Fields of an enum variant
#[derive(Clone, Debug)]
pub enum VariantFields {
    /// Unit variant (no data): `Red`
    Unit,
    /// Variant carrying a payload: `Circle(Float)`, `Rect(Float, Float)`
    Payload(Vec<String>),
}

fn type_text(ty: &TypeExpr) -> String {
    match ty {
        TypeExpr::Named { name, args, .. } if args.is_empty() => {
            canonical_type_name(&name.text).to_string()
        }
        TypeExpr::Named { name, args, .. } => {
            let args: Vec<String> = args.iter().map(type_text).collect();
            format!("{}<{}>", canonical_type_name(&name.text), args.join(", "))
        }
        TypeExpr::Arrow { params, ret, .. } => {
            let params: Vec<String> = params.iter().map(type_text).collect();
            format!("fn({}) -> {}", params.join(", "), type_text(ret))
        }
        TypeExpr::Tuple(elems, _) => {
            let elems: Vec<String> = elems.iter().map(type_text).collect();
            format!("({})", elems.join(", "))
        }
    }
}

impl AdtDef {
    /// Create a new struct definition
    pub fn new_struct(name: impl Into<String>, fields: Vec<FieldDef>, derives: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind: AdtKind::Struct(fields),
            derives,
        }
    }

    /// Create a new enum definition
    pub fn new_enum(
        name: impl Into<String>,
        variants: Vec<VariantDef>,
        derives: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: AdtKind::Enum(variants),
            derives,
        }
    }

    pub fn from_struct(def: &StructDef) -> Self {
        let fields = def
            .fields
            .iter()
            .map(|f| FieldDef {
                name: f.name.text.clone(),
                ty: type_text(&f.ty),
            })
            .collect();
        let derives = def
            .derives
            .iter()
            .map(|d| canonical_type_name(&d.text).to_string())
            .collect();
        Self::new_struct(def.name.text.clone(), fields, derives)
    }

    pub fn from_enum(def: &EnumDef) -> Self {
        let variants = def
            .members
            .iter()
            .map(|m| match &m.payload {
                None => VariantDef::unit(m.name.text.clone()),
                Some(TypeExpr::Tuple(elems, _)) => VariantDef::payload(
                    m.name.text.clone(),
                    elems.iter().map(type_text).collect(),
                ),
                Some(ty) => VariantDef::payload(m.name.text.clone(), vec![type_text(ty)]),
            })
            .collect();
        let derives = def
            .derives
            .iter()
            .map(|d| canonical_type_name(&d.text).to_string())
            .collect();
        Self::new_enum(def.name.text.clone(), variants, derives)
    }

    /// Get struct fields (if this is a struct)
    pub fn fields(&self) -> Option<&[FieldDef]> {
        match &self.kind {
            AdtKind::Struct(fields) => Some(fields),
            AdtKind::Enum(_) => None,
        }
    }

    /// Get enum variants (if this is an enum)
    pub fn variants(&self) -> Option<&[VariantDef]> {
        match &self.kind {
            AdtKind::Struct(_) => None,
            AdtKind::Enum(variants) => Some(variants),
        }
    }

    /// Find a variant by name (for enums)
    pub fn find_variant(&self, name: &str) -> Option<&VariantDef> {
        self.variants()?.iter().find(|v| v.name == name)
    }
}

impl VariantDef {
    /// Create a unit variant
    pub fn unit(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: VariantFields::Unit,
        }
    }

    pub fn payload(name: impl Into<String>, tys: Vec<String>) -> Self {
        Self {
            name: name.into(),
            fields: VariantFields::Payload(tys),
        }
    }

    /// Number of payload values the constructor takes
    pub fn arity(&self) -> usize {
        match &self.fields {
            VariantFields::Unit => 0,
            VariantFields::Payload(tys) => tys.len(),
        }
    }
}

/// Registry of all ADT definitions
#[derive(Clone, Debug, Default)]
pub struct AdtRegistry {
    /// Map from ADT name to definition
    adts: HashMap<String, AdtDef>,
    /// Variant name -> owning enum
    variants: HashMap<String, String>,
}

impl AdtRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an ADT definition. Re-evaluating a declaration (a struct
    /// declared inside a function body, say) replaces the earlier entry.
    pub fn register(&mut self, def: AdtDef) {
        if let Some(old) = self.adts.get(&def.name) {
            for v in old.variants().unwrap_or_default() {
                if self.variants.get(&v.name) == Some(&old.name) {
                    self.variants.remove(&v.name);
                }
            }
        }
        for v in def.variants().unwrap_or_default() {
            self.variants.insert(v.name.clone(), def.name.clone());
        }
        self.adts.insert(def.name.clone(), def);
    }

    /// Look up an ADT by name
    pub fn get(&self, name: &str) -> Option<&AdtDef> {
        self.adts.get(name)
    }

    /// Resolve a bare variant name to its enum and variant definition.
    pub fn lookup_variant(&self, name: &str) -> Option<(&AdtDef, &VariantDef)> {
        let owner = self.adts.get(self.variants.get(name)?)?;
        Some((owner, owner.find_variant(name)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, ty: &str) -> FieldDef {
        FieldDef {
            name: name.into(),
            ty: ty.into(),
        }
    }

    #[test]
    fn test_adt_def_struct() {
        let def = AdtDef::new_struct("Point", vec![field("x", "Int"), field("y", "Int")], vec![]);
        assert_eq!(def.name, "Point");
        assert!(def.variants().is_none());
        assert_eq!(def.fields().unwrap().len(), 2);
        assert_eq!(def.fields().unwrap()[1].name, "y");
    }

    #[test]
    fn test_adt_def_enum() {
        let def = AdtDef::new_enum(
            "Shape",
            vec![
                VariantDef::payload("Circle", vec!["Float".into()]),
                VariantDef::unit("Empty"),
            ],
            vec![],
        );
        assert!(def.fields().is_none());
        assert_eq!(def.variants().unwrap().len(), 2);
        assert!(def.find_variant("Circle").is_some());
        assert!(def.find_variant("Missing").is_none());
    }

    #[test]
    fn test_variant_arity() {
        let unit = VariantDef::unit("Red");
        let one = VariantDef::payload("Circle", vec!["Float".into()]);
        let two = VariantDef::payload("Rect", vec!["Float".into(), "Float".into()]);

        assert_eq!(unit.arity(), 0);
        assert_eq!(one.arity(), 1);
        assert_eq!(two.arity(), 2);
    }

    #[test]
    fn test_variant_index_follows_redefinition() {
        let mut reg = AdtRegistry::new();
        reg.register(AdtDef::new_enum(
            "Color",
            vec![VariantDef::unit("Red"), VariantDef::unit("Green")],
            vec![],
        ));
        let (owner, v) = reg.lookup_variant("Green").unwrap();
        assert_eq!(owner.name, "Color");
        assert_eq!(v.arity(), 0);

        // redeclaring Color without Green drops the stale index entry
        reg.register(AdtDef::new_enum("Color", vec![VariantDef::unit("Red")], vec![]));
        assert!(reg.lookup_variant("Green").is_none());
        assert!(reg.lookup_variant("Red").is_some());
        assert!(reg.get("Color").is_some());
    }

    #[test]
    fn test_registry_lookup() {
        let mut reg = AdtRegistry::new();
        reg.register(AdtDef::new_struct("Point", vec![], vec![]));

        assert!(reg.get("Point").is_some());
        assert!(reg.get("Missing").is_none());
        assert!(reg.lookup_variant("Point").is_none());
    }

    #[test]
    fn test_type_text_canonicalises_aliases() {
        let src = "struct Acc derives [Show] { total: Integer, parts: List<Double> }";
        let module = sluice_parse::parse_str("<mem>", src).unwrap();
        let sluice_ast::ast::Stmt::Struct(def) = &module.body.stmts[0] else {
            panic!("expected struct");
        };
        let adt = AdtDef::from_struct(def);
        let fields = adt.fields().unwrap();
        assert_eq!(fields[0].ty, "Int");
        assert_eq!(fields[1].ty, "List<Float>");
        assert_eq!(adt.derives, ["Show"]);
    }
}
