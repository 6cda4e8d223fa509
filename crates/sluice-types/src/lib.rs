#![deny(unused_must_use)]
#![warn(clippy::dbg_macro, clippy::todo, clippy::unimplemented)]
#![forbid(unsafe_code)]

pub mod adt;
mod checker;
pub mod typeclass;

pub use adt::{AdtDef, AdtKind, AdtRegistry, FieldDef, VariantDef, VariantFields};
pub use checker::{check_module, CheckError, ConstChecker};
pub use typeclass::{canonical_type_name, MethodInfo, Registry, RegistrationError, TypeclassInfo};
