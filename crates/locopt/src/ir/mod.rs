//! Intermediate representation: expression arena, builder, effects, and
//! local-variable utilities.

pub mod builder;
pub mod effects;
pub mod local_utils;
pub mod properties;
pub mod types;

pub use builder::Builder;
pub use effects::{Effect, EffectAnalyzer};
pub use types::{
    Expr, ExprArena, ExprId, ExprKind, Function, Label, Literal, LocalId, Module, ValType,
};
