// src/recipe/mod.rs

//! Conda recipe generation
//!
//! - [`hasher`]: content hash of a recipe, blind to build numbers
//! - [`template`]: `%(name)s` templates for recipe files
//! - [`static_recipes`]: pre-authored recipes copied in for injected deps
//! - [`plan`]: resolved products, rebuild plan and marker files
//! - [`maker`]: the generator tying all of the above together

pub mod hasher;
pub mod maker;
pub mod plan;
pub mod static_recipes;
pub mod template;

pub use hasher::{RecipeDigest, RecipeHasher};
pub use maker::{GenerationReport, RecipeMaker};
pub use plan::{ProductRegistry, RebuildPlan, ResolvedProduct};
pub use static_recipes::{StaticRecipeCopier, StaticRecipeMeta};
pub use template::{DirTemplateRenderer, TemplateRenderer, TemplateVars};
