// src/naming.rs

//! Source → target package name mapping
//!
//! Precedence:
//! 1. explicit override table
//! 2. normalized name (`_` → `-`, lowercased), unprefixed for products that
//!    already exist in the target ecosystem
//! 3. normalized name with the namespace prefix

use std::collections::{HashMap, HashSet};

/// Maps EUPS product names to conda package names
#[derive(Debug, Clone, Copy)]
pub struct NameMapper<'a> {
    prefix: &'a str,
    overrides: &'a HashMap<String, String>,
    unprefixed: &'a HashSet<String>,
}

impl<'a> NameMapper<'a> {
    pub fn new(
        prefix: &'a str,
        overrides: &'a HashMap<String, String>,
        unprefixed: &'a HashSet<String>,
    ) -> Self {
        Self {
            prefix,
            overrides,
            unprefixed,
        }
    }

    /// Target package name for a source product
    pub fn target_name(&self, product: &str) -> String {
        if let Some(mapped) = self.overrides.get(product) {
            return mapped.clone();
        }

        let transformed = normalize(product);
        if self.unprefixed.contains(product) {
            transformed
        } else {
            format!("{}{}", self.prefix, transformed)
        }
    }
}

/// Separator and case normalization shared by every mapping rule
pub fn normalize(product: &str) -> String {
    product.replace('_', "-").to_lowercase()
}
