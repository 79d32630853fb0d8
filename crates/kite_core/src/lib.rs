//! Core utilities for Kite.
//!
//! This crate provides foundational types shared by the federation crates:
//! - `diagnostics`: Error reporting for schema declaration and merging
//! - `naming`: Name escaping and casing rules for published type names

pub mod diagnostics;
pub mod naming;

pub use diagnostics::{Diagnostic, DiagnosticBag, DiagnosticSeverity, Label};
pub use naming::{escape_name, qualified_name};
