// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! In-memory model of the C++ program generated for a firmware build.
//!
//! Component descriptors lower their validated configuration into this model:
//! namespaces and type handles describe the runtime classes, expressions and
//! statements are appended in call order, and side outputs (defines, build
//! flags, libraries, platformio options) are deduplicated as they arrive. Turning
//! the model into source files is left to a separate emitter.

mod build_info;
mod error;
mod expr;
mod model;
mod statement;
mod types;

pub use build_info::{Define, Library, OptionValue};
pub use error::{CodegenError, Result};
pub use expr::{cpp_string_escape, struct_initializer, Access, Expression, LambdaExpression, Literal};
pub use model::CodegenModel;
pub use statement::Statement;
pub use types::{esphome_ns, global_ns, known, CppType, Namespace, TemplateArg, TypeKind, TypeOp};
