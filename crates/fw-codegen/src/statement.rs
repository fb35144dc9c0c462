// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use std::fmt;

use crate::expr::Expression;
use crate::types::CppType;

/// One statement appended to a section of the generated program.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `expr;`
    Expression(Expression),
    /// `T *name;` or `T name;` at global scope
    Declaration {
        ty: CppType,
        name: String,
        pointer: bool,
    },
    /// `name = rhs;`
    Assignment { name: String, rhs: Expression },
    /// `T name = rhs;`
    Definition {
        ty: CppType,
        name: String,
        rhs: Expression,
    },
    /// `static const T name[] PROGMEM = {...};`
    Progmem {
        ty: CppType,
        name: String,
        rhs: Expression,
    },
    Raw(String),
    Comment(String),
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Expression(e) => write!(f, "{e};"),
            Statement::Declaration { ty, name, pointer } => {
                if *pointer {
                    write!(f, "{ty} *{name};")
                } else {
                    write!(f, "{ty} {name};")
                }
            }
            Statement::Assignment { name, rhs } => write!(f, "{name} = {rhs};"),
            Statement::Definition { ty, name, rhs } => write!(f, "{ty} {name} = {rhs};"),
            Statement::Progmem { ty, name, rhs } => {
                write!(f, "static const {ty} {name}[] PROGMEM = {rhs};")
            }
            Statement::Raw(s) => write!(f, "{s}"),
            Statement::Comment(c) => {
                let lines: Vec<String> = c.lines().map(|l| format!("// {l}")).collect();
                write!(f, "{}", lines.join("\n"))
            }
        }
    }
}

impl From<Expression> for Statement {
    fn from(e: Expression) -> Self {
        Statement::Expression(e)
    }
}
