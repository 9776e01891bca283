// SPDX-FileCopyrightText: 2024 University of Rochester
//
// SPDX-License-Identifier: MIT

/*! The SSA input IR consumed by the abstract interpreter.

These are the parser-facing data types: a [`Function`] is a list of blocks,
each carrying typed arguments, operator definitions, and a terminator. The
parser itself lives outside this crate; modules arrive either constructed
in-memory or deserialized from JSON.

Loop handling is likewise external: a [`CfgPreprocessor`] decides whether a
function's graph is reducible and unrolls its loops into an acyclic graph
before interpretation.
*/

use serde::{Deserialize, Serialize};

use crate::{FastHashMap, Handle};

/// An SSA register name, without the `%` sigil.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Register(pub String);

impl std::fmt::Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "%{}", self.0)
    }
}

impl From<&str> for Register {
    fn from(name: &str) -> Self {
        Register(name.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockLabel(pub String);

impl std::fmt::Display for BlockLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BlockLabel {
    fn from(name: &str) -> Self {
        BlockLabel(name.to_string())
    }
}

/// Source position recorded by the parser for an operator or terminator.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceInfo {
    pub path: String,
    pub line: u32,
}

impl SourceInfo {
    #[must_use]
    pub fn location(&self) -> crate::SourceLocation {
        crate::SourceLocation {
            path: self.path.clone(),
            line: self.line,
        }
    }
}

/// A parsed IR type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    /// A nominal type, e.g. `Int`.
    Named(String),
    /// A specialized generic type, e.g. `Tensor<Float>`.
    Specialized { base: String, args: Vec<Type> },
    Tuple(Vec<Type>),
    Function {
        params: Vec<Type>,
        result: Handle<Type>,
    },
    /// The address of a value, e.g. a global's storage.
    Address(Handle<Type>),
    /// A type carrying attributes, e.g. calling-convention markers.
    Attributed {
        attributes: Vec<String>,
        ty: Handle<Type>,
    },
    /// A generic signature wrapper around a type.
    Generic {
        params: Vec<String>,
        ty: Handle<Type>,
    },
    /// An ownership-qualified type, e.g. `@owned`.
    Ownership { kind: String, ty: Handle<Type> },
    /// A compiler-builtin type, e.g. `Builtin.Int64`.
    Builtin(String),
}

impl Type {
    /// Strip attribute, generic-signature, and ownership wrappers.
    #[must_use]
    pub fn simplified(&self) -> &Type {
        match self {
            Type::Attributed { ty, .. } | Type::Generic { ty, .. } | Type::Ownership { ty, .. } => {
                ty.simplified()
            }
            other => other,
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Type::Named(name) => f.write_str(name),
            Type::Specialized { base, args } => {
                write!(f, "{base}<")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ">")
            }
            Type::Tuple(tys) => {
                write!(f, "(")?;
                for (i, ty) in tys.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{ty}")?;
                }
                write!(f, ")")
            }
            Type::Function { params, result } => {
                write!(f, "(")?;
                for (i, ty) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{ty}")?;
                }
                write!(f, ") -> {result}")
            }
            Type::Address(ty) => write!(f, "*{ty}"),
            Type::Attributed { attributes, ty } => {
                for attr in attributes {
                    write!(f, "@{attr} ")?;
                }
                write!(f, "{ty}")
            }
            Type::Generic { params, ty } => {
                write!(f, "<{}> {ty}", params.join(", "))
            }
            Type::Ownership { kind, ty } => write!(f, "@{kind} {ty}"),
            Type::Builtin(name) => write!(f, "Builtin.{name}"),
        }
    }
}

/// A named field of a nominal type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    pub ty: Type,
}

/// Maps nominal type names to their ordered field lists.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TypeEnvironment {
    types: FastHashMap<String, Vec<StructField>>,
}

impl TypeEnvironment {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, name: impl Into<String>, fields: Vec<StructField>) {
        self.types.insert(name.into(), fields);
    }

    #[must_use]
    pub fn fields(&self, name: &str) -> Option<&[StructField]> {
        self.types.get(name).map(Vec::as_slice)
    }

    /// Position of `field` in the declared field order of `name`.
    #[must_use]
    pub fn field_index(&self, name: &str, field: &str) -> Option<usize> {
        self.fields(name)?.iter().position(|f| f.name == field)
    }
}

/// One SSA operator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Operator {
    // Ownership bookkeeping; the result shares the operand's abstract value.
    BeginBorrow { operand: Register },
    CopyValue { operand: Register },
    ConvertFunction { operand: Register },
    ConvertEscapeToNoescape { operand: Register },
    ThinToThickFunction { operand: Register },
    MarkDependence { value: Register, base: Register },

    IntegerLiteral { ty: Type, value: i64 },
    /// The array-literal form: allocates an array of the given elements.
    ArrayLiteral { element_ty: Type, elements: Vec<Register> },
    /// A compiler builtin by name, e.g. `literal_equal`.
    Builtin { name: String, operands: Vec<Register> },

    FunctionRef { name: String },
    PartialApply {
        callee: Register,
        args: Vec<Register>,
        arg_types: Vec<Type>,
    },

    Struct { ty: Type, operands: Vec<Register> },
    Tuple { operands: Vec<Register> },
    DestructureTuple { operand: Register },
    StructExtract {
        operand: Register,
        ty_name: String,
        field: String,
    },
    TupleExtract { operand: Register, index: usize },

    GlobalAddr { symbol: String },
    Load { address: Register },

    Apply { callee: Register, args: Vec<Register> },
    /// Starts a coroutine apply; the last result is the continuation token.
    BeginApply { callee: Register, args: Vec<Register> },
    EndApply { token: Register },

    /// Anything the interpreter has no semantics for.
    Unknown { name: String },
}

impl Operator {
    /// Operator name for diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Operator::BeginBorrow { .. } => "begin_borrow",
            Operator::CopyValue { .. } => "copy_value",
            Operator::ConvertFunction { .. } => "convert_function",
            Operator::ConvertEscapeToNoescape { .. } => "convert_escape_to_noescape",
            Operator::ThinToThickFunction { .. } => "thin_to_thick_function",
            Operator::MarkDependence { .. } => "mark_dependence",
            Operator::IntegerLiteral { .. } => "integer_literal",
            Operator::ArrayLiteral { .. } => "array_literal",
            Operator::Builtin { .. } => "builtin",
            Operator::FunctionRef { .. } => "function_ref",
            Operator::PartialApply { .. } => "partial_apply",
            Operator::Struct { .. } => "struct",
            Operator::Tuple { .. } => "tuple",
            Operator::DestructureTuple { .. } => "destructure_tuple",
            Operator::StructExtract { .. } => "struct_extract",
            Operator::TupleExtract { .. } => "tuple_extract",
            Operator::GlobalAddr { .. } => "global_addr",
            Operator::Load { .. } => "load",
            Operator::Apply { .. } => "apply",
            Operator::BeginApply { .. } => "begin_apply",
            Operator::EndApply { .. } => "end_apply",
            Operator::Unknown { .. } => "unknown",
        }
    }
}

/// An operator definition: result registers with their types, the operator,
/// and the source position the parser recorded for it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperatorDef {
    pub results: Vec<(Register, Type)>,
    pub operator: Operator,
    pub source: Option<SourceInfo>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Terminator {
    Br {
        dest: BlockLabel,
        operands: Vec<Register>,
    },
    CondBr {
        condition: Register,
        true_dest: BlockLabel,
        true_operands: Vec<Register>,
        false_dest: BlockLabel,
        false_operands: Vec<Register>,
    },
    Return { operand: Register },
    SwitchEnum {
        operand: Register,
        cases: Vec<(String, BlockLabel)>,
        default: Option<BlockLabel>,
    },
    Unreachable,
    Unknown { name: String },
}

impl Terminator {
    /// Successor labels, in syntactic order.
    #[must_use]
    pub fn successors(&self) -> Vec<&BlockLabel> {
        match self {
            Terminator::Br { dest, .. } => vec![dest],
            Terminator::CondBr {
                true_dest,
                false_dest,
                ..
            } => vec![true_dest, false_dest],
            Terminator::SwitchEnum { cases, default, .. } => {
                let mut out: Vec<&BlockLabel> = cases.iter().map(|(_, dest)| dest).collect();
                if let Some(default) = default {
                    out.push(default);
                }
                out
            }
            Terminator::Return { .. } | Terminator::Unreachable | Terminator::Unknown { .. } => {
                Vec::new()
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TerminatorDef {
    pub terminator: Terminator,
    pub source: Option<SourceInfo>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub label: BlockLabel,
    pub arguments: Vec<(Register, Type)>,
    pub operators: Vec<OperatorDef>,
    pub terminator: TerminatorDef,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub result: Type,
    pub blocks: Vec<Block>,
}

/// A compiled module: functions plus the nominal-type field tables.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Module {
    pub functions: Vec<Function>,
    #[serde(default)]
    pub types: TypeEnvironment,
}

/// Injected CFG preprocessing: reducibility testing and loop unrolling.
///
/// `unloop` must return an acyclic graph whose semantics conservatively
/// over-approximate the original; it is only called when
/// `induces_reducible_cfg` returned `true`.
pub trait CfgPreprocessor {
    fn induces_reducible_cfg(&self, blocks: &[Block]) -> bool;
    fn unloop(&self, blocks: Vec<Block>) -> Vec<Block>;
}

/// The degenerate preprocessor: accepts graphs that are already acyclic and
/// returns them unchanged. Suitable whenever loops were eliminated upstream.
#[derive(Clone, Copy, Debug, Default)]
pub struct AcyclicCfg;

impl CfgPreprocessor for AcyclicCfg {
    fn induces_reducible_cfg(&self, blocks: &[Block]) -> bool {
        is_acyclic(blocks)
    }

    fn unloop(&self, blocks: Vec<Block>) -> Vec<Block> {
        blocks
    }
}

fn is_acyclic(blocks: &[Block]) -> bool {
    let index: FastHashMap<&BlockLabel, usize> = blocks
        .iter()
        .enumerate()
        .map(|(i, b)| (&b.label, i))
        .collect();

    // Iterative DFS with an explicit color map.
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Grey,
        Black,
    }
    let mut colors = vec![Color::White; blocks.len()];
    let mut stack: Vec<(usize, usize)> = Vec::new();
    for start in 0..blocks.len() {
        if colors[start] != Color::White {
            continue;
        }
        colors[start] = Color::Grey;
        stack.push((start, 0));
        while let Some(entry) = stack.last_mut() {
            let (node, edge) = *entry;
            let succs = blocks[node].terminator.terminator.successors();
            if edge >= succs.len() {
                colors[node] = Color::Black;
                stack.pop();
                continue;
            }
            entry.1 += 1;
            // Edges to unknown labels are reported later by the interpreter.
            let Some(&next) = index.get(succs[edge]) else {
                continue;
            };
            match colors[next] {
                Color::Grey => return false,
                Color::White => {
                    colors[next] = Color::Grey;
                    stack.push((next, 0));
                }
                Color::Black => {}
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn block(label: &str, terminator: Terminator) -> Block {
        Block {
            label: label.into(),
            arguments: Vec::new(),
            operators: Vec::new(),
            terminator: TerminatorDef {
                terminator,
                source: None,
            },
        }
    }

    #[rstest]
    fn test_simplified_strips_wrappers() {
        let ty = Type::Ownership {
            kind: "owned".to_string(),
            ty: Handle::new(Type::Attributed {
                attributes: vec!["guaranteed".to_string()],
                ty: Handle::new(Type::Named("Int".to_string())),
            }),
        };
        assert_eq!(ty.simplified(), &Type::Named("Int".to_string()));
    }

    #[rstest]
    fn test_field_index_follows_declaration_order() {
        let mut env = TypeEnvironment::new();
        env.declare(
            "Conv2D",
            vec![
                StructField {
                    name: "strides".to_string(),
                    ty: Type::Named("Int".to_string()),
                },
                StructField {
                    name: "padding".to_string(),
                    ty: Type::Named("Int".to_string()),
                },
            ],
        );
        assert_eq!(env.field_index("Conv2D", "padding"), Some(1));
        assert_eq!(env.field_index("Conv2D", "rate"), None);
    }

    #[rstest]
    fn test_acyclic_cfg_accepts_diamond() {
        let blocks = vec![
            block(
                "bb0",
                Terminator::CondBr {
                    condition: "c".into(),
                    true_dest: "bb1".into(),
                    true_operands: vec![],
                    false_dest: "bb2".into(),
                    false_operands: vec![],
                },
            ),
            block(
                "bb1",
                Terminator::Br {
                    dest: "bb3".into(),
                    operands: vec![],
                },
            ),
            block(
                "bb2",
                Terminator::Br {
                    dest: "bb3".into(),
                    operands: vec![],
                },
            ),
            block(
                "bb3",
                Terminator::Return {
                    operand: "r".into(),
                },
            ),
        ];
        assert!(AcyclicCfg.induces_reducible_cfg(&blocks));
    }

    #[rstest]
    fn test_acyclic_cfg_rejects_loop() {
        let blocks = vec![
            block(
                "bb0",
                Terminator::Br {
                    dest: "bb1".into(),
                    operands: vec![],
                },
            ),
            block(
                "bb1",
                Terminator::Br {
                    dest: "bb0".into(),
                    operands: vec![],
                },
            ),
        ];
        assert!(!AcyclicCfg.induces_reducible_cfg(&blocks));
    }
}
