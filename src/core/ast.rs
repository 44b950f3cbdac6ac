// src/core/ast.rs
//! Abstract Syntax Tree definitions. Built once by the parser, read-only for
//! the interpreter and the compiler.

use std::rc::Rc;

use crate::core::symbols::{Keyword, Operator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    pub line: usize,
    pub col: usize,
}

impl Pos {
    pub fn new(line: usize, col: usize) -> Self {
        Self { line, col }
    }
}

impl std::fmt::Display for Pos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Function and lambda definitions; shared so that function values can hold
/// the body without copying the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: FunctionBody,
    pub is_async: bool,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionBody {
    Block(Vec<AstNode>),
    /// `x => expr` lambdas evaluate to their expression.
    Expr(Box<AstNode>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub value: AstNode,
    pub body: Vec<AstNode>,
}

/// The six AI primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Infer,
    Embed,
    PromptTemplate,
    PipeCompose,
    ReflectExec,
    SemanticSearch,
}

impl Primitive {
    pub const ALL: [Primitive; 6] = [
        Primitive::Infer,
        Primitive::Embed,
        Primitive::PromptTemplate,
        Primitive::PipeCompose,
        Primitive::ReflectExec,
        Primitive::SemanticSearch,
    ];

    pub fn from_keyword(k: Keyword) -> Option<Self> {
        match k {
            Keyword::Infer => Some(Primitive::Infer),
            Keyword::Embed => Some(Primitive::Embed),
            Keyword::Prompt => Some(Primitive::PromptTemplate),
            Keyword::Compose => Some(Primitive::PipeCompose),
            Keyword::Reflect => Some(Primitive::ReflectExec),
            Keyword::Search => Some(Primitive::SemanticSearch),
            _ => None,
        }
    }

    /// Stable name shared by the interpreter, the trace and the JS runtime.
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Infer => "infer",
            Primitive::Embed => "embed",
            Primitive::PromptTemplate => "promptTemplate",
            Primitive::PipeCompose => "pipeCompose",
            Primitive::ReflectExec => "reflectExec",
            Primitive::SemanticSearch => "semanticSearch",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.name() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
}

/// Represents nodes in the Abstract Syntax Tree
#[derive(Debug, Clone, PartialEq)]
pub enum AstNode {
    // Program root
    Program(Vec<AstNode>),

    // Declarations
    Let {
        name: String,
        value: Option<Box<AstNode>>,
        constant: bool,
        pos: Pos,
    },
    FunctionDecl(Rc<FunctionDef>),
    ClassDecl {
        name: String,
        parent: Option<String>,
        methods: Vec<Rc<FunctionDef>>,
        pos: Pos,
    },
    Import {
        module: String,
        pos: Pos,
    },

    // Statements
    Block(Vec<AstNode>),
    Print(Vec<AstNode>),
    Return(Option<Box<AstNode>>),
    Yield(Box<AstNode>),
    Break,
    Continue,
    Halt,

    // Control flow
    If {
        condition: Box<AstNode>,
        then_branch: Box<AstNode>,
        else_branch: Option<Box<AstNode>>,
    },
    While {
        condition: Box<AstNode>,
        body: Box<AstNode>,
    },
    Loop(Box<AstNode>),
    ForEach {
        var: String,
        iterable: Box<AstNode>,
        body: Box<AstNode>,
    },
    Try {
        body: Box<AstNode>,
        catch_name: Option<String>,
        handler: Box<AstNode>,
    },
    Switch {
        subject: Box<AstNode>,
        cases: Vec<SwitchCase>,
        default: Option<Vec<AstNode>>,
    },

    // Expressions
    Assign {
        target: Box<AstNode>,
        value: Box<AstNode>,
        pos: Pos,
    },
    Lambda(Rc<FunctionDef>),
    Binary {
        op: Operator,
        left: Box<AstNode>,
        right: Box<AstNode>,
        pos: Pos,
    },
    Logical {
        op: LogicalOp,
        left: Box<AstNode>,
        right: Box<AstNode>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<AstNode>,
        pos: Pos,
    },
    Await(Box<AstNode>),
    Call {
        callee: Box<AstNode>,
        args: Vec<AstNode>,
        pos: Pos,
    },
    Member {
        object: Box<AstNode>,
        name: String,
        pos: Pos,
    },
    Index {
        object: Box<AstNode>,
        index: Box<AstNode>,
        pos: Pos,
    },
    Primitive {
        primitive: Primitive,
        args: Vec<AstNode>,
        pos: Pos,
    },
    Identifier {
        name: String,
        pos: Pos,
    },
    This(Pos),
    Super {
        method: String,
        pos: Pos,
    },
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    Array(Vec<AstNode>),
    Map(Vec<(AstNode, AstNode)>),

    // Special
    Error(String),
}

impl AstNode {
    pub fn ident(name: &str, pos: Pos) -> Self {
        AstNode::Identifier {
            name: name.to_string(),
            pos,
        }
    }

    pub fn new_call(callee: AstNode, args: Vec<AstNode>, pos: Pos) -> Self {
        AstNode::Call {
            callee: Box::new(callee),
            args,
            pos,
        }
    }

    pub fn new_binary(op: Operator, left: AstNode, right: AstNode, pos: Pos) -> Self {
        AstNode::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            pos,
        }
    }

    pub fn new_if(cond: AstNode, then_branch: AstNode, else_branch: Option<AstNode>) -> Self {
        AstNode::If {
            condition: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch: else_branch.map(Box::new),
        }
    }

    pub fn new_while(cond: AstNode, body: AstNode) -> Self {
        AstNode::While {
            condition: Box::new(cond),
            body: Box::new(body),
        }
    }

    /// Whether the subtree contains a `yield` belonging to this function
    /// (nested function definitions are not searched).
    pub fn contains_yield(&self) -> bool {
        use AstNode::*;
        match self {
            Yield(_) => true,
            Program(items) | Block(items) | Print(items) | Array(items) => {
                items.iter().any(AstNode::contains_yield)
            }
            Let { value, .. } => value.as_ref().map_or(false, |v| v.contains_yield()),
            Return(v) => v.as_ref().map_or(false, |v| v.contains_yield()),
            If {
                condition,
                then_branch,
                else_branch,
            } => {
                condition.contains_yield()
                    || then_branch.contains_yield()
                    || else_branch.as_ref().map_or(false, |e| e.contains_yield())
            }
            While { condition, body } => condition.contains_yield() || body.contains_yield(),
            Loop(body) | Await(body) => body.contains_yield(),
            ForEach { iterable, body, .. } => iterable.contains_yield() || body.contains_yield(),
            Try { body, handler, .. } => body.contains_yield() || handler.contains_yield(),
            Switch {
                subject,
                cases,
                default,
            } => {
                subject.contains_yield()
                    || cases
                        .iter()
                        .any(|c| c.value.contains_yield() || c.body.iter().any(AstNode::contains_yield))
                    || default
                        .as_ref()
                        .map_or(false, |d| d.iter().any(AstNode::contains_yield))
            }
            Assign { target, value, .. } => target.contains_yield() || value.contains_yield(),
            Binary { left, right, .. } | Logical { left, right, .. } => {
                left.contains_yield() || right.contains_yield()
            }
            Unary { operand, .. } => operand.contains_yield(),
            Call { callee, args, .. } => {
                callee.contains_yield() || args.iter().any(AstNode::contains_yield)
            }
            Member { object, .. } => object.contains_yield(),
            Index { object, index, .. } => object.contains_yield() || index.contains_yield(),
            AstNode::Primitive { args, .. } => args.iter().any(AstNode::contains_yield),
            Map(pairs) => pairs
                .iter()
                .any(|(k, v)| k.contains_yield() || v.contains_yield()),
            FunctionDecl(_) | Lambda(_) | ClassDecl { .. } | Import { .. } | Break | Continue
            | Halt | Identifier { .. } | This(_) | Super { .. } | Number(_) | Str(_) | Bool(_)
            | Null | Error(_) => false,
        }
    }
}

impl FunctionDef {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<lambda>")
    }

    pub fn is_generator(&self) -> bool {
        match &self.body {
            FunctionBody::Block(stmts) => stmts.iter().any(AstNode::contains_yield),
            FunctionBody::Expr(e) => e.contains_yield(),
        }
    }
}
