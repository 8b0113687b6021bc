//! Lowering from the AST to a reverse-Polish instruction list
//!
//! The whole program becomes one flat, ordered sequence of stack-machine
//! instructions. Arguments are lowered left-to-right, the callee last, so
//! execution only ever needs the accumulator plus a spill stack. Name
//! references stay symbolic here (`Bind`/`Get`/`Set` carry a source offset);
//! the resolution passes in [`crate::resolve`] rewrite them into hop counts
//! before code generation.
//!
//! Scope ids are the RPN index of the opening `ScopeBegin`, which is unique
//! by construction and doubles as a stable label in the generated C.

use crate::core::{Ast, Error, Node, Source, NONE};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Ins {
    /// Open a function body; the next `args` binds are the formals
    Lambda { args: u32 },
    /// At entry, restore the closure chain from the value in the accumulator
    LambdaContextLoad,
    /// Close a function body
    LambdaRet,
    ScopeBegin { id: u32 },
    ScopeEnd { id: u32 },
    /// If the accumulator is zero jump to `target` (the matching else); pop
    ConditionStart { target: u32 },
    /// Unconditional jump to `target` (the matching end)
    ConditionElse { target: u32 },
    ConditionEnd,
    /// Move the accumulator into the bind array under this name
    Bind { name: u32 },
    /// As `Bind`, but the binding lives on the heap closure chain
    BindCaptured { name: u32 },
    Set { name: u32 },
    Get { name: u32 },
    SetCaptured { name: u32 },
    GetCaptured { name: u32 },
    SetByHops { hops: u32 },
    GetByHops { hops: u32 },
    SetCapturedByHops { hops: u32 },
    GetCapturedByHops { hops: u32 },
    PushNumber { value: i64 },
    Call { arity: u32 },
    /// Push the string literal whose opening quote is at `offset`
    Str { offset: u32 },
    /// Reserved slot, never emitted on the lowering paths
    Placeholder,
}

/// The lowered program: the instruction list plus the index of every
/// `Lambda` instruction, in the order the lambdas open.
#[derive(Default, Debug)]
pub struct Rpn {
    pub ins: Vec<Ins>,
    pub lambdas: Vec<u32>,
}

struct Lowering<'a> {
    source: &'a Source,
    ast: &'a Ast,
    rpn: Rpn,
}

impl<'a> Lowering<'a> {
    fn emit(&mut self, ins: Ins) -> u32 {
        let at = self.rpn.ins.len() as u32;
        if let Ins::Lambda { .. } = ins {
            self.rpn.lambdas.push(at);
        }
        self.rpn.ins.push(ins);
        at
    }

    fn scope_begin(&mut self) -> u32 {
        let id = self.rpn.ins.len() as u32;
        self.emit(Ins::ScopeBegin { id });
        id
    }

    fn scope_end(&mut self, id: u32) {
        self.emit(Ins::ScopeEnd { id });
    }

    fn expr(&mut self, id: u32) -> Result<(), Error> {
        if id == NONE {
            return Err(Error::EmptyCall);
        }
        match self.ast.get(id) {
            Node::Symbol { offset } => {
                let text = self.source.symbol_at(offset);
                match text.parse::<i64>() {
                    Ok(value) => self.emit(Ins::PushNumber { value }),
                    Err(_) => self.emit(Ins::Get { name: offset }),
                };
                Ok(())
            }
            Node::Str { offset } => {
                self.emit(Ins::Str { offset });
                Ok(())
            }
            Node::List { .. } => self.call(id),
        }
    }

    fn call(&mut self, id: u32) -> Result<(), Error> {
        let elems = self.ast.elems(id);

        // lambda/if/let are only special as the head of a call.
        if elems[0] != NONE {
            if let Node::Symbol { offset } = self.ast.get(elems[0]) {
                match self.source.symbol_at(offset) {
                    "lambda" => return self.lambda(&elems),
                    "if" => return self.cond(&elems),
                    "let" => return self.vars(&elems),
                    _ => {}
                }
            }
        }

        for arg in &elems[1..] {
            self.expr(*arg)?;
        }
        self.expr(elems[0])?;
        self.emit(Ins::Call { arity: (elems.len() - 1) as u32 });
        Ok(())
    }

    /// `(lambda (p1 .. pn) body)`
    fn lambda(&mut self, elems: &[u32]) -> Result<(), Error> {
        if elems.len() != 3 {
            return Err(Error::Lowering(String::from(
                "lambda takes a parameter list and a body",
            )));
        }
        let formals = self.assert_list(elems[1], "lambda parameters must be a list")?;
        let params = formals
            .iter()
            .map(|&p| self.assert_symbol(p, "lambda parameter must be a symbol"))
            .collect::<Result<Vec<u32>, Error>>()?;

        self.emit(Ins::Lambda { args: params.len() as u32 });
        let scope = self.scope_begin();
        self.emit(Ins::LambdaContextLoad);
        for name in params {
            self.emit(Ins::Bind { name });
        }
        self.expr(elems[2])?;
        self.scope_end(scope);
        self.emit(Ins::LambdaRet);
        Ok(())
    }

    /// `(if c t e)`
    ///
    /// The branch targets are back-patched once the else and end slots are
    /// known. The generated C relies on the bracket structure instead of the
    /// targets, but the indices keep the RPN dump honest and checkable.
    fn cond(&mut self, elems: &[u32]) -> Result<(), Error> {
        if elems.len() != 4 {
            return Err(Error::Lowering(String::from(
                "if takes a condition and two branches",
            )));
        }
        self.scoped(elems[1])?;
        let start = self.emit(Ins::ConditionStart { target: 0 });
        self.scoped(elems[2])?;
        let alt = self.emit(Ins::ConditionElse { target: 0 });
        self.rpn.ins[start as usize] = Ins::ConditionStart { target: alt };
        self.scoped(elems[3])?;
        let end = self.rpn.ins.len() as u32;
        self.emit(Ins::ConditionEnd);
        self.rpn.ins[alt as usize] = Ins::ConditionElse { target: end };
        Ok(())
    }

    /// `(let (n1 e1 .. nk ek) body)` — bindings come as a flat list of
    /// name/value pairs.
    ///
    /// Each name binds to 0 first and is stored into after its expression
    /// evaluates, so the binding is in scope inside its own initializer and
    /// a lambda bound this way can call itself.
    fn vars(&mut self, elems: &[u32]) -> Result<(), Error> {
        if elems.len() != 3 {
            return Err(Error::Lowering(String::from("let takes a binding list and a body")));
        }
        let binds = self.assert_list(elems[1], "let bindings must be a list")?;
        if binds.len() % 2 != 0 {
            return Err(Error::Lowering(String::from(
                "let bindings must be name and value pairs",
            )));
        }

        let scope = self.scope_begin();
        for pair in binds.chunks(2) {
            let name = self.assert_symbol(pair[0], "let binding name must be a symbol")?;
            self.emit(Ins::PushNumber { value: 0 });
            self.emit(Ins::Bind { name });
            self.expr(pair[1])?;
            self.emit(Ins::Set { name });
        }
        self.expr(elems[2])?;
        self.scope_end(scope);
        Ok(())
    }

    fn scoped(&mut self, id: u32) -> Result<(), Error> {
        let scope = self.scope_begin();
        self.expr(id)?;
        self.scope_end(scope);
        Ok(())
    }

    fn assert_list(&self, id: u32, message: &str) -> Result<Vec<u32>, Error> {
        if id == NONE {
            return Ok(Vec::new());
        }
        match self.ast.get(id) {
            Node::List { .. } => Ok(self.ast.elems(id)),
            _ => Err(Error::Lowering(String::from(message))),
        }
    }

    fn assert_symbol(&self, id: u32, message: &str) -> Result<u32, Error> {
        if id == NONE {
            return Err(Error::Lowering(String::from(message)));
        }
        match self.ast.get(id) {
            Node::Symbol { offset } => Ok(offset),
            _ => Err(Error::Lowering(String::from(message))),
        }
    }
}

/// Lower the expression at `root` into a fresh instruction list.
pub fn lower(source: &Source, ast: &Ast, root: u32) -> Result<Rpn, Error> {
    let mut l = Lowering { source, ast, rpn: Rpn::default() };
    l.expr(root)?;
    Ok(l.rpn)
}

/// One line per instruction, for the stderr dump.
pub fn dump(source: &Source, rpn: &Rpn) -> String {
    let mut out = String::new();
    for (i, ins) in rpn.ins.iter().enumerate() {
        let line = match *ins {
            Ins::Lambda { args } => format!("lambda {}", args),
            Ins::LambdaContextLoad => String::from("lambda_context_load"),
            Ins::LambdaRet => String::from("lambda_ret"),
            Ins::ScopeBegin { id } => format!("scope_begin {}", id),
            Ins::ScopeEnd { id } => format!("scope_end {}", id),
            Ins::ConditionStart { target } => format!("condition_start {}", target),
            Ins::ConditionElse { target } => format!("condition_else {}", target),
            Ins::ConditionEnd => String::from("condition_end"),
            Ins::Bind { name } => format!("bind {}", source.symbol_at(name)),
            Ins::BindCaptured { name } => format!("bind_captured {}", source.symbol_at(name)),
            Ins::Set { name } => format!("set {}", source.symbol_at(name)),
            Ins::Get { name } => format!("get {}", source.symbol_at(name)),
            Ins::SetCaptured { name } => format!("set_captured {}", source.symbol_at(name)),
            Ins::GetCaptured { name } => format!("get_captured {}", source.symbol_at(name)),
            Ins::SetByHops { hops } => format!("set_by_hops {}", hops),
            Ins::GetByHops { hops } => format!("get_by_hops {}", hops),
            Ins::SetCapturedByHops { hops } => format!("set_captured_by_hops {}", hops),
            Ins::GetCapturedByHops { hops } => format!("get_captured_by_hops {}", hops),
            Ins::PushNumber { value } => format!("push_number {}", value),
            Ins::Call { arity } => format!("call {}", arity),
            Ins::Str { offset } => format!("str \"{}\"", source.string_at(offset)),
            Ins::Placeholder => String::from("placeholder"),
        };
        out.push_str(&format!("{:4} {}\n", i, line));
    }
    out
}

#[cfg(test)]
pub fn lower1(program: &str) -> (Source, Rpn) {
    use crate::{parser, tokenizer};

    let source = Source::new(program);
    let tokens = tokenizer::tokenize(&source).unwrap();
    let mut ast = Ast::default();
    let root = parser::parse(&tokens, &mut ast).unwrap();
    let rpn = lower(&source, &ast, root).unwrap();
    (source, rpn)
}
