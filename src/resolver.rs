use crate::error::parser_error;
use crate::interpreter::Interpreter;
use crate::syntax::{expr, stmt};
use crate::syntax::{Expr, LiteralValue, Stmt};
use crate::token::Token;

use std::collections::HashMap;
use std::mem;
use std::rc::Rc;

use crate::error::Error;
use log::trace;

// Tracks what kind of function body the walk is currently inside, so return
// statements can be validated without any runtime machinery.
#[derive(Debug, Clone)]
enum FunctionType {
    None,
    Function,
    Initializer,
    Method,
}

#[derive(Debug, Clone)]
enum ClassType {
    None,
    Class,
    Subclass,
}

// A single pass between parsing and evaluation. For every variable-ish
// expression it publishes the hop count from the reference site to the frame
// holding the binding, keyed by the expression's id, straight into the
// interpreter's side table. It also rejects the scope errors that can be
// caught without running anything.
pub struct Resolver<'i> {
    interpreter: &'i mut Interpreter,

    // Innermost scope last. Each scope maps a name to whether its
    // initializer has finished resolving. Only locals live here: the global
    // scope is deliberately untracked, and names that fall off the end of
    // this stack are looked up in the global frame at runtime.
    scopes: Vec<HashMap<String, bool>>,

    current_function: FunctionType,
    current_class: ClassType,

    pub had_error: bool,
}

impl<'i> Resolver<'i> {
    pub fn new(interpreter: &'i mut Interpreter) -> Self {
        Resolver {
            interpreter,
            scopes: Vec::new(),
            current_function: FunctionType::None,
            current_class: ClassType::None,
            had_error: false,
        }
    }

    pub fn resolve_stmts(&mut self, statements: &Vec<Stmt>) {
        for statement in statements {
            self.resolve_stmt(statement)
        }
    }

    fn resolve_stmt(&mut self, statement: &Stmt) {
        trace!("resolving {:?}", statement);
        // the visitor only errors at runtime; resolution reports and goes on
        let _ = statement.accept(self);
    }

    fn resolve_expr(&mut self, expression: &Expr) {
        let _ = expression.accept(self);
    }

    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    // Declaring inserts the name marked "not ready"; the initializer resolves
    // against that marker so `var a = a;` is caught. Defining flips it once
    // the initializer is done.
    fn declare(&mut self, name: &Token) {
        if self.scopes.is_empty() {
            return;
        }
        if self
            .scopes
            .last()
            .expect("scope stack is non-empty")
            .contains_key(&name.lexeme)
        {
            self.error(name, "Already a variable with this name in this scope.");
            return;
        }
        self.scopes
            .last_mut()
            .expect("scope stack is non-empty")
            .insert(name.lexeme.clone(), false);
    }

    fn define(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.lexeme.clone(), true);
        }
    }

    // Innermost scope outward; the first hit is the binding the reference
    // means, and its index is the hop count the evaluator will walk. No hit
    // means the name is (presumed) global and nothing is published.
    fn resolve_local(&mut self, id: usize, name: &Token) {
        for (depth, scope) in self.scopes.iter().rev().enumerate() {
            if scope.contains_key(&name.lexeme) {
                self.interpreter.resolve(id, depth);
                return;
            }
        }
    }

    // Unlike the interpreter, which doesn't touch a function body until the
    // function is called, resolution traverses the body right away, inside a
    // fresh scope holding the parameters.
    fn resolve_function(&mut self, params: &Vec<Token>, body: &Vec<Stmt>, tpe: FunctionType) {
        let enclosing_function = mem::replace(&mut self.current_function, tpe);
        self.begin_scope();
        for param in params {
            self.declare(param);
            self.define(param);
        }
        self.resolve_stmts(body);
        self.end_scope();
        self.current_function = enclosing_function;
    }

    fn error(&mut self, token: &Token, message: &str) {
        parser_error(token, message);
        self.had_error = true;
    }
}

impl<'i> expr::Visitor<()> for Resolver<'i> {
    fn visit_assign_expr(&mut self, id: usize, name: &Token, value: &Expr) -> Result<(), Error> {
        // the value may itself reference variables, so it goes first
        self.resolve_expr(value);
        self.resolve_local(id, name);
        Ok(())
    }

    fn visit_binary_expr(
        &mut self,
        left: &Expr,
        _operator: &Token,
        right: &Expr,
    ) -> Result<(), Error> {
        self.resolve_expr(left);
        self.resolve_expr(right);
        Ok(())
    }

    fn visit_call_expr(
        &mut self,
        callee: &Expr,
        _paren: &Token,
        arguments: &Vec<Expr>,
    ) -> Result<(), Error> {
        self.resolve_expr(callee);
        for argument in arguments {
            self.resolve_expr(argument);
        }
        Ok(())
    }

    // Properties are dispatched dynamically, so only the receiver resolves.
    fn visit_get_expr(&mut self, object: &Expr, _name: &Token) -> Result<(), Error> {
        self.resolve_expr(object);
        Ok(())
    }

    fn visit_grouping_expr(&mut self, expression: &Expr) -> Result<(), Error> {
        self.resolve_expr(expression);
        Ok(())
    }

    fn visit_literal_expr(&mut self, _value: &LiteralValue) -> Result<(), Error> {
        Ok(())
    }

    // Static analysis has no short-circuiting: both sides resolve.
    fn visit_logical_expr(
        &mut self,
        left: &Expr,
        _operator: &Token,
        right: &Expr,
    ) -> Result<(), Error> {
        self.resolve_expr(left);
        self.resolve_expr(right);
        Ok(())
    }

    fn visit_set_expr(&mut self, object: &Expr, _name: &Token, value: &Expr) -> Result<(), Error> {
        self.resolve_expr(value);
        self.resolve_expr(object);
        Ok(())
    }

    fn visit_super_expr(&mut self, id: usize, keyword: &Token, _method: &Token) -> Result<(), Error> {
        match self.current_class {
            ClassType::None => {
                self.error(keyword, "Can't use 'super' outside of a class.");
            }
            ClassType::Class => {
                self.error(keyword, "Can't use 'super' in a class with no superclass.");
            }
            ClassType::Subclass => {
                self.resolve_local(id, keyword);
            }
        }
        Ok(())
    }

    fn visit_this_expr(&mut self, id: usize, keyword: &Token) -> Result<(), Error> {
        if let ClassType::None = self.current_class {
            self.error(keyword, "Can't use 'this' outside of a class.");
        } else {
            self.resolve_local(id, keyword);
        }
        Ok(())
    }

    fn visit_unary_expr(&mut self, _operator: &Token, right: &Expr) -> Result<(), Error> {
        self.resolve_expr(right);
        Ok(())
    }

    fn visit_variable_expr(&mut self, id: usize, name: &Token) -> Result<(), Error> {
        // declared but not yet defined means the variable is being read
        // inside its own initializer
        if let Some(scope) = self.scopes.last() {
            if let Some(false) = scope.get(&name.lexeme).copied() {
                self.error(name, "Can't read local variable in its own initializer.");
            }
        }
        self.resolve_local(id, name);
        Ok(())
    }
}

impl<'i> stmt::Visitor<()> for Resolver<'i> {
    fn visit_block_stmt(&mut self, statements: &Vec<Stmt>) -> Result<(), Error> {
        self.begin_scope();
        self.resolve_stmts(statements);
        self.end_scope();
        Ok(())
    }

    // Methods resolve inside two implicit scopes wrapped around their
    // bodies: `super` (only under inheritance) strictly outside `this`. The
    // evaluator builds its frames in the same order, so the published hop
    // counts line up.
    fn visit_class_stmt(
        &mut self,
        name: &Token,
        superclass: &Option<Expr>,
        methods: &Vec<Stmt>,
    ) -> Result<(), Error> {
        let enclosing_class = mem::replace(&mut self.current_class, ClassType::Class);

        self.declare(name);
        self.define(name);

        if let Some(superclass_expr) = superclass {
            if let Expr::Variable {
                name: superclass_name,
                ..
            } = superclass_expr
            {
                if superclass_name.lexeme == name.lexeme {
                    self.error(superclass_name, "A class can't inherit from itself.");
                }
            }

            self.current_class = ClassType::Subclass;
            self.resolve_expr(superclass_expr);

            self.begin_scope();
            self.scopes
                .last_mut()
                .expect("scope stack empty after begin_scope")
                .insert("super".to_owned(), true);
        }

        self.begin_scope();
        self.scopes
            .last_mut()
            .expect("scope stack empty after begin_scope")
            .insert("this".to_owned(), true);

        for method in methods {
            if let Stmt::Function { name, params, body } = method {
                let declaration = if name.lexeme == "init" {
                    FunctionType::Initializer
                } else {
                    FunctionType::Method
                };
                self.resolve_function(params, body, declaration);
            } else {
                unreachable!("class bodies hold only methods")
            }
        }
        self.end_scope();

        if superclass.is_some() {
            self.end_scope();
        }

        self.current_class = enclosing_class;

        Ok(())
    }

    fn visit_expression_stmt(&mut self, expression: &Expr) -> Result<(), Error> {
        self.resolve_expr(expression);
        Ok(())
    }

    // The name is defined eagerly, before the body resolves, so a function
    // can recurse into itself.
    fn visit_function_stmt(
        &mut self,
        name: &Token,
        params: &Rc<Vec<Token>>,
        body: &Rc<Vec<Stmt>>,
    ) -> Result<(), Error> {
        self.declare(name);
        self.define(name);

        self.resolve_function(params, body, FunctionType::Function);
        Ok(())
    }

    fn visit_if_stmt(
        &mut self,
        condition: &Expr,
        then_branch: &Stmt,
        else_branch: &Option<Stmt>,
    ) -> Result<(), Error> {
        self.resolve_expr(condition);
        self.resolve_stmt(then_branch);
        if let Some(else_stmt) = else_branch {
            self.resolve_stmt(else_stmt);
        }
        Ok(())
    }

    fn visit_print_stmt(&mut self, expression: &Expr) -> Result<(), Error> {
        self.resolve_expr(expression);
        Ok(())
    }

    fn visit_return_stmt(&mut self, keyword: &Token, value: &Option<Expr>) -> Result<(), Error> {
        if let FunctionType::None = self.current_function {
            self.error(keyword, "Can't return from top-level code.");
        }

        if let Some(return_value) = value {
            if let FunctionType::Initializer = self.current_function {
                self.error(keyword, "Can't return a value from an initializer.");
            }

            self.resolve_expr(return_value);
        }
        Ok(())
    }

    // Declare, resolve the initializer against the not-ready marker, define.
    fn visit_var_stmt(&mut self, name: &Token, initializer: &Option<Expr>) -> Result<(), Error> {
        self.declare(name);
        if let Some(init) = initializer {
            self.resolve_expr(init);
        }
        self.define(name);
        Ok(())
    }

    // The body resolves exactly once, looping or not.
    fn visit_while_stmt(&mut self, condition: &Expr, body: &Stmt) -> Result<(), Error> {
        self.resolve_expr(condition);
        self.resolve_stmt(body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::scanner::Scanner;

    fn had_resolve_error(source: &str) -> bool {
        let mut scanner = Scanner::new(source.to_string());
        let tokens = scanner.scan_tokens().expect("scan failed");
        let mut parser = Parser::new(tokens);
        let statements = parser.parse().expect("parse failed");
        let mut interpreter = Interpreter::new();
        let mut resolver = Resolver::new(&mut interpreter);
        resolver.resolve_stmts(&statements);
        resolver.had_error
    }

    #[test]
    fn redeclaration_in_one_scope_is_rejected() {
        assert!(had_resolve_error("fun f() { var a = 1; var a = 2; }"));
        // globals may be redeclared freely
        assert!(!had_resolve_error("var a = 1; var a = 2;"));
        // shadowing in a nested scope is fine
        assert!(!had_resolve_error("fun f() { var a = 1; { var a = 2; } }"));
    }

    #[test]
    fn reading_a_local_in_its_own_initializer_is_rejected() {
        assert!(had_resolve_error("{ var a = a; }"));
        // a global initializer may reference an outer binding of the same name
        assert!(!had_resolve_error("var a = 1; fun f() { var b = a; }"));
    }

    #[test]
    fn top_level_return_is_rejected() {
        assert!(had_resolve_error("return 1;"));
        assert!(!had_resolve_error("fun f() { return 1; }"));
    }

    #[test]
    fn initializers_cannot_return_values() {
        assert!(had_resolve_error("class A { init() { return 1; } }"));
        // a bare return in an initializer is an early exit, not a value
        assert!(!had_resolve_error("class A { init() { return; } }"));
    }

    #[test]
    fn this_outside_a_class_is_rejected() {
        assert!(had_resolve_error("print this;"));
        assert!(had_resolve_error("fun f() { return this; }"));
        assert!(!had_resolve_error("class A { m() { return this; } }"));
    }

    #[test]
    fn super_needs_a_subclass() {
        assert!(had_resolve_error("fun f() { super.m(); }"));
        assert!(had_resolve_error("class A { m() { super.m(); } }"));
        assert!(!had_resolve_error(
            "class A { m() {} } class B < A { m() { super.m(); } }"
        ));
    }

    #[test]
    fn self_inheritance_is_rejected() {
        assert!(had_resolve_error("class A < A {}"));
    }

    #[test]
    fn well_formed_programs_resolve_cleanly() {
        assert!(!had_resolve_error(
            "fun outer() { var x = 1; fun inner() { return x; } return inner; }"
        ));
    }
}
