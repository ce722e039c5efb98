use crate::class::LoxClass;
use crate::environment::Environment;
use crate::error::Error;
use crate::function::Function;
use crate::object::Object;
use crate::syntax::{expr, stmt};
use crate::syntax::{Expr, LiteralValue, Stmt};
use crate::token::{Token, TokenType};

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, Write};
use std::mem;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;

// Whole seconds since the epoch, per the usual definition. Arity 0.
fn clock_native(_arguments: &Vec<Object>) -> Object {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time predates the Unix epoch")
        .as_secs();
    Object::Number(seconds as f64)
}

pub struct Interpreter {
    globals: Rc<RefCell<Environment>>,
    // the frame currently in effect; swapped around block execution
    environment: Rc<RefCell<Environment>>,
    // the resolver's side table: expression id → hop count to the binding.
    // Frozen before interpret() runs; ids missing here are globals.
    locals: HashMap<usize, usize>,
    // `print` goes through here so tests can capture program output
    writer: Box<dyn Write>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_writer(Box::new(io::stdout()))
    }

    pub fn with_writer(writer: Box<dyn Write>) -> Self {
        let globals = Rc::new(RefCell::new(Environment::new()));
        globals.borrow_mut().define(
            "clock".to_string(),
            Object::Callable(Function::Native {
                arity: 0,
                body: Box::new(clock_native),
            }),
        );

        Self {
            environment: Rc::clone(&globals),
            globals,
            locals: HashMap::new(),
            writer,
        }
    }

    pub fn interpret(&mut self, statements: &Vec<Stmt>) -> Result<(), Error> {
        debug!("interpreting {} statements", statements.len());
        for statement in statements {
            self.execute(statement)?;
        }
        Ok(())
    }

    fn execute(&mut self, statement: &Stmt) -> Result<(), Error> {
        statement.accept(self)
    }

    fn evaluate(&mut self, expression: &Expr) -> Result<Object, Error> {
        expression.accept(self)
    }

    // Called by the resolver while it walks the tree.
    pub fn resolve(&mut self, id: usize, depth: usize) {
        self.locals.insert(id, depth);
    }

    // Runs statements with `environment` installed, restoring the previous
    // frame on every exit path: fall-through, runtime error and the return
    // signal all pass back through here.
    pub fn execute_block(
        &mut self,
        statements: &Vec<Stmt>,
        environment: Rc<RefCell<Environment>>,
    ) -> Result<(), Error> {
        let previous = mem::replace(&mut self.environment, environment);
        let result = statements
            .iter()
            .try_for_each(|statement| self.execute(statement));
        self.environment = previous;
        result
    }

    // Resolved references read at their published depth with no fallback;
    // everything else must be a global.
    fn look_up_variable(&self, name: &Token, id: usize) -> Result<Object, Error> {
        if let Some(distance) = self.locals.get(&id) {
            Ok(self.environment.borrow().get_at(*distance, &name.lexeme))
        } else {
            self.globals.borrow().get(name)
        }
    }

    fn is_truthy(&self, object: &Object) -> bool {
        match object {
            Object::Null => false,
            Object::Boolean(b) => *b,
            _ => true,
        }
    }

    fn is_equal(&self, left: &Object, right: &Object) -> bool {
        left.equals(right)
    }

    fn number_operand_error<R>(&self, operator: &Token) -> Result<R, Error> {
        Err(Error::Runtime {
            token: operator.clone(),
            message: "Operand must be a number.".to_string(),
        })
    }

    fn number_operands_error<R>(&self, operator: &Token) -> Result<R, Error> {
        Err(Error::Runtime {
            token: operator.clone(),
            message: "Operands must be numbers.".to_string(),
        })
    }
}

impl stmt::Visitor<()> for Interpreter {
    fn visit_block_stmt(&mut self, statements: &Vec<Stmt>) -> Result<(), Error> {
        let environment = Rc::new(RefCell::new(Environment::from(&self.environment)));
        self.execute_block(statements, environment)
    }

    // Class definition is a two-step: the name is defined as nil first so
    // method bodies can mention the class, then the finished class value is
    // assigned over the placeholder. Under inheritance an extra frame
    // binding `super` is wedged under the method closures, mirroring the
    // scope the resolver wrapped around the methods.
    fn visit_class_stmt(
        &mut self,
        name: &Token,
        superclass: &Option<Expr>,
        methods: &Vec<Stmt>,
    ) -> Result<(), Error> {
        let superclass = if let Some(superclass_expr) = superclass {
            match self.evaluate(superclass_expr)? {
                Object::Class(class) => Some(class),
                _ => {
                    let token = match superclass_expr {
                        Expr::Variable { name, .. } => name.clone(),
                        _ => name.clone(),
                    };
                    return Err(Error::Runtime {
                        token,
                        message: "Superclass must be a class.".to_string(),
                    });
                }
            }
        } else {
            None
        };

        self.environment
            .borrow_mut()
            .define(name.lexeme.clone(), Object::Null);

        let previous = Rc::clone(&self.environment);
        if let Some(ref superclass) = superclass {
            let environment = Rc::new(RefCell::new(Environment::from(&self.environment)));
            environment
                .borrow_mut()
                .define("super".to_string(), Object::Class(Rc::clone(superclass)));
            self.environment = environment;
        }

        let mut method_map: HashMap<String, Function> = HashMap::new();
        for method in methods {
            if let Stmt::Function { name, params, body } = method {
                let function = Function::User {
                    name: name.clone(),
                    params: Rc::clone(params),
                    body: Rc::clone(body),
                    closure: Rc::clone(&self.environment),
                    is_initializer: name.lexeme == "init",
                };
                method_map.insert(name.lexeme.clone(), function);
            } else {
                unreachable!("class bodies hold only methods")
            }
        }

        let class = Object::Class(Rc::new(RefCell::new(LoxClass::new(
            name.lexeme.clone(),
            superclass,
            method_map,
        ))));

        self.environment = previous;
        self.environment.borrow_mut().assign(name, class)?;
        Ok(())
    }

    fn visit_expression_stmt(&mut self, expression: &Expr) -> Result<(), Error> {
        self.evaluate(expression)?;
        Ok(())
    }

    fn visit_function_stmt(
        &mut self,
        name: &Token,
        params: &Rc<Vec<Token>>,
        body: &Rc<Vec<Stmt>>,
    ) -> Result<(), Error> {
        // the closure frame is whatever is current at the declaration site
        let function = Function::User {
            name: name.clone(),
            params: Rc::clone(params),
            body: Rc::clone(body),
            closure: Rc::clone(&self.environment),
            is_initializer: false,
        };
        self.environment
            .borrow_mut()
            .define(name.lexeme.clone(), Object::Callable(function));
        Ok(())
    }

    fn visit_if_stmt(
        &mut self,
        condition: &Expr,
        then_branch: &Stmt,
        else_branch: &Option<Stmt>,
    ) -> Result<(), Error> {
        let condition = self.evaluate(condition)?;
        if self.is_truthy(&condition) {
            self.execute(then_branch)
        } else if let Some(else_stmt) = else_branch {
            self.execute(else_stmt)
        } else {
            Ok(())
        }
    }

    fn visit_print_stmt(&mut self, expression: &Expr) -> Result<(), Error> {
        let value = self.evaluate(expression)?;
        writeln!(self.writer, "{}", value)?;
        Ok(())
    }

    fn visit_return_stmt(&mut self, _keyword: &Token, value: &Option<Expr>) -> Result<(), Error> {
        let value = match value {
            Some(expression) => self.evaluate(expression)?,
            None => Object::Null,
        };

        // unwind to the nearest Function::call
        Err(Error::Return { value })
    }

    fn visit_var_stmt(&mut self, name: &Token, initializer: &Option<Expr>) -> Result<(), Error> {
        let value = match initializer {
            Some(expression) => self.evaluate(expression)?,
            None => Object::Null,
        };

        self.environment
            .borrow_mut()
            .define(name.lexeme.clone(), value);
        Ok(())
    }

    fn visit_while_stmt(&mut self, condition: &Expr, body: &Stmt) -> Result<(), Error> {
        loop {
            let condition = self.evaluate(condition)?;
            if !self.is_truthy(&condition) {
                return Ok(());
            }
            self.execute(body)?;
        }
    }
}

impl expr::Visitor<Object> for Interpreter {
    fn visit_assign_expr(&mut self, id: usize, name: &Token, value: &Expr) -> Result<Object, Error> {
        let value = self.evaluate(value)?;

        if let Some(distance) = self.locals.get(&id) {
            self.environment
                .borrow_mut()
                .assign_at(*distance, name, value.clone());
        } else {
            self.globals.borrow_mut().assign(name, value.clone())?;
        }

        Ok(value)
    }

    fn visit_binary_expr(
        &mut self,
        left: &Expr,
        operator: &Token,
        right: &Expr,
    ) -> Result<Object, Error> {
        let l = self.evaluate(left)?;
        let r = self.evaluate(right)?;

        match operator.token_type {
            TokenType::Minus => match (l, r) {
                (Object::Number(left_num), Object::Number(right_num)) => {
                    Ok(Object::Number(left_num - right_num))
                }
                _ => self.number_operands_error(operator),
            },
            TokenType::Slash => match (l, r) {
                (Object::Number(left_num), Object::Number(right_num)) => {
                    Ok(Object::Number(left_num / right_num))
                }
                _ => self.number_operands_error(operator),
            },
            TokenType::Star => match (l, r) {
                (Object::Number(left_num), Object::Number(right_num)) => {
                    Ok(Object::Number(left_num * right_num))
                }
                _ => self.number_operands_error(operator),
            },
            TokenType::Plus => match (l, r) {
                (Object::Number(left_num), Object::Number(right_num)) => {
                    Ok(Object::Number(left_num + right_num))
                }
                (Object::String(left_str), Object::String(right_str)) => {
                    Ok(Object::String(left_str + &right_str))
                }
                _ => Err(Error::Runtime {
                    token: operator.clone(),
                    message: "Operands must be two numbers or two strings.".to_string(),
                }),
            },
            TokenType::GreaterEqual => match (l, r) {
                (Object::Number(left_num), Object::Number(right_num)) => {
                    Ok(Object::Boolean(left_num >= right_num))
                }
                _ => self.number_operands_error(operator),
            },
            TokenType::Greater => match (l, r) {
                (Object::Number(left_num), Object::Number(right_num)) => {
                    Ok(Object::Boolean(left_num > right_num))
                }
                _ => self.number_operands_error(operator),
            },
            TokenType::LessEqual => match (l, r) {
                (Object::Number(left_num), Object::Number(right_num)) => {
                    Ok(Object::Boolean(left_num <= right_num))
                }
                _ => self.number_operands_error(operator),
            },
            TokenType::Less => match (l, r) {
                (Object::Number(left_num), Object::Number(right_num)) => {
                    Ok(Object::Boolean(left_num < right_num))
                }
                _ => self.number_operands_error(operator),
            },
            TokenType::BangEqual => Ok(Object::Boolean(!self.is_equal(&l, &r))),
            TokenType::EqualEqual => Ok(Object::Boolean(self.is_equal(&l, &r))),
            _ => unreachable!("binary expression with non-binary operator"),
        }
    }

    fn visit_call_expr(
        &mut self,
        callee: &Expr,
        paren: &Token,
        arguments: &Vec<Expr>,
    ) -> Result<Object, Error> {
        let callee = self.evaluate(callee)?;

        let mut evaluated: Vec<Object> = Vec::with_capacity(arguments.len());
        for argument in arguments {
            evaluated.push(self.evaluate(argument)?);
        }

        match callee {
            Object::Callable(function) => {
                if evaluated.len() != function.arity() {
                    return Err(Error::Runtime {
                        token: paren.clone(),
                        message: format!(
                            "Expected {} arguments but got {}.",
                            function.arity(),
                            evaluated.len()
                        ),
                    });
                }
                function.call(self, &evaluated)
            }
            Object::Class(ref class) => {
                let arity = class.borrow().arity();
                if evaluated.len() != arity {
                    return Err(Error::Runtime {
                        token: paren.clone(),
                        message: format!(
                            "Expected {} arguments but got {}.",
                            arity,
                            evaluated.len()
                        ),
                    });
                }
                LoxClass::instantiate(class, self, &evaluated)
            }
            _ => Err(Error::Runtime {
                token: paren.clone(),
                message: "Can only call functions and classes.".to_string(),
            }),
        }
    }

    fn visit_get_expr(&mut self, object: &Expr, name: &Token) -> Result<Object, Error> {
        let object = self.evaluate(object)?;
        if let Object::Instance(ref instance) = object {
            instance.borrow().get(name, &object)
        } else {
            Err(Error::Runtime {
                token: name.clone(),
                message: "Only instances have properties.".to_string(),
            })
        }
    }

    fn visit_grouping_expr(&mut self, expression: &Expr) -> Result<Object, Error> {
        self.evaluate(expression)
    }

    fn visit_literal_expr(&mut self, value: &LiteralValue) -> Result<Object, Error> {
        Ok(match value {
            LiteralValue::Boolean(b) => Object::Boolean(*b),
            LiteralValue::Null => Object::Null,
            LiteralValue::Number(n) => Object::Number(*n),
            LiteralValue::String(s) => Object::String(s.clone()),
        })
    }

    // Short-circuit: the result is the deciding operand itself, never a
    // coerced boolean.
    fn visit_logical_expr(
        &mut self,
        left: &Expr,
        operator: &Token,
        right: &Expr,
    ) -> Result<Object, Error> {
        let left = self.evaluate(left)?;

        if operator.token_type == TokenType::Or {
            if self.is_truthy(&left) {
                return Ok(left);
            }
        } else if !self.is_truthy(&left) {
            return Ok(left);
        }

        self.evaluate(right)
    }

    fn visit_set_expr(&mut self, object: &Expr, name: &Token, value: &Expr) -> Result<Object, Error> {
        let object = self.evaluate(object)?;

        if let Object::Instance(instance) = object {
            let value = self.evaluate(value)?;
            instance.borrow_mut().set(name, value.clone());
            Ok(value)
        } else {
            Err(Error::Runtime {
                token: name.clone(),
                message: "Only instances have fields.".to_string(),
            })
        }
    }

    // `super` reads the superclass the resolver pinned two frames out and
    // `this` one frame closer in; lookup starts on the superclass chain of
    // the class the method was defined in, not of the instance.
    fn visit_super_expr(
        &mut self,
        id: usize,
        _keyword: &Token,
        method: &Token,
    ) -> Result<Object, Error> {
        let distance = *self
            .locals
            .get(&id)
            .expect("unresolved 'super' expression");

        let superclass = match self.environment.borrow().get_at(distance, "super") {
            Object::Class(class) => class,
            other => unreachable!("'super' bound to a non-class: {:?}", other),
        };
        let object = self.environment.borrow().get_at(distance - 1, "this");

        let result = match superclass.borrow().find_method(&method.lexeme) {
            Some(function) => Ok(Object::Callable(function.bind(object))),
            None => Err(Error::Runtime {
                token: method.clone(),
                message: format!("Undefined property '{}'.", method.lexeme),
            }),
        };
        result
    }

    fn visit_this_expr(&mut self, id: usize, keyword: &Token) -> Result<Object, Error> {
        self.look_up_variable(keyword, id)
    }

    fn visit_unary_expr(&mut self, operator: &Token, right: &Expr) -> Result<Object, Error> {
        let right = self.evaluate(right)?;

        match operator.token_type {
            TokenType::Minus => match right {
                Object::Number(n) => Ok(Object::Number(-n)),
                _ => self.number_operand_error(operator),
            },
            TokenType::Bang => Ok(Object::Boolean(!self.is_truthy(&right))),
            _ => unreachable!("unary expression with non-unary operator"),
        }
    }

    fn visit_variable_expr(&mut self, id: usize, name: &Token) -> Result<Object, Error> {
        self.look_up_variable(name, id)
    }
}
