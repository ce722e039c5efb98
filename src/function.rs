use crate::environment::Environment;
use crate::error::Error;
use crate::interpreter::Interpreter;
use crate::object::Object;
use crate::syntax::Stmt;
use crate::token::Token;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

#[derive(Clone)]
pub enum Function {
    // Implemented in the host language and exposed to user code through the
    // global frame (currently just `clock`).
    Native {
        arity: usize,
        body: Box<fn(&Vec<Object>) -> Object>,
    },

    // A user function carries its declaration and the frame that was current
    // when it was declared. Calls hang a fresh frame off that closure frame,
    // never off the caller's.
    User {
        name: Token,
        params: Rc<Vec<Token>>,
        body: Rc<Vec<Stmt>>,
        closure: Rc<RefCell<Environment>>,
        is_initializer: bool,
    },
}

impl Function {
    pub fn call(
        &self,
        interpreter: &mut Interpreter,
        arguments: &Vec<Object>,
    ) -> Result<Object, Error> {
        match self {
            Function::Native { body, .. } => Ok(body(arguments)),
            Function::User {
                params,
                body,
                closure,
                is_initializer,
                ..
            } => {
                // Each call gets its own frame; recursion would break if
                // calls to the same function shared one.
                let environment = Rc::new(RefCell::new(Environment::from(closure)));
                for (param, argument) in params.iter().zip(arguments.iter()) {
                    environment
                        .borrow_mut()
                        .define(param.lexeme.clone(), argument.clone());
                }
                match interpreter.execute_block(body, environment) {
                    // the unwinding signal from a `return` statement stops here
                    Err(Error::Return { value }) => {
                        if *is_initializer {
                            Ok(closure.borrow().get_at(0, "this"))
                        } else {
                            Ok(value)
                        }
                    }
                    Err(other) => Err(other),
                    // the body fell through without returning
                    Ok(..) => {
                        if *is_initializer {
                            Ok(closure.borrow().get_at(0, "this"))
                        } else {
                            Ok(Object::Null)
                        }
                    }
                }
            }
        }
    }

    // A bound method is the same declaration closed over a one-slot frame
    // holding `this`, wedged between the body and the original closure.
    pub fn bind(&self, instance: Object) -> Self {
        match self {
            Function::Native { .. } => unreachable!("native functions are never bound"),
            Function::User {
                name,
                params,
                body,
                closure,
                is_initializer,
            } => {
                let environment = Rc::new(RefCell::new(Environment::from(closure)));
                environment
                    .borrow_mut()
                    .define("this".to_string(), instance);
                Function::User {
                    name: name.clone(),
                    params: Rc::clone(params),
                    body: Rc::clone(body),
                    closure: environment,
                    is_initializer: *is_initializer,
                }
            }
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Function::Native { arity, .. } => *arity,
            Function::User { params, .. } => params.len(),
        }
    }

    // Functions compare by identity: the same declaration read twice through
    // one binding is equal to itself, while every bind() produces a distinct
    // value because it wraps a fresh closure frame.
    pub fn equals(&self, other: &Function) -> bool {
        match (self, other) {
            (
                Function::Native {
                    arity: left_arity,
                    body: left_body,
                },
                Function::Native {
                    arity: right_arity,
                    body: right_body,
                },
            ) => left_arity == right_arity && **left_body == **right_body,
            (
                Function::User {
                    body: left_body,
                    closure: left_closure,
                    ..
                },
                Function::User {
                    body: right_body,
                    closure: right_closure,
                    ..
                },
            ) => Rc::ptr_eq(left_body, right_body) && Rc::ptr_eq(left_closure, right_closure),
            _ => false,
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Native { .. } => write!(f, "<native fn>"),
            Function::User { name, .. } => write!(f, "<fn {}>", name.lexeme),
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Native { .. } => write!(f, "<native fn>"),
            Function::User { name, .. } => write!(f, "<fn {}>", name.lexeme),
        }
    }
}
