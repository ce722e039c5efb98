use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::Error;
use crate::function::Function;
use crate::interpreter::Interpreter;
use crate::object::Object;
use crate::token::Token;

// The instance stores the state, the class stores the behaviour.
#[derive(Debug)]
pub struct LoxClass {
    pub name: String,
    superclass: Option<Rc<RefCell<LoxClass>>>,
    methods: HashMap<String, Function>,
}

impl LoxClass {
    pub fn new(
        name: String,
        superclass: Option<Rc<RefCell<LoxClass>>>,
        methods: HashMap<String, Function>,
    ) -> Self {
        Self {
            name,
            superclass,
            methods,
        }
    }

    // Method lookup starts on the defining class and climbs the superclass
    // chain; the first hit wins, which is what gives overriding its meaning.
    pub fn find_method(&self, name: &str) -> Option<Function> {
        if let Some(method) = self.methods.get(name) {
            return Some(method.clone());
        }

        if let Some(ref superclass) = self.superclass {
            return superclass.borrow().find_method(name);
        }

        None
    }

    // Calling a class takes however many arguments its initializer takes.
    pub fn arity(&self) -> usize {
        self.find_method("init")
            .map(|initializer| initializer.arity())
            .unwrap_or(0)
    }

    // Class call: allocate, then run `init` bound to the new instance if the
    // chain defines one. The instance is the result either way.
    pub fn instantiate(
        class: &Rc<RefCell<LoxClass>>,
        interpreter: &mut Interpreter,
        arguments: &Vec<Object>,
    ) -> Result<Object, Error> {
        let instance = LoxInstance::new(class);
        let initializer = class.borrow().find_method("init");
        if let Some(initializer) = initializer {
            initializer
                .bind(instance.clone())
                .call(interpreter, arguments)?;
        }
        Ok(instance)
    }
}

#[derive(Debug)]
pub struct LoxInstance {
    pub class: Rc<RefCell<LoxClass>>,
    fields: HashMap<String, Object>,
}

impl LoxInstance {
    // Returns a new `LoxInstance` already wrapped in an `Object::Instance`.
    pub fn new(class: &Rc<RefCell<LoxClass>>) -> Object {
        let instance = LoxInstance {
            class: Rc::clone(class),
            fields: HashMap::new(),
        };

        Object::Instance(Rc::new(RefCell::new(instance)))
    }

    // Property read: fields shadow methods. A found method comes back bound
    // to this instance.
    // `instance` is this same object, needed to seed the bound `this` slot.
    pub fn get(&self, name: &Token, instance: &Object) -> Result<Object, Error> {
        if let Some(field) = self.fields.get(&name.lexeme) {
            Ok(field.clone())
        } else if let Some(method) = self.class.borrow().find_method(&name.lexeme) {
            Ok(Object::Callable(method.bind(instance.clone())))
        } else {
            Err(Error::Runtime {
                token: name.clone(),
                message: format!("Undefined property '{}'.", name.lexeme),
            })
        }
    }

    // Fields spring into being on first assignment, so no existence check.
    pub fn set(&mut self, name: &Token, value: Object) {
        self.fields.insert(name.lexeme.clone(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenType;

    fn ident(name: &str) -> Token {
        Token::new(TokenType::Identifier, name, 1)
    }

    fn empty_class(name: &str) -> Rc<RefCell<LoxClass>> {
        Rc::new(RefCell::new(LoxClass::new(
            name.to_string(),
            None,
            HashMap::new(),
        )))
    }

    #[test]
    fn fields_are_created_on_first_set() {
        let class = empty_class("Bag");
        let object = LoxInstance::new(&class);
        let instance = match &object {
            Object::Instance(instance) => instance,
            other => panic!("expected an instance, got {:?}", other),
        };

        instance
            .borrow_mut()
            .set(&ident("x"), Object::Number(4.0));
        let value = instance.borrow().get(&ident("x"), &object).unwrap();
        assert!(value.equals(&Object::Number(4.0)));
    }

    #[test]
    fn missing_property_is_a_runtime_error() {
        let class = empty_class("Bag");
        let object = LoxInstance::new(&class);
        let instance = match &object {
            Object::Instance(instance) => instance,
            other => panic!("expected an instance, got {:?}", other),
        };

        assert!(instance.borrow().get(&ident("missing"), &object).is_err());
    }

    #[test]
    fn arity_defaults_to_zero_without_init() {
        assert_eq!(empty_class("Bag").borrow().arity(), 0);
    }
}
