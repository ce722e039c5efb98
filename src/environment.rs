use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::{error::Error, object::Object, token::Token};

// One link in the frame chain: a name→value map plus a parent pointer.
// Frames are shared through Rc so a closure keeps its defining frame alive
// and sees bindings added to it later.
pub struct Environment {
    values: HashMap<String, Object>,
    enclosing: Option<Rc<RefCell<Environment>>>,
}

impl Environment {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
            enclosing: None,
        }
    }

    pub fn from(enclosing: &Rc<RefCell<Environment>>) -> Self {
        Self {
            values: HashMap::new(),
            enclosing: Some(Rc::clone(enclosing)),
        }
    }

    pub fn define(&mut self, name: String, value: Object) {
        self.values.insert(name, value);
    }

    pub fn get(&self, name: &Token) -> Result<Object, Error> {
        let key = &*name.lexeme;
        if let Some(value) = self.values.get(key) {
            Ok(value.clone())
        } else if let Some(ref enclosing) = self.enclosing {
            // walking the chain iteratively would be faster but recursion reads better
            enclosing.borrow().get(name)
        } else {
            Err(Error::Runtime {
                token: name.clone(),
                message: format!("Undefined variable '{}'.", key),
            })
        }
    }

    pub fn assign(&mut self, name: &Token, value: Object) -> Result<(), Error> {
        let key = &*name.lexeme;
        if self.values.contains_key(key) {
            self.values.insert(name.lexeme.clone(), value);
            Ok(())
        } else if let Some(ref enclosing) = self.enclosing {
            enclosing.borrow_mut().assign(name, value)
        } else {
            Err(Error::Runtime {
                token: name.clone(),
                message: format!("Undefined variable '{}'.", key),
            })
        }
    }

    // Depth-indexed access walks exactly `distance` hops, no fallback. The
    // resolver has already proven the binding lives there; a miss is a bug in
    // this crate, not in the user's program.
    pub fn get_at(&self, distance: usize, name: &str) -> Object {
        if distance == 0 {
            self.values
                .get(name)
                .cloned()
                .expect("resolved variable missing from its frame")
        } else {
            self.enclosing
                .as_ref()
                .expect("resolved depth exceeds frame chain")
                .borrow()
                .get_at(distance - 1, name)
        }
    }

    pub fn assign_at(&mut self, distance: usize, name: &Token, value: Object) {
        if distance == 0 {
            self.values.insert(name.lexeme.clone(), value);
        } else {
            self.enclosing
                .as_ref()
                .expect("resolved depth exceeds frame chain")
                .borrow_mut()
                .assign_at(distance - 1, name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenType;

    fn ident(name: &str) -> Token {
        Token::new(TokenType::Identifier, name, 1)
    }

    fn number(value: &Object) -> f64 {
        match value {
            Object::Number(n) => *n,
            other => panic!("expected a number, got {:?}", other),
        }
    }

    #[test]
    fn get_walks_outward_until_found() {
        let global = Rc::new(RefCell::new(Environment::new()));
        global
            .borrow_mut()
            .define("a".to_string(), Object::Number(1.0));
        let inner = Rc::new(RefCell::new(Environment::from(&global)));

        let value = inner.borrow().get(&ident("a")).unwrap();
        assert_eq!(number(&value), 1.0);
        assert!(inner.borrow().get(&ident("missing")).is_err());
    }

    #[test]
    fn assign_updates_the_owning_frame() {
        let global = Rc::new(RefCell::new(Environment::new()));
        global
            .borrow_mut()
            .define("a".to_string(), Object::Number(1.0));
        let inner = Rc::new(RefCell::new(Environment::from(&global)));

        inner
            .borrow_mut()
            .assign(&ident("a"), Object::Number(2.0))
            .unwrap();
        assert_eq!(number(&global.borrow().get(&ident("a")).unwrap()), 2.0);
        assert!(inner
            .borrow_mut()
            .assign(&ident("missing"), Object::Null)
            .is_err());
    }

    #[test]
    fn depth_indexed_access_walks_exact_hops() {
        let global = Rc::new(RefCell::new(Environment::new()));
        global
            .borrow_mut()
            .define("a".to_string(), Object::Number(1.0));
        let middle = Rc::new(RefCell::new(Environment::from(&global)));
        middle
            .borrow_mut()
            .define("a".to_string(), Object::Number(2.0));
        let inner = Rc::new(RefCell::new(Environment::from(&middle)));

        assert_eq!(number(&inner.borrow().get_at(1, "a")), 2.0);
        assert_eq!(number(&inner.borrow().get_at(2, "a")), 1.0);

        inner
            .borrow_mut()
            .assign_at(2, &ident("a"), Object::Number(9.0));
        assert_eq!(number(&global.borrow().get_at(0, "a")), 9.0);
        // the shadowing frame is untouched
        assert_eq!(number(&middle.borrow().get_at(0, "a")), 2.0);
    }
}
