use std::collections::HashMap;

use outline::context::RESERVED_NAMES;

use crate::error::RuntimeError;
use crate::runtime_value::RuntimeValue;

/// A single scope level: one node execution or one `if` branch.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    variables: HashMap<String, RuntimeValue>,
}

impl Scope {
    pub fn get_variable(&self, name: &str) -> Option<&RuntimeValue> {
        self.variables.get(name)
    }

    pub fn set_variable(&mut self, name: &str, value: RuntimeValue) {
        self.variables.insert(name.to_string(), value);
    }
}

/// Variables visible to template code during one render.
///
/// Reserved context names live outside the scope stack and cannot be
/// assigned. The bottom scope spans the whole render, so a plain
/// assignment in a parent node is visible to the nodes rendered after it.
#[derive(Debug)]
pub struct Environment {
    globals: HashMap<String, RuntimeValue>,
    scopes: Vec<Scope>,
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            globals: HashMap::new(),
            scopes: vec![Scope::default()],
        }
    }

    /// Bind a reserved, read-only name.
    pub fn set_global(&mut self, name: &str, value: RuntimeValue) {
        self.globals.insert(name.to_string(), value);
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    /// Pop the innermost scope. The render-wide scope is never popped.
    pub fn pop_scope(&mut self) -> Option<Scope> {
        if self.scopes.len() > 1 {
            self.scopes.pop()
        } else {
            None
        }
    }

    /// Look up a variable, searching from innermost scope outward, then the
    /// reserved names.
    pub fn get_variable(&self, name: &str) -> Option<&RuntimeValue> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get_variable(name))
            .or_else(|| self.globals.get(name))
    }

    /// `name = value`: update the nearest existing binding, or create one in
    /// the render-wide scope.
    pub fn assign(&mut self, name: &str, value: RuntimeValue) -> Result<(), RuntimeError> {
        check_writable(name)?;
        let scope = match self
            .scopes
            .iter()
            .rposition(|scope| scope.get_variable(name).is_some())
        {
            Some(index) => &mut self.scopes[index],
            None => &mut self.scopes[0],
        };
        scope.set_variable(name, value);
        Ok(())
    }

    /// `let name = value`: bind in the innermost scope.
    pub fn declare(&mut self, name: &str, value: RuntimeValue) -> Result<(), RuntimeError> {
        check_writable(name)?;
        if let Some(scope) = self.scopes.last_mut() {
            scope.set_variable(name, value);
        }
        Ok(())
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new()
    }
}

fn check_writable(name: &str) -> Result<(), RuntimeError> {
    if RESERVED_NAMES.contains(&name) {
        Err(RuntimeError::ReadOnly(name.to_string()))
    } else {
        Ok(())
    }
}
