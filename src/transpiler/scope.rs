use rustc_hash::{FxHashMap, FxHashSet};

use super::cpp_runtime::callable_type;

/// How a name was declared in the emitted C++.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Declared {
    Value,
    Callable { arity: usize },
}

impl Declared {
    pub fn type_name(self) -> String {
        match self {
            Self::Value => "Value".to_string(),
            Self::Callable { arity } => callable_type(arity),
        }
    }
}

/// Names declared in one translation unit. A name is declared once, at its first binding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    names: FxHashMap<String, Declared>,
}

impl Environment {
    pub fn with_params<'p>(params: impl IntoIterator<Item = &'p str>) -> Self {
        let mut env = Self::default();
        for param in params {
            env.declare(param, Declared::Value);
        }
        env
    }

    /// Records `name`; returns true when this is its first declaration.
    pub fn declare(&mut self, name: &str, kind: Declared) -> bool {
        if self.names.contains_key(name) {
            return false;
        }
        self.names.insert(name.to_string(), kind);
        true
    }

    pub fn get(&self, name: &str) -> Option<Declared> {
        self.names.get(name).copied()
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    fn restore(&mut self, name: &str, previous: Option<Declared>) {
        match previous {
            Some(kind) => {
                self.names.insert(name.to_string(), kind);
            }
            None => {
                self.names.remove(name);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarClass {
    List,
    Dict,
    Instance(String),
}

/// Assignment-site classification of variables; absence means unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VarClasses {
    tags: FxHashMap<String, VarClass>,
}

impl VarClasses {
    pub fn record(&mut self, name: &str, class: Option<VarClass>) {
        match class {
            Some(class) => {
                self.tags.insert(name.to_string(), class);
            }
            None => {
                self.tags.remove(name);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&VarClass> {
        self.tags.get(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassContext {
    pub class: String,
    pub receiver: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Module,
    Function,
    Method,
    Closure,
    Lambda,
}

/// Everything saved and restored around a nested translation unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub kind: ScopeKind,
    pub env: Environment,
    pub var_classes: VarClasses,
    pub class_context: Option<ClassContext>,
    pub hoisted: Vec<String>,
    /// Names held in a `std::shared_ptr` cell because a nested closure or lambda uses them.
    pub cells: FxHashSet<String>,
}

impl Scope {
    pub fn module() -> Self {
        Self::new(ScopeKind::Module, Environment::default())
    }

    pub fn function(kind: ScopeKind, params: &[String]) -> Self {
        Self::new(
            kind,
            Environment::with_params(params.iter().map(String::as_str)),
        )
    }

    /// Method scope with the receiver seeded as an instance of the owning class.
    pub fn method(class: &str, params: &[String]) -> Self {
        let mut scope = Self::function(ScopeKind::Method, params);
        if let Some(receiver) = params.first() {
            scope
                .var_classes
                .record(receiver, Some(VarClass::Instance(class.to_string())));
            scope.class_context = Some(ClassContext {
                class: class.to_string(),
                receiver: receiver.clone(),
            });
        }
        scope
    }

    fn new(kind: ScopeKind, env: Environment) -> Self {
        Self {
            kind,
            env,
            var_classes: VarClasses::default(),
            class_context: None,
            hoisted: Vec::new(),
            cells: FxHashSet::default(),
        }
    }

    pub fn in_function(&self) -> bool {
        !matches!(self.kind, ScopeKind::Module)
    }

    /// Hides `names` so a nested loop can declare them afresh; undo with [`Scope::unshadow`].
    pub fn shadow(&mut self, names: &[String]) -> Shadowed {
        let saved = names
            .iter()
            .map(|name| {
                let declared = self.env.get(name);
                let class = self.var_classes.get(name).cloned();
                let cell = self.cells.remove(name);
                self.env.restore(name, None);
                self.var_classes.record(name, None);
                (name.clone(), declared, class, cell)
            })
            .collect();
        Shadowed { saved }
    }

    pub fn unshadow(&mut self, shadowed: Shadowed) {
        for (name, declared, class, cell) in shadowed.saved.into_iter().rev() {
            self.env.restore(&name, declared);
            self.var_classes.record(&name, class);
            if cell {
                self.cells.insert(name);
            }
        }
    }
}

#[must_use]
pub struct Shadowed {
    saved: Vec<(String, Option<Declared>, Option<VarClass>, bool)>,
}

/// Monotonic temporary names; never reset during a compilation.
#[derive(Debug)]
pub struct TempNames {
    prefix: String,
    next: usize,
    /// Source identifiers that happen to look like temporaries.
    taken: FxHashSet<String>,
}

impl TempNames {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 0,
            taken: FxHashSet::default(),
        }
    }

    /// Keeps `fresh` clear of identifiers the program already spells.
    pub fn reserve(&mut self, names: impl IntoIterator<Item = String>) {
        let prefix = &self.prefix;
        self.taken
            .extend(names.into_iter().filter(|name| name.starts_with(prefix.as_str())));
    }

    pub fn fresh(&mut self) -> String {
        loop {
            let name = format!("{}{}", self.prefix, self.next);
            self.next += 1;
            if !self.taken.contains(&name) {
                return name;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declares_each_name_once() {
        let mut env = Environment::default();
        assert!(env.declare("x", Declared::Value));
        assert!(!env.declare("x", Declared::Callable { arity: 1 }));
        assert_eq!(env.get("x"), Some(Declared::Value));
    }

    #[test]
    fn method_scope_seeds_receiver() {
        let scope = Scope::method("Person", &["self".to_string(), "name".to_string()]);
        assert_eq!(
            scope.var_classes.get("self"),
            Some(&VarClass::Instance("Person".to_string()))
        );
        assert!(scope.env.is_declared("name"));
        assert_eq!(
            scope.class_context.map(|context| context.receiver),
            Some("self".to_string())
        );
    }

    #[test]
    fn temporaries_skip_reserved_source_names() {
        let mut temps = TempNames::new("_tmp");
        temps.reserve(["_tmp0".to_string(), "_tmp2".to_string(), "total".to_string()]);
        assert_eq!(temps.fresh(), "_tmp1");
        assert_eq!(temps.fresh(), "_tmp3");
    }

    #[test]
    fn shadowing_hides_cells_until_restored() {
        let mut scope = Scope::module();
        scope.env.declare("n", Declared::Value);
        scope.cells.insert("n".to_string());
        let before = scope.clone();

        let shadowed = scope.shadow(&["n".to_string()]);
        assert!(!scope.cells.contains("n"));
        scope.unshadow(shadowed);
        assert_eq!(scope, before);
    }

    #[test]
    fn shadowing_restores_previous_bindings() {
        let mut scope = Scope::module();
        scope.env.declare("x", Declared::Value);
        scope.var_classes.record("x", Some(VarClass::Dict));
        let before = scope.clone();

        let shadowed = scope.shadow(&["x".to_string(), "y".to_string()]);
        assert!(!scope.env.is_declared("x"));
        assert_eq!(scope.var_classes.get("x"), None);
        scope.env.declare("y", Declared::Value);
        scope.unshadow(shadowed);

        assert_eq!(scope, before);
    }

    #[test]
    fn temp_names_are_monotonic() {
        let mut temps = TempNames::new("_tmp");
        assert_eq!(temps.fresh(), "_tmp0");
        assert_eq!(temps.fresh(), "_tmp1");
    }
}
