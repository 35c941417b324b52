/// Source-level builtins the transpiler gives special lowering or classification to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinFunction {
    Range,
    List,
    Dict,
    Super,
}

impl BuiltinFunction {
    pub fn name(self) -> &'static str {
        match self {
            Self::Range => "range",
            Self::List => "list",
            Self::Dict => "dict",
            Self::Super => "super",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "range" => Some(Self::Range),
            "list" => Some(Self::List),
            "dict" => Some(Self::Dict),
            "super" => Some(Self::Super),
            _ => None,
        }
    }
}

