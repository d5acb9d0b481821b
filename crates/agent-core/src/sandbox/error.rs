use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InterpreterError {
    #[error("SyntaxError on line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("Unsupported syntax: {0}")]
    Unsupported(String),

    #[error("NameError: {0}")]
    Name(String),

    #[error("TypeError: {0}")]
    Type(String),

    #[error("ValueError: {0}")]
    Value(String),

    #[error("IndexError: {0}")]
    Index(String),

    #[error("KeyError: {0}")]
    Key(String),

    #[error("AttributeError: {0}")]
    Attribute(String),

    #[error("ZeroDivisionError: division by zero")]
    ZeroDivision,

    #[error("Cannot assign to name '{0}': doing this would erase the existing tool")]
    ReservedName(String),

    #[error("Error in tool '{name}': {message}")]
    Tool { name: String, message: String },
}

impl InterpreterError {
    pub(crate) fn syntax(line: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            line,
            message: message.into(),
        }
    }
}
