use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("empty request line")]
    EmptyLine,

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("wrong number of arguments for '{0}'")]
    WrongArity(String),

    #[error("invalid term '{0}'")]
    InvalidTerm(String),

    #[error("malformed response '{0}'")]
    MalformedResponse(String),
}
