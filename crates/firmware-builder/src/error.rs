use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    General,
    /// A filename template could not be rendered.
    Template,
    /// The catalog document is missing or does not match its schema.
    Catalog,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    msg: String,
}

impl Error {
    pub fn msg<M: Into<String>>(msg: M) -> Self {
        Self {
            kind: ErrorKind::General,
            msg: msg.into(),
        }
    }

    pub fn template<M: Into<String>>(msg: M) -> Self {
        Self {
            kind: ErrorKind::Template,
            msg: msg.into(),
        }
    }

    pub fn catalog<M: Into<String>>(msg: M) -> Self {
        Self {
            kind: ErrorKind::Catalog,
            msg: msg.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::Template => write!(f, "template error: {}", self.msg),
            ErrorKind::General | ErrorKind::Catalog => write!(f, "{}", self.msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::msg(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::msg(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::msg(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
