use crate::error::{CompleteError, Result};
use crate::events::WindowId;
use std::fmt;

/// Операция из глобального журнала окон acme
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogOp {
    New,
    Focus,
    Delete,
    Other(String),
}

impl From<&str> for LogOp {
    fn from(op: &str) -> Self {
        match op {
            "new" => LogOp::New,
            "focus" => LogOp::Focus,
            "del" => LogOp::Delete,
            other => LogOp::Other(other.to_string()),
        }
    }
}

/// Запись журнала: `<id> <op> <name>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub id: WindowId,
    pub op: LogOp,
    pub name: String,
}

impl LogEntry {
    pub fn new(id: u32, op: LogOp, name: impl Into<String>) -> Self {
        Self {
            id: WindowId(id),
            op,
            name: name.into(),
        }
    }

    pub fn is_new(&self) -> bool {
        self.op == LogOp::New
    }

    pub fn parse(line: &str) -> Result<Self> {
        let mut fields = line.splitn(3, ' ');
        let (Some(id), Some(op), Some(name)) = (fields.next(), fields.next(), fields.next())
        else {
            return CompleteError::malformed(format!("запись журнала {:?}", line));
        };

        let id = id
            .trim()
            .parse::<u32>()
            .map_err(|e| CompleteError::MalformedEvent(format!("id окна {:?}: {}", id, e)))?;

        Ok(Self::new(id, LogOp::from(op), name.trim()))
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {:?} \"{}\"", self.id, self.op, self.name)
    }
}
