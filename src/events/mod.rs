pub mod log;
pub mod window;

pub use log::{LogEntry, LogOp};
pub use window::{name_from_tag, Action, Origin, WindowEvent, WindowId, WindowInfo};

/// Управляющий символ, по которому запускается автодополнение (Ctrl-O)
pub const COMPLETION_TRIGGER: u8 = 0x0f;
