pub mod completion;
pub mod supervisor;
pub mod window_filter;
pub mod window_session;

pub use completion::{create_tool_runner, CompletionInvoker};
pub use supervisor::Supervisor;
