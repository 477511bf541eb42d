mod invoker;
mod runner;

pub use self::invoker::CompletionInvoker;
pub use self::runner::{create_tool_runner, ToolOutput, ToolRunner};

#[cfg(test)]
pub(crate) use self::invoker::tests::FakeRunner;
