use crate::config::CompletionConfig;
use crate::editor::{EditorWindow, WindowFile};
use crate::error::{CompleteError, Result};
use std::sync::Arc;
use tracing::info;

use super::runner::ToolRunner;

pub struct CompletionInvoker {
    config: CompletionConfig,
    runner: Arc<dyn ToolRunner>,
}

impl CompletionInvoker {
    pub fn new(config: CompletionConfig, runner: Arc<dyn ToolRunner>) -> Self {
        Self { config, runner }
    }

    /// Удалить введённый символ в `[q0, q1)` и запустить автодополнение для окна.
    ///
    /// Инструмент видит окно «изнутри acme» через переменную окружения с id окна.
    /// Непустой вывод успешного запуска пишется в файл errors окна и возвращается.
    pub async fn invoke(&self, window: &mut dyn EditorWindow, q0: u32, q1: u32) -> Result<String> {
        window.set_addr(q0, q1).await?;
        window.write(WindowFile::Data, b"").await?;

        let program = self.runner.resolve(&self.config.program)?;
        let env = vec![(self.config.window_env.clone(), window.id().to_string())];

        info!(
            "Автодополнение в окне {}: {} {}",
            window.id(),
            self.config.program,
            self.config.args.join(" ")
        );
        let result = self.runner.run(&program, &self.config.args, &env).await?;
        let output = String::from_utf8_lossy(&result.output).into_owned();

        if !result.success {
            return Err(CompleteError::CompletionFailed {
                status: result.status,
                output,
            });
        }

        if !output.is_empty() {
            window.write_error(&output).await?;
        }

        Ok(output)
    }
}
