use crate::acme_error;
use crate::error::{CompleteError, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, info};

/// Результат запуска внешнего инструмента: stdout и stderr в порядке поступления
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    pub status: String,
    pub output: Vec<u8>,
}

impl ToolOutput {
    pub fn success(output: impl Into<Vec<u8>>) -> Self {
        Self {
            success: true,
            status: "exit status: 0".to_string(),
            output: output.into(),
        }
    }

    pub fn failure(code: i32, output: impl Into<Vec<u8>>) -> Self {
        Self {
            success: false,
            status: format!("exit status: {}", code),
            output: output.into(),
        }
    }
}

/// Trait for running the external completion tool
#[async_trait::async_trait]
pub trait ToolRunner: Send + Sync {
    /// Найти исполняемый файл по имени
    fn resolve(&self, program: &str) -> Result<PathBuf>;

    /// Запустить синхронно (с точки зрения вызывающей сессии) и дождаться завершения
    async fn run(&self, program: &Path, args: &[String], env: &[(String, String)])
        -> Result<ToolOutput>;
}

/// Factory function to create a tool runner based on the dry_run flag
pub fn create_tool_runner(dry_run: bool) -> Arc<dyn ToolRunner> {
    if dry_run {
        Arc::new(DryRunRunner)
    } else {
        Arc::new(ProcessRunner)
    }
}

pub struct ProcessRunner;

#[async_trait::async_trait]
impl ToolRunner for ProcessRunner {
    fn resolve(&self, program: &str) -> Result<PathBuf> {
        which::which(program)
            .map_err(|e| acme_error!(tool_not_found, "{}: {}", program, e))
    }

    async fn run(
        &self,
        program: &Path,
        args: &[String],
        env: &[(String, String)],
    ) -> Result<ToolOutput> {
        debug!("Запуск {:?} {:?} с {:?}", program, args, env);

        // Окружение процесса наследуется, переменные из env его дополняют
        let mut child = Command::new(program)
            .args(args)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let (Some(mut stdout), Some(mut stderr)) = (child.stdout.take(), child.stderr.take())
        else {
            return Err(CompleteError::Io(std::io::Error::other(
                "не удалось получить каналы вывода процесса",
            )));
        };

        let mut output = Vec::new();
        let mut out_buf = [0u8; 4096];
        let mut err_buf = [0u8; 4096];
        let (mut out_open, mut err_open) = (true, true);

        while out_open || err_open {
            tokio::select! {
                n = stdout.read(&mut out_buf), if out_open => match n? {
                    0 => out_open = false,
                    n => output.extend_from_slice(&out_buf[..n]),
                },
                n = stderr.read(&mut err_buf), if err_open => match n? {
                    0 => err_open = false,
                    n => output.extend_from_slice(&err_buf[..n]),
                },
            }
        }

        let status = child.wait().await?;
        Ok(ToolOutput {
            success: status.success(),
            status: status.to_string(),
            output,
        })
    }
}

/// В режиме сухого запуска инструмент не запускается
pub struct DryRunRunner;

#[async_trait::async_trait]
impl ToolRunner for DryRunRunner {
    fn resolve(&self, program: &str) -> Result<PathBuf> {
        Ok(which::which(program).unwrap_or_else(|_| PathBuf::from(program)))
    }

    async fn run(
        &self,
        program: &Path,
        args: &[String],
        env: &[(String, String)],
    ) -> Result<ToolOutput> {
        info!("[DRY RUN] {:?} {} ({:?})", program, args.join(" "), env);
        Ok(ToolOutput::success(Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tool_is_tool_not_found() {
        let err = ProcessRunner
            .resolve("definitely-not-an-installed-completion-tool")
            .unwrap_err();
        assert!(matches!(err, CompleteError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn test_combined_output_and_env() {
        let Ok(sh) = ProcessRunner.resolve("sh") else {
            return;
        };
        let args = vec![
            "-c".to_string(),
            "echo out-$winid; echo err >&2; exit 3".to_string(),
        ];
        let env = vec![("winid".to_string(), "42".to_string())];

        let result = ProcessRunner.run(&sh, &args, &env).await.unwrap();
        assert!(!result.success);
        let text = String::from_utf8(result.output).unwrap();
        assert!(text.contains("out-42\n"));
        assert!(text.contains("err\n"));
        assert!(result.status.contains('3'));
    }

    #[tokio::test]
    async fn test_dry_run_reports_success() {
        let result = DryRunRunner
            .run(Path::new("L"), &["comp".to_string(), "-e".to_string()], &[])
            .await
            .unwrap();
        assert_eq!(result, ToolOutput::success(Vec::new()));
    }
}
