use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
mod config;
mod editor;
mod error;
mod events;
mod services;
mod utils;

use config::{Config, LoggingConfig};
use editor::create_editor;
use events::WindowId;
use services::{create_tool_runner, CompletionInvoker, Supervisor};

#[derive(Parser, Debug)]
#[command(name = "acme-complete-bind")]
#[command(about = "Автодополнение по Ctrl-O в окнах acme через внешний инструмент")]
struct Args {
    /// Путь к файлу конфигурации
    #[arg(short, long, default_value = "acme-complete.toml")]
    config: String,

    /// Обслуживать только это окно (можно указать несколько раз)
    #[arg(short, long = "window", value_name = "ID")]
    windows: Vec<u32>,

    /// Режим сухого запуска (эмулируемый редактор, инструмент не запускается)
    #[arg(long)]
    dry_run: bool,

    /// Уровень логирования (переопределяет конфигурацию)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Загрузка конфигурации
    let mut config = Config::load(&args.config)?;
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
        config.validate()?;
    }

    // Инициализация системы логирования
    init_tracing(&config.logging)?;

    info!("Запуск acme-complete-bind v{}", env!("CARGO_PKG_VERSION"));
    info!("Конфигурация загружена из: {}", args.config);

    if args.dry_run {
        warn!("Режим сухого запуска - редактор эмулируется, инструмент не запускается");
    }

    let config = Arc::new(config);
    let editor = create_editor(config.clone(), args.dry_run)?;
    let runner = create_tool_runner(args.dry_run);
    let invoker = Arc::new(CompletionInvoker::new(config.completion.clone(), runner));
    let mut supervisor = Supervisor::new(editor, invoker);

    let windows: Vec<WindowId> = args.windows.iter().copied().map(WindowId).collect();
    let run = async {
        if windows.is_empty() {
            supervisor.run().await
        } else {
            info!("Обслуживаются только окна: {:?}", args.windows);
            supervisor.run_windows(&windows).await
        }
    };

    tokio::select! {
        result = run => {
            if let Err(e) = result {
                error!("Работа прервана: {}", e);
                return Err(e.into());
            }
        }
        signal = signal::ctrl_c() => match signal {
            Ok(()) => info!("Получен сигнал завершения (Ctrl+C)"),
            Err(err) => error!("Ошибка при ожидании сигнала завершения: {}", err),
        },
    }

    info!("acme-complete-bind завершил работу");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))?;

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "full" {
        registry.with(tracing_subscriber::fmt::layer()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().compact()).init();
    }

    Ok(())
}
