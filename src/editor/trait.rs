use crate::config::Config;
use crate::error::Result;
use crate::events::{LogEntry, WindowEvent, WindowId, WindowInfo};
use std::fmt;
use std::sync::Arc;

/// Файлы окна, через которые идёт управление
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowFile {
    Addr,
    Ctl,
    Data,
    Errors,
    Event,
    Tag,
}

impl WindowFile {
    pub fn name(&self) -> &'static str {
        match self {
            WindowFile::Addr => "addr",
            WindowFile::Ctl => "ctl",
            WindowFile::Data => "data",
            WindowFile::Errors => "errors",
            WindowFile::Event => "event",
            WindowFile::Tag => "tag",
        }
    }
}

impl fmt::Display for WindowFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Редактор целиком: список окон, открытие окна, журнал создания окон
#[async_trait::async_trait]
pub trait Editor: Send + Sync {
    async fn list_windows(&self) -> Result<Vec<WindowInfo>>;

    async fn open_window(&self, id: WindowId) -> Result<Box<dyn EditorWindow>>;

    /// Подписка на журнал. Открывается один раз за время жизни процесса.
    async fn open_log(&self) -> Result<Box<dyn CreationLog>>;
}

/// Открытое окно. Принадлежит ровно одной сессии.
#[async_trait::async_trait]
pub trait EditorWindow: Send {
    fn id(&self) -> WindowId;

    async fn read(&mut self, file: WindowFile, max: usize) -> Result<Vec<u8>>;

    async fn write(&mut self, file: WindowFile, data: &[u8]) -> Result<()>;

    /// Установить адрес `#q0,#q1` для последующих операций с data
    async fn set_addr(&mut self, q0: u32, q1: u32) -> Result<()>;

    /// Следующее событие окна; `None`, когда поток событий закрыт
    async fn next_event(&mut self) -> Result<Option<WindowEvent>>;

    /// Вернуть событие редактору для обработки по умолчанию
    async fn resubmit_event(&mut self, event: &WindowEvent) -> Result<()>;

    async fn write_error(&mut self, text: &str) -> Result<()>;

    async fn close(self: Box<Self>);
}

/// Глобальный журнал окон
#[async_trait::async_trait]
pub trait CreationLog: Send {
    /// `Ok(None)` означает, что журнал закрыт навсегда
    async fn next_entry(&mut self) -> Result<Option<LogEntry>>;
}

/// Factory function to create the editor backend based on the dry_run flag
pub fn create_editor(config: Arc<Config>, dry_run: bool) -> Result<Arc<dyn Editor>> {
    if dry_run {
        Ok(Arc::new(super::dry_run::MemoryEditor::with_demo_windows()))
    } else {
        Ok(Arc::new(super::acme::AcmeEditor::new(&config.editor)?))
    }
}
