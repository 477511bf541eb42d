use crate::error::{CompleteError, Result};
use crate::events::{LogEntry, LogOp, WindowEvent, WindowId, WindowInfo, COMPLETION_TRIGGER};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::{interval, Duration};
use tracing::info;

use super::r#trait::{CreationLog, Editor, EditorWindow, WindowFile};

/// Операция, выполненная над эмулируемым окном
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Попытка открыть окно, в том числе неудачная
    Open,
    Read(WindowFile),
    Write(WindowFile, Vec<u8>),
    SetAddr(u32, u32),
    Delivered(WindowEvent),
    Resubmit(WindowEvent),
    WriteError(String),
    Close,
}

pub type Journal = Arc<Mutex<Vec<(WindowId, Operation)>>>;

/// Запись журнала окон; `Err` эмулирует ошибку чтения
pub type LogItem = std::result::Result<LogEntry, String>;

struct WindowSlot {
    name: String,
    tag_readable: bool,
    open_fails: bool,
    resubmit_fails: bool,
    stream_breaks: bool,
    events: Option<UnboundedReceiver<WindowEvent>>,
}

/// Эмулируемый редактор в памяти: окна, потоки событий и журнал операций
pub struct MemoryEditor {
    windows: Mutex<HashMap<WindowId, WindowSlot>>,
    journal: Journal,
    log_rx: Mutex<Option<UnboundedReceiver<LogItem>>>,
    log_tx: Mutex<Option<UnboundedSender<LogItem>>>,
    list_fails: Mutex<bool>,
}

impl Default for MemoryEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEditor {
    pub fn new() -> Self {
        let (log_tx, log_rx) = unbounded_channel();
        Self {
            windows: Mutex::new(HashMap::new()),
            journal: Arc::new(Mutex::new(Vec::new())),
            log_rx: Mutex::new(Some(log_rx)),
            log_tx: Mutex::new(Some(log_tx)),
            list_fails: Mutex::new(false),
        }
    }

    /// Редактор для режима сухого запуска: несколько окон и периодический ввод Ctrl-O
    pub fn with_demo_windows() -> Self {
        let editor = Self::new();
        let source = editor.add_window(1, "/tmp/dry_run/main.go");
        let _errors = editor.add_window(2, "/tmp/dry_run/+Errors");
        let _dir = editor.add_window(3, "/tmp/dry_run/");
        let log = editor.log_sender();
        let created = editor.add_window(4, "/tmp/dry_run/util.go");
        tokio::spawn(Self::feed_demo_events(source, created, log));
        editor
    }

    async fn feed_demo_events(
        source: UnboundedSender<WindowEvent>,
        created: UnboundedSender<WindowEvent>,
        log: Option<UnboundedSender<LogItem>>,
    ) {
        info!("Dry-run режим - редактор работает в режиме эмуляции");

        let mut ticker = interval(Duration::from_secs(5));
        let mut offset = 0u32;
        let mut tick = 0u64;
        loop {
            ticker.tick().await;
            tick += 1;

            if tick == 2 {
                if let Some(log) = &log {
                    let _ = log.send(Ok(LogEntry::new(4, LogOp::New, "/tmp/dry_run/util.go")));
                }
            }

            let trigger =
                WindowEvent::new('K', 'I', offset, offset + 1, vec![COMPLETION_TRIGGER]);
            info!("Dry-run: эмулируем нажатие Ctrl-O в окне 1 на позиции {}", offset);
            if source.send(trigger).is_err() {
                return;
            }
            if tick % 3 == 0 {
                let _ = created.send(WindowEvent::new('M', 'x', 0, 3, "Put"));
            }
            offset += 1;
        }
    }

    /// Добавить окно; возвращает отправитель его событий (drop закрывает поток)
    pub fn add_window(&self, id: u32, name: impl Into<String>) -> UnboundedSender<WindowEvent> {
        let (tx, rx) = unbounded_channel();
        self.windows.lock().insert(
            WindowId(id),
            WindowSlot {
                name: name.into(),
                tag_readable: true,
                open_fails: false,
                resubmit_fails: false,
                stream_breaks: false,
                events: Some(rx),
            },
        );
        tx
    }

    pub fn set_tag_unreadable(&self, id: u32) {
        self.update(id, |slot| slot.tag_readable = false);
    }

    pub fn set_open_fails(&self, id: u32) {
        self.update(id, |slot| slot.open_fails = true);
    }

    pub fn set_resubmit_fails(&self, id: u32) {
        self.update(id, |slot| slot.resubmit_fails = true);
    }

    /// Закрытие потока событий окна будет выглядеть как ошибка чтения
    pub fn set_stream_breaks(&self, id: u32) {
        self.update(id, |slot| slot.stream_breaks = true);
    }

    pub fn set_list_fails(&self) {
        *self.list_fails.lock() = true;
    }

    fn update(&self, id: u32, f: impl FnOnce(&mut WindowSlot)) {
        if let Some(slot) = self.windows.lock().get_mut(&WindowId(id)) {
            f(slot);
        }
    }

    /// Единственный отправитель журнала окон: когда он сброшен, журнал закрывается
    pub fn log_sender(&self) -> Option<UnboundedSender<LogItem>> {
        self.log_tx.lock().take()
    }

    pub fn journal(&self) -> Journal {
        Arc::clone(&self.journal)
    }

    pub fn operations(&self, id: u32) -> Vec<Operation> {
        self.journal
            .lock()
            .iter()
            .filter(|(window, _)| *window == WindowId(id))
            .map(|(_, op)| op.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl Editor for MemoryEditor {
    async fn list_windows(&self) -> Result<Vec<WindowInfo>> {
        if *self.list_fails.lock() {
            return CompleteError::protocol("index недоступен");
        }
        let mut windows: Vec<WindowInfo> = self
            .windows
            .lock()
            .iter()
            .map(|(id, slot)| WindowInfo {
                id: *id,
                name: slot.name.clone(),
            })
            .collect();
        windows.sort_by_key(|w| w.id);
        Ok(windows)
    }

    async fn open_window(&self, id: WindowId) -> Result<Box<dyn EditorWindow>> {
        self.journal.lock().push((id, Operation::Open));
        let mut windows = self.windows.lock();
        let slot = windows.get_mut(&id).ok_or_else(|| CompleteError::WindowOpenFailed {
            id,
            reason: "окно не существует".to_string(),
        })?;
        if slot.open_fails {
            return Err(CompleteError::WindowOpenFailed {
                id,
                reason: "ctl недоступен".to_string(),
            });
        }
        let events = slot.events.take().ok_or_else(|| CompleteError::WindowOpenFailed {
            id,
            reason: "файл event уже открыт".to_string(),
        })?;

        Ok(Box::new(MemoryWindow {
            id,
            tag: slot
                .tag_readable
                .then(|| format!("{} Del Snarf | Look ", slot.name).into_bytes()),
            resubmit_fails: slot.resubmit_fails,
            stream_breaks: slot.stream_breaks,
            events,
            journal: Arc::clone(&self.journal),
        }))
    }

    async fn open_log(&self) -> Result<Box<dyn CreationLog>> {
        let rx = self
            .log_rx
            .lock()
            .take()
            .ok_or_else(|| CompleteError::Protocol("журнал уже открыт".to_string()))?;
        Ok(Box::new(MemoryLog { rx }))
    }
}

pub struct MemoryWindow {
    id: WindowId,
    tag: Option<Vec<u8>>,
    resubmit_fails: bool,
    stream_breaks: bool,
    events: UnboundedReceiver<WindowEvent>,
    journal: Journal,
}

impl MemoryWindow {
    fn record(&self, op: Operation) {
        self.journal.lock().push((self.id, op));
    }
}

#[async_trait::async_trait]
impl EditorWindow for MemoryWindow {
    fn id(&self) -> WindowId {
        self.id
    }

    async fn read(&mut self, file: WindowFile, max: usize) -> Result<Vec<u8>> {
        self.record(Operation::Read(file));
        match (file, &self.tag) {
            (WindowFile::Tag, Some(tag)) => Ok(tag.iter().take(max).copied().collect()),
            (WindowFile::Tag, None) => CompleteError::protocol("permission denied"),
            _ => Ok(Vec::new()),
        }
    }

    async fn write(&mut self, file: WindowFile, data: &[u8]) -> Result<()> {
        self.record(Operation::Write(file, data.to_vec()));
        Ok(())
    }

    async fn set_addr(&mut self, q0: u32, q1: u32) -> Result<()> {
        self.record(Operation::SetAddr(q0, q1));
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<WindowEvent>> {
        match self.events.recv().await {
            Some(event) => {
                self.record(Operation::Delivered(event.clone()));
                Ok(Some(event))
            }
            None if self.stream_breaks => CompleteError::malformed("поток событий оборван"),
            None => Ok(None),
        }
    }

    async fn resubmit_event(&mut self, event: &WindowEvent) -> Result<()> {
        if self.resubmit_fails {
            return Err(CompleteError::EventResubmitFailed(
                "редактор отклонил событие".to_string(),
            ));
        }
        self.record(Operation::Resubmit(event.clone()));
        Ok(())
    }

    async fn write_error(&mut self, text: &str) -> Result<()> {
        self.record(Operation::WriteError(text.to_string()));
        Ok(())
    }

    async fn close(self: Box<Self>) {
        self.record(Operation::Close);
    }
}

pub struct MemoryLog {
    rx: UnboundedReceiver<LogItem>,
}

#[async_trait::async_trait]
impl CreationLog for MemoryLog {
    async fn next_entry(&mut self) -> Result<Option<LogEntry>> {
        match self.rx.recv().await {
            Some(Ok(entry)) => Ok(Some(entry)),
            Some(Err(msg)) => Err(CompleteError::MalformedEvent(msg)),
            None => Ok(None),
        }
    }
}
