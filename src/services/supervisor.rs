use crate::editor::{CreationLog, Editor};
use crate::error::Result;
use crate::events::{LogEntry, WindowId};
use crate::services::window_filter::should_skip;
use crate::services::window_session::{SessionOutcome, WindowSession};
use crate::services::CompletionInvoker;
use crate::{acme_error, debug_if_enabled, trace_if_enabled};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

type SessionExit = (WindowId, SessionOutcome);

/// Запускает по одной сессии на окно и следит за журналом окон редактора
pub struct Supervisor {
    editor: Arc<dyn Editor>,
    invoker: Arc<CompletionInvoker>,
    live: HashSet<WindowId>,
}

impl Supervisor {
    pub fn new(editor: Arc<dyn Editor>, invoker: Arc<CompletionInvoker>) -> Self {
        Self {
            editor,
            invoker,
            live: HashSet::new(),
        }
    }

    /// Обслуживать все окна редактора, пока жив журнал окон.
    ///
    /// Журнал открывается до чтения списка окон, чтобы не пропустить окна, созданные
    /// в промежутке; повторные `new` для уже обслуживаемых окон отбрасываются.
    /// Возвращается только с ошибкой: потеря журнала фатальна.
    pub async fn run(&mut self) -> Result<()> {
        let log = self.editor.open_log().await?;
        let windows = self.editor.list_windows().await?;
        let (exits_tx, mut exits_rx) = unbounded_channel();

        for window in windows {
            if should_skip(&window.name) {
                debug_if_enabled!("Пропускаем окно {}", window);
                continue;
            }
            self.spawn_session(window.id, &exits_tx);
        }
        info!("Запущено сессий при старте: {}", self.live.len());

        let mut entries = forward_log(log);
        let mut errors = ErrorRun::default();
        loop {
            tokio::select! {
                entry = entries.recv() => match entry {
                    Some(Ok(entry)) => {
                        let failed = errors.recover();
                        if failed > 1 {
                            info!("Журнал окон снова читается после {} ошибок подряд", failed);
                        }
                        self.on_log_entry(entry, &exits_tx);
                    }
                    Some(Err(e)) => {
                        if errors.fail() {
                            warn!("Ошибка чтения журнала окон: {}", e);
                        } else {
                            debug_if_enabled!("Повторная ошибка чтения журнала окон: {}", e);
                        }
                    }
                    None => return Err(acme_error!(log_lost, "журнал окон закрыт редактором")),
                },
                Some((id, outcome)) = exits_rx.recv() => self.on_session_exit(id, outcome),
            }
        }
    }

    /// Обслуживать только заданные окна, без журнала; завершается вместе с последней сессией
    pub async fn run_windows(&mut self, ids: &[WindowId]) -> Result<()> {
        let (exits_tx, mut exits_rx) = unbounded_channel();
        for &id in ids {
            if !self.live.contains(&id) {
                self.spawn_session(id, &exits_tx);
            }
        }

        while !self.live.is_empty() {
            let Some((id, outcome)) = exits_rx.recv().await else {
                break;
            };
            self.on_session_exit(id, outcome);
        }
        info!("Все заданные окна обработаны");
        Ok(())
    }

    fn on_log_entry(&mut self, entry: LogEntry, exits: &UnboundedSender<SessionExit>) {
        if !entry.is_new() {
            trace_if_enabled!("Журнал: {:?} для окна {}", entry.op, entry.id);
            return;
        }
        if self.live.contains(&entry.id) {
            debug!("Окно {} уже обслуживается", entry.id);
            return;
        }
        // Имя из журнала не проверяется: сессия сама читает тег окна
        self.spawn_session(entry.id, exits);
    }

    fn on_session_exit(&mut self, id: WindowId, outcome: SessionOutcome) {
        self.live.remove(&id);
        debug!("Сессия окна {} завершена: {:?}", id, outcome);
    }

    fn spawn_session(&mut self, id: WindowId, exits: &UnboundedSender<SessionExit>) {
        self.live.insert(id);

        let session = WindowSession::new(id, self.editor.clone(), self.invoker.clone());
        let exits = exits.clone();
        tokio::spawn(async move {
            let outcome = session.run().await;
            let _ = exits.send((id, outcome));
        });
    }
}

/// Серия ошибок чтения подряд: предупреждение пишется только для первой
#[derive(Debug, Default)]
struct ErrorRun {
    count: u32,
}

impl ErrorRun {
    /// `true` для первой ошибки серии
    fn fail(&mut self) -> bool {
        self.count += 1;
        self.count == 1
    }

    /// Завершить серию; возвращает число ошибок в ней
    fn recover(&mut self) -> u32 {
        std::mem::take(&mut self.count)
    }
}

/// Чтение журнала в отдельной задаче: RPC редактора нельзя прерывать на середине
fn forward_log(mut log: Box<dyn CreationLog>) -> UnboundedReceiver<Result<LogEntry>> {
    let (tx, rx) = unbounded_channel();
    tokio::spawn(async move {
        loop {
            let item = match log.next_entry().await {
                Ok(Some(entry)) => Ok(entry),
                Ok(None) => break,
                Err(e) => Err(e),
            };
            if tx.send(item).is_err() {
                break;
            }
        }
    });
    rx
}
