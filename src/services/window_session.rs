use crate::{acme_error, debug_if_enabled};
use crate::editor::{Editor, EditorWindow, WindowFile};
use crate::error::CompleteError;
use crate::events::{name_from_tag, WindowEvent, WindowId, COMPLETION_TRIGGER};
use crate::services::window_filter::should_skip;
use crate::services::CompletionInvoker;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Сколько байт тега читается для проверки имени окна
const TAG_READ_LIMIT: usize = 1024;

/// Состояние сессии окна
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    /// Окно превратилось в служебное или каталог
    Disqualified,
    /// Поток событий закрыт (окно удалено)
    Closed,
}

/// Чем закончилась сессия
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    OpenFailed,
    Ineligible,
    Disqualified,
    Closed,
}

/// Сессия владеет окном и обрабатывает его события по одному, в порядке поступления
pub struct WindowSession {
    id: WindowId,
    editor: Arc<dyn Editor>,
    invoker: Arc<CompletionInvoker>,
}

impl WindowSession {
    pub fn new(id: WindowId, editor: Arc<dyn Editor>, invoker: Arc<CompletionInvoker>) -> Self {
        Self {
            id,
            editor,
            invoker,
        }
    }

    pub async fn run(self) -> SessionOutcome {
        let mut window = match self.editor.open_window(self.id).await {
            Ok(window) => window,
            Err(e) => {
                warn!("{}", e);
                return SessionOutcome::OpenFailed;
            }
        };

        if !self.is_eligible(window.as_mut()).await {
            window.close().await;
            return SessionOutcome::Ineligible;
        }

        info!("Обработка событий окна {}", self.id);
        let state = self.process_events(window.as_mut()).await;
        window.close().await;

        match state {
            SessionState::Disqualified => SessionOutcome::Disqualified,
            _ => {
                info!("Поток событий закрыт, окно {} больше не обслуживается", self.id);
                SessionOutcome::Closed
            }
        }
    }

    /// Нечитаемый тег не повод бросать окно: в этом случае оно обслуживается
    async fn is_eligible(&self, window: &mut dyn EditorWindow) -> bool {
        match window.read(WindowFile::Tag, TAG_READ_LIMIT).await {
            Ok(tag) => {
                let name = name_from_tag(&tag);
                if should_skip(&name) {
                    debug_if_enabled!("Окно {} ({}) не обслуживается", self.id, name);
                    return false;
                }
                true
            }
            Err(e) => {
                warn!("Окно {}: {}", self.id, acme_error!(tag_read, "{}", e));
                true
            }
        }
    }

    async fn process_events(&self, window: &mut dyn EditorWindow) -> SessionState {
        let mut state = SessionState::Active;
        while state == SessionState::Active {
            state = match window.next_event().await {
                Ok(Some(event)) => self.handle_event(window, &event).await,
                Ok(None) => SessionState::Closed,
                Err(e) => {
                    error!("Ошибка чтения событий окна {}: {}", self.id, e);
                    SessionState::Closed
                }
            };
        }
        state
    }

    /// Обработать одно событие; ошибки записываются в лог и не прерывают сессию
    pub async fn handle_event(&self, window: &mut dyn EditorWindow, event: &WindowEvent) -> SessionState {
        debug_if_enabled!("Окно {}: событие {}", self.id, event);

        if event.is_file_info() && should_skip(&event.text_lossy()) {
            info!(
                "Окно {} стало служебным окном или каталогом ({:?}), сессия завершается",
                self.id,
                event.text_lossy()
            );
            return SessionState::Disqualified;
        }

        // acme убирает автоматическое меню, пока открыт файл event
        if let Err(e) = window.write(WindowFile::Ctl, b"menu").await {
            warn!("Окно {}: не удалось включить меню: {}", self.id, e);
        }

        if event.is_keyboard_byte(COMPLETION_TRIGGER) {
            self.complete(window, event).await;
            return SessionState::Active;
        }

        if event.is_builtin_command() {
            if let Err(e) = window.resubmit_event(event).await {
                let e = match e {
                    e @ CompleteError::EventResubmitFailed(_) => e,
                    other => CompleteError::EventResubmitFailed(other.to_string()),
                };
                error!("Окно {}: {}", self.id, e);
            }
        }

        SessionState::Active
    }

    async fn complete(&self, window: &mut dyn EditorWindow, event: &WindowEvent) {
        match self.invoker.invoke(window, event.q0, event.q1).await {
            Ok(_) => {}
            Err(CompleteError::CompletionFailed { status, output }) => {
                error!(
                    "Окно {}: автодополнение завершилось с ошибкой: {} (вывод: {})",
                    self.id, status, output
                );
                if !output.is_empty() {
                    if let Err(e) = window.write_error(&output).await {
                        warn!("Окно {}: не удалось записать в errors: {}", self.id, e);
                    }
                }
            }
            Err(e) => error!("Окно {}: не удалось выполнить автодополнение: {}", self.id, e),
        }
    }
}
