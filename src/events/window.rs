use std::fmt;

/// Числовой идентификатор окна acme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub u32);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Информация об окне из индекса редактора
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowInfo {
    pub id: WindowId,
    pub name: String,
}

impl WindowInfo {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id: WindowId(id),
            name: name.into(),
        }
    }
}

impl fmt::Display for WindowInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} \"{}\"", self.id, self.name)
    }
}

/// Имя окна - первое слово тега
pub fn name_from_tag(tag: &[u8]) -> String {
    let name = tag.split(|&b| b == b' ').next().unwrap_or_default();
    String::from_utf8_lossy(name).into_owned()
}

/// Источник события (первый символ записи в файле event)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Запись в файлы body или tag
    BodyOrTagFile,
    /// Прочие файловые действия, например запись в ctl
    File,
    Keyboard,
    Mouse,
    Other(char),
}

impl From<char> for Origin {
    fn from(c: char) -> Self {
        match c {
            'E' => Origin::BodyOrTagFile,
            'F' => Origin::File,
            'K' => Origin::Keyboard,
            'M' => Origin::Mouse,
            other => Origin::Other(other),
        }
    }
}

/// Тип действия (второй символ записи). Строчная буква означает тег, заглавная - тело окна.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Delete,
    Insert,
    Look,
    Execute,
    Other(char),
}

impl From<char> for Action {
    fn from(c: char) -> Self {
        match c.to_ascii_uppercase() {
            'D' => Action::Delete,
            'I' => Action::Insert,
            'L' => Action::Look,
            'X' => Action::Execute,
            _ => Action::Other(c),
        }
    }
}

/// Событие окна в том виде, в котором его прислал редактор
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowEvent {
    pub c1: char,
    pub c2: char,
    pub q0: u32,
    pub q1: u32,
    pub flag: u32,
    pub text: Vec<u8>,
    /// Расширение пустого выделения (flag & 2)
    pub expansion: Option<Box<WindowEvent>>,
    /// Аргумент аккорда (flag & 8)
    pub argument: Option<Box<WindowEvent>>,
    /// Положение аргумента аккорда (flag & 8)
    pub location: Option<Box<WindowEvent>>,
}

impl WindowEvent {
    pub fn new(c1: char, c2: char, q0: u32, q1: u32, text: impl Into<Vec<u8>>) -> Self {
        Self {
            c1,
            c2,
            q0,
            q1,
            flag: 0,
            text: text.into(),
            expansion: None,
            argument: None,
            location: None,
        }
    }

    pub fn with_flag(mut self, flag: u32) -> Self {
        self.flag = flag;
        self
    }

    pub fn origin(&self) -> Origin {
        Origin::from(self.c1)
    }

    pub fn action(&self) -> Action {
        Action::from(self.c2)
    }

    pub fn in_tag(&self) -> bool {
        self.c2.is_ascii_lowercase()
    }

    /// Текст события как строка (невалидный UTF-8 заменяется)
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.text).into_owned()
    }

    /// Тег переписан файловой операцией: так acme сообщает о смене имени окна
    pub fn is_file_info(&self) -> bool {
        self.origin() == Origin::File && self.action() == Action::Insert && self.in_tag()
    }

    /// Команды, которые acme умеет выполнять сам (Execute / Look в теле или теге)
    pub fn is_builtin_command(&self) -> bool {
        matches!(self.action(), Action::Execute | Action::Look)
    }

    /// Ввод с клавиатуры в тело окна ровно одного заданного байта
    pub fn is_keyboard_byte(&self, byte: u8) -> bool {
        self.origin() == Origin::Keyboard
            && self.action() == Action::Insert
            && !self.in_tag()
            && self.text.as_slice() == [byte]
    }
}

impl fmt::Display for WindowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{} #{},#{} flag={} {:?}",
            self.c1,
            self.c2,
            self.q0,
            self.q1,
            self.flag,
            self.text_lossy()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_and_action_classification() {
        let event = WindowEvent::new('K', 'I', 10, 11, vec![0x0f]);
        assert_eq!(event.origin(), Origin::Keyboard);
        assert_eq!(event.action(), Action::Insert);
        assert!(!event.in_tag());

        let tag_exec = WindowEvent::new('M', 'x', 0, 3, "Put");
        assert_eq!(tag_exec.origin(), Origin::Mouse);
        assert_eq!(tag_exec.action(), Action::Execute);
        assert!(tag_exec.in_tag());

        assert_eq!(Origin::from('Z'), Origin::Other('Z'));
        assert_eq!(Action::from('q'), Action::Other('q'));
    }

    #[test]
    fn test_keyboard_byte_requires_exact_payload() {
        assert!(WindowEvent::new('K', 'I', 1, 2, vec![0x0f]).is_keyboard_byte(0x0f));
        assert!(!WindowEvent::new('K', 'I', 1, 3, vec![0x0f, b'a']).is_keyboard_byte(0x0f));
        assert!(!WindowEvent::new('M', 'I', 1, 2, vec![0x0f]).is_keyboard_byte(0x0f));
        assert!(!WindowEvent::new('K', 'i', 1, 2, vec![0x0f]).is_keyboard_byte(0x0f));
        assert!(!WindowEvent::new('K', 'I', 1, 2, Vec::new()).is_keyboard_byte(0x0f));
    }

    #[test]
    fn test_builtin_commands_and_file_info() {
        for c2 in ['x', 'X', 'l', 'L'] {
            assert!(WindowEvent::new('M', c2, 0, 1, "a").is_builtin_command());
        }
        assert!(!WindowEvent::new('M', 'I', 0, 1, "a").is_builtin_command());
        assert!(!WindowEvent::new('M', 'q', 0, 1, "a").is_builtin_command());

        assert!(WindowEvent::new('F', 'i', 0, 6, "build/").is_file_info());
        assert!(!WindowEvent::new('F', 'I', 0, 6, "build/").is_file_info());
        assert!(!WindowEvent::new('E', 'i', 0, 6, "build/").is_file_info());
    }

    #[test]
    fn test_name_from_tag() {
        assert_eq!(name_from_tag(b"/tmp/foo.go Del Snarf | Look"), "/tmp/foo.go");
        assert_eq!(name_from_tag(b"+Errors"), "+Errors");
        assert_eq!(name_from_tag(b""), "");
    }

    #[test]
    fn test_window_info_display() {
        let info = WindowInfo::new(7, "/tmp/foo.go");
        assert_eq!(info.to_string(), "#7 \"/tmp/foo.go\"");
        assert_eq!(info.id, WindowId(7));
    }
}
