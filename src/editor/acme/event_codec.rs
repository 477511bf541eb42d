use crate::acme_error;
use crate::error::Result;
use crate::events::{WindowEvent, WindowInfo};

/// Разобрать одно событие из начала буфера.
///
/// Формат acme: `c1 c2 q0 ' ' q1 ' ' flag ' ' nr ' ' <nr рун> '\n'`. За событием с
/// `flag & 2` следует событие-расширение, за `flag & 8` ещё два (аргумент и его
/// положение). Возвращает `Ok(None)`, если данных пока недостаточно.
pub fn decode_event(buf: &[u8]) -> Result<Option<(WindowEvent, usize)>> {
    let Some((mut event, mut pos)) = decode_one(buf, 0)? else {
        return Ok(None);
    };

    if event.flag & 2 != 0 {
        let Some((expansion, next)) = decode_one(buf, pos)? else {
            return Ok(None);
        };
        event.expansion = Some(Box::new(expansion));
        pos = next;
    }

    if event.flag & 8 != 0 {
        let Some((argument, next)) = decode_one(buf, pos)? else {
            return Ok(None);
        };
        let Some((location, next)) = decode_one(buf, next)? else {
            return Ok(None);
        };
        event.argument = Some(Box::new(argument));
        event.location = Some(Box::new(location));
        pos = next;
    }

    Ok(Some((event, pos)))
}

/// Сообщение для возврата события редактору: `c1 c2 q0 ' ' q1 ' ' '\n'`
pub fn encode_event(event: &WindowEvent) -> String {
    format!("{}{}{} {} \n", event.c1, event.c2, event.q0, event.q1)
}

/// Строки файла index: id, длина тега, длина тела, isdir, isdirty, затем тег
pub fn parse_index(data: &[u8]) -> Vec<WindowInfo> {
    String::from_utf8_lossy(data)
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 6 {
                return None;
            }
            let id = fields[0].parse::<u32>().ok()?;
            Some(WindowInfo::new(id, fields[5]))
        })
        .collect()
}

fn decode_one(buf: &[u8], start: usize) -> Result<Option<(WindowEvent, usize)>> {
    let mut pos = start;

    let Some(c1) = decode_char(buf, &mut pos)? else {
        return Ok(None);
    };
    let Some(c2) = decode_char(buf, &mut pos)? else {
        return Ok(None);
    };

    let mut numbers = [0u32; 4];
    for slot in numbers.iter_mut() {
        match decode_number(buf, &mut pos)? {
            Some(n) => *slot = n,
            None => return Ok(None),
        }
    }
    let [q0, q1, flag, nr] = numbers;

    let text_start = pos;
    for _ in 0..nr {
        if decode_char(buf, &mut pos)?.is_none() {
            return Ok(None);
        }
    }
    let text = buf[text_start..pos].to_vec();

    match buf.get(pos) {
        None => return Ok(None),
        Some(b'\n') => pos += 1,
        Some(other) => {
            return Err(acme_error!(
                malformed,
                "ожидался перевод строки после текста события, получен байт {:#04x}",
                other
            ))
        }
    }

    Ok(Some((
        WindowEvent::new(c1, c2, q0, q1, text).with_flag(flag),
        pos,
    )))
}

fn decode_char(buf: &[u8], pos: &mut usize) -> Result<Option<char>> {
    let Some(&first) = buf.get(*pos) else {
        return Ok(None);
    };
    let len = match first {
        0x00..=0x7f => 1,
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf7 => 4,
        _ => return Err(acme_error!(malformed, "недопустимый байт UTF-8 {:#04x}", first)),
    };
    if *pos + len > buf.len() {
        return Ok(None);
    }
    let c = std::str::from_utf8(&buf[*pos..*pos + len])
        .ok()
        .and_then(|s| s.chars().next())
        .ok_or_else(|| acme_error!(malformed, "недопустимая последовательность UTF-8"))?;
    *pos += len;
    Ok(Some(c))
}

fn decode_number(buf: &[u8], pos: &mut usize) -> Result<Option<u32>> {
    let start = *pos;
    let mut end = start;
    while end < buf.len() && buf[end].is_ascii_digit() {
        end += 1;
    }
    match buf.get(end) {
        None => Ok(None),
        Some(b' ') if end > start => {
            let digits = std::str::from_utf8(&buf[start..end]).unwrap_or_default();
            let n = digits
                .parse::<u32>()
                .map_err(|e| acme_error!(malformed, "число {:?}: {}", digits, e))?;
            *pos = end + 1;
            Ok(Some(n))
        }
        Some(other) => Err(acme_error!(
            malformed,
            "ожидалось число с пробелом, получен байт {:#04x}",
            other
        )),
    }
}
