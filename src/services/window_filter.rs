//! Which windows are left alone: utility windows (`-foo`, `+Errors`) and directory listings.

/// Окно не обслуживается, если его имя:
/// - указывает на служебное окно (последний компонент пути начинается с `-` или `+`)
/// - указывает на каталог (имя заканчивается на `/`)
pub fn should_skip(name: &str) -> bool {
    let base = base_name(name);
    base.starts_with('-') || base.starts_with('+') || name.ends_with('/')
}

/// Последний компонент пути: завершающие `/` отбрасываются, пустое имя даёт `.`
fn base_name(name: &str) -> &str {
    if name.is_empty() {
        return ".";
    }
    let trimmed = name.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/";
    }
    match trimmed.rfind('/') {
        Some(i) => &trimmed[i + 1..],
        None => trimmed,
    }
}
