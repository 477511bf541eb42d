use crate::error::{CompleteError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Найти сокет acme: явный путь из конфигурации или каталог пространства имён plan9port
pub fn acme_socket(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        debug!("Используется указанный сокет acme: {:?}", path);
        return Ok(path.to_path_buf());
    }

    let dir = namespace_dir(
        std::env::var("NAMESPACE").ok(),
        std::env::var("USER").ok(),
        std::env::var("DISPLAY").ok(),
    )?;
    Ok(dir.join("acme"))
}

/// Правила plan9port: `$NAMESPACE`, иначе `/tmp/ns.$USER.$DISPLAY`, где у DISPLAY
/// отбрасывается суффикс экрана `.0`, а `/` заменяется на `_`.
pub fn namespace_dir(
    namespace: Option<String>,
    user: Option<String>,
    display: Option<String>,
) -> Result<PathBuf> {
    if let Some(ns) = namespace.filter(|ns| !ns.is_empty()) {
        return Ok(PathBuf::from(ns));
    }

    let user = user.filter(|u| !u.is_empty()).ok_or_else(|| {
        CompleteError::Config(anyhow::anyhow!(
            "не задан ни NAMESPACE, ни USER: укажите editor.socket в конфигурации"
        ))
    })?;

    let display = canonical_display(display.as_deref().unwrap_or(":0.0"));
    Ok(PathBuf::from(format!("/tmp/ns.{}.{}", user, display)))
}

fn canonical_display(display: &str) -> String {
    let mut display = display.to_string();
    if let Some(colon) = display.rfind(':') {
        if display[colon..].ends_with(".0") {
            display.truncate(display.len() - 2);
        }
    }
    display.replace('/', "_")
}
