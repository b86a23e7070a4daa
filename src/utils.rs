use std::{env, path::Path, sync::OnceLock};

use chrono::Local;

const FALLBACK_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

pub fn fallback_timestamp() -> String {
    Local::now().format(FALLBACK_TIMESTAMP_FORMAT).to_string()
}

// NOTE: same lookup order getpass-style helpers use. No passwd lookup, that would need libc.
pub fn current_user() -> String {
    ["LOGNAME", "USER", "LNAME", "USERNAME"]
        .iter()
        .filter_map(|key| env::var(key).ok())
        .find(|user| !user.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn process_name() -> &'static str {
    static NAME: OnceLock<String> = OnceLock::new();

    NAME.get_or_init(|| {
        env::current_exe()
            .ok()
            .as_deref()
            .and_then(Path::file_stem)
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "main".to_string())
    })
}

pub fn thread_id() -> String {
    // ThreadId::as_u64 is unstable, the Debug form is `ThreadId(N)`.
    let id = format!("{:?}", std::thread::current().id());
    id.trim_start_matches("ThreadId(")
        .trim_end_matches(')')
        .to_string()
}
