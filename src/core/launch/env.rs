use std::ffi::{OsStr, OsString};

/// Variables set by an embedding runtime host. When inherited they make the spawned
/// runtime behave as a plain script host instead of opening its GUI shell.
pub const EMBEDDER_ENV_KEYS: &[&str] = &["ELECTRON_RUN_AS_NODE", "ATOM_SHELL_INTERNAL_RUN_AS_NODE"];

/// Copy of `vars` without the embedder keys and any `extra` keys.
pub fn sanitized_environment<I>(vars: I, extra: &[String]) -> Vec<(OsString, OsString)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .filter(|(key, _)| {
            let embedder = EMBEDDER_ENV_KEYS
                .iter()
                .any(|stripped| key_matches(key, stripped));
            let configured = extra.iter().any(|stripped| key_matches(key, stripped));
            !(embedder || configured)
        })
        .collect()
}

/// Snapshot of the current process environment, sanitized.
pub fn launch_environment(extra: &[String]) -> Vec<(OsString, OsString)> {
    sanitized_environment(std::env::vars_os(), extra)
}

fn key_matches(key: &OsStr, stripped: &str) -> bool {
    // Windows environment names are case-insensitive.
    if cfg!(windows) {
        key.to_str()
            .map(|key| key.eq_ignore_ascii_case(stripped))
            .unwrap_or(false)
    } else {
        key == stripped
    }
}
