//! Server address resolution: turns an optional explicit server string, `$PULSE_SERVER`, and a
//! set of well-known defaults into the ordered candidate list [`Context::connect`] iterates.

/// One resolved server address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAddr {
    /// `AF_UNIX` socket at this path.
    Unix(String),
    /// `tcp4:`/`tcp6:`-style address: `host[:port]`.
    Tcp { host: String, port: u16, ipv6: bool },
}

const DEFAULT_PORT: u16 = 4713;

impl ServerAddr {
    /// Parses one entry of a `PULSE_SERVER`-style address list.
    pub fn parse(s: &str) -> Option<Self> {
        if let Some(rest) = s.strip_prefix("unix:") {
            return Some(ServerAddr::Unix(rest.to_string()));
        }
        if s.starts_with('/') {
            return Some(ServerAddr::Unix(s.to_string()));
        }
        if let Some(rest) = s.strip_prefix("tcp6:") {
            return Some(Self::parse_tcp(rest, true));
        }
        if let Some(rest) = s.strip_prefix("tcp4:") {
            return Some(Self::parse_tcp(rest, false));
        }
        if let Some(rest) = s.strip_prefix("tcp:") {
            return Some(Self::parse_tcp(rest, false));
        }
        None
    }

    fn parse_tcp(s: &str, ipv6: bool) -> Self {
        if let Some((host, port_str)) = s.rsplit_once(':') {
            if let Ok(port) = port_str.parse::<u16>() {
                return ServerAddr::Tcp { host: host.to_string(), port, ipv6 };
            }
        }
        ServerAddr::Tcp { host: s.to_string(), port: DEFAULT_PORT, ipv6 }
    }
}

/// Splits an address-list string (explicit argument or `$PULSE_SERVER`) on whitespace, parsing
/// each entry and discarding ones that don't parse.
fn split_list(s: &str) -> Vec<ServerAddr> {
    s.split_whitespace().filter_map(ServerAddr::parse).collect()
}

/// The per-user runtime socket at `$XDG_RUNTIME_DIR/pulse/native`. `None` if `XDG_RUNTIME_DIR`
/// isn't set.
pub fn runtime_socket_path() -> Option<String> {
    std::env::var("XDG_RUNTIME_DIR").ok().map(|dir| format!("{dir}/pulse/native"))
}

/// The pre-`XDG_RUNTIME_DIR` per-user socket directory, `/tmp/pulse-<uid>`. Only offered as a
/// candidate if it exists and is owned by the calling user — an arbitrary world-writable
/// `/tmp/pulse-<uid>` left behind (or planted) by another user must not be trusted just because
/// the name matches.
pub fn legacy_runtime_socket_path() -> Option<String> {
    use std::os::unix::fs::MetadataExt;
    let uid = unsafe { libc::getuid() };
    let dir = format!("/tmp/pulse-{uid}");
    let meta = std::fs::metadata(&dir).ok()?;
    if meta.uid() != uid {
        return None;
    }
    Some(format!("{dir}/native"))
}

/// The system-wide fallback socket.
pub fn system_socket_path() -> String {
    "/var/run/pulse/native".to_string()
}

/// Resolves the full candidate list per the connect algorithm: explicit argument, else
/// `$PULSE_SERVER`, else a reverse-priority set of defaults (tried in the order returned — the
/// *last* entry pushed is tried *first*).
pub fn resolve(explicit: Option<&str>) -> Vec<ServerAddr> {
    if let Some(s) = explicit {
        return split_list(s);
    }
    if let Ok(s) = std::env::var("PULSE_SERVER") {
        if !s.trim().is_empty() {
            return split_list(&s);
        }
    }

    // Reverse-priority defaults: push least-preferred first, most-preferred last, since the
    // connect loop iterates front-to-back and we want the per-user socket tried first.
    let mut defaults = Vec::new();
    if let Ok(display) = std::env::var("DISPLAY") {
        if let Some(host) = display_to_hostname(&display) {
            defaults.push(ServerAddr::Tcp { host: host.clone(), port: DEFAULT_PORT, ipv6: true });
            defaults.push(ServerAddr::Tcp { host, port: DEFAULT_PORT, ipv6: false });
        }
    }
    defaults.push(ServerAddr::Tcp { host: "localhost".to_string(), port: DEFAULT_PORT, ipv6: true });
    defaults.push(ServerAddr::Tcp { host: "localhost".to_string(), port: DEFAULT_PORT, ipv6: false });
    defaults.push(ServerAddr::Unix(system_socket_path()));
    if let Some(path) = legacy_runtime_socket_path() {
        defaults.push(ServerAddr::Unix(path));
    }
    if let Some(path) = runtime_socket_path() {
        defaults.push(ServerAddr::Unix(path));
    }

    defaults.reverse();
    defaults
}

/// Extracts a remote hostname from an X11 `$DISPLAY` value (`host:display[.screen]`); `None` for
/// a local display (empty host, or one starting with `:`).
fn display_to_hostname(display: &str) -> Option<String> {
    let host = display.split(':').next().unwrap_or("");
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unix_path() {
        assert_eq!(ServerAddr::parse("/run/user/1000/pulse/native"), Some(ServerAddr::Unix("/run/user/1000/pulse/native".to_string())));
    }

    #[test]
    fn parses_unix_prefix() {
        assert_eq!(ServerAddr::parse("unix:/tmp/x"), Some(ServerAddr::Unix("/tmp/x".to_string())));
    }

    #[test]
    fn parses_tcp_with_explicit_port() {
        assert_eq!(
            ServerAddr::parse("tcp4:example.com:9999"),
            Some(ServerAddr::Tcp { host: "example.com".to_string(), port: 9999, ipv6: false })
        );
    }

    #[test]
    fn parses_tcp_default_port() {
        assert_eq!(
            ServerAddr::parse("tcp6:example.com"),
            Some(ServerAddr::Tcp { host: "example.com".to_string(), port: DEFAULT_PORT, ipv6: true })
        );
    }

    #[test]
    fn display_without_host_is_local() {
        assert_eq!(display_to_hostname(":0"), None);
        assert_eq!(display_to_hostname("remote:0.0"), Some("remote".to_string()));
    }

    #[test]
    fn explicit_list_splits_on_whitespace() {
        let list = split_list("/tmp/a tcp:host:123");
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn legacy_socket_path_rejects_missing_directory() {
        // No `/tmp/pulse-<uid>` is expected to exist in a test sandbox, so this just exercises
        // the not-found path rather than asserting anything about a real daemon's layout.
        if std::fs::metadata(format!("/tmp/pulse-{}", unsafe { libc::getuid() })).is_err() {
            assert_eq!(legacy_runtime_socket_path(), None);
        }
    }

    #[test]
    fn runtime_socket_path_is_none_without_xdg_runtime_dir() {
        let saved = std::env::var("XDG_RUNTIME_DIR").ok();
        std::env::remove_var("XDG_RUNTIME_DIR");
        assert_eq!(runtime_socket_path(), None);
        std::env::set_var("XDG_RUNTIME_DIR", "/run/user/1000");
        assert_eq!(runtime_socket_path(), Some("/run/user/1000/pulse/native".to_string()));
        match saved {
            Some(v) => std::env::set_var("XDG_RUNTIME_DIR", v),
            None => std::env::remove_var("XDG_RUNTIME_DIR"),
        }
    }
}
