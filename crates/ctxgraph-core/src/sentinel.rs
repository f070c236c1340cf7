//! The sentinel path grammar: `<stdlib:NAME>`, `<third-party:NAME>`,
//! `<builtin:NAME>`, `<unresolved:NAME>`. These are never real filesystem
//! paths and are never traversed by the staleness resolver.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SentinelKind {
    Stdlib,
    ThirdParty,
    Builtin,
    Unresolved,
}

impl SentinelKind {
    fn tag(self) -> &'static str {
        match self {
            SentinelKind::Stdlib => "stdlib",
            SentinelKind::ThirdParty => "third-party",
            SentinelKind::Builtin => "builtin",
            SentinelKind::Unresolved => "unresolved",
        }
    }
}

impl fmt::Display for SentinelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Builds a sentinel string such as `<stdlib:os.path>`.
pub fn sentinel(kind: SentinelKind, name: &str) -> String {
    format!("<{}:{}>", kind.tag(), name)
}

/// True if `path` follows the sentinel grammar (`<kind:name>`), never a
/// real filesystem path.
pub fn is_sentinel(path: &str) -> bool {
    path.starts_with('<') && path.ends_with('>') && path.len() > 2
}

/// Splits a sentinel into its kind and name, if it is one.
pub fn parse_sentinel(path: &str) -> Option<(SentinelKind, &str)> {
    if !is_sentinel(path) {
        return None;
    }
    let inner = &path[1..path.len() - 1];
    let (tag, name) = inner.split_once(':')?;
    let kind = match tag {
        "stdlib" => SentinelKind::Stdlib,
        "third-party" => SentinelKind::ThirdParty,
        "builtin" => SentinelKind::Builtin,
        "unresolved" => SentinelKind::Unresolved,
        _ => return None,
    };
    Some((kind, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_and_parses_round_trip() {
        let s = sentinel(SentinelKind::ThirdParty, "requests");
        assert_eq!(s, "<third-party:requests>");
        assert!(is_sentinel(&s));
        assert_eq!(parse_sentinel(&s), Some((SentinelKind::ThirdParty, "requests")));
    }

    #[test]
    fn real_paths_are_not_sentinels() {
        assert!(!is_sentinel("/src/pkg/module.py"));
        assert!(!is_sentinel("pkg/module.py"));
        assert_eq!(parse_sentinel("pkg/module.py"), None);
    }
}
