use std::collections::HashSet;
use std::path::{Path, PathBuf};

use ctxgraph_core::sentinel;
use ctxgraph_core::SentinelKind;
use once_cell::sync::Lazy;

/// A conservative subset of the Python 3 standard library's top-level
/// module names, sufficient to recognise the overwhelming majority of
/// stdlib imports without shelling out to an interpreter.
static STDLIB_MODULES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "abc", "argparse", "array", "ast", "asyncio", "base64", "bisect", "builtins",
        "calendar", "collections", "concurrent", "contextlib", "copy", "csv", "ctypes",
        "dataclasses", "datetime", "decimal", "difflib", "dis", "email", "enum", "errno",
        "fcntl", "fnmatch", "functools", "gc", "getpass", "glob", "gzip", "hashlib", "heapq",
        "hmac", "html", "http", "importlib", "inspect", "io", "ipaddress", "itertools",
        "json", "keyword", "logging", "lzma", "math", "mimetypes", "mmap", "multiprocessing",
        "numbers", "operator", "os", "pathlib", "pickle", "pkgutil", "platform", "pprint",
        "queue", "random", "re", "reprlib", "sched", "secrets", "select", "shelve", "shlex",
        "shutil", "signal", "site", "socket", "socketserver", "sqlite3", "ssl", "stat",
        "statistics", "string", "struct", "subprocess", "sys", "sysconfig", "tempfile",
        "textwrap", "threading", "time", "timeit", "tkinter", "token", "tokenize", "trace",
        "traceback", "types", "typing", "unicodedata", "unittest", "urllib", "uuid",
        "venv", "warnings", "weakref", "webbrowser", "xml", "zipfile", "zlib", "zoneinfo",
    ]
    .into_iter()
    .collect()
});

/// Top-level package names for a small set of very common third-party
/// distributions. The original analyzer queries whether a module is
/// actually importable in the host interpreter; lacking a Python runtime,
/// this fixed set stands in (see DESIGN.md for the tradeoff).
static KNOWN_THIRD_PARTY: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "numpy", "pandas", "requests", "pytest", "django", "flask", "click", "yaml",
        "setuptools", "pip", "attr", "attrs", "six", "pydantic", "sqlalchemy", "boto3",
        "jinja2", "redis", "celery", "fastapi", "uvicorn", "scipy", "matplotlib",
    ]
    .into_iter()
    .collect()
});

pub static BUILTIN_NAMES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "abs", "all", "any", "ascii", "bin", "bool", "bytearray", "bytes", "callable", "chr",
        "classmethod", "compile", "complex", "delattr", "dict", "dir", "divmod", "enumerate",
        "eval", "exec", "filter", "float", "format", "frozenset", "getattr", "globals",
        "hasattr", "hash", "help", "hex", "id", "input", "int", "isinstance", "issubclass",
        "iter", "len", "list", "locals", "map", "max", "memoryview", "min", "next", "object",
        "oct", "open", "ord", "pow", "print", "property", "range", "repr", "reversed",
        "round", "set", "setattr", "slice", "sorted", "staticmethod", "str", "sum", "super",
        "tuple", "type", "vars", "zip", "Exception", "ValueError", "TypeError", "KeyError",
        "IndexError", "AttributeError", "RuntimeError", "StopIteration", "None", "True",
        "False",
    ]
    .into_iter()
    .collect()
});

/// Resolution of a dotted module path to a concrete target for a
/// `Relationship`'s `target_file`: either a real path under the project
/// root, or one of the four sentinel kinds.
pub fn resolve_module(
    dotted: &str,
    current_file: &Path,
    project_root: &Path,
    level: u32,
) -> String {
    if let Some(path) = resolve_project_local(dotted, current_file, project_root, level) {
        return path;
    }
    if level > 0 {
        // Relative imports that don't resolve locally have nowhere else to
        // go: there is no stdlib/third-party relative import.
        return sentinel(SentinelKind::Unresolved, dotted);
    }
    let top_level = dotted.split('.').next().unwrap_or(dotted);
    if STDLIB_MODULES.contains(top_level) {
        return sentinel(SentinelKind::Stdlib, dotted);
    }
    if KNOWN_THIRD_PARTY.contains(top_level) {
        return sentinel(SentinelKind::ThirdParty, dotted);
    }
    sentinel(SentinelKind::Unresolved, dotted)
}

fn resolve_project_local(
    dotted: &str,
    current_file: &Path,
    project_root: &Path,
    level: u32,
) -> Option<String> {
    let mut base = if level == 0 {
        project_root.to_path_buf()
    } else {
        let mut dir = current_file.parent()?.to_path_buf();
        // level 1 == "from . import x" == the current package (current dir).
        for _ in 0..level.saturating_sub(1) {
            dir = dir.parent()?.to_path_buf();
        }
        dir
    };

    if !dotted.is_empty() {
        for segment in dotted.split('.') {
            base.push(segment);
        }
    }

    // File beats package when both would match.
    let as_file = with_extension(&base, "py");
    if as_file.is_file() {
        return Some(as_file.to_string_lossy().to_string());
    }
    let as_package = base.join("__init__.py");
    if as_package.is_file() {
        return Some(as_package.to_string_lossy().to_string());
    }
    None
}

fn with_extension(base: &Path, ext: &str) -> PathBuf {
    let mut file = base.to_path_buf();
    let name = file
        .file_name()
        .map(|n| format!("{}.{}", n.to_string_lossy(), ext))
        .unwrap_or_default();
    file.set_file_name(name);
    file
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdlib_module_resolves_to_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let current = dir.path().join("a.py");
        let resolved = resolve_module("os.path", &current, dir.path(), 0);
        assert_eq!(resolved, "<stdlib:os.path>");
    }

    #[test]
    fn project_local_file_beats_package() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("pkg")).unwrap();
        std::fs::write(dir.path().join("pkg.py"), "").unwrap();
        std::fs::write(dir.path().join("pkg").join("__init__.py"), "").unwrap();
        let current = dir.path().join("main.py");
        let resolved = resolve_module("pkg", &current, dir.path(), 0);
        assert_eq!(resolved, dir.path().join("pkg.py").to_string_lossy());
    }

    #[test]
    fn unresolved_when_nothing_matches() {
        let dir = tempfile::tempdir().unwrap();
        let current = dir.path().join("a.py");
        let resolved = resolve_module("totally_unknown_module", &current, dir.path(), 0);
        assert_eq!(resolved, "<unresolved:totally_unknown_module>");
    }
}
