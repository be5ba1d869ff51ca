//! Grammar of the textual identifiers used by the distribution protocol.

use std::sync::LazyLock;

use regex::Regex;

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern compiles")
}

pub static ALGORITHM_COMPONENT: LazyLock<Regex> = LazyLock::new(|| compile(r"^[a-z0-9]+$"));
pub static ALGORITHM_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| compile(r"[+._-]"));
pub static ENCODED: LazyLock<Regex> = LazyLock::new(|| compile(r"^[a-zA-Z0-9=_-]+$"));
pub static SHA256: LazyLock<Regex> = LazyLock::new(|| compile(r"^[a-f0-9]{64}$"));
pub static SHA512: LazyLock<Regex> = LazyLock::new(|| compile(r"^[a-f0-9]{128}$"));

pub static DOMAIN: LazyLock<Regex> = LazyLock::new(|| compile(r"^[^:/$\s]+(:\d+)?$"));
pub static NAME: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"^[a-z0-9]+((\.|_|__|-+)[a-z0-9]+)*(/[a-z0-9]+((\.|_|__|-+)[a-z0-9]+)*)*$")
});
pub static TAG: LazyLock<Regex> = LazyLock::new(|| compile(r"^[a-zA-Z0-9_][a-zA-Z0-9._-]{0,127}$"));
