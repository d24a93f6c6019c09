//! `tsirc` configuration and its layering.
//!
//! | Line | Effect |
//! |------|--------|
//! | `include <dir>` | append a unit search path |
//! | `variable <name>=<value>` | set an FFI plugin variable |
//! | `extension <ext>` | source file extension (default `.ts`) |
//! | Lines starting with `#` or `;` | comment, ignored |
//!
//! Settings come from four layers, lowest priority first: built-in defaults,
//! the config file, the `ts_include`/`ts_variable` environment variables and
//! the command line.  Higher layers override scalar settings; their search
//! paths are searched before those of lower layers.

use std::path::{Path, PathBuf};

use crate::compile::PathCollection;
use crate::ffi::FfiVariables;

/// Source extension used when no layer sets one.
pub const DEFAULT_EXTENSION: &str = ".ts";

/// Environment variable holding `;`-separated search paths.
pub const ENV_INCLUDE: &str = "ts_include";

/// Environment variable holding `;`-separated `name=value` plugin variables.
pub const ENV_VARIABLE: &str = "ts_variable";

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading configuration.  Line 0 means
/// the error came from the environment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

/// One configuration layer, or the merge of several.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Search paths in priority order, not counting the built-in `.`.
    pub paths: Vec<PathBuf>,
    pub extension: Option<String>,
    pub variables: FfiVariables,
    /// Step through the program under the debugger.
    pub debug: bool,
    /// Stop after compiling.
    pub compile_only: bool,
    /// Run even if compilation produced warnings.
    pub ignore_warnings: bool,
    /// Log at `debug` level.
    pub log_debug: bool,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse config file text.  Malformed lines are reported and skipped.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = Config::new();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            let (directive, rest) = line
                .split_once(|c: char| c.is_ascii_whitespace())
                .unwrap_or((line, ""));
            let tokens = split_args(rest.trim());
            let result = match directive {
                "include" => single(&tokens, "include").map(|dir| config.paths.push(PathBuf::from(dir))),
                "variable" => single(&tokens, "variable")
                    .and_then(|assignment| parse_variable(assignment, &mut config.variables)),
                "extension" => {
                    single(&tokens, "extension").map(|ext| config.extension = Some(normalize_extension(ext)))
                }
                other => Err(format!("unknown directive '{other}'")),
            };
            if let Err(message) = result {
                errors.push(ConfigError { line: lineno, message });
            }
        }

        (config, errors)
    }

    /// Read and parse a config file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }

    /// The layer given by `ts_include` and `ts_variable` values.
    pub fn from_env_values(include: Option<&str>, variable: Option<&str>) -> (Self, Vec<ConfigError>) {
        let mut config = Config::new();
        let mut errors = Vec::new();
        if let Some(include) = include {
            config.paths.extend(split_list(include).map(PathBuf::from));
        }
        if let Some(variable) = variable {
            for assignment in split_list(variable) {
                if let Err(message) = parse_variable(assignment, &mut config.variables) {
                    errors.push(ConfigError { line: 0, message: format!("{ENV_VARIABLE}: {message}") });
                }
            }
        }
        (config, errors)
    }

    /// The layer given by the process environment.
    pub fn from_env() -> (Self, Vec<ConfigError>) {
        let include = std::env::var(ENV_INCLUDE).ok();
        let variable = std::env::var(ENV_VARIABLE).ok();
        Self::from_env_values(include.as_deref(), variable.as_deref())
    }

    /// Put `higher` on top of `self`.
    pub fn overlay(mut self, higher: Config) -> Config {
        let mut paths = higher.paths;
        paths.extend(self.paths.into_iter());
        self.paths = paths;
        self.extension = higher.extension.or(self.extension);
        self.variables.extend(higher.variables);
        self.debug |= higher.debug;
        self.compile_only |= higher.compile_only;
        self.ignore_warnings |= higher.ignore_warnings;
        self.log_debug |= higher.log_debug;
        self
    }

    pub fn extension(&self) -> &str {
        self.extension.as_deref().unwrap_or(DEFAULT_EXTENSION)
    }

    /// Search paths in priority order, ending with the current directory.
    pub fn search_paths(&self) -> PathCollection {
        self.paths
            .iter()
            .cloned()
            .chain(std::iter::once(PathBuf::from(".")))
            .collect()
    }
}

/// Default location of the config file: `tsirc` in the platform config
/// directory.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "ts").map(|dirs| dirs.config_dir().join("tsirc"))
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Directive words.  A quoted word may hold spaces; inside quotes a
/// backslash takes the next character literally.
fn split_args(s: &str) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    let mut chars = s.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '\\' if in_quotes => {
                if let Some(escaped) = chars.next() {
                    cur.push(escaped);
                }
            }
            c if c.is_ascii_whitespace() && !in_quotes => {
                if !cur.is_empty() {
                    args.push(std::mem::take(&mut cur));
                }
            }
            c => cur.push(c),
        }
    }
    if !cur.is_empty() {
        args.push(cur);
    }
    args
}

fn single<'a>(tokens: &'a [String], directive: &str) -> Result<&'a str, String> {
    match tokens {
        [one] => Ok(one),
        [] => Err(format!("{directive}: missing argument")),
        _ => Err(format!("{directive}: expected one argument, got {}", tokens.len())),
    }
}

fn split_list(s: &str) -> impl Iterator<Item = &str> {
    s.split(';').map(str::trim).filter(|part| !part.is_empty())
}

/// Parse `name=value` into `variables`.
pub(crate) fn parse_variable(assignment: &str, variables: &mut FfiVariables) -> Result<(), String> {
    match assignment.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            variables.insert(name.trim().to_owned(), value.trim().to_owned());
            Ok(())
        }
        _ => Err(format!("expected <name>=<value>, got '{assignment}'")),
    }
}

fn normalize_extension(ext: &str) -> String {
    if ext.starts_with('.') || ext.is_empty() {
        ext.to_owned()
    } else {
        format!(".{ext}")
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_quoted_spaces() {
        assert_eq!(split_args(r#""my dir" x"#), vec!["my dir", "x"]);
        assert_eq!(split_args(r#""a\"b""#), vec![r#"a"b"#]);
    }

    #[test]
    fn directives() {
        let (config, errors) = Config::load_str(
            "# comment\n; another\n\ninclude /opt/ts\ninclude \"/my units\"\nvariable port=/dev/ttyS0\nextension tsc\n",
        );
        assert!(errors.is_empty());
        assert_eq!(config.paths, vec![PathBuf::from("/opt/ts"), PathBuf::from("/my units")]);
        assert_eq!(config.variables.get("port").map(String::as_str), Some("/dev/ttyS0"));
        assert_eq!(config.extension(), ".tsc");
    }

    #[test]
    fn malformed_lines_are_reported_and_skipped() {
        let (config, errors) = Config::load_str("include\nvariable novalue\nfrobnicate x\ninclude ok\n");
        assert_eq!(config.paths, vec![PathBuf::from("ok")]);
        let lines: Vec<usize> = errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, [1, 2, 3]);
        assert_eq!(errors[2].to_string(), "line 3: unknown directive 'frobnicate'");
    }

    #[test]
    fn config_error_is_a_std_error() {
        let error: Box<dyn std::error::Error> = Box::new(ConfigError { line: 0, message: "bad".into() });
        assert_eq!(error.to_string(), "line 0: bad");
        assert!(error.source().is_none());
    }

    #[test]
    fn env_layer() {
        let (config, errors) = Config::from_env_values(Some("a; b;;"), Some("x=1;bad;y = 2"));
        assert_eq!(config.paths, vec![PathBuf::from("a"), PathBuf::from("b")]);
        assert_eq!(config.variables.len(), 2);
        assert_eq!(config.variables["y"], "2");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line, 0);
    }

    #[test]
    fn overlay_prefers_higher_layer() {
        let (file, _) = Config::load_str("include file\nvariable v=file\nextension .f\n");
        let (env, _) = Config::from_env_values(Some("env"), Some("v=env"));
        let cli = Config { paths: vec![PathBuf::from("cli")], debug: true, ..Config::default() };

        let merged = Config::new().overlay(file).overlay(env).overlay(cli);
        let paths: Vec<_> = merged.search_paths().iter().map(Path::to_path_buf).collect();
        assert_eq!(
            paths,
            ["cli", "env", "file", "."].map(PathBuf::from).to_vec()
        );
        assert_eq!(merged.variables["v"], "env");
        assert_eq!(merged.extension(), ".f");
        assert!(merged.debug);
    }

    #[test]
    fn defaults() {
        let config = Config::new();
        assert_eq!(config.extension(), DEFAULT_EXTENSION);
        assert_eq!(config.search_paths().len(), 1);
    }
}
