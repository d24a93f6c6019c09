//! Argument handling for `tsi`.
//!
//!   tsi [-I<path>]... [-v<name>=<value>]... [-f<file>] [-cdDy] "function(args)"

use std::path::PathBuf;

use crate::config::{self, Config};
use crate::ffi::FfiVariables;

pub const USAGE: &str = "Usage: tsi [-I<path>]... [-v<name>=<value>]... [-f<file>] [-cdDy] \"function(args)\"";

/// Help text printed by `--help`.
pub const HELP: &str = "\
Options:
  -I<path>          add a unit search path (searched in the order given)
  -v<name>=<value>  set a plugin variable
  -f<file>          read configuration from <file> instead of tsirc
  -f                skip the configuration file
  -c                compile only
  -d                step through the program in the debugger
  -D                debug logging
  -y                run even if compilation produced warnings
  --help            show this help";

// ── Public types ──────────────────────────────────────────────────────────────

/// What `tsi` was asked to do.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// Search paths (`-I<path>`), in priority order.
    pub includes: Vec<PathBuf>,
    /// Plugin variables (`-v<name>=<value>`).
    pub variables: Vec<(String, String)>,
    pub config: ConfigFile,
    /// Compile only (`-c`).
    pub compile_only: bool,
    /// Run under the debugger (`-d`).
    pub debug: bool,
    /// Debug logging (`-D`).
    pub log_debug: bool,
    /// Run despite warnings (`-y`).
    pub ignore_warnings: bool,
    /// `--help`.
    pub help: bool,
    /// The top-level invocation, e.g. `main(1, 2)`.
    pub invocation: Option<String>,
}

/// How to choose the config file.
#[derive(Debug, Default, PartialEq, Eq)]
pub enum ConfigFile {
    /// `tsirc` in the platform config directory (default).
    #[default]
    Search,
    /// `-f` with no file argument: skip the config file.
    Skip,
    /// `-f<file>`: read settings from `<file>` only.
    Explicit(PathBuf),
}

impl CliArgs {
    /// The command-line configuration layer.
    pub fn config_layer(&self) -> Config {
        Config {
            paths: self.includes.clone(),
            extension: None,
            variables: self.variables.iter().cloned().collect(),
            debug: self.debug,
            compile_only: self.compile_only,
            ignore_warnings: self.ignore_warnings,
            log_debug: self.log_debug,
        }
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Arguments of the running process, minus the program name.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(raw.get(1..).unwrap_or_default())
}

/// Arguments after the program name.  Exactly one invocation is required
/// unless `--help` is given.
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut positional: Vec<String> = Vec::new();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        if arg == "--help" {
            args.help = true;
            i += 1;
            continue;
        }

        // Everything after `--` is positional.
        if arg == "--" {
            positional.extend(argv[i + 1..].iter().cloned());
            break;
        }

        if !arg.starts_with('-') || arg == "-" {
            positional.push(arg.to_owned());
            i += 1;
            continue;
        }

        // Single-letter flags may be bundled, as in `-cy`.
        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            match chars[j] {
                'c' => args.compile_only = true,
                'd' => args.debug = true,
                'D' => args.log_debug = true,
                'y' => args.ignore_warnings = true,

                // -f, -f<file>, -f <file>
                'f' => {
                    if j + 1 < chars.len() {
                        let file: String = chars[j + 1..].iter().collect();
                        args.config = ConfigFile::Explicit(PathBuf::from(file));
                        j = chars.len();
                    } else if i + 1 < argv.len() && !argv[i + 1].starts_with('-') && i + 2 < argv.len() {
                        // Separate `-f <file>`, as long as an invocation follows.
                        i += 1;
                        args.config = ConfigFile::Explicit(PathBuf::from(&argv[i]));
                    } else {
                        args.config = ConfigFile::Skip;
                    }
                }

                // -I<path>
                'I' => {
                    let dir = value(&chars, &mut j, argv, &mut i, "-I requires a directory argument")?;
                    args.includes.push(PathBuf::from(dir));
                }

                // -v<name>=<value>
                'v' => {
                    let assignment = value(&chars, &mut j, argv, &mut i, "-v requires <name>=<value>")?;
                    let mut variables = FfiVariables::new();
                    config::parse_variable(&assignment, &mut variables).map_err(|e| format!("-v: {e}"))?;
                    args.variables.extend(variables);
                }

                c => return Err(format!("unknown option: -{c}")),
            }
            j += 1;
        }
        i += 1;
    }

    match positional.len() {
        0 if args.help => {}
        0 => return Err("missing function invocation".to_owned()),
        1 => args.invocation = positional.pop(),
        n => return Err(format!("too many arguments ({n})")),
    }

    Ok(args)
}

/// Value of a flag: the rest of this argument, or the next argument.
fn value(chars: &[char], j: &mut usize, argv: &[String], i: &mut usize, missing: &str) -> Result<String, String> {
    if *j + 1 < chars.len() {
        let s: String = chars[*j + 1..].iter().collect();
        *j = chars.len();
        Ok(s)
    } else if *i + 1 < argv.len() {
        *i += 1;
        Ok(argv[*i].clone())
    } else {
        Err(missing.to_owned())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|&s| s.to_owned()).collect()
    }

    #[test]
    fn invocation_only() {
        let a = parse_argv(&argv(&["main(1, 2)"])).unwrap();
        assert_eq!(a.invocation.as_deref(), Some("main(1, 2)"));
        assert_eq!(a.config, ConfigFile::Search);
        assert!(!a.debug && !a.compile_only);
    }

    #[test]
    fn missing_invocation() {
        assert!(parse_argv(&argv(&["-c"])).is_err());
    }

    #[test]
    fn help_needs_no_invocation() {
        assert!(parse_argv(&argv(&["--help"])).unwrap().help);
    }

    #[test]
    fn combined_bool_flags() {
        let a = parse_argv(&argv(&["-cdDy", "f()"])).unwrap();
        assert!(a.compile_only && a.debug && a.log_debug && a.ignore_warnings);
    }

    #[test]
    fn includes_keep_order() {
        let a = parse_argv(&argv(&["-I/a", "-I", "/b", "f()"])).unwrap();
        assert_eq!(a.includes, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        assert_eq!(a.config_layer().paths, a.includes);
    }

    #[test]
    fn variables() {
        let a = parse_argv(&argv(&["-vport=COM1", "-v", "speed=9600", "f()"])).unwrap();
        assert_eq!(
            a.variables,
            vec![("port".to_owned(), "COM1".to_owned()), ("speed".to_owned(), "9600".to_owned())]
        );
        assert!(parse_argv(&argv(&["-vnoequals", "f()"])).is_err());
    }

    #[test]
    fn config_file_forms() {
        let a = parse_argv(&argv(&["-fmy.rc", "f()"])).unwrap();
        assert_eq!(a.config, ConfigFile::Explicit(PathBuf::from("my.rc")));
        let a = parse_argv(&argv(&["-f", "my.rc", "f()"])).unwrap();
        assert_eq!(a.config, ConfigFile::Explicit(PathBuf::from("my.rc")));
        let a = parse_argv(&argv(&["-f", "f()"])).unwrap();
        assert_eq!(a.config, ConfigFile::Skip);
        assert_eq!(a.invocation.as_deref(), Some("f()"));
    }

    #[test]
    fn flag_requires_value() {
        assert!(parse_argv(&argv(&["-I"])).is_err());
    }

    #[test]
    fn too_many_positional() {
        assert!(parse_argv(&argv(&["a()", "b()"])).is_err());
    }

    #[test]
    fn unknown_flag() {
        assert!(parse_argv(&argv(&["-z", "f()"])).is_err());
    }
}
