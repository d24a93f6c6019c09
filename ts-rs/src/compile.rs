//! Compiling a top-level invocation into a resolved module.
//!
//! The invocation text (`main(1, 2)`) becomes the body of a synthetic unit,
//! [`MODULE_MAIN`].  Resolving it pulls in every unit it reaches, each read
//! from the first `<dir>/<name><ext>` found on the search path.

use std::path::{Path, PathBuf};

use crate::def::{
    construct_unit_from_file, construct_unit_from_string, resolve_unit, DefErrorList, Module,
    ObjectId, Unit,
};
use crate::error::{Error, Result};

/// Name of the synthetic unit holding the compiled invocation.
pub const MODULE_MAIN: &str = "_module_main";

/// Name of the output variable when the invocation's value is captured.
pub const FORWARD_OUTPUT: &str = "forward_output";

// ── Search paths ──────────────────────────────────────────────────────────────

/// Ordered list of directories searched for unit files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathCollection {
    dirs: Vec<PathBuf>,
}

impl PathCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, dir: impl Into<PathBuf>) {
        self.dirs.push(dir.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.dirs.iter().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }
}

impl<P: Into<PathBuf>> FromIterator<P> for PathCollection {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        PathCollection { dirs: iter.into_iter().map(Into::into).collect() }
    }
}

/// First existing `<dir>/<name><ext>` on `paths`.
pub fn find_unit_file(name: &str, ext: &str, paths: &PathCollection) -> Option<PathBuf> {
    let file = format!("{name}{ext}");
    paths.iter().map(|dir| dir.join(&file)).find(|p| p.is_file())
}

// ── Compilation ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileOptions {
    /// Return the invocation's value as the module's output.
    pub capture_output: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compiled {
    pub main: ObjectId,
    pub warnings: usize,
}

/// Compile `invocation` into `module`.
///
/// `notify` is told the name of every unit looked up on the search path.
/// Diagnostics go to `errors`; the result is an error if any of them is one.
pub fn compile_unit(
    invocation: &str,
    options: CompileOptions,
    paths: &PathCollection,
    ext: &str,
    notify: &mut dyn FnMut(&str),
    errors: &mut DefErrorList,
    module: &mut Module,
) -> Result<Compiled> {
    if module.find_unit(MODULE_MAIN, &[]).is_some() {
        return Err(Error::ModuleMainNotUnique(MODULE_MAIN.to_owned()));
    }
    let text = if options.capture_output {
        format!("output {FORWARD_OUTPUT} = {invocation}\n")
    } else {
        format!("{invocation}\n")
    };
    let unit = construct_unit_from_string(&text, MODULE_MAIN, errors)?;
    let main = module.add_unit(unit);

    let mut lookup = |name: &str, errors: &mut DefErrorList| -> Option<Unit> {
        notify(name);
        let path = find_unit_file(name, ext, paths)?;
        tracing::debug!(unit = name, path = %path.display(), "loading unit file");
        construct_unit_from_file(&path, name, errors).ok()
    };
    let resolved = resolve_unit(module, main, &mut lookup, errors)?;
    Ok(Compiled { main, warnings: resolved.warnings })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::def::PrimitiveType;
    use std::fs;

    fn tree(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, text) in files {
            fs::write(dir.path().join(name), text).unwrap();
        }
        dir
    }

    #[test]
    fn first_path_wins() {
        let a = tree(&[("f.ts", "x = 1\n")]);
        let b = tree(&[("f.ts", "x = 2\n"), ("g.ts", "y = 1\n")]);
        let paths: PathCollection = [a.path(), b.path()].into_iter().collect();
        assert_eq!(find_unit_file("f", ".ts", &paths), Some(a.path().join("f.ts")));
        assert_eq!(find_unit_file("g", ".ts", &paths), Some(b.path().join("g.ts")));
        assert_eq!(find_unit_file("h", ".ts", &paths), None);
    }

    #[test]
    fn compiles_invocation_and_loads_lazily() {
        let dir = tree(&[
            ("add.ts", "input a:int, b:int\noutput r = a + b\n"),
            ("unused.ts", "x = 1\n"),
        ]);
        let paths: PathCollection = [dir.path()].into_iter().collect();
        let mut module = Module::new();
        let mut errors = DefErrorList::new();
        let mut seen = Vec::new();
        let compiled = compile_unit(
            "add(1, 2)",
            CompileOptions { capture_output: true },
            &paths,
            ".ts",
            &mut |name: &str| seen.push(name.to_owned()),
            &mut errors,
            &mut module,
        )
        .unwrap();
        assert_eq!(seen, vec!["add".to_string()]);
        assert_eq!(compiled.warnings, 0);
        assert_eq!(module.object(compiled.main).unwrap().output_type(), PrimitiveType::Int);
        assert!(module.find_unit("unused", &[]).is_none());
    }

    #[test]
    fn missing_unit_fails_to_resolve() {
        let paths = PathCollection::new();
        let mut module = Module::new();
        let mut errors = DefErrorList::new();
        let err = compile_unit(
            "nowhere()",
            CompileOptions::default(),
            &paths,
            ".ts",
            &mut |_: &str| {},
            &mut errors,
            &mut module,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Resolve(_)));
        assert_eq!(errors.error_count(), 1);
    }

    #[test]
    fn main_must_be_unique() {
        let paths = PathCollection::new();
        let mut module = Module::new();
        let mut errors = DefErrorList::new();
        let mut notify = |_: &str| {};
        compile_unit("x = 1", CompileOptions::default(), &paths, ".ts", &mut notify, &mut errors, &mut module)
            .unwrap();
        let err = compile_unit("x = 2", CompileOptions::default(), &paths, ".ts", &mut notify, &mut errors, &mut module)
            .unwrap_err();
        assert!(matches!(err, Error::ModuleMainNotUnique(_)));
    }
}
