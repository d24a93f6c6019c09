//! `text` group: string length and regular expressions.
//!
//! Compiled patterns are cached in the group data for the life of the run.

use std::collections::HashMap;
use std::sync::Arc;

use regex::{Regex, RegexBuilder};

use crate::def::PrimitiveType::{Bool, Int, String as Str};
use crate::ffi::{FfiError, FfiGroup, FfiVariables, FunctionDefinition, GroupData, GroupHooks, Invocation};
use crate::interp::Value;

use super::get_str;

/// Upper bound on the compiled size of one pattern.
const REGEX_SIZE_LIMIT: usize = 1 << 20;

#[derive(Default)]
pub struct TextState {
    patterns: HashMap<String, Regex>,
}

impl TextState {
    fn compile(&mut self, pattern: &str) -> Result<&Regex, FfiError> {
        if !self.patterns.contains_key(pattern) {
            let regex = RegexBuilder::new(pattern)
                .size_limit(REGEX_SIZE_LIMIT)
                .build()
                .map_err(|e| FfiError::new(format!("bad pattern '{pattern}': {e}")))?;
            self.patterns.insert(pattern.to_owned(), regex);
        }
        self.patterns
            .get(pattern)
            .ok_or_else(|| FfiError::new("pattern cache lost an entry"))
    }
}

struct TextHooks;

impl GroupHooks for TextHooks {
    fn begin(&self, _variables: &FfiVariables) -> Result<GroupData, FfiError> {
        Ok(Box::new(TextState::default()))
    }
}

pub fn group() -> FfiGroup {
    FfiGroup::new(
        "text",
        vec![
            FunctionDefinition::function("length", &[Str], Int, |_, args| {
                Ok(Some(Value::Int(get_str(args, 0, "length")?.chars().count() as i64)))
            })
            .with_doc("Number of characters in a string."),
            FunctionDefinition::function("match", &[Str, Str], Bool, text_match)
                .with_doc("Whether the pattern matches anywhere in the text."),
            FunctionDefinition::function("replace", &[Str, Str, Str], Str, text_replace)
                .with_doc("Replace every match of the pattern in the text."),
        ],
    )
    .with_hooks(Arc::new(TextHooks))
}

fn text_match(inv: &mut Invocation<'_>, args: &[Value]) -> Result<Option<Value>, FfiError> {
    let pattern = get_str(args, 0, "match")?;
    let text = get_str(args, 1, "match")?;
    let regex = inv.group::<TextState>()?.compile(&pattern)?;
    Ok(Some(Value::Bool(regex.is_match(&text))))
}

fn text_replace(inv: &mut Invocation<'_>, args: &[Value]) -> Result<Option<Value>, FfiError> {
    let pattern = get_str(args, 0, "replace")?;
    let text = get_str(args, 1, "replace")?;
    let with = get_str(args, 2, "replace")?;
    let regex = inv.group::<TextState>()?.compile(&pattern)?;
    Ok(Some(Value::Str(regex.replace_all(&text, with.as_str()).into_owned())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stdlib::testing::call;

    fn s(text: &str) -> Value {
        Value::Str(text.into())
    }

    #[test]
    fn length_counts_chars() {
        let r = call(&group(), "length", &[Str], &[s("héllo")], &mut ()).unwrap();
        assert_eq!(r, Some(Value::Int(5)));
    }

    #[test]
    fn match_and_cache() {
        let mut state = TextState::default();
        let r = call(&group(), "match", &[Str, Str], &[s("^a+b$"), s("aaab")], &mut state).unwrap();
        assert_eq!(r, Some(Value::Bool(true)));
        let r = call(&group(), "match", &[Str, Str], &[s("^a+b$"), s("ba")], &mut state).unwrap();
        assert_eq!(r, Some(Value::Bool(false)));
        assert_eq!(state.patterns.len(), 1);
    }

    #[test]
    fn replace_uses_captures() {
        let mut state = TextState::default();
        let r = call(
            &group(),
            "replace",
            &[Str, Str, Str],
            &[s(r"(\w+)@(\w+)"), s("me@host you@there"), s("$2:$1")],
            &mut state,
        )
        .unwrap();
        assert_eq!(r, Some(s("host:me there:you")));
    }

    #[test]
    fn bad_pattern_is_an_ffi_error() {
        let mut state = TextState::default();
        let err = call(&group(), "match", &[Str, Str], &[s("("), s("x")], &mut state).unwrap_err();
        assert!(err.message.starts_with("bad pattern '('"));
    }
}
