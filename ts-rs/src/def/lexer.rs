//! Line lexer for unit source.
//!
//! Statements are newline-terminated, so source is split into lines first and
//! each line is tokenized on its own.  Keywords come out as [`Token::Ident`];
//! the parser decides what they mean by position.

// ── Token ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Int(i64),
    Real(f64),
    Str(String),
    Ident(String),

    // Arithmetic
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,

    // Comparison
    Eq, // ==
    Ne, // ~=
    Lt,
    Le,
    Gt,
    Ge,

    // Misc
    Assign,
    Colon,
    Comma,
    LParen,
    RParen,
    /// Unterminated string literal.
    Unterminated,
    /// Unrecognised input byte, reported as a syntax error by the parser.
    Unknown(char),
    Eof,
}

impl Token {
    pub fn describe(&self) -> String {
        match self {
            Token::Int(n) => n.to_string(),
            Token::Real(r) => r.to_string(),
            Token::Str(s) => format!("\"{s}\""),
            Token::Ident(s) => s.clone(),
            Token::Plus => "+".into(),
            Token::Minus => "-".into(),
            Token::Star => "*".into(),
            Token::Slash => "/".into(),
            Token::Percent => "%".into(),
            Token::Caret => "^".into(),
            Token::Eq => "==".into(),
            Token::Ne => "~=".into(),
            Token::Lt => "<".into(),
            Token::Le => "<=".into(),
            Token::Gt => ">".into(),
            Token::Ge => ">=".into(),
            Token::Assign => "=".into(),
            Token::Colon => ":".into(),
            Token::Comma => ",".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::Unterminated => "unterminated string".into(),
            Token::Unknown(c) => c.to_string(),
            Token::Eof => "end of line".into(),
        }
    }
}

// ── Lexer ─────────────────────────────────────────────────────────────────────

struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Lexer { src: src.as_bytes(), pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<u8> {
        self.src.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.src.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn eat(&mut self, ch: u8) -> bool {
        if self.peek() == Some(ch) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r')) {
            self.pos += 1;
        }
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) {
        while self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
    }

    fn read_number(&mut self, start: usize) -> Token {
        self.take_while(|c| c.is_ascii_digit());
        let mut is_real = false;
        if self.peek() == Some(b'.') && self.peek2().is_some_and(|c| c.is_ascii_digit()) {
            is_real = true;
            self.pos += 1;
            self.take_while(|c| c.is_ascii_digit());
        }
        let text = String::from_utf8_lossy(&self.src[start..self.pos]);
        if is_real {
            Token::Real(text.parse().unwrap_or(0.0))
        } else {
            match text.parse() {
                Ok(n) => Token::Int(n),
                // too large for an int; keep it as a real
                Err(_) => Token::Real(text.parse().unwrap_or(f64::INFINITY)),
            }
        }
    }

    fn read_string(&mut self) -> Token {
        let mut bytes = Vec::new();
        loop {
            match self.advance() {
                None => return Token::Unterminated,
                Some(b'"') => break,
                Some(b'\\') => match self.advance() {
                    Some(b'n') => bytes.push(b'\n'),
                    Some(b't') => bytes.push(b'\t'),
                    Some(b'a') => bytes.push(0x07),
                    Some(c) => bytes.push(c),
                    None => return Token::Unterminated,
                },
                Some(c) => bytes.push(c),
            }
        }
        Token::Str(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn read_ident(&mut self, start: usize) -> Token {
        self.take_while(|c| c.is_ascii_alphanumeric() || c == b'_');
        Token::Ident(String::from_utf8_lossy(&self.src[start..self.pos]).into_owned())
    }

    fn next_token(&mut self) -> Token {
        self.skip_ws();
        let start = self.pos;
        let ch = match self.advance() {
            None | Some(b'#') => return Token::Eof,
            Some(c) => c,
        };

        match ch {
            b'0'..=b'9' => self.read_number(start),
            b'"' => self.read_string(),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.read_ident(start),
            b'+' => Token::Plus,
            b'-' => Token::Minus,
            b'*' => Token::Star,
            b'/' => Token::Slash,
            b'%' => Token::Percent,
            b'^' => Token::Caret,
            b'~' if self.eat(b'=') => Token::Ne,
            b'<' => {
                if self.eat(b'=') {
                    Token::Le
                } else {
                    Token::Lt
                }
            }
            b'>' => {
                if self.eat(b'=') {
                    Token::Ge
                } else {
                    Token::Gt
                }
            }
            b'=' => {
                if self.eat(b'=') {
                    Token::Eq
                } else {
                    Token::Assign
                }
            }
            b':' => Token::Colon,
            b',' => Token::Comma,
            b'(' => Token::LParen,
            b')' => Token::RParen,
            c if c.is_ascii() => Token::Unknown(c as char),
            _ => {
                // report the whole UTF-8 character, not its first byte
                let rest = String::from_utf8_lossy(&self.src[start..]);
                let c = rest.chars().next().unwrap_or('?');
                self.pos = start + c.len_utf8().max(1);
                Token::Unknown(c)
            }
        }
    }

    fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let t = self.next_token();
            let done = matches!(t, Token::Eof | Token::Unterminated);
            tokens.push(t);
            if done {
                break;
            }
        }
        if tokens.last() != Some(&Token::Eof) {
            tokens.push(Token::Eof);
        }
        tokens
    }
}

/// Tokenize one source line.  The result always ends with [`Token::Eof`];
/// a `#` comment ends the line.
pub fn tokenize_line(line: &str) -> Vec<Token> {
    Lexer::new(line).tokenize()
}

/// Tokenize `src` line by line, dropping blank and comment-only lines.
/// Each entry carries its 1-based line number.
pub fn tokenize_source(src: &str) -> Vec<(u32, Vec<Token>)> {
    src.lines()
        .enumerate()
        .filter_map(|(i, line)| {
            let tokens = tokenize_line(line);
            if tokens.len() == 1 {
                None
            } else {
                Some((u32::try_from(i + 1).unwrap_or(u32::MAX), tokens))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers() {
        assert_eq!(tokenize_line("42"), vec![Token::Int(42), Token::Eof]);
        assert_eq!(tokenize_line("2.5"), vec![Token::Real(2.5), Token::Eof]);
        // "1." is an int followed by an unknown dot
        assert_eq!(tokenize_line("1."), vec![Token::Int(1), Token::Unknown('.'), Token::Eof]);
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            tokenize_line(r#""a\tb\"c\\""#),
            vec![Token::Str("a\tb\"c\\".into()), Token::Eof]
        );
        assert_eq!(tokenize_line("\"open"), vec![Token::Unterminated, Token::Eof]);
    }

    #[test]
    fn operators() {
        assert_eq!(
            tokenize_line("a == b ~= c <= d >= e = f"),
            vec![
                Token::Ident("a".into()),
                Token::Eq,
                Token::Ident("b".into()),
                Token::Ne,
                Token::Ident("c".into()),
                Token::Le,
                Token::Ident("d".into()),
                Token::Ge,
                Token::Ident("e".into()),
                Token::Assign,
                Token::Ident("f".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn comment_ends_line() {
        assert_eq!(tokenize_line("x = 1 # set x"), vec![
            Token::Ident("x".into()),
            Token::Assign,
            Token::Int(1),
            Token::Eof,
        ]);
        assert_eq!(tokenize_line("\"#\""), vec![Token::Str("#".into()), Token::Eof]);
    }

    #[test]
    fn source_skips_blank_lines() {
        let lines = tokenize_source("\n# header\nx = 1\n\n  y()\n");
        let numbers: Vec<u32> = lines.iter().map(|(n, _)| *n).collect();
        assert_eq!(numbers, vec![3, 5]);
    }

    #[test]
    fn lone_tilde_is_unknown() {
        assert_eq!(tokenize_line("~"), vec![Token::Unknown('~'), Token::Eof]);
    }
}
