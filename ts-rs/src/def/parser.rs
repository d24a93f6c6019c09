//! Recursive-descent parser producing a [`Unit`].
//!
//! Input is a list of tokenized lines.  Block statements (`if`, `loop`,
//! `while`, `for`, `action`) open a block that runs until its terminating
//! keyword line.  A syntax error is recorded and parsing resumes on the next
//! line; the body of a block whose header failed is still consumed so its
//! `end` does not close the enclosing block.

use std::sync::Arc;

use super::ast::*;
use super::deferror::{DefErrorKind, DefErrorList};
use super::lexer::{tokenize_source, Token};
use super::types::PrimitiveType;

const KEYWORDS: &[&str] = &[
    "action", "and", "break", "continue", "downto", "else", "elseif", "end", "false", "finish", "for",
    "if", "input", "loop", "not", "or", "output", "to", "true", "while",
];

fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

type PResult<T> = Result<T, String>;

pub(crate) struct Parser<'e> {
    lines: Vec<(Location, Vec<Token>)>,
    line: usize,
    pos: usize,
    unit_name: String,
    errors: &'e mut DefErrorList,
    syntax_errors: usize,
}

impl<'e> Parser<'e> {
    pub(crate) fn new(src: &str, unit_name: &str, errors: &'e mut DefErrorList) -> Self {
        Parser {
            lines: tokenize_source(src),
            line: 0,
            pos: 0,
            unit_name: unit_name.to_owned(),
            errors,
            syntax_errors: 0,
        }
    }

    // ── Cursor ────────────────────────────────────────────────────────────────

    fn at_end(&self) -> bool {
        self.line >= self.lines.len()
    }

    fn location(&self) -> Location {
        self.lines
            .get(self.line)
            .or_else(|| self.lines.last())
            .map_or(1, |(n, _)| *n)
    }

    fn peek(&self) -> &Token {
        self.lines
            .get(self.line)
            .and_then(|(_, tokens)| tokens.get(self.pos))
            .unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let t = self.peek().clone();
        if t != Token::Eof {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == expected {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Token::Ident(w) if w == keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// First token of the current line, when it is a keyword.
    fn line_keyword(&self) -> Option<&str> {
        match self.lines.get(self.line).and_then(|(_, t)| t.first()) {
            Some(Token::Ident(word)) if is_keyword(word) => Some(word.as_str()),
            _ => None,
        }
    }

    fn next_line(&mut self) {
        self.line += 1;
        self.pos = 0;
    }

    fn expect(&mut self, expected: &Token) -> PResult<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(format!("expected '{}' but found '{}'", expected.describe(), self.peek().describe()))
        }
    }

    fn expect_end_of_line(&mut self) -> PResult<()> {
        match self.peek() {
            Token::Eof => Ok(()),
            other => Err(format!("unexpected '{}'", other.describe())),
        }
    }

    fn expect_name(&mut self) -> PResult<String> {
        match self.advance() {
            Token::Ident(name) if !is_keyword(&name) => Ok(name),
            Token::Ident(name) => Err(format!("'{name}' is a reserved word")),
            other => Err(format!("expected a name but found '{}'", other.describe())),
        }
    }

    fn syntax_error(&mut self, location: Location, message: String) {
        self.syntax_errors += 1;
        self.errors.error(&self.unit_name, location, DefErrorKind::Syntax(message));
    }

    // ── Unit ──────────────────────────────────────────────────────────────────

    pub(crate) fn parse_unit(mut self, src: &str) -> (Unit, usize) {
        let mut unit = Unit::new(self.unit_name.clone());
        unit.source = Arc::from(src);
        let mut global = Block::new(0);
        let mut after_exit: Option<&'static str> = None;

        while !self.at_end() {
            let location = self.location();
            let keyword = self.line_keyword().map(str::to_owned);
            match keyword.as_deref() {
                Some("input") => {
                    let result = self.parse_input(&unit);
                    self.finish_line(location, result.map(|input| unit.input = input));
                }
                Some("output") => {
                    let result = self.parse_output(&unit, location);
                    self.finish_line(location, result.map(|output| unit.output = Some(output)));
                }
                Some("action") => {
                    if let Some(action) = self.parse_action(location) {
                        unit.actions.push(action);
                    }
                }
                Some(word @ ("end" | "else" | "elseif")) => {
                    let message = format!("'{word}' without an open block");
                    self.syntax_error(location, message);
                    self.next_line();
                }
                _ => self.parse_statement_into(&mut global, &mut after_exit),
            }
        }

        unit.global_block = global;
        let count = self.syntax_errors;
        (unit, count)
    }

    /// Check the rest of the line, record any error, and move on.
    fn finish_line(&mut self, location: Location, result: PResult<()>) {
        if let Err(message) = result.and_then(|()| self.expect_end_of_line()) {
            self.syntax_error(location, message);
        }
        self.next_line();
    }

    fn parse_input(&mut self, unit: &Unit) -> PResult<Vec<Input>> {
        self.advance();
        if !unit.input.is_empty() {
            return Err("'input' may only appear once".into());
        }
        let mut input = Vec::new();
        loop {
            let name = self.expect_name()?;
            let declared = if self.eat(&Token::Colon) {
                match self.advance() {
                    Token::Ident(ty) => Some(
                        PrimitiveType::from_name(&ty).ok_or_else(|| format!("unknown type '{ty}'"))?,
                    ),
                    other => return Err(format!("expected a type but found '{}'", other.describe())),
                }
            } else {
                None
            };
            input.push(Input { name, declared });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(input)
    }

    fn parse_output(&mut self, unit: &Unit, location: Location) -> PResult<Output> {
        self.advance();
        if unit.output.is_some() {
            return Err("'output' may only appear once".into());
        }
        let name = self.expect_name()?;
        let initializer = if self.eat(&Token::Assign) { Some(self.parse_exp()?) } else { None };
        Ok(Output {
            variable: VarRef::new(name),
            initializer,
            location,
            ty: PrimitiveType::Delayed,
        })
    }

    fn parse_action(&mut self, location: Location) -> Option<Action> {
        self.advance();
        let header = self.parse_call_list().and_then(|calls| {
            self.expect_end_of_line()?;
            Ok(calls)
        });
        self.next_line();
        let block = self.parse_block(1, &["end"], location);
        match header {
            Ok(triggers) => Some(Action { triggers, location, block: block?.0 }),
            Err(message) => {
                self.syntax_error(location, message);
                None
            }
        }
    }

    fn parse_call_list(&mut self) -> PResult<Vec<FunctionCall>> {
        let mut calls = Vec::new();
        loop {
            let location = self.location();
            let name = self.expect_name()?;
            if self.peek() != &Token::LParen {
                return Err(format!("expected a call to '{name}'"));
            }
            calls.push(self.parse_call(name, location)?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(calls)
    }

    // ── Blocks and statements ─────────────────────────────────────────────────

    /// Parse statements until a line starting with one of `terminators`.
    /// An `end` line is consumed; any other terminator line is left current.
    /// `None` if input ran out first.
    fn parse_block(
        &mut self,
        depth: u32,
        terminators: &[&'static str],
        opened_at: Location,
    ) -> Option<(Block, &'static str)> {
        let mut block = Block::new(depth);
        let mut after_exit: Option<&'static str> = None;
        loop {
            if self.at_end() {
                let message = format!("missing '{}'", terminators.last().copied().unwrap_or("end"));
                self.syntax_error(opened_at, message);
                return None;
            }
            let keyword = self.line_keyword().map(str::to_owned);
            if let Some(word) = keyword {
                if let Some(&terminator) = terminators.iter().find(|t| **t == word) {
                    if terminator == "end" {
                        let location = self.location();
                        self.advance();
                        self.finish_line(location, Ok(()));
                    }
                    return Some((block, terminator));
                }
                if matches!(word.as_str(), "input" | "output" | "action") {
                    let location = self.location();
                    self.syntax_error(location, format!("'{word}' is only allowed at the top level"));
                    self.next_line();
                    continue;
                }
            }
            self.parse_statement_into(&mut block, &mut after_exit);
        }
    }

    /// Parse the statement at the current line and append it to `block`.
    fn parse_statement_into(&mut self, block: &mut Block, after_exit: &mut Option<&'static str>) {
        let location = self.location();
        let statements = self.parse_statement(block.depth);
        if statements.is_empty() {
            return;
        }
        if let Some(word) = after_exit.take() {
            self.errors.warning(&self.unit_name, location, DefErrorKind::UnreachableCode(word.into()));
        }
        for statement in statements {
            *after_exit = match statement.kind {
                StatementKind::Break => Some("break"),
                StatementKind::Continue => Some("continue"),
                StatementKind::Finish => Some("finish"),
                _ => None,
            };
            block.statements.push(statement);
        }
    }

    fn parse_statement(&mut self, depth: u32) -> Vec<Statement> {
        let location = self.location();
        let keyword = self.line_keyword().map(str::to_owned);
        match keyword.as_deref() {
            Some("if") => self.parse_if(depth, location),
            Some("loop" | "while" | "for") => self.parse_loop(depth, location).into_iter().collect(),
            Some(word @ ("break" | "continue" | "finish")) => {
                let kind = match word {
                    "break" => StatementKind::Break,
                    "continue" => StatementKind::Continue,
                    _ => StatementKind::Finish,
                };
                self.advance();
                self.simple_statement(location, Ok(kind))
            }
            _ => {
                let kind = self.parse_simple();
                self.simple_statement(location, kind)
            }
        }
    }

    fn simple_statement(&mut self, location: Location, kind: PResult<StatementKind>) -> Vec<Statement> {
        let result = kind.and_then(|kind| {
            self.expect_end_of_line()?;
            Ok(kind)
        });
        self.next_line();
        match result {
            Ok(kind) => vec![Statement { location, kind }],
            Err(message) => {
                self.syntax_error(location, message);
                Vec::new()
            }
        }
    }

    /// Assignment or call statement.
    fn parse_simple(&mut self) -> PResult<StatementKind> {
        let location = self.location();
        let name = self.expect_name()?;
        match self.peek() {
            Token::Assign => {
                self.advance();
                let exp = self.parse_exp()?;
                Ok(StatementKind::Assignment(Assignment {
                    variable: VarRef::new(name),
                    exp,
                    ty: PrimitiveType::Delayed,
                }))
            }
            Token::LParen => Ok(StatementKind::FunctionCall(self.parse_call(name, location)?)),
            other => Err(format!("expected '=' or '(' after '{name}' but found '{}'", other.describe())),
        }
    }

    fn parse_if(&mut self, depth: u32, location: Location) -> Vec<Statement> {
        let mut statements = Vec::new();
        let mut ok = true;
        let mut else_flag = false;
        let mut link_location = location;
        let mut seen_else = false;

        loop {
            let keyword = self.line_keyword().map(str::to_owned);
            self.advance();
            let condition = match keyword.as_deref() {
                Some("else") => {
                    seen_else = true;
                    Ok(None)
                }
                _ => self.parse_exp().map(Some),
            };
            let condition = condition.and_then(|c| {
                self.expect_end_of_line()?;
                Ok(c)
            });
            self.next_line();
            let terminators: &[&'static str] =
                if seen_else { &["end"] } else { &["elseif", "else", "end"] };
            let block = self.parse_block(depth + 1, terminators, link_location);

            let terminator = match (condition, block) {
                (Ok(condition), Some((block, terminator))) => {
                    statements.push(Statement {
                        location: link_location,
                        kind: StatementKind::If(IfStatement { condition, else_flag, block }),
                    });
                    terminator
                }
                (Err(message), block) => {
                    self.syntax_error(link_location, message);
                    ok = false;
                    match block {
                        Some((_, terminator)) => terminator,
                        None => break,
                    }
                }
                (Ok(_), None) => {
                    ok = false;
                    break;
                }
            };

            if terminator == "end" {
                break;
            }
            else_flag = true;
            link_location = self.location();
        }

        if ok {
            statements
        } else {
            Vec::new()
        }
    }

    fn parse_loop(&mut self, depth: u32, location: Location) -> Option<Statement> {
        let header = match self.line_keyword() {
            Some("loop") => {
                self.advance();
                Ok(LoopKind::While(None))
            }
            Some("while") => {
                self.advance();
                self.parse_exp().map(|c| LoopKind::While(Some(c)))
            }
            _ => {
                self.advance();
                self.parse_for_header().map(LoopKind::For)
            }
        };
        let header = header.and_then(|h| {
            self.expect_end_of_line()?;
            Ok(h)
        });
        self.next_line();
        let block = self.parse_block(depth + 1, &["end"], location);
        match header {
            Ok(kind) => Some(Statement {
                location,
                kind: StatementKind::Loop(LoopStatement { kind, block: block?.0 }),
            }),
            Err(message) => {
                self.syntax_error(location, message);
                None
            }
        }
    }

    fn parse_for_header(&mut self) -> PResult<ForLoop> {
        let name = self.expect_name()?;
        let initial = if self.eat(&Token::Assign) { Some(self.parse_exp()?) } else { None };
        let direction = if self.eat_keyword("to") {
            StepDirection::Up
        } else if self.eat_keyword("downto") {
            StepDirection::Down
        } else {
            return Err(format!("expected 'to' or 'downto' but found '{}'", self.peek().describe()));
        };
        let to = self.parse_exp()?;
        Ok(ForLoop {
            variable: VarRef::new(name),
            initial,
            direction,
            to,
            ty: PrimitiveType::Delayed,
        })
    }

    // ── Expressions ───────────────────────────────────────────────────────────

    pub(crate) fn parse_exp(&mut self) -> PResult<Exp> {
        let mut operands = vec![self.parse_logical_operand()?];
        let mut ops = Vec::new();
        loop {
            let op = if self.eat_keyword("and") {
                LogicalOp::And
            } else if self.eat_keyword("or") {
                LogicalOp::Or
            } else {
                break;
            };
            ops.push(op);
            operands.push(self.parse_logical_operand()?);
        }
        if ops.is_empty() && !operands[0].negate {
            if let Some(only) = operands.pop() {
                return Ok(only.exp);
            }
        }
        Ok(Exp::Logical(LogicalExp { operands, ops }))
    }

    fn parse_logical_operand(&mut self) -> PResult<LogicalOperand> {
        let mut negate = false;
        while self.eat_keyword("not") {
            negate = !negate;
        }
        Ok(LogicalOperand { negate, exp: self.parse_comparison()? })
    }

    fn parse_comparison(&mut self) -> PResult<Exp> {
        let mut operands = vec![self.parse_primary()?];
        let mut ops = Vec::new();
        loop {
            let op = match self.peek() {
                Token::Eq => ComparisonOp::Equal,
                Token::Ne => ComparisonOp::NotEqual,
                Token::Gt => ComparisonOp::Greater,
                Token::Ge => ComparisonOp::GreaterEqual,
                Token::Lt => ComparisonOp::Less,
                Token::Le => ComparisonOp::LessEqual,
                _ => break,
            };
            self.advance();
            ops.push(op);
            operands.push(self.parse_primary()?);
        }
        if ops.is_empty() {
            if let Some(only) = operands.pop() {
                return Ok(Exp::Primary(only));
            }
        }
        let link_types = vec![PrimitiveType::Delayed; ops.len()];
        Ok(Exp::Comparison(ComparisonExp { operands, ops, link_types }))
    }

    fn parse_primary(&mut self) -> PResult<PrimaryExp> {
        let mut nodes = Vec::new();
        loop {
            let value = self.parse_operand()?;
            let op = match self.peek() {
                Token::Plus => PrimaryOp::Add,
                Token::Minus => PrimaryOp::Sub,
                Token::Star => PrimaryOp::Mul,
                Token::Slash => PrimaryOp::Div,
                Token::Percent => PrimaryOp::Mod,
                Token::Caret => PrimaryOp::Pow,
                _ => PrimaryOp::Value,
            };
            nodes.push(PrimaryNode { value, op, ty: PrimitiveType::Delayed });
            if op == PrimaryOp::Value {
                break;
            }
            self.advance();
        }
        Ok(PrimaryExp { negate: false, nodes, effective_type: PrimitiveType::Delayed })
    }

    fn parse_operand(&mut self) -> PResult<ExpValue> {
        let location = self.location();
        match self.advance() {
            Token::Int(n) => Ok(ExpValue::Int(n)),
            Token::Real(x) => Ok(ExpValue::Real(x)),
            Token::Str(s) => Ok(ExpValue::Str(s)),
            Token::Minus => match self.parse_operand()? {
                ExpValue::Int(n) => Ok(ExpValue::Int(n.wrapping_neg())),
                ExpValue::Real(x) => Ok(ExpValue::Real(-x)),
                value => {
                    let mut inner = PrimaryExp::single(value);
                    inner.negate = true;
                    Ok(ExpValue::Exp(Box::new(Exp::Primary(inner))))
                }
            },
            Token::LParen => {
                let exp = self.parse_exp()?;
                self.expect(&Token::RParen)?;
                Ok(ExpValue::Exp(Box::new(exp)))
            }
            Token::Ident(word) if word == "true" => Ok(ExpValue::Bool(true)),
            Token::Ident(word) if word == "false" => Ok(ExpValue::Bool(false)),
            Token::Ident(word) if is_keyword(&word) => Err(format!("unexpected '{word}'")),
            Token::Ident(name) => {
                if self.peek() == &Token::LParen {
                    Ok(ExpValue::Call(self.parse_call(name, location)?))
                } else {
                    Ok(ExpValue::Variable(VarRef::new(name)))
                }
            }
            Token::Unterminated => Err("unterminated string".into()),
            Token::Eof => Err("expression expected".into()),
            other => Err(format!("unexpected '{}'", other.describe())),
        }
    }

    fn parse_call(&mut self, name: String, location: Location) -> PResult<FunctionCall> {
        self.expect(&Token::LParen)?;
        let mut arguments = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                arguments.push(self.parse_exp()?);
                if self.eat(&Token::Comma) {
                    continue;
                }
                self.expect(&Token::RParen)?;
                break;
            }
        }
        Ok(FunctionCall::new(name, arguments, location))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> (Unit, DefErrorList) {
        let mut errors = DefErrorList::new();
        let (unit, _) = Parser::new(src, "test", &mut errors).parse_unit(src);
        (unit, errors)
    }

    fn parse_ok(src: &str) -> Unit {
        let (unit, errors) = parse(src);
        assert_eq!(errors.error_count(), 0, "{:?}", errors);
        unit
    }

    #[test]
    fn header_and_body() {
        let unit = parse_ok("input a:int, b\nc = a + 1\noutput c\n");
        assert_eq!(unit.input.len(), 2);
        assert_eq!(unit.input[0].declared, Some(PrimitiveType::Int));
        assert_eq!(unit.input[1].declared, None);
        assert_eq!(unit.global_block.statements.len(), 1);
        let output = unit.output.unwrap();
        assert!(output.initializer.is_none());
        assert_eq!(output.variable.name, "c");
    }

    #[test]
    fn primary_chain_is_flat() {
        let unit = parse_ok("x = 1 + 2 * 3 ^ 2\n");
        let StatementKind::Assignment(a) = &unit.global_block.statements[0].kind else { panic!() };
        let Exp::Primary(p) = &a.exp else { panic!() };
        let ops: Vec<PrimaryOp> = p.nodes.iter().map(|n| n.op).collect();
        assert_eq!(ops, vec![PrimaryOp::Add, PrimaryOp::Mul, PrimaryOp::Pow, PrimaryOp::Value]);
    }

    #[test]
    fn negative_literal_folds() {
        let unit = parse_ok("x = -3\ny = -x\n");
        let StatementKind::Assignment(a) = &unit.global_block.statements[0].kind else { panic!() };
        assert_eq!(a.exp, Exp::int(-3));
        let StatementKind::Assignment(b) = &unit.global_block.statements[1].kind else { panic!() };
        let Exp::Primary(p) = &b.exp else { panic!() };
        let ExpValue::Exp(inner) = &p.nodes[0].value else { panic!() };
        assert!(matches!(inner.as_ref(), Exp::Primary(q) if q.negate));
    }

    #[test]
    fn if_chain_becomes_siblings() {
        let unit = parse_ok("if a\nx = 1\nelseif b\nx = 2\nelse\nx = 3\nend\n");
        let flags: Vec<(bool, bool)> = unit
            .global_block
            .statements
            .iter()
            .map(|s| match &s.kind {
                StatementKind::If(i) => (i.else_flag, i.condition.is_some()),
                _ => panic!("not an if"),
            })
            .collect();
        assert_eq!(flags, vec![(false, true), (true, true), (true, false)]);
        let StatementKind::If(first) = &unit.global_block.statements[0].kind else { panic!() };
        assert_eq!(first.block.depth, 1);
    }

    #[test]
    fn for_loop_forms() {
        let unit = parse_ok("for i = 1 to 5\nend\nfor i downto 0\nend\n");
        let kinds: Vec<(bool, StepDirection)> = unit
            .global_block
            .statements
            .iter()
            .map(|s| match &s.kind {
                StatementKind::Loop(LoopStatement { kind: LoopKind::For(f), .. }) => {
                    (f.initial.is_some(), f.direction)
                }
                _ => panic!("not a for loop"),
            })
            .collect();
        assert_eq!(kinds, vec![(true, StepDirection::Up), (false, StepDirection::Down)]);
    }

    #[test]
    fn comparison_and_logical() {
        let unit = parse_ok("x = not a < b < c and d\n");
        let StatementKind::Assignment(a) = &unit.global_block.statements[0].kind else { panic!() };
        let Exp::Logical(l) = &a.exp else { panic!() };
        assert_eq!(l.ops, vec![LogicalOp::And]);
        assert!(l.operands[0].negate);
        let Exp::Comparison(c) = &l.operands[0].exp else { panic!() };
        assert_eq!(c.ops, vec![ComparisonOp::Less, ComparisonOp::Less]);
        assert_eq!(c.link_types.len(), 2);
    }

    #[test]
    fn action_with_triggers() {
        let unit = parse_ok("action timer(10), other()\nx = 1\nend\n");
        assert_eq!(unit.actions.len(), 1);
        assert_eq!(unit.actions[0].triggers.len(), 2);
        assert_eq!(unit.actions[0].block.depth, 1);
    }

    #[test]
    fn syntax_error_aborts_only_statement() {
        let (unit, errors) = parse("x = 1 +\ny = 2\n");
        assert_eq!(errors.error_count(), 1);
        assert_eq!(errors.iter().next().unwrap().location, 1);
        assert_eq!(unit.global_block.statements.len(), 1);
    }

    #[test]
    fn bad_header_still_consumes_body() {
        let (unit, errors) = parse("while\nx = 1\nend\ny = 2\n");
        assert_eq!(errors.error_count(), 1);
        assert_eq!(unit.global_block.statements.len(), 1);
    }

    #[test]
    fn missing_end_is_reported() {
        let (_, errors) = parse("loop\nx = 1\n");
        assert_eq!(errors.error_count(), 1);
    }

    #[test]
    fn unreachable_code_warns() {
        let (_, errors) = parse("loop\nbreak\nx = 1\nend\n");
        assert_eq!(errors.error_count(), 0);
        assert_eq!(errors.warning_count(), 1);
        assert_eq!(errors.iter().next().unwrap().location, 3);
    }

    #[test]
    fn keywords_are_not_names() {
        let (_, errors) = parse("end = 1\n");
        assert_eq!(errors.error_count(), 1);
        let (_, errors) = parse("x = to\n");
        assert_eq!(errors.error_count(), 1);
    }

    #[test]
    fn input_only_at_top_level() {
        let (_, errors) = parse("if true\ninput a\nend\n");
        assert_eq!(errors.error_count(), 1);
    }
}
