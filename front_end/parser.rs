// ll(1) parser for the textual bytecode form.

use derive_more::Display;

use super::ast::*;
use crate::middle_end::lang::{BinOp, InvokeKind};

// SECTION: interface

pub fn parse(code: &str) -> Result<Program, ParseError> {
    let mut parser = Parser::new(code)?;
    program_r(&mut parser)
}

// A parse error with explanatory message.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub struct ParseError(pub String);
impl std::error::Error for ParseError {}

impl std::str::FromStr for Program {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

// SECTION: tokens

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum TokenKind {
    Id,
    Num,
    KwClass,
    KwInterface,
    KwExtends,
    KwImplements,
    KwField,
    KwMethod,
    KwStatic,
    KwAbstract,
    KwLet,
    KwNew,
    KwGoto,
    KwIf,
    KwSwitch,
    KwCase,
    KwDefault,
    KwReturn,
    KwVirtual,
    KwSpecial,
    KwInt,
    KwBoolean,
    KwByte,
    KwShort,
    KwChar,
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Colon,
    ColonColon,
    Semi,
    Comma,
    Dot,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Shl,
    Shr,
    Ushr,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

use TokenKind::*;

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Id => "identifier",
            Num => "number",
            KwClass => "class",
            KwInterface => "interface",
            KwExtends => "extends",
            KwImplements => "implements",
            KwField => "field",
            KwMethod => "method",
            KwStatic => "static",
            KwAbstract => "abstract",
            KwLet => "let",
            KwNew => "new",
            KwGoto => "goto",
            KwIf => "if",
            KwSwitch => "switch",
            KwCase => "case",
            KwDefault => "default",
            KwReturn => "return",
            KwVirtual => "virtual",
            KwSpecial => "special",
            KwInt => "int",
            KwBoolean => "boolean",
            KwByte => "byte",
            KwShort => "short",
            KwChar => "char",
            LBrace => "{",
            RBrace => "}",
            LParen => "(",
            RParen => ")",
            LBracket => "[",
            RBracket => "]",
            Colon => ":",
            ColonColon => "::",
            Semi => ";",
            Comma => ",",
            Dot => ".",
            Assign => "=",
            Plus => "+",
            Minus => "-",
            Star => "*",
            Slash => "/",
            Percent => "%",
            Amp => "&",
            Pipe => "|",
            Caret => "^",
            Shl => "<<",
            Shr => ">>",
            Ushr => ">>>",
            EqEq => "==",
            NotEq => "!=",
            Lt => "<",
            Le => "<=",
            Gt => ">",
            Ge => ">=",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone, Debug)]
struct Token {
    kind: TokenKind,
    text: String,
    line: usize,
}

fn keyword(text: &str) -> Option<TokenKind> {
    let kind = match text {
        "class" => KwClass,
        "interface" => KwInterface,
        "extends" => KwExtends,
        "implements" => KwImplements,
        "field" => KwField,
        "method" => KwMethod,
        "static" => KwStatic,
        "abstract" => KwAbstract,
        "let" => KwLet,
        "new" => KwNew,
        "goto" => KwGoto,
        "if" => KwIf,
        "switch" => KwSwitch,
        "case" => KwCase,
        "default" => KwDefault,
        "return" => KwReturn,
        "virtual" => KwVirtual,
        "special" => KwSpecial,
        "int" => KwInt,
        "boolean" => KwBoolean,
        "byte" => KwByte,
        "short" => KwShort,
        "char" => KwChar,
        _ => return None,
    };
    Some(kind)
}

fn lex(code: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = vec![];
    let mut chars = code.chars().peekable();
    let mut line = 1;

    macro_rules! push {
        ($kind:expr, $text:expr) => {
            tokens.push(Token {
                kind: $kind,
                text: $text.to_string(),
                line,
            })
        };
    }

    while let Some(&c) = chars.peek() {
        match c {
            '\n' => {
                line += 1;
                chars.next();
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            '/' => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    for c in chars.by_ref() {
                        if c == '\n' {
                            line += 1;
                            break;
                        }
                    }
                } else {
                    push!(Slash, "/");
                }
            }
            c if c.is_ascii_digit() => {
                let mut text = String::new();
                while let Some(&c) = chars.peek() {
                    if !c.is_ascii_digit() {
                        break;
                    }
                    text.push(c);
                    chars.next();
                }
                push!(Num, text);
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut text = String::new();
                while let Some(&c) = chars.peek() {
                    if !(c.is_ascii_alphanumeric() || c == '_') {
                        break;
                    }
                    text.push(c);
                    chars.next();
                }
                match keyword(&text) {
                    Some(kind) => push!(kind, text),
                    None => push!(Id, text),
                }
            }
            _ => {
                chars.next();
                let (kind, text) = match c {
                    '{' => (LBrace, "{"),
                    '}' => (RBrace, "}"),
                    '(' => (LParen, "("),
                    ')' => (RParen, ")"),
                    '[' => (LBracket, "["),
                    ']' => (RBracket, "]"),
                    ';' => (Semi, ";"),
                    ',' => (Comma, ","),
                    '.' => (Dot, "."),
                    '+' => (Plus, "+"),
                    '-' => (Minus, "-"),
                    '*' => (Star, "*"),
                    '%' => (Percent, "%"),
                    '&' => (Amp, "&"),
                    '|' => (Pipe, "|"),
                    '^' => (Caret, "^"),
                    ':' => {
                        if chars.peek() == Some(&':') {
                            chars.next();
                            (ColonColon, "::")
                        } else {
                            (Colon, ":")
                        }
                    }
                    '=' => {
                        if chars.peek() == Some(&'=') {
                            chars.next();
                            (EqEq, "==")
                        } else {
                            (Assign, "=")
                        }
                    }
                    '!' => {
                        if chars.peek() == Some(&'=') {
                            chars.next();
                            (NotEq, "!=")
                        } else {
                            return Err(ParseError(format!("line {line}: stray `!`")));
                        }
                    }
                    '<' => {
                        if chars.peek() == Some(&'<') {
                            chars.next();
                            (Shl, "<<")
                        } else if chars.peek() == Some(&'=') {
                            chars.next();
                            (Le, "<=")
                        } else {
                            (Lt, "<")
                        }
                    }
                    '>' => {
                        if chars.peek() == Some(&'>') {
                            chars.next();
                            if chars.peek() == Some(&'>') {
                                chars.next();
                                (Ushr, ">>>")
                            } else {
                                (Shr, ">>")
                            }
                        } else if chars.peek() == Some(&'=') {
                            chars.next();
                            (Ge, ">=")
                        } else {
                            (Gt, ">")
                        }
                    }
                    c => {
                        return Err(ParseError(format!(
                            "line {line}: unexpected character `{c}`"
                        )))
                    }
                };
                push!(kind, text);
            }
        }
    }

    Ok(tokens)
}

// SECTION: parser functionality

#[derive(Clone, Debug)]
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

// utility functions for traversing the token stream and creating error
// messages.
impl Parser {
    // always use this to create new Parsers.
    fn new(code: &str) -> Result<Self, ParseError> {
        let tokens = lex(code)?;
        if tokens.is_empty() {
            Err(ParseError("empty token stream".to_string()))
        } else {
            Ok(Parser { tokens, pos: 0 })
        }
    }

    // if the next token has the given kind advances the iterator and returns
    // true, otherwise returns false.
    fn eat(&mut self, kind: TokenKind) -> bool {
        match self.peek() {
            Some(k) if k == kind => {
                self.next();
                true
            }
            _ => false,
        }
    }

    // returns an Ok or Err result depending on whether the next token has the
    // given kind, advancing the iterator on an Ok result.
    fn expect(&mut self, kind: TokenKind) -> Result<(), ParseError> {
        if self.eat(kind) {
            Ok(())
        } else {
            self.error_next(&format!("expected `{kind}`"))
        }
    }

    // advances the iterator and returns the next token in the stream, or None
    // if there are no more tokens.
    fn next(&mut self) -> Option<TokenKind> {
        if !self.end() {
            self.pos += 1;
            Some(self.tokens[self.pos - 1].kind)
        } else {
            None
        }
    }

    // returns the next token (if it exists) without advancing the iterator.
    fn peek(&self) -> Option<TokenKind> {
        self.tokens.get(self.pos).map(|t| t.kind)
    }

    // returns the token after the next one without advancing the iterator.
    fn peek2(&self) -> Option<TokenKind> {
        self.tokens.get(self.pos + 1).map(|t| t.kind)
    }

    // returns whether the next token has the given kind, without advancing
    // the iterator.
    fn next_is(&self, kind: TokenKind) -> bool {
        self.peek() == Some(kind)
    }

    // returns whether we're at the end of the token stream.
    fn end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    // returns the lexeme of the token immediately prior to the current token.
    fn slice_prev(&self) -> &str {
        &self.tokens[self.pos - 1].text
    }

    // the source line of the current (or last) token.
    fn line(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].line
    }

    // expects an identifier and returns its lexeme.
    fn ident(&mut self) -> Result<String, ParseError> {
        self.expect(Id)?;
        Ok(self.slice_prev().to_string())
    }

    // expects a (possibly negated) integer literal.
    fn int_literal(&mut self) -> Result<i32, ParseError> {
        let negate = self.eat(Minus);
        self.expect(Num)?;
        let text = self.slice_prev().to_string();
        let value = text.parse::<i64>().map_err(|_| {
            ParseError(format!(
                "line {}: integer literal `{text}` out of range",
                self.line()
            ))
        })?;
        let value = if negate { -value } else { value };
        i32::try_from(value).map_err(|_| {
            ParseError(format!(
                "line {}: integer literal `{value}` out of range",
                self.line()
            ))
        })
    }

    // returns a parse error knowing that the next token to be inspected
    // causes an error.
    fn error_next<T>(&self, msg: &str) -> Result<T, ParseError> {
        if self.end() {
            Err(ParseError(format!(
                "parse error: unexpected end of input ({msg})"
            )))
        } else {
            let tok = &self.tokens[self.pos];
            Err(ParseError(format!(
                "parse error at line {}: unexpected `{}` ({msg})",
                tok.line, tok.text
            )))
        }
    }
}

// SECTION: grammar rules

fn program_r(parser: &mut Parser) -> Result<Program, ParseError> {
    let mut decls = vec![];
    while !parser.end() {
        decls.push(decl_r(parser)?);
    }
    Ok(Program { decls })
}

fn decl_r(parser: &mut Parser) -> Result<ClassDecl, ParseError> {
    let line = parser.line();
    let is_abstract = parser.eat(KwAbstract);
    if parser.eat(KwInterface) {
        if is_abstract {
            return parser.error_next("interfaces cannot be marked abstract");
        }
        return interface_r(parser, line);
    }
    parser.expect(KwClass)?;
    let name = parser.ident()?;
    let extends = if parser.eat(KwExtends) {
        vec![parser.ident()?]
    } else {
        vec![]
    };
    let implements = if parser.eat(KwImplements) {
        ident_list_r(parser)?
    } else {
        vec![]
    };
    let (fields, methods) = members_r(parser)?;
    Ok(ClassDecl {
        name,
        is_interface: false,
        is_abstract,
        extends,
        implements,
        fields,
        methods,
        line,
    })
}

fn interface_r(parser: &mut Parser, line: usize) -> Result<ClassDecl, ParseError> {
    let name = parser.ident()?;
    let extends = if parser.eat(KwExtends) {
        ident_list_r(parser)?
    } else {
        vec![]
    };
    let (fields, methods) = members_r(parser)?;
    if let Some(f) = fields.first() {
        return Err(ParseError(format!(
            "line {}: interfaces cannot declare fields (`{}`)",
            f.line, f.name
        )));
    }
    Ok(ClassDecl {
        name,
        is_interface: true,
        is_abstract: true,
        extends,
        implements: vec![],
        fields,
        methods,
        line,
    })
}

fn ident_list_r(parser: &mut Parser) -> Result<Vec<String>, ParseError> {
    let mut names = vec![parser.ident()?];
    while parser.eat(Comma) {
        names.push(parser.ident()?);
    }
    Ok(names)
}

fn members_r(parser: &mut Parser) -> Result<(Vec<FieldDecl>, Vec<MethodDecl>), ParseError> {
    parser.expect(LBrace)?;
    let mut fields = vec![];
    let mut methods = vec![];
    while !parser.eat(RBrace) {
        let line = parser.line();
        let mut is_static = false;
        let mut is_abstract = false;
        loop {
            if parser.eat(KwStatic) {
                is_static = true;
            } else if parser.eat(KwAbstract) {
                is_abstract = true;
            } else {
                break;
            }
        }
        if parser.eat(KwField) {
            if is_abstract {
                return parser.error_next("fields cannot be abstract");
            }
            let name = parser.ident()?;
            parser.expect(Colon)?;
            let typ = type_r(parser)?;
            parser.expect(Semi)?;
            fields.push(FieldDecl {
                name,
                typ,
                is_static,
                line,
            });
        } else if parser.eat(KwMethod) {
            methods.push(method_r(parser, is_static, is_abstract, line)?);
        } else {
            return parser.error_next("expected `field` or `method`");
        }
    }
    Ok((fields, methods))
}

fn method_r(
    parser: &mut Parser,
    is_static: bool,
    is_abstract: bool,
    line: usize,
) -> Result<MethodDecl, ParseError> {
    let name = parser.ident()?;
    parser.expect(LParen)?;
    let mut params = vec![];
    if !parser.next_is(RParen) {
        loop {
            let pname = parser.ident()?;
            parser.expect(Colon)?;
            params.push((pname, type_r(parser)?));
            if !parser.eat(Comma) {
                break;
            }
        }
    }
    parser.expect(RParen)?;
    let ret = if parser.eat(Colon) {
        Some(type_r(parser)?)
    } else {
        None
    };
    let body = if parser.eat(Semi) {
        None
    } else {
        Some(body_r(parser)?)
    };
    Ok(MethodDecl {
        name,
        params,
        ret,
        is_static,
        is_abstract,
        body,
        line,
    })
}

fn base_type_r(parser: &mut Parser) -> Result<RawType, ParseError> {
    let typ = match parser.peek() {
        Some(KwInt) => RawType::Int,
        Some(KwBoolean) => RawType::Boolean,
        Some(KwByte) => RawType::Byte,
        Some(KwShort) => RawType::Short,
        Some(KwChar) => RawType::Char,
        Some(Id) => {
            parser.next();
            return Ok(RawType::Named(parser.slice_prev().to_string()));
        }
        _ => return parser.error_next("expected a type"),
    };
    parser.next();
    Ok(typ)
}

fn type_r(parser: &mut Parser) -> Result<RawType, ParseError> {
    let mut typ = base_type_r(parser)?;
    while parser.eat(LBracket) {
        parser.expect(RBracket)?;
        typ = RawType::Array(Box::new(typ));
    }
    Ok(typ)
}

fn body_r(parser: &mut Parser) -> Result<Body, ParseError> {
    parser.expect(LBrace)?;
    let mut locals = vec![];
    while parser.eat(KwLet) {
        loop {
            let name = parser.ident()?;
            parser.expect(Colon)?;
            locals.push((name, type_r(parser)?));
            if !parser.eat(Comma) {
                break;
            }
        }
        parser.expect(Semi)?;
    }
    let mut stmts = vec![];
    while !parser.eat(RBrace) {
        stmts.push(stmt_r(parser)?);
    }
    Ok(Body { locals, stmts })
}

fn stmt_r(parser: &mut Parser) -> Result<RawStmt, ParseError> {
    // labels are `ident:` followed by a statement.
    let label = if parser.next_is(Id) && parser.peek2() == Some(Colon) {
        let l = parser.ident()?;
        parser.expect(Colon)?;
        Some(l)
    } else {
        None
    };
    let line = parser.line();
    let kind = stmt_kind_r(parser)?;
    Ok(RawStmt { label, kind, line })
}

fn stmt_kind_r(parser: &mut Parser) -> Result<RawStmtKind, ParseError> {
    match parser.peek() {
        Some(KwIf) => {
            parser.next();
            let l = parser.ident()?;
            let op = comparison_r(parser)?;
            let r = parser.ident()?;
            parser.expect(KwGoto)?;
            let target = parser.ident()?;
            parser.expect(Semi)?;
            Ok(RawStmtKind::If { op, l, r, target })
        }
        Some(KwGoto) => {
            parser.next();
            let target = parser.ident()?;
            parser.expect(Semi)?;
            Ok(RawStmtKind::Goto { target })
        }
        Some(KwSwitch) => switch_r(parser),
        Some(KwReturn) => {
            parser.next();
            let value = if parser.next_is(Id) {
                Some(parser.ident()?)
            } else {
                None
            };
            parser.expect(Semi)?;
            Ok(RawStmtKind::Return { value })
        }
        Some(KwStatic) | Some(KwVirtual) | Some(KwInterface) | Some(KwSpecial) => {
            let inv = invoke_r(parser, None)?;
            parser.expect(Semi)?;
            Ok(inv)
        }
        Some(Id) => lhs_stmt_r(parser),
        _ => parser.error_next("expected a statement"),
    }
}

// statements starting with an identifier: assignment, store, or array store.
fn lhs_stmt_r(parser: &mut Parser) -> Result<RawStmtKind, ParseError> {
    let first = parser.ident()?;
    match parser.peek() {
        Some(Dot) => {
            parser.next();
            let field = parser.ident()?;
            parser.expect(Assign)?;
            let rhs = parser.ident()?;
            parser.expect(Semi)?;
            Ok(RawStmtKind::Store {
                base: first,
                field,
                rhs,
            })
        }
        Some(LBracket) => {
            parser.next();
            let index = parser.ident()?;
            parser.expect(RBracket)?;
            parser.expect(Assign)?;
            let rhs = parser.ident()?;
            parser.expect(Semi)?;
            Ok(RawStmtKind::StoreArray {
                base: first,
                index,
                rhs,
            })
        }
        Some(Assign) => {
            parser.next();
            let kind = rhs_r(parser, first)?;
            parser.expect(Semi)?;
            Ok(kind)
        }
        _ => parser.error_next("expected `=`, `.`, or `[` after identifier"),
    }
}

fn rhs_r(parser: &mut Parser, lhs: String) -> Result<RawStmtKind, ParseError> {
    match parser.peek() {
        Some(Num) | Some(Minus) => {
            let value = parser.int_literal()?;
            Ok(RawStmtKind::Const { lhs, value })
        }
        Some(KwNew) => {
            parser.next();
            // base type, then `[]` suffixes building the element type, then
            // optionally the dimension `[n]` making this an array
            // allocation.
            let mut typ = base_type_r(parser)?;
            let mut is_array = false;
            while parser.next_is(LBracket) {
                if parser.peek2() == Some(RBracket) {
                    parser.next();
                    parser.next();
                    typ = RawType::Array(Box::new(typ));
                } else {
                    parser.next();
                    // the length is irrelevant to the analyses; accept a
                    // variable or a literal and drop it.
                    if parser.next_is(Id) {
                        parser.ident()?;
                    } else {
                        parser.int_literal()?;
                    }
                    parser.expect(RBracket)?;
                    is_array = true;
                    break;
                }
            }
            Ok(RawStmtKind::New { lhs, typ, is_array })
        }
        Some(LParen) => {
            parser.next();
            let typ = type_r(parser)?;
            parser.expect(RParen)?;
            let rhs = parser.ident()?;
            Ok(RawStmtKind::Cast { lhs, typ, rhs })
        }
        Some(KwStatic) | Some(KwVirtual) | Some(KwInterface) | Some(KwSpecial) => {
            invoke_r(parser, Some(lhs))
        }
        Some(Id) => {
            let first = parser.ident()?;
            match parser.peek().and_then(binop) {
                Some(op) => {
                    parser.next();
                    let r = parser.ident()?;
                    Ok(RawStmtKind::Binary {
                        lhs,
                        op,
                        l: first,
                        r,
                    })
                }
                None => match parser.peek() {
                    Some(Dot) => {
                        parser.next();
                        let field = parser.ident()?;
                        Ok(RawStmtKind::Load {
                            lhs,
                            base: first,
                            field,
                        })
                    }
                    Some(LBracket) => {
                        parser.next();
                        let index = parser.ident()?;
                        parser.expect(RBracket)?;
                        Ok(RawStmtKind::LoadArray {
                            lhs,
                            base: first,
                            index,
                        })
                    }
                    _ => Ok(RawStmtKind::Copy { lhs, rhs: first }),
                },
            }
        }
        _ => parser.error_next("expected a right-hand side"),
    }
}

fn invoke_r(parser: &mut Parser, lhs: Option<String>) -> Result<RawStmtKind, ParseError> {
    let kind = match parser.next() {
        Some(KwStatic) => InvokeKind::Static,
        Some(KwVirtual) => InvokeKind::Virtual,
        Some(KwInterface) => InvokeKind::Interface,
        Some(KwSpecial) => InvokeKind::Special,
        _ => unreachable!("invoke_r called without an invoke keyword"),
    };
    let (recv, class, method) = match kind {
        InvokeKind::Static => {
            // static C::m(..)
            let class = parser.ident()?;
            parser.expect(ColonColon)?;
            let method = parser.ident()?;
            (None, Some(class), method)
        }
        InvokeKind::Special => {
            // special recv.C::m(..)
            let recv = parser.ident()?;
            parser.expect(Dot)?;
            let class = parser.ident()?;
            parser.expect(ColonColon)?;
            let method = parser.ident()?;
            (Some(recv), Some(class), method)
        }
        InvokeKind::Virtual | InvokeKind::Interface => {
            // virtual recv.m(..): the declared class is the receiver's
            // static type, resolved at link time.
            let recv = parser.ident()?;
            parser.expect(Dot)?;
            let method = parser.ident()?;
            (Some(recv), None, method)
        }
    };
    parser.expect(LParen)?;
    let mut args = vec![];
    if !parser.next_is(RParen) {
        loop {
            args.push(parser.ident()?);
            if !parser.eat(Comma) {
                break;
            }
        }
    }
    parser.expect(RParen)?;
    Ok(RawStmtKind::Invoke {
        lhs,
        kind,
        recv,
        class,
        method,
        args,
    })
}

fn switch_r(parser: &mut Parser) -> Result<RawStmtKind, ParseError> {
    parser.expect(KwSwitch)?;
    let key = parser.ident()?;
    parser.expect(LBrace)?;
    let mut cases = vec![];
    let mut default = None;
    while !parser.eat(RBrace) {
        if parser.eat(KwCase) {
            let value = parser.int_literal()?;
            parser.expect(Colon)?;
            let target = parser.ident()?;
            parser.expect(Semi)?;
            cases.push((value, target));
        } else if parser.eat(KwDefault) {
            parser.expect(Colon)?;
            let target = parser.ident()?;
            parser.expect(Semi)?;
            if default.replace(target).is_some() {
                return parser.error_next("duplicate `default` case");
            }
        } else {
            return parser.error_next("expected `case` or `default`");
        }
    }
    match default {
        Some(default) => Ok(RawStmtKind::Switch {
            key,
            cases,
            default,
        }),
        None => parser.error_next("switch requires a `default` case"),
    }
}

fn comparison_r(parser: &mut Parser) -> Result<BinOp, ParseError> {
    match parser.peek().and_then(binop) {
        Some(op) if op.is_comparison() => {
            parser.next();
            Ok(op)
        }
        _ => parser.error_next("expected a comparison operator"),
    }
}

fn binop(kind: TokenKind) -> Option<BinOp> {
    let op = match kind {
        Plus => BinOp::Add,
        Minus => BinOp::Sub,
        Star => BinOp::Mul,
        Slash => BinOp::Div,
        Percent => BinOp::Rem,
        Amp => BinOp::And,
        Pipe => BinOp::Or,
        Caret => BinOp::Xor,
        Shl => BinOp::Shl,
        Shr => BinOp::Shr,
        Ushr => BinOp::Ushr,
        EqEq => BinOp::Eq,
        NotEq => BinOp::Ne,
        Lt => BinOp::Lt,
        Le => BinOp::Le,
        Gt => BinOp::Gt,
        Ge => BinOp::Ge,
        _ => return None,
    };
    Some(op)
}
