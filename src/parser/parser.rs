/// Recursive descent parser for `.gir` listings

use crate::ir::{Argument, FnBody, FnDecl, Instruction, Program, Span, TypeDecl, TypeSig, Variadic};
use crate::parser::lexer::{Lexer, Token, TokenKind};
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Parse error at {}:{}: {}", self.line, self.column, self.message)
    }
}

impl std::error::Error for ParseError {}

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

impl Parser {
    pub fn new(input: &str) -> Self {
        let mut lexer = Lexer::new(input);
        let tokens = lexer.tokenize();
        Parser { tokens, current: 0 }
    }

    pub fn parse(&mut self) -> Result<Program, ParseError> {
        let mut program = Program::default();

        while !self.is_at_end() {
            if self.check_word("type") {
                program.type_decls.push(self.parse_type_decl()?);
            } else if self.check_word("fn") {
                program.fn_decls.push(self.parse_fn_decl()?);
            } else {
                return Err(self.error("Expected 'type' or 'fn'"));
            }
        }

        Ok(program)
    }

    fn parse_type_decl(&mut self) -> Result<TypeDecl, ParseError> {
        let span = self.span();
        self.consume_word_value("type", "Expected 'type'")?;
        let name = self.consume_word("Expected type name")?;

        let mut fields = Vec::new();
        while !self.check_word("end") && !self.is_at_end() {
            let field = self.consume_word("Expected field name")?;
            self.consume_word_value(":", "Expected ':' after field name")?;
            fields.push((field, self.parse_sig()?));
        }
        self.consume_word_value("end", "Expected 'end' after type fields")?;

        Ok(TypeDecl {
            name,
            fields,
            span: Some(span),
        })
    }

    fn parse_fn_decl(&mut self) -> Result<FnDecl, ParseError> {
        let span = self.span();
        self.consume_word_value("fn", "Expected 'fn'")?;
        let name = self.consume_word("Expected function name")?;
        self.consume(&TokenKind::LeftParen, "Expected '(' for signature")?;

        // Arguments, top of stack first
        let mut args = Vec::new();
        let mut ellipsis = None;
        while !self.check_word("--") && !self.is_at_end() {
            if self.check_word("...") {
                ellipsis = Some(self.parse_variadic("--")?);
                break;
            }
            let arg = self.consume_word("Expected argument name")?;
            self.consume_word_value(":", "Expected ':' after argument name")?;
            args.push(Argument {
                name: arg,
                sig: self.parse_sig()?,
            });
        }
        self.consume_word_value("--", "Expected '--' in signature")?;

        let mut rets = Vec::new();
        let mut rest = None;
        while !self.check(&TokenKind::RightParen) && !self.is_at_end() {
            if self.check_word("...") {
                rest = Some(self.parse_variadic(")")?);
                break;
            }
            rets.push(self.parse_sig()?);
        }
        self.consume(&TokenKind::RightParen, "Expected ')' after signature")?;

        let body = if self.check_word("extern") {
            self.advance();
            FnBody::Foreign
        } else {
            let instructions = self.parse_instructions()?;
            self.consume_word_value("end", "Expected 'end' after function body")?;
            FnBody::Native(Rc::new(instructions))
        };

        Ok(FnDecl {
            name,
            args,
            ellipsis,
            rets,
            rest,
            body,
            span: Some(span),
        })
    }

    /// `...` with an optional element type, which must end its list
    fn parse_variadic(&mut self, closing: &str) -> Result<Variadic, ParseError> {
        self.advance();
        let at_close = self.check_word(closing) || (closing == ")" && self.check(&TokenKind::RightParen));
        let element = if at_close { None } else { Some(self.parse_sig()?) };
        Ok(Variadic { element })
    }

    fn parse_sig(&mut self) -> Result<TypeSig, ParseError> {
        if self.check(&TokenKind::LeftBracket) {
            self.advance();
            let name = self.consume_word("Expected type name")?;
            self.consume(&TokenKind::RightBracket, "Expected ']'")?;
            return Ok(TypeSig {
                name,
                is_stack: true,
            });
        }
        let name = self.consume_word("Expected type name")?;
        Ok(TypeSig {
            name,
            is_stack: false,
        })
    }

    /// Instructions up to `end` or `}`, which is left unconsumed
    fn parse_instructions(&mut self) -> Result<Vec<Instruction>, ParseError> {
        let mut instructions = Vec::new();
        while !self.check_word("end") && !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            instructions.push(self.parse_instruction()?);
        }
        Ok(instructions)
    }

    fn parse_instruction(&mut self) -> Result<Instruction, ParseError> {
        let op = self.consume_word("Expected instruction")?;

        match op.as_str() {
            "push" => self.parse_literal(),
            "call" => Ok(Instruction::Call(self.consume_word("Expected function name")?)),
            "jt" => Ok(Instruction::JumpTrue(self.consume_word("Expected label")?)),
            "goto" => Ok(Instruction::Goto(self.consume_word("Expected label")?)),
            "label" => Ok(Instruction::Label(self.consume_word("Expected label")?)),
            "exit" => Ok(Instruction::Exit),
            "sub" => {
                self.consume(&TokenKind::LeftBrace, "Expected '{' after 'sub'")?;
                let body = self.parse_instructions()?;
                self.consume(&TokenKind::RightBrace, "Expected '}'")?;
                Ok(Instruction::Subroutine(Rc::new(body)))
            }
            _ => Err(self.error_at_previous(&format!("Unknown instruction: {}", op))),
        }
    }

    fn parse_literal(&mut self) -> Result<Instruction, ParseError> {
        let token = self.peek().clone();

        let literal = match token.kind {
            TokenKind::StringLiteral => Instruction::PushStr(token.lexeme.clone()),
            TokenKind::CharLiteral => {
                let mut chars = token.lexeme.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Instruction::PushChar(c),
                    _ => return Err(self.error("Character literal must hold one character")),
                }
            }
            TokenKind::Word => match token.lexeme.as_str() {
                "true" => Instruction::PushBool(true),
                "false" => Instruction::PushBool(false),
                text => {
                    if let Ok(value) = text.parse::<i32>() {
                        Instruction::PushInt(value)
                    } else if let Ok(value) = text.parse::<f32>() {
                        Instruction::PushFloat(value)
                    } else {
                        return Err(self.error(&format!("Invalid literal: {}", text)));
                    }
                }
            },
            TokenKind::Invalid => return Err(self.error(&token.lexeme)),
            _ => return Err(self.error("Expected literal after 'push'")),
        };

        self.advance();
        Ok(literal)
    }

    // Helper methods

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn span(&self) -> Span {
        let token = self.peek();
        Span::new(token.line, token.column)
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        &self.tokens[self.current - 1]
    }

    fn check(&self, kind: &TokenKind) -> bool {
        if self.is_at_end() {
            return false;
        }
        &self.peek().kind == kind
    }

    fn check_word(&self, value: &str) -> bool {
        let token = self.peek();
        token.kind == TokenKind::Word && token.lexeme == value
    }

    fn consume(&mut self, kind: &TokenKind, message: &str) -> Result<&Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(message))
        }
    }

    fn consume_word(&mut self, message: &str) -> Result<String, ParseError> {
        if self.peek().kind == TokenKind::Word {
            let lexeme = self.peek().lexeme.clone();
            self.advance();
            Ok(lexeme)
        } else {
            Err(self.error(message))
        }
    }

    fn consume_word_value(&mut self, value: &str, message: &str) -> Result<(), ParseError> {
        if self.check_word(value) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(message))
        }
    }

    fn error(&self, message: &str) -> ParseError {
        let token = self.peek();
        ParseError {
            message: message.to_string(),
            line: token.line,
            column: token.column,
        }
    }

    fn error_at_previous(&self, message: &str) -> ParseError {
        let token = &self.tokens[self.current.saturating_sub(1)];
        ParseError {
            message: message.to_string(),
            line: token.line,
            column: token.column,
        }
    }
}
