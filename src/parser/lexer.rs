/// Lexer for `.gir` listings
///
/// Words are whitespace separated. Brackets, braces and parentheses are
/// tokens on their own, `;` comments out the rest of the line.

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Word,
    StringLiteral,
    CharLiteral,
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    /// A literal that never closed; `lexeme` holds the reason
    Invalid,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
    pub column: usize,
}

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            chars: input.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia();
            let (line, column) = (self.line, self.column);
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    lexeme: String::new(),
                    line,
                    column,
                });
                return tokens;
            };

            let (kind, lexeme) = match c {
                '(' | ')' | '{' | '}' | '[' | ']' => {
                    self.bump();
                    let kind = match c {
                        '(' => TokenKind::LeftParen,
                        ')' => TokenKind::RightParen,
                        '{' => TokenKind::LeftBrace,
                        '}' => TokenKind::RightBrace,
                        '[' => TokenKind::LeftBracket,
                        _ => TokenKind::RightBracket,
                    };
                    (kind, c.to_string())
                }
                '"' => self.quoted('"', TokenKind::StringLiteral),
                '\'' => self.quoted('\'', TokenKind::CharLiteral),
                _ => (TokenKind::Word, self.word()),
            };
            tokens.push(Token {
                kind,
                lexeme,
                line,
                column,
            });
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c == ';' {
                while self.peek().is_some_and(|c| c != '\n') {
                    self.bump();
                }
            } else if c.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn word(&mut self) -> String {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if c.is_whitespace() || matches!(c, '(' | ')' | '{' | '}' | '[' | ']' | ';') {
                break;
            }
            word.push(c);
            self.bump();
        }
        word
    }

    fn quoted(&mut self, quote: char, kind: TokenKind) -> (TokenKind, String) {
        self.bump();
        let mut text = String::new();
        loop {
            match self.bump() {
                None => return (TokenKind::Invalid, "Unterminated literal".to_string()),
                Some(c) if c == quote => return (kind, text),
                Some('\\') => match self.bump() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('0') => text.push('\0'),
                    Some(other) => text.push(other),
                    None => return (TokenKind::Invalid, "Unterminated literal".to_string()),
                },
                Some(c) => text.push(c),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(input).tokenize().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_words_and_delimiters() {
        assert_eq!(
            kinds("fn f ( x : [int] -- )"),
            vec![
                TokenKind::Word,
                TokenKind::Word,
                TokenKind::LeftParen,
                TokenKind::Word,
                TokenKind::Word,
                TokenKind::LeftBracket,
                TokenKind::Word,
                TokenKind::RightBracket,
                TokenKind::Word,
                TokenKind::RightParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_glyph_words() {
        let tokens = Lexer::new("call ⇈ call Point.x! call rot-").tokenize();
        let words: Vec<&str> = tokens.iter().map(|t| t.lexeme.as_str()).collect();
        assert_eq!(words, vec!["call", "⇈", "call", "Point.x!", "call", "rot-", ""]);
    }

    #[test]
    fn test_literals_and_comments() {
        let tokens = Lexer::new("push \"a b\\n\" ; ignored\npush 'c'").tokenize();
        assert_eq!(tokens[1].kind, TokenKind::StringLiteral);
        assert_eq!(tokens[1].lexeme, "a b\n");
        assert_eq!(tokens[3].kind, TokenKind::CharLiteral);
        assert_eq!(tokens[3].lexeme, "c");
        assert_eq!((tokens[3].line, tokens[3].column), (2, 6));
    }

    #[test]
    fn test_unterminated_string() {
        let tokens = Lexer::new("push \"oops").tokenize();
        assert_eq!(tokens[1].kind, TokenKind::Invalid);
    }
}
