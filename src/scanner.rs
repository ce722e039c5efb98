use crate::error::{error, Error};
use crate::token::{Token, TokenType, KEYWORDS};

// `start` and `current` are byte offsets into `source`, always sitting on
// character boundaries, so lexeme slicing stays valid for multi-byte input.
pub struct Scanner {
    source: String,
    tokens: Vec<Token>,
    start: usize,
    current: usize,
    line: i32,
    had_error: bool,
}

impl Scanner {
    pub fn new(source: String) -> Self {
        Self {
            source,
            tokens: Vec::new(),
            start: 0,
            current: 0,
            line: 1,
            had_error: false,
        }
    }

    // Scans to EOF in one pass. Errors are reported as they are hit; any at
    // all fails the scan, since tokens are already missing from the stream.
    pub fn scan_tokens(&mut self) -> Result<&Vec<Token>, Error> {
        while !self.is_at_end() {
            self.start = self.current;
            self.scan_token()
        }

        self.tokens.push(Token::new(TokenType::Eof, "", self.line));

        if self.had_error {
            return Err(Error::Parse);
        }
        Ok(&self.tokens)
    }

    fn scan_token(&mut self) {
        let c: char = self.advance();
        match c {
            // single char
            '(' => self.add_token(TokenType::LeftParen),
            ')' => self.add_token(TokenType::RightParen),
            '{' => self.add_token(TokenType::LeftBrace),
            '}' => self.add_token(TokenType::RightBrace),
            ',' => self.add_token(TokenType::Comma),
            '.' => self.add_token(TokenType::Dot),
            '-' => self.add_token(TokenType::Minus),
            '+' => self.add_token(TokenType::Plus),
            ';' => self.add_token(TokenType::Semicolon),
            '*' => self.add_token(TokenType::Star),

            // can be double char
            '!' => {
                if self.r#match('=') {
                    self.add_token(TokenType::BangEqual);
                } else {
                    self.add_token(TokenType::Bang);
                }
            }
            '=' => {
                if self.r#match('=') {
                    self.add_token(TokenType::EqualEqual);
                } else {
                    self.add_token(TokenType::Equal);
                }
            }
            '<' => {
                if self.r#match('=') {
                    self.add_token(TokenType::LessEqual);
                } else {
                    self.add_token(TokenType::Less);
                }
            }
            '>' => {
                if self.r#match('=') {
                    self.add_token(TokenType::GreaterEqual);
                } else {
                    self.add_token(TokenType::Greater);
                }
            }

            // can be a comment
            '/' => {
                if self.r#match('/') {
                    while self.peek() != '\n' && !self.is_at_end() {
                        self.advance();
                    }
                } else {
                    self.add_token(TokenType::Slash);
                }
            }

            // ignore whitespace
            ' ' | '\t' | '\r' => (),

            '\n' => {
                self.line += 1;
            }

            '"' => self.string(),

            c => {
                if c.is_ascii_digit() {
                    self.number()
                } else if c.is_alphabetic() || c == '_' {
                    self.identifier()
                } else {
                    self.error("Unexpected character.")
                }
            }
        }
    }

    // consume characters until the closing "; strings may span lines
    fn string(&mut self) {
        while self.peek() != '"' && !self.is_at_end() {
            if self.peek() == '\n' {
                self.line += 1;
            }
            self.advance();
        }

        if self.is_at_end() {
            self.error("Unterminated string.");
            return;
        }

        // the closing "
        self.advance();

        // trim the surrounding quotes
        let literal = self
            .source
            .get((self.start + 1)..(self.current - 1))
            .expect("Unexpected string end.")
            .to_string();

        self.add_token(TokenType::String { literal });
    }

    fn number(&mut self) {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        // consume the . only when a fractional part follows
        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            self.advance();

            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        let literal: f64 = self
            .source
            .get(self.start..self.current)
            .expect("Unexpected number end.")
            .parse()
            .expect("Scanned number could not be parsed");

        self.add_token(TokenType::Number { literal });
    }

    fn identifier(&mut self) {
        while self.peek().is_alphanumeric() || self.peek() == '_' {
            self.advance();
        }

        let text = self
            .source
            .get(self.start..self.current)
            .expect("Unexpected identifier end.");
        let tpe = KEYWORDS.get(text).cloned().unwrap_or(TokenType::Identifier);

        self.add_token(tpe);
    }

    fn advance(&mut self) -> char {
        let c = self.source[self.current..]
            .chars()
            .next()
            .expect("there is a next char");
        self.current += c.len_utf8();
        c
    }

    // like advance but doesn't consume the character
    fn peek(&self) -> char {
        self.source[self.current..].chars().next().unwrap_or('\0')
    }

    fn peek_next(&self) -> char {
        self.source[self.current..].chars().nth(1).unwrap_or('\0')
    }

    fn add_token(&mut self, token_type: TokenType) {
        let text = self
            .source
            .get(self.start..self.current)
            .expect("Source token is empty");
        self.tokens.push(Token::new(token_type, text, self.line));
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    // consume the current character only if it is the one we are looking for
    fn r#match(&mut self, expected: char) -> bool {
        if self.is_at_end() {
            return false;
        }

        if self.peek() != expected {
            return false;
        }

        self.current += expected.len_utf8();
        true
    }

    fn error(&mut self, message: &str) {
        error(self.line, message);
        self.had_error = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenType> {
        let mut scanner = Scanner::new(source.to_string());
        scanner
            .scan_tokens()
            .expect("scan failed")
            .iter()
            .map(|t| t.token_type.clone())
            .collect()
    }

    #[test]
    fn punctuation_and_operators() {
        assert_eq!(
            kinds("(){};,+-*!===<=>=!=<>/."),
            vec![
                TokenType::LeftParen,
                TokenType::RightParen,
                TokenType::LeftBrace,
                TokenType::RightBrace,
                TokenType::Semicolon,
                TokenType::Comma,
                TokenType::Plus,
                TokenType::Minus,
                TokenType::Star,
                TokenType::BangEqual,
                TokenType::EqualEqual,
                TokenType::LessEqual,
                TokenType::GreaterEqual,
                TokenType::BangEqual,
                TokenType::Less,
                TokenType::Greater,
                TokenType::Slash,
                TokenType::Dot,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn keywords_and_identifiers() {
        assert_eq!(
            kinds("var varx while whiled _tmp"),
            vec![
                TokenType::Var,
                TokenType::Identifier,
                TokenType::While,
                TokenType::Identifier,
                TokenType::Identifier,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn number_literals() {
        assert_eq!(
            kinds("12 12.5 12.name"),
            vec![
                TokenType::Number { literal: 12.0 },
                TokenType::Number { literal: 12.5 },
                // the dot is not consumed without a fractional digit
                TokenType::Number { literal: 12.0 },
                TokenType::Dot,
                TokenType::Identifier,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn string_literals_track_lines() {
        let mut scanner = Scanner::new("\"one\ntwo\" x".to_string());
        let tokens = scanner.scan_tokens().expect("scan failed");
        assert_eq!(
            tokens[0].token_type,
            TokenType::String {
                literal: "one\ntwo".to_string()
            }
        );
        // the identifier after the literal sits on line 2
        assert_eq!(tokens[1].line, 2);
    }

    #[test]
    fn multibyte_characters_scan_cleanly() {
        let mut scanner = Scanner::new("\"café\" + \"日本\"".to_string());
        let tokens = scanner.scan_tokens().expect("scan failed");
        assert_eq!(
            tokens[0].token_type,
            TokenType::String {
                literal: "café".to_string()
            }
        );
        assert_eq!(tokens[1].token_type, TokenType::Plus);
        assert_eq!(
            tokens[2].token_type,
            TokenType::String {
                literal: "日本".to_string()
            }
        );
        assert_eq!(tokens[3].token_type, TokenType::Eof);
    }

    #[test]
    fn comments_and_whitespace_are_skipped() {
        assert_eq!(
            kinds("a // the rest is ignored\nb"),
            vec![TokenType::Identifier, TokenType::Identifier, TokenType::Eof]
        );
    }

    #[test]
    fn unterminated_string_fails_the_scan() {
        let mut scanner = Scanner::new("\"open".to_string());
        assert!(scanner.scan_tokens().is_err());
    }

    #[test]
    fn unknown_character_fails_the_scan() {
        let mut scanner = Scanner::new("@".to_string());
        assert!(scanner.scan_tokens().is_err());
    }
}
