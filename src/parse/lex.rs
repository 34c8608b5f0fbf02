//! Tokenizing assembly source.
//!
//! This module converts source text into a flat list of [`Token`]s.
//! Tokenization is a pure function of the source and a declarative rule set ([`LexRules`]):
//! which words are keywords, how comments are delimited, how strings, characters and
//! escapes are quoted, which prefixes select an integer base, and which delimiters
//! open and close a string interpolation block.
//!
//! Lexing never fails. Anything that cannot be lexed becomes a [`TokenKind::Error`]
//! token carrying a [`LexErr`], and the caller decides whether to abort.
//!
//! # Example
//! ```
//! use sectasm::parse::lex::{tokenize, LexRules, TokenKind, IntBase};
//!
//! let tokens = tokenize("li a0, 0x10 # load", &LexRules::default());
//! let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
//! assert_eq!(kinds, [
//!     TokenKind::Ident,
//!     TokenKind::Ident,
//!     TokenKind::Punct,
//!     TokenKind::Int(IntBase::Hex),
//!     TokenKind::Eof,
//! ]);
//! ```

use std::ops::Range;

use logos::Logos;

/// A unit of information in source code.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct Token {
    /// The text of the token, exactly as it appears in source.
    pub text: String,
    /// The kind of token.
    pub kind: TokenKind,
    /// The half-open byte range of the token in source.
    pub range: Range<usize>,
}
impl Token {
    /// Whether this token is whitespace or a comment.
    pub fn is_trivia(&self) -> bool {
        self.kind.is_trivia()
    }
}

/// The base of an integer literal.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum IntBase {
    #[allow(missing_docs)]
    Bin,
    #[allow(missing_docs)]
    Oct,
    #[allow(missing_docs)]
    Dec,
    #[allow(missing_docs)]
    Hex,
}
impl IntBase {
    /// The numeric radix of this base.
    pub fn radix(self) -> u32 {
        match self {
            IntBase::Bin => 2,
            IntBase::Oct => 8,
            IntBase::Dec => 10,
            IntBase::Hex => 16,
        }
    }
}

/// The shape of a floating point literal.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum FloatForm {
    /// `1.5`
    Plain,
    /// `1.5e3`
    Exponent,
}

/// The pieces a string literal is split into.
///
/// `"a\n${x}"` is lexed as `Open`, `Content`, `Escape`, `InterpOpen`,
/// (the tokens of `x`), `InterpClose`, `Close`.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum StrPart {
    /// The opening quote.
    Open,
    /// A run of literal characters.
    Content,
    /// An escape sequence (e.g., `\n`).
    Escape,
    /// The opening delimiter of an interpolation block.
    InterpOpen,
    /// The closing delimiter of an interpolation block.
    InterpClose,
    /// The closing quote.
    Close,
}

/// The kind of a [`Token`].
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum TokenKind {
    /// A reserved word (see [`LexRules::keywords`]).
    Keyword,
    /// An identifier, a directive name (`.text`), or the location counter (`.`).
    Ident,
    /// An integer literal.
    Int(IntBase),
    /// A floating point literal.
    Float(FloatForm),
    /// A character literal, including its quotes.
    Char,
    /// Part of a string literal.
    Str(StrPart),
    /// An operator (e.g., `+`, `<<`, `==`).
    Operator,
    /// Punctuation (e.g., `,`, `:`, `(`).
    Punct,
    /// Spaces and tabs.
    Whitespace,
    /// A line or block comment.
    Comment,
    /// A new line.
    Linebreak,
    /// The end of input. Always the last token.
    Eof,
    /// Something which could not be lexed.
    Error(LexErr),
}
impl TokenKind {
    /// Whether this kind of token is insignificant to the grammar.
    pub fn is_trivia(self) -> bool {
        matches!(self, TokenKind::Whitespace | TokenKind::Comment)
    }
}
impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Keyword => f.write_str("keyword"),
            TokenKind::Ident => f.write_str("identifier"),
            TokenKind::Int(_) => f.write_str("integer literal"),
            TokenKind::Float(_) => f.write_str("float literal"),
            TokenKind::Char => f.write_str("character literal"),
            TokenKind::Str(_) => f.write_str("string literal"),
            TokenKind::Operator => f.write_str("operator"),
            TokenKind::Punct => f.write_str("punctuation"),
            TokenKind::Whitespace => f.write_str("whitespace"),
            TokenKind::Comment => f.write_str("comment"),
            TokenKind::Linebreak => f.write_str("end of line"),
            TokenKind::Eof => f.write_str("end of file"),
            TokenKind::Error(_) => f.write_str("invalid token"),
        }
    }
}

/// Any errors raised in attempting to tokenize an input stream.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub enum LexErr {
    /// Integer literal has digits which are invalid for its base.
    InvalidNumeric(IntBase),
    /// Integer literal has a base prefix but no digits.
    EmptyNumeric,
    /// String literal is missing an end quotation mark.
    UnclosedStrLit,
    /// Character literal is missing an end quotation mark or is empty.
    UnclosedCharLit,
    /// Block comment is missing its end delimiter.
    UnclosedComment,
    /// Interpolation block inside a string literal is missing its end delimiter.
    UnclosedInterpolation,
    /// Escape sequence is not recognized.
    InvalidEscape,
    /// A symbol was used which does not start any token.
    #[default]
    InvalidSymbol,
}
impl std::fmt::Display for LexErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LexErr::InvalidNumeric(IntBase::Bin) => f.write_str("invalid binary literal"),
            LexErr::InvalidNumeric(IntBase::Oct) => f.write_str("invalid octal literal"),
            LexErr::InvalidNumeric(IntBase::Dec) => f.write_str("invalid decimal literal"),
            LexErr::InvalidNumeric(IntBase::Hex) => f.write_str("invalid hex literal"),
            LexErr::EmptyNumeric => f.write_str("integer literal has no digits"),
            LexErr::UnclosedStrLit => f.write_str("unclosed string literal"),
            LexErr::UnclosedCharLit => f.write_str("unclosed character literal"),
            LexErr::UnclosedComment => f.write_str("unclosed block comment"),
            LexErr::UnclosedInterpolation => f.write_str("unclosed interpolation block"),
            LexErr::InvalidEscape => f.write_str("invalid escape sequence"),
            LexErr::InvalidSymbol => f.write_str("unrecognized symbol"),
        }
    }
}
impl std::error::Error for LexErr {}
impl crate::err::Error for LexErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            LexErr::InvalidNumeric(IntBase::Bin) => Some("a binary literal only consists of digits 0-1".into()),
            LexErr::InvalidNumeric(IntBase::Oct) => Some("an octal literal only consists of digits 0-7".into()),
            LexErr::InvalidNumeric(IntBase::Dec) => Some("a decimal literal only consists of digits 0-9".into()),
            LexErr::InvalidNumeric(IntBase::Hex) => Some("a hex literal only consists of digits 0-9, A-F".into()),
            LexErr::EmptyNumeric => Some("there should be digits after the base prefix".into()),
            LexErr::UnclosedStrLit => Some("add a quote to the end of the string literal".into()),
            LexErr::UnclosedCharLit => Some("a character literal holds exactly one (possibly escaped) character".into()),
            LexErr::UnclosedComment => Some("add the closing delimiter of the block comment".into()),
            LexErr::UnclosedInterpolation => Some("close the interpolation block before the end of the string".into()),
            LexErr::InvalidEscape => Some("supported escapes are listed in the lexer rules".into()),
            LexErr::InvalidSymbol => Some("this char does not occur in any token".into()),
        }
    }
}

/// The declarative rule set that drives [`tokenize`].
///
/// The default rule set describes a GNU-as-like dialect.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct LexRules {
    /// Words which are lexed as [`TokenKind::Keyword`] instead of [`TokenKind::Ident`].
    ///
    /// By default, this is `true` and `false`.
    pub keywords: Vec<String>,

    /// Whether keywords match regardless of case.
    ///
    /// By default, this flag is `false`.
    pub case_insensitive_keywords: bool,

    /// Prefixes which start a comment spanning the remainder of the line.
    ///
    /// By default, this is `#` and `//`.
    pub line_comments: Vec<String>,

    /// The opening and closing delimiters of a block comment.
    ///
    /// By default, this is `/*` and `*/`.
    pub block_comment: Option<(String, String)>,

    /// The quote which opens and closes a string literal.
    pub string_quote: char,

    /// The quote which opens and closes a character literal, if any.
    pub char_quote: Option<char>,

    /// The recognized escapes, as pairs of (character after `\`, resulting character).
    pub escapes: Vec<(char, char)>,

    /// Case-insensitive prefixes which select the base of an integer literal.
    ///
    /// Integer literals without a matching prefix are decimal.
    pub int_prefixes: Vec<(String, IntBase)>,

    /// The opening and closing delimiters of an interpolation block inside a string literal.
    ///
    /// By default, this is `${` and `}`.
    pub interpolation: Option<(String, String)>,

    /// Whether whitespace tokens are kept in the output.
    ///
    /// By default, this flag is `false`.
    pub keep_whitespace: bool,

    /// Whether comment tokens are kept in the output.
    ///
    /// By default, this flag is `false`.
    pub keep_comments: bool,
}
impl Default for LexRules {
    fn default() -> Self {
        Self {
            keywords: vec!["true".into(), "false".into()],
            case_insensitive_keywords: false,
            line_comments: vec!["#".into(), "//".into()],
            block_comment: Some(("/*".into(), "*/".into())),
            string_quote: '"',
            char_quote: Some('\''),
            escapes: vec![('n', '\n'), ('r', '\r'), ('t', '\t'), ('0', '\0'), ('\\', '\\'), ('"', '"'), ('\'', '\'')],
            int_prefixes: vec![("0x".into(), IntBase::Hex), ("0b".into(), IntBase::Bin), ("0o".into(), IntBase::Oct)],
            interpolation: Some(("${".into(), "}".into())),
            keep_whitespace: false,
            keep_comments: false,
        }
    }
}
impl LexRules {
    fn is_keyword(&self, word: &str) -> bool {
        match self.case_insensitive_keywords {
            true => self.keywords.iter().any(|k| k.eq_ignore_ascii_case(word)),
            false => self.keywords.iter().any(|k| k == word),
        }
    }

    /// The base of a word which is an integer with a non-digit prefix (e.g., `$FF`).
    ///
    /// Words with such a prefix whose digits are invalid for the base (e.g., `$zz`) stay identifiers.
    fn word_int(&self, word: &str) -> Option<IntBase> {
        let prefixed = self.int_prefixes.iter().any(|(prefix, _)| {
            !prefix.starts_with(|c: char| c.is_ascii_digit())
                && word.get(..prefix.len()).is_some_and(|head| head.eq_ignore_ascii_case(prefix))
        });
        match prefixed {
            true => self.split_int(word).ok().map(|(base, _)| base),
            false => None,
        }
    }

    /// Decodes the character after an escaping backslash, if it is a recognized escape.
    pub fn escape(&self, c: char) -> Option<char> {
        self.escapes.iter().find(|&&(e, _)| e == c).map(|&(_, v)| v)
    }

    /// Splits an integer literal into its base and digits (with its prefix and `_` separators removed).
    ///
    /// This returns an error if the digits are empty or invalid for the base.
    ///
    /// # Example
    /// ```
    /// use sectasm::parse::lex::{IntBase, LexRules};
    ///
    /// let rules = LexRules::default();
    /// assert_eq!(rules.split_int("0x1_F"), Ok((IntBase::Hex, "1F".to_string())));
    /// assert_eq!(rules.split_int("42"), Ok((IntBase::Dec, "42".to_string())));
    /// assert!(rules.split_int("0b102").is_err());
    /// ```
    pub fn split_int(&self, text: &str) -> Result<(IntBase, String), LexErr> {
        let matched = self.int_prefixes.iter()
            .find(|(prefix, _)| {
                text.get(..prefix.len())
                    .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
            });

        let (base, rest) = match matched {
            Some((prefix, base)) => (*base, &text[prefix.len()..]),
            None => (IntBase::Dec, text),
        };

        let digits: String = rest.chars().filter(|&c| c != '_').collect();
        if digits.is_empty() {
            return Err(LexErr::EmptyNumeric);
        }
        match digits.chars().all(|c| c.is_digit(base.radix())) {
            true => Ok((base, digits)),
            false => Err(LexErr::InvalidNumeric(base)),
        }
    }
}

/// The fixed lexeme shapes which do not depend on [`LexRules`].
#[derive(Debug, Logos, PartialEq, Eq, Clone, Copy)]
#[logos(error = LexErr)]
enum Raw {
    #[regex(r"[ \t\x0C]+")]
    Whitespace,

    #[regex(r"\r?\n")]
    Linebreak,

    // Identifiers, directive names (`.text`), the location counter (`.`),
    // and section type markers (`@nobits`).
    #[regex(r"[A-Za-z_.$@][A-Za-z0-9_.$@]*")]
    Word,

    // Like the integer regex in most assemblers, this spans over tokens that
    // are technically invalid (e.g., `0x1G`), which get validated afterwards.
    #[regex(r"[0-9][0-9A-Za-z_]*")]
    Number,

    #[regex(r"[0-9][0-9_]*\.[0-9][0-9_]*")]
    Float,

    #[regex(r"[0-9][0-9_]*\.[0-9][0-9_]*[eE][+-]?[0-9]+")]
    FloatExp,

    #[token("+")]
    #[token("-")]
    #[token("*")]
    #[token("/")]
    #[token("%")]
    #[token("<<")]
    #[token(">>")]
    #[token("&")]
    #[token("|")]
    #[token("^")]
    #[token("~")]
    #[token("!")]
    #[token("&&")]
    #[token("||")]
    #[token("==")]
    #[token("!=")]
    #[token("<")]
    #[token("<=")]
    #[token(">")]
    #[token(">=")]
    #[token("=")]
    #[token("++")]
    #[token("--")]
    Operator,

    #[token(",")]
    #[token(":")]
    #[token(";")]
    #[token("(")]
    #[token(")")]
    #[token("[")]
    #[token("]")]
    #[token("{")]
    #[token("}")]
    Punct,
}

/// Tokenizes source text according to the provided rules.
///
/// The returned list always ends with a [`TokenKind::Eof`] token.
/// Tokenizing the same input twice always yields the same tokens.
pub fn tokenize(src: &str, rules: &LexRules) -> Vec<Token> {
    let mut lexer = Tokenizer { src, rules, out: vec![] };
    let end = lexer.run(0, None);
    lexer.push(TokenKind::Eof, end..end);
    lexer.out
}

struct Tokenizer<'s, 'r> {
    src: &'s str,
    rules: &'r LexRules,
    out: Vec<Token>,
}
impl Tokenizer<'_, '_> {
    fn push(&mut self, kind: TokenKind, range: Range<usize>) {
        let keep = match kind {
            TokenKind::Whitespace => self.rules.keep_whitespace,
            TokenKind::Comment => self.rules.keep_comments,
            _ => true,
        };
        if keep {
            self.out.push(Token { text: self.src[range.clone()].to_string(), kind, range });
        }
    }

    /// Lexes tokens from `pos` until the end of input, returning where it stopped.
    ///
    /// If `close` is set, this is lexing the inside of an interpolation block and
    /// stops before the closing delimiter (at brace depth 0) or before a new line.
    fn run(&mut self, mut pos: usize, close: Option<&str>) -> usize {
        let mut depth = 0usize;

        while pos < self.src.len() {
            let rest = &self.src[pos..];

            if let Some(close) = close {
                if depth == 0 && rest.starts_with(close) { break; }
                if rest.starts_with('\n') || rest.starts_with("\r\n") { break; }
            }

            if let Some(end) = self.lex_comment(pos) {
                pos = end;
                continue;
            }
            if rest.starts_with(self.rules.string_quote) {
                pos = self.lex_string(pos);
                continue;
            }
            if let Some(q) = self.rules.char_quote.filter(|&q| rest.starts_with(q)) {
                pos = self.lex_char(pos, q);
                continue;
            }

            let mut raw = Raw::lexer(rest);
            let Some(result) = raw.next() else { break };
            let span = raw.span();
            let range = (pos + span.start)..(pos + span.end);
            let text = &self.src[range.clone()];

            let kind = match result {
                Ok(Raw::Whitespace) => TokenKind::Whitespace,
                Ok(Raw::Linebreak) => TokenKind::Linebreak,
                Ok(Raw::Word) if self.rules.is_keyword(text) => TokenKind::Keyword,
                Ok(Raw::Word) => match self.rules.word_int(text) {
                    Some(base) => TokenKind::Int(base),
                    None => TokenKind::Ident,
                },
                Ok(Raw::Number) => match self.rules.split_int(text) {
                    Ok((base, _)) => TokenKind::Int(base),
                    Err(e) => TokenKind::Error(e),
                },
                Ok(Raw::Float) => TokenKind::Float(FloatForm::Plain),
                Ok(Raw::FloatExp) => TokenKind::Float(FloatForm::Exponent),
                Ok(Raw::Operator) => TokenKind::Operator,
                Ok(Raw::Punct) => {
                    match text {
                        "{" => depth += 1,
                        "}" => depth = depth.saturating_sub(1),
                        _ => {}
                    }
                    TokenKind::Punct
                }
                Err(e) => TokenKind::Error(e),
            };

            // Never stall: an error span always covers at least one character.
            let range = match range.is_empty() {
                true => pos..(pos + rest.chars().next().map_or(1, char::len_utf8)),
                false => range,
            };
            pos = range.end;
            self.push(kind, range);
        }

        pos
    }

    /// Lexes a comment at `pos` if one starts there, returning the end of the comment.
    fn lex_comment(&mut self, pos: usize) -> Option<usize> {
        let rest = &self.src[pos..];

        if let Some((open, close)) = &self.rules.block_comment {
            if rest.starts_with(open.as_str()) {
                let end = match rest[open.len()..].find(close.as_str()) {
                    Some(i) => pos + open.len() + i + close.len(),
                    None => {
                        self.push(TokenKind::Error(LexErr::UnclosedComment), pos..self.src.len());
                        return Some(self.src.len());
                    }
                };
                self.push(TokenKind::Comment, pos..end);
                return Some(end);
            }
        }

        if self.rules.line_comments.iter().any(|c| rest.starts_with(c.as_str())) {
            let len = rest.find(|c| c == '\r' || c == '\n').unwrap_or(rest.len());
            self.push(TokenKind::Comment, pos..(pos + len));
            return Some(pos + len);
        }

        None
    }

    /// Lexes a string literal starting at the opening quote at `pos`,
    /// returning the position after the literal.
    fn lex_string(&mut self, start: usize) -> usize {
        let quote = self.rules.string_quote;
        let interp = self.rules.interpolation.clone();

        let mut pos = start + quote.len_utf8();
        self.push(TokenKind::Str(StrPart::Open), start..pos);

        let mut content_start = pos;
        loop {
            let rest = &self.src[pos..];
            let at_interp = interp.as_ref().is_some_and(|(open, _)| rest.starts_with(open.as_str()));
            let at_special = rest.is_empty()
                || rest.starts_with(quote)
                || rest.starts_with('\\')
                || rest.starts_with('\n')
                || rest.starts_with("\r\n")
                || at_interp;

            if !at_special {
                pos += rest.chars().next().map_or(1, char::len_utf8);
                continue;
            }

            if content_start < pos {
                self.push(TokenKind::Str(StrPart::Content), content_start..pos);
            }

            if rest.starts_with(quote) {
                let end = pos + quote.len_utf8();
                self.push(TokenKind::Str(StrPart::Close), pos..end);
                return end;
            } else if rest.starts_with('\\') {
                match rest[1..].chars().next() {
                    Some(c) if c != '\n' && c != '\r' => {
                        let end = pos + 1 + c.len_utf8();
                        let kind = match self.rules.escape(c) {
                            Some(_) => TokenKind::Str(StrPart::Escape),
                            None => TokenKind::Error(LexErr::InvalidEscape),
                        };
                        self.push(kind, pos..end);
                        pos = end;
                    }
                    _ => {
                        self.push(TokenKind::Error(LexErr::UnclosedStrLit), pos..(pos + 1));
                        return pos + 1;
                    }
                }
            } else if let Some((open, close)) = interp.as_ref().filter(|_| at_interp) {
                let inner = pos + open.len();
                self.push(TokenKind::Str(StrPart::InterpOpen), pos..inner);

                pos = self.run(inner, Some(close));
                if self.src[pos..].starts_with(close.as_str()) {
                    self.push(TokenKind::Str(StrPart::InterpClose), pos..(pos + close.len()));
                    pos += close.len();
                } else {
                    self.push(TokenKind::Error(LexErr::UnclosedInterpolation), pos..pos);
                    self.push(TokenKind::Error(LexErr::UnclosedStrLit), pos..pos);
                    return pos;
                }
            } else {
                // Reached a new line or the end of input.
                self.push(TokenKind::Error(LexErr::UnclosedStrLit), pos..pos);
                return pos;
            }

            content_start = pos;
        }
    }

    /// Lexes a character literal starting at the opening quote at `pos`,
    /// returning the position after the literal.
    fn lex_char(&mut self, start: usize, quote: char) -> usize {
        let body = start + quote.len_utf8();
        let rest = &self.src[body..];
        let mut chars = rest.chars();

        let (len, kind) = match chars.next() {
            Some('\\') => match chars.next() {
                Some(c) if c != '\n' && c != '\r' => {
                    let kind = match self.rules.escape(c) {
                        Some(_) => TokenKind::Char,
                        None => TokenKind::Error(LexErr::InvalidEscape),
                    };
                    (1 + c.len_utf8(), kind)
                }
                _ => (1, TokenKind::Error(LexErr::UnclosedCharLit)),
            },
            Some(c) if c != quote && c != '\n' && c != '\r' => (c.len_utf8(), TokenKind::Char),
            _ => (0, TokenKind::Error(LexErr::UnclosedCharLit)),
        };

        let after = body + len;
        match self.src[after..].starts_with(quote) && len > 0 {
            true => {
                let end = after + quote.len_utf8();
                self.push(kind, start..end);
                end
            }
            false => {
                self.push(TokenKind::Error(LexErr::UnclosedCharLit), start..after);
                after
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{tokenize, FloatForm, IntBase, LexErr, LexRules, StrPart, Token, TokenKind};

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src, &LexRules::default())
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }
    fn texts(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn test_numeric_bases() {
        assert_eq!(kinds("0 123 0x7F 0XaB 0b101 0o17 1_000"), [
            TokenKind::Int(IntBase::Dec),
            TokenKind::Int(IntBase::Dec),
            TokenKind::Int(IntBase::Hex),
            TokenKind::Int(IntBase::Hex),
            TokenKind::Int(IntBase::Bin),
            TokenKind::Int(IntBase::Oct),
            TokenKind::Int(IntBase::Dec),
            TokenKind::Eof,
        ]);
    }

    #[test]
    fn test_numeric_invalid() {
        assert_eq!(kinds("0x1G")[0], TokenKind::Error(LexErr::InvalidNumeric(IntBase::Hex)));
        assert_eq!(kinds("0b12")[0], TokenKind::Error(LexErr::InvalidNumeric(IntBase::Bin)));
        assert_eq!(kinds("12ab")[0], TokenKind::Error(LexErr::InvalidNumeric(IntBase::Dec)));
        assert_eq!(kinds("0x")[0], TokenKind::Error(LexErr::EmptyNumeric));
    }

    #[test]
    fn test_floats() {
        assert_eq!(kinds("1.5 2.25e-3 3.0E10"), [
            TokenKind::Float(FloatForm::Plain),
            TokenKind::Float(FloatForm::Exponent),
            TokenKind::Float(FloatForm::Exponent),
            TokenKind::Eof,
        ]);
    }

    #[test]
    fn test_longest_match() {
        let tokens = tokenize("a<<=b&&c||d!=e", &LexRules::default());
        assert_eq!(texts(&tokens), ["a", "<<", "=", "b", "&&", "c", "||", "d", "!=", "e", ""]);

        let tokens = tokenize("x <= y ++", &LexRules::default());
        assert_eq!(texts(&tokens), ["x", "<=", "y", "++", ""]);
    }

    #[test]
    fn test_words() {
        let tokens = tokenize(".text . foo.bar $x @nobits _start true", &LexRules::default());
        assert_eq!(texts(&tokens), [".text", ".", "foo.bar", "$x", "@nobits", "_start", "true", ""]);
        let ks: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(ks[..7], [
            TokenKind::Ident, TokenKind::Ident, TokenKind::Ident, TokenKind::Ident,
            TokenKind::Ident, TokenKind::Ident, TokenKind::Keyword,
        ]);
    }

    #[test]
    fn test_keywords_case() {
        let rules = LexRules { case_insensitive_keywords: true, ..Default::default() };
        let tokens = tokenize("TRUE False", &rules);
        assert!(tokens[..2].iter().all(|t| t.kind == TokenKind::Keyword));

        let tokens = tokenize("TRUE False", &LexRules::default());
        assert!(tokens[..2].iter().all(|t| t.kind == TokenKind::Ident));
    }

    #[test]
    fn test_comments_and_lines() {
        let rules = LexRules { keep_comments: true, ..Default::default() };
        let tokens = tokenize("a # one\nb // two\r\nc /* three\n */ d", &rules);
        assert_eq!(texts(&tokens), ["a", "# one", "\n", "b", "// two", "\r\n", "c", "/* three\n */", "d", ""]);

        assert_eq!(kinds("a /* never closed"), [
            TokenKind::Ident,
            TokenKind::Error(LexErr::UnclosedComment),
            TokenKind::Eof,
        ]);
    }

    #[test]
    fn test_trivia_does_not_move_boundaries() {
        let src = "  mov a, b # c\n\t.byte 1,2 /* x */ , 3\n";
        let all = LexRules { keep_whitespace: true, keep_comments: true, ..Default::default() };

        let full = tokenize(src, &all);
        let trimmed = tokenize(src, &LexRules::default());
        let significant: Vec<_> = full.into_iter().filter(|t| !t.is_trivia()).collect();
        assert_eq!(significant, trimmed);
    }

    #[test]
    fn test_idempotent() {
        let src = ".asciz \"a${x + 1}b\\n\"\nlabel: jmp label # loop\n";
        let rules = LexRules::default();
        assert_eq!(tokenize(src, &rules), tokenize(src, &rules));
    }

    #[test]
    fn test_str() {
        let tokens = tokenize(r#""abc" "" "a\n""#, &LexRules::default());
        assert_eq!(texts(&tokens), ["\"", "abc", "\"", "\"", "\"", "\"", "a", "\\n", "\"", ""]);
        assert_eq!(tokens[0].kind, TokenKind::Str(StrPart::Open));
        assert_eq!(tokens[1].kind, TokenKind::Str(StrPart::Content));
        assert_eq!(tokens[7].kind, TokenKind::Str(StrPart::Escape));
        assert_eq!(tokens[8].kind, TokenKind::Str(StrPart::Close));
    }

    #[test]
    fn test_str_unclosed() {
        assert_eq!(kinds("\"abc\nx"), [
            TokenKind::Str(StrPart::Open),
            TokenKind::Str(StrPart::Content),
            TokenKind::Error(LexErr::UnclosedStrLit),
            TokenKind::Linebreak,
            TokenKind::Ident,
            TokenKind::Eof,
        ]);
    }

    #[test]
    fn test_str_invalid_escape() {
        // The invalid escape is reported, but the string still closes normally.
        assert_eq!(kinds(r#""a\qb""#), [
            TokenKind::Str(StrPart::Open),
            TokenKind::Str(StrPart::Content),
            TokenKind::Error(LexErr::InvalidEscape),
            TokenKind::Str(StrPart::Content),
            TokenKind::Str(StrPart::Close),
            TokenKind::Eof,
        ]);
    }

    #[test]
    fn test_str_interpolation() {
        let tokens = tokenize(r#""x${a + 1}y""#, &LexRules::default());
        assert_eq!(texts(&tokens), ["\"", "x", "${", "a", "+", "1", "}", "y", "\"", ""]);
        assert_eq!(tokens[2].kind, TokenKind::Str(StrPart::InterpOpen));
        assert_eq!(tokens[6].kind, TokenKind::Str(StrPart::InterpClose));

        // Braces inside the block only affect when the block ends.
        let tokens = tokenize(r#""${ {b} }""#, &LexRules::default());
        assert_eq!(texts(&tokens), ["\"", "${", "{", "b", "}", "}", "\"", ""]);
        assert_eq!(tokens[4].kind, TokenKind::Punct);
        assert_eq!(tokens[5].kind, TokenKind::Str(StrPart::InterpClose));

        // Nested strings recurse.
        let tokens = tokenize(r#""${"in"}""#, &LexRules::default());
        assert_eq!(texts(&tokens), ["\"", "${", "\"", "in", "\"", "}", "\"", ""]);

        assert_eq!(kinds("\"${a\n"), [
            TokenKind::Str(StrPart::Open),
            TokenKind::Str(StrPart::InterpOpen),
            TokenKind::Ident,
            TokenKind::Error(LexErr::UnclosedInterpolation),
            TokenKind::Error(LexErr::UnclosedStrLit),
            TokenKind::Linebreak,
            TokenKind::Eof,
        ]);
    }

    #[test]
    fn test_chars() {
        assert_eq!(kinds(r"'a' '\n' '\q' 'ab'"), [
            TokenKind::Char,
            TokenKind::Char,
            TokenKind::Error(LexErr::InvalidEscape),
            TokenKind::Error(LexErr::UnclosedCharLit),
            TokenKind::Ident,
            TokenKind::Error(LexErr::UnclosedCharLit),
            TokenKind::Eof,
        ]);
    }

    #[test]
    fn test_invalid_symbol() {
        for c in ['?', '\\', '`', '€'] {
            let s = c.to_string();
            assert_eq!(kinds(&s), [TokenKind::Error(LexErr::InvalidSymbol), TokenKind::Eof], "{c:?}");
        }
    }

    #[test]
    fn test_custom_rules() {
        let rules = LexRules {
            line_comments: vec![";".into()],
            int_prefixes: vec![("$".into(), IntBase::Hex)],
            interpolation: None,
            ..Default::default()
        };
        let tokens = tokenize("lda 1 ; comment\n\"${x}\"", &rules);
        assert_eq!(texts(&tokens), ["lda", "1", "\n", "\"", "${x}", "\"", ""]);

        let tokens = tokenize("$FF $1_0 $zz", &rules);
        let found: Vec<_> = tokens.iter()
            .filter(|t| t.kind != TokenKind::Whitespace)
            .map(|t| (t.text.as_str(), t.kind))
            .collect();
        assert_eq!(found, [
            ("$FF", TokenKind::Int(IntBase::Hex)),
            ("$1_0", TokenKind::Int(IntBase::Hex)),
            ("$zz", TokenKind::Ident),
            ("", TokenKind::Eof),
        ]);
        assert_eq!(rules.split_int("$FF"), Ok((IntBase::Hex, "FF".to_string())));
    }
}
