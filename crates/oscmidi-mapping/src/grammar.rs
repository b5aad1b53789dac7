//! Recursive-descent parser for one mapping rule.
//!
//! ```text
//! rule     ::= path [argtypes] ',' [arglist] ':' command '(' arglist ')' {';'} ['#' comment]
//! arglist  ::= [arg] {',' [arg]}
//! arg      ::= number | number '-' number | [prefix] variable [postfix]
//! prefix   ::= '-' | number ('+'|'-') [number '*'] | number '*'
//! postfix  ::= ('*'|'/') number [('+'|'-') number] | ('+'|'-') number
//! ```
//!
//! The parser only checks the shape of the line and folds each argument's
//! conditioning into a `(scale, offset)` pair. Meaning (known commands,
//! keyword positions, variable resolution) is left to the compiler.

use crate::error::SyntaxError;

/// OSC type tags accepted in a rule's type string.
pub const OSC_TYPE_TAGS: &str = "ihsSbfdtcmTFNI";

/// One argument as written in the rule.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgSyntax<'a> {
    Blank,
    Number(f64),
    Range(f64, f64),
    /// `scale * name + offset`
    Variable {
        name: &'a str,
        scale: f64,
        offset: f64,
    },
}

/// A syntactically valid rule, borrowed from the source line.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSyntax<'a> {
    pub path: &'a str,
    pub types: &'a str,
    pub osc_args: Vec<ArgSyntax<'a>>,
    pub command: &'a str,
    pub midi_args: Vec<ArgSyntax<'a>>,
}

/// Parse one config line.
pub fn parse_rule(line: &str) -> Result<RuleSyntax<'_>, SyntaxError> {
    let mut cur = Cursor::new(line);

    cur.skip_ws();
    if cur.at_end() {
        return Err(cur.error("expected osc path"));
    }
    let path = cur.take_while(|c| !c.is_whitespace());
    cur.skip_ws();

    let types = cur.take_while(|c| !c.is_whitespace() && c != ',' && c != ':');
    cur.skip_ws();
    if !cur.eat(',') {
        return Err(cur.error("expected ','"));
    }
    cur.skip_ws();

    let mut osc_args = Vec::new();
    while !cur.at_end() && cur.peek() != Some(':') {
        osc_args.push(cur.arg(':')?);
        if cur.at_end() || cur.peek() == Some(':') {
            break;
        }
        if !cur.eat(',') {
            return Err(cur.error("expected ',' or ':'"));
        }
        cur.skip_ws();
    }
    if !cur.eat(':') {
        return Err(cur.error("expected ':'"));
    }
    cur.skip_ws();

    if cur.at_end() || cur.peek() == Some('(') {
        return Err(cur.error("expected midi command"));
    }
    let command = cur.take_while(|c| !c.is_whitespace() && c != '(');
    cur.skip_ws();
    if !cur.eat('(') {
        return Err(cur.error("expected '('"));
    }
    cur.skip_ws();
    if cur.at_end() || cur.peek() == Some(')') {
        return Err(cur.error("expected midi arguments"));
    }

    let mut midi_args = Vec::new();
    while !cur.at_end() && cur.peek() != Some(')') {
        midi_args.push(cur.arg(')')?);
        if cur.at_end() || cur.peek() == Some(')') {
            break;
        }
        if !cur.eat(',') {
            return Err(cur.error("expected ',' or ')'"));
        }
        cur.skip_ws();
    }
    if !cur.eat(')') {
        return Err(cur.error("expected ')'"));
    }

    cur.take_while(|c| c.is_whitespace() || c == ';');
    if !cur.at_end() && cur.peek() != Some('#') {
        return Err(cur.error("expected end of line or comment"));
    }

    Ok(RuleSyntax {
        path,
        types,
        osc_args,
        command,
        midi_args,
    })
}

/// Longest numeric prefix of `s` (sign, digits, fraction, exponent), with
/// its byte length. Words like `inf` are not numbers here.
pub(crate) fn scan_number(s: &str) -> Option<(f64, usize)> {
    let bytes = s.as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        i += 1;
    }
    let int_start = i;
    while bytes.get(i).is_some_and(u8::is_ascii_digit) {
        i += 1;
    }
    let mut digits = i - int_start;
    if bytes.get(i) == Some(&b'.') {
        let frac_start = i + 1;
        let mut j = frac_start;
        while bytes.get(j).is_some_and(u8::is_ascii_digit) {
            j += 1;
        }
        digits += j - frac_start;
        if digits > 0 {
            i = j;
        }
    }
    if digits == 0 {
        return None;
    }
    if matches!(bytes.get(i), Some(b'e' | b'E')) {
        let mut j = i + 1;
        if matches!(bytes.get(j), Some(b'+' | b'-')) {
            j += 1;
        }
        let exp_start = j;
        while bytes.get(j).is_some_and(u8::is_ascii_digit) {
            j += 1;
        }
        if j > exp_start {
            i = j;
        }
    }
    s[..i].parse().ok().map(|value| (value, i))
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    #[inline]
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    #[inline]
    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    #[inline]
    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn take_while(&mut self, mut pred: impl FnMut(char) -> bool) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        &self.src[start..self.pos]
    }

    fn skip_ws(&mut self) {
        self.take_while(char::is_whitespace);
    }

    fn number(&mut self) -> Option<f64> {
        let (value, len) = scan_number(self.rest())?;
        self.pos += len;
        Some(value)
    }

    fn error(&self, reason: &'static str) -> SyntaxError {
        SyntaxError {
            line: self.src.trim_end_matches(['\n', '\r']).to_string(),
            offset: self.pos,
            reason,
        }
    }

    /// One argument, stopping before `,`, `delim` or end of line.
    fn arg(&mut self, delim: char) -> Result<ArgSyntax<'a>, SyntaxError> {
        let mut scale = 1.0;
        let mut offset = 0.0;
        let mut prefixed = false;

        let rest = self.rest();
        let unary_minus = rest.starts_with('-')
            && !rest[1..].starts_with(|c: char| c.is_ascii_digit() || c == '.');
        if unary_minus {
            prefixed = true;
            scale = -1.0;
            self.pos += 1;
            self.skip_ws();
        } else if let Some(first) = self.number() {
            prefixed = true;
            self.skip_ws();
            let op = match self.peek() {
                Some(op @ ('+' | '-' | '*')) => op,
                _ => return Ok(ArgSyntax::Number(first)),
            };
            self.pos += 1;
            self.skip_ws();
            if op == '*' {
                scale = first;
            } else {
                offset = first;
                if op == '-' {
                    scale = -1.0;
                }
                if let Some(second) = self.number() {
                    self.skip_ws();
                    let op2 = self.peek();
                    if op == '-' && (op2 == Some(',') || op2 == Some(delim)) {
                        return Ok(ArgSyntax::Range(first, second));
                    }
                    if op2 != Some('*') {
                        return Err(self.error("expected '*'"));
                    }
                    self.pos += 1;
                    self.skip_ws();
                    scale *= second;
                }
            }
        }

        let name = self.take_while(|c| {
            !c.is_whitespace() && !"+-*/,".contains(c) && c != delim
        });
        if prefixed && name.is_empty() {
            return Err(self.error("expected variable"));
        }
        self.skip_ws();

        if let Some(op @ ('+' | '-' | '*' | '/')) = self.peek() {
            if name.is_empty() {
                return Err(self.error("expected variable"));
            }
            self.pos += 1;
            self.skip_ws();
            let value = self.number().ok_or_else(|| self.error("expected number"))?;
            self.skip_ws();
            match op {
                '+' => offset += value,
                '-' => offset -= value,
                '*' => scale *= value,
                _ => scale /= value,
            }
            if matches!(op, '*' | '/') {
                if let Some(op2 @ ('+' | '-')) = self.peek() {
                    self.pos += 1;
                    self.skip_ws();
                    let value = self.number().ok_or_else(|| self.error("expected number"))?;
                    self.skip_ws();
                    if op2 == '+' {
                        offset += value;
                    } else {
                        offset -= value;
                    }
                }
            }
        }

        if name.is_empty() {
            Ok(ArgSyntax::Blank)
        } else {
            Ok(ArgSyntax::Variable {
                name,
                scale,
                offset,
            })
        }
    }
}
