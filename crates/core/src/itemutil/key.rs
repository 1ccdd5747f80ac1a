use crate::error::KeyError;

fn is_key_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || b == b'-'
}

/// Split an item key such as `vfs.fs.size["/",free]` into its name and
/// parameter list.
///
/// Unquoted parameters run up to the next `,` or `]` with leading spaces
/// skipped. Quoted parameters honour `\"`. A bracketed array parameter is
/// returned as its raw inner text. `key[]` yields a single empty parameter.
pub fn parse_key(text: &str) -> Result<(String, Vec<String>), KeyError> {
    let name_len = text.bytes().take_while(|&b| is_key_char(b)).count();
    if name_len == 0 {
        return match text.chars().next() {
            None => Err(KeyError::Empty),
            Some(ch) => Err(KeyError::InvalidChar { ch, pos: 0 }),
        };
    }

    let key = text[..name_len].to_string();
    let rest = &text[name_len..];
    match rest.chars().next() {
        None => return Ok((key, Vec::new())),
        Some('[') => {}
        Some(ch) => return Err(KeyError::InvalidChar { ch, pos: name_len }),
    }

    let mut cursor = Cursor {
        text: &rest[1..],
        pos: 0,
        base: name_len + 1,
    };
    let params = cursor.params()?;
    if cursor.pos != cursor.text.len() {
        return Err(KeyError::TrailingData);
    }
    Ok((key, params))
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
    base: usize,
}

impl Cursor<'_> {
    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_spaces(&mut self) {
        while self.peek() == Some(' ') {
            self.pos += 1;
        }
    }

    /// Parses the parameter list; the opening bracket is already consumed.
    fn params(&mut self) -> Result<Vec<String>, KeyError> {
        let mut params = Vec::new();
        loop {
            self.skip_spaces();
            let param = match self.peek() {
                Some('"') => self.quoted()?,
                Some('[') => self.array()?,
                _ => self.unquoted()?,
            };
            params.push(param);

            self.skip_spaces();
            match self.bump() {
                Some(',') => continue,
                Some(']') => return Ok(params),
                Some(ch) => {
                    return Err(KeyError::UnexpectedChar {
                        ch,
                        pos: self.base + self.pos - ch.len_utf8(),
                    });
                }
                None => return Err(KeyError::UnterminatedParams),
            }
        }
    }

    fn unquoted(&mut self) -> Result<String, KeyError> {
        let start = self.pos;
        loop {
            match self.peek() {
                Some(',') | Some(']') => return Ok(self.text[start..self.pos].to_string()),
                Some(_) => {
                    self.bump();
                }
                None => return Err(KeyError::UnterminatedParams),
            }
        }
    }

    fn quoted(&mut self) -> Result<String, KeyError> {
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                Some('\\') if self.peek() == Some('"') => {
                    self.bump();
                    value.push('"');
                }
                Some('"') => return Ok(value),
                Some(ch) => value.push(ch),
                None => return Err(KeyError::UnterminatedQuote),
            }
        }
    }

    fn array(&mut self) -> Result<String, KeyError> {
        self.bump();
        let start = self.pos;
        let mut quoted = false;
        loop {
            match self.bump() {
                Some('\\') if quoted && self.peek() == Some('"') => {
                    self.bump();
                }
                Some('"') => quoted = !quoted,
                Some('[') if !quoted => return Err(KeyError::NestedArray),
                Some(']') if !quoted => return Ok(self.text[start..self.pos - 1].to_string()),
                Some(_) => {}
                None if quoted => return Err(KeyError::UnterminatedQuote),
                None => return Err(KeyError::UnterminatedParams),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(key: &str) -> Vec<String> {
        parse_key(key).unwrap().1
    }

    #[test]
    fn plain_key_has_no_params() {
        let (key, params) = parse_key("agent.ping").unwrap();
        assert_eq!(key, "agent.ping");
        assert!(params.is_empty());
    }

    #[test]
    fn unquoted_params() {
        let (key, params) = parse_key("system.cpu.load[all,avg1]").unwrap();
        assert_eq!(key, "system.cpu.load");
        assert_eq!(params, vec!["all", "avg1"]);
    }

    #[test]
    fn empty_brackets_yield_one_empty_param() {
        assert_eq!(params("key[]"), vec![""]);
        assert_eq!(params("key[a,]"), vec!["a", ""]);
    }

    #[test]
    fn leading_spaces_are_skipped() {
        assert_eq!(params("key[ a, b]"), vec!["a", "b"]);
    }

    #[test]
    fn quoted_params_keep_commas_and_escapes() {
        assert_eq!(params(r#"vfs.fs.size["/ mnt,x",free]"#), vec!["/ mnt,x", "free"]);
        assert_eq!(params(r#"key["a\"b"]"#), vec!["a\"b"]);
        assert_eq!(params(r#"key["a" , b]"#), vec!["a", "b"]);
    }

    #[test]
    fn array_param_is_raw_inner_text() {
        assert_eq!(params("key[[a,b],c]"), vec!["a,b", "c"]);
        assert_eq!(params(r#"key[["x]",y]]"#), vec![r#""x]",y"#]);
    }

    #[test]
    fn rejects_malformed_keys() {
        assert_eq!(parse_key(""), Err(KeyError::Empty));
        assert_eq!(parse_key("[a]"), Err(KeyError::InvalidChar { ch: '[', pos: 0 }));
        assert_eq!(parse_key("ke y"), Err(KeyError::InvalidChar { ch: ' ', pos: 2 }));
        assert_eq!(parse_key("key[a"), Err(KeyError::UnterminatedParams));
        assert_eq!(parse_key("key[\"a"), Err(KeyError::UnterminatedQuote));
        assert_eq!(parse_key("key[[a,[b]]]"), Err(KeyError::NestedArray));
        assert_eq!(parse_key("key[a]x"), Err(KeyError::TrailingData));
        assert_eq!(
            parse_key("key[\"a\"x]"),
            Err(KeyError::UnexpectedChar { ch: 'x', pos: 7 })
        );
    }
}
