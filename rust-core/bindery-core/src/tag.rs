//! # Field Tags
//!
//! Reader for the field tag mini-language: space separated `key:"value"`
//! pairs, values double-quoted with backslash escapes.
//!
//! ```text
//! param:"name" required:"name is required" len:"2-16" len-msg:"2 to 16 chars"
//! ```

/// Key renaming the field (`-` skips it)
pub const TAG_PARAM: &str = "param";
/// Key carrying a human description
pub const TAG_DESC: &str = "desc";
/// Key carrying the chrono format used for timestamp fields
pub const TAG_TIME_LAYOUT: &str = "time-layout";

/// A borrowed tag string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tag<'a>(&'a str);

impl<'a> Tag<'a> {
    /// Wrap a raw tag string
    #[must_use]
    pub const fn new(raw: &'a str) -> Self {
        Self(raw)
    }

    /// The raw tag text
    #[must_use]
    pub const fn as_str(&self) -> &'a str {
        self.0
    }

    /// Look up a key. Returns `None` if the key is absent.
    ///
    /// Parsing stops silently at the first malformed pair; use
    /// [`Tag::pairs`] to surface syntax errors.
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<String> {
        self.pairs()
            .map_while(std::result::Result::ok)
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    /// Look up a key, returning an empty string when absent
    #[must_use]
    pub fn get(&self, key: &str) -> String {
        self.lookup(key).unwrap_or_default()
    }

    /// Whether a key is present (even with an empty value)
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    /// Iterate over `(key, unquoted value)` pairs in order
    #[must_use]
    pub fn pairs(&self) -> Pairs<'a> {
        Pairs { rest: self.0 }
    }

    /// Validate the whole tag, reporting the first syntax error
    ///
    /// # Errors
    ///
    /// Returns a description of the first malformed pair.
    pub fn check(&self) -> std::result::Result<(), String> {
        self.pairs().try_for_each(|p| p.map(|_| ()))
    }
}

/// Iterator over the pairs of a [`Tag`]
#[derive(Debug, Clone)]
pub struct Pairs<'a> {
    rest: &'a str,
}

impl<'a> Iterator for Pairs<'a> {
    type Item = std::result::Result<(&'a str, String), String>;

    fn next(&mut self) -> Option<Self::Item> {
        let s = self.rest.trim_start();
        if s.is_empty() {
            self.rest = s;
            return None;
        }

        let key_end = s
            .find(|c: char| c == ':' || c == '"' || c.is_whitespace() || c.is_control())
            .unwrap_or(s.len());
        let key = &s[..key_end];
        let after = &s[key_end..];
        if key.is_empty() || !after.starts_with(":\"") {
            self.rest = "";
            return Some(Err(format!("malformed tag near `{s}`")));
        }

        let body = &after[2..];
        let mut value = String::new();
        let mut chars = body.char_indices();
        let mut close = None;
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    close = Some(i);
                    break;
                }
                '\\' => match chars.next() {
                    Some((_, '"')) => value.push('"'),
                    Some((_, '\\')) => value.push('\\'),
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, other)) => {
                        value.push('\\');
                        value.push(other);
                    }
                    None => break,
                },
                _ => value.push(c),
            }
        }

        match close {
            Some(i) => {
                self.rest = &body[i + 1..];
                Some(Ok((key, value)))
            }
            None => {
                self.rest = "";
                Some(Err(format!("unterminated value for tag key `{key}`")))
            }
        }
    }
}

/// The override-message key paired with a rule key (`len` -> `len-msg`)
#[must_use]
pub fn msg_key(key: &str) -> String {
    format!("{key}-msg")
}
