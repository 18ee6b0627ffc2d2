//! Splits a migration unit's SQL text into individual statements.
//!
//! Statements end at `;`, except where the `;` appears inside:
//! - a string literal (`'...'`, with `''` escapes)
//! - a quoted identifier (`"..."`, `` `...` ``, `[...]`)
//! - a line comment (`-- ...`) or block comment (`/* ... */`)
//! - the `BEGIN ... END` body of a `CREATE TRIGGER` statement
//!
//! Fragments holding nothing but whitespace and comments are dropped.
//!
//! Anything beyond SQLite's quoting, comment and trigger syntax is not
//! recognised; migration authors must not rely on other constructs to carry
//! a bare `;`.

#[derive(Default)]
struct StatementScanner {
    current: String,
    has_code: bool,
    word: String,
    leading_words: Vec<String>,
    in_trigger_body: bool,
    case_depth: usize,
}

impl StatementScanner {
    fn push(&mut self, ch: char) {
        self.current.push(ch);
    }

    fn push_code(&mut self, ch: char) {
        if !ch.is_whitespace() {
            self.has_code = true;
        }
        self.current.push(ch);
    }

    fn feed_word_char(&mut self, ch: char) {
        self.word.push(ch);
        self.push_code(ch);
    }

    fn flush_word(&mut self) {
        if self.word.is_empty() {
            return;
        }
        let word = std::mem::take(&mut self.word).to_ascii_uppercase();
        if self.leading_words.len() < 4 {
            self.leading_words.push(word.clone());
        }
        if !self.is_trigger() {
            return;
        }
        match word.as_str() {
            "BEGIN" if !self.in_trigger_body => self.in_trigger_body = true,
            "CASE" if self.in_trigger_body => self.case_depth += 1,
            "END" if self.in_trigger_body => {
                if self.case_depth > 0 {
                    self.case_depth -= 1;
                } else {
                    self.in_trigger_body = false;
                }
            }
            _ => {}
        }
    }

    fn is_trigger(&self) -> bool {
        let words: Vec<&str> = self.leading_words.iter().map(String::as_str).collect();
        matches!(
            words.as_slice(),
            ["CREATE", "TRIGGER", ..]
                | ["CREATE", "TEMP", "TRIGGER", ..]
                | ["CREATE", "TEMPORARY", "TRIGGER", ..]
        )
    }

    /// Closes the current fragment, returning it when it holds any code.
    fn finish(&mut self) -> Option<String> {
        self.flush_word();
        let fragment = std::mem::take(&mut self.current);
        let has_code = self.has_code;
        *self = Self::default();
        if has_code {
            Some(fragment.trim().to_string())
        } else {
            None
        }
    }
}

pub fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut scanner = StatementScanner::default();
    let mut chars = sql.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            scanner.feed_word_char(ch);
            continue;
        }
        scanner.flush_word();

        match ch {
            '-' if chars.peek() == Some(&'-') => {
                scanner.push(ch);
                for next in chars.by_ref() {
                    scanner.push(next);
                    if next == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                scanner.push(ch);
                if let Some(star) = chars.next() {
                    scanner.push(star);
                }
                let mut previous = '\0';
                for next in chars.by_ref() {
                    scanner.push(next);
                    if previous == '*' && next == '/' {
                        break;
                    }
                    previous = next;
                }
            }
            '\'' | '"' | '`' => {
                scanner.push_code(ch);
                while let Some(next) = chars.next() {
                    scanner.push_code(next);
                    if next == ch {
                        // A doubled quote is an escaped quote, not the end of the literal
                        if chars.peek() == Some(&ch) {
                            if let Some(escaped) = chars.next() {
                                scanner.push_code(escaped);
                            }
                            continue;
                        }
                        break;
                    }
                }
            }
            '[' => {
                scanner.push_code(ch);
                for next in chars.by_ref() {
                    scanner.push_code(next);
                    if next == ']' {
                        break;
                    }
                }
            }
            ';' if !scanner.in_trigger_body => {
                if let Some(statement) = scanner.finish() {
                    statements.push(statement);
                }
            }
            _ => scanner.push_code(ch),
        }
    }

    if let Some(statement) = scanner.finish() {
        statements.push(statement);
    }
    statements
}

/// Upper-cased first keyword of a statement, skipping leading comments.
pub fn leading_keyword(statement: &str) -> Option<String> {
    let mut rest = statement.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.split_once('\n').map_or("", |(_, tail)| tail);
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map_or("", |(_, tail)| tail);
        } else {
            break;
        }
        rest = rest.trim_start();
    }
    let keyword: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    if keyword.is_empty() {
        None
    } else {
        Some(keyword.to_ascii_uppercase())
    }
}

/// Statements that open, close or abandon a transaction.
pub fn is_transaction_control(statement: &str) -> bool {
    matches!(
        leading_keyword(statement).as_deref(),
        Some("BEGIN" | "COMMIT" | "END" | "ROLLBACK")
    )
}
