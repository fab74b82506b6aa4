//! Interactive prompt detection over a live output stream.
//!
//! Remote administrative commands prompt inline (privilege-escalation
//! passwords, yes/no confirmations), and those prompts do not end on any
//! buffering boundary. The scanner therefore accumulates the in-progress
//! line and tests it after every appended byte. Matching is a permissive
//! prefix/suffix check; a false positive just writes an answer the remote
//! side ignores.

const SUDO_PREFIX: &[u8] = b"[sudo] password for ";
const SUDO_SUFFIX: &[u8] = b": ";
const CONFIRM_DEFAULT_YES: &[u8] = b"[Y/n] ";
const CONFIRM_DEFAULT_NO: &[u8] = b"[y/N]: ";

/// What the session driver must do with scanned output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// A completed output line, ready for the reporter.
    Line(String),
    /// Bytes to write back into the remote terminal.
    Respond(String),
}

/// Incremental scanner for one interactive session.
#[derive(Debug)]
pub struct PromptScanner {
    password: String,
    line: Vec<u8>,
}

impl PromptScanner {
    pub fn new(password: &str) -> Self {
        Self {
            password: password.to_string(),
            line: Vec::new(),
        }
    }

    /// Feed one chunk of remote output. Chunk boundaries are arbitrary;
    /// every byte is handled individually.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Action> {
        let mut actions = Vec::new();
        for &byte in bytes {
            self.push(byte, &mut actions);
        }
        actions
    }

    /// Flush the unterminated tail once the stream has closed.
    pub fn finish(mut self) -> Option<String> {
        if self.line.is_empty() {
            None
        } else {
            Some(self.take_line())
        }
    }

    fn push(&mut self, byte: u8, actions: &mut Vec<Action>) {
        if byte == b'\n' {
            actions.push(Action::Line(self.take_line()));
            return;
        }
        self.line.push(byte);
        // A response fires only on the byte that completes the pattern;
        // any further output unmatches the suffix, so each prompt
        // occurrence is answered exactly once.
        if self.line.starts_with(SUDO_PREFIX) && self.line.ends_with(SUDO_SUFFIX) {
            actions.push(Action::Respond(format!("{}\n", self.password)));
        } else if self.line.ends_with(CONFIRM_DEFAULT_YES)
            || self.line.ends_with(CONFIRM_DEFAULT_NO)
        {
            actions.push(Action::Respond("y\n".to_string()));
        }
    }

    fn take_line(&mut self) -> String {
        if self.line.last() == Some(&b'\r') {
            self.line.pop();
        }
        let text = String::from_utf8_lossy(&self.line).into_owned();
        self.line.clear();
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn responses(actions: &[Action]) -> Vec<&str> {
        actions
            .iter()
            .filter_map(|action| match action {
                Action::Respond(text) => Some(text.as_str()),
                Action::Line(_) => None,
            })
            .collect()
    }

    #[test]
    fn sudo_prompt_answered_exactly_once() {
        let mut scanner = PromptScanner::new("secret");
        let actions = scanner.feed(b"[sudo] password for alice: ");
        assert_eq!(actions, vec![Action::Respond("secret\n".to_string())]);

        // Whatever follows unmatches the suffix; no second write.
        let actions = scanner.feed(b"request continues");
        assert!(responses(&actions).is_empty());
    }

    #[test]
    fn sudo_prompt_fires_once_across_arbitrary_chunks() {
        let mut scanner = PromptScanner::new("secret");
        let mut writes = 0;
        for &byte in b"[sudo] password for alice: ".iter() {
            writes += responses(&scanner.feed(&[byte])).len();
        }
        assert_eq!(writes, 1);
    }

    #[test]
    fn sudo_prompt_requires_the_prefix() {
        let mut scanner = PromptScanner::new("secret");
        let actions = scanner.feed(b"password for alice: ");
        assert!(responses(&actions).is_empty());
    }

    #[test]
    fn confirmation_prompts_get_a_yes() {
        let mut scanner = PromptScanner::new("secret");
        let actions = scanner.feed(b"Do you want to continue? [Y/n] ");
        assert_eq!(responses(&actions), ["y\n"]);

        let mut scanner = PromptScanner::new("secret");
        let actions = scanner.feed(b"Remove 12 packages? [y/N]: ");
        assert_eq!(responses(&actions), ["y\n"]);
    }

    #[test]
    fn empty_password_writes_bare_newline() {
        let mut scanner = PromptScanner::new("");
        let actions = scanner.feed(b"[sudo] password for root: ");
        assert_eq!(responses(&actions), ["\n"]);
    }

    #[test]
    fn lines_split_on_newline_only() {
        let mut scanner = PromptScanner::new("");
        let actions = scanner.feed(b"one\ntwo\n");
        assert_eq!(
            actions,
            vec![
                Action::Line("one".to_string()),
                Action::Line("two".to_string()),
            ]
        );
    }

    #[test]
    fn trailing_carriage_return_is_stripped() {
        let mut scanner = PromptScanner::new("");
        let actions = scanner.feed(b"hello\r\n");
        assert_eq!(actions, vec![Action::Line("hello".to_string())]);
    }

    #[test]
    fn interior_carriage_return_is_not_a_delimiter() {
        let mut scanner = PromptScanner::new("");
        let actions = scanner.feed(b"a\rb\n");
        assert_eq!(actions, vec![Action::Line("a\rb".to_string())]);
    }

    #[test]
    fn answered_prompt_still_emits_its_line() {
        let mut scanner = PromptScanner::new("secret");
        let actions = scanner.feed(b"[sudo] password for alice: \n");
        assert_eq!(
            actions,
            vec![
                Action::Respond("secret\n".to_string()),
                Action::Line("[sudo] password for alice: ".to_string()),
            ]
        );
    }

    #[test]
    fn prompts_answered_in_sequence() {
        let mut scanner = PromptScanner::new("secret");
        let mut actions = scanner.feed(b"[sudo] password for alice: \r\n");
        actions.extend(scanner.feed(b"After this operation, proceed? [Y/n] "));
        assert_eq!(responses(&actions), ["secret\n", "y\n"]);
    }

    #[test]
    fn finish_flushes_the_unterminated_tail() {
        let mut scanner = PromptScanner::new("");
        scanner.feed(b"no newline here");
        assert_eq!(scanner.finish(), Some("no newline here".to_string()));

        let scanner = PromptScanner::new("");
        assert_eq!(scanner.finish(), None);
    }

    #[test]
    fn invalid_utf8_is_replaced_not_dropped() {
        let mut scanner = PromptScanner::new("");
        let actions = scanner.feed(b"caf\xff\n");
        assert_eq!(actions, vec![Action::Line("caf\u{FFFD}".to_string())]);
    }
}
