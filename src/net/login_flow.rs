use thiserror::Error;
use tracing::{info, warn};

use crate::persistence::password::{hash_password, verify_password};
use crate::persistence::record::CharacterRecord;
use crate::persistence::store::CharacterStore;

const NAME_PROMPT: &str = "By what name do you wish to be known? ";

#[derive(Debug, Clone)]
pub struct LoginFlowConfig {
    pub min_name_len: usize,
    pub max_name_len: usize,
    pub min_password_len: usize,
    pub banner: String,
    pub welcome: String,
}

impl Default for LoginFlowConfig {
    fn default() -> Self {
        Self {
            min_name_len: 3,
            max_name_len: 12,
            min_password_len: 5,
            banner: "\r\nWelcome to DikuMUD.\r\n\r\n".to_string(),
            welcome: "\r\nWelcome to the land of DikuMUD. May your visit here be... Enjoyable.\r\n\r\n"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    CollectingName,
    CollectingPassword,
    ConfirmingNewCharacter,
    CollectingNewPassword,
    ConfirmingNewPassword,
    Playing,
    Disconnected,
}

/// What the connection should do with the line it just read.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionStep {
    Reply(String),
    Enter {
        record: CharacterRecord,
        greeting: String,
    },
    Command(String),
    Ignore,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LoginError {
    #[error("session is closed")]
    Closed,
}

/// Session Protocol State Machine. Knows nothing about sockets; the
/// connection feeds it lines and acts on the returned step.
#[derive(Debug)]
pub struct LoginFlow {
    config: LoginFlowConfig,
    state: SessionState,
    name: Option<String>,
    record: Option<CharacterRecord>,
    new_password: Option<String>,
}

impl Default for LoginFlow {
    fn default() -> Self {
        Self::new(LoginFlowConfig::default())
    }
}

impl LoginFlow {
    pub fn new(config: LoginFlowConfig) -> Self {
        Self {
            config,
            state: SessionState::CollectingName,
            name: None,
            record: None,
            new_password: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// First thing a new connection sees.
    pub fn greeting(&self) -> String {
        format!("{}{}", self.config.banner, NAME_PROMPT)
    }

    pub fn handle_line(
        &mut self,
        line: &str,
        store: &dyn CharacterStore,
    ) -> Result<SessionStep, LoginError> {
        let step = match self.state {
            SessionState::Disconnected => return Err(LoginError::Closed),
            SessionState::CollectingName => self.collect_name(line.trim(), store),
            SessionState::CollectingPassword => self.check_password(line),
            SessionState::ConfirmingNewCharacter => self.confirm_new_character(line.trim()),
            SessionState::CollectingNewPassword => self.collect_new_password(line),
            SessionState::ConfirmingNewPassword => self.confirm_new_password(line, store),
            SessionState::Playing => {
                if line.trim().is_empty() {
                    SessionStep::Ignore
                } else {
                    SessionStep::Command(line.to_string())
                }
            }
        };
        Ok(step)
    }

    /// The world would not take the character; start over at the name prompt.
    pub fn enter_refused(&mut self, reason: &str) -> String {
        self.restart();
        format!("{}\r\n{}", reason, NAME_PROMPT)
    }

    pub fn disconnect(&mut self) {
        self.state = SessionState::Disconnected;
        self.record = None;
        self.new_password = None;
    }

    fn restart(&mut self) {
        self.state = SessionState::CollectingName;
        self.name = None;
        self.record = None;
        self.new_password = None;
    }

    fn valid_name(&self, name: &str) -> bool {
        (self.config.min_name_len..=self.config.max_name_len).contains(&name.len())
            && name.chars().all(|ch| ch.is_ascii_alphabetic())
    }

    fn collect_name(&mut self, input: &str, store: &dyn CharacterStore) -> SessionStep {
        if !self.valid_name(input) {
            return SessionStep::Reply("Illegal name, please try another.\r\nName: ".to_string());
        }
        let name = normalize_name(input);
        if store.exists(&name) {
            match store.load(&name) {
                Ok(Some(record)) => {
                    self.name = Some(record.name.clone());
                    self.record = Some(record);
                    self.state = SessionState::CollectingPassword;
                    return SessionStep::Reply("Password: ".to_string());
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(%name, error = %err, "character load failed");
                    return SessionStep::Reply(format!(
                        "Sorry, that character cannot be loaded right now.\r\n{}",
                        NAME_PROMPT
                    ));
                }
            }
        }
        let reply = format!("Did I get that right, {} (Y/N)? ", name);
        self.name = Some(name);
        self.state = SessionState::ConfirmingNewCharacter;
        SessionStep::Reply(reply)
    }

    fn check_password(&mut self, attempt: &str) -> SessionStep {
        let Some(mut record) = self.record.take() else {
            self.restart();
            return SessionStep::Reply(NAME_PROMPT.to_string());
        };
        if !verify_password(&record.password, attempt) {
            info!(name = %record.name, "wrong password");
            self.restart();
            return SessionStep::Reply(format!("Wrong password.\r\n{}", NAME_PROMPT));
        }
        if !record.password.starts_with("sha1$") {
            record.password = hash_password(attempt);
        }
        self.state = SessionState::Playing;
        SessionStep::Enter {
            record,
            greeting: self.config.welcome.clone(),
        }
    }

    fn confirm_new_character(&mut self, answer: &str) -> SessionStep {
        let answer = answer.to_ascii_lowercase();
        match answer.as_str() {
            "y" | "yes" => {
                self.state = SessionState::CollectingNewPassword;
                SessionStep::Reply(format!(
                    "New character.\r\nGive me a password for {}: ",
                    self.name.as_deref().unwrap_or("yourself")
                ))
            }
            "n" | "no" => {
                self.restart();
                SessionStep::Reply("Ok, what IS it, then? ".to_string())
            }
            _ => SessionStep::Reply("Please type Yes or No: ".to_string()),
        }
    }

    fn collect_new_password(&mut self, password: &str) -> SessionStep {
        if password.len() < self.config.min_password_len {
            return SessionStep::Reply("Illegal password.\r\nPassword: ".to_string());
        }
        self.new_password = Some(password.to_string());
        self.state = SessionState::ConfirmingNewPassword;
        SessionStep::Reply("Please retype password: ".to_string())
    }

    fn confirm_new_password(&mut self, password: &str, store: &dyn CharacterStore) -> SessionStep {
        if self.new_password.as_deref() != Some(password) {
            self.new_password = None;
            self.state = SessionState::CollectingNewPassword;
            return SessionStep::Reply("Passwords don't match.\r\nRetype password: ".to_string());
        }
        let Some(name) = self.name.clone() else {
            self.restart();
            return SessionStep::Reply(NAME_PROMPT.to_string());
        };
        let record = CharacterRecord::new(&name, hash_password(password));
        match store.create(&record) {
            Ok(true) => {}
            Ok(false) => {
                self.restart();
                return SessionStep::Reply(format!(
                    "Someone else just claimed that name.\r\n{}",
                    NAME_PROMPT
                ));
            }
            Err(err) => {
                warn!(%name, error = %err, "new character could not be saved");
                self.restart();
                return SessionStep::Reply(format!(
                    "Your character could not be created right now.\r\n{}",
                    NAME_PROMPT
                ));
            }
        }
        info!(%name, "new character created");
        self.new_password = None;
        self.state = SessionState::Playing;
        SessionStep::Enter {
            record,
            greeting: self.config.welcome.clone(),
        }
    }
}

/// `bOB` becomes `Bob`.
pub fn normalize_name(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::store::MemoryCharacterStore;

    fn reply(step: SessionStep) -> String {
        match step {
            SessionStep::Reply(text) => text,
            other => panic!("expected a reply, got {:?}", other),
        }
    }

    #[test]
    fn new_character_walks_every_state() {
        let store = MemoryCharacterStore::new();
        let mut flow = LoginFlow::default();
        assert!(flow.greeting().ends_with(NAME_PROMPT));

        let text = reply(flow.handle_line("bOB", &store).unwrap());
        assert_eq!(text, "Did I get that right, Bob (Y/N)? ");
        assert_eq!(flow.state(), SessionState::ConfirmingNewCharacter);

        reply(flow.handle_line("maybe", &store).unwrap());
        assert_eq!(flow.state(), SessionState::ConfirmingNewCharacter);
        reply(flow.handle_line("y", &store).unwrap());
        assert_eq!(flow.state(), SessionState::CollectingNewPassword);

        reply(flow.handle_line("abc", &store).unwrap());
        assert_eq!(flow.state(), SessionState::CollectingNewPassword);
        reply(flow.handle_line("hunter22", &store).unwrap());
        reply(flow.handle_line("hunter23", &store).unwrap());
        assert_eq!(flow.state(), SessionState::CollectingNewPassword);
        reply(flow.handle_line("hunter22", &store).unwrap());

        let step = flow.handle_line("hunter22", &store).unwrap();
        let SessionStep::Enter { record, .. } = step else {
            panic!("expected to enter the game");
        };
        assert_eq!(record.name, "Bob");
        assert!(verify_password(&record.password, "hunter22"));
        assert_eq!(flow.state(), SessionState::Playing);
        assert!(store.exists("bob"));
    }

    #[test]
    fn invalid_names_reprompt_without_moving() {
        let store = MemoryCharacterStore::new();
        let mut flow = LoginFlow::default();
        for bad in ["", "Al", "Bob1", "Averyveryverylongname", "Bo b"] {
            let text = reply(flow.handle_line(bad, &store).unwrap());
            assert!(text.starts_with("Illegal name"), "{}", bad);
            assert_eq!(flow.state(), SessionState::CollectingName);
        }
    }

    #[test]
    fn name_length_limits_are_inclusive() {
        let store = MemoryCharacterStore::new();
        for (name, shown) in [("Ann", "Ann"), ("ABCDEFGHIJKL", "Abcdefghijkl")] {
            let mut flow = LoginFlow::default();
            let text = reply(flow.handle_line(name, &store).unwrap());
            assert_eq!(text, format!("Did I get that right, {} (Y/N)? ", shown));
            assert_eq!(flow.state(), SessionState::ConfirmingNewCharacter);
        }
        let mut flow = LoginFlow::default();
        for bad in ["Jo", "Abcdefghijklm"] {
            let text = reply(flow.handle_line(bad, &store).unwrap());
            assert!(text.starts_with("Illegal name"), "{}", bad);
            assert_eq!(flow.state(), SessionState::CollectingName);
        }
    }

    #[test]
    fn two_sessions_racing_for_one_name_only_create_it_once() {
        let store = MemoryCharacterStore::new();
        let mut first = LoginFlow::default();
        let mut second = LoginFlow::default();
        for (flow, password) in [(&mut first, "hunter22"), (&mut second, "swordfish")] {
            reply(flow.handle_line("Bob", &store).unwrap());
            reply(flow.handle_line("y", &store).unwrap());
            reply(flow.handle_line(password, &store).unwrap());
            assert_eq!(flow.state(), SessionState::ConfirmingNewPassword);
        }

        let step = first.handle_line("hunter22", &store).unwrap();
        assert!(matches!(step, SessionStep::Enter { .. }));
        let text = reply(second.handle_line("swordfish", &store).unwrap());
        assert!(text.starts_with("Someone else just claimed that name."));
        assert_eq!(second.state(), SessionState::CollectingName);

        let saved = store.load("Bob").unwrap().unwrap();
        assert!(verify_password(&saved.password, "hunter22"));
        assert!(!verify_password(&saved.password, "swordfish"));
    }

    #[test]
    fn declining_the_name_starts_over() {
        let store = MemoryCharacterStore::new();
        let mut flow = LoginFlow::default();
        reply(flow.handle_line("Bob", &store).unwrap());
        reply(flow.handle_line("no", &store).unwrap());
        assert_eq!(flow.state(), SessionState::CollectingName);
        assert_eq!(flow.name(), None);
    }

    #[test]
    fn existing_character_needs_the_right_password() {
        let store = MemoryCharacterStore::new();
        store
            .save(&CharacterRecord::new("Bob", hash_password("hunter22")))
            .unwrap();
        let mut flow = LoginFlow::default();
        assert_eq!(reply(flow.handle_line("bob", &store).unwrap()), "Password: ");
        let text = reply(flow.handle_line("wrong", &store).unwrap());
        assert!(text.starts_with("Wrong password."));
        assert_eq!(flow.state(), SessionState::CollectingName);

        reply(flow.handle_line("Bob", &store).unwrap());
        let step = flow.handle_line("hunter22", &store).unwrap();
        assert!(matches!(step, SessionStep::Enter { .. }));
    }

    #[test]
    fn legacy_plaintext_is_rehashed_on_login() {
        let store = MemoryCharacterStore::new();
        store
            .save(&CharacterRecord::new("Bob", "oldpass".to_string()))
            .unwrap();
        let mut flow = LoginFlow::default();
        reply(flow.handle_line("Bob", &store).unwrap());
        let SessionStep::Enter { record, .. } = flow.handle_line("oldpass", &store).unwrap() else {
            panic!("expected to enter the game");
        };
        assert!(record.password.starts_with("sha1$"));
        assert!(verify_password(&record.password, "oldpass"));
    }

    #[test]
    fn playing_forwards_lines_verbatim() {
        let store = MemoryCharacterStore::new();
        store
            .save(&CharacterRecord::new("Bob", "oldpass".to_string()))
            .unwrap();
        let mut flow = LoginFlow::default();
        reply(flow.handle_line("Bob", &store).unwrap());
        flow.handle_line("oldpass", &store).unwrap();
        assert_eq!(
            flow.handle_line("  say  hi ", &store).unwrap(),
            SessionStep::Command("  say  hi ".to_string())
        );
        assert_eq!(flow.handle_line("   ", &store).unwrap(), SessionStep::Ignore);

        flow.disconnect();
        assert_eq!(flow.handle_line("look", &store), Err(LoginError::Closed));
    }

    #[test]
    fn refused_entry_returns_to_the_name_prompt() {
        let store = MemoryCharacterStore::new();
        let mut flow = LoginFlow::default();
        reply(flow.handle_line("Bob", &store).unwrap());
        let text = flow.enter_refused("That character is already playing.");
        assert!(text.ends_with(NAME_PROMPT));
        assert_eq!(flow.state(), SessionState::CollectingName);
    }
}
