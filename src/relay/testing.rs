//! Test doubles for the relay core.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::common::error::{RconError, RconResult, RelayError, RelayResult};
use crate::common::{Author, EVERYONE_ROLE};
use crate::protocol::rcon::RemoteConsole;
use crate::relay::sink::ReplySink;

/// Sink that records every message it is given.
#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    /// Make subsequent sends fail (nothing is recorded while failing).
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReplySink for RecordingSink {
    async fn send(&self, text: &str) -> RelayResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RelayError::Send {
                message: "sink offline".to_string(),
            });
        }
        self.messages.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Console that records commands and mimics avatar bookkeeping.
///
/// `execute unless entity @e[...tag=<id>] run summon ...` creates an entity
/// only when no entity with that tag exists yet, like the real server.
#[derive(Default)]
pub struct FakeConsole {
    commands: Mutex<Vec<String>>,
    entities: Mutex<HashSet<String>>,
    summons: AtomicUsize,
    fail: AtomicBool,
}

impl FakeConsole {
    pub fn failing() -> Self {
        let console = Self::default();
        console.fail.store(true, Ordering::SeqCst);
        console
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    /// Number of entities actually created.
    pub fn summons(&self) -> usize {
        self.summons.load(Ordering::SeqCst)
    }
}

fn selector_tag(command: &str) -> Option<&str> {
    let start = command.find("tag=")? + 4;
    let end = command[start..].find(']')? + start;
    Some(&command[start..end])
}

#[async_trait]
impl RemoteConsole for FakeConsole {
    async fn command(&self, text: &str) -> RconResult<String> {
        self.commands.lock().unwrap().push(text.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(RconError::ConnectionClosed);
        }

        if text.starts_with("execute unless entity") && text.contains(" run summon ") {
            if let Some(tag) = selector_tag(text) {
                if self.entities.lock().unwrap().insert(tag.to_string()) {
                    self.summons.fetch_add(1, Ordering::SeqCst);
                    return Ok("Summoned new Armor Stand".to_string());
                }
            }
            return Ok(String::new());
        }

        if text == "list" {
            return Ok("There are 1 of a max of 20 players online: Steve".to_string());
        }
        if text.starts_with("kill ") {
            let removed = self.entities.lock().unwrap().drain().count();
            return Ok(format!("Killed {} entities", removed));
        }

        Ok(String::new())
    }
}

/// A chat author holding `@everyone` plus the given roles.
pub fn author(name: &str, roles: &[&str]) -> Author {
    let mut all = vec![EVERYONE_ROLE.to_string()];
    all.extend(roles.iter().map(|r| r.to_string()));
    Author {
        id: 1000 + name.len() as u64,
        name: name.to_lowercase(),
        display_name: name.to_string(),
        roles: all,
    }
}
