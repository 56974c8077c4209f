//! Scriptable in-memory instrument
//!
//! `MockInstrument` is the shared, cloneable state of a fake power supply.
//! `MockTransport` is the transport a controller owns; it forwards to the
//! instrument so tests can keep a handle and inspect what was sent after the
//! transport has been boxed and moved into a controller.

use async_trait::async_trait;
use standrig_core::{Result, StandRigError};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::transport::InstrumentTransport;

/// Callback run when a command with a matching prefix is received
pub type CommandHook = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct MockState {
    /// Responses returned every time a query is received
    responses: HashMap<String, String>,
    /// One-shot responses consumed before `responses`
    queued: HashMap<String, VecDeque<String>>,
    /// Command prefix -> error message
    failures: Vec<(String, String)>,
    /// Command prefix -> callback
    hooks: Vec<(String, CommandHook)>,
    /// Every command received, in order
    log: Vec<String>,
    output_on: Option<bool>,
    close_count: usize,
}

/// Fake SCPI power supply
#[derive(Clone)]
pub struct MockInstrument {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockInstrument {
    fn default() -> Self {
        Self::new()
    }
}

impl MockInstrument {
    /// Instrument answering the identity handshake
    pub fn new() -> Self {
        let instrument = Self {
            state: Arc::new(Mutex::new(MockState::default())),
        };
        instrument
            .respond("*IDN?", "MOCK,PSU-3000,0001,1.0")
            .respond("SYST:VERS?", "1999.0");
        instrument
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answer `command` with `response` every time
    pub fn respond(&self, command: &str, response: &str) -> &Self {
        self.lock()
            .responses
            .insert(command.to_string(), response.to_string());
        self
    }

    /// Answer `command` with `response` once, ahead of any persistent response
    pub fn queue(&self, command: &str, response: &str) -> &Self {
        self.lock()
            .queued
            .entry(command.to_string())
            .or_default()
            .push_back(response.to_string());
        self
    }

    /// Fail every command starting with `prefix` with a protocol error
    pub fn fail_on(&self, prefix: &str, message: &str) -> &Self {
        self.lock()
            .failures
            .push((prefix.to_string(), message.to_string()));
        self
    }

    /// Run `hook` whenever a command starting with `prefix` is received
    pub fn on_command(&self, prefix: &str, hook: impl Fn(&str) + Send + Sync + 'static) -> &Self {
        let hook: CommandHook = Arc::new(hook);
        self.lock().hooks.push((prefix.to_string(), hook));
        self
    }

    /// Every command received so far
    pub fn commands(&self) -> Vec<String> {
        self.lock().log.clone()
    }

    /// Output state after the last `OUTP:STAT`, `None` if never switched
    pub fn output_on(&self) -> Option<bool> {
        self.lock().output_on
    }

    /// Number of times a transport to this instrument was closed
    pub fn close_count(&self) -> usize {
        self.lock().close_count
    }

    /// New open transport to this instrument
    pub fn transport(&self) -> Box<MockTransport> {
        Box::new(MockTransport {
            instrument: self.clone(),
            open: true,
            endpoint: "mock".to_string(),
        })
    }

    /// Record a command and decide its fate
    fn receive(&self, command: &str, is_query: bool) -> Result<Option<String>> {
        let hooks: Vec<CommandHook> = {
            let mut state = self.lock();
            state.log.push(command.to_string());

            if let Some((_, message)) = state
                .failures
                .iter()
                .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            {
                return Err(StandRigError::Protocol(message.clone()));
            }

            match command {
                "OUTP:STAT 1" => state.output_on = Some(true),
                "OUTP:STAT 0" => state.output_on = Some(false),
                _ => {}
            }

            state
                .hooks
                .iter()
                .filter(|(prefix, _)| command.starts_with(prefix.as_str()))
                .map(|(_, hook)| hook.clone())
                .collect()
        };

        // Hooks run unlocked so they may inspect the instrument
        for hook in hooks {
            hook(command);
        }

        if !is_query {
            return Ok(None);
        }

        let mut state = self.lock();
        if let Some(response) = state.queued.get_mut(command).and_then(VecDeque::pop_front) {
            return Ok(Some(response));
        }
        state
            .responses
            .get(command)
            .cloned()
            .map(Some)
            .ok_or_else(|| StandRigError::Timeout(format!("no response scripted for {}", command)))
    }
}

/// Transport connected to a [`MockInstrument`]
pub struct MockTransport {
    instrument: MockInstrument,
    open: bool,
    endpoint: String,
}

impl MockTransport {
    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(StandRigError::NotOpen(format!(
                "Mock transport {} is not open",
                self.endpoint
            )))
        }
    }
}

#[async_trait]
impl InstrumentTransport for MockTransport {
    async fn query(&mut self, command: &str) -> Result<String> {
        self.ensure_open()?;
        Ok(self
            .instrument
            .receive(command, true)?
            .unwrap_or_default())
    }

    async fn write(&mut self, command: &str) -> Result<()> {
        self.ensure_open()?;
        self.instrument.receive(command, false).map(|_| ())
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.instrument.lock().close_count += 1;
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
