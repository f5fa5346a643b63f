use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::agents::AgentRegistry;
use crate::calls::store::{CallDirection, CallRecord, CallStatus, CallStore, NewCall};
use crate::config::Config;
use crate::providers::llm::ChatMessage;
use crate::routing::model::{CompleteOptions, ModelRouter};
use crate::routing::speech::{SpeakOptions, SpeechOutput, SpeechRouter};
use crate::session::{Channel, SessionStore, SpeakerRole};
use crate::speech_text::sanitize_for_speech;

const RETRY_PROMPT: &str = "Sorry, I didn't catch that. Could you say it again?";
const GOODBYE_PROMPT: &str = "It sounds like you're no longer there. Thanks for calling, goodbye!";
const APOLOGY_PROMPT: &str =
    "I'm sorry, I'm having a little trouble right now. Could you say that once more?";
const APOLOGY_HANGUP_PROMPT: &str =
    "I'm sorry, something went wrong on our end. Please call back in a few minutes. Goodbye.";

/// Session-data key counting consecutive listen attempts with no speech.
const NO_INPUT_KEY: &str = "no_input";

/// One inbound telephony event, delivered independently of all others.
#[derive(Debug, Clone)]
pub enum CallEvent {
    /// A call reached us (or an outbound call was answered).
    Incoming {
        call_id: String,
        from: String,
        to: String,
    },
    /// Speech recognition finished for one listen window. Empty text means
    /// the caller said nothing.
    Speech { call_id: String, text: String },
    /// Side-channel progress notification from the platform.
    Status {
        call_id: String,
        status: CallStatus,
        duration_secs: Option<u64>,
    },
}

impl CallEvent {
    fn call_id(&self) -> &str {
        match self {
            Self::Incoming { call_id, .. }
            | Self::Speech { call_id, .. }
            | Self::Status { call_id, .. } => call_id,
        }
    }
}

/// What the caller hears next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    /// Synthesized audio we host, played by URL.
    Audio { url: String },
    /// Text the telephony platform speaks itself with the named voice.
    Say { text: String, voice: String },
}

/// The machine's answer to one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Play the prompt, then listen for the caller's next utterance.
    PromptAndListen { prompt: Prompt },
    /// Play a final prompt, then end the call.
    PromptAndHangup { prompt: Prompt },
    /// End the call immediately.
    Hangup,
}

/// Turn-based orchestrator for telephone calls.
///
/// Each inbound event is handled to completion under a per-call lock, so
/// events for one call are strictly ordered while unrelated calls proceed in
/// parallel. Provider failures never surface to the caller as raw errors:
/// the machine substitutes an apology and keeps listening.
pub struct CallMachine {
    agents: Arc<AgentRegistry>,
    calls: CallStore,
    sessions: SessionStore,
    model: Arc<ModelRouter>,
    speech: Arc<SpeechRouter>,
    config: Arc<Config>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl CallMachine {
    pub fn new(
        agents: Arc<AgentRegistry>,
        calls: CallStore,
        sessions: SessionStore,
        model: Arc<ModelRouter>,
        speech: Arc<SpeechRouter>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            agents,
            calls,
            sessions,
            model,
            speech,
            config,
            locks: DashMap::new(),
        }
    }

    pub async fn handle_event(&self, event: CallEvent) -> Option<Instruction> {
        let call_id = event.call_id().to_string();
        if call_id.trim().is_empty() {
            // Malformed platform event: nothing to key the call by, so the
            // best we can do is apologize and end it.
            tracing::error!("Event without a call id");
            let prompt = self.speak(APOLOGY_HANGUP_PROMPT, "").await;
            return Some(Instruction::PromptAndHangup { prompt });
        }

        let lock = self.lock_for(&call_id);
        let _serial = lock.lock().await;

        match event {
            CallEvent::Incoming { call_id, from, to } => {
                Some(self.on_incoming(&call_id, from, to).await)
            }
            CallEvent::Speech { call_id, text } => Some(self.on_speech(&call_id, &text).await),
            CallEvent::Status {
                call_id,
                status,
                duration_secs,
            } => {
                self.on_status(&call_id, status, duration_secs).await;
                None
            }
        }
    }

    /// RINGING: resolve the persona, register the call, speak the greeting,
    /// start listening.
    async fn on_incoming(&self, call_id: &str, from: String, to: String) -> Instruction {
        let resolved = self
            .agents
            .resolve_by_number(&to, &self.config.agent.default_id)
            .await;

        let record = self
            .calls
            .register(
                call_id,
                NewCall {
                    from,
                    to,
                    direction: CallDirection::Inbound,
                    agent_id: resolved.id.clone(),
                },
            )
            .await;

        // An outbound call was registered at placement time with its own
        // persona; the idempotent register kept it, so honor that binding.
        let agent = if record.agent_id != resolved.id {
            self.agents.get(&record.agent_id).await.unwrap_or(resolved)
        } else {
            resolved
        };

        let greeting = if agent.greeting.trim().is_empty() {
            crate::greeting::select_greeting(&agent.name)
        } else {
            agent.greeting.clone()
        };

        let identity = identity_of(&record);
        let session = self.sessions.get_or_create(Channel::Voice, &identity);
        {
            let mut session = session.lock().await;
            session.set_counter(NO_INPUT_KEY, 0);
            session.step = "greeted".to_string();
            session.record(SpeakerRole::Agent, greeting.clone());
        }

        tracing::info!(call_id, agent = %agent.id, greeting = %greeting, "Call answered");
        let prompt = self.speak(&greeting, &agent.voice).await;
        Instruction::PromptAndListen { prompt }
    }

    /// LISTENING: a speech-recognition result arrived. Empty speech twice in
    /// a row ends the call; otherwise the reply pipeline runs.
    async fn on_speech(&self, call_id: &str, text: &str) -> Instruction {
        let record = match self.calls.get(call_id).await {
            Some(record) => record,
            None => {
                // Out-of-order delivery for a call we never saw: fall back
                // to the default persona rather than failing the event.
                tracing::warn!(call_id, "Speech for unknown call, registering stub");
                let agent = self
                    .agents
                    .resolve_by_number("", &self.config.agent.default_id)
                    .await;
                self.calls
                    .register(
                        call_id,
                        NewCall {
                            from: String::new(),
                            to: String::new(),
                            direction: CallDirection::Inbound,
                            agent_id: agent.id,
                        },
                    )
                    .await
            }
        };

        let agent = match self.agents.get(&record.agent_id).await {
            Some(agent) => agent,
            None => {
                self.agents
                    .resolve_by_number(&record.to, &self.config.agent.default_id)
                    .await
            }
        };

        let identity = identity_of(&record);
        let session = self.sessions.get_or_create(Channel::Voice, &identity);

        let trimmed = text.trim();
        if trimmed.is_empty() {
            let misses = {
                let mut session = session.lock().await;
                let misses = session.counter(NO_INPUT_KEY) + 1;
                session.set_counter(NO_INPUT_KEY, misses);
                session.touch();
                misses
            };

            if misses >= 2 {
                tracing::info!(call_id, "Second consecutive empty result, saying goodbye");
                let mut session = session.lock().await;
                session.step = "ended".to_string();
                drop(session);
                let prompt = self.speak(GOODBYE_PROMPT, &agent.voice).await;
                return Instruction::PromptAndHangup { prompt };
            }

            tracing::debug!(call_id, "Empty speech result, reprompting");
            let prompt = self.speak(RETRY_PROMPT, &agent.voice).await;
            return Instruction::PromptAndListen { prompt };
        }

        // RESPONDING: assemble persona + greeting + bounded history + the
        // new utterance, holding no session lock across provider calls.
        let turns = {
            let mut session = session.lock().await;
            session.set_counter(NO_INPUT_KEY, 0);
            session.record(SpeakerRole::Caller, trimmed);

            let greeting_turn = session
                .transcript
                .iter()
                .find(|t| t.role == SpeakerRole::Agent)
                .map(|t| t.text.clone())
                .or_else(|| {
                    (!agent.greeting.trim().is_empty()).then(|| agent.greeting.clone())
                });

            let mut turns = vec![ChatMessage::system(&agent.instructions)];
            if let Some(greeting) = greeting_turn {
                turns.push(ChatMessage::assistant(greeting));
            }
            let window = self.config.calls.history_window;
            let start = record.turns.len().saturating_sub(window);
            for turn in &record.turns[start..] {
                turns.push(ChatMessage::user(&turn.caller));
                turns.push(ChatMessage::assistant(&turn.agent));
            }
            turns.push(ChatMessage::user(trimmed));
            turns
        };

        let opts = CompleteOptions {
            channel: Some(Channel::Voice),
            ..Default::default()
        };
        let reply = match self.model.complete(&turns, &opts).await {
            Ok(completion) => sanitize_for_speech(&completion.text),
            Err(e) => {
                tracing::error!(call_id, "Model routing failed: {e}");
                String::new()
            }
        };

        if reply.is_empty() {
            // Keep the call alive: apologize and listen again instead of
            // surfacing the failure.
            let prompt = self.speak(APOLOGY_PROMPT, &agent.voice).await;
            return Instruction::PromptAndListen { prompt };
        }

        let prompt = self.speak(&reply, &agent.voice).await;

        self.calls.append_turn(call_id, trimmed, &reply).await;
        {
            let mut session = session.lock().await;
            session.record(SpeakerRole::Agent, reply.clone());
            session.step = "engaged".to_string();
        }

        tracing::info!(
            call_id,
            utterance = %trimmed,
            reply_len = reply.len(),
            "Turn completed"
        );
        Instruction::PromptAndListen { prompt }
    }

    /// Side-channel status notification: update the record, emit nothing.
    async fn on_status(&self, call_id: &str, status: CallStatus, duration_secs: Option<u64>) {
        let record = self.calls.update_status(call_id, status, duration_secs).await;
        tracing::info!(
            call_id,
            status = ?record.status,
            duration = ?record.duration_secs,
            "Status updated"
        );
        if record.status.is_terminal() {
            self.locks.remove(call_id);
        }
    }

    /// Register a record for a call we are about to place. The platform will
    /// deliver the answered call to the same incoming-event handling.
    pub async fn register_outbound(
        &self,
        call_id: &str,
        to: &str,
        agent_id: Option<&str>,
    ) -> CallRecord {
        let agent = match agent_id {
            Some(id) => self.agents.get(id).await,
            None => None,
        };
        let agent = match agent {
            Some(agent) => agent,
            None => {
                self.agents
                    .resolve_by_number(to, &self.config.agent.default_id)
                    .await
            }
        };

        self.calls
            .register(
                call_id,
                NewCall {
                    from: self.config.twilio.phone_number.clone(),
                    to: to.to_string(),
                    direction: CallDirection::Outbound,
                    agent_id: agent.id,
                },
            )
            .await
    }

    /// Synthesize a prompt, degrading to a platform-voice text directive when
    /// every synthesis provider is down.
    async fn speak(&self, text: &str, voice: &str) -> Prompt {
        let opts = SpeakOptions {
            provider: None,
            voice: (!voice.trim().is_empty()).then(|| voice.to_string()),
        };
        match self.speech.synthesize(text, &opts).await {
            Ok(reply) => match reply.output {
                SpeechOutput::Audio { id, .. } => Prompt::Audio {
                    url: format!(
                        "{}/audio/{id}",
                        self.config.server.external_url.trim_end_matches('/')
                    ),
                },
                SpeechOutput::PlatformVoice { voice } => Prompt::Say {
                    text: text.to_string(),
                    voice,
                },
            },
            Err(e) => {
                tracing::warn!("Speech routing failed, using platform voice: {e}");
                Prompt::Say {
                    text: text.to_string(),
                    voice: self.config.twilio.say_voice.clone(),
                }
            }
        }
    }

    fn lock_for(&self, call_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(call_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

fn identity_of(record: &CallRecord) -> String {
    if record.from.trim().is_empty() {
        record.call_id.clone()
    } else {
        record.from.clone()
    }
}
