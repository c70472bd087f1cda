//! Conversation orchestration.
//!
//! [`Orchestrator::respond`] turns (history, context payload, question) into
//! one completion request and always returns text: provider failures become
//! an `Erreur: ...` reply instead of an error.
//!
//! [`Conversation`] is the per-user context object that runs the whole
//! pipeline for each question:
//!
//! ```text
//! question → classify → reference cache + environment → assemble
//!          → respond → in-memory history → store (best effort)
//! ```

use anyhow::Result;
use chrono::{DateTime, Duration, FixedOffset, Local};

use crate::classify::{Classifier, KeywordTable};
use crate::completion::{create_provider, ChatMessage, CompletionProvider};
use crate::config::{Config, HistoryConfig};
use crate::context::{ContextAssembler, ContextPayload};
use crate::loader::ReferenceCache;
use crate::models::{ConversationMessage, QuestionIntent, Role};
use crate::prompt::PromptBuilder;
use crate::store::ChatStore;
use crate::weather::{EnvironmentFetcher, EnvironmentSource};

/// Prefix of replies produced when the completion call fails.
pub const ERROR_PREFIX: &str = "Erreur: ";

/// Completion provider plus the instruction prompt template.
pub struct Orchestrator {
    provider: Box<dyn CompletionProvider>,
    prompt: PromptBuilder,
}

impl Orchestrator {
    pub fn new(provider: Box<dyn CompletionProvider>, prompt: PromptBuilder) -> Self {
        Self { provider, prompt }
    }

    /// System message, then prior turns, then the new question.
    pub fn build_messages(
        &self,
        history: &[ConversationMessage],
        payload: &ContextPayload,
        question: &str,
        persisted_history: &str,
        now: DateTime<FixedOffset>,
    ) -> Vec<ChatMessage> {
        let system = self.prompt.render(now, &payload.render(), persisted_history);
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(system));
        messages.extend(history.iter().map(ChatMessage::from));
        messages.push(ChatMessage::user(question));
        messages
    }

    pub async fn respond(
        &self,
        history: &[ConversationMessage],
        payload: &ContextPayload,
        question: &str,
        persisted_history: &str,
        now: DateTime<FixedOffset>,
    ) -> String {
        let messages = self.build_messages(history, payload, question, persisted_history, now);
        match self.provider.complete(&messages).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(model = %self.provider.model_name(), "completion failed: {}", e);
                format!("{}{}", ERROR_PREFIX, e)
            }
        }
    }
}

/// Outcome of one question.
#[derive(Debug, Clone)]
pub struct Turn {
    pub intent: QuestionIntent,
    pub payload: ContextPayload,
    pub reply: String,
}

pub struct Conversation {
    user: String,
    session_id: Option<i64>,
    history: Vec<ConversationMessage>,
    persisted_history: String,
    references: ReferenceCache,
    classifier: Classifier,
    assembler: ContextAssembler,
    environment: Box<dyn EnvironmentSource>,
    orchestrator: Orchestrator,
    store: Option<ChatStore>,
}

impl Conversation {
    pub fn new(
        user: impl Into<String>,
        references: ReferenceCache,
        classifier: Classifier,
        assembler: ContextAssembler,
        environment: Box<dyn EnvironmentSource>,
        orchestrator: Orchestrator,
    ) -> Self {
        Self {
            user: user.into(),
            session_id: None,
            history: Vec::new(),
            persisted_history: String::new(),
            references,
            classifier,
            assembler,
            environment,
            orchestrator,
            store: None,
        }
    }

    /// Wires every component from configuration. The store is optional.
    pub fn from_config(config: &Config, user: &str, store: Option<ChatStore>) -> Result<Self> {
        let conversation = Self::new(
            user,
            ReferenceCache::new(config.data.clone()),
            Classifier::new(KeywordTable::from_config(&config.classifier)),
            ContextAssembler::from_config(&config.context, config.weather.forecast_points),
            Box::new(EnvironmentFetcher::from_config(config)?),
            Orchestrator::new(create_provider(&config.completion)?, PromptBuilder::default()),
        );
        Ok(match store {
            Some(store) => conversation.with_store(store),
            None => conversation,
        })
    }

    pub fn with_store(mut self, store: ChatStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Resolves the user's active session and loads the persisted history
    /// block. Failures are logged; the conversation continues without them.
    pub async fn attach(&mut self, history: &HistoryConfig) {
        let Some(store) = &self.store else {
            return;
        };

        let window = Duration::hours(history.session_window_hours);
        match store.get_active_session(&self.user, window).await {
            Ok(id) => self.session_id = Some(id),
            Err(e) => tracing::warn!(user = %self.user, "could not resolve session: {:#}", e),
        }

        match store
            .format_history_for_ai(&self.user, history.max_messages)
            .await
        {
            Ok(block) => self.persisted_history = block,
            Err(e) => tracing::warn!(user = %self.user, "could not load history: {:#}", e),
        }
    }

    pub fn session_id(&self) -> Option<i64> {
        self.session_id
    }

    pub fn history(&self) -> &[ConversationMessage] {
        &self.history
    }

    pub fn persisted_history(&self) -> &str {
        &self.persisted_history
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Rescans the reference directory. Returns the number of documents.
    pub fn refresh(&mut self) -> usize {
        self.references.refresh().len()
    }

    pub async fn ask(&mut self, question: &str) -> Turn {
        self.ask_at(question, Local::now().fixed_offset()).await
    }

    pub async fn ask_at(&mut self, question: &str, now: DateTime<FixedOffset>) -> Turn {
        let intent = self.classifier.classify(question);
        let library = self.references.library();
        let payload = self
            .assembler
            .assemble(&intent, &library, self.environment.as_ref(), now)
            .await;

        let reply = self
            .orchestrator
            .respond(&self.history, &payload, question, &self.persisted_history, now)
            .await;

        self.history.push(ConversationMessage::new(Role::User, question));
        self.history.push(ConversationMessage::new(Role::Assistant, reply.clone()));
        self.persist(question, &reply, &intent).await;

        Turn {
            intent,
            payload,
            reply,
        }
    }

    async fn persist(&self, question: &str, reply: &str, intent: &QuestionIntent) {
        let (Some(store), Some(session_id)) = (&self.store, self.session_id) else {
            return;
        };
        let metadata = serde_json::to_value(intent).ok();

        let saved = async {
            store
                .save_message(session_id, &self.user, Role::User, question, metadata.as_ref())
                .await?;
            store
                .save_message(session_id, &self.user, Role::Assistant, reply, None)
                .await
        };
        if let Err(e) = saved.await {
            tracing::warn!(user = %self.user, session_id, "failed to persist turn: {:#}", e);
        }
    }
}
