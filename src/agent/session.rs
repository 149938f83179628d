//! Lazily initialized agent sessions.
//!
//! A [`SessionManager`] owns one connection to the automation environment and
//! one engine attached to the agent built on it. Setup runs at most once per
//! successful initialization; concurrent callers wait on the same lock and
//! find the session ready. Submissions are served one at a time, in arrival
//! order, by the same lock.

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::config::{Config, SessionConfig};
use crate::credentials::{CredentialSource, EnvCredentials};
use crate::error::{AgentError, InitError, InitStage};
use crate::tools::{AutomationEnvironment, Connection, McpEnvironment};
use crate::types::ToolDescriptor;

use super::core::{Agent, AgentDefinition};
use super::engine::{Engine, OpenAiEngine, ReasoningEngine, RequestParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Initializing,
    Ready,
    ShutDown,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Uninitialized => "idle",
            SessionPhase::Initializing => "starting",
            SessionPhase::Ready => "ready",
            SessionPhase::ShutDown => "closed",
        };
        f.write_str(name)
    }
}

/// External services a session is built from
#[derive(Clone)]
pub struct Collaborators {
    pub environment: Arc<dyn AutomationEnvironment>,
    pub reasoning: Arc<dyn ReasoningEngine>,
    pub credentials: Arc<dyn CredentialSource>,
}

impl Collaborators {
    /// MCP servers from `[servers]`, an OpenAI-compatible engine, and the
    /// API key from the environment or `secrets.toml`
    pub fn from_config(config: &Config) -> Self {
        Collaborators {
            environment: Arc::new(McpEnvironment::new(config.servers.clone())),
            reasoning: Arc::new(OpenAiEngine::new(config.llm.clone())),
            credentials: Arc::new(EnvCredentials::with_default_secrets(
                config.llm.api_key_env.clone(),
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionMetadata {
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
    pub submissions: usize,
    pub failures: usize,
}

/// Handles held while initialized; `engine` is present iff the session is ready
#[derive(Default)]
struct Session {
    connection: Option<Arc<dyn Connection>>,
    agent: Option<Arc<Agent>>,
    engine: Option<Arc<dyn Engine>>,
    shut_down: bool,
}

impl Session {
    fn take_connection(&mut self) -> Option<Arc<dyn Connection>> {
        self.engine = None;
        self.agent = None;
        self.connection.take()
    }
}

/// Puts the phase back to `Uninitialized` unless initialization completed
struct InitGuard<'a> {
    phase: &'a watch::Sender<SessionPhase>,
    completed: bool,
}

impl Drop for InitGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.phase.send_replace(SessionPhase::Uninitialized);
        }
    }
}

/// Closes a just-opened connection if setup is dropped before it finishes
struct PendingConnection {
    connection: Option<Arc<dyn Connection>>,
    session_id: String,
}

impl PendingConnection {
    fn new(connection: Arc<dyn Connection>, session_id: &str) -> Self {
        PendingConnection {
            connection: Some(connection),
            session_id: session_id.to_string(),
        }
    }

    fn disarm(&mut self) {
        self.connection = None;
    }
}

impl Drop for PendingConnection {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };
        let session_id = std::mem::take(&mut self.session_id);

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                log::info!("[{}] setup abandoned, closing connection", session_id);
                runtime.spawn(async move {
                    if let Err(e) = connection.close().await {
                        log::warn!("[{}] failed to close connection: {:#}", session_id, e);
                    }
                });
            }
            Err(_) => log::warn!("[{}] setup abandoned outside a runtime", session_id),
        }
    }
}

async fn run_stage<T>(
    stage: InitStage,
    limit: Duration,
    work: impl Future<Output = anyhow::Result<T>>,
) -> Result<T, InitError> {
    match tokio::time::timeout(limit, work).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(cause)) => Err(InitError::Failed { stage, cause }),
        Err(_) => Err(InitError::Timeout { stage, after: limit }),
    }
}

pub struct SessionManager {
    id: String,
    definition: AgentDefinition,
    params: RequestParams,
    timeouts: SessionConfig,
    collaborators: Collaborators,
    session: Mutex<Session>,
    phase: watch::Sender<SessionPhase>,
    metadata: StdMutex<SessionMetadata>,
}

impl SessionManager {
    pub fn new(id: impl Into<String>, config: &Config, collaborators: Collaborators) -> Self {
        let (phase, _) = watch::channel(SessionPhase::Uninitialized);

        SessionManager {
            id: id.into(),
            definition: AgentDefinition::from_config(&config.agent),
            params: RequestParams::from_config(&config.llm),
            timeouts: config.session.clone(),
            collaborators,
            session: Mutex::new(Session::default()),
            phase,
            metadata: StdMutex::new(SessionMetadata {
                created_at: Utc::now(),
                last_used: None,
                submissions: 0,
                failures: 0,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// First eight characters of the id, for display
    pub fn short_id(&self) -> &str {
        self.id.get(..8).unwrap_or(&self.id)
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    pub fn is_initialized(&self) -> bool {
        self.phase() == SessionPhase::Ready
    }

    /// Watch phase transitions
    pub fn subscribe(&self) -> watch::Receiver<SessionPhase> {
        self.phase.subscribe()
    }

    pub fn metadata(&self) -> SessionMetadata {
        match self.metadata.lock() {
            Ok(metadata) => metadata.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn agent_definition(&self) -> &AgentDefinition {
        &self.definition
    }

    /// Initialize once; later calls return immediately
    pub async fn ensure_ready(&self) -> Result<(), InitError> {
        let mut session = self.session.lock().await;
        self.ready_engine(&mut session).await.map(|_| ())
    }

    pub async fn submit(&self, command: &str) -> Result<String, AgentError> {
        self.submit_with_cancel(command, &CancellationToken::new()).await
    }

    /// Like [`submit`](Self::submit), abandoning the request once `cancel` fires
    pub async fn submit_with_cancel(
        &self,
        command: &str,
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        if self.collaborators.credentials.credential().is_none() {
            return Err(AgentError::MissingCredential {
                var: self.collaborators.credentials.name().to_string(),
            });
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AgentError::Cancelled),
            result = self.run(command) => result,
        };

        self.record(&result);
        result
    }

    /// Tools currently offered by the agent's servers
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, AgentError> {
        let mut session = self.session.lock().await;
        self.ready_engine(&mut session).await?;

        let agent = session
            .agent
            .clone()
            .ok_or_else(|| AgentError::ExecutionFailed(anyhow!("agent missing from a ready session")))?;
        agent.list_tools().await.map_err(AgentError::ExecutionFailed)
    }

    /// Messages recorded so far; zero before initialization
    pub async fn history_len(&self) -> usize {
        let session = self.session.lock().await;
        match &session.engine {
            Some(engine) => engine.history_len().await,
            None => 0,
        }
    }

    pub async fn clear_history(&self) {
        let session = self.session.lock().await;
        if let Some(engine) = &session.engine {
            engine.clear_history().await;
        }
    }

    /// Drop the connection and engine; the next submission initializes again
    pub async fn reset(&self) {
        let mut session = self.session.lock().await;
        if let Some(connection) = session.take_connection() {
            self.close(connection).await;
        }
        if !session.shut_down {
            self.phase.send_replace(SessionPhase::Uninitialized);
        }
    }

    /// Release everything; later submissions fail with `ShutDown`
    pub async fn shutdown(&self) {
        let mut session = self.session.lock().await;
        session.shut_down = true;
        if let Some(connection) = session.take_connection() {
            self.close(connection).await;
        }
        self.phase.send_replace(SessionPhase::ShutDown);
        log::info!("[{}] session closed", self.short_id());
    }

    async fn run(&self, command: &str) -> Result<String, AgentError> {
        // Held until the reply arrives: one submission at a time, FIFO.
        let mut session = self.session.lock().await;
        let engine = self.ready_engine(&mut session).await?;

        let limit = self.timeouts.request_timeout();
        let started = Instant::now();
        log::info!("[{}] ▶ {}", self.short_id(), command);

        match tokio::time::timeout(limit, engine.generate(command, &self.params)).await {
            Ok(Ok(reply)) => {
                log::info!("[{}] ✅ answered in {:.1?}", self.short_id(), started.elapsed());
                Ok(reply)
            }
            Ok(Err(cause)) => {
                log::warn!("[{}] ❌ {:#}", self.short_id(), cause);
                Err(AgentError::ExecutionFailed(cause))
            }
            Err(_) => Err(AgentError::Timeout {
                operation: "waiting for the agent's response".to_string(),
                after: limit,
            }),
        }
    }

    async fn ready_engine(&self, session: &mut Session) -> Result<Arc<dyn Engine>, InitError> {
        if session.shut_down {
            return Err(InitError::ShutDown);
        }
        if let Some(engine) = &session.engine {
            return Ok(engine.clone());
        }

        self.phase.send_replace(SessionPhase::Initializing);
        let mut guard = InitGuard {
            phase: &self.phase,
            completed: false,
        };

        match self.initialize().await {
            Ok((connection, agent, engine)) => {
                session.connection = Some(connection);
                session.agent = Some(agent);
                session.engine = Some(engine.clone());
                guard.completed = true;
                self.phase.send_replace(SessionPhase::Ready);
                Ok(engine)
            }
            Err(e) => {
                log::warn!("[{}] initialization failed: {}", self.short_id(), e);
                Err(e)
            }
        }
    }

    async fn initialize(
        &self,
    ) -> Result<(Arc<dyn Connection>, Arc<Agent>, Arc<dyn Engine>), InitError> {
        let started = Instant::now();
        log::info!("[{}] connecting to the automation environment", self.short_id());

        let connection = run_stage(
            InitStage::Connect,
            self.timeouts.connect_timeout(),
            self.collaborators.environment.connect(),
        )
        .await?;
        let mut pending = PendingConnection::new(connection.clone(), self.short_id());

        let attached = self.attach(connection.clone()).await;
        pending.disarm();
        match attached {
            Ok((agent, engine)) => {
                log::info!(
                    "[{}] agent '{}' ready in {:.1?}",
                    self.short_id(),
                    agent.name(),
                    started.elapsed()
                );
                Ok((connection, agent, engine))
            }
            Err(e) => {
                self.close(connection).await;
                Err(e)
            }
        }
    }

    async fn attach(
        &self,
        connection: Arc<dyn Connection>,
    ) -> Result<(Arc<Agent>, Arc<dyn Engine>), InitError> {
        let limit = self.timeouts.attach_timeout();

        let agent = run_stage(
            InitStage::BuildAgent,
            limit,
            Agent::bind(self.definition.clone(), connection),
        )
        .await?;
        let agent = Arc::new(agent);

        let credentials = &self.collaborators.credentials;
        let credential = credentials.credential().ok_or_else(|| InitError::Failed {
            stage: InitStage::AttachEngine,
            cause: anyhow!("{} not set", credentials.name()),
        })?;
        let engine = run_stage(
            InitStage::AttachEngine,
            limit,
            self.collaborators.reasoning.attach(agent.clone(), &credential),
        )
        .await?;

        match tokio::time::timeout(limit, agent.list_tools()).await {
            Ok(Ok(tools)) => {
                let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
                log::info!("[{}] tools available: {}", self.short_id(), names.join(", "));
            }
            Ok(Err(e)) => log::warn!("[{}] could not list tools: {:#}", self.short_id(), e),
            Err(_) => log::warn!("[{}] listing tools timed out", self.short_id()),
        }

        Ok((agent, engine))
    }

    async fn close(&self, connection: Arc<dyn Connection>) {
        if let Err(e) = connection.close().await {
            log::warn!("[{}] failed to close connection: {:#}", self.short_id(), e);
        }
    }

    fn record(&self, result: &Result<String, AgentError>) {
        let mut metadata = match self.metadata.lock() {
            Ok(metadata) => metadata,
            Err(poisoned) => poisoned.into_inner(),
        };
        metadata.submissions += 1;
        metadata.last_used = Some(Utc::now());
        if result.is_err() {
            metadata.failures += 1;
        }
    }
}

/// One session per UI session id
pub struct SessionRegistry {
    config: Config,
    collaborators: Collaborators,
    sessions: RwLock<HashMap<String, Arc<SessionManager>>>,
}

impl SessionRegistry {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        SessionRegistry {
            config,
            collaborators,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A session under a fresh random id
    pub async fn create(&self) -> Arc<SessionManager> {
        let id = uuid::Uuid::new_v4().to_string();
        self.get_or_create(&id).await
    }

    pub async fn get_or_create(&self, id: &str) -> Arc<SessionManager> {
        if let Some(session) = self.sessions.read().await.get(id) {
            return session.clone();
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(id.to_string())
            .or_insert_with(|| {
                log::debug!("new session {}", id);
                Arc::new(SessionManager::new(id, &self.config, self.collaborators.clone()))
            })
            .clone()
    }

    pub async fn get(&self, id: &str) -> Option<Arc<SessionManager>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Exact id, or the single session whose id starts with `prefix`
    pub async fn find(&self, prefix: &str) -> Option<Arc<SessionManager>> {
        let sessions = self.sessions.read().await;
        if let Some(session) = sessions.get(prefix) {
            return Some(session.clone());
        }

        let mut matches = sessions.iter().filter(|(id, _)| id.starts_with(prefix));
        match (matches.next(), matches.next()) {
            (Some((_, session)), None) => Some(session.clone()),
            _ => None,
        }
    }

    /// All sessions, oldest first
    pub async fn list(&self) -> Vec<Arc<SessionManager>> {
        let mut sessions: Vec<_> = self.sessions.read().await.values().cloned().collect();
        sessions.sort_by_key(|s| s.metadata().created_at);
        sessions
    }

    /// Shut a session down and forget it
    pub async fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id);
        match removed {
            Some(session) => {
                session.shutdown().await;
                true
            }
            None => false,
        }
    }

    pub async fn shutdown_all(&self) {
        let sessions: Vec<_> = self.sessions.write().await.drain().map(|(_, s)| s).collect();
        for session in sessions {
            session.shutdown().await;
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
