use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::application::services::{DocumentService, RagService};
use crate::application::session::{SessionContext, SessionRegistry};
use crate::domain::{
    ports::{LlmService, UploadedFile, VectorStore},
    DocumentChunk, DomainError, Notation, PromptTemplates, SearchResult, SourceMetadata,
    TemplateDispatch, Turn,
};

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub notation: Notation,
    pub subject: String,
    pub indexed_chunks: usize,
    pub turns: usize,
    pub created_at: DateTime<Utc>,
}

impl From<&SessionContext> for SessionSummary {
    fn from(session: &SessionContext) -> Self {
        Self {
            id: session.id,
            notation: session.notation,
            subject: session.subject.clone(),
            indexed_chunks: session.indexed_chunks(),
            turns: session.history.len(),
            created_at: session.created_at,
        }
    }
}

/// Partial settings update; absent fields keep their current value.
#[derive(Debug, Clone, Default)]
pub struct SessionSettings {
    pub notation: Option<String>,
    pub subject: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadSummary {
    pub documents: usize,
    pub chunks: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<SourceMetadata>,
}

/// Drives a verification session: settings, upload and indexing, and the
/// retrieve, prompt, stream and record loop for each question.
pub struct VerifierService {
    sessions: Arc<SessionRegistry>,
    documents: DocumentService,
    rag: RagService,
    llm: Arc<dyn LlmService>,
    prompts: PromptTemplates,
    dispatch: TemplateDispatch,
}

impl VerifierService {
    pub fn new(
        sessions: Arc<SessionRegistry>,
        documents: DocumentService,
        rag: RagService,
        llm: Arc<dyn LlmService>,
        prompts: PromptTemplates,
        dispatch: TemplateDispatch,
    ) -> Self {
        Self {
            sessions,
            documents,
            rag,
            llm,
            prompts,
            dispatch,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub async fn create_session(&self) -> Result<SessionSummary, DomainError> {
        let id = self.sessions.create().await;
        self.summary(id).await
    }

    pub async fn summary(&self, id: Uuid) -> Result<SessionSummary, DomainError> {
        let handle = self.sessions.get(id).await?;
        let session = handle.context().lock().await;
        Ok(SessionSummary::from(&*session))
    }

    #[instrument(skip(self, settings), fields(session_id = %id))]
    pub async fn configure(
        &self,
        id: Uuid,
        settings: SessionSettings,
    ) -> Result<SessionSummary, DomainError> {
        let notation = settings
            .notation
            .as_deref()
            .map(|key| self.dispatch.resolve(key))
            .transpose()?;

        let handle = self.sessions.get(id).await?;
        let mut session = handle.context().lock().await;

        if let Some(notation) = notation {
            session.notation = notation;
        }
        if let Some(subject) = settings.subject {
            session.subject = subject.trim().to_string();
        }

        debug!(notation = %session.notation, subject = %session.subject, "settings updated");
        Ok(SessionSummary::from(&*session))
    }

    /// Replaces the session index with one built from `files`. On any failure
    /// the previous index stays in place.
    #[instrument(skip(self, files), fields(session_id = %id, files = files.len()))]
    pub async fn upload(
        &self,
        id: Uuid,
        files: &[UploadedFile],
    ) -> Result<UploadSummary, DomainError> {
        let handle = self.sessions.get(id).await?;
        let mut session = handle.context().lock().await;

        let batch = self.documents.ingest(files)?;
        let chunks = batch.chunks.len();
        let index = self.rag.build_index(batch.chunks).await?;
        session.index = Some(index);

        info!(documents = batch.documents, chunks, "index built");
        Ok(UploadSummary {
            documents: batch.documents,
            chunks,
        })
    }

    /// Answers `query` against the session index. Fragments are forwarded to
    /// `fragments` as they arrive; the exchange is added to the history only
    /// once the whole answer has been received.
    #[instrument(skip(self, query, fragments), fields(session_id = %id))]
    pub async fn ask(
        &self,
        id: Uuid,
        query: &str,
        fragments: Option<mpsc::UnboundedSender<String>>,
    ) -> Result<Answer, DomainError> {
        let query = ask_query(query)?;

        let handle = self.sessions.get(id).await?;
        let mut session = handle.context().lock().await;
        let index = ask_index(&session)?;

        let snippets: Vec<DocumentChunk> = self
            .rag
            .retrieve(index.as_ref(), query)
            .await?
            .into_iter()
            .map(|r| r.chunk)
            .collect();

        let prompt = self.prompts.compose(
            session.notation,
            &session.subject,
            &snippets,
            query,
            &session.history,
        );
        debug!(snippets = snippets.len(), prompt_chars = prompt.len(), "prompt composed");

        let mut stream = self.llm.stream(&prompt).await?;
        let mut answer = String::new();
        while let Some(fragment) = stream.next().await {
            let fragment = fragment?;
            if let Some(tx) = &fragments {
                // A receiver that went away only stops the forwarding.
                let _ = tx.send(fragment.clone());
            }
            answer.push_str(&fragment);
        }

        session.history.record_exchange(query, answer.clone());
        handle.touch();
        info!(turns = session.history.len(), "answer recorded");

        Ok(Answer {
            answer,
            sources: distinct_sources(&snippets),
        })
    }

    /// Runs the input checks of [`ask`](Self::ask) without asking, so callers
    /// can reject a question before committing to a response.
    pub async fn check_ask(&self, id: Uuid, query: &str) -> Result<(), DomainError> {
        ask_query(query)?;
        let handle = self.sessions.get(id).await?;
        let session = handle.context().lock().await;
        ask_index(&session).map(|_| ())
    }

    /// Retrieval preview: the chunks a question would be answered from.
    #[instrument(skip(self, query), fields(session_id = %id))]
    pub async fn search(&self, id: Uuid, query: &str) -> Result<Vec<SearchResult>, DomainError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(DomainError::validation("query must not be empty"));
        }

        let handle = self.sessions.get(id).await?;
        let session = handle.context().lock().await;
        let index = session
            .index
            .clone()
            .ok_or_else(|| DomainError::validation("upload documents before searching"))?;

        self.rag.retrieve(index.as_ref(), query).await
    }

    pub async fn history(&self, id: Uuid) -> Result<Vec<Turn>, DomainError> {
        let handle = self.sessions.get(id).await?;
        let session = handle.context().lock().await;
        Ok(session.history.turns.clone())
    }

    /// Discards history, index and settings; the session id stays valid.
    #[instrument(skip(self), fields(session_id = %id))]
    pub async fn reset(&self, id: Uuid) -> Result<SessionSummary, DomainError> {
        let handle = self.sessions.get(id).await?;
        let mut session = handle.context().lock().await;
        *session = SessionContext::new(id);

        info!("session reset");
        Ok(SessionSummary::from(&*session))
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.len().await
    }
}

fn distinct_sources(snippets: &[DocumentChunk]) -> Vec<SourceMetadata> {
    let mut sources: Vec<SourceMetadata> = Vec::new();
    for chunk in snippets {
        if !sources.contains(&chunk.metadata) {
            sources.push(chunk.metadata.clone());
        }
    }
    sources
}

fn ask_query(query: &str) -> Result<&str, DomainError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(DomainError::validation("query must not be empty"));
    }
    Ok(query)
}

fn ask_index(session: &SessionContext) -> Result<Arc<dyn VectorStore>, DomainError> {
    if session.subject.is_empty() {
        return Err(DomainError::validation(
            "set a subject for the session before asking",
        ));
    }
    session
        .index
        .clone()
        .ok_or_else(|| DomainError::validation("upload documents before asking"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{EmbeddingService, TextStream};
    use crate::domain::{Embedding, MmrParams, TextSplitter, TurnRole};
    use crate::infrastructure::{InMemoryIndexBuilder, XmlDocumentLoader};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    const VALVE_PROGRAM: &str = "<Program><Network><Title>Valve control</Title>\
        <Statement>A #Safety_Inp\nO #Simulation\n= #Safety_OK</Statement></Network>\
        <Network><Title>Open valve</Title><Statement>A #Safety_OK\nA #Start\n= #Valve_Open</Statement></Network></Program>";

    const QUESTION: &str = "what happens if Safety_Inp is false and Simulation is true";

    /// Bag-of-words vectors; a bias component keeps every vector non-zero.
    #[derive(Default)]
    struct WordEmbedding {
        fail: AtomicBool,
    }

    fn words_vector(text: &str) -> Embedding {
        let mut v = vec![0.0f32; 9];
        v[8] = 1.0;
        for word in text.split(|c: char| !c.is_alphanumeric() && c != '_') {
            if !word.is_empty() {
                let bucket = word.bytes().map(usize::from).sum::<usize>() % 8;
                v[bucket] += 1.0;
            }
        }
        Embedding::new(v)
    }

    #[async_trait]
    impl EmbeddingService for WordEmbedding {
        async fn embed(&self, text: &str) -> Result<Embedding, DomainError> {
            Ok(words_vector(text))
        }

        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(DomainError::external("embedding quota exceeded"));
            }
            Ok(texts.iter().map(|t| words_vector(t)).collect())
        }

        fn dimension(&self) -> usize {
            9
        }
    }

    enum Script {
        Reply(Vec<&'static str>),
        BreakMidStream,
    }

    struct ScriptedLlm {
        script: Script,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn new(script: Script) -> Self {
            Self {
                script,
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmService for ScriptedLlm {
        async fn stream(&self, prompt: &str) -> Result<TextStream, DomainError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let items: Vec<Result<String, DomainError>> = match &self.script {
                Script::Reply(parts) => parts.iter().map(|p| Ok(p.to_string())).collect(),
                Script::BreakMidStream => vec![
                    Ok("Safety_OK ".to_string()),
                    Err(DomainError::external("connection reset")),
                ],
            };
            Ok(futures::stream::iter(items).boxed())
        }
    }

    struct Fixture {
        service: VerifierService,
        llm: Arc<ScriptedLlm>,
        embedding: Arc<WordEmbedding>,
    }

    fn fixture(script: Script, dispatch: TemplateDispatch) -> Fixture {
        let llm = Arc::new(ScriptedLlm::new(script));
        let embedding = Arc::new(WordEmbedding::default());
        let splitter = TextSplitter::new(120, 20, vec!["\n\n".into(), "\n".into()]).unwrap();
        let service = VerifierService::new(
            Arc::new(SessionRegistry::new()),
            DocumentService::new(Arc::new(XmlDocumentLoader::default()), splitter),
            RagService::new(
                embedding.clone(),
                Arc::new(InMemoryIndexBuilder),
                MmrParams {
                    k: 3,
                    fetch_k: 6,
                    lambda_mult: 0.25,
                },
            ),
            llm.clone(),
            PromptTemplates::default(),
            dispatch,
        );
        Fixture {
            service,
            llm,
            embedding,
        }
    }

    fn answering() -> Script {
        Script::Reply(vec!["Safety_OK ", "stays TRUE ", "because Simulation bypasses the input."])
    }

    async fn ready_session(f: &Fixture, notation: &str) -> Uuid {
        let id = f.service.create_session().await.unwrap().id;
        f.service
            .configure(
                id,
                SessionSettings {
                    notation: Some(notation.into()),
                    subject: Some("valve control".into()),
                },
            )
            .await
            .unwrap();
        f.service
            .upload(id, &[UploadedFile::new("valve.xml", VALVE_PROGRAM)])
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_prompt_contains_subject_query_and_snippets() {
        let f = fixture(answering(), TemplateDispatch::Strict);
        let id = ready_session(&f, "STL").await;

        let answer = f.service.ask(id, QUESTION, None).await.unwrap();
        assert_eq!(
            answer.answer,
            "Safety_OK stays TRUE because Simulation bypasses the input."
        );
        assert_eq!(answer.sources, vec![SourceMetadata::new("valve.xml", 1)]);

        let prompts = f.llm.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("PLC programs in STL"));
        assert!(prompts[0].contains("valve control"));
        assert!(prompts[0].contains(QUESTION));
        assert!(prompts[0].contains("Safety_Inp"));
        assert!(prompts[0].contains("valve.xml (page 1)"));
    }

    #[tokio::test]
    async fn test_history_grows_by_two_per_answer() {
        let f = fixture(answering(), TemplateDispatch::Strict);
        let id = ready_session(&f, "Ladder").await;

        for i in 1..=3 {
            f.service.ask(id, &format!("question {i}"), None).await.unwrap();
            assert_eq!(f.service.history(id).await.unwrap().len(), 2 * i);
        }

        let history = f.service.history(id).await.unwrap();
        assert_eq!(history[0], Turn::new(TurnRole::User, "question 1"));
        assert_eq!(history[1].role, TurnRole::Agent);

        // Earlier turns are carried into later prompts.
        let prompts = f.llm.prompts();
        assert!(!prompts[0].contains("User: question 1"));
        assert!(prompts[2].contains("User: question 1"));
        assert!(prompts[2].contains("Agent: Safety_OK stays TRUE"));
    }

    #[tokio::test]
    async fn test_fragments_are_forwarded_in_order() {
        let f = fixture(answering(), TemplateDispatch::Strict);
        let id = ready_session(&f, "FBD").await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let answer = f.service.ask(id, QUESTION, Some(tx)).await.unwrap();

        let mut streamed = String::new();
        while let Some(fragment) = rx.recv().await {
            streamed.push_str(&fragment);
        }
        assert_eq!(streamed, answer.answer);
    }

    #[tokio::test]
    async fn test_failed_stream_leaves_history_unchanged() {
        let f = fixture(Script::BreakMidStream, TemplateDispatch::Strict);
        let id = ready_session(&f, "STL").await;

        let err = f.service.ask(id, QUESTION, None).await.unwrap_err();
        assert!(matches!(err, DomainError::ExternalService(_)));
        assert!(f.service.history(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reset_requires_new_upload() {
        let f = fixture(answering(), TemplateDispatch::Strict);
        let id = ready_session(&f, "STL").await;
        f.service.ask(id, QUESTION, None).await.unwrap();

        let summary = f.service.reset(id).await.unwrap();
        assert_eq!(summary.turns, 0);
        assert_eq!(summary.indexed_chunks, 0);
        assert!(f.service.history(id).await.unwrap().is_empty());

        f.service
            .configure(
                id,
                SessionSettings {
                    notation: None,
                    subject: Some("valve control".into()),
                },
            )
            .await
            .unwrap();
        let err = f.service.ask(id, QUESTION, None).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        f.service
            .upload(id, &[UploadedFile::new("valve.xml", VALVE_PROGRAM)])
            .await
            .unwrap();
        assert!(f.service.ask(id, QUESTION, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_ask_validates_session_state() {
        let f = fixture(answering(), TemplateDispatch::Strict);
        let id = f.service.create_session().await.unwrap().id;

        let empty = f.service.ask(id, "   ", None).await.unwrap_err();
        assert!(matches!(empty, DomainError::Validation(_)));

        let no_subject = f.service.ask(id, QUESTION, None).await.unwrap_err();
        assert!(matches!(no_subject, DomainError::Validation(_)));

        let missing = f.service.ask(Uuid::new_v4(), QUESTION, None).await.unwrap_err();
        assert!(matches!(missing, DomainError::NotFound(_)));

        assert!(f.llm.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_check_ask_matches_ask_preconditions() {
        let f = fixture(answering(), TemplateDispatch::Strict);
        let id = f.service.create_session().await.unwrap().id;

        let no_subject = f.service.check_ask(id, QUESTION).await.unwrap_err();
        assert!(matches!(no_subject, DomainError::Validation(m) if m.contains("subject")));

        f.service
            .configure(
                id,
                SessionSettings {
                    notation: None,
                    subject: Some("valve control".into()),
                },
            )
            .await
            .unwrap();
        let no_index = f.service.check_ask(id, QUESTION).await.unwrap_err();
        assert!(matches!(no_index, DomainError::Validation(m) if m.contains("upload")));

        let ready = ready_session(&f, "STL").await;
        assert!(f.service.check_ask(ready, QUESTION).await.is_ok());
        assert!(f.service.check_ask(ready, "").await.is_err());
        assert!(matches!(
            f.service.check_ask(Uuid::new_v4(), QUESTION).await,
            Err(DomainError::NotFound(_))
        ));
        assert!(f.llm.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_failed_upload_keeps_previous_index() {
        let f = fixture(answering(), TemplateDispatch::Strict);
        let id = ready_session(&f, "STL").await;
        let before = f.service.summary(id).await.unwrap().indexed_chunks;
        assert!(before > 0);

        let rejected = f
            .service
            .upload(id, &[UploadedFile::new("notes.txt", "Safety_Inp")])
            .await
            .unwrap_err();
        assert!(matches!(rejected, DomainError::Validation(_)));

        f.embedding.fail.store(true, Ordering::SeqCst);
        let failed = f
            .service
            .upload(id, &[UploadedFile::new("other.xml", "<Other/>")])
            .await
            .unwrap_err();
        assert!(matches!(failed, DomainError::ExternalService(_)));

        assert_eq!(f.service.summary(id).await.unwrap().indexed_chunks, before);
        assert!(f.service.ask(id, QUESTION, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_search_previews_retrieval() {
        let f = fixture(answering(), TemplateDispatch::Strict);
        let id = ready_session(&f, "STL").await;

        let results = f.service.search(id, QUESTION).await.unwrap();
        assert!(!results.is_empty() && results.len() <= 3);
        assert!(f.service.history(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_notation_dispatch_modes() {
        let strict = fixture(answering(), TemplateDispatch::Strict);
        let id = strict.service.create_session().await.unwrap().id;
        let settings = |n: &str| SessionSettings {
            notation: Some(n.to_string()),
            subject: None,
        };

        let scl = strict.service.configure(id, settings("SCL")).await.unwrap();
        assert_eq!(scl.notation, Notation::Scl);
        assert!(strict.service.configure(id, settings("CSL")).await.is_err());

        let legacy = fixture(answering(), TemplateDispatch::Legacy);
        let id = legacy.service.create_session().await.unwrap().id;
        let scl = legacy.service.configure(id, settings("SCL")).await.unwrap();
        assert_eq!(scl.notation, Notation::Fbd);
        let unknown = legacy.service.configure(id, settings("Ladder logic")).await.unwrap();
        assert_eq!(unknown.notation, Notation::Fbd);
    }
}
