use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use watchsync::engine::{BatchConsumer, ChangeBatch, ConsumerFuture};
use watchsync::remote::api::{
    ApiFuture, BlobInfo, CommitInfo, CommitResponse, ContentApi, ContentsEntry, DeleteContents,
    PutContents,
};
use watchsync::remote::ApiError;

/// Which endpoint a recorded call or scripted failure applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Get,
    Put,
    Delete,
    BranchHead,
    User,
}

/// One request seen by [`FakeContentApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    Get { path: String },
    Put { path: String, sha: Option<String>, message: String },
    Delete { path: String, sha: String, message: String },
    BranchHead,
    User,
}

impl ApiCall {
    pub fn kind(&self) -> CallKind {
        match self {
            ApiCall::Get { .. } => CallKind::Get,
            ApiCall::Put { .. } => CallKind::Put,
            ApiCall::Delete { .. } => CallKind::Delete,
            ApiCall::BranchHead => CallKind::BranchHead,
            ApiCall::User => CallKind::User,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredBlob {
    /// Base64 exactly as uploaded.
    content: String,
    sha: String,
}

#[derive(Debug, Default)]
struct FakeState {
    files: BTreeMap<String, StoredBlob>,
    calls: Vec<ApiCall>,
    failures: HashMap<CallKind, VecDeque<ApiError>>,
    next_sha: u64,
    commits: u64,
}

impl FakeState {
    fn next_failure(&mut self, kind: CallKind) -> Option<ApiError> {
        self.failures.get_mut(&kind).and_then(VecDeque::pop_front)
    }

    fn new_sha(&mut self) -> String {
        self.next_sha += 1;
        format!("sha-{}", self.next_sha)
    }

    fn new_commit(&mut self) -> CommitInfo {
        self.commits += 1;
        CommitInfo {
            sha: format!("commit-{}", self.commits),
        }
    }
}

/// In-memory stand-in for the contents API.
///
/// Behaves like the real service for the parts the client relies on:
/// - GET of a missing path is a 404
/// - PUT over an existing file must carry its current sha (409 otherwise)
/// - DELETE must carry the current sha
///
/// Every request is recorded, and failures can be scripted per endpoint.
#[derive(Debug)]
pub struct FakeContentApi {
    state: Mutex<FakeState>,
    branch: String,
    login: String,
}

impl FakeContentApi {
    pub fn new(login: &str) -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            branch: "main".to_string(),
            login: login.to_string(),
        }
    }

    pub fn shared(login: &str) -> Arc<Self> {
        Arc::new(Self::new(login))
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Store a file directly, returning its sha.
    pub fn seed(&self, path: &str, base64_content: &str) -> String {
        let mut state = self.state();
        let sha = state.new_sha();
        state.files.insert(
            path.to_string(),
            StoredBlob {
                content: base64_content.to_string(),
                sha: sha.clone(),
            },
        );
        sha
    }

    /// Queue `err` as the response to the next call of `kind`.
    pub fn fail_next(&self, kind: CallKind, err: ApiError) {
        self.state().failures.entry(kind).or_default().push_back(err);
    }

    /// Queue the same failure `times` times.
    pub fn fail_times(&self, kind: CallKind, err: ApiError, times: usize) {
        for _ in 0..times {
            self.fail_next(kind, err.clone());
        }
    }

    pub fn sha_of(&self, path: &str) -> Option<String> {
        self.state().files.get(path).map(|b| b.sha.clone())
    }

    pub fn content_of(&self, path: &str) -> Option<String> {
        self.state().files.get(path).map(|b| b.content.clone())
    }

    pub fn paths(&self) -> Vec<String> {
        self.state().files.keys().cloned().collect()
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.state().calls.clone()
    }

    pub fn count(&self, kind: CallKind) -> usize {
        self.state().calls.iter().filter(|c| c.kind() == kind).count()
    }

    /// Recorded writes only (PUT and DELETE), in order.
    pub fn writes(&self) -> Vec<ApiCall> {
        self.state()
            .calls
            .iter()
            .filter(|c| matches!(c.kind(), CallKind::Put | CallKind::Delete))
            .cloned()
            .collect()
    }
}

impl ContentApi for FakeContentApi {
    fn get_contents<'a>(&'a self, path: &'a str) -> ApiFuture<'a, ContentsEntry> {
        Box::pin(async move {
            let mut state = self.state();
            state.calls.push(ApiCall::Get {
                path: path.to_string(),
            });
            if let Some(err) = state.next_failure(CallKind::Get) {
                return Err(err);
            }
            match state.files.get(path) {
                Some(blob) => Ok(ContentsEntry {
                    content: blob.content.clone(),
                    sha: blob.sha.clone(),
                }),
                None => Err(ApiError::status(404, "Not Found")),
            }
        })
    }

    fn put_contents<'a>(&'a self, path: &'a str, body: &'a PutContents) -> ApiFuture<'a, CommitResponse> {
        Box::pin(async move {
            let mut state = self.state();
            state.calls.push(ApiCall::Put {
                path: path.to_string(),
                sha: body.sha.clone(),
                message: body.message.clone(),
            });
            if let Some(err) = state.next_failure(CallKind::Put) {
                return Err(err);
            }
            if let Some(existing) = state.files.get(path) {
                if body.sha.as_deref() != Some(existing.sha.as_str()) {
                    return Err(ApiError::status(409, format!("{path} does not match {}", existing.sha)));
                }
            }
            let sha = state.new_sha();
            state.files.insert(
                path.to_string(),
                StoredBlob {
                    content: body.content.clone(),
                    sha: sha.clone(),
                },
            );
            let commit = state.new_commit();
            Ok(CommitResponse {
                content: Some(BlobInfo {
                    path: path.to_string(),
                    sha,
                }),
                commit,
            })
        })
    }

    fn delete_contents<'a>(
        &'a self,
        path: &'a str,
        body: &'a DeleteContents,
    ) -> ApiFuture<'a, CommitResponse> {
        Box::pin(async move {
            let mut state = self.state();
            state.calls.push(ApiCall::Delete {
                path: path.to_string(),
                sha: body.sha.clone(),
                message: body.message.clone(),
            });
            if let Some(err) = state.next_failure(CallKind::Delete) {
                return Err(err);
            }
            match state.files.get(path) {
                None => return Err(ApiError::status(404, "Not Found")),
                Some(existing) if existing.sha != body.sha => {
                    return Err(ApiError::status(409, format!("{path} does not match {}", existing.sha)));
                }
                Some(_) => {}
            }
            state.files.remove(path);
            let commit = state.new_commit();
            Ok(CommitResponse { content: None, commit })
        })
    }

    fn branch_head(&self) -> ApiFuture<'_, String> {
        Box::pin(async move {
            let mut state = self.state();
            state.calls.push(ApiCall::BranchHead);
            if let Some(err) = state.next_failure(CallKind::BranchHead) {
                return Err(err);
            }
            Ok(format!("commit-{}", state.commits))
        })
    }

    fn authenticated_user(&self) -> ApiFuture<'_, String> {
        Box::pin(async move {
            let mut state = self.state();
            state.calls.push(ApiCall::User);
            if let Some(err) = state.next_failure(CallKind::User) {
                return Err(err);
            }
            Ok(self.login.clone())
        })
    }

    fn branch(&self) -> &str {
        &self.branch
    }
}

/// Consumer that forwards every batch it sees to a channel.
pub struct RecordingConsumer {
    tx: mpsc::UnboundedSender<Arc<ChangeBatch>>,
}

impl RecordingConsumer {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Arc<ChangeBatch>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl BatchConsumer for RecordingConsumer {
    fn consume(&self, batch: Arc<ChangeBatch>) -> ConsumerFuture<'_> {
        Box::pin(async move {
            self.tx
                .send(batch)
                .map_err(|_| anyhow::anyhow!("recording receiver dropped"))?;
            Ok(())
        })
    }
}
