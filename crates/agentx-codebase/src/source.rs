use agentx_client::{ApiClient, ClientError, FileContent, FileEntry};

/// Where the viewer reads a codebase from. Implement to back the viewer with
/// something other than a live sandbox.
#[async_trait::async_trait]
pub trait FileSource: Send + Sync {
    async fn list_files(&self) -> Result<Vec<FileEntry>, ClientError>;

    async fn read_file(&self, path: &str) -> Result<FileContent, ClientError>;
}

/// Files of one sandbox, read through the AgentX API.
#[derive(Clone)]
pub struct SandboxFiles {
    client: ApiClient,
    sandbox_id: String,
}

impl SandboxFiles {
    pub fn new(client: ApiClient, sandbox_id: impl Into<String>) -> Self {
        Self {
            client,
            sandbox_id: sandbox_id.into(),
        }
    }

    pub fn sandbox_id(&self) -> &str {
        &self.sandbox_id
    }
}

#[async_trait::async_trait]
impl FileSource for SandboxFiles {
    async fn list_files(&self) -> Result<Vec<FileEntry>, ClientError> {
        self.client.list_files(&self.sandbox_id).await
    }

    async fn read_file(&self, path: &str) -> Result<FileContent, ClientError> {
        self.client.read_file(&self.sandbox_id, path).await
    }
}
