//! Server side of `ClientApi`: the account/file operations (register,
//! login, upload, download, delete, list_files) translated into ring
//! calls.
//!
//! Account records live as JSON values on the *clients* ring, keyed by
//! username; file bodies live on the *data* ring, keyed by
//! `"<username>:<path>"` and persisted under `Config::persist_path`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tonic::{Request, Response, Status};

use crate::cluster::ClusterContext;
use crate::utils::crypto::hash_password;
use crate::utils::error::{DistorageError, Result};
use crate::utils::types::ElemValue;

use super::proto::client_api_server::ClientApi;
use super::proto::{
    ClientAuthRequest, ClientOpResponse, DownloadRequest, DownloadResponse, Empty,
    KnownServersResponse, ListFilesRequest, ListFilesResponse, UploadRequest,
};

#[derive(Debug, Serialize, Deserialize, Clone)]
struct AccountRecord {
    username: String,
    password_hash: String,
    files: Vec<String>,
}

pub struct ClientServiceImpl {
    cluster: Arc<ClusterContext>,
}

impl ClientServiceImpl {
    pub fn new(cluster: Arc<ClusterContext>) -> Self {
        ClientServiceImpl { cluster }
    }

    fn account_key(username: &str) -> String {
        format!("account:{username}")
    }

    fn file_key(username: &str, path: &str) -> String {
        format!("{username}:{path}")
    }

    async fn load_account(&self, username: &str) -> Result<AccountRecord> {
        let value = self
            .cluster
            .clients
            .find(&Self::account_key(username), false)
            .await?
            .ok_or_else(|| DistorageError::NotFound(format!("no such account: {username}")))?;
        let ElemValue::Json(json) = value else {
            return Err(DistorageError::InvalidInput("account record is not JSON".to_string()));
        };
        serde_json::from_str(&json).map_err(|e| DistorageError::InvalidInput(e.to_string()))
    }

    async fn save_account(&self, account: &AccountRecord, overwrite: bool) -> Result<()> {
        let json = serde_json::to_string(account).map_err(|e| DistorageError::InvalidInput(e.to_string()))?;
        self.cluster
            .clients
            .store(&Self::account_key(&account.username), ElemValue::Json(json), overwrite, false, None)
            .await
    }

    async fn authenticate(&self, username: &str, password: &str) -> Result<AccountRecord> {
        let account = self.load_account(username).await?;
        if account.password_hash != hash_password(password) {
            return Err(DistorageError::Auth("wrong username or password".to_string()));
        }
        Ok(account)
    }

    fn ok(msg: impl Into<String>) -> ClientOpResponse {
        ClientOpResponse { ok: true, msg: msg.into() }
    }

    fn err(e: DistorageError) -> ClientOpResponse {
        ClientOpResponse { ok: e.is_benign_ok(), msg: e.as_msg() }
    }
}

#[tonic::async_trait]
impl ClientApi for ClientServiceImpl {
    async fn ping(&self, _request: Request<Empty>) -> Result<Response<Empty>, Status> {
        Ok(Response::new(Empty {}))
    }

    async fn available_servers(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<KnownServersResponse>, Status> {
        let mut ips = self.cluster.known_peers();
        ips.push(self.cluster.host_ip());
        Ok(Response::new(KnownServersResponse { ips }))
    }

    async fn register(
        &self,
        request: Request<ClientAuthRequest>,
    ) -> Result<Response<ClientOpResponse>, Status> {
        let req = request.into_inner();
        if self.load_account(&req.username).await.is_ok() {
            return Ok(Response::new(Self::err(DistorageError::Conflict(format!(
                "username already taken: {}",
                req.username
            )))));
        }
        let account = AccountRecord {
            username: req.username.clone(),
            password_hash: hash_password(&req.password),
            files: Vec::new(),
        };
        let resp = match self.save_account(&account, false).await {
            Ok(()) => Self::ok(""),
            Err(e) => Self::err(e),
        };
        Ok(Response::new(resp))
    }

    async fn login(&self, request: Request<ClientAuthRequest>) -> Result<Response<ClientOpResponse>, Status> {
        let req = request.into_inner();
        let resp = match self.authenticate(&req.username, &req.password).await {
            Ok(_) => Self::ok(""),
            Err(e) => Self::err(e),
        };
        Ok(Response::new(resp))
    }

    async fn upload(&self, request: Request<UploadRequest>) -> Result<Response<ClientOpResponse>, Status> {
        let req = request.into_inner();
        let mut account = match self.authenticate(&req.username, &req.password).await {
            Ok(a) => a,
            Err(e) => return Ok(Response::new(Self::err(e))),
        };

        let persist_path = self.cluster.config.persist_path(&req.username, &req.path);
        let key = Self::file_key(&req.username, &req.path);
        if let Err(e) = self
            .cluster
            .data
            .store(&key, ElemValue::Bytes(req.content), true, false, Some(persist_path))
            .await
        {
            return Ok(Response::new(Self::err(e)));
        }

        if !account.files.iter().any(|f| f == &req.path) {
            account.files.push(req.path);
            if let Err(e) = self.save_account(&account, true).await {
                return Ok(Response::new(Self::err(e)));
            }
        }
        Ok(Response::new(Self::ok("")))
    }

    async fn download(
        &self,
        request: Request<DownloadRequest>,
    ) -> Result<Response<DownloadResponse>, Status> {
        let req = request.into_inner();
        if let Err(e) = self.authenticate(&req.username, &req.password).await {
            return Ok(Response::new(DownloadResponse { content: Vec::new(), ok: e.is_benign_ok(), msg: e.as_msg() }));
        }

        let key = Self::file_key(&req.username, &req.path);
        match self.cluster.data.find(&key, true).await {
            Ok(Some(value)) => Ok(Response::new(DownloadResponse {
                content: value.as_bytes_lossy(),
                ok: true,
                msg: String::new(),
            })),
            Ok(None) => Ok(Response::new(DownloadResponse {
                content: Vec::new(),
                ok: false,
                msg: DistorageError::NotFound(req.path).as_msg(),
            })),
            Err(e) => Ok(Response::new(DownloadResponse { content: Vec::new(), ok: e.is_benign_ok(), msg: e.as_msg() })),
        }
    }

    async fn delete(&self, request: Request<DownloadRequest>) -> Result<Response<ClientOpResponse>, Status> {
        let req = request.into_inner();
        let mut account = match self.authenticate(&req.username, &req.password).await {
            Ok(a) => a,
            Err(e) => return Ok(Response::new(Self::err(e))),
        };

        let key = Self::file_key(&req.username, &req.path);
        if let Err(e) = self.cluster.data.remove(&key).await {
            return Ok(Response::new(Self::err(e)));
        }
        account.files.retain(|f| f != &req.path);
        if let Err(e) = self.save_account(&account, true).await {
            return Ok(Response::new(Self::err(e)));
        }
        Ok(Response::new(Self::ok("")))
    }

    async fn list_files(
        &self,
        request: Request<ListFilesRequest>,
    ) -> Result<Response<ListFilesResponse>, Status> {
        let req = request.into_inner();
        match self.authenticate(&req.username, &req.password).await {
            Ok(account) => Ok(Response::new(ListFilesResponse { files: account.files, ok: true, msg: String::new() })),
            Err(e) => Ok(Response::new(ListFilesResponse { files: Vec::new(), ok: e.is_benign_ok(), msg: e.as_msg() })),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tonic::Request;

    use crate::cluster::ClusterContext;
    use crate::utils::config::Config;

    use super::*;

    fn service() -> (ClientServiceImpl, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new("127.0.0.1".to_string(), "s3cr3t".to_string(), dir.path().to_path_buf());
        let cluster = Arc::new(ClusterContext::new(config));
        (ClientServiceImpl::new(cluster), dir)
    }

    #[tokio::test]
    async fn register_then_login_succeeds() {
        let (svc, _dir) = service();
        let register = svc
            .register(Request::new(ClientAuthRequest {
                username: "alice".to_string(),
                password: "pw".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(register.ok);

        let login = svc
            .login(Request::new(ClientAuthRequest {
                username: "alice".to_string(),
                password: "pw".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(login.ok);
    }

    #[tokio::test]
    async fn register_twice_conflicts() {
        let (svc, _dir) = service();
        let auth = ClientAuthRequest { username: "alice".to_string(), password: "pw".to_string() };
        svc.register(Request::new(auth.clone())).await.unwrap();
        let second = svc.register(Request::new(auth)).await.unwrap().into_inner();
        assert!(!second.ok);
    }

    #[tokio::test]
    async fn login_wrong_password_fails() {
        let (svc, _dir) = service();
        svc.register(Request::new(ClientAuthRequest { username: "alice".to_string(), password: "pw".to_string() }))
            .await
            .unwrap();

        let login = svc
            .login(Request::new(ClientAuthRequest {
                username: "alice".to_string(),
                password: "wrong".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(!login.ok);
    }

    #[tokio::test]
    async fn login_unknown_user_fails() {
        let (svc, _dir) = service();
        let login = svc
            .login(Request::new(ClientAuthRequest {
                username: "nobody".to_string(),
                password: "pw".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(!login.ok);
    }

    #[tokio::test]
    async fn upload_download_round_trip() {
        let (svc, _dir) = service();
        svc.register(Request::new(ClientAuthRequest { username: "alice".to_string(), password: "pw".to_string() }))
            .await
            .unwrap();

        let upload = svc
            .upload(Request::new(UploadRequest {
                username: "alice".to_string(),
                password: "pw".to_string(),
                path: "doc.txt".to_string(),
                content: b"hello".to_vec(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(upload.ok);

        let files = svc
            .list_files(Request::new(ListFilesRequest { username: "alice".to_string(), password: "pw".to_string() }))
            .await
            .unwrap()
            .into_inner();
        assert!(files.ok);
        assert_eq!(files.files, vec!["doc.txt".to_string()]);

        let download = svc
            .download(Request::new(DownloadRequest {
                username: "alice".to_string(),
                password: "pw".to_string(),
                path: "doc.txt".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(download.ok);
        assert_eq!(download.content, b"hello".to_vec());
    }

    #[tokio::test]
    async fn delete_removes_file_and_data() {
        let (svc, _dir) = service();
        svc.register(Request::new(ClientAuthRequest { username: "alice".to_string(), password: "pw".to_string() }))
            .await
            .unwrap();
        svc.upload(Request::new(UploadRequest {
            username: "alice".to_string(),
            password: "pw".to_string(),
            path: "doc.txt".to_string(),
            content: b"hello".to_vec(),
        }))
        .await
        .unwrap();

        let delete = svc
            .delete(Request::new(DownloadRequest {
                username: "alice".to_string(),
                password: "pw".to_string(),
                path: "doc.txt".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(delete.ok);

        let files = svc
            .list_files(Request::new(ListFilesRequest { username: "alice".to_string(), password: "pw".to_string() }))
            .await
            .unwrap()
            .into_inner();
        assert!(files.files.is_empty());

        let download = svc
            .download(Request::new(DownloadRequest {
                username: "alice".to_string(),
                password: "pw".to_string(),
                path: "doc.txt".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(!download.ok);
    }
}
