use crate::application::ports::remote_gateway::{RemoteAck, RemoteEntity, RemoteGateway, UploadAck};
use crate::domain::entities::{AttachmentRecord, MutationRecord};
use crate::domain::value_objects::{EntityKind, MutationOperation};
use crate::shared::config::RemoteConfig;
use crate::shared::error::AppError;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct PushResponse {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteEntityWire {
    id: String,
    local_id: Option<String>,
    payload: Value,
    updated_at: i64,
    #[serde(default)]
    deleted: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    id: String,
    public_url: String,
}

/// バックエンド REST API への `RemoteGateway` 実装。
/// すべての呼び出しに bearer トークンとタイムアウトを付け、
/// 失敗をエンジンの 3 区分へ正規化する。
pub struct HttpSyncGateway {
    base_url: String,
    http: reqwest::Client,
    token: RwLock<Option<String>>,
}

impl HttpSyncGateway {
    pub fn new(config: &RemoteConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            token: RwLock::new(None),
        })
    }

    /// 認証レイヤーから供給されるトークンを差し替える。
    pub async fn set_token(&self, token: Option<String>) {
        *self.token.write().await = token;
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http.request(method, self.endpoint(path));
        if let Some(token) = self.token.read().await.as_deref() {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    /// 4xx は恒久失敗、401/403 はエンジン停止、5xx は再試行対象。
    async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, AppError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AppError::Unauthorized),
            s if s.is_client_error() => Err(AppError::ValidationError(format!(
                "remote rejected request ({s}): {body}"
            ))),
            s => Err(AppError::Network(format!("remote error ({s}): {body}"))),
        }
    }

    fn body_with_local_id(record: &MutationRecord) -> Value {
        let mut body = record.payload.as_json().clone();
        if let Some(map) = body.as_object_mut() {
            map.insert("localId".to_string(), json!(record.entity_id.as_str()));
        }
        body
    }
}

#[async_trait]
impl RemoteGateway for HttpSyncGateway {
    async fn push_mutation(&self, record: &MutationRecord) -> Result<RemoteAck, AppError> {
        let route = record.entity_kind.route();
        debug!(
            mutation_id = record.id,
            route,
            operation = record.operation.as_str(),
            "pushing mutation"
        );

        let resp = match record.operation {
            MutationOperation::Create => {
                self.request(Method::POST, route)
                    .await
                    .json(&Self::body_with_local_id(record))
                    .send()
                    .await?
            }
            MutationOperation::Update => {
                let path = format!("{route}/{}", record.entity_id.as_str());
                self.request(Method::PATCH, &path)
                    .await
                    .json(&Self::body_with_local_id(record))
                    .send()
                    .await?
            }
            MutationOperation::Delete => {
                let path = format!("{route}/{}", record.entity_id.as_str());
                let resp = self.request(Method::DELETE, &path).await.send().await?;
                // 再送された delete は 404 で返るが、結果としては削除済み
                if resp.status() == StatusCode::NOT_FOUND {
                    return Ok(RemoteAck::default());
                }
                resp
            }
        };

        let resp = Self::ensure_success(resp).await?;

        if record.operation == MutationOperation::Delete {
            return Ok(RemoteAck::default());
        }

        let ack: PushResponse = resp.json().await?;
        Ok(RemoteAck { remote_id: ack.id })
    }

    async fn pull_since(
        &self,
        kind: EntityKind,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RemoteEntity>, AppError> {
        let mut builder = self.request(Method::GET, kind.route()).await;
        if let Some(since) = since {
            builder = builder.query(&[("since", since.timestamp_millis().to_string())]);
        }
        let resp = Self::ensure_success(builder.send().await?).await?;
        let wire: Vec<RemoteEntityWire> = resp.json().await?;

        Ok(wire
            .into_iter()
            .map(|item| RemoteEntity {
                remote_id: item.id,
                local_id: item.local_id,
                payload: item.payload,
                updated_at: DateTime::<Utc>::from_timestamp_millis(item.updated_at)
                    .unwrap_or_else(Utc::now),
                deleted: item.deleted,
            })
            .collect())
    }

    async fn upload_attachment(&self, record: &AttachmentRecord) -> Result<UploadAck, AppError> {
        let data_uri = format!(
            "data:{};base64,{}",
            record.mime_type,
            BASE64.encode(&record.data)
        );
        let body = json!({
            "attachmentId": record.id.as_str(),
            "ownerId": record.owner_id.as_str(),
            "kind": record.kind.as_str(),
            "mimeType": record.mime_type,
            "data": data_uri,
        });

        let resp = self
            .request(Method::POST, "attachments/base64")
            .await
            .json(&body)
            .send()
            .await?;
        let resp = Self::ensure_success(resp).await?;
        let ack: UploadResponse = resp.json().await?;
        Ok(UploadAck {
            id: ack.id,
            public_url: ack.public_url,
        })
    }

    async fn delete_attachment(&self, remote_id: &str) -> Result<(), AppError> {
        let path = format!("attachments/{remote_id}");
        let resp = self.request(Method::DELETE, &path).await.send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::ensure_success(resp).await?;
        Ok(())
    }
}
