//! オフラインファーストの同期エンジン。
//!
//! すべての書き込みはまずローカル SQLite へコミットされ、永続キューを
//! 経由してバックグラウンドでリモートへ適用される。ネットワークは
//! 書き込みの成功条件に関与しない。

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;
pub mod state;

pub use domain::entities::{
    AttachmentDraft, AttachmentRecord, EngineStatus, EntityRecord, EntityWrite, MutationRecord,
    SyncReport, SyncState,
};
pub use domain::value_objects::{
    AttachmentKind, EntityKind, LocalId, MutationOperation, MutationPayload, MutationStatus,
    UploadStatus,
};
pub use shared::config::AppConfig;
pub use shared::error::{AppError, Result};
pub use state::AppContext;

use tracing_subscriber::EnvFilter;

/// ロギング初期化。`RUST_LOG` があればそちらを優先する。
/// 2 回目以降の呼び出しは何もしない。
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("genba_sync=debug,info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}
