//! ScriptRepairer port - render 失敗時のスクリプト修復
//!
//! 失敗したスクリプトとエラー出力を渡し、修正済みスクリプトだけを受け取る。

use async_trait::async_trait;

use crate::domain::RepairError;

#[async_trait]
pub trait ScriptRepairer: Send + Sync {
    /// Returns the corrected script text, never commentary.
    ///
    /// An empty answer must be reported as [`RepairError::Empty`].
    async fn repair(&self, script: &str, error: &str) -> Result<String, RepairError>;
}
