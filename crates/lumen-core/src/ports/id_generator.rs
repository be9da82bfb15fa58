//! IdGenerator port - ID 生成の抽象化
//!
//! テストで固定の ID を使えるように trait にしている。

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::domain::ids::{RequestId, UploadId};

pub trait IdGenerator: Send + Sync {
    fn generate_request_id(&self) -> RequestId;

    fn generate_upload_id(&self) -> UploadId;
}

/// Random v4 UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate_request_id(&self) -> RequestId {
        RequestId::new_v4()
    }

    fn generate_upload_id(&self) -> UploadId {
        UploadId::new_v4()
    }
}

/// Hands out a fixed sequence of request ids, then falls back to random ones.
#[derive(Debug, Default)]
pub struct SequenceIdGenerator {
    queued: Mutex<VecDeque<RequestId>>,
}

impl SequenceIdGenerator {
    pub fn new(ids: impl IntoIterator<Item = RequestId>) -> Self {
        Self {
            queued: Mutex::new(ids.into_iter().collect()),
        }
    }
}

impl IdGenerator for SequenceIdGenerator {
    fn generate_request_id(&self) -> RequestId {
        let next = match self.queued.lock() {
            Ok(mut q) => q.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        next.unwrap_or_else(RequestId::new_v4)
    }

    fn generate_upload_id(&self) -> UploadId {
        UploadId::new_v4()
    }
}
