//! Domain identifiers (strongly-typed IDs).
//!
//! # UUID ベースの ID + Phantom type
//! `Id<T>` で共通実装を持ち、`T` はマーカー型（実行時には使わない）。
//! `RequestId` と `UploadId` は同じ UUID を中身に持つが、型としては混同できない。
//!
//! `RequestId` の Display はプレフィックスなしの UUID。
//! ストリームの trailer (`[REQUEST_ID:<uuid>]`) にそのまま埋め込まれるため。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use uuid::Uuid;

use super::errors::IdError;

/// IdMarker は各 ID 型のマーカー trait
pub trait IdMarker: Send + Sync + 'static {
    /// Display で使うプレフィックス（例: "upload-"）。空文字も可。
    fn prefix() -> &'static str;
}

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    uuid: Uuid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self {
            uuid,
            _marker: PhantomData,
        }
    }

    /// Fresh random (v4) identifier.
    pub fn new_v4() -> Self {
        Self::from_uuid(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.uuid
    }
}

impl<T: IdMarker> From<Uuid> for Id<T> {
    fn from(uuid: Uuid) -> Self {
        Self::from_uuid(uuid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.uuid.hyphenated())
    }
}

impl<T: IdMarker> FromStr for Id<T> {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s
            .strip_prefix(T::prefix())
            .ok_or_else(|| IdError::Malformed(s.to_string()))?;
        let uuid = Uuid::parse_str(raw).map_err(|_| IdError::Malformed(s.to_string()))?;
        Ok(Self::from_uuid(uuid))
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// Request のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Request {}

impl IdMarker for Request {
    fn prefix() -> &'static str {
        ""
    }
}

/// Upload のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Upload {}

impl IdMarker for Upload {
    fn prefix() -> &'static str {
        "upload-"
    }
}

/// Correlates one chat stream with its background render.
pub type RequestId = Id<Request>;

/// Names an uploaded image on disk while OCR runs.
pub type UploadId = Id<Upload>;
