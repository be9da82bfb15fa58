//! Ports - 抽象化レイヤー
//!
//! 外部システム（モデルプロバイダ、レンダリングエンジン、OCR、状態ストア）への
//! インターフェース。実装は `impls`、テストではスクリプト化した fake を使う。

pub mod clock;
pub mod generator;
pub mod id_generator;
pub mod outcome_store;
pub mod renderer;
pub mod repairer;
pub mod text_extractor;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::generator::ExplanationGenerator;
pub use self::id_generator::{IdGenerator, SequenceIdGenerator, UuidGenerator};
pub use self::outcome_store::OutcomeStore;
pub use self::renderer::{RenderOutput, SceneRenderer};
pub use self::repairer::ScriptRepairer;
pub use self::text_extractor::TextExtractor;
