//! Sumire ランタイムインスペクタ
//!
//! このクレートは、ダンプ内のマネージドランタイム（MRT）構造を生のバイト列から
//! 遅延的に再構築します。ランタイムモジュールの検出、バージョンごとの
//! オブジェクトレイアウト解釈、ヒープウォーク、型解決、スタックトレースを行います。

pub mod detector;
pub mod errors;
pub mod heap;
pub mod inspector;
pub mod layout;
pub mod runtime;
pub mod stack;
pub mod types;

pub use detector::RuntimeDetector;
pub use errors::RuntimeError;
pub use heap::{HeapObject, HeapSegment, HeapWalk};
pub use inspector::RuntimeInspector;
pub use layout::LayoutKind;
pub use runtime::Runtime;
pub use stack::{Frame, FramePointerUnwinder, Unwinder};
pub use types::TypeDescriptor;

/// ランタイム解析の結果型
pub type Result<T> = anyhow::Result<T>;
