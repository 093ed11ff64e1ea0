//! ヒープディレクトリの読み取りと遅延ヒープウォーク
//!
//! ランタイムモジュールのイメージ先頭にマジック "MRT0"、base+8 に
//! ヒープディレクトリへのポインタがある。ディレクトリはマジック "HEAP"、
//! セグメント数、セグメント記述子の並び。

use crate::errors::RuntimeError;
use crate::layout::{LayoutKind, OBJECT_MIN_SIZE};
use crate::runtime::Runtime;
use crate::Result;
use std::sync::Arc;
use sumire_target::{AddressSpace, AddressSpaceExt};
use tracing::debug;

/// ランタイムイメージ先頭のマジック
const RUNTIME_MAGIC: u32 = u32::from_le_bytes(*b"MRT0");

/// ヒープディレクトリのマジック
const HEAP_DIR_MAGIC: u32 = u32::from_le_bytes(*b"HEAP");

/// ヒープセグメント
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapSegment {
    pub start: u64,
    pub end: u64,
}

/// 遅延的に実体化されたヒープオブジェクトのビュー
///
/// 永続化はしない。必要ならクエリごとに再計算される。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapObject {
    /// オブジェクトのアドレス
    pub addr: u64,
    /// 型ハンドル（型記述子のアドレス）
    pub type_handle: u64,
    /// ヘッダ込みサイズ（バイト）
    pub size: u64,
}

/// ヒープディレクトリを読む
pub fn read_heap_directory(space: &dyn AddressSpace, runtime: &Runtime) -> Result<Vec<HeapSegment>> {
    let base = runtime.base();

    let magic = space.read_u32(base)?;
    if magic != RUNTIME_MAGIC {
        return Err(RuntimeError::CorruptHeap(format!(
            "runtime image at 0x{:x} has bad magic 0x{:x}",
            base, magic
        ))
        .into());
    }

    let dir_addr = space.read_u64(base.checked_add(8).ok_or_else(|| {
        RuntimeError::CorruptHeap(format!("runtime base 0x{:x} too close to address space end", base))
    })?)?;
    let dir_magic = space.read_u32(dir_addr)?;
    if dir_magic != HEAP_DIR_MAGIC {
        return Err(RuntimeError::CorruptHeap(format!(
            "heap directory at 0x{:x} has bad magic 0x{:x}",
            dir_addr, dir_magic
        ))
        .into());
    }

    let count = space.read_u32(dir_addr.checked_add(4).ok_or_else(|| {
        RuntimeError::CorruptHeap(format!("heap directory pointer 0x{:x} overflows", dir_addr))
    })?)?;
    // countはダンプ由来の値。先に予約せず、読めた分だけ伸ばす。
    let mut segments = Vec::new();
    for i in 0..count as u64 {
        // ディレクトリ自体がアドレス空間の端にかかるのも破損の一形態
        let entry = dir_addr
            .checked_add(8 + i * 16)
            .and_then(|e| e.checked_add(8).map(|_| e))
            .ok_or_else(|| {
                RuntimeError::CorruptHeap(format!(
                    "heap directory entry {} overflows the address space",
                    i
                ))
            })?;
        let start = space.read_u64(entry)?;
        let end = space.read_u64(entry + 8)?;
        if end < start {
            return Err(RuntimeError::CorruptHeap(format!(
                "heap segment {} is inverted: 0x{:x}..0x{:x}",
                i, start, end
            ))
            .into());
        }
        segments.push(HeapSegment { start, end });
    }

    debug!("heap directory at 0x{:x}: {} segments", dir_addr, count);
    Ok(segments)
}

/// 遅延ヒープウォーク
///
/// セグメントをディレクトリ順、オブジェクトをアドレス昇順にたどる。
/// ダンプは不変なので、再ウォークすれば同一の列が得られる。
/// 計算されたサイズがセグメント境界を越える・カーソルが戻るなどの発散は
/// `CorruptHeap` として致命的に扱う（1件エラーを返した後は打ち切る）。
pub struct HeapWalk {
    space: Arc<dyn AddressSpace>,
    layout: LayoutKind,
    segments: Vec<HeapSegment>,
    seg_idx: usize,
    cursor: u64,
    finished: bool,
}

impl HeapWalk {
    pub(crate) fn new(
        space: Arc<dyn AddressSpace>,
        layout: LayoutKind,
        segments: Vec<HeapSegment>,
    ) -> Self {
        let cursor = segments.first().map(|s| s.start).unwrap_or(0);
        Self {
            space,
            layout,
            segments,
            seg_idx: 0,
            cursor,
            finished: false,
        }
    }

    /// セグメント一覧を取得する
    pub fn segments(&self) -> &[HeapSegment] {
        &self.segments
    }

    /// 次のセグメントへ進む
    fn advance_segment(&mut self) {
        self.seg_idx += 1;
        if let Some(seg) = self.segments.get(self.seg_idx) {
            self.cursor = seg.start;
        } else {
            self.finished = true;
        }
    }

    /// 現在位置のオブジェクトを1つ読む
    fn next_object(&mut self) -> Result<Option<HeapObject>> {
        loop {
            if self.finished {
                return Ok(None);
            }
            let seg = self.segments[self.seg_idx];

            // セグメントを使い切った
            if self.cursor >= seg.end {
                self.advance_segment();
                continue;
            }

            let addr = self.cursor;
            let header = self.layout.read_header(self.space.as_ref(), addr)?;

            if header.size < OBJECT_MIN_SIZE {
                return Err(RuntimeError::CorruptHeap(format!(
                    "object at 0x{:x} has size {} below minimum",
                    addr, header.size
                ))
                .into());
            }

            let next = addr.checked_add(header.size).ok_or_else(|| {
                RuntimeError::CorruptHeap(format!(
                    "object at 0x{:x} has size overflowing the address space",
                    addr
                ))
            })?;
            if next > seg.end {
                return Err(RuntimeError::CorruptHeap(format!(
                    "object at 0x{:x} (size {}) advances past segment end 0x{:x}",
                    addr, header.size, seg.end
                ))
                .into());
            }
            if next <= addr {
                return Err(RuntimeError::CorruptHeap(format!(
                    "cursor moved backward at 0x{:x}",
                    addr
                ))
                .into());
            }
            self.cursor = next;

            // フリー領域は読み飛ばす（yieldしない）
            if header.is_free() {
                continue;
            }

            return Ok(Some(HeapObject {
                addr,
                type_handle: header.type_handle,
                size: header.size,
            }));
        }
    }
}

impl Iterator for HeapWalk {
    type Item = Result<HeapObject>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_object() {
            Ok(Some(obj)) => Some(Ok(obj)),
            Ok(None) => None,
            Err(e) => {
                // 発散は致命的。以後は打ち切る。
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
