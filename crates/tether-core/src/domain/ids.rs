//! Typed identifiers for invocations and execution units.
//!
//! # ULID ベースの ID + Phantom type
//! - **時刻でソート可能**: ログを並べたときに生成順に読める
//! - **調整なしで一意**: 複数の invocation が同時に token を作っても衝突しない
//!
//! `Id<T>` は共通実装、`T` は実行時に使わないマーカー型です。
//! `CorrelationToken` と `UnitId` は同じ 128-bit でも混同できません。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"inv-", "unit-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
#[repr(transparent)]
#[derive(Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

// derive だと `T: Clone` などを要求してしまうので手で実装する
impl<T: IdMarker> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: IdMarker> Copy for Id<T> {}

impl<T: IdMarker> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ulid == other.ulid
    }
}

impl<T: IdMarker> Eq for Id<T> {}

impl<T: IdMarker> std::hash::Hash for Id<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.ulid.hash(state);
    }
}

impl<T: IdMarker> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: IdMarker> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.ulid.cmp(&other.ulid)
    }
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// One call to `invoke`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Invocation {}

impl IdMarker for Invocation {
    fn prefix() -> &'static str {
        "inv-"
    }
}

/// A supervisor, worker or linked subordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Unit {}

impl IdMarker for Unit {
    fn prefix() -> &'static str {
        "unit-"
    }
}

/// Matches a reply to the caller waiting for it. Created once per
/// invocation, never reused.
pub type CorrelationToken = Id<Invocation>;

/// Names one execution unit in log output.
pub type UnitId = Id<Unit>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let ulid1 = Ulid::new();
        let ulid2 = Ulid::new();

        let token = CorrelationToken::from_ulid(ulid1);
        let unit = UnitId::from_ulid(ulid2);

        assert_eq!(token.as_ulid(), ulid1);
        assert_eq!(unit.as_ulid(), ulid2);

        assert!(token.to_string().starts_with("inv-"));
        assert!(unit.to_string().starts_with("unit-"));

        // let _: CorrelationToken = unit; // <- does not compile
    }

    #[test]
    fn ulid_ids_are_sortable() {
        let id1 = CorrelationToken::from_ulid(Ulid::new());
        std::thread::sleep(std::time::Duration::from_millis(2)); // 時刻が進むのを待つ
        let id2 = CorrelationToken::from_ulid(Ulid::new());

        assert!(id1 < id2);
    }

    #[test]
    fn token_serializes_as_plain_ulid() {
        let token = CorrelationToken::from_ulid(Ulid::new());

        let serialized = serde_json::to_string(&token).unwrap();
        assert_eq!(serialized, format!("\"{}\"", token.as_ulid()));

        let deserialized: CorrelationToken = serde_json::from_str(&serialized).unwrap();
        assert_eq!(token, deserialized);
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;

        assert_eq!(size_of::<CorrelationToken>(), size_of::<Ulid>());
        assert_eq!(size_of::<UnitId>(), 16);
    }
}
