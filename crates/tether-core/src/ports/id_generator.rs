//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use crate::domain::ids::{CorrelationToken, Id, IdMarker, UnitId};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は invocation ごとの token と unit id を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数の caller から同時に使われる）
pub trait IdGenerator: Send + Sync {
    fn correlation_token(&self) -> CorrelationToken;

    fn unit_id(&self) -> UnitId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// timestamp は Clock から、残り 80 bit は乱数。FixedClock を使っても
/// ID は毎回異なる。
#[derive(Debug, Clone, Default)]
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next<T: IdMarker>(&self) -> Id<T> {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Id::from(Ulid::from_parts(timestamp_ms, rand::random()))
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn correlation_token(&self) -> CorrelationToken {
        self.next()
    }

    fn unit_id(&self) -> UnitId {
        self.next()
    }
}
