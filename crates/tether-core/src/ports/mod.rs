//! Ports - 抽象化レイヤー
//!
//! 時刻、ID 生成、外部リソース（プール / サーバー）のライフサイクルを
//! trait として切り出し、テストで差し替えられるようにします。

pub mod clock;
pub mod id_generator;
pub mod lifecycle;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::lifecycle::{PoolLifecycle, ServerLifecycle};
