//! `MapDataStore` implementations.
//!
//! Provides concrete backends for the [`MapDataStore`](super::MapDataStore) trait:
//! [`NullDataStore`] for maps without external persistence,
//! [`WriteThroughDataStore`] and [`WriteBehindDataStore`] wrapping a user
//! [`MapStore`](super::MapStore).

mod null;
mod write_behind;
mod write_through;

pub use null::NullDataStore;
pub use write_behind::WriteBehindDataStore;
pub use write_through::WriteThroughDataStore;
