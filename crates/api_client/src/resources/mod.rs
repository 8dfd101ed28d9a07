//! Resource-oriented method groups over the request primitive.
//!
//! Each group is a stateless borrow of the [`ApiClient`](crate::ApiClient);
//! no per-group state exists.

pub mod ai;
pub mod bookings;
pub mod chat;
pub mod geo;
pub mod products;
pub mod reels;
pub mod search;
pub mod wallet;

pub use ai::AiApi;
pub use bookings::{BookingListParams, BookingsApi};
pub use chat::ChatApi;
pub use geo::GeoApi;
pub use products::{ProductListParams, ProductsApi};
pub use reels::{ReelFeedParams, ReelsApi};
pub use search::{SearchApi, SearchKind, SearchParams};
pub use wallet::{TransactionListParams, WalletApi};
