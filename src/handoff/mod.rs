//! Handing a feed video to the floating mini-player and back.

mod authority;
mod bus;
mod feed;
mod focus;
mod ids;
mod mini_player;
#[cfg(test)]
mod tests;

pub use authority::{PlayAuthority, PlayOwner};
pub use bus::{RestoreBus, RestoreSignal, RestoreSubscription};
pub use feed::{FeedEvent, FeedView};
pub use focus::ViewFocus;
pub use ids::{PostId, ViewId};
pub use mini_player::{
    HandoffEvent, InlineVideoHost, MiniPlayerHandoff, MiniPlayerSession, MINI_PLAYER_SCOPE,
};
