mod completion;
mod episode;
mod podcast;

pub use completion::{CompletionState, CompletionStats, Subscription};
pub use episode::{Episode, EpisodeFilter, EpisodeOrder, NewEpisode, UserEpisode};
pub use podcast::{FeedMetadata, ParsedFeed, Podcast};
