pub mod story;

pub use story::{
    parse_epoch_millis, InvalidTimestamp, NewTravelStory, OwnerId, StoryFields, TravelStory,
};
